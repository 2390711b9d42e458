//! Person directory demo for the bot kernel.
//!
//! This crate supplies the domain the kernel edits:
//! - `Person` entities with an enumerated happiness field
//! - An in-memory repository seeded with generated people
//! - Observers standing in for browsers: the refreshing grid, save toasts
//!   and real visitors opening editors
//! - A simulation runner tying it all together

pub mod fields;
pub mod generator;
pub mod observer;
pub mod person;
pub mod repository;
pub mod simulation;

pub use person::Person;
pub use repository::InMemoryPersonRepository;
pub use simulation::{SimulationConfig, SimulationRunner, SimulationSummary};
