//! Bot Kernel: simulated collaborators for shared editing sessions
//!
//! This crate fills shared entity topics with bots that come and go, watch
//! for real people and, while someone is watching, edit the entity field by
//! field before committing the result through a repository.
//!
//! The kernel is domain-agnostic. A domain supplies an [`Entity`], an
//! [`EntityRepository`] and a [`FieldCatalog`]; shared state lives in an
//! injected [`TopicStore`].

pub mod actors;
pub mod avatars;
pub mod binder;
pub mod commit;
pub mod config;
pub mod entity;
pub mod error;
pub mod fields;
pub mod identity;
pub mod manager;
pub mod presence;
pub mod script;
pub mod topic;

pub use actors::{EditActor, EditActorRegistry, PresenceActor, RoamingPresenceActor, TickOutcome};
pub use commit::{RefreshSignal, SaveNotification};
pub use config::{BotConfig, IdentityPoolPolicy};
pub use entity::{Entity, EntityId, EntityRepository};
pub use error::BotError;
pub use fields::{FieldCatalog, FieldSpec};
pub use identity::{ActorIdentity, IdentityGenerator};
pub use manager::{BotHost, BotManager, BotManagerHandle};
pub use presence::PresenceManager;
pub use topic::{InMemoryTopicStore, Registration, TopicId, TopicStore};
