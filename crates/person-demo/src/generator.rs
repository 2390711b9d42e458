//! Sample person generator.
//!
//! Produces plausible people for seeding the repository and plausible field
//! values for bots to type. With a seed the output is reproducible.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::person::Person;

const FIRST_NAMES: [&str; 24] = [
    "Aino", "Eero", "Helmi", "Juho", "Kaisa", "Lauri", "Mikko", "Noora", "Olli", "Pia", "Sanna",
    "Ville", "Alice", "Bruno", "Chloe", "Diego", "Elena", "Felix", "Grace", "Hugo", "Iris",
    "Jonas", "Lena", "Marco",
];

const LAST_NAMES: [&str; 20] = [
    "Virtanen", "Korhonen", "Nieminen", "Mäkinen", "Hämäläinen", "Laine", "Heikkinen", "Koskinen",
    "Järvinen", "Lehtonen", "Smith", "Garcia", "Müller", "Rossi", "Novak", "Jensen", "Silva",
    "Kowalski", "Dubois", "Schmidt",
];

const TITLES: [&str; 7] = [
    "Software Developer",
    "Designer",
    "Product Owner",
    "Product Marketer",
    "Key Account Manager",
    "Business Development Representative",
    "Quality Assurance",
];

const MAIL_DOMAINS: [&str; 3] = ["example.com", "example.org", "example.net"];

/// Configuration for demo data generation.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    /// Number of people to create
    pub count: usize,
    /// Random seed for reproducibility (None for random)
    pub seed: Option<u64>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            count: 100,
            seed: Some(123),
        }
    }
}

pub fn first_name(rng: &mut dyn RngCore) -> String {
    pick(&FIRST_NAMES, rng).to_string()
}

pub fn last_name(rng: &mut dyn RngCore) -> String {
    pick(&LAST_NAMES, rng).to_string()
}

/// Address derived from a name, e.g. `aino.laine@example.com`.
pub fn email_for(first: &str, last: &str, rng: &mut dyn RngCore) -> String {
    let local: String = format!("{first}.{last}")
        .to_lowercase()
        .chars()
        .map(|c| match c {
            'ä' => 'a',
            'ö' => 'o',
            'ü' => 'u',
            c => c,
        })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '.')
        .collect();
    format!("{local}@{}", pick(&MAIL_DOMAINS, rng))
}

/// Address of a freshly drawn name.
pub fn email(rng: &mut dyn RngCore) -> String {
    let first = first_name(rng);
    let last = last_name(rng);
    email_for(&first, &last, rng)
}

/// Finnish-style number, e.g. `+358 4821 337`.
pub fn phone_number(rng: &mut dyn RngCore) -> String {
    format!(
        "+358 {} {}",
        rng.random_range(1000..10000),
        rng.random_range(100..1000)
    )
}

fn pick<'a>(options: &[&'a str], rng: &mut dyn RngCore) -> &'a str {
    options[rng.random_range(0..options.len())]
}

/// Generator for demo people.
pub struct PersonGenerator {
    config: GeneratorConfig,
}

impl PersonGenerator {
    /// Create a new generator with the given configuration.
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    /// Generate one person with a placeholder id of 0.
    pub fn generate_person(rng: &mut dyn RngCore) -> Person {
        let first = first_name(rng);
        let last = last_name(rng);
        let email = email_for(&first, &last, rng);
        Person {
            id: 0,
            first_name: first,
            last_name: last,
            email,
            happiness: None,
            title: pick(&TITLES, rng).to_string(),
            phone_number: phone_number(rng),
        }
    }

    /// Generate the configured number of people, ids starting at 1.
    pub fn generate(&self) -> Vec<Person> {
        let mut rng: Box<dyn RngCore> = match self.config.seed {
            Some(seed) => Box::new(ChaCha8Rng::seed_from_u64(seed)),
            None => Box::new(rand::rng()),
        };

        (0..self.config.count)
            .map(|i| Person {
                id: i as i64 + 1,
                ..Self::generate_person(rng.as_mut())
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_generation_is_reproducible() {
        let config = GeneratorConfig {
            count: 10,
            seed: Some(7),
        };
        let first = PersonGenerator::new(config.clone()).generate();
        let second = PersonGenerator::new(config).generate();

        assert_eq!(first, second);
        assert_eq!(first.len(), 10);
        assert_eq!(first[0].id, 1);
        assert_eq!(first[9].id, 10);
    }

    #[test]
    fn test_email_follows_name() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let email = email_for("Helmi", "Mäkinen", &mut rng);
        assert!(email.starts_with("helmi.makinen@"), "{email}");
    }

    #[test]
    fn test_phone_number_shape() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        for _ in 0..20 {
            let number = phone_number(&mut rng);
            let parts: Vec<&str> = number.split(' ').collect();
            assert_eq!(parts[0], "+358");
            assert_eq!(parts[1].len(), 4);
            assert_eq!(parts[2].len(), 3);
        }
    }
}
