//! The person fields bots may edit.

use rand::prelude::*;
use serde_json::Value;

use bot_kernel::{FieldCatalog, FieldSpec};

use crate::generator;
use crate::person::{EMAIL, FIRST_NAME, HAPPINESS, HAPPINESS_VALUES, LAST_NAME};

/// Names and email are typed; happiness is picked from its fixed list.
pub fn person_fields() -> FieldCatalog {
    FieldCatalog::default()
        .with_field(FieldSpec::text(FIRST_NAME, |rng: &mut dyn RngCore| {
            Value::String(generator::first_name(rng))
        }))
        .with_field(FieldSpec::text(LAST_NAME, |rng: &mut dyn RngCore| {
            Value::String(generator::last_name(rng))
        }))
        .with_field(FieldSpec::text(EMAIL, |rng: &mut dyn RngCore| {
            Value::String(generator::email(rng))
        }))
        .with_field(FieldSpec::choice(HAPPINESS, HAPPINESS_VALUES))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bot_kernel::Entity;
    use rand_chacha::ChaCha8Rng;

    use crate::generator::PersonGenerator;

    #[test]
    fn test_every_sample_applies_to_a_person() {
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let catalog = person_fields();
        let mut person = PersonGenerator::generate_person(&mut rng);

        for field in catalog.fields() {
            for _ in 0..10 {
                let sampled = field.sample(&mut rng);
                person.apply_field(&field.name, &sampled.value).unwrap();
            }
        }
        assert!(person.happiness.is_some());
    }

    #[test]
    fn test_only_happiness_is_a_choice() {
        let catalog = person_fields();
        let choices: Vec<&str> = catalog
            .fields()
            .iter()
            .filter(|field| field.is_choice())
            .map(|field| field.name.as_str())
            .collect();
        assert_eq!(choices, vec![HAPPINESS]);
    }
}
