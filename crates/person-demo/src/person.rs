//! The person record edited in the demo.

use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use bot_kernel::{Entity, EntityId};

/// Allowed values of [`Person::happiness`], happiest first.
pub const HAPPINESS_VALUES: [&str; 5] = [
    "Raptorous",
    "Ecstatic",
    "Joyful",
    "Indifferent",
    "Dreadful",
];

/// Editable field names as they appear in entity topics.
pub const FIRST_NAME: &str = "firstName";
pub const LAST_NAME: &str = "lastName";
pub const EMAIL: &str = "email";
pub const HAPPINESS: &str = "happiness";

/// A person in the directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: EntityId,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub happiness: Option<String>,
    pub title: String,
    pub phone_number: String,
}

impl Person {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

fn as_text<'a>(field: &str, value: &'a Value) -> anyhow::Result<&'a str> {
    value
        .as_str()
        .with_context(|| format!("`{field}` expects text, got {value}"))
}

impl Entity for Person {
    fn id(&self) -> EntityId {
        self.id
    }

    fn label(&self) -> String {
        self.full_name()
    }

    fn apply_field(&mut self, field: &str, value: &Value) -> anyhow::Result<()> {
        match field {
            FIRST_NAME => self.first_name = as_text(field, value)?.to_string(),
            LAST_NAME => self.last_name = as_text(field, value)?.to_string(),
            EMAIL => self.email = as_text(field, value)?.to_string(),
            HAPPINESS => {
                let happiness = as_text(field, value)?;
                if !HAPPINESS_VALUES.contains(&happiness) {
                    bail!("unknown happiness `{happiness}`");
                }
                self.happiness = Some(happiness.to_string());
            }
            other => bail!("`{other}` is not an editable person field"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn person() -> Person {
        Person {
            id: 1,
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada.lovelace@example.com".to_string(),
            happiness: None,
            title: "Designer".to_string(),
            phone_number: "+358 1234 567".to_string(),
        }
    }

    #[test]
    fn test_apply_editable_fields() {
        let mut person = person();
        person.apply_field(FIRST_NAME, &json!("Grace")).unwrap();
        person.apply_field(HAPPINESS, &json!("Joyful")).unwrap();

        assert_eq!(person.label(), "Grace Lovelace");
        assert_eq!(person.happiness.as_deref(), Some("Joyful"));
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut person = person();
        assert!(person.apply_field(HAPPINESS, &json!("Grumpy")).is_err());
        assert!(person.apply_field(EMAIL, &json!(42)).is_err());
        assert!(person.apply_field("title", &json!("CEO")).is_err());
        assert_eq!(person.email, "ada.lovelace@example.com");
    }

    #[test]
    fn test_serializes_camel_case() {
        let value = serde_json::to_value(person()).unwrap();
        assert_eq!(value["firstName"], json!("Ada"));
        assert_eq!(value["phoneNumber"], json!("+358 1234 567"));
    }
}
