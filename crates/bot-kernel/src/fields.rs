//! Catalog of the entity fields bots are allowed to edit.

use std::fmt;
use std::sync::Arc;

use rand::{Rng, RngCore};
use serde_json::Value;

/// Produces a plausible value for a free-text field.
pub trait ValueSource: Send + Sync {
    fn sample(&self, rng: &mut dyn RngCore) -> Value;
}

impl<F> ValueSource for F
where
    F: Fn(&mut dyn RngCore) -> Value + Send + Sync,
{
    fn sample(&self, rng: &mut dyn RngCore) -> Value {
        self(rng)
    }
}

/// How a field is edited.
#[derive(Clone)]
pub enum FieldKind {
    /// Typed into: the editor focuses the field, types, then leaves.
    Text(Arc<dyn ValueSource>),
    /// Picked from a fixed list: the editor's lock carries the chosen index.
    Choice(Vec<String>),
}

impl fmt::Debug for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(_) => f.write_str("Text"),
            Self::Choice(options) => f.debug_tuple("Choice").field(options).finish(),
        }
    }
}

/// One editable field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub kind: FieldKind,
}

/// A value chosen for a field, with the option index for choice fields.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledValue {
    pub value: Value,
    pub option_index: Option<usize>,
}

impl FieldSpec {
    pub fn text(name: impl Into<String>, source: impl ValueSource + 'static) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Text(Arc::new(source)),
        }
    }

    pub fn choice<S: Into<String>>(name: impl Into<String>, options: impl IntoIterator<Item = S>) -> Self {
        Self {
            name: name.into(),
            kind: FieldKind::Choice(options.into_iter().map(Into::into).collect()),
        }
    }

    pub fn is_choice(&self) -> bool {
        matches!(self.kind, FieldKind::Choice(_))
    }

    /// Draw a value for this field.
    pub fn sample(&self, rng: &mut dyn RngCore) -> SampledValue {
        match &self.kind {
            FieldKind::Text(source) => SampledValue {
                value: source.sample(rng),
                option_index: None,
            },
            FieldKind::Choice(options) if options.is_empty() => SampledValue {
                value: Value::Null,
                option_index: None,
            },
            FieldKind::Choice(options) => {
                let index = rng.random_range(0..options.len());
                SampledValue {
                    value: Value::String(options[index].clone()),
                    option_index: Some(index),
                }
            }
        }
    }
}

/// The fixed set of fields scripts pick from.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: Vec<FieldSpec>,
}

impl FieldCatalog {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Pick one field uniformly at random.
    pub fn choose(&self, rng: &mut dyn RngCore) -> Option<&FieldSpec> {
        if self.fields.is_empty() {
            return None;
        }
        let index = rng.random_range(0..self.fields.len());
        self.fields.get(index)
    }
}
