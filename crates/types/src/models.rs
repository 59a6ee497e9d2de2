//! Value types published by composite widgets.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An option in a selector.
///
/// `key` is what gets stored, `text` is what gets shown and matched, `data` is
/// free payload for custom rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub key: String,
    pub text: String,
    #[serde(default)]
    pub data: Value,
}

impl Choice {
    pub fn new(key: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            text: text.into(),
            data: Value::Null,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orcid: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub relationship: String,
    pub dataset: String,
}

/// One scientific-metadata value with an optional unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataEntry {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A backend complaint about one submitted field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Technique {
    pub id: String,
    pub name: String,
}

/// Technique ontology: ids are reported as `{prefix}/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechniqueCatalog {
    pub prefix: String,
    pub techniques: Vec<Technique>,
}

impl TechniqueCatalog {
    /// Choices sorted by id, the order the selector lists them in.
    pub fn choices(&self) -> Vec<Choice> {
        let mut choices: Vec<Choice> = self
            .techniques
            .iter()
            .map(|technique| Choice::new(technique.id.clone(), technique.name.clone()))
            .collect();
        choices.sort_by(|a, b| a.key.cmp(&b.key));
        choices
    }

    pub fn qualified_id(&self, id: &str) -> String {
        format!("{}/{}", self.prefix, id)
    }
}
