//! Declarative selector maps driving extraction.
//!
//! A [`SelectorMap`] describes a page holding repeated records: the group
//! selector finds each record's root node and every field selector is
//! evaluated inside that node. A [`KeyedMap`] describes a page where each
//! group node is one `name -> value` pair of a single record.

use serde::Deserialize;
use serde_json::Value;

use crate::{Error, Result, GROUP_KEY};

/// How a field picks its value when its selector matches several nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ValuePolicy {
    /// Only the first match is used.
    #[default]
    First,
    /// All matches are joined with [`crate::JOIN_DELIMITER`].
    Join,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawFieldSpec")]
pub struct FieldSpec {
    pub selector: String,
    pub policy: ValuePolicy,
    /// Try to turn the text into a JSON number, keeping the string if that fails.
    pub numeric: bool,
}

impl FieldSpec {
    pub fn new(selector: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            policy: ValuePolicy::First,
            numeric: false,
        }
    }

    pub fn multi(mut self) -> Self {
        self.policy = ValuePolicy::Join;
        self
    }

    pub fn numeric(mut self) -> Self {
        self.numeric = true;
        self
    }
}

/// Either `".price"` or `{"selector": ".price", "multi": false, "numeric": true}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawFieldSpec {
    Selector(String),
    Full {
        selector: String,
        #[serde(default)]
        multi: bool,
        #[serde(default)]
        numeric: bool,
    },
}

impl From<RawFieldSpec> for FieldSpec {
    fn from(raw: RawFieldSpec) -> Self {
        match raw {
            RawFieldSpec::Selector(selector) => FieldSpec::new(selector),
            RawFieldSpec::Full {
                selector,
                multi,
                numeric,
            } => FieldSpec {
                selector,
                policy: if multi { ValuePolicy::Join } else { ValuePolicy::First },
                numeric,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorMap {
    pub group: String,
    /// Fields in declaration order; records keep this key order.
    pub fields: Vec<(String, FieldSpec)>,
}

impl SelectorMap {
    pub fn new(group: impl Into<String>) -> Self {
        Self {
            group: group.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, name: impl Into<String>, spec: FieldSpec) -> Self {
        self.fields.push((name.into(), spec));
        self
    }

    /// Builds a map from flat `name -> selector` pairs; `"group"` is the reserved group key.
    pub fn from_pairs<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut group = None;
        let mut fields = Vec::new();
        for (name, selector) in pairs {
            if name == GROUP_KEY {
                group = Some(selector.to_string());
            } else {
                fields.push((name.to_string(), FieldSpec::new(selector)));
            }
        }
        let group = group.ok_or_else(missing_group)?;
        Ok(Self { group, fields })
    }

    /// Parses a JSON object of the same shape as [`SelectorMap::from_pairs`],
    /// where field values may also be full [`FieldSpec`] objects.
    pub fn from_json(json: &str) -> Result<Self> {
        let object: serde_json::Map<String, Value> = serde_json::from_str(json)?;

        let mut group = None;
        let mut fields = Vec::new();
        for (name, value) in object {
            if name == GROUP_KEY {
                match value {
                    Value::String(selector) => group = Some(selector),
                    other => {
                        return Err(Error::Config(format!(
                            "\"{GROUP_KEY}\" must be a selector string, got {other}"
                        )))
                    }
                }
            } else {
                fields.push((name, serde_json::from_value(value)?));
            }
        }
        let group = group.ok_or_else(missing_group)?;
        Ok(Self { group, fields })
    }
}

fn missing_group() -> Error {
    Error::Config(format!("selector map has no \"{GROUP_KEY}\" selector"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedMap {
    pub group: String,
    /// Selector for the field name inside each group node.
    pub key: String,
    pub value: FieldSpec,
}
