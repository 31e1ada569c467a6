use serde::ser::{Serialize, SerializeMap, Serializer};

use crate::extraction::schema::{ExtractionSchema, FieldDefault};

/// A single populated field value.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Null,
}

impl FieldValue {
    pub fn text(value: impl Into<String>) -> Self {
        FieldValue::Text(value.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            FieldValue::Null => None,
        }
    }
}

impl From<FieldDefault> for FieldValue {
    fn from(default: FieldDefault) -> Self {
        match default {
            FieldDefault::Text(text) => FieldValue::Text(text.to_string()),
            FieldDefault::Null => FieldValue::Null,
        }
    }
}

/// A fully populated extraction result: exactly one value per schema field,
/// in schema order. Serializes as a flat JSON object ready for storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    fields: Vec<(String, FieldValue)>,
}

impl Record {
    /// A record holding every field's default.
    pub fn defaults(schema: &ExtractionSchema) -> Self {
        Self {
            fields: schema
                .fields()
                .iter()
                .map(|f| (f.name.to_string(), FieldValue::from(f.default)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(FieldValue::as_str)
    }

    /// Splits a comma-list field into trimmed, non-empty items.
    pub fn list(&self, name: &str) -> Vec<String> {
        self.text(name)
            .map(|text| {
                text.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Replaces an existing field's value. Unknown names are ignored so a
    /// record never grows beyond its schema.
    pub fn set(&mut self, name: &str, value: FieldValue) -> bool {
        match self.fields.iter_mut().find(|(field, _)| field == name) {
            Some((_, slot)) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.len()))?;
        for (name, value) in self.iter() {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}
