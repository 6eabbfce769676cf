//! Store-native page and property representations.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Formatted text fragment; only the plain rendering is kept.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RichText {
    #[serde(default)]
    pub plain_text: String,
}

impl RichText {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            plain_text: text.into(),
        }
    }
}

/// Named option of a `select` or `status` property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectOption {
    pub name: String,
}

/// Date or date range. Both ends are ISO 8601 strings, either full
/// timestamps or bare `YYYY-MM-DD` dates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateValue {
    pub start: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRef {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Person {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// One typed property value, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PropertyValue {
    Title {
        #[serde(default)]
        title: Vec<RichText>,
    },
    RichText {
        #[serde(default)]
        rich_text: Vec<RichText>,
    },
    Number {
        #[serde(default)]
        number: Option<f64>,
    },
    Select {
        #[serde(default)]
        select: Option<SelectOption>,
    },
    Status {
        #[serde(default)]
        status: Option<SelectOption>,
    },
    Date {
        #[serde(default)]
        date: Option<DateValue>,
    },
    Checkbox {
        #[serde(default)]
        checkbox: bool,
    },
    Relation {
        #[serde(default)]
        relation: Vec<RelationRef>,
    },
    People {
        #[serde(default)]
        people: Vec<Person>,
    },
    /// Any kind the scheduler does not read (formulas, rollups, files...).
    #[serde(other)]
    Unsupported,
}

impl PropertyValue {
    /// Name of the property kind, as used in the `type` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            PropertyValue::Title { .. } => "title",
            PropertyValue::RichText { .. } => "rich_text",
            PropertyValue::Number { .. } => "number",
            PropertyValue::Select { .. } => "select",
            PropertyValue::Status { .. } => "status",
            PropertyValue::Date { .. } => "date",
            PropertyValue::Checkbox { .. } => "checkbox",
            PropertyValue::Relation { .. } => "relation",
            PropertyValue::People { .. } => "people",
            PropertyValue::Unsupported => "unsupported",
        }
    }

    pub fn date(start: impl Into<String>, end: Option<String>) -> Self {
        PropertyValue::Date {
            date: Some(DateValue {
                start: start.into(),
                end,
            }),
        }
    }
}

/// A task page as stored: an id plus its named properties.
///
/// Top-level fields other than `id` and `properties` are preserved so a
/// snapshot survives being rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub id: String,
    #[serde(default)]
    pub properties: IndexMap<String, PropertyValue>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl PageRecord {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            properties: IndexMap::new(),
            extra: serde_json::Map::new(),
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: PropertyValue) -> Self {
        self.properties.insert(key.into(), value);
        self
    }

    pub fn property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }
}
