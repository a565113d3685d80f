use std::{collections::BTreeMap, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ParseValueError;

/// Canonical string form of a row's key field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowKey(pub String);

impl RowKey {
    /// Numbers and strings are valid keys; anything else is not.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) if !s.is_empty() => Some(Self(s.clone())),
            Value::Number(n) => Some(Self(n.to_string())),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<i64> for RowKey {
    fn from(value: i64) -> Self {
        Self(value.to_string())
    }
}

impl From<&str> for RowKey {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One record of a remote collection. Rows are snapshots: a patch produces a
/// new row and leaves the original untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row {
    fields: Map<String, Value>,
}

impl Row {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn get_bool(&self, field: &str) -> Option<bool> {
        self.fields.get(field).and_then(Value::as_bool)
    }

    pub fn key(&self, key_field: &str) -> Option<RowKey> {
        self.fields.get(key_field).and_then(RowKey::from_value)
    }

    /// Text used for free-text matching. Arrays are joined with commas,
    /// null and missing fields render as the empty string.
    pub fn text(&self, field: &str) -> String {
        self.fields.get(field).map(value_text).unwrap_or_default()
    }

    pub fn patched(&self, patch: &Map<String, Value>) -> Self {
        let mut fields = self.fields.clone();
        for (name, value) in patch {
            fields.insert(name.clone(), value.clone());
        }
        Self { fields }
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(value_text).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

/// Discrete filter selector: everything, or only rows whose flag matches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriState {
    #[default]
    All,
    Only(bool),
}

impl TriState {
    pub fn matches(self, flag: Option<bool>) -> bool {
        match self {
            TriState::All => true,
            TriState::Only(expected) => flag == Some(expected),
        }
    }

    /// Value of the query argument sent to the server, if any.
    pub fn query_value(self) -> Option<&'static str> {
        match self {
            TriState::All => None,
            TriState::Only(true) => Some("true"),
            TriState::Only(false) => Some("false"),
        }
    }
}

impl FromStr for TriState {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all" => Ok(TriState::All),
            "true" => Ok(TriState::Only(true)),
            "false" => Ok(TriState::Only(false)),
            other => Err(ParseValueError::TriState(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    NewestFirst,
    OldestFirst,
}

impl FromStr for SortDirection {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "newest" => Ok(SortDirection::NewestFirst),
            "oldest" => Ok(SortDirection::OldestFirst),
            other => Err(ParseValueError::SortDirection(other.to_string())),
        }
    }
}

/// Search, filter and sort state of one list view.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryParams {
    pub search: String,
    pub filters: BTreeMap<String, TriState>,
    pub sort: Option<SortDirection>,
}

impl QueryParams {
    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = search.into();
        self
    }

    pub fn with_filter(mut self, selector: impl Into<String>, value: TriState) -> Self {
        self.filters.insert(selector.into(), value);
        self
    }

    pub fn with_sort(mut self, sort: SortDirection) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Unset selectors read as `TriState::All`.
    pub fn filter(&self, selector: &str) -> TriState {
        self.filters.get(selector).copied().unwrap_or_default()
    }
}

/// Parses a `name=value` filter expression as accepted on the command line.
pub fn parse_filter_expression(raw: &str) -> Result<(String, TriState), ParseValueError> {
    let Some((name, value)) = raw.split_once('=') else {
        return Err(ParseValueError::FilterExpression(raw.to_string()));
    };
    let name = name.trim();
    if name.is_empty() {
        return Err(ParseValueError::FilterExpression(raw.to_string()));
    }
    Ok((name.to_string(), value.parse()?))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BannerKind {
    Error,
    Success,
}

impl fmt::Display for BannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BannerKind::Error => f.write_str("error"),
            BannerKind::Success => f.write_str("success"),
        }
    }
}
