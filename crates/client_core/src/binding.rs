//! Configuration object that binds a list view to one remote collection.

use serde_json::{Map, Value};
use shared::domain::{QueryParams, Row, RowKey, TriState};

use crate::transport::{ActionRequest, CollectionRequest, HttpMethod};

#[derive(Debug, Clone)]
pub enum SearchField {
    /// Raw field text.
    Field(String),
    /// Boolean field rendered as one of two words, so "verified" matches.
    Flag {
        field: String,
        when_true: String,
        when_false: String,
    },
}

impl SearchField {
    fn render(&self, row: &Row) -> String {
        match self {
            SearchField::Field(field) => row.text(field),
            SearchField::Flag {
                field,
                when_true,
                when_false,
            } => match row.get_bool(field) {
                Some(true) => when_true.clone(),
                Some(false) => when_false.clone(),
                None => String::new(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterScope {
    /// Sent as a query argument; changing it refetches.
    Server,
    /// Applied to the loaded rows only.
    Local,
}

#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub selector: String,
    /// Query argument name for server filters, row field for local ones.
    pub field: String,
    pub scope: FilterScope,
}

#[derive(Debug, Clone)]
pub enum ActionTarget {
    /// `<path>/<row key>`
    PathSegment,
    /// `<path>?<name>=<row key>`
    QueryParam(String),
}

#[derive(Debug, Clone)]
pub enum PatchSource {
    /// Copied from the named field of the server response; skipped when absent.
    Response(String),
    Constant(Value),
}

#[derive(Debug, Clone)]
pub struct FieldPatch {
    pub field: String,
    pub source: PatchSource,
}

impl FieldPatch {
    pub fn from_response(field: impl Into<String>, response_field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            source: PatchSource::Response(response_field.into()),
        }
    }

    pub fn constant(field: impl Into<String>, value: Value) -> Self {
        Self {
            field: field.into(),
            source: PatchSource::Constant(value),
        }
    }
}

pub type SuccessMessage = fn(&RowKey, &Value) -> String;

#[derive(Debug, Clone)]
pub struct ActionSpec {
    pub name: String,
    pub label: String,
    pub method: HttpMethod,
    pub path: String,
    pub target: ActionTarget,
    pub patch: Vec<FieldPatch>,
    pub success_message: SuccessMessage,
}

impl ActionSpec {
    pub fn request(&self, row_key: &RowKey, payload: &Value) -> ActionRequest {
        let (segment, query) = match &self.target {
            ActionTarget::PathSegment => (Some(row_key.to_string()), Vec::new()),
            ActionTarget::QueryParam(name) => (None, vec![(name.clone(), row_key.to_string())]),
        };
        let body = match payload {
            Value::Object(fields) if !fields.is_empty() && self.method != HttpMethod::Get => {
                Some(payload.clone())
            }
            _ => None,
        };
        ActionRequest {
            method: self.method,
            path: self.path.clone(),
            segment,
            query,
            body,
        }
    }

    pub fn patch_for(&self, response: &Value) -> Map<String, Value> {
        let mut patch = Map::new();
        for rule in &self.patch {
            let value = match &rule.source {
                PatchSource::Response(name) => response.get(name).cloned(),
                PatchSource::Constant(value) => Some(value.clone()),
            };
            if let Some(value) = value {
                patch.insert(rule.field.clone(), value);
            }
        }
        patch
    }
}

/// Collection-level job that runs server-side and is followed by a reload.
#[derive(Debug, Clone)]
pub struct BatchSpec {
    pub name: String,
    pub label: String,
    pub path: String,
    pub success_message: String,
}

#[derive(Debug, Clone)]
pub struct ViewBinding {
    pub name: String,
    pub endpoint: String,
    pub key_field: String,
    pub search_fields: Vec<SearchField>,
    pub filters: Vec<FilterSpec>,
    pub sort_field: Option<String>,
    pub actions: Vec<ActionSpec>,
    pub batches: Vec<BatchSpec>,
    pub default_params: QueryParams,
}

impl ViewBinding {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        key_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            key_field: key_field.into(),
            search_fields: Vec::new(),
            filters: Vec::new(),
            sort_field: None,
            actions: Vec::new(),
            batches: Vec::new(),
            default_params: QueryParams::default(),
        }
    }

    pub fn search(mut self, field: impl Into<String>) -> Self {
        self.search_fields.push(SearchField::Field(field.into()));
        self
    }

    pub fn search_flag(
        mut self,
        field: impl Into<String>,
        when_true: impl Into<String>,
        when_false: impl Into<String>,
    ) -> Self {
        self.search_fields.push(SearchField::Flag {
            field: field.into(),
            when_true: when_true.into(),
            when_false: when_false.into(),
        });
        self
    }

    pub fn server_filter(mut self, selector: impl Into<String>, query_arg: impl Into<String>) -> Self {
        self.filters.push(FilterSpec {
            selector: selector.into(),
            field: query_arg.into(),
            scope: FilterScope::Server,
        });
        self
    }

    pub fn local_filter(mut self, selector: impl Into<String>, field: impl Into<String>) -> Self {
        self.filters.push(FilterSpec {
            selector: selector.into(),
            field: field.into(),
            scope: FilterScope::Local,
        });
        self
    }

    pub fn sort_by(mut self, timestamp_field: impl Into<String>) -> Self {
        self.sort_field = Some(timestamp_field.into());
        self
    }

    pub fn action(mut self, action: ActionSpec) -> Self {
        self.actions.push(action);
        self
    }

    pub fn batch(mut self, batch: BatchSpec) -> Self {
        self.batches.push(batch);
        self
    }

    pub fn with_default_params(mut self, params: QueryParams) -> Self {
        self.default_params = params;
        self
    }

    pub fn find_action(&self, name: &str) -> Option<&ActionSpec> {
        self.actions.iter().find(|action| action.name == name)
    }

    pub fn find_batch(&self, name: &str) -> Option<&BatchSpec> {
        self.batches.iter().find(|batch| batch.name == name)
    }

    /// Query arguments derived from the server-side filters of `params`.
    pub fn server_query(&self, params: &QueryParams) -> Vec<(String, String)> {
        self.filters
            .iter()
            .filter(|spec| spec.scope == FilterScope::Server)
            .filter_map(|spec| {
                params
                    .filter(&spec.selector)
                    .query_value()
                    .map(|value| (spec.field.clone(), value.to_string()))
            })
            .collect()
    }

    pub fn collection_request(&self, params: &QueryParams) -> CollectionRequest {
        CollectionRequest {
            path: self.endpoint.clone(),
            query: self.server_query(params),
        }
    }

    pub fn local_filters(&self) -> impl Iterator<Item = &FilterSpec> {
        self.filters
            .iter()
            .filter(|spec| spec.scope == FilterScope::Local)
    }

    /// Space-joined searchable text of a row.
    pub fn search_text(&self, row: &Row) -> String {
        self.search_fields
            .iter()
            .map(|field| field.render(row))
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn filter_selectors(&self) -> Vec<(&str, TriState)> {
        self.filters
            .iter()
            .map(|spec| (spec.selector.as_str(), self.default_params.filter(&spec.selector)))
            .collect()
    }
}
