use std::{cmp::Ordering, sync::Arc};

use chrono::{DateTime, NaiveDateTime, Utc};
use shared::domain::{QueryParams, Row, SortDirection};

use crate::binding::ViewBinding;

/// Rows shown for `params`: free-text search, then local filters, then sort.
/// Rows without a parseable timestamp sort after every dated row, in either
/// direction; ties keep their fetch order.
pub fn visible_rows(
    binding: &ViewBinding,
    rows: &[Arc<Row>],
    params: &QueryParams,
) -> Vec<Arc<Row>> {
    let needle = params.search.trim().to_lowercase();
    let mut visible: Vec<Arc<Row>> = rows
        .iter()
        .filter(|row| needle.is_empty() || binding.search_text(row).to_lowercase().contains(&needle))
        .filter(|row| {
            binding
                .local_filters()
                .all(|spec| params.filter(&spec.selector).matches(row.get_bool(&spec.field)))
        })
        .cloned()
        .collect();

    if let (Some(field), Some(direction)) = (binding.sort_field.as_deref(), params.sort) {
        visible.sort_by(|a, b| compare_timestamps(timestamp(a, field), timestamp(b, field), direction));
    }
    visible
}

fn compare_timestamps(
    a: Option<DateTime<Utc>>,
    b: Option<DateTime<Utc>>,
    direction: SortDirection,
) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => match direction {
            SortDirection::NewestFirst => b.cmp(&a),
            SortDirection::OldestFirst => a.cmp(&b),
        },
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// RFC 3339, or a naive ISO timestamp read as UTC.
pub fn timestamp(row: &Row, field: &str) -> Option<DateTime<Utc>> {
    let raw = row.get(field)?.as_str()?.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
#[path = "tests/projection_tests.rs"]
mod tests;
