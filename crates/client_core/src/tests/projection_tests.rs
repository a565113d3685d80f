use serde_json::{json, Value};
use shared::domain::TriState;

use super::*;

fn rows(values: Value) -> Vec<Arc<Row>> {
    let parsed: Vec<Row> = serde_json::from_value(values).expect("rows");
    parsed.into_iter().map(Arc::new).collect()
}

fn ids(rows: &[Arc<Row>]) -> Vec<String> {
    rows.iter().map(|row| row.text("id")).collect()
}

fn ip_binding() -> ViewBinding {
    ViewBinding::new("ips", "/ips", "id")
        .search("id")
        .search("remarks")
        .search_flag("is_suspicious", "suspicious", "normal")
        .local_filter("suspicious", "is_suspicious")
}

#[test]
fn free_text_query_matches_key_text() {
    let all = rows(json!([
        {"id": 1, "is_suspicious": true},
        {"id": 2, "is_suspicious": false},
    ]));
    let visible = visible_rows(&ip_binding(), &all, &QueryParams::default().with_search("2"));
    assert_eq!(ids(&visible), vec!["2"]);
    assert!(Arc::ptr_eq(&visible[0], &all[1]));
}

#[test]
fn search_is_trimmed_and_case_insensitive() {
    let all = rows(json!([
        {"id": 1, "remarks": "VPN exit node"},
        {"id": 2, "remarks": "home broadband"},
    ]));
    let visible = visible_rows(&ip_binding(), &all, &QueryParams::default().with_search("  vpn "));
    assert_eq!(ids(&visible), vec!["1"]);
}

#[test]
fn empty_search_keeps_every_row_in_order() {
    let all = rows(json!([{"id": 3}, {"id": 1}, {"id": 2}]));
    let visible = visible_rows(&ip_binding(), &all, &QueryParams::default().with_search("   "));
    assert_eq!(ids(&visible), vec!["3", "1", "2"]);
}

#[test]
fn flag_words_are_searchable() {
    let all = rows(json!([
        {"id": 1, "is_suspicious": true},
        {"id": 2, "is_suspicious": false},
    ]));
    let visible = visible_rows(&ip_binding(), &all, &QueryParams::default().with_search("normal"));
    assert_eq!(ids(&visible), vec!["2"]);
}

#[test]
fn local_filter_applies_after_search() {
    let all = rows(json!([
        {"id": 10, "is_suspicious": true},
        {"id": 11, "is_suspicious": false},
        {"id": 12, "is_suspicious": true},
        {"id": 20},
    ]));
    let params = QueryParams::default()
        .with_search("1")
        .with_filter("suspicious", TriState::Only(true));
    assert_eq!(ids(&visible_rows(&ip_binding(), &all, &params)), vec!["10", "12"]);

    let params = QueryParams::default().with_filter("suspicious", TriState::Only(false));
    assert_eq!(ids(&visible_rows(&ip_binding(), &all, &params)), vec!["11"]);
}

#[test]
fn sorts_by_timestamp_with_undated_rows_last() {
    let binding = ViewBinding::new("logs", "/logs", "id").sort_by("created_at");
    let all = rows(json!([
        {"id": 1, "created_at": "2025-01-02T10:00:00Z"},
        {"id": 2, "created_at": "not a date"},
        {"id": 3, "created_at": "2025-03-01T08:30:00.123456"},
        {"id": 4, "created_at": "2024-12-31T23:59:59+02:00"},
    ]));

    let newest = visible_rows(
        &binding,
        &all,
        &QueryParams::default().with_sort(SortDirection::NewestFirst),
    );
    assert_eq!(ids(&newest), vec!["3", "1", "4", "2"]);

    let oldest = visible_rows(
        &binding,
        &all,
        &QueryParams::default().with_sort(SortDirection::OldestFirst),
    );
    assert_eq!(ids(&oldest), vec!["4", "1", "3", "2"]);

    let unsorted = visible_rows(&binding, &all, &QueryParams::default());
    assert_eq!(ids(&unsorted), vec!["1", "2", "3", "4"]);
}

#[test]
fn parses_naive_timestamps_as_utc() {
    let row: Row = serde_json::from_value(json!({"at": "2025-05-06 07:08:09"})).expect("row");
    let parsed = timestamp(&row, "at").expect("timestamp");
    assert_eq!(parsed.to_rfc3339(), "2025-05-06T07:08:09+00:00");
    assert!(timestamp(&row, "missing").is_none());
}
