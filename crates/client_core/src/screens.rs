//! Anti-fraud admin screens, each a binding of the generic list view.

use serde_json::{json, Value};
use shared::{
    domain::{QueryParams, RowKey, SortDirection},
    protocol::{MarkSafeResponse, VerifyUserResponse},
};

use crate::{
    binding::{ActionSpec, ActionTarget, BatchSpec, FieldPatch, ViewBinding},
    error::ControllerError,
    transport::HttpMethod,
};

pub const FLAGGED_TRANSACTIONS: &str = "flagged-transactions";
pub const IP_LOGS: &str = "ip-logs";
pub const TRUST_LOGS: &str = "trust-logs";
pub const USER_PROFILES: &str = "user-profiles";
pub const CONNECTED_IPS: &str = "connected-ips";

pub const MARK_SAFE: &str = "mark-safe";
pub const VERIFY: &str = "verify";
pub const CHECK_TRANSACTIONS: &str = "check";
pub const TABULATE_TRUST: &str = "tabulate";

pub const MARKED_SAFE_REMARK: &str = "Marked safe after review";

pub fn flagged_transactions() -> ViewBinding {
    ViewBinding::new(
        FLAGGED_TRANSACTIONS,
        "/transaction/flagged_transactions",
        "flagged_transaction_id",
    )
    .search("flagged_transaction_id")
    .search("transaction_ids")
    .search("reason")
    .server_filter("resolved", "resolved")
    .batch(BatchSpec {
        name: CHECK_TRANSACTIONS.into(),
        label: "Refresh".into(),
        path: "/transaction/check_transactions".into(),
        success_message: "Batch processing completed, flagged transactions updated.".into(),
    })
}

pub fn ip_logs() -> ViewBinding {
    ViewBinding::new(IP_LOGS, "/ip/ip_logs", "id")
        .search("id")
        .search("user_id")
        .search("ip_address")
        .search("country")
        .search("region")
        .search("city")
        .search("remarks")
        .server_filter("suspicious", "suspicious")
        .sort_by("checked_at")
        .action(ActionSpec {
            name: MARK_SAFE.into(),
            label: "Mark safe".into(),
            method: HttpMethod::Put,
            path: "/ip/mark_safe".into(),
            target: ActionTarget::PathSegment,
            patch: vec![
                FieldPatch::constant("is_suspicious", json!(false)),
                FieldPatch::constant("remarks", json!(MARKED_SAFE_REMARK)),
            ],
            success_message: mark_safe_message,
        })
}

pub fn trust_logs() -> ViewBinding {
    ViewBinding::new(TRUST_LOGS, "/trust_log/trust_logs", "id")
        .search("id")
        .search("user_id")
        .search("added_trust")
        .search("remarks")
        .sort_by("created_at")
        .with_default_params(QueryParams::default().with_sort(SortDirection::NewestFirst))
}

pub fn user_profiles() -> ViewBinding {
    ViewBinding::new(USER_PROFILES, "/user/user_profiles", "user_id")
        .search("user_id")
        .search("created_at")
        .search_flag("is_verified", "verified", "not verified")
        .search("last_ip")
        .search("trust_score")
        .search("transaction_limit")
        .action(ActionSpec {
            name: VERIFY.into(),
            label: "Verify".into(),
            method: HttpMethod::Get,
            path: "/user/verify".into(),
            target: ActionTarget::QueryParam("user_id".into()),
            patch: vec![
                FieldPatch::from_response("is_verified", "verified"),
                FieldPatch::from_response("trust_score", "new_trust"),
            ],
            success_message: verify_message,
        })
        .batch(BatchSpec {
            name: TABULATE_TRUST.into(),
            label: "Batch".into(),
            path: "/trust_log/tabulate_trust".into(),
            success_message: "Batch completed: trust scores & transaction limits recalculated."
                .into(),
        })
}

pub fn connected_ips() -> ViewBinding {
    ViewBinding::new(CONNECTED_IPS, "/ip/current_connected_ips", "id")
        .search("id")
        .search("ip_address")
        .search("user_ids")
        .search_flag("is_suspicious", "suspicious", "normal")
        .local_filter("suspicious", "is_suspicious")
}

pub fn all() -> Vec<ViewBinding> {
    vec![
        flagged_transactions(),
        ip_logs(),
        trust_logs(),
        user_profiles(),
        connected_ips(),
    ]
}

pub fn by_name(name: &str) -> Result<ViewBinding, ControllerError> {
    all()
        .into_iter()
        .find(|binding| binding.name == name)
        .ok_or_else(|| ControllerError::UnknownScreen(name.to_string()))
}

fn mark_safe_message(row_key: &RowKey, response: &Value) -> String {
    match serde_json::from_value::<MarkSafeResponse>(response.clone()) {
        Ok(MarkSafeResponse {
            message: Some(message),
            ..
        }) => format!("IP log {row_key} marked safe: {message}."),
        _ => format!("IP log {row_key} marked safe."),
    }
}

fn verify_message(row_key: &RowKey, response: &Value) -> String {
    let Ok(parsed) = serde_json::from_value::<VerifyUserResponse>(response.clone()) else {
        return format!("User {row_key} status unchanged.");
    };
    let status = if parsed.verified {
        "verified"
    } else {
        "status unchanged"
    };
    match parsed.new_trust {
        Some(trust) => format!("User {row_key} {status} (trust → {trust})."),
        None => format!("User {row_key} {status}."),
    }
}
