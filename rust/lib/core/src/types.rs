use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

/// Window parameters for list/query operations.
///
/// The list endpoints take only a window; filtering happens through each
/// endpoint's own query fields (status, process type, drawing number, ...).
#[derive(Debug, Clone, Deserialize)]
pub struct ListParams {
    /// Maximum number of results to return.
    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Offset for pagination.
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: default_limit(),
            offset: 0,
        }
    }
}

/// Result wrapper for list operations.
#[derive(Debug, Clone, Serialize)]
pub struct ListResult<T: Serialize> {
    pub items: Vec<T>,
    pub total: usize,
}

/// Generate a new random ID (UUIDv4, no dashes).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string().replace('-', "")
}

/// Get the current time as an RFC 3339 string.
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Apply a JSON merge-patch (RFC 7386) to a record.
///
/// `protected` names the wire-format fields a patch may never touch —
/// identity columns like a machine's `code` or an order's `drawingNumber`,
/// and state the scheduler owns (`state`, `isOccupied`, `version`). They
/// are stripped from the patch before merging, and `updateAt` is stamped
/// with the current time. A `null` value removes a field; nested objects
/// merge recursively.
pub fn apply_patch<T: Serialize + DeserializeOwned>(
    current: &T,
    patch: serde_json::Value,
    protected: &[&str],
) -> Result<T, ServiceError> {
    let mut json =
        serde_json::to_value(current).map_err(|e| ServiceError::Internal(e.to_string()))?;

    let mut patch = patch;
    if let Some(obj) = patch.as_object_mut() {
        for field in protected {
            obj.remove(*field);
        }
        obj.insert("updateAt".into(), serde_json::json!(now_rfc3339()));
    }

    merge_patch(&mut json, &patch);
    serde_json::from_value(json)
        .map_err(|e| ServiceError::Validation(format!("invalid patch: {e}")))
}

fn merge_patch(base: &mut serde_json::Value, patch: &serde_json::Value) {
    if let (Some(base_obj), Some(patch_obj)) = (base.as_object_mut(), patch.as_object()) {
        for (key, value) in patch_obj {
            if value.is_null() {
                base_obj.remove(key);
            } else if value.is_object() {
                let entry = base_obj
                    .entry(key.clone())
                    .or_insert_with(|| serde_json::Value::Object(serde_json::Map::new()));
                merge_patch(entry, value);
            } else {
                base_obj.insert(key.clone(), value.clone());
            }
        }
    } else {
        *base = patch.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Record {
        code: String,
        state: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        update_at: Option<String>,
    }

    fn record() -> Record {
        Record {
            code: "F1".into(),
            state: "FREE".into(),
            display_name: Some("Hermle C22".into()),
            update_at: None,
        }
    }

    #[test]
    fn ids_are_dashless_uuids() {
        let id = new_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn timestamps_are_rfc3339() {
        let ts = now_rfc3339();
        assert!(ts.contains('T'));
    }

    #[test]
    fn patch_sets_fields_and_stamps_update_at() {
        let patched: Record = apply_patch(
            &record(),
            serde_json::json!({"displayName": "Hermle C32"}),
            &["code", "state"],
        )
        .unwrap();
        assert_eq!(patched.display_name.as_deref(), Some("Hermle C32"));
        assert!(patched.update_at.is_some());
        assert_eq!(patched.code, "F1");
    }

    #[test]
    fn patch_cannot_touch_protected_fields() {
        let patched: Record = apply_patch(
            &record(),
            serde_json::json!({"code": "F9", "state": "OCCUPIED"}),
            &["code", "state"],
        )
        .unwrap();
        assert_eq!(patched.code, "F1");
        assert_eq!(patched.state, "FREE");
    }

    #[test]
    fn null_removes_a_field() {
        let patched: Record =
            apply_patch(&record(), serde_json::json!({"displayName": null}), &["code"]).unwrap();
        assert!(patched.display_name.is_none());
    }

    #[test]
    fn invalid_patch_is_a_validation_error() {
        let err = apply_patch::<Record>(
            &record(),
            serde_json::json!({"state": 42}),
            &["code"],
        )
        .unwrap_err();
        assert!(matches!(err, ServiceError::Validation(_)));
    }

    #[test]
    fn default_list_window() {
        let params: ListParams = serde_json::from_str("{}").unwrap();
        assert_eq!(params.limit, 50);
        assert_eq!(params.offset, 0);
    }
}
