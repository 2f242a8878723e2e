use std::sync::Arc;

use planwerk_core::{retry_read, ServiceError};
use planwerk_sql::{Row, SQLStore, Value};

use crate::model::{Machine, MachineType, Operator};

/// SQL schema for the shop tables.
///
/// Each table stores the full JSON document in a `data` TEXT column, with
/// indexed columns extracted for filtering and the CAS predicates.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS machines (
    code        TEXT PRIMARY KEY,
    data        TEXT NOT NULL,
    type        TEXT NOT NULL,
    axes        INTEGER NOT NULL,
    is_active   INTEGER NOT NULL,
    state       TEXT NOT NULL,
    is_occupied INTEGER NOT NULL,
    version     INTEGER NOT NULL,
    create_at   TEXT,
    update_at   TEXT
);
CREATE INDEX IF NOT EXISTS idx_machine_state ON machines(state);
CREATE INDEX IF NOT EXISTS idx_machine_type ON machines(type);

CREATE TABLE IF NOT EXISTS operators (
    id          TEXT PRIMARY KEY,
    data        TEXT NOT NULL,
    name        TEXT NOT NULL,
    type        TEXT NOT NULL,
    create_at   TEXT
);
CREATE INDEX IF NOT EXISTS idx_operator_type ON operators(type);
";

/// Filters for machine listings.
#[derive(Debug, Default, Clone)]
pub struct MachineFilters {
    pub machine_type: Option<MachineType>,
    pub active: Option<bool>,
    /// Active and FREE — the scheduler's availability predicate.
    pub available: Option<bool>,
    pub min_axes: Option<u32>,
}

/// Persistent storage for machines and operators, backed by SQLStore.
pub struct ShopStore {
    db: Arc<dyn SQLStore>,
}

impl ShopStore {
    /// Create a new ShopStore and initialise the schema.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("shop schema init: {e}")))?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Machines
    // -----------------------------------------------------------------------

    /// Insert a new machine. Duplicate codes are a Conflict.
    pub fn insert_machine(&self, machine: &Machine) -> Result<(), ServiceError> {
        let data = serde_json::to_string(machine)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        self.db
            .exec(
                "INSERT INTO machines \
                 (code, data, type, axes, is_active, state, is_occupied, version, create_at, update_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                &[
                    Value::Text(machine.code.clone()),
                    Value::Text(data),
                    Value::Text(machine.machine_type.as_str().to_string()),
                    Value::Integer(machine.axes as i64),
                    Value::from_bool(machine.is_active),
                    Value::Text(machine.state.as_str().to_string()),
                    Value::from_bool(machine.is_occupied),
                    Value::Integer(machine.version),
                    opt_text(&machine.create_at),
                    opt_text(&machine.update_at),
                ],
            )
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE constraint") {
                    ServiceError::Conflict(format!("machine '{}' already exists", machine.code))
                } else {
                    ServiceError::Storage(msg)
                }
            })?;

        Ok(())
    }

    /// Get a machine by code.
    pub fn get_machine(&self, code: &str) -> Result<Machine, ServiceError> {
        retry_read("machine", || {
            let rows = self
                .db
                .query(
                    "SELECT data FROM machines WHERE code = ?1",
                    &[Value::Text(code.to_string())],
                )
                .map_err(|e| ServiceError::Storage(e.to_string()))?;

            let row = rows
                .first()
                .ok_or_else(|| ServiceError::NotFound(format!("machine {code}")))?;

            row_to_machine(row)
        })
    }

    /// List machines, ordered by code ascending for determinism.
    pub fn list_machines(&self, filters: &MachineFilters) -> Result<Vec<Machine>, ServiceError> {
        let mut where_clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        let mut idx = 1;

        if let Some(t) = filters.machine_type {
            where_clauses.push(format!("type = ?{idx}"));
            params.push(Value::Text(t.as_str().to_string()));
            idx += 1;
        }
        if let Some(active) = filters.active {
            where_clauses.push(format!("is_active = ?{idx}"));
            params.push(Value::from_bool(active));
            idx += 1;
        }
        if filters.available == Some(true) {
            where_clauses.push("is_active = 1 AND state = 'FREE'".to_string());
        }
        if let Some(axes) = filters.min_axes {
            where_clauses.push(format!("axes >= ?{idx}"));
            params.push(Value::Integer(axes as i64));
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        retry_read("machines", || {
            let rows = self
                .db
                .query(
                    &format!("SELECT data FROM machines {where_sql} ORDER BY code ASC"),
                    &params,
                )
                .map_err(|e| ServiceError::Storage(e.to_string()))?;

            rows.iter().map(row_to_machine).collect()
        })
    }

    /// Machines eligible for an assignment: active, FREE, enough axes,
    /// matching process. Ordered by code ascending.
    pub fn list_available(
        &self,
        required_axes: u32,
        required_type: MachineType,
    ) -> Result<Vec<Machine>, ServiceError> {
        self.list_machines(&MachineFilters {
            machine_type: Some(required_type),
            available: Some(true),
            min_axes: Some(required_axes),
            ..Default::default()
        })
    }

    /// Compare-and-swap update of a machine row.
    ///
    /// `machine.version` is the version the caller read; on success the row
    /// (and returned document) carry `version + 1`. Returns `None` when the
    /// row changed under the caller — the CAS that keeps two concurrent
    /// reservation attempts from both winning.
    pub fn cas_update(&self, machine: &Machine) -> Result<Option<Machine>, ServiceError> {
        let mut after = machine.clone();
        after.version = machine.version + 1;
        after.is_occupied = after.state == crate::model::MachineState::Occupied;
        after.update_at = Some(planwerk_core::now_rfc3339());

        let data = serde_json::to_string(&after)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let affected = self
            .db
            .exec(
                "UPDATE machines SET data = ?1, type = ?2, axes = ?3, is_active = ?4, \
                 state = ?5, is_occupied = ?6, version = ?7, update_at = ?8 \
                 WHERE code = ?9 AND version = ?10",
                &[
                    Value::Text(data),
                    Value::Text(after.machine_type.as_str().to_string()),
                    Value::Integer(after.axes as i64),
                    Value::from_bool(after.is_active),
                    Value::Text(after.state.as_str().to_string()),
                    Value::from_bool(after.is_occupied),
                    Value::Integer(after.version),
                    opt_text(&after.update_at),
                    Value::Text(after.code.clone()),
                    Value::Integer(machine.version),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        Ok(if affected > 0 { Some(after) } else { None })
    }

    // -----------------------------------------------------------------------
    // Operators
    // -----------------------------------------------------------------------

    pub fn insert_operator(&self, operator: &Operator) -> Result<(), ServiceError> {
        let data = serde_json::to_string(operator)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        self.db
            .exec(
                "INSERT INTO operators (id, data, name, type, create_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                &[
                    Value::Text(operator.id.clone()),
                    Value::Text(data),
                    Value::Text(operator.name.clone()),
                    Value::Text(operator.operator_type.as_str().to_string()),
                    opt_text(&operator.create_at),
                ],
            )
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE constraint") {
                    ServiceError::Conflict(format!("operator '{}' already exists", operator.id))
                } else {
                    ServiceError::Storage(msg)
                }
            })?;

        Ok(())
    }

    pub fn get_operator(&self, id: &str) -> Result<Operator, ServiceError> {
        retry_read("operator", || {
            let rows = self
                .db
                .query(
                    "SELECT data FROM operators WHERE id = ?1",
                    &[Value::Text(id.to_string())],
                )
                .map_err(|e| ServiceError::Storage(e.to_string()))?;

            let row = rows
                .first()
                .ok_or_else(|| ServiceError::NotFound(format!("operator {id}")))?;

            row_to_operator(row)
        })
    }

    pub fn list_operators(&self) -> Result<Vec<Operator>, ServiceError> {
        retry_read("operators", || {
            let rows = self
                .db
                .query("SELECT data FROM operators ORDER BY name ASC", &[])
                .map_err(|e| ServiceError::Storage(e.to_string()))?;

            rows.iter().map(row_to_operator).collect()
        })
    }

    pub fn update_operator(&self, operator: &Operator) -> Result<(), ServiceError> {
        let data = serde_json::to_string(operator)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        let affected = self
            .db
            .exec(
                "UPDATE operators SET data = ?1, name = ?2, type = ?3 WHERE id = ?4",
                &[
                    Value::Text(data),
                    Value::Text(operator.name.clone()),
                    Value::Text(operator.operator_type.as_str().to_string()),
                    Value::Text(operator.id.clone()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        if affected == 0 {
            return Err(ServiceError::NotFound(format!("operator {}", operator.id)));
        }
        Ok(())
    }
}

/// Deserialize a Machine from a row's `data` JSON column.
fn row_to_machine(row: &Row) -> Result<Machine, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json)
        .map_err(|e| ServiceError::Storage(format!("bad machine json: {e}")))
}

/// Deserialize an Operator from a row's `data` JSON column.
fn row_to_operator(row: &Row) -> Result<Operator, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json)
        .map_err(|e| ServiceError::Storage(format!("bad operator json: {e}")))
}

fn opt_text(v: &Option<String>) -> Value {
    match v {
        Some(s) => Value::Text(s.clone()),
        None => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MachineState, OperatorType};
    use planwerk_core::now_rfc3339;
    use planwerk_sql::SqliteStore;

    fn test_store() -> ShopStore {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        ShopStore::new(db).unwrap()
    }

    fn make_machine(code: &str, machine_type: MachineType, axes: u32) -> Machine {
        Machine {
            code: code.into(),
            machine_type,
            axes,
            is_active: true,
            state: MachineState::Free,
            is_occupied: false,
            version: 0,
            display_name: None,
            description: None,
            create_at: Some(now_rfc3339()),
            update_at: None,
        }
    }

    #[test]
    fn insert_and_get_machine() {
        let store = test_store();
        store
            .insert_machine(&make_machine("F1", MachineType::Milling, 3))
            .unwrap();

        let got = store.get_machine("F1").unwrap();
        assert_eq!(got.code, "F1");
        assert_eq!(got.axes, 3);
        assert_eq!(got.state, MachineState::Free);
    }

    #[test]
    fn duplicate_code_conflicts() {
        let store = test_store();
        store
            .insert_machine(&make_machine("F1", MachineType::Milling, 3))
            .unwrap();
        let err = store
            .insert_machine(&make_machine("F1", MachineType::Milling, 4))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn list_available_orders_by_code() {
        let store = test_store();
        store
            .insert_machine(&make_machine("F3", MachineType::Milling, 4))
            .unwrap();
        store
            .insert_machine(&make_machine("F1", MachineType::Milling, 3))
            .unwrap();
        store
            .insert_machine(&make_machine("T1", MachineType::Turning, 3))
            .unwrap();

        let available = store.list_available(3, MachineType::Milling).unwrap();
        let codes: Vec<_> = available.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, vec!["F1", "F3"]);
    }

    #[test]
    fn list_available_excludes_inactive_and_non_free() {
        let store = test_store();
        let mut inactive = make_machine("F1", MachineType::Milling, 3);
        inactive.is_active = false;
        store.insert_machine(&inactive).unwrap();

        let mut reserved = make_machine("F2", MachineType::Milling, 3);
        reserved.state = MachineState::Reserved;
        store.insert_machine(&reserved).unwrap();

        store
            .insert_machine(&make_machine("F4", MachineType::Milling, 3))
            .unwrap();

        let available = store.list_available(3, MachineType::Milling).unwrap();
        let codes: Vec<_> = available.iter().map(|m| m.code.as_str()).collect();
        assert_eq!(codes, vec!["F4"]);
    }

    #[test]
    fn cas_update_detects_stale_version() {
        let store = test_store();
        store
            .insert_machine(&make_machine("F1", MachineType::Milling, 3))
            .unwrap();

        let first = store.get_machine("F1").unwrap();
        let second = first.clone();

        let mut winner = first.clone();
        winner.state = MachineState::Reserved;
        let updated = store.cas_update(&winner).unwrap();
        assert!(updated.is_some());
        assert_eq!(updated.unwrap().version, 1);

        // The loser still holds version 0 — its CAS must not apply.
        let mut loser = second;
        loser.state = MachineState::Reserved;
        assert!(store.cas_update(&loser).unwrap().is_none());
    }

    #[test]
    fn cas_update_keeps_occupancy_in_lockstep() {
        let store = test_store();
        store
            .insert_machine(&make_machine("F1", MachineType::Milling, 3))
            .unwrap();

        let mut m = store.get_machine("F1").unwrap();
        m.state = MachineState::Occupied;
        let after = store.cas_update(&m).unwrap().unwrap();
        assert!(after.is_occupied);

        let mut m = store.get_machine("F1").unwrap();
        m.state = MachineState::Free;
        let after = store.cas_update(&m).unwrap().unwrap();
        assert!(!after.is_occupied);
    }

    #[test]
    fn operator_crud() {
        let store = test_store();
        let op = Operator {
            id: "op1".into(),
            name: "Nagy".into(),
            operator_type: OperatorType::Both,
            create_at: Some(now_rfc3339()),
            update_at: None,
        };
        store.insert_operator(&op).unwrap();

        let got = store.get_operator("op1").unwrap();
        assert_eq!(got.name, "Nagy");

        let mut renamed = got.clone();
        renamed.name = "Nagy A.".into();
        store.update_operator(&renamed).unwrap();
        assert_eq!(store.get_operator("op1").unwrap().name, "Nagy A.");

        assert_eq!(store.list_operators().unwrap().len(), 1);
        assert!(matches!(
            store.get_operator("missing").unwrap_err(),
            ServiceError::NotFound(_)
        ));
    }
}
