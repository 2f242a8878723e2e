use std::sync::Arc;

use tracing::info;

use planwerk_core::{retry_read, ListParams, ListResult, ServiceError};
use planwerk_sql::{Row, SQLStore, Value};

use crate::model::{Order, Shift, ShiftStatus};

/// SQL schema for the plan tables.
///
/// Shifts carry a partial unique index over live rows: the database itself
/// refuses a second RESERVED/OCCUPIED shift for the same machine and date,
/// whatever the application layer believed.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS orders (
    id             TEXT PRIMARY KEY,
    data           TEXT NOT NULL,
    drawing_number TEXT NOT NULL,
    status         TEXT NOT NULL,
    process_type   TEXT NOT NULL,
    create_at      TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_order_drawing ON orders(drawing_number);
CREATE INDEX IF NOT EXISTS idx_order_status ON orders(status);

CREATE TABLE IF NOT EXISTS shifts (
    id             TEXT PRIMARY KEY,
    data           TEXT NOT NULL,
    order_id       TEXT NOT NULL,
    drawing_number TEXT NOT NULL,
    machine_code   TEXT NOT NULL,
    operator_id    TEXT NOT NULL,
    date           TEXT NOT NULL,
    status         TEXT NOT NULL,
    expires_at     TEXT,
    create_at      TEXT NOT NULL
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_shift_machine_date_live
    ON shifts(machine_code, date) WHERE status IN ('RESERVED', 'OCCUPIED');
CREATE INDEX IF NOT EXISTS idx_shift_date ON shifts(date);
CREATE INDEX IF NOT EXISTS idx_shift_status ON shifts(status);
CREATE INDEX IF NOT EXISTS idx_shift_machine ON shifts(machine_code);
";

/// Filters for order listings.
#[derive(Debug, Default, Clone)]
pub struct OrderFilters {
    pub status: Option<String>,
    pub process_type: Option<String>,
    /// Exact drawing-number lookup.
    pub drawing_number: Option<String>,
}

/// Filters for the calendar read path (date range handled separately).
#[derive(Debug, Default, Clone)]
pub struct ShiftFilters {
    pub machine_code: Option<String>,
    pub operator_id: Option<String>,
    pub order_id: Option<String>,
    pub status: Option<String>,
}

/// Persistent storage for orders and shifts, backed by SQLStore (SQLite).
pub struct PlanStore {
    db: Arc<dyn SQLStore>,
}

impl PlanStore {
    /// Create a new PlanStore: upgrade any legacy orders table, then
    /// initialise the schema.
    ///
    /// The legacy upgrade must run first — the unique index on
    /// `drawing_number` only lands once every row carries a value.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        migrate_legacy_orders(db.as_ref())?;
        db.exec_batch(SCHEMA)
            .map_err(|e| ServiceError::Storage(format!("plan schema init: {e}")))?;
        Ok(Self { db })
    }

    // -----------------------------------------------------------------------
    // Orders
    // -----------------------------------------------------------------------

    /// Insert a new order. A duplicate drawing number is a Conflict.
    pub fn insert_order(&self, order: &Order) -> Result<(), ServiceError> {
        let data =
            serde_json::to_string(order).map_err(|e| ServiceError::Internal(e.to_string()))?;

        self.db
            .exec(
                "INSERT INTO orders (id, data, drawing_number, status, process_type, create_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                &[
                    Value::Text(order.id.clone()),
                    Value::Text(data),
                    Value::Text(order.drawing_number.clone()),
                    Value::Text(order.status.as_str().to_string()),
                    Value::Text(order.process_type.as_str().to_string()),
                    Value::Text(order.create_at.clone().unwrap_or_default()),
                ],
            )
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE constraint") {
                    ServiceError::Conflict(format!(
                        "order with drawing number '{}' already exists",
                        order.drawing_number
                    ))
                } else {
                    ServiceError::Storage(msg)
                }
            })?;

        Ok(())
    }

    /// Get an order by ID.
    pub fn get_order(&self, id: &str) -> Result<Order, ServiceError> {
        retry_read("order", || {
            let rows = self
                .db
                .query(
                    "SELECT data FROM orders WHERE id = ?1",
                    &[Value::Text(id.to_string())],
                )
                .map_err(|e| ServiceError::Storage(e.to_string()))?;

            let row = rows
                .first()
                .ok_or_else(|| ServiceError::NotFound(format!("order {id}")))?;

            row_to_order(row)
        })
    }

    /// Get an order by its drawing number.
    pub fn get_order_by_drawing(&self, drawing_number: &str) -> Result<Order, ServiceError> {
        retry_read("order", || {
            let rows = self
                .db
                .query(
                    "SELECT data FROM orders WHERE drawing_number = ?1",
                    &[Value::Text(drawing_number.to_string())],
                )
                .map_err(|e| ServiceError::Storage(e.to_string()))?;

            let row = rows.first().ok_or_else(|| {
                ServiceError::NotFound(format!("order with drawing number {drawing_number}"))
            })?;

            row_to_order(row)
        })
    }

    /// List orders with optional filters and a total count.
    pub fn list_orders(
        &self,
        params: &ListParams,
        filters: &OrderFilters,
    ) -> Result<ListResult<Order>, ServiceError> {
        let limit = params.limit.min(500);
        let offset = params.offset;

        let mut where_clauses: Vec<String> = Vec::new();
        let mut params: Vec<Value> = Vec::new();
        let mut idx = 1;

        if let Some(ref s) = filters.status {
            where_clauses.push(format!("status = ?{idx}"));
            params.push(Value::Text(s.clone()));
            idx += 1;
        }
        if let Some(ref t) = filters.process_type {
            where_clauses.push(format!("process_type = ?{idx}"));
            params.push(Value::Text(t.clone()));
            idx += 1;
        }
        if let Some(ref dn) = filters.drawing_number {
            where_clauses.push(format!("drawing_number = ?{idx}"));
            params.push(Value::Text(dn.clone()));
            idx += 1;
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", where_clauses.join(" AND "))
        };

        retry_read("orders", || {
            let count_sql = format!("SELECT COUNT(*) as cnt FROM orders {where_sql}");
            let count_rows = self
                .db
                .query(&count_sql, &params)
                .map_err(|e| ServiceError::Storage(e.to_string()))?;
            let total = count_rows
                .first()
                .and_then(|r| r.get_i64("cnt"))
                .unwrap_or(0) as usize;

            let select_sql = format!(
                "SELECT data FROM orders {where_sql} ORDER BY create_at DESC LIMIT ?{idx} OFFSET ?{}",
                idx + 1
            );
            let mut select_params = params.clone();
            select_params.push(Value::Integer(limit as i64));
            select_params.push(Value::Integer(offset as i64));

            let rows = self
                .db
                .query(&select_sql, &select_params)
                .map_err(|e| ServiceError::Storage(e.to_string()))?;

            let items = rows
                .iter()
                .map(row_to_order)
                .collect::<Result<Vec<_>, _>>()?;

            Ok(ListResult { items, total })
        })
    }

    /// Update an order (full replacement of the data column + indexed columns).
    pub fn update_order(&self, order: &Order) -> Result<(), ServiceError> {
        let data =
            serde_json::to_string(order).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let affected = self
            .db
            .exec(
                "UPDATE orders SET data = ?1, status = ?2, process_type = ?3 WHERE id = ?4",
                &[
                    Value::Text(data),
                    Value::Text(order.status.as_str().to_string()),
                    Value::Text(order.process_type.as_str().to_string()),
                    Value::Text(order.id.clone()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        if affected == 0 {
            return Err(ServiceError::NotFound(format!("order {}", order.id)));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shifts
    // -----------------------------------------------------------------------

    /// Insert a new shift.
    ///
    /// The partial unique index turns a racing insert for the same
    /// (machine, date) into a Conflict here.
    pub fn insert_shift(&self, shift: &Shift) -> Result<(), ServiceError> {
        let data =
            serde_json::to_string(shift).map_err(|e| ServiceError::Internal(e.to_string()))?;

        self.db
            .exec(
                "INSERT INTO shifts \
                 (id, data, order_id, drawing_number, machine_code, operator_id, date, status, expires_at, create_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                &[
                    Value::Text(shift.id.clone()),
                    Value::Text(data),
                    Value::Text(shift.order_id.clone()),
                    Value::Text(shift.drawing_number.clone()),
                    Value::Text(shift.machine_code.clone()),
                    Value::Text(shift.operator_id.clone()),
                    Value::Text(shift.date.clone()),
                    Value::Text(shift.status.as_str().to_string()),
                    opt_text(&shift.expires_at),
                    Value::Text(shift.create_at.clone()),
                ],
            )
            .map_err(|e| {
                let msg = e.to_string();
                if msg.contains("UNIQUE constraint") {
                    ServiceError::Conflict(format!(
                        "machine '{}' is already scheduled on {}",
                        shift.machine_code, shift.date
                    ))
                } else {
                    ServiceError::Storage(msg)
                }
            })?;

        Ok(())
    }

    /// Get a shift by ID.
    pub fn get_shift(&self, id: &str) -> Result<Shift, ServiceError> {
        retry_read("shift", || {
            let rows = self
                .db
                .query(
                    "SELECT data FROM shifts WHERE id = ?1",
                    &[Value::Text(id.to_string())],
                )
                .map_err(|e| ServiceError::Storage(e.to_string()))?;

            let row = rows
                .first()
                .ok_or_else(|| ServiceError::NotFound(format!("shift {id}")))?;

            row_to_shift(row)
        })
    }

    /// Atomically transition a shift out of `expected`.
    ///
    /// Returns `true` if this caller won the transition, `false` if the row
    /// was no longer in `expected` — the CAS that serializes confirm,
    /// cancel, and expiry racing for the same reservation.
    pub fn cas_shift(&self, shift: &Shift, expected: ShiftStatus) -> Result<bool, ServiceError> {
        let data =
            serde_json::to_string(shift).map_err(|e| ServiceError::Internal(e.to_string()))?;

        let affected = self
            .db
            .exec(
                "UPDATE shifts SET data = ?1, status = ?2, expires_at = ?3 \
                 WHERE id = ?4 AND status = ?5",
                &[
                    Value::Text(data),
                    Value::Text(shift.status.as_str().to_string()),
                    opt_text(&shift.expires_at),
                    Value::Text(shift.id.clone()),
                    Value::Text(expected.as_str().to_string()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        Ok(affected > 0)
    }

    /// Whether a (machine, date) slot is taken by a reserved, occupied, or
    /// historical (released) shift.
    pub fn date_blocked(&self, machine_code: &str, date: &str) -> Result<bool, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT COUNT(*) as cnt FROM shifts \
                 WHERE machine_code = ?1 AND date = ?2 \
                 AND status IN ('RESERVED', 'OCCUPIED', 'RELEASED')",
                &[
                    Value::Text(machine_code.to_string()),
                    Value::Text(date.to_string()),
                ],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) > 0)
    }

    /// Shifts with `date` in `[start, end]` inclusive, ordered by date then
    /// machine code. ISO dates compare lexicographically, so TEXT
    /// comparison is date comparison.
    pub fn list_shifts(
        &self,
        start: &str,
        end: &str,
        filters: &ShiftFilters,
    ) -> Result<Vec<Shift>, ServiceError> {
        let mut where_clauses = vec!["date >= ?1".to_string(), "date <= ?2".to_string()];
        let mut params = vec![Value::Text(start.to_string()), Value::Text(end.to_string())];
        let mut idx = 3;

        if let Some(ref m) = filters.machine_code {
            where_clauses.push(format!("machine_code = ?{idx}"));
            params.push(Value::Text(m.clone()));
            idx += 1;
        }
        if let Some(ref o) = filters.operator_id {
            where_clauses.push(format!("operator_id = ?{idx}"));
            params.push(Value::Text(o.clone()));
            idx += 1;
        }
        if let Some(ref o) = filters.order_id {
            where_clauses.push(format!("order_id = ?{idx}"));
            params.push(Value::Text(o.clone()));
            idx += 1;
        }
        if let Some(ref s) = filters.status {
            where_clauses.push(format!("status = ?{idx}"));
            params.push(Value::Text(s.clone()));
        }

        let sql = format!(
            "SELECT data FROM shifts WHERE {} ORDER BY date ASC, machine_code ASC",
            where_clauses.join(" AND ")
        );

        retry_read("shifts", || {
            let rows = self
                .db
                .query(&sql, &params)
                .map_err(|e| ServiceError::Storage(e.to_string()))?;

            rows.iter().map(row_to_shift).collect()
        })
    }

    /// All RESERVED shifts carrying an expiry (for the watchdog).
    pub fn reserved_shifts(&self) -> Result<Vec<Shift>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT data FROM shifts WHERE status = 'RESERVED' AND expires_at IS NOT NULL",
                &[],
            )
            .map_err(|e| ServiceError::Storage(e.to_string()))?;

        rows.iter().map(row_to_shift).collect()
    }
}

/// Upgrade a pre-planwerk orders table in two phases: add the
/// `drawing_number` column if it is missing, then backfill placeholder
/// values into null/empty rows. Only after that can the unique index in
/// [`SCHEMA`] land.
pub fn migrate_legacy_orders(db: &dyn SQLStore) -> Result<u64, ServiceError> {
    let tables = db
        .query(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'orders'",
            &[],
        )
        .map_err(|e| ServiceError::Storage(e.to_string()))?;
    if tables.is_empty() {
        return Ok(0);
    }

    let columns = db
        .query("PRAGMA table_info(orders)", &[])
        .map_err(|e| ServiceError::Storage(e.to_string()))?;
    let has_column = columns
        .iter()
        .any(|row| row.get_str("name") == Some("drawing_number"));

    if !has_column {
        db.exec("ALTER TABLE orders ADD COLUMN drawing_number TEXT", &[])
            .map_err(|e| ServiceError::Storage(format!("orders upgrade: {e}")))?;
    }

    let legacy = db
        .query(
            "SELECT id, data FROM orders WHERE drawing_number IS NULL OR drawing_number = ''",
            &[],
        )
        .map_err(|e| ServiceError::Storage(e.to_string()))?;

    let mut backfilled = 0u64;
    for row in &legacy {
        let id = row
            .get_str("id")
            .ok_or_else(|| ServiceError::Storage("orders row without id".into()))?;
        let placeholder = format!("DN-LEGACY-{id}");

        let mut doc: serde_json::Value = row
            .get_str("data")
            .and_then(|d| serde_json::from_str(d).ok())
            .unwrap_or_else(|| serde_json::json!({}));
        if let Some(obj) = doc.as_object_mut() {
            obj.insert("drawingNumber".into(), serde_json::json!(placeholder));
        }
        let data = serde_json::to_string(&doc)
            .map_err(|e| ServiceError::Internal(e.to_string()))?;

        db.exec(
            "UPDATE orders SET drawing_number = ?1, data = ?2 WHERE id = ?3",
            &[
                Value::Text(placeholder),
                Value::Text(data),
                Value::Text(id.to_string()),
            ],
        )
        .map_err(|e| ServiceError::Storage(format!("orders backfill: {e}")))?;
        backfilled += 1;
    }

    if backfilled > 0 {
        info!("backfilled {backfilled} legacy orders with placeholder drawing numbers");
    }

    Ok(backfilled)
}

/// Deserialize an Order from a row's `data` JSON column.
fn row_to_order(row: &Row) -> Result<Order, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad order json: {e}")))
}

/// Deserialize a Shift from a row's `data` JSON column.
fn row_to_shift(row: &Row) -> Result<Shift, ServiceError> {
    let json = row
        .get_str("data")
        .ok_or_else(|| ServiceError::Storage("missing data column".into()))?;
    serde_json::from_str(json).map_err(|e| ServiceError::Storage(format!("bad shift json: {e}")))
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
    use crate::model::OrderStatus;
    use planwerk_core::{new_id, now_rfc3339};
    use planwerk_sql::SqliteStore;
    use shop::model::MachineType;

    fn test_store() -> PlanStore {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        PlanStore::new(db).unwrap()
    }

    fn make_order(drawing_number: &str) -> Order {
        Order {
            id: new_id(),
            drawing_number: drawing_number.into(),
            name: None,
            process_type: MachineType::Milling,
            spec: "3-axis milling".into(),
            status: OrderStatus::Intake,
            customer: None,
            description: None,
            create_at: Some(now_rfc3339()),
            update_at: None,
        }
    }

    fn make_shift(machine: &str, date: &str, status: ShiftStatus) -> Shift {
        Shift {
            id: new_id(),
            order_id: "o1".into(),
            drawing_number: "DRW-1".into(),
            machine_code: machine.into(),
            operator_id: "op1".into(),
            date: date.into(),
            status,
            expires_at: None,
            create_at: now_rfc3339(),
            confirmed_at: None,
            released_at: None,
        }
    }

    #[test]
    fn order_roundtrip_by_drawing_number() {
        let store = test_store();
        let order = make_order("DRW-2024-0117");
        store.insert_order(&order).unwrap();

        let got = store.get_order_by_drawing("DRW-2024-0117").unwrap();
        assert_eq!(got, order);
    }

    #[test]
    fn duplicate_drawing_number_conflicts() {
        let store = test_store();
        store.insert_order(&make_order("DRW-1")).unwrap();
        let err = store.insert_order(&make_order("DRW-1")).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));
    }

    #[test]
    fn list_orders_filters_by_status() {
        let store = test_store();
        store.insert_order(&make_order("DRW-1")).unwrap();
        let mut done = make_order("DRW-2");
        done.status = OrderStatus::Done;
        store.insert_order(&done).unwrap();

        let result = store
            .list_orders(
                &ListParams::default(),
                &OrderFilters {
                    status: Some("INTAKE".into()),
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.items[0].drawing_number, "DRW-1");
    }

    #[test]
    fn live_shifts_are_unique_per_machine_and_date() {
        let store = test_store();
        store
            .insert_shift(&make_shift("F1", "2024-03-15", ShiftStatus::Reserved))
            .unwrap();

        let err = store
            .insert_shift(&make_shift("F1", "2024-03-15", ShiftStatus::Reserved))
            .unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)));

        // A different date or machine is fine.
        store
            .insert_shift(&make_shift("F1", "2024-03-16", ShiftStatus::Reserved))
            .unwrap();
        store
            .insert_shift(&make_shift("F2", "2024-03-15", ShiftStatus::Reserved))
            .unwrap();
    }

    #[test]
    fn cas_shift_single_winner() {
        let store = test_store();
        let shift = make_shift("F1", "2024-03-15", ShiftStatus::Reserved);
        store.insert_shift(&shift).unwrap();

        let mut confirmed = shift.clone();
        confirmed.status = ShiftStatus::Occupied;
        assert!(store.cas_shift(&confirmed, ShiftStatus::Reserved).unwrap());

        // Second transition out of RESERVED loses.
        let mut cancelled = shift.clone();
        cancelled.status = ShiftStatus::Cancelled;
        assert!(!store.cas_shift(&cancelled, ShiftStatus::Reserved).unwrap());

        assert_eq!(store.get_shift(&shift.id).unwrap().status, ShiftStatus::Occupied);
    }

    #[test]
    fn date_blocked_semantics() {
        let store = test_store();
        store
            .insert_shift(&make_shift("F1", "2024-03-15", ShiftStatus::Released))
            .unwrap();
        store
            .insert_shift(&make_shift("F2", "2024-03-15", ShiftStatus::Cancelled))
            .unwrap();

        // Released history blocks the slot; cancelled does not.
        assert!(store.date_blocked("F1", "2024-03-15").unwrap());
        assert!(!store.date_blocked("F2", "2024-03-15").unwrap());
        assert!(!store.date_blocked("F1", "2024-03-16").unwrap());
    }

    #[test]
    fn list_shifts_inclusive_range_ordered_by_date_then_machine() {
        let store = test_store();
        store
            .insert_shift(&make_shift("F2", "2024-03-15", ShiftStatus::Occupied))
            .unwrap();
        store
            .insert_shift(&make_shift("F1", "2024-03-15", ShiftStatus::Occupied))
            .unwrap();
        store
            .insert_shift(&make_shift("F1", "2024-03-14", ShiftStatus::Occupied))
            .unwrap();
        store
            .insert_shift(&make_shift("F1", "2024-03-17", ShiftStatus::Occupied))
            .unwrap();

        let shifts = store
            .list_shifts("2024-03-14", "2024-03-15", &ShiftFilters::default())
            .unwrap();
        let keys: Vec<_> = shifts
            .iter()
            .map(|s| (s.date.as_str(), s.machine_code.as_str()))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("2024-03-14", "F1"),
                ("2024-03-15", "F1"),
                ("2024-03-15", "F2"),
            ]
        );
    }

    #[test]
    fn legacy_orders_get_placeholder_drawing_numbers() {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());

        // A pre-planwerk orders table: no drawing_number column at all.
        db.exec_batch(
            "CREATE TABLE orders (
                id        TEXT PRIMARY KEY,
                data      TEXT NOT NULL,
                status    TEXT NOT NULL,
                process_type TEXT NOT NULL,
                create_at TEXT NOT NULL
            )",
        )
        .unwrap();
        db.exec(
            "INSERT INTO orders (id, data, status, process_type, create_at) \
             VALUES ('old1', '{\"id\":\"old1\",\"processType\":\"MILLING\",\"status\":\"DONE\"}', \
                     'DONE', 'MILLING', '2020-01-01T00:00:00+00:00')",
            &[],
        )
        .unwrap();

        let store = PlanStore::new(db).unwrap();

        let got = store.get_order_by_drawing("DN-LEGACY-old1").unwrap();
        assert_eq!(got.id, "old1");
        assert_eq!(got.drawing_number, "DN-LEGACY-old1");

        // The unique index is live after the backfill.
        let err = store.insert_order(&{
            let mut o = make_order("DN-LEGACY-old1");
            o.id = "new1".into();
            o
        });
        assert!(matches!(err, Err(ServiceError::Conflict(_))));
    }
}
