use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::Connection;
use tracing::{debug, info};

use crate::error::SQLError;
use crate::traits::{Row, SQLStore, Value};

/// How long a writer waits out the SQLite write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SqliteStore is a SQLStore implementation backed by rusqlite (bundled SQLite).
///
/// A single connection behind a mutex. WAL mode keeps readers unblocked;
/// the busy timeout makes writers wait out the write lock instead of
/// failing immediately — this service compare-and-swaps single rows from
/// concurrent request handlers, so contention on the write lock is routine.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self, SQLError> {
        info!("opening sqlite database at {}", path.display());
        let conn = Connection::open(path)
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Self::configure(conn)
    }

    /// Create an in-memory SQLite database (useful for tests).
    pub fn open_in_memory() -> Result<Self, SQLError> {
        debug!("opening in-memory sqlite database");
        let conn = Connection::open_in_memory()
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        Self::configure(conn)
    }

    fn configure(conn: Connection) -> Result<Self, SQLError> {
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        conn.busy_timeout(BUSY_TIMEOUT)
            .map_err(|e| SQLError::Connection(e.to_string()))?;
        debug!("sqlite configured: WAL journal, busy timeout {BUSY_TIMEOUT:?}");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

/// Convert our Value enum to rusqlite's ToSql.
fn bind_params(params: &[Value]) -> Vec<Box<dyn rusqlite::types::ToSql + '_>> {
    params
        .iter()
        .map(|v| -> Box<dyn rusqlite::types::ToSql + '_> {
            match v {
                Value::Null => Box::new(rusqlite::types::Null),
                Value::Integer(i) => Box::new(*i),
                Value::Real(f) => Box::new(*f),
                Value::Text(s) => Box::new(s.as_str()),
            }
        })
        .collect()
}

impl SQLStore for SqliteStore {
    fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>, SQLError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Query(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let mut stmt = conn
            .prepare(sql)
            .map_err(|e| SQLError::Query(e.to_string()))?;

        let column_names: Vec<String> = stmt
            .column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();

        let rows = stmt
            .query_map(param_refs.as_slice(), |row| {
                let mut columns = Vec::new();
                for (i, name) in column_names.iter().enumerate() {
                    let val = row_value_at(row, i);
                    columns.push((name.clone(), val));
                }
                Ok(Row { columns })
            })
            .map_err(|e| SQLError::Query(e.to_string()))?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row.map_err(|e| SQLError::Query(e.to_string()))?);
        }
        Ok(result)
    }

    fn exec(&self, sql: &str, params: &[Value]) -> Result<u64, SQLError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Execution(e.to_string()))?;

        let bound = bind_params(params);
        let param_refs: Vec<&dyn rusqlite::types::ToSql> =
            bound.iter().map(|b| b.as_ref()).collect();

        let affected = conn
            .execute(sql, param_refs.as_slice())
            .map_err(|e| {
                // Constraint violations land here too; the caller decides
                // whether they are conflicts or real failures.
                debug!("sql exec failed: {e}");
                SQLError::Execution(e.to_string())
            })?;

        Ok(affected as u64)
    }

    fn exec_batch(&self, sql: &str) -> Result<(), SQLError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SQLError::Execution(e.to_string()))?;
        debug!("executing sql batch ({} bytes)", sql.len());
        conn.execute_batch(sql)
            .map_err(|e| SQLError::Execution(e.to_string()))
    }
}

/// Extract a Value from a rusqlite row at a given column index.
fn row_value_at(row: &rusqlite::Row, idx: usize) -> Value {
    // Try integer first, then real, then text, then null.
    if let Ok(i) = row.get::<_, i64>(idx) {
        return Value::Integer(i);
    }
    if let Ok(f) = row.get::<_, f64>(idx) {
        return Value::Real(f);
    }
    if let Ok(s) = row.get::<_, String>(idx) {
        return Value::Text(s);
    }
    Value::Null
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with_table() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        store
            .exec_batch(
                "CREATE TABLE t (id TEXT PRIMARY KEY, n INTEGER, label TEXT);
                 CREATE INDEX idx_t_n ON t(n);",
            )
            .unwrap();
        store
    }

    #[test]
    fn exec_and_query_roundtrip() {
        let store = store_with_table();
        let affected = store
            .exec(
                "INSERT INTO t (id, n, label) VALUES (?1, ?2, ?3)",
                &[
                    Value::Text("a".into()),
                    Value::Integer(3),
                    Value::Text("three".into()),
                ],
            )
            .unwrap();
        assert_eq!(affected, 1);

        let rows = store
            .query("SELECT n, label FROM t WHERE id = ?1", &[Value::Text("a".into())])
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_i64("n"), Some(3));
        assert_eq!(rows[0].get_str("label"), Some("three"));
    }

    #[test]
    fn conditional_update_reports_zero_rows() {
        let store = store_with_table();
        store
            .exec(
                "INSERT INTO t (id, n) VALUES ('a', 1)",
                &[],
            )
            .unwrap();

        // CAS-style update with a stale predicate touches nothing.
        let affected = store
            .exec("UPDATE t SET n = 2 WHERE id = 'a' AND n = 99", &[])
            .unwrap();
        assert_eq!(affected, 0);

        let affected = store
            .exec("UPDATE t SET n = 2 WHERE id = 'a' AND n = 1", &[])
            .unwrap();
        assert_eq!(affected, 1);
    }

    #[test]
    fn bool_column_helper() {
        let store = store_with_table();
        store
            .exec(
                "INSERT INTO t (id, n) VALUES (?1, ?2)",
                &[Value::Text("b".into()), Value::from_bool(true)],
            )
            .unwrap();
        let rows = store.query("SELECT n FROM t WHERE id = 'b'", &[]).unwrap();
        assert_eq!(rows[0].get_bool("n"), Some(true));
    }

    #[test]
    fn open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("t.sqlite")).unwrap();
        store.exec_batch("CREATE TABLE x (id TEXT)").unwrap();
        store
            .exec("INSERT INTO x (id) VALUES ('1')", &[])
            .unwrap();
        let rows = store.query("SELECT id FROM x", &[]).unwrap();
        assert_eq!(rows.len(), 1);
    }
}
