//! SQLite-backed local expense store with per-record sync-state tracking.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

use spendsync_common::{new_local_id, Error, Expense, ExpenseDraft, Result};

/// Metadata key for the persisted sync cursor.
const CURSOR_KEY: &str = "last_sync_time";

/// A locally stored record together with its sync-state flags.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredExpense {
    pub expense: Expense,
    /// Soft-delete tombstone; retained until the deletion syncs.
    pub is_deleted: bool,
    /// Whether the server has ever acknowledged this record. Distinguishes
    /// an edited-after-sync record (UPDATE) from a never-synced one
    /// (CREATE) once `synced_at` goes back to `None`.
    pub ever_synced: bool,
}

/// Durable expense storage using SQLite.
///
/// All access goes through a single mutex-guarded connection, giving the
/// single-writer discipline the rest of the system relies on. Storage
/// failures surface as [`Error::Storage`]; the repository layer decides
/// how gracefully to degrade.
pub struct LocalStore {
    conn: Mutex<Connection>,
}

impl LocalStore {
    /// Create or open the store database at the given path.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path).map_err(sql_err)?;
        Self::init(conn)
    }

    /// Open a fresh in-memory store. Used by tests and ephemeral setups.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sql_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS expenses (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                amount REAL NOT NULL,
                category TEXT NOT NULL,
                currency TEXT NOT NULL,
                date_ms INTEGER NOT NULL,
                description TEXT,
                synced_at_ms INTEGER,
                is_deleted INTEGER NOT NULL DEFAULT 0,
                ever_synced INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date_ms);
            CREATE INDEX IF NOT EXISTS idx_expenses_dirty ON expenses(synced_at_ms);
            "#,
        )
        .map_err(sql_err)?;

        info!("local store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Insert the record if its id is absent, otherwise overwrite its
    /// fields in place (last-write-wins by call order).
    ///
    /// Validity constraints (positive amount, non-empty title) are the
    /// caller's responsibility; the store accepts whatever it is given.
    pub fn upsert(&self, expense: &Expense, is_deleted: bool) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO expenses
                (id, title, amount, category, currency, date_ms, description,
                 synced_at_ms, is_deleted, ever_synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                amount = excluded.amount,
                category = excluded.category,
                currency = excluded.currency,
                date_ms = excluded.date_ms,
                description = excluded.description,
                synced_at_ms = excluded.synced_at_ms,
                is_deleted = excluded.is_deleted,
                ever_synced = MAX(expenses.ever_synced, excluded.ever_synced)
            "#,
            params![
                expense.id,
                expense.title,
                expense.amount,
                expense.category,
                expense.currency,
                expense.date.timestamp_millis(),
                expense.description,
                expense.synced_at.map(|t| t.timestamp_millis()),
                is_deleted,
                expense.synced_at.is_some(),
            ],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Store a brand-new record created while offline.
    ///
    /// Generates a fresh client id, leaves `synced_at` unset so the record
    /// lands in the upload queue, and returns the id synchronously.
    pub fn create_local(&self, draft: &ExpenseDraft) -> Result<String> {
        let id = new_local_id();
        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO expenses
                (id, title, amount, category, currency, date_ms, description,
                 synced_at_ms, is_deleted, ever_synced)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, 0, 0)
            "#,
            params![
                id,
                draft.title,
                draft.amount,
                draft.category,
                draft.currency,
                draft.date.timestamp_millis(),
                draft.description,
            ],
        )
        .map_err(sql_err)?;
        debug!(%id, "created offline expense");
        Ok(id)
    }

    /// All non-tombstoned records, newest first. `include_deleted` extends
    /// the result to tombstones.
    pub fn fetch_all(&self, include_deleted: bool) -> Result<Vec<Expense>> {
        let conn = self.lock();
        let sql = if include_deleted {
            "SELECT * FROM expenses ORDER BY date_ms DESC"
        } else {
            "SELECT * FROM expenses WHERE is_deleted = 0 ORDER BY date_ms DESC"
        };
        let mut stmt = conn.prepare(sql).map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| map_row(row))
            .map_err(sql_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(rows.into_iter().map(|stored| stored.expense).collect())
    }

    /// The upload queue: every record with `synced_at == None`, tombstones
    /// included.
    pub fn fetch_unsynced(&self) -> Result<Vec<StoredExpense>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM expenses WHERE synced_at_ms IS NULL ORDER BY date_ms DESC")
            .map_err(sql_err)?;
        let rows = stmt
            .query_map([], |row| map_row(row))
            .map_err(sql_err)?
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(sql_err)?;
        Ok(rows)
    }

    /// Look up a single record by id.
    pub fn get(&self, id: &str) -> Result<Option<StoredExpense>> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare("SELECT * FROM expenses WHERE id = ?1")
            .map_err(sql_err)?;
        let mut rows = stmt.query_map(params![id], |row| map_row(row)).map_err(sql_err)?;
        match rows.next() {
            Some(row) => Ok(Some(row.map_err(sql_err)?)),
            None => Ok(None),
        }
    }

    /// Record the server's verdict on an uploaded record.
    ///
    /// With a server record: the local row is replaced by the server's
    /// canonical version (including its id), stamped with a fresh
    /// `synced_at`. Without one, the upload was a delete the server
    /// accepted, so the tombstone is hard-deleted.
    pub fn mark_synced(&self, local_id: &str, server_record: Option<&Expense>) -> Result<()> {
        let mut conn = self.lock();
        match server_record {
            Some(record) => {
                let tx = conn.transaction().map_err(sql_err)?;
                // The server may have assigned a new id; drop the local row
                // first so no duplicate survives.
                tx.execute("DELETE FROM expenses WHERE id = ?1", params![local_id])
                    .map_err(sql_err)?;
                tx.execute(
                    r#"
                    INSERT OR REPLACE INTO expenses
                        (id, title, amount, category, currency, date_ms, description,
                         synced_at_ms, is_deleted, ever_synced)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 0, 1)
                    "#,
                    params![
                        record.id,
                        record.title,
                        record.amount,
                        record.category,
                        record.currency,
                        record.date.timestamp_millis(),
                        record.description,
                        Utc::now().timestamp_millis(),
                    ],
                )
                .map_err(sql_err)?;
                tx.commit().map_err(sql_err)?;
            }
            None => {
                conn.execute("DELETE FROM expenses WHERE id = ?1", params![local_id])
                    .map_err(sql_err)?;
            }
        }
        Ok(())
    }

    /// Soft-delete: mark the record as a tombstone and re-dirty it so the
    /// deletion gets uploaded on the next sync pass.
    pub fn mark_deleted_locally(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "UPDATE expenses SET is_deleted = 1, synced_at_ms = NULL WHERE id = ?1",
            params![id],
        )
        .map_err(sql_err)?;
        Ok(())
    }

    /// Remove the record unconditionally, bypassing sync tracking.
    pub fn delete_hard(&self, id: &str) -> Result<()> {
        let conn = self.lock();
        conn.execute("DELETE FROM expenses WHERE id = ?1", params![id])
            .map_err(sql_err)?;
        Ok(())
    }

    /// Wipe the entire store, cursor included. Used on logout/reset.
    pub fn clear_all(&self) -> Result<()> {
        let conn = self.lock();
        conn.execute_batch("DELETE FROM expenses; DELETE FROM meta;")
            .map_err(sql_err)?;
        info!("local store cleared");
        Ok(())
    }

    /// Number of records pending upload, for the offline status indicator.
    pub fn pending_count(&self) -> Result<usize> {
        let conn = self.lock();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM expenses WHERE synced_at_ms IS NULL",
                [],
                |row| row.get(0),
            )
            .map_err(sql_err)?;
        Ok(count as usize)
    }

    /// The persisted sync cursor; epoch zero when never set.
    pub fn cursor(&self) -> Result<DateTime<Utc>> {
        let conn = self.lock();
        let value: Option<String> = conn
            .query_row(
                "SELECT value FROM meta WHERE key = ?1",
                params![CURSOR_KEY],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(sql_err(other)),
            })?;

        match value.and_then(|v| v.parse::<i64>().ok()) {
            Some(ms) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| Error::Storage(format!("corrupt sync cursor: {ms}"))),
            None => Ok(DateTime::from_timestamp_millis(0).unwrap_or_default()),
        }
    }

    /// Persist the sync cursor.
    pub fn set_cursor(&self, time: DateTime<Utc>) -> Result<()> {
        let conn = self.lock();
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES (?1, ?2)",
            params![CURSOR_KEY, time.timestamp_millis().to_string()],
        )
        .map_err(sql_err)?;
        Ok(())
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<StoredExpense> {
    let date_ms: i64 = row.get("date_ms")?;
    let synced_at_ms: Option<i64> = row.get("synced_at_ms")?;
    Ok(StoredExpense {
        expense: Expense {
            id: row.get("id")?,
            title: row.get("title")?,
            amount: row.get("amount")?,
            category: row.get("category")?,
            currency: row.get("currency")?,
            date: DateTime::from_timestamp_millis(date_ms).unwrap_or_default(),
            description: row.get("description")?,
            synced_at: synced_at_ms.and_then(DateTime::from_timestamp_millis),
        },
        is_deleted: row.get("is_deleted")?,
        ever_synced: row.get("ever_synced")?,
    })
}

fn sql_err(e: rusqlite::Error) -> Error {
    Error::Storage(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn draft(title: &str, amount: f64) -> ExpenseDraft {
        ExpenseDraft {
            title: title.to_string(),
            amount,
            category: "Food".to_string(),
            currency: "USD".to_string(),
            date: Utc::now(),
            description: None,
        }
    }

    fn server_expense(id: &str, date: DateTime<Utc>) -> Expense {
        Expense {
            id: id.to_string(),
            title: "Coffee".to_string(),
            amount: 4.5,
            category: "Food".to_string(),
            currency: "USD".to_string(),
            date,
            description: None,
            synced_at: Some(Utc::now()),
        }
    }

    #[test]
    fn create_local_is_dirty() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = store.create_local(&draft("Coffee", 4.5)).unwrap();

        let unsynced = store.fetch_unsynced().unwrap();
        assert_eq!(unsynced.len(), 1);
        assert_eq!(unsynced[0].expense.id, id);
        assert!(unsynced[0].expense.is_dirty());
        assert!(!unsynced[0].ever_synced);
        assert_eq!(store.pending_count().unwrap(), 1);
    }

    #[test]
    fn upsert_is_idempotent() {
        let store = LocalStore::open_in_memory().unwrap();
        let expense = server_expense("e1", Utc::now());

        store.upsert(&expense, false).unwrap();
        store.upsert(&expense, false).unwrap();

        let all = store.fetch_all(false).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], expense);
    }

    #[test]
    fn dirty_set_matches_synced_at() {
        let store = LocalStore::open_in_memory().unwrap();
        store.create_local(&draft("Dirty", 1.0)).unwrap();
        store.upsert(&server_expense("clean", Utc::now()), false).unwrap();

        let unsynced = store.fetch_unsynced().unwrap();
        assert_eq!(unsynced.len(), 1);
        assert!(unsynced.iter().all(|s| s.expense.synced_at.is_none()));
    }

    #[test]
    fn fetch_all_sorts_date_descending_and_hides_tombstones() {
        let store = LocalStore::open_in_memory().unwrap();
        let older = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let newer = Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap();

        store.upsert(&server_expense("old", older), false).unwrap();
        store.upsert(&server_expense("new", newer), false).unwrap();
        store.upsert(&server_expense("gone", newer), true).unwrap();

        let all = store.fetch_all(false).unwrap();
        assert_eq!(all.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(), ["new", "old"]);

        let with_deleted = store.fetch_all(true).unwrap();
        assert_eq!(with_deleted.len(), 3);
    }

    #[test]
    fn mark_synced_adopts_server_record() {
        let store = LocalStore::open_in_memory().unwrap();
        let local_id = store.create_local(&draft("Coffee", 4.5)).unwrap();

        let server = server_expense("srv-1", Utc::now());
        store.mark_synced(&local_id, Some(&server)).unwrap();

        assert!(store.get(&local_id).unwrap().is_none());
        let stored = store.get("srv-1").unwrap().unwrap();
        assert!(stored.expense.synced_at.is_some());
        assert!(stored.ever_synced);
        assert_eq!(store.pending_count().unwrap(), 0);
    }

    #[test]
    fn mark_synced_without_record_hard_deletes() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = store.create_local(&draft("Doomed", 2.0)).unwrap();
        store.mark_deleted_locally(&id).unwrap();

        store.mark_synced(&id, None).unwrap();
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn tombstone_re_dirties_record() {
        let store = LocalStore::open_in_memory().unwrap();
        store.upsert(&server_expense("e1", Utc::now()), false).unwrap();
        assert_eq!(store.pending_count().unwrap(), 0);

        store.mark_deleted_locally("e1").unwrap();

        let stored = store.get("e1").unwrap().unwrap();
        assert!(stored.is_deleted);
        assert!(stored.expense.synced_at.is_none());
        // Still ever_synced, so the engine derives a DELETE, not a CREATE.
        assert!(stored.ever_synced);
        assert!(store.fetch_all(false).unwrap().is_empty());
        assert_eq!(store.pending_count().unwrap(), 1);
    }

    #[test]
    fn edited_after_sync_keeps_ever_synced() {
        let store = LocalStore::open_in_memory().unwrap();
        store.upsert(&server_expense("e1", Utc::now()), false).unwrap();

        let mut edited = server_expense("e1", Utc::now());
        edited.title = "Edited".to_string();
        edited.synced_at = None;
        store.upsert(&edited, false).unwrap();

        let stored = store.get("e1").unwrap().unwrap();
        assert!(stored.expense.is_dirty());
        assert!(stored.ever_synced);
    }

    #[test]
    fn cursor_defaults_to_epoch_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("store.db");

        let store = LocalStore::open(&db).unwrap();
        assert_eq!(store.cursor().unwrap().timestamp(), 0);

        let t = Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap();
        store.set_cursor(t).unwrap();
        drop(store);

        let reopened = LocalStore::open(&db).unwrap();
        assert_eq!(reopened.cursor().unwrap(), t);
    }

    #[test]
    fn clear_all_wipes_records_and_cursor() {
        let store = LocalStore::open_in_memory().unwrap();
        store.create_local(&draft("Coffee", 4.5)).unwrap();
        store.set_cursor(Utc::now()).unwrap();

        store.clear_all().unwrap();

        assert!(store.fetch_all(true).unwrap().is_empty());
        assert_eq!(store.cursor().unwrap().timestamp(), 0);
    }

    #[test]
    fn delete_hard_bypasses_sync_tracking() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = store.create_local(&draft("Temp", 1.0)).unwrap();
        store.delete_hard(&id).unwrap();
        assert!(store.get(&id).unwrap().is_none());
        assert_eq!(store.pending_count().unwrap(), 0);
    }
}
