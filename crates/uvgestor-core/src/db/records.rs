//! Expense and income operations

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::error::{Error, Result};
use crate::models::{NewRecord, Record, RecordKind, TimePeriod, DATE_FORMAT};
use crate::remote::RemoteRecord;

const RECORD_COLUMNS: &str =
    "id, kind, title, amount, time_period, category, date, user_id, synced_with_remote, remote_id";

/// Partial edit of a stored record
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordChanges {
    pub title: Option<String>,
    pub amount: Option<f64>,
    pub time_period: Option<TimePeriod>,
    pub category: Option<String>,
    pub date: Option<NaiveDate>,
}

impl RecordChanges {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.amount.is_none()
            && self.time_period.is_none()
            && self.category.is_none()
            && self.date.is_none()
    }

    /// Apply the edit to a copy of `record` and check the result is still valid
    pub fn apply(&self, record: &Record) -> Result<Record> {
        let mut updated = record.clone();
        if let Some(title) = &self.title {
            updated.title = title.clone();
        }
        if let Some(amount) = self.amount {
            updated.amount = amount;
        }
        if let Some(period) = self.time_period {
            updated.time_period = period;
        }
        if let Some(category) = &self.category {
            updated.category = category.clone();
        }
        if let Some(date) = self.date {
            updated.date = date.format(DATE_FORMAT).to_string();
        }

        NewRecord {
            title: updated.title.clone(),
            amount: updated.amount,
            time_period: updated.time_period,
            category: updated.category.clone(),
            date: updated.date.clone(),
        }
        .validate()?;

        Ok(updated)
    }
}

/// What `mark_synced` found when recording an upstream write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMark {
    /// The row matches the pushed content and is now synced
    Synced,
    /// The row changed after the push started; it stays pending
    Stale,
    /// The row was deleted while the write was in flight
    Missing,
}

impl Database {
    /// Insert a new, not-yet-synced record and return its local id
    pub fn insert_record(&self, kind: RecordKind, user_id: &str, record: &NewRecord) -> Result<i64> {
        record.validate()?;
        let conn = self.conn()?;

        conn.execute(
            r#"
            INSERT INTO records (kind, title, amount, time_period, category, date, user_id, synced_with_remote)
            VALUES (?, ?, ?, ?, ?, ?, ?, 0)
            "#,
            params![
                kind.as_str(),
                record.title,
                record.amount,
                record.time_period.as_str(),
                record.category,
                record.date,
                user_id,
            ],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Insert or replace a record by primary key
    ///
    /// A record with `id == 0` is inserted with a fresh id.
    pub fn upsert_record(&self, record: &Record) -> Result<i64> {
        let conn = self.conn()?;
        let id = (record.id != 0).then_some(record.id);

        let id: i64 = conn.query_row(
            r#"
            INSERT INTO records (id, kind, title, amount, time_period, category, date, user_id, synced_with_remote, remote_id)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                kind = excluded.kind,
                title = excluded.title,
                amount = excluded.amount,
                time_period = excluded.time_period,
                category = excluded.category,
                date = excluded.date,
                user_id = excluded.user_id,
                synced_with_remote = excluded.synced_with_remote,
                remote_id = excluded.remote_id,
                updated_at = CURRENT_TIMESTAMP
            RETURNING id
            "#,
            params![
                id,
                record.kind.as_str(),
                record.title,
                record.amount,
                record.time_period.as_str(),
                record.category,
                record.date,
                record.user_id,
                record.synced_with_remote,
                record.remote_id,
            ],
            |row| row.get(0),
        )?;

        Ok(id)
    }

    /// Merge a record pulled from the remote store, keyed on its remote id
    ///
    /// Existing rows that are still synced take the remote values; rows with
    /// pending local edits are left alone. Returns the local id either way.
    pub fn upsert_remote_record(&self, kind: RecordKind, remote: &RemoteRecord) -> Result<i64> {
        let conn = self.conn()?;

        let updated: Option<i64> = conn
            .query_row(
                r#"
                INSERT INTO records (kind, title, amount, time_period, category, date, user_id, synced_with_remote, remote_id)
                VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?)
                ON CONFLICT(kind, remote_id) DO UPDATE SET
                    title = excluded.title,
                    amount = excluded.amount,
                    time_period = excluded.time_period,
                    category = excluded.category,
                    date = excluded.date,
                    updated_at = CURRENT_TIMESTAMP
                WHERE records.synced_with_remote = 1
                RETURNING id
                "#,
                params![
                    kind.as_str(),
                    remote.title,
                    remote.amount,
                    remote.time_period.as_str(),
                    remote.category,
                    remote.date,
                    remote.user_id,
                    remote.remote_id,
                ],
                |row| row.get(0),
            )
            .optional()?;

        match updated {
            Some(id) => Ok(id),
            None => conn
                .query_row(
                    "SELECT id FROM records WHERE kind = ? AND remote_id = ?",
                    params![kind.as_str(), remote.remote_id],
                    |row| row.get(0),
                )
                .map_err(Error::from),
        }
    }

    /// Get a single record by local id
    pub fn get_record(&self, id: i64) -> Result<Option<Record>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!("SELECT {} FROM records WHERE id = ?", RECORD_COLUMNS),
                params![id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Get a record by the identifier the remote store assigned to it
    pub fn get_record_by_remote_id(&self, kind: RecordKind, remote_id: &str) -> Result<Option<Record>> {
        let conn = self.conn()?;
        let record = conn
            .query_row(
                &format!(
                    "SELECT {} FROM records WHERE kind = ? AND remote_id = ?",
                    RECORD_COLUMNS
                ),
                params![kind.as_str(), remote_id],
                Self::row_to_record,
            )
            .optional()?;
        Ok(record)
    }

    /// All records of a kind for a user, newest first
    pub fn list_records(&self, kind: RecordKind, user_id: &str) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records WHERE kind = ? AND user_id = ? ORDER BY date DESC, id DESC",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![kind.as_str(), user_id], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Records dated within `[from, to]` (inclusive), newest first
    pub fn list_records_between(
        &self,
        kind: RecordKind,
        user_id: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            r#"
            SELECT {} FROM records
            WHERE kind = ? AND user_id = ? AND date >= ? AND date <= ?
            ORDER BY date DESC, id DESC
            "#,
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(
                params![
                    kind.as_str(),
                    user_id,
                    from.format(DATE_FORMAT).to_string(),
                    to.format(DATE_FORMAT).to_string(),
                ],
                Self::row_to_record,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Records still waiting for an upstream write, oldest first
    pub fn list_unsynced(&self, kind: RecordKind, user_id: &str) -> Result<Vec<Record>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM records WHERE kind = ? AND user_id = ? AND synced_with_remote = 0 ORDER BY id",
            RECORD_COLUMNS
        ))?;

        let records = stmt
            .query_map(params![kind.as_str(), user_id], Self::row_to_record)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Edit a record in place; the row becomes pending until pushed again
    pub fn update_record(&self, id: i64, changes: &RecordChanges) -> Result<Option<Record>> {
        let Some(existing) = self.get_record(id)? else {
            return Ok(None);
        };
        if changes.is_empty() {
            return Ok(Some(existing));
        }

        let updated = changes.apply(&existing)?;
        let conn = self.conn()?;
        conn.execute(
            r#"
            UPDATE records
            SET title = ?, amount = ?, time_period = ?, category = ?, date = ?,
                synced_with_remote = 0, updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
            params![
                updated.title,
                updated.amount,
                updated.time_period.as_str(),
                updated.category,
                updated.date,
                id,
            ],
        )?;

        Ok(Some(Record {
            synced_with_remote: false,
            ..updated
        }))
    }

    /// Record a successful upstream write of `pushed`
    ///
    /// The remote id is always linked to the row. The row only counts as
    /// synced when its content still equals what was pushed; an edit made
    /// while the write was in flight keeps it pending. A copy of the same
    /// document merged by a fetch in the meantime is dropped.
    pub fn mark_synced(&self, pushed: &Record, remote_id: &str) -> Result<SyncMark> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "DELETE FROM records WHERE kind = ? AND remote_id = ? AND id != ?",
            params![pushed.kind.as_str(), remote_id, pushed.id],
        )?;
        let linked = tx.execute(
            "UPDATE records SET remote_id = ? WHERE id = ?",
            params![remote_id, pushed.id],
        )?;
        if linked == 0 {
            tx.commit()?;
            return Ok(SyncMark::Missing);
        }

        let synced = tx.execute(
            r#"
            UPDATE records
            SET synced_with_remote = 1, updated_at = CURRENT_TIMESTAMP
            WHERE id = ? AND title = ? AND amount = ? AND time_period = ?
                AND category = ? AND date = ?
            "#,
            params![
                pushed.id,
                pushed.title,
                pushed.amount,
                pushed.time_period.as_str(),
                pushed.category,
                pushed.date,
            ],
        )?;
        tx.commit()?;

        Ok(if synced > 0 {
            SyncMark::Synced
        } else {
            SyncMark::Stale
        })
    }

    /// Delete a record by local id; returns whether a row was removed
    pub fn delete_record(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        let rows = conn.execute("DELETE FROM records WHERE id = ?", params![id])?;
        Ok(rows > 0)
    }

    /// Delete every record of a kind for a user
    pub fn delete_records_for_user(&self, kind: RecordKind, user_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let rows = conn.execute(
            "DELETE FROM records WHERE kind = ? AND user_id = ?",
            params![kind.as_str(), user_id],
        )?;
        Ok(rows)
    }

    /// Sum of amounts for a kind and user (0 when there are none)
    pub fn total_for_user(&self, kind: RecordKind, user_id: &str) -> Result<f64> {
        let conn = self.conn()?;
        let total: f64 = conn.query_row(
            "SELECT COALESCE(SUM(amount), 0.0) FROM records WHERE kind = ? AND user_id = ?",
            params![kind.as_str(), user_id],
            |row| row.get(0),
        )?;
        Ok(total)
    }

    /// Count records of a kind for a user
    pub fn count_records(&self, kind: RecordKind, user_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM records WHERE kind = ? AND user_id = ?",
            params![kind.as_str(), user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub(crate) fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<Record> {
        let kind_str: String = row.get(1)?;
        let period_str: String = row.get(4)?;
        Ok(Record {
            id: row.get(0)?,
            kind: kind_str.parse().unwrap_or(RecordKind::Expense),
            title: row.get(2)?,
            amount: row.get(3)?,
            time_period: period_str.parse().unwrap_or(TimePeriod::Monthly),
            category: row.get(5)?,
            date: row.get(6)?,
            user_id: row.get(7)?,
            synced_with_remote: row.get(8)?,
            remote_id: row.get(9)?,
        })
    }
}
