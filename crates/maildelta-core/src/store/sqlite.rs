//! `SQLite` implementation of [`MailStore`].

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::SqliteConnection;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};

use super::MailStore;
use super::model::{HistoryEntry, HistoryOrder, MailRecord, SyncDelta};
use crate::Result;

/// Mail history and records in one `SQLite` database.
#[derive(Debug, Clone)]
pub struct SqliteMailStore {
    pool: SqlitePool,
}

impl SqliteMailStore {
    /// Create a new store with the given database path.
    ///
    /// Creates the database and tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn new(database_path: &str) -> Result<Self> {
        let url = format!("sqlite:{database_path}?mode=rwc");
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    /// Create an in-memory store for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mail_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stream_id TEXT NOT NULL,
                sequence INTEGER NOT NULL,
                uid TEXT NOT NULL,
                UNIQUE(stream_id, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS mail_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                stream_id TEXT NOT NULL,
                uid TEXT NOT NULL,
                is_seen INTEGER NOT NULL DEFAULT 0,
                date TEXT,
                from_address TEXT,
                subject TEXT,
                UNIQUE(stream_id, uid)
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE INDEX IF NOT EXISTS idx_history_sequence
            ON mail_history(stream_id, sequence)
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

async fn upsert_history(conn: &mut SqliteConnection, entry: &HistoryEntry) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO mail_history (stream_id, sequence, uid)
        VALUES (?, ?, ?)
        ON CONFLICT(stream_id, uid) DO UPDATE SET
            sequence = excluded.sequence
        ",
    )
    .bind(&entry.stream_id)
    .bind(entry.sequence)
    .bind(&entry.uid)
    .execute(conn)
    .await?;
    Ok(())
}

async fn remove_history(conn: &mut SqliteConnection, stream_id: &str, uid: &str) -> Result<()> {
    sqlx::query("DELETE FROM mail_history WHERE stream_id = ? AND uid = ?")
        .bind(stream_id)
        .bind(uid)
        .execute(conn)
        .await?;
    Ok(())
}

async fn set_sequence(
    conn: &mut SqliteConnection,
    stream_id: &str,
    uid: &str,
    sequence: u32,
) -> Result<()> {
    sqlx::query("UPDATE mail_history SET sequence = ? WHERE stream_id = ? AND uid = ?")
        .bind(sequence)
        .bind(stream_id)
        .bind(uid)
        .execute(conn)
        .await?;
    Ok(())
}

async fn upsert_mail(conn: &mut SqliteConnection, record: &MailRecord) -> Result<()> {
    sqlx::query(
        r"
        INSERT INTO mail_records (stream_id, uid, is_seen, date, from_address, subject)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(stream_id, uid) DO UPDATE SET
            is_seen = excluded.is_seen,
            date = excluded.date,
            from_address = excluded.from_address,
            subject = excluded.subject
        ",
    )
    .bind(&record.stream_id)
    .bind(&record.uid)
    .bind(record.is_seen)
    .bind(record.date.map(|d| d.to_rfc3339()))
    .bind(&record.from_address)
    .bind(&record.subject)
    .execute(conn)
    .await?;
    Ok(())
}

async fn remove_mail(conn: &mut SqliteConnection, stream_id: &str, uid: &str) -> Result<()> {
    sqlx::query("DELETE FROM mail_records WHERE stream_id = ? AND uid = ?")
        .bind(stream_id)
        .bind(uid)
        .execute(conn)
        .await?;
    Ok(())
}

async fn set_seen(conn: &mut SqliteConnection, stream_id: &str, uid: &str) -> Result<()> {
    sqlx::query("UPDATE mail_records SET is_seen = 1 WHERE stream_id = ? AND uid = ?")
        .bind(stream_id)
        .bind(uid)
        .execute(conn)
        .await?;
    Ok(())
}

fn history_from_row(row: &SqliteRow) -> HistoryEntry {
    HistoryEntry {
        stream_id: row.get("stream_id"),
        sequence: row.get::<u32, _>("sequence"),
        uid: row.get("uid"),
    }
}

fn mail_from_row(row: &SqliteRow) -> MailRecord {
    let date = row
        .get::<Option<String>, _>("date")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|d| d.with_timezone(&Utc));
    MailRecord {
        stream_id: row.get("stream_id"),
        uid: row.get("uid"),
        is_seen: row.get::<bool, _>("is_seen"),
        date,
        from_address: row.get("from_address"),
        subject: row.get("subject"),
    }
}

impl MailStore for SqliteMailStore {
    async fn read_history(&self, stream_id: &str, order: HistoryOrder) -> Result<Vec<HistoryEntry>> {
        // length-then-text keeps decimal UIDs in numeric order
        let sql = match order {
            HistoryOrder::Sequence => {
                r"
                SELECT stream_id, sequence, uid FROM mail_history
                WHERE stream_id = ?
                ORDER BY sequence, length(uid), uid
                "
            }
            HistoryOrder::Uid => {
                r"
                SELECT stream_id, sequence, uid FROM mail_history
                WHERE stream_id = ?
                ORDER BY length(uid), uid
                "
            }
        };
        let rows = sqlx::query(sql)
            .bind(stream_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.iter().map(history_from_row).collect())
    }

    async fn write_history(&self, entry: &HistoryEntry) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_history(&mut conn, entry).await
    }

    async fn delete_history(&self, stream_id: &str, uid: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        remove_history(&mut conn, stream_id, uid).await
    }

    async fn update_history_sequence(&self, stream_id: &str, uid: &str, sequence: u32) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        set_sequence(&mut conn, stream_id, uid, sequence).await
    }

    async fn read_mail(&self, stream_id: &str) -> Result<Vec<MailRecord>> {
        let rows = sqlx::query(
            r"
            SELECT stream_id, uid, is_seen, date, from_address, subject
            FROM mail_records
            WHERE stream_id = ?
            ORDER BY length(uid), uid
            ",
        )
        .bind(stream_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.iter().map(mail_from_row).collect())
    }

    async fn write_mail(&self, record: &MailRecord) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        upsert_mail(&mut conn, record).await
    }

    async fn delete_mail(&self, stream_id: &str, uid: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        remove_mail(&mut conn, stream_id, uid).await
    }

    async fn mark_seen(&self, stream_id: &str, uid: &str) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        set_seen(&mut conn, stream_id, uid).await
    }

    async fn apply_delta(&self, delta: &SyncDelta) -> Result<()> {
        let stream_id = delta.stream_id.as_str();
        let mut tx = self.pool.begin().await?;
        for uid in &delta.removed {
            remove_history(&mut tx, stream_id, uid).await?;
            remove_mail(&mut tx, stream_id, uid).await?;
        }
        for uid in &delta.seen {
            set_seen(&mut tx, stream_id, uid).await?;
        }
        for (uid, sequence) in &delta.resequenced {
            set_sequence(&mut tx, stream_id, uid, *sequence).await?;
        }
        for (entry, record) in &delta.added {
            upsert_history(&mut tx, entry).await?;
            upsert_mail(&mut tx, record).await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(stream_id: &str, uid: &str) -> MailRecord {
        MailRecord {
            stream_id: stream_id.to_string(),
            uid: uid.to_string(),
            is_seen: false,
            date: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()),
            from_address: Some("Ann <ann@example.com>".to_string()),
            subject: Some("Hello".to_string()),
        }
    }

    #[tokio::test]
    async fn test_history_ordering() {
        let store = SqliteMailStore::in_memory().await.unwrap();
        for (seq, uid) in [(3, "100"), (1, "99"), (2, "1000")] {
            store
                .write_history(&HistoryEntry::new("s", seq, uid))
                .await
                .unwrap();
        }
        store
            .write_history(&HistoryEntry::new("other", 1, "5"))
            .await
            .unwrap();

        let by_uid = store.read_history("s", HistoryOrder::Uid).await.unwrap();
        let uids: Vec<&str> = by_uid.iter().map(|e| e.uid.as_str()).collect();
        assert_eq!(uids, ["99", "100", "1000"]);

        let by_seq = store
            .read_history("s", HistoryOrder::Sequence)
            .await
            .unwrap();
        let seqs: Vec<u32> = by_seq.iter().map(|e| e.sequence).collect();
        assert_eq!(seqs, [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_history_upsert_and_resequence() {
        let store = SqliteMailStore::in_memory().await.unwrap();
        store
            .write_history(&HistoryEntry::new("s", 1, "a"))
            .await
            .unwrap();
        store
            .write_history(&HistoryEntry::new("s", 4, "a"))
            .await
            .unwrap();
        store.update_history_sequence("s", "a", 2).await.unwrap();

        let history = store.read_history("s", HistoryOrder::Sequence).await.unwrap();
        assert_eq!(history, vec![HistoryEntry::new("s", 2, "a")]);

        store.delete_history("s", "a").await.unwrap();
        assert!(store.read_history("s", HistoryOrder::Uid).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mail_round_trip_and_mark_seen() {
        let store = SqliteMailStore::in_memory().await.unwrap();
        store.write_mail(&record("s", "7")).await.unwrap();
        store.mark_seen("s", "7").await.unwrap();

        let mail = store.read_mail("s").await.unwrap();
        assert_eq!(mail.len(), 1);
        assert!(mail[0].is_seen);
        assert_eq!(mail[0].date, record("s", "7").date);
        assert_eq!(mail[0].subject.as_deref(), Some("Hello"));

        store.delete_mail("s", "7").await.unwrap();
        assert!(store.read_mail("s").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_apply_delta() {
        let store = SqliteMailStore::in_memory().await.unwrap();
        for uid in ["1", "2", "3"] {
            store
                .write_history(&HistoryEntry::new("s", uid.parse().unwrap(), uid))
                .await
                .unwrap();
            store.write_mail(&record("s", uid)).await.unwrap();
        }

        let mut delta = SyncDelta::new("s");
        delta.removed.push("2".to_string());
        delta.seen.push("3".to_string());
        delta.resequenced.push(("3".to_string(), 2));
        delta
            .added
            .push((HistoryEntry::new("s", 3, "4"), record("s", "4")));
        assert!(!delta.is_empty());
        store.apply_delta(&delta).await.unwrap();

        let history = store.read_history("s", HistoryOrder::Sequence).await.unwrap();
        let pairs: Vec<(u32, &str)> = history.iter().map(|e| (e.sequence, e.uid.as_str())).collect();
        assert_eq!(pairs, [(1, "1"), (2, "3"), (3, "4")]);

        let mail = store.read_mail("s").await.unwrap();
        let seen: Vec<(&str, bool)> = mail.iter().map(|m| (m.uid.as_str(), m.is_seen)).collect();
        assert_eq!(seen, [("1", false), ("3", true), ("4", false)]);
    }

    #[tokio::test]
    async fn test_missing_date_is_none() {
        let store = SqliteMailStore::in_memory().await.unwrap();
        let mut undated = record("s", "1");
        undated.date = None;
        undated.from_address = None;
        store.write_mail(&undated).await.unwrap();
        assert_eq!(store.read_mail("s").await.unwrap(), vec![undated]);
    }
}
