//! Persistence of mail history and mail records.
//!
//! The synchronizers read and write through [`MailStore`]; every call is
//! scoped by the account's stream id. [`SqliteMailStore`] is the bundled
//! implementation.

use std::future::Future;

mod model;
mod sqlite;

pub use model::{HistoryEntry, HistoryOrder, MailRecord, SyncDelta};
pub use sqlite::SqliteMailStore;

use crate::Result;

/// Storage collaborator of the synchronizers.
pub trait MailStore: Send + Sync {
    /// All history entries of an account, sorted by `order`.
    fn read_history(
        &self,
        stream_id: &str,
        order: HistoryOrder,
    ) -> impl Future<Output = Result<Vec<HistoryEntry>>> + Send;

    /// Inserts or replaces the entry with the same UID.
    fn write_history(&self, entry: &HistoryEntry) -> impl Future<Output = Result<()>> + Send;

    /// Removes one history entry.
    fn delete_history(&self, stream_id: &str, uid: &str) -> impl Future<Output = Result<()>> + Send;

    /// Stores a new sequence number for a known UID.
    fn update_history_sequence(
        &self,
        stream_id: &str,
        uid: &str,
        sequence: u32,
    ) -> impl Future<Output = Result<()>> + Send;

    /// All mail records of an account.
    fn read_mail(&self, stream_id: &str) -> impl Future<Output = Result<Vec<MailRecord>>> + Send;

    /// Inserts or replaces the record with the same UID.
    fn write_mail(&self, record: &MailRecord) -> impl Future<Output = Result<()>> + Send;

    /// Removes one mail record.
    fn delete_mail(&self, stream_id: &str, uid: &str) -> impl Future<Output = Result<()>> + Send;

    /// Marks one mail record as read.
    fn mark_seen(&self, stream_id: &str, uid: &str) -> impl Future<Output = Result<()>> + Send;

    /// Applies a whole sync cycle.
    ///
    /// The default issues the individual calls in order: removals, read
    /// marks, sequence updates, then additions. Implementations that can
    /// should override it to apply the delta atomically.
    fn apply_delta(&self, delta: &SyncDelta) -> impl Future<Output = Result<()>> + Send {
        async move {
            let stream_id = delta.stream_id.as_str();
            for uid in &delta.removed {
                self.delete_history(stream_id, uid).await?;
                self.delete_mail(stream_id, uid).await?;
            }
            for uid in &delta.seen {
                self.mark_seen(stream_id, uid).await?;
            }
            for (uid, sequence) in &delta.resequenced {
                self.update_history_sequence(stream_id, uid, *sequence).await?;
            }
            for (entry, record) in &delta.added {
                self.write_history(entry).await?;
                self.write_mail(record).await?;
            }
            Ok(())
        }
    }
}
