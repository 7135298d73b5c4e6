//! Periodic sync scheduling.
//!
//! Every tick starts one cycle per account. An account whose previous cycle
//! is still running is skipped for that tick, so cycles never pile up
//! behind a slow server; different accounts run in parallel.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::session::Connector;
use crate::store::MailStore;
use crate::sync::Synchronizer;

/// Clears an account's in-progress flag when its cycle ends.
struct InFlight(Arc<AtomicBool>);

impl InFlight {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        (!flag.swap(true, Ordering::AcqRel)).then(|| Self(Arc::clone(flag)))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives a [`Synchronizer`] on a fixed interval.
pub struct Scheduler<S, C> {
    synchronizer: Arc<Synchronizer<S, C>>,
    interval: Duration,
    running: HashMap<String, Arc<AtomicBool>>,
}

impl<S, C> Scheduler<S, C>
where
    S: MailStore + 'static,
    C: Connector + 'static,
{
    /// Creates a scheduler ticking every `interval`.
    #[must_use]
    pub fn new(synchronizer: Arc<Synchronizer<S, C>>, interval: Duration) -> Self {
        let running = synchronizer
            .stream_ids()
            .map(|id| (id.to_string(), Arc::new(AtomicBool::new(false))))
            .collect();
        Self {
            synchronizer,
            interval,
            running,
        }
    }

    /// Starts a cycle for every idle account.
    ///
    /// Returns the stream ids that were started; busy accounts are skipped.
    pub fn tick(&self, tasks: &mut JoinSet<()>) -> Vec<String> {
        let mut started = Vec::new();
        for (stream_id, flag) in &self.running {
            let Some(guard) = InFlight::acquire(flag) else {
                debug!(stream_id, "previous cycle still running, skipping");
                continue;
            };
            let synchronizer = Arc::clone(&self.synchronizer);
            let id = stream_id.clone();
            tasks.spawn(async move {
                let _guard = guard;
                // failures are logged by the synchronizer and retried next tick
                let _ = synchronizer.run(&id).await;
            });
            started.push(stream_id.clone());
        }
        started
    }

    /// Ticks until `shutdown` resolves, then waits for running cycles and
    /// logs out of every open connection.
    pub async fn run_until(self, shutdown: impl Future<Output = ()>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut tasks = JoinSet::new();
        tokio::pin!(shutdown);

        info!(
            accounts = self.running.len(),
            interval = ?self.interval,
            "scheduler started"
        );
        loop {
            tokio::select! {
                () = &mut shutdown => break,
                _ = ticker.tick() => {
                    self.tick(&mut tasks);
                }
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        info!(in_flight = tasks.len(), "scheduler stopping");
        while tasks.join_next().await.is_some() {}
        self.synchronizer.shutdown().await;
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::account::{AccountConfig, AccountProtocol};
    use crate::store::SqliteMailStore;
    use maildelta_proto::Connection;
    use tokio::sync::Notify;

    /// Holds every connect attempt until released, then fails it.
    struct Stalled(Arc<Notify>);

    impl Connector for Stalled {
        async fn establish(
            &self,
            _account: &AccountConfig,
            _connection: &Connection,
        ) -> maildelta_proto::Result<()> {
            self.0.notified().await;
            Err(maildelta_proto::Error::ConnectionClosed)
        }
    }

    #[test]
    fn test_in_flight_guard() {
        let flag = Arc::new(AtomicBool::new(false));
        let guard = InFlight::acquire(&flag).unwrap();
        assert!(InFlight::acquire(&flag).is_none());
        drop(guard);
        assert!(InFlight::acquire(&flag).is_some());
    }

    #[tokio::test]
    async fn test_tick_skips_account_with_cycle_running() {
        let release = Arc::new(Notify::new());
        let store = Arc::new(SqliteMailStore::in_memory().await.unwrap());
        let account = AccountConfig::new("slow", AccountProtocol::Pop3, "localhost", "me", "pw");
        let synchronizer = Synchronizer::new(store, Stalled(Arc::clone(&release)), [account]);
        let scheduler = Scheduler::new(Arc::new(synchronizer), Duration::from_secs(60));
        let mut tasks = JoinSet::new();

        assert_eq!(scheduler.tick(&mut tasks), ["slow"]);
        assert!(scheduler.tick(&mut tasks).is_empty());
        assert_eq!(tasks.len(), 1);

        release.notify_one();
        tasks.join_next().await.unwrap().unwrap();
        assert_eq!(scheduler.tick(&mut tasks), ["slow"]);

        release.notify_one();
        tasks.join_next().await.unwrap().unwrap();
    }
}
