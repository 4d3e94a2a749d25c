//! The drain loop.

use crate::{MessageProvider, WorkerError, WorkerResult};
use async_trait::async_trait;
use forward_store::Message;
use http_dispatcher::{DispatchStatus, Dispatcher};
use send_policy::{BackoutGate, Eligibility};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Backout task recorded after a temporary delivery failure.
pub const TEMPORARY_ERROR_BACKOUT: &str = "TemporaryErrorBackout";

/// Timing for [`ForwardWorker`].
#[derive(Debug, Clone)]
pub struct ForwardWorkerConfig {
    /// Pause before every send, for downstream rate limiting.
    pub inter_send_delay: Duration,
    /// How long a temporary failure blocks further drains.
    pub temporary_error_backout: Duration,
}

impl Default for ForwardWorkerConfig {
    fn default() -> Self {
        Self {
            inter_send_delay: Duration::from_millis(1_000),
            temporary_error_backout: Duration::from_secs(5 * 60),
        }
    }
}

/// Why a drain ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStop {
    /// A recent temporary failure is still cooling down.
    BackedOff,
    /// Sending was not allowed when the drain started.
    NotEligible(Eligibility),
    /// The provider declined to send.
    ProviderDeclined,
    /// Nothing left to send.
    Drained,
    TemporaryError,
    Blackout,
    NotConnected,
    /// An unexpected error; see the logs.
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrainReport {
    /// Messages accepted by the endpoint.
    pub delivered: usize,
    /// Messages dropped after a permanent failure.
    pub rejected: usize,
    pub stop: DrainStop,
}

/// Something the host scheduler can wake up.
#[async_trait]
pub trait Worker: Send {
    async fn run(&mut self);
}

/// One drain activation over a [`MessageProvider`].
///
/// Sends strictly one message at a time and stops at the first temporary
/// failure, blackout, or disconnect so later messages never overtake earlier
/// ones.
pub struct ForwardWorker {
    dispatcher: Arc<Dispatcher>,
    gate: BackoutGate,
    /// Empty only while a call is running on the blocking pool, or after
    /// such a call panicked.
    provider: Option<Box<dyn MessageProvider>>,
    config: ForwardWorkerConfig,
}

impl ForwardWorker {
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        gate: BackoutGate,
        provider: Box<dyn MessageProvider>,
        config: ForwardWorkerConfig,
    ) -> Self {
        Self {
            dispatcher,
            gate,
            provider: Some(provider),
            config,
        }
    }

    /// Run a provider call on the blocking pool. Providers do SQLite I/O.
    async fn with_provider<T, F>(&mut self, call: F) -> WorkerResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn MessageProvider) -> WorkerResult<T> + Send + 'static,
    {
        let mut provider = self
            .provider
            .take()
            .ok_or_else(|| WorkerError::Task("provider lost to a failed task".to_string()))?;

        let (provider, result) = tokio::task::spawn_blocking(move || {
            let result = call(provider.as_mut());
            (provider, result)
        })
        .await
        .map_err(|e| WorkerError::Task(format!("Provider task failed: {}", e)))?;

        self.provider = Some(provider);
        result
    }

    async fn delete(&mut self, message: Message) -> WorkerResult<()> {
        self.with_provider(move |provider| provider.delete(&message)).await
    }

    /// Run one activation. Never fails; errors are logged and end the drain.
    /// The provider is always closed.
    pub async fn drain(&mut self) -> DrainReport {
        let mut report = DrainReport {
            delivered: 0,
            rejected: 0,
            stop: DrainStop::Failed,
        };

        let stop = match self.drain_messages(&mut report).await {
            Ok(stop) => stop,
            Err(err) => {
                error!(error = %err, "Drain aborted");
                DrainStop::Failed
            }
        };
        report.stop = stop;

        let closed = self
            .with_provider(|provider| {
                provider.close();
                Ok(())
            })
            .await;
        if let Err(err) = closed {
            error!(error = %err, "Provider not closed");
        }

        info!(
            delivered = report.delivered,
            rejected = report.rejected,
            stop = ?report.stop,
            "Drain finished"
        );
        report
    }

    async fn drain_messages(&mut self, report: &mut DrainReport) -> WorkerResult<DrainStop> {
        if !self
            .gate
            .elapsed(TEMPORARY_ERROR_BACKOUT, self.config.temporary_error_backout)
        {
            debug!("Still backing off after a temporary error");
            return Ok(DrainStop::BackedOff);
        }

        let eligibility = self.dispatcher.can_send();
        if !eligibility.is_ok() {
            debug!(?eligibility, "Not eligible to send");
            return Ok(DrainStop::NotEligible(eligibility));
        }

        if !self.with_provider(|provider| Ok(provider.can_send())).await? {
            debug!("Provider declined to send");
            return Ok(DrainStop::ProviderDeclined);
        }

        loop {
            let Some(message) = self.with_provider(|provider| provider.next()).await? else {
                return Ok(DrainStop::Drained);
            };

            tokio::time::sleep(self.config.inter_send_delay).await;

            let result = self.dispatcher.send(&message).await;
            match result.status {
                DispatchStatus::Ok => {
                    self.delete(message).await?;
                    report.delivered += 1;
                }
                DispatchStatus::PermanentError => {
                    warn!(
                        message_id = ?message.id,
                        url = %message.url,
                        data = ?result.data,
                        "Permanent delivery failure, dropping message"
                    );
                    self.delete(message).await?;
                    report.rejected += 1;
                }
                DispatchStatus::TemporaryError => {
                    info!(message_id = ?message.id, data = ?result.data, "Temporary delivery failure");
                    self.with_provider(move |provider| provider.record_temporary_error(&message))
                        .await?;
                    self.gate.record(TEMPORARY_ERROR_BACKOUT)?;
                    return Ok(DrainStop::TemporaryError);
                }
                DispatchStatus::Blackout => return Ok(DrainStop::Blackout),
                DispatchStatus::NotConnected => return Ok(DrainStop::NotConnected),
            }
        }
    }
}

#[async_trait]
impl Worker for ForwardWorker {
    async fn run(&mut self) {
        self.drain().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::WorkerError;
    use chrono::{FixedOffset, TimeZone};
    use http_dispatcher::ScriptedTransport;
    use send_policy::{ManualClock, MemorySettings, Preferences, StaticEnvironment};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::thread::{self, ThreadId};

    /// Provider double that serves a fixed list and records calls.
    struct ScriptedProvider {
        messages: VecDeque<Message>,
        fail_next: bool,
        can_send: bool,
        deleted: Arc<Mutex<Vec<i64>>>,
        closed: Arc<AtomicUsize>,
        threads: Arc<Mutex<Vec<ThreadId>>>,
    }

    impl ScriptedProvider {
        fn new(count: i64) -> Self {
            Self {
                messages: (1..=count)
                    .map(|id| {
                        let mut m = Message::new("https://api.example.com/e", id.to_string());
                        m.id = Some(id);
                        m
                    })
                    .collect(),
                fail_next: false,
                can_send: true,
                deleted: Arc::default(),
                closed: Arc::default(),
                threads: Arc::default(),
            }
        }
    }

    impl MessageProvider for ScriptedProvider {
        fn next(&mut self) -> WorkerResult<Option<Message>> {
            self.threads.lock().unwrap().push(thread::current().id());
            if self.fail_next {
                return Err(WorkerError::Batch("disk on fire".to_string()));
            }
            Ok(self.messages.front().cloned())
        }

        fn delete(&mut self, message: &Message) -> WorkerResult<()> {
            self.messages.retain(|m| m.id != message.id);
            self.deleted.lock().unwrap().push(message.id.unwrap());
            Ok(())
        }

        fn can_send(&mut self) -> bool {
            self.can_send
        }

        fn record_temporary_error(&mut self, _message: &Message) -> WorkerResult<()> {
            Ok(())
        }

        fn close(&mut self) {
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn worker(
        provider: ScriptedProvider,
    ) -> (ScriptedTransport, BackoutGate, ForwardWorker) {
        let transport = ScriptedTransport::new();
        let clock = Arc::new(ManualClock::new(
            FixedOffset::east_opt(0)
                .unwrap()
                .with_ymd_and_hms(2024, 2, 2, 10, 0, 0)
                .unwrap(),
        ));
        let settings = Arc::new(MemorySettings::new());
        let dispatcher = Arc::new(Dispatcher::new(
            Arc::new(transport.clone()),
            Arc::new(StaticEnvironment::default()),
            clock.clone(),
            Preferences::new(settings.clone()),
        ));
        let gate = BackoutGate::new(settings, clock);
        let worker = ForwardWorker::new(
            dispatcher,
            gate.clone(),
            Box::new(provider),
            ForwardWorkerConfig::default(),
        );
        (transport, gate, worker)
    }

    #[tokio::test(start_paused = true)]
    async fn paces_each_send() {
        let (transport, _, mut worker) = worker(ScriptedProvider::new(3));
        let started = tokio::time::Instant::now();

        let report = worker.drain().await;

        assert_eq!(report.delivered, 3);
        assert_eq!(report.stop, DrainStop::Drained);
        assert_eq!(transport.request_count(), 3);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(3), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(4), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn empty_provider_does_not_sleep() {
        let (_, _, mut worker) = worker(ScriptedProvider::new(0));
        let started = tokio::time::Instant::now();
        let report = worker.drain().await;
        assert_eq!(report.stop, DrainStop::Drained);
        assert!(started.elapsed() < Duration::from_millis(1));
    }

    #[tokio::test(start_paused = true)]
    async fn provider_error_is_contained_and_close_still_runs() {
        let mut provider = ScriptedProvider::new(2);
        provider.fail_next = true;
        let closed = provider.closed.clone();
        let (transport, _, mut worker) = worker(provider);

        let report = worker.drain().await;

        assert_eq!(report.stop, DrainStop::Failed);
        assert_eq!(transport.request_count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_can_decline() {
        let mut provider = ScriptedProvider::new(2);
        provider.can_send = false;
        let closed = provider.closed.clone();
        let (transport, _, mut worker) = worker(provider);

        let report = worker.drain().await;

        assert_eq!(report.stop, DrainStop::ProviderDeclined);
        assert_eq!(transport.request_count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn backout_blocks_before_anything_else() {
        let provider = ScriptedProvider::new(1);
        let closed = provider.closed.clone();
        let (transport, gate, mut worker) = worker(provider);
        gate.record(TEMPORARY_ERROR_BACKOUT).unwrap();

        let report = worker.drain().await;

        assert_eq!(report.stop, DrainStop::BackedOff);
        assert_eq!(transport.request_count(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn permanent_then_ok_deletes_both() {
        let provider = ScriptedProvider::new(2);
        let deleted = provider.deleted.clone();
        let (transport, gate, mut worker) = worker(provider);
        transport.push_status(400);
        transport.push_status(201);

        let report = worker.drain().await;

        assert_eq!(report.rejected, 1);
        assert_eq!(report.delivered, 1);
        assert_eq!(*deleted.lock().unwrap(), vec![1, 2]);
        assert_eq!(gate.last_recorded(TEMPORARY_ERROR_BACKOUT).unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn run_drains() {
        let provider = ScriptedProvider::new(1);
        let closed = provider.closed.clone();
        let (transport, _, mut worker) = worker(provider);

        worker.run().await;

        assert_eq!(transport.request_count(), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn provider_calls_leave_the_runtime_thread() {
        let provider = ScriptedProvider::new(2);
        let threads = provider.threads.clone();
        let (_, _, mut worker) = worker(provider);

        let report = worker.drain().await;

        assert_eq!(report.delivered, 2);
        let threads = threads.lock().unwrap();
        assert_eq!(threads.len(), 3);
        assert!(threads.iter().all(|id| *id != thread::current().id()));
    }
}
