//! QueuedSiteToSiteClient - キューの公開 API
//!
//! # 並行性
//! - engine（とその store）は 1 つの `Mutex` の内側。enqueue / cleanup / status は
//!   どのスレッドからでも呼べる
//! - `process` は同時に 1 つだけ。2 つ目は待たずに `ConcurrentProcessInProgress` を返す
//! - 送信中（`TransactionSender::send`）はロックを握らない。送信後の reconcile が
//!   送信結果をストアに書く唯一の操作

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{Span, debug, error, field, info, instrument, warn};

use super::QueueStatus;
use crate::config::QueueConfig;
use crate::domain::{
    BatchOutcome, DataPacket, PurgeCount, QueueError, StoreError, TransactionResult,
};
use crate::ports::{Clock, IdGenerator, TransactionSender, TransferError, UlidGenerator};
use crate::queue::{QueueEngine, TransmissionOutcome};

pub struct QueuedSiteToSiteClient {
    engine: Mutex<QueueEngine>,
    config: QueueConfig,
    sender: Arc<dyn TransactionSender>,
    ids: UlidGenerator<Arc<dyn Clock>>,
    processing: AtomicBool,
}

/// Holds the process slot; releasing it on drop covers early returns and panics.
struct ProcessSlot<'a> {
    flag: &'a AtomicBool,
}

impl<'a> ProcessSlot<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for ProcessSlot<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

impl QueuedSiteToSiteClient {
    /// Use `ClientBuilder` unless the engine is already wired.
    pub fn from_parts(
        engine: QueueEngine,
        config: QueueConfig,
        sender: Arc<dyn TransactionSender>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            engine: Mutex::new(engine),
            config,
            sender,
            ids: UlidGenerator::new(clock),
            processing: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    fn lock(&self) -> Result<MutexGuard<'_, QueueEngine>, StoreError> {
        self.engine.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn enqueue(&self, packet: DataPacket) -> Result<(), QueueError> {
        self.enqueue_all(vec![packet])
    }

    /// Persist every packet or none of them.
    #[instrument(skip_all, fields(count = packets.len()))]
    pub fn enqueue_all(&self, packets: Vec<DataPacket>) -> Result<(), QueueError> {
        let mut engine = self.lock()?;
        match engine.admit_all(&self.config, packets) {
            Ok(_) => Ok(()),
            Err(err) => {
                debug!(error = %err, "enqueue rejected");
                Err(err)
            }
        }
    }

    /// Send the next batch. An empty queue is a successful no-op.
    ///
    /// On a transfer error the whole batch goes back to the queue and the error
    /// is returned; nothing is lost.
    ///
    /// If the store cannot record the outcome, `StoreUnavailable` is returned
    /// and the batch stays `InFlight` until the client is rebuilt. It keeps
    /// occupying capacity and is sent again after the restart
    /// (see `QueueEngine::recover_in_flight`).
    #[instrument(skip_all, fields(batch_id = field::Empty))]
    pub fn process(&self) -> Result<BatchOutcome, QueueError> {
        let _slot = ProcessSlot::acquire(&self.processing)
            .ok_or(QueueError::ConcurrentProcessInProgress)?;

        let batch = self.lock()?.build_batch(&self.config)?;
        if batch.is_empty() {
            debug!("nothing to send");
            return Ok(BatchOutcome::empty());
        }
        Span::current().record("batch_id", field::display(batch.id()));

        match self.sender.send(batch.id(), batch.packets()) {
            Ok(transaction) => {
                if let Err(store_err) = self
                    .lock()?
                    .reconcile(&batch, TransmissionOutcome::Committed)
                {
                    error!(
                        error = %store_err,
                        packets = batch.len(),
                        "batch sent but not recorded, left in flight until restart"
                    );
                    return Err(store_err.into());
                }
                info!(
                    packets = batch.len(),
                    bytes = batch.byte_count(),
                    "batch sent"
                );
                Ok(BatchOutcome {
                    batch_id: Some(batch.id()),
                    packet_count: batch.len(),
                    byte_count: batch.byte_count(),
                    sent: true,
                    transaction: Some(transaction),
                })
            }
            Err(err) => {
                warn!(error = %err, packets = batch.len(), "batch failed, requeueing");
                if let Err(store_err) = self
                    .lock()?
                    .reconcile(&batch, TransmissionOutcome::Failed)
                {
                    error!(
                        transfer_error = %err,
                        error = %store_err,
                        packets = batch.len(),
                        "failed batch not requeued, left in flight until restart"
                    );
                    return Err(store_err.into());
                }
                Err(QueueError::TransmissionFailed(err))
            }
        }
    }

    /// Delete sent and expired records. Safe to repeat.
    #[instrument(skip_all)]
    pub fn cleanup(&self) -> Result<PurgeCount, QueueError> {
        let purge = self.lock()?.purge_terminal()?;
        if purge.total() > 0 {
            info!(sent = purge.sent, expired = purge.expired, "purged records");
        }
        Ok(purge)
    }

    pub fn status(&self) -> Result<QueueStatus, QueueError> {
        let totals = self.lock()?.totals()?;
        Ok(QueueStatus::new(totals, &self.config))
    }

    /// Transmit `packets` directly, bypassing the queue.
    pub fn send_now(&self, packets: &[DataPacket]) -> Result<TransactionResult, TransferError> {
        self.sender.send(self.ids.generate_batch_id(), packets)
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Barrier;
    use std::time::Duration;

    use super::test_support::{RecordingSender, packet};
    use super::*;
    use crate::app::ClientBuilder;
    use crate::domain::{BatchId, LifecycleState};
    use crate::impls::inmem_store::test_support::{Faults, FaultyStore};
    use crate::impls::record_table::test_support::t0;
    use crate::ports::{AttributePrioritizer, ManualClock, NoOpPrioritizer};

    fn prioritized() -> QueueConfig {
        QueueConfig::default().with_prioritizer(AttributePrioritizer {
            default_ttl_millis: 60_000,
            ..AttributePrioritizer::default()
        })
    }

    fn client(config: QueueConfig) -> (QueuedSiteToSiteClient, Arc<RecordingSender>) {
        let sender = Arc::new(RecordingSender::default());
        let client = ClientBuilder::new(sender.clone())
            .config(config)
            .clock(Arc::new(ManualClock::new(t0())))
            .build()
            .unwrap();
        (client, sender)
    }

    #[test]
    fn process_sends_in_priority_order() {
        let (client, sender) = client(prioritized());
        client.enqueue(packet("A", 5)).unwrap();
        client.enqueue(packet("B", 1)).unwrap();
        client.enqueue(packet("C", 1)).unwrap();

        let outcome = client.process().unwrap();
        assert!(outcome.sent);
        assert_eq!(outcome.packet_count, 3);
        assert_eq!(outcome.transaction.unwrap().packets_transferred, 3);
        assert_eq!(sender.sent_payloads(), vec![vec!["B", "C", "A"]]);
    }

    #[test]
    fn process_respects_preferred_batch_count() {
        let (client, _) = client(prioritized().with_preferred_batch_count(2));
        for name in ["a", "b", "c", "d", "e"] {
            client.enqueue(packet(name, 0)).unwrap();
        }

        let outcome = client.process().unwrap();
        assert_eq!(outcome.packet_count, 2);
        let status = client.status().unwrap();
        assert_eq!(status.totals.queued.count, 3);
        assert_eq!(status.totals.sent_pending_cleanup.count, 2);
    }

    #[test]
    fn empty_queue_process_is_noop() {
        let (client, sender) = client(prioritized());
        let outcome = client.process().unwrap();
        assert_eq!(outcome, BatchOutcome::empty());
        assert!(sender.sent_payloads().is_empty());
    }

    #[test]
    fn failed_transfer_requeues_batch() {
        let (client, sender) = client(prioritized());
        client
            .enqueue_all(vec![packet("a", 0), packet("b", 0)])
            .unwrap();

        sender.fail(true);
        let err = client.process().unwrap_err();
        assert!(matches!(err, QueueError::TransmissionFailed(_)));
        assert_eq!(client.status().unwrap().totals.queued.count, 2);

        sender.fail(false);
        client.process().unwrap();
        assert_eq!(sender.sent_payloads(), vec![vec!["a", "b"]]);
        assert_eq!(client.status().unwrap().totals.sent_pending_cleanup.count, 2);
    }

    #[test]
    fn capacity_rejection_leaves_queue_unchanged() {
        let (client, _) = client(prioritized().with_max_queued_packet_count(2));
        client.enqueue(packet("a", 0)).unwrap();
        client.enqueue(packet("b", 0)).unwrap();

        let err = client.enqueue(packet("c", 0)).unwrap_err();
        assert!(matches!(err, QueueError::CapacityExceeded { .. }));
        assert_eq!(client.status().unwrap().totals.live_count(), 2);
    }

    #[test]
    fn sent_records_stay_until_cleanup_and_cleanup_is_idempotent() {
        let (client, _) = client(prioritized());
        client.enqueue(packet("a", 0)).unwrap();
        client.process().unwrap();

        assert_eq!(client.cleanup().unwrap().sent, 1);
        assert_eq!(client.cleanup().unwrap().total(), 0);
    }

    #[test]
    fn zero_ttl_packet_is_purged_not_sent() {
        let sender = Arc::new(RecordingSender::default());
        let clock = Arc::new(ManualClock::new(t0()));
        let client = ClientBuilder::new(sender.clone())
            .config(
                QueueConfig::default().with_prioritizer(NoOpPrioritizer::with_fixed_ttl(
                    Duration::ZERO,
                )),
            )
            .clock(clock.clone())
            .build()
            .unwrap();

        client.enqueue(packet("a", 0)).unwrap();
        clock.advance(chrono::Duration::milliseconds(5));

        assert!(!client.process().unwrap().sent);
        assert_eq!(client.cleanup().unwrap().expired, 1);
        assert!(sender.sent_payloads().is_empty());
    }

    /// Blocks inside `send` until the test lets it go.
    struct GateSender {
        entered: Barrier,
        release: Barrier,
    }

    impl TransactionSender for GateSender {
        fn send(
            &self,
            _batch_id: BatchId,
            packets: &[DataPacket],
        ) -> Result<TransactionResult, TransferError> {
            self.entered.wait();
            self.release.wait();
            Ok(TransactionResult::new(packets.len(), 0))
        }
    }

    #[test]
    fn second_process_fails_fast_while_first_is_sending() {
        let sender = Arc::new(GateSender {
            entered: Barrier::new(2),
            release: Barrier::new(2),
        });
        let client = ClientBuilder::new(sender.clone())
            .config(prioritized())
            .build()
            .unwrap();
        client.enqueue(packet("a", 0)).unwrap();

        std::thread::scope(|scope| {
            let first = scope.spawn(|| client.process());
            sender.entered.wait();

            assert!(matches!(
                client.process(),
                Err(QueueError::ConcurrentProcessInProgress)
            ));
            // The store lock is free while the first batch is on the wire.
            client.enqueue(packet("b", 0)).unwrap();
            assert_eq!(client.cleanup().unwrap().total(), 0);
            let status = client.status().unwrap();
            assert_eq!(status.totals.in_flight.count, 1);
            assert_eq!(status.totals.queued.count, 1);

            sender.release.wait();
            let outcome = first.join().unwrap().unwrap();
            assert_eq!(outcome.packet_count, 1);
        });

        // The slot is released once the first call returns.
        std::thread::scope(|scope| {
            let second = scope.spawn(|| client.process());
            sender.entered.wait();
            sender.release.wait();
            assert_eq!(second.join().unwrap().unwrap().packet_count, 1);
        });
    }

    #[test]
    fn poisoned_lock_reports_store_unavailable() {
        let (client, _) = client(prioritized());
        std::thread::scope(|scope| {
            let _ = scope
                .spawn(|| {
                    let _guard = client.engine.lock().unwrap();
                    panic!("poison the engine lock");
                })
                .join();
        });

        let err = client.enqueue(packet("a", 0)).unwrap_err();
        assert!(matches!(err, QueueError::StoreUnavailable(StoreError::Poisoned)));
    }

    fn faulty_client(
        config: QueueConfig,
    ) -> (QueuedSiteToSiteClient, Arc<RecordingSender>, Arc<Faults>) {
        let (store, faults) = FaultyStore::new();
        let sender = Arc::new(RecordingSender::default());
        let client = ClientBuilder::new(sender.clone())
            .config(config)
            .clock(Arc::new(ManualClock::new(t0())))
            .store(Box::new(store))
            .build()
            .unwrap();
        (client, sender, faults)
    }

    #[test]
    fn failed_store_write_leaves_queue_unchanged_on_enqueue() {
        let (client, _, faults) = faulty_client(prioritized());
        client.enqueue(packet("a", 0)).unwrap();
        let before = client.status().unwrap();

        faults.fail_inserts(true);
        let err = client
            .enqueue_all(vec![packet("b", 0), packet("c", 0)])
            .unwrap_err();
        assert!(matches!(err, QueueError::StoreUnavailable(StoreError::Io(_))));
        assert!(!err.is_retryable());
        assert_eq!(client.status().unwrap(), before);

        faults.heal();
        client.enqueue(packet("b", 0)).unwrap();
        assert_eq!(client.status().unwrap().totals.queued.count, 2);
    }

    #[test]
    fn failed_batch_selection_sends_nothing() {
        let (client, sender, faults) = faulty_client(prioritized());
        client
            .enqueue_all(vec![packet("a", 0), packet("b", 0)])
            .unwrap();

        faults.fail_marks_to(LifecycleState::InFlight);
        let err = client.process().unwrap_err();
        assert!(matches!(err, QueueError::StoreUnavailable(StoreError::Io(_))));
        assert!(sender.sent_payloads().is_empty());
        assert_eq!(client.status().unwrap().totals.queued.count, 2);

        faults.heal();
        assert!(client.process().unwrap().sent);
        assert_eq!(sender.sent_payloads(), vec![vec!["a", "b"]]);
    }

    #[test]
    fn unrecorded_commit_leaves_batch_in_flight_holding_capacity() {
        let (client, sender, faults) =
            faulty_client(prioritized().with_max_queued_packet_count(2));
        client
            .enqueue_all(vec![packet("a", 0), packet("b", 0)])
            .unwrap();

        faults.fail_marks_to(LifecycleState::SentPendingCleanup);
        let err = client.process().unwrap_err();
        assert!(matches!(err, QueueError::StoreUnavailable(StoreError::Io(_))));
        assert_eq!(sender.sent_payloads(), vec![vec!["a", "b"]]);

        let status = client.status().unwrap();
        assert_eq!(status.totals.in_flight.count, 2);
        assert_eq!(status.totals.sent_pending_cleanup.count, 0);
        assert!(matches!(
            client.enqueue(packet("c", 0)).unwrap_err(),
            QueueError::CapacityExceeded { .. }
        ));

        // not re-selected while the client lives
        faults.heal();
        assert!(!client.process().unwrap().sent);
        assert_eq!(sender.sent_payloads().len(), 1);
    }

    #[test]
    fn unrequeued_failed_batch_reports_store_error() {
        let (client, sender, faults) = faulty_client(prioritized());
        client.enqueue(packet("a", 0)).unwrap();

        sender.fail(true);
        faults.fail_marks_to(LifecycleState::Queued);
        let err = client.process().unwrap_err();
        assert!(matches!(err, QueueError::StoreUnavailable(StoreError::Io(_))));
        assert_eq!(client.status().unwrap().totals.in_flight.count, 1);

        // the slot is released even though the batch could not be requeued
        faults.heal();
        sender.fail(false);
        assert!(!client.process().unwrap().sent);
    }

    #[test]
    fn second_client_on_a_held_store_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let sender = Arc::new(RecordingSender::default());
        let first = ClientBuilder::new(sender.clone())
            .config(prioritized())
            .file_store(dir.path())
            .build()
            .unwrap();
        first.enqueue(packet("a", 0)).unwrap();
        first.process().unwrap();

        let err = ClientBuilder::new(sender.clone())
            .file_store(dir.path())
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, QueueError::StoreUnavailable(StoreError::Locked(_))));

        // the refused build did not requeue the first client's records
        assert_eq!(first.status().unwrap().totals.sent_pending_cleanup.count, 1);
        drop(first);

        let reopened = ClientBuilder::new(sender)
            .file_store(dir.path())
            .build()
            .unwrap();
        reopened.enqueue(packet("b", 0)).unwrap();
        assert_eq!(reopened.status().unwrap().totals.live_count(), 1);
        assert_eq!(reopened.cleanup().unwrap().sent, 1);
    }

    #[test]
    fn crash_after_send_keeps_records_for_cleanup() {
        let dir = tempfile::tempdir().unwrap();
        let sender = Arc::new(RecordingSender::default());
        {
            let client = ClientBuilder::new(sender.clone())
                .config(prioritized())
                .file_store(dir.path())
                .build()
                .unwrap();
            client
                .enqueue_all(vec![packet("a", 0), packet("b", 0), packet("c", 0)])
                .unwrap();
            client.process().unwrap();
        }

        let reopened = ClientBuilder::new(sender)
            .config(prioritized())
            .file_store(dir.path())
            .build()
            .unwrap();
        let status = reopened.status().unwrap();
        assert_eq!(status.totals.sent_pending_cleanup.count, 3);
        assert_eq!(status.totals.get(LifecycleState::Queued).count, 0);
        assert_eq!(reopened.cleanup().unwrap().sent, 3);
    }

    #[test]
    fn send_now_bypasses_queue() {
        let (client, sender) = client(prioritized());
        let result = client.send_now(&[packet("direct", 0)]).unwrap();
        assert_eq!(result.packets_transferred, 1);
        assert_eq!(sender.sent_payloads(), vec![vec!["direct"]]);
        assert_eq!(client.status().unwrap().totals.total_count(), 0);
    }
}
