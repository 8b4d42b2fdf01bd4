//! In-Process Commit Dispatcher
//!
//! Two-phase commit against the local [`BlockSnapshot`]:
//!
//! 1. `commit` resolves the request against the current snapshot and applies
//!    it atomically (all operations or none). Subscribers see
//!    [`CommitEvent::Applied`].
//! 2. A background worker hands the transaction to the
//!    [`TransactionPersister`], retrying with exponential backoff. It then
//!    emits [`CommitEvent::Acknowledged`] or, once retries are exhausted,
//!    [`CommitEvent::Failed`].
//!
//! ## Ordering
//!
//! Commits hold the snapshot write lock from resolution until the transaction
//! is queued for persistence, so local apply order and persistence order are
//! the same for every story.
//!
//! ## Retention
//!
//! Outcomes of settled transactions are kept for the most recent
//! `settled_retention` transactions only. Waiting on a transaction whose
//! outcome was forgotten reports it as unknown.
//!
//! ## Failure
//!
//! A persistence failure does not roll the snapshot back. The optimistic state
//! stays and the failure is reported to whoever waits on the transaction.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};

use super::commit::{BlockSource, CommitDispatcher, CommitHandle, CommitRequest, TransactionPersister};
use super::error::TransactionError;
use crate::config::CommitConfig;
use crate::db::{BlockSnapshot, CommitEvent};
use crate::models::Block;
use crate::operations::Transaction;

/// Persistence state of a committed transaction
#[derive(Debug, Clone, PartialEq, Eq)]
enum AckState {
    Pending,
    Acknowledged,
    Failed(String),
}

/// Pending transactions plus the outcomes of the most recent settled ones
#[derive(Debug)]
struct AckLedger {
    states: HashMap<String, AckState>,
    settled: VecDeque<String>,
    retention: usize,
}

impl AckLedger {
    fn new(retention: usize) -> Self {
        Self {
            states: HashMap::new(),
            settled: VecDeque::new(),
            retention,
        }
    }

    fn pending(&mut self, transaction_id: String) {
        self.states.insert(transaction_id, AckState::Pending);
    }

    fn settle(&mut self, transaction_id: String, state: AckState) {
        self.states.insert(transaction_id.clone(), state);
        self.settled.push_back(transaction_id);
        while self.settled.len() > self.retention {
            if let Some(oldest) = self.settled.pop_front() {
                self.states.remove(&oldest);
            }
        }
    }

    fn get(&self, transaction_id: &str) -> Option<AckState> {
        self.states.get(transaction_id).cloned()
    }
}

type AckMap = Arc<Mutex<AckLedger>>;

pub struct LocalCommitDispatcher {
    snapshot: Arc<RwLock<BlockSnapshot>>,
    events: broadcast::Sender<CommitEvent>,
    acks: AckMap,
    persist_tx: mpsc::UnboundedSender<Transaction>,
    _shutdown_tx: mpsc::Sender<()>,
    config: CommitConfig,
}

impl LocalCommitDispatcher {
    /// Create a dispatcher over an empty snapshot and start its persistence worker
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        persister: Arc<dyn TransactionPersister>,
        config: CommitConfig,
    ) -> Result<Self, TransactionError> {
        Self::with_snapshot(BlockSnapshot::new(), persister, config)
    }

    pub fn with_snapshot(
        snapshot: BlockSnapshot,
        persister: Arc<dyn TransactionPersister>,
        config: CommitConfig,
    ) -> Result<Self, TransactionError> {
        config.validate().map_err(TransactionError::invalid_config)?;
        tracing::info!(
            "LocalCommitDispatcher starting with {} block(s) at version {}",
            snapshot.len(),
            snapshot.version()
        );

        let (events, _) = broadcast::channel(config.event_channel_capacity);
        let (persist_tx, mut persist_rx) = mpsc::unbounded_channel::<Transaction>();
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);
        let acks: AckMap = Arc::new(Mutex::new(AckLedger::new(config.settled_retention)));

        let worker_events = events.clone();
        let worker_acks = acks.clone();
        let worker_config = config.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        tracing::info!("Persistence worker shutting down");
                        break;
                    }

                    Some(transaction) = persist_rx.recv() => {
                        Self::persist_with_retry(
                            persister.as_ref(),
                            transaction,
                            &worker_config,
                            &worker_acks,
                            &worker_events,
                        )
                        .await;
                    }
                }
            }
        });

        Ok(Self {
            snapshot: Arc::new(RwLock::new(snapshot)),
            events,
            acks,
            persist_tx,
            _shutdown_tx: shutdown_tx,
            config,
        })
    }

    /// Subscribe to commit events
    pub fn subscribe(&self) -> broadcast::Receiver<CommitEvent> {
        self.events.subscribe()
    }

    /// Copy of the current optimistic snapshot
    pub async fn snapshot(&self) -> BlockSnapshot {
        self.snapshot.read().await.clone()
    }

    pub fn config(&self) -> &CommitConfig {
        &self.config
    }

    async fn persist_with_retry(
        persister: &dyn TransactionPersister,
        transaction: Transaction,
        config: &CommitConfig,
        acks: &AckMap,
        events: &broadcast::Sender<CommitEvent>,
    ) {
        let transaction_id = transaction.id.clone();
        let mut attempt = 0;

        loop {
            match persister.save_transactions(vec![transaction.clone()]).await {
                Ok(()) => {
                    if attempt > 0 {
                        tracing::debug!(
                            "Transaction {} persisted after {} retry(ies)",
                            transaction_id,
                            attempt
                        );
                    }
                    acks.lock()
                        .await
                        .settle(transaction_id.clone(), AckState::Acknowledged);
                    let _ = events.send(CommitEvent::Acknowledged { transaction_id });
                    return;
                }
                Err(e) if attempt < config.max_persist_retries => {
                    let backoff_ms = config.backoff_ms(attempt);
                    tracing::debug!(
                        "Persisting transaction {} failed on attempt {}/{}: {:#}. Retrying in {}ms",
                        transaction_id,
                        attempt + 1,
                        config.max_persist_retries + 1,
                        e,
                        backoff_ms
                    );
                    tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                    attempt += 1;
                }
                Err(e) => {
                    let reason = format!("{:#}", e);
                    tracing::warn!(
                        "Giving up on transaction {} after {} attempt(s): {}",
                        transaction_id,
                        attempt + 1,
                        reason
                    );
                    acks.lock()
                        .await
                        .settle(transaction_id.clone(), AckState::Failed(reason.clone()));
                    let _ = events.send(CommitEvent::Failed {
                        transaction_id,
                        reason,
                    });
                    return;
                }
            }
        }
    }

    async fn ack_state(&self, transaction_id: &str) -> Option<AckState> {
        self.acks.lock().await.get(transaction_id)
    }

    /// Wait on `events` until `transaction_id` settles
    async fn await_settled(
        &self,
        transaction_id: &str,
        mut events: broadcast::Receiver<CommitEvent>,
    ) -> Result<(), TransactionError> {
        loop {
            match events.recv().await {
                Ok(CommitEvent::Acknowledged { transaction_id: id }) if id == transaction_id => {
                    return Ok(());
                }
                Ok(CommitEvent::Failed {
                    transaction_id: id,
                    reason,
                }) if id == transaction_id => {
                    return Err(TransactionError::persistence_failed(id, reason));
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!("Commit event receiver lagged by {} event(s)", skipped);
                    match self.ack_state(transaction_id).await {
                        Some(AckState::Acknowledged) => return Ok(()),
                        Some(AckState::Failed(reason)) => {
                            return Err(TransactionError::persistence_failed(transaction_id, reason))
                        }
                        _ => {}
                    }
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(TransactionError::channel_closed("commit events"));
                }
            }
        }
    }
}

#[async_trait]
impl CommitDispatcher for LocalCommitDispatcher {
    async fn commit(&self, request: CommitRequest) -> Result<CommitHandle, TransactionError> {
        let CommitRequest {
            transaction,
            story_id,
            should_reformat,
        } = request;

        let mut snapshot = self.snapshot.write().await;
        let transaction = transaction.resolve(&snapshot)?;
        let version = snapshot
            .apply_transaction(&transaction)
            .map_err(|e| TransactionError::rejected(&transaction.id, e.to_string()))?;

        tracing::debug!(
            "Applied transaction {} ({} operation(s)) at version {}",
            transaction.id,
            transaction.operations.len(),
            version
        );

        self.acks.lock().await.pending(transaction.id.clone());
        let _ = self.events.send(CommitEvent::Applied {
            transaction_id: transaction.id.clone(),
            story_id: story_id.clone(),
            version,
            should_reformat,
        });

        let transaction_id = transaction.id.clone();
        self.persist_tx
            .send(transaction)
            .map_err(|_| TransactionError::channel_closed("persistence worker"))?;
        drop(snapshot);

        Ok(CommitHandle {
            transaction_id,
            story_id,
        })
    }

    async fn wait_for_transaction_applied(&self, transaction_id: &str) -> Result<(), TransactionError> {
        // subscribe before reading the state so no settlement is missed
        let events = self.events.subscribe();

        match self.ack_state(transaction_id).await {
            None => return Err(TransactionError::unknown_transaction(transaction_id)),
            Some(AckState::Acknowledged) => return Ok(()),
            Some(AckState::Failed(reason)) => {
                return Err(TransactionError::persistence_failed(transaction_id, reason))
            }
            Some(AckState::Pending) => {}
        }

        let timeout = Duration::from_millis(self.config.ack_timeout_ms);
        tokio::time::timeout(timeout, self.await_settled(transaction_id, events))
            .await
            .map_err(|_| TransactionError::ack_timeout(transaction_id, self.config.ack_timeout_ms))?
    }
}

#[async_trait]
impl BlockSource for LocalCommitDispatcher {
    async fn get_block(&self, id: &str) -> anyhow::Result<Option<Block>> {
        Ok(self.snapshot.read().await.get_block(id).cloned())
    }
}
