//! Shared fixture for the pipeline integration suites.
//!
//! Everything runs on the in-memory backends, so the suites are fully
//! deterministic: subscriptions are opened before submission and
//! deliveries are fed to the components by hand instead of racing
//! background loops.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use sqlcheck_core::analyze::{AnalysisReport, AnalyzeError, Dialect, RuleConfig, SqlAnalyzer, Violation};
use sqlcheck_core::lock::{LockProvider, MemoryLockProvider};
use sqlcheck_core::repo::Repository;
use sqlcheck_core::retry::RetryPolicy;
use sqlcheck_core::storage::{FileStore, MemoryStore, StoreError};
use sqlcheck_core::types::FileRef;
use sqlcheck_core::EngineConfig;
use sqlcheck_db::MemoryRepository;
use sqlcheck_events::bus::{Delivery, EventBus, Subscription, Topic};
use sqlcheck_events::InProcessBus;
use sqlcheck_pipeline::{Aggregator, Dispatcher, Sweeper, Worker};
use tokio::sync::Mutex;

// ---------------------------------------------------------------------------
// Scripted analyzer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub enum Behavior {
    Violations(u32),
    Fail(String),
}

/// Analyzer whose behavior is scripted per file name; unscripted files
/// analyze cleanly. Counts invocations so retry semantics can be
/// asserted.
#[derive(Default)]
pub struct StubAnalyzer {
    behaviors: Mutex<HashMap<String, Behavior>>,
    default_behavior: Mutex<Option<Behavior>>,
    calls: AtomicU32,
}

impl StubAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn script(&self, file_name: &str, behavior: Behavior) {
        self.behaviors
            .lock()
            .await
            .insert(file_name.to_string(), behavior);
    }

    pub async fn script_default(&self, behavior: Behavior) {
        *self.default_behavior.lock().await = Some(behavior);
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlAnalyzer for StubAnalyzer {
    async fn analyze(
        &self,
        _sql: &str,
        file_name: &str,
        dialect: Dialect,
        _rules: &RuleConfig,
    ) -> Result<AnalysisReport, AnalyzeError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let behavior = {
            let behaviors = self.behaviors.lock().await;
            match behaviors.get(file_name) {
                Some(behavior) => Some(behavior.clone()),
                None => self.default_behavior.lock().await.clone(),
            }
        };
        match behavior {
            Some(Behavior::Fail(message)) => Err(AnalyzeError(message)),
            Some(Behavior::Violations(count)) => {
                let violations = (0..count)
                    .map(|i| Violation {
                        rule: "L010".into(),
                        description: "keyword capitalisation".into(),
                        line: i + 1,
                        column: 1,
                    })
                    .collect();
                Ok(AnalysisReport::new(file_name, dialect, violations))
            }
            None => Ok(AnalysisReport::new(file_name, dialect, Vec::new())),
        }
    }
}

// ---------------------------------------------------------------------------
// Flaky store
// ---------------------------------------------------------------------------

/// Wraps a store and fails the first N reads with a synthetic I/O
/// error; writes pass through untouched.
pub struct FlakyStore {
    inner: Arc<MemoryStore>,
    fail_first: u32,
    read_attempts: AtomicU32,
}

impl FlakyStore {
    pub fn new(inner: Arc<MemoryStore>, fail_first: u32) -> Self {
        Self {
            inner,
            fail_first,
            read_attempts: AtomicU32::new(0),
        }
    }

    pub fn read_attempts(&self) -> u32 {
        self.read_attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FileStore for FlakyStore {
    async fn read_text(&self, file_ref: &FileRef) -> Result<String, StoreError> {
        let attempt = self.read_attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.fail_first {
            return Err(StoreError::Io("synthetic read failure".into()));
        }
        self.inner.read_text(file_ref).await
    }

    async fn write_text(&self, file_ref: &FileRef, contents: &str) -> Result<(), StoreError> {
        self.inner.write_text(file_ref, contents).await
    }

    async fn exists(&self, file_ref: &FileRef) -> Result<bool, StoreError> {
        self.inner.exists(file_ref).await
    }
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub repo: Arc<MemoryRepository>,
    pub bus: Arc<InProcessBus>,
    pub locks: Arc<MemoryLockProvider>,
    pub store: Arc<MemoryStore>,
    pub analyzer: Arc<StubAnalyzer>,
    pub config: EngineConfig,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(fast_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            repo: Arc::new(MemoryRepository::new()),
            bus: Arc::new(InProcessBus::default()),
            locks: Arc::new(MemoryLockProvider::new()),
            store: Arc::new(MemoryStore::new()),
            analyzer: Arc::new(StubAnalyzer::new()),
            config,
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.repo.clone() as Arc<dyn Repository>,
            self.bus.clone() as Arc<dyn EventBus>,
            self.store.clone() as Arc<dyn FileStore>,
            self.config.clone(),
        )
    }

    pub fn worker(&self, worker_id: &str) -> Worker {
        self.worker_with_store(worker_id, self.store.clone() as Arc<dyn FileStore>)
    }

    pub fn worker_with_store(&self, worker_id: &str, store: Arc<dyn FileStore>) -> Worker {
        Worker::new(
            self.repo.clone() as Arc<dyn Repository>,
            self.bus.clone() as Arc<dyn EventBus>,
            self.locks.clone() as Arc<dyn LockProvider>,
            store,
            self.analyzer.clone() as Arc<dyn SqlAnalyzer>,
            self.config.clone(),
            worker_id,
        )
    }

    pub fn aggregator(&self) -> Arc<Aggregator> {
        Arc::new(Aggregator::new(
            self.repo.clone() as Arc<dyn Repository>,
            self.bus.clone() as Arc<dyn EventBus>,
        ))
    }

    pub fn sweeper(&self, aggregator: Arc<Aggregator>) -> Sweeper {
        Sweeper::new(
            self.repo.clone() as Arc<dyn Repository>,
            self.locks.clone() as Arc<dyn LockProvider>,
            aggregator,
            self.config.clone(),
        )
    }

    pub async fn subscribe(&self, topic: Topic) -> Subscription {
        self.bus.subscribe(topic).await.expect("subscribe")
    }
}

pub fn fast_config() -> EngineConfig {
    EngineConfig {
        lock_ttl: Duration::from_secs(5),
        stall_after: Duration::from_secs(60),
        sweep_interval: Duration::from_secs(10),
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        },
        default_dialect: Dialect::Ansi,
    }
}

// ---------------------------------------------------------------------------
// Delivery pumping
// ---------------------------------------------------------------------------

/// Next delivery if one arrives within a short grace period.
pub async fn try_next(subscription: &mut Subscription) -> Option<Delivery> {
    tokio::time::timeout(Duration::from_millis(50), subscription.next())
        .await
        .ok()
        .flatten()
}

/// Drain everything currently buffered on a subscription.
pub async fn drain(subscription: &mut Subscription) -> Vec<Delivery> {
    let mut deliveries = Vec::new();
    while let Some(delivery) = try_next(subscription).await {
        deliveries.push(delivery);
    }
    deliveries
}

/// Feed requests to the worker and completions to the aggregator until
/// both streams run dry.
pub async fn pump(
    worker: &Worker,
    aggregator: &Aggregator,
    requests: &mut Subscription,
    completions: &mut Subscription,
) {
    loop {
        let mut progressed = false;
        while let Some(delivery) = try_next(requests).await {
            worker.handle_delivery(delivery).await;
            progressed = true;
        }
        while let Some(delivery) = try_next(completions).await {
            aggregator.handle_delivery(delivery).await;
            progressed = true;
        }
        if !progressed {
            break;
        }
    }
}
