//! The orchestration pipeline: dispatcher, worker, aggregator, sweeper.
//!
//! All four components are wired from the same capability set:
//! [`Repository`](sqlcheck_core::Repository),
//! [`EventBus`](sqlcheck_events::EventBus),
//! [`LockProvider`](sqlcheck_core::LockProvider),
//! [`FileStore`](sqlcheck_core::FileStore) and
//! [`SqlAnalyzer`](sqlcheck_core::SqlAnalyzer). They coordinate only
//! through the repository and the bus, never through shared memory.

pub mod aggregator;
pub mod dispatcher;
pub mod sweeper;
pub mod worker;

pub use aggregator::{AggregateError, Aggregator};
pub use dispatcher::{DispatchError, Dispatcher, Submission};
pub use sweeper::Sweeper;
pub use worker::Worker;
