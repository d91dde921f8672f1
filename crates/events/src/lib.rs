//! Event infrastructure for the sqlcheck pipeline.
//!
//! - [`Envelope`] -- the canonical wire shape carried on every topic.
//! - [`messages`] -- typed request/completion/batch-result payloads.
//! - [`EventBus`] -- the pub/sub capability trait with acknowledged
//!   deliveries.
//! - [`InProcessBus`] -- in-process backend over
//!   `tokio::sync::broadcast`; the durable Postgres backend lives in
//!   `sqlcheck-db`.

pub mod bus;
pub mod envelope;
pub mod memory;
pub mod messages;

pub use bus::{Acker, BusError, Delivery, EventBus, Subscription, Topic};
pub use envelope::Envelope;
pub use memory::InProcessBus;
pub use messages::{
    BatchFileRequest, BatchMeta, BatchResultEvent, CompletionEvent, PerFileResult, RequestEvent,
    SingleFileRequest,
};
