//! # forward-retriable-worker
//!
//! Drains the durable message queue to its HTTP endpoints.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐  enqueue  ┌──────────────┐  next/delete  ┌─────────────────┐
//! │   Host   │──────────▶│ MessageStore │◀─────────────▶│ MessageProvider │
//! └────┬─────┘           └──────────────┘               │ (Single | Batch)│
//!      │ drain                                          └────────┬────────┘
//!      ▼                                                         │
//! ┌──────────────┐  gate   ┌─────────────┐  send   ┌────────────▼──┐
//! │ ForwardWorker│────────▶│ BackoutGate │         │  Dispatcher   │──▶ Transport
//! └──────────────┘         └─────────────┘         └───────────────┘
//! ```
//!
//! ## One activation
//!
//! 1. Stop if a temporary failure happened less than five minutes ago.
//! 2. Stop unless send eligibility is `Ok`.
//! 3. Stop if the provider declines (batch mode waits for a full batch or
//!    its submit interval).
//! 4. Repeatedly take the oldest message, pause one second, send it:
//!    - success or permanent failure: delete it and continue;
//!    - temporary failure: spend one retry (or drop the message when none
//!      are left), record the backout, and stop;
//!    - blackout or disconnect: stop without touching the message.
//!
//! Errors never escape a drain; they are logged and end the activation, and
//! the provider is closed on every path.
//!
//! ## Example
//!
//! ```ignore
//! let engine = StoreAndForward::new(store, transport, environment, clock, EngineConfig::default());
//! engine.enqueue(&Message::new("https://api.example.com/events", body))?;
//! let report = engine.drain().await;
//! ```

mod batch;
mod engine;
mod error;
mod provider;
mod worker;

pub use batch::{derive_batch_url, BatchConfig, BatchProvider, BATCH_TASK};
pub use engine::{EngineConfig, SendOutcome, StoreAndForward, MINIMUM_STORAGE_LIMIT};
pub use error::{WorkerError, WorkerResult};
pub use provider::{MessageProvider, SingleMessageProvider};
pub use worker::{
    DrainReport, DrainStop, ForwardWorker, ForwardWorkerConfig, Worker, TEMPORARY_ERROR_BACKOUT,
};
