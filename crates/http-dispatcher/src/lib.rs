//! HTTP delivery for queued messages.
//!
//! [`Dispatcher`] re-checks send eligibility, hands the message to a
//! [`Transport`], and folds the result into a [`DispatchResult`] using the
//! status-code rules in [`classifier`]. Transport failures are values, never
//! panics, so the drain loop can act on them directly.

pub mod classifier;
mod dispatcher;
mod reqwest_transport;
mod scripted;
mod transport;

pub use classifier::{classify, classify_transport_error, Outcome};
pub use dispatcher::{DispatchResult, DispatchStatus, Dispatcher, DEFAULT_REQUEST_TIMEOUT};
pub use reqwest_transport::ReqwestTransport;
pub use scripted::ScriptedTransport;
pub use transport::{OutboundRequest, Transport, TransportError, TransportResponse, TransportResult};
