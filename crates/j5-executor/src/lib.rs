//! Request execution engine.
//!
//! One call runs, strictly in order: environment seed, pre-request script,
//! variable resolution, body materialization, HTTP dispatch, post-response
//! script. See [`pipeline::RequestExecutor`].

pub mod cancel;
pub mod dispatch;
pub mod error;
pub mod materialize;
pub mod pipeline;

pub use cancel::CancelToken;
pub use dispatch::{Dispatcher, HttpDispatcher, MultipartPart, PreparedBody, PreparedRequest};
pub use error::{ExecutionError, FailureKind, TransportError, TransportErrorKind};
pub use pipeline::RequestExecutor;
