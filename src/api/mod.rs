//! GraphQL API pipeline for the shopdesk backend.
//!
//! The pipeline is a stack of small layers over a single [`Transport`]
//! seam:
//!
//! ```text
//! ApiClient (envelope codec)
//!   -> BearerTransport (token attach, one refresh-and-replay on 401)
//!     -> RetryingTransport (bounded backoff for 5xx / transient failures)
//!       -> HttpTransport (reqwest)
//! ```
//!
//! Requests are immutable buffered values, so any layer can replay one
//! by cloning it.

pub mod bearer;
pub mod client;
pub mod envelope;
pub mod error;
pub mod request;
pub mod retry;
pub mod transport;

pub use bearer::{BearerTransport, TokenSource};
pub use client::ApiClient;
pub use error::ApiError;
pub use request::{ApiRequest, ApiResponse};
pub use retry::{RetryPolicy, RetryingTransport};
pub use transport::{FailureClass, HttpTransport, Transport, TransportError};
