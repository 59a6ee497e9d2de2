//! Backend correlation layer.
//!
//! A single request/response channel to an external backend process,
//! multiplexing every request method by widget key. See [`BackendComm`].

mod comm;
mod error;
mod registry;
mod transport;

pub use comm::{BackendComm, DispatchOutcome, SendOutcome};
pub use error::CommError;
pub use registry::{CallbackRegistry, ResponseCallback};
pub use transport::{ChannelTransport, MemoryTransport, Transport};
