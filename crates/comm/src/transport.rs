//! Outbound halves of the backend channel.

use std::cell::RefCell;
use std::rc::Rc;

use cean_types::Envelope;
use tokio::sync::mpsc::UnboundedSender;

use crate::CommError;

/// Sink for outbound envelopes.
///
/// The inbound half is not modelled here: whoever owns the channel reads
/// messages and hands them to [`crate::BackendComm::dispatch`].
pub trait Transport {
    fn send(&self, envelope: Envelope) -> Result<(), CommError>;
}

/// Records every envelope in memory. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    sent: Rc<RefCell<Vec<Envelope>>>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything sent so far.
    pub fn sent(&self) -> Vec<Envelope> {
        self.sent.borrow().clone()
    }

    /// Drains the log.
    pub fn take_sent(&self) -> Vec<Envelope> {
        std::mem::take(&mut *self.sent.borrow_mut())
    }

    pub fn len(&self) -> usize {
        self.sent.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.borrow().is_empty()
    }
}

impl Transport for MemoryTransport {
    fn send(&self, envelope: Envelope) -> Result<(), CommError> {
        self.sent.borrow_mut().push(envelope);
        Ok(())
    }
}

/// Forwards envelopes to an async writer task over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: UnboundedSender<Envelope>,
}

impl ChannelTransport {
    pub fn new(sender: UnboundedSender<Envelope>) -> Self {
        Self { sender }
    }
}

impl Transport for ChannelTransport {
    fn send(&self, envelope: Envelope) -> Result<(), CommError> {
        self.sender
            .send(envelope)
            .map_err(|err| CommError::transport_closed(format!("backend writer dropped {}", err.0.kind)))
    }
}
