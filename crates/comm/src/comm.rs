//! Backend correlation layer.
//!
//! One outbound [`Transport`] and one inbound [`BackendComm::dispatch`] hook
//! multiplex every request method. Responses are routed by `(method, key)`
//! to the callback registered for that widget; anything unmatched is logged
//! and dropped.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use cean_types::wire::{
    BrowseFiles, InspectFile, LoadImage, ReqBrowseFiles, ReqInspectFile, ReqLoadImage, ReqUploadDataset, ResBrowseFiles,
    ResInspectFile, ResLoadImage, ResUploadDataset, UploadDataset,
};
use cean_types::{BackendMethod, Envelope, Method, WidgetKey};
use serde_json::Value;
use tracing::{debug, warn};

use crate::{CallbackRegistry, CommError, ResponseCallback, Transport};

/// What happened to an outbound request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// Written to the transport.
    Sent,
    /// A request for the same `(method, key)` is in flight; this payload
    /// replaces any earlier parked one and goes out once the response lands.
    Parked,
}

/// What happened to an inbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered { method: Method, key: WidgetKey },
    /// The key has no callback for this method; the widget is probably gone.
    Unmatched { method: Method, key: WidgetKey },
    UnknownType { kind: String },
    /// The payload did not decode into the method's response type.
    Undecodable { method: Method, key: WidgetKey, reason: String },
    /// The text was not an envelope at all.
    Malformed { reason: String },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

#[derive(Default)]
struct InFlight {
    /// Requests sent and not yet answered. Coalescing methods keep this at one.
    sent: usize,
    parked: Option<Value>,
}

struct CommInner {
    transport: Box<dyn Transport>,
    registry: RefCell<CallbackRegistry>,
    in_flight: RefCell<HashMap<(Method, WidgetKey), InFlight>>,
}

/// Cheap-to-clone handle on the form session's backend channel.
#[derive(Clone)]
pub struct BackendComm {
    inner: Rc<CommInner>,
}

impl BackendComm {
    pub fn new(transport: impl Transport + 'static) -> Self {
        Self::with_registry(transport, CallbackRegistry::new())
    }

    pub fn with_registry(transport: impl Transport + 'static, registry: CallbackRegistry) -> Self {
        Self {
            inner: Rc::new(CommInner {
                transport: Box::new(transport),
                registry: RefCell::new(registry),
                in_flight: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Sends a typed request for `key`.
    pub fn send_request<M: BackendMethod>(&self, key: &WidgetKey, request: &M::Request) -> Result<SendOutcome, CommError> {
        let payload = serde_json::to_value(request).map_err(|err| CommError::encode(M::METHOD, err))?;
        self.send_raw(M::METHOD, key, payload)
    }

    /// Sends an already-encoded payload, applying the coalescing policy.
    pub fn send_raw(&self, method: Method, key: &WidgetKey, payload: Value) -> Result<SendOutcome, CommError> {
        {
            let mut in_flight = self.inner.in_flight.borrow_mut();
            let entry = in_flight.entry((method, key.clone())).or_default();
            if method.coalesces() && entry.sent > 0 {
                debug!(method = %method, key = %key, "request in flight, parking payload");
                entry.parked = Some(payload);
                return Ok(SendOutcome::Parked);
            }
            entry.sent += 1;
        }
        debug!(method = %method, key = %key, "sending request");
        let result = self
            .inner
            .transport
            .send(Envelope::new(method.request_type(), key.clone(), payload));
        if result.is_err() {
            self.settle(method, key);
        }
        result.map(|_| SendOutcome::Sent)
    }

    /// Marks one request for `(method, key)` as answered and hands back the
    /// payload parked behind it once none is left outstanding.
    fn settle(&self, method: Method, key: &WidgetKey) -> Option<Value> {
        let mut in_flight = self.inner.in_flight.borrow_mut();
        let entry = in_flight.get_mut(&(method, key.clone()))?;
        entry.sent = entry.sent.saturating_sub(1);
        if entry.sent > 0 {
            return None;
        }
        in_flight.remove(&(method, key.clone())).and_then(|entry| entry.parked)
    }

    /// Registers `callback` for responses of `M` addressed to `key`.
    pub fn on_response<M, F>(&self, key: &WidgetKey, callback: F)
    where
        M: BackendMethod + 'static,
        F: Fn(M::Response) + 'static,
    {
        let erased: ResponseCallback = Rc::new(move |payload: Value| {
            let response = serde_json::from_value::<M::Response>(payload)?;
            callback(response);
            Ok(())
        });
        self.inner
            .registry
            .borrow_mut()
            .register(M::METHOD, key.clone(), erased);
    }

    /// Drops the callback for `key` along with any in-flight bookkeeping.
    pub fn off_response<M: BackendMethod>(&self, key: &WidgetKey) {
        self.off_method(M::METHOD, key);
    }

    pub fn off_method(&self, method: Method, key: &WidgetKey) {
        self.inner.registry.borrow_mut().unregister(method, key);
        self.inner.in_flight.borrow_mut().remove(&(method, key.clone()));
    }

    pub fn is_registered(&self, method: Method, key: &WidgetKey) -> bool {
        self.inner.registry.borrow().contains(method, key)
    }

    pub fn is_in_flight(&self, method: Method, key: &WidgetKey) -> bool {
        self.inner.in_flight.borrow().contains_key(&(method, key.clone()))
    }

    /// Whether any request still awaits its response, parked ones included.
    pub fn has_outstanding(&self) -> bool {
        !self.inner.in_flight.borrow().is_empty()
    }

    /// Total registered callbacks, for leak checks.
    pub fn registration_count(&self) -> usize {
        self.inner.registry.borrow().len()
    }

    /// Parses one inbound line and dispatches it.
    pub fn dispatch_json(&self, text: &str) -> DispatchOutcome {
        match serde_json::from_str::<Envelope>(text) {
            Ok(envelope) => self.dispatch(envelope),
            Err(err) => {
                warn!(error = %err, "dropping malformed backend message");
                DispatchOutcome::Malformed { reason: err.to_string() }
            }
        }
    }

    /// Routes a response to its callback. Never fails; mismatches are logged.
    pub fn dispatch(&self, envelope: Envelope) -> DispatchOutcome {
        let Some(method) = Method::from_response_type(&envelope.kind) else {
            warn!(kind = %envelope.kind, key = %envelope.key, "dropping message of unknown type");
            return DispatchOutcome::UnknownType { kind: envelope.kind };
        };
        let key = envelope.key;

        let callback = self.inner.registry.borrow().get(method, &key);
        let outcome = match callback {
            None => {
                debug!(method = %method, key = %key, "no callback for response, dropping");
                DispatchOutcome::Unmatched {
                    method,
                    key: key.clone(),
                }
            }
            Some(callback) => match callback(envelope.payload) {
                Ok(()) => DispatchOutcome::Delivered {
                    method,
                    key: key.clone(),
                },
                Err(err) => {
                    warn!(method = %method, key = %key, error = %err, "dropping undecodable response");
                    DispatchOutcome::Undecodable {
                        method,
                        key: key.clone(),
                        reason: err.to_string(),
                    }
                }
            },
        };

        self.release_parked(method, &key);
        outcome
    }

    fn release_parked(&self, method: Method, key: &WidgetKey) {
        let Some(payload) = self.settle(method, key) else {
            return;
        };
        if !self.is_registered(method, key) {
            debug!(method = %method, key = %key, "discarding parked request for unregistered key");
            return;
        }
        if let Err(err) = self.send_raw(method, key, payload) {
            warn!(method = %method, key = %key, error = %err, "failed to send parked request");
        }
    }

    pub fn send_req_inspect_file(&self, key: &WidgetKey, payload: &ReqInspectFile) -> Result<SendOutcome, CommError> {
        self.send_request::<InspectFile>(key, payload)
    }

    pub fn on_res_inspect_file(&self, key: &WidgetKey, callback: impl Fn(ResInspectFile) + 'static) {
        self.on_response::<InspectFile, _>(key, callback);
    }

    pub fn off_res_inspect_file(&self, key: &WidgetKey) {
        self.off_response::<InspectFile>(key);
    }

    pub fn send_req_browse_files(&self, key: &WidgetKey, payload: &ReqBrowseFiles) -> Result<SendOutcome, CommError> {
        self.send_request::<BrowseFiles>(key, payload)
    }

    pub fn on_res_browse_files(&self, key: &WidgetKey, callback: impl Fn(ResBrowseFiles) + 'static) {
        self.on_response::<BrowseFiles, _>(key, callback);
    }

    pub fn off_res_browse_files(&self, key: &WidgetKey) {
        self.off_response::<BrowseFiles>(key);
    }

    pub fn send_req_upload_dataset(&self, key: &WidgetKey, payload: &ReqUploadDataset) -> Result<SendOutcome, CommError> {
        self.send_request::<UploadDataset>(key, payload)
    }

    pub fn on_res_upload_dataset(&self, key: &WidgetKey, callback: impl Fn(ResUploadDataset) + 'static) {
        self.on_response::<UploadDataset, _>(key, callback);
    }

    pub fn off_res_upload_dataset(&self, key: &WidgetKey) {
        self.off_response::<UploadDataset>(key);
    }

    pub fn send_req_load_image(&self, key: &WidgetKey, payload: &ReqLoadImage) -> Result<SendOutcome, CommError> {
        self.send_request::<LoadImage>(key, payload)
    }

    pub fn on_res_load_image(&self, key: &WidgetKey, callback: impl Fn(ResLoadImage) + 'static) {
        self.on_response::<LoadImage, _>(key, callback);
    }

    pub fn off_res_load_image(&self, key: &WidgetKey) {
        self.off_response::<LoadImage>(key);
    }
}

impl std::fmt::Debug for BackendComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendComm")
            .field("registry", &*self.inner.registry.borrow())
            .field("in_flight", &self.inner.in_flight.borrow().len())
            .finish()
    }
}
