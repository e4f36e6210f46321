use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace, warn};

use crate::codec::JsonCodec;
use crate::config::ChannelConfig;
use crate::error::{ChannelError, Result};
use crate::message::types::RequestId;
use crate::message::{IncomingMessage, ObjectDefinition, ObjectUpdate, OutgoingMessage};
use crate::proxy::RemoteObjectProxy;
use crate::signal::{Callback, SignalEmitter};
use crate::transport::Transport;

/// Called once with the response `data` of a correlated request.
pub type ResponseCallback = Box<dyn FnOnce(Value) + Send>;

/// Called once the channel object is wired up.
pub type ReadyCallback = Box<dyn FnOnce(&Channel)>;

/// Counters kept by a channel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelStats {
    pub messages_received: u64,
    pub messages_dropped: u64,
    pub requests_sent: u64,
    pub responses_matched: u64,
    pub objects_registered: u64,
}

pub(crate) struct ChannelInner {
    transport: Arc<dyn Transport>,
    codec: JsonCodec,
    config: ChannelConfig,
    this: Weak<ChannelInner>,
    next_id: AtomicU64,
    pending: Mutex<HashMap<RequestId, ResponseCallback>>,
    objects: RwLock<HashMap<String, Arc<RemoteObjectProxy>>>,
    ready: Mutex<bool>,
    objects_ready: SignalEmitter,
    stats: Mutex<ChannelStats>,
}

impl ChannelInner {
    fn send(&self, message: &OutgoingMessage) -> Result<()> {
        let text = self.codec.encode(message)?;
        self.send_raw(&text)
    }

    fn send_raw(&self, text: &str) -> Result<()> {
        trace!(transport = self.transport.name(), "-> {}", text);
        self.transport.send(text)?;
        Ok(())
    }

    pub(crate) fn notify(&self, message: OutgoingMessage) -> Result<()> {
        self.send(&message)?;
        self.stats.lock().requests_sent += 1;
        Ok(())
    }

    pub(crate) fn request(
        &self,
        message: OutgoingMessage,
        callback: ResponseCallback,
    ) -> Result<RequestId> {
        let id = RequestId::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);

        // Registered before sending: a synchronous transport may answer
        // from inside `send`.
        self.pending.lock().insert(id, callback);

        if let Err(e) = self.send(&message.with_id(id)) {
            self.pending.lock().remove(&id);
            return Err(e);
        }

        self.stats.lock().requests_sent += 1;
        Ok(id)
    }

    fn receive(&self, raw: &str) {
        if let Err(e) = self.try_receive(raw) {
            warn!("Dropping inbound message: {}", e);
        }
    }

    fn try_receive(&self, raw: &str) -> Result<()> {
        trace!(transport = self.transport.name(), "<- {}", raw);
        self.stats.lock().messages_received += 1;

        let result = IncomingMessage::parse(raw).and_then(|message| self.dispatch(message));
        if result.is_err() {
            self.stats.lock().messages_dropped += 1;
        }
        result
    }

    fn dispatch(&self, message: IncomingMessage) -> Result<()> {
        match message {
            IncomingMessage::Response { id, data } => self.handle_response(id, data),
            IncomingMessage::Signal {
                object,
                signal,
                args,
            } => {
                self.handle_signal(&object, &signal, &args);
                Ok(())
            }
            IncomingMessage::PropertyUpdate { updates } => {
                self.handle_property_update(updates);
                Ok(())
            }
            IncomingMessage::Definition { objects } => {
                self.handle_definitions(objects);
                Ok(())
            }
        }
    }

    fn handle_response(&self, id: Option<RequestId>, data: Value) -> Result<()> {
        let Some(id) = id else {
            return Err(ChannelError::UnknownRequestId("<missing>".to_string()));
        };

        let callback = self.pending.lock().remove(&id);
        match callback {
            Some(callback) => {
                self.stats.lock().responses_matched += 1;
                callback(data);
                Ok(())
            }
            None => Err(ChannelError::UnknownRequestId(id.to_string())),
        }
    }

    fn handle_signal(&self, object: &str, signal: &str, args: &[Value]) {
        match self.object(object) {
            Some(proxy) => proxy.signal_emitted(signal, args),
            None => debug!(object, signal, "Signal for unknown object dropped"),
        }
    }

    fn handle_property_update(&self, updates: Vec<ObjectUpdate>) {
        for update in updates {
            match self.object(&update.object) {
                Some(proxy) => proxy.property_update(update.changes),
                None => debug!(object = %update.object, "Property update for unknown object dropped"),
            }
        }
    }

    fn handle_definitions(&self, definitions: Vec<(String, ObjectDefinition)>) {
        for (name, definition) in definitions {
            let mut objects = self.objects.write();
            if objects.contains_key(&name) {
                warn!(object = %name, "Object already registered, ignoring new definition");
                continue;
            }

            debug!(
                object = %name,
                methods = definition.methods.len(),
                properties = definition.properties.len(),
                signals = definition.signals.len(),
                "Registering remote object"
            );
            let proxy = RemoteObjectProxy::new(name.clone(), definition, self.this.clone());
            objects.insert(name, Arc::new(proxy));
            drop(objects);

            self.stats.lock().objects_registered += 1;
        }

        self.check_ready();
    }

    /// Fire the readiness hook the first time the ready object is present.
    fn check_ready(&self) {
        let Some(proxy) = self.object(&self.config.ready_object) else {
            return;
        };

        {
            let mut ready = self.ready.lock();
            if *ready {
                return;
            }
            *ready = true;
        }

        debug!(object = %self.config.ready_object, "Remote objects ready");
        proxy.init();
        self.objects_ready.dispatch(&[]);
    }

    fn object(&self, name: &str) -> Option<Arc<RemoteObjectProxy>> {
        self.objects.read().get(name).cloned()
    }
}

/// Client end of the remote object protocol.
///
/// Cloning a `Channel` yields another handle to the same session.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Bind a channel to `transport` with the default configuration.
    pub fn connect(transport: Arc<dyn Transport>, on_ready: Option<ReadyCallback>) -> Result<Self> {
        Self::connect_with_config(transport, ChannelConfig::default(), on_ready)
    }

    /// Bind a channel to `transport`.
    ///
    /// Installs the channel as the transport's inbound handler, sends the
    /// `initialize` handshake unless disabled, then calls `on_ready`. The
    /// host's object definitions arrive later; use
    /// [`on_objects_ready`](Self::on_objects_ready) to wait for them.
    pub fn connect_with_config(
        transport: Arc<dyn Transport>,
        config: ChannelConfig,
        on_ready: Option<ReadyCallback>,
    ) -> Result<Self> {
        if !transport.is_connected() {
            return Err(ChannelError::InvalidTransport(format!(
                "transport `{}` cannot send",
                transport.name()
            )));
        }

        let inner = Arc::new_cyclic(|this| ChannelInner {
            transport: transport.clone(),
            codec: JsonCodec,
            config,
            this: this.clone(),
            next_id: AtomicU64::new(0),
            pending: Mutex::new(HashMap::new()),
            objects: RwLock::new(HashMap::new()),
            ready: Mutex::new(false),
            objects_ready: SignalEmitter::new("objectsReady"),
            stats: Mutex::new(ChannelStats::default()),
        });

        // The transport only holds a weak handle so the two can drop independently.
        let weak = Arc::downgrade(&inner);
        transport.set_message_handler(Arc::new(move |text: &str| match weak.upgrade() {
            Some(inner) => inner.receive(text),
            None => debug!("Channel dropped, discarding inbound message"),
        }));

        let channel = Channel { inner };

        if channel.inner.config.send_handshake {
            channel.send(&OutgoingMessage::initialize())?;
        }

        if let Some(on_ready) = on_ready {
            on_ready(&channel);
        }

        Ok(channel)
    }

    /// Encode `message` and hand it to the transport
    pub fn send(&self, message: &OutgoingMessage) -> Result<()> {
        self.inner.send(message)
    }

    /// Hand text that is already in wire form to the transport
    pub fn send_raw(&self, text: &str) -> Result<()> {
        self.inner.send_raw(text)
    }

    /// Send a request, correlating the response when `callback` is given.
    ///
    /// Without a callback no id is allocated and the request is one-way.
    /// With one, the callback runs exactly once with the response `data`.
    pub fn invoke(
        &self,
        message: OutgoingMessage,
        callback: Option<ResponseCallback>,
    ) -> Result<Option<RequestId>> {
        match callback {
            Some(callback) => self.inner.request(message, callback).map(Some),
            None => self.inner.notify(message).map(|()| None),
        }
    }

    /// Transport entry point. Protocol anomalies are logged and the message dropped.
    pub fn receive(&self, raw: &str) {
        self.inner.receive(raw);
    }

    /// Same dispatch as [`receive`](Self::receive), returning the anomaly instead of logging it.
    pub fn try_receive(&self, raw: &str) -> Result<()> {
        self.inner.try_receive(raw)
    }

    pub fn object(&self, name: &str) -> Option<Arc<RemoteObjectProxy>> {
        self.inner.object(name)
    }

    pub fn object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.objects.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Requests still waiting for a response
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn is_pending(&self, id: RequestId) -> bool {
        self.inner.pending.lock().contains_key(&id)
    }

    /// Whether the ready object has been registered
    pub fn is_ready(&self) -> bool {
        *self.inner.ready.lock()
    }

    /// Run `callback` once the host's objects are registered, or right away
    /// if they already are.
    pub fn on_objects_ready(&self, callback: Callback) {
        let ready = self.inner.ready.lock();
        if *ready {
            drop(ready);
            callback(&[]);
        } else {
            self.inner.objects_ready.subscribe(callback);
        }
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> ChannelStats {
        self.inner.stats.lock().clone()
    }

    pub fn transport(&self) -> Arc<dyn Transport> {
        self.inner.transport.clone()
    }
}

impl std::fmt::Debug for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("transport", &self.inner.transport.name())
            .field("objects", &self.object_names())
            .field("pending_requests", &self.pending_requests())
            .field("ready", &self.is_ready())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::callback;
    use crate::transport::memory::MemoryTransport;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;

    fn setup() -> (Arc<MemoryTransport>, Channel) {
        let transport = Arc::new(MemoryTransport::new("test"));
        let channel = Channel::connect(transport.clone(), None).unwrap();
        transport.take_sent();
        (transport, channel)
    }

    fn sent_json(transport: &MemoryTransport) -> Vec<Value> {
        transport
            .sent()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    fn capture() -> (ResponseCallback, Arc<Mutex<Vec<Value>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (Box::new(move |data: Value| sink.lock().push(data)), seen)
    }

    #[test]
    fn test_connect_sends_handshake_and_installs_handler() {
        let transport = Arc::new(MemoryTransport::new("test"));
        let called = Arc::new(AtomicUsize::new(0));
        let counter = called.clone();

        let channel = Channel::connect(
            transport.clone(),
            Some(Box::new(move |channel: &Channel| {
                assert!(channel.object_names().is_empty());
                counter.fetch_add(1, Ordering::Relaxed);
            })),
        )
        .unwrap();

        assert_eq!(transport.sent(), vec![r#"{"type":"initialize"}"#]);
        assert!(transport.has_handler());
        assert_eq!(called.load(Ordering::Relaxed), 1);
        assert!(!channel.is_ready());
    }

    #[test]
    fn test_connect_rejects_unusable_transport() {
        let transport = Arc::new(MemoryTransport::new("dead"));
        transport.set_connected(false);

        let err = Channel::connect(transport.clone(), None).unwrap_err();
        assert!(matches!(err, ChannelError::InvalidTransport(_)));
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_handshake_can_be_disabled() {
        let transport = Arc::new(MemoryTransport::new("test"));
        let config = ChannelConfig::new().with_handshake(false);
        let _channel = Channel::connect_with_config(transport.clone(), config, None).unwrap();
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn test_invoke_with_callback_correlates_response() {
        let (transport, channel) = setup();
        let (cb, seen) = capture();

        let id = channel
            .invoke(OutgoingMessage::invoke_method("w", "get", vec![]), Some(cb))
            .unwrap()
            .unwrap();
        assert_eq!(id, RequestId(1));
        assert!(channel.is_pending(id));
        assert_eq!(sent_json(&transport)[0]["id"], json!(1));

        channel.receive(r#"{"type":"response","id":1,"data":{"v":7}}"#);
        assert_eq!(*seen.lock(), vec![json!({"v": 7})]);
        assert!(!channel.is_pending(id));

        // A second response for the same id no longer matches
        let err = channel
            .try_receive(r#"{"type":"response","id":1,"data":0}"#)
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownRequestId(_)));
        assert_eq!(seen.lock().len(), 1);
    }

    #[test]
    fn test_request_ids_strictly_increase() {
        let (_transport, channel) = setup();
        let ids: Vec<RequestId> = (0..3)
            .map(|_| {
                channel
                    .invoke(
                        OutgoingMessage::invoke_method("w", "get", vec![]),
                        Some(Box::new(|_| {})),
                    )
                    .unwrap()
                    .unwrap()
            })
            .collect();
        assert_eq!(ids, vec![RequestId(1), RequestId(2), RequestId(3)]);
        assert_eq!(channel.pending_requests(), 3);
    }

    #[test]
    fn test_invoke_without_callback_allocates_nothing() {
        let (transport, channel) = setup();

        let id = channel
            .invoke(OutgoingMessage::invoke_method("w", "poke", vec![]), None)
            .unwrap();
        assert_eq!(id, None);
        assert_eq!(channel.pending_requests(), 0);
        assert!(sent_json(&transport)[0].get("id").is_none());

        // The next correlated request still gets the first id
        let id = channel
            .invoke(
                OutgoingMessage::invoke_method("w", "get", vec![]),
                Some(Box::new(|_| {})),
            )
            .unwrap();
        assert_eq!(id, Some(RequestId(1)));
    }

    #[test]
    fn test_unknown_response_leaves_other_requests_alone() {
        let (_transport, channel) = setup();
        let (cb, seen) = capture();
        channel
            .invoke(OutgoingMessage::invoke_method("w", "get", vec![]), Some(cb))
            .unwrap();

        let err = channel
            .try_receive(r#"{"type":"response","id":99,"data":null}"#)
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownRequestId(_)));

        let err = channel
            .try_receive(r#"{"type":"response","data":null}"#)
            .unwrap_err();
        assert!(matches!(err, ChannelError::UnknownRequestId(_)));

        assert!(seen.lock().is_empty());
        assert!(channel.is_pending(RequestId(1)));
    }

    #[test]
    fn test_failed_send_removes_pending_entry() {
        let (transport, channel) = setup();
        transport.set_connected(false);

        let err = channel
            .invoke(
                OutgoingMessage::invoke_method("w", "get", vec![]),
                Some(Box::new(|_| {})),
            )
            .unwrap_err();
        assert!(matches!(err, ChannelError::Transport(_)));
        assert_eq!(channel.pending_requests(), 0);
    }

    #[test]
    fn test_malformed_messages_do_not_break_the_channel() {
        let (_transport, channel) = setup();

        for raw in ["not json", "[1,2,3]", "17", r#"{"type":7}"#] {
            let err = channel.try_receive(raw).unwrap_err();
            assert!(matches!(err, ChannelError::MalformedMessage(_)), "{raw}");
        }
        let err = channel.try_receive(r#"{"type":"mystery"}"#).unwrap_err();
        assert!(matches!(err, ChannelError::UnrecognizedMessage(_)));

        channel.receive("still not json");
        channel.receive(r#"{"w":{"methods":{"get":0}},"self":{}}"#);
        assert!(channel.object("w").is_some());
        assert!(channel.is_ready());

        let stats = channel.stats();
        assert_eq!(stats.messages_received, 7);
        assert_eq!(stats.messages_dropped, 6);
        assert_eq!(stats.objects_registered, 2);
    }

    #[test]
    fn test_ready_hook_fires_once() {
        let (_transport, channel) = setup();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = fired.clone();
        channel.on_objects_ready(callback(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));

        channel.receive(r#"{"a":{}}"#);
        assert_eq!(fired.load(Ordering::Relaxed), 0);

        channel.receive(r#"{"b":{},"self":{}}"#);
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert!(channel.object("self").unwrap().is_initialized());

        channel.receive(r#"{"c":{}}"#);
        channel.receive(r#"{"self":{}}"#);
        assert_eq!(fired.load(Ordering::Relaxed), 1);

        // Late subscribers run immediately
        let late = Arc::new(AtomicUsize::new(0));
        let counter = late.clone();
        channel.on_objects_ready(callback(move |_| {
            counter.fetch_add(1, Ordering::Relaxed);
        }));
        assert_eq!(late.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_custom_ready_object() {
        let transport = Arc::new(MemoryTransport::new("test"));
        let config = ChannelConfig::new().with_ready_object("backend");
        let channel = Channel::connect_with_config(transport, config, None).unwrap();

        channel.receive(r#"{"self":{}}"#);
        assert!(!channel.is_ready());
        channel.receive(r#"{"object":"backend","data":{}}"#);
        assert!(channel.is_ready());
    }

    #[test]
    fn test_redefinition_keeps_original_proxy() {
        let (_transport, channel) = setup();
        channel.receive(r#"{"w":{"methods":{"get":0}}}"#);
        let original = channel.object("w").unwrap();

        channel.receive(r#"{"w":{"methods":{"other":2}}}"#);
        let current = channel.object("w").unwrap();
        assert!(Arc::ptr_eq(&original, &current));
        assert_eq!(current.method_arity("get"), Some(0));
        assert_eq!(current.method_arity("other"), None);
    }

    #[test]
    fn test_updates_for_unknown_objects_are_dropped() {
        let (_transport, channel) = setup();

        channel
            .try_receive(r#"{"type":"propertyUpdate","data":{"ghost":{"value":[1]}}}"#)
            .unwrap();
        channel
            .try_receive(r#"{"type":"signal","object":"ghost","signal":"boo","args":[]}"#)
            .unwrap();
        assert!(channel.object("ghost").is_none());
        assert!(channel.object_names().is_empty());
    }

    #[test]
    fn test_definitions_with_extra_members_register() {
        let (_transport, channel) = setup();

        channel
            .try_receive(r#"{"widget":{"methods":{"get":0},"enums":{}},"self":{}}"#)
            .unwrap();
        assert!(channel.is_ready());
        assert_eq!(channel.object_names(), vec!["self", "widget"]);
        assert_eq!(channel.object("widget").unwrap().method_arity("get"), Some(0));
    }

    #[test]
    fn test_bad_update_entry_does_not_block_the_rest() {
        let (_transport, channel) = setup();
        channel.receive(r#"{"widget":{"properties":{"value":0}}}"#);
        let widget = channel.object("widget").unwrap();

        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        widget
            .connect_property(
                "value",
                callback(move |_| {
                    counter.fetch_add(1, Ordering::Relaxed);
                }),
            )
            .unwrap();

        channel
            .try_receive(r#"{"type":"propertyUpdate","data":{"ghost":5,"widget":{"value":[1]}}}"#)
            .unwrap();
        assert_eq!(widget.property("value"), Some(json!(1)));
        assert_eq!(notified.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_callback_may_reenter_channel() {
        let (transport, channel) = setup();
        let inner_channel = channel.clone();

        channel
            .invoke(
                OutgoingMessage::invoke_method("w", "first", vec![]),
                Some(Box::new(move |_| {
                    inner_channel
                        .invoke(OutgoingMessage::invoke_method("w", "second", vec![]), None)
                        .unwrap();
                })),
            )
            .unwrap();

        channel.receive(r#"{"type":"response","id":1,"data":null}"#);
        let sent = sent_json(&transport);
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[1]["method"], json!("second"));
    }

    #[test]
    fn test_dropped_channel_ignores_inbound() {
        let transport = Arc::new(MemoryTransport::new("test"));
        let channel = Channel::connect(transport.clone(), None).unwrap();
        drop(channel);

        assert!(transport.deliver(r#"{"self":{}}"#));
    }

    #[test]
    fn test_send_raw_passes_text_through() {
        let (transport, channel) = setup();
        channel.send_raw(r#"{"type":"custom"}"#).unwrap();
        assert_eq!(transport.sent(), vec![r#"{"type":"custom"}"#]);
    }
}
