use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

use crate::channel::{ChannelInner, ResponseCallback};
use crate::error::{ChannelError, Result};
use crate::message::types::RequestId;
use crate::message::{ObjectDefinition, OutgoingMessage};
use crate::signal::{Callback, SignalEmitter};

struct Property {
    value: Value,
    notifier: Option<Arc<SignalEmitter>>,
}

struct RemoteSignal {
    arg_types: Vec<Value>,
    emitter: Arc<SignalEmitter>,
}

/// Local stand-in for one object living in the host.
///
/// Members are looked up by name: methods by their declared arity,
/// properties as cached values with optional change notifiers, and signals
/// as [`SignalEmitter`]s.
pub struct RemoteObjectProxy {
    id: String,
    channel: Weak<ChannelInner>,
    methods: BTreeMap<String, usize>,
    properties: RwLock<BTreeMap<String, Property>>,
    signals: BTreeMap<String, RemoteSignal>,
    initialized: AtomicBool,
}

impl RemoteObjectProxy {
    pub(crate) fn new(
        id: String,
        definition: ObjectDefinition,
        channel: Weak<ChannelInner>,
    ) -> Self {
        let properties = definition
            .properties
            .into_iter()
            .map(|(name, value)| {
                let property = Property {
                    value,
                    notifier: None,
                };
                (name, property)
            })
            .collect();

        let signals = definition
            .signals
            .into_iter()
            .map(|(name, arg_types)| {
                let signal = RemoteSignal {
                    arg_types,
                    emitter: Arc::new(SignalEmitter::new(name.clone())),
                };
                (name, signal)
            })
            .collect();

        Self {
            id,
            channel,
            methods: definition.methods,
            properties: RwLock::new(properties),
            signals,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether the channel has run this object's readiness hook
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn init(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    // Methods

    pub fn method_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.methods.keys().map(String::as_str)
    }

    pub fn method_arity(&self, method: &str) -> Option<usize> {
        self.methods.get(method).copied()
    }

    /// Invoke a remote method.
    ///
    /// `args` may be shorter than the declared arity; missing trailing slots
    /// are sent as `null` so the host always receives exactly `arity`
    /// arguments. With a callback the call is correlated and the returned id
    /// identifies it.
    pub fn invoke_method(
        &self,
        method: &str,
        args: Vec<Value>,
        callback: Option<ResponseCallback>,
    ) -> Result<Option<RequestId>> {
        let message = self.method_message(method, args)?;
        let channel = self.channel.upgrade().ok_or(ChannelError::ChannelClosed)?;

        match callback {
            Some(callback) => channel.request(message, callback).map(Some),
            None => channel.notify(message).map(|()| None),
        }
    }

    /// One-way method call
    pub fn call(&self, method: &str, args: Vec<Value>) -> Result<()> {
        self.invoke_method(method, args, None).map(|_| ())
    }

    /// Method call whose response data is passed to `on_response`
    pub fn call_with_callback<F>(
        &self,
        method: &str,
        args: Vec<Value>,
        on_response: F,
    ) -> Result<RequestId>
    where
        F: FnOnce(Value) + Send + 'static,
    {
        let message = self.method_message(method, args)?;
        let channel = self.channel.upgrade().ok_or(ChannelError::ChannelClosed)?;
        channel.request(message, Box::new(on_response))
    }

    fn method_message(&self, method: &str, mut args: Vec<Value>) -> Result<OutgoingMessage> {
        let arity = self
            .method_arity(method)
            .ok_or_else(|| self.unknown_member(method))?;

        if args.len() > arity {
            return Err(ChannelError::TooManyArguments {
                method: method.to_string(),
                arity,
                given: args.len(),
            });
        }
        args.resize(arity, Value::Null);

        Ok(OutgoingMessage::invoke_method(&self.id, method, args))
    }

    // Properties

    pub fn property_names(&self) -> Vec<String> {
        self.properties.read().keys().cloned().collect()
    }

    /// Cached value of a property
    pub fn property(&self, name: &str) -> Option<Value> {
        self.properties.read().get(name).map(|p| p.value.clone())
    }

    /// Snapshot of every cached property value
    pub fn properties(&self) -> Map<String, Value> {
        self.properties
            .read()
            .iter()
            .map(|(name, p)| (name.clone(), p.value.clone()))
            .collect()
    }

    /// Change notifier of a property, attached on first request
    pub fn property_notifier(&self, name: &str) -> Option<Arc<SignalEmitter>> {
        let mut properties = self.properties.write();
        let property = properties.get_mut(name)?;
        let notifier = property
            .notifier
            .get_or_insert_with(|| Arc::new(SignalEmitter::new(format!("{}Changed", name))));
        Some(notifier.clone())
    }

    /// Subscribe to changes of a declared property
    pub fn connect_property(&self, name: &str, callback: Callback) -> Result<()> {
        let notifier = self
            .property_notifier(name)
            .ok_or_else(|| self.invalid_callback(name))?;
        notifier.subscribe(callback);
        Ok(())
    }

    pub fn disconnect_property(&self, name: &str, callback: &Callback) -> bool {
        let notifier = self
            .properties
            .read()
            .get(name)
            .and_then(|p| p.notifier.clone());
        notifier.is_some_and(|n| n.unsubscribe(callback))
    }

    /// Apply the changes of one property update message.
    ///
    /// Each change carries the notifier arguments; a single argument becomes
    /// the cached value, several become a list. Notifiers run after the
    /// cache is updated, once per changed property.
    pub(crate) fn property_update(&self, changes: Map<String, Value>) {
        let mut notifications = Vec::new();

        {
            let mut properties = self.properties.write();
            for (name, change) in changes {
                let Some(property) = properties.get_mut(&name) else {
                    debug!(object = %self.id, property = %name, "Update for undeclared property ignored");
                    continue;
                };

                let args = match change {
                    Value::Array(args) => args,
                    other => vec![other],
                };
                match args.as_slice() {
                    [] => {}
                    [value] => property.value = value.clone(),
                    _ => property.value = Value::Array(args.clone()),
                }

                if let Some(notifier) = &property.notifier {
                    notifications.push((notifier.clone(), args));
                }
            }
        }

        for (notifier, args) in notifications {
            notifier.dispatch(&args);
        }
    }

    // Signals

    pub fn signal_names(&self) -> impl Iterator<Item = &str> + '_ {
        self.signals.keys().map(String::as_str)
    }

    pub fn signal(&self, name: &str) -> Option<Arc<SignalEmitter>> {
        self.signals.get(name).map(|s| s.emitter.clone())
    }

    /// Argument types the host declared for a signal
    pub fn signal_arg_types(&self, name: &str) -> Option<&[Value]> {
        self.signals.get(name).map(|s| s.arg_types.as_slice())
    }

    /// Subscribe to a declared signal.
    ///
    /// Fails with [`ChannelError::InvalidCallback`] when the object declares
    /// no such signal.
    pub fn connect(&self, signal: &str, callback: Callback) -> Result<()> {
        let emitter = self.signal(signal).ok_or_else(|| self.invalid_callback(signal))?;
        emitter.subscribe(callback);
        Ok(())
    }

    pub fn disconnect(&self, signal: &str, callback: &Callback) -> bool {
        self.signal(signal).is_some_and(|e| e.unsubscribe(callback))
    }

    pub(crate) fn signal_emitted(&self, signal: &str, args: &[Value]) {
        match self.signals.get(signal) {
            Some(s) => s.emitter.dispatch(args),
            None => debug!(object = %self.id, signal, "Undeclared signal dropped"),
        }
    }

    fn unknown_member(&self, member: &str) -> ChannelError {
        ChannelError::UnknownMember {
            object: self.id.clone(),
            member: member.to_string(),
        }
    }

    fn invalid_callback(&self, member: &str) -> ChannelError {
        ChannelError::InvalidCallback {
            object: self.id.clone(),
            member: member.to_string(),
        }
    }
}

impl std::fmt::Debug for RemoteObjectProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteObjectProxy")
            .field("id", &self.id)
            .field("methods", &self.methods)
            .field("properties", &self.property_names())
            .field("signals", &self.signals.keys().collect::<Vec<_>>())
            .finish()
    }
}
