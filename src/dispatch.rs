//! Routes inbound events to handlers registered by event name.
//!
//! Registration happens on an [`EventDispatcherBuilder`]; [`build`] freezes
//! it into an [`EventDispatcher`] that can be cloned onto any task. Events
//! whose `Event-Name` has no handlers go to the default handler, which logs
//! them until replaced by registering under [`DEFAULT_HANDLER_KEY`].
//!
//! ```
//! use freeswitch_esl_control::{EslEvent, EslEventType, EventDispatcher, HandlerResult};
//!
//! let dispatcher = EventDispatcher::builder()
//!     .register("CHANNEL_ANSWER", |addr: &str, event: &EslEvent| -> HandlerResult {
//!         println!("{} answered on {}", event.unique_id().unwrap_or("?"), addr);
//!         Ok(())
//!     })
//!     .build();
//!
//! let outcome = dispatcher.dispatch("127.0.0.1:8021", &EslEvent::with_type(EslEventType::ChannelAnswer));
//! assert_eq!(outcome.invoked, 1);
//! ```
//!
//! [`build`]: EventDispatcherBuilder::build

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::{
    connection::EslEventStream,
    constants::DEFAULT_HANDLER_KEY,
    error::{EslError, HandlerResult},
    event::{EslEvent, EslEventType},
};

/// Reacts to one event from the connection at `addr`.
///
/// Runs inline on the dispatching task; hand long work to `tokio::spawn`.
pub trait EventHandler: Send + Sync {
    fn handle(&self, addr: &str, event: &EslEvent) -> HandlerResult;
}

impl<F> EventHandler for F
where
    F: Fn(&str, &EslEvent) -> HandlerResult + Send + Sync,
{
    fn handle(&self, addr: &str, event: &EslEvent) -> HandlerResult {
        self(addr, event)
    }
}

/// Default handler: logs the event and does nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn handle(&self, addr: &str, event: &EslEvent) -> HandlerResult {
        debug!(
            "[{}] unhandled event {} (Unique-ID: {})",
            addr,
            event
                .event_name()
                .unwrap_or("<unnamed>"),
            event
                .unique_id()
                .unwrap_or("-")
        );
        Ok(())
    }
}

/// Delivery entry points used by a connection.
pub trait EslEventListener {
    fn event_received(&self, addr: &str, event: &EslEvent);

    /// Completion of an earlier asynchronous command.
    fn background_job_result_received(&self, addr: &str, event: &EslEvent);

    /// Route to the entry point matching the event kind.
    fn deliver_event(&self, addr: &str, event: &EslEvent) {
        if event.is_background_job() {
            self.background_job_result_received(addr, event);
        } else {
            self.event_received(addr, event);
        }
    }
}

/// Handler shared between registrations.
pub type SharedHandler = Arc<dyn EventHandler>;

/// Handler registrations under construction.
pub struct EventDispatcherBuilder {
    handlers: HashMap<String, Vec<SharedHandler>>,
    default_handler: SharedHandler,
}

impl Default for EventDispatcherBuilder {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            default_handler: Arc::new(LoggingHandler),
        }
    }
}

impl fmt::Debug for EventDispatcherBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcherBuilder")
            .field("keys", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventDispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `handler` to the list for `key`.
    ///
    /// Handlers for the same key run in registration order; registering the
    /// same handler twice runs it twice. `"default"` replaces the fallback
    /// handler instead. Keys are matched exactly as given; blank keys are
    /// ignored.
    pub fn register(self, key: impl AsRef<str>, handler: impl EventHandler + 'static) -> Self {
        self.register_shared(key, Arc::new(handler))
    }

    /// Register an already shared handler, e.g. one used under several keys.
    pub fn register_shared(mut self, key: impl AsRef<str>, handler: SharedHandler) -> Self {
        let key = key.as_ref();
        if key
            .trim()
            .is_empty()
        {
            warn!("Ignoring event handler registered under a blank key");
            return self;
        }
        if key == DEFAULT_HANDLER_KEY {
            info!("Replacing default event handler");
            self.default_handler = handler;
            return self;
        }
        info!("Registering event handler for {}", key);
        self.handlers
            .entry(key.to_string())
            .or_default()
            .push(handler);
        self
    }

    pub fn register_type(self, event_type: EslEventType, handler: impl EventHandler + 'static) -> Self {
        self.register(event_type.as_str(), handler)
    }

    /// Register every `(key, handler)` pair in order.
    pub fn extend<I, K>(self, handlers: I) -> Self
    where
        I: IntoIterator<Item = (K, SharedHandler)>,
        K: AsRef<str>,
    {
        handlers
            .into_iter()
            .fold(self, |builder, (key, handler)| builder.register_shared(key, handler))
    }

    /// Freeze the registrations.
    pub fn build(self) -> EventDispatcher {
        info!(
            "Event dispatcher ready with {} event name(s)",
            self.handlers
                .len()
        );
        EventDispatcher {
            inner: Arc::new(self),
        }
    }
}

/// Per-event dispatch summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOutcome {
    /// Handlers called, including the default handler.
    pub invoked: usize,
    /// Handlers that returned an error or panicked.
    pub failed: usize,
    /// Whether the default handler took the event.
    pub defaulted: bool,
}

/// Immutable handler registry. Cloning shares the same registrations.
#[derive(Clone)]
pub struct EventDispatcher {
    inner: Arc<EventDispatcherBuilder>,
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EventDispatcher")
            .field(&self.inner)
            .finish()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        EventDispatcherBuilder::new().build()
    }
}

impl EventDispatcher {
    pub fn builder() -> EventDispatcherBuilder {
        EventDispatcherBuilder::new()
    }

    /// Number of handlers registered for `key`.
    pub fn handler_count(&self, key: &str) -> usize {
        self.inner
            .handlers
            .get(key)
            .map_or(0, Vec::len)
    }

    /// Run every handler registered for the event's name, or the default
    /// handler when there are none.
    pub fn dispatch(&self, addr: &str, event: &EslEvent) -> DispatchOutcome {
        let name = event
            .event_name()
            .unwrap_or("");
        let mut outcome = DispatchOutcome::default();

        match self
            .inner
            .handlers
            .get(name)
            .filter(|list| !list.is_empty())
        {
            Some(list) => {
                trace!("[{}] {} -> {} handler(s)", addr, name, list.len());
                for handler in list {
                    outcome.invoked += 1;
                    if !invoke(handler.as_ref(), addr, name, event) {
                        outcome.failed += 1;
                    }
                }
            }
            None => {
                outcome.invoked = 1;
                outcome.defaulted = true;
                if !invoke(self.inner.default_handler.as_ref(), addr, name, event) {
                    outcome.failed = 1;
                }
            }
        }
        outcome
    }

    /// Deliver every event from `events` until the connection's reader stops.
    ///
    /// Dropped-event markers and undecodable frames are logged and skipped.
    pub async fn run(&self, addr: &str, mut events: EslEventStream) {
        info!("[{}] Event dispatch started", addr);
        while let Some(item) = events
            .recv()
            .await
        {
            match item {
                Ok(event) => self.deliver_event(addr, &event),
                Err(EslError::QueueFull) => {
                    warn!("[{}] Events were dropped before dispatch", addr)
                }
                Err(e) => warn!("[{}] Skipping undecodable event: {}", addr, e),
            }
        }
        info!("[{}] Event dispatch stopped: {:?}", addr, events.status());
    }
}

impl EslEventListener for EventDispatcher {
    fn event_received(&self, addr: &str, event: &EslEvent) {
        self.dispatch(addr, event);
    }

    fn background_job_result_received(&self, addr: &str, event: &EslEvent) {
        debug!(
            "[{}] Background job {} finished",
            addr,
            event
                .job_uuid()
                .unwrap_or("-")
        );
        self.dispatch(addr, event);
    }
}

/// Returns `false` if the handler failed or panicked.
fn invoke(handler: &dyn EventHandler, addr: &str, name: &str, event: &EslEvent) -> bool {
    match catch_unwind(AssertUnwindSafe(|| handler.handle(addr, event))) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            warn!("[{}] Handler for {} failed: {}", addr, name, e);
            false
        }
        Err(panic) => {
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| {
                    panic
                        .downcast_ref::<String>()
                        .cloned()
                })
                .unwrap_or_else(|| "unknown panic".to_string());
            error!("[{}] Handler for {} panicked: {}", addr, name, message);
            false
        }
    }
}
