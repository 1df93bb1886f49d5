//! # Account Events
//!
//! The binding flow publishes [`AccountEvent`]s on a `tokio::sync::broadcast`
//! channel. Hosts subscribe to drive UI refreshes, audit logs or tests.
//!
//! ```rust
//! use core_runtime::events::{AccountEvent, CoreEvent, EventBus};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let event_bus = EventBus::new(16);
//! let mut subscriber = event_bus.subscribe();
//!
//! event_bus.emit(CoreEvent::Account(AccountEvent::BindingStarted {
//!     account_type: "com".to_string(),
//! }));
//!
//! let event = subscriber.recv().await.unwrap();
//! assert_eq!(event.description(), "Account binding started");
//! # }
//! ```
//!
//! A subscriber that falls more than the buffer size behind gets
//! `RecvError::Lagged(n)` once and then continues with the oldest retained
//! event. `RecvError::Closed` means every bus handle was dropped.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::trace;

pub use tokio::sync::broadcast::error::RecvError;
pub use tokio::sync::broadcast::Receiver;

pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Envelope for everything published on the bus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Account(AccountEvent),
}

impl CoreEvent {
    pub fn description(&self) -> &'static str {
        match self {
            CoreEvent::Account(event) => event.description(),
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Account(event) => event.severity(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

/// Lifecycle of the single bound storage account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum AccountEvent {
    /// A pending binding was stored and the user sent to the provider.
    BindingStarted { account_type: String },
    /// The callback exchanged the code and persisted the tokens.
    Bound {
        account_type: String,
        /// Access token expiry, `YYYY-MM-DD HH:MM:SS` UTC
        expires_at: String,
    },
    /// The callback failed after its pending binding was found.
    BindingFailed {
        /// Never contains credentials
        message: String,
        /// Starting a new binding may succeed
        recoverable: bool,
    },
    Unbound,
    /// Provider profile data (`extend`) was rewritten.
    ExtendRefreshed,
}

impl AccountEvent {
    pub fn description(&self) -> &'static str {
        match self {
            AccountEvent::BindingStarted { .. } => "Account binding started",
            AccountEvent::Bound { .. } => "Account bound successfully",
            AccountEvent::BindingFailed { .. } => "Account binding failed",
            AccountEvent::Unbound => "Account unbound",
            AccountEvent::ExtendRefreshed => "Account profile refreshed",
        }
    }

    pub fn severity(&self) -> EventSeverity {
        match self {
            AccountEvent::BindingFailed { recoverable: true, .. } => EventSeverity::Warning,
            AccountEvent::BindingFailed { .. } => EventSeverity::Error,
            AccountEvent::Bound { .. } | AccountEvent::Unbound => EventSeverity::Info,
            AccountEvent::BindingStarted { .. } | AccountEvent::ExtendRefreshed => {
                EventSeverity::Debug
            }
        }
    }
}

/// Cloneable handle to one broadcast channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// `capacity` bounds how far a subscriber may fall behind before it lags.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to current subscribers and return how many received it.
    ///
    /// An event nobody listens to is dropped and reported as `0`.
    pub fn emit(&self, event: CoreEvent) -> usize {
        match self.sender.send(event) {
            Ok(delivered) => delivered,
            Err(broadcast::error::SendError(event)) => {
                trace!(event = event.description(), "No event subscribers");
                0
            }
        }
    }

    /// New receiver for events emitted from now on.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

type Predicate = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// Receiver that skips events rejected by a predicate.
///
/// ```rust
/// use core_runtime::events::{AccountEvent, CoreEvent, EventBus, EventStream};
///
/// let event_bus = EventBus::default();
/// let failures = EventStream::new(event_bus.subscribe()).filter(|event| {
///     matches!(event, CoreEvent::Account(AccountEvent::BindingFailed { .. }))
/// });
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    predicate: Option<Predicate>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            predicate: None,
        }
    }

    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Box::new(predicate));
        self
    }

    fn wants(&self, event: &CoreEvent) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(event),
            None => true,
        }
    }

    /// Wait for the next accepted event.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.wants(&event) {
                return Ok(event);
            }
        }
    }

    /// Next accepted event already buffered, if any.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            let event = match self.receiver.try_recv() {
                Ok(event) => event,
                Err(TryRecvError::Empty) => return None,
                Err(TryRecvError::Lagged(missed)) => return Some(Err(RecvError::Lagged(missed))),
                Err(TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            };
            if self.wants(&event) {
                return Some(Ok(event));
            }
        }
    }
}
