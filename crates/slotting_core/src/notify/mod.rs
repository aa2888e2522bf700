//! Change notification for downstream alerting and audit.
//!
//! # Responsibility
//! - Describe committed structural/content changes as discrete events.
//! - Deliver events to external sinks without blocking commands.
//!
//! # Invariants
//! - Events are emitted only after the owning command committed.
//! - Delivery failures and sink panics are logged and never reach the
//!   command caller.
//! - An event a sink could not take stays queued for that sink and is
//!   redelivered later.

pub mod change_notifier;
pub mod event;

pub use change_notifier::{
    ChangeNotifier, DeliveryPolicy, MemorySink, NotificationSink, SinkError,
};
pub use event::{ChangeEvent, ChangeEventKind};
