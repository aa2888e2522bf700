//! Background change-event dispatcher.
//!
//! # Responsibility
//! - Queue committed events and hand them to sinks on a worker thread.
//! - Keep what a sink could not take in that sink's backlog and redeliver
//!   it on the next event, flush or redelivery tick.
//!
//! # Invariants
//! - `emit` never waits on a sink.
//! - Events reach each sink in emit order; a deferred event blocks only the
//!   events queued behind it for the same sink.
//! - A sink failure or panic never affects other sinks, the dispatcher
//!   thread or the emitting command.
//! - A backlog holds at most `backlog_limit` events; overflow drops the
//!   oldest event with an error log.

use crate::config::{DEFAULT_NOTIFY_BACKLOG_LIMIT, DEFAULT_NOTIFY_MAX_ATTEMPTS};
use crate::notify::event::ChangeEvent;
use log::{error, warn};
use std::any::Any;
use std::collections::VecDeque;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

const RETRY_BACKOFF_MS: u64 = 5;
const REDELIVERY_INTERVAL_MS: u64 = 50;

/// Failure reported by a notification sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkError(pub String);

impl Display for SinkError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification sink failed: {}", self.0)
    }
}

impl Error for SinkError {}

/// Retry and buffering limits of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryPolicy {
    /// Immediate attempts per delivery pass before an event is deferred.
    pub max_attempts: u32,
    /// Events kept per sink while it keeps failing.
    pub backlog_limit: usize,
}

impl Default for DeliveryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_NOTIFY_MAX_ATTEMPTS,
            backlog_limit: DEFAULT_NOTIFY_BACKLOG_LIMIT,
        }
    }
}

/// External consumer of change events.
///
/// `deliver` may be called again with an event it already received when an
/// earlier call failed; consumers dedupe by `sequence`.
pub trait NotificationSink: Send + Sync {
    /// Short stable name used in logs.
    fn name(&self) -> &str;
    fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError>;
}

/// In-memory sink that records every delivered event.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ChangeEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of the recorded events in delivery order.
    pub fn events(&self) -> Vec<ChangeEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl NotificationSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        let mut events = self
            .events
            .lock()
            .map_err(|_| SinkError("memory sink lock poisoned".to_string()))?;
        events.push(event.clone());
        Ok(())
    }
}

enum Message {
    Event(ChangeEvent),
    Flush(Sender<()>),
}

/// Fire-and-forget event dispatcher.
pub struct ChangeNotifier {
    sender: Mutex<Option<Sender<Message>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_sequence: AtomicU64,
}

impl ChangeNotifier {
    /// Starts a dispatcher thread delivering to `sinks`.
    ///
    /// With no sinks, no thread is started and events are dropped.
    pub fn spawn(sinks: Vec<Arc<dyn NotificationSink>>, policy: DeliveryPolicy) -> Self {
        if sinks.is_empty() {
            return Self::disabled();
        }
        let (sender, receiver) = mpsc::channel();
        let policy = DeliveryPolicy {
            max_attempts: policy.max_attempts.max(1),
            backlog_limit: policy.backlog_limit.max(1),
        };
        let queues = sinks.into_iter().map(SinkQueue::new).collect();
        let worker = thread::Builder::new()
            .name("slotting-notifier".to_string())
            .spawn(move || dispatch_loop(receiver, queues, policy));

        match worker {
            Ok(worker) => Self {
                sender: Mutex::new(Some(sender)),
                worker: Mutex::new(Some(worker)),
                next_sequence: AtomicU64::new(1),
            },
            Err(err) => {
                error!(
                    "event=notifier_start module=notify status=error error_code=thread_spawn_failed error={}",
                    err
                );
                Self::disabled()
            }
        }
    }

    /// Notifier that drops every event.
    pub fn disabled() -> Self {
        Self {
            sender: Mutex::new(None),
            worker: Mutex::new(None),
            next_sequence: AtomicU64::new(1),
        }
    }

    /// Queues one event, assigning its sequence number.
    pub fn emit(&self, mut event: ChangeEvent) {
        event.sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);
        let Ok(guard) = self.sender.lock() else {
            warn!(
                "event=notify_emit module=notify status=error error_code=lock_poisoned kind={}",
                event.kind.as_str()
            );
            return;
        };
        let Some(sender) = guard.as_ref() else {
            return;
        };
        if sender.send(Message::Event(event)).is_err() {
            warn!("event=notify_emit module=notify status=error error_code=dispatcher_gone");
        }
    }

    /// Blocks until every event emitted before this call went through one
    /// delivery pass.
    ///
    /// Events a sink still refuses stay in its backlog; `flush` does not wait
    /// for them.
    pub fn flush(&self) {
        let (ack_sender, ack_receiver) = mpsc::channel();
        let sent = match self.sender.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(sender) => sender.send(Message::Flush(ack_sender)).is_ok(),
                None => false,
            },
            Err(_) => false,
        };
        if sent {
            let _ = ack_receiver.recv();
        }
    }

    /// Drains queued events and stops the dispatcher thread.
    ///
    /// Events still refused after a last delivery pass are logged and lost.
    pub fn shutdown(&self) {
        if let Ok(mut guard) = self.sender.lock() {
            guard.take();
        }
        let worker = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("event=notifier_stop module=notify status=error error_code=worker_panicked");
            }
        }
    }
}

impl Drop for ChangeNotifier {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// One sink with the events it has not accepted yet.
struct SinkQueue {
    sink: Arc<dyn NotificationSink>,
    backlog: VecDeque<ChangeEvent>,
}

impl SinkQueue {
    fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            backlog: VecDeque::new(),
        }
    }

    fn push(&mut self, event: ChangeEvent, backlog_limit: usize) {
        while self.backlog.len() >= backlog_limit {
            let Some(dropped) = self.backlog.pop_front() else {
                break;
            };
            error!(
                "event=notify_deliver module=notify status=error error_code=backlog_overflow sink={} kind={} sequence={} backlog_limit={}",
                self.sink.name(),
                dropped.kind.as_str(),
                dropped.sequence,
                backlog_limit
            );
        }
        self.backlog.push_back(event);
    }

    /// Delivers the backlog front to back, stopping at the first event the
    /// sink still refuses.
    fn drain(&mut self, max_attempts: u32) {
        while let Some(event) = self.backlog.front() {
            if !deliver_with_retry(self.sink.as_ref(), event, max_attempts, self.backlog.len()) {
                return;
            }
            self.backlog.pop_front();
        }
    }
}

fn dispatch_loop(receiver: Receiver<Message>, mut queues: Vec<SinkQueue>, policy: DeliveryPolicy) {
    let redelivery_interval = Duration::from_millis(REDELIVERY_INTERVAL_MS);
    loop {
        let waiting = queues.iter().any(|queue| !queue.backlog.is_empty());
        let message = if waiting {
            match receiver.recv_timeout(redelivery_interval) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        } else {
            match receiver.recv() {
                Ok(message) => Some(message),
                Err(_) => break,
            }
        };

        match message {
            Some(Message::Event(event)) => {
                for queue in &mut queues {
                    queue.push(event.clone(), policy.backlog_limit);
                }
                drain_all(&mut queues, policy.max_attempts);
            }
            Some(Message::Flush(ack)) => {
                drain_all(&mut queues, policy.max_attempts);
                let _ = ack.send(());
            }
            None => drain_all(&mut queues, policy.max_attempts),
        }
    }

    drain_all(&mut queues, policy.max_attempts);
    for queue in &queues {
        if let Some(first) = queue.backlog.front() {
            error!(
                "event=notifier_stop module=notify status=error error_code=undelivered_at_shutdown sink={} undelivered={} first_sequence={}",
                queue.sink.name(),
                queue.backlog.len(),
                first.sequence
            );
        }
    }
}

fn drain_all(queues: &mut [SinkQueue], max_attempts: u32) {
    for queue in queues.iter_mut() {
        queue.drain(max_attempts);
    }
}

/// Tries one event up to `max_attempts` times; returns whether it landed.
fn deliver_with_retry(
    sink: &dyn NotificationSink,
    event: &ChangeEvent,
    max_attempts: u32,
    backlog: usize,
) -> bool {
    for attempt in 1..=max_attempts {
        match deliver_once(sink, event) {
            Ok(()) => return true,
            Err(err) if attempt < max_attempts => {
                warn!(
                    "event=notify_deliver module=notify status=retry sink={} kind={} sequence={} attempt={} error={}",
                    sink.name(),
                    event.kind.as_str(),
                    event.sequence,
                    attempt,
                    err
                );
                thread::sleep(Duration::from_millis(RETRY_BACKOFF_MS * u64::from(attempt)));
            }
            Err(err) => {
                warn!(
                    "event=notify_deliver module=notify status=deferred error_code=delivery_deferred sink={} kind={} sequence={} attempts={} backlog={} error={}",
                    sink.name(),
                    event.kind.as_str(),
                    event.sequence,
                    attempt,
                    backlog,
                    err
                );
            }
        }
    }
    false
}

/// Calls the sink once, turning a panic into a failed attempt.
fn deliver_once(sink: &dyn NotificationSink, event: &ChangeEvent) -> Result<(), SinkError> {
    match panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(event))) {
        Ok(result) => result,
        Err(payload) => Err(SinkError(format!(
            "sink panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::{ChangeNotifier, DeliveryPolicy, MemorySink, NotificationSink, SinkError};
    use crate::notify::event::{ChangeEvent, ChangeEventKind};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    struct FlakySink {
        failures_left: AtomicU32,
        delivered: MemorySink,
    }

    impl FlakySink {
        fn failing(times: u32) -> Self {
            Self {
                failures_left: AtomicU32::new(times),
                delivered: MemorySink::new(),
            }
        }
    }

    impl NotificationSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(SinkError("temporarily down".to_string()));
            }
            self.delivered.deliver(event)
        }
    }

    struct PanickingSink {
        panics_left: AtomicU32,
        delivered: MemorySink,
    }

    impl NotificationSink for PanickingSink {
        fn name(&self) -> &str {
            "panicking"
        }

        fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
            let left = self.panics_left.load(Ordering::SeqCst);
            if left > 0 {
                self.panics_left.store(left - 1, Ordering::SeqCst);
                panic!("sink exploded on sequence {}", event.sequence);
            }
            self.delivered.deliver(event)
        }
    }

    fn policy(max_attempts: u32, backlog_limit: usize) -> DeliveryPolicy {
        DeliveryPolicy {
            max_attempts,
            backlog_limit,
        }
    }

    fn wait_for(mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if done() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        done()
    }

    fn sequences(sink: &MemorySink) -> Vec<u64> {
        sink.events().iter().map(|event| event.sequence).collect()
    }

    #[test]
    fn delivers_in_order_with_sequence_numbers() {
        let sink = Arc::new(MemorySink::new());
        let notifier = ChangeNotifier::spawn(vec![sink.clone()], DeliveryPolicy::default());
        notifier.emit(ChangeEvent::new(ChangeEventKind::ColumnAdded, 1));
        notifier.emit(ChangeEvent::new(ChangeEventKind::RowAdded, 2));
        notifier.flush();

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, ChangeEventKind::ColumnAdded);
        assert_eq!(events[0].sequence, 1);
        assert_eq!(events[1].sequence, 2);
    }

    #[test]
    fn retries_until_sink_recovers() {
        let sink = Arc::new(FlakySink::failing(2));
        let notifier = ChangeNotifier::spawn(vec![sink.clone()], policy(3, 16));
        notifier.emit(ChangeEvent::new(ChangeEventKind::CellUpdated, 1));
        notifier.flush();
        assert_eq!(sink.delivered.events().len(), 1);
    }

    #[test]
    fn deferred_events_are_redelivered_in_order_once_sink_recovers() {
        let sink = Arc::new(FlakySink::failing(5));
        let notifier = ChangeNotifier::spawn(vec![sink.clone()], policy(2, 16));
        notifier.emit(ChangeEvent::new(ChangeEventKind::CellUpdated, 1));
        notifier.emit(ChangeEvent::new(ChangeEventKind::RowDeleted, 2));

        assert!(wait_for(|| {
            notifier.flush();
            sink.delivered.events().len() == 2
        }));
        assert_eq!(sequences(&sink.delivered), vec![1, 2]);
        assert_eq!(sink.failures_left.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn backlog_is_retried_without_further_emits() {
        let sink = Arc::new(FlakySink::failing(3));
        let notifier = ChangeNotifier::spawn(vec![sink.clone()], policy(1, 16));
        notifier.emit(ChangeEvent::new(ChangeEventKind::MatrixCreated, 1));
        notifier.flush();
        assert!(sink.delivered.events().is_empty());

        assert!(wait_for(|| sink.delivered.events().len() == 1));
        assert_eq!(sequences(&sink.delivered), vec![1]);
    }

    #[test]
    fn backlog_overflow_drops_oldest_events() {
        let sink = Arc::new(FlakySink::failing(u32::MAX));
        let notifier = ChangeNotifier::spawn(vec![sink.clone()], policy(1, 2));
        for at in 1..=3 {
            notifier.emit(ChangeEvent::new(ChangeEventKind::CellUpdated, at));
        }
        notifier.flush();
        sink.failures_left.store(0, Ordering::SeqCst);

        assert!(wait_for(|| {
            notifier.flush();
            sink.delivered.events().len() == 2
        }));
        assert_eq!(sequences(&sink.delivered), vec![2, 3]);
    }

    #[test]
    fn panicking_sink_does_not_stop_other_sinks() {
        let panicking = Arc::new(PanickingSink {
            panics_left: AtomicU32::new(4),
            delivered: MemorySink::new(),
        });
        let memory = Arc::new(MemorySink::new());
        let notifier = ChangeNotifier::spawn(vec![panicking.clone(), memory.clone()], policy(2, 16));
        for at in 1..=3 {
            notifier.emit(ChangeEvent::new(ChangeEventKind::ColumnAdded, at));
        }
        notifier.flush();
        assert_eq!(sequences(&memory), vec![1, 2, 3]);

        notifier.emit(ChangeEvent::new(ChangeEventKind::ColumnDeleted, 4));
        notifier.flush();
        assert_eq!(memory.events().len(), 4);

        assert!(wait_for(|| {
            notifier.flush();
            panicking.delivered.events().len() == 4
        }));
        assert_eq!(sequences(&panicking.delivered), vec![1, 2, 3, 4]);
    }

    #[test]
    fn disabled_notifier_accepts_emit_and_flush() {
        let notifier = ChangeNotifier::disabled();
        notifier.emit(ChangeEvent::new(ChangeEventKind::MatrixCreated, 1));
        notifier.flush();
        notifier.shutdown();
    }
}
