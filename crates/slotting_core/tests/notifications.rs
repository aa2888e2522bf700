use slotting_core::{
    ChangeEvent, ChangeEventKind, ColumnDraft, EngineConfig, InMemoryDirectory, MatrixEngine,
    MemorySink, NotificationSink, RowSeed, SinkError,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

struct BrokenSink {
    attempts: AtomicUsize,
}

impl NotificationSink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    fn deliver(&self, _event: &ChangeEvent) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError("endpoint unreachable".to_string()))
    }
}

/// Panics on its first delivery, then records like a memory sink.
struct CrashOnceSink {
    crashed: AtomicBool,
    delivered: MemorySink,
}

impl NotificationSink for CrashOnceSink {
    fn name(&self) -> &str {
        "crash_once"
    }

    fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        if !self.crashed.swap(true, Ordering::SeqCst) {
            panic!("webhook client crashed");
        }
        self.delivered.deliver(event)
    }
}

/// Refuses every event while `down` is set.
struct OutageSink {
    down: AtomicBool,
    delivered: MemorySink,
}

impl NotificationSink for OutageSink {
    fn name(&self) -> &str {
        "outage"
    }

    fn deliver(&self, event: &ChangeEvent) -> Result<(), SinkError> {
        if self.down.load(Ordering::SeqCst) {
            return Err(SinkError("endpoint unreachable".to_string()));
        }
        self.delivered.deliver(event)
    }
}

fn eventually(engine: &MatrixEngine, mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        engine.flush_notifications();
        if done() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    done()
}

fn engine_with(sinks: Vec<Arc<dyn NotificationSink>>) -> MatrixEngine {
    let mut builder = MatrixEngine::builder()
        .config(EngineConfig {
            notify_max_attempts: 2,
            ..EngineConfig::default()
        })
        .room_directory(Arc::new(InMemoryDirectory::new().with_room("R1", "Room 1")));
    for sink in sinks {
        builder = builder.sink(sink);
    }
    builder.build().unwrap()
}

fn kinds(events: &[ChangeEvent]) -> Vec<ChangeEventKind> {
    events.iter().map(|event| event.kind).collect()
}

#[test]
fn events_arrive_in_commit_order_with_sequence_numbers() {
    let sink = Arc::new(MemorySink::new());
    let engine = engine_with(vec![sink.clone()]);

    let bin1 = engine.add_column(ColumnDraft::new("Bin1")).unwrap();
    let matrix = engine
        .create_matrix(
            "R1",
            "Unit A",
            vec![RowSeed::new("Shelf1", ""), RowSeed::new("Shelf2", "")],
        )
        .unwrap();
    let shelf3 = engine
        .add_row(matrix.id, RowSeed::new("Shelf3", ""))
        .unwrap();
    engine
        .set_cell_value(matrix.id, shelf3.id, bin1.id, "SKU-7")
        .unwrap();
    engine.delete_column(bin1.id).unwrap();
    engine.flush_notifications();

    let events = sink.events();
    assert_eq!(
        kinds(&events),
        vec![
            ChangeEventKind::ColumnAdded,
            ChangeEventKind::MatrixCreated,
            ChangeEventKind::RowAdded,
            ChangeEventKind::CellUpdated,
            ChangeEventKind::ColumnDeleted,
        ]
    );
    let sequences = events.iter().map(|event| event.sequence).collect::<Vec<_>>();
    assert_eq!(sequences, vec![1, 2, 3, 4, 5]);

    assert_eq!(events[0].cells_affected, 0);
    assert_eq!(events[1].matrix_id, Some(matrix.id));
    assert_eq!(events[1].room_id.as_deref(), Some("R1"));
    assert_eq!(events[1].cells_affected, 2);
    assert_eq!(events[2].row_id, Some(shelf3.id));
    assert_eq!(events[2].cells_affected, 1);
    assert_eq!(events[3].column_id, Some(bin1.id));
    assert_eq!(events[4].cells_affected, 3);
    assert!(events
        .windows(2)
        .all(|pair| pair[0].occurred_at <= pair[1].occurred_at));
}

#[test]
fn failed_command_emits_no_event() {
    let sink = Arc::new(MemorySink::new());
    let engine = engine_with(vec![sink.clone()]);

    assert!(engine.delete_column(Uuid::new_v4()).is_err());
    assert!(engine.create_matrix("R1", "   ", Vec::new()).is_err());
    assert!(engine.add_row(Uuid::new_v4(), RowSeed::new("Shelf1", "")).is_err());
    engine.flush_notifications();
    assert!(sink.events().is_empty());

    engine.add_column(ColumnDraft::new("Bin1")).unwrap();
    engine.flush_notifications();
    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].sequence, 1);
}

#[test]
fn failing_sink_never_fails_the_command() {
    let broken = Arc::new(BrokenSink {
        attempts: AtomicUsize::new(0),
    });
    let healthy = Arc::new(MemorySink::new());
    let engine = engine_with(vec![broken.clone(), healthy.clone()]);

    let column = engine.add_column(ColumnDraft::new("Bin1")).unwrap();
    engine
        .create_matrix("R1", "Unit A", vec![RowSeed::new("Shelf1", "")])
        .unwrap();
    engine.flush_notifications();

    assert_eq!(engine.view().columns()[0].id, column.id);
    assert!(broken.attempts.load(Ordering::SeqCst) >= 4);
    assert_eq!(
        kinds(&healthy.events()),
        vec![ChangeEventKind::ColumnAdded, ChangeEventKind::MatrixCreated]
    );
}

#[test]
fn panicking_sink_does_not_starve_other_sinks() {
    let crashing = Arc::new(CrashOnceSink {
        crashed: AtomicBool::new(false),
        delivered: MemorySink::new(),
    });
    let healthy = Arc::new(MemorySink::new());
    let engine = engine_with(vec![crashing.clone(), healthy.clone()]);

    for bin in 1..=3 {
        engine
            .add_column(ColumnDraft::new(format!("Bin{bin}")))
            .unwrap();
    }
    engine.flush_notifications();

    assert_eq!(
        kinds(&healthy.events()),
        vec![ChangeEventKind::ColumnAdded; 3]
    );
    assert!(eventually(&engine, || crashing.delivered.events().len() == 3));
    let sequences = crashing
        .delivered
        .events()
        .iter()
        .map(|event| event.sequence)
        .collect::<Vec<_>>();
    assert_eq!(sequences, vec![1, 2, 3]);
}

#[test]
fn events_survive_a_sink_outage() {
    let outage = Arc::new(OutageSink {
        down: AtomicBool::new(true),
        delivered: MemorySink::new(),
    });
    let engine = engine_with(vec![outage.clone()]);

    let column = engine.add_column(ColumnDraft::new("Bin1")).unwrap();
    engine
        .create_matrix("R1", "Unit A", vec![RowSeed::new("Shelf1", "")])
        .unwrap();
    engine.delete_column(column.id).unwrap();
    engine.flush_notifications();
    assert!(outage.delivered.events().is_empty());

    outage.down.store(false, Ordering::SeqCst);
    assert!(eventually(&engine, || outage.delivered.events().len() == 3));
    assert_eq!(
        kinds(&outage.delivered.events()),
        vec![
            ChangeEventKind::ColumnAdded,
            ChangeEventKind::MatrixCreated,
            ChangeEventKind::ColumnDeleted,
        ]
    );
}

#[test]
fn restore_does_not_emit_events() {
    let sink = Arc::new(MemorySink::new());
    let engine = engine_with(vec![sink.clone()]);
    engine.add_column(ColumnDraft::new("Bin1")).unwrap();
    let snapshot = engine.snapshot().unwrap();
    engine.flush_notifications();
    let before = sink.events().len();

    engine.restore(snapshot).unwrap();
    engine.flush_notifications();
    assert_eq!(sink.events().len(), before);
}

#[test]
fn engine_without_sinks_still_commits() {
    let engine = engine_with(Vec::new());
    engine.add_column(ColumnDraft::new("Bin1")).unwrap();
    engine.flush_notifications();
    assert_eq!(engine.view().columns().len(), 1);
}
