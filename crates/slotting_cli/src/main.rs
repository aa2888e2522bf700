//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `slotting_core` linkage and print its version.
//! - Run the reference slotting scenario end to end and print each step.
//! - Keep output deterministic apart from generated ids.

use slotting_core::{
    ColumnDraft, InMemoryDirectory, MatrixEngine, MatrixError, MatrixId, MatrixResult, MemorySink,
    RowSeed,
};
use std::process::ExitCode;
use std::sync::Arc;

fn main() -> ExitCode {
    println!("slotting_core ping={}", slotting_core::ping());
    println!("slotting_core version={}", slotting_core::core_version());

    match run_reference_scenario() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("scenario failed error_code={} error={}", err.code(), err);
            ExitCode::FAILURE
        }
    }
}

fn run_reference_scenario() -> MatrixResult<()> {
    let sink = Arc::new(MemorySink::new());
    let engine = MatrixEngine::builder()
        .room_directory(Arc::new(InMemoryDirectory::new().with_room("R1", "Room 1")))
        .sink(sink.clone())
        .build()
        .map_err(|err| MatrixError::InvalidArgument(err.to_string()))?;

    let bin1 = engine.add_column(ColumnDraft::new("Bin1"))?;
    let bin2 = engine.add_column(ColumnDraft::new("Bin2"))?;
    let matrix = engine.create_matrix("R1", "Unit A", vec![RowSeed::new("Shelf1", "")])?;
    print_rows(&engine, "after create_matrix", matrix.id)?;

    engine.delete_column(bin1.id)?;
    print_rows(&engine, "after delete_column(Bin1)", matrix.id)?;

    let shelf2 = engine.add_row(matrix.id, RowSeed::new("Shelf2", ""))?;
    engine.set_cell_value(matrix.id, shelf2.id, bin2.id, "SKU-42")?;
    print_rows(&engine, "after add_row(Shelf2)", matrix.id)?;

    engine.flush_notifications();
    for event in sink.events() {
        println!("event seq={} kind={}", event.sequence, event.kind.as_str());
    }
    Ok(())
}

fn print_rows(engine: &MatrixEngine, step: &str, matrix_id: MatrixId) -> MatrixResult<()> {
    let view = engine.view();
    let columns = view.columns();
    println!("{step}:");
    for row in view.rows_of(matrix_id)? {
        let cells = row
            .cells
            .iter()
            .map(|cell| {
                let label = columns
                    .iter()
                    .find(|column| column.id == cell.column_id)
                    .map_or("?", |column| column.label.as_str());
                format!("{label}={:?}", cell.value)
            })
            .collect::<Vec<_>>();
        println!("  {} [{}]", row.label, cells.join(", "));
    }
    Ok(())
}
