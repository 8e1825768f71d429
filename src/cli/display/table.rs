//! Table rendering for run listings.

use comfy_table::{presets::UTF8_FULL, Cell, Color, ContentArrangement, Table};

use crate::domain::models::{Run, RunStatus};

fn status_cell(status: RunStatus) -> Cell {
    let cell = Cell::new(status.as_str());
    match status {
        RunStatus::Passed => cell.fg(Color::Green),
        RunStatus::Failed => cell.fg(Color::Red),
        RunStatus::Error | RunStatus::Timeout => cell.fg(Color::Magenta),
        RunStatus::Running => cell.fg(Color::Cyan),
        RunStatus::Queued => cell.fg(Color::Yellow),
    }
}

/// Render runs as a table, one row per run.
pub fn format_runs_table(runs: &[Run]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            "Run", "Job", "Status", "Class", "Trigger", "Started", "Duration",
        ]);

    for run in runs {
        let short = |id: uuid::Uuid| id.to_string()[..8].to_string();
        let duration = run
            .duration_ms
            .map(|ms| format!("{ms} ms"))
            .unwrap_or_else(|| "-".to_string());

        table.add_row(vec![
            Cell::new(short(run.id)),
            Cell::new(short(run.job_id)),
            status_cell(run.status),
            Cell::new(run.queue_class.as_str()),
            Cell::new(run.trigger.as_str()),
            Cell::new(run.started_at.format("%Y-%m-%d %H:%M:%S").to_string()),
            Cell::new(duration),
        ]);
    }

    table
}
