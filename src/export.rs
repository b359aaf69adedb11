use anyhow::Context;
use chrono::Local;
use csv::{QuoteStyle, Terminator};
use serde::Serialize;
use std::path::Path;

use crate::aggregate::Summary;
use crate::reconstruct::HistoryEntry;
use crate::tickets::Ticket;
use crate::timeutil::format_tat;

pub const TICKET_COLUMNS: &[&str] = &[
    "Sn", "Window", "User ID", "Name", "Address", "Team", "Page", "Priority", "Reason", "Status",
    "Opened", "Closed", "TAT", "Days Pending", "Carry Forward",
];

pub const HISTORY_COLUMNS: &[&str] = &["Sn", "Opened", "Closed", "Duration", "Reason", "Page"];

/// Writes a header row as-is and every data cell quoted, `"` doubled.
fn write_csv<R, C>(columns: &[&str], rows: impl IntoIterator<Item = R>) -> anyhow::Result<String>
where
    R: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut out = Vec::new();
    {
        let mut header = csv::WriterBuilder::new()
            .quote_style(QuoteStyle::Necessary)
            .terminator(Terminator::Any(b'\n'))
            .from_writer(&mut out);
        header.write_record(columns)?;
        header.flush()?;
    }

    let mut body = csv::WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(out);
    for row in rows {
        body.write_record(row)?;
    }
    let bytes = body.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8(bytes)?)
}

fn stamp(at: Option<chrono::NaiveDateTime>) -> String {
    at.map(|d| d.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_default()
}

pub fn tickets_csv(tickets: &[Ticket]) -> anyhow::Result<String> {
    let rows = tickets.iter().enumerate().map(|(i, t)| {
        [
            (i + 1).to_string(),
            t.window.clone(),
            t.user_id.clone(),
            t.name.clone(),
            t.address.clone(),
            t.team.clone(),
            t.page_category.clone(),
            t.priority.level().to_string(),
            t.reason.clone(),
            t.latest_status.as_str().to_string(),
            stamp(t.first_open_at),
            stamp(t.last_close_at),
            format_tat(t.tat_minutes),
            t.days_pending.to_string(),
            if t.carry_forward { "yes" } else { "no" }.to_string(),
        ]
    });

    write_csv(TICKET_COLUMNS, rows)
}

pub fn history_csv(entries: &[HistoryEntry]) -> anyhow::Result<String> {
    let rows = entries.iter().enumerate().map(|(i, e)| {
        [
            (i + 1).to_string(),
            e.opened_at.clone(),
            e.closed_at.clone(),
            e.duration.clone(),
            e.reason.clone(),
            e.page_category.clone(),
        ]
    });

    write_csv(HISTORY_COLUMNS, rows)
}

#[derive(Serialize)]
struct JsonExport<'a> {
    exported_at: String,
    summary: &'a Summary,
    tickets: &'a [Ticket],
}

pub fn export_json(summary: &Summary, tickets: &[Ticket]) -> anyhow::Result<String> {
    let export = JsonExport {
        exported_at: Local::now().to_rfc3339(),
        summary,
        tickets,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

/// Writes an export or report, creating missing parent directories.
pub fn save(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::aggregate;
    use crate::fixtures::{at, event, ticket};

    #[test]
    fn quotes_are_doubled() {
        let csv = write_csv(&["Col A", "Col B", "Col C"], [["a", "say \"hi\"", ""]]).unwrap();
        assert_eq!(csv, "Col A,Col B,Col C\n\"a\",\"say \"\"hi\"\"\",\"\"\n");
    }

    #[test]
    fn ticket_csv_has_header_and_one_row_per_ticket() {
        let mut noisy = event("u2", "open", "2024-06-10 08:00:00");
        noisy.reason = "Fiber cut, \"urgent\"".into();
        let tickets = vec![
            ticket(vec![
                event("u1", "open", "2024-06-10 08:00:00"),
                event("u1", "close", "2024-06-10 08:45:00"),
            ]),
            ticket(vec![noisy]),
        ];

        let csv = tickets_csv(&tickets).unwrap();
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Sn,Window,User ID"));
        assert!(lines[1].starts_with(r#""1","MEROTRA","u1""#));
        assert!(lines[1].contains(r#""45m""#));
        assert!(lines[2].contains(r#""Fiber cut, ""urgent""""#));
    }

    #[test]
    fn history_csv_rows() {
        let entries = vec![HistoryEntry {
            opened_at: "2024-06-10 08:00:00".into(),
            closed_at: "2024-06-10 10:30:00".into(),
            duration: "2h 30m".into(),
            reason: "No internet".into(),
            page_category: "fiber_repair".into(),
        }];
        let csv = history_csv(&entries).unwrap();
        assert_eq!(
            csv,
            "Sn,Opened,Closed,Duration,Reason,Page\n\"1\",\"2024-06-10 08:00:00\",\"2024-06-10 10:30:00\",\"2h 30m\",\"No internet\",\"fiber_repair\"\n"
        );
    }

    #[test]
    fn json_export_contains_summary_and_tickets() {
        let tickets = vec![ticket(vec![event("u1", "open", "2024-06-10 08:00:00")])];
        let summary = aggregate(&tickets, at("2024-06-10 00:00:00").date(), 4);

        let json = export_json(&summary, &tickets).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["summary"]["counts"]["total"], 1);
        assert_eq!(value["tickets"][0]["user_id"], "u1");
    }

    #[test]
    fn save_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("exports").join("tickets.csv");

        save(&path, "Sn\n").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Sn\n");
    }
}
