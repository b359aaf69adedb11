use crate::aggregate::{Summary, TargetStatus};
use crate::tickets::{Priority, Ticket};
use crate::timeutil::format_tat;

const RULE: &str = "═══════════════════════════════════════════════════════════════════\n";
const SECTION: &str = "───────────────────────────────────────────────────────────────────\n";

fn section(report: &mut String, title: &str) {
    report.push_str(SECTION);
    report.push_str(&format!("{:^67}\n", title));
    report.push_str(SECTION);
    report.push('\n');
}

/// Plain-text rendering of a dashboard summary plus its aging tickets.
pub fn generate_report(summary: &Summary, tickets: &[Ticket]) -> String {
    let mut report = String::new();

    report.push_str(RULE);
    report.push_str("                  Complaint TAT Analysis Report                    \n");
    report.push_str(RULE);
    report.push('\n');
    report.push_str(&format!("Report Date: {}\n", summary.today.format("%Y-%m-%d")));
    report.push_str(&format!("Tickets:     {}\n\n", summary.counts.total));

    section(&mut report, "OVERVIEW");
    report.push_str(&format!("  Total Tickets:            {:>6}\n", summary.counts.total));
    report.push_str(&format!("  Closed:                   {:>6}\n", summary.counts.closed));
    report.push_str(&format!("  Open:                     {:>6}\n", summary.counts.open));
    report.push_str(&format!("  High Priority Pending:    {:>6}\n", summary.counts.high_priority_pending));
    report.push_str(&format!("  Carried Forward:          {:>6}\n\n", summary.counts.carry_forward));

    section(&mut report, "TURNAROUND TIME");
    report.push_str(&format!("  Average TAT:   {:>8}\n", summary.tat.average_label()));
    report.push_str(&format!("  Median TAT:    {:>8}\n", format_tat(summary.tat.median_minutes)));
    report.push_str(&format!("  90th Pct TAT:  {:>8}\n", format_tat(summary.tat.p90_minutes)));
    report.push_str(&format!("  Measured:      {:>8}\n\n", summary.tat.samples));

    section(&mut report, "PRIORITY MIX");
    for (priority, label) in [
        (Priority::Repair, "Repair"),
        (Priority::Install, "Install"),
        (Priority::Routine, "Other"),
    ] {
        report.push_str(&format!(
            "  P{} {:<10} {:>6}\n",
            priority.level(),
            label,
            summary.priorities.count(priority)
        ));
    }
    report.push('\n');

    if !summary.windows.is_empty() {
        section(&mut report, "WINDOWS");
        for w in &summary.windows {
            report.push_str(&format!(
                "  {:<16} total {:>5}   open {:>5}   closed {:>5}\n",
                w.window, w.counts.total, w.counts.open, w.counts.closed
            ));
        }
        report.push('\n');
    }

    section(&mut report, "TEAMS");
    if summary.teams.is_empty() {
        report.push_str("  No tickets match the current filters.\n\n");
    } else {
        report.push_str(&format!(
            "  {:<16} {:>6} {:>6} {:>6} {:>4} {:>4} {:>4} {:>8} {:>8}\n",
            "Team", "Total", "Open", "Closed", "P1", "P2", "P3", "Today", "Avg TAT"
        ));
        for team in &summary.teams {
            let mark = match team.target_status {
                TargetStatus::Met => "✓",
                TargetStatus::Partial | TargetStatus::Missed => "✗",
            };
            report.push_str(&format!(
                "  {:<16} {:>6} {:>6} {:>6} {:>4} {:>4} {:>4} {:>6} {} {:>8}\n",
                team.team,
                team.counts.total,
                team.counts.open,
                team.counts.closed,
                team.priorities.repair,
                team.priorities.install,
                team.priorities.routine,
                format!("{}/{}", team.today, team.target),
                mark,
                team.tat.average_label()
            ));
        }
        report.push('\n');
    }

    let aging: Vec<_> = tickets.iter().filter(|t| t.carry_forward).collect();
    if !aging.is_empty() {
        section(&mut report, "CARRIED FORWARD");
        for t in aging {
            report.push_str(&format!(
                "  [P{}] {} / {} ({}) {} - {} day(s) pending\n",
                t.priority.level(),
                t.window,
                t.user_id,
                t.team,
                t.reason,
                t.days_pending
            ));
        }
        report.push('\n');
    }

    report.push_str(RULE);
    report.push_str("                         END OF REPORT                              \n");
    report.push_str(RULE);

    report
}
