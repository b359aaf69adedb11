use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::{Data, Median, OrderStatistics};

use crate::tickets::{Priority, Ticket};
use crate::timeutil::format_tat;

/// Turnaround figures over closed tickets with a measured TAT
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct TatStats {
    pub samples: usize,
    pub average_minutes: Option<f64>,
    pub median_minutes: Option<f64>,
    pub p90_minutes: Option<f64>,
}

impl TatStats {
    pub fn from_tickets<'a>(tickets: impl IntoIterator<Item = &'a Ticket>) -> Self {
        let values: Vec<f64> = tickets
            .into_iter()
            .filter(|t| t.is_closed())
            .filter_map(|t| t.tat_minutes)
            .collect();

        if values.is_empty() {
            return Self::default();
        }

        let average = values.iter().sum::<f64>() / values.len() as f64;
        let mut data = Data::new(values.clone());

        Self {
            samples: values.len(),
            average_minutes: Some(average),
            median_minutes: Some(data.median()),
            p90_minutes: Some(data.percentile(90)),
        }
    }

    /// Display label; the no-data sentinel when nothing was measured.
    pub fn average_label(&self) -> String {
        format_tat(self.average_minutes)
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    Met,
    Partial,
    Missed,
}

impl TargetStatus {
    pub fn of(today: usize, target: usize) -> Self {
        if today >= target {
            TargetStatus::Met
        } else if today > 0 {
            TargetStatus::Partial
        } else {
            TargetStatus::Missed
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct Counts {
    pub total: usize,
    pub open: usize,
    pub closed: usize,
    pub carry_forward: usize,
    pub high_priority_pending: usize,
}

impl Counts {
    fn add(&mut self, ticket: &Ticket) {
        self.total += 1;
        if ticket.is_open() {
            self.open += 1;
        }
        if ticket.is_closed() {
            self.closed += 1;
        }
        if ticket.carry_forward {
            self.carry_forward += 1;
        }
        if ticket.high_priority {
            self.high_priority_pending += 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TeamSummary {
    pub team: String,
    pub counts: Counts,
    pub priorities: PriorityBreakdown,
    pub tat: TatStats,
    pub today: usize,
    pub target: usize,
    pub target_status: TargetStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WindowSummary {
    pub window: String,
    pub counts: Counts,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PriorityBreakdown {
    pub repair: usize,
    pub install: usize,
    pub routine: usize,
}

impl PriorityBreakdown {
    fn add(&mut self, priority: Priority) {
        match priority {
            Priority::Repair => self.repair += 1,
            Priority::Install => self.install += 1,
            Priority::Routine => self.routine += 1,
        }
    }

    pub fn count(&self, priority: Priority) -> usize {
        match priority {
            Priority::Repair => self.repair,
            Priority::Install => self.install,
            Priority::Routine => self.routine,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Summary {
    pub today: NaiveDate,
    pub counts: Counts,
    pub tat: TatStats,
    pub teams: Vec<TeamSummary>,
    pub windows: Vec<WindowSummary>,
    pub priorities: PriorityBreakdown,
}

/// Whether the ticket's newest raw event falls on `today`.
pub fn is_today(ticket: &Ticket, today: NaiveDate) -> bool {
    ticket.latest_at().is_some_and(|at| at.date() == today)
}

/// Rolls a filtered ticket set into dashboard counters.
///
/// `today` is the viewer's local calendar date. Tickets with the `UNKNOWN`
/// team form their own bucket so per-team totals always add up to the global
/// total.
pub fn aggregate(tickets: &[Ticket], today: NaiveDate, daily_target: usize) -> Summary {
    let mut counts = Counts::default();
    let mut priorities = PriorityBreakdown::default();
    let mut by_team: BTreeMap<&str, Vec<&Ticket>> = BTreeMap::new();
    let mut by_window: BTreeMap<&str, Counts> = BTreeMap::new();

    for ticket in tickets {
        counts.add(ticket);
        priorities.add(ticket.priority);
        by_team.entry(ticket.team.as_str()).or_default().push(ticket);
        by_window.entry(ticket.window.as_str()).or_default().add(ticket);
    }

    let teams = by_team
        .into_iter()
        .map(|(team, members)| {
            let mut team_counts = Counts::default();
            let mut team_priorities = PriorityBreakdown::default();
            for t in &members {
                team_counts.add(t);
                team_priorities.add(t.priority);
            }
            let today_count = members.iter().filter(|t| is_today(t, today)).count();

            TeamSummary {
                team: team.to_string(),
                counts: team_counts,
                priorities: team_priorities,
                tat: TatStats::from_tickets(members.iter().copied()),
                today: today_count,
                target: daily_target,
                target_status: TargetStatus::of(today_count, daily_target),
            }
        })
        .collect();

    let windows = by_window
        .into_iter()
        .map(|(window, counts)| WindowSummary {
            window: window.to_string(),
            counts,
        })
        .collect();

    Summary {
        today,
        counts,
        tat: TatStats::from_tickets(tickets),
        teams,
        windows,
        priorities,
    }
}
