use chrono::{NaiveDate, NaiveDateTime};
use clap::{Args, ValueEnum};
use serde::Deserialize;
use thiserror::Error;

use crate::tickets::{Priority, Status, Ticket};
use crate::timeutil::{parse_timestamp, parse_upper_bound, DateRange};

#[derive(Debug, Error, PartialEq)]
pub enum FilterError {
    #[error("unknown priority {0:?}")]
    UnknownPriority(String),
    #[error("unknown status {0:?}")]
    UnknownStatus(String),
    #[error("cannot parse date {0:?}")]
    BadDate(String),
}

/// Order of a filtered ticket list. Unordered lists keep reconstruction order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TicketOrder {
    /// Longest turnaround first; tickets without a TAT last
    Tat,
    /// Most recent activity first
    Latest,
}

impl TicketOrder {
    pub fn sort(self, tickets: &mut [Ticket]) {
        match self {
            TicketOrder::Tat => tickets.sort_by(|a, b| {
                b.tat_minutes.unwrap_or(0.0).total_cmp(&a.tat_minutes.unwrap_or(0.0))
            }),
            TicketOrder::Latest => tickets.sort_by(|a, b| b.latest_at().cmp(&a.latest_at())),
        }
    }
}

/// Narrows a ticket set before aggregation. Every unset field matches all.
#[derive(Debug, Clone, Default)]
pub struct TicketFilter {
    pub window: Option<String>,
    pub team: Option<String>,
    pub page_category: Option<String>,
    pub priority: Option<Priority>,
    pub status: Option<Status>,
    /// Keep only tickets whose latest event falls on this day
    pub on_day: Option<NaiveDate>,
    pub date_from: Option<NaiveDateTime>,
    pub date_to: Option<NaiveDateTime>,
    pub search: Option<String>,
    pub order: Option<TicketOrder>,
}

impl TicketFilter {
    pub fn window(mut self, window: impl Into<String>) -> Self {
        self.window = Some(window.into());
        self
    }

    pub fn team(mut self, team: impl Into<String>) -> Self {
        self.team = Some(team.into());
        self
    }

    pub fn page_category(mut self, page: impl Into<String>) -> Self {
        self.page_category = Some(page.into());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn status(mut self, status: Status) -> Self {
        self.status = Some(status);
        self
    }

    pub fn on_day(mut self, day: NaiveDate) -> Self {
        self.on_day = Some(day);
        self
    }

    pub fn between(mut self, from: Option<NaiveDateTime>, to: Option<NaiveDateTime>) -> Self {
        self.date_from = from;
        self.date_to = to;
        self
    }

    pub fn search(mut self, text: impl Into<String>) -> Self {
        self.search = Some(text.into());
        self
    }

    pub fn ordered(mut self, order: TicketOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn matches(&self, ticket: &Ticket) -> bool {
        if let Some(window) = active(&self.window) {
            if ticket.window != window {
                return false;
            }
        }
        if let Some(team) = active(&self.team) {
            if ticket.team != team {
                return false;
            }
        }
        if let Some(page) = active(&self.page_category) {
            if ticket.page_category != page {
                return false;
            }
        }
        if let Some(priority) = self.priority {
            if ticket.priority != priority {
                return false;
            }
        }
        if let Some(status) = &self.status {
            if &ticket.latest_status != status {
                return false;
            }
        }
        if let Some(day) = self.on_day {
            if ticket.latest_at().map(|at| at.date()) != Some(day) {
                return false;
            }
        }

        // tickets with no readable timestamp are not excluded by date bounds
        if let Some(latest) = ticket.latest_at() {
            if self.date_from.is_some_and(|from| latest < from) {
                return false;
            }
            if self.date_to.is_some_and(|to| latest > to) {
                return false;
            }
        }

        match active(&self.search) {
            Some(needle) => {
                let needle = needle.to_lowercase();
                [
                    &ticket.user_id,
                    &ticket.team,
                    &ticket.page_category,
                    &ticket.reason,
                    &ticket.name,
                ]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }

    pub fn apply(&self, tickets: &[Ticket]) -> Vec<Ticket> {
        let mut hits: Vec<Ticket> = tickets.iter().filter(|t| self.matches(t)).cloned().collect();
        if let Some(order) = self.order {
            order.sort(&mut hits);
        }
        hits
    }
}

/// Filter selections as they arrive from the command line or a query string.
#[derive(Debug, Clone, Default, Deserialize, Args)]
#[serde(default)]
pub struct FilterParams {
    /// Only this window
    #[arg(long)]
    pub window: Option<String>,

    /// Only this team
    #[arg(long)]
    pub team: Option<String>,

    /// Only this page category
    #[arg(long)]
    pub page: Option<String>,

    /// Only this priority level (1 = repair, 2 = install, 3 = other, or all)
    #[arg(long)]
    pub priority: Option<String>,

    /// Only tickets whose latest status is this (open, close or all)
    #[arg(long)]
    pub status: Option<String>,

    /// Only tickets with activity today
    #[arg(long)]
    pub today: bool,

    /// Named date range applied to the latest event
    #[arg(long, value_enum)]
    pub range: Option<DateRange>,

    /// Start time (overrides the range start)
    #[arg(long)]
    pub from: Option<String>,

    /// End time (overrides the range end); a bare date includes that whole day
    #[arg(long)]
    pub to: Option<String>,

    /// Case-insensitive text search
    #[arg(long)]
    pub search: Option<String>,

    /// Ordering of the resulting ticket list
    #[arg(long, value_enum)]
    pub sort: Option<TicketOrder>,
}

impl FilterParams {
    pub fn to_filter(&self, today: NaiveDate) -> Result<TicketFilter, FilterError> {
        let mut filter = TicketFilter::default();
        if let Some(window) = &self.window {
            filter = filter.window(window.as_str());
        }
        if let Some(team) = &self.team {
            filter = filter.team(team.as_str());
        }
        if let Some(page) = &self.page {
            filter = filter.page_category(page.as_str());
        }
        if let Some(raw) = active(&self.priority) {
            let priority = raw
                .parse::<u8>()
                .ok()
                .and_then(Priority::from_level)
                .ok_or_else(|| FilterError::UnknownPriority(raw.to_string()))?;
            filter = filter.priority(priority);
        }
        if let Some(raw) = active(&self.status) {
            let status = match Status::parse(raw) {
                Status::Other(_) => return Err(FilterError::UnknownStatus(raw.to_string())),
                known => known,
            };
            filter = filter.status(status);
        }
        if self.today {
            filter = filter.on_day(today);
        }
        if let Some(search) = &self.search {
            filter = filter.search(search.as_str());
        }
        if let Some(order) = self.sort {
            filter = filter.ordered(order);
        }

        let (mut from, mut to) = self.range.map(|r| r.bounds(today)).unwrap_or((None, None));
        if let Some(raw) = &self.from {
            from = Some(parse_timestamp(raw).ok_or_else(|| FilterError::BadDate(raw.to_string()))?);
        }
        if let Some(raw) = &self.to {
            to = Some(parse_upper_bound(raw).ok_or_else(|| FilterError::BadDate(raw.to_string()))?);
        }

        Ok(filter.between(from, to))
    }
}

/// Blank and `all` selections mean "no restriction".
fn active(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("all"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, event, ticket};
    use crate::tickets::UNKNOWN_TEAM;

    fn sample() -> Vec<Ticket> {
        let mut sunny = event("u2", "close", "2024-06-09 12:00:00");
        sunny.window = "SUNNY".into();
        sunny.team = "South".into();
        sunny.page_category = "new_install".into();
        sunny.name = "Ravi Kumar".into();

        let mut orphan = event("u3", "open", "2024-06-01 08:00:00");
        orphan.team = String::new();
        orphan.page_category = "billing".into();

        vec![
            ticket(vec![event("u1", "open", "2024-06-10 08:00:00")]),
            ticket(vec![sunny]),
            ticket(vec![orphan]),
        ]
    }

    #[test]
    fn empty_filter_keeps_everything() {
        assert_eq!(TicketFilter::default().apply(&sample()).len(), 3);
        assert_eq!(TicketFilter::default().team("all").apply(&sample()).len(), 3);
    }

    #[test]
    fn narrows_by_dimensions() {
        let tickets = sample();
        assert_eq!(TicketFilter::default().window("SUNNY").apply(&tickets).len(), 1);
        assert_eq!(TicketFilter::default().page_category("billing").apply(&tickets).len(), 1);
        assert_eq!(TicketFilter::default().priority(Priority::Repair).apply(&tickets).len(), 1);
        assert_eq!(TicketFilter::default().team("North").priority(Priority::Install).apply(&tickets).len(), 0);
    }

    #[test]
    fn unknown_team_is_filterable() {
        let hits = TicketFilter::default().team(UNKNOWN_TEAM).apply(&sample());
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_id, "u3");
    }

    #[test]
    fn date_bounds_use_latest_event() {
        let tickets = sample();
        let hits = TicketFilter::default()
            .between(Some(at("2024-06-09 00:00:00")), Some(at("2024-06-10 23:59:59")))
            .apply(&tickets);
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn undated_tickets_survive_date_bounds() {
        let undated = ticket(vec![event("u9", "open", "???")]);
        let filter = TicketFilter::default().between(Some(at("2024-06-09 00:00:00")), None);
        assert!(filter.matches(&undated));
    }

    #[test]
    fn search_is_case_insensitive_substring() {
        let tickets = sample();
        assert_eq!(TicketFilter::default().search("ravi").apply(&tickets).len(), 1);
        assert_eq!(TicketFilter::default().search("INSTALL").apply(&tickets).len(), 1);
        assert_eq!(TicketFilter::default().search("no internet").apply(&tickets).len(), 3);
        assert_eq!(TicketFilter::default().search("u3").apply(&tickets).len(), 1);
        assert_eq!(TicketFilter::default().search("zzz").apply(&tickets).len(), 0);
    }

    #[test]
    fn params_build_a_filter() {
        let params = FilterParams {
            team: Some("North".into()),
            priority: Some("2".into()),
            range: Some(DateRange::Today),
            from: Some("2024-06-10 06:00:00".into()),
            ..Default::default()
        };
        let filter = params.to_filter(at("2024-06-10 00:00:00").date()).unwrap();

        assert_eq!(filter.team.as_deref(), Some("North"));
        assert_eq!(filter.priority, Some(Priority::Install));
        assert_eq!(filter.date_from, Some(at("2024-06-10 06:00:00")));
        assert_eq!(filter.date_to, Some(at("2024-06-10 23:59:59.999")));
    }

    #[test]
    fn params_reject_bad_input() {
        let today = at("2024-06-10 00:00:00").date();
        let bad_priority = FilterParams { priority: Some("7".into()), ..Default::default() };
        assert_eq!(
            bad_priority.to_filter(today).unwrap_err(),
            FilterError::UnknownPriority("7".into())
        );

        let bad_status = FilterParams { status: Some("pending".into()), ..Default::default() };
        assert_eq!(
            bad_status.to_filter(today).unwrap_err(),
            FilterError::UnknownStatus("pending".into())
        );

        let bad_date = FilterParams { to: Some("someday".into()), ..Default::default() };
        assert!(matches!(bad_date.to_filter(today), Err(FilterError::BadDate(_))));
    }

    #[test]
    fn all_priority_and_status_mean_unrestricted() {
        let params = FilterParams {
            priority: Some("all".into()),
            status: Some("ALL".into()),
            ..Default::default()
        };
        let filter = params.to_filter(at("2024-06-10 00:00:00").date()).unwrap();
        assert_eq!(filter.priority, None);
        assert_eq!(filter.status, None);
        assert_eq!(filter.apply(&sample()).len(), 3);
    }

    #[test]
    fn bare_to_date_keeps_that_whole_day() {
        let params = FilterParams { to: Some("2024-06-10".into()), ..Default::default() };
        let filter = params.to_filter(at("2024-06-10 00:00:00").date()).unwrap();

        let morning = ticket(vec![event("u1", "open", "2024-06-10 08:00:00")]);
        let next_day = ticket(vec![event("u2", "open", "2024-06-11 00:00:00")]);
        assert!(filter.matches(&morning));
        assert!(!filter.matches(&next_day));
    }

    #[test]
    fn narrows_by_latest_status() {
        let tickets = sample();
        let closed = TicketFilter::default().status(Status::Close).apply(&tickets);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].user_id, "u2");

        let params = FilterParams { status: Some("open".into()), ..Default::default() };
        let open = params.to_filter(at("2024-06-10 00:00:00").date()).unwrap().apply(&tickets);
        assert_eq!(open.len(), 2);
    }

    #[test]
    fn today_keeps_tickets_active_on_that_day() {
        let tickets = sample();
        let params = FilterParams {
            team: Some("North".into()),
            today: true,
            ..Default::default()
        };
        let hits = params.to_filter(at("2024-06-10 00:00:00").date()).unwrap().apply(&tickets);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].user_id, "u1");

        let undated = ticket(vec![event("u9", "open", "???")]);
        assert!(!TicketFilter::default().on_day(at("2024-06-10 00:00:00").date()).matches(&undated));
    }

    #[test]
    fn tat_order_puts_slowest_first() {
        let quick = ticket(vec![
            event("u1", "open", "2024-06-10 08:00:00"),
            event("u1", "close", "2024-06-10 08:30:00"),
        ]);
        let slow = ticket(vec![
            event("u2", "open", "2024-06-10 08:00:00"),
            event("u2", "close", "2024-06-10 12:00:00"),
        ]);
        let pending = ticket(vec![event("u3", "open", "2024-06-10 09:00:00")]);

        let ordered = TicketFilter::default()
            .ordered(TicketOrder::Tat)
            .apply(&[quick, pending, slow]);
        let users: Vec<_> = ordered.iter().map(|t| t.user_id.as_str()).collect();
        assert_eq!(users, vec!["u2", "u1", "u3"]);
    }
}
