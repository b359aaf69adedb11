use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use crate::tickets::{Priority, RawStatusEvent, Ticket, UNKNOWN_TEAM};
use crate::timeutil::{format_duration, minutes_between};

/// Identity of one complaint: the same user raising the same reason on the
/// same page within one window.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TicketKey {
    pub window: String,
    pub user_id: String,
    pub page_category: String,
    pub reason: String,
}

impl TicketKey {
    pub fn of(event: &RawStatusEvent) -> Self {
        Self {
            window: event.window.trim().to_string(),
            user_id: event.user_id.trim().to_string(),
            page_category: event.page_category.trim().to_string(),
            reason: event.reason.trim().to_string(),
        }
    }
}

/// Groups raw status rows into tickets. Rows without a user id are dropped;
/// every other row lands in exactly one ticket's history.
pub fn reconstruct_tickets(events: impl IntoIterator<Item = RawStatusEvent>) -> Vec<Ticket> {
    let mut groups: BTreeMap<TicketKey, Vec<RawStatusEvent>> = BTreeMap::new();
    let mut dropped = 0usize;

    for event in events {
        if event.user_id.trim().is_empty() {
            dropped += 1;
            continue;
        }
        groups.entry(TicketKey::of(&event)).or_default().push(event);
    }

    if dropped > 0 {
        debug!(dropped, "Dropped rows without user id");
    }

    groups
        .into_iter()
        .map(|(key, history)| build_ticket(key, history))
        .collect()
}

fn build_ticket(key: TicketKey, mut history: Vec<RawStatusEvent>) -> Ticket {
    // stable: rows sharing a timestamp keep feed order
    history.sort_by_key(|e| e.sort_key());

    let latest = &history[history.len() - 1];
    let first_open = history.iter().find(|e| e.status.is_open());
    let last_close = history.iter().rev().find(|e| e.status.is_close());

    let team = first_open
        .map(|e| e.team.trim())
        .unwrap_or_else(|| latest.team.trim());
    let team = if team.is_empty() { UNKNOWN_TEAM } else { team }.to_string();

    let first_open_at = first_open.and_then(|e| e.at);
    let last_close_at = last_close.and_then(|e| e.at);
    let tat_minutes = match (first_open_at, last_close_at) {
        (Some(open), Some(close)) => Some(minutes_between(open, close)).filter(|m| *m > 0.0),
        _ => None,
    };

    let name = newest_non_blank(&history, |e| e.name.as_str());
    let address = newest_non_blank(&history, |e| e.address.as_str());

    let open_complaint_id = history
        .iter()
        .rev()
        .filter(|e| e.status.is_open())
        .find_map(|e| e.complaint_id.clone());

    Ticket {
        priority: Priority::from_category(&key.page_category),
        user_id: key.user_id,
        window: key.window,
        team,
        page_category: key.page_category,
        reason: key.reason,
        name,
        address,
        latest_status: latest.status.clone(),
        first_open_at,
        last_close_at,
        tat_minutes,
        carry_forward: false,
        days_pending: 0,
        high_priority: false,
        open_complaint_id,
        history,
    }
}

fn newest_non_blank(history: &[RawStatusEvent], pick: impl Fn(&RawStatusEvent) -> &str) -> String {
    history
        .iter()
        .rev()
        .map(pick)
        .find(|v| !v.trim().is_empty())
        .unwrap_or_default()
        .to_string()
}

/// One resolved complaint in a user's history
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoryEntry {
    pub opened_at: String,
    pub closed_at: String,
    pub duration: String,
    pub reason: String,
    pub page_category: String,
}

/// Reduces a user's complaint log to its resolved complaints.
///
/// Rows are grouped per `(user_id, reason)`. A group is listed only when it
/// holds both an open and a close row and its newest row is a close; a group
/// whose newest row is open is still live and belongs to the current
/// complaints instead. Each entry pairs the newest open with the newest close.
pub fn closed_history(logs: &[RawStatusEvent]) -> Vec<HistoryEntry> {
    let mut order: Vec<(&str, &str)> = Vec::new();
    let mut groups: BTreeMap<(&str, &str), Vec<&RawStatusEvent>> = BTreeMap::new();

    for log in logs {
        let key = (log.user_id.as_str(), log.reason.as_str());
        let group = groups.entry(key).or_default();
        if group.is_empty() {
            order.push(key);
        }
        group.push(log);
    }

    order
        .into_iter()
        .filter_map(|key| {
            let group = groups.get(&key)?;
            let open = newest(group, |e| e.status.is_open())?;
            let close = newest(group, |e| e.status.is_close())?;
            let last = newest(group, |_| true)?;
            if last.status.is_open() {
                return None;
            }

            let duration = match (open.at, close.at) {
                (Some(o), Some(c)) => format_duration(o, c),
                _ => "-".to_string(),
            };

            Some(HistoryEntry {
                opened_at: open.created_at.clone(),
                closed_at: close.created_at.clone(),
                duration,
                reason: open.reason.clone(),
                page_category: open.page_category.clone(),
            })
        })
        .collect()
}

fn newest<'a>(
    group: &[&'a RawStatusEvent],
    wanted: impl Fn(&RawStatusEvent) -> bool,
) -> Option<&'a RawStatusEvent> {
    group
        .iter()
        .copied()
        .filter(|e| wanted(e))
        .max_by_key(|e| e.sort_key())
}
