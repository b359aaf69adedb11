use chrono::NaiveDateTime;

use crate::tickets::Ticket;

const DAY_MS: f64 = 24.0 * 60.0 * 60.0 * 1000.0;

/// Outcome of the aging check for one ticket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CarryForward {
    pub high_priority: bool,
    pub carry_forward: bool,
    pub days_pending: i64,
}

/// Decides whether an open repair/install ticket has been pending too long.
///
/// Only open tickets of priority 1 or 2 are eligible. Age is counted in
/// whole started days since the first open event, so anything open longer
/// than 24 hours is carried forward. Eligible tickets with no readable open
/// timestamp stay high priority but are never carried forward.
pub fn evaluate(ticket: &Ticket, now: NaiveDateTime) -> CarryForward {
    let mut result = CarryForward::default();

    if !(ticket.is_open() && ticket.priority.is_high()) {
        return result;
    }
    result.high_priority = true;

    if let Some(opened) = ticket.first_open_at {
        // clock skew can put the open event in the future; treat that as fresh
        let elapsed_ms = (now - opened).num_milliseconds().max(0) as f64;
        result.days_pending = (elapsed_ms / DAY_MS).ceil() as i64;
        result.carry_forward = result.days_pending > 1;
    }

    result
}

pub fn classify(ticket: &mut Ticket, now: NaiveDateTime) {
    let verdict = evaluate(ticket, now);
    ticket.high_priority = verdict.high_priority;
    ticket.carry_forward = verdict.carry_forward;
    ticket.days_pending = verdict.days_pending;
}

pub fn classify_all(tickets: &mut [Ticket], now: NaiveDateTime) {
    for ticket in tickets.iter_mut() {
        classify(ticket, now);
    }
}

pub fn carry_forward_tickets(tickets: &[Ticket]) -> Vec<&Ticket> {
    tickets.iter().filter(|t| t.carry_forward).collect()
}

pub fn high_priority_pending(tickets: &[Ticket]) -> Vec<&Ticket> {
    tickets.iter().filter(|t| t.high_priority).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{at, event, ticket};
    use chrono::Duration;

    #[test]
    fn open_repair_three_days_old_is_carried_forward() {
        let now = at("2024-06-10 09:00:00");
        let mut t = ticket(vec![event("u1", "open", "2024-06-07 09:00:00")]);
        classify(&mut t, now);

        assert!(t.high_priority);
        assert!(t.carry_forward);
        assert_eq!(t.days_pending, 3);
    }

    #[test]
    fn partial_days_round_up() {
        let opened = at("2024-06-10 09:00:00");
        let t = ticket(vec![event("u1", "open", "2024-06-10 09:00:00")]);

        let same_day = evaluate(&t, opened + Duration::hours(5));
        assert_eq!(same_day.days_pending, 1);
        assert!(!same_day.carry_forward);

        let next_day = evaluate(&t, opened + Duration::hours(25));
        assert_eq!(next_day.days_pending, 2);
        assert!(next_day.carry_forward);
    }

    #[test]
    fn unknown_open_time_is_never_carried_forward() {
        let t = ticket(vec![event("u1", "open", "not-a-date")]);
        let verdict = evaluate(&t, at("2030-01-01 00:00:00"));

        assert!(verdict.high_priority);
        assert!(!verdict.carry_forward);
        assert_eq!(verdict.days_pending, 0);
    }

    #[test]
    fn routine_and_closed_tickets_are_not_eligible() {
        let now = at("2024-06-10 09:00:00");

        let mut routine = event("u1", "open", "2024-06-01 09:00:00");
        routine.page_category = "billing".into();
        assert_eq!(evaluate(&ticket(vec![routine]), now), CarryForward::default());

        let closed = ticket(vec![
            event("u1", "open", "2024-06-01 09:00:00"),
            event("u1", "close", "2024-06-02 09:00:00"),
        ]);
        assert_eq!(evaluate(&closed, now), CarryForward::default());
    }

    #[test]
    fn future_open_time_counts_as_fresh() {
        let t = ticket(vec![event("u1", "open", "2024-06-12 09:00:00")]);
        let verdict = evaluate(&t, at("2024-06-10 09:00:00"));
        assert_eq!(verdict.days_pending, 0);
        assert!(!verdict.carry_forward);
    }

    #[test]
    fn list_helpers() {
        let now = at("2024-06-10 09:00:00");
        let mut tickets = vec![
            ticket(vec![event("u1", "open", "2024-06-01 09:00:00")]),
            ticket(vec![event("u2", "open", "2024-06-10 08:00:00")]),
        ];
        classify_all(&mut tickets, now);

        assert_eq!(carry_forward_tickets(&tickets).len(), 1);
        assert_eq!(high_priority_pending(&tickets).len(), 2);
    }
}
