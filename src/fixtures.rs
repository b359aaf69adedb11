//! Builders shared by unit tests.

use chrono::NaiveDateTime;

use crate::reconstruct::reconstruct_tickets;
use crate::tickets::{RawStatusEvent, Status, Ticket};
use crate::timeutil::parse_timestamp;

pub fn event(user: &str, status: &str, created_at: &str) -> RawStatusEvent {
    RawStatusEvent {
        user_id: user.to_string(),
        window: "MEROTRA".to_string(),
        team: "North".to_string(),
        page_category: "fiber_repair".to_string(),
        reason: "No internet".to_string(),
        name: "Asha".to_string(),
        address: "12 Main Rd".to_string(),
        status: Status::parse(status),
        created_at: created_at.to_string(),
        at: parse_timestamp(created_at),
        complaint_id: None,
    }
}

pub fn ticket(events: Vec<RawStatusEvent>) -> Ticket {
    let mut tickets = reconstruct_tickets(events);
    assert_eq!(tickets.len(), 1, "fixture events must form a single ticket");
    tickets.remove(0)
}

pub fn at(s: &str) -> NaiveDateTime {
    parse_timestamp(s).expect("fixture timestamp")
}
