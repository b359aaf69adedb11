use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::timeutil::parse_timestamp;

/// Team label used when no event in a ticket names a team
pub const UNKNOWN_TEAM: &str = "UNKNOWN";

/// Page label used when a row carries no usable page id
pub const UNKNOWN_PAGE: &str = "UNKNOWN";

/// Tickets a team is expected to take per day
pub const DAILY_TARGET: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Open,
    Close,
    Other(String),
}

impl Status {
    /// Missing status counts as open, the way the feed treats fresh complaints.
    pub fn parse(raw: &str) -> Self {
        let lowered = raw.trim().to_lowercase();
        match lowered.as_str() {
            "" | "open" => Status::Open,
            "close" | "closed" => Status::Close,
            _ => Status::Other(lowered),
        }
    }

    pub fn is_open(&self) -> bool {
        matches!(self, Status::Open)
    }

    pub fn is_close(&self) -> bool {
        matches!(self, Status::Close)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Status::Open => "open",
            Status::Close => "close",
            Status::Other(s) => s.as_str(),
        }
    }
}

/// Serialised as its level: 1 repair, 2 install, 3 everything else.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(into = "u8", try_from = "u8")]
pub enum Priority {
    Repair = 1,
    Install = 2,
    Routine = 3,
}

impl Priority {
    pub fn from_category(category: &str) -> Self {
        let page = category.to_lowercase();
        if page.contains("repair") {
            Priority::Repair
        } else if page.contains("install") {
            Priority::Install
        } else {
            Priority::Routine
        }
    }

    pub fn from_level(level: u8) -> Option<Self> {
        match level {
            1 => Some(Priority::Repair),
            2 => Some(Priority::Install),
            3 => Some(Priority::Routine),
            _ => None,
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn is_high(self) -> bool {
        matches!(self, Priority::Repair | Priority::Install)
    }
}

impl From<Priority> for u8 {
    fn from(priority: Priority) -> u8 {
        priority.level()
    }
}

impl TryFrom<u8> for Priority {
    type Error = String;

    fn try_from(level: u8) -> Result<Self, Self::Error> {
        Priority::from_level(level).ok_or_else(|| format!("unknown priority level {}", level))
    }
}

/// One status-change row from a window's complaint feed
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RawStatusEvent {
    pub user_id: String,
    pub window: String,
    pub team: String,
    pub page_category: String,
    pub reason: String,
    pub name: String,
    pub address: String,
    pub status: Status,
    pub created_at: String,
    /// Parsed `created_at`; `None` when the source string could not be read
    pub at: Option<NaiveDateTime>,
    pub complaint_id: Option<String>,
}

impl RawStatusEvent {
    /// Decodes a feed row leniently. Only a missing `user_id` rejects the row;
    /// every other gap is defaulted.
    pub fn from_row(row: &Value, window: &str) -> Option<Self> {
        let user_id = field(row, "user_id");
        if user_id.is_empty() {
            return None;
        }

        let team = match field(row, "Team") {
            t if !t.is_empty() => t,
            _ => field(row, "team"),
        };

        let page_category = match field(row, "page_id") {
            p if p.is_empty() || p.eq_ignore_ascii_case("null") => UNKNOWN_PAGE.to_string(),
            p => p,
        };

        let created_at = field(row, "created_at");
        let id = field(row, "id");

        Some(Self {
            user_id,
            window: window.to_string(),
            team,
            page_category,
            reason: field(row, "reason"),
            name: field(row, "name"),
            address: field(row, "address"),
            status: Status::parse(&field(row, "status")),
            at: parse_timestamp(&created_at),
            created_at,
            complaint_id: if id.is_empty() { None } else { Some(id) },
        })
    }

    /// Ordering key: unparseable timestamps sort before everything else.
    pub fn sort_key(&self) -> NaiveDateTime {
        self.at.unwrap_or(NaiveDateTime::MIN)
    }
}

/// Decodes every row of a feed response, dropping rows without a user id.
pub fn events_from_rows(rows: &[Value], window: &str) -> Vec<RawStatusEvent> {
    rows.iter()
        .filter_map(|row| RawStatusEvent::from_row(row, window))
        .collect()
}

/// Reads a scalar column as trimmed text. Numbers are stringified, `null` and
/// structured values become empty.
pub fn field(row: &Value, key: &str) -> String {
    match row.get(key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

/// Reconstructed lifecycle of one complaint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticket {
    pub user_id: String,
    pub window: String,
    pub team: String,
    pub page_category: String,
    pub priority: Priority,
    pub reason: String,
    pub name: String,
    pub address: String,
    pub latest_status: Status,
    /// Oldest first, never empty
    pub history: Vec<RawStatusEvent>,
    pub first_open_at: Option<NaiveDateTime>,
    pub last_close_at: Option<NaiveDateTime>,
    pub tat_minutes: Option<f64>,
    pub carry_forward: bool,
    pub days_pending: i64,
    pub high_priority: bool,
    /// Id of the newest open row, used when removing the complaint
    pub open_complaint_id: Option<String>,
}

impl Ticket {
    pub fn latest(&self) -> &RawStatusEvent {
        // history is non-empty by construction
        &self.history[self.history.len() - 1]
    }

    pub fn latest_at(&self) -> Option<NaiveDateTime> {
        self.latest().at
    }

    pub fn is_open(&self) -> bool {
        self.latest_status.is_open()
    }

    pub fn is_closed(&self) -> bool {
        self.latest_status.is_close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parsing_is_case_insensitive() {
        assert_eq!(Status::parse("Open"), Status::Open);
        assert_eq!(Status::parse("CLOSE"), Status::Close);
        assert_eq!(Status::parse(""), Status::Open);
        assert_eq!(Status::parse("Pending"), Status::Other("pending".into()));
    }

    #[test]
    fn priority_follows_page_category() {
        assert_eq!(Priority::from_category("Fiber REPAIR desk"), Priority::Repair);
        assert_eq!(Priority::from_category("new_install"), Priority::Install);
        assert_eq!(Priority::from_category("billing"), Priority::Routine);
        assert_eq!(Priority::from_category(""), Priority::Routine);
        assert!(Priority::Install.is_high());
        assert!(!Priority::Routine.is_high());
    }

    #[test]
    fn priority_serialises_as_level() {
        assert_eq!(serde_json::to_value(Priority::Repair).unwrap(), json!(1));
        assert_eq!(serde_json::to_value(Priority::Routine).unwrap(), json!(3));
        assert_eq!(serde_json::from_value::<Priority>(json!(2)).unwrap(), Priority::Install);
        assert!(serde_json::from_value::<Priority>(json!(9)).is_err());
    }

    #[test]
    fn row_without_user_id_is_dropped() {
        let row = json!({ "status": "open", "created_at": "2024-01-01 10:00:00" });
        assert!(RawStatusEvent::from_row(&row, "MEROTRA").is_none());

        let blank = json!({ "user_id": "   " });
        assert!(RawStatusEvent::from_row(&blank, "MEROTRA").is_none());
    }

    #[test]
    fn row_fields_are_defaulted() {
        let row = json!({
            "user_id": 4411,
            "team": "  ",
            "Team": "North",
            "page_id": "null",
            "status": "Close",
            "created_at": "garbage",
            "id": 77
        });
        let event = RawStatusEvent::from_row(&row, "SUNNY").unwrap();
        assert_eq!(event.user_id, "4411");
        assert_eq!(event.team, "North");
        assert_eq!(event.page_category, UNKNOWN_PAGE);
        assert_eq!(event.status, Status::Close);
        assert_eq!(event.at, None);
        assert_eq!(event.sort_key(), NaiveDateTime::MIN);
        assert_eq!(event.complaint_id.as_deref(), Some("77"));
        assert_eq!(event.window, "SUNNY");
        assert_eq!(event.reason, "");
    }

    #[test]
    fn lowercase_team_is_used_when_capitalised_is_blank() {
        let row = json!({ "user_id": "u1", "Team": "", "team": "South" });
        let event = RawStatusEvent::from_row(&row, "MEROTRA").unwrap();
        assert_eq!(event.team, "South");
    }
}
