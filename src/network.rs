use std::collections::HashSet;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tickets::field;

/// Optical power below this (dBm) puts a user on the attention list
pub const POWER_FLOOR: f64 = -27.0;

/// Stricter floor used by the power-issue list
pub const POWER_ISSUE_FLOOR: f64 = -28.0;

/// Optical power above this (dBm) is out of range on every list
pub const POWER_CEILING: f64 = -12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Up,
    Down,
    /// Anything the feed reports other than UP or DOWN, blank included
    Offline,
}

impl LinkState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "UP" => LinkState::Up,
            "DOWN" => LinkState::Down,
            _ => LinkState::Offline,
        }
    }
}

/// One subscriber line from a window's live `complains` feed
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LiveRow {
    pub user_id: String,
    pub name: String,
    pub link: LinkState,
    pub user_status: String,
    /// Received optical power in dBm; `None` when blank or not numeric
    pub power: Option<f64>,
    pub mode: String,
    pub phone: String,
    pub pon: String,
    pub location: String,
    pub team: String,
    pub drops: String,
    pub mac: String,
    pub serial: String,
    pub remarks: String,
    pub down_list: Vec<String>,
    pub window: String,
    pub runtime_timestamp: String,
}

impl LiveRow {
    pub fn from_row(row: &Value, window: &str, runtime_timestamp: &str) -> Self {
        let user_status = field(row, "User status");
        let team = match field(row, "Team") {
            t if !t.is_empty() => t,
            _ => field(row, "team"),
        };

        Self {
            user_id: field(row, "Users"),
            name: field(row, "Name"),
            link: LinkState::parse(&user_status),
            user_status,
            power: field(row, "Power").parse::<f64>().ok().filter(|p| p.is_finite()),
            mode: field(row, "Mode"),
            phone: field(row, "Last called no"),
            pon: field(row, "PON"),
            location: field(row, "Location"),
            team,
            drops: field(row, "Drops"),
            mac: field(row, "MAC"),
            serial: field(row, "Serial"),
            remarks: field(row, "Remarks"),
            down_list: split_list(&field(row, "down_list")),
            window: window.to_string(),
            runtime_timestamp: runtime_timestamp.to_string(),
        }
    }

    /// Power outside `[floor, POWER_CEILING]`. Unknown power is never out of range.
    pub fn power_out_of_range(&self, floor: f64) -> bool {
        self.power.is_some_and(|p| p < floor || p > POWER_CEILING)
    }
}

/// Comma-separated id list as sent in `down_list` columns.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Default listing: lines that are down, offline, or outside the power window.
pub fn needs_attention(row: &LiveRow) -> bool {
    row.link != LinkState::Up || row.power_out_of_range(POWER_FLOOR)
}

pub fn down_rows(rows: &[LiveRow]) -> Vec<LiveRow> {
    rows.iter().filter(|r| r.link == LinkState::Down).cloned().collect()
}

pub fn offline_rows(rows: &[LiveRow]) -> Vec<LiveRow> {
    rows.iter().filter(|r| r.link == LinkState::Offline).cloned().collect()
}

pub fn power_issue_rows(rows: &[LiveRow]) -> Vec<LiveRow> {
    rows.iter()
        .filter(|r| r.power_out_of_range(POWER_ISSUE_FLOOR))
        .cloned()
        .collect()
}

/// Concatenates lists keeping the first row seen per user id (case-insensitive).
/// Rows without a user id are dropped.
pub fn merge_unique(lists: impl IntoIterator<Item = Vec<LiveRow>>) -> Vec<LiveRow> {
    let mut seen = HashSet::new();
    lists
        .into_iter()
        .flatten()
        .filter(|row| {
            let key = row.user_id.trim().to_lowercase();
            !key.is_empty() && seen.insert(key)
        })
        .collect()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Listing {
    /// Down, offline or out-of-range power
    #[default]
    Attention,
    Down,
    Offline,
    /// Power below -28 dBm or above -12 dBm
    Power,
    /// Down, offline and power lists merged per user
    All,
}

impl Listing {
    pub fn select(self, rows: &[LiveRow]) -> Vec<LiveRow> {
        match self {
            Listing::Attention => rows.iter().filter(|r| needs_attention(r)).cloned().collect(),
            Listing::Down => down_rows(rows),
            Listing::Offline => offline_rows(rows),
            Listing::Power => power_issue_rows(rows),
            Listing::All => merge_unique([down_rows(rows), offline_rows(rows), power_issue_rows(rows)]),
        }
    }
}

/// Narrows a listing by PON and free text. Blank or `all` PON keeps every row.
pub fn narrow(rows: Vec<LiveRow>, pon: Option<&str>, search: Option<&str>) -> Vec<LiveRow> {
    let pon = pon
        .map(str::trim)
        .filter(|p| !p.is_empty() && !p.eq_ignore_ascii_case("all"));
    let needle = search
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    rows.into_iter()
        .filter(|r| pon.map_or(true, |p| r.pon == p))
        .filter(|r| {
            needle.as_ref().map_or(true, |n| {
                [&r.user_id, &r.name, &r.location, &r.phone, &r.serial, &r.mac]
                    .iter()
                    .any(|f| f.to_lowercase().contains(n))
            })
        })
        .collect()
}
