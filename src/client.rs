use std::collections::HashMap;
use std::future::Future;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::network::{split_list, LiveRow};
use crate::reconstruct::{closed_history, HistoryEntry};
use crate::tickets::{events_from_rows, field, RawStatusEvent, Status, UNKNOWN_PAGE};

const LATEST_LIMIT: u32 = 5000;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned {status}")]
    Status { status: StatusCode, url: String },

    #[error("{0}")]
    Rejected(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Deserialize)]
struct RowsResponse {
    #[serde(default)]
    rows: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    current_complaints: Vec<Value>,
    #[serde(default)]
    complaint_logs: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct MutationResponse {
    #[serde(default)]
    status: String,
    message: Option<String>,
}

/// Body of the mark/remove complaint calls
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ComplaintAction {
    pub user_id: String,
    pub name: String,
    pub address: String,
    pub reason: String,
    #[serde(rename = "Mode")]
    pub mode: String,
    #[serde(rename = "Power")]
    pub power: Option<String>,
    #[serde(rename = "Phone")]
    pub phone: String,
    #[serde(rename = "Team")]
    pub team: String,
    pub pon: String,
    pub window: String,
}

impl ComplaintAction {
    /// Fills blank fields from the user's live line; explicit values stay.
    pub fn fill_from_live(&mut self, row: &LiveRow) {
        for (slot, live) in [
            (&mut self.name, &row.name),
            (&mut self.address, &row.location),
            (&mut self.mode, &row.mode),
            (&mut self.phone, &row.phone),
            (&mut self.team, &row.team),
            (&mut self.pon, &row.pon),
        ] {
            if slot.trim().is_empty() {
                slot.clone_from(live);
            }
        }
        if self.power.as_deref().map_or(true, |p| p.trim().is_empty()) {
            self.power = row.power.map(|p| p.to_string());
        }
    }
}

#[derive(Serialize)]
struct RemovalPayload<'a> {
    complaint_id: &'a str,
    #[serde(flatten)]
    action: &'a ComplaintAction,
}

/// A window whose fetch failed; its rows are treated as empty
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WindowFailure {
    pub window: String,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct FetchOutcome {
    pub events: Vec<RawStatusEvent>,
    pub failures: Vec<WindowFailure>,
}

#[derive(Debug, Default)]
pub struct LiveOutcome {
    pub rows: Vec<LiveRow>,
    pub failures: Vec<WindowFailure>,
}

/// The user's most recent complaint with the line details recorded on it
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct CurrentComplaint {
    pub complaint_id: Option<String>,
    pub user_id: String,
    pub name: String,
    pub address: String,
    pub status: Status,
    pub page: String,
    pub reason: String,
    pub created_at: String,
    pub team: String,
    pub mode: String,
    pub power: String,
    pub phone: String,
    pub pon: String,
    pub drops: String,
    pub down_time: String,
    pub link_status: String,
    pub down_list: Vec<String>,
}

impl CurrentComplaint {
    pub fn from_row(row: &Value) -> Self {
        let team = match field(row, "Team") {
            t if !t.is_empty() => t,
            _ => field(row, "team"),
        };
        let page = match field(row, "page_id") {
            p if !p.is_empty() => p,
            _ => UNKNOWN_PAGE.to_string(),
        };

        Self {
            complaint_id: Some(field(row, "id")).filter(|id| !id.is_empty()),
            user_id: field(row, "user_id"),
            name: field(row, "name"),
            address: field(row, "address"),
            status: Status::parse(&field(row, "status")),
            page,
            reason: field(row, "reason"),
            created_at: field(row, "created_at"),
            team,
            mode: field(row, "Mode"),
            power: field(row, "Power"),
            phone: field(row, "Phone"),
            pon: field(row, "pon"),
            drops: field(row, "drops"),
            down_time: field(row, "down_time"),
            link_status: field(row, "statusUpDown"),
            down_list: split_list(&field(row, "down_list")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UserHistory {
    pub current: Option<CurrentComplaint>,
    pub entries: Vec<HistoryEntry>,
}

/// Client for the per-window complaint API
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, window: &str, path: &str) -> String {
        format!("{}/{}/{}", self.base_url, window, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ClientError> {
        debug!(%url, "GET");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                url: url.to_string(),
            });
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    async fn post_mutation<B: Serialize>(&self, url: &str, body: &B) -> Result<Option<String>, ClientError> {
        debug!(%url, "POST");
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status,
                url: url.to_string(),
            });
        }
        let result: MutationResponse = serde_json::from_str(&response.text().await?)?;
        if result.status == "ok" {
            Ok(result.message)
        } else {
            Err(ClientError::Rejected(
                result.message.unwrap_or_else(|| "request rejected".to_string()),
            ))
        }
    }

    /// Full status-change feed of one window
    pub async fn fetch_status_events(&self, window: &str) -> Result<Vec<RawStatusEvent>, ClientError> {
        let url = self.url(window, "heroesocr_full");
        let response: RowsResponse = self.get_json(&url).await?;
        let events = events_from_rows(&response.rows, window);
        info!(window, rows = response.rows.len(), events = events.len(), "Fetched status feed");
        Ok(events)
    }

    /// Users whose most recent row in the latest-status snapshot is open.
    /// User ids compare case-insensitively; on equal timestamps the later row wins.
    pub async fn fetch_latest_open(&self, window: &str) -> Result<Vec<RawStatusEvent>, ClientError> {
        let url = format!("{}?limit={}", self.url(window, "heroesocr_latest"), LATEST_LIMIT);
        let response: RowsResponse = self.get_json(&url).await?;
        Ok(latest_open(events_from_rows(&response.rows, window)))
    }

    pub async fn fetch_user_complaints(&self, window: &str, user_id: &str) -> Result<Vec<RawStatusEvent>, ClientError> {
        let url = self.url(window, &format!("heroesocr_user_complaints/{}", user_id));
        let response: RowsResponse = self.get_json(&url).await?;
        Ok(events_from_rows(&response.rows, window))
    }

    pub async fn fetch_user_history(&self, window: &str, user_id: &str) -> Result<UserHistory, ClientError> {
        let url = self.url(window, &format!("complaint_history/{}", user_id));
        let response: HistoryResponse = self.get_json(&url).await?;

        let current = response.current_complaints.first().map(CurrentComplaint::from_row);
        let logs = events_from_rows(&response.complaint_logs, window);

        Ok(UserHistory {
            current,
            entries: closed_history(&logs),
        })
    }

    /// Live line state of every subscriber in one window
    pub async fn fetch_live_rows(&self, window: &str) -> Result<Vec<LiveRow>, ClientError> {
        let url = self.url(window, "complains");
        let body: Value = self.get_json(&url).await?;
        let runtime = field(&body, "runtime_timestamp");
        let rows: Vec<LiveRow> = body
            .get("rows")
            .and_then(Value::as_array)
            .map(|rows| rows.iter().map(|row| LiveRow::from_row(row, window, &runtime)).collect())
            .unwrap_or_default();
        info!(window, rows = rows.len(), "Fetched live lines");
        Ok(rows)
    }

    /// Runs `fetch` for every window concurrently. A failing window
    /// contributes nothing but a failure record; it never aborts the others.
    async fn fan_out<T, F, Fut>(&self, windows: &[String], fetch: F) -> (Vec<T>, Vec<WindowFailure>)
    where
        T: Send + 'static,
        F: Fn(ApiClient, String) -> Fut,
        Fut: Future<Output = Result<Vec<T>, ClientError>> + Send + 'static,
    {
        let handles: Vec<_> = windows
            .iter()
            .map(|window| tokio::spawn(fetch(self.clone(), window.clone())))
            .collect();

        let mut items = Vec::new();
        let mut failures = Vec::new();
        for (handle, window) in handles.into_iter().zip(windows) {
            let error = match handle.await {
                Ok(Ok(batch)) => {
                    items.extend(batch);
                    continue;
                }
                Ok(Err(e)) => e.to_string(),
                Err(e) => format!("fetch task failed: {}", e),
            };
            warn!(%window, %error, "Failed to load window");
            failures.push(WindowFailure {
                window: window.clone(),
                error,
            });
        }
        (items, failures)
    }

    pub async fn fetch_windows(&self, windows: &[String]) -> FetchOutcome {
        let (events, failures) = self
            .fan_out(windows, |client, window| async move {
                client.fetch_status_events(&window).await
            })
            .await;
        FetchOutcome { events, failures }
    }

    pub async fn fetch_live_windows(&self, windows: &[String]) -> LiveOutcome {
        let (rows, failures) = self
            .fan_out(windows, |client, window| async move {
                client.fetch_live_rows(&window).await
            })
            .await;
        LiveOutcome { rows, failures }
    }

    pub async fn mark_complaint(&self, action: &ComplaintAction) -> Result<String, ClientError> {
        let url = self.url(&action.window, "mark_complain");
        let message = self.post_mutation(&url, action).await?;
        info!(window = %action.window, user_id = %action.user_id, "Complaint marked");
        Ok(message.unwrap_or_else(|| "Marked".to_string()))
    }

    /// Removes the user's open complaint. Without a known id the first open
    /// complaint on record is looked up; ids must be numeric.
    pub async fn remove_complaint(
        &self,
        action: &ComplaintAction,
        complaint_id: Option<&str>,
    ) -> Result<String, ClientError> {
        let complaint_id = match complaint_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => id.to_string(),
            None => self
                .fetch_user_complaints(&action.window, &action.user_id)
                .await?
                .into_iter()
                .find(|c| c.status == Status::Open)
                .and_then(|c| c.complaint_id)
                .unwrap_or_default(),
        };

        if complaint_id.is_empty() || complaint_id.parse::<u64>().is_err() {
            return Err(ClientError::Rejected(
                "No open complaint found for this user".to_string(),
            ));
        }

        let url = self.url(&action.window, "remove_complain");
        let payload = RemovalPayload {
            complaint_id: &complaint_id,
            action,
        };
        let message = self.post_mutation(&url, &payload).await?;
        info!(window = %action.window, user_id = %action.user_id, %complaint_id, "Complaint removed");
        Ok(message.unwrap_or_else(|| "Removed".to_string()))
    }
}

fn latest_open(events: Vec<RawStatusEvent>) -> Vec<RawStatusEvent> {
    let mut order: Vec<String> = Vec::new();
    let mut latest: HashMap<String, RawStatusEvent> = HashMap::new();

    for event in events {
        let uid = event.user_id.to_lowercase();
        match latest.get(&uid) {
            Some(prev) if event.sort_key() < prev.sort_key() => {}
            Some(_) => {
                latest.insert(uid, event);
            }
            None => {
                order.push(uid.clone());
                latest.insert(uid, event);
            }
        }
    }

    order
        .into_iter()
        .filter_map(|uid| latest.remove(&uid))
        .filter(|e| e.status.is_open())
        .collect()
}
