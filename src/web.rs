use crate::board::TicketBoard;
use crate::carry_forward::{carry_forward_tickets, high_priority_pending};
use crate::client::{ClientError, ComplaintAction};
use crate::export::tickets_csv;
use crate::filter::{FilterParams, TicketFilter};
use crate::network::{narrow, Listing};
use crate::timeutil::local_now;
use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

type SharedBoard = Arc<TicketBoard>;

pub fn router(board: SharedBoard) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(dashboard_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/tickets", get(tickets_handler))
        .route("/api/carry-forward", get(carry_forward_handler))
        .route("/api/high-priority", get(high_priority_handler))
        .route("/api/export.csv", get(export_handler))
        .route("/api/refresh", post(refresh_handler))
        .route("/api/history/:window/:user", get(history_handler))
        .route("/api/latest-open/:window", get(latest_open_handler))
        .route("/api/network", get(network_handler))
        .route("/api/mark", post(mark_handler))
        .route("/api/remove", post(remove_handler))
        .layer(cors)
        .with_state(board)
}

pub async fn start_web_server(board: SharedBoard, port: u16) -> anyhow::Result<()> {
    let app = router(board);
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?;
    info!("Web server listening on port {}", port);
    axum::serve(listener, app).await?;
    Ok(())
}

async fn dashboard_handler() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

fn filter_from(params: &FilterParams) -> Result<TicketFilter, Response> {
    params
        .to_filter(local_now().date())
        .map_err(|e| bad_request(e.to_string()))
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(serde_json::json!({
            "success": false,
            "error": message
        })),
    )
        .into_response()
}

fn client_failure(e: ClientError) -> Response {
    let status = match e {
        ClientError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::BAD_GATEWAY,
    };
    (
        status,
        Json(serde_json::json!({
            "success": false,
            "error": e.to_string()
        })),
    )
        .into_response()
}

async fn summary_handler(
    State(board): State<SharedBoard>,
    Query(params): Query<FilterParams>,
) -> impl IntoResponse {
    match filter_from(&params) {
        Ok(filter) => {
            let snapshot = board.snapshot();
            let summary = snapshot.summary(&filter, local_now().date(), board.daily_target());
            Json(serde_json::json!({
                "success": true,
                "generation": snapshot.generation,
                "refreshed_at": snapshot.refreshed_at,
                "failures": snapshot.failures,
                "data": summary
            }))
            .into_response()
        }
        Err(rejection) => rejection,
    }
}

async fn tickets_handler(
    State(board): State<SharedBoard>,
    Query(params): Query<FilterParams>,
) -> impl IntoResponse {
    match filter_from(&params) {
        Ok(filter) => {
            let tickets = board.tickets(&filter);
            Json(serde_json::json!({
                "success": true,
                "count": tickets.len(),
                "data": tickets
            }))
            .into_response()
        }
        Err(rejection) => rejection,
    }
}

async fn carry_forward_handler(State(board): State<SharedBoard>) -> impl IntoResponse {
    let snapshot = board.snapshot();
    let tickets = carry_forward_tickets(&snapshot.tickets);
    Json(serde_json::json!({
        "success": true,
        "count": tickets.len(),
        "data": tickets
    }))
}

async fn high_priority_handler(State(board): State<SharedBoard>) -> impl IntoResponse {
    let snapshot = board.snapshot();
    let tickets = high_priority_pending(&snapshot.tickets);
    Json(serde_json::json!({
        "success": true,
        "count": tickets.len(),
        "data": tickets
    }))
}

async fn export_handler(
    State(board): State<SharedBoard>,
    Query(params): Query<FilterParams>,
) -> impl IntoResponse {
    let filter = match filter_from(&params) {
        Ok(filter) => filter,
        Err(rejection) => return rejection,
    };
    match tickets_csv(&board.tickets(&filter)) {
        Ok(csv) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
                (header::CONTENT_DISPOSITION, "attachment; filename=\"tickets.csv\""),
            ],
            csv,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "CSV export failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "success": false,
                    "error": e.to_string()
                })),
            )
                .into_response()
        }
    }
}

async fn refresh_handler(State(board): State<SharedBoard>) -> impl IntoResponse {
    let outcome = board.refresh().await;
    Json(serde_json::json!({
        "success": true,
        "data": outcome
    }))
}

async fn history_handler(
    State(board): State<SharedBoard>,
    Path((window, user)): Path<(String, String)>,
) -> impl IntoResponse {
    match board.client().fetch_user_history(&window, &user).await {
        Ok(history) => Json(serde_json::json!({
            "success": true,
            "data": history
        }))
        .into_response(),
        Err(e) => client_failure(e),
    }
}

async fn latest_open_handler(
    State(board): State<SharedBoard>,
    Path(window): Path<String>,
) -> impl IntoResponse {
    match board.client().fetch_latest_open(&window).await {
        Ok(rows) => Json(serde_json::json!({
            "success": true,
            "count": rows.len(),
            "data": rows
        }))
        .into_response(),
        Err(e) => client_failure(e),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NetworkQuery {
    listing: Listing,
    window: Option<String>,
    pon: Option<String>,
    search: Option<String>,
}

/// Live line listing across the board's windows, or the one named in `window`
async fn network_handler(
    State(board): State<SharedBoard>,
    Query(query): Query<NetworkQuery>,
) -> impl IntoResponse {
    let windows = match query.window.as_deref().map(str::trim).filter(|w| !w.is_empty()) {
        Some(window) => vec![window.to_string()],
        None => board.windows().to_vec(),
    };
    let outcome = board.client().fetch_live_windows(&windows).await;
    let rows = narrow(
        query.listing.select(&outcome.rows),
        query.pon.as_deref(),
        query.search.as_deref(),
    );
    Json(serde_json::json!({
        "success": true,
        "count": rows.len(),
        "failures": outcome.failures,
        "data": rows
    }))
}

async fn mark_handler(
    State(board): State<SharedBoard>,
    Json(action): Json<ComplaintAction>,
) -> impl IntoResponse {
    match board.client().mark_complaint(&action).await {
        Ok(message) => Json(serde_json::json!({
            "success": true,
            "message": message
        }))
        .into_response(),
        Err(e) => client_failure(e),
    }
}

#[derive(Debug, Deserialize)]
struct RemoveRequest {
    complaint_id: Option<String>,
    #[serde(flatten)]
    action: ComplaintAction,
}

async fn remove_handler(
    State(board): State<SharedBoard>,
    Json(request): Json<RemoveRequest>,
) -> impl IntoResponse {
    match board
        .client()
        .remove_complaint(&request.action, request.complaint_id.as_deref())
        .await
    {
        Ok(message) => Json(serde_json::json!({
            "success": true,
            "message": message
        }))
        .into_response(),
        Err(e) => client_failure(e),
    }
}

const DASHBOARD_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Complaint TAT Dashboard</title>
    <style>
        body { font-family: system-ui, sans-serif; margin: 0; background: #0f172a; color: #e2e8f0; }
        header { display: flex; gap: 12px; align-items: center; padding: 16px 24px; background: #1e293b; }
        header h1 { font-size: 18px; margin: 0 auto 0 0; }
        select, input, button { background: #0f172a; color: inherit; border: 1px solid #334155; border-radius: 6px; padding: 6px 10px; }
        button { cursor: pointer; }
        .kpis { display: grid; grid-template-columns: repeat(5, 1fr); gap: 16px; padding: 24px; }
        .kpi { background: #1e293b; border-radius: 10px; padding: 16px; }
        .kpi .label { font-size: 12px; color: #94a3b8; text-transform: uppercase; }
        .kpi .value { font-size: 28px; font-weight: 700; margin-top: 6px; }
        table { width: calc(100% - 48px); margin: 0 24px 24px; border-collapse: collapse; }
        th, td { text-align: left; padding: 8px 10px; border-bottom: 1px solid #334155; }
        .met { color: #10b981; } .partial { color: #f59e0b; } .missed { color: #ef4444; }
        #notice { padding: 0 24px; color: #f59e0b; min-height: 20px; }
    </style>
</head>
<body>
<header>
    <h1>Complaint TAT Dashboard</h1>
    <select id="range">
        <option value="all">All time</option>
        <option value="today">Today</option>
        <option value="yesterday">Yesterday</option>
        <option value="last7days">Last 7 days</option>
        <option value="last30days">Last 30 days</option>
    </select>
    <input id="search" placeholder="Search">
    <button id="refresh">Refresh</button>
    <a id="csv" href="/api/export.csv"><button>CSV</button></a>
</header>
<div id="notice"></div>
<section class="kpis">
    <div class="kpi"><div class="label">Total</div><div class="value" id="kpiTotal">0</div></div>
    <div class="kpi"><div class="label">Closed</div><div class="value" id="kpiClosed">0</div></div>
    <div class="kpi"><div class="label">Open</div><div class="value" id="kpiOpen">0</div></div>
    <div class="kpi"><div class="label">Avg TAT</div><div class="value" id="kpiTat">—</div></div>
    <div class="kpi"><div class="label">Carried Forward</div><div class="value" id="kpiCarry">0</div></div>
</section>
<table>
    <thead><tr><th>Team</th><th>Total</th><th>Open</th><th>Closed</th><th>P1</th><th>P2</th><th>P3</th><th>Today / Target</th><th>Avg TAT</th></tr></thead>
    <tbody id="teams"></tbody>
</table>
<script>
function formatTat(m) {
    if (!m || m <= 0) return '—';
    if (m < 60) return Math.round(m) + 'm';
    if (m < 1440) return (m / 60).toFixed(1) + 'h';
    return (m / 1440).toFixed(1) + 'd';
}
function query() {
    const p = new URLSearchParams({ range: document.getElementById('range').value });
    const s = document.getElementById('search').value.trim();
    if (s) p.set('search', s);
    return p.toString();
}
async function load() {
    const q = query();
    document.getElementById('csv').href = '/api/export.csv?' + q;
    const res = await fetch('/api/summary?' + q);
    const body = await res.json();
    if (!body.success) { document.getElementById('notice').textContent = body.error; return; }
    const d = body.data;
    document.getElementById('notice').textContent =
        body.failures.map(f => 'Failed to load ' + f.window).join(' · ');
    document.getElementById('kpiTotal').textContent = d.counts.total;
    document.getElementById('kpiClosed').textContent = d.counts.closed;
    document.getElementById('kpiOpen').textContent = d.counts.open;
    document.getElementById('kpiTat').textContent = formatTat(d.tat.average_minutes);
    document.getElementById('kpiCarry').textContent = d.counts.carry_forward;
    document.getElementById('teams').innerHTML = d.teams.map(t => `
        <tr><td>${t.team}</td><td>${t.counts.total}</td><td>${t.counts.open}</td><td>${t.counts.closed}</td>
        <td>${t.priorities.repair}</td><td>${t.priorities.install}</td><td>${t.priorities.routine}</td>
        <td class="${t.target_status}">${t.today}/${t.target}</td><td>${formatTat(t.tat.average_minutes)}</td></tr>`).join('');
}
document.getElementById('refresh').onclick = async () => { await fetch('/api/refresh', { method: 'POST' }); load(); };
document.getElementById('range').onchange = load;
document.getElementById('search').oninput = load;
load();
</script>
</body>
</html>
"##;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::{feed_router, live_router, serve};
    use crate::client::ApiClient;
    use reqwest::header::CONTENT_TYPE;
    use serde_json::Value;

    async fn dashboard() -> String {
        let upstream = serve(feed_router().merge(live_router())).await;
        let board = TicketBoard::new(
            ApiClient::new(&upstream),
            vec!["MEROTRA".to_string(), "BROKEN".to_string()],
            4,
        );
        serve(router(Arc::new(board))).await
    }

    #[tokio::test]
    async fn refresh_then_summary() {
        let base = dashboard().await;
        let http = reqwest::Client::new();

        let refreshed: Value = http
            .post(format!("{}/api/refresh", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(refreshed["data"]["applied"], true);

        let summary: Value = http
            .get(format!("{}/api/summary?team=North&range=all", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(summary["success"], true);
        assert_eq!(summary["data"]["counts"]["total"], 1);
        assert_eq!(summary["failures"][0]["window"], "BROKEN");
    }

    #[tokio::test]
    async fn bad_filters_are_rejected() {
        let base = dashboard().await;

        for query in ["priority=9", "range=fortnight", "status=pending", "sort=oldest"] {
            let response = reqwest::get(format!("{}/api/tickets?{}", base, query)).await.unwrap();
            assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST, "{}", query);
        }
    }

    #[tokio::test]
    async fn all_priority_and_status_are_accepted() {
        let base = dashboard().await;
        let http = reqwest::Client::new();
        http.post(format!("{}/api/refresh", base)).send().await.unwrap();

        let response = http
            .get(format!("{}/api/tickets?priority=all&status=all&range=all", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::OK);
        let body: Value = response.json().await.unwrap();
        assert_eq!(body["count"], 1);

        let closed: Value = http
            .get(format!("{}/api/tickets?status=close&sort=tat", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(closed["count"], 1);
        assert_eq!(closed["data"][0]["priority"], 1);
    }

    #[tokio::test]
    async fn network_listing_endpoint() {
        let base = dashboard().await;

        let body: Value = reqwest::get(format!("{}/api/network?listing=power", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["count"], 2);
        assert_eq!(body["failures"][0]["window"], "BROKEN");

        let body: Value = reqwest::get(format!("{}/api/network?window=MEROTRA&listing=down&search=asha", base))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["count"], 1);
        assert_eq!(body["data"][0]["user_id"], "u1");
        assert!(body["failures"].as_array().unwrap().is_empty());

        let response = reqwest::get(format!("{}/api/network?listing=sideways", base)).await.unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn csv_export_endpoint() {
        let base = dashboard().await;
        let http = reqwest::Client::new();
        http.post(format!("{}/api/refresh", base)).send().await.unwrap();

        let response = http.get(format!("{}/api/export.csv", base)).send().await.unwrap();
        assert_eq!(
            response.headers()[CONTENT_TYPE].to_str().unwrap(),
            "text/csv; charset=utf-8"
        );
        let body = response.text().await.unwrap();
        assert_eq!(body.lines().count(), 2);
    }
}
