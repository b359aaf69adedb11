use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, Summary};
use crate::carry_forward::classify_all;
use crate::client::{ApiClient, WindowFailure};
use crate::filter::TicketFilter;
use crate::reconstruct::reconstruct_tickets;
use crate::tickets::{RawStatusEvent, Ticket};
use crate::timeutil::local_now;

/// Tickets rebuilt from one completed fetch
#[derive(Debug, Clone, Default, Serialize)]
pub struct BoardSnapshot {
    pub generation: u64,
    pub refreshed_at: Option<NaiveDateTime>,
    pub tickets: Vec<Ticket>,
    pub failures: Vec<WindowFailure>,
}

impl BoardSnapshot {
    pub fn build(
        generation: u64,
        events: Vec<RawStatusEvent>,
        failures: Vec<WindowFailure>,
        now: NaiveDateTime,
    ) -> Self {
        let mut tickets = reconstruct_tickets(events);
        classify_all(&mut tickets, now);
        Self {
            generation,
            refreshed_at: Some(now),
            tickets,
            failures,
        }
    }

    pub fn filtered(&self, filter: &TicketFilter) -> Vec<Ticket> {
        filter.apply(&self.tickets)
    }

    pub fn summary(&self, filter: &TicketFilter, today: NaiveDate, daily_target: usize) -> Summary {
        aggregate(&self.filtered(filter), today, daily_target)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshOutcome {
    pub generation: u64,
    pub applied: bool,
    pub tickets: usize,
    pub failures: Vec<WindowFailure>,
}

/// Owns the dashboard's ticket set. Each refresh replaces the whole set;
/// a refresh that completes after a newer one has been applied is dropped.
pub struct TicketBoard {
    client: ApiClient,
    windows: Vec<String>,
    daily_target: usize,
    issued: AtomicU64,
    current: RwLock<Arc<BoardSnapshot>>,
}

impl TicketBoard {
    pub fn new(client: ApiClient, windows: Vec<String>, daily_target: usize) -> Self {
        Self {
            client,
            windows,
            daily_target,
            issued: AtomicU64::new(0),
            current: RwLock::new(Arc::new(BoardSnapshot::default())),
        }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    pub fn windows(&self) -> &[String] {
        &self.windows
    }

    pub fn daily_target(&self) -> usize {
        self.daily_target
    }

    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub async fn refresh(&self) -> RefreshOutcome {
        let generation = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, windows = ?self.windows, "Refreshing tickets");

        let fetched = self.client.fetch_windows(&self.windows).await;
        let snapshot = BoardSnapshot::build(generation, fetched.events, fetched.failures, local_now());
        let tickets = snapshot.tickets.len();
        let failures = snapshot.failures.clone();
        let applied = self.apply(snapshot);

        if applied {
            info!(generation, tickets, failed_windows = failures.len(), "Ticket board refreshed");
        }

        RefreshOutcome {
            generation,
            applied,
            tickets,
            failures,
        }
    }

    /// Installs `snapshot` unless a newer generation is already in place.
    pub fn apply(&self, snapshot: BoardSnapshot) -> bool {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        if snapshot.generation <= current.generation {
            warn!(
                stale = snapshot.generation,
                current = current.generation,
                "Discarding stale refresh"
            );
            return false;
        }
        *current = Arc::new(snapshot);
        true
    }

    pub fn tickets(&self, filter: &TicketFilter) -> Vec<Ticket> {
        self.snapshot().filtered(filter)
    }
}
