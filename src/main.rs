mod aggregate;
mod board;
mod carry_forward;
mod client;
mod export;
mod filter;
mod network;
mod reconstruct;
mod report;
mod tickets;
mod timeutil;
mod web;

#[cfg(test)]
mod fixtures;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::aggregate::aggregate;
use crate::board::TicketBoard;
use crate::client::{ApiClient, ComplaintAction, WindowFailure};
use crate::export::{export_json, history_csv, save, tickets_csv};
use crate::filter::FilterParams;
use crate::network::{narrow, Listing};
use crate::report::generate_report;
use crate::tickets::DAILY_TARGET;
use crate::timeutil::local_now;
use crate::web::start_web_server;

#[derive(Parser)]
#[command(name = "complaint-tat-tracker")]
#[command(about = "Tracks complaint turnaround time and carry-forward across service windows", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct SourceArgs {
    /// Base URL of the complaint API
    #[arg(long, default_value = "http://localhost:8000")]
    base_url: String,

    /// Service windows to load (comma-separated)
    #[arg(long, default_value = "MEROTRA,SUNNY")]
    windows: String,

    /// Closures per team per day counted as meeting target
    #[arg(long, default_value_t = DAILY_TARGET)]
    daily_target: usize,
}

impl SourceArgs {
    fn client(&self) -> ApiClient {
        ApiClient::new(&self.base_url)
    }

    fn window_list(&self) -> Vec<String> {
        self.windows
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }

    fn board(&self) -> TicketBoard {
        TicketBoard::new(self.client(), self.window_list(), self.daily_target)
    }
}

#[derive(Args, Clone)]
struct ActionArgs {
    /// Window the complaint belongs to
    #[arg(long)]
    window: String,

    #[arg(long)]
    user_id: String,

    #[arg(long, default_value = "")]
    name: String,

    #[arg(long, default_value = "")]
    address: String,

    #[arg(long, default_value = "")]
    reason: String,

    #[arg(long, default_value = "")]
    mode: String,

    #[arg(long)]
    power: Option<String>,

    #[arg(long, default_value = "")]
    phone: String,

    #[arg(long, default_value = "")]
    team: String,

    #[arg(long, default_value = "")]
    pon: String,
}

impl From<ActionArgs> for ComplaintAction {
    fn from(args: ActionArgs) -> Self {
        ComplaintAction {
            user_id: args.user_id,
            name: args.name,
            address: args.address,
            reason: args.reason,
            mode: args.mode,
            power: args.power,
            phone: args.phone,
            team: args.team,
            pon: args.pon,
            window: args.window,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Csv,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch all windows and print a TAT report
    Report {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filters: FilterParams,

        /// Output report file
        #[arg(short, long, default_value = "tat_report.txt")]
        output: PathBuf,
    },
    /// Export filtered tickets
    Export {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        filters: FilterParams,

        #[arg(short, long, value_enum, default_value = "csv")]
        format: ExportFormat,

        /// Output file path
        #[arg(short, long, default_value = "tickets.csv")]
        output: PathBuf,
    },
    /// Serve the web dashboard
    Dashboard {
        #[command(flatten)]
        source: SourceArgs,

        /// Port for the web dashboard
        #[arg(short, long, default_value = "8080")]
        port: u16,

        /// Path to store log files
        #[arg(short, long)]
        log_dir: Option<PathBuf>,

        /// Seconds between automatic refreshes (0 disables)
        #[arg(long, default_value = "0")]
        refresh_interval: u64,
    },
    /// Show a user's closed complaint history
    History {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        window: String,

        #[arg(long)]
        user_id: String,

        /// Also write the history as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
    },
    /// List each user's latest open complaint in a window
    LatestOpen {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long)]
        window: String,
    },
    /// List live lines that are down, offline or outside the power window
    Network {
        #[command(flatten)]
        source: SourceArgs,

        #[arg(long, value_enum, default_value = "attention")]
        listing: Listing,

        #[arg(long)]
        pon: Option<String>,

        #[arg(long)]
        search: Option<String>,
    },
    /// Mark a complaint against a user
    Mark {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        action: ActionArgs,

        /// Fill blank details from the user's live line in the window
        #[arg(long)]
        from_live: bool,
    },
    /// Remove a user's open complaint
    Remove {
        #[command(flatten)]
        source: SourceArgs,

        #[command(flatten)]
        action: ActionArgs,

        /// Complaint id; looked up from the user's open complaints when omitted
        #[arg(long)]
        complaint_id: Option<String>,
    },
}

fn init_logging(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let registry = tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .with(fmt::layer().with_writer(std::io::stdout));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = RollingFileAppender::new(Rotation::HOURLY, dir, "complaint-tat.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            registry.with(fmt::layer().json().with_writer(non_blocking)).init();
            Ok(Some(guard))
        }
        None => {
            registry.init();
            Ok(None)
        }
    }
}

fn report_failures(failures: &[WindowFailure]) {
    for failure in failures {
        warn!(window = %failure.window, error = %failure.error, "Window could not be loaded");
        eprintln!("Failed to load window {}: {}", failure.window, failure.error);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            source,
            filters,
            output,
        } => {
            let _guard = init_logging(None)?;
            let board = source.board();
            let outcome = board.refresh().await;
            report_failures(&outcome.failures);

            let filter = filters.to_filter(local_now().date())?;
            let tickets = board.tickets(&filter);
            let summary = aggregate(&tickets, local_now().date(), board.daily_target());
            let report = generate_report(&summary, &tickets);
            save(&output, &report)?;
            println!("{}", report);
            println!("\nReport saved to {:?}", output);
            Ok(())
        }
        Commands::Export {
            source,
            filters,
            format,
            output,
        } => {
            let _guard = init_logging(None)?;
            let board = source.board();
            let outcome = board.refresh().await;
            report_failures(&outcome.failures);

            let filter = filters.to_filter(local_now().date())?;
            let tickets = board.tickets(&filter);
            let data = match format {
                ExportFormat::Csv => tickets_csv(&tickets)?,
                ExportFormat::Json => {
                    let summary = aggregate(&tickets, local_now().date(), board.daily_target());
                    export_json(&summary, &tickets)?
                }
            };
            save(&output, &data)?;
            println!("Exported {} tickets to {:?}", tickets.len(), output);
            Ok(())
        }
        Commands::Dashboard {
            source,
            port,
            log_dir,
            refresh_interval,
        } => {
            let _guard = init_logging(log_dir.as_deref())?;

            info!("Starting complaint TAT dashboard");
            let board = Arc::new(source.board());
            info!("Complaint API: {}", board.client().base_url());
            info!("Windows: {:?}", board.windows());
            info!("Web dashboard: http://localhost:{}", port);

            let outcome = board.refresh().await;
            report_failures(&outcome.failures);

            if refresh_interval > 0 {
                let background = board.clone();
                tokio::spawn(async move {
                    let mut ticker =
                        tokio::time::interval(std::time::Duration::from_secs(refresh_interval));
                    ticker.tick().await;
                    loop {
                        ticker.tick().await;
                        let outcome = background.refresh().await;
                        report_failures(&outcome.failures);
                    }
                });
            }

            tokio::select! {
                result = start_web_server(board, port) => result?,
                _ = tokio::signal::ctrl_c() => info!("Shutting down..."),
            }
            Ok(())
        }
        Commands::History {
            source,
            window,
            user_id,
            csv,
        } => {
            let _guard = init_logging(None)?;
            let history = source.client().fetch_user_history(&window, &user_id).await?;

            if let Some(current) = &history.current {
                println!(
                    "{} / {}  #{}  {}  {}  {}",
                    window,
                    user_id,
                    current.complaint_id.as_deref().unwrap_or("N/A"),
                    current.status.as_str(),
                    current.page,
                    current.reason
                );
                println!(
                    "  team {}  mode {}  power {}  phone {}  pon {}  drops {}  down {}  line {}",
                    current.team,
                    current.mode,
                    current.power,
                    current.phone,
                    current.pon,
                    current.drops,
                    current.down_time,
                    current.link_status
                );
                if !current.down_list.is_empty() {
                    println!("  Down list: {}", current.down_list.join(", "));
                }
            }
            if history.entries.is_empty() {
                println!("No closed complaints on record.");
            }
            for (i, entry) in history.entries.iter().enumerate() {
                println!(
                    "{:>3}. {} -> {}  {:>8}  {} ({})",
                    i + 1,
                    entry.opened_at,
                    entry.closed_at,
                    entry.duration,
                    entry.reason,
                    entry.page_category
                );
            }

            if let Some(path) = csv {
                save(&path, &history_csv(&history.entries)?)?;
                println!("\nHistory saved to {:?}", path);
            }
            Ok(())
        }
        Commands::LatestOpen { source, window } => {
            let _guard = init_logging(None)?;
            let rows = source.client().fetch_latest_open(&window).await?;
            for row in &rows {
                println!(
                    "{:<12} {:<16} {:<20} {}",
                    row.user_id, row.team, row.created_at, row.reason
                );
            }
            println!("\n{} open complaint(s) in {}", rows.len(), window);
            Ok(())
        }
        Commands::Network {
            source,
            listing,
            pon,
            search,
        } => {
            let _guard = init_logging(None)?;
            let outcome = source.client().fetch_live_windows(&source.window_list()).await;
            report_failures(&outcome.failures);

            let rows = narrow(listing.select(&outcome.rows), pon.as_deref(), search.as_deref());
            for row in &rows {
                let power = row.power.map(|p| format!("{:.2}", p)).unwrap_or_default();
                println!(
                    "{:<10} {:<12} {:<20} {:<8} {:>7} {:<8} {}",
                    row.window, row.user_id, row.name, row.user_status, power, row.pon, row.location
                );
            }
            println!("\n{} line(s)", rows.len());
            Ok(())
        }
        Commands::Mark {
            source,
            action,
            from_live,
        } => {
            let _guard = init_logging(None)?;
            let client = source.client();
            let mut action: ComplaintAction = action.into();
            if from_live {
                let rows = client.fetch_live_rows(&action.window).await?;
                match rows.iter().find(|r| r.user_id.eq_ignore_ascii_case(action.user_id.trim())) {
                    Some(row) => action.fill_from_live(row),
                    None => warn!(user_id = %action.user_id, window = %action.window, "User has no live line"),
                }
            }
            let message = client.mark_complaint(&action).await?;
            println!("{}", message);
            Ok(())
        }
        Commands::Remove {
            source,
            action,
            complaint_id,
        } => {
            let _guard = init_logging(None)?;
            let message = source
                .client()
                .remove_complaint(&action.into(), complaint_id.as_deref())
                .await?;
            println!("{}", message);
            Ok(())
        }
    }
}
