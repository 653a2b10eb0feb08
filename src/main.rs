mod config;
mod controller;
mod error;
mod models;
mod presets;
mod resolver;
mod service;
mod storage;
mod ui;
mod window;

use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use config::{
    db_path, delete_token, ensure_initialized, load_config, log_path, set_token, AppConfig,
};
use controller::{
    ControllerOptions, Notifier, RenderDecision, SubscriptionProvider, UsageRequest,
    UsageViewController,
};
use error::{AppError, WindowError};
use models::{Notification, SubscriptionState};
use presets::{default_presets, find_preset, Preset};
use resolver::ViewMode;
use serde::Serialize;
use service::{JsonFileProvider, PlatformClient, UsageService};
use std::path::PathBuf;
use std::sync::Mutex;
use storage::Storage;
use tracing_subscriber::EnvFilter;
use ui::run::run_tui;
use window::PickerSelection;

#[derive(Debug, Parser)]
#[command(name = "billing-usage")]
#[command(about = "Project billing and usage view")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    SetToken {
        #[arg(long)]
        token: String,
    },
    ClearToken,
    Presets,
    Resolve {
        #[arg(long)]
        project: Option<String>,
        /// Stay on the classic view even when the usagev2 experiment is on
        #[arg(long)]
        legacy_ui: bool,
        #[arg(long, conflicts_with_all = ["start", "end"])]
        preset: Option<String>,
        #[arg(long, requires = "end", value_parser = parse_date)]
        start: Option<NaiveDate>,
        #[arg(long, requires = "start", value_parser = parse_date)]
        end: Option<NaiveDate>,
        /// Read the subscription from a saved API payload instead of the network
        #[arg(long)]
        subscription_file: Option<PathBuf>,
        /// Fetch and cache usage detail for the resolved window
        #[arg(long)]
        fetch: bool,
    },
    Tui {
        #[arg(long)]
        project: Option<String>,
    },
    Export {
        #[arg(long)]
        project: Option<String>,
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn parse_date(input: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(input.trim(), "%Y-%m-%d")
        .map_err(|_| format!("'{input}' is not a date. Use YYYY-MM-DD."))
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn init_logging(level: &str, log_file: Option<PathBuf>) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    // The TUI owns the terminal, so its logs go to a file.
    let result = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::stderr).try_init(),
    };
    if let Err(e) = result {
        eprintln!("logging already initialized: {e}");
    }
    Ok(())
}

struct StderrNotifier;

impl Notifier for StderrNotifier {
    fn notify(&self, notification: Notification) {
        eprintln!(
            "error: Failed to get project subscription: {}",
            notification.message
        );
    }
}

#[derive(Debug, Serialize)]
struct ResolveReport {
    project_ref: String,
    flag_enabled: bool,
    new_ui: bool,
    mode: Option<ViewMode>,
    #[serde(flatten)]
    decision: RenderDecision,
    usage_request: Option<UsageRequest>,
    rows_cached: Option<usize>,
}

struct ResolveArgs {
    legacy_ui: bool,
    preset: Option<String>,
    range: Option<(NaiveDate, NaiveDate)>,
}

fn explicit_selection(
    args: &ResolveArgs,
    presets: &[Preset],
    anchor: chrono::DateTime<Utc>,
    today: NaiveDate,
) -> Result<Option<PickerSelection>, WindowError> {
    if let Some((start, end)) = args.range {
        return Ok(Some(PickerSelection::custom(start, end)));
    }
    let Some(key) = args.preset.as_deref() else {
        return Ok(None);
    };
    let preset =
        find_preset(presets, key).ok_or_else(|| WindowError::UnknownPreset(key.to_string()))?;
    PickerSelection::from_preset(preset, anchor, today).map(Some)
}

async fn resolve_view<P: SubscriptionProvider>(
    cfg: &AppConfig,
    project_ref: String,
    provider: P,
    args: &ResolveArgs,
) -> Result<ResolveReport, AppError> {
    let options = ControllerOptions {
        payg_tier_id: cfg.payg_tier_id.clone(),
        ..ControllerOptions::default()
    };
    let mut ctl = UsageViewController::new(project_ref, provider, StderrNotifier, cfg, options);
    if args.legacy_ui {
        ctl.set_user_prefers_new_ui(false);
    }

    ctl.refetch().await;
    let anchor = match ctl.subscription() {
        SubscriptionState::Loaded(snap) => snap.billing_period_start(),
        SubscriptionState::Failed(failure) => return Err(failure.clone().into()),
        _ => return Err(AppError::Config("subscription was not loaded".into())),
    };

    let today = Utc::now().date_naive();
    let mut usage_request = None;
    if ctl.mode() == Some(ViewMode::Payg) {
        usage_request = match explicit_selection(args, ctl.presets(), anchor, today)? {
            Some(selection) => ctl.select_window(&selection, today)?,
            None => ctl.apply_default_window(today)?,
        };
    } else if args.preset.is_some() || args.range.is_some() {
        tracing::warn!(mode = ?ctl.mode(), "date range ignored outside the pay-as-you-go view");
    }

    Ok(ResolveReport {
        project_ref: ctl.project_ref().to_string(),
        flag_enabled: ctl.flag_enabled(),
        new_ui: ctl.user_prefers_new_ui(),
        mode: ctl.mode(),
        decision: ctl.decision(),
        usage_request,
        rows_cached: None,
    })
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let log_file = match cli.command {
        Commands::Tui { .. } => {
            ensure_initialized()?;
            Some(log_path()?)
        }
        _ => None,
    };
    init_logging(&cli.log_level, log_file)?;

    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!("Initialized billing-usage config and data directories.");
        }
        Commands::SetToken { token } => {
            ensure_initialized()?;
            set_token(&token)?;
            println!("Access token stored.");
        }
        Commands::ClearToken => {
            delete_token()?;
            println!("Access token removed.");
        }
        Commands::Presets => {
            for preset in default_presets() {
                println!("{}\t{}", preset.key, preset.label);
            }
        }
        Commands::Resolve {
            project,
            legacy_ui,
            preset,
            start,
            end,
            subscription_file,
            fetch,
        } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let project_ref = cfg.project_ref(project.as_deref())?;
            let args = ResolveArgs {
                legacy_ui,
                preset,
                range: start.zip(end),
            };
            let mut report = match subscription_file {
                Some(path) => {
                    resolve_view(&cfg, project_ref, JsonFileProvider::new(path), &args).await?
                }
                None => {
                    resolve_view(&cfg, project_ref, PlatformClient::from_config(&cfg)?, &args)
                        .await?
                }
            };

            if fetch {
                if let Some(request) = &report.usage_request {
                    let client = PlatformClient::from_config(&cfg)?;
                    let mut storage = Storage::open(&db_path()?)?;
                    let rows = UsageService::new(&client)
                        .load_window(request, &mut storage)
                        .await?;
                    report.rows_cached = Some(rows.len());
                }
            }
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Tui { project } => {
            let cfg = load_config()?;
            let project_ref = cfg.project_ref(project.as_deref())?;
            run_tui(&cfg, project_ref).await?;
        }
        Commands::Export { project, format } => {
            ensure_initialized()?;
            let project = project.as_deref().map(config::normalize_project_ref);
            let storage = Storage::open(&db_path()?)?;
            if format.eq_ignore_ascii_case("json") {
                println!("{}", storage.export_json(project.as_deref())?);
            } else if format.eq_ignore_ascii_case("csv") {
                println!("project_ref,date,metric,usage,cost");
                for r in storage.export_rows(project.as_deref())? {
                    println!(
                        "{},{},{},{:.4},{:.8}",
                        csv_field(&r.project_ref),
                        r.usage.date,
                        csv_field(&r.usage.metric),
                        r.usage.usage,
                        r.usage.cost,
                    );
                }
            } else {
                return Err(AppError::Config(
                    "Unsupported export format. Use json or csv".into(),
                ));
            }
        }
    }

    Ok(())
}
