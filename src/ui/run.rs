use crate::config::{db_path, AppConfig};
use crate::controller::{
    ControllerOptions, RenderDecision, SubscriptionProvider, UsageRequest, UsageViewController,
};
use crate::error::{AppError, FetchFailure};
use crate::models::{
    AggregateMetric, DailyUsage, Notification, NotificationCategory, SubscriptionSnapshot,
};
use crate::presets::Preset;
use crate::service::PlatformClient;
use crate::storage::Storage;
use crate::ui::app::{AppState, Screen, Toast};
use crate::window::{PickerSelection, WindowSource};
use chrono::{NaiveDate, Utc};
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use crossterm::ExecutableCommand;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Gauge, Paragraph, Row, Table, Wrap};
use ratatui::Terminal;
use std::io;
use std::sync::Arc;
use std::time::{Duration as StdDuration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

const COLOR_ACCENT: Color = Color::Cyan;
const COLOR_INFO: Color = Color::Green;
const COLOR_MUTED: Color = Color::DarkGray;
const COLOR_HEADER: Color = Color::White;
const COLOR_ERROR: Color = Color::Red;

const POLL_INTERVAL: StdDuration = StdDuration::from_millis(250);
const MIN_REFRESH_SECONDS: u64 = 5;

type Controller = UsageViewController<Arc<PlatformClient>, mpsc::UnboundedSender<Notification>>;

struct SubscriptionJob {
    request_id: u64,
    handle: JoinHandle<Result<SubscriptionSnapshot, FetchFailure>>,
}

struct UsageJob {
    request: UsageRequest,
    handle: JoinHandle<Result<Vec<DailyUsage>, AppError>>,
}

#[derive(Default)]
struct Jobs {
    subscription: Option<SubscriptionJob>,
    usage: Option<UsageJob>,
    aggregate: Option<JoinHandle<Result<Vec<AggregateMetric>, AppError>>>,
}

impl Jobs {
    fn abort_all(&mut self) {
        if let Some(job) = self.subscription.take() {
            job.handle.abort();
        }
        if let Some(job) = self.usage.take() {
            job.handle.abort();
        }
        if let Some(handle) = self.aggregate.take() {
            handle.abort();
        }
    }
}

pub async fn run_tui(cfg: &AppConfig, project_ref: String) -> Result<(), AppError> {
    let client = Arc::new(PlatformClient::from_config(cfg)?);
    let db = db_path()?;
    let mut storage = Storage::open(&db)?;
    let (notify_tx, mut notify_rx) = mpsc::unbounded_channel();
    let options = ControllerOptions {
        payg_tier_id: cfg.payg_tier_id.clone(),
        ..ControllerOptions::default()
    };
    let mut ctl = UsageViewController::new(project_ref, client, notify_tx, cfg, options);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    stdout.execute(EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let refresh_every = StdDuration::from_secs(cfg.refresh_seconds.max(MIN_REFRESH_SECONDS));
    let loop_result = run_loop(
        &mut terminal,
        &mut ctl,
        &mut notify_rx,
        &mut storage,
        refresh_every,
    )
    .await;

    disable_raw_mode()?;
    terminal.backend_mut().execute(LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    loop_result
}

async fn run_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ctl: &mut Controller,
    notify_rx: &mut mpsc::UnboundedReceiver<Notification>,
    storage: &mut Storage,
    refresh_every: StdDuration,
) -> Result<(), AppError> {
    let mut state = AppState::new(ctl.project_ref().to_string(), ctl.flag_enabled());
    let mut jobs = Jobs::default();
    let mut decisions = ctl.subscribe();

    queue_subscription_fetch(&mut state, ctl, &mut jobs);
    let mut last_tick = Instant::now();

    while state.running {
        if last_tick.elapsed() >= refresh_every {
            last_tick = Instant::now();
            refresh_usage(&mut state, ctl, storage, &mut jobs);
        }

        if jobs
            .subscription
            .as_ref()
            .is_some_and(|job| job.handle.is_finished())
        {
            process_subscription_job(ctl, &mut jobs).await;
        }
        if jobs
            .usage
            .as_ref()
            .is_some_and(|job| job.handle.is_finished())
        {
            process_usage_job(&mut state, ctl, storage, &mut jobs).await;
        }
        if jobs.aggregate.as_ref().is_some_and(JoinHandle::is_finished) {
            process_aggregate_job(&mut state, &mut jobs).await;
        }

        while let Ok(notification) = notify_rx.try_recv() {
            push_toast(&mut state, notification);
        }

        sync_view(&mut state, ctl, &mut decisions, storage, &mut jobs);

        terminal.draw(|f| render(f, ctl, &state))?;

        if event::poll(POLL_INTERVAL)? {
            if let Event::Key(key) = event::read()? {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                handle_key(key.code, key.modifiers, &mut state, ctl, storage, &mut jobs);
            }
        }
    }

    jobs.abort_all();
    Ok(())
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn queue_subscription_fetch(state: &mut AppState, ctl: &mut Controller, jobs: &mut Jobs) {
    if let Some(previous) = jobs.subscription.take() {
        previous.handle.abort();
    }
    let ticket = ctl.begin_fetch();
    let request_id = ticket.request_id;
    let provider = Arc::clone(ctl.provider());
    let project = ctl.project_ref().to_string();
    let handle = tokio::spawn(async move {
        provider
            .fetch_subscription(&project, &ticket.token)
            .await
    });
    jobs.subscription = Some(SubscriptionJob { request_id, handle });
    state.aggregate_loaded = false;
    state.status = "loading subscription...".into();
}

async fn process_subscription_job(ctl: &mut Controller, jobs: &mut Jobs) {
    let Some(job) = jobs.subscription.take() else {
        return;
    };
    let result = match job.handle.await {
        Ok(result) => result,
        Err(e) => Err(FetchFailure::new(format!("background fetch task failed: {e}"))),
    };
    ctl.complete_fetch(job.request_id, result);
}

fn queue_usage_fetch(
    state: &mut AppState,
    ctl: &Controller,
    storage: &Storage,
    jobs: &mut Jobs,
    request: UsageRequest,
) {
    if let Some(previous) = jobs.usage.take() {
        previous.handle.abort();
    }
    // Show whatever is cached for the window until the fetch lands.
    match storage.rows_between(&request.project_ref, request.start, request.end) {
        Ok(rows) => state.payg_rows = rows,
        Err(e) => tracing::warn!(error = %e, "reading cached usage failed"),
    }
    let client = Arc::clone(ctl.provider());
    let task_request = request.clone();
    let handle = tokio::spawn(async move { client.daily_usage(&task_request).await });
    jobs.usage = Some(UsageJob { request, handle });
    state.status = "loading usage detail...".into();
}

async fn process_usage_job(
    state: &mut AppState,
    ctl: &Controller,
    storage: &mut Storage,
    jobs: &mut Jobs,
) {
    let Some(job) = jobs.usage.take() else {
        return;
    };
    let current = ctl
        .window()
        .is_some_and(|w| w.start() == job.request.start && w.end() == job.request.end);
    match job.handle.await {
        Ok(Ok(rows)) if current => {
            if let Err(e) =
                storage.replace_window(&job.request.project_ref, job.request.start, job.request.end, &rows)
            {
                tracing::warn!(error = %e, "caching usage detail failed");
            }
            state.payg_rows = rows;
            state.last_refresh = Utc::now().format("%H:%M:%S").to_string();
            state.status = "ok".into();
        }
        Ok(Ok(_)) => tracing::debug!("dropping usage detail for a replaced window"),
        Ok(Err(e)) => state.status = format!("usage fetch failed: {e}"),
        Err(e) => state.status = format!("usage fetch task failed: {e}"),
    }
}

async fn process_aggregate_job(state: &mut AppState, jobs: &mut Jobs) {
    let Some(handle) = jobs.aggregate.take() else {
        return;
    };
    match handle.await {
        Ok(Ok(metrics)) => {
            state.aggregate = metrics;
            state.aggregate_loaded = true;
            state.last_refresh = Utc::now().format("%H:%M:%S").to_string();
            state.status = "ok".into();
        }
        Ok(Err(e)) => state.status = format!("usage fetch failed: {e}"),
        Err(e) => state.status = format!("usage fetch task failed: {e}"),
    }
}

fn queue_aggregate_fetch(state: &mut AppState, ctl: &Controller, jobs: &mut Jobs) {
    let client = Arc::clone(ctl.provider());
    let project = ctl.project_ref().to_string();
    jobs.aggregate = Some(tokio::spawn(async move {
        client.aggregate_usage(&project).await
    }));
    state.status = "loading usage...".into();
}

fn refresh_usage(state: &mut AppState, ctl: &Controller, storage: &Storage, jobs: &mut Jobs) {
    match state.decision.clone() {
        RenderDecision::ShowPaygDetail(window) if jobs.usage.is_none() => {
            let request = UsageRequest {
                project_ref: ctl.project_ref().to_string(),
                start: window.start(),
                end: window.end(),
            };
            queue_usage_fetch(state, ctl, storage, jobs, request);
        }
        RenderDecision::ShowLegacyAggregate | RenderDecision::ShowNextGen
            if jobs.aggregate.is_none() =>
        {
            queue_aggregate_fetch(state, ctl, jobs);
        }
        _ => {}
    }
}

fn sync_view(
    state: &mut AppState,
    ctl: &mut Controller,
    decisions: &mut watch::Receiver<RenderDecision>,
    storage: &Storage,
    jobs: &mut Jobs,
) {
    // Picker mount: the first PAYG render resolves the default window.
    match ctl.apply_default_window(today()) {
        Ok(Some(request)) => queue_usage_fetch(state, ctl, storage, jobs, request),
        Ok(None) => {}
        Err(e) => state.status = format!("default window unavailable: {e}"),
    }

    if decisions.has_changed().unwrap_or(false) {
        let decision = decisions.borrow_and_update().clone();
        if matches!(
            decision,
            RenderDecision::ShowLegacyAggregate | RenderDecision::ShowNextGen
        ) && !state.aggregate_loaded
            && jobs.aggregate.is_none()
        {
            queue_aggregate_fetch(state, ctl, jobs);
        }
        if decision == RenderDecision::ShowLoading && !ctl.is_fetching() {
            state.status = "waiting for subscription".into();
        }
        state.decision = decision;
    }
    state.new_ui_enabled = ctl.user_prefers_new_ui();
    state.picker.loading = jobs.usage.is_some() || ctl.is_fetching();
}

fn handle_key(
    code: KeyCode,
    modifiers: KeyModifiers,
    state: &mut AppState,
    ctl: &mut Controller,
    storage: &Storage,
    jobs: &mut Jobs,
) {
    if modifiers.contains(KeyModifiers::CONTROL) && code == KeyCode::Char('c') {
        state.previous_screen = state.screen.clone();
        state.screen = Screen::ConfirmQuit;
        return;
    }

    match state.screen.clone() {
        Screen::Dashboard => match code {
            KeyCode::Char('q') => {
                state.previous_screen = state.screen.clone();
                state.screen = Screen::ConfirmQuit;
            }
            KeyCode::Char('z') => {
                state.compact_mode = !state.compact_mode;
            }
            KeyCode::Char('r') => queue_subscription_fetch(state, ctl, jobs),
            KeyCode::Char('n') if ctl.flag_enabled() => {
                ctl.toggle_new_ui();
                state.status = if ctl.user_prefers_new_ui() {
                    "new interface preview enabled".into()
                } else {
                    "new interface preview disabled".into()
                };
            }
            KeyCode::Left if is_payg(state) => {
                state.picker.selected = state.picker.selected.saturating_sub(1);
            }
            KeyCode::Right if is_payg(state) => {
                if state.picker.selected + 1 < ctl.presets().len() {
                    state.picker.selected += 1;
                }
            }
            KeyCode::Enter if is_payg(state) => apply_selected_preset(state, ctl, storage, jobs),
            KeyCode::Char('c') if is_payg(state) => open_custom_range(state),
            _ => {}
        },
        Screen::CustomRange => match code {
            KeyCode::Esc => state.screen = Screen::Dashboard,
            KeyCode::Enter => {
                state.screen = Screen::Dashboard;
                match parse_custom_range(&state.picker.custom_input) {
                    Ok(selection) => apply_selection(state, ctl, storage, jobs, selection),
                    Err(message) => show_error(state, message),
                }
            }
            KeyCode::Backspace => {
                state.picker.custom_input.pop();
            }
            KeyCode::Char(ch) if ch.is_ascii_digit() || ch == '-' || ch == ' ' => {
                state.picker.custom_input.push(ch);
            }
            _ => {}
        },
        Screen::ConfirmQuit => match code {
            KeyCode::Char('y') | KeyCode::Enter => {
                ctl.teardown();
                jobs.abort_all();
                state.running = false;
            }
            KeyCode::Char('n') | KeyCode::Esc => state.screen = state.previous_screen.clone(),
            _ => {}
        },
        Screen::ErrorDialog => {
            if matches!(code, KeyCode::Enter | KeyCode::Esc) {
                state.screen = Screen::Dashboard;
            }
        }
    }
}

fn is_payg(state: &AppState) -> bool {
    matches!(state.decision, RenderDecision::ShowPaygDetail(_))
}

fn open_custom_range(state: &mut AppState) {
    state.picker.custom_input.clear();
    state.previous_screen = state.screen.clone();
    state.screen = Screen::CustomRange;
}

fn apply_selected_preset(
    state: &mut AppState,
    ctl: &mut Controller,
    storage: &Storage,
    jobs: &mut Jobs,
) {
    let Some(preset) = ctl.presets().get(state.picker.selected).cloned() else {
        return;
    };
    if preset.is_custom() {
        open_custom_range(state);
        return;
    }
    let Some(anchor) = ctl
        .subscription()
        .snapshot()
        .map(SubscriptionSnapshot::billing_period_start)
    else {
        state.status = "subscription not loaded yet".into();
        return;
    };
    match PickerSelection::from_preset(&preset, anchor, today()) {
        Ok(selection) => apply_selection(state, ctl, storage, jobs, selection),
        Err(e) => show_error(state, e.to_string()),
    }
}

fn apply_selection(
    state: &mut AppState,
    ctl: &mut Controller,
    storage: &Storage,
    jobs: &mut Jobs,
    selection: PickerSelection,
) {
    let result = ctl.select_window(&selection, today());
    if result.is_ok() {
        if let Some(idx) = picker_index(ctl.presets(), &selection) {
            state.picker.selected = idx;
        }
    }
    match result {
        Ok(Some(request)) => queue_usage_fetch(state, ctl, storage, jobs, request),
        Ok(None) => state.status = "window unchanged".into(),
        Err(e) => show_error(state, e.to_string()),
    }
}

fn picker_index(presets: &[Preset], selection: &PickerSelection) -> Option<usize> {
    match selection.preset_key.as_deref() {
        Some(key) => presets.iter().position(|p| p.key == key),
        None => presets.iter().position(Preset::is_custom),
    }
}

// Ordering is checked by the controller.
fn parse_custom_range(input: &str) -> Result<PickerSelection, String> {
    let parts: Vec<&str> = input.split_whitespace().collect();
    let [start, end] = parts.as_slice() else {
        return Err("Enter a start and end date as YYYY-MM-DD YYYY-MM-DD.".to_string());
    };
    let parse = |raw: &str| {
        NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| format!("'{raw}' is not a valid date"))
    };
    Ok(PickerSelection::custom(parse(start)?, parse(end)?))
}

fn push_toast(state: &mut AppState, notification: Notification) {
    let ts = chrono::Local::now().format("%H:%M:%S").to_string();
    state.toasts.push(Toast { ts, notification });
    if state.toasts.len() > state.max_toasts {
        let trim = state.toasts.len() - state.max_toasts;
        state.toasts.drain(0..trim);
    }
}

fn toast_text(toast: &Toast) -> String {
    match toast.notification.category {
        NotificationCategory::Error => format!(
            "{} Failed to get project subscription: {}",
            toast.ts, toast.notification.message
        ),
    }
}

fn show_error(state: &mut AppState, message: String) {
    state.error_message = message;
    state.previous_screen = state.screen.clone();
    state.screen = Screen::ErrorDialog;
}

fn decision_label(decision: &RenderDecision) -> &'static str {
    match decision {
        RenderDecision::ShowLoading => "loading",
        RenderDecision::ShowLegacyAggregate => "usage",
        RenderDecision::ShowPaygDetail(_) => "pay as you go",
        RenderDecision::ShowNextGen => "usage (preview)",
    }
}

fn render(f: &mut ratatui::Frame, ctl: &Controller, state: &AppState) {
    let size = f.area();
    let compact = state.compact_mode || size.width < 100;
    let toast_height = if state.toasts.is_empty() {
        0
    } else {
        state.toasts.len() as u16 + 2
    };

    let root = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(6),
            Constraint::Length(toast_height),
            Constraint::Length(2),
        ])
        .split(size);

    let header = Paragraph::new(format!(
        " billing-usage  ·  {}  ·  {}  ·  {}  ·  {} ",
        state.project_ref,
        decision_label(&state.decision),
        state.status,
        state.last_refresh
    ))
    .block(Block::default().borders(Borders::ALL).title(" Billing and Usage "))
    .style(Style::default().fg(COLOR_HEADER));
    f.render_widget(header, root[0]);

    render_toolbar(f, root[1], ctl, state, compact);

    match &state.decision {
        RenderDecision::ShowLoading => render_loading(f, root[2]),
        RenderDecision::ShowLegacyAggregate => render_legacy_bars(f, root[2], state),
        RenderDecision::ShowPaygDetail(_) => render_payg_detail(f, root[2], state),
        RenderDecision::ShowNextGen => render_next_gen(f, root[2], state),
    }

    if toast_height > 0 {
        let lines = state
            .toasts
            .iter()
            .map(|t| Line::from(Span::styled(toast_text(t), Style::default().fg(COLOR_ERROR))))
            .collect::<Vec<_>>();
        let toasts = Paragraph::new(lines)
            .block(Block::default().borders(Borders::ALL).title(" Notifications "));
        f.render_widget(toasts, root[3]);
    }

    let footer = Paragraph::new(footer_text(state))
        .block(Block::default().borders(Borders::TOP))
        .style(Style::default().fg(COLOR_MUTED));
    f.render_widget(footer, root[4]);

    match &state.screen {
        Screen::Dashboard => {}
        Screen::CustomRange => render_custom_range(f, state),
        Screen::ConfirmQuit => render_confirm(f),
        Screen::ErrorDialog => render_error(f, state),
    }
}

fn render_toolbar(f: &mut ratatui::Frame, area: Rect, ctl: &Controller, state: &AppState, compact: bool) {
    let mut spans = Vec::new();

    if let RenderDecision::ShowPaygDetail(window) = &state.decision {
        for (idx, preset) in ctl.presets().iter().enumerate() {
            let style = if idx == state.picker.selected {
                Style::default()
                    .fg(Color::Black)
                    .bg(COLOR_ACCENT)
                    .add_modifier(Modifier::BOLD)
            } else {
                Style::default().fg(COLOR_HEADER)
            };
            let text = if compact { &preset.key } else { &preset.label };
            spans.push(Span::styled(format!(" {text} "), style));
            spans.push(Span::raw(" "));
        }
        let marker = match window.source() {
            WindowSource::Default => " (default)",
            WindowSource::UserSelected => "",
        };
        spans.push(Span::styled(
            format!("  {}{marker}", window.label()),
            Style::default().fg(COLOR_INFO),
        ));
        if state.picker.loading {
            spans.push(Span::styled("  (loading)", Style::default().fg(COLOR_MUTED)));
        }
    }

    if ctl.flag_enabled() {
        spans.push(Span::styled(
            format!(
                "  [n] Preview new interface: {}",
                if state.new_ui_enabled { "on" } else { "off" }
            ),
            Style::default().fg(COLOR_MUTED),
        ));
    }

    let bar = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(bar, area);
}

fn render_loading(f: &mut ratatui::Frame, area: Rect) {
    let body = Paragraph::new("Loading usage breakdown")
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL))
        .style(Style::default().fg(COLOR_MUTED));
    f.render_widget(body, area);
}

fn render_empty(f: &mut ratatui::Frame, area: Rect, title: &str, state: &AppState) {
    let text = if state.aggregate_loaded {
        "No usage recorded"
    } else {
        "Loading..."
    };
    let body = Paragraph::new(text)
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::ALL).title(title.to_string()))
        .style(Style::default().fg(COLOR_MUTED));
    f.render_widget(body, area);
}

fn render_legacy_bars(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    if state.aggregate.is_empty() {
        render_empty(f, area, " Usage ", state);
        return;
    }
    let block = Block::default().borders(Borders::ALL).title(" Usage ");
    let inner = block.inner(area);
    f.render_widget(block, area);

    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            state
                .aggregate
                .iter()
                .map(|_| Constraint::Length(3))
                .chain(std::iter::once(Constraint::Min(0)))
                .collect::<Vec<_>>(),
        )
        .split(inner);

    for (metric, slot) in state.aggregate.iter().zip(rows.iter()) {
        let label = match metric.limit {
            Some(limit) => format!("{:.2} / {:.2}", metric.usage, limit),
            None => format!("{:.2}", metric.usage),
        };
        let gauge = Gauge::default()
            .block(Block::default().title(metric.metric.clone()))
            .gauge_style(Style::default().fg(COLOR_ACCENT))
            .ratio(metric.ratio())
            .label(label);
        f.render_widget(gauge, *slot);
    }
}

fn render_payg_detail(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    if state.payg_rows.is_empty() {
        let text = if state.picker.loading {
            "Loading usage detail..."
        } else {
            "No usage recorded in this period"
        };
        let body = Paragraph::new(text)
            .alignment(Alignment::Center)
            .block(Block::default().borders(Borders::ALL).title(" Usage Detail "))
            .style(Style::default().fg(COLOR_MUTED));
        f.render_widget(body, area);
        return;
    }

    let rows = state
        .payg_rows
        .iter()
        .map(|r| {
            Row::new(vec![
                Cell::from(r.date.format("%b %-d, %Y").to_string()),
                Cell::from(r.metric.clone()),
                Cell::from(format!("{:.2}", r.usage)),
                Cell::from(format!("${:.4}", r.cost)),
            ])
        })
        .collect::<Vec<_>>();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(25),
            Constraint::Percentage(35),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ],
    )
    .header(
        Row::new(vec!["Date", "Metric", "Usage", "Cost"]).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(Block::default().borders(Borders::ALL).title(" Usage Detail "));
    f.render_widget(table, area);
}

fn render_next_gen(f: &mut ratatui::Frame, area: Rect, state: &AppState) {
    if state.aggregate.is_empty() {
        render_empty(f, area, " Usage (preview) ", state);
        return;
    }
    let rows = state
        .aggregate
        .iter()
        .map(|m| {
            Row::new(vec![
                Cell::from(m.metric.clone()),
                Cell::from(format!("{:.2}", m.usage)),
                Cell::from(
                    m.limit
                        .map(|l| format!("{l:.2}"))
                        .unwrap_or_else(|| "-".into()),
                ),
                Cell::from(format!("{:.0}%", m.ratio() * 100.0)),
            ])
        })
        .collect::<Vec<_>>();
    let table = Table::new(
        rows,
        [
            Constraint::Percentage(40),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
            Constraint::Percentage(20),
        ],
    )
    .header(
        Row::new(vec!["Metric", "Usage", "Included", "Used"]).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        ),
    )
    .block(Block::default().borders(Borders::ALL).title(" Usage (preview) "));
    f.render_widget(table, area);
}

fn footer_text(state: &AppState) -> &'static str {
    match state.screen {
        Screen::Dashboard => match (is_payg(state), state.flag_enabled) {
            (true, true) => "Left/Right preset | Enter apply | c custom | n preview | r refetch | z compact | q quit",
            (true, false) => "Left/Right preset | Enter apply | c custom | r refetch | z compact | q quit",
            (false, true) => "n preview | r refetch | z compact | q quit",
            (false, false) => "r refetch | z compact | q quit",
        },
        Screen::CustomRange => "Type YYYY-MM-DD YYYY-MM-DD | Enter apply | Esc cancel",
        Screen::ConfirmQuit => "y/Enter quit | n/Esc cancel",
        Screen::ErrorDialog => "Enter/Esc close",
    }
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn render_custom_range(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(60, 25, f.area());
    f.render_widget(Clear, area);
    let content = Paragraph::new(vec![
        Line::from("Start and end date (YYYY-MM-DD YYYY-MM-DD):"),
        Line::from(""),
        Line::from(Span::styled(
            format!("> {}_", state.picker.custom_input),
            Style::default()
                .fg(COLOR_ACCENT)
                .add_modifier(Modifier::BOLD),
        )),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Custom Range "))
    .wrap(Wrap { trim: true });
    f.render_widget(content, area);
}

fn render_confirm(f: &mut ratatui::Frame) {
    let area = centered_rect(40, 20, f.area());
    f.render_widget(Clear, area);
    let content = Paragraph::new(vec![
        Line::from("Quit billing-usage?"),
        Line::from(""),
        Line::from("y / Enter to quit, n / Esc to stay"),
    ])
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::ALL).title(" Confirm "));
    f.render_widget(content, area);
}

fn render_error(f: &mut ratatui::Frame, state: &AppState) {
    let area = centered_rect(60, 30, f.area());
    f.render_widget(Clear, area);
    let content = Paragraph::new(vec![
        Line::from(state.error_message.clone()),
        Line::from(""),
        Line::from("Press Enter or Esc"),
    ])
    .block(Block::default().borders(Borders::ALL).title(" Error "))
    .style(Style::default().fg(COLOR_ERROR))
    .wrap(Wrap { trim: true });
    f.render_widget(content, area);
}
