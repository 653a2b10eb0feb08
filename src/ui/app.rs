use crate::controller::RenderDecision;
use crate::models::{AggregateMetric, DailyUsage, Notification};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Screen {
    Dashboard,
    CustomRange,
    ConfirmQuit,
    ErrorDialog,
}

#[derive(Debug, Clone, Default)]
pub struct PickerState {
    pub selected: usize,
    pub custom_input: String,
    pub loading: bool,
}

#[derive(Debug, Clone)]
pub struct Toast {
    pub ts: String,
    pub notification: Notification,
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub running: bool,
    pub project_ref: String,
    pub status: String,
    pub compact_mode: bool,
    pub decision: RenderDecision,
    pub flag_enabled: bool,
    pub new_ui_enabled: bool,
    pub picker: PickerState,
    pub aggregate: Vec<AggregateMetric>,
    pub aggregate_loaded: bool,
    pub payg_rows: Vec<DailyUsage>,
    pub toasts: Vec<Toast>,
    pub max_toasts: usize,
    pub screen: Screen,
    pub previous_screen: Screen,
    pub error_message: String,
    pub last_refresh: String,
}

impl AppState {
    pub fn new(project_ref: String, flag_enabled: bool) -> Self {
        Self {
            project_ref,
            flag_enabled,
            new_ui_enabled: flag_enabled,
            ..Self::default()
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            running: true,
            project_ref: String::new(),
            status: "loading".into(),
            compact_mode: false,
            decision: RenderDecision::ShowLoading,
            flag_enabled: false,
            new_ui_enabled: false,
            picker: PickerState::default(),
            aggregate: vec![],
            aggregate_loaded: false,
            payg_rows: vec![],
            toasts: vec![],
            max_toasts: 5,
            screen: Screen::Dashboard,
            previous_screen: Screen::Dashboard,
            error_message: String::new(),
            last_refresh: "never".into(),
        }
    }
}
