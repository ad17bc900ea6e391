use super::charts::PlotRenderer;
use crate::engine::Command;
use crate::model::{Operation, RequestError, SampleMode, SessionConfig};
use crate::orchestrator::{InfoEvent, SessionState};

const CUTOFF_STEP_HZ: f64 = 0.5;
const WEIGHT_STEP: f64 = 10.0;

/// Everything the UI thread draws from. Owned by that thread only.
pub struct UiState {
    pub tab: usize,
    pub info: String,
    pub config: SessionConfig,
    pub session: SessionState,
    pub renderer: PlotRenderer,
}

impl UiState {
    pub fn new(config: SessionConfig) -> Self {
        let mut renderer = PlotRenderer::new();
        renderer.set_series(&[]);
        Self {
            tab: 0,
            info: String::new(),
            config,
            session: SessionState::default(),
            renderer,
        }
    }

    /// Take a new session snapshot; the chart is only touched when the result changed.
    pub fn apply_session(&mut self, session: SessionState) {
        if session.last_result != self.session.last_result {
            self.renderer.set_series(&session.series());
        }
        self.session = session;
    }

    pub fn apply_info(&mut self, info: InfoEvent) {
        self.info = info.to_message();
    }

    /// Command bound to `key`, built fresh from the current form values.
    pub fn command_for_key(&self, key: char) -> Option<Result<Command, RequestError>> {
        let cfg = &self.config;
        let command = match key {
            's' => return Some(Command::from_config(Operation::Sample, cfg)),
            'l' => return Some(Command::from_config(Operation::Channels, cfg)),
            'd' => return Some(Command::from_config(Operation::Dispense, cfg)),
            'e' => Command::EnableMotor,
            'x' => Command::DisableMotor,
            'm' => Command::MoveMotor {
                steps: cfg.motor_steps,
            },
            'i' => Command::SetSampleInterval(cfg.sample_period.into()),
            'c' => Command::ConnectScale,
            'r' => Command::DropScale,
            'a' => return Some(Command::from_config(Operation::AddTrial, cfg)),
            'k' => Command::Calibrate,
            'g' => Command::GetCoefficients,
            'p' => Command::CheckAppData,
            _ => return None,
        };
        Some(Ok(command))
    }

    /// Apply a form-editing key; returns the info line describing the change.
    pub fn edit_form(&mut self, key: char) -> Option<String> {
        let cfg = &mut self.config;
        let info = match key {
            't' => {
                let mode = cfg.next_mode();
                if mode == SampleMode::Raw && cfg.cutoff_frequency.is_none() {
                    "Trial mode: Raw (set a cutoff with ] to enable Filtered)".to_string()
                } else {
                    format!("Trial mode: {mode:?}")
                }
            }
            ']' => format!("Cutoff: {} Hz", cfg.adjust_cutoff(CUTOFF_STEP_HZ)),
            '[' => format!("Cutoff: {} Hz", cfg.adjust_cutoff(-CUTOFF_STEP_HZ)),
            '+' | '=' => format!(
                "Calibration weight: {}",
                cfg.adjust_calibration_weight(WEIGHT_STEP)
            ),
            '-' => format!(
                "Calibration weight: {}",
                cfg.adjust_calibration_weight(-WEIGHT_STEP)
            ),
            _ => return None,
        };
        self.info = info.clone();
        Some(info)
    }
}
