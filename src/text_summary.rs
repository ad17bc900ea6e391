//! Text summary builder for CLI output.
//!
//! This module computes statistics and formats human-readable lines for text mode.

use crate::metrics;
use crate::model::{Operation, SampleMode, SessionConfig, DEFAULT_DISPENSE_CUTOFF};
use crate::orchestrator::SessionState;

/// Pre-formatted lines for text output.
pub(crate) struct TextSummary {
    pub lines: Vec<String>,
}

/// Build a text summary from the final session state.
pub(crate) fn build_text_summary(cfg: &SessionConfig, state: &SessionState) -> TextSummary {
    let mut lines = Vec::new();

    lines.push(format!("Request: {}", describe_request(cfg)));
    lines.push(format!("Status: {:?} - {}", state.phase, state.status_message));
    if let Some(at) = state.finished_at.as_deref() {
        lines.push(format!("Finished: {at}"));
    }

    for stats in metrics::compute_statistics(&state.series()) {
        lines.push(format!(
            "{:<12} median {:>14}  range {:>14}",
            stats.label,
            stats.median_text(),
            stats.range_text()
        ));
    }

    TextSummary { lines }
}

fn describe_request(cfg: &SessionConfig) -> String {
    let period = humantime::format_duration(cfg.sample_period);
    match cfg.operation {
        Operation::Sample | Operation::Channels => {
            let mut request = format!("{:?} x{} every {period}", cfg.mode, cfg.sample_count);
            if let (SampleMode::Filtered, Some(fc)) = (cfg.mode, cfg.cutoff_frequency) {
                request.push_str(&format!(" (cutoff {fc} Hz)"));
            }
            request
        }
        Operation::Dispense => format!(
            "dispense {} every {period} (cutoff {} Hz, timeout {})",
            cfg.target_weight,
            cfg.cutoff_frequency.unwrap_or(DEFAULT_DISPENSE_CUTOFF),
            humantime::format_duration(cfg.dispense_timeout)
        ),
        Operation::AddTrial => format!(
            "calibration trial at {} x{} every {period}",
            cfg.calibration_weight, cfg.sample_count
        ),
        Operation::Calibrate => "calibrate from recorded trials".to_string(),
        Operation::Coefficients => "load stored coefficients".to_string(),
    }
}
