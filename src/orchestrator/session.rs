//! Observable state of one acquisition controller.

use crate::engine::Command;
use crate::error::SessionError;
use crate::model::{Acquisition, Series};
use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub enum SessionPhase {
    #[default]
    Idle,
    Running,
    Succeeded,
    Failed,
}

impl SessionPhase {
    pub fn is_finished(self) -> bool {
        matches!(self, SessionPhase::Succeeded | SessionPhase::Failed)
    }
}

/// Snapshot published to the presentation layer.
///
/// Only the owning controller mutates it; readers get clones through a
/// `watch` receiver.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub phase: SessionPhase,
    pub progress_percent: f64,
    pub status_message: String,
    pub command: Option<&'static str>,
    pub last_result: Option<Acquisition>,
    pub last_error: Option<SessionError>,
    pub finished_at: Option<String>,
    #[serde(skip)]
    superseded: Option<Acquisition>,
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        self.phase == SessionPhase::Running
    }

    /// Plot projection of the current result; empty when there is none.
    pub fn series(&self) -> Vec<Series> {
        self.last_result
            .as_ref()
            .map(Acquisition::to_series)
            .unwrap_or_default()
    }

    pub(crate) fn begin(&mut self, command: &Command) {
        self.phase = SessionPhase::Running;
        self.progress_percent = 0.0;
        self.status_message = command.pending_message().to_string();
        self.command = Some(command.name());
        self.last_error = None;
        self.finished_at = None;
        if command.is_acquisition() {
            // An abandoned run may have stashed a result already.
            let previous = self.last_result.take().or_else(|| self.superseded.take());
            self.superseded = previous;
        }
    }

    /// Ticks only move the bar forward, and only while running.
    pub(crate) fn advance(&mut self, percent: f64) {
        if self.is_running() {
            self.progress_percent = percent.clamp(self.progress_percent, 100.0);
        }
    }

    pub(crate) fn succeed(&mut self, result: Option<Acquisition>, message: String) {
        match result {
            Some(acquisition) => {
                self.last_result = Some(acquisition);
                self.superseded = None;
            }
            None => self.restore_previous(),
        }
        self.last_error = None;
        self.status_message = message;
        self.complete(SessionPhase::Succeeded);
    }

    pub(crate) fn fail(&mut self, error: SessionError) {
        self.restore_previous();
        self.status_message = error.to_string();
        self.last_error = Some(error);
        self.complete(SessionPhase::Failed);
    }

    fn restore_previous(&mut self) {
        if let Some(previous) = self.superseded.take() {
            self.last_result = Some(previous);
        }
    }

    fn complete(&mut self, phase: SessionPhase) {
        self.phase = phase;
        self.progress_percent = 100.0;
        self.finished_at = OffsetDateTime::now_utc().format(&Rfc3339).ok();
    }
}
