//! Scale, load-cell and dispense diagnostics.
//!
//! An [`orchestrator::AcquisitionController`] issues instrument commands
//! through an [`engine::CommandInvoker`], animates a cosmetic progress bar
//! while they run, and publishes the outcome as
//! [`orchestrator::SessionState`]. [`metrics`] summarizes the returned series
//! and, with the `tui` feature, `tui::charts::PlotRenderer` draws them.

pub mod cli;
pub mod engine;
pub mod error;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod progress;
mod text_summary;
#[cfg(feature = "tui")]
pub mod tui;
