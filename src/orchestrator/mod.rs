//! Application-level orchestration.
//!
//! This module owns the acquisition session lifecycle (issue, animate,
//! reconcile, tear down) and the command loop UI layers talk to. Presentation
//! layers only send commands and observe [`SessionState`].

mod acquisition;
mod controller;
mod session;

pub use acquisition::{validate_payload, AcquisitionController, SETTLING_DELAY};
pub use controller::{run_controller, InfoEvent, UiCommand};
pub use session::{SessionPhase, SessionState};
