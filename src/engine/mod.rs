//! Boundary to the instrument command service.
//!
//! Everything the controller knows about the outside world goes through
//! [`CommandInvoker::invoke`]: a command name, a JSON argument record, and a
//! JSON payload or an arbitrary JSON rejection back.

mod http;
mod simulated;

pub use http::HttpInvoker;
pub use simulated::SimulatedInstrument;

use crate::model::{
    DispenseRequest, Operation, RequestError, SampleRequest, SessionConfig, WireDuration,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;

/// Step count for sampling-class progress animations.
pub const SAMPLE_PROGRESS_STEPS: u32 = 500;
/// Step count for dispense progress animations.
pub const DISPENSE_PROGRESS_STEPS: u32 = 200;

/// A rejected call. The payload shape is whatever the service chose to send.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandRejection(pub Value);

impl CommandRejection {
    pub fn message(msg: impl Into<String>) -> Self {
        CommandRejection(Value::String(msg.into()))
    }
}

impl fmt::Display for CommandRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&stringify_payload(&self.0))
    }
}

impl std::error::Error for CommandRejection {}

/// Render an error payload of unknown shape for display.
pub fn stringify_payload(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "unknown error".to_string(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(msg) => msg.to_string(),
            None => value.to_string(),
        },
        other => other.to_string(),
    }
}

#[async_trait]
pub trait CommandInvoker: Send + Sync {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, CommandRejection>;
}

#[async_trait]
impl<T: CommandInvoker + ?Sized> CommandInvoker for Arc<T> {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, CommandRejection> {
        (**self).invoke(command, args).await
    }
}

/// The structure a command's resolved payload must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// One `{readings, timestamps}` record.
    Single,
    /// An array of `{readings, timestamps}` records, one per channel.
    Channels,
    /// Optional human-readable text.
    Status,
    /// Nothing of interest.
    Unit,
}

/// Every operation the service knows about, with its argument record.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Sample(SampleRequest),
    SampleChannels(SampleRequest),
    Dispense {
        sample: SampleRequest,
        dispense: DispenseRequest,
    },
    EnableMotor,
    DisableMotor,
    MoveMotor {
        steps: i64,
    },
    SetSampleInterval(WireDuration),
    ConnectScale,
    DropScale,
    /// Record load-cell medians under a known reference weight.
    AddTrial {
        samples: u32,
        weight: f64,
        sample_period: WireDuration,
    },
    Calibrate,
    GetCoefficients,
    CheckAppData,
}

impl Command {
    /// Command for `operation`, built from the current form values.
    pub fn from_config(operation: Operation, cfg: &SessionConfig) -> Result<Self, RequestError> {
        Ok(match operation {
            Operation::Sample => Command::Sample(cfg.sample_request()?),
            Operation::Channels => Command::SampleChannels(cfg.sample_request()?),
            Operation::Dispense => Command::Dispense {
                sample: cfg.sample_request()?,
                dispense: cfg.dispense_request()?,
            },
            Operation::AddTrial => Command::add_trial(
                cfg.sample_count,
                cfg.calibration_weight,
                cfg.sample_period.into(),
            )?,
            Operation::Calibrate => Command::Calibrate,
            Operation::Coefficients => Command::GetCoefficients,
        })
    }

    pub fn add_trial(
        samples: u32,
        weight: f64,
        sample_period: WireDuration,
    ) -> Result<Self, RequestError> {
        let cmd = Command::AddTrial {
            samples,
            weight,
            sample_period,
        };
        cmd.validate()?;
        Ok(cmd)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Command::Sample(_) => "plot",
            Command::SampleChannels(_) => "plot_lc",
            Command::Dispense { .. } => "dispense",
            Command::EnableMotor => "enable_motor",
            Command::DisableMotor => "disable_motor",
            Command::MoveMotor { .. } => "move_motor",
            Command::SetSampleInterval(_) => "set_phidget_interval",
            Command::ConnectScale => "connect_scale",
            Command::DropScale => "drop_scale",
            Command::AddTrial { .. } => "add_trial",
            Command::Calibrate => "calibrate",
            Command::GetCoefficients => "get_coefficients",
            Command::CheckAppData => "check_app_data",
        }
    }

    pub fn args(&self) -> Value {
        match self {
            Command::Sample(req) | Command::SampleChannels(req) => json!({ "dataRequest": req }),
            Command::Dispense { sample, dispense } => json!({
                "dataRequest": sample,
                "dispenseSettings": dispense,
            }),
            Command::MoveMotor { steps } => json!({ "steps": steps }),
            Command::SetSampleInterval(period) => json!({ "samplePeriod": period }),
            Command::AddTrial {
                samples,
                weight,
                sample_period,
            } => json!({
                "samples": samples,
                "weight": weight,
                "samplePeriod": sample_period,
            }),
            Command::EnableMotor
            | Command::DisableMotor
            | Command::ConnectScale
            | Command::DropScale
            | Command::Calibrate
            | Command::GetCoefficients
            | Command::CheckAppData => json!({}),
        }
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        match self {
            Command::Sample(req) | Command::SampleChannels(req) => req.validate(),
            Command::Dispense { sample, dispense } => {
                sample.validate()?;
                dispense.validate()
            }
            Command::AddTrial {
                samples, weight, ..
            } => {
                if *samples == 0 {
                    Err(RequestError::ZeroSamples)
                } else if !weight.is_finite() {
                    Err(RequestError::InvalidWeight(*weight))
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    pub fn expected_shape(&self) -> ResultShape {
        match self {
            Command::Sample(_) | Command::Dispense { .. } => ResultShape::Single,
            Command::SampleChannels(_) => ResultShape::Channels,
            Command::ConnectScale
            | Command::AddTrial { .. }
            | Command::Calibrate
            | Command::GetCoefficients
            | Command::CheckAppData => ResultShape::Status,
            _ => ResultShape::Unit,
        }
    }

    /// Whether this command returns sampled data and gets a progress animation.
    pub fn is_acquisition(&self) -> bool {
        matches!(
            self.expected_shape(),
            ResultShape::Single | ResultShape::Channels
        )
    }

    /// Whether the instrument should settle before this command is issued.
    pub fn settles(&self) -> bool {
        matches!(self, Command::Sample(_) | Command::SampleChannels(_))
    }

    pub fn progress_steps(&self) -> u32 {
        match self {
            Command::Dispense { .. } => DISPENSE_PROGRESS_STEPS,
            _ => SAMPLE_PROGRESS_STEPS,
        }
    }

    /// Nominal duration used to pace the progress animation.
    pub fn estimated_millis(&self) -> u64 {
        let d = match self {
            Command::Sample(req) | Command::SampleChannels(req) => req.estimated_duration(),
            Command::Dispense { dispense, .. } => dispense.estimated_duration(),
            _ => return 0,
        };
        u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
    }

    pub fn pending_message(&self) -> &'static str {
        match self {
            Command::Sample(_) | Command::SampleChannels(_) => "Conducting trial...",
            Command::Dispense { .. } => "Dispensing...",
            Command::EnableMotor => "Enabling motor...",
            Command::DisableMotor => "Disabling motor...",
            Command::MoveMotor { .. } => "Moving Motor...",
            Command::SetSampleInterval(_) => "Setting sample interval...",
            Command::ConnectScale => "Connecting scale...",
            Command::DropScale => "Dropping scale...",
            Command::AddTrial { .. } => "Collecting data...",
            Command::Calibrate => "Calibrating...",
            Command::GetCoefficients => "Getting coefficients...",
            Command::CheckAppData => "Checking app data...",
        }
    }

    pub fn success_message(&self) -> &'static str {
        match self {
            Command::Sample(_) | Command::SampleChannels(_) => "Data logged!",
            Command::Dispense { .. } => "Dispense complete!",
            Command::EnableMotor => "Motor enabled!",
            Command::DisableMotor => "Motor disabled!",
            Command::MoveMotor { .. } => "Motor Command Sent",
            Command::SetSampleInterval(_) => "Sample interval set!",
            Command::ConnectScale => "Scale Connected!",
            Command::DropScale => "Scale dropped!",
            Command::AddTrial { .. } => "Trial recorded!",
            Command::Calibrate => "Calibration submitted!",
            Command::GetCoefficients => "Coefficients loaded!",
            Command::CheckAppData => "App data checked!",
        }
    }
}
