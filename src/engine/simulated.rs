use super::{CommandInvoker, CommandRejection};
use crate::metrics;
use crate::model::{
    CalibrationTrial, Coefficients, DispenseRequest, RequestError, SampleMode, SampleRequest,
    SampleResult, WireDuration,
};
use async_trait::async_trait;
use rand::Rng;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const LOAD_CELL_COUNT: usize = 4;
const LOAD_CELL_LEVELS: [f64; LOAD_CELL_COUNT] = [412e-6, 388e-6, 455e-6, 401e-6];
/// Bridge response per gram on the platform, in V/V.
const LOAD_CELL_SENSITIVITY: [f64; LOAD_CELL_COUNT] = [0.51e-6, 0.49e-6, 0.52e-6, 0.48e-6];
const LOAD_CELL_NOISE: f64 = 0.3e-6;
const WEIGHT_NOISE: f64 = 0.4;
const MEDIAN_WINDOW: usize = 5;
/// Grams moved per second at velocity 1.0.
const FLOW_RATE: f64 = 20.0;
const MAX_DISPENSE_POINTS: usize = 100_000;
/// Consecutive weight checks before a dispense gives up on reaching the target.
const MAX_DISPENSE_CHECKS: u32 = 3;
/// Data interval the bridge is set to on connect.
const CONNECT_DATA_INTERVAL: Duration = Duration::from_millis(40);
const PHIDGET_ID: i32 = 716_204;

#[derive(Debug)]
struct SimState {
    scale_connected: bool,
    motor_enabled: bool,
    /// How often the bridge publishes a new reading.
    data_interval: Duration,
    weight: f64,
    trials: Vec<CalibrationTrial>,
    /// Calibration stored for this scale, as a calibration service would keep it.
    stored_calibration: Option<Coefficients>,
    /// Coefficients loaded onto the scale.
    coefficients: Option<Vec<f64>>,
}

/// In-process stand-in for the scale, load cells and dispense motor.
///
/// Calls take as long as the real capture would (in tokio time), so the
/// progress animation and timing behave like against hardware.
pub struct SimulatedInstrument {
    state: Mutex<SimState>,
}

impl Default for SimulatedInstrument {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedInstrument {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                scale_connected: true,
                motor_enabled: false,
                data_interval: CONNECT_DATA_INTERVAL,
                weight: 500.0,
                trials: Vec::new(),
                stored_calibration: None,
                coefficients: None,
            }),
        }
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> Result<R, CommandRejection> {
        let mut state = self
            .state
            .lock()
            .map_err(|_| CommandRejection::message("instrument state poisoned"))?;
        Ok(f(&mut state))
    }

    /// Platform weight and bridge data interval of the connected scale.
    fn require_scale(&self) -> Result<(f64, Duration), CommandRejection> {
        self.with_state(|s| s.scale_connected.then_some((s.weight, s.data_interval)))?
            .ok_or_else(|| CommandRejection::message("No Scale Connected!"))
    }
}

fn arg<T: DeserializeOwned>(args: &Value, key: &str) -> Result<T, CommandRejection> {
    let v = args
        .get(key)
        .cloned()
        .ok_or_else(|| CommandRejection::message(format!("missing argument `{key}`")))?;
    serde_json::from_value(v).map_err(|e| CommandRejection::message(format!("Serialization Error: {e}")))
}

fn to_text<T: Serialize>(value: &T) -> Result<Value, CommandRejection> {
    serde_json::to_string(value)
        .map(Value::String)
        .map_err(|e| CommandRejection::message(format!("Serialization Error: {e}")))
}

fn check_request(req: &SampleRequest) -> Result<(), CommandRejection> {
    req.validate().map_err(|e| match e {
        RequestError::MissingCutoff => {
            CommandRejection::message("Missing cutoff frequency for filtered trial!")
        }
        other => CommandRejection::message(other.to_string()),
    })
}

/// First-order low-pass used for filtered trials and the dispense loop.
struct LowPass {
    alpha: f64,
    state: Option<f64>,
}

impl LowPass {
    fn new(period: Duration, cutoff: f64) -> Self {
        let dt = period.as_secs_f64().max(1e-6);
        let rc = 1.0 / (2.0 * std::f64::consts::PI * cutoff);
        Self {
            alpha: dt / (rc + dt),
            state: None,
        }
    }

    fn apply(&mut self, x: f64) -> f64 {
        let y = match self.state {
            Some(prev) => prev + self.alpha * (x - prev),
            None => x,
        };
        self.state = Some(y);
        y
    }

    fn reset(&mut self, x: f64) {
        self.state = Some(x);
    }
}

/// Take `sample_count + 1` readings and discard the first, which the
/// hardware reports before it has settled on the new interval.
///
/// The bridge only publishes every `data_interval`; samples taken faster
/// than that repeat the last published value.
fn capture(req: &SampleRequest, level: f64, noise: f64, data_interval: Duration) -> SampleResult {
    let mut rng = rand::thread_rng();
    let period = Duration::from(req.sample_period);
    let interval_nanos = data_interval.as_nanos().max(1);
    let mut filter = match (req.mode, req.cutoff_frequency) {
        (SampleMode::Filtered, Some(fc)) => Some(LowPass::new(period, fc)),
        _ => None,
    };
    let n = req.sample_count as usize;
    let mut readings = Vec::with_capacity(n);
    let mut timestamps = Vec::with_capacity(n);
    let mut published: Option<(u128, f64)> = None;
    for i in 0..=req.sample_count {
        let at = period.saturating_mul(i);
        let slot = at.as_nanos() / interval_nanos;
        let raw = match published {
            Some((last, value)) if last == slot => value,
            _ => {
                let value = match req.mode {
                    SampleMode::Median => {
                        let draws: Vec<f64> = (0..MEDIAN_WINDOW)
                            .map(|_| level + rng.gen_range(-noise..=noise))
                            .collect();
                        metrics::median(&draws).unwrap_or(level)
                    }
                    _ => level + rng.gen_range(-noise..=noise),
                };
                published = Some((slot, value));
                value
            }
        };
        let value = filter.as_mut().map_or(raw, |f| f.apply(raw));
        if i == 0 {
            continue;
        }
        readings.push(value);
        timestamps.push(WireDuration::from(period.saturating_mul(i - 1)));
    }
    SampleResult::new(readings, timestamps).unwrap_or_default()
}

/// Closed-loop dispense.
///
/// The motor slows as the filtered weight nears the target. Once the
/// filtered weight is within `check_offset` of the target the motor stops
/// and the median of `check_sample_count` readings decides whether the
/// target was reached; otherwise dispensing resumes until the filtered
/// weight crosses the target itself. At most [`MAX_DISPENSE_CHECKS`]
/// consecutive checks are made.
fn dispense_trace(settings: &DispenseRequest, start_weight: f64) -> (SampleResult, Duration) {
    let mut rng = rand::thread_rng();
    let dt = Duration::from(settings.sample_period).max(Duration::from_millis(1));
    let timeout = Duration::from(settings.timeout);
    let target = settings.target_weight.abs().max(1e-9);
    let target_level = start_weight - target;
    let mut check_level = target_level + settings.check_offset.max(0.0);
    let mut filter = LowPass::new(dt, settings.cutoff_frequency);
    filter.reset(start_weight);

    let mut weight = start_weight;
    let mut elapsed = Duration::ZERO;
    let mut checks = 0;
    let mut readings = Vec::new();
    let mut timestamps = Vec::new();

    while readings.len() < MAX_DISPENSE_POINTS {
        let filtered = filter.state.unwrap_or(weight);
        let remaining = (filtered - target_level) / target;
        let velocity = (remaining * settings.max_velocity)
            .clamp(settings.min_velocity, settings.max_velocity);
        weight -= velocity * FLOW_RATE * dt.as_secs_f64();
        elapsed += dt;
        let filtered = filter.apply(weight + rng.gen_range(-WEIGHT_NOISE..=WEIGHT_NOISE));
        readings.push(filtered);
        timestamps.push(WireDuration::from(elapsed));

        if filtered <= check_level {
            checks += 1;
            let draws: Vec<f64> = (0..settings.check_sample_count)
                .map(|_| weight + rng.gen_range(-WEIGHT_NOISE..=WEIGHT_NOISE))
                .collect();
            let checked = metrics::median(&draws).unwrap_or(weight);
            elapsed += dt.saturating_mul(settings.check_sample_count);
            readings.push(checked);
            timestamps.push(WireDuration::from(elapsed));
            if checked <= target_level || checks >= MAX_DISPENSE_CHECKS {
                break;
            }
            filter.reset(checked);
            check_level = target_level;
            continue;
        }
        if elapsed > timeout {
            break;
        }
        checks = 0;
    }
    weight += settings.retract_amount.min(start_weight - weight);
    let trace = SampleResult::new(readings, timestamps).unwrap_or_default();
    let total = Duration::from(settings.start_buffer) + elapsed;
    tracing::debug!(final_weight = weight, checks, ?total, "simulated dispense finished");
    (trace, total)
}

/// Least-squares line of reference weight over summed bridge output,
/// reported as one equal gain per load cell.
fn fit_calibration(trials: &[CalibrationTrial]) -> Option<Coefficients> {
    let points: Vec<(f64, f64)> = trials
        .iter()
        .map(|t| (t.readings.iter().sum::<f64>(), t.weight))
        .collect();
    let n = points.len() as f64;
    let mean_x = points.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = points.iter().map(|p| p.1).sum::<f64>() / n;
    let var: f64 = points.iter().map(|p| (p.0 - mean_x).powi(2)).sum();
    if points.len() < 2 || var <= f64::EPSILON * f64::EPSILON {
        return None;
    }
    let cov: f64 = points
        .iter()
        .map(|p| (p.0 - mean_x) * (p.1 - mean_y))
        .sum();
    let gain = cov / var;
    gain.is_finite().then(|| Coefficients {
        coefficients: vec![gain; LOAD_CELL_COUNT],
    })
}

#[async_trait]
impl CommandInvoker for SimulatedInstrument {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, CommandRejection> {
        match command {
            "plot" => {
                let req: SampleRequest = arg(&args, "dataRequest")?;
                check_request(&req)?;
                let (weight, interval) = self.require_scale()?;
                let result = capture(&req, weight, WEIGHT_NOISE, interval);
                tokio::time::sleep(req.estimated_duration()).await;
                Ok(json!(result))
            }
            "plot_lc" => {
                let req: SampleRequest = arg(&args, "dataRequest")?;
                check_request(&req)?;
                let (_, interval) = self.require_scale()?;
                let channels: Vec<SampleResult> = LOAD_CELL_LEVELS
                    .iter()
                    .map(|level| capture(&req, *level, LOAD_CELL_NOISE, interval))
                    .collect();
                tokio::time::sleep(req.estimated_duration()).await;
                Ok(json!(channels))
            }
            "dispense" => {
                let settings: DispenseRequest = arg(&args, "dispenseSettings")?;
                settings
                    .validate()
                    .map_err(|e| CommandRejection::message(e.to_string()))?;
                let (weight, _) = self.require_scale()?;
                if !self.with_state(|s| s.motor_enabled)? {
                    return Err(CommandRejection::message("Motor not enabled!"));
                }
                let (trace, total) = dispense_trace(&settings, weight);
                let final_weight = trace.readings().last().copied().unwrap_or(weight);
                tokio::time::sleep(total).await;
                self.with_state(|s| s.weight = final_weight)?;
                Ok(json!(trace))
            }
            "enable_motor" | "disable_motor" => {
                let enable = command == "enable_motor";
                self.with_state(|s| s.motor_enabled = enable)?;
                Ok(Value::Null)
            }
            "move_motor" => {
                let steps: i64 = arg(&args, "steps")?;
                tracing::debug!(steps, "simulated motor move");
                Ok(Value::Null)
            }
            "set_phidget_interval" => {
                let period: WireDuration = arg(&args, "samplePeriod")?;
                self.require_scale()?;
                let previous =
                    self.with_state(|s| std::mem::replace(&mut s.data_interval, period.into()))?;
                tracing::debug!(?previous, ?period, "simulated data interval changed");
                Ok(Value::Null)
            }
            "connect_scale" => {
                self.with_state(|s| {
                    if !s.scale_connected {
                        s.scale_connected = true;
                        s.data_interval = CONNECT_DATA_INTERVAL;
                        s.trials.clear();
                    }
                })?;
                Ok(json!("Scale Connected!"))
            }
            "drop_scale" => {
                self.require_scale()?;
                self.with_state(|s| s.scale_connected = false)?;
                Ok(Value::Null)
            }
            "add_trial" => {
                let samples: u32 = arg(&args, "samples")?;
                let weight: f64 = arg(&args, "weight")?;
                let period: WireDuration = arg(&args, "samplePeriod")?;
                self.require_scale()?;
                if samples == 0 {
                    return Err(CommandRejection::message(RequestError::ZeroSamples.to_string()));
                }
                self.with_state(|s| s.data_interval = period.into())?;
                let req = SampleRequest::raw(samples, period)
                    .map_err(|e| CommandRejection::message(e.to_string()))?;
                let readings = LOAD_CELL_LEVELS
                    .iter()
                    .zip(LOAD_CELL_SENSITIVITY)
                    .map(|(level, gain)| {
                        let cell = capture(&req, level + weight * gain, LOAD_CELL_NOISE, period.into());
                        metrics::median(cell.readings()).unwrap_or(*level)
                    })
                    .collect();
                tokio::time::sleep(req.estimated_duration()).await;
                let timestamp = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                let trial = CalibrationTrial {
                    readings,
                    weight,
                    timestamp: timestamp.into(),
                };
                self.with_state(|s| s.trials.push(trial.clone()))?;
                to_text(&trial)
            }
            "calibrate" => {
                self.require_scale()?;
                let fitted = self.with_state(|s| {
                    let fitted = fit_calibration(&s.trials);
                    s.stored_calibration = fitted.clone();
                    fitted
                })?;
                let coefficients = fitted.ok_or_else(|| {
                    CommandRejection::message("Need at least two trials with different weights!")
                })?;
                tracing::debug!(?coefficients, "simulated calibration stored");
                to_text(&coefficients)
            }
            "get_coefficients" => {
                self.require_scale()?;
                let stored = self.with_state(|s| {
                    let stored = s.stored_calibration.clone();
                    if let Some(c) = &stored {
                        s.coefficients = Some(c.coefficients.clone());
                    }
                    stored
                })?;
                let coefficients = stored.ok_or_else(|| {
                    CommandRejection::message(format!("No calibration stored for phidget {PHIDGET_ID}"))
                })?;
                to_text(&coefficients)
            }
            "check_app_data" => self
                .with_state(|s| format!("Scale: {}, Coefficients: {:?}", s.scale_connected, s.coefficients))
                .map(Value::String),
            other => Err(CommandRejection::message(format!(
                "unknown command: {other}"
            ))),
        }
    }
}
