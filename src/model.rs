use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const NANOS_PER_SEC: u32 = 1_000_000_000;
const NANOS_PER_MILLI: u32 = 1_000_000;

/// Wire representation of elapsed or requested time.
///
/// Serialized as `{ "secs": .., "nanos": .. }`, the layout the instrument
/// service speaks. `nanos` is always below one second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawDuration")]
pub struct WireDuration {
    secs: u64,
    nanos: u32,
}

#[derive(Deserialize)]
struct RawDuration {
    secs: u64,
    nanos: u32,
}

impl TryFrom<RawDuration> for WireDuration {
    type Error = RequestError;

    fn try_from(raw: RawDuration) -> Result<Self, Self::Error> {
        WireDuration::new(raw.secs, raw.nanos)
    }
}

impl WireDuration {
    pub const ZERO: WireDuration = WireDuration { secs: 0, nanos: 0 };

    pub fn new(secs: u64, nanos: u32) -> Result<Self, RequestError> {
        if nanos >= NANOS_PER_SEC {
            return Err(RequestError::InvalidNanos(nanos));
        }
        Ok(Self { secs, nanos })
    }

    pub fn from_millis(millis: u64) -> Self {
        Self {
            secs: millis / 1000,
            nanos: (millis % 1000) as u32 * NANOS_PER_MILLI,
        }
    }

    pub fn seconds(&self) -> u64 {
        self.secs
    }

    pub fn nanoseconds(&self) -> u32 {
        self.nanos
    }

    /// Whole milliseconds; sub-millisecond remainders are truncated.
    pub fn as_millis(&self) -> u64 {
        self.secs
            .saturating_mul(1000)
            .saturating_add(u64::from(self.nanos / NANOS_PER_MILLI))
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + f64::from(self.nanos) * 1e-9
    }
}

impl From<Duration> for WireDuration {
    fn from(d: Duration) -> Self {
        Self {
            secs: d.as_secs(),
            nanos: d.subsec_nanos(),
        }
    }
}

impl From<WireDuration> for Duration {
    fn from(d: WireDuration) -> Self {
        Duration::new(d.secs, d.nanos)
    }
}

/// Invariant violations in a request built from form values.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RequestError {
    #[error("Must have nonzero samples!")]
    ZeroSamples,
    #[error("filtered sampling requires a cutoff frequency")]
    MissingCutoff,
    #[error("cutoff frequency is only valid for filtered sampling")]
    UnexpectedCutoff,
    #[error("cutoff frequency must be positive, got {0}")]
    InvalidCutoff(f64),
    #[error("velocities must be positive with min <= max (min {min}, max {max})")]
    InvalidVelocity { min: f64, max: f64 },
    #[error("retract amount must not be negative, got {0}")]
    NegativeRetract(f64),
    #[error("check sample count must be nonzero")]
    ZeroCheckSamples,
    #[error("nanoseconds must be below one second, got {0}")]
    InvalidNanos(u32),
    #[error("calibration weight must be a finite number, got {0}")]
    InvalidWeight(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum SampleMode {
    Raw,
    Median,
    Filtered,
}

/// Parameters for one sampling trial.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRequest {
    #[serde(rename = "trial")]
    pub mode: SampleMode,
    #[serde(rename = "samples")]
    pub sample_count: u32,
    pub sample_period: WireDuration,
    pub cutoff_frequency: Option<f64>,
}

impl SampleRequest {
    pub fn new(
        mode: SampleMode,
        sample_count: u32,
        sample_period: WireDuration,
        cutoff_frequency: Option<f64>,
    ) -> Result<Self, RequestError> {
        let req = Self {
            mode,
            sample_count,
            sample_period,
            cutoff_frequency,
        };
        req.validate()?;
        Ok(req)
    }

    pub fn raw(sample_count: u32, sample_period: WireDuration) -> Result<Self, RequestError> {
        Self::new(SampleMode::Raw, sample_count, sample_period, None)
    }

    pub fn filtered(
        sample_count: u32,
        sample_period: WireDuration,
        cutoff_frequency: f64,
    ) -> Result<Self, RequestError> {
        Self::new(
            SampleMode::Filtered,
            sample_count,
            sample_period,
            Some(cutoff_frequency),
        )
    }

    pub fn validate(&self) -> Result<(), RequestError> {
        if self.sample_count == 0 {
            return Err(RequestError::ZeroSamples);
        }
        match (self.mode, self.cutoff_frequency) {
            (SampleMode::Filtered, None) => Err(RequestError::MissingCutoff),
            (SampleMode::Filtered, Some(f)) if !(f.is_finite() && f > 0.0) => {
                Err(RequestError::InvalidCutoff(f))
            }
            (SampleMode::Raw | SampleMode::Median, Some(_)) => Err(RequestError::UnexpectedCutoff),
            _ => Ok(()),
        }
    }

    /// `sample_count × sample_period`, the nominal capture time.
    pub fn estimated_duration(&self) -> Duration {
        Duration::from(self.sample_period).saturating_mul(self.sample_count)
    }
}

/// Low-pass cutoff a dispense uses when the form does not name one.
pub const DEFAULT_DISPENSE_CUTOFF: f64 = 2.0;

/// Closed-loop dispense settings.
///
/// Carries its own sampling period and cutoff: the dispense loop always
/// filters its weight readings, whatever mode the trial form is in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispenseRequest {
    pub sample_period: WireDuration,
    pub cutoff_frequency: f64,
    #[serde(rename = "weight")]
    pub target_weight: f64,
    pub max_velocity: f64,
    pub min_velocity: f64,
    pub retract_amount: f64,
    pub check_offset: f64,
    pub check_sample_count: u32,
    pub timeout: WireDuration,
    pub start_buffer: WireDuration,
}

impl Default for DispenseRequest {
    fn default() -> Self {
        Self {
            sample_period: WireDuration::from_millis(80),
            cutoff_frequency: DEFAULT_DISPENSE_CUTOFF,
            target_weight: 50.0,
            max_velocity: 0.5,
            min_velocity: 0.1,
            retract_amount: 0.0,
            check_offset: 5.0,
            check_sample_count: 10,
            timeout: WireDuration::from_millis(30_000),
            start_buffer: WireDuration::from_millis(2_000),
        }
    }
}

impl DispenseRequest {
    pub fn validate(&self) -> Result<(), RequestError> {
        if !(self.cutoff_frequency.is_finite() && self.cutoff_frequency > 0.0) {
            return Err(RequestError::InvalidCutoff(self.cutoff_frequency));
        }
        let velocities_ok = self.max_velocity.is_finite()
            && self.min_velocity.is_finite()
            && self.min_velocity > 0.0
            && self.min_velocity <= self.max_velocity;
        if !velocities_ok {
            return Err(RequestError::InvalidVelocity {
                min: self.min_velocity,
                max: self.max_velocity,
            });
        }
        if self.retract_amount < 0.0 || self.retract_amount.is_nan() {
            return Err(RequestError::NegativeRetract(self.retract_amount));
        }
        if self.check_sample_count == 0 {
            return Err(RequestError::ZeroCheckSamples);
        }
        Ok(())
    }

    /// Upper bound of a dispense cycle: start buffer plus timeout.
    pub fn estimated_duration(&self) -> Duration {
        Duration::from(self.start_buffer).saturating_add(Duration::from(self.timeout))
    }
}

/// One sampled channel: readings paired with their timestamps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawSampleResult")]
pub struct SampleResult {
    readings: Vec<f64>,
    timestamps: Vec<WireDuration>,
}

#[derive(Deserialize)]
struct RawSampleResult {
    readings: Vec<f64>,
    #[serde(alias = "times")]
    timestamps: Vec<WireDuration>,
}

impl TryFrom<RawSampleResult> for SampleResult {
    type Error = String;

    fn try_from(raw: RawSampleResult) -> Result<Self, Self::Error> {
        SampleResult::new(raw.readings, raw.timestamps)
    }
}

impl SampleResult {
    pub fn new(readings: Vec<f64>, timestamps: Vec<WireDuration>) -> Result<Self, String> {
        if readings.len() != timestamps.len() {
            return Err(format!(
                "{} readings but {} timestamps",
                readings.len(),
                timestamps.len()
            ));
        }
        Ok(Self {
            readings,
            timestamps,
        })
    }

    pub fn readings(&self) -> &[f64] {
        &self.readings
    }

    pub fn timestamps(&self) -> &[WireDuration] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

/// Scale factor applied to raw load-cell channels (V/V to µV/V).
pub const MICROVOLTS_PER_VOLT: f64 = 1e6;

/// What a completed sampling operation returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Acquisition {
    Single(SampleResult),
    Channels(Vec<SampleResult>),
}

impl Acquisition {
    /// Project into plot coordinates: x in seconds, one series per channel.
    pub fn to_series(&self) -> Vec<Series> {
        match self {
            Acquisition::Single(result) => vec![Series::from_result("Readings", result, 1.0)],
            Acquisition::Channels(channels) => channels
                .iter()
                .enumerate()
                .map(|(i, result)| {
                    Series::from_result(format!("Load Cell {i}"), result, MICROVOLTS_PER_VOLT)
                })
                .collect(),
        }
    }

    pub fn channel_count(&self) -> usize {
        match self {
            Acquisition::Single(_) => 1,
            Acquisition::Channels(c) => c.len(),
        }
    }
}

/// Load-cell medians recorded while a known reference weight sat on the scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationTrial {
    pub readings: Vec<f64>,
    pub weight: f64,
    /// Wall-clock time of the trial, since the Unix epoch.
    pub timestamp: WireDuration,
}

/// Per-load-cell gains produced by a calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Coefficients {
    pub coefficients: Vec<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesColor {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// A named projection of a [`SampleResult`] into plot coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    label: String,
    x_values: Vec<f64>,
    y_values: Vec<f64>,
    color: Option<SeriesColor>,
}

impl Series {
    pub fn new(label: impl Into<String>, points: impl IntoIterator<Item = (f64, f64)>) -> Self {
        let (x_values, y_values) = points.into_iter().unzip();
        Self {
            label: label.into(),
            x_values,
            y_values,
            color: None,
        }
    }

    pub fn from_result(label: impl Into<String>, result: &SampleResult, y_scale: f64) -> Self {
        let points = result
            .timestamps()
            .iter()
            .zip(result.readings())
            .map(|(t, y)| (t.as_secs_f64(), y * y_scale));
        Self::new(label, points)
    }

    pub fn with_color(mut self, color: SeriesColor) -> Self {
        self.color = Some(color);
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn x_values(&self) -> &[f64] {
        &self.x_values
    }

    pub fn y_values(&self) -> &[f64] {
        &self.y_values
    }

    pub fn color(&self) -> Option<SeriesColor> {
        self.color
    }

    pub fn points(&self) -> Vec<(f64, f64)> {
        self.x_values
            .iter()
            .copied()
            .zip(self.y_values.iter().copied())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.y_values.is_empty()
    }
}

/// Which operation a one-shot run performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    /// Weighing trial on the scale.
    Sample,
    /// Raw capture of every load-cell channel.
    Channels,
    /// Closed-loop dispense cycle.
    Dispense,
    /// Record a calibration trial under the calibration weight.
    AddTrial,
    /// Submit the recorded trials and calibrate.
    Calibrate,
    /// Load the stored calibration for the connected scale.
    Coefficients,
}

/// Smallest cutoff the form can be adjusted down to.
pub const MIN_CUTOFF_HZ: f64 = 0.5;

/// Form values a session builds its requests from.
///
/// Built once from the command line; every user action constructs fresh
/// requests from it, so a request is never mutated after it was issued.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    pub backend_url: Option<String>,
    pub user_agent: String,
    pub operation: Operation,
    pub mode: SampleMode,
    pub sample_count: u32,
    #[serde(with = "humantime_serde")]
    pub sample_period: Duration,
    pub cutoff_frequency: Option<f64>,
    pub target_weight: f64,
    pub max_velocity: f64,
    pub min_velocity: f64,
    pub retract_amount: f64,
    pub check_offset: f64,
    pub check_sample_count: u32,
    #[serde(with = "humantime_serde")]
    pub dispense_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub start_buffer: Duration,
    pub motor_steps: i64,
    /// Reference weight on the scale for the next calibration trial.
    pub calibration_weight: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let dispense = DispenseRequest::default();
        Self {
            backend_url: None,
            user_agent: format!("scale-diag/{}", env!("CARGO_PKG_VERSION")),
            operation: Operation::Sample,
            mode: SampleMode::Raw,
            sample_count: 200,
            sample_period: Duration::from_millis(80),
            cutoff_frequency: None,
            target_weight: dispense.target_weight,
            max_velocity: dispense.max_velocity,
            min_velocity: dispense.min_velocity,
            retract_amount: dispense.retract_amount,
            check_offset: dispense.check_offset,
            check_sample_count: dispense.check_sample_count,
            dispense_timeout: dispense.timeout.into(),
            start_buffer: dispense.start_buffer.into(),
            motor_steps: 200,
            calibration_weight: 0.0,
        }
    }
}

impl SessionConfig {
    /// The cutoff only travels with filtered trials; other modes ignore the field.
    pub fn sample_request(&self) -> Result<SampleRequest, RequestError> {
        let cutoff = match self.mode {
            SampleMode::Filtered => self.cutoff_frequency,
            SampleMode::Raw | SampleMode::Median => None,
        };
        SampleRequest::new(
            self.mode,
            self.sample_count,
            self.sample_period.into(),
            cutoff,
        )
    }

    pub fn dispense_request(&self) -> Result<DispenseRequest, RequestError> {
        let req = DispenseRequest {
            sample_period: self.sample_period.into(),
            cutoff_frequency: self.cutoff_frequency.unwrap_or(DEFAULT_DISPENSE_CUTOFF),
            target_weight: self.target_weight,
            max_velocity: self.max_velocity,
            min_velocity: self.min_velocity,
            retract_amount: self.retract_amount,
            check_offset: self.check_offset,
            check_sample_count: self.check_sample_count,
            timeout: self.dispense_timeout.into(),
            start_buffer: self.start_buffer.into(),
        };
        req.validate()?;
        Ok(req)
    }

    /// Cycle Raw -> Median -> Filtered -> Raw. Filtered is skipped while no
    /// cutoff is set, since such a trial could never be issued.
    pub fn next_mode(&mut self) -> SampleMode {
        self.mode = match self.mode {
            SampleMode::Raw => SampleMode::Median,
            SampleMode::Median if self.cutoff_frequency.is_some() => SampleMode::Filtered,
            SampleMode::Median | SampleMode::Filtered => SampleMode::Raw,
        };
        self.mode
    }

    /// Move the cutoff by `delta_hz`, starting from the dispense default and
    /// never dropping below [`MIN_CUTOFF_HZ`].
    pub fn adjust_cutoff(&mut self, delta_hz: f64) -> f64 {
        let current = self.cutoff_frequency.unwrap_or(DEFAULT_DISPENSE_CUTOFF);
        let next = if self.cutoff_frequency.is_some() {
            (current + delta_hz).max(MIN_CUTOFF_HZ)
        } else {
            current
        };
        self.cutoff_frequency = Some(next);
        next
    }

    pub fn adjust_calibration_weight(&mut self, delta: f64) -> f64 {
        self.calibration_weight = (self.calibration_weight + delta).max(0.0);
        self.calibration_weight
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn duration_from_millis_round_trips() {
        let d = WireDuration::from_millis(80);
        assert_eq!(d.seconds(), 0);
        assert_eq!(d.nanoseconds(), 80_000_000);
        assert_eq!(d.as_millis(), 80);

        let long = WireDuration::from_millis(12_345);
        assert_eq!((long.seconds(), long.nanoseconds()), (12, 345_000_000));
        assert_eq!(long.as_millis(), 12_345);
    }

    #[test]
    fn duration_uses_secs_nanos_on_the_wire() {
        let d = WireDuration::from_millis(1_500);
        assert_eq!(
            serde_json::to_value(d).unwrap(),
            json!({"secs": 1, "nanos": 500_000_000})
        );
        let back: WireDuration = serde_json::from_value(json!({"secs": 1, "nanos": 500_000_000})).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn duration_rejects_out_of_range_nanos() {
        assert!(WireDuration::new(0, 1_000_000_000).is_err());
        assert!(serde_json::from_value::<WireDuration>(json!({"secs": 0, "nanos": 2_000_000_000u64})).is_err());
    }

    #[test]
    fn cutoff_present_iff_filtered() {
        let period = WireDuration::from_millis(40);
        assert!(SampleRequest::raw(100, period).is_ok());
        assert!(SampleRequest::filtered(100, period, 2.0).is_ok());
        assert_eq!(
            SampleRequest::new(SampleMode::Filtered, 100, period, None),
            Err(RequestError::MissingCutoff)
        );
        assert_eq!(
            SampleRequest::new(SampleMode::Median, 100, period, Some(2.0)),
            Err(RequestError::UnexpectedCutoff)
        );
        assert_eq!(
            SampleRequest::filtered(100, period, -1.0),
            Err(RequestError::InvalidCutoff(-1.0))
        );
        assert_eq!(SampleRequest::raw(0, period), Err(RequestError::ZeroSamples));
    }

    #[test]
    fn sample_request_serializes_like_the_service_expects() {
        let req = SampleRequest::raw(200, WireDuration::from_millis(80)).unwrap();
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "trial": "Raw",
                "samples": 200,
                "sample_period": {"secs": 0, "nanos": 80_000_000},
                "cutoff_frequency": null,
            })
        );
        assert_eq!(req.estimated_duration(), Duration::from_millis(16_000));
    }

    #[test]
    fn dispense_validation() {
        assert!(DispenseRequest::default().validate().is_ok());

        let slow_max = DispenseRequest {
            min_velocity: 0.6,
            ..Default::default()
        };
        assert!(matches!(
            slow_max.validate(),
            Err(RequestError::InvalidVelocity { .. })
        ));

        let retract = DispenseRequest {
            retract_amount: -1.0,
            ..Default::default()
        };
        assert_eq!(retract.validate(), Err(RequestError::NegativeRetract(-1.0)));

        let checks = DispenseRequest {
            check_sample_count: 0,
            ..Default::default()
        };
        assert_eq!(checks.validate(), Err(RequestError::ZeroCheckSamples));
        assert_eq!(
            DispenseRequest::default().estimated_duration(),
            Duration::from_secs(32)
        );
    }

    #[test]
    fn sample_result_accepts_times_alias_and_checks_lengths() {
        let ok: SampleResult = serde_json::from_value(json!({
            "readings": [1.0, 2.0],
            "times": [{"secs": 0, "nanos": 0}, {"secs": 0, "nanos": 40_000_000}],
        }))
        .unwrap();
        assert_eq!(ok.len(), 2);

        let mismatched = serde_json::from_value::<SampleResult>(json!({
            "readings": [1.0],
            "timestamps": [],
        }));
        assert!(mismatched.is_err());
    }

    #[test]
    fn config_builds_fresh_requests() {
        let mut cfg = SessionConfig {
            cutoff_frequency: Some(3.0),
            ..Default::default()
        };
        let raw = cfg.sample_request().unwrap();
        assert_eq!(raw.cutoff_frequency, None);
        assert_eq!(raw.sample_period, WireDuration::from_millis(80));

        assert_eq!(cfg.next_mode(), SampleMode::Median);
        assert_eq!(cfg.next_mode(), SampleMode::Filtered);
        assert_eq!(cfg.sample_request().unwrap().cutoff_frequency, Some(3.0));
        cfg.cutoff_frequency = None;
        assert_eq!(cfg.sample_request(), Err(RequestError::MissingCutoff));

        assert_eq!(cfg.dispense_request().unwrap(), DispenseRequest::default());
        let v = serde_json::to_value(&cfg).unwrap();
        assert_eq!(v["sample_period"], json!("80ms"));
        assert_eq!(v["operation"], json!("sample"));
    }

    #[test]
    fn channels_project_to_scaled_load_cell_series() {
        let channel = SampleResult::new(
            vec![1e-6, 2e-6],
            vec![WireDuration::from_millis(0), WireDuration::from_millis(500)],
        )
        .unwrap();
        let acq = Acquisition::Channels(vec![channel.clone(), SampleResult::default()]);
        let series = acq.to_series();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].label(), "Load Cell 0");
        assert_eq!(series[0].x_values(), &[0.0, 0.5]);
        assert!((series[0].y_values()[1] - 2.0).abs() < 1e-9);
        assert!(series[1].is_empty());

        let single = Acquisition::Single(channel).to_series();
        assert_eq!(single[0].label(), "Readings");
        assert_eq!(single[0].y_values(), &[1e-6, 2e-6]);
    }

    #[test]
    fn filtered_mode_needs_a_cutoff_in_the_form() {
        let mut cfg = SessionConfig::default();
        assert_eq!(cfg.next_mode(), SampleMode::Median);
        assert_eq!(cfg.next_mode(), SampleMode::Raw, "no cutoff, no filtered trials");

        assert_eq!(cfg.adjust_cutoff(0.5), DEFAULT_DISPENSE_CUTOFF);
        assert_eq!(cfg.adjust_cutoff(0.5), 2.5);
        assert_eq!(cfg.adjust_cutoff(-10.0), MIN_CUTOFF_HZ);
        cfg.next_mode();
        assert_eq!(cfg.next_mode(), SampleMode::Filtered);
        assert_eq!(
            cfg.sample_request().unwrap().cutoff_frequency,
            Some(MIN_CUTOFF_HZ)
        );

        assert_eq!(cfg.adjust_calibration_weight(-5.0), 0.0);
        assert_eq!(cfg.adjust_calibration_weight(100.0), 100.0);
    }

    #[test]
    fn dispense_settings_carry_their_own_timing() {
        let cfg = SessionConfig {
            sample_period: Duration::from_millis(40),
            cutoff_frequency: Some(4.0),
            ..Default::default()
        };
        let req = cfg.dispense_request().unwrap();
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "sample_period": {"secs": 0, "nanos": 40_000_000},
                "cutoff_frequency": 4.0,
                "weight": 50.0,
                "max_velocity": 0.5,
                "min_velocity": 0.1,
                "retract_amount": 0.0,
                "check_offset": 5.0,
                "check_sample_count": 10,
                "timeout": {"secs": 30, "nanos": 0},
                "start_buffer": {"secs": 2, "nanos": 0},
            })
        );

        let bad = DispenseRequest {
            cutoff_frequency: 0.0,
            ..Default::default()
        };
        assert_eq!(bad.validate(), Err(RequestError::InvalidCutoff(0.0)));
    }
}
