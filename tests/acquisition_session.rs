//! End-to-end sessions against a scripted instrument.

use async_trait::async_trait;
use scale_diag::engine::{Command, CommandInvoker, CommandRejection, SimulatedInstrument};
use scale_diag::error::SessionError;
use scale_diag::metrics::{compute_statistics, median, range};
use scale_diag::model::{
    Acquisition, Coefficients, Operation, SampleRequest, SessionConfig, WireDuration,
};
use scale_diag::orchestrator::{AcquisitionController, SessionPhase, SETTLING_DELAY};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Answers each call with the next scripted reply after the request's nominal duration.
struct ScriptedInstrument {
    replies: Mutex<VecDeque<Result<Value, Value>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl ScriptedInstrument {
    fn new(replies: impl IntoIterator<Item = Result<Value, Value>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            requests: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CommandInvoker for ScriptedInstrument {
    async fn invoke(&self, command: &str, args: Value) -> Result<Value, CommandRejection> {
        self.requests
            .lock()
            .unwrap()
            .push((command.to_string(), args.clone()));
        if let Ok(req) = serde_json::from_value::<SampleRequest>(args["dataRequest"].clone()) {
            tokio::time::sleep(req.estimated_duration()).await;
        }
        let reply = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Err(json!("script exhausted")));
        reply.map_err(CommandRejection)
    }
}

fn constant_capture(n: usize, value: f64, period_ms: u32) -> Value {
    let timestamps: Vec<Value> = (0..n)
        .map(|i| {
            let nanos = i as u64 * u64::from(period_ms) * 1_000_000;
            json!({"secs": nanos / 1_000_000_000, "nanos": nanos % 1_000_000_000})
        })
        .collect();
    json!({"readings": vec![value; n], "timestamps": timestamps})
}

fn raw_request() -> SampleRequest {
    SampleRequest::raw(200, WireDuration::from_millis(80)).unwrap()
}

#[tokio::test(start_paused = true)]
async fn constant_raw_trial_yields_exact_statistics() {
    let instrument = ScriptedInstrument::new([Ok(constant_capture(200, 5.0, 80))]);
    let mut ctrl = AcquisitionController::new(instrument.clone());

    let command = Command::Sample(raw_request());
    let estimate = command.estimated_millis();
    assert_eq!(estimate, 16_000);

    let start = tokio::time::Instant::now();
    let state = ctrl.run(command, estimate).await.unwrap();
    assert!(start.elapsed() >= SETTLING_DELAY + Duration::from_secs(16));

    assert_eq!(state.phase, SessionPhase::Succeeded);
    assert_eq!(state.progress_percent, 100.0);
    assert_eq!(state.last_error, None);
    assert_eq!(state.status_message, "Data logged!");

    let Some(Acquisition::Single(result)) = &state.last_result else {
        panic!("expected a single capture, got {:?}", state.last_result);
    };
    assert_eq!(result.readings().len(), 200);
    assert!(result.timestamps().windows(2).all(|w| w[0] < w[1]));
    assert_eq!(median(result.readings()), Some(5.0));
    assert_eq!(range(result.readings()), Some(0.0));

    let requests = instrument.requests.lock().unwrap();
    assert_eq!(requests[0].0, "plot");
    assert_eq!(
        requests[0].1["dataRequest"],
        json!({
            "trial": "Raw",
            "samples": 200,
            "sample_period": {"secs": 0, "nanos": 80_000_000},
            "cutoff_frequency": null,
        })
    );
}

#[tokio::test(start_paused = true)]
async fn rejection_fails_the_session_and_keeps_the_previous_result() {
    let instrument = ScriptedInstrument::new([
        Ok(constant_capture(10, 1.0, 80)),
        Err(json!("No Scale Connected!")),
    ]);
    let mut ctrl = AcquisitionController::new(instrument);
    let first = ctrl.run(Command::Sample(raw_request()), 1000).await.unwrap();
    let before = first.last_result.clone();
    assert!(before.is_some());

    let state = ctrl.run(Command::Sample(raw_request()), 1000).await.unwrap();
    assert_eq!(state.phase, SessionPhase::Failed);
    assert_eq!(state.progress_percent, 100.0);
    assert_eq!(state.last_result, before);
    assert_eq!(
        state.last_error,
        Some(SessionError::Transport("No Scale Connected!".into()))
    );
    assert_eq!(state.status_message, "No Scale Connected!");
}

#[tokio::test(start_paused = true)]
async fn structured_rejections_are_stringified() {
    let instrument = ScriptedInstrument::new([Err(json!({"code": 3, "detail": "stall"}))]);
    let mut ctrl = AcquisitionController::new(instrument);
    let state = ctrl.run(Command::Sample(raw_request()), 0).await.unwrap();
    assert_eq!(state.phase, SessionPhase::Failed);
    assert_eq!(state.status_message, r#"{"code":3,"detail":"stall"}"#);
}

#[tokio::test(start_paused = true)]
async fn payload_without_readings_is_a_format_error() {
    let instrument = ScriptedInstrument::new([Ok(json!({"timestamps": []}))]);
    let mut ctrl = AcquisitionController::new(instrument);
    let state = ctrl.run(Command::Sample(raw_request()), 1000).await.unwrap();

    assert_eq!(state.phase, SessionPhase::Failed);
    assert_eq!(state.progress_percent, 100.0);
    let err = state.last_error.unwrap();
    assert_eq!(err.kind(), "shape");
    assert!(err.to_string().starts_with("unexpected data format"));
    assert_eq!(state.last_result, None);
}

#[tokio::test(start_paused = true)]
async fn load_cell_capture_with_an_empty_channel() {
    let mut channels: Vec<Value> = (0..3).map(|_| constant_capture(100, 2e-6, 40)).collect();
    channels.push(json!({"readings": [], "timestamps": []}));
    let instrument = ScriptedInstrument::new([Ok(Value::Array(channels))]);
    let mut ctrl = AcquisitionController::new(instrument);

    let cfg = SessionConfig::default();
    let command = Command::from_config(Operation::Channels, &cfg).unwrap();
    let state = ctrl.run(command, 500).await.unwrap();
    assert_eq!(state.phase, SessionPhase::Succeeded);

    let stats = compute_statistics(&state.series());
    assert_eq!(stats.len(), 4);
    assert_eq!(stats[0].label, "Load Cell 0");
    assert!((stats[0].median.unwrap() - 2.0).abs() < 1e-9);
    assert_eq!(stats[3].median_text(), "N/A");
    assert_eq!(stats[3].range_text(), "N/A");
}

#[tokio::test(start_paused = true)]
async fn simulated_dispense_after_enabling_the_motor() {
    let mut ctrl = AcquisitionController::new(Arc::new(SimulatedInstrument::new()));
    let cfg = SessionConfig::default();
    let dispense = Command::from_config(Operation::Dispense, &cfg).unwrap();

    let refused = ctrl.run(dispense.clone(), 1000).await.unwrap();
    assert_eq!(refused.phase, SessionPhase::Failed);
    assert_eq!(refused.status_message, "Motor not enabled!");

    let enabled = ctrl.execute(Command::EnableMotor).await.unwrap();
    assert_eq!(enabled.status_message, "Motor enabled!");

    let estimate = dispense.estimated_millis();
    let done = ctrl.run(dispense, estimate).await.unwrap();
    assert_eq!(done.phase, SessionPhase::Succeeded);
    assert_eq!(done.status_message, "Dispense complete!");
    let series = done.series();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].label(), "Readings");
    assert!(!series[0].is_empty());
}

#[tokio::test(start_paused = true)]
async fn calibration_through_the_controller() {
    let mut ctrl = AcquisitionController::new(Arc::new(SimulatedInstrument::new()));
    let mut rx = ctrl.subscribe();
    let statuses = tokio::spawn(async move {
        let mut seen = Vec::new();
        while rx.changed().await.is_ok() {
            seen.push(rx.borrow_and_update().status_message.clone());
        }
        seen
    });

    let mut cfg = SessionConfig {
        sample_count: 50,
        ..Default::default()
    };
    for weight in [0.0, 200.0] {
        cfg.calibration_weight = weight;
        let trial = Command::from_config(Operation::AddTrial, &cfg).unwrap();
        let state = ctrl.execute(trial).await.unwrap();
        assert_eq!(state.phase, SessionPhase::Succeeded);
        assert!(state.status_message.starts_with(r#"{"readings":["#));
    }

    let calibrated = ctrl.execute(Command::Calibrate).await.unwrap();
    assert_eq!(calibrated.phase, SessionPhase::Succeeded);
    let fitted: Coefficients = serde_json::from_str(&calibrated.status_message).unwrap();
    assert_eq!(fitted.coefficients.len(), 4);

    let loaded = ctrl.execute(Command::GetCoefficients).await.unwrap();
    assert_eq!(loaded.status_message, calibrated.status_message);
    let status = ctrl.execute(Command::CheckAppData).await.unwrap();
    assert!(status.status_message.starts_with("Scale: true, Coefficients: Some(["));
    assert_eq!(status.last_result, None);

    drop(ctrl);
    let seen = statuses.await.unwrap();
    assert!(seen.iter().any(|s| s == "Collecting data..."));
}

