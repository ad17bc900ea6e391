//! Acquisition session controller.
//!
//! Drives one external command at a time: publishes `Running`, animates a
//! cosmetic progress bar while the real call is in flight, then reconciles
//! the outcome into [`SessionState`]. Failures never escape as errors; they
//! become a `Failed` state. Only usage errors (invalid request, instrument
//! busy) are returned to the caller, and those leave the state untouched.
//!
//! The spawned call settles the state itself, so a run whose future was
//! dropped still ends in `Succeeded` or `Failed` once the instrument answers.

use super::session::SessionState;
use crate::engine::{Command, CommandInvoker, CommandRejection, ResultShape};
use crate::error::SessionError;
use crate::model::{Acquisition, SampleResult};
use crate::progress::ProgressTicker;
use serde::Deserialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Wait before sampling so the mechanics stop ringing after recent motion.
pub const SETTLING_DELAY: Duration = Duration::from_secs(2);

/// One claimed operation.
///
/// Marks the instrument busy until the spawned call finishes, even when the
/// future awaiting it has been dropped, and owns the duty of settling the
/// session. Dropped unsettled (panicking invoker, run abandoned before the
/// call was issued) it fails a still-running session.
struct InFlight {
    busy: Arc<AtomicBool>,
    state: watch::Sender<SessionState>,
    command: Command,
    settled: bool,
}

impl InFlight {
    fn settle(mut self, outcome: Result<Value, CommandRejection>) {
        let command = &self.command;
        match reconcile(command, outcome) {
            Ok((result, message)) => {
                tracing::info!(
                    command = command.name(),
                    channels = result.as_ref().map(Acquisition::channel_count),
                    "operation succeeded"
                );
                self.state.send_modify(|s| s.succeed(result, message));
            }
            Err(e) => {
                tracing::warn!(command = command.name(), kind = e.kind(), error = %e, "operation failed");
                self.state.send_modify(|s| s.fail(e));
            }
        }
        self.settled = true;
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.settled {
            let name = self.command.name();
            self.state.send_if_modified(|s| {
                if !s.is_running() {
                    return false;
                }
                tracing::warn!(command = name, "operation ended without an outcome");
                s.fail(SessionError::Transport(format!("{name} was aborted")));
                true
            });
        }
        // Cleared after settling so a new claim never races the outcome.
        self.busy.store(false, Ordering::Release);
    }
}

pub struct AcquisitionController {
    invoker: Arc<dyn CommandInvoker>,
    state: watch::Sender<SessionState>,
    ticker: Option<ProgressTicker>,
    in_flight: Arc<AtomicBool>,
}

impl AcquisitionController {
    pub fn new(invoker: Arc<dyn CommandInvoker>) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            invoker,
            state,
            ticker: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Receiver that is notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// Whether an external call issued by this controller is still pending.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Run a sampling-class command with a cosmetic progress animation paced
    /// by `estimated_millis`.
    ///
    /// Returns the final state. `Err` is only returned for usage errors, in
    /// which case nothing was issued and the state is unchanged.
    pub async fn run(
        &mut self,
        command: Command,
        estimated_millis: u64,
    ) -> Result<SessionState, SessionError> {
        if !command.is_acquisition() {
            return Err(SessionError::Precondition(format!(
                "{} does not return sampled data",
                command.name()
            )));
        }
        let guard = self.claim(&command)?;
        self.stop_ticker();
        self.state.send_modify(|s| s.begin(&command));
        tracing::info!(command = command.name(), estimated_millis, "acquisition started");

        if command.settles() {
            tracing::debug!(delay = ?SETTLING_DELAY, "waiting for instrument to settle");
            tokio::time::sleep(SETTLING_DELAY).await;
        }

        let mut call = self.spawn_call(guard);
        let ticker = self
            .ticker
            .insert(ProgressTicker::start(estimated_millis, command.progress_steps()));
        let joined = loop {
            tokio::select! {
                res = &mut call => break res,
                Some(percent) = ticker.next_tick() => {
                    self.state.send_modify(|s| s.advance(percent));
                }
            }
        };
        self.stop_ticker();
        if let Err(e) = joined {
            tracing::error!(command = command.name(), error = %e, "instrument call task failed");
        }
        Ok(self.state())
    }

    /// Issue a non-sampling command (motor, interval, scale connection,
    /// calibration).
    /// Status messages only, no progress animation.
    pub async fn execute(&mut self, command: Command) -> Result<SessionState, SessionError> {
        if command.is_acquisition() {
            return Err(SessionError::Precondition(format!(
                "{} returns sampled data; use run",
                command.name()
            )));
        }
        let guard = self.claim(&command)?;
        self.stop_ticker();
        self.state.send_modify(|s| s.begin(&command));
        tracing::info!(command = command.name(), "command issued");

        if let Err(e) = self.spawn_call(guard).await {
            tracing::error!(command = command.name(), error = %e, "instrument call task failed");
        }
        Ok(self.state())
    }

    /// Stop the local animation. The external call, if any, keeps running.
    pub fn teardown(&mut self) {
        if self.ticker.is_some() {
            tracing::debug!("controller torn down with an active progress ticker");
        }
        self.stop_ticker();
    }

    fn claim(&self, command: &Command) -> Result<InFlight, SessionError> {
        command.validate()?;
        if self.in_flight.swap(true, Ordering::AcqRel) {
            tracing::warn!(command = command.name(), "rejected: instrument busy");
            return Err(SessionError::busy(command.name()));
        }
        Ok(InFlight {
            busy: self.in_flight.clone(),
            state: self.state.clone(),
            command: command.clone(),
            settled: false,
        })
    }

    /// Issue the call on its own task; the task settles the session.
    fn spawn_call(&self, guard: InFlight) -> JoinHandle<()> {
        let invoker = self.invoker.clone();
        let name = guard.command.name();
        let args = guard.command.args();
        tokio::spawn(async move {
            let outcome = invoker.invoke(name, args).await;
            guard.settle(outcome);
        })
    }

    fn stop_ticker(&mut self) {
        if let Some(mut ticker) = self.ticker.take() {
            ticker.stop();
        }
    }
}

impl Drop for AcquisitionController {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn reconcile(
    command: &Command,
    outcome: Result<Value, CommandRejection>,
) -> Result<(Option<Acquisition>, String), SessionError> {
    let payload = outcome.map_err(|rejection| SessionError::Transport(rejection.to_string()))?;
    let shape = command.expected_shape();
    let message = match (shape, payload.as_str()) {
        (ResultShape::Status, Some(text)) => text.to_string(),
        _ => command.success_message().to_string(),
    };
    let result = validate_payload(shape, &payload)?;
    Ok((result, message))
}

/// Check a resolved payload against the structure `shape` promises.
pub fn validate_payload(
    shape: ResultShape,
    payload: &Value,
) -> Result<Option<Acquisition>, SessionError> {
    match shape {
        ResultShape::Single => Ok(Some(Acquisition::Single(parse_record(payload)?))),
        ResultShape::Channels => {
            let items = payload.as_array().ok_or_else(|| {
                SessionError::ShapeValidation("expected an array of channel records".into())
            })?;
            let channels = items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    parse_record(item).map_err(|e| match e {
                        SessionError::ShapeValidation(msg) => {
                            SessionError::ShapeValidation(format!("channel {i}: {msg}"))
                        }
                        other => other,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Some(Acquisition::Channels(channels)))
        }
        ResultShape::Status | ResultShape::Unit => Ok(None),
    }
}

fn parse_record(value: &Value) -> Result<SampleResult, SessionError> {
    let shape_err = |msg: &str| SessionError::ShapeValidation(msg.to_string());
    let record = value
        .as_object()
        .ok_or_else(|| shape_err("expected a record with readings and timestamps"))?;
    if !record.get("readings").is_some_and(Value::is_array) {
        return Err(shape_err("missing readings sequence"));
    }
    let timestamps = record.get("timestamps").or_else(|| record.get("times"));
    if !timestamps.is_some_and(Value::is_array) {
        return Err(shape_err("missing timestamps sequence"));
    }
    SampleResult::deserialize(value).map_err(|e| SessionError::ShapeValidation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{SampleRequest, WireDuration};
    use crate::orchestrator::SessionPhase;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replies with a fixed outcome after `delay`, recording each call.
    struct Scripted {
        delay: Duration,
        reply: Result<Value, Value>,
        calls: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn new(delay: Duration, reply: Result<Value, Value>) -> Arc<Self> {
            Arc::new(Self {
                delay,
                reply,
                calls: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CommandInvoker for Scripted {
        async fn invoke(&self, command: &str, _args: Value) -> Result<Value, CommandRejection> {
            self.calls.lock().unwrap().push(command.to_string());
            tokio::time::sleep(self.delay).await;
            self.reply.clone().map_err(CommandRejection)
        }
    }

    fn raw(n: u32) -> Command {
        Command::Sample(SampleRequest::raw(n, WireDuration::from_millis(10)).unwrap())
    }

    fn record(values: &[f64]) -> Value {
        let times: Vec<Value> = (0..values.len())
            .map(|i| json!({"secs": 0, "nanos": i as u32 * 10_000_000}))
            .collect();
        json!({"readings": values, "timestamps": times})
    }

    #[test]
    fn payload_shapes_are_checked() {
        assert!(validate_payload(ResultShape::Single, &record(&[1.0])).is_ok());
        assert_eq!(
            validate_payload(ResultShape::Single, &json!({"timestamps": []})),
            Err(SessionError::ShapeValidation("missing readings sequence".into()))
        );
        assert_eq!(
            validate_payload(ResultShape::Single, &json!({"readings": [1.0]})),
            Err(SessionError::ShapeValidation("missing timestamps sequence".into()))
        );
        assert!(matches!(
            validate_payload(ResultShape::Channels, &record(&[1.0])),
            Err(SessionError::ShapeValidation(_))
        ));
        let bad_channel = json!([record(&[1.0]), {"readings": "nope", "timestamps": []}]);
        assert_eq!(
            validate_payload(ResultShape::Channels, &bad_channel),
            Err(SessionError::ShapeValidation(
                "channel 1: missing readings sequence".into()
            ))
        );
        assert_eq!(validate_payload(ResultShape::Unit, &Value::Null), Ok(None));
    }

    #[tokio::test(start_paused = true)]
    async fn progress_advances_while_the_call_is_pending() {
        let invoker = Scripted::new(Duration::from_millis(1500), Ok(record(&[1.0, 2.0])));
        let mut ctrl = AcquisitionController::new(invoker);
        let mut rx = ctrl.subscribe();

        let watcher = tokio::spawn(async move {
            let mut seen = Vec::new();
            while rx.changed().await.is_ok() {
                let s = rx.borrow_and_update().clone();
                seen.push(s.progress_percent);
                if s.phase.is_finished() {
                    break;
                }
            }
            seen
        });

        let end = ctrl.run(raw(2), 1000).await.unwrap();
        assert_eq!(end.phase, SessionPhase::Succeeded);
        assert_eq!(end.progress_percent, 100.0);
        assert_eq!(end.status_message, "Data logged!");

        let seen = watcher.await.unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert!(seen.iter().any(|p| *p > 0.0 && *p < 100.0));
        assert_eq!(*seen.last().unwrap(), 100.0);
    }

    #[tokio::test(start_paused = true)]
    async fn settling_delay_precedes_sampling_calls_only() {
        let invoker = Scripted::new(Duration::ZERO, Ok(record(&[1.0])));
        let mut ctrl = AcquisitionController::new(invoker.clone());

        let start = tokio::time::Instant::now();
        ctrl.run(raw(1), 0).await.unwrap();
        assert!(start.elapsed() >= SETTLING_DELAY);

        let start = tokio::time::Instant::now();
        let dispense = Command::Dispense {
            sample: SampleRequest::raw(1, WireDuration::from_millis(10)).unwrap(),
            dispense: Default::default(),
        };
        ctrl.run(dispense, 0).await.unwrap();
        assert!(start.elapsed() < SETTLING_DELAY);
        assert_eq!(*invoker.calls.lock().unwrap(), vec!["plot", "dispense"]);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_requests_leave_state_untouched() {
        let invoker = Scripted::new(Duration::ZERO, Ok(record(&[1.0])));
        let mut ctrl = AcquisitionController::new(invoker.clone());
        let bad = Command::Sample(SampleRequest {
            mode: crate::model::SampleMode::Raw,
            sample_count: 0,
            sample_period: WireDuration::from_millis(10),
            cutoff_frequency: None,
        });
        let err = ctrl.run(bad, 0).await.unwrap_err();
        assert_eq!(err, SessionError::Precondition("Must have nonzero samples!".into()));
        assert_eq!(ctrl.state(), SessionState::default());
        assert!(invoker.calls.lock().unwrap().is_empty());

        assert!(ctrl.run(Command::EnableMotor, 0).await.is_err());
        assert!(ctrl.execute(raw(1)).await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_call_keeps_the_instrument_busy_until_it_resolves() {
        let invoker = Scripted::new(Duration::from_secs(10), Ok(record(&[1.0])));
        let mut ctrl = AcquisitionController::new(invoker.clone());

        let dropped = tokio::time::timeout(Duration::from_secs(3), ctrl.run(raw(1), 500)).await;
        assert!(dropped.is_err());
        ctrl.teardown();
        ctrl.teardown();
        assert!(ctrl.is_busy());
        let before = ctrl.state();

        let err = ctrl.run(raw(1), 500).await.unwrap_err();
        assert!(matches!(err, SessionError::Precondition(_)));
        assert_eq!(ctrl.state(), before);

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!ctrl.is_busy());
        let end = ctrl.run(raw(1), 500).await.unwrap();
        assert_eq!(end.phase, SessionPhase::Succeeded);
        assert_eq!(invoker.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_call_still_settles_the_session() {
        let invoker = Scripted::new(Duration::from_secs(10), Ok(record(&[4.0, 6.0])));
        let mut ctrl = AcquisitionController::new(invoker);
        let mut rx = ctrl.subscribe();

        let dropped = tokio::time::timeout(Duration::from_secs(3), ctrl.run(raw(2), 500)).await;
        assert!(dropped.is_err());
        ctrl.teardown();
        assert_eq!(ctrl.state().phase, SessionPhase::Running);

        tokio::time::sleep(Duration::from_secs(30)).await;
        let end = ctrl.state();
        assert_eq!(end.phase, SessionPhase::Succeeded);
        assert_eq!(end.progress_percent, 100.0);
        assert_eq!(end.status_message, "Data logged!");
        assert!(end.last_result.is_some());
        assert!(end.finished_at.is_some());
        assert!(!ctrl.is_busy());
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, SessionPhase::Succeeded);
    }

    #[tokio::test(start_paused = true)]
    async fn run_dropped_while_settling_fails_and_keeps_the_previous_result() {
        let invoker = Scripted::new(Duration::ZERO, Ok(record(&[1.0])));
        let mut ctrl = AcquisitionController::new(invoker.clone());
        let first = ctrl.run(raw(1), 0).await.unwrap();

        let dropped = tokio::time::timeout(SETTLING_DELAY / 2, ctrl.run(raw(1), 0)).await;
        assert!(dropped.is_err());
        let end = ctrl.state();
        assert_eq!(end.phase, SessionPhase::Failed);
        assert_eq!(end.progress_percent, 100.0);
        assert_eq!(end.status_message, "plot was aborted");
        assert_eq!(end.last_result, first.last_result);
        assert!(!ctrl.is_busy());
        assert_eq!(invoker.calls.lock().unwrap().len(), 1);
    }

    struct Panicking;

    #[async_trait]
    impl CommandInvoker for Panicking {
        async fn invoke(&self, _command: &str, _args: Value) -> Result<Value, CommandRejection> {
            panic!("driver fault");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_invoker_fails_the_session() {
        let mut ctrl = AcquisitionController::new(Arc::new(Panicking));
        let end = ctrl.run(raw(1), 100).await.unwrap();
        assert_eq!(end.phase, SessionPhase::Failed);
        assert_eq!(end.last_error, Some(SessionError::Transport("plot was aborted".into())));
        assert!(!ctrl.is_busy());
    }

    #[tokio::test(start_paused = true)]
    async fn execute_reports_status_text() {
        let invoker = Scripted::new(Duration::from_millis(5), Ok(json!("Scale Connected!")));
        let mut ctrl = AcquisitionController::new(invoker);
        let end = ctrl.execute(Command::ConnectScale).await.unwrap();
        assert_eq!(end.phase, SessionPhase::Succeeded);
        assert_eq!(end.status_message, "Scale Connected!");
        assert_eq!(end.last_result, None);

        let invoker = Scripted::new(Duration::ZERO, Err(json!({"message": "motor fault"})));
        let mut ctrl = AcquisitionController::new(invoker);
        let end = ctrl.execute(Command::EnableMotor).await.unwrap();
        assert_eq!(end.phase, SessionPhase::Failed);
        assert_eq!(end.status_message, "motor fault");
    }
}
