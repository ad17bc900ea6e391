use crate::engine::{Command, CommandInvoker, HttpInvoker, SimulatedInstrument};
use crate::metrics;
use crate::model::{Operation, SampleMode, SessionConfig};
use crate::orchestrator::{AcquisitionController, SessionPhase, SessionState};
use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Lines a one-shot run prints.
enum ReportLine {
    /// Final summary, to stdout.
    Summary(String),
    /// Snapshot of the running operation, to stderr.
    Progress { status: String, percent: f64 },
}

/// Thins progress output to one line per 10% step of each status.
#[derive(Default)]
struct ProgressThrottle {
    last: Option<(String, u32)>,
}

impl ProgressThrottle {
    fn admit(&mut self, status: &str, percent: f64) -> bool {
        let step = (percent.clamp(0.0, 100.0) / 10.0).floor() as u32;
        match &self.last {
            Some((s, last_step)) if s == status && *last_step == step => false,
            _ => {
                self.last = Some((status.to_string(), step));
                true
            }
        }
    }
}

/// Spawn a blocking writer so terminal output never stalls the runtime.
fn spawn_report_writer() -> (
    mpsc::UnboundedSender<ReportLine>,
    tokio::task::JoinHandle<()>,
) {
    let (tx, mut rx) = mpsc::unbounded_channel::<ReportLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let mut out = std::io::LineWriter::new(std::io::stdout().lock());
        let mut err = std::io::LineWriter::new(std::io::stderr().lock());
        let mut throttle = ProgressThrottle::default();

        while let Some(line) = rx.blocking_recv() {
            match line {
                ReportLine::Summary(text) => {
                    let _ = writeln!(out, "{text}");
                }
                ReportLine::Progress { status, percent } => {
                    if throttle.admit(&status, percent) {
                        let _ = writeln!(err, "{status} {percent:.0}%");
                    }
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "scale-diag",
    version,
    about = "Scale, load-cell and dispense diagnostics with optional TUI"
)]
pub struct Cli {
    /// Base URL of the instrument command service; the built-in simulator is used when omitted
    #[arg(long)]
    pub backend_url: Option<String>,

    /// Print the final session state as JSON and exit (no TUI)
    #[arg(long)]
    pub json: bool,

    /// Print a text summary and exit (no TUI)
    #[arg(long)]
    pub text: bool,

    /// Operation performed in --text/--json mode
    #[arg(long, value_enum, default_value_t = Operation::Sample)]
    pub operation: Operation,

    /// Trial mode
    #[arg(long, value_enum, default_value_t = SampleMode::Raw)]
    pub mode: SampleMode,

    /// Number of samples per trial
    #[arg(long, default_value_t = 200)]
    pub samples: u32,

    /// Time between samples
    #[arg(long, default_value = "80ms")]
    pub sample_period: humantime::Duration,

    /// Low-pass cutoff in Hz (filtered trials only)
    #[arg(long)]
    pub cutoff_frequency: Option<f64>,

    /// Weight to dispense
    #[arg(long, default_value_t = 50.0)]
    pub target_weight: f64,

    /// Motor velocity far from the target
    #[arg(long, default_value_t = 0.5)]
    pub max_velocity: f64,

    /// Motor velocity close to the target
    #[arg(long, default_value_t = 0.1)]
    pub min_velocity: f64,

    /// Retraction after the target is reached
    #[arg(long, default_value_t = 0.0)]
    pub retract_amount: f64,

    /// Offset before the target at which the dispense starts checking
    #[arg(long, default_value_t = 5.0)]
    pub check_offset: f64,

    /// Samples averaged for each check
    #[arg(long, default_value_t = 10)]
    pub check_samples: u32,

    /// Give up the dispense after this long
    #[arg(long, default_value = "30s")]
    pub timeout: humantime::Duration,

    /// Wait before the motor starts
    #[arg(long, default_value = "2s")]
    pub start_buffer: humantime::Duration,

    /// Steps per manual motor move
    #[arg(long, default_value_t = 200, allow_hyphen_values = true)]
    pub steps: i64,

    /// Enable the motor before running the operation (--text/--json)
    #[arg(long)]
    pub enable_motor: bool,

    /// Reference weight on the scale for calibration trials
    #[arg(long, default_value_t = 0.0)]
    pub calibration_weight: f64,
}

pub async fn run(args: Cli) -> Result<()> {
    if args.json && args.text {
        return Err(anyhow::anyhow!("--json and --text are mutually exclusive"));
    }

    if !args.json && !args.text {
        #[cfg(feature = "tui")]
        {
            return crate::tui::run(args).await;
        }
        #[cfg(not(feature = "tui"))]
        {
            // Fallback when built without TUI support.
            return run_text(args).await;
        }
    }

    if args.json {
        return run_json(args).await;
    }

    run_text(args).await
}

/// Build a `SessionConfig` from CLI arguments.
pub fn build_config(args: &Cli) -> SessionConfig {
    SessionConfig {
        backend_url: args.backend_url.clone(),
        user_agent: format!("scale-diag/{}", env!("CARGO_PKG_VERSION")),
        operation: args.operation,
        mode: args.mode,
        sample_count: args.samples,
        sample_period: Duration::from(args.sample_period),
        cutoff_frequency: args.cutoff_frequency,
        target_weight: args.target_weight,
        max_velocity: args.max_velocity,
        min_velocity: args.min_velocity,
        retract_amount: args.retract_amount,
        check_offset: args.check_offset,
        check_sample_count: args.check_samples,
        dispense_timeout: Duration::from(args.timeout),
        start_buffer: Duration::from(args.start_buffer),
        motor_steps: args.steps,
        calibration_weight: args.calibration_weight,
    }
}

/// The service behind `--backend-url`, or the simulator.
pub fn make_invoker(cfg: &SessionConfig) -> Result<Arc<dyn CommandInvoker>> {
    match cfg.backend_url.as_deref() {
        Some(url) => {
            tracing::info!(%url, "using instrument service");
            Ok(Arc::new(
                HttpInvoker::new(url, &cfg.user_agent).context("create instrument client")?,
            ))
        }
        None => {
            tracing::info!("using simulated instrument");
            Ok(Arc::new(SimulatedInstrument::new()))
        }
    }
}

/// Run the configured operation once on a fresh controller.
async fn run_once(
    cfg: &SessionConfig,
    enable_motor: bool,
    out_tx: Option<mpsc::UnboundedSender<ReportLine>>,
) -> Result<SessionState> {
    let command = Command::from_config(cfg.operation, cfg).context("invalid request")?;
    let mut ctrl = AcquisitionController::new(make_invoker(cfg)?);

    if enable_motor {
        let state = ctrl.execute(Command::EnableMotor).await?;
        if state.phase == SessionPhase::Failed {
            anyhow::bail!("enable motor failed: {}", state.status_message);
        }
    }

    let watcher = out_tx.map(|tx| {
        let mut rx = ctrl.subscribe();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let line = {
                    let s = rx.borrow_and_update();
                    s.is_running().then(|| ReportLine::Progress {
                        status: s.status_message.clone(),
                        percent: s.progress_percent,
                    })
                };
                if let Some(line) = line {
                    let _ = tx.send(line);
                }
            }
        })
    });

    let state = if command.is_acquisition() {
        let estimate = command.estimated_millis();
        ctrl.run(command, estimate).await?
    } else {
        ctrl.execute(command).await?
    };
    drop(ctrl);
    if let Some(handle) = watcher {
        let _ = handle.await;
    }
    Ok(state)
}

/// JSON document printed by `--json`.
#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    state: &'a SessionState,
    statistics: Vec<metrics::SeriesStatistics>,
    config: &'a SessionConfig,
}

async fn run_json(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let state = run_once(&cfg, args.enable_motor, None).await?;
    let report = JsonReport {
        state: &state,
        statistics: metrics::compute_statistics(&state.series()),
        config: &cfg,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    finish(&state)
}

async fn run_text(args: Cli) -> Result<()> {
    let cfg = build_config(&args);
    let (out_tx, out_handle) = spawn_report_writer();
    let res = run_once(&cfg, args.enable_motor, Some(out_tx.clone())).await;

    let state = match res {
        Ok(state) => state,
        Err(e) => {
            drop(out_tx);
            let _ = out_handle.await;
            return Err(e);
        }
    };
    let summary = crate::text_summary::build_text_summary(&cfg, &state);
    for line in summary.lines {
        let _ = out_tx.send(ReportLine::Summary(line));
    }
    drop(out_tx);
    let _ = out_handle.await;
    finish(&state)
}

/// A failed operation turns into a non-zero exit status.
fn finish(state: &SessionState) -> Result<()> {
    match state.phase {
        SessionPhase::Failed => Err(anyhow::anyhow!(
            "{} failed: {}",
            state.command.unwrap_or("operation"),
            state.status_message
        )),
        _ => Ok(()),
    }
}
