//! Deployment orchestrator: owns the run lock, resolves the step list for a
//! requested mode, and drives the steps sequentially on a background task
//! while publishing progress to the event bus.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{info, warn};

use crate::bus::{Event, EventBus, EventTap};
use crate::catalog::{Mode, Step, StepCatalog};
use crate::classify::classify;
use crate::errors::StartError;
use crate::runner::StepRunner;
use crate::state::{RunGuard, RunSnapshot, RunState, RunStatus};

/// Environment variable carrying the run-scoped infrastructure secret into
/// child scripts. Never written to any persisted artifact.
pub const SECRET_ENV_VAR: &str = "PRISM_CENTRAL_PASSWORD";

/// What a successful start request hands back to the caller: the accepted
/// mode and the resolved step labels, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct StartReceipt {
    pub mode: Mode,
    pub phases: Vec<String>,
}

pub struct Orchestrator {
    catalog: StepCatalog,
    runner: Arc<dyn StepRunner>,
    state: Arc<RunState>,
    bus: EventBus,
    work_dir: PathBuf,
}

impl Orchestrator {
    pub fn new(catalog: StepCatalog, runner: Arc<dyn StepRunner>, work_dir: PathBuf) -> Self {
        Self {
            catalog,
            runner,
            state: Arc::new(RunState::new()),
            bus: EventBus::new(),
            work_dir,
        }
    }

    pub fn subscribe(&self) -> EventTap {
        self.bus.subscribe()
    }

    pub fn snapshot(&self) -> RunSnapshot {
        self.state.snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Begin a deployment run.
    ///
    /// Steps are resolved before the lock is taken, so a malformed request
    /// fails fast without consuming the single run slot. On success the run
    /// continues on a background task; the receipt reflects what was actually
    /// scheduled (automated mode ignores any requested subset).
    pub fn start(
        &self,
        mode: Mode,
        requested: Option<&[String]>,
        secret: Option<String>,
    ) -> Result<StartReceipt, StartError> {
        let steps = self.catalog.resolve(mode, requested)?;
        let guard = self
            .state
            .try_begin(mode)
            .ok_or(StartError::AlreadyRunning)?;

        let phases: Vec<String> = steps.iter().map(|s| s.label.clone()).collect();
        info!(mode = mode.as_str(), steps = steps.len(), "starting deployment run");

        let extra_env = match secret {
            Some(value) => vec![(SECRET_ENV_VAR.to_string(), value)],
            None => Vec::new(),
        };

        let runner = Arc::clone(&self.runner);
        let state = Arc::clone(&self.state);
        let bus = self.bus.clone();
        let work_dir = self.work_dir.clone();
        tokio::spawn(run_steps(runner, state, bus, work_dir, mode, steps, extra_env, guard));

        Ok(StartReceipt { mode, phases })
    }
}

/// The run routine. Holds the guard for the whole run so the lock is
/// released no matter how this task exits.
#[allow(clippy::too_many_arguments)]
async fn run_steps(
    runner: Arc<dyn StepRunner>,
    state: Arc<RunState>,
    bus: EventBus,
    work_dir: PathBuf,
    mode: Mode,
    steps: Vec<Step>,
    extra_env: Vec<(String, String)>,
    guard: RunGuard,
) {
    let _guard = guard;
    let total = steps.len() as f32;

    // Phase events are deduplicated for the whole run: a label is published
    // only when it differs from the previously published one, so a burst of
    // lines from the same phase yields a single event.
    let phase_cursor: Mutex<Option<String>> = Mutex::new(None);
    let publish_phase = |label: &str| {
        let mut cursor = phase_cursor.lock().expect("phase cursor poisoned");
        if cursor.as_deref() != Some(label) {
            *cursor = Some(label.to_string());
            bus.publish(Event::phase(label));
        }
    };

    let on_line = |line: String| {
        if let Some(label) = classify(&line, mode) {
            publish_phase(label);
        }
        bus.publish(Event::log(line));
    };

    for (index, step) in steps.iter().enumerate() {
        let begun = (index as f32 / total) * 100.0;
        publish_phase(&step.label);
        bus.publish(Event::status(format!("running {}", step.label)));
        state.update(begun, RunStatus::Running, &step.label);
        bus.publish(Event::progress(begun, RunStatus::Running, &step.label));
        info!(step = %step.label, "running deployment step");

        let outcome = runner
            .run(&step.argv, &work_dir, &extra_env, &on_line)
            .await;

        // A step that ran to a verdict counts toward progress whether it
        // passed or failed.
        let finished = ((index + 1) as f32 / total) * 100.0;
        match outcome {
            Ok(0) => {
                bus.publish(Event::status(format!("{} complete", step.label)));
                state.update(finished, RunStatus::Running, &step.label);
                bus.publish(Event::progress(finished, RunStatus::Running, &step.label));
            }
            Ok(code) => {
                warn!(step = %step.label, code, "deployment step failed");
                bus.publish(Event::status(format!(
                    "{} failed with exit code {code}",
                    step.label
                )));
                state.update(finished, RunStatus::Error, &step.label);
                bus.publish(Event::progress(finished, RunStatus::Error, &step.label));
                return;
            }
            Err(err) => {
                warn!(step = %step.label, error = %err, "deployment step could not run");
                bus.publish(Event::status(format!("{} failed: {err}", step.label)));
                state.update(finished, RunStatus::Error, &step.label);
                bus.publish(Event::progress(finished, RunStatus::Error, &step.label));
                return;
            }
        }
    }

    info!("deployment run complete");
    bus.publish(Event::status("deployment complete"));
    state.update(100.0, RunStatus::Complete, "deployment complete");
    bus.publish(Event::progress(100.0, RunStatus::Complete, "deployment complete"));
}
