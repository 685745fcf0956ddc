use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread;
use std::time::Duration;

use tracing::warn;

use crate::runner::run_shell;

pub const CONDITION_REFRESH: Duration = Duration::from_secs(2);

#[derive(Default)]
struct EvaluatorState {
    busy: AtomicBool,
    cached_output: Mutex<Option<String>>,
}

/// Re-evaluates one command every [`CONDITION_REFRESH`] and keeps its
/// trimmed output as a lookup key. Failed evaluations keep the old value.
pub struct ConditionEvaluator {
    command: String,
    state: Arc<EvaluatorState>,
    running: AtomicBool,
}

impl ConditionEvaluator {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            state: Arc::new(EvaluatorState::default()),
            running: AtomicBool::new(false),
        }
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Start the background refresh loop. Calling this more than once is a no-op.
    ///
    /// The loop holds only a weak reference, so it winds down after the
    /// evaluator is dropped; otherwise it lives as long as the process.
    pub fn run(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let command = self.command.clone();
        let state = Arc::downgrade(&self.state);
        let spawned = thread::Builder::new()
            .name("themenu-condition".into())
            .spawn(move || refresh_loop(&command, &state));
        if let Err(e) = spawned {
            self.running.store(false, Ordering::SeqCst);
            warn!(command = %self.command, error = %e, "failed to start condition thread");
        }
    }

    /// Evaluate once on the calling thread.
    pub fn evaluate_once(&self) {
        evaluate(&self.command, &self.state);
    }

    pub fn busy(&self) -> bool {
        self.state.busy.load(Ordering::SeqCst)
    }

    pub fn cached_output(&self) -> Option<String> {
        self.state.cached_output.lock().ok().and_then(|g| g.clone())
    }
}

fn refresh_loop(command: &str, state: &Weak<EvaluatorState>) {
    loop {
        let Some(state) = state.upgrade() else {
            return;
        };
        evaluate(command, &state);
        drop(state);
        thread::sleep(CONDITION_REFRESH);
    }
}

fn evaluate(command: &str, state: &EvaluatorState) {
    state.busy.store(true, Ordering::SeqCst);
    match run_shell(command, Duration::ZERO).and_then(|out| out.checked()) {
        Ok(text) => {
            if let Ok(mut cached) = state.cached_output.lock() {
                *cached = Some(text);
            }
        }
        Err(e) => warn!(command, error = %e, "error evaluating condition"),
    }
    state.busy.store(false, Ordering::SeqCst);
}
