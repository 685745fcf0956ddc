use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{debug, warn};

use crate::config::CommandSpec;
use crate::error::CommandError;
use crate::runner::run_shell;

pub type RunResult = Result<String, CommandError>;

#[derive(Default)]
struct PollerState {
    // A counter rather than a flag: overlapping runs are allowed, and the
    // poller is busy until the last of them finishes.
    in_flight: AtomicUsize,
    last: Mutex<Option<RunResult>>,
    completed: AtomicU64,
}

// Marks one run in flight for as long as it lives, including on unwind.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }

    // Only claims the slot when nothing else is running.
    fn try_enter(counter: &'a AtomicUsize) -> Option<Self> {
        counter
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self(counter))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// Dropping the sender wakes the schedule thread with `Disconnected`, which ends it.
struct Schedule {
    _cancel: mpsc::Sender<()>,
    thread: thread::JoinHandle<()>,
}

/// Keeps the cached result of one shell command fresh.
///
/// The UI only ever reads the cached result and the busy flag; all process
/// work happens on the schedule thread or on whichever thread calls
/// [`CommandPoller::execute_now`].
pub struct CommandPoller {
    spec: Arc<CommandSpec>,
    state: Arc<PollerState>,
    schedule: Mutex<Option<Schedule>>,
}

impl CommandPoller {
    pub fn new(spec: CommandSpec) -> Self {
        Self {
            spec: Arc::new(spec),
            state: Arc::new(PollerState::default()),
            schedule: Mutex::new(None),
        }
    }

    pub fn spec(&self) -> &CommandSpec {
        &self.spec
    }

    /// Run once right away in the background, then every `update_interval`
    /// (if non-zero) until stopped. Any previous schedule is cancelled first.
    pub fn start(&self) {
        let Ok(mut slot) = self.schedule.lock() else {
            return;
        };
        slot.take();

        let (tx, rx) = mpsc::channel::<()>();
        let spec = Arc::clone(&self.spec);
        let state = Arc::clone(&self.state);
        let spawned = thread::Builder::new()
            .name("themenu-poller".into())
            .spawn(move || schedule_loop(&spec, &state, &rx));
        match spawned {
            Ok(thread) => {
                *slot = Some(Schedule {
                    _cancel: tx,
                    thread,
                })
            }
            Err(e) => warn!(
                command = %self.spec.shell_command,
                error = %e,
                "failed to start poller thread"
            ),
        }
    }

    /// Cancel future scheduled runs. A run already in flight is left to finish.
    pub fn stop(&self) {
        if let Ok(mut slot) = self.schedule.lock() {
            slot.take();
        }
    }

    /// Cancel the current schedule and start a fresh one, so the next
    /// reading comes now instead of at the next natural tick.
    pub fn reset_timer(&self) {
        self.stop();
        self.start();
    }

    /// Whether a schedule thread is still alive. A zero-interval schedule
    /// ends on its own after its single run.
    pub fn is_scheduled(&self) -> bool {
        self.schedule
            .lock()
            .map(|g| g.as_ref().is_some_and(|s| !s.thread.is_finished()))
            .unwrap_or(false)
    }

    /// Run the command on the calling thread and cache the result.
    ///
    /// Concurrent calls are not serialized; whichever run completes last
    /// owns the cached result.
    pub fn execute_now(&self) -> RunResult {
        let _guard = InFlight::enter(&self.state.in_flight);
        execute(&self.spec, &self.state)
    }

    pub fn busy(&self) -> bool {
        self.state.in_flight.load(Ordering::SeqCst) > 0
    }

    pub fn last_result(&self) -> Option<RunResult> {
        self.state.last.lock().ok().and_then(|g| g.clone())
    }

    pub fn last_output(&self) -> Option<String> {
        self.last_result().and_then(Result::ok)
    }

    pub fn last_error(&self) -> Option<CommandError> {
        self.last_result().and_then(Result::err)
    }

    pub fn completed_runs(&self) -> u64 {
        self.state.completed.load(Ordering::SeqCst)
    }
}

impl Drop for CommandPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn schedule_loop(spec: &CommandSpec, state: &PollerState, cancel: &mpsc::Receiver<()>) {
    loop {
        match InFlight::try_enter(&state.in_flight) {
            Some(_guard) => {
                if let Err(e) = execute(spec, state) {
                    warn!(command = %spec.shell_command, error = %e, "command failed");
                }
            }
            None => debug!(command = %spec.shell_command, "previous run still busy; skipping tick"),
        }

        if spec.update_interval.is_zero() {
            return;
        }
        match cancel.recv_timeout(spec.update_interval) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
        }
    }
}

fn execute(spec: &CommandSpec, state: &PollerState) -> RunResult {
    let result = run_shell(&spec.shell_command, spec.timeout).map(|out| out.text);
    if let Ok(mut last) = state.last.lock() {
        *last = Some(result.clone());
    }
    state.completed.fetch_add(1, Ordering::SeqCst);
    result
}

#[cfg(test)]
mod tests {
    use super::CommandPoller;
    use crate::config::CommandSpec;
    use crate::error::CommandError;
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    fn wait_for(mut cond: impl FnMut() -> bool, limit: Duration) -> bool {
        let start = Instant::now();
        while start.elapsed() < limit {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(10));
        }
        cond()
    }

    #[test]
    fn execute_now_caches_output() {
        let p = CommandPoller::new(CommandSpec::new("echo hi"));
        assert_eq!(p.last_result(), None);
        assert_eq!(p.execute_now(), Ok("hi".to_string()));
        assert_eq!(p.last_output().as_deref(), Some("hi"));
        assert_eq!(p.last_error(), None);
        assert!(!p.busy());
        assert_eq!(p.completed_runs(), 1);
    }

    #[test]
    fn error_replaces_previous_output() {
        let dir = tempfile::tempdir().unwrap();
        let flag = dir.path().join("slow");
        let p = CommandPoller::new(
            CommandSpec::new(format!(
                "if [ -e '{}' ]; then sleep 5; fi; echo ok",
                flag.display()
            ))
            .with_timeout(Duration::from_millis(300)),
        );
        p.execute_now().unwrap();
        assert_eq!(p.last_output().as_deref(), Some("ok"));

        std::fs::write(&flag, "").unwrap();
        let _ = p.execute_now();
        assert!(matches!(
            p.last_error(),
            Some(CommandError::CommandTimedOut(_))
        ));
        assert_eq!(p.last_output(), None);
    }

    #[test]
    fn zero_interval_runs_exactly_once() {
        let p = CommandPoller::new(CommandSpec::new("echo once"));
        p.start();
        assert!(wait_for(|| p.completed_runs() == 1, Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(300));
        assert_eq!(p.completed_runs(), 1);
        assert!(wait_for(|| !p.is_scheduled(), Duration::from_secs(2)));
    }

    #[test]
    fn interval_keeps_running_until_stopped() {
        let p = CommandPoller::new(CommandSpec::new("echo tick").every(Duration::from_millis(50)));
        p.start();
        assert!(wait_for(|| p.completed_runs() >= 3, Duration::from_secs(5)));
        p.stop();
        assert!(!p.is_scheduled());
        // Allow one in-flight run to land, then the count must stay put.
        thread::sleep(Duration::from_millis(150));
        let settled = p.completed_runs();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(p.completed_runs(), settled);
    }

    #[test]
    fn reset_timer_runs_immediately() {
        let p = CommandPoller::new(CommandSpec::new("echo r").every(Duration::from_secs(60)));
        p.start();
        assert!(wait_for(|| p.completed_runs() == 1, Duration::from_secs(5)));
        p.reset_timer();
        assert!(wait_for(|| p.completed_runs() == 2, Duration::from_secs(5)));
        assert!(p.is_scheduled());
    }

    #[test]
    fn ticks_skip_while_a_run_is_in_flight() {
        let p = Arc::new(CommandPoller::new(
            CommandSpec::new("sleep 0.4; echo slow").every(Duration::from_millis(50)),
        ));
        let bg = Arc::clone(&p);
        let manual = thread::spawn(move || bg.execute_now());
        assert!(wait_for(|| p.busy(), Duration::from_secs(2)));

        p.start();
        thread::sleep(Duration::from_millis(200));
        assert_eq!(p.completed_runs(), 0);

        manual.join().unwrap().unwrap();
        // Every tick during the manual run was skipped, so nothing else has finished.
        assert_eq!(p.completed_runs(), 1);
        assert!(wait_for(|| p.completed_runs() >= 2, Duration::from_secs(5)));
        p.stop();
    }

    #[test]
    fn reset_timer_during_a_run_keeps_a_fresh_schedule() {
        let p = CommandPoller::new(
            CommandSpec::new("sleep 0.3; echo r").every(Duration::from_millis(100)),
        );
        p.start();
        assert!(wait_for(|| p.busy(), Duration::from_secs(2)));
        p.reset_timer();
        assert!(p.is_scheduled());
        assert!(wait_for(|| p.completed_runs() >= 2, Duration::from_secs(5)));
        assert!(p.is_scheduled());
        p.stop();
    }

    #[test]
    fn busy_while_running() {
        let p = Arc::new(CommandPoller::new(CommandSpec::new("sleep 0.3; echo done")));
        let bg = Arc::clone(&p);
        let h = thread::spawn(move || bg.execute_now());
        assert!(wait_for(|| p.busy(), Duration::from_secs(2)));
        h.join().unwrap().unwrap();
        assert!(!p.busy());
    }
}
