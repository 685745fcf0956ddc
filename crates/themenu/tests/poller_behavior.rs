use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use themenu::config::ItemConfig;
use themenu::error::CommandError;
use themenu::poller::CommandPoller;

#[test]
fn structured_command_runs_and_caches() {
    let item: ItemConfig = serde_json::from_str(
        r#"{"label_command": {"cmd": "echo hi", "update_interval": "1s", "timeout": "2s"}}"#,
    )
    .unwrap();
    let spec = item.label_command.unwrap();
    assert_eq!(spec.update_interval, Duration::from_secs(1));
    assert_eq!(spec.timeout, Duration::from_secs(2));

    let poller = CommandPoller::new(spec);
    poller.execute_now().expect("echo runs");
    assert_eq!(poller.last_output().as_deref(), Some("hi"));
}

#[test]
fn slow_command_times_out_promptly() {
    let item: ItemConfig =
        serde_json::from_str(r#"{"command": {"cmd": "sleep 5", "timeout": "100ms"}}"#).unwrap();
    let poller = CommandPoller::new(item.command.unwrap());
    let start = Instant::now();
    let err = poller.execute_now().unwrap_err();
    assert!(start.elapsed() < Duration::from_secs(3), "took {:?}", start.elapsed());
    assert_eq!(err, CommandError::CommandTimedOut(Duration::from_millis(100)));
    assert_eq!(poller.last_error(), Some(err));
    assert!(!poller.busy());
}

#[test]
fn missing_program_is_reported_as_output() {
    // `sh` itself starts fine; the shell reports the unknown program.
    let item: ItemConfig =
        serde_json::from_str(r#"{"command": "definitely-not-a-real-program-xyz"}"#).unwrap();
    let poller = CommandPoller::new(item.command.unwrap());
    let out = poller.execute_now().expect("shell starts");
    assert!(out.contains("not found") || out.contains("definitely-not"), "{out}");
}

#[test]
fn overlapping_runs_never_mix_output() {
    let item: ItemConfig =
        serde_json::from_str(r#"{"command": "printf start; sleep 0.2; printf end"}"#).unwrap();
    let poller = Arc::new(CommandPoller::new(item.command.unwrap()));
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let p = Arc::clone(&poller);
            thread::spawn(move || p.execute_now())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().as_deref(), Ok("startend"));
    }
    assert_eq!(poller.last_output().as_deref(), Some("startend"));
    assert_eq!(poller.completed_runs(), 4);
    assert!(!poller.busy());
}
