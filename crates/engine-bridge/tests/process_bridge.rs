// crates/engine-bridge/tests/process_bridge.rs
//
// Drives real child processes through `EngineHandle`. The "engines" are
// small shell scripts run via `sh -c`.
#![cfg(unix)]

use std::time::Duration;

use engine_bridge::{BridgeError, EngineHandle, EngineId};

/// Echoes every command back as `got <cmd>` and exits on `quit`.
const ECHO_ENGINE: &str = r#"
while IFS= read -r line; do
  echo "got $line"
  if [ "$line" = "quit" ]; then exit 0; fi
done
"#;

fn spawn_script(id: u64, script: &str) -> EngineHandle {
    EngineHandle::spawn_with_args(EngineId(id), "/bin/sh", ["-c", script]).expect("spawn sh")
}

/// Call `read_line` until it yields a line or fails, like the broadcast loop does.
async fn pump(handle: &mut EngineHandle) -> Result<String, BridgeError> {
    for _ in 0..400 {
        if let Some(line) = handle.read_line()? {
            return Ok(line);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("{} produced nothing", handle.id());
}

/// Keep polling until the handle reports its process is gone.
async fn wait_for_exit(handle: &mut EngineHandle) -> BridgeError {
    for _ in 0..400 {
        match handle.read_line() {
            Ok(_) => tokio::time::sleep(Duration::from_millis(5)).await,
            Err(e) => return e,
        }
    }
    panic!("{} never exited", handle.id());
}

#[tokio::test]
async fn commands_arrive_in_enqueue_order_exactly_once() {
    let mut engine = spawn_script(1, ECHO_ENGINE);
    for cmd in ["uci", "isready", "position startpos", "go depth 1"] {
        engine.enqueue_command(cmd);
    }

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(pump(&mut engine).await.unwrap());
    }
    assert_eq!(
        seen,
        vec!["got uci", "got isready", "got position startpos", "got go depth 1"]
    );

    // Nothing else was written, so nothing else comes back.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(engine.read_line().unwrap(), None);
}

#[tokio::test]
async fn no_writes_after_quit_and_exit_is_graceful() {
    let mut engine = spawn_script(2, ECHO_ENGINE);
    engine.enqueue_command("isready");
    engine.enqueue_command("quit");
    engine.enqueue_command("go depth 5");

    assert_eq!(pump(&mut engine).await.unwrap(), "got isready");
    assert_eq!(pump(&mut engine).await.unwrap(), "got quit");
    assert!(engine.quit_sent());

    let err = wait_for_exit(&mut engine).await;
    assert!(err.is_graceful_exit(), "unexpected error: {err}");
}

#[tokio::test]
async fn crash_is_reported_after_last_output_is_drained() {
    let mut engine = spawn_script(3, "echo booting; exit 3");

    assert_eq!(pump(&mut engine).await.unwrap(), "booting");
    match wait_for_exit(&mut engine).await {
        BridgeError::EngineCrashed { engine, code } => {
            assert_eq!(engine, EngineId(3));
            assert_eq!(code, Some(3));
        }
        other => panic!("expected crash, got {other}"),
    }
}

/// Every line until the handle reports the exit, plus that exit.
async fn collect_until_exit(handle: &mut EngineHandle) -> (Vec<String>, BridgeError) {
    let deadline = std::time::Instant::now() + Duration::from_secs(10);
    let mut lines = Vec::new();
    while std::time::Instant::now() < deadline {
        match handle.read_line() {
            Ok(Some(line)) => lines.push(line),
            Ok(None) => tokio::time::sleep(Duration::from_millis(1)).await,
            Err(e) => return (lines, e),
        }
    }
    panic!("{} never exited", handle.id());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_printed_right_before_a_crash_is_delivered_in_full() {
    const BURST: &str = r#"i=0; while [ $i -lt 3000 ]; do echo "line$i"; i=$((i+1)); done; exit 3"#;

    for run in 0..5 {
        let mut engine = spawn_script(10 + run, BURST);
        let (lines, err) = collect_until_exit(&mut engine).await;

        assert_eq!(lines.len(), 3000, "run {run} lost output before {err}");
        assert_eq!(lines.first().map(String::as_str), Some("line0"));
        assert_eq!(lines.last().map(String::as_str), Some("line2999"));
        assert!(
            matches!(err, BridgeError::EngineCrashed { code: Some(3), .. }),
            "run {run}: unexpected error {err}"
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn final_line_before_quit_is_delivered() {
    let script = r#"IFS= read -r line; i=0; while [ $i -lt 500 ]; do echo "info $i"; i=$((i+1)); done; echo "bestmove e2e4"; exit 0"#;
    let mut engine = spawn_script(20, script);
    engine.enqueue_command("quit");

    let (lines, err) = collect_until_exit(&mut engine).await;
    assert_eq!(lines.last().map(String::as_str), Some("bestmove e2e4"));
    assert_eq!(lines.len(), 501);
    assert!(err.is_graceful_exit(), "unexpected error: {err}");
}

#[tokio::test]
async fn stderr_is_merged_into_output() {
    let mut engine = spawn_script(4, "echo 'info string oops' >&2; sleep 5");
    assert_eq!(pump(&mut engine).await.unwrap(), "info string oops");
}

#[tokio::test]
async fn idle_engine_does_not_block_polls() {
    let mut engine = spawn_script(5, "sleep 5");
    let started = std::time::Instant::now();
    for _ in 0..100 {
        assert_eq!(engine.read_line().unwrap(), None);
    }
    assert!(started.elapsed() < Duration::from_secs(1));
}
