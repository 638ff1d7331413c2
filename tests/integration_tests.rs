//! Integration tests against real processes

#![cfg(unix)]

use interactrust::{
    batch_passed, BatchOptions, BatchStep, CaptureSink, ConnectionState, EndReason, Expect,
    Pattern, PollOptions, SendOptions, Session, SessionError, SinkChannel, Stream, Timeout,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};

async fn shell() -> Session {
    Session::builder()
        .prompt(Pattern::regex(r"\$ $").expect("Invalid regex"))
        .pty(true)
        .env("PS1", "$ ")
        .timeout(Duration::from_secs(5))
        .flush_on_connect(true)
        .spawn("sh -i")
        .await
        .expect("Failed to spawn sh -i")
}

async fn piped_sh(sink: Arc<CaptureSink>) -> Session {
    Session::builder()
        .timeout(Duration::from_secs(5))
        .sink(sink)
        .spawn("sh")
        .await
        .expect("Failed to spawn sh")
}

#[tokio::test]
async fn test_echo_on_stdout() {
    let mut session = piped_sh(Arc::new(CaptureSink::new())).await;

    let output = assert_ok!(
        session
            .cmd("echo hello world", SendOptions::new().expect(Pattern::exact("world")))
            .await
    );

    assert_eq!(output.ended, EndReason::Matched);
    assert_eq!(output.matched, Some(Stream::Stdout));
    assert!(output.stdout.contains("hello world"));
}

#[tokio::test]
async fn test_match_on_stderr() {
    let mut session = piped_sh(Arc::new(CaptureSink::new())).await;

    let output = assert_ok!(
        session
            .cmd(
                "echo oops 1>&2",
                SendOptions::new().expect(Pattern::regex(r"o(o)ps").expect("Invalid regex")),
            )
            .await
    );

    assert_eq!(output.matched, Some(Stream::Stderr));
    assert_eq!(output.captures, vec!["oops".to_string(), "o".to_string()]);
    assert!(output.stdout.is_empty());
}

#[tokio::test]
async fn test_timeout_returns_partial_output() {
    let sink = Arc::new(CaptureSink::new());
    let mut session = piped_sh(Arc::clone(&sink)).await;

    let output = assert_ok!(
        session
            .cmd(
                "echo partial; sleep 5",
                SendOptions::new()
                    .expect(Pattern::exact("never printed"))
                    .timeout(Timeout::secs(0.5)),
            )
            .await
    );

    assert_eq!(output.ended, EndReason::Timeout);
    assert!(output.stdout.contains("partial"));
    assert!(sink.text(SinkChannel::Warn).contains("timed out"));
}

#[tokio::test]
async fn test_idle_timeout_after_first_output() {
    let mut session = piped_sh(Arc::new(CaptureSink::new())).await;

    let start = Instant::now();
    let output = assert_ok!(
        session
            .cmd(
                "echo a; sleep 3",
                SendOptions::new()
                    .no_expect()
                    .timeout(Timeout::secs(10.0))
                    .idle_timeout(Duration::from_millis(500)),
            )
            .await
    );

    assert_eq!(output.ended, EndReason::IdleTimeout);
    assert!(output.stdout.contains('a'));
    assert!(start.elapsed() < Duration::from_secs(3));
}

#[tokio::test]
async fn test_exit_drops_connection_and_reconnect() {
    let sink = Arc::new(CaptureSink::new());
    let mut session = piped_sh(Arc::clone(&sink)).await;

    let output = assert_ok!(
        session
            .cmd("exit 3", SendOptions::new().no_expect().timeout(Timeout::Forever))
            .await
    );
    assert_eq!(output.ended, EndReason::ProcessExited);
    assert_eq!(session.exit_status(), Some(3));
    assert_eq!(session.state(), ConnectionState::Dropped);

    let err = assert_err!(session.cmd("echo again", SendOptions::default()).await);
    assert!(matches!(err, SessionError::ConnectionDropped { .. }));
    assert!(sink.text(SinkChannel::Error).contains("not alive"));

    assert_ok!(session.reconnect().await);
    assert!(session.is_alive());
    let output = assert_ok!(
        session
            .cmd("echo back", SendOptions::new().expect(Pattern::exact("back")))
            .await
    );
    assert!(output.is_match());
}

#[tokio::test]
async fn test_cat_echoes_lines() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .sink(Arc::new(CaptureSink::new()))
        .spawn("cat")
        .await
        .expect("Failed to spawn cat");

    let output = assert_ok!(
        session
            .send("ping\n", SendOptions::new().expect(Pattern::exact("ping\n")))
            .await
    );
    assert_eq!(output.stdout, "ping\n");
}

#[tokio::test]
async fn test_interrupt_without_terminal() {
    let mut session = Session::builder()
        .sink(Arc::new(CaptureSink::new()))
        .spawn("sleep 30")
        .await
        .expect("Failed to spawn sleep");
    assert!(!session.on_terminal());

    assert_ok!(session.interrupt().await);
    let output = assert_ok!(session.expect(Expect::Nothing, Timeout::secs(5.0)).await);

    assert_eq!(output.ended, EndReason::ProcessExited);
    assert!(!session.is_alive());
}

#[tokio::test]
async fn test_interactive_shell_prompt() {
    let mut session = shell().await;
    assert!(session.on_terminal());

    let output = assert_ok!(session.cmd("echo hi-there", SendOptions::default()).await);

    assert!(output.is_match());
    assert!(output.stdout.contains("hi-there"));
    assert!(output.stdout.ends_with("$ "));
}

#[tokio::test]
async fn test_ctrl_c_interrupts_foreground_command() {
    let mut session = shell().await;

    let output = assert_ok!(
        session
            .cmd("sleep 30", SendOptions::new().timeout(Timeout::secs(0.5)))
            .await
    );
    assert_eq!(output.ended, EndReason::Timeout);

    let output = assert_ok!(session.ctrl_c(SendOptions::default()).await);
    assert!(output.is_match());
    assert!(session.is_alive());
}

#[tokio::test]
async fn test_batch_on_shell() {
    let mut session = shell().await;

    let records = assert_ok!(
        session
            .cmd_batch(
                vec![
                    BatchStep::from("# greet"),
                    BatchStep::checked("echo hello", r"hello\r?\n"),
                    BatchStep::command("true"),
                ],
                BatchOptions::new().stop_on_error(true),
            )
            .await
    );

    assert_eq!(records.len(), 3);
    assert_eq!(records[1].result, Some(true));
    assert!(batch_passed(&records));
}

#[tokio::test]
async fn test_poll_until_counter_reaches_value() {
    let mut session = shell().await;
    assert_ok!(session.cmd("n=0", SendOptions::default()).await);

    let outcome = assert_ok!(
        session
            .cmd_poll(
                "n=$((n+1)); echo count=$n",
                r"count=3\r?\n",
                PollOptions {
                    max_times: 5,
                    interval: Duration::from_millis(50),
                    ..PollOptions::default()
                },
            )
            .await
    );

    assert!(outcome.found);
    assert_eq!(outcome.attempts, 3);
}

#[tokio::test]
async fn test_quoted_arguments_reach_the_program() {
    let mut session = Session::builder()
        .timeout(Duration::from_secs(5))
        .sink(Arc::new(CaptureSink::new()))
        .spawn(r#"sh -c 'echo "two  spaces"; cat'"#)
        .await
        .expect("Failed to spawn sh -c");

    let output = assert_ok!(
        session
            .expect(Pattern::exact("two  spaces\n"), Timeout::secs(5.0))
            .await
    );
    assert!(output.is_match());
}
