//! Interactive shell example

use interactrust::{ConsoleSink, Pattern, SendOptions, Session, Timeout};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("interactrust - Interactive Shell Example");
    println!("{}", "=".repeat(50));

    // Start an interactive shell on a pseudo-terminal with a known prompt
    println!("\nStarting sh -i...");
    let mut session = Session::builder()
        .prompt(Pattern::regex(r"\$ $")?)
        .pty(true)
        .env("PS1", "$ ")
        .timeout(Duration::from_secs(10))
        .flush_on_connect(true)
        .scrollback(true)
        .sink(Arc::new(ConsoleSink))
        .spawn("sh -i")
        .await?;
    println!("✓ Got shell prompt");

    // A command and its output, up to the next prompt
    let output = session.cmd("echo Hello, interactrust!", SendOptions::default()).await?;
    println!("✓ Matched: {:?}", output.ended);

    // Regex captures
    let output = session
        .cmd(
            "echo pid=$$",
            SendOptions::new().expect(Pattern::regex(r"pid=(\d+)")?),
        )
        .await?;
    if let Some(pid) = output.captures.get(1) {
        println!("✓ Shell pid from output: {}", pid);
    }
    // The prompt after the match is still queued
    session.flush(SendOptions::default()).await?;

    // End a slow command once its output goes quiet
    let output = session
        .cmd(
            "for i in 1 2 3; do echo tick $i; sleep 0.2; done; sleep 5",
            SendOptions::new()
                .no_expect()
                .timeout(Timeout::secs(20.0))
                .idle_timeout(Duration::from_secs(1)),
        )
        .await?;
    println!("✓ Ended by {:?}", output.ended);
    session.ctrl_c(SendOptions::default()).await?;

    println!("\nScrollback has {} bytes", session.scrollback().len());

    session.cmd("exit", SendOptions::new().no_expect().timeout(Timeout::secs(1.0))).await?;
    println!("\n✓ Interactive shell example complete!");

    Ok(())
}
