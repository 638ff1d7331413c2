//! Example demonstrating control characters
//!
//! Shows the built-in Ctrl-C, Ctrl-D helpers, raw byte input, and the
//! semantic interrupt used on sessions without a terminal.

use anyhow::Result;
use interactrust::{ConsoleSink, Pattern, SendOptions, Session, Timeout};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    println!("Control Character Examples");
    println!("{}", "=".repeat(50));

    // Example 1: carriage return vs newline on a terminal
    println!("\n1. Carriage Return vs Newline");
    let mut cat = Session::builder()
        .pty(true)
        .timeout(Duration::from_secs(5))
        .sink(Arc::new(ConsoleSink))
        .spawn("cat")
        .await?;

    cat.send(
        "Line with CR\r",
        SendOptions::new().expect(Pattern::exact("Line with CR")),
    )
    .await?;
    println!("   ✓ Sent: 'Line with CR\\r'");

    cat.send(
        "Line with LF\n",
        SendOptions::new().expect(Pattern::exact("Line with LF")),
    )
    .await?;
    println!("   ✓ Sent: 'Line with LF\\n'");

    // Ctrl-D at the start of a line ends cat
    let output = cat
        .ctrl_d(SendOptions::new().no_expect().timeout(Timeout::secs(1.0)))
        .await?;
    println!("   ✓ Sent Ctrl-D, cat ended by {:?}", output.ended);

    // Example 2: Ctrl-C interrupts the foreground job of a shell
    println!("\n2. Interrupting a running command");
    let mut shell = Session::builder()
        .prompt(Pattern::regex(r"\$ $")?)
        .pty(true)
        .env("PS1", "$ ")
        .flush_on_connect(true)
        .sink(Arc::new(ConsoleSink))
        .spawn("sh -i")
        .await?;

    shell
        .cmd("sleep 30", SendOptions::new().timeout(Timeout::secs(0.5)))
        .await?;
    let output = shell.ctrl_c(SendOptions::default()).await?;
    println!("   ✓ Back at the prompt: {}", output.is_match());

    // Example 3: raw escape sequences are plain bytes
    println!("\n3. ANSI Escape Sequences");
    shell
        .send(b"printf '\\033[1mbold\\033[0m\\n'\n", SendOptions::default())
        .await?;
    println!("   ✓ Sent a command printing an escape sequence");

    // Example 4: without a terminal, interrupt() delivers SIGINT
    println!("\n4. Interrupting a pipe session");
    let mut piped = Session::builder()
        .sink(Arc::new(ConsoleSink))
        .spawn("sleep 30")
        .await?;
    piped.interrupt().await?;
    let output = piped
        .expect(interactrust::Expect::Nothing, Timeout::secs(2.0))
        .await?;
    println!("   ✓ sleep ended by {:?}, exit {:?}", output.ended, piped.exit_status());

    println!("\n✓ Control character examples complete!");
    Ok(())
}
