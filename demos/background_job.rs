//! Background job example
//!
//! Starts `vmstat 1` as a shell job, keeps using the shell while it
//! runs, then stops it and prints what it wrote.

use interactrust::{ConsoleSink, Expect, Pattern, SendOptions, Session, Timeout};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut session = Session::builder()
        .prompt(Pattern::regex(r"\$ $")?)
        .pty(true)
        .env("PS1", "$ ")
        .flush_on_connect(true)
        .sink(Arc::new(ConsoleSink))
        .spawn("sh -i")
        .await?;

    let mut job = session
        .background_job(
            "vmstat 1",
            Expect::Prompt,
            Timeout::secs(1.0),
        )
        .await?;
    println!("job pid: {:?}", job.pid());

    job.session().cmd("echo still interactive", SendOptions::default()).await?;
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    job.session().check_outputs().await?;

    let transcript = job.stop().await?;
    println!(
        "\njob wrote {} lines",
        transcript.stdout.lines().count()
    );
    Ok(())
}
