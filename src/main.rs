//! Command line front end: run a batch of commands in an interactive
//! program, or attach the local terminal to it.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use interactrust::{
    batch_passed, BatchOptions, BatchStep, Config, ConsoleSink, Expect, Pattern, Session,
    SessionBuilder,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

#[derive(Parser)]
#[command(name = "interactrust")]
#[command(author, version, about = "Drive interactive programs expect-style", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run commands in the program and check their output
    Run(RunArgs),
    /// Attach the terminal to the program (detach with Ctrl-])
    Console(ConsoleArgs),
}

#[derive(Args)]
struct SessionArgs {
    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Prompt regex that ends each command
    #[arg(long)]
    prompt: Option<String>,

    /// Run the program on a pseudo-terminal
    #[arg(long)]
    pty: bool,

    /// Run the program line through the system shell
    #[arg(long)]
    shell: bool,

    /// Timeout of each command, in seconds
    #[arg(long, value_parser = parse_seconds)]
    timeout: Option<Duration>,

    /// End a command once output has been idle this many seconds
    #[arg(long, value_parser = parse_seconds)]
    idle_timeout: Option<Duration>,

    /// Program to start, after `--`
    #[arg(last = true)]
    program: Vec<String>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Command to run; repeat for more. `# text` prints a comment
    #[arg(short = 'c', long = "cmd")]
    commands: Vec<String>,

    /// Stop at the first command whose pass pattern is not found
    #[arg(long)]
    stop_on_error: bool,

    /// Do not print passing checks
    #[arg(long)]
    hide_pass: bool,
}

#[derive(Args)]
struct ConsoleArgs {
    #[command(flatten)]
    session: SessionArgs,

    /// Command to run once attached
    #[arg(short = 'c', long = "cmd")]
    command: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interactrust=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run(args) => run(args).await,
        Command::Console(args) => console(args).await,
    }
}

/// Seconds as a duration; negative, NaN and out-of-range values are rejected.
fn parse_seconds(value: &str) -> Result<Duration, String> {
    let secs: f64 = value
        .parse()
        .map_err(|e| format!("{:?} is not a number: {}", value, e))?;
    if secs < 0.0 {
        return Err(format!("{} is negative", value));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| format!("{}: {}", value, e))
}

/// Configuration file (if any) overlaid with the command line flags.
fn load(args: &SessionArgs) -> Result<(Config, SessionBuilder, String)> {
    let config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let mut builder = SessionBuilder::from_config(&config.session)?.sink(Arc::new(ConsoleSink));

    if let Some(prompt) = &args.prompt {
        let prompt = Pattern::regex(prompt).with_context(|| format!("invalid prompt {:?}", prompt))?;
        builder = builder.prompt(prompt);
    }
    if args.pty {
        builder = builder.pty(true);
    }
    if args.shell {
        builder = builder.shell(true);
    }
    if let Some(timeout) = args.timeout {
        builder = builder.timeout(timeout);
    }
    if let Some(idle) = args.idle_timeout {
        builder = builder.idle_timeout(idle);
    }

    let program = if args.program.is_empty() {
        config.session.command.clone().unwrap_or_default()
    } else {
        shell_words::join(&args.program)
    };
    if program.trim().is_empty() {
        bail!("no program given; pass it after `--` or set session.command in the config");
    }
    Ok((config, builder, program))
}

async fn run(args: RunArgs) -> Result<()> {
    let (config, builder, program) = load(&args.session)?;
    let mut session = builder.spawn(&program).await?;

    let steps: Vec<BatchStep> = config
        .batch
        .steps
        .iter()
        .map(BatchStep::from)
        .chain(args.commands.iter().map(|c| BatchStep::from(c.as_str())))
        .collect();
    debug!(steps = steps.len(), %program, "running batch");

    let opts = BatchOptions::new()
        .stop_on_error(args.stop_on_error || config.batch.stop_on_error)
        .hide_pass(args.hide_pass || config.batch.hide_pass);
    let records = session.cmd_batch(steps, opts).await?;
    session.close();

    if !batch_passed(&records) {
        let failed = records.iter().filter(|r| !r.passed()).count();
        bail!("{} of {} steps failed", failed, records.len());
    }
    Ok(())
}

async fn console(args: ConsoleArgs) -> Result<()> {
    let (_, builder, program) = load(&args.session)?;
    let mut session: Session = builder.spawn(&program).await?;

    let outcome = session
        .console(args.command.as_deref(), Expect::Nothing)
        .await?;
    if !outcome.detached() {
        debug!(ended = ?outcome.output.ended, "console ended without detach");
    }
    session.close();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("1.5"), Ok(Duration::from_millis(1500)));
        assert!(parse_seconds("inf").is_err());
        assert!(parse_seconds("NaN").is_err());
        assert!(parse_seconds("-2").is_err());
        assert!(parse_seconds("soon").is_err());
    }

    #[test]
    fn test_program_words_survive_rejoin() {
        let program = vec!["grep".to_string(), "a b".to_string(), "file".to_string()];
        let line = shell_words::join(&program);
        assert_eq!(interactrust::LaunchSpec::new(line).argv().unwrap(), program);
    }
}
