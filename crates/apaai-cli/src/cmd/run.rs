use crate::cmd::action::ActionArgs;
use crate::output::print_json;
use crate::settings::{self, Globals};
use anyhow::Context;
use apaai_client::{new_action_id, Check, GatedAction, PollOptions, ACTION_EXECUTED};
use clap::{Args, ValueEnum};
use std::process::ExitStatus;
use std::time::Duration;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum WaitMode {
    /// Poll the action until it is approved, rejected or the timeout passes
    Poll,
    /// Run immediately even when approval is required
    None,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub action: ActionArgs,

    /// What to do when the service requires approval
    #[arg(long, value_enum, default_value_t = WaitMode::Poll)]
    pub wait: WaitMode,

    /// Seconds between status polls
    #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Give up waiting for approval after this many seconds
    #[arg(long, default_value_t = 300)]
    pub timeout: u64,

    /// Command to execute once cleared, given after `--`
    #[arg(last = true, required = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Gate `args.command` through the accountability layer.
///
/// The command inherits stdio. A non-zero exit is recorded as a failed
/// `action_failed` check and reported as an error.
pub fn run(globals: &Globals, args: RunArgs, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let (program, rest) = args
        .command
        .split_first()
        .context("no command given after `--`")?;
    let program = program.clone();
    let rest = rest.to_vec();

    let mut request = args.action.into_request();
    let action_id = request.id.get_or_insert_with(new_action_id).clone();

    let shown = program.clone();
    let mut gate = GatedAction::new(request).on_success(move |status: &ExitStatus| {
        vec![Check::passed(ACTION_EXECUTED).with_note(format!("{shown} {status}"))]
    });
    if args.wait == WaitMode::Poll {
        gate = gate.poll_approval(PollOptions::new(
            Duration::from_secs(args.interval),
            Duration::from_secs(args.timeout),
        ));
    }

    tracing::info!(action_id = %action_id, command = %program, "running gated command");
    let status = settings::block_on(gate.run(&client, || async move {
        let status = tokio::process::Command::new(&program)
            .args(&rest)
            .status()
            .await
            .with_context(|| format!("failed to start '{program}'"))?;
        anyhow::ensure!(status.success(), "'{program}' {status}");
        Ok::<_, anyhow::Error>(status)
    }))
    .with_context(|| format!("gated action '{action_id}' failed"))?;

    if json {
        print_json(&serde_json::json!({
            "actionId": action_id,
            "exitCode": status.code(),
        }))?;
    } else {
        println!("Action {action_id} executed ({status})");
    }
    Ok(())
}
