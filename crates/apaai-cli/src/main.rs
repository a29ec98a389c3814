mod cmd;
mod output;
mod settings;

use clap::{Parser, Subcommand};
use cmd::{
    action::{ActionArgs, ActionSubcommand},
    agent::AgentSubcommand,
    config::ConfigSubcommand,
    policy::PolicySubcommand,
    run::RunArgs,
};
use settings::Globals;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "apaai",
    about = "Propose, approve and audit agent actions against an APAAI accountability layer",
    version,
    propagate_version = true
)]
struct Cli {
    /// Accountability layer URL (default: http://localhost:8787)
    #[arg(long, global = true, env = "APAAI_ENDPOINT")]
    endpoint: Option<String>,

    /// API key sent with every request
    #[arg(long, global = true, env = "APAAI_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Client config file (default: ~/.apaai/config.yaml)
    #[arg(long, global = true, env = "APAAI_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Propose an action and print the service's decision
    Propose(ActionArgs),

    /// Approve an action awaiting review
    Approve {
        action_id: String,
        /// Who is approving
        #[arg(long)]
        approver: Option<String>,
    },

    /// Reject an action awaiting review
    Reject {
        action_id: String,
        #[arg(long)]
        reason: Option<String>,
    },

    /// Record evidence checks for an action
    Evidence {
        action_id: String,
        /// Passed check as NAME or NAME=NOTE (repeatable)
        #[arg(long = "pass", value_name = "CHECK")]
        passed: Vec<String>,
        /// Failed check as NAME or NAME=NOTE (repeatable)
        #[arg(long = "fail", value_name = "CHECK")]
        failed: Vec<String>,
        /// Approver recorded on every check
        #[arg(long)]
        approver: Option<String>,
    },

    /// Poll an action until it is approved or rejected
    Wait {
        action_id: String,
        /// Seconds between polls
        #[arg(long, default_value_t = 5, value_parser = clap::value_parser!(u64).range(1..))]
        interval: u64,
        /// Give up after this many seconds
        #[arg(long, default_value_t = 300)]
        timeout: u64,
    },

    /// Gate a command: propose, wait for approval, run it, record evidence
    Run(RunArgs),

    /// Inspect actions
    Action {
        #[command(subcommand)]
        subcommand: ActionSubcommand,
    },

    /// Show or replace the policy
    Policy {
        #[command(subcommand)]
        subcommand: PolicySubcommand,
    },

    /// Manage registered agents
    Agent {
        #[command(subcommand)]
        subcommand: AgentSubcommand,
    },

    /// Inspect, write and validate the client config
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Run(_) | Commands::Wait { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let globals = Globals {
        endpoint: cli.endpoint,
        api_key: cli.api_key,
        config: cli.config,
    };
    let json = cli.json;

    let result = match cli.command {
        Commands::Propose(args) => cmd::action::propose(&globals, args, json),
        Commands::Approve {
            action_id,
            approver,
        } => cmd::review::approve(&globals, &action_id, approver.as_deref(), json),
        Commands::Reject { action_id, reason } => {
            cmd::review::reject(&globals, &action_id, reason.as_deref(), json)
        }
        Commands::Evidence {
            action_id,
            passed,
            failed,
            approver,
        } => cmd::evidence::run(
            &globals,
            &action_id,
            &passed,
            &failed,
            approver.as_deref(),
            json,
        ),
        Commands::Wait {
            action_id,
            interval,
            timeout,
        } => cmd::wait::run(&globals, &action_id, interval, timeout, json),
        Commands::Run(args) => cmd::run::run(&globals, args, json),
        Commands::Action { subcommand } => cmd::action::run(&globals, subcommand, json),
        Commands::Policy { subcommand } => cmd::policy::run(&globals, subcommand, json),
        Commands::Agent { subcommand } => cmd::agent::run(&globals, subcommand, json),
        Commands::Config { subcommand } => cmd::config::run(&globals, subcommand, json),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
