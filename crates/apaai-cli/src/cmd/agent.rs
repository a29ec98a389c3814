use crate::output::{mask_secret, print_fields, print_json, print_table};
use crate::settings::{self, Globals};
use anyhow::Context;
use apaai_client::types::{AgentSettings, DiscoveredPolicy};
use apaai_client::{Agent, BootstrapInput, CreateAgentInput};
use clap::Subcommand;

#[derive(Subcommand)]
pub enum AgentSubcommand {
    /// List registered agents
    List,

    /// Show one agent
    Show { agent_id: String },

    /// Register a new agent
    Create {
        name: String,
        #[arg(long)]
        description: Option<String>,
        /// Webhook notified about this agent's actions
        #[arg(long)]
        webhook_url: Option<String>,
    },

    /// Self-register with an organisation enrollment key
    Bootstrap {
        #[arg(long, env = "APAAI_ENROLLMENT_KEY")]
        enrollment_key: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        provider: Option<String>,
        #[arg(long)]
        model: Option<String>,
        /// Tag (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Show the policies that apply to an agent
    Policies { agent_id: String },
}

pub fn run(globals: &Globals, subcmd: AgentSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        AgentSubcommand::List => list(globals, json),
        AgentSubcommand::Show { agent_id } => show(globals, &agent_id, json),
        AgentSubcommand::Create {
            name,
            description,
            webhook_url,
        } => {
            let input = CreateAgentInput {
                name,
                description,
                config: webhook_url.map(|url| AgentSettings {
                    webhook_url: Some(url),
                    webhook_secret: None,
                }),
            };
            create(globals, &input, json)
        }
        AgentSubcommand::Bootstrap {
            enrollment_key,
            name,
            description,
            provider,
            model,
            tags,
        } => {
            let input = BootstrapInput {
                enrollment_key,
                name,
                description,
                provider,
                model,
                tags,
                config: None,
            };
            bootstrap(globals, &input, json)
        }
        AgentSubcommand::Policies { agent_id } => policies(globals, &agent_id, json),
    }
}

fn list(globals: &Globals, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let agents = settings::block_on(client.list_agents()).context("failed to list agents")?;

    if json {
        print_json(&agents)?;
        return Ok(());
    }
    if agents.is_empty() {
        println!("No agents.");
        return Ok(());
    }
    let rows = agents
        .iter()
        .map(|a| {
            vec![
                a.id.clone(),
                a.slug.clone(),
                format!("{:?}", a.status).to_lowercase(),
                a.metrics.total_actions.to_string(),
                a.metrics.pending_actions.to_string(),
                a.last_seen_at.clone().unwrap_or_else(|| "-".into()),
            ]
        })
        .collect();
    print_table(&["ID", "SLUG", "STATUS", "ACTIONS", "PENDING", "LAST SEEN"], rows);
    Ok(())
}

fn show(globals: &Globals, agent_id: &str, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let agent = settings::block_on(client.get_agent(agent_id))
        .with_context(|| format!("failed to load agent '{agent_id}'"))?;

    if json {
        print_json(&agent)?;
    } else {
        print_agent(&agent);
    }
    Ok(())
}

fn print_agent(agent: &Agent) {
    let m = &agent.metrics;
    print_fields(&[
        ("agent", Some(agent.id.clone())),
        ("name", Some(agent.name.clone())),
        ("slug", Some(agent.slug.clone())),
        ("status", Some(format!("{:?}", agent.status).to_lowercase())),
        ("description", agent.description.clone()),
        (
            "actions",
            Some(format!(
                "{} total, {} approved, {} blocked, {} pending",
                m.total_actions, m.approved_actions, m.blocked_actions, m.pending_actions
            )),
        ),
        ("last seen", agent.last_seen_at.clone()),
        (
            "webhook",
            agent.config.as_ref().and_then(|c| c.webhook_url.clone()),
        ),
        ("created", Some(agent.created_at.clone())),
    ]);
}

fn create(globals: &Globals, input: &CreateAgentInput, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let agent = settings::block_on(client.create_agent(input))
        .with_context(|| format!("failed to create agent '{}'", input.name))?;

    if json {
        print_json(&agent)?;
    } else {
        println!("Created agent {} ({})", agent.slug, agent.id);
    }
    Ok(())
}

fn bootstrap(globals: &Globals, input: &BootstrapInput, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let result = settings::block_on(client.bootstrap_agent(input))
        .with_context(|| format!("failed to bootstrap agent '{}'", input.name))?;

    if json {
        print_json(&result)?;
        return Ok(());
    }
    println!("Registered agent {} ({})", result.agent.slug, result.agent_id);
    println!(
        "Agent token: {} (use it as APAAI_KEY)",
        mask_secret(&result.agent_token)
    );
    if !result.policies.is_empty() {
        println!();
        print_policies(&result.policies);
    }
    Ok(())
}

fn policies(globals: &Globals, agent_id: &str, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let found = settings::block_on(client.discover_policies(agent_id))
        .with_context(|| format!("failed to discover policies for '{agent_id}'"))?;

    if json {
        print_json(&found)?;
    } else if found.policies.is_empty() {
        println!("No policies apply to {}.", found.agent_name);
    } else {
        print_policies(&found.policies);
    }
    Ok(())
}

fn print_policies(policies: &[DiscoveredPolicy]) {
    let rows = policies
        .iter()
        .map(|p| {
            vec![
                p.id.clone(),
                p.name.clone(),
                p.action_type.clone(),
                format!("{:?}", p.mode).to_lowercase(),
                p.rules.len().to_string(),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "ACTION", "MODE", "RULES"], rows);
}
