use crate::output::{print_fields, print_json, print_table};
use crate::settings::{self, Globals};
use anyhow::Context;
use apaai_client::{Action, ActionFilter, ActionRequest, ActionStatus, Actor, ActorKind, Decision};
use clap::{Args, Subcommand};

// ---------------------------------------------------------------------------
// Shared action arguments
// ---------------------------------------------------------------------------

/// Arguments describing an action, shared by `propose` and `run`.
#[derive(Args, Debug)]
pub struct ActionArgs {
    /// Action type, e.g. send_email
    #[arg(value_name = "TYPE")]
    pub action_type: String,

    /// Name of the actor taking the action
    #[arg(long, env = "APAAI_ACTOR", default_value = "apaai-cli")]
    pub actor: String,

    /// Actor kind: agent, human or system
    #[arg(long, default_value = "agent")]
    pub actor_kind: ActorKind,

    /// Actor provider (e.g. openai, github)
    #[arg(long)]
    pub provider: Option<String>,

    /// What the action touches (URI, path, resource name)
    #[arg(long)]
    pub target: Option<String>,

    /// Parameter as KEY=VALUE; VALUE is parsed as JSON when it can be (repeatable)
    #[arg(long = "param", value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, serde_json::Value)>,

    /// Action id (default: random UUID)
    #[arg(long)]
    pub id: Option<String>,
}

impl ActionArgs {
    pub fn into_request(self) -> ActionRequest {
        let mut actor = Actor::new(self.actor_kind, self.actor);
        if let Some(provider) = self.provider {
            actor = actor.with_provider(provider);
        }
        let mut request = ActionRequest::new(self.action_type, actor);
        if let Some(target) = self.target {
            request = request.with_target(target);
        }
        for (key, value) in self.params {
            request = request.with_param(key, value);
        }
        if let Some(id) = self.id {
            request = request.with_id(id);
        }
        request
    }
}

/// `KEY=VALUE`; `amount=120` becomes a number, `to=sarah@acme.com` a string.
pub fn parse_param(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty parameter name in '{raw}'"));
    }
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

// ---------------------------------------------------------------------------
// apaai propose
// ---------------------------------------------------------------------------

pub fn propose(globals: &Globals, args: ActionArgs, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let decision = settings::block_on(client.propose(args.into_request()))
        .context("failed to propose action")?;

    if json {
        print_json(&decision)?;
    } else {
        print_decision(&decision);
    }
    Ok(())
}

pub fn print_decision(decision: &Decision) {
    print_fields(&[
        ("action", Some(decision.action_id.clone())),
        ("status", Some(decision.status.to_string())),
        ("checks", decision.checks.as_ref().map(|c| c.join(", "))),
    ]);
}

// ---------------------------------------------------------------------------
// apaai action ...
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ActionSubcommand {
    /// Show one action with its current status
    Show { action_id: String },

    /// List actions
    List {
        /// Only actions with this status (e.g. requires_approval)
        #[arg(long)]
        status: Option<ActionStatus>,
        /// Only actions of this type
        #[arg(long = "type", value_name = "TYPE")]
        action_type: Option<String>,
        /// Only actions by this actor
        #[arg(long)]
        actor: Option<String>,
        /// Only actions by this agent id
        #[arg(long)]
        agent_id: Option<String>,
        /// Maximum number of actions
        #[arg(long)]
        limit: Option<u32>,
    },

    /// Show the evidence recorded for an action
    Evidence { action_id: String },
}

pub fn run(globals: &Globals, subcmd: ActionSubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        ActionSubcommand::Show { action_id } => show(globals, &action_id, json),
        ActionSubcommand::List {
            status,
            action_type,
            actor,
            agent_id,
            limit,
        } => {
            let filter = ActionFilter {
                status,
                action_type,
                actor,
                agent_id,
                limit,
            };
            list(globals, &filter, json)
        }
        ActionSubcommand::Evidence { action_id } => evidence(globals, &action_id, json),
    }
}

fn show(globals: &Globals, action_id: &str, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let action = settings::block_on(client.get_action(action_id))
        .with_context(|| format!("failed to load action '{action_id}'"))?;

    if json {
        print_json(&action)?;
        return Ok(());
    }
    print_fields(&[
        ("action", Some(action.id.clone())),
        ("type", Some(action.action_type.clone())),
        ("actor", Some(actor_label(&action))),
        ("target", action.target.clone()),
        ("status", action.status.as_ref().map(|s| s.to_string())),
        ("checks", action.checks.as_ref().map(|c| c.join(", "))),
        ("agent", action.agent_id.clone()),
        ("timestamp", Some(action.timestamp.clone())),
    ]);
    if let Some(params) = &action.params {
        println!("params");
        for (key, value) in params {
            println!("  {key} = {value}");
        }
    }
    Ok(())
}

fn list(globals: &Globals, filter: &ActionFilter, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let actions = settings::block_on(client.list_actions(filter)).context("failed to list actions")?;

    if json {
        print_json(&actions)?;
        return Ok(());
    }
    if actions.is_empty() {
        println!("No actions.");
        return Ok(());
    }
    let rows = actions
        .iter()
        .map(|a| {
            vec![
                a.id.clone(),
                a.action_type.clone(),
                actor_label(a),
                a.status.as_ref().map(|s| s.to_string()).unwrap_or_else(|| "-".into()),
                a.timestamp.clone(),
            ]
        })
        .collect();
    print_table(&["ID", "TYPE", "ACTOR", "STATUS", "TIMESTAMP"], rows);
    Ok(())
}

fn evidence(globals: &Globals, action_id: &str, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let evidence = settings::block_on(client.get_evidence(action_id))
        .with_context(|| format!("failed to load evidence for '{action_id}'"))?;

    if json {
        print_json(&evidence)?;
        return Ok(());
    }
    if evidence.checks.is_empty() {
        println!("No evidence recorded for {action_id}.");
        return Ok(());
    }
    let rows = evidence
        .checks
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                if c.pass { "pass" } else { "fail" }.to_string(),
                c.approver.clone().unwrap_or_default(),
                c.note.clone().unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["CHECK", "RESULT", "APPROVER", "NOTE"], rows);
    Ok(())
}

fn actor_label(action: &Action) -> String {
    format!("{}:{}", action.actor.kind.as_str(), action.actor.name)
}
