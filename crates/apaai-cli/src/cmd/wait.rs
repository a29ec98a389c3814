use crate::output::print_json;
use crate::settings::{self, Globals};
use anyhow::Context;
use apaai_client::{wait_for_approval, PollOptions};
use std::time::Duration;

pub fn run(
    globals: &Globals,
    action_id: &str,
    interval_secs: u64,
    timeout_secs: u64,
    json: bool,
) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let opts = PollOptions::new(
        Duration::from_secs(interval_secs),
        Duration::from_secs(timeout_secs),
    );
    let outcome = settings::block_on(wait_for_approval(&client, action_id, opts))
        .with_context(|| format!("failed waiting for '{action_id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "actionId": outcome.action_id,
            "status": outcome.status,
            "approved": outcome.approved,
            "polls": outcome.polls,
        }))?;
    } else {
        println!(
            "{} {} after {} poll(s)",
            outcome.action_id, outcome.status, outcome.polls
        );
    }

    if !outcome.approved {
        anyhow::bail!("action '{action_id}' was {}", outcome.status);
    }
    Ok(())
}
