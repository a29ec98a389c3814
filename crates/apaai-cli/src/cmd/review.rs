use crate::output::print_json;
use crate::settings::{self, Globals};
use anyhow::Context;

pub fn approve(
    globals: &Globals,
    action_id: &str,
    approver: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let verification = settings::block_on(client.approve_action(action_id, approver))
        .with_context(|| format!("failed to approve '{action_id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "actionId": action_id,
            "decision": "approved",
            "verified": verification.verified,
        }))?;
    } else {
        match approver {
            Some(who) => println!("Approved {action_id} as {who}"),
            None => println!("Approved {action_id}"),
        }
    }
    Ok(())
}

pub fn reject(
    globals: &Globals,
    action_id: &str,
    reason: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let verification = settings::block_on(client.reject_action(action_id, reason))
        .with_context(|| format!("failed to reject '{action_id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "actionId": action_id,
            "decision": "rejected",
            "verified": verification.verified,
        }))?;
    } else {
        match reason {
            Some(why) => println!("Rejected {action_id}: {why}"),
            None => println!("Rejected {action_id}"),
        }
    }
    Ok(())
}
