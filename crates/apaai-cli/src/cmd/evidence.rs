use crate::output::print_json;
use crate::settings::{self, Globals};
use anyhow::Context;
use apaai_client::{now_iso, Check, Evidence};

/// `NAME` or `NAME=NOTE`.
pub fn parse_check(raw: &str, pass: bool) -> anyhow::Result<Check> {
    let (name, note) = match raw.split_once('=') {
        Some((name, note)) => (name.trim(), Some(note.trim())),
        None => (raw.trim(), None),
    };
    if name.is_empty() {
        anyhow::bail!("check name is empty in '{raw}'");
    }
    let mut check = Check::new(name, pass);
    if let Some(note) = note.filter(|n| !n.is_empty()) {
        check = check.with_note(note);
    }
    Ok(check)
}

pub fn run(
    globals: &Globals,
    action_id: &str,
    passed: &[String],
    failed: &[String],
    approver: Option<&str>,
    json: bool,
) -> anyhow::Result<()> {
    let mut checks = Vec::with_capacity(passed.len() + failed.len());
    for raw in passed {
        checks.push(parse_check(raw, true)?);
    }
    for raw in failed {
        checks.push(parse_check(raw, false)?);
    }
    if checks.is_empty() {
        anyhow::bail!("no checks given; use --pass NAME and/or --fail NAME");
    }
    if let Some(who) = approver {
        checks = checks.into_iter().map(|c| c.with_approver(who)).collect();
    }

    let evidence = Evidence {
        action_id: action_id.to_string(),
        checks,
        timestamp: Some(now_iso()),
    };
    let client = settings::connect(globals)?;
    let verification = settings::block_on(client.submit_evidence(&evidence))
        .with_context(|| format!("failed to submit evidence for '{action_id}'"))?;

    if json {
        print_json(&serde_json::json!({
            "actionId": action_id,
            "checks": evidence.checks,
            "verified": verification.verified,
        }))?;
    } else {
        let passed = evidence.checks.iter().filter(|c| c.pass).count();
        println!(
            "Recorded {} check(s) for {action_id} ({passed} passed, {} failed)",
            evidence.checks.len(),
            evidence.checks.len() - passed
        );
    }
    Ok(())
}
