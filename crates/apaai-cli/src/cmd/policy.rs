use crate::output::{print_json, print_table};
use crate::settings::{self, Globals};
use anyhow::Context;
use apaai_client::{Policy, PolicyRule};
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand)]
pub enum PolicySubcommand {
    /// Show the active policy
    Show {
        /// Only rules for this action type (falls back to all rules)
        #[arg(long = "type", value_name = "TYPE")]
        action_type: Option<String>,
    },

    /// Replace the policy with the contents of a YAML or JSON file
    Set { file: PathBuf },
}

pub fn run(globals: &Globals, subcmd: PolicySubcommand, json: bool) -> anyhow::Result<()> {
    match subcmd {
        PolicySubcommand::Show { action_type } => show(globals, action_type.as_deref(), json),
        PolicySubcommand::Set { file } => set(globals, &file, json),
    }
}

fn show(globals: &Globals, action_type: Option<&str>, json: bool) -> anyhow::Result<()> {
    let client = settings::connect(globals)?;
    let policy = settings::block_on(client.policy(action_type)).context("failed to load policy")?;

    if json {
        print_json(&policy)?;
    } else if policy.rules.is_empty() {
        println!("No policy rules.");
    } else {
        print_rules(&policy.rules);
        if let Some(t) = action_type {
            let required = policy.required_checks(t);
            if !required.is_empty() {
                println!();
                println!("Required for {t}: {}", required.join(", "));
            }
        }
    }
    Ok(())
}

fn set(globals: &Globals, file: &Path, json: bool) -> anyhow::Result<()> {
    let policy = load_policy_file(file)?;
    let client = settings::connect(globals)?;
    let saved = settings::block_on(client.set_policy(&policy)).context("failed to save policy")?;

    if json {
        print_json(&saved)?;
    } else {
        println!("Policy updated ({} rule(s))", saved.rules.len());
    }
    Ok(())
}

/// YAML is a superset of JSON, so one parser covers both.
fn load_policy_file(file: &Path) -> anyhow::Result<Policy> {
    let data = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    serde_yaml::from_str(&data).with_context(|| format!("invalid policy in {}", file.display()))
}

fn print_rules(rules: &[PolicyRule]) {
    let rows = rules
        .iter()
        .map(|r| {
            let when = r.when.as_ref();
            vec![
                when.and_then(|w| w.action_type.clone().or_else(|| w.action.clone()))
                    .unwrap_or_else(|| "*".to_string()),
                r.require
                    .as_ref()
                    .map(|c| c.join(", "))
                    .unwrap_or_default(),
                r.mode
                    .map(|m| format!("{m:?}").to_lowercase())
                    .unwrap_or_default(),
            ]
        })
        .collect();
    print_table(&["ACTION", "REQUIRE", "MODE"], rows);
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn policy_file_accepts_yaml_and_json() {
        let dir = TempDir::new().unwrap();
        let yaml = dir.path().join("policy.yaml");
        std::fs::write(
            &yaml,
            "rules:\n  - when: { actionType: send_email }\n    require: [reviewer_approval]\n    mode: enforce\n",
        )
        .unwrap();
        let json = dir.path().join("policy.json");
        std::fs::write(
            &json,
            r#"{"rules":[{"when":{"actionType":"send_email"},"require":["reviewer_approval"],"mode":"enforce"}]}"#,
        )
        .unwrap();

        assert_eq!(load_policy_file(&yaml).unwrap(), load_policy_file(&json).unwrap());
    }

    #[test]
    fn missing_policy_file_names_the_path() {
        let err = load_policy_file(Path::new("/nonexistent/policy.yaml")).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/policy.yaml"));
    }
}
