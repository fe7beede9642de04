//! Operator reconciliation: `waypoint resolve <env> --adopt <ref> | --discard`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use waypoint::audit::ReconciliationOutcome;
use waypoint::ledger::{FileLedger, MigrationLedger};
use waypoint::lock::EnvironmentLock;
use waypoint::runner::{Resolution, resolve_pending};

use super::load_config;

pub fn cmd_resolve(
    project_dir: &Path,
    environment: &str,
    adopt: Option<String>,
    receipt: Option<String>,
    yes: bool,
) -> Result<()> {
    use dialoguer::Confirm;

    let config = load_config(project_dir, false)?;
    let _lock = EnvironmentLock::acquire(&config.lock_dir, environment)?;
    let ledger = FileLedger::new(config.ledger_dir.clone());

    let Some(pending) = ledger.pending(environment)? else {
        println!(
            "No pending deployment for {}; nothing to resolve.",
            style(environment).cyan()
        );
        return Ok(());
    };

    println!();
    println!(
        "Pending deployment for {}: step {} ({})",
        style(environment).cyan(),
        pending.sequence,
        pending.name
    );
    println!(
        "  started:  {}",
        pending.started_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    if let Some(receipt_id) = &pending.receipt_id {
        println!("  receipt:  {}", receipt_id);
    }
    println!();

    let (resolution, prompt) = match adopt {
        Some(result_ref) => {
            let prompt = format!(
                "Record step {} as deployed at {}?",
                pending.sequence, result_ref
            );
            (
                Resolution::Adopt {
                    result_ref,
                    receipt_id: receipt,
                },
                prompt,
            )
        }
        None => (
            Resolution::Discard,
            format!(
                "Discard the pending deployment? Step {} will be deployed again on the next run.",
                pending.sequence
            ),
        ),
    };

    if !yes {
        let confirm = Confirm::new()
            .with_prompt(prompt)
            .default(false)
            .interact()
            .context("Could not read confirmation; pass --yes to resolve non-interactively")?;

        if !confirm {
            println!("Resolve cancelled");
            return Ok(());
        }
    }

    match resolve_pending(&ledger, environment, resolution)? {
        ReconciliationOutcome::Adopted {
            sequence,
            name,
            result_ref,
        } => println!(
            "Recorded step {} ({}) at {}",
            sequence,
            name,
            style(result_ref).green()
        ),
        ReconciliationOutcome::Discarded { sequence, name } => {
            println!("Discarded pending deployment of step {} ({})", sequence, name)
        }
        ReconciliationOutcome::Stale { sequence, name } => {
            println!("Cleared stale journal for step {} ({})", sequence, name)
        }
    }
    Ok(())
}
