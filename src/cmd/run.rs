//! Applying pending steps: `waypoint run [<env>] [--dry-run]`.

use anyhow::Result;
use console::style;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use waypoint::artifact::FsArtifactProvider;
use waypoint::audit::{RunRecorder, RunReport};
use waypoint::environment::{ConfigResolver, EnvOverrides};
use waypoint::errors::RunError;
use waypoint::ledger::FileLedger;
use waypoint::lock::EnvironmentLock;
use waypoint::rpc::{RpcDeploymentClient, RpcSettings};
use waypoint::runner::{MigrationRunner, RunFailure};
use waypoint::step::StepsFile;
use waypoint::ui::RunUI;

use super::{load_config, load_steps};

pub async fn cmd_run(
    project_dir: &Path,
    environment: Option<&str>,
    dry_run: bool,
    verbose: bool,
) -> Result<()> {
    let config = load_config(project_dir, verbose)?;
    config.ensure_directories()?;
    let steps = load_steps(&config)?;
    let environment = config.environment_or_default(environment);

    let resolver = ConfigResolver::new(config.toml.clone(), EnvOverrides::from_env());
    let ledger = FileLedger::new(config.ledger_dir.clone());
    let artifacts = FsArtifactProvider::new(config.artifacts_dir.clone());
    let client = RpcDeploymentClient::new(RpcSettings::from(&config.toml.rpc))?;

    if dry_run {
        let runner = MigrationRunner::new(&resolver, &ledger, &artifacts, &client);
        let report = runner.plan(&environment, &steps).await?;
        print_plan(&report, &steps);
        return Ok(());
    }

    let _lock = EnvironmentLock::acquire(&config.lock_dir, &environment)?;

    let cancel = CancellationToken::new();
    let ctrl_c = tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{} Cancelling: the current submission will finish, no further steps start",
                    style("!").yellow().bold()
                );
                cancel.cancel();
            }
        }
    });

    let ui = RunUI::new(verbose);
    let runner = MigrationRunner::new(&resolver, &ledger, &artifacts, &client)
        .with_retry(config.toml.retry.to_retry_policy())
        .with_cancellation(cancel)
        .with_observer(&ui);

    let result = runner.run(&environment, &steps).await;
    ctrl_c.abort();

    let report = match &result {
        Ok(report) => report,
        Err(failure) => &failure.report,
    };
    ui.finish(report);

    let recorder = RunRecorder::new(&config.runs_dir);
    match recorder.save(report) {
        Ok(path) => tracing::debug!(path = %path.display(), "Run report saved"),
        Err(e) => tracing::warn!(error = %format!("{:#}", e), "Failed to save run report"),
    }

    match result {
        Ok(report) => {
            if report.planned.is_empty() && report.reconciliation.is_none() {
                println!(
                    "{} is up to date ({} step(s) applied)",
                    style(&environment).cyan(),
                    report.already_applied
                );
            }
            Ok(())
        }
        Err(failure) => {
            print_operator_hint(&failure, &environment);
            Err(failure.into())
        }
    }
}

fn print_plan(report: &RunReport, steps: &StepsFile) {
    println!();
    println!("Dry run for {}", style(&report.environment).cyan().bold());
    if let Some(endpoint) = &report.endpoint {
        println!("Endpoint:   {}", endpoint);
    }
    if let Some(network_id) = report.network_id {
        println!("Network id: {}", network_id);
    }
    println!(
        "Applied:    {} of {} step(s)",
        report.already_applied,
        steps.len()
    );
    println!();

    if report.planned.is_empty() {
        println!("Nothing to do.");
    } else {
        println!("Would apply:");
        for sequence in &report.planned {
            if let Some(step) = steps.get_step(*sequence) {
                println!(
                    "  {:<6} {:<25} {}",
                    step.sequence,
                    step.name,
                    style(&step.artifact_ref).dim()
                );
            }
        }
    }
    println!();
}

fn print_operator_hint(failure: &RunFailure, environment: &str) {
    match &failure.error {
        RunError::LedgerWrite {
            result_ref,
            receipt_id,
            journaled,
            ..
        } => {
            eprintln!();
            eprintln!(
                "{} The deployment at {} exists on the network but is not in the ledger.",
                style("!").red().bold(),
                style(result_ref).bold()
            );
            if *journaled {
                eprintln!(
                    "  The next run looks up receipt {} and records it automatically.",
                    receipt_id
                );
                eprintln!(
                    "  If the journal was lost, record it by hand: waypoint resolve {} --adopt {} --receipt {}",
                    environment, result_ref, receipt_id
                );
            } else {
                eprintln!(
                    "  Receipt {} could not be journaled; the next run will stop for reconciliation.",
                    style(receipt_id).bold()
                );
                eprintln!(
                    "  Record it by hand: waypoint resolve {} --adopt {} --receipt {}",
                    environment, result_ref, receipt_id
                );
            }
        }
        RunError::ReconciliationRequired { sequence, name } => {
            eprintln!();
            eprintln!(
                "{} Step {} ({}) may or may not have been deployed.",
                style("!").yellow().bold(),
                sequence,
                name
            );
            eprintln!("  Check the network, then run one of:");
            eprintln!("    waypoint resolve {} --adopt <address>", environment);
            eprintln!("    waypoint resolve {} --discard", environment);
        }
        _ => {}
    }
}
