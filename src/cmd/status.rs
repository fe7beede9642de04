//! Read-only views: status, step listing, environments, and run history.

use anyhow::Result;
use console::style;
use std::path::Path;

use waypoint::audit::RunRecorder;
use waypoint::config::Config;
use waypoint::init::{has_steps, is_initialized};
use waypoint::ledger::{FileLedger, MigrationLedger};
use waypoint::step::StepsFile;

use super::{load_config, load_steps};

pub fn cmd_status(project_dir: &Path, environment: Option<&str>) -> Result<()> {
    println!();
    println!("Waypoint Project Status");
    println!("=======================");
    println!();

    if !is_initialized(project_dir) {
        println!("Project: Not initialized");
        println!();
        println!("Run 'waypoint init' to initialize the project.");
        println!();
        return Ok(());
    }

    let config = load_config(project_dir, false)?;
    println!("Project:   Initialized");
    println!("Artifacts: {}", config.artifacts_dir.display());

    let steps = if has_steps(project_dir) {
        let steps = load_steps(&config)?;
        println!("Steps:     {} defined", steps.len());
        steps
    } else {
        println!("Steps:     Missing (create .waypoint/steps.json)");
        StepsFile::default()
    };
    println!();

    let names = match environment {
        Some(name) => vec![name.to_string()],
        None => config.toml.environment_names(),
    };
    let ledger = FileLedger::new(config.ledger_dir.clone());
    let recorder = RunRecorder::new(&config.runs_dir);

    println!("{:<16} {:<10} {:<12} Last run", "Environment", "Applied", "Journal");
    println!("{:<16} {:<10} {:<12} --------", "-----------", "-------", "-------");
    for name in names {
        let applied = ledger.list_applied(&name)?.len();
        let journal = match ledger.pending(&name)? {
            Some(pending) if pending.is_unknown() => {
                style(format!("step {} ?", pending.sequence)).red().to_string()
            }
            Some(pending) => style(format!("step {}", pending.sequence)).yellow().to_string(),
            None => "-".to_string(),
        };
        let last_run = last_run_summary(&recorder, &name);
        let marker = if name == config.default_environment() {
            "*"
        } else {
            " "
        };
        println!(
            "{}{:<15} {:<10} {:<12} {}",
            marker,
            name,
            format!("{}/{}", applied, steps.len()),
            journal,
            last_run
        );
    }
    println!();
    Ok(())
}

fn last_run_summary(recorder: &RunRecorder, environment: &str) -> String {
    let Some(path) = recorder
        .list_runs(environment)
        .ok()
        .and_then(|runs| runs.into_iter().next())
    else {
        return style("never").dim().to_string();
    };
    match recorder.load_run(&path) {
        Ok(report) => {
            let outcome = match &report.error {
                None => style("ok").green().to_string(),
                Some(error) => style(&error.kind).red().to_string(),
            };
            format!(
                "{} {}",
                report.started_at.format("%Y-%m-%d %H:%M:%S"),
                outcome
            )
        }
        Err(_) => style("unreadable").dim().to_string(),
    }
}

pub fn cmd_list(project_dir: &Path, environment: Option<&str>) -> Result<()> {
    if !is_initialized(project_dir) || !has_steps(project_dir) {
        println!();
        println!("No steps found. Run 'waypoint init' first to create .waypoint/steps.json.");
        println!();
        return Ok(());
    }

    let config = load_config(project_dir, false)?;
    let steps = load_steps(&config)?;
    let environment = config.environment_or_default(environment);
    let ledger = FileLedger::new(config.ledger_dir.clone());
    let entries = ledger.entries(&environment)?;

    println!();
    println!(
        "Steps loaded from: {}",
        config.steps_file.display()
    );
    println!("Environment:       {}", style(&environment).cyan());
    println!();
    println!("{:<6} {:<25} {:<20} Applied", "Step", "Name", "Artifact");
    println!(
        "{:<6} {:<25} {:<20} -------",
        "------", "-------------------------", "--------------------"
    );

    for step in &steps.steps {
        let applied = entries
            .iter()
            .find(|e| e.sequence == step.sequence)
            .map(|e| {
                style(format!(
                    "{} ({})",
                    e.result_ref,
                    e.applied_at.format("%Y-%m-%d %H:%M")
                ))
                .green()
                .to_string()
            })
            .unwrap_or_else(|| style("pending").dim().to_string());
        println!(
            "{:<6} {:<25} {:<20} {}",
            step.sequence, step.name, step.artifact_ref, applied
        );
    }
    println!();
    println!("{} of {} step(s) applied", entries.len(), steps.len());
    println!();
    Ok(())
}

pub fn cmd_envs(project_dir: &Path) -> Result<()> {
    let config = if is_initialized(project_dir) {
        load_config(project_dir, false)?
    } else {
        println!();
        println!("Project not initialized; showing built-in defaults.");
        Config::new(project_dir.to_path_buf(), false)?
    };

    println!();
    println!(
        "{:<16} {:<32} {:<10} Toolchain",
        "Environment", "Endpoint", "Network"
    );
    println!(
        "{:<16} {:<32} {:<10} ---------",
        "-----------", "--------", "-------"
    );
    for name in config.toml.environment_names() {
        let Some(section) = config.toml.environment(&name) else {
            continue;
        };
        let endpoint = section
            .endpoint()
            .unwrap_or_else(|reason| style(format!("invalid: {}", reason)).red().to_string());
        let marker = if name == config.default_environment() {
            "*"
        } else {
            " "
        };
        println!(
            "{}{:<15} {:<32} {:<10} {}",
            marker, name, endpoint, section.network_id, section.toolchain_version
        );
    }
    println!();
    Ok(())
}

pub fn cmd_history(project_dir: &Path, environment: Option<&str>, limit: usize) -> Result<()> {
    let config = load_config(project_dir, false)?;
    let environment = config.environment_or_default(environment);
    let recorder = RunRecorder::new(&config.runs_dir);
    let runs = recorder.list_runs(&environment)?;

    println!();
    if runs.is_empty() {
        println!("No runs recorded for {}", style(&environment).cyan());
        println!();
        return Ok(());
    }

    println!("Runs for {}", style(&environment).cyan().bold());
    println!();
    for path in runs.iter().take(limit) {
        let report = match recorder.load_run(path) {
            Ok(report) => report,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %format!("{:#}", e), "Skipping unreadable run report");
                continue;
            }
        };
        let outcome = match &report.error {
            None if report.dry_run => style("dry run").dim().to_string(),
            None => style("ok").green().to_string(),
            Some(error) => style(&error.kind).red().to_string(),
        };
        println!(
            "{}  {}  {:<24} {} applied",
            report.started_at.format("%Y-%m-%d %H:%M:%S"),
            &report.run_id.to_string()[..8],
            outcome,
            report.applied_count()
        );
        for step in &report.steps {
            println!(
                "    {:<4} {:<25} {:<10} attempts={}{}",
                step.sequence,
                step.name,
                step.state,
                step.attempts,
                step.result_ref
                    .as_deref()
                    .map(|r| format!(" {}", r))
                    .unwrap_or_default()
            );
        }
        if let Some(error) = &report.error {
            println!("    {}", style(&error.message).red());
        }
    }
    println!();
    Ok(())
}
