use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use std::process::ExitCode;

use waypoint::errors::{RunError, exit_code_for};
use waypoint::init::get_waypoint_dir;
use waypoint::logging::{self, LogFormat};
use waypoint::runner::RunFailure;

mod cmd;

#[derive(Parser)]
#[command(name = "waypoint")]
#[command(version, about = "Ordered, resumable contract deployments across environments")]
pub struct Cli {
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Answer yes to confirmation prompts
    #[arg(long, global = true)]
    pub yes: bool,

    #[arg(long, global = true, env = "WAYPOINT_PROJECT_DIR")]
    pub project_dir: Option<PathBuf>,

    /// Console log format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new waypoint project
    Init,
    /// Apply pending steps to an environment
    Run {
        /// Environment name (defaults to project.default_environment)
        environment: Option<String>,
        /// Show which steps would run without deploying anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Show project status and per-environment progress
    Status { environment: Option<String> },
    /// List steps and whether each is applied to an environment
    List { environment: Option<String> },
    /// List configured environments
    Envs,
    /// Adopt or discard a deployment whose outcome is unknown
    Resolve {
        environment: String,
        /// Record the pending step as deployed at this address
        #[arg(
            long,
            value_name = "RESULT_REF",
            conflicts_with = "discard",
            required_unless_present = "discard"
        )]
        adopt: Option<String>,
        /// Receipt id (transaction hash) of the adopted deployment
        #[arg(long, value_name = "RECEIPT_ID", requires = "adopt")]
        receipt: Option<String>,
        /// Forget the pending deployment so the step runs again
        #[arg(long)]
        discard: bool,
    },
    /// Show past runs for an environment
    History {
        environment: Option<String>,
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
    /// View or validate configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Initialize a default waypoint.toml file
    Init,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match run(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            report_error(&err);
            ExitCode::from(u8::try_from(exit_code_for(&err)).unwrap_or(1))
        }
    }
}

async fn run(cli: &Cli) -> Result<()> {
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };

    let log_dir = get_waypoint_dir(&project_dir).join("logs");
    let _log_guard = logging::init(cli.log_format, cli.verbose, Some(&log_dir));

    match &cli.command {
        Commands::Init => cmd::cmd_init(&project_dir)?,
        Commands::Run {
            environment,
            dry_run,
        } => {
            cmd::cmd_run(&project_dir, environment.as_deref(), *dry_run, cli.verbose).await?;
        }
        Commands::Status { environment } => cmd::cmd_status(&project_dir, environment.as_deref())?,
        Commands::List { environment } => cmd::cmd_list(&project_dir, environment.as_deref())?,
        Commands::Envs => cmd::cmd_envs(&project_dir)?,
        Commands::Resolve {
            environment,
            adopt,
            receipt,
            discard: _,
        } => cmd::cmd_resolve(
            &project_dir,
            environment,
            adopt.clone(),
            receipt.clone(),
            cli.yes,
        )?,
        Commands::History { environment, limit } => {
            cmd::cmd_history(&project_dir, environment.as_deref(), *limit)?
        }
        Commands::Config { command } => cmd::cmd_config(&project_dir, command.clone())?,
    }

    Ok(())
}

fn report_error(err: &anyhow::Error) {
    let label = style("error:").red().bold();
    if let Some(failure) = err.downcast_ref::<RunFailure>() {
        eprintln!("{} {}", label, failure);
    } else if let Some(run_error) = err.downcast_ref::<RunError>() {
        eprintln!("{} {}", label, run_error);
    } else {
        eprintln!("{} {:#}", label, err);
    }
}
