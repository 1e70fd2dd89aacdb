use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::runtime::Runtime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use hypoforge::cli::commands;
use hypoforge::config::{Config, ConfigLoader};

#[derive(Parser)]
#[command(name = "hypoforge")]
#[command(
    version,
    about = "Resumable AI-driven business hypothesis research pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, short, help = "Path to a config file (overrides discovery)")]
    config: Option<PathBuf>,

    #[arg(long)]
    verbose: bool,

    #[arg(long, short)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },

    /// Manage resource documents
    Resource {
        #[command(subcommand)]
        action: ResourceAction,
    },

    /// Create and control pipeline runs
    Run {
        #[command(subcommand)]
        action: RunAction,
    },

    /// Reclassify runs orphaned by a crash as interrupted
    Recover,

    /// Inspect and manage hypotheses
    Hypothesis {
        #[command(subcommand)]
        action: HypothesisAction,
    },

    /// Manage step prompt overrides
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },
}

#[derive(Subcommand)]
enum ProjectAction {
    /// Create a project
    Create {
        name: String,
        #[arg(long, short)]
        description: Option<String>,
    },
    /// List projects
    List,
    /// Soft-delete a project
    Delete { id: String },
}

#[derive(Subcommand)]
enum ResourceAction {
    /// Add a resource document from a file
    Add {
        project_id: String,
        #[arg(long, help = "Resource kind: target_spec or technical_assets")]
        kind: String,
        #[arg(long, short)]
        name: String,
        #[arg(long, short)]
        file: PathBuf,
    },
    /// List a project's resources
    List { project_id: String },
}

#[derive(Subcommand)]
enum RunAction {
    /// Create a run and drive it in the foreground (Ctrl-C stops at the
    /// next step boundary)
    Start {
        project_id: String,
        #[arg(long)]
        target_spec: String,
        #[arg(long)]
        technical_assets: String,
        #[arg(long, short = 'n', default_value_t = hypoforge::constants::pipeline::DEFAULT_HYPOTHESIS_COUNT)]
        count: usize,
        #[arg(long, short, default_value_t = hypoforge::constants::pipeline::DEFAULT_LOOP_COUNT)]
        loops: usize,
        #[arg(long)]
        job_name: Option<String>,
        #[arg(long, value_delimiter = ',', help = "Resource ids scoping deduplication")]
        existing_filter: Option<Vec<String>>,
    },
    /// Resume a paused run
    Resume { run_id: String },
    /// Show a run's progress cursor and validation state
    Status { run_id: String },
    /// List a project's runs
    List { project_id: String },
}

#[derive(Subcommand)]
enum HypothesisAction {
    /// List a project's hypotheses
    List { project_id: String },
    /// Delete a hypothesis (its number is never reused)
    Delete { id: String },
}

#[derive(Subcommand)]
enum PromptAction {
    /// Register a prompt version for a step from a file
    Add {
        #[arg(help = "Pipeline step (2-5)")]
        step: u8,
        #[arg(long, short)]
        file: PathBuf,
    },
    /// Activate a prompt version (deactivates its step's siblings)
    Activate { id: String },
    /// List a step's prompt versions
    List {
        #[arg(help = "Pipeline step (2-5)")]
        step: u8,
    },
}

fn main() -> ExitCode {
    match run_cli() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", console::style("Error:").red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let config = match &cli.config {
        Some(path) => ConfigLoader::load_from_file(path)?,
        None => ConfigLoader::load()?,
    };
    Ok(config)
}

fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Commands::Project { action } => match action {
            ProjectAction::Create { name, description } => {
                commands::project::create(&config, &name, description)?;
            }
            ProjectAction::List => commands::project::list(&config)?,
            ProjectAction::Delete { id } => commands::project::delete(&config, &id)?,
        },
        Commands::Resource { action } => match action {
            ResourceAction::Add {
                project_id,
                kind,
                name,
                file,
            } => commands::resource::add(&config, &project_id, &kind, &name, &file)?,
            ResourceAction::List { project_id } => {
                commands::resource::list(&config, &project_id)?;
            }
        },
        Commands::Run { action } => match action {
            RunAction::Start {
                project_id,
                target_spec,
                technical_assets,
                count,
                loops,
                job_name,
                existing_filter,
            } => {
                let rt = Runtime::new()?;
                rt.block_on(commands::run::start(
                    &config,
                    commands::run::StartArgs {
                        project_id,
                        target_spec_id: target_spec,
                        technical_assets_id: technical_assets,
                        hypothesis_count: count,
                        loop_count: loops,
                        job_name,
                        existing_filter,
                    },
                ))?;
            }
            RunAction::Resume { run_id } => {
                let rt = Runtime::new()?;
                rt.block_on(commands::run::resume(&config, &run_id))?;
            }
            RunAction::Status { run_id } => commands::run::status(&config, &run_id)?,
            RunAction::List { project_id } => commands::run::list(&config, &project_id)?,
        },
        Commands::Recover => commands::recover::run(&config)?,
        Commands::Hypothesis { action } => match action {
            HypothesisAction::List { project_id } => {
                commands::hypothesis::list(&config, &project_id)?;
            }
            HypothesisAction::Delete { id } => commands::hypothesis::delete(&config, &id)?,
        },
        Commands::Prompt { action } => match action {
            PromptAction::Add { step, file } => commands::prompt::add(&config, step, &file)?,
            PromptAction::Activate { id } => commands::prompt::activate(&config, &id)?,
            PromptAction::List { step } => commands::prompt::list(&config, step)?,
        },
    }

    Ok(())
}
