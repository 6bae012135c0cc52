//! CRE CLI - Project scaffolding for CRE workflows

mod logging;
mod templates;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use cre_scaffolder::config::Paths;
use cre_scaffolder::tui::InitArgs;
use cre_scaffolder::{CancellationToken, ProductConfig, Registry, RepoSource};
use std::path::{Path, PathBuf};

/// CRE product configuration
#[derive(Clone)]
pub struct CreConfig;

impl ProductConfig for CreConfig {
    fn name(&self) -> &'static str {
        "cre-tools"
    }

    fn display_name(&self) -> &'static str {
        "CRE"
    }

    fn config_dir_name(&self) -> &'static str {
        ".cre"
    }

    fn config_dir_env(&self) -> &'static str {
        "CRE_CONFIG_DIR"
    }

    fn api_url_env(&self) -> &'static str {
        "CRE_TEMPLATE_API_URL"
    }

    fn raw_url_env(&self) -> &'static str {
        "CRE_TEMPLATE_RAW_URL"
    }

    fn default_source(&self) -> RepoSource {
        RepoSource::new("smartcontractkit", "cre-templates", "main")
    }

    fn docs_url(&self) -> &'static str {
        "https://docs.chain.link/cre"
    }

    fn next_steps(&self, dir: &Path, workflow_name: &str) -> Vec<String> {
        let mut steps = Vec::new();
        let current = std::env::current_dir().ok();

        // Step 1: cd to directory if not current
        if current.as_deref() != Some(dir) {
            steps.push(format!("cd {}", dir.display()));
        }

        // Step 2: Read the workflow README
        steps.push(format!("Open {}/README.md to get started", workflow_name));

        // Step 3: Simulate
        steps.push(format!(
            "cre workflow simulate {} --target staging-settings",
            workflow_name
        ));

        steps
    }

    fn user_agent(&self) -> &'static str {
        "cre-cli"
    }
}

#[derive(Parser, Debug)]
#[command(name = "cre-tools")]
#[command(about = "CLI for scaffolding CRE workflow projects from templates")]
#[command(version)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Directory holding template.yaml and the template cache (default: ~/.cre)
    #[arg(long = "config-dir", global = true)]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create a new CRE project from a template
    Init(CliInitArgs),
    /// Manage template sources
    #[command(subcommand)]
    Templates(TemplatesCommand),
}

#[derive(Parser, Debug, Default)]
pub struct CliInitArgs {
    /// Template ID to use
    #[arg(short, long)]
    pub template: Option<String>,

    /// Project directory to create
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    /// Name of the workflow directory (default: my-workflow)
    #[arg(short, long = "workflow-name")]
    pub workflow_name: Option<String>,

    /// Bypass the template cache and fetch fresh data
    #[arg(long)]
    pub refresh: bool,

    /// Auto-confirm all prompts (non-interactive mode)
    #[arg(short, long)]
    pub yes: bool,
}

impl From<CliInitArgs> for InitArgs {
    fn from(args: CliInitArgs) -> Self {
        InitArgs {
            template: args.template,
            directory: args.directory,
            workflow_name: args.workflow_name,
            refresh: args.refresh,
            yes: args.yes,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum TemplatesCommand {
    /// List templates from all configured sources
    List {
        /// Bypass the template cache and fetch fresh data
        #[arg(long)]
        refresh: bool,
    },
    /// Add template repositories (owner/repo[@ref])
    Add {
        #[arg(required = true, value_name = "REPO")]
        repos: Vec<String>,
    },
    /// Remove template repositories (owner/repo)
    Remove {
        #[arg(required = true, value_name = "REPO")]
        repos: Vec<String>,
    },
}

/// First Ctrl+C cancels in-flight work; a second one exits immediately
fn install_interrupt_handler(cancel: CancellationToken) -> std::result::Result<(), ctrlc::Error> {
    ctrlc::set_handler(move || {
        let _ = console::Term::stderr().show_cursor();
        if cancel.is_cancelled() {
            std::process::exit(130);
        }
        cancel.cancel();
    })
}

async fn init(
    config: &CreConfig,
    paths: &Paths,
    cancel: CancellationToken,
    args: CliInitArgs,
) -> Result<()> {
    let store = paths.source_config();
    store
        .ensure_default(&config.default_source())
        .context("Failed to initialize template config")?;
    let sources = store.load_or_default(&config.default_source());

    let registry = Registry::from_config(config, paths, sources, cancel)
        .context("Failed to create template registry")?;

    cre_scaffolder::run_init(config, &registry, args.into()).await
}

#[tokio::main]
async fn main() -> Result<()> {
    // Ensure terminal cursor is restored on panic
    let default_panic = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = console::Term::stderr().show_cursor();
        default_panic(info);
    }));

    let cli = Cli::parse();
    logging::init_logging(cli.global.verbose, cli.global.quiet)?;

    let cancel = CancellationToken::new();
    if let Err(e) = install_interrupt_handler(cancel.clone()) {
        tracing::warn!("Ctrl+C will not cancel running work: {}", e);
    }

    let config = CreConfig;
    let paths = Paths::resolve(&config, cli.global.config_dir.clone())
        .context("Failed to resolve config directory")?;
    tracing::debug!("Using config directory {}", paths.config_dir.display());

    let result = match cli.command {
        Some(Command::Init(init_args)) => init(&config, &paths, cancel, init_args).await,
        Some(Command::Templates(TemplatesCommand::List { refresh })) => {
            templates::list(&config, &paths, cancel, refresh).await
        }
        Some(Command::Templates(TemplatesCommand::Add { repos })) => {
            templates::add(&config, &paths, &repos)
        }
        Some(Command::Templates(TemplatesCommand::Remove { repos })) => {
            templates::remove(&config, &paths, &repos)
        }
        // No subcommand provided, default to init behavior (interactive mode)
        None => init(&config, &paths, cancel, CliInitArgs::default()).await,
    };

    // Ensure cursor is visible on normal exit
    let _ = console::Term::stderr().show_cursor();

    result
}
