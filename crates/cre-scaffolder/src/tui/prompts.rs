//! Charm-style CLI prompts using cliclack

use crate::product::ProductConfig;
use crate::templates::fetcher::TemplateRemote;
use crate::templates::workflow_dir::validate_workflow_name;
use crate::templates::{Registry, TemplateSummary};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// Default workflow directory name offered by the wizard
pub const DEFAULT_WORKFLOW_NAME: &str = "my-workflow";

/// CLI arguments for the init command
#[derive(Debug, Clone, Default)]
pub struct InitArgs {
    /// Template name (ID) to use
    pub template: Option<String>,

    /// Project directory to create
    pub directory: Option<PathBuf>,

    /// Name of the workflow directory inside the project
    pub workflow_name: Option<String>,

    /// Bypass the template list cache
    pub refresh: bool,

    /// Auto-confirm all prompts (non-interactive mode)
    pub yes: bool,
}

/// Run the init wizard with interactive prompts
pub async fn run_init<C: ProductConfig, R: TemplateRemote>(
    config: &C,
    registry: &Registry<R>,
    args: InitArgs,
) -> Result<()> {
    cliclack::intro(config.display_name())?;

    // Step 1: Select template
    let template = select_template(registry, &args).await?;

    // Step 2: Select directory
    let project_dir = select_directory(&args)?;

    // Step 3: Name the workflow
    let workflow_name = select_workflow_name(&args)?;

    // Step 4: Create project
    create_project(registry, &template, &project_dir, &workflow_name).await?;

    // Step 5: Show next steps
    print_next_steps(config, &project_dir, &workflow_name)?;

    Ok(())
}

async fn select_template<R: TemplateRemote>(
    registry: &Registry<R>,
    args: &InitArgs,
) -> Result<TemplateSummary> {
    let spinner = cliclack::spinner();
    spinner.start("Loading templates...");

    let templates = match registry.list(args.refresh).await {
        Ok(templates) => templates,
        Err(e) => {
            spinner.stop("Failed to load templates");
            return Err(e.into());
        }
    };

    // If a template was specified via --template flag, use it directly
    if let Some(name) = args.template.as_deref() {
        let Some(template) = templates.iter().find(|t| t.name() == name) else {
            spinner.stop("Failed to load templates");
            let available: Vec<&str> = templates.iter().map(|t| t.name()).collect();
            anyhow::bail!(
                "Template '{}' not found. Available templates: {}",
                name,
                available.join(", ")
            );
        };
        spinner.stop(format!(
            "Template: {} - {}",
            template.metadata.display_title(),
            template.metadata.description
        ));
        return Ok(template.clone());
    }

    spinner.stop(format!("{} templates loaded", templates.len()));

    // With --yes (or a single choice) take the first template
    if args.yes || templates.len() == 1 {
        let Some(template) = templates.into_iter().next() else {
            anyhow::bail!("No templates found.");
        };
        cliclack::log::info(format!(
            "Using template: {} - {}",
            template.metadata.display_title(),
            template.metadata.description
        ))?;
        return Ok(template);
    }

    // Build select prompt - use indices to avoid borrow issues
    let mut select = cliclack::select("Select a template");
    for (idx, template) in templates.iter().enumerate() {
        let hint = format!(
            "{} · {}",
            template.metadata.language().display_name(),
            template.metadata.description
        );
        select = select.item(idx, template.metadata.display_title(), hint);
    }

    let selected_idx: usize = select.interact()?;

    templates
        .into_iter()
        .nth(selected_idx)
        .ok_or_else(|| anyhow::anyhow!("Invalid template selection"))
}

fn select_directory(args: &InitArgs) -> Result<PathBuf> {
    let current_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));

    let resolve = |p: PathBuf| {
        if p.is_absolute() {
            p
        } else {
            current_dir.join(p)
        }
    };

    // Use --directory flag if provided
    let path = if let Some(dir) = &args.directory {
        let p = resolve(dir.clone());
        cliclack::log::info(format!("Using directory: {}", p.display()))?;
        p
    } else if args.yes {
        current_dir.clone()
    } else {
        let input: String = cliclack::input("Project directory")
            .placeholder(".")
            .default_input(".")
            .interact()?;

        if input.is_empty() || input == "." {
            current_dir.clone()
        } else {
            resolve(PathBuf::from(&input))
        }
    };

    // Validate parent directory exists
    if let Some(parent) = path.parent() {
        if !parent.exists() && parent != Path::new("") {
            anyhow::bail!("Parent directory does not exist: {}", parent.display());
        }
    }

    // Warn if directory exists and has files
    if path.is_dir() {
        if let Ok(entries) = std::fs::read_dir(&path) {
            let count = entries.count();
            if count > 0 {
                cliclack::log::warning(format!(
                    "Directory has {} existing items; template files replace any with the same path",
                    count
                ))?;

                // Auto-confirm with --yes flag
                let confirm = if args.yes {
                    true
                } else {
                    cliclack::confirm("Continue anyway?")
                        .initial_value(true)
                        .interact()?
                };

                if !confirm {
                    anyhow::bail!("Setup cancelled.");
                }
            }
        }
    }

    Ok(path)
}

fn select_workflow_name(args: &InitArgs) -> Result<String> {
    if let Some(name) = &args.workflow_name {
        validate_workflow_name(name)?;
        cliclack::log::info(format!("Workflow name: {}", name))?;
        return Ok(name.clone());
    }

    if args.yes {
        return Ok(DEFAULT_WORKFLOW_NAME.to_string());
    }

    let name: String = cliclack::input("Workflow name")
        .placeholder(DEFAULT_WORKFLOW_NAME)
        .default_input(DEFAULT_WORKFLOW_NAME)
        .validate(|input: &String| {
            validate_workflow_name(input)
                .map_err(|_| "Use a single directory name, without slashes")
        })
        .interact()?;

    Ok(name)
}

async fn create_project<R: TemplateRemote>(
    registry: &Registry<R>,
    template: &TemplateSummary,
    project_dir: &Path,
    workflow_name: &str,
) -> Result<()> {
    let spinner = cliclack::spinner();
    spinner.start("Creating project...");

    let result = registry
        .scaffold(template, project_dir, workflow_name, &|message: &str| {
            spinner.set_message(message)
        })
        .await;

    match result {
        Ok(()) => {
            spinner.stop(format!(
                "Created {} from {} in {}",
                workflow_name,
                template.name(),
                project_dir.display()
            ));
            Ok(())
        }
        Err(e) => {
            spinner.stop("Failed to create project");
            Err(e.into())
        }
    }
}

fn print_next_steps<C: ProductConfig>(
    config: &C,
    project_dir: &Path,
    workflow_name: &str,
) -> Result<()> {
    let steps = config.next_steps(project_dir, workflow_name);

    println!();
    println!("  {}", console::style("Next steps").bold());
    println!();

    for (i, step) in steps.iter().enumerate() {
        println!("  {}.  {}", i + 1, step);
    }

    cliclack::outro(format!("Docs: {}", config.docs_url()))?;

    Ok(())
}
