//! `templates` subcommands: list, add and remove template sources

use crate::CreConfig;
use anyhow::{Context, Result};
use colored::Colorize;
use cre_scaffolder::config::{self, Paths};
use cre_scaffolder::{CancellationToken, ProductConfig, Registry, RepoSource, TemplateSummary};

/// Parse every `owner/repo[@ref]` argument, failing on the first bad one
fn parse_repos(repos: &[String]) -> Result<Vec<RepoSource>> {
    repos
        .iter()
        .map(|r| r.parse::<RepoSource>().map_err(anyhow::Error::from))
        .collect()
}

pub async fn list(
    config: &CreConfig,
    paths: &Paths,
    cancel: CancellationToken,
    refresh: bool,
) -> Result<()> {
    let store = paths.source_config();
    store
        .ensure_default(&config.default_source())
        .context("Failed to initialize template config")?;
    let sources = store.load_or_default(&config.default_source());

    let registry = Registry::from_config(config, paths, sources, cancel)
        .context("Failed to create template registry")?;

    let spinner = cliclack::spinner();
    spinner.start("Fetching templates...");
    let result = registry.list(refresh).await;
    spinner.stop(match &result {
        Ok(templates) => format!("Found {} templates", templates.len()),
        Err(_) => "Failed to fetch templates".to_string(),
    });
    let templates = result.context("Failed to list templates")?;

    println!();
    println!("{}", "Available Templates".bold());
    println!();
    for template in &templates {
        print!("{}", render_template(template));
        println!();
    }
    println!("{}", "Install a template with:".dimmed());
    println!("  {}", format!("{} init --template=<id>", config.name()).cyan());
    println!();

    Ok(())
}

/// Title line plus dimmed ID/language and description lines
fn render_template(template: &TemplateSummary) -> String {
    let meta = &template.metadata;
    let mut out = format!("  {}\n", meta.display_title().bold());

    let mut details = format!("    ID: {}", meta.name);
    if !meta.language.is_empty() {
        details.push_str(&format!("  |  Language: {}", meta.language().display_name()));
    }
    if template.built_in {
        details.push_str("  |  built-in");
    }
    out.push_str(&format!("{}\n", details.dimmed()));

    if !meta.description.is_empty() {
        out.push_str(&format!("{}\n", format!("    {}", meta.description).dimmed()));
    }
    out
}

pub fn add(config: &CreConfig, paths: &Paths, repos: &[String]) -> Result<()> {
    let new = parse_repos(repos)?;
    let change = config::add_sources(
        &paths.source_config(),
        &paths.cache(),
        &config.default_source(),
        &new,
    )
    .context("Failed to update template config")?;

    println!();
    for source in &change.changed {
        println!("{} Added {}", "✓".green(), source);
    }
    println!();
    print_sources("Configured repositories:", &change.current, config);
    Ok(())
}

pub fn remove(config: &CreConfig, paths: &Paths, repos: &[String]) -> Result<()> {
    let targets = parse_repos(repos)?;
    let change = config::remove_sources(
        &paths.source_config(),
        &paths.cache(),
        &config.default_source(),
        &targets,
    )
    .context("Failed to update template config")?;

    println!();
    for source in &change.changed {
        println!("{} Removed {}", "✓".green(), source);
    }
    println!();
    print_sources("Remaining repositories:", &change.current, config);
    Ok(())
}

fn print_sources(heading: &str, sources: &[RepoSource], config: &CreConfig) {
    if sources.is_empty() {
        println!("{}", "No template repositories configured".dimmed());
        println!(
            "{}",
            format!("Add one with: {} templates add owner/repo[@ref]", config.name()).dimmed()
        );
    } else {
        println!("{}", heading.dimmed());
        for source in sources {
            println!("  - {}", source);
        }
    }
    println!();
}
