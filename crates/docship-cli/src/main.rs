#![forbid(unsafe_code)]

use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand};
use docship_config::config::CONFIG_FILE_NAME;
use docship_config::Config;
use docship_engine::{EngineError, NewProject, Publisher};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Debug, Parser)]
#[command(name = "docship", about = "Build and publish versioned documentation")]
#[command(version)]
struct Cli {
    /// Path to docship.toml (defaults to ./docship.toml)
    #[arg(long, global = true, env = "DOCSHIP_CONFIG")]
    config: Option<PathBuf>,
    /// Log debug output and print error causes
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Write a default docship.toml in the current directory
    Init,
    /// Manage projects
    Project {
        #[command(subcommand)]
        action: ProjectAction,
    },
    /// Check out a tag, build it, and publish the output
    Build {
        /// Project id
        project: String,
        /// Tag to check out and publish
        tag: String,
    },
    /// Point a project's `current` alias at a published tag
    SetCurrent {
        /// Project id
        project: String,
        /// Published tag
        tag: String,
    },
    /// List a project's published versions, newest first
    Versions {
        /// Project id
        project: String,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Record an artifact directory already present in the store as a version
    AddVersion {
        /// Project id
        project: String,
        /// Tag whose artifact directory exists
        tag: String,
    },
    /// Delete a published version and its artifact
    DeleteVersion {
        /// Project id
        project: String,
        /// Published tag
        tag: String,
    },
    /// Make project records agree with the artifact store
    Reconcile {
        /// Project id (defaults to every project)
        project: Option<String>,
    },
    /// Check environment and configuration
    Doctor,
}

#[derive(Debug, Subcommand)]
enum ProjectAction {
    /// Register a new project
    Create {
        /// Project id, used as its directory name in the store
        id: String,
        /// Repository to clone builds from
        repository_url: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
        /// Shell command producing the build output (defaults to `build.command`)
        #[arg(long)]
        build_command: Option<String>,
    },
    /// Delete a project and everything published for it
    Remove {
        /// Project id
        id: String,
    },
    /// List registered projects
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config_path = cli.config;

    let result = match cli.command {
        Command::Init => cmd_init(),
        Command::Project { action } => cmd_project(config_path, action),
        Command::Build { project, tag } => cmd_build(config_path, &project, &tag),
        Command::SetCurrent { project, tag } => cmd_set_current(config_path, &project, &tag),
        Command::Versions { project, json } => cmd_versions(config_path, &project, json),
        Command::AddVersion { project, tag } => cmd_add_version(config_path, &project, &tag),
        Command::DeleteVersion { project, tag } => {
            cmd_delete_version(config_path, &project, &tag)
        }
        Command::Reconcile { project } => cmd_reconcile(config_path, project.as_deref()),
        Command::Doctor => cmd_doctor(config_path),
    };

    if let Err(err) = result {
        eprintln!("{}", render_error(err.as_ref(), cli.verbose));
        process::exit(1);
    }
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the default level.
fn init_logging(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Format an error for the terminal.
///
/// Pipeline errors carry their kind and any captured command output; with
/// `verbose`, the chain of causes is appended.
fn render_error(err: &(dyn Error + 'static), verbose: bool) -> String {
    let mut out = match err.downcast_ref::<EngineError>() {
        Some(engine) => format!("error[{}]: {engine}", engine.kind()),
        None => format!("error: {err}"),
    };
    if let Some(diagnostics) = err
        .downcast_ref::<EngineError>()
        .and_then(EngineError::diagnostics)
    {
        out.push_str("\n\n");
        for line in diagnostics.trim_end().lines() {
            out.push_str("  | ");
            out.push_str(line);
            out.push('\n');
        }
        out.truncate(out.trim_end().len());
    }
    if verbose {
        let mut source = err.source();
        while let Some(cause) = source {
            out.push_str(&format!("\n  caused by: {cause}"));
            source = cause.source();
        }
    }
    out
}

/// Load `docship.toml` from the given path, or from the current directory.
fn load_config(path: Option<PathBuf>) -> Result<Config, Box<dyn Error>> {
    let path = match path {
        Some(path) => path,
        None => {
            let default = std::env::current_dir()?.join(CONFIG_FILE_NAME);
            if !default.exists() {
                return Err(
                    "no docship.toml found in current directory; run `docship init` to create one"
                        .into(),
                );
            }
            default
        }
    };
    let config = Config::from_path(&path)?;
    tracing::debug!(config = %path.display(), "configuration loaded");
    Ok(config)
}

fn publisher(config_path: Option<PathBuf>) -> Result<Publisher, Box<dyn Error>> {
    Ok(Publisher::new(load_config(config_path)?))
}

fn cmd_init() -> CliResult {
    let cwd = std::env::current_dir()?;
    let path = docship_engine::init_config(&cwd)?;
    eprintln!("    Created {}", path.display());
    eprintln!();
    eprintln!("  Next steps:");
    eprintln!("    docship project create <id> <repository-url>");
    eprintln!("    docship build <id> <tag>");
    Ok(())
}

fn cmd_project(config_path: Option<PathBuf>, action: ProjectAction) -> CliResult {
    let publisher = publisher(config_path)?;
    match action {
        ProjectAction::Create {
            id,
            repository_url,
            name,
            build_command,
        } => {
            let project = publisher.create_project(NewProject {
                id,
                repository_url,
                name,
                build_command,
            })?;
            eprintln!("    Created project `{}`", project.id);
        }
        ProjectAction::Remove { id } => {
            publisher.remove_project(&id)?;
            eprintln!("    Removed project `{id}`");
        }
        ProjectAction::List { json } => {
            let projects = publisher.list_projects()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&projects)?);
            } else if projects.is_empty() {
                eprintln!("No projects registered");
            } else {
                for project in &projects {
                    println!(
                        "{:<24} {:<12} {}",
                        project.id,
                        project.current_tag.as_deref().unwrap_or("-"),
                        project.repository_url
                    );
                }
            }
        }
    }
    Ok(())
}

fn cmd_build(config_path: Option<PathBuf>, project: &str, tag: &str) -> CliResult {
    let publisher = publisher(config_path)?;
    eprintln!("    Building {project} {tag}");
    let report = publisher.request_build(project, tag)?;
    let replaced = if report.republished {
        " (replaced previous build)"
    } else {
        ""
    };
    eprintln!(
        "   Published {project} {tag} in {:.2}s{replaced}",
        report.duration.as_secs_f64()
    );
    Ok(())
}

fn cmd_set_current(config_path: Option<PathBuf>, project: &str, tag: &str) -> CliResult {
    let publisher = publisher(config_path)?;
    let report = publisher.request_set_current(project, tag)?;
    match report.previous {
        Some(previous) if previous != tag => {
            eprintln!("    Switched {project} from {previous} to {tag}");
        }
        Some(_) => eprintln!("    {project} is already at {tag}"),
        None => eprintln!("    Switched {project} to {tag}"),
    }
    Ok(())
}

fn cmd_versions(config_path: Option<PathBuf>, project: &str, json: bool) -> CliResult {
    let publisher = publisher(config_path)?;
    let versions = publisher.versions(project)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&versions)?);
        return Ok(());
    }
    if versions.is_empty() {
        eprintln!("No published versions of {project}");
        return Ok(());
    }
    for version in &versions {
        let marker = if version.is_current { "*" } else { " " };
        println!(
            "{marker} {:<24} {}  {}",
            version.tag,
            version.published_at.format("%Y-%m-%d %H:%M:%S UTC"),
            version.url
        );
    }
    Ok(())
}

fn cmd_add_version(config_path: Option<PathBuf>, project: &str, tag: &str) -> CliResult {
    let publisher = publisher(config_path)?;
    publisher.add_version(project, tag)?;
    eprintln!("    Added {project} {tag}");
    Ok(())
}

fn cmd_delete_version(config_path: Option<PathBuf>, project: &str, tag: &str) -> CliResult {
    let publisher = publisher(config_path)?;
    let report = publisher.delete_version(project, tag)?;
    eprintln!("    Deleted {project} {tag}");
    if report.was_current {
        eprintln!("    warning: {project} has no current version now");
    }
    Ok(())
}

fn cmd_reconcile(config_path: Option<PathBuf>, project: Option<&str>) -> CliResult {
    let publisher = publisher(config_path)?;
    let reports = match project {
        Some(id) => vec![publisher.reconcile(id)?],
        None => publisher.reconcile_all()?,
    };
    for report in &reports {
        if report.is_clean() {
            eprintln!("       Clean {}", report.project_id);
            continue;
        }
        eprintln!("  Reconciled {}", report.project_id);
        for tag in &report.added {
            eprintln!("      added {tag}");
        }
        for tag in &report.dropped {
            eprintln!("    dropped {tag}");
        }
        if report.previous_current != report.current {
            eprintln!(
                "    current {} -> {}",
                report.previous_current.as_deref().unwrap_or("-"),
                report.current.as_deref().unwrap_or("-")
            );
        }
        if report.swept > 0 {
            eprintln!("      swept {} leftover(s)", report.swept);
        }
    }
    Ok(())
}

fn cmd_doctor(config_path: Option<PathBuf>) -> CliResult {
    eprintln!("Checking environment...");
    eprintln!();

    let mut issues = 0u32;

    let config = match load_config(config_path) {
        Ok(config) => {
            eprintln!("  [ok] Configuration");
            Some(config)
        }
        Err(e) => {
            eprintln!("  [!!] Configuration: {e}");
            issues += 1;
            None
        }
    };

    match docship_git::resolve_git(config.as_ref().and_then(|c| c.git.binary.as_deref())) {
        Ok(git) => eprintln!("  [ok] git: {} ({})", git.version, git.path.display()),
        Err(e) => {
            eprintln!("  [!!] git: {e}");
            issues += 1;
        }
    }

    if let Some(config) = &config {
        let dirs = [
            ("Artifact store", config.store.root.clone()),
            ("Project registry", config.registry.dir.clone()),
            ("Workspaces", config.workspace_root()),
        ];
        for (label, dir) in &dirs {
            match check_dir(dir) {
                Ok(()) => eprintln!("  [ok] {label}: {}", dir.display()),
                Err(e) => {
                    eprintln!("  [!!] {label}: {e}");
                    issues += 1;
                }
            }
        }
        match Publisher::new(config.clone()).list_projects() {
            Ok(projects) => eprintln!("  [ok] Projects: {}", projects.len()),
            Err(e) => {
                eprintln!("  [!!] Projects: {e}");
                issues += 1;
            }
        }
    }

    eprintln!();
    if issues > 0 {
        eprintln!("{issues} issue(s) found");
        Err(format!("{issues} issue(s) found").into())
    } else {
        eprintln!("All checks passed");
        Ok(())
    }
}

/// A directory is usable if it exists, or if it can be created, as a directory.
fn check_dir(dir: &Path) -> Result<(), String> {
    match std::fs::metadata(dir) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(format!("{} is not a directory", dir.display())),
        Err(_) => {
            let parent = dir
                .ancestors()
                .skip(1)
                .find(|p| p.exists())
                .unwrap_or_else(|| Path::new("."));
            if parent.is_dir() {
                Ok(())
            } else {
                Err(format!("{} cannot be created", dir.display()))
            }
        }
    }
}
