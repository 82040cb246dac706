//! Strato CLI entrypoint.
//!
//! This is the main entrypoint for the strato command-line tool.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use strato::cli::{Cli, Commands, OutputFormatter, StateCommands};
use strato::config::{
    find_config_file, StateBackend, TopologyConfig, TopologyHasher, TopologyParser,
    TopologyValidator,
};
use strato::error::{PlanError, Result, StratoError};
use strato::graph::{DesiredStateGraph, GraphBuilder};
use strato::planner::{DiffEngine, PlanAssembler, PlanExecutor};
use strato::provider::HttpCloudProvider;
use strato::state::{LocalSnapshotStore, S3SnapshotStore, SnapshotStore};

use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Exit code for topology validation and cycle errors.
const EXIT_VALIDATION: u8 = 2;
/// Exit code for an apply that left some steps unfinished.
const EXIT_PARTIAL: u8 = 3;

/// Main entrypoint.
fn main() -> ExitCode {
    let cli = Cli::parse_args();

    // Initialize logging
    init_logging(cli.verbose);

    // Run async runtime
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            if e.is_validation() {
                ExitCode::from(EXIT_VALIDATION)
            } else if matches!(e, StratoError::Plan(PlanError::PartialFailure { .. })) {
                ExitCode::from(EXIT_PARTIAL)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

/// Initializes the logging system.
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Main async entry point.
async fn run(cli: Cli) -> Result<()> {
    let formatter = OutputFormatter::new(cli.output);

    match cli.command {
        Commands::Init { path, force } => cmd_init(&path, force),
        Commands::Validate { warnings } => cmd_validate(cli.config.as_ref(), warnings),
        Commands::Plan { detailed } => cmd_plan(cli.config.as_ref(), detailed, &formatter).await,
        Commands::Apply { yes, max_retries } => {
            cmd_apply(cli.config.as_ref(), yes, max_retries, &formatter).await
        }
        Commands::Destroy { yes } => cmd_destroy(cli.config.as_ref(), yes, &formatter).await,
        Commands::Outputs { resource } => {
            cmd_outputs(cli.config.as_ref(), resource.as_deref(), &formatter).await
        }
        Commands::State { command } => cmd_state(cli.config.as_ref(), command, &formatter).await,
    }
}

/// Initialize a new project.
fn cmd_init(path: &PathBuf, force: bool) -> Result<()> {
    info!("Initializing new Strato project in: {}", path.display());

    let config_path = path.join("strato.topology.yaml");
    let env_path = path.join(".env.example");
    let gitignore_path = path.join(".gitignore");

    // Check if files exist
    if !force && config_path.exists() {
        eprintln!("Topology file already exists: {}", config_path.display());
        eprintln!("Use --force to overwrite.");
        return Ok(());
    }

    // Create directory if needed
    if !path.exists() {
        std::fs::create_dir_all(path)?;
    }

    // Write topology template
    let config_template = include_str!("../templates/strato.topology.yaml");
    std::fs::write(&config_path, config_template)?;
    eprintln!("Created: {}", config_path.display());

    // Write .env.example
    let env_template = include_str!("../templates/.env.example");
    std::fs::write(&env_path, env_template)?;
    eprintln!("Created: {}", env_path.display());

    // Write/update .gitignore
    let gitignore_content = ".env\n.strato/\n";
    if gitignore_path.exists() {
        let existing = std::fs::read_to_string(&gitignore_path)?;
        if !existing.contains(".env") || !existing.contains(".strato") {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&gitignore_path)?;
            writeln!(file, "\n# Strato")?;
            if !existing.contains(".env") {
                writeln!(file, ".env")?;
            }
            if !existing.contains(".strato") {
                writeln!(file, ".strato/")?;
            }
            eprintln!("Updated: {}", gitignore_path.display());
        }
    } else {
        std::fs::write(&gitignore_path, gitignore_content)?;
        eprintln!("Created: {}", gitignore_path.display());
    }

    eprintln!("\nProject initialized successfully!");
    eprintln!("Next steps:");
    eprintln!("  1. Copy .env.example to .env and fill in your provider credentials");
    eprintln!("  2. Edit strato.topology.yaml with your resources");
    eprintln!("  3. Run 'strato validate' to check your topology");
    eprintln!("  4. Run 'strato plan' to see what will change");
    eprintln!("  5. Run 'strato apply' to provision your stack");

    Ok(())
}

/// Validate the topology.
fn cmd_validate(config_path: Option<&PathBuf>, show_warnings: bool) -> Result<()> {
    let (config, graph) = load_topology(config_path)?;

    let validator = TopologyValidator::new();
    let result = validator.validate(&config)?;

    eprintln!("Topology is valid!");
    if show_warnings && !result.warnings.is_empty() {
        eprintln!("\nWarnings:");
        for warning in &result.warnings {
            eprintln!("  - {warning}");
        }
    }

    // Show summary
    eprintln!("\nTopology summary:");
    eprintln!("  Project: {}", config.project.name);
    eprintln!("  Environment: {}", config.project.environment);
    eprintln!("  Resources: {}", graph.len());

    Ok(())
}

/// Show the execution plan.
async fn cmd_plan(
    config_path: Option<&PathBuf>,
    detailed: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, graph) = load_topology(config_path)?;
    let store = create_store(config_path, &config).await?;

    // Never plan against a snapshot another apply is rewriting
    store.ensure_unlocked().await?;
    let snapshot = store.load().await?;

    let topology_hash = TopologyHasher::new().hash_topology(&config);
    let diff = DiffEngine::new().compute_diff(&graph, snapshot.as_ref());
    let plan = PlanAssembler::new().assemble(&graph, &diff, snapshot.as_ref())?;

    let output = formatter.format_plan(&plan, &diff, &topology_hash);
    eprintln!("{output}");

    if detailed && diff.has_changes() {
        eprintln!("\nDetailed changes:");
        eprint!("{}", OutputFormatter::format_diff_details(&diff));
    }

    Ok(())
}

/// Apply the topology.
async fn cmd_apply(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    max_retries: u32,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, graph) = load_topology(config_path)?;
    let store = create_store(config_path, &config).await?;
    let provider = create_provider()?;

    store.ensure_unlocked().await?;
    let snapshot = store.load().await?;
    let baseline = snapshot.as_ref().map(|s| s.last_updated);

    let topology_hash = TopologyHasher::new().hash_topology(&config);
    let diff = DiffEngine::new().compute_diff(&graph, snapshot.as_ref());
    let plan = PlanAssembler::new().assemble(&graph, &diff, snapshot.as_ref())?;

    if plan.is_noop() {
        eprintln!("No changes to apply.");
        return Ok(());
    }

    // Show plan
    let output = formatter.format_plan(&plan, &diff, &topology_hash);
    eprintln!("{output}");

    // Confirm
    if !auto_approve && !confirm("Do you want to apply this plan? [y/N]: ", "y")? {
        eprintln!("Apply cancelled.");
        return Ok(());
    }

    // Execute plan
    let executor =
        PlanExecutor::new(&provider, &*store, &config.project).with_max_retries(max_retries);
    let report = executor.execute(&plan, &topology_hash, baseline).await?;

    eprintln!("\n{}", formatter.format_report(&report));

    report.as_error().map_or(Ok(()), Err)
}

/// Destroy every recorded resource.
async fn cmd_destroy(
    config_path: Option<&PathBuf>,
    auto_approve: bool,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _graph) = load_topology(config_path)?;
    let store = create_store(config_path, &config).await?;
    let provider = create_provider()?;

    store.ensure_unlocked().await?;
    let Some(snapshot) = store.load().await? else {
        eprintln!("No snapshot found; nothing to destroy.");
        return Ok(());
    };
    if snapshot.is_empty() {
        eprintln!("No resources to destroy.");
        return Ok(());
    }

    let plan = PlanAssembler::new().assemble_destroy(&snapshot);

    eprintln!("The following resources will be destroyed:");
    for step in &plan.steps {
        eprintln!("  - {} ({})", step.name, step.kind.as_str());
    }

    // Confirm
    if !auto_approve
        && !confirm("\nThis action is IRREVERSIBLE. Type 'destroy' to confirm: ", "destroy")?
    {
        eprintln!("Destruction cancelled.");
        return Ok(());
    }

    let executor = PlanExecutor::new(&provider, &*store, &config.project);
    let report = executor
        .execute_destroy(&plan, Some(snapshot.last_updated))
        .await?;

    eprintln!("\n{}", formatter.format_report(&report));

    report.as_error().map_or(Ok(()), Err)
}

/// Show emergent outputs.
async fn cmd_outputs(
    config_path: Option<&PathBuf>,
    resource: Option<&str>,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _graph) = load_topology(config_path)?;
    let store = create_store(config_path, &config).await?;

    let Some(snapshot) = store.load().await? else {
        eprintln!("No snapshot found. Run 'strato apply' first.");
        return Ok(());
    };

    eprint!("{}", formatter.format_outputs(&snapshot, resource));
    Ok(())
}

/// State management commands.
async fn cmd_state(
    config_path: Option<&PathBuf>,
    command: StateCommands,
    formatter: &OutputFormatter,
) -> Result<()> {
    let (config, _graph) = load_topology(config_path)?;
    let store = create_store(config_path, &config).await?;

    match command {
        StateCommands::Show => {
            if let Some(snapshot) = store.load().await? {
                eprintln!("{}", formatter.format_snapshot(&snapshot));
            } else {
                eprintln!("No snapshot found.");
            }
        }
        StateCommands::Lock { holder } => {
            let holder_str = holder
                .unwrap_or_else(strato::state::generate_holder_id);
            let lock = store.acquire_lock(&holder_str).await?;
            eprintln!("Snapshot locked: {}", lock.lock_id);
        }
        StateCommands::Unlock { lock_id, force } => {
            if force {
                if let Some(lock_info) = store.get_lock_info().await? {
                    store.release_lock(&lock_info.lock_id).await?;
                    eprintln!("Snapshot forcefully unlocked.");
                }
            } else if let Some(id) = lock_id {
                store.release_lock(&id).await?;
                eprintln!("Snapshot unlocked.");
            } else {
                eprintln!("Please provide --lock-id or use --force");
            }
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Resolves the topology file path.
fn resolve_config_path(config_path: Option<&PathBuf>) -> Result<PathBuf> {
    config_path.map_or_else(|| find_config_file("."), |path| Ok(path.clone()))
}

/// Loads and validates the topology, returning it with its compiled graph.
fn load_topology(config_path: Option<&PathBuf>) -> Result<(TopologyConfig, DesiredStateGraph)> {
    let config_file = resolve_config_path(config_path)?;
    debug!("Loading topology from: {}", config_file.display());

    let parser = TopologyParser::new().with_base_path(
        config_file
            .parent()
            .unwrap_or_else(|| std::path::Path::new(".")),
    );
    parser.load_dotenv()?;

    let config = parser.load_with_env(&config_file)?;

    TopologyValidator::new().validate(&config)?;
    let graph = GraphBuilder::new().build(&config)?;

    Ok((config, graph))
}

/// Creates the snapshot store named by the topology's state block.
async fn create_store(
    config_path: Option<&PathBuf>,
    config: &TopologyConfig,
) -> Result<Box<dyn SnapshotStore>> {
    let config_file = resolve_config_path(config_path)?;
    let project = &config.project.name;
    let environment = &config.project.environment;

    let store: Box<dyn SnapshotStore> = match config.state.backend {
        StateBackend::Local => {
            let dir = config.state.path.as_ref().map_or_else(
                || {
                    config_file
                        .parent()
                        .unwrap_or_else(|| std::path::Path::new("."))
                        .join(".strato")
                },
                PathBuf::from,
            );
            Box::new(LocalSnapshotStore::with_base_dir(dir, project, environment))
        }
        StateBackend::S3 => {
            let bucket = config
                .state
                .bucket
                .as_deref()
                .ok_or_else(|| StratoError::internal("S3 bucket not configured"))?;
            let prefix = config.state.prefix.as_deref();
            let region = config
                .state
                .region
                .as_deref()
                .or(config.project.region.as_deref());
            Box::new(S3SnapshotStore::new(bucket, prefix, region, project, environment).await?)
        }
    };

    Ok(store)
}

/// Creates the provider API client from the environment.
fn create_provider() -> Result<HttpCloudProvider> {
    let url = TopologyParser::get_provider_url()?;
    let token = TopologyParser::get_provider_token()?;
    HttpCloudProvider::new(&url, &token)
}

/// Prompts on stderr and compares the trimmed reply to `expected`
/// (case-insensitive).
fn confirm(prompt: &str, expected: &str) -> Result<bool> {
    eprint!("{prompt}");
    std::io::stderr().flush()?;

    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case(expected))
}
