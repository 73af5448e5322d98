use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use console::style;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use anvil::audit::actions;
use anvil::config::AnvilConfig;
use anvil::daemon::{check_daemon_health, send_signal};
use anvil::lifecycle::replay::{ReplayOptions, compute_audit_delta, rebuild_state_from_audit};
use anvil::lifecycle::resume::{compute_resume_strategy, execute_resume};
use anvil::lifecycle::format_run_summary;
use anvil::project::ProjectManager;

#[derive(Parser)]
#[command(name = "anvil")]
#[command(version, about = "Crash-recoverable build pipeline orchestrator")]
pub struct Cli {
    #[arg(long, global = true)]
    pub project_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create the control directory for a project
    Init,
    /// Show the current run state
    Status {
        /// Cross-check the state snapshot against the audit log
        #[arg(long)]
        verify: bool,
    },
    /// Resume a stopped run
    Resume,
    /// Rebuild the state snapshot from the audit log
    Recover,
    /// Send a raw line to the daemon's dispatch FIFO
    Signal {
        message: String,
    },
    /// Run the dispatch daemon in the foreground
    Daemon,
    /// Report daemon liveness for this project
    Health,
    /// Ask a running daemon to shut down
    Stop,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let project_dir = match cli.project_dir.clone() {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to get current directory")?,
    };
    let project = ProjectManager::new(&project_dir);

    match &cli.command {
        Commands::Init => cmd_init(&project)?,
        Commands::Status { verify } => cmd_status(&project, *verify)?,
        Commands::Resume => cmd_resume(&project)?,
        Commands::Recover => cmd_recover(&project)?,
        Commands::Signal { message } => cmd_signal(&project, message)?,
        Commands::Daemon => cmd_daemon(&project).await?,
        Commands::Health => cmd_health(&project),
        Commands::Stop => cmd_stop(&project)?,
    }
    Ok(())
}

fn load_config(project: &ProjectManager) -> Result<AnvilConfig> {
    AnvilConfig::load_or_default(&project.config_path())
}

fn replay_options(config: &AnvilConfig) -> ReplayOptions {
    ReplayOptions {
        shaping_enabled: config.shaping,
    }
}

fn cmd_init(project: &ProjectManager) -> Result<()> {
    project.init()?;
    let config = load_config(project)?;
    if !project.config_path().exists() {
        config.save(&project.config_path())?;
    }
    println!(
        "Initialized control directory at {}",
        project.control_dir().display()
    );
    Ok(())
}

fn cmd_status(project: &ProjectManager, verify: bool) -> Result<()> {
    let Some(state) = project.load_state()? else {
        println!("No run found in {}", project.project_dir().display());
        return Ok(());
    };
    println!("{}", format_run_summary(&state));

    if verify {
        let config = load_config(project)?;
        let entries = project.audit_log().load()?;
        let delta = compute_audit_delta(&state, &entries, &replay_options(&config));
        if delta.is_empty() {
            println!("{}", style("State matches audit log.").green());
        } else {
            println!("{}", style("State diverges from audit log:").red().bold());
            for line in delta {
                println!("  {line}");
            }
        }
    }
    Ok(())
}

fn cmd_resume(project: &ProjectManager) -> Result<()> {
    // A live daemon owns the state; hand the resume to it over the FIFO.
    if check_daemon_health(project.project_dir()).alive {
        if send_signal(project.project_dir(), "resume") {
            println!("Resume directive sent to daemon.");
            return Ok(());
        }
        println!(
            "{}",
            style("Daemon alive but not reading its FIFO; resuming in-process.").yellow()
        );
    }

    let Some(state) = project.load_state()? else {
        bail!("no run to resume in {}", project.project_dir().display());
    };
    let strategy = compute_resume_strategy(&state)?;
    println!(
        "Resuming at phase {} ({} components already done)",
        style(strategy.resume_phase).bold(),
        strategy.completed_components.len()
    );
    let resumed = execute_resume(state, &strategy);
    project.audit_log().append(
        actions::RESUME,
        &format!("resuming at phase {}", strategy.resume_phase),
    )?;
    project.save_state(&resumed)?;
    println!("{}", style("Run is active again.").green());
    Ok(())
}

fn cmd_recover(project: &ProjectManager) -> Result<()> {
    let config = load_config(project)?;
    let entries = project.audit_log().load()?;
    if entries.is_empty() {
        bail!("audit log is empty, nothing to recover from");
    }
    let rebuilt = rebuild_state_from_audit(
        &entries,
        project.project_dir().to_string_lossy().as_ref(),
        &replay_options(&config),
    );
    project.save_state(&rebuilt)?;
    println!(
        "Rebuilt state from {} audit entries:",
        style(entries.len()).bold()
    );
    println!("{}", format_run_summary(&rebuilt));
    Ok(())
}

/// Foreground supervision daemon: dispatches directives and watches state.
/// Phase execution itself requires a configured backend runner, so this mode
/// keeps the run supervised without advancing it.
async fn cmd_daemon(project: &ProjectManager) -> Result<()> {
    use anvil::daemon::{Daemon, PhaseRunner};
    use anvil::lifecycle::RunState;

    struct SupervisorRunner;

    #[async_trait::async_trait]
    impl PhaseRunner for SupervisorRunner {
        async fn run_once(&mut self, _state: &mut RunState) -> Result<()> {
            Ok(())
        }
    }

    let config = load_config(project)?;
    let mut daemon = Daemon::new(project.project_dir(), config);
    println!(
        "Daemon running for {} (pid {}). Send 'shutdown' to stop.",
        project.project_dir().display(),
        std::process::id()
    );
    daemon.run(&mut SupervisorRunner).await
}

fn cmd_signal(project: &ProjectManager, message: &str) -> Result<()> {
    if send_signal(project.project_dir(), message) {
        println!("Sent: {message}");
    } else {
        bail!("could not deliver signal (daemon not running or FIFO missing)");
    }
    Ok(())
}

fn cmd_health(project: &ProjectManager) {
    let health = check_daemon_health(project.project_dir());
    let verdict = if health.alive {
        style("alive").green()
    } else {
        style("not running").red()
    };
    println!("Daemon: {verdict}");
    match health.pid {
        Some(pid) => println!("  Pid: {pid}"),
        None => println!("  Pid: none recorded"),
    }
    println!(
        "  FIFO: {}",
        if health.fifo_exists { "present" } else { "missing" }
    );
}

fn cmd_stop(project: &ProjectManager) -> Result<()> {
    if send_signal(project.project_dir(), "shutdown") {
        println!("Shutdown directive sent.");
        return Ok(());
    }
    // No reader attached; leave the sentinel so a wedged daemon still exits
    // at its next loop iteration.
    project.request_shutdown()?;
    println!("Shutdown sentinel written.");
    Ok(())
}
