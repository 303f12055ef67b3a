//! CLI command definitions, routing, and tracing setup.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use quizrelay_core::{
    ItemOutcome, Orchestrator, ProgressReporter, RunOptions, Stages, TelegramDistributor,
    Translator, mark_all,
};
use quizrelay_extract::QuizExtractor;
use quizrelay_render::DocumentRenderer;
use quizrelay_shared::{AppConfig, ItemId, RunSummary, init_config, load_config, load_config_from};
use quizrelay_source::{SessionManager, SourceClient};
use quizrelay_storage::{Backend, SessionStore, StateStore, build_backend};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// quizrelay: relay daily current-affairs quizzes to a Telegram channel.
#[derive(Parser)]
#[command(
    name = "quizrelay",
    version,
    about = "Discover new quizzes, translate them, render a PDF and post it to Telegram.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.quizrelay/quizrelay.toml).
    #[arg(long, global = true, env = "QUIZRELAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Defaults to `run`.
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process every new quiz once.
    Run {
        /// Quizzes processed at once (overrides `run.concurrency`).
        #[arg(long)]
        concurrency: Option<usize>,

        /// Stop starting new quizzes after this many seconds.
        #[arg(long)]
        deadline: Option<u64>,

        /// List new quizzes without processing them.
        #[arg(long)]
        dry_run: bool,
    },

    /// Mark every listed quiz as processed without posting anything.
    MarkAll,

    /// Processed-state inspection.
    State {
        #[command(subcommand)]
        action: StateAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum StateAction {
    /// Print the processed quiz URLs.
    Show,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "quizrelay=info",
        1 => "quizrelay=debug",
        _ => "quizrelay=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt().with_env_filter(env_filter).with_target(false).init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command.unwrap_or(Command::Run {
        concurrency: None,
        deadline: None,
        dry_run: false,
    }) {
        Command::Run {
            concurrency,
            deadline,
            dry_run,
        } => cmd_run(config_path, concurrency, deadline, dry_run).await,
        Command::MarkAll => cmd_mark_all(config_path).await,
        Command::State { action } => match action {
            StateAction::Show => cmd_state_show(config_path).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(config_path).await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn load(path: Option<PathBuf>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(&p)?,
        None => load_config()?,
    };
    config.validate()?;
    Ok(config)
}

async fn open_state(config: &AppConfig) -> Result<StateStore> {
    let backend = build_backend(
        &config.state.local_path,
        config.state_remote().as_ref(),
        config.source.timeout(),
        StateStore::accepts,
    )?;
    info!(backend = backend.name(), remote = backend.has_remote(), "opening processed state");
    Ok(StateStore::load(Box::new(backend)).await)
}

fn session_manager(config: &AppConfig) -> Result<SessionManager> {
    let backend = build_backend(
        &config.session.local_path,
        config.session_remote().as_ref(),
        config.source.timeout(),
        SessionStore::accepts,
    )?;
    let credentials = match config.credentials() {
        Ok(c) => Some(c),
        Err(e) => {
            warn!(error = %e, "login credentials not set, relying on the stored session");
            None
        }
    };
    Ok(SessionManager::new(
        &config.source,
        SessionStore::new(Box::new(backend)),
        credentials,
    )?)
}

fn flush_timeout(config: &AppConfig) -> Duration {
    Duration::from_secs(config.remote.flush_timeout_secs)
}

/// Cancel `token` on Ctrl-C, and after `deadline` if one is set.
fn install_cancellation(token: &CancellationToken, deadline: Option<Duration>) {
    let on_signal = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight quizzes");
            on_signal.cancel();
        }
    });

    if let Some(deadline) = deadline {
        let on_deadline = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(deadline).await;
            warn!(secs = deadline.as_secs(), "deadline reached, not starting new quizzes");
            on_deadline.cancel();
        });
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_run(
    config_path: Option<PathBuf>,
    concurrency: Option<usize>,
    deadline: Option<u64>,
    dry_run: bool,
) -> Result<()> {
    let config = load(config_path)?;

    // The bot token is only needed once something is actually sent.
    let token = if dry_run {
        config.bot_token().unwrap_or_default()
    } else {
        config.bot_token()?
    };

    let stages = Stages {
        session: Box::new(session_manager(&config)?),
        source: Box::new(SourceClient::new(&config.source, &config.retry)?),
        extractor: Box::new(QuizExtractor::new()?),
        enricher: Box::new(Translator::new(&config.translate, &config.retry)?),
        renderer: Box::new(
            DocumentRenderer::new(&config.render).with_footer(config.telegram.branding.clone()),
        ),
        distributor: Box::new(TelegramDistributor::new(&config.telegram, token)?),
    };
    let options = RunOptions {
        concurrency: concurrency.unwrap_or(config.run.concurrency).max(1),
        dry_run,
        flush_timeout: flush_timeout(&config),
    };
    let state = open_state(&config).await?;
    info!(processed = state.len().await, "loaded processed state");

    let orchestrator = Orchestrator::new(stages, state, options);

    let cancel = CancellationToken::new();
    install_cancellation(
        &cancel,
        deadline.or(config.run.deadline_secs).map(Duration::from_secs),
    );

    let reporter = CliProgress::new();
    let outcome = orchestrator.run(&cancel, &reporter).await;

    print_summary(&outcome.summary, dry_run);

    match outcome.fatal {
        Some(cause) => Err(eyre!(cause)),
        None => Ok(()),
    }
}

async fn cmd_mark_all(config_path: Option<PathBuf>) -> Result<()> {
    let config = load(config_path)?;
    let session = session_manager(&config)?;
    let source = SourceClient::new(&config.source, &config.retry)?;
    let state = open_state(&config).await?;

    let reporter = CliProgress::new();
    let marked = mark_all(&session, &source, &state, flush_timeout(&config), &reporter).await;
    reporter.spinner.finish_and_clear();

    let marked = marked?;
    println!();
    println!("  Marked:    {marked}");
    println!("  Processed: {}", state.len().await);
    println!();
    Ok(())
}

async fn cmd_state_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = load(config_path)?;
    let state = open_state(&config).await?;
    let snapshot = state.snapshot().await;

    println!("Processed quizzes: {}", snapshot.len());
    for id in snapshot.sorted() {
        println!("  {id}");
    }
    Ok(())
}

async fn cmd_config_init(config_path: Option<PathBuf>) -> Result<()> {
    let path = init_config(config_path.as_deref())?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<PathBuf>) -> Result<()> {
    let config = load(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

fn print_summary(summary: &RunSummary, dry_run: bool) {
    println!();
    println!("  Run:         {}", summary.run_id);
    println!("  Discovered:  {}", summary.discovered);
    println!("  New:         {}", summary.new);
    if dry_run {
        println!("  (dry run, nothing processed)");
    } else {
        println!("  Succeeded:   {}", summary.succeeded);
        println!("  Failed:      {}", summary.failed);
        if summary.not_started > 0 {
            println!("  Not started: {}", summary.not_started);
        }
    }
    for (id, stage, error) in &summary.failures {
        println!("    ✗ [{stage}] {id}: {error}");
    }
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn item_started(&self, id: &ItemId, current: usize, total: usize) {
        self.spinner.set_message(format!("Processing [{current}/{total}] {id}"));
    }

    fn item_finished(&self, id: &ItemId, outcome: &ItemOutcome) {
        match outcome {
            ItemOutcome::Committed => self.spinner.println(format!("  ✓ {id}")),
            ItemOutcome::Failed(failure) => self.spinner.println(format!("  ✗ {id}: {failure}")),
            ItemOutcome::NotStarted => {}
        }
    }

    fn done(&self, _summary: &RunSummary) {
        self.spinner.finish_and_clear();
    }
}
