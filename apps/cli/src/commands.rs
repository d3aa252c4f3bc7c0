//! CLI command definitions, routing, and tracing setup.

use std::io::Read;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use keywordkit_core::{BatchRequest, ProgressReporter, TopicClassifier, run_batch};
use keywordkit_shared::{
    AppConfig, BatchId, BatchRecord, Requester, ServerSettings, apply_env_overrides,
    config_file_path, init_config, load_config, resolve_secrets,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// KeywordKit: group keywords into topics and plan content around them.
#[derive(Parser)]
#[command(
    name = "keywordkit",
    version,
    about = "Turn raw keyword lists into topic groups, outlines, post ideas and a PDF report.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Process one keyword batch locally and write its report.
    Run {
        /// File with keywords separated by commas or newlines. `-` or
        /// omitted reads stdin.
        #[arg(short, long)]
        input: Option<String>,

        /// Report directory (defaults to `[report].output_dir`).
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Print the full batch record as JSON instead of a summary.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server.
    Serve {
        /// Listen port (overrides config and `PORT`).
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

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
        0 => "keywordkit=info,tower_http=info",
        1 => "keywordkit=debug,tower_http=debug",
        _ => "keywordkit=trace,tower_http=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Run { input, out, json } => cmd_run(input.as_deref(), out, json).await,
        Command::Serve { port } => cmd_serve(port).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

fn resolved_config() -> Result<AppConfig> {
    let mut config = load_config()?;
    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn read_input(input: Option<&str>) -> Result<String> {
    match input {
        None | Some("-") => {
            let mut raw = String::new();
            std::io::stdin()
                .read_to_string(&mut raw)
                .wrap_err("failed to read keywords from stdin")?;
            Ok(raw)
        }
        Some(path) => std::fs::read_to_string(Path::new(path))
            .wrap_err_with(|| format!("failed to read keywords from '{path}'")),
    }
}

async fn cmd_run(input: Option<&str>, out: Option<PathBuf>, json: bool) -> Result<()> {
    let config = resolved_config()?;
    let raw = read_input(input)?;
    if raw.trim().is_empty() {
        return Err(eyre!("no keywords given"));
    }

    let request = BatchRequest {
        id: BatchId::new(),
        raw,
        requester: Requester::default(),
        output_dir: out.unwrap_or_else(|| PathBuf::from(&config.report.output_dir)),
    };
    let classifier = TopicClassifier::new(config.topics);

    info!(batch_id = %request.id, out = %request.output_dir.display(), "processing keyword batch");

    let reporter = CliProgress::new()?;
    let record = run_batch(&request, &classifier, &reporter)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        print_summary(&record);
    }
    Ok(())
}

fn print_summary(record: &BatchRecord) {
    println!();
    println!("  Keyword batch processed!");
    println!("  ID:       {}", record.id);
    println!("  Keywords: {}", record.keywords.len());
    println!("  Groups:   {}", record.groups.len());
    for group in &record.groups {
        println!("    {:<14} {}", group.label, group.items.len());
    }
    println!(
        "  Report:   {} ({} page{}, {} bytes)",
        record.artifact.path.display(),
        record.artifact.page_count,
        if record.artifact.page_count == 1 { "" } else { "s" },
        record.artifact.size_bytes
    );
    println!("  SHA-256:  {}", record.artifact.sha256);
    println!();
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// Spinner that shows the current pipeline phase.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Result<Self> {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")?
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Ok(Self { spinner })
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _record: &BatchRecord) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    fn drop(&mut self) {
        // Failed runs never reach `done`.
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}

// ---------------------------------------------------------------------------
// Server and config
// ---------------------------------------------------------------------------

async fn cmd_serve(port: Option<u16>) -> Result<()> {
    let mut config = resolved_config()?;
    if let Some(port) = port {
        config.server.port = port;
    }

    let secrets = resolve_secrets(&config)?;
    let settings = ServerSettings::from_config(&config, secrets)?;
    let classifier = TopicClassifier::new(config.topics);

    info!(
        addr = %settings.addr,
        workers = settings.workers,
        bot = settings.bot_token.is_some(),
        output_dir = %settings.output_dir.display(),
        "starting server"
    );
    keywordkit_server::serve(settings, classifier).await?;
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config = resolved_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("# {}", config_file_path()?.display());
    println!("{toml_str}");

    for (what, var_name) in [
        ("download token", &config.server.download_token_env),
        ("signing secret", &config.server.signing_secret_env),
        ("bot token", &config.server.bot_token_env),
    ] {
        let state = match std::env::var(var_name) {
            Ok(v) if !v.is_empty() => "set",
            _ => "not set",
        };
        println!("# {what} ({var_name}): {state}");
    }
    Ok(())
}
