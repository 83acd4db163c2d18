//! nfcs: nfcshare command-line client
//!
//! Commands:
//!   encrypt <file> --user EMAIL=TAG ...  - split, encrypt, and share a file
//!   decrypt [--out DIR]                  - read tags from stdin, reconstruct files
//!   list                                 - files shared with the current principal
//!   admin files|logs|users               - read-only admin views
//!   status                               - storage backend and record counts
//!   config show                          - display current configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncBufReadExt, BufReader};

use nfcs_core::config::{KeyMode, NfcsConfig, StorageBackend};
use nfcs_share::{
    AuthorizedUser, EncryptOrchestrator, EncryptRequest, FileStatus, Reassembler,
    ReconstructionOutcome, SourceFile, Stores, TagMatchSession,
};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "nfcs",
    version,
    about = "nfcshare client",
    long_about = "nfcs: share files split across NFC tag holders; a file is only \
                  reconstructed once every holder's tag has been scanned"
)]
struct Cli {
    /// Path to nfcs.toml configuration file
    #[arg(long, short = 'c', env = "NFCS_CONFIG", default_value = "nfcs.toml")]
    config: PathBuf,

    /// Principal (email) to act as; overrides identity.principal
    #[arg(long = "as", env = "NFCS_PRINCIPAL")]
    principal: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Split a file into partitions, encrypt each, and share them
    ///
    /// Each --user holds one partition; give exactly as many users as
    /// partitions, in partition order.
    Encrypt {
        /// Local file to share
        file: PathBuf,
        /// Authorized holder as EMAIL=TAG (repeat once per partition)
        #[arg(long = "user", short = 'u', required = true)]
        users: Vec<AuthorizedUser>,
        /// Number of partitions (2-5, default: sharing.default_partitions)
        #[arg(long, short = 'n')]
        partitions: Option<usize>,
        /// MIME type (default: guessed from the file extension)
        #[arg(long)]
        mime: Option<String>,
        /// How partition keys are stored (default: sharing.key_mode)
        #[arg(long, value_enum)]
        key_mode: Option<KeyModeArg>,
    },

    /// Scan tags (one per line on stdin) and reconstruct completed files
    ///
    /// Type `:retry` to retry files whose reconstruction failed.
    Decrypt {
        /// Directory reconstructed files are written to
        #[arg(long, short = 'o', default_value = ".")]
        out: PathBuf,
    },

    /// List files that include a partition for the current principal
    List,

    /// Admin views
    Admin {
        #[command(subcommand)]
        view: AdminView,
    },

    /// Show storage status
    Status,

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum AdminView {
    /// Every encrypted file, newest first
    Files,
    /// Access log, newest first
    Logs,
    /// Every principal that appears in a record
    Users,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum KeyModeArg {
    Plain,
    TagWrapped,
}

impl From<KeyModeArg> for KeyMode {
    fn from(arg: KeyModeArg) -> Self {
        match arg {
            KeyModeArg::Plain => KeyMode::Plain,
            KeyModeArg::TagWrapped => KeyMode::TagWrapped,
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, from_file) = load_config(&cli.config)?;
    init_logging(&config.log.level, &config.log.format);

    if !from_file {
        tracing::warn!(path = %cli.config.display(), "config file not found, using defaults");
    }
    if config.sharing.key_mode == KeyMode::Plain {
        tracing::warn!(
            "sharing.key_mode = plain: partition keys are stored next to their ciphertext \
             locations; anyone who can read the records can decrypt without the tags"
        );
    }

    match cli.command {
        Commands::Encrypt { file, users, partitions, mime, key_mode } => {
            let principal = resolve_principal(cli.principal.as_deref(), &config)?;
            let key_mode = key_mode.map(KeyMode::from).unwrap_or(config.sharing.key_mode);
            let partitions = partitions.unwrap_or(config.sharing.default_partitions);
            cmd_encrypt(&config, &principal, &file, users, partitions, mime.as_deref(), key_mode)
                .await
        }
        Commands::Decrypt { out } => {
            let principal = resolve_principal(cli.principal.as_deref(), &config)?;
            cmd_decrypt(&config, &principal, &out).await
        }
        Commands::List => {
            let principal = resolve_principal(cli.principal.as_deref(), &config)?;
            cmd_list(&config, &principal).await
        }
        Commands::Admin { view } => cmd_admin(&config, view).await,
        Commands::Status => cmd_status(&config, cli.principal.as_deref()).await,
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

fn init_logging(level: &str, format: &str) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_env("NFCS_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr; stdout carries command output
    if format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Returns the config and whether it came from a file.
fn load_config(path: &Path) -> Result<(NfcsConfig, bool)> {
    if path.exists() {
        let config = NfcsConfig::load(path)
            .with_context(|| format!("loading config: {}", path.display()))?;
        Ok((config, true))
    } else {
        Ok((NfcsConfig::default(), false))
    }
}

fn resolve_principal(flag: Option<&str>, config: &NfcsConfig) -> Result<String> {
    flag.map(str::to_string)
        .or_else(|| config.identity.principal.clone())
        .filter(|p| !p.trim().is_empty())
        .context(
            "no principal set\n\
             Pass --as EMAIL, set NFCS_PRINCIPAL, or set identity.principal in nfcs.toml",
        )
}

// ── Stores from config + environment credentials ──────────────────────────────

/// Open the stores described by `[storage]`.
///
/// S3 credentials are read from AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY
/// (or NFCS_ACCESS_KEY_ID / NFCS_SECRET_ACCESS_KEY).
fn open_stores(config: &NfcsConfig) -> Result<(opendal::Operator, Stores)> {
    let credentials = if config.storage.backend == StorageBackend::S3 {
        let access_key = std::env::var("AWS_ACCESS_KEY_ID")
            .or_else(|_| std::env::var("NFCS_ACCESS_KEY_ID"))
            .context(
                "S3 credentials not set\n\
                 Set AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY environment variables.\n\
                 Example:\n\
                 \texport AWS_ACCESS_KEY_ID=your-key\n\
                 \texport AWS_SECRET_ACCESS_KEY=your-secret",
            )?;
        let secret_key = std::env::var("AWS_SECRET_ACCESS_KEY")
            .or_else(|_| std::env::var("NFCS_SECRET_ACCESS_KEY"))
            .context("AWS_SECRET_ACCESS_KEY environment variable not set")?;
        Some((access_key, secret_key))
    } else {
        None
    };

    let op = nfcs_storage::build_from_core_config(
        &config.storage,
        credentials.as_ref().map(|(a, s)| (a.as_str(), s.as_str())),
    )
    .context("building storage operator")?;
    let stores = Stores::from_operator(op.clone(), config.storage.blob_base_url());
    Ok((op, stores))
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(total: u64, prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

// ── `nfcs encrypt` ────────────────────────────────────────────────────────────

async fn cmd_encrypt(
    config: &NfcsConfig,
    principal: &str,
    file: &Path,
    users: Vec<AuthorizedUser>,
    partitions: usize,
    mime: Option<&str>,
    key_mode: KeyMode,
) -> Result<()> {
    let (_, stores) = open_stores(config)?;
    let source = SourceFile::read(file, mime)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let size = source.bytes.len() as u64;

    println!(
        "Encrypting {} ({}, {}) into {} partitions",
        source.name,
        source.mime,
        fmt_bytes(size),
        partitions,
    );

    let pb = make_progress_bar(100, "encrypt");
    let pb_clone = pb.clone();
    let mut orchestrator = EncryptOrchestrator::new(stores).with_progress(Box::new(
        move |stage, percent| {
            pb_clone.set_position(percent as u64);
            pb_clone.set_message(stage.to_string());
        },
    ));

    let result = orchestrator
        .encrypt_and_share(EncryptRequest {
            file: source,
            creator: principal.to_string(),
            users,
            partition_count: partitions,
            key_mode,
        })
        .await;
    pb.finish_and_clear();
    let record = result.context("encryption failed")?;

    println!();
    println!("Shared:");
    println!("  id:         {}", record.id);
    println!("  file:       {}", record.file_name);
    println!("  partitions: {}", record.partitions.len());
    for p in record.sorted_partitions() {
        println!("    [{}] {}  {}", p.part_index, p.user_email, p.url);
    }
    Ok(())
}

// ── `nfcs decrypt` ────────────────────────────────────────────────────────────

/// Scan-loop commands carry a `:` prefix; any other line is a tag.
const RETRY_COMMAND: &str = ":retry";

#[derive(Debug, PartialEq, Eq)]
enum ScanLine<'a> {
    Blank,
    Retry,
    Tag(&'a str),
}

fn parse_scan_line(line: &str) -> ScanLine<'_> {
    match line.trim() {
        "" => ScanLine::Blank,
        RETRY_COMMAND => ScanLine::Retry,
        tag => ScanLine::Tag(tag),
    }
}

async fn cmd_decrypt(config: &NfcsConfig, principal: &str, out: &Path) -> Result<()> {
    let (_, stores) = open_stores(config)?;
    let records = stores.records.list().await.context("loading records")?;
    let mut session = TagMatchSession::new(principal, records);

    if session.is_empty() {
        println!("No files shared with {principal}");
        return Ok(());
    }

    println!("Files shared with {principal}:");
    print_session(&session);
    println!();
    println!("Scan tags (one per line). Ctrl-D to finish.");

    let reassembler = Reassembler::new(&stores);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Some(line) = lines.next_line().await.context("reading tag input")? {
        match parse_scan_line(&line) {
            ScanLine::Blank => continue,
            ScanLine::Retry => {
                let failed: Vec<String> = session
                    .files()
                    .filter(|f| f.status() == FileStatus::Failed)
                    .map(|f| f.id().to_string())
                    .collect();
                if failed.is_empty() {
                    println!("Nothing to retry");
                }
                for id in failed {
                    let outcome = reassembler.retry(&mut session, &id).await?;
                    report_outcome(out, outcome).await?;
                }
            }
            ScanLine::Tag(tag) => {
                let outcomes = reassembler.submit_tag(&mut session, tag).await;
                print_session(&session);
                for outcome in outcomes {
                    report_outcome(out, outcome).await?;
                }
            }
        }

        if session.files().all(|f| f.status() == FileStatus::Reconstructed) {
            println!("All files reconstructed");
            break;
        }
    }
    Ok(())
}

fn print_session(session: &TagMatchSession) {
    for f in session.files() {
        let status = match f.status() {
            FileStatus::Pending => "pending",
            FileStatus::Ready => "ready",
            FileStatus::Reconstructed => "reconstructed",
            FileStatus::Failed => "FAILED",
        };
        let yours = if f.user_partition_verified(session.principal()) {
            "yes"
        } else {
            "no"
        };
        println!(
            "  {:<32} {}/{} verified  (your tag: {yours})  [{status}]",
            f.record().file_name,
            f.verified_count(),
            f.total(),
        );
    }
}

async fn report_outcome(out: &Path, outcome: ReconstructionOutcome) -> Result<()> {
    match outcome.result {
        Ok(bytes) => {
            let path = nfcs_share::save_reconstructed(out, &outcome.file_name, &bytes)
                .await
                .with_context(|| format!("saving {}", outcome.file_name))?;
            println!(
                "Reconstructed {} ({}) -> {}",
                outcome.file_name,
                fmt_bytes(bytes.len() as u64),
                path.display()
            );
        }
        Err(e) => {
            eprintln!("Failed to reconstruct {}: {e}", outcome.file_name);
            eprintln!("  type `{RETRY_COMMAND}` to try again");
        }
    }
    Ok(())
}

// ── `nfcs list` ───────────────────────────────────────────────────────────────

async fn cmd_list(config: &NfcsConfig, principal: &str) -> Result<()> {
    let (_, stores) = open_stores(config)?;
    let records = stores.records.list().await.context("loading records")?;
    let now = unix_now();

    let visible: Vec<_> = records.iter().filter(|r| r.is_visible_to(principal)).collect();
    if visible.is_empty() {
        println!("No files shared with {principal}");
        return Ok(());
    }
    for r in visible {
        let part = r
            .partition_for(principal)
            .map(|p| p.part_index.to_string())
            .unwrap_or_default();
        println!(
            "{}  {:<32} partition {part} of {}  by {}  {}",
            r.id,
            r.file_name,
            r.partitions.len(),
            r.created_by,
            fmt_age(now.saturating_sub(r.created_at)),
        );
    }
    Ok(())
}

// ── `nfcs admin` ──────────────────────────────────────────────────────────────

async fn cmd_admin(config: &NfcsConfig, view: AdminView) -> Result<()> {
    let (_, stores) = open_stores(config)?;
    let now = unix_now();

    match view {
        AdminView::Files => {
            let files = nfcs_share::admin::list_files(&stores).await?;
            println!("{} files", files.len());
            for r in files {
                let holders: Vec<&str> = r
                    .sorted_partitions()
                    .into_iter()
                    .map(|p| p.user_email.as_str())
                    .collect();
                println!(
                    "  {}  {:<32} by {:<24} {}  [{}]",
                    r.id,
                    r.file_name,
                    r.created_by,
                    fmt_age(now.saturating_sub(r.created_at)),
                    holders.join(", "),
                );
            }
        }
        AdminView::Logs => {
            let logs = nfcs_share::admin::list_access_logs(&stores).await?;
            println!("{} entries", logs.len());
            for l in logs {
                println!(
                    "  {:<10} {:<22} {:<24} {} ({})",
                    fmt_age(now.saturating_sub(l.timestamp)),
                    l.action.to_string(),
                    l.user,
                    l.file_name,
                    l.file_id,
                );
            }
        }
        AdminView::Users => {
            let users = nfcs_share::admin::list_principals(&stores).await?;
            println!("{} users", users.len());
            for u in users {
                println!(
                    "  {:<32} {} partitions, {} files created",
                    u.email, u.assigned_partitions, u.files_created
                );
            }
        }
    }
    Ok(())
}

// ── `nfcs status` ─────────────────────────────────────────────────────────────

async fn cmd_status(config: &NfcsConfig, principal: Option<&str>) -> Result<()> {
    let principal = principal
        .map(str::to_string)
        .or_else(|| config.identity.principal.clone());

    println!("nfcs v{}", env!("CARGO_PKG_VERSION"));
    println!("  principal: {}", principal.as_deref().unwrap_or("(not set)"));
    println!("  key mode:  {:?}", config.sharing.key_mode);
    println!("  backend:   {:?}", config.storage.backend);
    println!("  blobs:     {}", config.storage.blob_base_url());

    let (op, stores) = open_stores(config)?;
    match nfcs_storage::check_health(&op).await {
        Ok(()) => println!("  storage:   ok"),
        Err(e) => {
            println!("  storage:   UNREACHABLE ({e:#})");
            return Ok(());
        }
    }

    let records = stores.records.list().await.context("loading records")?;
    println!("  files:     {}", records.len());
    if let Some(p) = principal.as_deref() {
        let mine = records.iter().filter(|r| r.is_visible_to(p)).count();
        println!("  yours:     {mine}");
    }
    Ok(())
}

// ── `nfcs config show` ────────────────────────────────────────────────────────

fn cmd_config_show(config: &NfcsConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}

// ── Formatting ────────────────────────────────────────────────────────────────

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

fn fmt_age(secs: u64) -> String {
    let days = secs / 86400;
    let hours = (secs % 86400) / 3600;
    let mins = (secs % 3600) / 60;
    if days > 0 {
        format!("{days}d {hours}h ago")
    } else if hours > 0 {
        format!("{hours}h {mins}m ago")
    } else if mins > 0 {
        format!("{mins}m ago")
    } else {
        "just now".to_string()
    }
}

fn fmt_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
