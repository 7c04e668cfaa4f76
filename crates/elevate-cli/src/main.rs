//! elevate CLI - offline policy operations
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`ELEVATE_*`)
//! 3. Explicit config file (`--config`)
//! 4. Global config (`/etc/elevate/config.toml`, or `ELEVATE_CONFIG`)
//! 5. Default values (lowest priority)
//!
//! # Commands
//!
//! - `check USER COMMAND [ARGS]...`: would the policy let USER elevate
//!   COMMAND? Group membership comes from `--member-of`; nothing on the
//!   machine is changed.
//! - `info USER`: the logon and elevation settings resolved for USER
//! - `update [--force]`: reload the policy from its primary source and
//!   refresh the cache
//! - `validate FILE`: parse and validate a JSON, TOML or CSV policy
//! - `import-csv FILE`: convert a CSV feed into a JSON policy document
//!
//! The exit status of `check` and `info` follows the result codes:
//! `0` allowed, `1` command not allowed, `5`/`6` unknown user or group.

mod offline;
mod tracing_writer;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use clap::{Parser, Subcommand};
use elevate_auth::{
    AuthorizationEngine, AuthorizationProvider, HostInfo, LocalFiles, SudoError, Verdict,
};
use elevate_policy::{import_csv, parse_document, PolicyDocument, PolicyFormat, PolicyStore};
use elevate_runtime::config::{ConfigLoader, ConfigResolver, ServiceConfig};
use elevate_types::{ResultCode, UserName};
use offline::{OfflineHost, StaticDirectory};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// elevate - check and maintain elevation policies
#[derive(Parser, Debug)]
#[command(name = "elevate")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file layered over the global config
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Policy path or URI (overrides policy.primary_source_uri)
    #[arg(short, long, global = true, value_name = "URI")]
    policy: Option<String>,

    /// Neither read nor write the policy cache
    #[arg(long, global = true)]
    no_cache: bool,

    /// Local machine name (defaults to this host's)
    #[arg(long, global = true, value_name = "NAME")]
    machine: Option<String>,

    /// Append logs to this file (also: ELEVATE_LOG_FILE)
    #[arg(long, global = true, value_name = "PATH")]
    log_file: Option<PathBuf>,

    /// File log level (default: info)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether USER may run COMMAND elevated
    Check {
        user: UserName,

        command: String,

        /// Command arguments, matched against the policy as one string
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,

        /// Treat USER as a member of GROUP (repeatable)
        #[arg(long = "member-of", value_name = "GROUP")]
        member_of: Vec<String>,

        /// Evaluate at this local time (HH:MM or HH:MM:SS)
        #[arg(long, value_parser = parse_time)]
        at: Option<NaiveTime>,
    },

    /// Show the settings resolved for USER
    Info {
        user: UserName,

        /// Treat USER as a member of GROUP (repeatable)
        #[arg(long = "member-of", value_name = "GROUP")]
        member_of: Vec<String>,
    },

    /// Reload the policy and refresh the cache
    Update {
        /// Go to the primary source even when the cache is fresh
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a policy file
    Validate {
        file: PathBuf,
    },

    /// Convert a CSV feed into a JSON policy document
    ImportCsv {
        file: PathBuf,

        /// Write the document here instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

fn parse_time(s: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| format!("expected HH:MM or HH:MM:SS, got '{s}'"))
}

/// Applies command-line flags over the loaded configuration.
#[derive(Debug, Default)]
struct CliConfigResolver {
    policy: Option<String>,
    no_cache: bool,
    log_file: Option<PathBuf>,
    log_level: Option<String>,
}

impl CliConfigResolver {
    fn from_args(args: &Args) -> Self {
        Self {
            policy: args.policy.clone(),
            no_cache: args.no_cache,
            log_file: args.log_file.clone(),
            log_level: args.log_level.clone(),
        }
    }
}

impl ConfigResolver for CliConfigResolver {
    fn apply(&self, config: &mut ServiceConfig) {
        if let Some(ref uri) = self.policy {
            config.policy.primary_source_uri.clone_from(uri);
        }
        if self.no_cache {
            config.policy.cache_enabled = false;
            config.policy.cache_use_as_primary = false;
        }
        if let Some(ref p) = self.log_file {
            config.logging.file = Some(p.clone());
        }
        if let Some(ref level) = self.log_level {
            config.logging.file_level.clone_from(level);
        }
    }
}

fn load_config(args: &Args) -> Result<ServiceConfig> {
    let mut loader = ConfigLoader::new();
    if let Some(ref path) = args.config {
        loader = loader.with_config_file(path);
    }
    let mut config = loader.load().context("config error")?;
    CliConfigResolver::from_args(args).apply(&mut config);
    Ok(config)
}

/// Terminal filter: --debug > --verbose > RUST_LOG > "warn".
/// File filter: `logging.file_level`, independent of the terminal.
fn init_tracing(args: &Args, config: &ServiceConfig) {
    let terminal_filter = if args.debug {
        EnvFilter::new("debug,ureq=warn,rustls=warn")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let terminal_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(terminal_filter);

    let file_layer = config.logging.file.as_deref().and_then(|path| {
        match tracing_writer::FileMakeWriter::open(path) {
            Ok(writer) => Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_writer(writer)
                    .with_filter(EnvFilter::new(&config.logging.file_level)),
            ),
            Err(e) => {
                eprintln!("Warning: cannot open log file {}: {e}", path.display());
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(terminal_layer)
        .with(file_layer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&args, &config);

    if let Some(ref path) = config.logging.file {
        info!(path = %path.display(), level = %config.logging.file_level, "File logging enabled");
    }

    let host = OfflineHost::new(args.machine.clone());
    let code = match args.command {
        Command::Check {
            user,
            command,
            args: command_args,
            member_of,
            at,
        } => {
            let engine = engine(&config, host, &member_of)?;
            let arguments = command_args.join(" ");
            let at = at.unwrap_or_else(|| chrono::Local::now().time());
            blocking(move || check(&engine, &user, &command, &arguments, at)).await?
        }
        Command::Info { user, member_of } => {
            let engine = engine(&config, host, &member_of)?;
            blocking(move || user_info(&engine, &user)).await?
        }
        Command::Update { force } => {
            let store = PolicyStore::new(config.policy.clone(), host.machine_name())?;
            blocking(move || update(&store, force)).await??
        }
        Command::Validate { file } => {
            validate(&file, &config, &host)?;
            ResultCode::Ok
        }
        Command::ImportCsv { file, output } => {
            convert(&file, output.as_deref(), &config, &host)?;
            ResultCode::Ok
        }
    };

    let status = code.exit_status();
    if status != 0 {
        std::process::exit(i32::from(status));
    }
    Ok(())
}

/// Runs policy work (file reads, HTTP fetches) off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("policy task panicked")
}

fn engine(config: &ServiceConfig, host: OfflineHost, member_of: &[String]) -> Result<AuthorizationEngine> {
    let machine = host.machine_name();
    let store = PolicyStore::new(config.policy.clone(), machine.clone())?;
    Ok(AuthorizationEngine::new(
        Arc::new(store),
        Arc::new(StaticDirectory::new(machine, member_of)),
        Arc::new(host),
        Arc::new(LocalFiles::new()),
    ))
}

/// Prints a lookup or policy failure and maps it to its result code.
fn report(err: &SudoError) -> ResultCode {
    tracing::debug!(error = %err, "request failed");
    eprintln!("error: {} ({err})", err.user_message());
    err.result_code()
}

fn check(
    engine: &AuthorizationEngine,
    user: &UserName,
    command: &str,
    arguments: &str,
    at: NaiveTime,
) -> ResultCode {
    let decision = match engine.check_at(user, command, arguments, at) {
        Ok(d) => d,
        Err(e) => return report(&e),
    };
    match decision.verdict {
        Verdict::Allowed => {
            let level = decision.logging_level.unwrap_or_default();
            match decision.matched_group {
                Some(group) => println!(
                    "allowed: {} (logging: {level}, via {group})",
                    decision.command_path.display()
                ),
                None => println!(
                    "allowed: {} (logging: {level})",
                    decision.command_path.display()
                ),
            }
            ResultCode::Ok
        }
        Verdict::Denied(reason) => {
            println!("denied: {reason}");
            ResultCode::CommandNotAllowed
        }
    }
}

fn user_info(engine: &AuthorizationEngine, user: &UserName) -> ResultCode {
    let info = match engine.user_info(user) {
        Ok(Some(info)) => info,
        Ok(None) => {
            println!("{user}: not in policy");
            return ResultCode::CommandNotAllowed;
        }
        Err(e) => return report(&e),
    };

    let show = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
    println!("user:                         {}", info.user);
    println!("matched group:                {}", show(info.matched_group.map(|g| g.to_string())));
    println!("privileges group:             {}", show(info.privileges_group.map(|g| g.to_string())));
    println!("logging level:                {}", info.logging_level);
    println!("invalid logons:               {}", show(info.invalid_logons.map(|n| n.to_string())));
    println!(
        "times exceeded invalid logons: {}",
        show(info.times_exceeded_invalid_logons.map(|n| n.to_string()))
    );
    println!("invalid logon timeout (s):    {}", show(info.invalid_logon_timeout.map(|n| n.to_string())));
    println!("lockout timeout (s):          {}", show(info.lockout_timeout.map(|n| n.to_string())));
    println!("logon timeout (s):            {}", show(info.logon_timeout.map(|n| n.to_string())));
    ResultCode::Ok
}

fn update(store: &PolicyStore, force: bool) -> Result<ResultCode> {
    let origin = store.try_update(force)?;
    let doc = store.snapshot()?;
    println!("policy loaded from {origin}: {}", summary(&doc));
    if store.config().cache_enabled {
        println!(
            "cache {}: {:?}",
            store.config().cache_file_path.display(),
            store.cache_state()
        );
    }
    Ok(ResultCode::Ok)
}

fn summary(doc: &PolicyDocument) -> String {
    format!(
        "{} users, {} user groups, {} command groups",
        doc.users.len(),
        doc.user_groups.len(),
        doc.command_groups.len()
    )
}

fn read_policy(file: &Path, config: &ServiceConfig, host: &OfflineHost) -> Result<PolicyDocument> {
    let body = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let origin = file.display().to_string();
    let schema = &config.policy.schema_uri;
    let doc = match PolicyFormat::from_path(file) {
        PolicyFormat::Csv => import_csv(&body, &host.machine_name(), schema, &origin)?,
        format => parse_document(&body, format, schema, &origin)?,
    };
    Ok(doc)
}

fn validate(file: &Path, config: &ServiceConfig, host: &OfflineHost) -> Result<()> {
    let doc = read_policy(file, config, host)?;
    println!("{}: valid ({})", file.display(), summary(&doc));
    Ok(())
}

fn convert(file: &Path, output: Option<&Path>, config: &ServiceConfig, host: &OfflineHost) -> Result<()> {
    let doc = import_csv(
        &std::fs::read_to_string(file).with_context(|| format!("cannot read {}", file.display()))?,
        &host.machine_name(),
        &config.policy.schema_uri,
        &file.display().to_string(),
    )?;
    let json = serde_json::to_string_pretty(&doc)?;
    match output {
        Some(path) => {
            std::fs::write(path, json + "\n")
                .with_context(|| format!("cannot write {}", path.display()))?;
            info!(path = %path.display(), users = doc.users.len(), "policy written");
            eprintln!("wrote {} ({})", path.display(), summary(&doc));
        }
        None => println!("{json}"),
    }
    Ok(())
}
