//! dbquery CLI Entry Point
//!
//! Subcommands:
//! - `query` - Run one read-only query and print the records
//! - `check` - Run the family's probe query to test a connection
//! - `profile` - Save and list named connection profiles
//!
//! Results and errors go to stdout as JSON envelopes (or a table with
//! `--format table`). Logs go to stderr, filtered by `DBQUERY_LOG`.

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use dbquery::config::{self, ConfigLocation, StoredProfile};
use dbquery::output::{render_table, ErrorEnvelope, ErrorInfo, Metadata, SuccessEnvelope};
use dbquery::params::{require_query, ConnectionParams};
use dbquery::{validate, Credentials, DbQueryError, Family, Session};

/// dbquery - read-only queries for MySQL, PostgreSQL, Oracle and MongoDB
#[derive(Parser)]
#[command(name = "dbquery")]
#[command(about = "Run a single read-only query and get flat records back")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one SELECT (or MongoDB find) and print the records
    Query {
        #[command(flatten)]
        connection: ConnectionArgs,

        /// Output format
        #[arg(long, value_enum, default_value_t = Format::Json)]
        format: Format,

        /// Read the query from a file
        #[arg(long, conflicts_with = "query")]
        file: Option<PathBuf>,

        /// Query text; read from stdin when omitted and stdin is not a terminal
        query: Option<String>,
    },

    /// Test a connection with the family's probe query
    Check {
        #[command(flatten)]
        connection: ConnectionArgs,
    },

    /// Manage named connection profiles
    Profile {
        #[command(subcommand)]
        action: ProfileAction,
    },
}

#[derive(Subcommand)]
enum ProfileAction {
    /// Save a profile (the first profile in a file becomes the default)
    Save {
        /// Profile name
        name: String,

        #[command(flatten)]
        target: TargetArgs,

        /// Environment variable holding the password (instead of storing it)
        #[arg(long, conflicts_with = "password")]
        password_env: Option<String>,

        /// Save to the per-user file instead of `.dbquery/config.json`
        #[arg(long)]
        global: bool,
    },

    /// List saved profiles (passwords are never shown)
    List,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Json,
    Table,
}

#[derive(Args)]
struct ConnectionArgs {
    /// Use a saved profile (the default profile is used when no --type is given)
    #[arg(long, conflicts_with = "db_type")]
    profile: Option<String>,

    #[command(flatten)]
    target: TargetArgs,
}

#[derive(Args)]
struct TargetArgs {
    /// Database family: mysql, postgresql, oracle or mongodb
    #[arg(long = "type", value_name = "FAMILY")]
    db_type: Option<String>,

    #[arg(long)]
    host: Option<String>,

    #[arg(long)]
    port: Option<String>,

    #[arg(long, short = 'u')]
    user: Option<String>,

    /// Prompted for when a relational family is used from a terminal
    #[arg(long, short = 'p')]
    password: Option<String>,

    #[arg(long, short = 'd')]
    database: Option<String>,

    /// Query-string options appended to the connection target verbatim
    #[arg(long)]
    properties: Option<String>,
}

impl Commands {
    const fn name(&self) -> &'static str {
        match self {
            Self::Query { .. } => "query",
            Self::Check { .. } => "check",
            Self::Profile { .. } => "profile",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let cli = Cli::parse();
    let command = cli.command.name();
    let mut family = None;

    match run(cli.command, &mut family).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let family = family.map(|f: Family| f.to_string()).unwrap_or_default();
            let envelope = match err.downcast_ref::<DbQueryError>() {
                Some(db_err) => ErrorEnvelope::from_error(family, command, db_err),
                None => ErrorEnvelope::new(family, command, ErrorInfo::new("CLI_ERROR", format!("{err:#}"))),
            };
            tracing::debug!(code = %envelope.error.code, "command failed");
            print_json(&envelope);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("DBQUERY_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(command: Commands, family: &mut Option<Family>) -> anyhow::Result<()> {
    match command {
        Commands::Query { connection, format, file, query } => {
            let credentials = resolve_credentials(&connection)?;
            *family = Some(credentials.family());

            let text = read_query(query, file)?;
            let validated = validate(require_query(&text, credentials.family())?, credentials.family())?;

            let started = Instant::now();
            let session = Session::open(credentials).await?;
            let result = session.execute_validated(&validated).await;
            session.close().await;
            let records = result?;
            let elapsed = started.elapsed().as_millis() as u64;

            match format {
                Format::Json => print_json(&SuccessEnvelope::new(
                    family_tag(*family),
                    "query",
                    &records,
                    Metadata::with_rows(elapsed, records.len()),
                )),
                Format::Table => println!("{}", render_table(&records)),
            }
        }

        Commands::Check { connection } => {
            let credentials = resolve_credentials(&connection)?;
            *family = Some(credentials.family());

            let started = Instant::now();
            let session = Session::open(credentials).await?;
            let result = session.self_test().await;
            session.close().await;
            let records = result?;

            print_json(&SuccessEnvelope::new(
                family_tag(*family),
                "check",
                &records,
                Metadata::with_rows(started.elapsed().as_millis() as u64, records.len()),
            ));
        }

        Commands::Profile { action: ProfileAction::Save { name, target, password_env, global } } => {
            let profile = stored_profile(target, password_env)?;
            *family = Some(profile.family);

            let location = if global { ConfigLocation::Global } else { ConfigLocation::Local };
            let path = config::save_profile(&name, profile, location)?;

            print_json(&SuccessEnvelope::new(
                family_tag(*family),
                "profile",
                serde_json::json!({ "saved": name, "path": path.display().to_string() }),
                Metadata::new(0),
            ));
        }

        Commands::Profile { action: ProfileAction::List } => {
            let registry = config::load_profiles()?;
            let profiles: Vec<serde_json::Value> = registry
                .profiles
                .iter()
                .map(|(name, profile)| {
                    serde_json::json!({
                        "name": name,
                        "family": profile.family,
                        "host": profile.host,
                        "port": profile.port,
                        "database": profile.database,
                        "default": registry.default.as_deref() == Some(name.as_str()),
                    })
                })
                .collect();

            print_json(&SuccessEnvelope::new("", "profile", profiles, Metadata::new(0)));
        }
    }

    Ok(())
}

fn family_tag(family: Option<Family>) -> String {
    family.map(|f| f.to_string()).unwrap_or_default()
}

/// Connection flags when `--type` is given, otherwise the named or default profile
fn resolve_credentials(connection: &ConnectionArgs) -> anyhow::Result<Credentials> {
    let target = &connection.target;
    let Some(db_type) = target.db_type.as_deref() else {
        return Ok(config::resolve_profile(connection.profile.as_deref())?);
    };

    let family: Family = db_type.parse()?;
    let password = match &target.password {
        Some(password) => password.clone(),
        None if family.is_relational() && std::io::stdin().is_terminal() => {
            dialoguer::Password::new()
                .with_prompt("Password")
                .interact()
                .context("Could not read password")?
        }
        None => String::new(),
    };

    let params = ConnectionParams {
        db_type: db_type.to_string(),
        db_host: target.host.clone().unwrap_or_default(),
        db_port: target.port.clone().map(dbquery::params::PortParam::Text),
        db_username: target.user.clone().unwrap_or_default(),
        db_password: password,
        db_name: target.database.clone(),
        db_properties: target.properties.clone(),
        query_sql: String::new(),
    };
    Ok(params.credentials()?)
}

fn read_query(query: Option<String>, file: Option<PathBuf>) -> anyhow::Result<String> {
    if let Some(query) = query {
        return Ok(query);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .with_context(|| format!("Could not read query file {}", path.display()));
    }
    let mut text = String::new();
    if !std::io::stdin().is_terminal() {
        std::io::stdin().read_to_string(&mut text).context("Could not read query from stdin")?;
    }
    Ok(text)
}

fn stored_profile(target: TargetArgs, password_env: Option<String>) -> anyhow::Result<StoredProfile> {
    let family: Family = target.db_type.as_deref().unwrap_or_default().parse()?;
    let host = target.host.filter(|h| !h.trim().is_empty()).ok_or_else(|| {
        DbQueryError::configuration("Please fill in the database host")
    })?;
    let port = match target.port.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        Some(port) => Some(port.parse::<u16>().map_err(|_| {
            DbQueryError::configuration(format!("Invalid database port '{port}'"))
        })?),
        None => None,
    };

    Ok(StoredProfile {
        family,
        host,
        port,
        username: target.user,
        password: target.password,
        password_env,
        database: target.database,
        properties: target.properties,
    })
}

fn print_json<T: serde::Serialize>(value: &T) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(e) => tracing::error!(error = %e, "could not serialize output"),
    }
}
