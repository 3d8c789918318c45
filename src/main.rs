//! abode-client - command line access to an Abode account
//!
//! Every command prints pretty JSON on stdout; logs go to stderr.

use abode_client::client::AbodeApi;
use abode_client::logging::{init_logging, LogConfig};
use abode_client::error::ErrorReporter;
use abode_client::{AbodeClient, AbodeError, ClientConfig, Credentials};
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Abode cloud client
#[derive(Parser, Debug)]
#[command(name = "abode-client")]
#[command(about = "Query and control an Abode security system")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Configuration file (TOML)
    #[arg(long, global = true, env = "ABODE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    /// Account username
    #[arg(long, global = true, env = "ABODE_USERNAME")]
    username: Option<String>,

    /// Account password
    #[arg(long, global = true, env = "ABODE_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// One-time code for accounts with two-factor authentication
    #[arg(long, global = true, env = "ABODE_MFA_CODE", hide_env_values = true)]
    mfa_code: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in and print the connection diagnostics
    Login,
    /// List devices
    Devices {
        /// Only devices of this generic type (lock, switch, camera, ...)
        #[arg(long)]
        generic_type: Option<String>,
    },
    /// List automations
    Automations,
    /// Show the alarm panel of an area
    Alarm {
        #[arg(long, default_value = "1")]
        area: String,
    },
    /// Central monitoring settings
    Cms {
        #[command(subcommand)]
        action: CmsAction,
    },
    /// Monitoring test mode
    TestMode {
        #[command(subcommand)]
        action: TestModeAction,
    },
    /// Change a system setting
    Setting {
        name: String,
        value: String,
        #[arg(long, default_value = "1")]
        area: String,
    },
    /// Alarm timeline
    Timeline {
        #[command(subcommand)]
        action: TimelineAction,
    },
    /// Print the connection diagnostics
    Diagnostics,
    /// Keep the session alive and print diagnostics periodically
    Watch {
        /// How long to run, e.g. "2h" (until Ctrl-C when omitted)
        #[arg(long, value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Time between diagnostics snapshots
        #[arg(long, default_value = "60s", value_parser = parse_duration)]
        every: Duration,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Login => "login",
            Command::Devices { .. } => "devices",
            Command::Automations => "automations",
            Command::Alarm { .. } => "alarm",
            Command::Cms { .. } => "cms",
            Command::TestMode { .. } => "test-mode",
            Command::Setting { .. } => "setting",
            Command::Timeline { .. } => "timeline",
            Command::Diagnostics => "diagnostics",
            Command::Watch { .. } => "watch",
        }
    }
}

#[derive(Subcommand, Debug)]
enum CmsAction {
    Get,
    Set { key: String, value: bool },
}

#[derive(Subcommand, Debug)]
enum TestModeAction {
    Get,
    Set { enabled: bool },
}

#[derive(Subcommand, Debug)]
enum TimelineAction {
    List {
        #[arg(long, default_value_t = 10)]
        size: u32,
    },
    Ack { id: String },
    Dismiss { id: String },
}

impl Cli {
    fn credentials(&self) -> anyhow::Result<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => Ok(Credentials::new(username, password)),
            _ => bail!("Credentials required. Use --username/--password or set ABODE_USERNAME/ABODE_PASSWORD"),
        }
    }
}

/// Human readable durations ("90s", "2h 30m"), same syntax as the config file
fn parse_duration(value: &str) -> Result<Duration, String> {
    serde_json::from_value::<humantime_serde::Serde<Duration>>(serde_json::Value::from(value))
        .map(humantime_serde::Serde::into_inner)
        .map_err(|e| e.to_string())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

async fn login(client: &AbodeClient, mfa_code: Option<&str>) -> anyhow::Result<()> {
    match client.login().await {
        Ok(()) => Ok(()),
        Err(e) if e.is_mfa_required() => {
            let code = mfa_code.context("Account requires a one-time code, pass --mfa-code")?;
            client.login_with_mfa(code).await.context("MFA login failed")
        }
        Err(e) => Err(e).context("Login failed"),
    }
}

async fn watch(client: &AbodeClient, duration: Option<Duration>, every: Duration) -> anyhow::Result<()> {
    let deadline = duration.map(|d| tokio::time::Instant::now() + d);
    let mut ticker = tokio::time::interval(every);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        }

        if deadline.is_some_and(|d| tokio::time::Instant::now() >= d) {
            return Ok(());
        }

        // exercise the session so failures surface in the diagnostics
        if let Err(e) = client.get_cms_settings().await {
            warn!("Settings refresh failed: {e}");
        }
        print_json(&client.connection_diagnostics().await)?;
    }
}

async fn run(cli: &Cli, client: &AbodeClient) -> anyhow::Result<()> {
    login(client, cli.mfa_code.as_deref()).await?;

    match &cli.command {
        Command::Login | Command::Diagnostics => print_json(&client.connection_diagnostics().await),
        Command::Devices { generic_type } => {
            print_json(&client.get_devices(false, generic_type.as_deref()).await?)
        }
        Command::Automations => print_json(&client.get_automations(false).await?),
        Command::Alarm { area } => print_json(&client.get_alarm(area).await?),
        Command::Cms { action } => match action {
            CmsAction::Get => print_json(&client.get_cms_settings().await?),
            CmsAction::Set { key, value } => print_json(&client.set_cms_setting(key, *value).await?),
        },
        Command::TestMode { action } => match action {
            TestModeAction::Get => print_json(&client.get_test_mode().await?),
            TestModeAction::Set { enabled } => print_json(&client.set_test_mode(*enabled).await?),
        },
        Command::Setting { name, value, area } => {
            print_json(&client.set_setting(name, value, area).await?)
        }
        Command::Timeline { action } => match action {
            TimelineAction::List { size } => print_json(&client.get_timeline_events(*size).await?),
            TimelineAction::Ack { id } => print_json(&client.acknowledge_timeline_event(id).await?),
            TimelineAction::Dismiss { id } => print_json(&client.dismiss_timeline_event(id).await?),
        },
        Command::Watch { duration, every } => watch(client, *duration, *every).await,
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_logging(LogConfig::from_env().with_debug(cli.debug))
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    let config = ClientConfig::load(cli.config.as_deref())
        .context("Invalid configuration")?
        .with_default_identity_path();
    let client = AbodeClient::new(config, cli.credentials()?)?;

    let result = run(&cli, &client).await;
    if let Err(e) = &result {
        if let Some(error) = e.downcast_ref::<AbodeError>() {
            let correlation_id = client.connection_diagnostics().await.client_uuid;
            abode_client::log_structured_error!(error, "cli", cli.command.name(), correlation_id);
            eprintln!(
                "{}",
                serde_json::to_string_pretty(&ErrorReporter::format_api_error(error))?
            );
        }
    }

    if !matches!(cli.command, Command::Watch { .. }) || result.is_err() {
        if let Err(e) = client.logout().await {
            warn!("Logout failed: {e}");
        }
    }
    client.shutdown().await;
    result
}
