use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use plusauth_starter::cli::{app, config_cmd, output, status};
use plusauth_starter::{Settings, SessionError};

#[derive(Parser)]
#[command(
    name = "plusauth-starter",
    version,
    about = "Log in with PlusAuth using the Authorization Code flow with PKCE"
)]
struct Cli {
    /// Path to the PlusAuth.json credentials resource
    #[arg(long, env = "PLUSAUTH_CONFIG", global = true)]
    config: Option<String>,

    /// Directory holding persisted session state
    #[arg(long, env = "PLUSAUTH_STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    /// Loopback port the redirect is captured on
    #[arg(long, env = "PLUSAUTH_REDIRECT_PORT", global = true)]
    redirect_port: Option<u16>,

    /// Timeout for each HTTP request in milliseconds
    #[arg(long, env = "PLUSAUTH_HTTP_TIMEOUT_MS", global = true)]
    http_timeout_ms: Option<u64>,

    /// How long to wait for the browser redirect in milliseconds
    #[arg(long, env = "PLUSAUTH_AUTH_TIMEOUT_MS", global = true)]
    auth_timeout_ms: Option<u64>,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive login screen (default)
    Run,
    /// Log in once and print the profile
    Login,
    /// End the stored session
    Logout,
    /// Show the stored session without contacting the provider
    Status,
    /// Show the resolved configuration
    Config,
}

impl Cli {
    fn settings(&self) -> Settings {
        let mut settings = Settings::default();
        if let Some(dir) = &self.state_dir {
            settings.state_dir = dir.clone();
        }
        if let Some(port) = self.redirect_port {
            settings.redirect_port = port;
        }
        if let Some(ms) = self.http_timeout_ms {
            settings.http_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = self.auth_timeout_ms {
            settings.auth_timeout = Duration::from_millis(ms);
        }
        settings
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("PLUSAUTH_LOG_LEVEL")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let json = cli.json;

    if let Err(e) = run(cli).await {
        output::print_error(&e, json);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), SessionError> {
    let settings = cli.settings();
    let is_tty = std::io::stdout().is_terminal();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Status => status::run_status(&settings, cli.json),
        Commands::Config => config_cmd::run_config_show(cli.config.as_deref(), &settings, cli.json),
        Commands::Run => {
            let controller = start(cli.config.as_deref(), &settings).await?;
            app::run_interactive(controller, is_tty).await
        }
        Commands::Login => {
            let controller = start(cli.config.as_deref(), &settings).await?;
            controller.login().await?;
            // the profile fetch that follows login runs in the background
            let mut view = controller.view();
            let _ = tokio::time::timeout(
                settings.http_timeout,
                view.wait_for(|v| v.username != plusauth_starter::view::PLACEHOLDER || v.error.is_some()),
            )
            .await;
            output::print_view(&controller.current_view(), is_tty);
            controller.shutdown().await;
            Ok(())
        }
        Commands::Logout => {
            let controller = start(cli.config.as_deref(), &settings).await?;
            let result = controller.logout().await;
            output::print_view(&controller.current_view(), is_tty);
            controller.shutdown().await;
            result
        }
    }
}

/// Load credentials, discover the provider and restore any stored session.
/// Discovery failure is not fatal: the screen shows the error and login
/// stays unavailable.
async fn start(
    cli_config: Option<&str>,
    settings: &Settings,
) -> Result<plusauth_starter::SessionController, SessionError> {
    let config = plusauth_starter::load_or_default(cli_config);
    let controller = app::build_controller(config, settings)?;
    if let Err(e) = controller.discover().await {
        tracing::warn!("Provider discovery failed: {e}");
    }
    controller.restore_session().await?;
    Ok(controller)
}
