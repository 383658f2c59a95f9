use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use cleanup::backend::memory::{
    GridSpec, InMemoryFactions, InMemoryRoster, InMemoryWorld, RecordingLocators,
};
use cleanup::commands::{self, CommandContext, CommandHandler};
use cleanup::names::WordBankNames;
use cleanup::world::NotificationSink;
use cleanup::{Color, GroupRegistry, NotifyError, Player, UserId, WarningCycle, WarningEngine};
use common::SharedConfig;
use common::cli::{CommonArgs, CommonCommands, utils};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "cleanup-warning")]
#[command(about = "Warns players about unnamed grids and offers cleanup commands")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    /// JSON world fixture with players and grids
    #[arg(long)]
    world: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<CleanupCommands>,
}

#[derive(Subcommand)]
enum CleanupCommands {
    #[command(flatten)]
    Common(CommonCommands),
}

impl Default for CleanupCommands {
    fn default() -> Self {
        Self::Common(CommonCommands::Start)
    }
}

#[derive(Debug, Default, Deserialize)]
struct WorldFixture {
    #[serde(default)]
    players: Vec<FixturePlayer>,
    #[serde(default)]
    grids: Vec<GridSpec>,
}

#[derive(Debug, Deserialize)]
struct FixturePlayer {
    #[serde(flatten)]
    player: Player,
    #[serde(default)]
    admin: bool,
    faction: Option<String>,
}

impl WorldFixture {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read world fixture {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse world fixture {}", path.display()))
    }
}

/// Prints every notification to stdout.
struct ConsoleSink;

#[async_trait]
impl NotificationSink for ConsoleSink {
    async fn send(&self, user: UserId, color: Color, text: &str) -> Result<(), NotifyError> {
        let tag = match color {
            Color::Red => "!",
            Color::Default => " ",
        };
        let line = format!("[{tag}] -> {user}: {}\n", text.trim_end().replace('\n', "\n    "));

        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(line.as_bytes())
            .await
            .map_err(|e| NotifyError(e.to_string()))?;
        stdout.flush().await.map_err(|e| NotifyError(e.to_string()))
    }
}

struct Host {
    roster: Arc<InMemoryRoster>,
    admins: Vec<UserId>,
    handler: CommandHandler,
    prefix: String,
}

impl Host {
    /// Handle one stdin line of the form `<user id> <chat message>`.
    async fn dispatch(&self, line: &str) {
        let line = line.trim();
        let Some((user, message)) = line.split_once(char::is_whitespace) else {
            return;
        };
        let Ok(user) = user.parse::<i64>().map(UserId) else {
            tracing::warn!(line, "Expected '<user id> <message>'");
            return;
        };
        let Some(player) = self.roster.find(user) else {
            tracing::warn!(user = %user, "Unknown player");
            return;
        };

        let command = match commands::parse(message, &self.prefix) {
            None => return,
            Some(Ok(command)) => command,
            Some(Err(e)) => {
                println!("[ ] -> {user}: {e}");
                return;
            }
        };

        let ctx = CommandContext {
            player,
            is_admin: self.admins.contains(&user),
        };
        match self.handler.execute(&ctx, command).await {
            Ok(outcome) => {
                if let Some(reply) = outcome.reply {
                    println!("[ ] -> {user}: {}", reply.trim());
                }
            }
            Err(e) => tracing::warn!(user = %user, error = %e, "Command failed"),
        }
    }
}

#[cfg(unix)]
mod signals {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    pub struct Listener(Signal);

    impl Listener {
        pub fn hangup() -> std::io::Result<Self> {
            signal(SignalKind::hangup()).map(Self)
        }

        pub fn terminate() -> std::io::Result<Self> {
            signal(SignalKind::terminate()).map(Self)
        }

        pub async fn recv(&mut self) {
            if self.0.recv().await.is_none() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(not(unix))]
mod signals {
    pub struct Listener;

    impl Listener {
        pub fn hangup() -> std::io::Result<Self> {
            Ok(Self)
        }

        pub fn terminate() -> std::io::Result<Self> {
            Ok(Self)
        }

        pub async fn recv(&mut self) {
            std::future::pending::<()>().await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on CLI arguments
    utils::init_logging(&cli.common);

    // Load application configuration
    let config = utils::load_config(cli.common.config.as_ref())?;

    // Handle common commands that don't require starting the service
    let command = cli.command.unwrap_or_default();
    let CleanupCommands::Common(ref common_cmd) = command;
    if utils::handle_common_command(common_cmd, &config)? {
        return Ok(());
    }
    utils::validate_config(&config)?;

    let fixture = match &cli.world {
        Some(path) => WorldFixture::load(path)?,
        None => WorldFixture::default(),
    };
    tracing::info!(
        players = fixture.players.len(),
        grids = fixture.grids.len(),
        interval_secs = config.warning.interval,
        prefix = %config.commands.prefix,
        "Starting cleanup warning"
    );

    let world = InMemoryWorld::from_specs(fixture.grids);
    let factions = Arc::new(InMemoryFactions::new());
    let mut admins = Vec::new();
    let mut players = Vec::new();
    for entry in fixture.players {
        if let Some(tag) = entry.faction {
            factions.join(entry.player.id, tag);
        }
        if entry.admin {
            admins.push(entry.player.id);
        }
        players.push(entry.player);
    }
    let roster = Arc::new(InMemoryRoster::new(players));

    let registry = Arc::new(GroupRegistry::new(Arc::new(world)));
    let engine = Arc::new(
        WarningEngine::new(
            registry,
            Arc::new(ConsoleSink),
            factions,
            Arc::new(WordBankNames::new()),
            Arc::new(RecordingLocators::new()),
        )
        .with_command_prefix(config.commands.prefix.clone()),
    );

    let shared = SharedConfig::new(config.clone());
    let cycle = Arc::new(WarningCycle::new(
        engine.clone(),
        roster.clone(),
        Arc::new(shared.clone()),
    ));
    let handle = cycle.start(CancellationToken::new());

    let host = Host {
        roster,
        admins,
        handler: CommandHandler::new(engine),
        prefix: config.commands.prefix,
    };

    let config_path = cli
        .common
        .config
        .clone()
        .unwrap_or_else(|| PathBuf::from(common::config::CONFIG_FILE));
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut hangup =
        signals::Listener::hangup().context("Failed to install SIGHUP handler")?;
    let mut terminate =
        signals::Listener::terminate().context("Failed to install SIGTERM handler")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received interrupt, shutting down");
                break;
            }
            _ = terminate.recv() => {
                tracing::info!("Received SIGTERM, shutting down");
                break;
            }
            _ = hangup.recv() => {
                match shared.reload_from(&config_path) {
                    Ok(()) => tracing::info!(
                        interval_secs = shared.interval(),
                        "Reloaded configuration"
                    ),
                    Err(e) => tracing::warn!(error = %e, "Failed to reload configuration"),
                }
            }
            line = lines.next_line() => match line.context("Failed to read stdin")? {
                Some(line) => host.dispatch(&line).await,
                None => {
                    tracing::info!("Input closed, shutting down");
                    break;
                }
            },
        }
    }

    handle
        .shutdown()
        .await
        .context("Warning cycle task failed")?;
    Ok(())
}
