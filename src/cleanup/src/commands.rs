//! Chat command surface: `!cw <command>`.
//!
//! Parsing is done with clap; every command maps onto exactly one engine
//! operation. Rename, delete and locate run as background tasks so the chat
//! handler returns immediately.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::engine::WarningEngine;
use crate::error::Result;
use crate::model::Player;

pub const PERMISSION_DENIED: &str = "You don't have permission to use this command";

#[derive(Parser, Debug)]
#[command(
    no_binary_name = true,
    disable_help_flag = true,
    disable_help_subcommand = true,
    disable_version_flag = true
)]
struct ChatCli {
    #[command(subcommand)]
    command: ChatCommand,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ChatCommand {
    /// Force-collects unnamed grids in the game world
    Collect,
    /// Shows list of commands
    Help,
    /// Exclude given group from the warning search
    Ignore {
        /// After parsing, a single element holding the name exactly as typed
        #[arg(required = true, num_args = 1.., trailing_var_arg = true, allow_hyphen_values = true)]
        name: Vec<String>,
    },
    /// Sends a warning to given player
    Send,
    /// Generates a new name for all unnamed grids of given player
    #[command(name = "autoname")]
    AutoName,
    /// Deletes unnamed grids of given player's possession
    Delete,
    /// Shows GPS of unnamed grids on given player's HUD
    Show,
}

/// What `ignore <arg>` refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreTarget {
    /// Stop all warnings for the player
    All,
    /// Resume warnings for the player
    None,
    Group(String),
}

impl IgnoreTarget {
    pub fn parse(arg: &str) -> Self {
        match arg.to_lowercase().as_str() {
            "all" => Self::All,
            "none" => Self::None,
            _ => Self::Group(arg.to_string()),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown command '{input}', try !{prefix} help")]
pub struct ParseError {
    pub input: String,
    pub prefix: String,
}

/// Parse a chat line. Returns `None` when the line is not addressed to us.
pub fn parse(line: &str, prefix: &str) -> Option<std::result::Result<ChatCommand, ParseError>> {
    let mut words = line.split_whitespace();
    let head = words.next()?;
    if head.strip_prefix('!')? != prefix {
        return None;
    }

    let args: Vec<&str> = words.collect();
    if args.is_empty() {
        return Some(Ok(ChatCommand::Help));
    }

    Some(
        ChatCli::try_parse_from(args.iter().copied())
            .map(|cli| match cli.command {
                // Group names are matched verbatim, inner whitespace included
                ChatCommand::Ignore { .. } => ChatCommand::Ignore {
                    name: vec![after_words(line, 2).to_string()],
                },
                command => command,
            })
            .map_err(|_| ParseError {
                input: args.join(" "),
                prefix: prefix.to_string(),
            }),
    )
}

/// The text of `line` after its first `count` words, trimmed at both ends.
fn after_words(line: &str, count: usize) -> &str {
    let mut rest = line.trim_start();
    for _ in 0..count {
        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        rest = rest[end..].trim_start();
    }
    rest.trim_end()
}

/// Who issued a command.
#[derive(Debug, Clone)]
pub struct CommandContext {
    pub player: Player,
    pub is_admin: bool,
}

/// Result of running a command: an optional direct reply plus, for long
/// running commands, the background task doing the work.
#[derive(Debug, Default)]
pub struct CommandOutcome {
    pub reply: Option<String>,
    pub task: Option<JoinHandle<()>>,
}

impl CommandOutcome {
    fn reply(text: impl Into<String>) -> Self {
        Self {
            reply: Some(text.into()),
            task: None,
        }
    }

    fn task(task: JoinHandle<()>) -> Self {
        Self {
            reply: None,
            task: Some(task),
        }
    }
}

pub struct CommandHandler {
    engine: Arc<WarningEngine>,
}

impl CommandHandler {
    pub fn new(engine: Arc<WarningEngine>) -> Self {
        Self { engine }
    }

    pub fn help_text(&self) -> String {
        let prefix = self.engine.command_prefix();
        format!("\n> !{prefix} show\n> !{prefix} autoname\n> !{prefix} delete\n")
    }

    pub async fn execute(
        &self,
        ctx: &CommandContext,
        command: ChatCommand,
    ) -> Result<CommandOutcome> {
        match command {
            ChatCommand::Collect => {
                if !ctx.is_admin {
                    return Ok(CommandOutcome::reply(PERMISSION_DENIED));
                }
                let version = self.engine.force_collect()?;
                let groups = self.engine.registry().snapshot().groups.len();
                Ok(CommandOutcome::reply(format!(
                    "Collected {groups} grid groups (snapshot {version})"
                )))
            }
            ChatCommand::Help => Ok(CommandOutcome::reply(self.help_text())),
            ChatCommand::Ignore { name } => self.ignore(ctx, &name.join(" ")).await,
            ChatCommand::Send => {
                self.engine.warn_if_any(&ctx.player).await?;
                Ok(CommandOutcome::default())
            }
            ChatCommand::AutoName => {
                let task = self.spawn(ctx, "autoname", |engine, player| async move {
                    engine.rename_all(&player).await.map(|_| ())
                });
                Ok(CommandOutcome::task(task))
            }
            ChatCommand::Delete => {
                let task = self.spawn(ctx, "delete", |engine, player| async move {
                    engine.delete_all(&player).await.map(|_| ())
                });
                Ok(CommandOutcome::task(task))
            }
            ChatCommand::Show => {
                let task = self.spawn(ctx, "show", |engine, player| async move {
                    engine.locate_all(&player).await.map(|_| ())
                });
                Ok(CommandOutcome::task(task))
            }
        }
    }

    async fn ignore(&self, ctx: &CommandContext, arg: &str) -> Result<CommandOutcome> {
        let user = ctx.player.id;
        info!(user = %user, arg, "ignore");

        match IgnoreTarget::parse(arg) {
            IgnoreTarget::All => {
                self.engine.ignore_user(user);
                Ok(CommandOutcome::reply("You will no longer receive this warning!"))
            }
            IgnoreTarget::None => {
                self.engine.unignore_user(user);
                Ok(CommandOutcome::reply("You will receive cleanup warning!"))
            }
            IgnoreTarget::Group(name) => {
                let reply = if self.engine.ignore_group(&name) {
                    format!("Ignored the grid '{name}'!")
                } else {
                    format!("Grid '{name}' not found")
                };

                // The ignore has already applied at this point
                if let Err(e) = self.engine.warn_if_any(&ctx.player).await {
                    warn!(user = %user, error = %e, "Failed to re-send warning after ignore");
                }
                Ok(CommandOutcome::reply(reply))
            }
        }
    }

    fn spawn<F, Fut>(&self, ctx: &CommandContext, name: &'static str, op: F) -> JoinHandle<()>
    where
        F: FnOnce(Arc<WarningEngine>, Player) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let user = ctx.player.id;
        let fut = op(self.engine.clone(), ctx.player.clone());
        tokio::spawn(async move {
            if let Err(e) = fut.await {
                warn!(user = %user, command = name, error = %e, "Command failed");
            }
        })
    }
}
