//! Warnings and bulk enforcement for one player's deletable groups.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::task::JoinSet;
use tracing::{debug, info, trace, warn};

use crate::error::{Result, WorldError};
use crate::model::{Color, EntityId, Locator, Player, UserId};
use crate::registry::{GridGroup, GroupRegistry};
use crate::world::{FactionProvider, LocatorRegistry, NameSupplier, NotificationSink};

pub const NO_FACTION_MESSAGE: &str = "Join or make a faction first!";
pub const LOCATE_MESSAGE: &str = "Added GPS of unnamed grids in your HUD!";
pub const LOCATOR_DESCRIPTION: &str = "Unnamed grid can be automatically cleaned up anytime!";

/// Outcome of renaming a single group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenameOutcome {
    Renamed { from: String, to: String },
    /// The top grid was gone by the time the rename was issued
    Skipped { group: String },
    Failed { group: String, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenameReport {
    /// Set when the player has no faction and nothing was attempted
    pub no_faction: bool,
    pub renamed: Vec<(String, String)>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl RenameReport {
    fn record(&mut self, outcome: RenameOutcome) {
        match outcome {
            RenameOutcome::Renamed { from, to } => self.renamed.push((from, to)),
            RenameOutcome::Skipped { group } => self.skipped.push(group),
            RenameOutcome::Failed { group, reason } => self.failed.push((group, reason)),
        }
    }

    fn sort(&mut self) {
        self.renamed.sort();
        self.skipped.sort();
        self.failed.sort();
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteReport {
    /// Names of every group that qualified for deletion
    pub targeted: Vec<String>,
    pub closed: Vec<EntityId>,
    /// Grids that were already gone
    pub skipped: Vec<EntityId>,
    pub failed: Vec<(EntityId, String)>,
}

#[derive(Debug, Default)]
struct GroupDeletion {
    closed: Vec<EntityId>,
    skipped: Vec<EntityId>,
    failed: Vec<(EntityId, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocateReport {
    pub added: Vec<EntityId>,
    pub skipped: Vec<String>,
}

pub struct WarningEngine {
    registry: Arc<GroupRegistry>,
    sink: Arc<dyn NotificationSink>,
    factions: Arc<dyn FactionProvider>,
    names: Arc<dyn NameSupplier>,
    locators: Arc<dyn LocatorRegistry>,
    command_prefix: String,
}

impl WarningEngine {
    pub fn new(
        registry: Arc<GroupRegistry>,
        sink: Arc<dyn NotificationSink>,
        factions: Arc<dyn FactionProvider>,
        names: Arc<dyn NameSupplier>,
        locators: Arc<dyn LocatorRegistry>,
    ) -> Self {
        Self {
            registry,
            sink,
            factions,
            names,
            locators,
            command_prefix: String::from("cw"),
        }
    }

    /// Prefix shown in the help hint of warning messages.
    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    pub fn command_prefix(&self) -> &str {
        &self.command_prefix
    }

    pub fn registry(&self) -> &Arc<GroupRegistry> {
        &self.registry
    }

    pub fn force_collect(&self) -> Result<u64> {
        Ok(self.registry.collect()?)
    }

    pub fn ignore_group(&self, name: &str) -> bool {
        self.registry.ignore_group(name)
    }

    pub fn ignore_user(&self, user: UserId) {
        self.registry.ignore_user(user);
    }

    pub fn unignore_user(&self, user: UserId) {
        self.registry.unignore_user(user);
    }

    /// Send one warning listing every deletable group of `player`.
    /// Returns whether a warning was sent.
    pub async fn warn_if_any(&self, player: &Player) -> Result<bool> {
        trace!(user = %player.id, "processing");

        let groups = self.registry.search_deletable_groups(player.id);
        if groups.is_empty() {
            return Ok(false);
        }

        let names: Vec<&str> = groups.iter().map(|g| g.name()).collect();
        trace!(user = %player.id, groups = ?names, "deletable groups");

        let message = warning_message(&names, &self.command_prefix);
        self.notify(player.id, Color::Red, &message).await?;
        Ok(true)
    }

    /// Rename every deletable group of `player` to
    /// `"<faction tag> <player name> <decorative name>"`.
    pub async fn rename_all(&self, player: &Player) -> Result<RenameReport> {
        let Some(tag) = self.factions.faction_tag(player.id) else {
            self.notify(player.id, Color::Red, NO_FACTION_MESSAGE).await?;
            return Ok(RenameReport {
                no_faction: true,
                ..Default::default()
            });
        };

        let prefix = format!("{tag} {}", player.name);
        let mut units = JoinSet::new();
        for group in self.registry.search_deletable_groups(player.id) {
            let names = self.names.clone();
            let prefix = prefix.clone();
            let name = group.name().to_string();
            units.spawn(async move {
                AssertUnwindSafe(rename_group(names, prefix, group))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| RenameOutcome::Failed {
                        group: name,
                        reason: "rename task panicked".to_string(),
                    })
            });
        }

        let mut report = RenameReport::default();
        for outcome in units.join_all().await {
            report.record(outcome);
        }
        report.sort();

        info!(
            user = %player.id,
            renamed = report.renamed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Renamed unnamed grids"
        );

        self.notify(player.id, Color::Default, &rename_message(&report.renamed))
            .await?;
        Ok(report)
    }

    /// Remove every grid of every deletable group of `player`.
    ///
    /// Collects first so that only groups that are deletable right now are
    /// touched.
    pub async fn delete_all(&self, player: &Player) -> Result<DeleteReport> {
        self.registry.collect()?;

        let groups = self.registry.search_deletable_groups(player.id);
        let mut report = DeleteReport {
            targeted: groups.iter().map(|g| g.name().to_string()).collect(),
            ..Default::default()
        };

        let mut units = JoinSet::new();
        for group in groups {
            units.spawn(async move {
                let ids: Vec<EntityId> = group.grids().iter().map(|g| g.entity_id()).collect();
                AssertUnwindSafe(async { delete_group(&group) })
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|_| GroupDeletion {
                        failed: ids
                            .into_iter()
                            .map(|id| (id, "delete task panicked".to_string()))
                            .collect(),
                        ..Default::default()
                    })
            });
        }

        for deletion in units.join_all().await {
            report.closed.extend(deletion.closed);
            report.skipped.extend(deletion.skipped);
            report.failed.extend(deletion.failed);
        }
        report.closed.sort();
        report.skipped.sort();
        report.failed.sort();

        info!(
            user = %player.id,
            groups = report.targeted.len(),
            closed = report.closed.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "Deleted unnamed grids"
        );

        self.notify(player.id, Color::Default, &delete_message(&report.targeted))
            .await?;
        Ok(report)
    }

    /// Put a locator on the top grid of every deletable group of `player`.
    pub async fn locate_all(&self, player: &Player) -> Result<LocateReport> {
        let mut report = LocateReport::default();

        for group in self.registry.search_deletable_groups(player.id) {
            let top = group.top_grid();
            if top.is_closed() {
                report.skipped.push(group.name().to_string());
                continue;
            }

            let name = top.display_name();
            let locator = Locator {
                entity_id: top.entity_id(),
                position: top.position(),
                label: name,
                description: LOCATOR_DESCRIPTION.to_string(),
            };
            trace!(user = %player.id, entity = %locator.entity_id, position = %locator.position, "locator");
            report.added.push(locator.entity_id);
            self.locators.add_locator(player.id, locator);
        }

        debug!(user = %player.id, added = report.added.len(), "Added locators");

        self.notify(player.id, Color::Default, LOCATE_MESSAGE).await?;
        Ok(report)
    }

    async fn notify(&self, user: UserId, color: Color, text: &str) -> Result<()> {
        if let Err(e) = self.sink.send(user, color, text).await {
            warn!(user = %user, error = %e, "Failed to notify user");
            return Err(e.into());
        }
        Ok(())
    }
}

async fn rename_group(
    names: Arc<dyn NameSupplier>,
    prefix: String,
    group: GridGroup,
) -> RenameOutcome {
    let name = group.name().to_string();
    let base = match names.generate_name().await {
        Ok(base) => base,
        Err(e) => {
            warn!(group = %name, error = %e, "Failed to generate a name");
            return RenameOutcome::Failed {
                group: name,
                reason: e.to_string(),
            };
        }
    };
    let new_name = format!("{prefix} {base}");

    let top = group.top_grid();
    if top.is_closed() {
        return RenameOutcome::Skipped { group: name };
    }

    match top.request_rename(&new_name) {
        Ok(()) => {
            trace!(from = %name, to = %new_name, "renamed");
            RenameOutcome::Renamed {
                from: name,
                to: new_name,
            }
        }
        Err(WorldError::Closed(_)) => RenameOutcome::Skipped { group: name },
        Err(e) => {
            warn!(group = %name, error = %e, "Rename rejected");
            RenameOutcome::Failed {
                group: name,
                reason: e.to_string(),
            }
        }
    }
}

fn delete_group(group: &GridGroup) -> GroupDeletion {
    let mut deletion = GroupDeletion::default();

    for grid in group.grids() {
        let id = grid.entity_id();
        if grid.is_closed() {
            deletion.skipped.push(id);
            continue;
        }

        match grid.close() {
            Ok(()) => deletion.closed.push(id),
            Err(WorldError::Closed(_)) => deletion.skipped.push(id),
            Err(e) => {
                warn!(group = %group.name(), entity = %id, error = %e, "Delete rejected");
                deletion.failed.push((id, e.to_string()));
            }
        }
    }

    deletion
}

pub fn warning_message(group_names: &[&str], command_prefix: &str) -> String {
    let listing = group_names
        .iter()
        .map(|name| format!("> '{name}'"))
        .collect::<Vec<_>>()
        .join("\n");

    format!("\nNAME YOUR GRIDS ASAP!\n{listing}\n\n> !{command_prefix} help\n")
}

pub fn rename_message(renamed: &[(String, String)]) -> String {
    let mut message = String::from("Renamed your unnamed grids!\n");
    for (from, to) in renamed {
        message.push_str(&format!("| '{from}' -> '{to}'\n"));
    }
    message
}

pub fn delete_message(group_names: &[String]) -> String {
    let mut message = String::from("\nDeleted your unnamed grids!\n");
    for name in group_names {
        message.push_str(&format!("> '{name}'\n"));
    }
    message
}
