//! Collaborator interfaces the cleanup core talks to.
//!
//! Everything in here is owned by the hosting server: the live grid graph,
//! the session roster, factions, chat delivery and HUD locators. The core only
//! ever sees these traits, which keeps it testable against the in-memory
//! backends in [`crate::backend::memory`].

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{CleanupError, NotifyError, WorldError};
use crate::model::{Color, EntityId, Locator, Player, Position, UserId};

/// Handle to a grid entity owned by the world.
///
/// Handles stay valid after the grid is closed; all accessors keep answering
/// and [`Grid::is_closed`] reports `true`.
pub trait Grid: Send + Sync {
    fn entity_id(&self) -> EntityId;

    fn display_name(&self) -> String;

    fn is_closed(&self) -> bool;

    fn position(&self) -> Position;

    fn big_owners(&self) -> Vec<UserId>;

    fn small_owners(&self) -> Vec<UserId>;

    /// Ask the world to rename this grid.
    fn request_rename(&self, name: &str) -> Result<(), WorldError>;

    /// Ask the world to remove this grid.
    fn close(&self) -> Result<(), WorldError>;
}

pub type GridRef = Arc<dyn Grid>;

/// The live world graph, partitioned into logically connected grid groups.
#[cfg_attr(test, mockall::automock)]
pub trait World: Send + Sync {
    fn logical_groups(&self) -> Result<Vec<Vec<GridRef>>, WorldError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait Roster: Send + Sync {
    fn online_players(&self) -> Vec<Player>;
}

#[cfg_attr(test, mockall::automock)]
pub trait FactionProvider: Send + Sync {
    /// Tag of the faction `user` belongs to, if any.
    fn faction_tag(&self, user: UserId) -> Option<String>;
}

/// Delivers chat messages to a single user. Best effort.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn send(&self, user: UserId, color: Color, text: &str) -> Result<(), NotifyError>;
}

/// Source of decorative names, e.g. `BraveFalcon`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NameSupplier: Send + Sync {
    async fn generate_name(&self) -> Result<String, CleanupError>;
}

#[cfg_attr(test, mockall::automock)]
pub trait LocatorRegistry: Send + Sync {
    fn add_locator(&self, user: UserId, locator: Locator);
}

/// Seconds between two warning cycles, read once per cycle.
pub trait IntervalProvider: Send + Sync {
    fn interval_secs(&self) -> f64;
}

impl IntervalProvider for common::SharedConfig {
    fn interval_secs(&self) -> f64 {
        self.interval()
    }
}

impl IntervalProvider for f64 {
    fn interval_secs(&self) -> f64 {
        *self
    }
}
