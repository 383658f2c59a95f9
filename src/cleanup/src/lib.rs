pub mod backend;
pub mod classifier;
pub mod commands;
pub mod cycle;
pub mod engine;
pub mod error;
pub mod model;
pub mod names;
pub mod registry;
pub mod world;

pub use commands::{ChatCommand, CommandContext, CommandHandler};
pub use cycle::{CycleHandle, CycleState, WarningCycle};
pub use engine::WarningEngine;
pub use error::{CleanupError, NotifyError, Result, WorldError};
pub use model::{Color, EntityId, Locator, Player, Position, UserId};
pub use registry::{GridGroup, GroupRegistry};
