//! In-process implementations of the collaborator traits.
//!
//! The world keeps every grid in a single map behind one lock and records all
//! rename/close requests it receives, so callers can assert on exactly which
//! mutations were issued.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::error::{CleanupError, NotifyError, WorldError};
use crate::model::{Color, EntityId, Locator, Player, Position, UserId};
use crate::world::{
    FactionProvider, Grid, GridRef, LocatorRegistry, NameSupplier, NotificationSink, Roster, World,
};

/// Description of a grid to place into an [`InMemoryWorld`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub id: EntityId,
    pub name: String,
    /// Grids sharing a group key form one logical group
    #[serde(default)]
    pub group: u32,
    #[serde(default)]
    pub big_owners: Vec<UserId>,
    #[serde(default)]
    pub small_owners: Vec<UserId>,
    #[serde(default)]
    pub position: Position,
}

impl GridSpec {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self {
            id: EntityId(id),
            name: name.into(),
            group: 0,
            big_owners: Vec::new(),
            small_owners: Vec::new(),
            position: Position::default(),
        }
    }

    pub fn group(mut self, group: u32) -> Self {
        self.group = group;
        self
    }

    pub fn big_owner(mut self, user: i64) -> Self {
        self.big_owners.push(UserId(user));
        self
    }

    pub fn small_owner(mut self, user: i64) -> Self {
        self.small_owners.push(UserId(user));
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = position;
        self
    }
}

/// A mutation request received by the world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    Rename { entity: EntityId, name: String },
    Close { entity: EntityId },
}

#[derive(Debug)]
struct GridState {
    spec: GridSpec,
    closed: bool,
}

#[derive(Debug, Default)]
struct WorldState {
    grids: BTreeMap<EntityId, GridState>,
    mutations: Vec<Mutation>,
    rejecting: HashSet<EntityId>,
    unavailable: bool,
}

/// Grid graph held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorld {
    state: Arc<Mutex<WorldState>>,
}

impl InMemoryWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_specs(specs: impl IntoIterator<Item = GridSpec>) -> Self {
        let world = Self::new();
        for spec in specs {
            world.add_grid(spec);
        }
        world
    }

    /// Place a grid into the world, replacing any grid with the same id.
    pub fn add_grid(&self, spec: GridSpec) -> GridRef {
        let id = spec.id;
        self.state
            .lock()
            .grids
            .insert(id, GridState { spec, closed: false });
        self.handle(id)
    }

    /// Handle to a grid, open or closed.
    pub fn grid(&self, id: EntityId) -> Option<GridRef> {
        self.state
            .lock()
            .grids
            .contains_key(&id)
            .then(|| self.handle(id))
    }

    /// Remove a grid the way another actor in the world would, without
    /// recording a mutation.
    pub fn remove_grid(&self, id: EntityId) {
        if let Some(grid) = self.state.lock().grids.get_mut(&id) {
            grid.closed = true;
        }
    }

    /// Rename a grid the way its owner would, without recording a mutation.
    pub fn set_name(&self, id: EntityId, name: impl Into<String>) {
        if let Some(grid) = self.state.lock().grids.get_mut(&id) {
            grid.spec.name = name.into();
        }
    }

    /// Reject every future rename/close request for `id`.
    pub fn reject_mutations_for(&self, id: EntityId) {
        self.state.lock().rejecting.insert(id);
    }

    /// Make [`World::logical_groups`] fail until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unavailable = unavailable;
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().mutations.clone()
    }

    pub fn close_requests(&self) -> Vec<EntityId> {
        self.mutations()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::Close { entity } => Some(entity),
                Mutation::Rename { .. } => None,
            })
            .collect()
    }

    pub fn rename_requests(&self) -> Vec<(EntityId, String)> {
        self.mutations()
            .into_iter()
            .filter_map(|m| match m {
                Mutation::Rename { entity, name } => Some((entity, name)),
                Mutation::Close { .. } => None,
            })
            .collect()
    }

    /// Whether `id` is closed or was never placed.
    pub fn is_closed(&self, id: EntityId) -> bool {
        self.state.lock().grids.get(&id).is_none_or(|g| g.closed)
    }

    fn handle(&self, id: EntityId) -> GridRef {
        Arc::new(MemoryGrid {
            id,
            state: self.state.clone(),
        })
    }
}

impl World for InMemoryWorld {
    fn logical_groups(&self) -> Result<Vec<Vec<GridRef>>, WorldError> {
        let ids: BTreeMap<u32, Vec<EntityId>> = {
            let state = self.state.lock();
            if state.unavailable {
                return Err(WorldError::Unavailable("world is not loaded".to_string()));
            }

            let mut groups: BTreeMap<u32, Vec<EntityId>> = BTreeMap::new();
            for (id, grid) in state.grids.iter().filter(|(_, g)| !g.closed) {
                groups.entry(grid.spec.group).or_default().push(*id);
            }
            groups
        };

        Ok(ids
            .into_values()
            .map(|members| members.into_iter().map(|id| self.handle(id)).collect())
            .collect())
    }
}

struct MemoryGrid {
    id: EntityId,
    state: Arc<Mutex<WorldState>>,
}

impl MemoryGrid {
    fn read<T: Default>(&self, f: impl FnOnce(&GridState) -> T) -> T {
        self.state.lock().grids.get(&self.id).map(f).unwrap_or_default()
    }

    fn mutate(&self, mutation: Mutation) -> Result<(), WorldError> {
        let mut state = self.state.lock();
        if state.rejecting.contains(&self.id) {
            return Err(WorldError::Rejected(
                self.id,
                "grid is protected".to_string(),
            ));
        }

        let grid = state
            .grids
            .get_mut(&self.id)
            .filter(|g| !g.closed)
            .ok_or(WorldError::Closed(self.id))?;

        match &mutation {
            Mutation::Rename { name, .. } => grid.spec.name = name.clone(),
            Mutation::Close { .. } => grid.closed = true,
        }
        state.mutations.push(mutation);
        Ok(())
    }
}

impl Grid for MemoryGrid {
    fn entity_id(&self) -> EntityId {
        self.id
    }

    fn display_name(&self) -> String {
        self.read(|g| g.spec.name.clone())
    }

    fn is_closed(&self) -> bool {
        self.state
            .lock()
            .grids
            .get(&self.id)
            .is_none_or(|g| g.closed)
    }

    fn position(&self) -> Position {
        self.read(|g| g.spec.position)
    }

    fn big_owners(&self) -> Vec<UserId> {
        self.read(|g| g.spec.big_owners.clone())
    }

    fn small_owners(&self) -> Vec<UserId> {
        self.read(|g| g.spec.small_owners.clone())
    }

    fn request_rename(&self, name: &str) -> Result<(), WorldError> {
        self.mutate(Mutation::Rename {
            entity: self.id,
            name: name.to_string(),
        })
    }

    fn close(&self) -> Result<(), WorldError> {
        self.mutate(Mutation::Close { entity: self.id })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryRoster {
    players: Mutex<Vec<Player>>,
}

impl InMemoryRoster {
    pub fn new(players: impl IntoIterator<Item = Player>) -> Self {
        Self {
            players: Mutex::new(players.into_iter().collect()),
        }
    }

    pub fn find(&self, user: UserId) -> Option<Player> {
        self.players.lock().iter().find(|p| p.id == user).cloned()
    }
}

impl Roster for InMemoryRoster {
    fn online_players(&self) -> Vec<Player> {
        self.players.lock().clone()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryFactions {
    tags: Mutex<HashMap<UserId, String>>,
}

impl InMemoryFactions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, user: UserId, tag: impl Into<String>) {
        self.tags.lock().insert(user, tag.into());
    }
}

impl FactionProvider for InMemoryFactions {
    fn faction_tag(&self, user: UserId) -> Option<String> {
        self.tags.lock().get(&user).cloned()
    }
}

/// A message captured by [`RecordingSink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub user: UserId,
    pub color: Color,
    pub text: String,
}

/// Sink that keeps every delivered message in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    messages: Mutex<Vec<SentMessage>>,
    unreachable: Mutex<HashSet<UserId>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every delivery to `user` from now on.
    pub fn make_unreachable(&self, user: UserId) {
        self.unreachable.lock().insert(user);
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.messages.lock().clone()
    }

    pub fn messages_for(&self, user: UserId) -> Vec<SentMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.user == user)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn send(&self, user: UserId, color: Color, text: &str) -> Result<(), NotifyError> {
        if self.unreachable.lock().contains(&user) {
            return Err(NotifyError(format!("user {user} is unreachable")));
        }

        self.messages.lock().push(SentMessage {
            user,
            color,
            text: text.to_string(),
        });
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingLocators {
    locators: Mutex<Vec<(UserId, Locator)>>,
}

impl RecordingLocators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn locators_for(&self, user: UserId) -> Vec<Locator> {
        self.locators
            .lock()
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, l)| l.clone())
            .collect()
    }
}

impl LocatorRegistry for RecordingLocators {
    fn add_locator(&self, user: UserId, locator: Locator) {
        self.locators.lock().push((user, locator));
    }
}

/// Deterministic names: `Name1`, `Name2`, ...
#[derive(Debug, Default)]
pub struct SequentialNames {
    next: AtomicUsize,
}

impl SequentialNames {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl NameSupplier for SequentialNames {
    async fn generate_name(&self) -> Result<String, CleanupError> {
        let n = self.next.fetch_add(1, Ordering::Relaxed) + 1;
        Ok(format!("Name{n}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_groups_are_partitioned_by_key() {
        let world = InMemoryWorld::from_specs([
            GridSpec::new(1, "Large Grid 1").group(2),
            GridSpec::new(2, "Small Grid 2").group(1),
            GridSpec::new(3, "Small Grid 3").group(2),
        ]);

        let groups = world.logical_groups().unwrap();
        let ids: Vec<Vec<i64>> = groups
            .iter()
            .map(|g| g.iter().map(|grid| grid.entity_id().0).collect())
            .collect();
        assert_eq!(ids, vec![vec![2], vec![1, 3]]);
    }

    #[test]
    fn test_closed_grids_leave_the_graph() {
        let world = InMemoryWorld::from_specs([GridSpec::new(1, "A"), GridSpec::new(2, "B")]);
        let grid = world.grid(EntityId(1)).unwrap();

        grid.close().unwrap();

        assert!(grid.is_closed());
        assert_eq!(world.logical_groups().unwrap()[0].len(), 1);
        assert_eq!(world.close_requests(), vec![EntityId(1)]);
        assert_eq!(grid.close(), Err(WorldError::Closed(EntityId(1))));
    }

    #[test]
    fn test_external_removal_is_not_a_mutation() {
        let world = InMemoryWorld::from_specs([GridSpec::new(1, "A")]);
        let grid = world.grid(EntityId(1)).unwrap();

        world.remove_grid(EntityId(1));

        assert!(grid.is_closed());
        assert!(world.mutations().is_empty());
    }

    #[test]
    fn test_rejected_mutation_leaves_grid_untouched() {
        let world = InMemoryWorld::from_specs([GridSpec::new(1, "Large Grid 1")]);
        world.reject_mutations_for(EntityId(1));
        let grid = world.grid(EntityId(1)).unwrap();

        assert!(matches!(
            grid.request_rename("Fort"),
            Err(WorldError::Rejected(..))
        ));
        assert_eq!(grid.display_name(), "Large Grid 1");
        assert!(world.mutations().is_empty());
    }

    #[test]
    fn test_unavailable_world() {
        let world = InMemoryWorld::new();
        world.set_unavailable(true);
        assert!(world.logical_groups().is_err());
    }

    #[tokio::test]
    async fn test_recording_sink_failure() {
        let sink = RecordingSink::new();
        sink.make_unreachable(UserId(2));

        sink.send(UserId(1), Color::Red, "hi").await.unwrap();
        assert!(sink.send(UserId(2), Color::Red, "hi").await.is_err());
        assert_eq!(sink.messages().len(), 1);
    }

    #[tokio::test]
    async fn test_sequential_names() {
        let names = SequentialNames::new();
        assert_eq!(names.generate_name().await.unwrap(), "Name1");
        assert_eq!(names.generate_name().await.unwrap(), "Name2");
    }
}
