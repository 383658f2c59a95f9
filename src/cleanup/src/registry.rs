//! Snapshot of grid groups plus the ignore lists that gate warnings.
//!
//! All state sits behind a single [`RwLock`]. A collection holds the write
//! guard for the whole rebuild, so a query either sees the previous snapshot
//! or the new one, and always sees the ignore lists that were current at the
//! moment it took its read guard.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, trace};

use crate::classifier;
use crate::error::WorldError;
use crate::model::UserId;
use crate::world::{GridRef, World};

/// A logically connected set of grids, as seen at collection time.
///
/// Only built through [`GridGroup::from_grids`], so it always has at least
/// one member.
#[derive(Clone)]
pub struct GridGroup {
    name: String,
    owners: BTreeSet<UserId>,
    grids: Vec<GridRef>,
}

impl GridGroup {
    /// Build a group from its members. Returns `None` for an empty group.
    pub fn from_grids(grids: Vec<GridRef>) -> Option<Self> {
        let name = grids.first()?.display_name();
        let owners = grids
            .iter()
            .flat_map(|g| g.big_owners().into_iter().chain(g.small_owners()))
            .collect();

        Some(Self {
            name,
            owners,
            grids,
        })
    }

    /// Display name of the first grid of the group
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Big and small owners across every grid in the group
    pub fn owners(&self) -> &BTreeSet<UserId> {
        &self.owners
    }

    pub fn grids(&self) -> &[GridRef] {
        &self.grids
    }

    pub fn is_owned_by(&self, user: UserId) -> bool {
        self.owners.contains(&user)
    }

    /// The representative grid the group is named after.
    pub fn top_grid(&self) -> &GridRef {
        &self.grids[0]
    }

    pub fn is_deletable(&self) -> bool {
        classifier::is_deletable(&self.grids)
    }
}

impl std::fmt::Debug for GridGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridGroup")
            .field("name", &self.name)
            .field("owners", &self.owners)
            .field(
                "grids",
                &self.grids.iter().map(|g| g.entity_id()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Groups known at one point in time.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    /// Incremented on every successful collection, starting at 1
    pub version: u64,
    pub groups: Arc<Vec<GridGroup>>,
}

#[derive(Default)]
struct RegistryState {
    snapshot: Snapshot,
    ignored_groups: HashSet<String>,
    ignored_users: HashSet<UserId>,
}

pub struct GroupRegistry {
    world: Arc<dyn World>,
    state: RwLock<RegistryState>,
}

impl GroupRegistry {
    pub fn new(world: Arc<dyn World>) -> Self {
        Self {
            world,
            state: RwLock::new(RegistryState::default()),
        }
    }

    /// Replace the snapshot with the groups currently in the world.
    /// On failure the previous snapshot stays in place.
    pub fn collect(&self) -> Result<u64, WorldError> {
        let mut state = self.state.write();

        let groups: Vec<GridGroup> = self
            .world
            .logical_groups()?
            .into_iter()
            .filter_map(GridGroup::from_grids)
            .collect();

        for group in &groups {
            trace!(owners = ?group.owners, name = %group.name, "group");
        }

        let version = state.snapshot.version + 1;
        debug!(version, groups = groups.len(), "Collected grid groups");

        state.snapshot = Snapshot {
            version,
            groups: Arc::new(groups),
        };
        Ok(version)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.state.read().snapshot.clone()
    }

    /// Deletable groups owned by `user` that nobody asked to ignore,
    /// in snapshot order.
    pub fn search_deletable_groups(&self, user: UserId) -> Vec<GridGroup> {
        let state = self.state.read();

        if state.ignored_users.contains(&user) {
            return Vec::new();
        }

        state
            .snapshot
            .groups
            .iter()
            .filter(|g| !state.ignored_groups.contains(&g.name))
            .filter(|g| g.is_owned_by(user))
            .filter(|g| g.is_deletable())
            .cloned()
            .collect()
    }

    /// Exclude every group called `name` from warnings. Returns `false` when
    /// no group of that name is currently known, which may just mean it was
    /// transient.
    pub fn ignore_group(&self, name: &str) -> bool {
        let mut state = self.state.write();
        state.ignored_groups.insert(name.to_string());
        state.snapshot.groups.iter().any(|g| g.name == name)
    }

    pub fn ignore_user(&self, user: UserId) {
        self.state.write().ignored_users.insert(user);
    }

    pub fn unignore_user(&self, user: UserId) {
        self.state.write().ignored_users.remove(&user);
    }

    pub fn is_user_ignored(&self, user: UserId) -> bool {
        self.state.read().ignored_users.contains(&user)
    }

    pub fn is_group_ignored(&self, name: &str) -> bool {
        self.state.read().ignored_groups.contains(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::memory::{GridSpec, InMemoryWorld};
    use crate::world::MockWorld;

    fn registry_with(specs: Vec<GridSpec>) -> (InMemoryWorld, GroupRegistry) {
        let world = InMemoryWorld::from_specs(specs);
        let registry = GroupRegistry::new(Arc::new(world.clone()));
        registry.collect().unwrap();
        (world, registry)
    }

    fn names(groups: &[GridGroup]) -> Vec<&str> {
        groups.iter().map(|g| g.name()).collect()
    }

    #[test]
    fn test_group_takes_name_of_first_grid_and_unions_owners() {
        let (_, registry) = registry_with(vec![
            GridSpec::new(1, "Large Grid 1").group(1).big_owner(7),
            GridSpec::new(2, "Small Grid 2").group(1).small_owner(8).big_owner(7),
        ]);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.groups.len(), 1);
        let group = &snapshot.groups[0];
        assert_eq!(group.name(), "Large Grid 1");
        assert_eq!(group.owners(), &BTreeSet::from([UserId(7), UserId(8)]));
        assert_eq!(group.top_grid().entity_id().0, 1);
    }

    #[test]
    fn test_group_always_has_a_top_grid() {
        assert!(GridGroup::from_grids(Vec::new()).is_none());

        let world = InMemoryWorld::from_specs([GridSpec::new(4, "Large Grid 4").group(1)]);
        let grids = world.logical_groups().unwrap().remove(0);
        let group = GridGroup::from_grids(grids).unwrap();
        assert_eq!(group.top_grid().entity_id().0, 4);
        assert_eq!(group.grids().len(), 1);
    }

    #[test]
    fn test_only_owned_deletable_groups_are_returned() {
        let (_, registry) = registry_with(vec![
            GridSpec::new(1, "Large Grid 1").group(1).big_owner(7),
            GridSpec::new(2, "MyBase").group(2).big_owner(7),
            GridSpec::new(3, "Small Ship 3").group(3).big_owner(8),
        ]);

        assert_eq!(names(&registry.search_deletable_groups(UserId(7))), vec!["Large Grid 1"]);
        assert_eq!(names(&registry.search_deletable_groups(UserId(8))), vec!["Small Ship 3"]);
        assert!(registry.search_deletable_groups(UserId(9)).is_empty());
    }

    #[test]
    fn test_ignored_user_gets_nothing_until_unignored() {
        let (_, registry) =
            registry_with(vec![GridSpec::new(1, "Large Grid 1").group(1).big_owner(7)]);

        registry.ignore_user(UserId(7));
        assert!(registry.is_user_ignored(UserId(7)));
        assert!(registry.search_deletable_groups(UserId(7)).is_empty());

        registry.unignore_user(UserId(7));
        assert_eq!(registry.search_deletable_groups(UserId(7)).len(), 1);
    }

    #[test]
    fn test_ignore_group_applies_to_every_owner_and_is_idempotent() {
        let (_, registry) = registry_with(vec![
            GridSpec::new(1, "Large Grid 1").group(1).big_owner(7).big_owner(8),
            GridSpec::new(2, "Large Grid 2").group(2).big_owner(7),
        ]);

        assert!(registry.ignore_group("Large Grid 1"));
        assert!(registry.ignore_group("Large Grid 1"));
        assert!(registry.is_group_ignored("Large Grid 1"));

        assert_eq!(names(&registry.search_deletable_groups(UserId(7))), vec!["Large Grid 2"]);
        assert!(registry.search_deletable_groups(UserId(8)).is_empty());
    }

    #[test]
    fn test_ignore_unknown_group_still_records_it() {
        let (world, registry) = registry_with(vec![]);

        assert!(!registry.ignore_group("Large Grid 5"));

        world.add_grid(GridSpec::new(5, "Large Grid 5").group(1).big_owner(7));
        registry.collect().unwrap();
        assert!(registry.search_deletable_groups(UserId(7)).is_empty());
    }

    #[test]
    fn test_collect_replaces_snapshot_wholesale() {
        let (world, registry) =
            registry_with(vec![GridSpec::new(1, "Large Grid 1").group(1).big_owner(7)]);
        let first = registry.snapshot();
        assert_eq!(first.version, 1);

        world.remove_grid(crate::model::EntityId(1));
        world.add_grid(GridSpec::new(2, "Small Grid 2").group(2).big_owner(7));
        registry.collect().unwrap();

        let second = registry.snapshot();
        assert_eq!(second.version, 2);
        assert_eq!(names(&second.groups), vec!["Small Grid 2"]);
        // The old snapshot is untouched
        assert_eq!(names(&first.groups), vec!["Large Grid 1"]);
    }

    #[test]
    fn test_classification_follows_live_names_within_a_snapshot() {
        let (world, registry) =
            registry_with(vec![GridSpec::new(1, "Large Grid 1").group(1).big_owner(7)]);

        world.set_name(crate::model::EntityId(1), "Homestead");

        // The group name is fixed at collection, deletability is not
        assert!(registry.search_deletable_groups(UserId(7)).is_empty());
    }

    #[test]
    fn test_failed_collect_keeps_previous_snapshot() {
        let mut world = MockWorld::new();
        let mut calls = 0;
        world.expect_logical_groups().returning(move || {
            calls += 1;
            if calls == 1 {
                Ok(vec![])
            } else {
                Err(WorldError::Unavailable("unloading".to_string()))
            }
        });
        let registry = GroupRegistry::new(Arc::new(world));

        assert_eq!(registry.collect().unwrap(), 1);
        assert!(registry.collect().is_err());
        assert_eq!(registry.snapshot().version, 1);
    }

    #[test]
    fn test_empty_groups_are_skipped() {
        let mut world = MockWorld::new();
        world.expect_logical_groups().returning(|| Ok(vec![vec![]]));
        let registry = GroupRegistry::new(Arc::new(world));

        registry.collect().unwrap();
        assert!(registry.snapshot().groups.is_empty());
    }
}
