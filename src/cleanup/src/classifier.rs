//! Deletability rules for grid groups.
//!
//! A group is deletable when nobody owns any of its grids, or when every grid
//! still carries the name the game generated for it. The predicate reads the
//! live grid state every time it runs.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::world::GridRef;

static UNNAMED_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(Static|Large|Small)\s(Grid|Ship).*$").expect("unnamed grid pattern is valid")
});

/// Whether `name` is an auto-generated grid name such as `Large Grid 1234`.
pub fn is_unnamed(name: &str) -> bool {
    UNNAMED_PATTERN.is_match(name)
}

pub fn is_deletable(grids: &[GridRef]) -> bool {
    let owned = grids
        .iter()
        .any(|g| !g.big_owners().is_empty() || !g.small_owners().is_empty());

    if !owned {
        return true;
    }

    grids.iter().all(|g| is_unnamed(&g.display_name()))
}
