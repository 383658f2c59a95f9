use async_trait::async_trait;
use rand::seq::SliceRandom;

use crate::error::CleanupError;
use crate::world::NameSupplier;

const ADJECTIVES: &[&str] = &[
    "Amber", "Ancient", "Bold", "Brave", "Bright", "Calm", "Clever", "Cobalt", "Crimson", "Daring",
    "Distant", "Dusty", "Eager", "Fierce", "Frozen", "Gentle", "Golden", "Hidden", "Hollow",
    "Iron", "Jade", "Lone", "Lucky", "Midnight", "Noble", "Quiet", "Rapid", "Rusty", "Silent",
    "Silver", "Solar", "Steady", "Swift", "Tidal", "Vast", "Wild",
];

const NOUNS: &[&str] = &[
    "Anvil", "Arrow", "Badger", "Beacon", "Comet", "Condor", "Falcon", "Forge", "Harbor",
    "Hammer", "Heron", "Horizon", "Lantern", "Meteor", "Nebula", "Orbit", "Otter", "Pioneer",
    "Quasar", "Raven", "Ridge", "Rover", "Sentinel", "Sparrow", "Spire", "Talon", "Tortoise",
    "Vanguard", "Voyager", "Warden", "Wolf", "Zephyr",
];

/// Picks an adjective and a noun from a built-in word bank, e.g. `SilentHeron`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WordBankNames;

impl WordBankNames {
    pub fn new() -> Self {
        Self
    }

    fn pick() -> Option<String> {
        let mut rng = rand::thread_rng();
        let adjective = ADJECTIVES.choose(&mut rng)?;
        let noun = NOUNS.choose(&mut rng)?;
        Some(format!("{adjective}{noun}"))
    }
}

#[async_trait]
impl NameSupplier for WordBankNames {
    async fn generate_name(&self) -> Result<String, CleanupError> {
        Self::pick().ok_or_else(|| CleanupError::NameGeneration("word bank is empty".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::is_unnamed;

    #[tokio::test]
    async fn test_generated_name_is_an_adjective_noun_pair() {
        let name = WordBankNames::new().generate_name().await.unwrap();

        let adjective = ADJECTIVES
            .iter()
            .find(|a| name.starts_with(*a))
            .expect("name starts with an adjective");
        assert!(NOUNS.contains(&&name[adjective.len()..]));
    }

    #[test]
    fn test_renamed_grids_never_look_auto_generated() {
        for adjective in ADJECTIVES {
            for noun in NOUNS {
                let pair = format!("{adjective}{noun}");
                assert!(!is_unnamed(&pair), "{pair}");

                // As composed by a rename: "<faction tag> <player> <pair>"
                let renamed = format!("ABC Alice {pair}");
                assert!(!is_unnamed(&renamed), "{renamed}");
            }
        }
    }
}
