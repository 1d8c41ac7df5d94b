//! World state ledger.
//!
//! Accumulates inventory and status tags derived from narrative side
//! effects, so later pages stay consistent with what already happened
//! (an acquired lantern stays acquired, a healed injury stays healed).

use serde::{Deserialize, Serialize};

/// Accumulated world facts carried into every generation request.
///
/// Each collection behaves as a set: a tag appears at most once and
/// ordering carries no meaning.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldState {
    /// Items the hero currently carries.
    #[serde(default)]
    pub inventory: Vec<String>,

    /// Active conditions, e.g. "Injured Leg", "Cursed".
    #[serde(default)]
    pub status: Vec<String>,

    /// Tags describing visited or notable locations.
    #[serde(default)]
    pub location_tags: Vec<String>,
}

impl WorldState {
    /// Apply a narrative delta: additions first, then removals.
    ///
    /// Adding a tag that is already present is a no-op, so replayed or
    /// duplicated updates cannot grow the sets.
    pub fn apply(&mut self, update: &WorldUpdate) {
        for item in &update.add_items {
            if !self.inventory.contains(item) {
                self.inventory.push(item.clone());
            }
        }
        self.inventory.retain(|item| !update.remove_items.contains(item));

        for status in &update.add_status {
            if !self.status.contains(status) {
                self.status.push(status.clone());
            }
        }
        self.status.retain(|status| !update.remove_status.contains(status));
    }

    /// Whether nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.inventory.is_empty() && self.status.is_empty() && self.location_tags.is_empty()
    }
}

/// A delta produced by one narrative beat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldUpdate {
    #[serde(default)]
    pub add_items: Vec<String>,

    #[serde(default)]
    pub remove_items: Vec<String>,

    #[serde(default)]
    pub add_status: Vec<String>,

    #[serde(default)]
    pub remove_status: Vec<String>,
}

impl WorldUpdate {
    /// Whether this delta changes nothing.
    pub fn is_empty(&self) -> bool {
        self.add_items.is_empty()
            && self.remove_items.is_empty()
            && self.add_status.is_empty()
            && self.remove_status.is_empty()
    }
}
