// Fleet Domain Model

use serde::{Deserialize, Serialize};

/// Ship counts attached to a task, keyed by the short unit codes of the
/// worker protocol. Copied verbatim into every dispatched work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fleet {
    /// Light fighter
    #[serde(default)]
    pub lf: i64,
    /// Heavy fighter
    #[serde(default)]
    pub hf: i64,
    /// Cruiser
    #[serde(default)]
    pub cr: i64,
    /// Battleship
    #[serde(default)]
    pub bs: i64,
    /// Bomber
    #[serde(default)]
    pub bomb: i64,
    /// Destroyer
    #[serde(default)]
    pub de: i64,
    /// Deathstar
    #[serde(default)]
    pub ds: i64,
    /// Small cargo
    #[serde(default)]
    pub sc: i64,
    /// Large cargo
    #[serde(default)]
    pub lc: i64,
    /// Recycler
    #[serde(default)]
    pub recy: i64,
    /// Espionage probe
    #[serde(default)]
    pub esp: i64,
}

impl Fleet {
    pub fn is_empty(&self) -> bool {
        *self == Fleet::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_fleet_deserializes_with_zero_defaults() {
        let fleet: Fleet = serde_json::from_str(r#"{"lf": 10, "hf": 5, "ds": 30}"#).unwrap();
        assert_eq!(fleet.lf, 10);
        assert_eq!(fleet.hf, 5);
        assert_eq!(fleet.ds, 30);
        assert_eq!(fleet.cr, 0);
        assert!(!fleet.is_empty());
    }
}
