//! Persisted world state.
//!
//! The JSON form is compact: `[global, entities, free]`, where `global`
//! carries the id counter next to every component's global value.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use signet_core::{EntityId, Error, Map, Result};

use crate::entity::EntityRecord;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GlobalState {
    pub next_id: u32,
    #[serde(flatten)]
    pub values: Map,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "CompactSnapshot", into = "CompactSnapshot")]
pub struct WorldSnapshot {
    pub global: GlobalState,
    /// Live entities in ascending id order, components in persisted form.
    pub entities: Vec<EntityRecord>,
    pub free: Vec<EntityId>,
}

#[derive(Serialize, Deserialize)]
struct CompactSnapshot(GlobalState, Vec<EntityRecord>, Vec<EntityId>);

impl From<CompactSnapshot> for WorldSnapshot {
    fn from(CompactSnapshot(global, entities, free): CompactSnapshot) -> Self {
        Self {
            global,
            entities,
            free,
        }
    }
}

impl From<WorldSnapshot> for CompactSnapshot {
    fn from(snapshot: WorldSnapshot) -> Self {
        CompactSnapshot(snapshot.global, snapshot.entities, snapshot.free)
    }
}

impl WorldSnapshot {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Check that every live and free id is below the counter and that no
    /// id appears twice, live or free.
    pub fn validate(&self) -> Result<()> {
        let next_id = self.global.next_id;
        let mut seen = HashSet::with_capacity(self.entities.len() + self.free.len());
        let ids = self.entities.iter().map(|record| record.id);
        for id in ids.chain(self.free.iter().copied()) {
            if id.0 >= next_id {
                return Err(Error::InvalidArgument(format!(
                    "snapshot id {id} is not below the next id {next_id}"
                )));
            }
            if !seen.insert(id) {
                return Err(Error::EntityExists(id));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use signet_core::Error;

    #[test]
    fn compact_layout() {
        let mut record = EntityRecord::new(EntityId(1));
        record.components.insert("tag".to_owned(), json!(true));
        let mut values = Map::new();
        values.insert("score".to_owned(), json!(10));
        let snapshot = WorldSnapshot {
            global: GlobalState { next_id: 3, values },
            entities: vec![record],
            free: vec![EntityId(0), EntityId(2)],
        };
        let json: serde_json::Value = serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(
            json,
            json!([{"next_id": 3, "score": 10}, [{"id": 1, "tag": true}], [0, 2]])
        );
        assert_eq!(WorldSnapshot::from_json(&json.to_string()).unwrap(), snapshot);
    }

    #[test]
    fn validate_checks_ids_against_the_counter() {
        let snapshot = |next_id, live: &[u32], free: &[u32]| WorldSnapshot {
            global: GlobalState {
                next_id,
                values: Map::new(),
            },
            entities: live.iter().map(|&id| EntityRecord::new(EntityId(id))).collect(),
            free: free.iter().map(|&id| EntityId(id)).collect(),
        };
        snapshot(3, &[1], &[0, 2]).validate().unwrap();
        assert!(matches!(
            snapshot(3, &[1], &[1]).validate(),
            Err(Error::EntityExists(EntityId(1)))
        ));
        assert!(matches!(
            snapshot(3, &[3], &[]).validate(),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            snapshot(3, &[0], &[2, 2]).validate(),
            Err(Error::EntityExists(EntityId(2)))
        ));
    }

    #[test]
    fn malformed_json_is_a_snapshot_error() {
        assert!(matches!(
            WorldSnapshot::from_json("{\"entities\": []}"),
            Err(Error::Snapshot(_))
        ));
    }
}
