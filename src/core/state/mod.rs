// SPDX-License-Identifier: MIT OR Apache-2.0

//! Correlation store: per-epoch tables mapping an underlying event id to the
//! binding history accumulated across dependent-state steps.
//!
//! One table exists per root behavior. A table lives for exactly one
//! correlation epoch; qualifier reinitialization rebuilds it from scratch.
//! Dependent-state passes run inside an explicit begin/commit transaction
//! with a per-transaction tombstone set, which is what guarantees each
//! record is consumed at most once per pass.

use std::collections::{BTreeMap, HashMap, HashSet};

use log::trace;
use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, EngineResult};
use crate::core::event::AttributeValue;
use crate::core::tree::Constraint;

/// One correlation-table row, keyed by underlying event id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub record_id: u64,
    pub curr_state_name: String,
    pub curr_state_val: BTreeMap<String, AttributeValue>,
    pub next_state_name: Option<String>,
    pub next_state_val: BTreeMap<String, AttributeValue>,
    pub constraints: Vec<Constraint>,
    pub output: Vec<String>,
    /// Flattened `namespace.state.attr` to bound value, merged across every
    /// state this record has passed through. Earlier bindings win collisions.
    pub history: BTreeMap<String, AttributeValue>,
}

impl StateRecord {
    pub fn new(
        record_id: u64,
        full_state_name: &str,
        bindings: BTreeMap<String, AttributeValue>,
    ) -> Self {
        let history = namespaced(full_state_name, &bindings, &BTreeMap::new());
        Self {
            record_id,
            curr_state_name: full_state_name.to_string(),
            curr_state_val: bindings,
            next_state_name: None,
            next_state_val: BTreeMap::new(),
            constraints: Vec::new(),
            output: Vec::new(),
            history,
        }
    }

    /// The successor record written after a dependent state consumes this
    /// one: re-keyed to the last consumed id, advanced to the new state.
    /// `curr_val` is the resolved predicate, `history_bindings` the attribute
    /// map of the last consumed event; only the latter is namespaced into
    /// the history.
    pub fn advanced(
        &self,
        new_id: u64,
        full_state_name: &str,
        curr_val: BTreeMap<String, AttributeValue>,
        history_bindings: BTreeMap<String, AttributeValue>,
    ) -> Self {
        let history = namespaced(full_state_name, &history_bindings, &self.history);
        Self {
            record_id: new_id,
            curr_state_name: full_state_name.to_string(),
            curr_state_val: curr_val,
            next_state_name: None,
            next_state_val: BTreeMap::new(),
            constraints: self.constraints.clone(),
            output: self.output.clone(),
            history,
        }
    }
}

/// Prefix `bindings` with the state's full name and merge onto `existing`.
/// Existing keys win, so a state cannot clobber an earlier binding.
fn namespaced(
    full_state_name: &str,
    bindings: &BTreeMap<String, AttributeValue>,
    existing: &BTreeMap<String, AttributeValue>,
) -> BTreeMap<String, AttributeValue> {
    let mut merged = existing.clone();
    for (attr, value) in bindings {
        merged
            .entry(format!("{full_state_name}.{attr}"))
            .or_insert_with(|| value.clone());
    }
    merged
}

#[derive(Debug, Default)]
pub struct StateManager {
    tables: HashMap<String, HashMap<u64, StateRecord>>,
    active: Option<String>,
    read_cache: HashMap<u64, StateRecord>,
    tombstones: HashSet<u64>,
    deleted: HashSet<u64>,
    in_txn: bool,
}

impl StateManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the table for one root behavior and clear all epoch state.
    /// The caller must reset the query cache at the same boundary.
    pub fn initialize_epoch(&mut self, table: impl Into<String>) {
        let table = table.into();
        trace!("correlation epoch reset for table '{table}'");
        self.tables.insert(table.clone(), HashMap::new());
        self.active = Some(table);
        self.read_cache.clear();
        self.tombstones.clear();
        self.deleted.clear();
        self.in_txn = false;
    }

    fn active_table(&mut self) -> EngineResult<&mut HashMap<u64, StateRecord>> {
        let name = self
            .active
            .as_ref()
            .ok_or_else(|| EngineError::abort("no active correlation table"))?;
        self.tables
            .get_mut(name)
            .ok_or_else(|| EngineError::abort("active correlation table missing"))
    }

    pub fn begin(&mut self) -> EngineResult<()> {
        if self.in_txn {
            return Err(EngineError::abort("nested correlation transaction"));
        }
        self.in_txn = true;
        Ok(())
    }

    /// Delete every tombstoned record and end the transaction.
    pub fn commit(&mut self) -> EngineResult<()> {
        if !self.in_txn {
            return Err(EngineError::abort("commit without a transaction"));
        }
        let tombstones: Vec<u64> = self.tombstones.drain().collect();
        {
            let table = self.active_table()?;
            for id in &tombstones {
                table.remove(id);
            }
        }
        self.deleted.extend(tombstones);
        self.in_txn = false;
        Ok(())
    }

    pub fn is_consumed(&self, id: u64) -> bool {
        self.tombstones.contains(&id) || self.deleted.contains(&id)
    }

    pub fn tombstone(&mut self, id: u64) {
        self.tombstones.insert(id);
    }

    /// Seed a fresh record from a qualifier match.
    pub fn seed(
        &mut self,
        full_state_name: &str,
        id: u64,
        bindings: BTreeMap<String, AttributeValue>,
    ) -> EngineResult<()> {
        let record = StateRecord::new(id, full_state_name, bindings);
        self.active_table()?.insert(id, record);
        Ok(())
    }

    /// Fetch a record by id, serving repeats from the read cache.
    pub fn record(&mut self, id: u64) -> EngineResult<Option<StateRecord>> {
        if let Some(cached) = self.read_cache.get(&id) {
            return Ok(Some(cached.clone()));
        }
        let found = self.active_table()?.get(&id).cloned();
        if let Some(record) = &found {
            self.read_cache.insert(id, record.clone());
        }
        Ok(found)
    }

    /// Write a record under its id. Re-persisting under a tombstoned id
    /// resurrects that key; the record written there is the successor, not
    /// the consumed original.
    pub fn persist(&mut self, record: StateRecord) -> EngineResult<()> {
        let id = record.record_id;
        self.tombstones.remove(&id);
        self.read_cache.remove(&id);
        self.active_table()?.insert(id, record);
        Ok(())
    }

    /// Append an independent state's resolved bindings onto an existing
    /// record without consuming it.
    pub fn append_history(
        &mut self,
        id: u64,
        full_state_name: &str,
        bindings: BTreeMap<String, AttributeValue>,
    ) -> EngineResult<()> {
        self.read_cache.remove(&id);
        let table = self.active_table()?;
        if let Some(record) = table.get_mut(&id) {
            record.history = namespaced(full_state_name, &bindings, &record.history);
            record.curr_state_name = full_state_name.to_string();
            record.curr_state_val = bindings;
        }
        Ok(())
    }

    /// Drop the read cache. Called after each dependent-state commit.
    pub fn flush_cache(&mut self) {
        self.read_cache.clear();
    }

    pub fn record_ids(&self) -> Vec<u64> {
        match self.active.as_ref().and_then(|name| self.tables.get(name)) {
            Some(table) => {
                let mut ids: Vec<u64> = table.keys().copied().collect();
                ids.sort_unstable();
                ids
            }
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bindings(pairs: &[(&str, &str)]) -> BTreeMap<String, AttributeValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), AttributeValue::from(*v)))
            .collect()
    }

    #[test]
    fn seeding_namespaces_history_keys() {
        let mut mgr = StateManager::new();
        mgr.initialize_epoch("net.b_scan");
        mgr.seed("net.scan.s_syn", 1, bindings(&[("sport", "40001")]))
            .unwrap();
        let record = mgr.record(1).unwrap().unwrap();
        assert_eq!(
            record.history.get("net.scan.s_syn.sport"),
            Some(&AttributeValue::from("40001"))
        );
    }

    #[test]
    fn earlier_history_bindings_win_collisions() {
        let base = StateRecord::new(1, "net.scan.s_syn", bindings(&[("sport", "40001")]));
        let advanced = base.advanced(
            2,
            "net.scan.s_syn",
            BTreeMap::new(),
            bindings(&[("sport", "50000")]),
        );
        assert_eq!(
            advanced.history.get("net.scan.s_syn.sport"),
            Some(&AttributeValue::from("40001"))
        );
    }

    #[test]
    fn commit_deletes_tombstoned_records() {
        let mut mgr = StateManager::new();
        mgr.initialize_epoch("net.b_scan");
        mgr.seed("net.scan.s_syn", 1, BTreeMap::new()).unwrap();
        mgr.seed("net.scan.s_syn", 2, BTreeMap::new()).unwrap();
        mgr.begin().unwrap();
        mgr.tombstone(1);
        assert!(mgr.is_consumed(1));
        mgr.commit().unwrap();
        assert!(mgr.is_consumed(1));
        assert_eq!(mgr.record_ids(), vec![2]);
        assert!(mgr.record(1).unwrap().is_none());
    }

    #[test]
    fn persist_resurrects_a_tombstoned_key() {
        let mut mgr = StateManager::new();
        mgr.initialize_epoch("net.b_scan");
        let base = StateRecord::new(1, "net.scan.s_syn", bindings(&[("sport", "40001")]));
        mgr.persist(base.clone()).unwrap();
        mgr.begin().unwrap();
        mgr.tombstone(1);
        mgr.tombstone(2);
        let successor = base.advanced(
            2,
            "net.scan.s_synack",
            BTreeMap::new(),
            bindings(&[("dport", "40001")]),
        );
        mgr.persist(successor).unwrap();
        mgr.commit().unwrap();
        assert_eq!(mgr.record_ids(), vec![2]);
        let record = mgr.record(2).unwrap().unwrap();
        assert_eq!(record.curr_state_name, "net.scan.s_synack");
        assert!(record.history.contains_key("net.scan.s_syn.sport"));
    }

    #[test]
    fn nested_transactions_are_rejected() {
        let mut mgr = StateManager::new();
        mgr.initialize_epoch("net.b_scan");
        mgr.begin().unwrap();
        assert!(mgr.begin().is_err());
    }
}
