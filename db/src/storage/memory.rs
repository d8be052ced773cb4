//! In-memory backend.
//!
//! Holds everything behind a single `parking_lot::RwLock` which is never held
//! across an `.await`, so each trait method is one atomic step. Used by the
//! test suites and by `latch-api --in-memory` for local runs.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::Arc,
};

use async_trait::async_trait;
use latch_common::params::CodeFilter;
use parking_lot::RwLock;

use crate::{
    models::{DbActivationCode, DbMachineBinding, DbUlid},
    storage::{
        BindingStore, CodeStore, Redemption, RedemptionOutcome, Scan, Storage, StoreError,
        matches_search,
    },
};

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    state: Arc<RwLock<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    codes: BTreeMap<DbUlid, DbActivationCode>,
    by_code: HashMap<String, DbUlid>,
    bindings: BTreeMap<String, DbMachineBinding>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a binding as-is, without checking that its code exists. Lets
    /// tests reproduce leftovers from partial writes.
    pub fn put_binding(&self, binding: DbMachineBinding) {
        self.state
            .write()
            .bindings
            .insert(binding.machine_id.clone(), binding);
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn commit_redemption(
        &self,
        redemption: Redemption,
    ) -> Result<RedemptionOutcome, StoreError> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        match state.codes.get(&redemption.code_id) {
            Some(code) if !code.is_used => {}
            _ => return Ok(RedemptionOutcome::CodeClaimed),
        }

        if let Some(stale) = redemption.release_stale {
            if state
                .bindings
                .get(&redemption.machine_id)
                .is_some_and(|b| b.code_id == stale)
            {
                state.bindings.remove(&redemption.machine_id);
            }
        }

        if state.bindings.contains_key(&redemption.machine_id) {
            return Ok(RedemptionOutcome::MachineBound);
        }

        let Some(code) = state.codes.get_mut(&redemption.code_id) else {
            return Ok(RedemptionOutcome::CodeClaimed);
        };
        code.is_used = true;
        code.used_at = Some(bson::DateTime::from_chrono(redemption.used_at));
        code.used_by = Some(redemption.machine_id.clone());
        let committed = code.clone();

        state.bindings.insert(
            redemption.machine_id.clone(),
            DbMachineBinding::new(
                redemption.machine_id,
                redemption.code_id,
                redemption.used_at,
            ),
        );

        Ok(RedemptionOutcome::Committed(committed))
    }

    async fn delete_code(&self, id: &DbUlid) -> Result<bool, StoreError> {
        let mut state = self.state.write();

        let Some(removed) = state.codes.remove(id) else {
            return Ok(false);
        };
        state.by_code.remove(&removed.code);
        state.bindings.retain(|_, b| b.code_id != *id);

        Ok(true)
    }
}

#[async_trait]
impl CodeStore for MemoryStorage {
    async fn get_code(&self, id: &DbUlid) -> Result<Option<DbActivationCode>, StoreError> {
        Ok(self.state.read().codes.get(id).cloned())
    }

    async fn find_code(&self, code: &str) -> Result<Option<DbActivationCode>, StoreError> {
        let state = self.state.read();
        Ok(state
            .by_code
            .get(code)
            .and_then(|id| state.codes.get(id))
            .cloned())
    }

    async fn existing_codes(&self, codes: &[String]) -> Result<Vec<String>, StoreError> {
        let state = self.state.read();
        Ok(codes
            .iter()
            .filter(|c| state.by_code.contains_key(*c))
            .cloned()
            .collect())
    }

    async fn insert_codes(&self, codes: Vec<DbActivationCode>) -> Result<(), StoreError> {
        let mut state = self.state.write();

        let mut seen = HashSet::with_capacity(codes.len());
        for row in &codes {
            if state.by_code.contains_key(&row.code)
                || state.codes.contains_key(&row.id)
                || !seen.insert(row.code.as_str())
            {
                return Err(StoreError::DuplicateCode);
            }
        }

        for row in codes {
            state.by_code.insert(row.code.clone(), row.id);
            state.codes.insert(row.id, row);
        }

        Ok(())
    }

    async fn list_codes(&self, filter: &CodeFilter) -> Result<Scan<DbActivationCode>, StoreError> {
        let state = self.state.read();

        let items = state
            .codes
            .values()
            .filter(|c| {
                filter
                    .search
                    .as_deref()
                    .is_none_or(|needle| matches_search(c, needle))
            })
            .filter(|c| {
                filter
                    .card_type
                    .as_ref()
                    .is_none_or(|f| f.matches(c.card_type.as_deref()))
            })
            .cloned()
            .collect();

        Ok(Scan::new(items))
    }
}

#[async_trait]
impl BindingStore for MemoryStorage {
    async fn get_binding(&self, machine_id: &str) -> Result<Option<DbMachineBinding>, StoreError> {
        Ok(self.state.read().bindings.get(machine_id).cloned())
    }

    async fn list_bindings(&self) -> Result<Scan<DbMachineBinding>, StoreError> {
        Ok(Scan::new(
            self.state.read().bindings.values().cloned().collect(),
        ))
    }

    async fn release_binding(
        &self,
        machine_id: &str,
        code_id: &DbUlid,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.write();

        if state
            .bindings
            .get(machine_id)
            .is_some_and(|b| b.code_id == *code_id)
        {
            state.bindings.remove(machine_id);
            return Ok(true);
        }

        Ok(false)
    }
}
