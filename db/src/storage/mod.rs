use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use latch_common::params::CodeFilter;
use thiserror::Error;

use crate::models::{DbActivationCode, DbMachineBinding, DbUlid};

pub mod memory;
pub mod mongodb;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Query Error: {0}")]
    MongoDB(#[from] ::mongodb::error::Error),

    /// A batch insert collided with an existing code. Nothing was written.
    #[error("Activation code already exists")]
    DuplicateCode,

    #[error(transparent)]
    Internal(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Rows read by a full scan. Documents that could not be decoded are counted
/// in `malformed` instead of failing the scan.
#[derive(Debug, Clone)]
pub struct Scan<T> {
    pub items: Vec<T>,
    pub malformed: u64,
}

impl<T> Scan<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            malformed: 0,
        }
    }
}

/// Everything needed to commit a redemption in one atomic step.
#[derive(Debug, Clone)]
pub struct Redemption {
    pub code_id: DbUlid,
    pub machine_id: String,
    pub used_at: DateTime<Utc>,

    /// A binding the caller found to be stale. It is removed as part of the
    /// commit, but only if the machine is still bound to this code.
    pub release_stale: Option<DbUlid>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedemptionOutcome {
    /// The code is now used by the machine and the binding is in place.
    Committed(DbActivationCode),

    /// The code was redeemed or deleted since it was read.
    CodeClaimed,

    /// The machine holds a binding that wasn't released.
    MachineBound,

    /// The backend aborted the attempt because of a concurrent writer.
    Contended,
}

#[async_trait]
pub trait Storage: CodeStore + BindingStore + Send + Sync + 'static {
    async fn ping(&self) -> Result<(), StoreError>;

    /// Mark the code used and bind it to the machine, or do nothing at all.
    ///
    /// The code update only applies while the code is still unused, so two
    /// racing redemptions of one code can't both commit.
    async fn commit_redemption(
        &self,
        redemption: Redemption,
    ) -> Result<RedemptionOutcome, StoreError>;

    /// Remove a code along with any binding pointing at it. Returns `false`
    /// if the code didn't exist.
    async fn delete_code(&self, id: &DbUlid) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait CodeStore {
    async fn get_code(&self, id: &DbUlid) -> Result<Option<DbActivationCode>, StoreError>;

    /// Exact lookup by token.
    async fn find_code(&self, code: &str) -> Result<Option<DbActivationCode>, StoreError>;

    /// Which of `codes` are already taken.
    async fn existing_codes(&self, codes: &[String]) -> Result<Vec<String>, StoreError>;

    /// Insert every row or none of them. Fails with
    /// [`StoreError::DuplicateCode`] if any token is already taken.
    async fn insert_codes(&self, codes: Vec<DbActivationCode>) -> Result<(), StoreError>;

    /// Codes matching the search and card type parts of `filter`, in
    /// ascending id order. Status depends on the current time and is left to
    /// the caller.
    async fn list_codes(&self, filter: &CodeFilter) -> Result<Scan<DbActivationCode>, StoreError>;
}

#[async_trait]
pub trait BindingStore {
    async fn get_binding(&self, machine_id: &str) -> Result<Option<DbMachineBinding>, StoreError>;

    async fn list_bindings(&self) -> Result<Scan<DbMachineBinding>, StoreError>;

    /// Remove the machine's binding if it still points at `code_id`.
    async fn release_binding(&self, machine_id: &str, code_id: &DbUlid)
    -> Result<bool, StoreError>;
}

/// Case-insensitive substring match used by the search filter.
pub(crate) fn matches_search(code: &DbActivationCode, needle: &str) -> bool {
    let needle = needle.to_lowercase();
    code.code.to_lowercase().contains(&needle)
        || code
            .used_by
            .as_deref()
            .is_some_and(|m| m.to_lowercase().contains(&needle))
}
