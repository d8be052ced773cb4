use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Dashboard counts. Every well-formed code lands in exactly one of `used`,
/// `expired` and `active`, so the three always sum to `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CodeStats {
    pub total: u64,

    /// Redeemed and still valid.
    pub used: u64,

    /// Past their effective expiry, redeemed or not.
    pub expired: u64,

    /// Not yet redeemed and not expired.
    pub active: u64,

    /// Stored rows that could not be interpreted and were left out of the
    /// counts above.
    pub skipped: u64,
}

/// Outcome of a binding cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CleanupReport {
    /// Bindings removed because their code expired or no longer exists.
    pub removed_count: u64,

    /// Bindings left alone because their code could not be interpreted.
    pub skipped: u64,
}
