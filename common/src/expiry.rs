//! Expiry calculation for activation codes.
//!
//! A code has two independent deadlines and which one applies depends on
//! whether it has been redeemed:
//!
//! - Before redemption the optional `expires_at` use-by deadline applies.
//! - After redemption only `valid_days` counts, measured from `used_at`. A
//!   redeemed code without `valid_days` never expires, even if it carried a
//!   use-by deadline.
//!
//! These functions are the only place that logic lives. Redemption, cleanup,
//! stats and listing all call into them with an explicit `now`.

use chrono::{DateTime, TimeDelta, Utc};

use crate::views::{ActivationCode, CodeStatus};

/// Returns the instant after which `code` is no longer usable, or `None` if
/// it never expires.
pub fn effective_expiry(code: &ActivationCode) -> Option<DateTime<Utc>> {
    match (code.used_at, code.valid_days) {
        // An overflowing window is treated as unbounded.
        (Some(used_at), Some(days)) => TimeDelta::try_days(i64::from(days))
            .and_then(|window| used_at.checked_add_signed(window)),
        (Some(_), None) => None,
        (None, _) => code.expires_at,
    }
}

/// A code is expired once its effective expiry is strictly before `now`.
pub fn is_expired(code: &ActivationCode, now: DateTime<Utc>) -> bool {
    effective_expiry(code).is_some_and(|expiry| expiry < now)
}

/// Places `code` in exactly one of the three reporting buckets.
pub fn classify(code: &ActivationCode, now: DateTime<Utc>) -> CodeStatus {
    if is_expired(code, now) {
        CodeStatus::Expired
    } else if code.is_used {
        CodeStatus::Used
    } else {
        CodeStatus::Unused
    }
}
