use chrono::{DateTime, Utc};
use latch_common::views::ActivationCode;
use latch_db::{
    models::DbUlid,
    storage::{BindingStore, CodeStore, Redemption, RedemptionOutcome, Storage},
};
use tracing::{debug, info, instrument, warn};

use crate::{Engine, EngineError, EngineResult};

/// A lost compare-and-set is re-read and retried once before the caller is
/// told to retry.
const MAX_COMMIT_ATTEMPTS: usize = 2;

enum Plan {
    /// The machine already redeemed this code; nothing to write.
    AlreadyRedeemed(ActivationCode),
    Commit(Redemption),
}

impl Engine {
    /// Redeem `code` on `machine_id`.
    ///
    /// A code can only ever be bound to one machine and a machine can only
    /// hold one unexpired code. Redeeming the same code again from the same
    /// machine succeeds without changing anything.
    #[instrument(skip(self, code, now))]
    pub async fn redeem(
        &self,
        code: &str,
        machine_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<ActivationCode> {
        if code.is_empty() || machine_id.is_empty() {
            return Err(EngineError::invalid("code and machine_id are required"));
        }

        for attempt in 1..=MAX_COMMIT_ATTEMPTS {
            let redemption = match self.plan_redemption(code, machine_id, now).await? {
                Plan::AlreadyRedeemed(code) => {
                    debug!("Code already redeemed by this machine");
                    return Ok(code);
                }
                Plan::Commit(redemption) => redemption,
            };

            match self.db.commit_redemption(redemption).await? {
                RedemptionOutcome::Committed(row) => {
                    info!(code_id = %row.id, "Activation code redeemed");
                    return Ok(ActivationCode::try_from(row)?);
                }
                outcome => debug!(attempt, ?outcome, "Redemption lost a race"),
            }
        }

        warn!("Redemption kept conflicting with concurrent writers");
        Err(EngineError::Conflict)
    }

    async fn plan_redemption(
        &self,
        token: &str,
        machine_id: &str,
        now: DateTime<Utc>,
    ) -> EngineResult<Plan> {
        let row = self
            .db
            .find_code(token)
            .await?
            .ok_or(EngineError::NotFound)?;
        let code_id = row.id;
        let code = ActivationCode::try_from(row)?;

        if code.is_used {
            return match code.used_by.as_deref() {
                Some(owner) if owner == machine_id => Ok(Plan::AlreadyRedeemed(code)),
                _ => Err(EngineError::AlreadyUsed),
            };
        }

        if code.is_expired(now) {
            return Err(EngineError::Expired);
        }

        let release_stale = self.stale_binding(machine_id, &code_id, now).await?;

        Ok(Plan::Commit(Redemption {
            code_id,
            machine_id: machine_id.to_string(),
            used_at: now,
            release_stale,
        }))
    }

    /// Check the machine's current binding. Returns the code id of a binding
    /// that may be replaced, or fails if the machine still holds a live code.
    async fn stale_binding(
        &self,
        machine_id: &str,
        redeeming: &DbUlid,
        now: DateTime<Utc>,
    ) -> EngineResult<Option<DbUlid>> {
        let Some(binding) = self.db.get_binding(machine_id).await? else {
            return Ok(None);
        };

        // left behind pointing at a code that is unused again
        if binding.code_id == *redeeming {
            return Ok(Some(binding.code_id));
        }

        let Some(held) = self.db.get_code(&binding.code_id).await? else {
            debug!(code_id = %binding.code_id, "Replacing binding to a deleted code");
            return Ok(Some(binding.code_id));
        };

        if ActivationCode::try_from(held)?.is_expired(now) {
            debug!(code_id = %binding.code_id, "Replacing binding to an expired code");
            Ok(Some(binding.code_id))
        } else {
            Err(EngineError::MachineAlreadyBound)
        }
    }
}
