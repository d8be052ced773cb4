use chrono::{DateTime, Utc};
use latch_common::{
    params::CodeFilter,
    views::{ActivationCode, CleanupReport, CodeStats, CodeStatus},
};
use latch_db::storage::{BindingStore, CodeStore};
use tracing::{info, instrument, warn};

use crate::{Engine, EngineResult};

impl Engine {
    /// Release every binding whose code has expired or no longer exists, so
    /// the machine can redeem a new code.
    ///
    /// Codes themselves are kept. A binding whose code can't be read is
    /// counted as skipped and left in place.
    #[instrument(skip(self))]
    pub async fn cleanup_expired_bindings(
        &self,
        now: DateTime<Utc>,
    ) -> EngineResult<CleanupReport> {
        let scan = self.db.list_bindings().await?;
        let mut report = CleanupReport {
            removed_count: 0,
            skipped: scan.malformed,
        };

        for binding in scan.items {
            let stale = match self.db.get_code(&binding.code_id).await? {
                None => true,
                Some(row) => match ActivationCode::try_from(row) {
                    Ok(code) => code.is_expired(now),
                    Err(err) => {
                        warn!(%err, machine_id = %binding.machine_id, "Leaving binding to malformed code");
                        report.skipped += 1;
                        continue;
                    }
                },
            };

            // a concurrent redemption may have re-bound the machine meanwhile
            if stale
                && self
                    .db
                    .release_binding(&binding.machine_id, &binding.code_id)
                    .await?
            {
                report.removed_count += 1;
            }
        }

        info!(
            removed = report.removed_count,
            skipped = report.skipped,
            "Cleaned up expired bindings"
        );
        Ok(report)
    }

    /// Partition every code by its status at `now`.
    #[instrument(skip(self))]
    pub async fn stats(&self, now: DateTime<Utc>) -> EngineResult<CodeStats> {
        let scan = self.db.list_codes(&CodeFilter::default()).await?;
        let mut stats = CodeStats {
            skipped: scan.malformed,
            ..Default::default()
        };

        for row in scan.items {
            let code = match ActivationCode::try_from(row) {
                Ok(code) => code,
                Err(err) => {
                    warn!(%err, "Leaving malformed code out of stats");
                    stats.skipped += 1;
                    continue;
                }
            };

            stats.total += 1;
            match code.status(now) {
                CodeStatus::Unused => stats.active += 1,
                CodeStatus::Used => stats.used += 1,
                CodeStatus::Expired => stats.expired += 1,
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use latch_common::{params::GenerateCodesParams, policy::ValidityPolicy};
    use latch_db::models::{DbActivationCode, DbMachineBinding, DbUlid};

    use super::*;
    use crate::{
        EngineError,
        testing::{engine, one_code, t0},
    };

    #[tokio::test]
    async fn stats_partition_codes() {
        let (engine, _) = engine();
        engine
            .generate(
                GenerateCodesParams {
                    amount: 3,
                    ..Default::default()
                },
                t0(),
            )
            .await
            .unwrap();
        let lapsing = one_code(&engine, None, Some(1)).await;
        let perpetual = one_code(&engine, None, None).await;
        one_code(&engine, Some(t0() + TimeDelta::hours(1)), None).await;
        engine.redeem(&lapsing.code, "m1", t0()).await.unwrap();
        engine.redeem(&perpetual.code, "m2", t0()).await.unwrap();

        let stats = engine.stats(t0() + TimeDelta::days(2)).await.unwrap();
        assert_eq!(
            stats,
            CodeStats {
                total: 6,
                used: 1,
                expired: 2,
                active: 3,
                skipped: 0,
            }
        );
        assert_eq!(stats.total, stats.used + stats.expired + stats.active);
    }

    #[tokio::test]
    async fn stats_skip_malformed_rows() {
        let (engine, stg) = engine();
        one_code(&engine, None, None).await;
        let mut broken = DbActivationCode::new(
            DbUlid::new(),
            "BROKEN".into(),
            ValidityPolicy::Unbounded,
            None,
            t0(),
        );
        broken.valid_days = Some(-1);
        stg.insert_codes(vec![broken]).await.unwrap();

        let stats = engine.stats(t0()).await.unwrap();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.active, 1);
        assert_eq!(stats.skipped, 1);
    }

    #[tokio::test]
    async fn stats_on_empty_store() {
        let (engine, _) = engine();
        assert_eq!(engine.stats(t0()).await.unwrap(), CodeStats::default());
    }

    #[tokio::test]
    async fn cleanup_frees_machine_but_keeps_code() {
        let (engine, stg) = engine();
        let a = one_code(&engine, None, Some(30)).await;
        let b = one_code(&engine, None, Some(30)).await;
        engine.redeem(&a.code, "m1", t0()).await.unwrap();

        let later = t0() + TimeDelta::days(31);
        let report = engine.cleanup_expired_bindings(later).await.unwrap();
        assert_eq!(report.removed_count, 1);
        assert_eq!(report.skipped, 0);

        let kept = stg.find_code(&a.code).await.unwrap().unwrap();
        assert!(kept.is_used);
        assert_eq!(kept.used_by.as_deref(), Some("m1"));
        assert!(stg.get_binding("m1").await.unwrap().is_none());

        let again = engine.cleanup_expired_bindings(later).await.unwrap();
        assert_eq!(again.removed_count, 0);

        engine.redeem(&b.code, "m1", later).await.unwrap();
    }

    #[tokio::test]
    async fn cleanup_leaves_live_bindings() {
        let (engine, stg) = engine();
        let a = one_code(&engine, None, Some(30)).await;
        let b = one_code(&engine, None, None).await;
        engine.redeem(&a.code, "m1", t0()).await.unwrap();
        engine.redeem(&b.code, "m2", t0()).await.unwrap();

        let report = engine
            .cleanup_expired_bindings(t0() + TimeDelta::days(29))
            .await
            .unwrap();
        assert_eq!(report.removed_count, 0);
        assert_eq!(stg.list_bindings().await.unwrap().items.len(), 2);

        let c = one_code(&engine, None, None).await;
        let err = engine.redeem(&c.code, "m1", t0()).await.unwrap_err();
        assert!(matches!(err, EngineError::MachineAlreadyBound));
    }

    #[tokio::test]
    async fn cleanup_removes_orphans_and_skips_malformed() {
        let (engine, stg) = engine();
        stg.put_binding(DbMachineBinding::new("ghost".into(), DbUlid::new(), t0()));

        let mut broken = DbActivationCode::new(
            DbUlid::new(),
            "BROKEN".into(),
            ValidityPolicy::Unbounded,
            None,
            t0(),
        );
        broken.is_used = true;
        let broken_id = broken.id;
        stg.insert_codes(vec![broken]).await.unwrap();
        stg.put_binding(DbMachineBinding::new("odd".into(), broken_id, t0()));

        let report = engine.cleanup_expired_bindings(t0()).await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                removed_count: 1,
                skipped: 1,
            }
        );
        assert!(stg.get_binding("ghost").await.unwrap().is_none());
        assert!(stg.get_binding("odd").await.unwrap().is_some());
    }
}
