use chrono::{DateTime, Utc};
use latch_common::{params::CodeFilter, views::ActivationCode};
use latch_db::{
    models::DbUlid,
    storage::{CodeStore, Storage},
};
use tracing::{info, instrument, warn};

use crate::{Engine, EngineError, EngineResult};

impl Engine {
    /// Codes matching `filter`, oldest first. Status is judged at `now`.
    /// Rows that can't be read are left out.
    #[instrument(skip(self, now))]
    pub async fn list(
        &self,
        filter: &CodeFilter,
        now: DateTime<Utc>,
    ) -> EngineResult<Vec<ActivationCode>> {
        let scan = self.db.list_codes(filter).await?;
        if scan.malformed > 0 {
            warn!(count = scan.malformed, "Skipped undecodable codes");
        }

        let codes = scan
            .items
            .into_iter()
            .filter_map(|row| match ActivationCode::try_from(row) {
                Ok(code) => Some(code),
                Err(err) => {
                    warn!(%err, "Skipping malformed code");
                    None
                }
            })
            .filter(|code| filter.status.is_none_or(|s| code.status(now) == s))
            .collect();

        Ok(codes)
    }

    /// Delete a code and any binding to it.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> EngineResult<()> {
        let id = DbUlid::from_string(id).ok_or(EngineError::NotFound)?;

        if !self.db.delete_code(&id).await? {
            return Err(EngineError::NotFound);
        }

        info!("Deleted activation code");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use latch_common::{params::CardTypeFilter, policy::ValidityPolicy, views::CodeStatus};
    use latch_db::{models::DbActivationCode, storage::BindingStore};

    use super::*;
    use crate::testing::{engine, one_code, t0};

    #[tokio::test]
    async fn status_filter_is_judged_at_now() {
        let (engine, _) = engine();
        let unused = one_code(&engine, None, None).await;
        let lapsing = one_code(&engine, None, Some(1)).await;
        let deadline = one_code(&engine, Some(t0() + TimeDelta::days(1)), None).await;
        engine.redeem(&lapsing.code, "m1", t0()).await.unwrap();

        let by_status = |status| CodeFilter {
            status: Some(status),
            ..Default::default()
        };

        let ids = |codes: Vec<ActivationCode>| codes.into_iter().map(|c| c.id).collect::<Vec<_>>();

        let now = t0();
        assert_eq!(
            ids(engine.list(&by_status(CodeStatus::Unused), now).await.unwrap()),
            [unused.id.clone(), deadline.id.clone()]
        );
        assert_eq!(
            ids(engine.list(&by_status(CodeStatus::Used), now).await.unwrap()),
            [lapsing.id.clone()]
        );

        let later = t0() + TimeDelta::days(2);
        assert_eq!(
            ids(engine.list(&by_status(CodeStatus::Expired), later).await.unwrap()),
            [lapsing.id.clone(), deadline.id.clone()]
        );
        assert_eq!(
            ids(engine.list(&by_status(CodeStatus::Unused), later).await.unwrap()),
            [unused.id]
        );
    }

    #[tokio::test]
    async fn filters_combine() {
        let (engine, _) = engine();
        let a = one_code(&engine, None, None).await;
        one_code(&engine, None, None).await;
        engine.redeem(&a.code, "Lab-PC-7", t0()).await.unwrap();

        let filter = CodeFilter {
            search: Some("lab-pc".into()),
            status: Some(CodeStatus::Used),
            card_type: Some(CardTypeFilter::Unlabelled),
        };
        let found = engine.list(&filter, t0()).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, a.id);

        let filter = CodeFilter {
            card_type: Some(CardTypeFilter::Label("week".into())),
            ..Default::default()
        };
        assert!(engine.list(&filter, t0()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_rows_are_left_out() {
        let (engine, stg) = engine();
        one_code(&engine, None, None).await;

        let mut broken = DbActivationCode::new(
            DbUlid::new(),
            "BROKEN".into(),
            ValidityPolicy::Unbounded,
            None,
            t0(),
        );
        broken.is_used = true;
        stg.insert_codes(vec![broken]).await.unwrap();

        assert_eq!(
            engine.list(&CodeFilter::default(), t0()).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn delete_removes_code_and_frees_machine() {
        let (engine, stg) = engine();
        let code = one_code(&engine, None, None).await;
        engine.redeem(&code.code, "m1", t0()).await.unwrap();

        engine.delete(&code.id).await.unwrap();
        assert!(stg.find_code(&code.code).await.unwrap().is_none());
        assert!(stg.get_binding("m1").await.unwrap().is_none());

        let err = engine.delete(&code.id).await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }

    #[tokio::test]
    async fn delete_with_garbage_id_is_not_found() {
        let (engine, _) = engine();
        let err = engine.delete("not-an-id").await.unwrap_err();
        assert!(matches!(err, EngineError::NotFound));
    }
}
