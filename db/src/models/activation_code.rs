use chrono::{DateTime, Utc};
use latch_common::{policy::ValidityPolicy, views::ActivationCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::DbUlid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbActivationCode {
    #[serde(rename = "_id")]
    pub id: DbUlid,

    /// The token handed to end users; unique across the collection
    pub code: String,

    pub is_used: bool,

    /// When the code was redeemed; always set together with `used_by`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_at: Option<bson::DateTime>,

    /// The machine that redeemed the code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used_by: Option<String>,

    pub created_at: bson::DateTime,

    /// Pre-activation use-by deadline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<bson::DateTime>,

    /// Post-activation validity window in days
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_days: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_type: Option<String>,
}

impl DbActivationCode {
    pub fn new(
        id: DbUlid,
        code: String,
        policy: ValidityPolicy,
        card_type: Option<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            code,
            is_used: false,
            used_at: None,
            used_by: None,
            created_at: bson::DateTime::from_chrono(created_at),
            expires_at: policy.expires_at().map(bson::DateTime::from_chrono),
            valid_days: policy.valid_days().map(i64::from),
            card_type,
        }
    }
}

/// A stored code that breaks the data-model invariants and can't be turned
/// into an [`ActivationCode`].
#[derive(Debug, Error)]
#[error("malformed activation code {id}: {reason}")]
pub struct MalformedRecord {
    pub id: String,
    pub reason: &'static str,
}

impl TryFrom<DbActivationCode> for ActivationCode {
    type Error = MalformedRecord;

    fn try_from(value: DbActivationCode) -> Result<Self, Self::Error> {
        let malformed = |reason| MalformedRecord {
            id: value.id.to_string(),
            reason,
        };

        if value.used_at.is_some() != value.used_by.is_some() {
            return Err(malformed("used_at and used_by must be set together"));
        }
        if value.is_used != value.used_at.is_some() {
            return Err(malformed("is_used disagrees with used_at"));
        }

        let valid_days = value
            .valid_days
            .map(u32::try_from)
            .transpose()
            .map_err(|_| malformed("valid_days out of range"))?;

        Ok(Self {
            id: value.id.to_string(),
            code: value.code,
            is_used: value.is_used,
            used_at: value.used_at.map(|t| t.to_chrono()),
            used_by: value.used_by,
            created_at: value.created_at.to_chrono(),
            expires_at: value.expires_at.map(|t| t.to_chrono()),
            valid_days,
            card_type: value.card_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;

    fn fresh(policy: ValidityPolicy) -> DbActivationCode {
        DbActivationCode::new(
            DbUlid::new(),
            "ABCDEF-GHJKMN-PQRSTV-WXYZ01".into(),
            policy,
            Some("month".into()),
            Utc::now(),
        )
    }

    #[test]
    fn new_code_is_unused_and_carries_policy() {
        let row = fresh(ValidityPolicy::PostActivation(30));
        assert!(!row.is_used);
        assert_eq!(row.valid_days, Some(30));
        assert_eq!(row.expires_at, None);

        let view = ActivationCode::try_from(row).unwrap();
        assert_eq!(view.valid_days, Some(30));
        assert_eq!(view.card_type.as_deref(), Some("month"));
    }

    #[test]
    fn use_by_deadline_survives_conversion() {
        let deadline = Utc::now() + TimeDelta::days(1);
        let view = ActivationCode::try_from(fresh(ValidityPolicy::UseBy(deadline))).unwrap();
        // bson datetimes carry millisecond precision
        assert_eq!(
            view.expires_at.map(|t| t.timestamp_millis()),
            Some(deadline.timestamp_millis())
        );
    }

    #[test]
    fn partial_binding_is_malformed() {
        let mut row = fresh(ValidityPolicy::Unbounded);
        row.is_used = true;
        row.used_at = Some(bson::DateTime::now());
        assert!(ActivationCode::try_from(row).is_err());
    }

    #[test]
    fn used_flag_without_timestamp_is_malformed() {
        let mut row = fresh(ValidityPolicy::Unbounded);
        row.is_used = true;
        assert!(ActivationCode::try_from(row).is_err());
    }

    #[test]
    fn negative_window_is_malformed() {
        let mut row = fresh(ValidityPolicy::Unbounded);
        row.valid_days = Some(-3);
        let err = ActivationCode::try_from(row).unwrap_err();
        assert_eq!(err.reason, "valid_days out of range");
    }
}
