use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::expiry;

/// A redeemable activation code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ActivationCode {
    /// Internal database ID
    pub id: String,

    /// The token handed to end users
    pub code: String,

    /// Whether a machine has redeemed this code
    pub is_used: bool,

    /// When the code was redeemed
    pub used_at: Option<DateTime<Utc>>,

    /// The machine that redeemed the code
    pub used_by: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Deadline for redeeming the code; irrelevant once redeemed
    pub expires_at: Option<DateTime<Utc>>,

    /// Days the code stays valid after redemption
    pub valid_days: Option<u32>,

    /// Preset label the code was generated with
    pub card_type: Option<String>,
}

impl ActivationCode {
    pub fn effective_expiry(&self) -> Option<DateTime<Utc>> {
        expiry::effective_expiry(self)
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        expiry::is_expired(self, now)
    }

    pub fn status(&self, now: DateTime<Utc>) -> CodeStatus {
        expiry::classify(self, now)
    }

    /// Short label for listings: the card type, else the window, else
    /// `unlimited`.
    pub fn card_label(&self) -> String {
        match (&self.card_type, self.valid_days) {
            (Some(card_type), _) => card_type.clone(),
            (None, Some(days)) => format!("{days}d"),
            (None, None) => "unlimited".into(),
        }
    }
}

/// Lifecycle bucket of a code at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum CodeStatus {
    /// Not redeemed and not expired.
    Unused,

    /// Redeemed and still valid.
    Used,

    /// Past its effective expiry.
    Expired,
}

impl fmt::Display for CodeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unused => "unused",
            Self::Used => "used",
            Self::Expired => "expired",
        })
    }
}

impl FromStr for CodeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "unused" => Ok(Self::Unused),
            "used" => Ok(Self::Used),
            "expired" => Ok(Self::Expired),
            other => Err(format!("unknown status `{other}`")),
        }
    }
}

/// An activation code together with values derived from it at listing time.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ActivationCodeDetails {
    #[serde(flatten)]
    pub code: ActivationCode,

    pub status: CodeStatus,

    /// When the code stops being usable, if ever
    pub effective_expires_at: Option<DateTime<Utc>>,

    pub card_label: String,
}

impl ActivationCodeDetails {
    pub fn at(code: ActivationCode, now: DateTime<Utc>) -> Self {
        Self {
            status: code.status(now),
            effective_expires_at: code.effective_expiry(),
            card_label: code.card_label(),
            code,
        }
    }
}

/// Codes produced by one generation request, in insertion order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GeneratedCodes {
    pub codes: Vec<ActivationCode>,
}
