use chrono::{DateTime, Utc};
use thiserror::Error;

/// How long a freshly generated code stays usable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidityPolicy {
    /// Can be redeemed at any time and never expires afterwards.
    Unbounded,

    /// Must be redeemed before the deadline; perpetual once redeemed.
    UseBy(DateTime<Utc>),

    /// Can be redeemed at any time; valid for this many days afterwards.
    PostActivation(u32),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("a code cannot have both a use-by deadline and a post-activation window")]
    Conflicting,
}

impl ValidityPolicy {
    /// Build a policy from the two nullable fields stored on a code.
    pub fn from_parts(
        expires_at: Option<DateTime<Utc>>,
        valid_days: Option<u32>,
    ) -> Result<Self, PolicyError> {
        match (expires_at, valid_days) {
            (None, None) => Ok(Self::Unbounded),
            (Some(deadline), None) => Ok(Self::UseBy(deadline)),
            (None, Some(days)) => Ok(Self::PostActivation(days)),
            (Some(_), Some(_)) => Err(PolicyError::Conflicting),
        }
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::UseBy(deadline) => Some(*deadline),
            _ => None,
        }
    }

    pub fn valid_days(&self) -> Option<u32> {
        match self {
            Self::PostActivation(days) => Some(*days),
            _ => None,
        }
    }
}
