use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::card_type::CardType;

/// Settings that are safe to show to unauthenticated visitors.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PublicConfig {
    /// Display name of this deployment.
    pub system_name: String,
}

/// A validity preset operators can pick when generating codes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct CardTypePreset {
    pub name: String,
    pub days: u32,
}

impl From<&CardType> for CardTypePreset {
    fn from(value: &CardType) -> Self {
        Self {
            name: value.name.to_string(),
            days: value.days,
        }
    }
}
