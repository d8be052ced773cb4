use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{params::PaginationParams, views::CodeStatus};

/// Request body for generating a batch of activation codes.
///
/// At most one of `expires_at` and `valid_days` may be set. When neither is
/// set and `card_type` names a preset, the preset's window is used.
#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct GenerateCodesParams {
    /// How many codes to generate
    pub amount: u32,

    /// Deadline for redeeming the generated codes
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// Days each code stays valid after it is redeemed
    #[serde(default)]
    pub valid_days: Option<u32>,

    /// Preset or custom label stored on every generated code
    #[serde(default)]
    pub card_type: Option<String>,
}

/// Request body for redeeming a code on a machine.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RedeemCodeParams {
    /// The activation code as handed to the user
    pub code: String,

    /// Stable identifier of the redeeming machine
    pub machine_id: String,
}

/// Query parameters accepted by the code listing endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct ListCodesParams {
    /// Case-insensitive substring of the code or the redeeming machine
    pub search: Option<String>,

    /// Only return codes in this lifecycle bucket
    pub status: Option<CodeStatus>,

    /// Only return codes with this label; `none` selects unlabelled codes
    pub card_type: Option<String>,

    /// Continue after the code with this ID
    pub next_token: Option<String>,

    /// The maximum number of results to return.
    pub limit: Option<u64>,
}

impl ListCodesParams {
    pub fn filter(&self) -> CodeFilter {
        CodeFilter {
            search: self
                .search
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            status: self.status,
            card_type: self.card_type.as_deref().and_then(CardTypeFilter::parse),
        }
    }

    pub fn pagination(&self) -> PaginationParams {
        PaginationParams {
            next_token: self.next_token.clone(),
            limit: self.limit,
        }
    }
}

/// Criteria for selecting codes out of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CodeFilter {
    pub search: Option<String>,
    pub status: Option<CodeStatus>,
    pub card_type: Option<CardTypeFilter>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardTypeFilter {
    /// Codes generated without a label.
    Unlabelled,

    /// Codes carrying exactly this label.
    Label(String),
}

impl CardTypeFilter {
    /// `none` selects unlabelled codes; blank input selects nothing in
    /// particular.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "" => None,
            "none" => Some(Self::Unlabelled),
            label => Some(Self::Label(label.to_string())),
        }
    }

    pub fn matches(&self, card_type: Option<&str>) -> bool {
        match self {
            Self::Unlabelled => card_type.is_none(),
            Self::Label(label) => card_type == Some(label.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_type_filter_parses_none() {
        assert_eq!(CardTypeFilter::parse("none"), Some(CardTypeFilter::Unlabelled));
        assert_eq!(
            CardTypeFilter::parse(" month "),
            Some(CardTypeFilter::Label("month".into()))
        );
        assert_eq!(CardTypeFilter::parse("  "), None);
    }

    #[test]
    fn card_type_filter_matching() {
        assert!(CardTypeFilter::Unlabelled.matches(None));
        assert!(!CardTypeFilter::Unlabelled.matches(Some("week")));
        assert!(CardTypeFilter::Label("week".into()).matches(Some("week")));
        assert!(!CardTypeFilter::Label("week".into()).matches(None));
    }

    #[test]
    fn blank_search_is_dropped() {
        let params = ListCodesParams {
            search: Some("   ".into()),
            ..Default::default()
        };
        assert_eq!(params.filter().search, None);
    }

    #[test]
    fn generate_params_default_optional_fields() {
        let params: GenerateCodesParams = serde_json::from_str(r#"{"amount": 3}"#).unwrap();
        assert_eq!(params.amount, 3);
        assert!(params.expires_at.is_none());
        assert!(params.valid_days.is_none());
        assert!(params.card_type.is_none());
    }
}
