//! Named validity presets ("cards") offered to operators.
//!
//! A card type is only a label on a code. The preset's day count is applied
//! at generation time when the operator picks a preset without giving an
//! explicit policy; after that, `valid_days` is what matters.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardType {
    /// Label stored on generated codes.
    pub name: &'static str,

    /// Post-activation validity window in days.
    pub days: u32,
}

pub const PRESETS: &[CardType] = &[
    CardType { name: "week", days: 7 },
    CardType { name: "month", days: 30 },
    CardType { name: "quarter", days: 90 },
    CardType { name: "half-year", days: 180 },
    CardType { name: "year", days: 365 },
];

impl CardType {
    /// Look up a preset by label, ignoring case.
    pub fn preset(name: &str) -> Option<&'static CardType> {
        PRESETS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
    }
}
