//! Officer designator classification into competitive categories.
//!
//! Patterns are four characters wide; `X` matches any character in that
//! position.

use serde::{Deserialize, Serialize};

const UNRESTRICTED_LINE: &[&str] = &["11XX", "13XX", "19XX"];
const RESTRICTED_LINE: &[&str] = &[
    "12XX", "123X", "128X", "14XX", "150X", "151X", "152X", "154X", "165X", "166X", "168X", "17XX",
];
const INFORMATION_WARFARE: &[&str] = &["180X", "181X", "182X", "183X", "184X", "187X", "188X"];
const STAFF_CORPS: &[&str] = &[
    "210X", "220X", "230X", "250X", "270X", "290X", "310X", "410X", "510X",
];
const RESERVE_LDO_CWO: &[&str] = &["61XX", "62XX", "63XX", "64XX", "65XX", "7XXX"];
const ACTIVE_LDO: &[&str] = &["61XX", "62XX", "63XX", "64XX", "653X", "651X", "68XX"];
const ACTIVE_CWO: &[&str] = &["71XX", "72XX", "740X", "73XX", "74XX", "75XX", "78XX"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompetitiveCategory {
    Url,
    Rl,
    Iwl,
    Staff,
    LdoCwoReserve,
    LdoActive,
    CwoActive,
    Unknown,
}

impl CompetitiveCategory {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Url => "URL",
            Self::Rl => "RL",
            Self::Iwl => "IWL",
            Self::Staff => "STAFF",
            Self::LdoCwoReserve => "LDO_CWO_RESERVE",
            Self::LdoActive => "LDO_ACTIVE",
            Self::CwoActive => "CWO_ACTIVE",
            Self::Unknown => "UNKNOWN",
        }
    }

    #[must_use]
    pub fn classify(designator: &str) -> Self {
        let designator = designator.trim().to_ascii_uppercase();
        if designator.is_empty() {
            return Self::Unknown;
        }

        if designator.starts_with('6') || designator.starts_with('7') {
            return classify_limited_duty(&designator);
        }

        if matches_any(&designator, UNRESTRICTED_LINE) {
            Self::Url
        } else if matches_any(&designator, RESTRICTED_LINE) {
            Self::Rl
        } else if matches_any(&designator, INFORMATION_WARFARE) {
            Self::Iwl
        } else if matches_any(&designator, STAFF_CORPS) {
            Self::Staff
        } else {
            Self::Unknown
        }
    }
}

fn classify_limited_duty(designator: &str) -> CompetitiveCategory {
    let is_ldo = designator.starts_with('6');
    if is_reserve(designator) {
        if matches_any(designator, RESERVE_LDO_CWO) {
            return CompetitiveCategory::LdoCwoReserve;
        }
    } else if is_ldo && matches_any(designator, ACTIVE_LDO) {
        return CompetitiveCategory::LdoActive;
    } else if !is_ldo && matches_any(designator, ACTIVE_CWO) {
        return CompetitiveCategory::CwoActive;
    }

    // Unlisted 6xxx/7xxx designators fall into the active buckets.
    if is_ldo {
        CompetitiveCategory::LdoActive
    } else {
        CompetitiveCategory::CwoActive
    }
}

/// A fourth digit of 5 or 7 marks a reserve designator.
fn is_reserve(designator: &str) -> bool {
    matches!(designator.as_bytes().get(3), Some(b'5' | b'7'))
}

fn matches_any(designator: &str, patterns: &[&str]) -> bool {
    patterns
        .iter()
        .any(|pattern| matches_pattern(designator, pattern))
}

fn matches_pattern(designator: &str, pattern: &str) -> bool {
    designator.len() == pattern.len()
        && designator
            .bytes()
            .zip(pattern.bytes())
            .all(|(actual, expected)| expected == b'X' || actual == expected)
}
