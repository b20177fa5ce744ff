//! Advisory password strength scoring.
//!
//! The pipeline never consults this itself; callers decide what tier to
//! require before encrypting.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrengthTier {
    Weak,
    Medium,
    Strong,
}

impl fmt::Display for StrengthTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StrengthTier::Weak => "weak",
            StrengthTier::Medium => "medium",
            StrengthTier::Strong => "strong",
        })
    }
}

impl FromStr for StrengthTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "weak" => Ok(StrengthTier::Weak),
            "medium" => Ok(StrengthTier::Medium),
            "strong" => Ok(StrengthTier::Strong),
            other => Err(format!("unknown strength tier: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StrengthReport {
    /// 0..=6, one point per satisfied criterion.
    pub score: u8,
    pub tier: StrengthTier,
    /// One suggestion per unmet criterion, in criterion order.
    pub suggestions: Vec<&'static str>,
}

impl StrengthReport {
    pub fn meets(&self, required: StrengthTier) -> bool {
        self.tier >= required
    }
}

pub fn evaluate(password: &str) -> StrengthReport {
    let len = password.chars().count();
    let criteria: [(bool, &'static str); 6] = [
        (len >= 8, "Password should be at least 8 characters long"),
        (len >= 12, "Consider using 12+ characters for better security"),
        (
            password.chars().any(|c| c.is_ascii_lowercase()),
            "Include lowercase letters",
        ),
        (
            password.chars().any(|c| c.is_ascii_uppercase()),
            "Include uppercase letters",
        ),
        (
            password.chars().any(|c| c.is_ascii_digit()),
            "Include numbers",
        ),
        // anything outside ASCII letters and digits counts as a symbol
        (
            password.chars().any(|c| !c.is_ascii_alphanumeric()),
            "Include special characters",
        ),
    ];

    let mut score = 0u8;
    let mut suggestions = Vec::new();
    for (met, suggestion) in criteria {
        if met {
            score += 1;
        } else {
            suggestions.push(suggestion);
        }
    }

    let tier = match score {
        0..=2 => StrengthTier::Weak,
        3..=4 => StrengthTier::Medium,
        _ => StrengthTier::Strong,
    };

    StrengthReport {
        score,
        tier,
        suggestions,
    }
}
