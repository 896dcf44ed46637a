//! Statement quality scoring
//!
//! Scores a candidate learning statement on a 0-100 scale:
//!
//! - Specificity (max 35): dollar amounts, percentages, concrete trade nouns
//! - Actionability (max 30): action verbs, units and quantities
//! - Clarity (max 35): 30-200 characters, a single rule
//! - Penalties: hedge words and generic advice subtract from the total
//!
//! Tiers: >=60 accept, 40-59 accept with logging, 20-39 reject and retry,
//! <20 reject and retry.

use crate::config::QualityConfig;
use crate::text;
use serde::{Deserialize, Serialize};

const CONCRETE_NOUNS: &[&str] = &[
    "story", "stories", "permit", "permits", "sqft", "footage", "material", "materials",
    "labor", "hour", "hours", "deck", "roof", "fence", "board", "boards", "post", "posts",
    "railing", "stairs", "shingles", "joist", "joists", "concrete", "footing", "footings",
    "demo", "demolition", "disposal", "dumpster", "crew", "trip", "access", "slope", "pitch",
    "fixture", "fixtures", "trim", "drywall", "paint", "primer", "tile", "lumber", "cedar",
    "composite", "gutter", "gutters", "window", "windows", "door", "doors", "customer",
    "customers", "weekend", "winter", "summer", "markup", "minimum", "deposit",
];

const ACTION_VERBS: &[&str] = &[
    "add", "charge", "increase", "raise", "reduce", "lower", "include", "apply", "use",
    "quote", "bill", "mark up", "markup", "discount", "round", "set", "price", "multiply",
    "allow", "budget", "subtract", "waive", "require", "exclude", "bump", "cap",
];

const HEDGE_WORDS: &[&str] = &[
    "maybe", "might", "sometimes", "possibly", "perhaps", "probably", "consider",
    "it depends", "kind of", "sort of", "somewhat", "generally", "usually", "roughly",
];

const GENERIC_ADVICE: &[&str] = &[
    "be careful", "make sure", "double check", "double-check", "remember to",
    "keep in mind", "good idea", "be accurate", "pay attention", "think about",
    "be more careful", "review the quote", "check pricing",
];

/// Quality verdict for a candidate statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Accept,
    AcceptWithLogging,
    RejectAndRetry,
    RejectLowQuality,
}

impl QualityTier {
    pub fn is_accepted(self) -> bool {
        matches!(self, QualityTier::Accept | QualityTier::AcceptWithLogging)
    }
}

/// Score breakdown for one statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityScore {
    pub specificity: u32,
    pub actionability: u32,
    pub clarity: u32,
    pub penalty: u32,
    pub total: u32,
    pub tier: QualityTier,

    /// Why points were lost, used as retry feedback
    pub issues: Vec<String>,
}

/// Scores candidate statements against configured thresholds
#[derive(Debug, Clone)]
pub struct QualityScorer {
    config: QualityConfig,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(QualityConfig::default())
    }
}

impl QualityScorer {
    pub fn new(config: QualityConfig) -> Self {
        Self { config }
    }

    pub fn score(&self, statement: &str) -> QualityScore {
        let statement = statement.trim();
        let mut issues = Vec::new();

        let specificity = self.specificity(statement, &mut issues);
        let actionability = self.actionability(statement, &mut issues);
        let clarity = self.clarity(statement, &mut issues);
        let penalty = self.penalty(statement, &mut issues);

        let raw = (specificity + actionability + clarity) as i64 - penalty as i64;
        let total = raw.clamp(0, 100) as u32;

        QualityScore {
            specificity,
            actionability,
            clarity,
            penalty,
            total,
            tier: self.tier(total),
            issues,
        }
    }

    pub fn tier(&self, total: u32) -> QualityTier {
        if total >= self.config.accept_threshold {
            QualityTier::Accept
        } else if total >= self.config.log_threshold {
            QualityTier::AcceptWithLogging
        } else if total >= self.config.retry_threshold {
            QualityTier::RejectAndRetry
        } else {
            QualityTier::RejectLowQuality
        }
    }

    fn specificity(&self, s: &str, issues: &mut Vec<String>) -> u32 {
        let mut points = 0;
        let dollar = text::has_dollar_amount(s);
        let percent = text::has_percentage(s);
        if dollar {
            points += 15;
        }
        if percent {
            points += 15;
        }
        if !dollar && !percent {
            if text::has_number(s) {
                points += 8;
            } else {
                issues.push("no dollar amount, percentage or number".to_string());
            }
        }
        let nouns = text::count_matches(s, CONCRETE_NOUNS) as u32;
        if nouns == 0 {
            issues.push("no concrete subject (material, access, permit, ...)".to_string());
        }
        points += (nouns * 5).min(10);
        points.min(35)
    }

    fn actionability(&self, s: &str, issues: &mut Vec<String>) -> u32 {
        let mut points = 0;
        if text::contains_any(s, ACTION_VERBS) {
            points += 15;
        } else {
            issues.push("no action verb (add, charge, reduce, ...)".to_string());
        }
        if text::has_unit(s) || text::has_percentage(s) || text::has_dollar_amount(s) {
            points += 15;
        } else {
            issues.push("no unit or quantity".to_string());
        }
        points
    }

    fn clarity(&self, s: &str, issues: &mut Vec<String>) -> u32 {
        let len = s.chars().count();
        let mut points = match len {
            30..=200 => 20,
            20..=29 | 201..=300 => 10,
            _ => {
                issues.push(format!("length {} outside 30-200 characters", len));
                0
            }
        };

        // "$8.50" must not count as a sentence break
        let sentences = s
            .split(['!', '?', ';'])
            .flat_map(|part| part.split(". "))
            .filter(|part| part.trim().chars().filter(|c| c.is_alphabetic()).count() > 3)
            .count();
        let compound = text::contains_any(s, &["and also", "as well as", "in addition"]);
        if sentences <= 1 && !compound {
            points += 15;
        } else {
            issues.push("more than one rule in a single statement".to_string());
        }
        points
    }

    fn penalty(&self, s: &str, issues: &mut Vec<String>) -> u32 {
        let hedges = text::count_matches(s, HEDGE_WORDS) as u32;
        let generic = text::count_matches(s, GENERIC_ADVICE) as u32;
        if hedges > 0 {
            issues.push("hedging language".to_string());
        }
        if generic > 0 {
            issues.push("generic advice rather than a pricing rule".to_string());
        }
        (hedges * 10).min(30) + generic * 15
    }
}
