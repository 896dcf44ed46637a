//! Transferability classification
//!
//! [`PatternClassifier`] is the seam for deciding what kind of rule a
//! statement is and how far it may travel. [`HeuristicClassifier`] does it
//! with keyword tables and numeric pattern checks.

use crate::dna::{PatternType, Transferability};
use crate::text;
use once_cell::sync::Lazy;
use regex::Regex;

/// Classifies a learned statement for cross-category transfer
pub trait PatternClassifier: Send + Sync {
    fn classify(&self, statement: &str) -> (PatternType, Transferability);
}

/// "$8 per sqft", "$45/hour", "$12 a linear foot"
static PER_UNIT_COST: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s?\d[\d,]*(\.\d+)?\s*(per|/|an?|each)\s*(sq|square|linear|lf|ft|foot|feet|hour|hr|day|unit|post|board|sheet|gallon|yard|panel|window|door|fixture|piece)")
        .unwrap()
});

const ACCESS: &[&str] = &[
    "access", "second story", "2nd story", "two story", "third story", "steep",
    "hard to reach", "crawl space", "crawlspace", "tight space", "narrow", "upper floor",
];

const RELATIONSHIP: &[&str] = &[
    "repeat customer", "repeat customers", "returning customer", "returning customers",
    "repeat client", "repeat clients", "referral", "referrals", "loyal", "neighbor",
    "neighbors", "friends and family", "existing customer", "existing customers",
];

const RUSH: &[&str] = &[
    "rush", "expedite", "expedited", "same day", "same-day", "next day", "emergency",
    "urgent", "after hours", "after-hours", "weekend",
];

const SEASONAL: &[&str] = &[
    "winter", "summer", "seasonal", "off-season", "off season", "peak season", "busy season",
    "slow season", "spring", "holiday", "holidays",
];

const PERMIT: &[&str] = &["permit", "permits", "inspection", "inspections", "hoa", "code compliance"];

const QUALITY_PREFERENCE: &[&str] = &[
    "premium", "high-end", "high end", "top quality", "quality", "upgrade", "upgraded",
    "budget", "economy", "cheap", "cheapest", "grade", "builder grade", "best",
];

const MINIMUM_PRICING: &[&str] = &[
    "minimum", "min charge", "at least", "never go below", "never below", "floor",
    "no job under", "smallest job",
];

const NAMED_MATERIALS: &[&str] = &[
    "cedar", "composite", "trex", "timbertech", "pressure treated", "pressure-treated",
    "redwood", "ipe", "mahogany", "vinyl", "aluminum", "asphalt", "architectural shingles",
    "metal roofing", "slate", "hardie", "hardiplank", "drywall", "granite", "quartz",
    "porcelain", "ceramic", "hardwood", "laminate", "pavers", "flagstone", "copper", "pex",
];

#[derive(Debug, Clone, Default)]
pub struct HeuristicClassifier;

impl HeuristicClassifier {
    pub fn new() -> Self {
        Self
    }
}

impl PatternClassifier for HeuristicClassifier {
    fn classify(&self, statement: &str) -> (PatternType, Transferability) {
        // Per-unit costs are tied to the trade's materials, checked first
        if PER_UNIT_COST.is_match(statement) {
            return (PatternType::UnitCost, Transferability::Specific);
        }

        let universal = [
            (ACCESS, PatternType::AccessModifier),
            (RELATIONSHIP, PatternType::RelationshipDiscount),
            (RUSH, PatternType::RushPremium),
            (SEASONAL, PatternType::SeasonalAdjustment),
            (PERMIT, PatternType::PermitHandling),
        ];
        for (words, pattern_type) in universal {
            if text::contains_any(statement, words) {
                return (pattern_type, Transferability::Universal);
            }
        }

        if text::contains_any(statement, MINIMUM_PRICING) {
            return (PatternType::MinimumPricing, Transferability::Partial);
        }
        if text::contains_any(statement, QUALITY_PREFERENCE) {
            return (PatternType::QualityPreference, Transferability::Partial);
        }

        if text::contains_any(statement, NAMED_MATERIALS) {
            (PatternType::MaterialCost, Transferability::Specific)
        } else if text::has_dollar_amount(statement) {
            (PatternType::AbsolutePrice, Transferability::Specific)
        } else {
            (PatternType::General, Transferability::Specific)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(s: &str) -> (PatternType, Transferability) {
        HeuristicClassifier::new().classify(s)
    }

    #[test]
    fn test_universal_patterns() {
        assert_eq!(
            classify("Add 15% for second story access"),
            (PatternType::AccessModifier, Transferability::Universal)
        );
        assert_eq!(
            classify("Give repeat customers a 5% discount"),
            (PatternType::RelationshipDiscount, Transferability::Universal)
        );
        assert_eq!(
            classify("Charge a 20% premium for rush jobs"),
            (PatternType::RushPremium, Transferability::Universal)
        );
        assert_eq!(
            classify("Add 10% in winter for weather delays"),
            (PatternType::SeasonalAdjustment, Transferability::Universal)
        );
        assert_eq!(
            classify("Always include $250 for permit fees"),
            (PatternType::PermitHandling, Transferability::Universal)
        );
    }

    #[test]
    fn test_partial_patterns() {
        assert_eq!(
            classify("Minimum charge of $500 for any outdoor job"),
            (PatternType::MinimumPricing, Transferability::Partial)
        );
        assert_eq!(
            classify("Quote premium hardware on every install"),
            (PatternType::QualityPreference, Transferability::Partial)
        );
    }

    #[test]
    fn test_specific_patterns() {
        assert_eq!(
            classify("Charge $8 per sqft for boards"),
            (PatternType::UnitCost, Transferability::Specific)
        );
        assert_eq!(
            classify("Use cedar for all fence pickets"),
            (PatternType::MaterialCost, Transferability::Specific)
        );
        assert_eq!(
            classify("Railing package is $1,200"),
            (PatternType::AbsolutePrice, Transferability::Specific)
        );
        assert_eq!(
            classify("Include cleanup on the last day"),
            (PatternType::General, Transferability::Specific)
        );
    }

    #[test]
    fn test_per_unit_cost_wins_over_universal_keywords() {
        // Mentions access, but the rule is a unit rate
        let (_, tier) = classify("Access ramps are $40 per linear foot");
        assert_eq!(tier, Transferability::Specific);
    }
}
