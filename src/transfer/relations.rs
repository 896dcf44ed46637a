//! Static table of related job categories
//!
//! Partial patterns only travel between categories that share a group.
//! Categories match a group member by any `_`-separated token, ignoring a
//! trailing plural `s`, so "deck_repair" and "decks" both belong with "deck".

use crate::types::JobCategory;

const DEFAULT_GROUPS: &[&[&str]] = &[
    &["deck", "fence", "pergola", "patio", "gazebo", "porch", "railing"],
    &["roof", "roofing", "siding", "gutter", "window", "door", "exterior"],
    &["painting", "paint", "drywall", "flooring", "floor", "trim", "carpentry", "interior"],
    &["bathroom", "kitchen", "plumbing", "tile", "remodel"],
    &["landscaping", "hardscape", "concrete", "paver", "driveway", "retaining"],
];

#[derive(Debug, Clone)]
pub struct RelationTable {
    groups: Vec<Vec<String>>,
}

impl Default for RelationTable {
    fn default() -> Self {
        Self::new(
            DEFAULT_GROUPS
                .iter()
                .map(|g| g.iter().map(|s| s.to_string()).collect())
                .collect(),
        )
    }
}

impl RelationTable {
    pub fn new(groups: Vec<Vec<String>>) -> Self {
        Self { groups }
    }

    /// Same category, or both share a relation group
    pub fn are_related(&self, a: &JobCategory, b: &JobCategory) -> bool {
        if a == b {
            return true;
        }
        self.groups
            .iter()
            .any(|group| in_group(group, a) && in_group(group, b))
    }
}

fn in_group(group: &[String], category: &JobCategory) -> bool {
    category.as_str().split('_').any(|token| {
        let singular = token.strip_suffix('s').unwrap_or(token);
        group.iter().any(|m| m == token || m == singular)
    })
}
