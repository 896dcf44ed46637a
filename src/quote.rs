//! Quote model and edit diffing
//!
//! The learning engine only needs enough of a quote to tell what the
//! contractor changed: line items, the total and any free-text notes.

use crate::types::Complexity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;

/// Totals closer than this are treated as unchanged
const MONEY_EPSILON: f64 = 0.005;

fn default_quantity() -> f64 {
    1.0
}

/// One priced line of a quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: f64,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub unit_price: f64,
    pub total: f64,
}

impl LineItem {
    pub fn new(description: impl Into<String>, total: f64) -> Self {
        Self {
            description: description.into(),
            quantity: 1.0,
            unit: None,
            unit_price: total,
            total,
        }
    }

    fn key(&self) -> String {
        self.description
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase()
    }
}

/// A generated or edited quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Quote {
    pub line_items: Vec<LineItem>,
    pub total: f64,
    pub notes: Option<String>,
}

impl Quote {
    pub fn new(line_items: Vec<LineItem>) -> Self {
        let total = line_items.iter().map(|i| i.total).sum();
        Self {
            line_items,
            total,
            notes: None,
        }
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn complexity(&self) -> Complexity {
        Complexity::from_line_items(self.line_items.len())
    }
}

/// A line item whose price changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepricedItem {
    pub description: String,
    pub before: f64,
    pub after: f64,
}

/// What changed between a generated quote and the contractor's edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteDiff {
    pub added: Vec<LineItem>,
    pub removed: Vec<LineItem>,
    pub repriced: Vec<RepricedItem>,
    pub original_total: f64,
    pub edited_total: f64,

    /// Signed change of the total, in percent of the original
    pub magnitude_percent: f64,
    pub notes_changed: bool,
}

impl QuoteDiff {
    pub fn between(original: &Quote, edited: &Quote) -> Self {
        let before: BTreeMap<String, &LineItem> =
            original.line_items.iter().map(|i| (i.key(), i)).collect();
        let after: BTreeMap<String, &LineItem> =
            edited.line_items.iter().map(|i| (i.key(), i)).collect();

        let added = edited
            .line_items
            .iter()
            .filter(|i| !before.contains_key(&i.key()))
            .cloned()
            .collect();
        let removed = original
            .line_items
            .iter()
            .filter(|i| !after.contains_key(&i.key()))
            .cloned()
            .collect();
        let repriced = original
            .line_items
            .iter()
            .filter_map(|old| {
                let new = after.get(&old.key())?;
                ((old.total - new.total).abs() > MONEY_EPSILON).then(|| RepricedItem {
                    description: old.description.clone(),
                    before: old.total,
                    after: new.total,
                })
            })
            .collect();

        let notes_changed = normalized_notes(original) != normalized_notes(edited);

        Self {
            added,
            removed,
            repriced,
            original_total: original.total,
            edited_total: edited.total,
            magnitude_percent: magnitude_percent(original.total, edited.total),
            notes_changed,
        }
    }

    /// Nothing the contractor did would teach us anything
    pub fn is_noop(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.repriced.is_empty()
            && (self.original_total - self.edited_total).abs() <= MONEY_EPSILON
            && !self.notes_changed
    }

    /// Plain-text rendering used in extraction requests
    pub fn summary(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Total: ${:.2} -> ${:.2} ({:+.1}%)",
            self.original_total, self.edited_total, self.magnitude_percent
        );
        for item in &self.added {
            let _ = writeln!(out, "Added: {} (${:.2})", item.description, item.total);
        }
        for item in &self.removed {
            let _ = writeln!(out, "Removed: {} (${:.2})", item.description, item.total);
        }
        for item in &self.repriced {
            let _ = writeln!(
                out,
                "Repriced: {} ${:.2} -> ${:.2}",
                item.description, item.before, item.after
            );
        }
        if self.notes_changed {
            let _ = writeln!(out, "Notes changed");
        }
        out
    }
}

/// Signed percentage change; 100 when growing from a zero total
pub fn magnitude_percent(original: f64, edited: f64) -> f64 {
    if original.abs() <= MONEY_EPSILON {
        if edited.abs() <= MONEY_EPSILON {
            0.0
        } else {
            100.0
        }
    } else {
        (edited - original) / original.abs() * 100.0
    }
}

fn normalized_notes(quote: &Quote) -> String {
    quote
        .notes
        .as_deref()
        .unwrap_or("")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deck_quote() -> Quote {
        Quote::new(vec![
            LineItem::new("Composite decking", 4000.0),
            LineItem::new("Labor", 2500.0),
            LineItem::new("Railing", 1500.0),
        ])
    }

    #[test]
    fn test_identical_quotes_are_noop() {
        let diff = QuoteDiff::between(&deck_quote(), &deck_quote());
        assert!(diff.is_noop());
        assert_eq!(diff.magnitude_percent, 0.0);
    }

    #[test]
    fn test_whitespace_in_descriptions_is_not_an_edit() {
        let mut edited = deck_quote();
        edited.line_items[0].description = "composite   decking".to_string();
        assert!(QuoteDiff::between(&deck_quote(), &edited).is_noop());
    }

    #[test]
    fn test_added_line_and_magnitude() {
        let mut items = deck_quote().line_items;
        items.push(LineItem::new("Second story access", 1200.0));
        let edited = Quote::new(items);

        let diff = QuoteDiff::between(&deck_quote(), &edited);
        assert!(!diff.is_noop());
        assert_eq!(diff.added.len(), 1);
        assert!((diff.magnitude_percent - 15.0).abs() < 1e-9);
        assert!(diff.summary().contains("Added: Second story access"));
    }

    #[test]
    fn test_repriced_and_removed() {
        let edited = Quote::new(vec![
            LineItem::new("Composite decking", 3600.0),
            LineItem::new("Labor", 2500.0),
        ]);
        let diff = QuoteDiff::between(&deck_quote(), &edited);
        assert_eq!(diff.removed.len(), 1);
        assert_eq!(diff.repriced.len(), 1);
        assert!(diff.magnitude_percent < 0.0);
    }

    #[test]
    fn test_notes_only_edit_is_not_noop() {
        let edited = deck_quote().with_notes("Customer is a repeat client");
        let diff = QuoteDiff::between(&deck_quote(), &edited);
        assert!(!diff.is_noop());
        assert_eq!(diff.magnitude_percent, 0.0);
    }

    #[test]
    fn test_magnitude_from_zero() {
        assert_eq!(magnitude_percent(0.0, 0.0), 0.0);
        assert_eq!(magnitude_percent(0.0, 50.0), 100.0);
        assert!((magnitude_percent(200.0, 150.0) + 25.0).abs() < 1e-9);
    }
}
