//! Quote lifecycle events consumed by the learning engine

use crate::quote::Quote;
use crate::types::{Complexity, ContractorId, JobCategory};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stage of a quote's life that produced the event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleTransition {
    /// Quote generated for the contractor
    Generated,
    /// Contractor edited the generated quote
    Edited,
    /// Quote sent to the customer
    Sent,
    /// Customer accepted the quote
    CustomerAccepted,
}

impl std::fmt::Display for LifecycleTransition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LifecycleTransition::Generated => write!(f, "generated"),
            LifecycleTransition::Edited => write!(f, "edited"),
            LifecycleTransition::Sent => write!(f, "sent"),
            LifecycleTransition::CustomerAccepted => write!(f, "customer_accepted"),
        }
    }
}

/// One transition of one quote
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteLifecycleEvent {
    #[serde(default = "Uuid::new_v4")]
    pub event_id: Uuid,
    pub quote_id: String,
    pub contractor_id: ContractorId,
    #[serde(default)]
    pub job_category: Option<String>,
    #[serde(default)]
    pub job_description: Option<String>,
    pub original_quote: Quote,

    /// Quote as it stands after this transition; absent when unchanged
    #[serde(default)]
    pub final_quote: Option<Quote>,
    #[serde(default)]
    pub was_edited: bool,
    pub transition: LifecycleTransition,

    /// Overrides complexity inferred from line items
    #[serde(default)]
    pub complexity: Option<Complexity>,

    /// Free-text notes the contractor left with an edit
    #[serde(default)]
    pub contractor_notes: Option<String>,
    #[serde(default = "Utc::now")]
    pub occurred_at: DateTime<Utc>,
}

impl QuoteLifecycleEvent {
    pub fn new(
        contractor_id: ContractorId,
        quote_id: impl Into<String>,
        category: Option<&str>,
        original_quote: Quote,
        transition: LifecycleTransition,
    ) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            quote_id: quote_id.into(),
            contractor_id,
            job_category: category.map(str::to_string),
            job_description: None,
            original_quote,
            final_quote: None,
            was_edited: false,
            transition,
            complexity: None,
            contractor_notes: None,
            occurred_at: Utc::now(),
        }
    }

    /// Normalized category, `None` when missing or blank
    pub fn category(&self) -> Option<JobCategory> {
        self.job_category
            .as_deref()
            .map(JobCategory::new)
            .filter(|c| !c.is_empty())
    }

    pub fn final_quote(&self) -> &Quote {
        self.final_quote.as_ref().unwrap_or(&self.original_quote)
    }

    pub fn original_total(&self) -> f64 {
        self.original_quote.total
    }

    pub fn final_total(&self) -> f64 {
        self.final_quote().total
    }

    pub fn complexity(&self) -> Complexity {
        self.complexity
            .unwrap_or_else(|| self.original_quote.complexity())
    }
}
