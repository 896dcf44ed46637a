//! Learning pathways: corrections teach statements, acceptances reinforce confidence

pub mod acceptance;
pub mod correction;

pub use acceptance::{AcceptanceInput, AcceptanceOutcome, AcceptanceProcessor};
pub use correction::{CorrectionInput, CorrectionOutcome, CorrectionProcessor, CorrectionReport};
