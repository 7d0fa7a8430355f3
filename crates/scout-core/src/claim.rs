//! [`Claim`]: a single field/value pair attributed to exactly one source
//! document.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An atomic field extraction from one [`crate::SourceDocument`].
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Claim {
    /// Unique identifier.
    pub claim_id: Uuid,
    /// The [`crate::Item`] this claim contributes to.
    pub item_id: Uuid,
    /// The document this claim was extracted from.
    pub source_doc_id: Uuid,
    /// Dotted field path, e.g. `"packaging.weight_g"`.
    pub field: String,
    /// Extracted value, JSON-encoded if non-scalar.
    pub value: String,
    /// Extractor-reported confidence, `0..=100`.
    pub confidence: u8,
    /// When this claim was extracted.
    pub extracted_at: DateTime<Utc>,
}

impl Claim {
    /// Confidence rescaled to the unit interval used by the Trust Engine.
    #[must_use]
    pub fn confidence_unit(&self) -> f64 {
        f64::from(self.confidence) / 100.0
    }
}
