//! [`SourceTier`]: the trust category a domain belongs to. Categorization
//! (which host maps to which tier) is configuration; the weight each tier
//! carries is a fixed spec invariant and lives here alongside the enum.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Trust category assigned to a source domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum SourceTier {
    /// Official/manufacturer site.
    A,
    /// Verified retailer or logistics-authoritative host.
    B,
    /// General marketplace.
    C,
    /// OEM-factory / foreign wholesale.
    D,
    /// Unknown source or forum.
    E,
}

impl SourceTier {
    /// The fixed per-tier weight used by the Trust Engine's scoring.
    #[must_use]
    pub fn weight(self) -> f64 {
        match self {
            SourceTier::A => 1.00,
            SourceTier::B => 0.90,
            SourceTier::C => 0.70,
            SourceTier::D => 0.55,
            SourceTier::E => 0.35,
        }
    }

    /// The default tier assigned to a domain with no explicit mapping.
    #[must_use]
    pub fn default_unknown() -> Self {
        SourceTier::E
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn weights_strictly_decrease_from_a_to_e() {
        let tiers = [
            SourceTier::A,
            SourceTier::B,
            SourceTier::C,
            SourceTier::D,
            SourceTier::E,
        ];
        for pair in tiers.windows(2) {
            assert!(pair[0].weight() > pair[1].weight());
        }
    }
}
