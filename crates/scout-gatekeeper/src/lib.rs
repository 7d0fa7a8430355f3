// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Quality Gatekeeper (spec §4.J): final validation over a resolved
//! [`Item`], expressed as a small data-driven list of [`GateRule`]s rather
//! than a hardcoded if/else chain, each producing zero or more spec §7
//! `validation_errors` reason codes.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use scout_core::{Item, ItemStatus};
use scout_reflection::RequiredField;

/// One image reference from the record and whether it passed `ImageQC`.
#[derive(Debug, Clone)]
pub struct ImageCheck {
    /// The image URL as referenced in the record.
    pub url: String,
    /// Whether `ImageQC` passed it.
    pub passes: bool,
}

/// Everything a [`GateRule`] needs to evaluate, independent of how the
/// caller assembled it.
#[derive(Debug, Clone)]
pub struct GateContext {
    /// Top-level fields every record must have, each at or above its
    /// confidence floor (spec §4.J "Confidence of each required field ≥
    /// 0.6").
    pub required_fields: Vec<RequiredField>,
    /// Whether this run's mode requires at least one verified compatibility
    /// entry (spec: "≥ 1 verified compatibility entry").
    pub require_compatibility_verified: bool,
    /// The evidence field holding the Trust Engine's merged compatibility
    /// set; verified when its confidence is above zero, i.e. at least one
    /// element reached majority support.
    pub compatibility_field: String,
    /// Per-image QC outcomes for every image referenced in the record.
    pub image_results: Vec<ImageCheck>,
}

impl Default for GateContext {
    fn default() -> Self {
        Self {
            required_fields: Vec::new(),
            require_compatibility_verified: false,
            compatibility_field: "compatible_printers".to_string(),
            image_results: Vec::new(),
        }
    }
}

/// A single, independently-evaluated publish-readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRule {
    /// Every `GateContext::required_fields` entry must be present and at or
    /// above its confidence floor.
    RequiredFields,
    /// `GateContext::compatibility_field` must resolve with nonzero
    /// confidence (at least one verified element) when
    /// `require_compatibility_verified` is set.
    CompatibilityVerified,
    /// Every `GateContext::image_results` entry must have passed QC.
    ImagesPassQc,
}

/// The default rule set (spec §4.J's three example rules).
#[must_use]
pub fn default_rules() -> Vec<GateRule> {
    vec![GateRule::RequiredFields, GateRule::CompatibilityVerified, GateRule::ImagesPassQc]
}

fn evaluate_rule(rule: GateRule, item: &Item, ctx: &GateContext, errors: &mut Vec<String>) {
    match rule {
        GateRule::RequiredFields => {
            let goals = scout_reflection::critique(item, &ctx.required_fields);
            errors.extend(goals.iter().map(|g| g.reason.validation_error_code().to_string()));
        }
        GateRule::CompatibilityVerified => {
            if ctx.require_compatibility_verified {
                let verified = item
                    .evidence
                    .get(&ctx.compatibility_field)
                    .is_some_and(|e| e.confidence > 0.0);
                if !verified {
                    errors.push("insufficient_ru_verification".to_string());
                }
            }
        }
        GateRule::ImagesPassQc => {
            if ctx.image_results.iter().any(|i| !i.passes) {
                errors.push("image_validation_issues".to_string());
            }
        }
    }
}

/// Run every rule in `rules` against `item`, returning the union of
/// reason codes they produced (sorted, deduplicated).
#[must_use]
pub fn evaluate(item: &Item, ctx: &GateContext, rules: &[GateRule]) -> Vec<String> {
    let mut errors = Vec::new();
    for &rule in rules {
        evaluate_rule(rule, item, ctx, &mut errors);
    }
    errors.sort();
    errors.dedup();
    errors
}

/// Run the gate and write its verdict onto `item`: `published` when no rule
/// produced an error, `needs_review` (carrying the reason codes) otherwise.
pub fn gate_check(item: &mut Item, ctx: &GateContext, rules: &[GateRule]) {
    let errors = evaluate(item, ctx, rules);
    item.status = if errors.is_empty() { ItemStatus::Published } else { ItemStatus::NeedsReview };
    tracing::info!(target: "scout.gatekeeper", item_id = %item.item_id, status = ?item.status, errors = errors.len(), "gate check complete");
    item.validation_errors = errors;
}
