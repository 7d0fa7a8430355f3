// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reflection (spec §4.H): critiques a Trust-Engine draft against a set of
//! required fields, turns gaps into targeted repair queries, and merges
//! re-resolved fields back into the draft under a confidence-monotonic rule
//! (P8: repair can only raise confidence or fill a missing value).

#![deny(unsafe_code)]
#![warn(missing_docs)]

use chrono::{DateTime, Utc};
use scout_core::{FieldEvidence, Item, TaskMeta, TaskType};
use scout_executor::Expansion;
use scout_trust::FieldResolution;

/// Priority assigned to every repair task (spec §4.H step 2).
pub const REPAIR_TASK_PRIORITY: i32 = 30;

/// A required top-level field and the confidence floor it must clear.
#[derive(Debug, Clone)]
pub struct RequiredField {
    /// Dotted field path, matching `Item::evidence` keys.
    pub field: String,
    /// Minimum acceptable confidence; below this the field is a repair goal.
    pub min_confidence: f64,
    /// Search hint used to seed the repair query (e.g. the field's plain
    /// English name), combined with the item's known identity at expansion
    /// time.
    pub query_hint: String,
}

/// Why a field was flagged during critique, carrying enough detail to
/// produce both a repair query and a gatekeeper-facing reason code (spec
/// §7's `validation_errors` vocabulary), so the two stages share one
/// vocabulary instead of stringly-typed reasons.
#[derive(Debug, Clone, PartialEq)]
pub enum MissingFieldReason {
    /// No value has been resolved for this field at all.
    Missing {
        /// Dotted field path.
        field: String,
    },
    /// A value exists but its confidence is below the required floor.
    LowConfidence {
        /// Dotted field path.
        field: String,
        /// The confidence that was found wanting.
        confidence: f64,
    },
}

impl MissingFieldReason {
    /// The field path this reason is about.
    #[must_use]
    pub fn field(&self) -> &str {
        match self {
            MissingFieldReason::Missing { field } | MissingFieldReason::LowConfidence { field, .. } => field,
        }
    }

    /// The spec §7 `validation_errors` reason code this maps to. Known
    /// identity/logistics/compatibility fields get their named code;
    /// anything else falls back to the generic `missing_required_field`.
    #[must_use]
    pub fn validation_error_code(&self) -> &'static str {
        let low_confidence = matches!(self, MissingFieldReason::LowConfidence { .. });
        match self.field() {
            f if f.starts_with("packaging") => {
                if low_confidence {
                    "low_confidence_nix_data"
                } else {
                    "missing_nix_data"
                }
            }
            f if f.starts_with("compatible_printers") || f.starts_with("compatibility") => "compatibility_conflict",
            "brand" => "failed_parse_brand",
            "model" | "canonical_model" => "failed_parse_model",
            f if f.contains("dimension") => "invalid_dimensions",
            _ => "missing_required_field",
        }
    }
}

/// One targeted follow-up produced by [`critique`].
#[derive(Debug, Clone)]
pub struct RepairGoal {
    /// Why this goal exists.
    pub reason: MissingFieldReason,
    /// The search hint this goal was seeded from.
    pub query_hint: String,
}

/// Identify every required field that is missing or below its confidence
/// floor in `item` (spec §4.H step 1).
#[must_use]
pub fn critique(item: &Item, required: &[RequiredField]) -> Vec<RepairGoal> {
    required
        .iter()
        .filter_map(|req| match item.evidence.get(&req.field) {
            None => Some(RepairGoal {
                reason: MissingFieldReason::Missing { field: req.field.clone() },
                query_hint: req.query_hint.clone(),
            }),
            Some(evidence) if evidence.confidence < req.min_confidence => Some(RepairGoal {
                reason: MissingFieldReason::LowConfidence {
                    field: req.field.clone(),
                    confidence: evidence.confidence,
                },
                query_hint: req.query_hint.clone(),
            }),
            Some(_) => None,
        })
        .collect()
}

/// Turn repair goals into `query` expansions (spec §4.H step 2): priority
/// `30`, one depth deeper than the current pass, tagged `repair=true` so
/// the Executor and downstream reporting can tell repair tasks apart from
/// the base search pass.
#[must_use]
pub fn repair_expansions(goals: &[RepairGoal], subject: &str, current_depth: i32) -> Vec<Expansion> {
    goals
        .iter()
        .map(|goal| Expansion {
            task_type: TaskType::Query,
            value: format!("{subject} {}", goal.query_hint),
            priority: REPAIR_TASK_PRIORITY,
            depth: current_depth + 1,
            meta: TaskMeta {
                repair: true,
                ..TaskMeta::default()
            },
        })
        .collect()
}

/// Merge a repair pass's re-resolved field into the draft (spec §4.H step
/// 3 / P8): the new resolution replaces the existing evidence only when it
/// resolved a value *and* (the field was previously missing, or the new
/// confidence strictly exceeds the old one). Returns `None` when the
/// existing evidence should be kept unchanged.
#[must_use]
pub fn merge_field_resolution(existing: Option<&FieldEvidence>, resolution: &FieldResolution, now: DateTime<Utc>) -> Option<FieldEvidence> {
    let value = resolution.value.clone()?;
    let should_replace = match existing {
        None => true,
        Some(prev) => resolution.confidence > prev.confidence,
    };
    if !should_replace {
        return None;
    }
    Some(FieldEvidence {
        value,
        confidence: resolution.confidence,
        source_url: resolution.sources.first().cloned(),
        is_conflict: resolution.is_conflict,
        method: resolution.method.clone(),
        timestamp: now,
    })
}

/// Apply every goal's re-resolved [`FieldResolution`] into `item.evidence`,
/// honoring [`merge_field_resolution`]'s monotonicity rule for each one.
/// `resolutions` pairs each repaired field path with its new resolution.
pub fn apply_repairs(item: &mut Item, resolutions: &[(String, FieldResolution)], now: DateTime<Utc>) {
    for (field, resolution) in resolutions {
        let existing = item.evidence.get(field);
        if let Some(updated) = merge_field_resolution(existing, resolution, now) {
            item.evidence.insert(field.clone(), updated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn evidence(confidence: f64) -> FieldEvidence {
        FieldEvidence {
            value: "HP".to_string(),
            confidence,
            source_url: Some("https://hp.example.com".to_string()),
            is_conflict: false,
            method: "weighted_vote".to_string(),
            timestamp: Utc::now(),
        }
    }

    fn resolution(value: &str, confidence: f64) -> FieldResolution {
        FieldResolution {
            value: Some(value.to_string()),
            confidence,
            sources: vec!["https://hp.example.com/2".to_string()],
            is_conflict: false,
            method: "weighted_vote".to_string(),
            failure_reason: None,
            unverified: Vec::new(),
        }
    }

    fn required() -> Vec<RequiredField> {
        vec![
            RequiredField { field: "brand".to_string(), min_confidence: 0.6, query_hint: "brand".to_string() },
            RequiredField { field: "data.yield".to_string(), min_confidence: 0.6, query_hint: "page yield".to_string() },
        ]
    }

    #[test]
    fn critique_flags_missing_and_low_confidence_fields() {
        let mut item = Item::new(Uuid::new_v4(), Uuid::new_v4());
        item.evidence.insert("brand".to_string(), evidence(0.95));

        let goals = critique(&item, &required());
        assert_eq!(goals.len(), 1);
        assert_eq!(goals[0].reason.field(), "data.yield");
        assert!(matches!(goals[0].reason, MissingFieldReason::Missing { .. }));
    }

    #[test]
    fn critique_is_empty_when_everything_clears_the_floor() {
        let mut item = Item::new(Uuid::new_v4(), Uuid::new_v4());
        item.evidence.insert("brand".to_string(), evidence(0.95));
        item.evidence.insert("data.yield".to_string(), evidence(0.8));
        assert!(critique(&item, &required()).is_empty());
    }

    #[test]
    fn repair_expansions_carry_priority_depth_and_repair_flag() {
        let goals = vec![RepairGoal {
            reason: MissingFieldReason::Missing { field: "data.yield".to_string() },
            query_hint: "page yield".to_string(),
        }];
        let expansions = repair_expansions(&goals, "HP CF217A", 2);
        assert_eq!(expansions.len(), 1);
        assert_eq!(expansions[0].priority, REPAIR_TASK_PRIORITY);
        assert_eq!(expansions[0].depth, 3);
        assert!(expansions[0].meta.repair);
        assert_eq!(expansions[0].task_type, TaskType::Query);
    }

    #[test]
    fn merge_fills_a_previously_missing_field() {
        let merged = merge_field_resolution(None, &resolution("0.75", 0.75), Utc::now());
        assert!(merged.is_some());
        assert_eq!(merged.unwrap().confidence, 0.75);
    }

    #[test]
    fn merge_rejects_a_resolution_that_does_not_strictly_improve_confidence() {
        let existing = evidence(0.9);
        let merged = merge_field_resolution(Some(&existing), &resolution("HP Inc", 0.9), Utc::now());
        assert!(merged.is_none());
        let merged_lower = merge_field_resolution(Some(&existing), &resolution("HP Inc", 0.5), Utc::now());
        assert!(merged_lower.is_none());
    }

    #[test]
    fn merge_accepts_a_strictly_higher_confidence() {
        let existing = evidence(0.6);
        let merged = merge_field_resolution(Some(&existing), &resolution("HP", 0.75), Utc::now()).unwrap();
        assert_eq!(merged.confidence, 0.75);
    }

    #[test]
    fn apply_repairs_only_mutates_fields_that_pass_the_monotonic_check() {
        let mut item = Item::new(Uuid::new_v4(), Uuid::new_v4());
        item.evidence.insert("brand".to_string(), evidence(0.9));
        let resolutions = vec![
            ("brand".to_string(), resolution("HP Inc", 0.4)),
            ("data.yield".to_string(), resolution("1600", 0.75)),
        ];
        apply_repairs(&mut item, &resolutions, Utc::now());
        assert_eq!(item.evidence.get("brand").unwrap().confidence, 0.9);
        assert_eq!(item.evidence.get("data.yield").unwrap().confidence, 0.75);
    }

    #[test]
    fn validation_error_codes_match_known_field_vocabulary() {
        assert_eq!(MissingFieldReason::Missing { field: "packaging.weight_g".to_string() }.validation_error_code(), "missing_nix_data");
        assert_eq!(
            MissingFieldReason::LowConfidence { field: "packaging.weight_g".to_string(), confidence: 0.1 }.validation_error_code(),
            "low_confidence_nix_data"
        );
        assert_eq!(MissingFieldReason::Missing { field: "brand".to_string() }.validation_error_code(), "failed_parse_brand");
        assert_eq!(MissingFieldReason::Missing { field: "canonical_model".to_string() }.validation_error_code(), "failed_parse_model");
        assert_eq!(MissingFieldReason::Missing { field: "data.yield".to_string() }.validation_error_code(), "missing_required_field");
    }
}
