// SPDX-License-Identifier: MIT OR Apache-2.0
//! The Trust Engine (spec §4.D): resolves a list of per-field claims into a
//! single value with confidence, conflict detection, and a provenance
//! record, weighted by source tier, claim confidence, and freshness.

#![deny(unsafe_code)]
#![warn(missing_docs)]

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use scout_core::SourceTier;
use scout_error::ErrorCode;

/// A claim joined with the provenance the Trust Engine needs to weigh it;
/// built by the caller from a `Claim` + its `SourceDocument`.
#[derive(Debug, Clone)]
pub struct TrustClaim {
    /// The raw extracted value.
    pub value: String,
    /// Extractor confidence, rescaled to `0.0..=1.0`.
    pub confidence_unit: f64,
    /// Trust tier of the source this claim came from.
    pub tier: SourceTier,
    /// URL the claim was extracted from.
    pub source_url: String,
    /// Host the claim was extracted from (for the logistics override).
    pub domain: String,
    /// When the claim was extracted.
    pub extracted_at: DateTime<Utc>,
}

/// How a field should be arbitrated (spec §4.D "Policy overrides").
#[derive(Debug, Clone)]
pub enum FieldPolicy {
    /// Plain weighted vote. `case_insensitive` controls whether string
    /// values are casefolded before grouping.
    Standard {
        /// Whether values should be casefolded before grouping.
        case_insensitive: bool,
    },
    /// Logistics fields (`packaging.*`): only claims from the designated
    /// authoritative host count.
    Logistics {
        /// Lowercased host that alone may contribute to this field.
        authoritative_host: String,
    },
    /// Compatibility entries (printer models): verified by source count and
    /// tier rather than a weighted vote.
    Compatibility,
}

/// Errors raised resolving a field.
#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    /// The input claim list was empty.
    #[error("no claims provided for field resolution")]
    NoClaims,
}

impl TrustError {
    /// The stable error code this variant maps to.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            TrustError::NoClaims => ErrorCode::TrustNoClaims,
        }
    }
}

/// The resolved outcome for one field (spec §4.D output shape).
#[derive(Debug, Clone, PartialEq)]
pub struct FieldResolution {
    /// The winning value, or `None` if no value could be resolved. For a
    /// `Compatibility`-policy field this is the merged, verified subset of
    /// the set, comma-joined (e.g. `"A,B,C"`).
    pub value: Option<String>,
    /// `0.0..=1.0` confidence in `value`.
    pub confidence: f64,
    /// Source URLs that contributed to the winning value.
    pub sources: Vec<String>,
    /// Whether a close runner-up disagreed with the winner (or, for
    /// `Compatibility`, whether any element failed to reach majority
    /// support).
    pub is_conflict: bool,
    /// Which arbitration method produced this resolution.
    pub method: String,
    /// Structured reason when no value could be resolved (e.g.
    /// `"missing_nix_data"`).
    pub failure_reason: Option<String>,
    /// Elements present in at least one `Compatibility` claim's set but
    /// that did not reach majority support, so were left out of `value`.
    /// Empty for every other policy.
    pub unverified: Vec<String>,
}

impl FieldResolution {
    fn empty(method: impl Into<String>, failure_reason: impl Into<String>) -> Self {
        Self {
            value: None,
            confidence: 0.0,
            sources: Vec::new(),
            is_conflict: false,
            method: method.into(),
            failure_reason: Some(failure_reason.into()),
            unverified: Vec::new(),
        }
    }
}

/// `max(0.5, 1 - age_days/365)` (spec §4.D step 3).
#[must_use]
pub fn freshness(now: DateTime<Utc>, extracted_at: DateTime<Utc>) -> f64 {
    let age_days = now
        .signed_duration_since(extracted_at)
        .num_seconds()
        .max(0) as f64
        / 86_400.0;
    (1.0 - age_days / 365.0).max(0.5)
}

fn normalize_value(value: &str, case_insensitive: bool) -> String {
    let trimmed = value.trim();
    if case_insensitive {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Arbitrate a single field's claims per spec §4.D.
pub fn resolve(
    claims: &[TrustClaim],
    policy: &FieldPolicy,
    now: DateTime<Utc>,
) -> Result<FieldResolution, TrustError> {
    if claims.is_empty() {
        return Err(TrustError::NoClaims);
    }

    match policy {
        FieldPolicy::Standard { case_insensitive } => {
            Ok(resolve_weighted_vote(claims, *case_insensitive, now))
        }
        FieldPolicy::Logistics { authoritative_host } => {
            Ok(resolve_logistics(claims, authoritative_host, now))
        }
        FieldPolicy::Compatibility => Ok(resolve_compatibility(claims, now)),
    }
}

struct Group {
    display_value: String,
    score: f64,
    sources: Vec<String>,
}

fn score_groups(claims: &[TrustClaim], case_insensitive: bool, now: DateTime<Utc>) -> BTreeMap<String, Group> {
    let mut groups: BTreeMap<String, Group> = BTreeMap::new();
    for claim in claims {
        let key = normalize_value(&claim.value, case_insensitive);
        let w = claim.tier.weight() * claim.confidence_unit * freshness(now, claim.extracted_at);
        let entry = groups.entry(key).or_insert_with(|| Group {
            display_value: claim.value.trim().to_string(),
            score: 0.0,
            sources: Vec::new(),
        });
        entry.score += w;
        entry.sources.push(claim.source_url.clone());
    }
    groups
}

/// Ceiling a single group's score can reach: Tier A weight (1.00) times
/// full claim confidence (1.0) times full freshness (1.0). Groups with
/// several agreeing claims can exceed this; the confidence clamp then
/// saturates at 1.0 rather than being diluted by how many groups disagree.
const MAX_POSSIBLE_SCORE: f64 = 1.0;

fn resolve_weighted_vote(claims: &[TrustClaim], case_insensitive: bool, now: DateTime<Utc>) -> FieldResolution {
    let groups = score_groups(claims, case_insensitive, now);

    let mut ranked: Vec<&Group> = groups.values().collect();
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let winner = ranked[0];
    let is_conflict = ranked.len() > 1 && ranked[1].score >= 0.85 * winner.score;
    let method = if is_conflict {
        "weighted_vote_with_conflict"
    } else {
        "weighted_vote"
    };

    let confidence = (winner.score / MAX_POSSIBLE_SCORE).clamp(0.0, 1.0);

    FieldResolution {
        value: Some(winner.display_value.clone()),
        confidence,
        sources: winner.sources.clone(),
        is_conflict,
        method: method.to_string(),
        failure_reason: None,
        unverified: Vec::new(),
    }
}

fn resolve_logistics(claims: &[TrustClaim], authoritative_host: &str, now: DateTime<Utc>) -> FieldResolution {
    let eligible: Vec<TrustClaim> = claims
        .iter()
        .filter(|c| c.domain.eq_ignore_ascii_case(authoritative_host))
        .cloned()
        .collect();
    if eligible.is_empty() {
        return FieldResolution::empty("weighted_vote", "missing_nix_data");
    }
    resolve_weighted_vote(&eligible, false, now)
}

/// Each compatibility claim's `value` is a comma-separated set of printer
/// models (spec §4.D: the claim-extraction wire schema has no array type,
/// so multi-valued fields are serialized this way by convention). Resolution
/// merges every claim's set by weighted majority vote per element rather
/// than picking one claim's set wholesale: an element is carried into the
/// merged result once the claims asserting it outweigh the claims that are
/// silent on it.
fn resolve_compatibility(claims: &[TrustClaim], now: DateTime<Utc>) -> FieldResolution {
    let mut support: BTreeMap<String, f64> = BTreeMap::new();
    let mut element_sources: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut total_weight = 0.0;

    for c in claims {
        let w = c.tier.weight() * c.confidence_unit * freshness(now, c.extracted_at);
        total_weight += w;
        for element in c.value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            *support.entry(element.to_string()).or_insert(0.0) += w;
            element_sources.entry(element.to_string()).or_default().push(c.source_url.clone());
        }
    }

    if total_weight <= 0.0 {
        return FieldResolution::empty("compatibility_set_merge", "insufficient_ru_verification");
    }

    let majority = total_weight / 2.0;
    let mut verified: Vec<String> = Vec::new();
    let mut unverified: Vec<String> = Vec::new();
    for (element, w) in &support {
        if *w > majority {
            verified.push(element.clone());
        } else {
            unverified.push(element.clone());
        }
    }
    verified.sort();
    unverified.sort();

    let sources: Vec<String> = verified
        .iter()
        .filter_map(|e| element_sources.get(e))
        .flatten()
        .cloned()
        .collect();

    let confidence = verified
        .iter()
        .filter_map(|e| support.get(e))
        .map(|w| (w / total_weight).clamp(0.0, 1.0))
        .fold(f64::INFINITY, f64::min);
    let confidence = if confidence.is_finite() { confidence } else { 0.0 };

    FieldResolution {
        value: if verified.is_empty() { None } else { Some(verified.join(",")) },
        confidence,
        sources,
        is_conflict: !unverified.is_empty(),
        method: "compatibility_set_merge".to_string(),
        failure_reason: if verified.is_empty() {
            Some("insufficient_ru_verification".to_string())
        } else {
            None
        },
        unverified,
    }
}
