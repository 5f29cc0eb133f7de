use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use super::error::{CoreError, Result};
use super::memory::ConversationMemory;
use super::persona::PersonaTraits;
use super::persona::TRAIT_MAX;
use super::selector::DepthTier;

/// Factor names used in the score breakdown.
pub const FACTOR_TRAITS: &str = "trait_similarity";
pub const FACTOR_VALUES: &str = "values_alignment";
pub const FACTOR_INTERESTS: &str = "interest_overlap";
pub const FACTOR_STYLE: &str = "communication_style";
pub const FACTOR_RECENCY: &str = "activity_recency";

/// Relative weight of each compatibility factor. Weights must sum to 1.
///
/// The defaults are the documented profile (30/35/20/10/5); they are a
/// configuration default, not a verified contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatibilityWeights {
    pub trait_similarity: f64,
    pub values_alignment: f64,
    pub interest_overlap: f64,
    pub communication_style: f64,
    pub activity_recency: f64,
}

impl Default for CompatibilityWeights {
    fn default() -> Self {
        Self {
            trait_similarity: 0.30,
            values_alignment: 0.35,
            interest_overlap: 0.20,
            communication_style: 0.10,
            activity_recency: 0.05,
        }
    }
}

impl CompatibilityWeights {
    pub fn validate(&self) -> Result<()> {
        let parts = [
            self.trait_similarity,
            self.values_alignment,
            self.interest_overlap,
            self.communication_style,
            self.activity_recency,
        ];
        if parts.iter().any(|w| *w < 0.0) {
            return Err(CoreError::Validation("negative compatibility weight".to_string()));
        }
        let sum: f64 = parts.iter().sum();
        if (sum - 1.0).abs() > 1e-6 {
            return Err(CoreError::Validation(format!(
                "compatibility weights sum to {}, expected 1.0",
                sum
            )));
        }
        Ok(())
    }
}

/// Score bands mapping the overall score to a match type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchThresholds {
    /// Minimum overall score for "High Compatibility"
    pub high: f64,
    /// Minimum overall score for "Good Match"
    pub good: f64,
}

impl Default for MatchThresholds {
    fn default() -> Self {
        Self { high: 85.0, good: 70.0 }
    }
}

/// Full compatibility configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompatibilityConfig {
    pub weights: CompatibilityWeights,
    pub thresholds: MatchThresholds,
    /// Both users active within this many days → full recency score
    pub recent_window_days: i64,
    /// Days past the window over which recency decays to zero
    pub decay_days: i64,
}

impl Default for CompatibilityConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl CompatibilityConfig {
    pub fn new() -> Self {
        Self {
            weights: CompatibilityWeights::default(),
            thresholds: MatchThresholds::default(),
            recent_window_days: 7,
            decay_days: 60,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.weights.validate()?;
        if self.thresholds.good > self.thresholds.high {
            return Err(CoreError::Validation(
                "good-match threshold above high-compatibility threshold".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    HighCompatibility,
    GoodMatch,
    PotentialMatch,
}

impl std::fmt::Display for MatchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchType::HighCompatibility => write!(f, "High Compatibility"),
            MatchType::GoodMatch => write!(f, "Good Match"),
            MatchType::PotentialMatch => write!(f, "Potential Match"),
        }
    }
}

/// Immutable view of one user's state, the engine's only input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: String,
    pub traits: PersonaTraits,
    pub memory: ConversationMemory,
}

/// A deterministic multi-factor match score between two users.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompatibilityResult {
    pub user_a: String,
    pub user_b: String,
    pub overall_score: f64,
    pub breakdown: BTreeMap<String, f64>,
    pub shared_tags: Vec<String>,
    pub match_type: MatchType,
    pub low_confidence: bool,
}

/// Score two users' snapshots. Pure and deterministic: `as_of` is an
/// explicit input so recency never reads the wall clock.
pub fn score(
    a: &UserSnapshot,
    b: &UserSnapshot,
    as_of: DateTime<Utc>,
    config: &CompatibilityConfig,
) -> CompatibilityResult {
    let traits = trait_similarity(&a.traits, &b.traits);
    let values = values_alignment(&a.memory, &b.memory);
    let interests = interest_overlap(&a.memory, &b.memory);
    let style = communication_style(&a.memory, &b.memory);
    let recency = activity_recency(&a.memory, &b.memory, as_of, config);

    let w = &config.weights;
    let overall = (traits * w.trait_similarity
        + values * w.values_alignment
        + interests * w.interest_overlap
        + style * w.communication_style
        + recency * w.activity_recency)
        .clamp(0.0, 100.0);

    let mut breakdown = BTreeMap::new();
    breakdown.insert(FACTOR_TRAITS.to_string(), traits);
    breakdown.insert(FACTOR_VALUES.to_string(), values);
    breakdown.insert(FACTOR_INTERESTS.to_string(), interests);
    breakdown.insert(FACTOR_STYLE.to_string(), style);
    breakdown.insert(FACTOR_RECENCY.to_string(), recency);

    let match_type = if overall >= config.thresholds.high {
        MatchType::HighCompatibility
    } else if overall >= config.thresholds.good {
        MatchType::GoodMatch
    } else {
        MatchType::PotentialMatch
    };

    CompatibilityResult {
        user_a: a.user_id.clone(),
        user_b: b.user_id.clone(),
        overall_score: overall,
        breakdown,
        shared_tags: shared_tags(&a.memory, &b.memory),
        match_type,
        low_confidence: a.memory.total_count == 0 || b.memory.total_count == 0,
    }
}

/// 100 · (1 − Euclidean distance over the union of trait keys / the
/// maximum possible distance). Missing keys default to 0; identical
/// vectors (including two empty ones) score 100.
fn trait_similarity(a: &PersonaTraits, b: &PersonaTraits) -> f64 {
    let keys: BTreeSet<&String> = a.traits.keys().chain(b.traits.keys()).collect();
    if keys.is_empty() {
        return 100.0;
    }

    let mut sum_sq = 0.0;
    for key in &keys {
        let va = a.traits.get(*key).copied().unwrap_or(0.0);
        let vb = b.traits.get(*key).copied().unwrap_or(0.0);
        sum_sq += (va - vb) * (va - vb);
    }
    let distance = sum_sq.sqrt();
    let max_distance = TRAIT_MAX * (keys.len() as f64).sqrt();

    (100.0 * (1.0 - distance / max_distance)).clamp(0.0, 100.0)
}

/// Jaccard overlap of each user's above-average theme categories.
fn values_alignment(a: &ConversationMemory, b: &ConversationMemory) -> f64 {
    let high_a = high_frequency_keys(&a.conversation_themes);
    let high_b = high_frequency_keys(&b.conversation_themes);
    jaccard(&high_a, &high_b)
}

/// Categories at or above the user's mean theme count.
fn high_frequency_keys(counts: &BTreeMap<String, u32>) -> BTreeSet<String> {
    if counts.is_empty() {
        return BTreeSet::new();
    }
    let total: u32 = counts.values().sum();
    let avg = total as f64 / counts.len() as f64;
    counts
        .iter()
        .filter(|(_, c)| **c as f64 >= avg)
        .map(|(k, _)| k.clone())
        .collect()
}

/// Jaccard overlap of the two users' tag sets.
fn interest_overlap(a: &ConversationMemory, b: &ConversationMemory) -> f64 {
    let tags_a: BTreeSet<String> = a.topic_frequency.keys().cloned().collect();
    let tags_b: BTreeSet<String> = b.topic_frequency.keys().cloned().collect();
    jaccard(&tags_a, &tags_b)
}

fn jaccard(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f64 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    100.0 * intersection as f64 / union as f64
}

/// Depth-tier match as a proxy for communication style: same tier 100,
/// adjacent 50, otherwise 0.
fn communication_style(a: &ConversationMemory, b: &ConversationMemory) -> f64 {
    let tier_a = DepthTier::for_depth(a.total_count);
    let tier_b = DepthTier::for_depth(b.total_count);
    match tier_distance(tier_a, tier_b) {
        0 => 100.0,
        1 => 50.0,
        _ => 0.0,
    }
}

fn tier_distance(a: DepthTier, b: DepthTier) -> u8 {
    fn rank(t: DepthTier) -> u8 {
        match t {
            DepthTier::Low => 0,
            DepthTier::Medium => 1,
            DepthTier::High => 2,
        }
    }
    rank(a).abs_diff(rank(b))
}

/// 100 when both users were last active within the recent window;
/// otherwise a linear decay to 0 over `decay_days` past it. A user with
/// no activity at all scores 0.
fn activity_recency(
    a: &ConversationMemory,
    b: &ConversationMemory,
    as_of: DateTime<Utc>,
    config: &CompatibilityConfig,
) -> f64 {
    let (last_a, last_b) = match (a.last_at, b.last_at) {
        (Some(a), Some(b)) => (a, b),
        _ => return 0.0,
    };

    let staleness = (as_of - last_a.min(last_b)).num_days().max(0);
    if staleness <= config.recent_window_days {
        return 100.0;
    }
    if config.decay_days <= 0 {
        return 0.0;
    }

    let past = (staleness - config.recent_window_days) as f64;
    (100.0 * (1.0 - past / config.decay_days as f64)).clamp(0.0, 100.0)
}

fn shared_tags(a: &ConversationMemory, b: &ConversationMemory) -> Vec<String> {
    a.topic_frequency
        .keys()
        .filter(|tag| b.topic_frequency.contains_key(*tag))
        .cloned()
        .collect()
}
