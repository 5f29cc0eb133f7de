use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::lexicon;
use super::reflection::Reflection;

/// Trait scores are kept within this range, whatever the update history.
pub const TRAIT_MIN: f64 = 0.0;
pub const TRAIT_MAX: f64 = 100.0;

/// A user's trait-score vector, incrementally nudged by reflections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PersonaTraits {
    /// Trait name → score in [0, 100]
    pub traits: BTreeMap<String, f64>,

    /// Timestamp of the reflection that last touched this persona
    pub last_updated: Option<DateTime<Utc>>,
}

impl PersonaTraits {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the static tag→trait deltas for every tag and the mood of a
    /// reflection, clamped to [0, 100]. No decay.
    pub fn update(&mut self, reflection: &Reflection) {
        for tag in &reflection.tags {
            if let Some(entry) = lexicon::entry_for_tag(tag) {
                for (name, delta) in entry.trait_deltas {
                    self.nudge(name, *delta);
                }
            }
        }
        for (name, delta) in lexicon::mood_trait_deltas(reflection.mood) {
            self.nudge(name, *delta);
        }
        self.last_updated = Some(reflection.created_at);
    }

    fn nudge(&mut self, name: &str, delta: f64) {
        let score = self.traits.entry(name.to_string()).or_insert(0.0);
        *score = (*score + delta).clamp(TRAIT_MIN, TRAIT_MAX);
    }

    /// Recompute the persona from scratch by replaying a log.
    pub fn replay(log: &[Reflection]) -> Self {
        let mut persona = Self::new();
        for reflection in log {
            persona.update(reflection);
        }
        persona
    }

    /// Current trait map.
    pub fn snapshot(&self) -> BTreeMap<String, f64> {
        self.traits.clone()
    }

    /// The k highest-scoring traits, for display. Score descending, name
    /// ascending on ties.
    pub fn top_traits(&self, k: usize) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .traits
            .iter()
            .map(|(name, score)| (name.clone(), *score))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.partial_cmp(&a.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });
        ranked.truncate(k);
        ranked
    }
}
