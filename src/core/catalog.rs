use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use super::error::{CoreError, Result};

/// How emotionally probing a question is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmotionalDepth {
    Low,
    Medium,
    High,
}

impl EmotionalDepth {
    /// Numeric tier, used for adjacency comparisons.
    pub fn tier(self) -> u8 {
        match self {
            EmotionalDepth::Low => 0,
            EmotionalDepth::Medium => 1,
            EmotionalDepth::High => 2,
        }
    }

    /// Distance between two depth tiers (0 = same, 1 = adjacent, 2 = far).
    pub fn distance(self, other: EmotionalDepth) -> u8 {
        self.tier().abs_diff(other.tier())
    }
}

/// Intended use case marking introductory questions.
pub const USE_CASE_BACKGROUND: &str = "background";

/// One prompt in the question catalog. Read-only for the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub text: String,
    pub category: String,
    pub tone: String,
    pub emotional_depth: EmotionalDepth,
    pub intended_use_case: String,
}

impl CatalogEntry {
    pub fn is_background(&self) -> bool {
        self.intended_use_case == USE_CASE_BACKGROUND
    }
}

/// The static, versioned question catalog, loaded once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionCatalog {
    entries: Vec<CatalogEntry>,
}

impl QuestionCatalog {
    /// Build a catalog from entries, validating invariants.
    ///
    /// A malformed catalog is the one fatal initialization error: the
    /// pipeline cannot run without a usable question pool.
    pub fn from_entries(entries: Vec<CatalogEntry>) -> Result<Self> {
        if entries.is_empty() {
            return Err(CoreError::Catalog("catalog is empty".to_string()));
        }

        let mut seen = HashSet::new();
        for entry in &entries {
            if entry.id.trim().is_empty() {
                return Err(CoreError::Catalog("entry with empty id".to_string()));
            }
            if entry.text.trim().is_empty() {
                return Err(CoreError::Catalog(format!("entry {} has empty text", entry.id)));
            }
            if !seen.insert(entry.id.clone()) {
                return Err(CoreError::Catalog(format!("duplicate entry id: {}", entry.id)));
            }
        }

        if !entries.iter().any(|e| e.is_background()) {
            return Err(CoreError::Catalog(
                "catalog has no background (introductory) entries".to_string(),
            ));
        }

        Ok(Self { entries })
    }

    /// Load a catalog from a JSON file.
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<CatalogEntry> = serde_json::from_str(&content)?;
        Self::from_entries(entries)
    }

    /// The built-in default catalog.
    pub fn builtin() -> Self {
        let entries = vec![
            entry("bg-01", "What does a typical day look like for you right now?",
                  "DAILY LIFE", "warm", EmotionalDepth::Low, USE_CASE_BACKGROUND),
            entry("bg-02", "What's something you're looking forward to this week?",
                  "DAILY LIFE", "warm", EmotionalDepth::Low, USE_CASE_BACKGROUND),
            entry("bg-03", "How would a close friend describe you?",
                  "GROWTH & PURPOSE", "curious", EmotionalDepth::Low, USE_CASE_BACKGROUND),
            entry("dl-01", "What small moment made today feel different from yesterday?",
                  "DAILY LIFE", "curious", EmotionalDepth::Low, "daily"),
            entry("dl-02", "When did you last lose track of time doing something?",
                  "DAILY LIFE", "playful", EmotionalDepth::Medium, "daily"),
            entry("gj-01", "What's something you felt grateful for recently?",
                  "GRATITUDE & JOY", "warm", EmotionalDepth::Low, "daily"),
            entry("gj-02", "Describe a moment this month when you laughed hard.",
                  "GRATITUDE & JOY", "playful", EmotionalDepth::Medium, "daily"),
            entry("rh-01", "Is there a relationship in your life you'd like to repair?",
                  "RELATIONSHIP & HEALING", "gentle", EmotionalDepth::High, "deep_dive"),
            entry("rh-02", "What's something you find hard to admit, even to yourself?",
                  "RELATIONSHIP & HEALING", "gentle", EmotionalDepth::High, "deep_dive"),
            entry("rh-03", "Who do you feel most understood by, and why?",
                  "RELATIONSHIP & HEALING", "warm", EmotionalDepth::Medium, "daily"),
            entry("gp-01", "What's one way you've changed in the last year?",
                  "GROWTH & PURPOSE", "curious", EmotionalDepth::Medium, "daily"),
            entry("gp-02", "If nothing stood in your way, what would you chase?",
                  "GROWTH & PURPOSE", "bold", EmotionalDepth::High, "deep_dive"),
            entry("ad-01", "What's a place you've never been that keeps calling you?",
                  "ADVENTURE & PLAY", "playful", EmotionalDepth::Low, "daily"),
            entry("ad-02", "Tell me about a risk you took that paid off.",
                  "ADVENTURE & PLAY", "bold", EmotionalDepth::Medium, "daily"),
        ];

        // The built-in set is known-good; validation cannot fail here.
        Self { entries }
    }

    pub fn get(&self, id: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn entry(
    id: &str,
    text: &str,
    category: &str,
    tone: &str,
    emotional_depth: EmotionalDepth,
    intended_use_case: &str,
) -> CatalogEntry {
    CatalogEntry {
        id: id.to_string(),
        text: text.to_string(),
        category: category.to_string(),
        tone: tone.to_string(),
        emotional_depth,
        intended_use_case: intended_use_case.to_string(),
    }
}
