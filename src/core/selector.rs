use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::warn;

use super::catalog::{CatalogEntry, EmotionalDepth, QuestionCatalog};
use super::lexicon;
use super::memory::{ConversationContext, SkipRecord};

/// Depth boundaries for the conversation: below `MEDIUM_AT` is low tier,
/// `MEDIUM_AT..=HIGH_AFTER` is medium, and beyond that high.
const MEDIUM_AT: u32 = 3;
const HIGH_AFTER: u32 = 10;

/// A dynamic follow-up is considered every this-many reflections.
const DYNAMIC_EVERY: u32 = 4;

/// Prefix marking synthesized (non-catalog) question ids.
pub const DYNAMIC_ID_PREFIX: &str = "dynamic:";

/// Category assigned to synthesized follow-up questions.
pub const DYNAMIC_CATEGORY: &str = "FOLLOW_UP";

/// Coarse bucket for how probing the conversation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DepthTier {
    Low,
    Medium,
    High,
}

impl DepthTier {
    pub fn for_depth(depth: u32) -> Self {
        if depth < MEDIUM_AT {
            DepthTier::Low
        } else if depth <= HIGH_AFTER {
            DepthTier::Medium
        } else {
            DepthTier::High
        }
    }

    pub fn target_depth(self) -> EmotionalDepth {
        match self {
            DepthTier::Low => EmotionalDepth::Low,
            DepthTier::Medium => EmotionalDepth::Medium,
            DepthTier::High => EmotionalDepth::High,
        }
    }
}

/// Selection state machine. `Intro` is the unique initial state (empty
/// history); there is no terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    Intro,
    Exploring(DepthTier),
    SteadyState,
}

impl Phase {
    pub fn current(answered_empty: bool, depth: u32) -> Self {
        if answered_empty {
            Phase::Intro
        } else if depth <= HIGH_AFTER {
            Phase::Exploring(DepthTier::for_depth(depth))
        } else {
            Phase::SteadyState
        }
    }
}

/// Everything the selector reads. It never mutates state; selection can
/// be abandoned at any point with no side effects.
pub struct SelectionInput<'a> {
    /// Question ids the user has already answered
    pub answered: &'a HashSet<String>,

    /// (question id, asked at) for every ask (answers and skips), log order
    pub asked_log: &'a [(String, DateTime<Utc>)],

    /// Most recent skip, if any
    pub last_skip: Option<&'a SkipRecord>,

    /// Derived conversation context
    pub context: &'a ConversationContext,

    /// Category → reflection count, from conversation memory
    pub themes: &'a BTreeMap<String, u32>,

    pub catalog: &'a QuestionCatalog,
}

/// The selector's answer: a question plus how it was arrived at.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Selection {
    pub question: CatalogEntry,
    pub phase: Phase,

    /// True when every candidate was filtered out and the selector fell
    /// back to least-recently-asked with repeats allowed
    pub pool_exhausted: bool,

    /// True when the question was synthesized rather than drawn from the
    /// catalog
    pub dynamic: bool,
}

/// Pick the next question. Pure: identical inputs produce identical
/// output, and ties are broken by catalog order.
pub fn select(input: &SelectionInput) -> Selection {
    let depth = input.context.conversation_depth;
    let phase = Phase::current(input.answered.is_empty(), depth);

    // Rule 1: never re-ask an answered question.
    let mut pool: Vec<&CatalogEntry> = input
        .catalog
        .entries()
        .iter()
        .filter(|e| !input.answered.contains(&e.id))
        .collect();

    // Rule 2: a first-ever interaction draws from the introductory subset.
    if input.answered.is_empty() {
        pool.retain(|e| e.is_background());
        // Catalog validation guarantees at least one background entry,
        // and none can be answered yet.
        let question = pool[0].clone();
        return Selection {
            question,
            phase,
            pool_exhausted: false,
            dynamic: false,
        };
    }

    // Rule 3: a discomfort skip excludes its category and biases shallow.
    let discomfort = input
        .last_skip
        .filter(|s| s.reason.is_discomfort());
    let target_depth = if let Some(skip) = discomfort {
        pool.retain(|e| e.category != skip.category);
        EmotionalDepth::Low
    } else {
        // Rule 5: periodically synthesize a follow-up from the last tags.
        // An already-answered follow-up id is never offered again.
        if phase == Phase::SteadyState
            && !input.context.last_tags.is_empty()
            && depth % DYNAMIC_EVERY == 0
        {
            let question = dynamic_question(&input.context.last_tags[0]);
            if !input.answered.contains(&question.id) {
                return Selection {
                    question,
                    phase,
                    pool_exhausted: false,
                    dynamic: true,
                };
            }
        }
        DepthTier::for_depth(depth).target_depth()
    };

    // Rule 6: an empty pool falls back to least-recently-asked, repeats
    // allowed.
    if pool.is_empty() {
        warn!("question pool exhausted; falling back to least-recently-asked");
        return Selection {
            question: least_recently_asked(input),
            phase,
            pool_exhausted: true,
            dynamic: false,
        };
    }

    // Rule 4: prefer the least-covered category, then the closest depth
    // match, then catalog order.
    let pick = pool
        .iter()
        .enumerate()
        .min_by_key(|(idx, e)| {
            let theme_count = input.themes.get(&e.category).copied().unwrap_or(0);
            let avoided = input.context.avoided_topics.contains(&e.category) as u32;
            (
                theme_count,
                avoided,
                e.emotional_depth.distance(target_depth),
                *idx,
            )
        })
        .map(|(_, e)| (*e).clone())
        .unwrap_or_else(|| pool[0].clone());

    Selection {
        question: pick,
        phase,
        pool_exhausted: false,
        dynamic: false,
    }
}

/// Synthesize a follow-up question around the user's top recent tag.
pub fn dynamic_question(tag: &str) -> CatalogEntry {
    CatalogEntry {
        id: format!("{}{}", DYNAMIC_ID_PREFIX, tag),
        text: lexicon::dynamic_question_text(tag),
        category: DYNAMIC_CATEGORY.to_string(),
        tone: "curious".to_string(),
        emotional_depth: EmotionalDepth::Medium,
        intended_use_case: "dynamic".to_string(),
    }
}

/// Least-recently-asked entry across the whole catalog; never-asked
/// entries win outright, catalog order breaks ties.
fn least_recently_asked(input: &SelectionInput) -> CatalogEntry {
    let mut best: Option<(Option<DateTime<Utc>>, usize)> = None;
    for (idx, entry) in input.catalog.entries().iter().enumerate() {
        let last_asked = input
            .asked_log
            .iter()
            .filter(|(id, _)| *id == entry.id)
            .map(|(_, at)| *at)
            .max();
        let candidate = (last_asked, idx);
        let better = match &best {
            None => true,
            Some((current, _)) => match (last_asked, current) {
                (None, None) => false,
                (None, Some(_)) => true,
                (Some(_), None) => false,
                (Some(a), Some(b)) => a < *b,
            },
        };
        if better {
            best = Some(candidate);
        }
    }
    let idx = best.map(|(_, idx)| idx).unwrap_or(0);
    input.catalog.entries()[idx].clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::memory::SkipReason;
    use crate::core::reflection::Mood;

    fn context(depth: u32, last_tags: Vec<String>) -> ConversationContext {
        ConversationContext {
            recent_topics: vec![],
            emotional_state: Mood::Neutral,
            conversation_depth: depth,
            preferred_question_types: vec![],
            avoided_topics: vec![],
            last_mentioned: BTreeMap::new(),
            last_tags,
        }
    }

    fn select_with(
        answered: &HashSet<String>,
        last_skip: Option<&SkipRecord>,
        ctx: &ConversationContext,
        themes: &BTreeMap<String, u32>,
        catalog: &QuestionCatalog,
    ) -> Selection {
        select(&SelectionInput {
            answered,
            asked_log: &[],
            last_skip,
            context: ctx,
            themes,
            catalog,
        })
    }

    #[test]
    fn test_empty_history_gets_background_question() {
        let catalog = QuestionCatalog::builtin();
        let selection = select_with(
            &HashSet::new(),
            None,
            &context(0, vec![]),
            &BTreeMap::new(),
            &catalog,
        );
        assert!(selection.question.is_background());
        assert_eq!(selection.phase, Phase::Intro);
    }

    #[test]
    fn test_answered_ids_never_repeat() {
        let catalog = QuestionCatalog::builtin();
        let mut answered = HashSet::new();
        let ctx = context(1, vec![]);
        let themes = BTreeMap::new();

        // Answer every question the selector offers, one by one.
        answered.insert("bg-01".to_string());
        for _ in 0..catalog.len() {
            let selection = select_with(&answered, None, &ctx, &themes, &catalog);
            if selection.pool_exhausted {
                break;
            }
            assert!(
                !answered.contains(&selection.question.id),
                "repeated id {} without exhaustion",
                selection.question.id
            );
            answered.insert(selection.question.id);
        }
    }

    #[test]
    fn test_discomfort_skip_excludes_category() {
        let catalog = QuestionCatalog::builtin();
        let mut answered = HashSet::new();
        answered.insert("bg-01".to_string());
        let skip = SkipRecord::new("rh-01", "RELATIONSHIP & HEALING", SkipReason::TooPersonal);

        let selection = select_with(
            &answered,
            Some(&skip),
            &context(1, vec![]),
            &BTreeMap::new(),
            &catalog,
        );
        assert_ne!(selection.question.category, "RELATIONSHIP & HEALING");
        assert_eq!(selection.question.emotional_depth, EmotionalDepth::Low);
    }

    #[test]
    fn test_non_discomfort_skip_does_not_exclude() {
        let catalog = QuestionCatalog::builtin();
        let mut answered = HashSet::new();
        answered.insert("bg-01".to_string());
        let skip = SkipRecord::new("rh-01", "RELATIONSHIP & HEALING", SkipReason::NotToday);

        // Push every other category's count up so diversity favors the
        // skipped category.
        let mut themes = BTreeMap::new();
        for entry in catalog.entries() {
            if entry.category != "RELATIONSHIP & HEALING" {
                themes.insert(entry.category.clone(), 5);
            }
        }

        let selection = select_with(&answered, Some(&skip), &context(4, vec![]), &themes, &catalog);
        assert_eq!(selection.question.category, "RELATIONSHIP & HEALING");
    }

    #[test]
    fn test_diversity_prefers_least_covered_category() {
        let catalog = QuestionCatalog::builtin();
        let mut answered = HashSet::new();
        answered.insert("bg-01".to_string());

        let mut themes = BTreeMap::new();
        themes.insert("DAILY LIFE".to_string(), 10);
        themes.insert("GRATITUDE & JOY".to_string(), 10);
        themes.insert("RELATIONSHIP & HEALING".to_string(), 10);
        themes.insert("GROWTH & PURPOSE".to_string(), 10);
        // ADVENTURE & PLAY untouched.

        let selection = select_with(&answered, None, &context(5, vec![]), &themes, &catalog);
        assert_eq!(selection.question.category, "ADVENTURE & PLAY");
    }

    #[test]
    fn test_depth_tier_progression() {
        assert_eq!(DepthTier::for_depth(0), DepthTier::Low);
        assert_eq!(DepthTier::for_depth(2), DepthTier::Low);
        assert_eq!(DepthTier::for_depth(3), DepthTier::Medium);
        assert_eq!(DepthTier::for_depth(10), DepthTier::Medium);
        assert_eq!(DepthTier::for_depth(11), DepthTier::High);
    }

    #[test]
    fn test_phase_transitions() {
        assert_eq!(Phase::current(true, 0), Phase::Intro);
        assert_eq!(Phase::current(false, 1), Phase::Exploring(DepthTier::Low));
        assert_eq!(Phase::current(false, 5), Phase::Exploring(DepthTier::Medium));
        assert_eq!(Phase::current(false, 20), Phase::SteadyState);
    }

    #[test]
    fn test_dynamic_follow_up_in_steady_state() {
        let catalog = QuestionCatalog::builtin();
        let mut answered = HashSet::new();
        answered.insert("bg-01".to_string());

        let ctx = context(12, vec!["gratitude".to_string()]);
        let selection = select_with(&answered, None, &ctx, &BTreeMap::new(), &catalog);
        assert!(selection.dynamic);
        assert_eq!(selection.question.id, "dynamic:gratitude");
        assert!(selection.question.text.contains("gratitude"));
    }

    #[test]
    fn test_answered_dynamic_id_not_repeated() {
        let catalog = QuestionCatalog::builtin();
        let mut answered = HashSet::new();
        answered.insert("bg-01".to_string());
        answered.insert("dynamic:gratitude".to_string());

        // Same tag resurfaces at a follow-up depth; the selector must
        // fall through to the catalog instead of repeating the id.
        let ctx = context(12, vec!["gratitude".to_string()]);
        let selection = select_with(&answered, None, &ctx, &BTreeMap::new(), &catalog);
        assert!(!selection.dynamic);
        assert!(!selection.pool_exhausted);
        assert_ne!(selection.question.id, "dynamic:gratitude");
    }

    #[test]
    fn test_no_dynamic_without_tags() {
        let catalog = QuestionCatalog::builtin();
        let mut answered = HashSet::new();
        answered.insert("bg-01".to_string());

        let selection = select_with(&answered, None, &context(12, vec![]), &BTreeMap::new(), &catalog);
        assert!(!selection.dynamic);
    }

    #[test]
    fn test_exhausted_pool_falls_back_to_lru() {
        let catalog = QuestionCatalog::builtin();
        let answered: HashSet<String> =
            catalog.entries().iter().map(|e| e.id.clone()).collect();

        let base = Utc::now();
        let asked_log: Vec<(String, DateTime<Utc>)> = catalog
            .entries()
            .iter()
            .enumerate()
            .map(|(i, e)| (e.id.clone(), base + chrono::Duration::seconds(i as i64)))
            .collect();

        let ctx = context(answered.len() as u32, vec![]);
        let selection = select(&SelectionInput {
            answered: &answered,
            asked_log: &asked_log,
            last_skip: None,
            context: &ctx,
            themes: &BTreeMap::new(),
            catalog: &catalog,
        });

        assert!(selection.pool_exhausted);
        // Oldest ask comes back first.
        assert_eq!(selection.question.id, catalog.entries()[0].id);
    }

    #[test]
    fn test_selection_is_deterministic() {
        let catalog = QuestionCatalog::builtin();
        let mut answered = HashSet::new();
        answered.insert("bg-02".to_string());
        let ctx = context(2, vec![]);
        let themes = BTreeMap::new();

        let a = select_with(&answered, None, &ctx, &themes, &catalog);
        let b = select_with(&answered, None, &ctx, &themes, &catalog);
        assert_eq!(a.question.id, b.question.id);
    }
}
