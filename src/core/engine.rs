use chrono::Utc;
use tracing::debug;

use super::analyzer;
use super::catalog::{CatalogEntry, QuestionCatalog};
use super::compat::{self, CompatibilityConfig, CompatibilityResult, UserSnapshot};
use super::error::{CoreError, Result};
use super::memory::{ConversationContext, ConversationMemory, MemoryReference, SkipReason, SkipRecord};
use super::persona::PersonaTraits;
use super::reflection::Reflection;
use super::selector::{self, Selection, SelectionInput, DYNAMIC_ID_PREFIX};
use super::store::ReflectionStore;

/// The pipeline facade the surrounding application talks to.
///
/// Analysis and scoring are computed fully in memory before any durable
/// write, so a persistence failure never leaves partially updated
/// aggregates.
pub struct ReflectionEngine {
    store: ReflectionStore,
    catalog: QuestionCatalog,
    config: CompatibilityConfig,
}

impl ReflectionEngine {
    pub fn new(
        store: ReflectionStore,
        catalog: QuestionCatalog,
        config: CompatibilityConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            store,
            catalog,
            config,
        })
    }

    /// Pick the next question for a user.
    pub fn next_question(&self, user_id: &str) -> Result<Selection> {
        let answered = self.store.answered_ids(user_id)?;
        let log = self.store.list_reflections(user_id)?;
        let skips = self.store.list_skips(user_id)?;
        let asked_log = self.store.asked_log(user_id)?;
        let memory = self
            .store
            .load_memory(user_id)?
            .unwrap_or_default();
        let context = memory.context(&log, &skips);

        let selection = selector::select(&SelectionInput {
            answered: &answered,
            asked_log: &asked_log,
            last_skip: skips.last(),
            context: &context,
            themes: &memory.conversation_themes,
            catalog: &self.catalog,
        });

        debug!(
            user_id,
            question_id = %selection.question.id,
            dynamic = selection.dynamic,
            pool_exhausted = selection.pool_exhausted,
            "selected next question"
        );
        Ok(selection)
    }

    /// Analyze and commit one answer. Returns the stored reflection.
    pub fn submit_reflection(
        &mut self,
        user_id: &str,
        question_id: &str,
        answer_text: &str,
    ) -> Result<Reflection> {
        let question = self.resolve_question(question_id)?;

        let log = self.store.list_reflections(user_id)?;
        let skips = self.store.list_skips(user_id)?;
        let mut memory = self.store.load_memory(user_id)?.unwrap_or_default();
        let mut persona = self.store.load_persona(user_id)?.unwrap_or_default();
        let context = memory.context(&log, &skips);

        let analysis = analyzer::analyze(answer_text, &question.category, &context.recent_topics);
        let reflection = Reflection::new(
            &question.id,
            &question.text,
            &question.category,
            answer_text,
            analysis,
        );

        // All state transitions happen in memory first; the store commit
        // is the single all-or-nothing side effect.
        memory.record(&reflection);
        persona.update(&reflection);
        self.store
            .commit_reflection(user_id, &reflection, &memory, &persona)?;

        debug!(
            user_id,
            reflection_id = %reflection.id,
            mood = %reflection.mood,
            "recorded reflection"
        );
        Ok(reflection)
    }

    /// Record that a user skipped a question.
    pub fn skip_question(
        &mut self,
        user_id: &str,
        question_id: &str,
        reason: SkipReason,
    ) -> Result<()> {
        let question = self.resolve_question(question_id)?;
        let skip = SkipRecord::new(&question.id, &question.category, reason);
        self.store.record_skip(user_id, &skip)
    }

    /// Toggle the liked flag on one of the user's reflections.
    pub fn set_liked(&mut self, user_id: &str, reflection_id: &str, liked: bool) -> Result<()> {
        self.store.set_liked(user_id, reflection_id, liked)
    }

    /// Score a user against a list of candidates, best match first.
    ///
    /// The primary user must be known; candidates with no data are scored
    /// against empty snapshots and flagged low-confidence instead of
    /// failing.
    pub fn compatible_matches(
        &self,
        user_id: &str,
        candidate_ids: &[String],
    ) -> Result<Vec<CompatibilityResult>> {
        if !self.store.user_exists(user_id)? {
            return Err(CoreError::NotFound(format!("user {}", user_id)));
        }

        let user = self.snapshot(user_id)?;
        let as_of = Utc::now();

        let mut results = Vec::with_capacity(candidate_ids.len());
        for candidate_id in candidate_ids {
            let candidate = self.snapshot(candidate_id)?;
            results.push(compat::score(&user, &candidate, as_of, &self.config));
        }

        results.sort_by(|a, b| {
            b.overall_score
                .partial_cmp(&a.overall_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.user_b.cmp(&b.user_b))
        });
        Ok(results)
    }

    /// Derived conversation context for a user.
    pub fn conversation_context(&self, user_id: &str) -> Result<ConversationContext> {
        let log = self.store.list_reflections(user_id)?;
        let skips = self.store.list_skips(user_id)?;
        let memory = self.store.load_memory(user_id)?.unwrap_or_default();
        Ok(memory.context(&log, &skips))
    }

    /// Optional human-readable callback to a prior reflection.
    pub fn memory_reference(&self, user_id: &str) -> Result<Option<MemoryReference>> {
        let log = self.store.list_reflections(user_id)?;
        Ok(ConversationMemory::memory_reference(&log))
    }

    /// Current persona for a user (empty if none recorded yet).
    pub fn persona(&self, user_id: &str) -> Result<PersonaTraits> {
        Ok(self.store.load_persona(user_id)?.unwrap_or_default())
    }

    /// Current memory aggregates for a user (empty if none recorded yet).
    pub fn memory(&self, user_id: &str) -> Result<ConversationMemory> {
        Ok(self.store.load_memory(user_id)?.unwrap_or_default())
    }

    fn snapshot(&self, user_id: &str) -> Result<UserSnapshot> {
        Ok(UserSnapshot {
            user_id: user_id.to_string(),
            traits: self.store.load_persona(user_id)?.unwrap_or_default(),
            memory: self.store.load_memory(user_id)?.unwrap_or_default(),
        })
    }

    /// Map a submitted question id back to a question. Dynamic ids are
    /// reconstructed from their tag; anything else must be in the catalog.
    fn resolve_question(&self, question_id: &str) -> Result<CatalogEntry> {
        if let Some(tag) = question_id.strip_prefix(DYNAMIC_ID_PREFIX) {
            if tag.is_empty() {
                return Err(CoreError::Validation(format!(
                    "malformed dynamic question id: {}",
                    question_id
                )));
            }
            return Ok(selector::dynamic_question(tag));
        }
        self.catalog
            .get(question_id)
            .cloned()
            .ok_or_else(|| CoreError::Validation(format!("unknown question id: {}", question_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::reflection::Mood;
    use crate::core::selector::DYNAMIC_CATEGORY;

    fn engine() -> ReflectionEngine {
        ReflectionEngine::new(
            ReflectionStore::in_memory().unwrap(),
            QuestionCatalog::builtin(),
            CompatibilityConfig::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_first_question_is_background() {
        let engine = engine();
        let selection = engine.next_question("alice").unwrap();
        assert!(selection.question.is_background());
    }

    #[test]
    fn test_submit_validates_question_id() {
        let mut engine = engine();
        let result = engine.submit_reflection("alice", "nope", "whatever answer this is");
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_submit_then_next_never_repeats() {
        let mut engine = engine();
        let mut seen = std::collections::HashSet::new();

        loop {
            let selection = engine.next_question("alice").unwrap();
            if selection.pool_exhausted {
                break;
            }
            assert!(
                seen.insert(selection.question.id.clone()),
                "repeated {}",
                selection.question.id
            );
            engine
                .submit_reflection(
                    "alice",
                    &selection.question.id,
                    "an ordinary answer with enough words in it",
                )
                .unwrap();
        }
    }

    #[test]
    fn test_submit_updates_memory_and_persona() {
        let mut engine = engine();
        let reflection = engine
            .submit_reflection("alice", "gj-01", "so grateful and thankful for my family")
            .unwrap();
        assert_eq!(reflection.mood, Mood::Uplifted);

        let memory = engine.memory("alice").unwrap();
        assert_eq!(memory.total_count, 1);
        assert!(memory.topic_frequency.contains_key("gratitude"));

        let persona = engine.persona("alice").unwrap();
        assert!(persona.traits.contains_key("warmth"));
    }

    #[test]
    fn test_discomfort_skip_steers_selection() {
        let mut engine = engine();
        engine
            .submit_reflection("alice", "bg-01", "an ordinary answer with enough words")
            .unwrap();
        engine
            .skip_question("alice", "rh-01", SkipReason::TooPersonal)
            .unwrap();

        let selection = engine.next_question("alice").unwrap();
        assert_ne!(selection.question.category, "RELATIONSHIP & HEALING");
    }

    #[test]
    fn test_dynamic_question_submission_roundtrip() {
        let mut engine = engine();
        let reflection = engine
            .submit_reflection("alice", "dynamic:gratitude", "still so grateful these days")
            .unwrap();
        assert_eq!(reflection.question_id, "dynamic:gratitude");
        assert_eq!(reflection.category, DYNAMIC_CATEGORY);
    }

    #[test]
    fn test_malformed_dynamic_id_rejected() {
        let mut engine = engine();
        let result = engine.submit_reflection("alice", "dynamic:", "some answer text here");
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[test]
    fn test_matches_require_known_user() {
        let engine = engine();
        let result = engine.compatible_matches("ghost", &["alice".to_string()]);
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }

    #[test]
    fn test_matches_ordered_and_low_confidence() {
        let mut engine = engine();
        engine
            .submit_reflection("alice", "gj-01", "so grateful and thankful for my family")
            .unwrap();
        engine
            .submit_reflection("bob", "gj-01", "grateful and happy about my friend")
            .unwrap();

        let results = engine
            .compatible_matches("alice", &["bob".to_string(), "ghost".to_string()])
            .unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].user_b, "bob");
        assert!(results[0].overall_score >= results[1].overall_score);
        assert!(results[1].low_confidence);
        assert!(results[0].shared_tags.contains(&"gratitude".to_string()));
    }

    #[test]
    fn test_memory_reference_after_submissions() {
        let mut engine = engine();
        assert!(engine.memory_reference("alice").unwrap().is_none());
        engine
            .submit_reflection("alice", "gj-01", "deeply grateful for my family today")
            .unwrap();
        let reference = engine.memory_reference("alice").unwrap().unwrap();
        assert!(reference.text.contains("gratitude"));
    }
}
