use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use ulid::Ulid;

use super::error::CoreError;
use super::reflection::{Mood, Reflection};

/// Reflections considered "recent" when deriving context.
const RECENT_WINDOW: usize = 10;

/// Moods considered when deriving the current emotional state.
const MOOD_WINDOW: usize = 5;

/// Skips considered when deriving avoided topics.
const SKIP_WINDOW: usize = 5;

/// Top tags surfaced as recent topics.
const TOP_TOPICS: usize = 5;

/// Upper bound on the reported conversation depth.
const MAX_DEPTH: u32 = 1000;

/// Consecutive-day streak lengths that mark growth milestones.
const STREAK_MILESTONES: [u32; 3] = [7, 30, 100];

/// A growth milestone reached while journaling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Milestone {
    pub id: String,
    pub reached_at: DateTime<Utc>,
}

/// Why a user skipped a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    TooPersonal,
    Uncomfortable,
    NotToday,
    NotInterested,
}

impl SkipReason {
    /// Discomfort signals drive the selector's category avoidance.
    pub fn is_discomfort(&self) -> bool {
        matches!(self, SkipReason::TooPersonal | SkipReason::Uncomfortable)
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::TooPersonal => write!(f, "too_personal"),
            SkipReason::Uncomfortable => write!(f, "uncomfortable"),
            SkipReason::NotToday => write!(f, "not_today"),
            SkipReason::NotInterested => write!(f, "not_interested"),
        }
    }
}

impl FromStr for SkipReason {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(' ', "_").as_str() {
            "too_personal" => Ok(SkipReason::TooPersonal),
            "uncomfortable" => Ok(SkipReason::Uncomfortable),
            "not_today" => Ok(SkipReason::NotToday),
            "not_interested" => Ok(SkipReason::NotInterested),
            other => Err(CoreError::Parse(format!("unknown skip reason: {}", other))),
        }
    }
}

/// One recorded skip event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkipRecord {
    pub id: String,
    pub question_id: String,
    pub category: String,
    pub reason: SkipReason,
    pub created_at: DateTime<Utc>,
}

impl SkipRecord {
    pub fn new(question_id: &str, category: &str, reason: SkipReason) -> Self {
        Self {
            id: Ulid::new().to_string(),
            question_id: question_id.to_string(),
            category: category.to_string(),
            reason,
            created_at: Utc::now(),
        }
    }
}

/// Aggregated, derivable statistics over a user's reflection log.
///
/// The log is the source of truth: every field here must equal what
/// `replay` produces over the same log. Incremental updates that drift
/// from the replayed value are a bug.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversationMemory {
    pub total_count: u32,
    pub first_at: Option<DateTime<Utc>>,
    pub last_at: Option<DateTime<Utc>>,
    pub topic_frequency: BTreeMap<String, u32>,
    pub emotional_patterns: BTreeMap<Mood, u32>,
    pub conversation_themes: BTreeMap<String, u32>,
    pub growth_milestones: Vec<Milestone>,

    /// Length of the current run of consecutive calendar days (UTC) with
    /// at least one reflection
    pub streak_days: u32,

    /// Last UTC day that extended or started the streak
    pub streak_last_day: Option<NaiveDate>,
}

/// Derived view of a user's conversation, consumed by the selector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationContext {
    /// Top tags over the recent window, most frequent first
    pub recent_topics: Vec<String>,

    /// Mode of the last few moods
    pub emotional_state: Mood,

    /// Bounded reflection count
    pub conversation_depth: u32,

    /// Categories the user engages with above average
    pub preferred_question_types: Vec<String>,

    /// Categories recently skipped
    pub avoided_topics: Vec<String>,

    /// Most recent mention time per tag, over the recent window
    pub last_mentioned: BTreeMap<String, DateTime<Utc>>,

    /// Tags of the newest reflection
    pub last_tags: Vec<String>,
}

/// A human-readable callback to a prior reflection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryReference {
    pub reflection_id: String,
    pub text: String,
}

impl ConversationMemory {
    /// Fold one reflection into the aggregates, appending any growth
    /// milestones its arrival crosses.
    pub fn record(&mut self, reflection: &Reflection) {
        let first_in_category = !self.conversation_themes.contains_key(&reflection.category);

        self.total_count += 1;
        if self.first_at.is_none() {
            self.first_at = Some(reflection.created_at);
        }
        self.last_at = Some(reflection.created_at);

        for tag in &reflection.tags {
            *self.topic_frequency.entry(tag.clone()).or_insert(0) += 1;
        }
        *self.emotional_patterns.entry(reflection.mood).or_insert(0) += 1;
        *self
            .conversation_themes
            .entry(reflection.category.clone())
            .or_insert(0) += 1;

        if self.total_count == 1 {
            self.push_milestone("first_reflection", reflection.created_at);
        }

        // Streaks count consecutive UTC days with at least one reflection;
        // a second reflection on the same day leaves the streak unchanged.
        let day = reflection.created_at.date_naive();
        let advanced = match self.streak_last_day {
            Some(prev) if prev == day => false,
            Some(prev) if day.signed_duration_since(prev).num_days() == 1 => {
                self.streak_days += 1;
                true
            }
            _ => {
                self.streak_days = 1;
                true
            }
        };
        self.streak_last_day = Some(day);
        if advanced && STREAK_MILESTONES.contains(&self.streak_days) {
            self.push_milestone(&format!("streak_{}", self.streak_days), reflection.created_at);
        }
        if first_in_category && self.total_count > 1 {
            self.push_milestone(
                &format!("new_theme:{}", reflection.category),
                reflection.created_at,
            );
        }
    }

    fn push_milestone(&mut self, id: &str, reached_at: DateTime<Utc>) {
        self.growth_milestones.push(Milestone {
            id: id.to_string(),
            reached_at,
        });
    }

    /// Recompute the aggregates from scratch by replaying a log.
    pub fn replay(log: &[Reflection]) -> Self {
        let mut memory = Self::default();
        for reflection in log {
            memory.record(reflection);
        }
        memory
    }

    /// Derive the selector-facing context from the aggregates plus the
    /// recent tail of the log. `recent` is in log order (oldest first).
    pub fn context(&self, recent: &[Reflection], skips: &[SkipRecord]) -> ConversationContext {
        let window_start = recent.len().saturating_sub(RECENT_WINDOW);
        let window = &recent[window_start..];

        // Tag frequency over the recent window.
        let mut tag_counts: BTreeMap<&str, u32> = BTreeMap::new();
        let mut last_mentioned: BTreeMap<String, DateTime<Utc>> = BTreeMap::new();
        for reflection in window {
            for tag in &reflection.tags {
                *tag_counts.entry(tag.as_str()).or_insert(0) += 1;
                let slot = last_mentioned
                    .entry(tag.clone())
                    .or_insert(reflection.created_at);
                if reflection.created_at > *slot {
                    *slot = reflection.created_at;
                }
            }
        }
        let mut ranked: Vec<(&str, u32)> = tag_counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));
        let recent_topics = ranked
            .into_iter()
            .take(TOP_TOPICS)
            .map(|(tag, _)| tag.to_string())
            .collect();

        // Mode of the last few moods; Mood priority order breaks ties.
        let mood_start = recent.len().saturating_sub(MOOD_WINDOW);
        let mut mood_counts: BTreeMap<Mood, u32> = BTreeMap::new();
        for reflection in &recent[mood_start..] {
            *mood_counts.entry(reflection.mood).or_insert(0) += 1;
        }
        let best = mood_counts.values().copied().max().unwrap_or(0);
        let emotional_state = Mood::ALL
            .into_iter()
            .find(|m| best > 0 && mood_counts.get(m).copied().unwrap_or(0) == best)
            .unwrap_or(Mood::Neutral);

        // Categories engaged above the per-category average.
        let preferred_question_types = above_average_keys(&self.conversation_themes);

        // Categories among the most recent skips.
        let skip_start = skips.len().saturating_sub(SKIP_WINDOW);
        let mut avoided_topics: Vec<String> = Vec::new();
        for skip in &skips[skip_start..] {
            if !avoided_topics.contains(&skip.category) {
                avoided_topics.push(skip.category.clone());
            }
        }

        let last_tags = recent
            .last()
            .map(|r| r.tags.clone())
            .unwrap_or_default();

        ConversationContext {
            recent_topics,
            emotional_state,
            conversation_depth: self.total_count.min(MAX_DEPTH),
            preferred_question_types,
            avoided_topics,
            last_mentioned,
            last_tags,
        }
    }

    /// Optionally produce a human-readable reference to a prior
    /// reflection: the newest one with both tags and a summary.
    pub fn memory_reference(recent: &[Reflection]) -> Option<MemoryReference> {
        recent
            .iter()
            .rev()
            .find(|r| !r.tags.is_empty() && !r.summary.is_empty())
            .map(|r| MemoryReference {
                reflection_id: r.id.clone(),
                text: format!(
                    "Last time, {} came up — \"{}\"",
                    r.tags[0], r.summary
                ),
            })
    }
}

/// Keys whose count is strictly above the mean count (empty map → empty).
fn above_average_keys(counts: &BTreeMap<String, u32>) -> Vec<String> {
    if counts.is_empty() {
        return Vec::new();
    }
    let total: u32 = counts.values().sum();
    let avg = total as f64 / counts.len() as f64;
    counts
        .iter()
        .filter(|(_, c)| (**c as f64) > avg)
        .map(|(k, _)| k.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use crate::core::analyzer;
    use crate::core::reflection::Reflection;

    fn reflect(category: &str, answer: &str) -> Reflection {
        let analysis = analyzer::analyze(answer, category, &[]);
        Reflection::new("q-test", "Test question?", category, answer, analysis)
    }

    #[test]
    fn test_record_updates_aggregates() {
        let mut memory = ConversationMemory::default();
        let r = reflect("GRATITUDE & JOY", "I am so grateful and happy today");
        memory.record(&r);

        assert_eq!(memory.total_count, 1);
        assert_eq!(memory.conversation_themes.get("GRATITUDE & JOY"), Some(&1));
        assert_eq!(memory.topic_frequency.get("gratitude"), Some(&1));
        assert_eq!(memory.emotional_patterns.get(&Mood::Uplifted), Some(&1));
        assert_eq!(memory.first_at, Some(r.created_at));
        assert_eq!(memory.last_at, Some(r.created_at));
    }

    #[test]
    fn test_replay_matches_incremental_at_every_prefix() {
        let answers = [
            ("GRATITUDE & JOY", "so grateful and thankful for my family"),
            ("DAILY LIFE", "I felt scared to admit how tired I am"),
            ("GROWTH & PURPOSE", "I realized I changed and learned a lot"),
            ("DAILY LIFE", "just a plain ordinary day with nothing new"),
            ("RELATIONSHIP & HEALING", "my friend and family make me feel close"),
        ];

        let mut log = Vec::new();
        let mut incremental = ConversationMemory::default();
        for (category, answer) in answers {
            let r = reflect(category, answer);
            incremental.record(&r);
            log.push(r);
            assert_eq!(ConversationMemory::replay(&log), incremental);
        }
    }

    #[test]
    fn test_first_reflection_milestone() {
        let mut memory = ConversationMemory::default();
        memory.record(&reflect("DAILY LIFE", "an ordinary day like any other"));
        assert!(memory
            .growth_milestones
            .iter()
            .any(|m| m.id == "first_reflection"));
    }

    #[test]
    fn test_streak_milestones() {
        let base = Utc::now();
        let mut memory = ConversationMemory::default();
        for day in 0..7 {
            let mut r = reflect("DAILY LIFE", "an ordinary day like any other");
            r.created_at = base + Duration::days(day);
            memory.record(&r);
        }
        assert_eq!(memory.streak_days, 7);
        assert!(memory.growth_milestones.iter().any(|m| m.id == "streak_7"));
        assert!(!memory.growth_milestones.iter().any(|m| m.id == "streak_30"));
    }

    #[test]
    fn test_same_day_does_not_extend_streak() {
        let base = Utc::now();
        let mut memory = ConversationMemory::default();
        for _ in 0..3 {
            let mut r = reflect("DAILY LIFE", "an ordinary day like any other");
            r.created_at = base;
            memory.record(&r);
        }
        assert_eq!(memory.streak_days, 1);
        assert_eq!(memory.total_count, 3);
    }

    #[test]
    fn test_gap_resets_streak() {
        let base = Utc::now();
        let mut memory = ConversationMemory::default();
        for day in [0, 1, 3] {
            let mut r = reflect("DAILY LIFE", "an ordinary day like any other");
            r.created_at = base + Duration::days(day);
            memory.record(&r);
        }
        assert_eq!(memory.streak_days, 1);
    }

    #[test]
    fn test_new_theme_milestone() {
        let mut memory = ConversationMemory::default();
        memory.record(&reflect("DAILY LIFE", "an ordinary day like any other"));
        memory.record(&reflect("GRATITUDE & JOY", "grateful for the little things"));
        assert!(memory
            .growth_milestones
            .iter()
            .any(|m| m.id == "new_theme:GRATITUDE & JOY"));
    }

    #[test]
    fn test_context_recent_topics_ranked() {
        let mut memory = ConversationMemory::default();
        let mut log = Vec::new();
        for answer in [
            "grateful grateful grateful for everything",
            "a little scared to admit this",
            "grateful again for my friend",
        ] {
            let r = reflect("DAILY LIFE", answer);
            memory.record(&r);
            log.push(r);
        }

        let context = memory.context(&log, &[]);
        assert_eq!(context.recent_topics.first().map(String::as_str), Some("gratitude"));
        assert_eq!(context.conversation_depth, 3);
    }

    #[test]
    fn test_context_avoided_topics_from_skips() {
        let memory = ConversationMemory::default();
        let skips = vec![SkipRecord::new(
            "rh-01",
            "RELATIONSHIP & HEALING",
            SkipReason::TooPersonal,
        )];
        let context = memory.context(&[], &skips);
        assert_eq!(context.avoided_topics, vec!["RELATIONSHIP & HEALING"]);
        assert_eq!(context.emotional_state, Mood::Neutral);
    }

    #[test]
    fn test_memory_reference() {
        let log = vec![
            reflect("DAILY LIFE", "plain words without signal here"),
            reflect("GRATITUDE & JOY", "deeply grateful for my family today"),
        ];
        let reference = ConversationMemory::memory_reference(&log).unwrap();
        assert_eq!(reference.reflection_id, log[1].id);
        assert!(reference.text.contains("gratitude"));
    }

    #[test]
    fn test_memory_reference_none_without_candidates() {
        assert!(ConversationMemory::memory_reference(&[]).is_none());
    }

    #[test]
    fn test_skip_reason_parsing() {
        assert_eq!("too personal".parse::<SkipReason>().unwrap(), SkipReason::TooPersonal);
        assert_eq!("uncomfortable".parse::<SkipReason>().unwrap(), SkipReason::Uncomfortable);
        assert!("because".parse::<SkipReason>().is_err());
        assert!(SkipReason::TooPersonal.is_discomfort());
        assert!(!SkipReason::NotToday.is_discomfort());
    }
}
