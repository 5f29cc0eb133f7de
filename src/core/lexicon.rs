//! Data-driven classification tables.
//!
//! All keyword matching, tag labeling, trait deltas, and follow-up
//! templates live here so the lexicon can be extended without touching
//! the analyzer's control flow.

use super::reflection::Mood;

/// One row of the lexicon: a canonical tag, the mood it signals, the
/// keywords that trigger it, and the persona traits it feeds.
pub struct LexiconEntry {
    pub tag: &'static str,
    pub mood: Mood,
    pub keywords: &'static [&'static str],
    pub trait_deltas: &'static [(&'static str, f64)],
}

/// Maximum number of distinct tags kept per reflection.
pub const MAX_TAGS: usize = 5;

pub const LEXICON: &[LexiconEntry] = &[
    LexiconEntry {
        tag: "vulnerability",
        mood: Mood::Vulnerable,
        keywords: &[
            "scared", "afraid", "admit", "relieved", "ashamed", "nervous",
            "confess", "exposed", "insecure", "fragile", "honest",
        ],
        trait_deltas: &[("openness", 1.0), ("courage", 1.0)],
    },
    LexiconEntry {
        tag: "gratitude",
        mood: Mood::Uplifted,
        keywords: &["grateful", "thankful", "appreciate", "blessed", "lucky", "gratitude"],
        trait_deltas: &[("warmth", 1.0), ("optimism", 1.0)],
    },
    LexiconEntry {
        tag: "joy",
        mood: Mood::Uplifted,
        keywords: &["happy", "joy", "excited", "delighted", "smile", "laugh", "laughed", "fun"],
        trait_deltas: &[("optimism", 1.0), ("energy", 1.0)],
    },
    LexiconEntry {
        tag: "connection",
        mood: Mood::Uplifted,
        keywords: &["friend", "friends", "family", "together", "love", "partner", "belong", "close"],
        trait_deltas: &[("warmth", 1.0), ("empathy", 1.0)],
    },
    LexiconEntry {
        tag: "growth",
        mood: Mood::Reflective,
        keywords: &["learned", "realize", "realized", "understand", "change", "changed", "grow", "progress", "improve"],
        trait_deltas: &[("curiosity", 1.0), ("self_awareness", 1.0)],
    },
    LexiconEntry {
        tag: "introspection",
        mood: Mood::Reflective,
        keywords: &["think", "thinking", "wonder", "remember", "question", "meaning", "reflect", "why"],
        trait_deltas: &[("self_awareness", 1.0), ("depth", 1.0)],
    },
    LexiconEntry {
        tag: "stress",
        mood: Mood::Stressed,
        keywords: &["stressed", "overwhelmed", "pressure", "deadline", "exhausted", "tired", "busy"],
        trait_deltas: &[("resilience", 1.0), ("sensitivity", 1.0)],
    },
    LexiconEntry {
        tag: "anxiety",
        mood: Mood::Stressed,
        keywords: &["worried", "worry", "anxious", "anxiety", "uneasy", "dread", "panic"],
        trait_deltas: &[("sensitivity", 1.0)],
    },
    LexiconEntry {
        tag: "adventure",
        mood: Mood::Uplifted,
        keywords: &["travel", "adventure", "explore", "discover", "trip", "wander"],
        trait_deltas: &[("curiosity", 1.0), ("energy", 1.0)],
    },
    LexiconEntry {
        tag: "creativity",
        mood: Mood::Reflective,
        keywords: &["create", "creating", "art", "music", "write", "writing", "imagine", "idea"],
        trait_deltas: &[("creativity", 1.0), ("curiosity", 1.0)],
    },
];

/// Traits nudged by the overall mood of a reflection, on top of the
/// per-tag deltas.
pub fn mood_trait_deltas(mood: Mood) -> &'static [(&'static str, f64)] {
    match mood {
        Mood::Vulnerable => &[("openness", 1.0)],
        Mood::Uplifted => &[("optimism", 1.0)],
        Mood::Reflective => &[("self_awareness", 1.0)],
        Mood::Stressed => &[("sensitivity", 1.0)],
        Mood::Neutral => &[],
    }
}

/// Look up a lexicon entry by its canonical tag.
pub fn entry_for_tag(tag: &str) -> Option<&'static LexiconEntry> {
    LEXICON.iter().find(|e| e.tag == tag)
}

/// Follow-up template for a (mood, category) pair. `{tag}` is replaced
/// with the reflection's top tag.
pub fn follow_up_template(mood: Mood, category: &str) -> &'static str {
    match (mood, category) {
        (Mood::Vulnerable, "RELATIONSHIP & HEALING") => {
            "Thank you for sharing that. What would feeling safe around {tag} look like?"
        }
        (Mood::Vulnerable, _) => {
            "That took courage to write. What makes {tag} hard to talk about?"
        }
        (Mood::Uplifted, "GRATITUDE & JOY") => {
            "It sounds like {tag} really lifts you. How could you invite more of it in?"
        }
        (Mood::Uplifted, _) => "What is it about {tag} that energizes you?",
        (Mood::Reflective, "GROWTH & PURPOSE") => {
            "You've clearly been sitting with {tag}. What changed your view of it?"
        }
        (Mood::Reflective, _) => "When did you first start noticing {tag} in your life?",
        (Mood::Stressed, _) => {
            "That sounds heavy. What's one small thing that eases the {tag}?"
        }
        (Mood::Neutral, _) => "Is there more you'd like to say about that?",
    }
}

/// Text of a dynamically synthesized follow-up question for a tag.
pub fn dynamic_question_text(tag: &str) -> String {
    format!(
        "You've mentioned {} a few times lately. What role does it play in who you're becoming?",
        tag
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_unique() {
        for (i, a) in LEXICON.iter().enumerate() {
            for b in &LEXICON[i + 1..] {
                assert_ne!(a.tag, b.tag);
            }
        }
    }

    #[test]
    fn test_keywords_are_lowercase() {
        for entry in LEXICON {
            for keyword in entry.keywords {
                assert_eq!(*keyword, keyword.to_lowercase());
            }
        }
    }

    #[test]
    fn test_entry_lookup() {
        assert!(entry_for_tag("gratitude").is_some());
        assert!(entry_for_tag("nonexistent").is_none());
    }

    #[test]
    fn test_templates_interpolate() {
        let template = follow_up_template(Mood::Uplifted, "GRATITUDE & JOY");
        assert!(template.contains("{tag}"));
    }
}
