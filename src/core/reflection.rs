use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use ulid::Ulid;

use super::analyzer::Analysis;
use super::error::CoreError;

/// Emotional tone of a single reflection.
///
/// Declaration order is the tie-break priority when keyword counts are
/// equal: a vulnerable answer wins over an uplifted one, and so on down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Vulnerable,
    Uplifted,
    Reflective,
    Stressed,
    Neutral,
}

impl Mood {
    /// All moods in tie-break priority order.
    pub const ALL: [Mood; 5] = [
        Mood::Vulnerable,
        Mood::Uplifted,
        Mood::Reflective,
        Mood::Stressed,
        Mood::Neutral,
    ];
}

impl std::fmt::Display for Mood {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mood::Vulnerable => write!(f, "vulnerable"),
            Mood::Uplifted => write!(f, "uplifted"),
            Mood::Reflective => write!(f, "reflective"),
            Mood::Stressed => write!(f, "stressed"),
            Mood::Neutral => write!(f, "neutral"),
        }
    }
}

impl FromStr for Mood {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vulnerable" => Ok(Mood::Vulnerable),
            "uplifted" => Ok(Mood::Uplifted),
            "reflective" => Ok(Mood::Reflective),
            "stressed" => Ok(Mood::Stressed),
            "neutral" => Ok(Mood::Neutral),
            other => Err(CoreError::Parse(format!("unknown mood: {}", other))),
        }
    }
}

/// One free-text answer to a prompt, plus its derived analysis.
///
/// Immutable once created, except for the user-toggleable `liked` flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reflection {
    /// Unique identifier using ULID (time-sortable)
    pub id: String,

    /// Id of the question this answers (catalog id, or `dynamic:<tag>`)
    pub question_id: String,

    /// The prompt text as presented to the user
    pub question_text: String,

    /// Category of the question
    pub category: String,

    /// The user's raw answer
    pub answer_text: String,

    /// When this reflection was created
    pub created_at: DateTime<Utc>,

    /// Classified mood of the answer
    pub mood: Mood,

    /// Short extract of the most signal-bearing sentence
    pub summary: String,

    /// Canonical topic tags, ordered by match strength
    pub tags: Vec<String>,

    /// Derived observations about the answer
    pub insights: Vec<String>,

    /// User-toggleable favorite flag
    pub liked: bool,
}

impl Reflection {
    /// Build a reflection from a question, the raw answer, and its analysis.
    pub fn new(
        question_id: &str,
        question_text: &str,
        category: &str,
        answer_text: &str,
        analysis: Analysis,
    ) -> Self {
        Self {
            id: Ulid::new().to_string(),
            question_id: question_id.to_string(),
            question_text: question_text.to_string(),
            category: category.to_string(),
            answer_text: answer_text.to_string(),
            created_at: Utc::now(),
            mood: analysis.mood,
            summary: analysis.summary,
            tags: analysis.tags,
            insights: analysis.insights,
            liked: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mood_roundtrip() {
        for mood in Mood::ALL {
            let parsed: Mood = mood.to_string().parse().unwrap();
            assert_eq!(parsed, mood);
        }
    }

    #[test]
    fn test_mood_priority_order() {
        // Declaration order doubles as tie-break priority.
        assert!(Mood::Vulnerable < Mood::Uplifted);
        assert!(Mood::Uplifted < Mood::Reflective);
        assert!(Mood::Stressed < Mood::Neutral);
    }

    #[test]
    fn test_unknown_mood() {
        assert!("ecstatic".parse::<Mood>().is_err());
    }
}
