use serde::{Deserialize, Serialize};

use super::lexicon::{self, LEXICON, MAX_TAGS};
use super::reflection::Mood;

/// Minimum word count before mood classification is attempted.
const MIN_WORDS: usize = 3;

/// Maximum summary length in characters.
const MAX_SUMMARY_CHARS: usize = 160;

/// Word budget for the fallback summary.
const FALLBACK_SUMMARY_WORDS: usize = 20;

/// Output of analyzing one free-text answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analysis {
    pub mood: Mood,
    pub summary: String,
    pub tags: Vec<String>,
    pub insights: Vec<String>,
    pub follow_up_question: String,
}

/// Classify one answer into mood, summary, tags, insights, and a
/// follow-up question.
///
/// This is a total function: malformed or sparse input degrades to the
/// neutral default instead of erroring.
pub fn analyze(answer_text: &str, category: &str, recent_themes: &[String]) -> Analysis {
    let words = tokenize(answer_text);

    // Per-lexicon-entry hit counts, in table order.
    let hits: Vec<(usize, u32)> = LEXICON
        .iter()
        .enumerate()
        .map(|(i, entry)| {
            let count = words
                .iter()
                .filter(|w| entry.keywords.contains(&w.as_str()))
                .count() as u32;
            (i, count)
        })
        .collect();

    let mood = if words.len() < MIN_WORDS {
        Mood::Neutral
    } else {
        classify_mood(&hits)
    };

    let tags = extract_tags(&hits);
    let summary = summarize(answer_text, &words);
    let insights = derive_insights(mood, &tags, recent_themes);
    let follow_up_question = build_follow_up(mood, category, &tags);

    Analysis {
        mood,
        summary,
        tags,
        insights,
        follow_up_question,
    }
}

/// Lowercased alphanumeric tokens of the answer.
fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Arg-max of per-mood hit counts; ties broken by `Mood` priority order.
fn classify_mood(hits: &[(usize, u32)]) -> Mood {
    let mut mood_counts: Vec<(Mood, u32)> = Mood::ALL.iter().map(|m| (*m, 0)).collect();
    for (i, count) in hits {
        let mood = LEXICON[*i].mood;
        if let Some(slot) = mood_counts.iter_mut().find(|(m, _)| *m == mood) {
            slot.1 += count;
        }
    }

    let best = mood_counts.iter().map(|(_, c)| *c).max().unwrap_or(0);
    if best == 0 {
        return Mood::Neutral;
    }

    // Mood::ALL is priority-ordered, so the first max wins ties.
    mood_counts
        .iter()
        .find(|(_, c)| *c == best)
        .map(|(m, _)| *m)
        .unwrap_or(Mood::Neutral)
}

/// Canonical tags for every lexicon category with at least one hit,
/// capped at MAX_TAGS, ordered by hit count descending (table order as
/// the tie-break).
fn extract_tags(hits: &[(usize, u32)]) -> Vec<String> {
    let mut tagged: Vec<(usize, u32)> = hits.iter().filter(|(_, c)| *c > 0).copied().collect();
    tagged.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
    tagged
        .into_iter()
        .take(MAX_TAGS)
        .map(|(i, _)| LEXICON[i].tag.to_string())
        .collect()
}

/// The sentence with the most matched keywords, truncated to the summary
/// budget; falls back to the first ~20 words when no sentence scores.
fn summarize(answer_text: &str, words: &[String]) -> String {
    let matched: Vec<&String> = words
        .iter()
        .filter(|w| LEXICON.iter().any(|e| e.keywords.contains(&w.as_str())))
        .collect();

    let mut best: Option<(usize, &str)> = None;
    for sentence in split_sentences(answer_text) {
        let sentence_words = tokenize(sentence);
        let score = sentence_words
            .iter()
            .filter(|w| matched.iter().any(|m| *m == *w))
            .count();
        if score > 0 && best.map(|(s, _)| score > s).unwrap_or(true) {
            best = Some((score, sentence));
        }
    }

    match best {
        Some((_, sentence)) => truncate(sentence.trim(), MAX_SUMMARY_CHARS),
        None => {
            let text_words: Vec<&str> = answer_text.split_whitespace().collect();
            let head = text_words
                .iter()
                .take(FALLBACK_SUMMARY_WORDS)
                .copied()
                .collect::<Vec<_>>()
                .join(" ");
            if text_words.len() > FALLBACK_SUMMARY_WORDS {
                truncate(&format!("{}…", head), MAX_SUMMARY_CHARS)
            } else {
                truncate(&head, MAX_SUMMARY_CHARS)
            }
        }
    }
}

fn split_sentences(text: &str) -> Vec<&str> {
    text.split_inclusive(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(1)).collect();
    format!("{}…", cut.trim_end())
}

/// Short derived observations, capped at three.
fn derive_insights(mood: Mood, tags: &[String], recent_themes: &[String]) -> Vec<String> {
    let mut insights = Vec::new();

    if mood == Mood::Vulnerable {
        insights.push("Opened up about something difficult".to_string());
    }

    if let Some(top) = tags.first() {
        if recent_themes.iter().any(|t| t == top) {
            insights.push(format!("Returned to a recurring theme: {}", top));
        }
    }

    if tags.len() >= 3 {
        insights.push("Touched on several themes in one answer".to_string());
    }

    insights.truncate(3);
    insights
}

fn build_follow_up(mood: Mood, category: &str, tags: &[String]) -> String {
    let template = lexicon::follow_up_template(mood, category);
    let tag = tags.first().map(String::as_str).unwrap_or("that");
    template.replace("{tag}", tag)
}
