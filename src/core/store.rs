use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;

use super::error::{CoreError, Result};
use super::memory::{ConversationMemory, SkipReason, SkipRecord};
use super::persona::PersonaTraits;
use super::reflection::{Mood, Reflection};

/// SQLite-backed persistence for reflections, skips, personas, and
/// memory snapshots.
///
/// The reflection log is the source of truth; the persona and memory
/// rows are derived snapshots kept in step by committing all three in
/// one transaction.
pub struct ReflectionStore {
    conn: Connection,
}

impl ReflectionStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        Self::init(conn)
    }

    /// In-memory store, used by tests.
    pub fn in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS reflections (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                question_id TEXT NOT NULL,
                question_text TEXT NOT NULL,
                category TEXT NOT NULL,
                answer_text TEXT NOT NULL,
                mood TEXT NOT NULL,
                summary TEXT NOT NULL,
                tags TEXT NOT NULL,
                insights TEXT NOT NULL,
                liked INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reflections_user
             ON reflections(user_id, created_at)",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS skips (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                question_id TEXT NOT NULL,
                category TEXT NOT NULL,
                reason TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS personas (
                user_id TEXT PRIMARY KEY,
                traits TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS memories (
                user_id TEXT PRIMARY KEY,
                snapshot TEXT NOT NULL
            )",
            [],
        )?;

        Ok(Self { conn })
    }

    /// Append a reflection and its derived persona and memory snapshots
    /// in a single transaction. All-or-nothing: a failure leaves no
    /// partially updated aggregates.
    pub fn commit_reflection(
        &mut self,
        user_id: &str,
        reflection: &Reflection,
        memory: &ConversationMemory,
        persona: &PersonaTraits,
    ) -> Result<()> {
        let tags = serde_json::to_string(&reflection.tags)?;
        let insights = serde_json::to_string(&reflection.insights)?;
        let memory_json = serde_json::to_string(memory)?;
        let persona_json = serde_json::to_string(persona)?;

        let tx = self.conn.transaction()?;
        tx.execute(
            "INSERT INTO reflections (id, user_id, question_id, question_text, category,
                 answer_text, mood, summary, tags, insights, liked, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            params![
                &reflection.id,
                user_id,
                &reflection.question_id,
                &reflection.question_text,
                &reflection.category,
                &reflection.answer_text,
                reflection.mood.to_string(),
                &reflection.summary,
                tags,
                insights,
                reflection.liked as i64,
                reflection.created_at.to_rfc3339(),
            ],
        )?;
        tx.execute(
            "INSERT INTO memories (user_id, snapshot) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET snapshot = excluded.snapshot",
            params![user_id, memory_json],
        )?;
        tx.execute(
            "INSERT INTO personas (user_id, traits) VALUES (?1, ?2)
             ON CONFLICT(user_id) DO UPDATE SET traits = excluded.traits",
            params![user_id, persona_json],
        )?;
        tx.commit()?;

        Ok(())
    }

    /// A user's full reflection log, oldest first.
    pub fn list_reflections(&self, user_id: &str) -> Result<Vec<Reflection>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, question_id, question_text, category, answer_text,
                    mood, summary, tags, insights, liked, created_at
             FROM reflections WHERE user_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let reflections = stmt
            .query_map(params![user_id], row_to_reflection)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(reflections)
    }

    /// Question ids the user has answered.
    pub fn answered_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT question_id FROM reflections WHERE user_id = ?1")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    /// Every (question id, asked at) event for a user — answers and
    /// skips — in log order. Feeds the LRU fallback.
    pub fn asked_log(&self, user_id: &str) -> Result<Vec<(String, DateTime<Utc>)>> {
        let mut stmt = self.conn.prepare(
            "SELECT question_id, created_at FROM reflections WHERE user_id = ?1
             UNION ALL
             SELECT question_id, created_at FROM skips WHERE user_id = ?1
             ORDER BY created_at ASC",
        )?;

        let log = stmt
            .query_map(params![user_id], |row| {
                let question_id: String = row.get(0)?;
                let created_at: String = row.get(1)?;
                Ok((question_id, parse_timestamp(1, &created_at)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(log)
    }

    /// Record a skip event.
    pub fn record_skip(&self, user_id: &str, skip: &SkipRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO skips (id, user_id, question_id, category, reason, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                &skip.id,
                user_id,
                &skip.question_id,
                &skip.category,
                skip.reason.to_string(),
                skip.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// A user's skip events, oldest first.
    pub fn list_skips(&self, user_id: &str) -> Result<Vec<SkipRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, question_id, category, reason, created_at
             FROM skips WHERE user_id = ?1
             ORDER BY created_at ASC, id ASC",
        )?;

        let skips = stmt
            .query_map(params![user_id], |row| {
                let reason: String = row.get(3)?;
                let created_at: String = row.get(4)?;
                Ok(SkipRecord {
                    id: row.get(0)?,
                    question_id: row.get(1)?,
                    category: row.get(2)?,
                    reason: SkipReason::from_str(&reason).map_err(|e| {
                        rusqlite::Error::FromSqlConversionFailure(
                            3,
                            rusqlite::types::Type::Text,
                            Box::new(std::io::Error::new(
                                std::io::ErrorKind::InvalidData,
                                e.to_string(),
                            )),
                        )
                    })?,
                    created_at: parse_timestamp(4, &created_at)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(skips)
    }

    /// Toggle the liked flag on a reflection. The only mutation a
    /// reflection permits after creation.
    pub fn set_liked(&self, user_id: &str, reflection_id: &str, liked: bool) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE reflections SET liked = ?1 WHERE id = ?2 AND user_id = ?3",
            params![liked as i64, reflection_id, user_id],
        )?;
        if rows == 0 {
            return Err(CoreError::NotFound(format!(
                "reflection {} for user {}",
                reflection_id, user_id
            )));
        }
        Ok(())
    }

    /// Load a user's memory snapshot, if any.
    pub fn load_memory(&self, user_id: &str) -> Result<Option<ConversationMemory>> {
        self.load_json("SELECT snapshot FROM memories WHERE user_id = ?1", user_id)
    }

    /// Load a user's persona, if any.
    pub fn load_persona(&self, user_id: &str) -> Result<Option<PersonaTraits>> {
        self.load_json("SELECT traits FROM personas WHERE user_id = ?1", user_id)
    }

    fn load_json<T: serde::de::DeserializeOwned>(
        &self,
        sql: &str,
        user_id: &str,
    ) -> Result<Option<T>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query_map(params![user_id], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(json) => Ok(Some(serde_json::from_str(&json?)?)),
            None => Ok(None),
        }
    }

    /// Whether any data exists for a user (reflections or skips).
    pub fn user_exists(&self, user_id: &str) -> Result<bool> {
        let count: usize = self.conn.query_row(
            "SELECT (SELECT COUNT(*) FROM reflections WHERE user_id = ?1)
                  + (SELECT COUNT(*) FROM skips WHERE user_id = ?1)",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Count a user's reflections.
    pub fn reflection_count(&self, user_id: &str) -> Result<usize> {
        let count: usize = self.conn.query_row(
            "SELECT COUNT(*) FROM reflections WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

fn row_to_reflection(row: &Row) -> rusqlite::Result<Reflection> {
    let mood: String = row.get(5)?;
    let tags: String = row.get(7)?;
    let insights: String = row.get(8)?;
    let liked: i64 = row.get(9)?;
    let created_at: String = row.get(10)?;

    Ok(Reflection {
        id: row.get(0)?,
        question_id: row.get(1)?,
        question_text: row.get(2)?,
        category: row.get(3)?,
        answer_text: row.get(4)?,
        mood: Mood::from_str(&mood).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                5,
                rusqlite::types::Type::Text,
                Box::new(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())),
            )
        })?,
        summary: row.get(6)?,
        tags: parse_json_column(7, &tags)?,
        insights: parse_json_column(8, &insights)?,
        liked: liked != 0,
        created_at: parse_timestamp(10, &created_at)?,
    })
}

fn parse_timestamp(column: usize, value: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(
                column,
                rusqlite::types::Type::Text,
                Box::new(e),
            )
        })
}

fn parse_json_column<T: serde::de::DeserializeOwned>(
    column: usize,
    value: &str,
) -> rusqlite::Result<T> {
    serde_json::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            column,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::analyzer;
    use crate::core::memory::SkipReason;

    fn create_test_store() -> ReflectionStore {
        ReflectionStore::in_memory().unwrap()
    }

    fn reflect(category: &str, answer: &str) -> Reflection {
        let analysis = analyzer::analyze(answer, category, &[]);
        Reflection::new("q-test", "Test question?", category, answer, analysis)
    }

    fn commit(store: &mut ReflectionStore, user: &str, reflection: &Reflection) {
        let log = store.list_reflections(user).unwrap();
        let mut full: Vec<Reflection> = log;
        full.push(reflection.clone());
        let memory = ConversationMemory::replay(&full);
        let persona = PersonaTraits::replay(&full);
        store
            .commit_reflection(user, reflection, &memory, &persona)
            .unwrap();
    }

    #[test]
    fn test_commit_and_list_roundtrip() {
        let mut store = create_test_store();
        let r = reflect("GRATITUDE & JOY", "so grateful and thankful for today");
        commit(&mut store, "alice", &r);

        let log = store.list_reflections("alice").unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].id, r.id);
        assert_eq!(log[0].mood, r.mood);
        assert_eq!(log[0].tags, r.tags);
        assert_eq!(log[0].insights, r.insights);
        assert!(!log[0].liked);
    }

    #[test]
    fn test_snapshots_match_replay_after_commits() {
        let mut store = create_test_store();
        for answer in [
            "so grateful and thankful today",
            "scared to admit how worried I am",
            "I realized how much I changed",
        ] {
            let r = reflect("DAILY LIFE", answer);
            commit(&mut store, "alice", &r);

            let log = store.list_reflections("alice").unwrap();
            let memory = store.load_memory("alice").unwrap().unwrap();
            let persona = store.load_persona("alice").unwrap().unwrap();
            assert_eq!(memory, ConversationMemory::replay(&log));
            assert_eq!(persona, PersonaTraits::replay(&log));
        }
    }

    #[test]
    fn test_answered_ids() {
        let mut store = create_test_store();
        commit(&mut store, "alice", &reflect("DAILY LIFE", "an ordinary day today"));
        let ids = store.answered_ids("alice").unwrap();
        assert!(ids.contains("q-test"));
        assert!(store.answered_ids("bob").unwrap().is_empty());
    }

    #[test]
    fn test_skips_roundtrip() {
        let store = create_test_store();
        let skip = SkipRecord::new("rh-01", "RELATIONSHIP & HEALING", SkipReason::TooPersonal);
        store.record_skip("alice", &skip).unwrap();

        let skips = store.list_skips("alice").unwrap();
        assert_eq!(skips.len(), 1);
        assert_eq!(skips[0].question_id, "rh-01");
        assert_eq!(skips[0].reason, SkipReason::TooPersonal);
    }

    #[test]
    fn test_asked_log_merges_answers_and_skips() {
        let mut store = create_test_store();
        commit(&mut store, "alice", &reflect("DAILY LIFE", "an ordinary day today"));
        store
            .record_skip(
                "alice",
                &SkipRecord::new("rh-01", "RELATIONSHIP & HEALING", SkipReason::NotToday),
            )
            .unwrap();

        let log = store.asked_log("alice").unwrap();
        assert_eq!(log.len(), 2);
    }

    #[test]
    fn test_set_liked() {
        let mut store = create_test_store();
        let r = reflect("DAILY LIFE", "an ordinary day today");
        commit(&mut store, "alice", &r);

        store.set_liked("alice", &r.id, true).unwrap();
        let log = store.list_reflections("alice").unwrap();
        assert!(log[0].liked);

        assert!(store.set_liked("alice", "missing", true).is_err());
        assert!(store.set_liked("bob", &r.id, true).is_err());
    }

    #[test]
    fn test_user_exists() {
        let mut store = create_test_store();
        assert!(!store.user_exists("alice").unwrap());
        commit(&mut store, "alice", &reflect("DAILY LIFE", "an ordinary day today"));
        assert!(store.user_exists("alice").unwrap());
    }

    #[test]
    fn test_logs_are_isolated_per_user() {
        let mut store = create_test_store();
        commit(&mut store, "alice", &reflect("DAILY LIFE", "an ordinary day today"));
        commit(&mut store, "bob", &reflect("GRATITUDE & JOY", "grateful for my friend"));

        assert_eq!(store.reflection_count("alice").unwrap(), 1);
        assert_eq!(store.reflection_count("bob").unwrap(), 1);
        let alice = store.list_reflections("alice").unwrap();
        assert_eq!(alice[0].category, "DAILY LIFE");
    }
}
