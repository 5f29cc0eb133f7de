use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::core::{ReflectionEngine, ReflectionStore, SkipReason};

#[derive(Parser)]
#[command(name = "kokoro", about = "Reflection journaling and matching", version)]
pub struct Args {
    /// Data directory (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the next question for a user
    Question {
        #[arg(long)]
        user: String,
    },
    /// Submit an answer to a question
    Submit {
        #[arg(long)]
        user: String,
        #[arg(long)]
        question_id: String,
        #[arg(long)]
        answer: String,
    },
    /// Skip a question with a reason
    Skip {
        #[arg(long)]
        user: String,
        #[arg(long)]
        question_id: String,
        /// One of: too_personal, uncomfortable, not_today, not_interested
        #[arg(long)]
        reason: String,
    },
    /// Show the derived conversation context
    Context {
        #[arg(long)]
        user: String,
    },
    /// Show top persona traits
    Traits {
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "5")]
        top: usize,
    },
    /// Rank candidate users by compatibility
    Matches {
        #[arg(long)]
        user: String,
        /// Comma-separated candidate user ids
        #[arg(long, value_delimiter = ',')]
        candidates: Vec<String>,
    },
    /// Mark a reflection as liked (or not)
    Like {
        #[arg(long)]
        user: String,
        #[arg(long)]
        reflection_id: String,
        #[arg(long)]
        unlike: bool,
    },
}

pub fn run(args: Args) -> Result<()> {
    let config = Config::new(args.data_dir)?;
    let store = ReflectionStore::new(config.db_path())?;
    let catalog = config.catalog()?;
    let mut engine = ReflectionEngine::new(store, catalog, config.compatibility.clone())?;

    match args.command {
        Commands::Question { user } => {
            let selection = engine.next_question(&user)?;
            println!("❓ [{}] {}", selection.question.category, selection.question.text);
            println!("   id: {}", selection.question.id);
            if selection.dynamic {
                println!("   (follow-up synthesized from your recent reflections)");
            }
            if selection.pool_exhausted {
                println!("   (catalog exhausted, repeating an earlier question)");
            }
        }
        Commands::Submit { user, question_id, answer } => {
            let reflection = engine.submit_reflection(&user, &question_id, &answer)?;
            println!("📝 Recorded reflection {}", reflection.id);
            println!("   Mood: {}", reflection.mood);
            println!("   Summary: {}", reflection.summary);
            if !reflection.tags.is_empty() {
                println!("   Tags: {}", reflection.tags.join(", "));
            }
            for insight in &reflection.insights {
                println!("   💡 {}", insight);
            }
        }
        Commands::Skip { user, question_id, reason } => {
            let reason: SkipReason = reason.parse()?;
            engine.skip_question(&user, &question_id, reason)?;
            println!("⏭️  Skipped {}", question_id);
        }
        Commands::Context { user } => {
            let context = engine.conversation_context(&user)?;
            println!("📊 Conversation context for {}:", user);
            println!("   Depth: {}", context.conversation_depth);
            println!("   Emotional state: {}", context.emotional_state);
            if !context.recent_topics.is_empty() {
                println!("   Recent topics: {}", context.recent_topics.join(", "));
            }
            if !context.avoided_topics.is_empty() {
                println!("   Avoided topics: {}", context.avoided_topics.join(", "));
            }
            if let Some(reference) = engine.memory_reference(&user)? {
                println!("   🧠 {}", reference.text);
            }
        }
        Commands::Traits { user, top } => {
            let persona = engine.persona(&user)?;
            let traits = persona.top_traits(top);
            if traits.is_empty() {
                println!("No persona data for {} yet.", user);
                return Ok(());
            }
            println!("🎭 Top traits for {}:", user);
            for (name, score) in traits {
                println!("   {} — {:.1}", name, score);
            }
        }
        Commands::Matches { user, candidates } => {
            let results = engine.compatible_matches(&user, &candidates)?;
            println!("💞 Matches for {} ({}):", user, results.len());
            for result in results {
                let confidence = if result.low_confidence { " (low confidence)" } else { "" };
                println!(
                    "   {} — {:.1} [{}]{}",
                    result.user_b, result.overall_score, result.match_type, confidence
                );
                if !result.shared_tags.is_empty() {
                    println!("      shared: {}", result.shared_tags.join(", "));
                }
            }
        }
        Commands::Like { user, reflection_id, unlike } => {
            engine.set_liked(&user, &reflection_id, !unlike)?;
            println!("{} {}", if unlike { "💔" } else { "❤️" }, reflection_id);
        }
    }

    Ok(())
}
