pub mod analyzer;
pub mod catalog;
pub mod compat;
pub mod engine;
pub mod error;
pub mod lexicon;
pub mod memory;
pub mod persona;
pub mod reflection;
pub mod selector;
pub mod store;

pub use analyzer::Analysis;
pub use catalog::{CatalogEntry, EmotionalDepth, QuestionCatalog};
pub use compat::{CompatibilityConfig, CompatibilityResult, MatchType, UserSnapshot};
pub use engine::ReflectionEngine;
pub use error::{CoreError, Result};
pub use memory::{ConversationContext, ConversationMemory, MemoryReference, SkipReason, SkipRecord};
pub use persona::PersonaTraits;
pub use reflection::{Mood, Reflection};
pub use selector::{DepthTier, Phase, Selection};
pub use store::ReflectionStore;
