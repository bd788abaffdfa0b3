//! Coach domain
//!
//! The persona directory, the per-turn context assembler, and session-notes
//! generation.

pub mod assembler;
pub mod notes;
pub mod personas;

pub use assembler::{ActionItem, Assembler, RespondOutcome, RespondRequest, TurnMeta};
pub use notes::{CoachingInsight, NotesGenerator, NotesReport, NotesRequest};
pub use personas::{persona_for, Persona};
