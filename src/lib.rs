//! Nimrod — random text from line-oriented template grammars.
//!
//! Definition files bind symbol names to candidate templates. Templates
//! embed directives (symbol expansion, weighted branches, variables) that
//! are rewritten pass by pass until the text stops changing.

pub mod core;

pub use crate::core::config::GrammarConfig;
pub use crate::core::grammar::{Bindings, Grammar, GrammarError};
pub use crate::core::random::{RandomSource, SequenceRandom, StdRandom};
