pub mod config;
pub mod freshness;
pub mod grammar;
pub mod loader;
pub mod random;
pub mod rewriter;
pub mod rules;
pub mod symbols;
pub mod variables;
