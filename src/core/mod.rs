//! Parsers, the block executor and the collaborator seams.

pub mod directive;
pub mod executor;
pub mod generation;
pub mod grammar;
pub mod knowledge;
pub mod loader;
pub mod pipeline;
pub mod placeholder;
pub mod retrieval;
pub mod roles;
pub mod store;
