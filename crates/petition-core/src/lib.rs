pub mod config;
pub mod embed;
pub mod error;
pub mod feedback;
pub mod format;
pub mod generator;
pub mod index;
pub mod input;
pub mod prompt;
pub mod retrieval;
pub mod rules;
pub mod types;
pub mod validate;
pub mod workflow;
