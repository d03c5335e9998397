//! Versemap - Semantic search over the Bible
//!
//! Ranks every verse or curated passage against a free-text query using
//! 8-bit quantized embeddings, narrows the ranking to the selected books,
//! and reports where the matches sit on the verse sphere. A small chat layer
//! lets a language model discuss the results or a chapter being read.

pub mod assets;
pub mod chat;
pub mod cli;
pub mod config;
pub mod corpus;
pub mod embedding;
pub mod error;
pub mod retrieval;
pub mod session;

pub use error::{Result, VersemapError};
