//! vidsearch - multi-agent natural-language video search
//!
//! Routes each query to text/metadata, visual-similarity and temporal
//! retrieval agents, runs them concurrently with independent failure
//! isolation, and fuses their results into one ranked list.

pub mod agents;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod llm;
pub mod models;
pub mod patterns;
pub mod retrieval;
pub mod session;
pub mod storage;

pub use error::{Result, VidSearchError};
