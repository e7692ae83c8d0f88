//! # text2sql
//!
//! Convert natural-language requests into SQL statements with a locally
//! hosted language model, optionally refined by a remote service.
//!
//! ## Overview
//!
//! The crate wires a handful of small components into one deterministic
//! pipeline:
//!
//! - `prompt` - Few-shot prompt construction around a fixed schema
//! - `generator` - Local causal-LM inference with Candle (greedy decoding)
//! - `extract` - Draft isolation and Markdown fence stripping
//! - `refine` - Optional remote correction pass, strictly fail-open
//! - `pipeline` - Orchestration and the `convert` entry point
//! - `model` - Model download, device selection, and tokenization
//! - `cli` - Command-line interface
//!
//! Offline generation always produces a result; remote refinement is an
//! enhancement gated on a credential in the environment and never turns a
//! working conversion into a failure.

pub mod cli;
pub mod extract;
pub mod generator;
pub mod model;
pub mod pipeline;
pub mod prompt;
pub mod refine;

// Re-export commonly used types
pub use anyhow::{Error, Result};
pub use pipeline::{Conversion, Pipeline, PipelineBuilder};
