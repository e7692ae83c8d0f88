//! Few-shot prompt construction
//!
//! Builds the fixed schema-and-examples prompt around a user request. The
//! generator continues after the trailing output marker; extraction later
//! searches for the same marker, so both sides share its definition here.

pub mod builder;
pub mod template;

pub use builder::PromptBuilder;
pub use template::{OUTPUT_MARKER, SQL_FEW_SHOT_TEMPLATE};
