//! Domain models for SkillSwap.
//!
//! These are the core types shared across all crates.

pub mod account;
pub mod dispute;
pub mod session;
