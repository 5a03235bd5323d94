//! SkillSwap Core — domain models, repository abstractions, and the
//! session lifecycle state machine.
//!
//! This crate is pure: it defines what a legal booking looks like and
//! which ledger movement must accompany each transition, but performs
//! no I/O. Persistence lives in `skillswap-db`, orchestration in
//! `skillswap-booking`.

pub mod error;
pub mod lifecycle;
pub mod models;
pub mod repository;

pub use error::{SwapError, SwapResult};
