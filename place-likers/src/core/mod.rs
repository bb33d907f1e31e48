//! Deterministic logic shared by the place-likers runner.
//!
//! Core modules never touch the filesystem, processes or the device. Anything
//! random takes an injected `rand::Rng`, so every rule here is reproducible in
//! tests with a seeded generator.

pub mod job_state;
pub mod policy;
pub mod sampling;
pub mod scroll_end;
pub mod session;
pub mod types;
pub mod value_range;
