//! Place-likers session runner.
//!
//! Interacts with the users who liked posts from configured places, one place
//! at a time, until every place is handled or a session limit is reached.
//!
//! - **[`core`]**: Pure, deterministic rules (sampling, limits, interaction
//!   policy, scroll thresholds, the per-source retry state machine).
//! - **[`io`]**: Config, storage, crash reports and the external device driver.
//!
//! [`job`] runs one place with recovery and retries; [`looping`] runs the
//! sampled places in order.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod job;
pub mod logging;
pub mod looping;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
