//! Thresholds handed to the likers-list scroller.
//!
//! The scroller stops when the same end-of-list page repeats `repeats_to_end`
//! times, when consecutive skipped likers exceed `skipped_list_limit`, or when
//! `skipped_fling_limit` fling gestures made no progress.

use rand::Rng;
use serde::Serialize;

use crate::core::value_range::{ValueRange, resolve_or};

pub const REPEATS_TO_END: u32 = 2;
pub const DEFAULT_SKIPPED_LIST_LIMIT: u32 = 15;
pub const DEFAULT_SKIPPED_FLING_LIMIT: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScrollEndConfig {
    pub repeats_to_end: u32,
    pub skipped_list_limit: u32,
    pub skipped_fling_limit: u32,
}

impl ScrollEndConfig {
    pub fn resolve<R: Rng + ?Sized>(
        skipped_list_limit: Option<ValueRange>,
        fling_when_skipped: Option<ValueRange>,
        rng: &mut R,
    ) -> Self {
        Self {
            repeats_to_end: REPEATS_TO_END,
            skipped_list_limit: resolve_or(skipped_list_limit, DEFAULT_SKIPPED_LIST_LIMIT, rng),
            skipped_fling_limit: resolve_or(fling_when_skipped, DEFAULT_SKIPPED_FLING_LIMIT, rng),
        }
    }
}
