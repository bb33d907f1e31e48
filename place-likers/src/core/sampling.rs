//! Source selection: pick the place list for the invoked mode, then sample it.

use anyhow::{Result, bail};
use rand::Rng;
use rand::seq::SliceRandom;

use crate::core::types::Mode;
use crate::core::value_range::ValueRange;

/// Return the configured places for `mode`.
///
/// An empty list is a configuration error: nothing may touch the device when
/// the operator forgot to name any place.
pub fn sources_for_mode<'a>(
    mode: Mode,
    top: &'a [String],
    recent: &'a [String],
) -> Result<&'a [String]> {
    let sources = match mode {
        Mode::PlaceLikersTop => top,
        Mode::PlaceLikersRecent => recent,
    };
    if sources.iter().all(|source| source.trim().is_empty()) {
        bail!("no places configured for {mode} (pass --{mode} or set it in the config)");
    }
    Ok(sources)
}

/// Sample the working source list.
///
/// `truncate` resolves to the number of sources to keep. `None` or `0` keeps
/// every source in shuffled order; otherwise that many distinct sources are
/// picked in random order. Blank entries are dropped.
pub fn sample_sources<R: Rng + ?Sized>(
    sources: &[String],
    truncate: Option<ValueRange>,
    rng: &mut R,
) -> Vec<String> {
    let candidates: Vec<String> = sources
        .iter()
        .map(|source| source.trim())
        .filter(|source| !source.is_empty())
        .map(str::to_string)
        .collect();
    let keep = truncate
        .map_or(0, |value| value.resolve(rng) as usize)
        .min(candidates.len());

    if keep == 0 {
        let mut all = candidates;
        all.shuffle(rng);
        return all;
    }
    candidates.choose_multiple(rng, keep).cloned().collect()
}
