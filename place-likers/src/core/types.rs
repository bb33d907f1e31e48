//! Shared deterministic types for the place-likers core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Which result tab of a place feed the likers are taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// `--place-likers-top`: posts from the "top" results.
    PlaceLikersTop,
    /// `--place-likers-recent`: posts from the "recent" results.
    PlaceLikersRecent,
}

impl Mode {
    /// Job label recorded with every interacted user.
    pub fn label(self) -> &'static str {
        match self {
            Mode::PlaceLikersTop => "place-likers-top",
            Mode::PlaceLikersRecent => "place-likers-recent",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// What happened while interacting with a single liker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionOutcome {
    /// At least one like/watch/comment landed on the profile.
    pub succeeded: bool,
    pub followed: bool,
    pub scraped: bool,
    pub commented: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_labels_match_cli_flags() {
        assert_eq!(Mode::PlaceLikersTop.to_string(), "place-likers-top");
        assert_eq!(Mode::PlaceLikersRecent.label(), "place-likers-recent");
    }

    #[test]
    fn mode_serializes_as_kebab_case() {
        let json = serde_json::to_string(&Mode::PlaceLikersRecent).expect("serialize");
        assert_eq!(json, "\"place-likers-recent\"");
    }
}
