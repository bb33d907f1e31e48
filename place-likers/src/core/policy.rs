//! Per-source interaction policy and the follow-limit predicate.
//!
//! The policy is built once per source and reused unchanged by every attempt
//! at that source. Its callbacks take the session explicitly; the policy never
//! owns session state.

use std::path::PathBuf;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::core::session::{LimitKind, LimitScope, Limits, SessionState};
use crate::core::types::{InteractionOutcome, Mode};
use crate::core::value_range::{ValueRange, resolve_or};

pub const DEFAULT_STORIES_PERCENTAGE: u32 = 40;
pub const DEFAULT_FOLLOW_PERCENTAGE: u32 = 40;
pub const DEFAULT_COMMENT_PERCENTAGE: u32 = 0;
pub const DEFAULT_INTERACT_PERCENTAGE: u32 = 40;
pub const DEFAULT_INTERACTIONS_COUNT: u32 = 70;

/// Interaction knobs as configured (`[interaction]` table).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicySettings {
    /// Posts to like per interacted profile.
    pub likes_count: ValueRange,
    /// Stories to watch per interacted profile. `0` disables story watching.
    pub stories_count: ValueRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stories_percentage: Option<ValueRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_percentage: Option<ValueRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_percentage: Option<ValueRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interact_percentage: Option<ValueRange>,
    /// Successful interactions per source before moving on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interactions_count: Option<ValueRange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_filter: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scrape_to_file: Option<PathBuf>,
    pub end_conditions: EndConditions,
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            likes_count: ValueRange::Between { min: 1, max: 2 },
            stories_count: ValueRange::Between { min: 1, max: 2 },
            stories_percentage: None,
            follow_percentage: None,
            comment_percentage: None,
            interact_percentage: None,
            interactions_count: None,
            profile_filter: None,
            scrape_to_file: None,
            end_conditions: EndConditions::default(),
        }
    }
}

impl PolicySettings {
    /// Percent values that are configured above 100.
    pub fn invalid_percentages(&self) -> Vec<&'static str> {
        [
            ("stories_percentage", self.stories_percentage),
            ("follow_percentage", self.follow_percentage),
            ("comment_percentage", self.comment_percentage),
            ("interact_percentage", self.interact_percentage),
        ]
        .into_iter()
        .filter(|(_, value)| value.is_some_and(|value| value.upper_bound() > 100))
        .map(|(name, _)| name)
        .collect()
    }
}

/// Limits that should end the current source as soon as an interaction hits them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndConditions {
    pub end_if_likes_limit_reached: bool,
    pub end_if_follows_limit_reached: bool,
    pub end_if_watches_limit_reached: bool,
    pub end_if_comments_limit_reached: bool,
}

impl EndConditions {
    fn kinds(self) -> impl Iterator<Item = LimitKind> {
        [
            (self.end_if_likes_limit_reached, LimitKind::Likes),
            (self.end_if_follows_limit_reached, LimitKind::Follows),
            (self.end_if_watches_limit_reached, LimitKind::Watches),
            (self.end_if_comments_limit_reached, LimitKind::Comments),
        ]
        .into_iter()
        .filter_map(|(enabled, kind)| enabled.then_some(kind))
    }
}

/// Immutable interaction parameters for every liker of one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InteractionPolicy {
    pub source: String,
    pub my_username: String,
    pub mode: Mode,
    pub likes_count: ValueRange,
    pub stories_count: ValueRange,
    pub stories_percentage: u32,
    pub follow_percentage: u32,
    pub comment_percentage: u32,
    pub interact_percentage: u32,
    pub interactions_limit: u32,
    pub profile_filter: Option<PathBuf>,
    pub scrape_to_file: Option<PathBuf>,
    pub end_conditions: EndConditions,
}

/// Resolve the interaction policy for `source`.
///
/// Fixed values never consume randomness, so identical settings and an
/// identically seeded `rng` always produce an identical policy.
pub fn build_interaction_policy<R: Rng + ?Sized>(
    source: &str,
    mode: Mode,
    my_username: &str,
    settings: &PolicySettings,
    rng: &mut R,
) -> InteractionPolicy {
    let stories_percentage = if settings.stories_count.is_zero() {
        0
    } else {
        resolve_or(settings.stories_percentage, DEFAULT_STORIES_PERCENTAGE, rng)
    };
    let follow_percentage = resolve_or(settings.follow_percentage, DEFAULT_FOLLOW_PERCENTAGE, rng);
    let comment_percentage =
        resolve_or(settings.comment_percentage, DEFAULT_COMMENT_PERCENTAGE, rng);
    let interact_percentage =
        resolve_or(settings.interact_percentage, DEFAULT_INTERACT_PERCENTAGE, rng);
    let interactions_limit =
        resolve_or(settings.interactions_count, DEFAULT_INTERACTIONS_COUNT, rng);

    InteractionPolicy {
        source: source.to_string(),
        my_username: my_username.to_string(),
        mode,
        likes_count: settings.likes_count,
        stories_count: settings.stories_count,
        stories_percentage,
        follow_percentage,
        comment_percentage,
        interact_percentage,
        interactions_limit,
        profile_filter: settings.profile_filter.clone(),
        scrape_to_file: settings.scrape_to_file.clone(),
        end_conditions: settings.end_conditions,
    }
}

impl InteractionPolicy {
    pub fn on_like(&self, session: &mut SessionState, count: u32) {
        session.add_likes(count);
    }

    pub fn on_watch(&self, session: &mut SessionState, count: u32) {
        session.add_watched(count);
    }

    /// Record an interaction with a liker of this source.
    ///
    /// Returns whether enumeration of the source may continue.
    pub fn on_interaction(
        &self,
        session: &mut SessionState,
        limits: &Limits,
        outcome: InteractionOutcome,
    ) -> bool {
        session.add_interaction(&self.source, outcome);
        let hit_end_condition = self
            .end_conditions
            .kinds()
            .any(|kind| session.check_limit(limits, LimitScope::Only(kind)));
        let source_exhausted = session.successful_from(&self.source) >= self.interactions_limit;
        !(hit_end_condition || source_exhausted)
    }
}

/// Whether following should stop for one source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FollowLimit {
    pub ceiling: Option<u32>,
    pub source: String,
}

impl FollowLimit {
    pub fn for_source(ceiling: Option<u32>, source: &str) -> Self {
        Self {
            ceiling,
            source: source.to_string(),
        }
    }

    /// No ceiling means following never stops on account of this source.
    pub fn is_reached(&self, session: &SessionState) -> bool {
        self.ceiling
            .is_some_and(|ceiling| session.followed_from(&self.source) >= ceiling)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn limits() -> Limits {
        Limits {
            likes: 2,
            follows: 10,
            watches: 10,
            comments: 10,
            successful_interactions: 100,
            total_interactions: 100,
            scraped: 100,
            crashes: 5,
        }
    }

    fn success() -> InteractionOutcome {
        InteractionOutcome {
            succeeded: true,
            ..InteractionOutcome::default()
        }
    }

    #[test]
    fn defaults_apply_when_unset() {
        let policy = build_interaction_policy(
            "CafeA",
            Mode::PlaceLikersTop,
            "me",
            &PolicySettings::default(),
            &mut StdRng::seed_from_u64(0),
        );
        assert_eq!(policy.stories_percentage, 40);
        assert_eq!(policy.follow_percentage, 40);
        assert_eq!(policy.comment_percentage, 0);
        assert_eq!(policy.interact_percentage, 40);
        assert_eq!(policy.interactions_limit, 70);
        assert_eq!(policy.source, "CafeA");
        assert_eq!(policy.mode, Mode::PlaceLikersTop);
    }

    #[test]
    fn zero_stories_count_disables_story_percentage() {
        let settings = PolicySettings {
            stories_count: ValueRange::Fixed(0),
            stories_percentage: Some(ValueRange::Fixed(90)),
            ..PolicySettings::default()
        };
        let policy = build_interaction_policy(
            "CafeA",
            Mode::PlaceLikersRecent,
            "me",
            &settings,
            &mut StdRng::seed_from_u64(0),
        );
        assert_eq!(policy.stories_percentage, 0);
    }

    #[test]
    fn builder_is_idempotent_for_same_inputs() {
        let settings = PolicySettings {
            follow_percentage: Some(ValueRange::Between { min: 10, max: 90 }),
            interact_percentage: Some(ValueRange::Between { min: 20, max: 60 }),
            interactions_count: Some(ValueRange::Between { min: 5, max: 50 }),
            ..PolicySettings::default()
        };
        let first = build_interaction_policy(
            "CafeA",
            Mode::PlaceLikersTop,
            "me",
            &settings,
            &mut StdRng::seed_from_u64(99),
        );
        let second = build_interaction_policy(
            "CafeA",
            Mode::PlaceLikersTop,
            "me",
            &settings,
            &mut StdRng::seed_from_u64(99),
        );
        assert_eq!(first, second);
    }

    #[test]
    fn on_interaction_stops_at_source_ceiling() {
        let settings = PolicySettings {
            interactions_count: Some(ValueRange::Fixed(2)),
            ..PolicySettings::default()
        };
        let policy = build_interaction_policy(
            "CafeA",
            Mode::PlaceLikersTop,
            "me",
            &settings,
            &mut StdRng::seed_from_u64(0),
        );
        let mut session = SessionState::new("s", "me");
        assert!(policy.on_interaction(&mut session, &limits(), success()));
        assert!(!policy.on_interaction(&mut session, &limits(), success()));
        assert_eq!(session.successful_from("CafeA"), 2);
    }

    #[test]
    fn end_condition_stops_when_its_limit_is_hit() {
        let settings = PolicySettings {
            end_conditions: EndConditions {
                end_if_likes_limit_reached: true,
                ..EndConditions::default()
            },
            ..PolicySettings::default()
        };
        let policy = build_interaction_policy(
            "CafeA",
            Mode::PlaceLikersTop,
            "me",
            &settings,
            &mut StdRng::seed_from_u64(0),
        );
        let mut session = SessionState::new("s", "me");
        policy.on_like(&mut session, 1);
        assert!(policy.on_interaction(&mut session, &limits(), success()));
        policy.on_like(&mut session, 1);
        assert!(!policy.on_interaction(&mut session, &limits(), success()));
    }

    #[test]
    fn follow_limit_is_per_source() {
        let mut session = SessionState::new("s", "me");
        let outcome = InteractionOutcome {
            succeeded: true,
            followed: true,
            ..InteractionOutcome::default()
        };
        session.add_interaction("CafeA", outcome);
        session.add_interaction("CafeA", outcome);

        assert!(FollowLimit::for_source(Some(2), "CafeA").is_reached(&session));
        assert!(!FollowLimit::for_source(Some(2), "CafeB").is_reached(&session));
        assert!(!FollowLimit::for_source(None, "CafeA").is_reached(&session));
    }

    #[test]
    fn percentages_above_hundred_are_reported() {
        let settings = PolicySettings {
            follow_percentage: Some(ValueRange::Between { min: 50, max: 120 }),
            ..PolicySettings::default()
        };
        assert_eq!(settings.invalid_percentages(), vec!["follow_percentage"]);
    }
}
