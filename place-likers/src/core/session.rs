//! Session counters and the limit oracle that reads them.
//!
//! Counters only ever grow during a session. Every limit check is a pure read
//! of the current counts against ceilings resolved once at session start.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::types::InteractionOutcome;
use crate::core::value_range::ValueRange;

/// A tracked counter with a session-wide ceiling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LimitKind {
    Likes,
    Follows,
    Watches,
    Comments,
    SuccessfulInteractions,
    TotalInteractions,
    Scraped,
    Crashes,
}

impl LimitKind {
    pub const EVERY: [LimitKind; 8] = [
        LimitKind::Likes,
        LimitKind::Follows,
        LimitKind::Watches,
        LimitKind::Comments,
        LimitKind::SuccessfulInteractions,
        LimitKind::TotalInteractions,
        LimitKind::Scraped,
        LimitKind::Crashes,
    ];

    pub fn label(self) -> &'static str {
        match self {
            LimitKind::Likes => "likes",
            LimitKind::Follows => "follows",
            LimitKind::Watches => "watched stories",
            LimitKind::Comments => "comments",
            LimitKind::SuccessfulInteractions => "successful interactions",
            LimitKind::TotalInteractions => "total interactions",
            LimitKind::Scraped => "scraped users",
            LimitKind::Crashes => "crashes",
        }
    }
}

/// The set of counters a limit check considers jointly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitScope {
    /// Every interaction counter. Crashes are left to crash recovery.
    All,
    Only(LimitKind),
}

impl LimitScope {
    pub fn contains(self, kind: LimitKind) -> bool {
        match self {
            LimitScope::All => kind != LimitKind::Crashes,
            LimitScope::Only(only) => only == kind,
        }
    }

    fn kinds(self) -> impl Iterator<Item = LimitKind> {
        LimitKind::EVERY.into_iter().filter(move |kind| self.contains(*kind))
    }
}

/// Configured ceilings, each a count or an `N-M` range picked per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    pub likes: ValueRange,
    pub follows: ValueRange,
    pub watches: ValueRange,
    pub comments: ValueRange,
    pub successful_interactions: ValueRange,
    pub total_interactions: ValueRange,
    pub scraped: ValueRange,
    pub crashes: ValueRange,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            likes: ValueRange::Fixed(300),
            follows: ValueRange::Fixed(50),
            watches: ValueRange::Fixed(50),
            comments: ValueRange::Fixed(10),
            successful_interactions: ValueRange::Fixed(100),
            total_interactions: ValueRange::Fixed(1000),
            scraped: ValueRange::Fixed(200),
            crashes: ValueRange::Fixed(5),
        }
    }
}

impl LimitSettings {
    /// Pick the concrete ceilings for one session.
    pub fn resolve<R: Rng + ?Sized>(&self, rng: &mut R) -> Limits {
        Limits {
            likes: self.likes.resolve(rng),
            follows: self.follows.resolve(rng),
            watches: self.watches.resolve(rng),
            comments: self.comments.resolve(rng),
            successful_interactions: self.successful_interactions.resolve(rng),
            total_interactions: self.total_interactions.resolve(rng),
            scraped: self.scraped.resolve(rng),
            crashes: self.crashes.resolve(rng),
        }
    }
}

/// Ceilings resolved for the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub likes: u32,
    pub follows: u32,
    pub watches: u32,
    pub comments: u32,
    pub successful_interactions: u32,
    pub total_interactions: u32,
    pub scraped: u32,
    pub crashes: u32,
}

impl Limits {
    pub fn ceiling(&self, kind: LimitKind) -> u32 {
        match kind {
            LimitKind::Likes => self.likes,
            LimitKind::Follows => self.follows,
            LimitKind::Watches => self.watches,
            LimitKind::Comments => self.comments,
            LimitKind::SuccessfulInteractions => self.successful_interactions,
            LimitKind::TotalInteractions => self.total_interactions,
            LimitKind::Scraped => self.scraped,
            LimitKind::Crashes => self.crashes,
        }
    }
}

/// Running counts for one bot session, shared by every source it handles.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SessionState {
    pub id: String,
    pub my_username: String,
    total_likes: u32,
    total_watched: u32,
    total_comments: u32,
    total_crashes: u32,
    total_followed: BTreeMap<String, u32>,
    total_interactions: BTreeMap<String, u32>,
    successful_interactions: BTreeMap<String, u32>,
    total_scraped: BTreeMap<String, u32>,
}

impl SessionState {
    pub fn new(id: impl Into<String>, my_username: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            my_username: my_username.into(),
            ..Self::default()
        }
    }

    pub fn add_likes(&mut self, count: u32) {
        self.total_likes = self.total_likes.saturating_add(count);
    }

    pub fn add_watched(&mut self, count: u32) {
        self.total_watched = self.total_watched.saturating_add(count);
    }

    pub fn add_crash(&mut self) {
        self.total_crashes = self.total_crashes.saturating_add(1);
    }

    /// Record one finished interaction with a liker of `source`.
    pub fn add_interaction(&mut self, source: &str, outcome: InteractionOutcome) {
        bump(&mut self.total_interactions, source, 1);
        bump(&mut self.successful_interactions, source, u32::from(outcome.succeeded));
        bump(&mut self.total_followed, source, u32::from(outcome.followed));
        bump(&mut self.total_scraped, source, u32::from(outcome.scraped));
        if outcome.commented {
            self.total_comments = self.total_comments.saturating_add(1);
        }
    }

    pub fn count(&self, kind: LimitKind) -> u32 {
        match kind {
            LimitKind::Likes => self.total_likes,
            LimitKind::Follows => self.total_followed.values().sum(),
            LimitKind::Watches => self.total_watched,
            LimitKind::Comments => self.total_comments,
            LimitKind::SuccessfulInteractions => self.successful_interactions.values().sum(),
            LimitKind::TotalInteractions => self.total_interactions.values().sum(),
            LimitKind::Scraped => self.total_scraped.values().sum(),
            LimitKind::Crashes => self.total_crashes,
        }
    }

    pub fn followed_from(&self, source: &str) -> u32 {
        self.total_followed.get(source).copied().unwrap_or(0)
    }

    pub fn successful_from(&self, source: &str) -> u32 {
        self.successful_interactions.get(source).copied().unwrap_or(0)
    }

    /// Counters in `scope` whose ceiling has been reached, in declaration order.
    pub fn reached_limits(&self, limits: &Limits, scope: LimitScope) -> Vec<LimitKind> {
        scope
            .kinds()
            .filter(|kind| self.count(*kind) >= limits.ceiling(*kind))
            .collect()
    }

    /// True iff at least one ceiling in `scope` has been reached.
    pub fn check_limit(&self, limits: &Limits, scope: LimitScope) -> bool {
        scope
            .kinds()
            .any(|kind| self.count(kind) >= limits.ceiling(kind))
    }

    /// Same answer as [`check_limit`](Self::check_limit), but also logs every
    /// counter in `scope` and which ceilings were hit.
    pub fn check_limit_verbose(&self, limits: &Limits, scope: LimitScope) -> bool {
        for kind in scope.kinds() {
            let count = self.count(kind);
            let ceiling = limits.ceiling(kind);
            info!(
                limit = kind.label(),
                count,
                ceiling,
                reached = count >= ceiling,
                "session limit"
            );
        }
        let reached = self.reached_limits(limits, scope);
        if !reached.is_empty() {
            let names: Vec<&str> = reached.iter().map(|kind| kind.label()).collect();
            info!(limits = %names.join(", "), "limit reached");
        }
        !reached.is_empty()
    }
}

fn bump(counts: &mut BTreeMap<String, u32>, source: &str, by: u32) {
    let entry = counts.entry(source.to_string()).or_insert(0);
    *entry = entry.saturating_add(by);
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn limits() -> Limits {
        Limits {
            likes: 3,
            follows: 2,
            watches: 5,
            comments: 1,
            successful_interactions: 10,
            total_interactions: 20,
            scraped: 4,
            crashes: 2,
        }
    }

    fn followed() -> InteractionOutcome {
        InteractionOutcome {
            succeeded: true,
            followed: true,
            ..InteractionOutcome::default()
        }
    }

    #[test]
    fn fresh_session_reaches_no_limit() {
        let session = SessionState::new("s1", "me");
        assert!(!session.check_limit(&limits(), LimitScope::All));
        assert!(session.reached_limits(&limits(), LimitScope::All).is_empty());
    }

    #[test]
    fn any_single_ceiling_trips_all_scope() {
        let mut session = SessionState::new("s1", "me");
        session.add_likes(3);
        assert!(session.check_limit(&limits(), LimitScope::All));
        assert_eq!(
            session.reached_limits(&limits(), LimitScope::All),
            vec![LimitKind::Likes]
        );
        assert!(!session.check_limit(&limits(), LimitScope::Only(LimitKind::Follows)));
    }

    #[test]
    fn follows_sum_across_sources() {
        let mut session = SessionState::new("s1", "me");
        session.add_interaction("CafeA", followed());
        assert!(!session.check_limit(&limits(), LimitScope::All));
        session.add_interaction("CafeB", followed());
        assert_eq!(session.count(LimitKind::Follows), 2);
        assert_eq!(session.followed_from("CafeA"), 1);
        assert!(session.check_limit(&limits(), LimitScope::Only(LimitKind::Follows)));
    }

    #[test]
    fn crashes_are_outside_all_scope() {
        let mut session = SessionState::new("s1", "me");
        session.add_crash();
        session.add_crash();
        assert!(!session.check_limit(&limits(), LimitScope::All));
        assert!(session.check_limit(&limits(), LimitScope::Only(LimitKind::Crashes)));
    }

    #[test]
    fn interaction_bookkeeping_tracks_every_counter() {
        let mut session = SessionState::new("s1", "me");
        session.add_interaction(
            "CafeA",
            InteractionOutcome {
                succeeded: false,
                followed: false,
                scraped: true,
                commented: true,
            },
        );
        assert_eq!(session.count(LimitKind::TotalInteractions), 1);
        assert_eq!(session.count(LimitKind::SuccessfulInteractions), 0);
        assert_eq!(session.count(LimitKind::Scraped), 1);
        assert_eq!(session.count(LimitKind::Comments), 1);
        assert_eq!(session.successful_from("CafeA"), 0);
    }

    #[test]
    fn verbose_check_agrees_and_does_not_mutate() {
        let mut session = SessionState::new("s1", "me");
        session.add_watched(5);
        let before = session.clone();
        assert_eq!(
            session.check_limit_verbose(&limits(), LimitScope::All),
            session.check_limit(&limits(), LimitScope::All)
        );
        assert_eq!(session, before);
    }

    #[test]
    fn default_settings_resolve_to_fixed_ceilings() {
        let resolved = LimitSettings::default().resolve(&mut StdRng::seed_from_u64(0));
        assert_eq!(resolved.likes, 300);
        assert_eq!(resolved.crashes, 5);
    }
}
