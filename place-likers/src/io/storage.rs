//! Per-account storage under `<storage_dir>/<username>/`.
//!
//! - `interacted_users.json`: every profile the bot interacted with.
//! - `whitelist.txt` / `blacklist.txt`: one username per line, read-only here,
//!   handed to the driver with every attempt.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeDelta};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const INTERACTED_USERS_FILE: &str = "interacted_users.json";
pub const WHITELIST_FILE: &str = "whitelist.txt";
pub const BLACKLIST_FILE: &str = "blacklist.txt";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";
const RECENT_INTERACTION_DAYS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowingStatus {
    None,
    Followed,
    Unfollowed,
    Scraped,
}

/// Stored record for one interacted profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractedUser {
    pub last_interaction: String,
    pub following_status: FollowingStatus,
    /// Only the latest session, job and target are kept.
    pub session_id: String,
    pub job_name: Option<String>,
    pub target: Option<String>,
    pub liked: u32,
    pub watched: u32,
    pub commented: u32,
    pub followed: bool,
    pub unfollowed: bool,
    pub scraped: bool,
}

/// One interaction to merge into storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionRecord<'a> {
    pub session_id: &'a str,
    pub job_name: Option<&'a str>,
    pub target: Option<&'a str>,
    pub followed: bool,
    pub unfollowed: bool,
    pub scraped: bool,
    pub liked: u32,
    pub watched: u32,
    pub commented: u32,
}

#[derive(Debug, Clone)]
pub struct Storage {
    dir: PathBuf,
    interacted_users: BTreeMap<String, InteractedUser>,
    whitelist: Vec<String>,
    blacklist: Vec<String>,
}

impl Storage {
    /// Open (creating if needed) the storage directory for `username`.
    pub fn open(storage_dir: &Path, username: &str) -> Result<Self> {
        let dir = storage_dir.join(username);
        fs::create_dir_all(&dir).with_context(|| format!("create storage {}", dir.display()))?;

        let users_path = dir.join(INTERACTED_USERS_FILE);
        let interacted_users = if users_path.exists() {
            let contents = fs::read_to_string(&users_path)
                .with_context(|| format!("read {}", users_path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("parse {} (please check the file)", users_path.display()))?
        } else {
            BTreeMap::new()
        };
        let whitelist = read_user_list(&dir.join(WHITELIST_FILE))?;
        let blacklist = read_user_list(&dir.join(BLACKLIST_FILE))?;
        debug!(
            dir = %dir.display(),
            interacted = interacted_users.len(),
            whitelist = whitelist.len(),
            blacklist = blacklist.len(),
            "storage opened"
        );

        Ok(Self {
            dir,
            interacted_users,
            whitelist,
            blacklist,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn user(&self, username: &str) -> Option<&InteractedUser> {
        self.interacted_users.get(username)
    }

    /// Interacted with within the last three days of `now`.
    pub fn check_user_was_interacted_recently(&self, username: &str, now: NaiveDateTime) -> bool {
        self.interacted_users
            .get(username)
            .and_then(|user| {
                NaiveDateTime::parse_from_str(&user.last_interaction, TIMESTAMP_FORMAT).ok()
            })
            .is_some_and(|last| now - last <= TimeDelta::days(RECENT_INTERACTION_DAYS))
    }

    /// Usernames interacted with within the last three days of `now`.
    pub fn recently_interacted(&self, now: NaiveDateTime) -> Vec<&str> {
        self.interacted_users
            .keys()
            .filter(|username| self.check_user_was_interacted_recently(username, now))
            .map(String::as_str)
            .collect()
    }

    pub fn whitelist(&self) -> &[String] {
        &self.whitelist
    }

    pub fn blacklist(&self) -> &[String] {
        &self.blacklist
    }

    /// Merge `record` into the stored entry for `username` and persist.
    pub fn add_interacted_user(
        &mut self,
        username: &str,
        record: &InteractionRecord<'_>,
    ) -> Result<()> {
        self.add_interacted_user_at(username, record, Local::now().naive_local())
    }

    pub fn add_interacted_user_at(
        &mut self,
        username: &str,
        record: &InteractionRecord<'_>,
        now: NaiveDateTime,
    ) -> Result<()> {
        let following_status = if record.followed {
            FollowingStatus::Followed
        } else if record.unfollowed {
            FollowingStatus::Unfollowed
        } else if record.scraped {
            FollowingStatus::Scraped
        } else {
            FollowingStatus::None
        };
        let last_interaction = now.format(TIMESTAMP_FORMAT).to_string();

        let user = self
            .interacted_users
            .entry(username.to_string())
            .and_modify(|user| {
                user.liked = user.liked.saturating_add(record.liked);
                user.watched = user.watched.saturating_add(record.watched);
                user.commented = user.commented.saturating_add(record.commented);
            })
            .or_insert_with(|| InteractedUser {
                last_interaction: String::new(),
                following_status,
                session_id: String::new(),
                job_name: None,
                target: None,
                liked: record.liked,
                watched: record.watched,
                commented: record.commented,
                followed: false,
                unfollowed: false,
                scraped: false,
            });
        user.last_interaction = last_interaction;
        user.following_status = following_status;
        user.session_id = record.session_id.to_string();
        user.job_name = record.job_name.map(str::to_string);
        user.target = record.target.map(str::to_string);
        user.followed = record.followed;
        user.unfollowed = record.unfollowed;
        user.scraped = record.scraped;

        self.save()
    }

    fn save(&self) -> Result<()> {
        let path = self.dir.join(INTERACTED_USERS_FILE);
        let mut buf = serde_json::to_string_pretty(&self.interacted_users)
            .context("serialize interacted users")?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, buf).with_context(|| format!("write {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path).with_context(|| format!("replace {}", path.display()))?;
        Ok(())
    }
}

fn read_user_list(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(contents
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect())
}
