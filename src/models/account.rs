// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Tracked accounts and the roster built from them.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Steam, the platform every tracked account plays on.
const DEFAULT_MEMBERSHIP_TYPE: i32 = 3;

/// Activity mode filter applied to a tracked account's history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityMode {
    Raid,
    Dungeon,
}

impl ActivityMode {
    /// Bungie `DestinyActivityModeType` value.
    pub fn mode_id(self) -> i32 {
        match self {
            ActivityMode::Raid => 4,
            ActivityMode::Dungeon => 82,
        }
    }

    pub fn from_mode_id(id: i32) -> Option<Self> {
        match id {
            4 => Some(ActivityMode::Raid),
            82 => Some(ActivityMode::Dungeon),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActivityMode::Raid => "raid",
            ActivityMode::Dungeon => "dungeon",
        }
    }

    /// Link to the community report site for one activity instance.
    pub fn report_url(self, instance_id: i64) -> String {
        format!("https://{}.report/pgcr/{}", self.as_str(), instance_id)
    }
}

/// An operator account whose activity history is crawled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedAccount {
    pub membership_id: i64,
    #[serde(default = "default_membership_type")]
    pub membership_type: i32,
    /// Short numeric tag shown in notifications
    pub descriptor: u16,
    pub mode: ActivityMode,
    /// Whether the account belongs to the subscriber roster category
    #[serde(default)]
    pub roster: bool,
}

fn default_membership_type() -> i32 {
    DEFAULT_MEMBERSHIP_TYPE
}

impl TrackedAccount {
    /// Descriptor as displayed, always four digits.
    pub fn display_descriptor(&self) -> String {
        format!("{:04}", self.descriptor)
    }
}

/// Load tracked accounts from a JSON array on disk.
pub fn load_accounts(path: impl AsRef<Path>) -> Result<Vec<TrackedAccount>, ConfigError> {
    let path = path.as_ref();
    let err = |reason: String| ConfigError::Accounts {
        path: path.display().to_string(),
        reason,
    };

    let raw = std::fs::read_to_string(path).map_err(|e| err(e.to_string()))?;
    serde_json::from_str(&raw).map_err(|e| err(e.to_string()))
}

/// Accounts excluded from flagging.
pub trait Roster: Send + Sync {
    fn contains(&self, membership_id: i64) -> bool;
}

impl<F> Roster for F
where
    F: Fn(i64) -> bool + Send + Sync,
{
    fn contains(&self, membership_id: i64) -> bool {
        self(membership_id)
    }
}

/// Fixed roster of membership IDs.
#[derive(Debug, Clone, Default)]
pub struct RosterList {
    ids: HashSet<i64>,
}

impl RosterList {
    pub fn new(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            ids: ids.into_iter().collect(),
        }
    }

    /// Every configured account is part of the roster.
    pub fn from_accounts(accounts: &[TrackedAccount]) -> Self {
        Self::new(accounts.iter().map(|a| a.membership_id))
    }
}

impl Roster for RosterList {
    fn contains(&self, membership_id: i64) -> bool {
        self.ids.contains(&membership_id)
    }
}
