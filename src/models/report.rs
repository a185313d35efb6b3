// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Transient views of remote activity data.
//!
//! These are what the pipeline works with after the API client has
//! unwrapped Bungie's response shapes. None of them are persisted.

use crate::models::ActivityMode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry of an account's activity history page.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityOccurrence {
    pub instance_id: i64,
    pub activity_hash: u32,
    pub period: DateTime<Utc>,
    /// `completed` stat display value ("Yes" / "No")
    pub completed: String,
    /// `completionReason` stat display value
    pub completion_reason: String,
}

impl ActivityOccurrence {
    /// A run only counts as completed when the objective was finished.
    pub fn is_completed(&self) -> bool {
        self.completed == "Yes" && self.completion_reason == "Objective Completed"
    }
}

/// Post game carnage report for one activity instance.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailReport {
    pub instance_id: i64,
    pub activity_hash: u32,
    pub mode: Option<ActivityMode>,
    pub period: DateTime<Utc>,
    pub entries: Vec<ReportEntry>,
}

impl DetailReport {
    /// Distinct participant membership IDs, in report order.
    pub fn participant_ids(&self) -> Vec<i64> {
        let mut seen = std::collections::HashSet::new();
        self.entries
            .iter()
            .map(|e| e.membership_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }
}

/// One participant's line in a detail report.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEntry {
    pub membership_id: i64,
    pub membership_type: i32,
    /// Display name as embedded in the report, if any
    pub display_name: Option<String>,
    pub kills: f64,
    pub deaths: f64,
    /// `completed` stat display value
    pub completed: String,
    pub weapons: Vec<WeaponUsage>,
}

impl ReportEntry {
    /// Weapon with the most unique kills, first one wins on ties.
    pub fn most_used_weapon(&self) -> Option<&WeaponUsage> {
        self.weapons.iter().fold(None, |best, w| match best {
            Some(b) if b.unique_kills >= w.unique_kills => Some(b),
            _ => Some(w),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeaponUsage {
    pub item_hash: u32,
    pub unique_kills: f64,
}

/// Clan a player belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clan {
    pub group_id: i64,
    pub name: String,
    pub call_sign: String,
}
