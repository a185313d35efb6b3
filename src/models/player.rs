// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Player model for storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A participant seen in at least one tracked activity.
///
/// Only `membership_id` is set when a player is discovered; the moderation
/// fields belong to a separate tool and are never written here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    /// Bungie membership ID (also used as document ID)
    pub membership_id: i64,
    /// Bungie global display name, e.g. `Guardian#0042`
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_banned: bool,
    #[serde(default)]
    pub ban_reason: Option<String>,
    #[serde(default)]
    pub ban_time: Option<DateTime<Utc>>,
}

impl Player {
    pub fn new(membership_id: i64) -> Self {
        Self {
            membership_id,
            display_name: None,
            is_banned: false,
            ban_reason: None,
            ban_time: None,
        }
    }
}
