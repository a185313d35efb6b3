// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Activity history model for storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One activity occurrence observed in a tracked account's history.
///
/// `(membership_id, instance_id)` is unique across the store. Records are
/// written once by the crawler and never updated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRecord {
    /// Tracked account that played the activity
    pub membership_id: i64,
    /// Bungie activity instance ID
    pub instance_id: i64,
    /// Activity definition hash
    pub activity_hash: u32,
    /// Start of the activity, truncated to whole seconds
    pub time: DateTime<Utc>,
    /// Whether the activity was played through to its objective
    pub is_completed: bool,
}

impl ActivityRecord {
    /// Document ID in the `activities` collection.
    pub fn document_id(&self) -> String {
        document_id(self.membership_id, self.instance_id)
    }
}

/// Build the store key for an activity record.
pub fn document_id(membership_id: i64, instance_id: i64) -> String {
    format!("{}_{}", membership_id, instance_id)
}
