// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod account;
pub mod activity;
pub mod player;
pub mod report;

pub use account::{load_accounts, ActivityMode, Roster, RosterList, TrackedAccount};
pub use activity::ActivityRecord;
pub use player::Player;
pub use report::{ActivityOccurrence, Clan, DetailReport, ReportEntry, WeaponUsage};
