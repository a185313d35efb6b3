// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - business logic layer.

pub mod bungie;
pub mod crawler;
pub mod discovery;
pub mod flagger;
pub mod notify;
pub mod readiness;

pub use bungie::{ActivitySource, BungieClient};
pub use crawler::{ActivityCrawler, CrawlSummary};
pub use discovery::{DiscoverySummary, ParticipantDiscovery};
pub use flagger::{FlagReport, FlaggedParticipant, ThresholdFlagger};
pub use notify::{DiscordWebhook, NoopSink, Notification, NotificationSink};
pub use readiness::ReadinessGate;
