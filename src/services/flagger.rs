// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-activity threshold flagging.
//!
//! Handles the workflow for one stored activity:
//! 1. Fetch the detail report
//! 2. Skip roster accounts, record unseen participants as players
//! 3. Flag participants at or over the kill/death thresholds
//! 4. Enrich flagged participants (name, clan, most used weapon), best effort
//! 5. Post a notification summarizing the activity

use crate::config::Thresholds;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{
    ActivityRecord, Clan, DetailReport, Player, ReportEntry, Roster, TrackedAccount,
};
use crate::services::bungie::ActivitySource;
use crate::services::notify::{send_best_effort, Notification, NotificationSink, COLOR_BLUE};
use crate::services::readiness::ReadinessGate;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

const JOB_NAME: &str = "process_activity";

const PLAYER_PROFILE_URL: &str = "https://b.moons.bio";
const CLAN_PROFILE_URL: &str = "https://www.bungie.net/7/en/Clan/Profile";

/// Flags outlier participants of single activities.
#[derive(Clone)]
pub struct ThresholdFlagger {
    source: Arc<dyn ActivitySource>,
    store: Arc<dyn Store>,
    gate: Arc<ReadinessGate>,
    sink: Arc<dyn NotificationSink>,
    roster: Arc<dyn Roster>,
    thresholds: Thresholds,
}

/// A participant that crossed a threshold, with whatever enrichment resolved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlaggedParticipant {
    pub membership_id: i64,
    /// Resolved Bungie name, else the report's name, else the membership ID
    pub display_name: String,
    pub kills: f64,
    pub deaths: f64,
    pub completed: String,
    pub clan: Option<Clan>,
    pub weapon: Option<String>,
}

/// Result of flagging one activity.
#[derive(Debug, Clone, Serialize)]
pub struct FlagReport {
    pub instance_id: i64,
    pub activity_name: String,
    pub players_created: usize,
    pub flagged: Vec<FlaggedParticipant>,
    pub notification: Notification,
}

/// The flag predicate: reaching either threshold flags the participant.
pub fn exceeds_thresholds(kills: f64, deaths: f64, thresholds: &Thresholds) -> bool {
    kills >= thresholds.kills || deaths >= thresholds.deaths
}

impl ThresholdFlagger {
    pub fn new(
        source: Arc<dyn ActivitySource>,
        store: Arc<dyn Store>,
        gate: Arc<ReadinessGate>,
        sink: Arc<dyn NotificationSink>,
        roster: Arc<dyn Roster>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            source,
            store,
            gate,
            sink,
            roster,
            thresholds,
        }
    }

    /// Flag one activity observed by `account` and post the notification.
    ///
    /// Fails if the detail report cannot be fetched or a player cannot be
    /// stored. Enrichment and delivery failures never fail the call.
    pub async fn process(
        &self,
        activity: &ActivityRecord,
        account: &TrackedAccount,
        cancel: &CancellationToken,
    ) -> Result<FlagReport> {
        self.gate.wait_for_metadata(JOB_NAME, cancel).await?;

        let report = self.source.get_detail_report(activity.instance_id).await?;

        let activity_name = match self.source.resolve_activity(report.activity_hash).await {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(
                    activity_hash = report.activity_hash,
                    error = %e,
                    "Failed to resolve activity name"
                );
                report.activity_hash.to_string()
            }
        };

        tracing::info!(
            instance_id = activity.instance_id,
            activity = %activity_name,
            period = %crate::time_utils::format_utc_rfc3339(report.period),
            "Processing activity"
        );

        let mut players_created = 0;
        let mut flagged = Vec::new();

        for entry in &report.entries {
            if self.roster.contains(entry.membership_id) {
                continue;
            }

            if self.ensure_player(entry.membership_id).await? {
                players_created += 1;
            }

            if !exceeds_thresholds(entry.kills, entry.deaths, &self.thresholds) {
                continue;
            }

            flagged.push(self.enrich(entry).await);
        }

        let notification = build_notification(account, &activity_name, &report, &flagged);
        send_best_effort(self.sink.as_ref(), &notification).await;

        tracing::info!(
            instance_id = activity.instance_id,
            players_created,
            flagged = flagged.len(),
            "Activity processed"
        );

        Ok(FlagReport {
            instance_id: activity.instance_id,
            activity_name,
            players_created,
            flagged,
            notification,
        })
    }

    /// Create the player row if missing. Returns whether it was created here.
    async fn ensure_player(&self, membership_id: i64) -> Result<bool> {
        if self.store.get_player(membership_id).await?.is_some() {
            return Ok(false);
        }

        match self.store.insert_players(&[Player::new(membership_id)]).await {
            Ok(()) => {
                tracing::info!(membership_id, "Added new player");
                Ok(true)
            }
            // Discovery may have written the same player in the meantime.
            Err(AppError::Database(msg)) => {
                if self.store.player_exists(membership_id).await? {
                    Ok(false)
                } else {
                    Err(AppError::Database(msg))
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Resolve optional details for a flagged participant.
    ///
    /// Each lookup that fails is logged and left out.
    async fn enrich(&self, entry: &ReportEntry) -> FlaggedParticipant {
        let membership_id = entry.membership_id;

        let weapon_lookup = async {
            let weapon = entry.most_used_weapon()?;
            match self.source.resolve_item(weapon.item_hash).await {
                Ok(name) => Some(name),
                Err(e) => {
                    tracing::warn!(
                        membership_id,
                        item_hash = weapon.item_hash,
                        error = %e,
                        "Weapon lookup failed"
                    );
                    None
                }
            }
        };

        let (identity, clans, weapon) = tokio::join!(
            self.source.resolve_identity(membership_id),
            self.source.resolve_clans(entry.membership_type, membership_id),
            weapon_lookup,
        );

        let display_name = identity.unwrap_or_else(|e| {
            tracing::warn!(membership_id, error = %e, "Identity lookup failed");
            entry
                .display_name
                .clone()
                .unwrap_or_else(|| membership_id.to_string())
        });

        let clan = match clans {
            Ok(clans) => clans.into_iter().next(),
            Err(e) => {
                tracing::warn!(membership_id, error = %e, "Clan lookup failed");
                None
            }
        };

        FlaggedParticipant {
            membership_id,
            display_name,
            kills: entry.kills,
            deaths: entry.deaths,
            completed: entry.completed.clone(),
            clan,
            weapon,
        }
    }
}

/// Build the notification for one processed activity.
pub fn build_notification(
    account: &TrackedAccount,
    activity_name: &str,
    report: &DetailReport,
    flagged: &[FlaggedParticipant],
) -> Notification {
    let mut notification = Notification::new("New PGCR found", COLOR_BLUE)
        .inline_field("Account", account.display_descriptor())
        .inline_field("Activity", activity_name);

    notification.url = report.mode.map(|m| m.report_url(report.instance_id));
    notification.timestamp = Some(report.period);
    notification.footer = Some("Waterfall".to_string());

    notification.description = if flagged.is_empty() {
        "**No offending users found**".to_string()
    } else {
        let blocks: Vec<String> = flagged.iter().map(format_participant).collect();
        format!("**Offending Users**\n{}", blocks.join("\n"))
    };

    notification
}

/// One participant's block in the notification body.
pub fn format_participant(p: &FlaggedParticipant) -> String {
    let mut block = format!(
        "[{}]({}/{}) (**K**: {}, **D**: {}, **F**: {})\n",
        p.display_name,
        PLAYER_PROFILE_URL,
        p.membership_id,
        format_stat(p.kills),
        format_stat(p.deaths),
        p.completed
    );

    if let Some(clan) = &p.clan {
        block.push_str(&format!(
            "> **C**: [{}]({}/{}) [{}]\n",
            clan.name, CLAN_PROFILE_URL, clan.group_id, clan.call_sign
        ));
    }

    if let Some(weapon) = &p.weapon {
        block.push_str(&format!("> **W**: {}\n", weapon));
    }

    block
}

/// Stats arrive as floats but are whole numbers in practice.
fn format_stat(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_boundaries() {
        let t = Thresholds::default();
        assert!(exceeds_thresholds(10.0, 0.0, &t));
        assert!(exceeds_thresholds(0.0, 10.0, &t));
        assert!(!exceeds_thresholds(9.0, 9.0, &t));
        assert!(exceeds_thresholds(25.0, 12.0, &t));
    }

    #[test]
    fn test_format_participant_with_all_lines() {
        let p = FlaggedParticipant {
            membership_id: 4611686018400000001,
            display_name: "Guardian#0042".to_string(),
            kills: 12.0,
            deaths: 3.0,
            completed: "Yes".to_string(),
            clan: Some(Clan {
                group_id: 881267,
                name: "Moons".to_string(),
                call_sign: "MOON".to_string(),
            }),
            weapon: Some("Vex Mythoclast".to_string()),
        };

        assert_eq!(
            format_participant(&p),
            "[Guardian#0042](https://b.moons.bio/4611686018400000001) (**K**: 12, **D**: 3, **F**: Yes)\n\
             > **C**: [Moons](https://www.bungie.net/7/en/Clan/Profile/881267) [MOON]\n\
             > **W**: Vex Mythoclast\n"
        );
    }

    #[test]
    fn test_format_participant_without_optionals() {
        let p = FlaggedParticipant {
            membership_id: 7,
            display_name: "7".to_string(),
            kills: 0.0,
            deaths: 10.5,
            completed: "No".to_string(),
            clan: None,
            weapon: None,
        };
        assert_eq!(
            format_participant(&p),
            "[7](https://b.moons.bio/7) (**K**: 0, **D**: 10.5, **F**: No)\n"
        );
    }
}
