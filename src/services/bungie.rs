// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bungie API client for activity history and carnage reports.
//!
//! Handles:
//! - Character lookup and paginated activity history
//! - Post game carnage reports (detail reports)
//! - Identity, clan and manifest definition lookups
//! - Error classification (transient vs. unusable payload)
//!
//! The jobs only see the [`ActivitySource`] trait; throttling retries are
//! left to the next scheduled run.

use crate::config::{Config, PAGE_SIZE};
use crate::error::{AppError, Result};
use crate::models::{
    ActivityMode, ActivityOccurrence, Clan, DetailReport, ReportEntry, TrackedAccount,
    WeaponUsage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Deserializer};
use std::collections::HashMap;
use std::sync::Arc;

/// Remote activity history capability.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Load the metadata later lookups depend on; returns its version.
    async fn load_metadata(&self) -> Result<String>;

    /// Character IDs of an account, in the order the API returns them.
    async fn list_characters(&self, account: &TrackedAccount) -> Result<Vec<i64>>;

    /// One page of a character's activity history, newest first.
    async fn get_activity_page(
        &self,
        account: &TrackedAccount,
        character_id: i64,
        mode: ActivityMode,
        page: u32,
    ) -> Result<Vec<ActivityOccurrence>>;

    async fn get_detail_report(&self, instance_id: i64) -> Result<DetailReport>;

    /// Bungie global display name of a membership, e.g. `Guardian#0042`.
    async fn resolve_identity(&self, membership_id: i64) -> Result<String>;

    async fn resolve_clans(&self, membership_type: i32, membership_id: i64) -> Result<Vec<Clan>>;

    async fn resolve_item(&self, item_hash: u32) -> Result<String>;

    async fn resolve_activity(&self, activity_hash: u32) -> Result<String>;
}

/// `ErrorCode` value for a successful platform call.
const BUNGIE_SUCCESS: i32 = 1;

/// Platform error codes that mean "try again later".
const THROTTLE_ERROR_CODES: &[i32] = &[
    5,  // SystemDisabled (maintenance)
    35, // ThrottleLimitExceededMinutes
    36, // ThrottleLimitExceededMomentarily
    37, // ThrottleLimitExceededSeconds
    51, // DestinyThrottledByGameServer
];

/// Bungie platform API client.
#[derive(Clone)]
pub struct BungieClient {
    http: reqwest::Client,
    base_url: String,
    stats_base_url: String,
    api_key: String,
    /// Definition display names keyed by (definition type, hash).
    definition_names: Arc<DashMap<(&'static str, u32), String>>,
}

impl BungieClient {
    pub fn new(api_key: String, base_url: String, stats_base_url: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            stats_base_url: stats_base_url.trim_end_matches('/').to_string(),
            api_key,
            definition_names: Arc::new(DashMap::new()),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.bungie_api_key.clone(),
            config.bungie_base_url.clone(),
            config.bungie_stats_base_url.clone(),
        )
    }

    /// Look up a manifest definition's display name, caching hits.
    async fn definition_name(&self, definition: &'static str, hash: u32) -> Result<String> {
        if let Some(name) = self.definition_names.get(&(definition, hash)) {
            return Ok(name.clone());
        }

        let url = format!("{}/Destiny2/Manifest/{}/{}/", self.base_url, definition, hash);
        let def: DefinitionResponse = self.get_json(&url, &[]).await?;
        let name = def.display_properties.name;

        if name.is_empty() {
            return Err(AppError::RemoteData(format!(
                "{} {} has no display name",
                definition, hash
            )));
        }

        self.definition_names
            .insert((definition, hash), name.clone());
        Ok(name)
    }

    /// Generic GET request returning the unwrapped `Response` field.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let response = self
            .http
            .get(url)
            .header("X-API-Key", &self.api_key)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::Remote(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// Check HTTP status and the platform envelope, then return its payload.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T> {
        let status = response.status();

        if status.as_u16() == 429 {
            tracing::warn!("Bungie rate limit hit (429)");
            return Err(AppError::Remote(AppError::REMOTE_RATE_LIMIT.to_string()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::Remote(format!("Failed to read body: {}", e)))?;

        // Platform errors come back as JSON envelopes, sometimes with a 5xx.
        let envelope: Envelope<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(AppError::Remote(format!("HTTP {}: {}", status, body)));
            }
            Err(e) => return Err(AppError::RemoteData(format!("JSON parse error: {}", e))),
        };

        if envelope.error_code != BUNGIE_SUCCESS {
            if THROTTLE_ERROR_CODES.contains(&envelope.error_code) {
                tracing::warn!(
                    error_status = %envelope.error_status,
                    "Bungie API throttled request"
                );
                return Err(AppError::Remote(AppError::REMOTE_RATE_LIMIT.to_string()));
            }
            let message = format!(
                "{} ({}): {}",
                envelope.error_status, envelope.error_code, envelope.message
            );
            return Err(if status.is_server_error() {
                AppError::Remote(message)
            } else {
                AppError::RemoteData(message)
            });
        }

        envelope
            .response
            .ok_or_else(|| AppError::RemoteData("Response field missing".to_string()))
    }
}

#[async_trait]
impl ActivitySource for BungieClient {
    async fn load_metadata(&self) -> Result<String> {
        let url = format!("{}/Destiny2/Manifest/", self.base_url);
        let manifest: ManifestResponse = self.get_json(&url, &[]).await?;
        Ok(manifest.version)
    }

    async fn list_characters(&self, account: &TrackedAccount) -> Result<Vec<i64>> {
        let url = format!(
            "{}/Destiny2/{}/Account/{}/Stats/",
            self.base_url, account.membership_type, account.membership_id
        );
        let stats: AccountStatsResponse = self.get_json(&url, &[]).await?;

        Ok(stats
            .characters
            .into_iter()
            .map(|c| c.character_id)
            .collect())
    }

    async fn get_activity_page(
        &self,
        account: &TrackedAccount,
        character_id: i64,
        mode: ActivityMode,
        page: u32,
    ) -> Result<Vec<ActivityOccurrence>> {
        let url = format!(
            "{}/Destiny2/{}/Account/{}/Character/{}/Stats/Activities/",
            self.base_url, account.membership_type, account.membership_id, character_id
        );
        let history: ActivityHistoryResponse = self
            .get_json(
                &url,
                &[
                    ("count", PAGE_SIZE.to_string()),
                    ("mode", mode.mode_id().to_string()),
                    ("page", page.to_string()),
                ],
            )
            .await?;

        history
            .activities
            .into_iter()
            .map(|a| {
                Ok(ActivityOccurrence {
                    instance_id: a.activity_details.instance_id,
                    activity_hash: a.activity_details.reference_id,
                    period: parse_period(&a.period)?,
                    completed: display_value(&a.values, "completed"),
                    completion_reason: display_value(&a.values, "completionReason"),
                })
            })
            .collect()
    }

    async fn get_detail_report(&self, instance_id: i64) -> Result<DetailReport> {
        let url = format!(
            "{}/Destiny2/Stats/PostGameCarnageReport/{}/",
            self.stats_base_url, instance_id
        );
        let pgcr: PgcrResponse = self.get_json(&url, &[]).await?;

        let entries = pgcr
            .entries
            .into_iter()
            .map(|e| {
                let info = e.player.destiny_user_info;
                let display_name = format_bungie_name(
                    info.bungie_global_display_name.as_deref(),
                    info.bungie_global_display_name_code,
                );
                let weapons = e
                    .extended
                    .and_then(|x| x.weapons)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|w| WeaponUsage {
                        item_hash: w.reference_id,
                        unique_kills: basic_value(&w.values, "uniqueWeaponKills"),
                    })
                    .collect();

                ReportEntry {
                    membership_id: info.membership_id,
                    membership_type: info.membership_type,
                    display_name,
                    kills: basic_value(&e.values, "kills"),
                    deaths: basic_value(&e.values, "deaths"),
                    completed: display_value(&e.values, "completed"),
                    weapons,
                }
            })
            .collect();

        Ok(DetailReport {
            instance_id: pgcr.activity_details.instance_id,
            activity_hash: pgcr.activity_details.reference_id,
            mode: ActivityMode::from_mode_id(pgcr.activity_details.mode),
            period: parse_period(&pgcr.period)?,
            entries,
        })
    }

    async fn resolve_identity(&self, membership_id: i64) -> Result<String> {
        // -1 is BungieMembershipType.All
        let url = format!(
            "{}/User/GetMembershipsById/{}/-1/",
            self.base_url, membership_id
        );
        let data: MembershipDataResponse = self.get_json(&url, &[]).await?;

        let primary = data
            .primary_membership_id
            .and_then(|id| {
                data.destiny_memberships
                    .iter()
                    .find(|m| m.membership_id == id)
            })
            .or_else(|| data.destiny_memberships.first())
            .ok_or_else(|| {
                AppError::RemoteData(format!("No Destiny memberships for {}", membership_id))
            })?;

        format_bungie_name(
            primary.bungie_global_display_name.as_deref(),
            primary.bungie_global_display_name_code,
        )
        .ok_or_else(|| AppError::RemoteData(format!("No Bungie name for {}", membership_id)))
    }

    async fn resolve_clans(&self, membership_type: i32, membership_id: i64) -> Result<Vec<Clan>> {
        // filter 0 = all groups, group type 1 = clan
        let url = format!(
            "{}/GroupV2/User/{}/{}/0/1/",
            self.base_url, membership_type, membership_id
        );
        let groups: GroupsForMemberResponse = self.get_json(&url, &[]).await?;

        Ok(groups
            .results
            .into_iter()
            .map(|r| Clan {
                group_id: r.group.group_id,
                name: r.group.name,
                call_sign: r
                    .group
                    .clan_info
                    .map(|c| c.clan_callsign)
                    .unwrap_or_default(),
            })
            .collect())
    }

    async fn resolve_item(&self, item_hash: u32) -> Result<String> {
        self.definition_name("DestinyInventoryItemDefinition", item_hash)
            .await
    }

    async fn resolve_activity(&self, activity_hash: u32) -> Result<String> {
        self.definition_name("DestinyActivityDefinition", activity_hash)
            .await
    }
}

/// Format `Name#0042`; `None` when the name is missing or blank.
fn format_bungie_name(name: Option<&str>, code: Option<u32>) -> Option<String> {
    let name = name.filter(|n| !n.trim().is_empty())?;
    Some(match code {
        Some(code) => format!("{}#{:04}", name, code),
        None => name.to_string(),
    })
}

fn parse_period(period: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(period)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| AppError::RemoteData(format!("Invalid period {:?}: {}", period, e)))
}

fn basic_value(values: &HashMap<String, StatValue>, key: &str) -> f64 {
    values.get(key).map(|v| v.basic.value).unwrap_or(0.0)
}

fn display_value(values: &HashMap<String, StatValue>, key: &str) -> String {
    values
        .get(key)
        .map(|v| v.basic.display_value.clone())
        .unwrap_or_default()
}

/// Bungie serializes int64 IDs as JSON strings.
fn de_i64<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<i64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(i64),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Str(s) => s.parse().map_err(serde::de::Error::custom),
        Raw::Num(n) => Ok(n),
    }
}

fn de_opt_i64<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<Option<i64>, D::Error> {
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "de_i64")] i64);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|w| w.0))
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Envelope<T> {
    response: Option<T>,
    error_code: i32,
    #[serde(default)]
    error_status: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct ManifestResponse {
    version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefinitionResponse {
    display_properties: DisplayProperties,
}

#[derive(Debug, Default, Deserialize)]
struct DisplayProperties {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct AccountStatsResponse {
    #[serde(default)]
    characters: Vec<CharacterStats>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CharacterStats {
    #[serde(deserialize_with = "de_i64")]
    character_id: i64,
}

#[derive(Debug, Deserialize)]
struct ActivityHistoryResponse {
    /// Absent entirely once the history is exhausted
    #[serde(default)]
    activities: Vec<HistoryActivity>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HistoryActivity {
    period: String,
    activity_details: ActivityDetails,
    #[serde(default)]
    values: HashMap<String, StatValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ActivityDetails {
    reference_id: u32,
    #[serde(deserialize_with = "de_i64")]
    instance_id: i64,
    #[serde(default)]
    mode: i32,
}

#[derive(Debug, Deserialize)]
struct StatValue {
    basic: BasicValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BasicValue {
    value: f64,
    #[serde(default)]
    display_value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PgcrResponse {
    period: String,
    activity_details: ActivityDetails,
    #[serde(default)]
    entries: Vec<PgcrEntry>,
}

#[derive(Debug, Deserialize)]
struct PgcrEntry {
    player: PgcrPlayer,
    #[serde(default)]
    values: HashMap<String, StatValue>,
    #[serde(default)]
    extended: Option<PgcrExtended>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PgcrPlayer {
    destiny_user_info: UserInfoCard,
}

#[derive(Debug, Deserialize)]
struct PgcrExtended {
    #[serde(default)]
    weapons: Option<Vec<PgcrWeapon>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PgcrWeapon {
    reference_id: u32,
    #[serde(default)]
    values: HashMap<String, StatValue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserInfoCard {
    #[serde(deserialize_with = "de_i64")]
    membership_id: i64,
    #[serde(default)]
    membership_type: i32,
    #[serde(default)]
    bungie_global_display_name: Option<String>,
    #[serde(default)]
    bungie_global_display_name_code: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembershipDataResponse {
    #[serde(default)]
    destiny_memberships: Vec<UserInfoCard>,
    #[serde(default, deserialize_with = "de_opt_i64")]
    primary_membership_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GroupsForMemberResponse {
    #[serde(default)]
    results: Vec<GroupMembership>,
}

#[derive(Debug, Deserialize)]
struct GroupMembership {
    group: GroupV2,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GroupV2 {
    #[serde(deserialize_with = "de_i64")]
    group_id: i64,
    name: String,
    #[serde(default)]
    clan_info: Option<ClanInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClanInfo {
    #[serde(default)]
    clan_callsign: String,
}
