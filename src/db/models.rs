// Data models — Rust structs that map to database rows.
//
// These are the types that flow through the application. They're separate
// from the database queries so other modules can use them without depending
// on rusqlite directly.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp format used for TEXT columns. UTC, second precision,
/// lexicographically ordered so SQL range comparisons work on strings.
pub const TS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Format a timestamp for storage.
pub fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// Parse a stored timestamp back into `DateTime<Utc>`.
pub fn parse_ts(raw: &str) -> anyhow::Result<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(raw, TS_FORMAT)?;
    Ok(naive.and_utc())
}

/// A creator managed by an agency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Creator {
    pub id: String,
    pub name: String,
    /// Attribution-window default for weighted fan attribution. Learnable
    /// per creator; 48 hours until calibration says otherwise.
    pub optimal_attribution_window_hours: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

/// Creator lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreatorStatus {
    Active,
    Paused,
    Archived,
}

impl CreatorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreatorStatus::Active => "active",
            CreatorStatus::Paused => "paused",
            CreatorStatus::Archived => "archived",
        }
    }
}

/// A published piece of content. Counters are CUMULATIVE — the latest
/// observed values. Period activity comes from snapshot deltas, never
/// from these fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SocialPost {
    pub id: String,
    pub creator_id: String,
    pub platform: String,
    pub platform_post_id: Option<String>,
    pub posted_at: DateTime<Utc>,
    pub views_cumulative: i64,
    pub likes_cumulative: i64,
    pub comments_cumulative: i64,
    pub shares_cumulative: i64,
    pub saves_cumulative: i64,
    pub caption: Option<String>,
    pub url: Option<String>,
    /// Content-category label; raw as assigned, normalised at read time.
    pub category: Option<String>,
    pub category_source: Option<String>,
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

/// How a post's category label was assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LabelSource {
    MlSuggested,
    UserConfirmed,
    UserOverride,
}

impl LabelSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabelSource::MlSuggested => "ml_suggested",
            LabelSource::UserConfirmed => "user_confirmed",
            LabelSource::UserOverride => "user_override",
        }
    }
}

/// An observation of a post's cumulative counters at one wall-clock moment.
/// Append-only; never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostSnapshot {
    pub id: i64,
    pub post_id: String,
    /// Denormalised for index efficiency on per-creator delta queries.
    pub creator_id: String,
    pub snapshot_at: DateTime<Utc>,
    pub views: i64,
    pub likes: i64,
    pub comments: i64,
    pub shares: i64,
    pub saves: i64,
    pub import_ref: Option<String>,
}

/// A subscriber acquisition event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fan {
    pub id: String,
    pub creator_id: String,
    /// HMAC-hashed external identifier; the raw id is never stored.
    pub external_id_hash: Option<String>,
    pub acquired_at: DateTime<Utc>,
    pub referral_link_id: Option<String>,
    pub attributed_category: Option<String>,
    pub attribution_method: Option<String>,
    pub attribution_confidence: Option<f64>,
    /// Category → credit share. Present only after weighted attribution;
    /// shares sum to 1.0.
    pub attribution_weights: Option<BTreeMap<String, f64>>,
}

/// How a fan was attributed to a content category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributionMethod {
    ReferralLink,
    WeightedWindow,
    Campaign,
    None,
}

impl AttributionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributionMethod::ReferralLink => "referral_link",
            AttributionMethod::WeightedWindow => "weighted_window",
            AttributionMethod::Campaign => "campaign",
            AttributionMethod::None => "none",
        }
    }
}

/// A monetisation event tied to a fan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueEvent {
    pub id: i64,
    pub fan_id: String,
    /// Denormalised so window revenue queries skip the fan join.
    pub creator_id: String,
    pub event_type: String,
    pub amount: f64,
    pub currency: String,
    pub event_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RevenueEventType {
    Subscription,
    Renewal,
    Tip,
    Ppv,
    Message,
}

impl RevenueEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RevenueEventType::Subscription => "subscription",
            RevenueEventType::Renewal => "renewal",
            RevenueEventType::Tip => "tip",
            RevenueEventType::Ppv => "ppv",
            RevenueEventType::Message => "message",
        }
    }
}

/// An external cause that biases attribution: a promotion, a collab, a
/// price change. A missing end timestamp means a point event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfounderEvent {
    pub id: i64,
    pub creator_id: String,
    pub event_type: String,
    pub event_start: DateTime<Utc>,
    pub event_end: Option<DateTime<Utc>>,
    pub description: Option<String>,
    pub estimated_impact: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfounderType {
    PriceChange,
    Promotion,
    Collab,
    ExternalTraffic,
    MassDm,
    PlatformPromo,
    Other,
}

impl ConfounderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfounderType::PriceChange => "price_change",
            ConfounderType::Promotion => "promotion",
            ConfounderType::Collab => "collab",
            ConfounderType::ExternalTraffic => "external_traffic",
            ConfounderType::MassDm => "mass_dm",
            ConfounderType::PlatformPromo => "platform_promo",
            ConfounderType::Other => "other",
        }
    }
}

/// Estimated impact of a confounder event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImpactLevel {
    Low,
    Medium,
    High,
}

impl ImpactLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImpactLevel::Low => "low",
            ImpactLevel::Medium => "medium",
            ImpactLevel::High => "high",
        }
    }
}

/// A tracking link a creator shares on a platform. A category hint makes
/// fan attribution deterministic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferralLink {
    pub id: String,
    pub creator_id: String,
    pub code: String,
    pub category_hint: Option<String>,
}

/// Aggregate store counts for the status display.
#[derive(Debug, Clone, Default)]
pub struct StoreStats {
    pub creators: i64,
    pub posts: i64,
    pub snapshots: i64,
    pub fans: i64,
    pub confounders: i64,
    pub last_snapshot_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn timestamp_round_trip() {
        let ts = Utc.with_ymd_and_hms(2026, 3, 14, 15, 9, 26).unwrap();
        let stored = fmt_ts(ts);
        assert_eq!(stored, "2026-03-14 15:09:26");
        assert_eq!(parse_ts(&stored).unwrap(), ts);
    }

    #[test]
    fn stored_timestamps_order_lexicographically() {
        let a = fmt_ts(Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap());
        let b = fmt_ts(Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap());
        assert!(a < b);
    }
}
