// JSONL import of normalised records.
//
// The engine does not parse platform CSVs — an upstream collaborator maps
// raw exports into these normalised records, one JSON object per line,
// discriminated by a "kind" field. Snapshots are routed through
// SnapshotStore::record so counter validation and idempotency apply to
// imports exactly as they do to the API.
//
// Fan records arrive with the raw platform identifier; it is HMAC-hashed
// with the agency salt before insertion and never stored.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::db::models::{ConfounderEvent, Creator, Fan, ReferralLink, RevenueEvent, SocialPost};
use crate::db::Database;
use crate::privacy;
use crate::snapshots::{MetricSet, SnapshotStore};

fn default_window_hours() -> i64 {
    48
}

fn default_status() -> String {
    "active".to_string()
}

fn default_currency() -> String {
    "USD".to_string()
}

/// One normalised import record.
#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImportRecord {
    Creator {
        id: String,
        name: String,
        #[serde(default = "default_window_hours")]
        optimal_attribution_window_hours: i64,
        #[serde(default = "default_status")]
        status: String,
    },
    Post {
        id: String,
        creator_id: String,
        platform: String,
        #[serde(default)]
        platform_post_id: Option<String>,
        posted_at: DateTime<Utc>,
        #[serde(default)]
        caption: Option<String>,
        #[serde(default)]
        url: Option<String>,
        #[serde(default)]
        category: Option<String>,
        #[serde(default)]
        category_source: Option<String>,
    },
    Snapshot {
        post_id: String,
        snapshot_at: DateTime<Utc>,
        #[serde(default)]
        views: i64,
        #[serde(default)]
        likes: i64,
        #[serde(default)]
        comments: i64,
        #[serde(default)]
        shares: i64,
        #[serde(default)]
        saves: i64,
    },
    Fan {
        id: String,
        creator_id: String,
        /// Raw platform identifier; hashed before storage.
        external_id: String,
        acquired_at: DateTime<Utc>,
        #[serde(default)]
        referral_link_id: Option<String>,
    },
    Revenue {
        fan_id: String,
        creator_id: String,
        event_type: String,
        amount: f64,
        #[serde(default = "default_currency")]
        currency: String,
        event_at: DateTime<Utc>,
    },
    Confounder {
        creator_id: String,
        event_type: String,
        event_start: DateTime<Utc>,
        #[serde(default)]
        event_end: Option<DateTime<Utc>>,
        #[serde(default)]
        description: Option<String>,
        #[serde(default)]
        estimated_impact: Option<String>,
    },
    ReferralLink {
        id: String,
        creator_id: String,
        code: String,
        #[serde(default)]
        category_hint: Option<String>,
    },
}

/// Counts from one import run.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImportSummary {
    pub creators: u32,
    pub posts: u32,
    pub snapshots: u32,
    pub fans: u32,
    pub revenue_events: u32,
    pub confounders: u32,
    pub referral_links: u32,
    pub skipped: u32,
}

impl ImportSummary {
    pub fn total(&self) -> u32 {
        self.creators
            + self.posts
            + self.snapshots
            + self.fans
            + self.revenue_events
            + self.confounders
            + self.referral_links
    }
}

/// Import a JSONL file of normalised records.
///
/// Bad lines are skipped with a warning and counted; a half-good export
/// should still land its good rows. Re-importing the same file is safe:
/// creators/posts/links upsert, fans ignore duplicates, snapshots dedupe
/// on (post, timestamp).
pub async fn import_jsonl(
    db: &Arc<dyn Database>,
    path: &Path,
    hash_salt: &str,
    import_ref: &str,
) -> Result<ImportSummary> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open import file {}", path.display()))?;
    let reader = BufReader::new(file);
    let store = SnapshotStore::new(db.clone());

    let mut summary = ImportSummary::default();

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let record: ImportRecord = match serde_json::from_str(&line) {
            Ok(record) => record,
            Err(e) => {
                warn!(line = line_no + 1, error = %e, "skipping malformed record");
                summary.skipped += 1;
                continue;
            }
        };

        if let Err(e) = apply(db, &store, record, hash_salt, import_ref, &mut summary).await {
            warn!(line = line_no + 1, error = %e, "skipping record");
            summary.skipped += 1;
        }
    }

    Ok(summary)
}

async fn apply(
    db: &Arc<dyn Database>,
    store: &SnapshotStore,
    record: ImportRecord,
    hash_salt: &str,
    import_ref: &str,
    summary: &mut ImportSummary,
) -> Result<()> {
    match record {
        ImportRecord::Creator {
            id,
            name,
            optimal_attribution_window_hours,
            status,
        } => {
            db.upsert_creator(&Creator {
                id,
                name,
                optimal_attribution_window_hours,
                status,
                created_at: Utc::now(),
            })
            .await?;
            summary.creators += 1;
        }

        ImportRecord::Post {
            id,
            creator_id,
            platform,
            platform_post_id,
            posted_at,
            caption,
            url,
            category,
            category_source,
        } => {
            db.upsert_post(&SocialPost {
                id,
                creator_id,
                platform,
                platform_post_id,
                posted_at,
                views_cumulative: 0,
                likes_cumulative: 0,
                comments_cumulative: 0,
                shares_cumulative: 0,
                saves_cumulative: 0,
                caption,
                url,
                category,
                category_source,
                last_snapshot_at: None,
            })
            .await?;
            summary.posts += 1;
        }

        ImportRecord::Snapshot {
            post_id,
            snapshot_at,
            views,
            likes,
            comments,
            shares,
            saves,
        } => {
            store
                .record(
                    &post_id,
                    MetricSet {
                        views,
                        likes,
                        comments,
                        shares,
                        saves,
                    },
                    snapshot_at,
                    Some(import_ref),
                )
                .await?;
            summary.snapshots += 1;
        }

        ImportRecord::Fan {
            id,
            creator_id,
            external_id,
            acquired_at,
            referral_link_id,
        } => {
            db.insert_fan(&Fan {
                id,
                creator_id,
                external_id_hash: Some(privacy::hash_external_id(hash_salt, &external_id)),
                acquired_at,
                referral_link_id,
                attributed_category: None,
                attribution_method: None,
                attribution_confidence: None,
                attribution_weights: None,
            })
            .await?;
            summary.fans += 1;
        }

        ImportRecord::Revenue {
            fan_id,
            creator_id,
            event_type,
            amount,
            currency,
            event_at,
        } => {
            db.insert_revenue_event(&RevenueEvent {
                id: 0,
                fan_id,
                creator_id,
                event_type,
                amount,
                currency,
                event_at,
            })
            .await?;
            summary.revenue_events += 1;
        }

        ImportRecord::Confounder {
            creator_id,
            event_type,
            event_start,
            event_end,
            description,
            estimated_impact,
        } => {
            db.insert_confounder(&ConfounderEvent {
                id: 0,
                creator_id,
                event_type,
                event_start,
                event_end,
                description,
                estimated_impact,
            })
            .await?;
            summary.confounders += 1;
        }

        ImportRecord::ReferralLink {
            id,
            creator_id,
            code,
            category_hint,
        } => {
            db.insert_referral_link(&ReferralLink {
                id,
                creator_id,
                code,
                category_hint,
            })
            .await?;
            summary.referral_links += 1;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_deserialize_from_tagged_json() {
        let creator: ImportRecord = serde_json::from_str(
            r#"{"kind": "creator", "id": "c1", "name": "Ava"}"#,
        )
        .unwrap();
        assert!(matches!(
            creator,
            ImportRecord::Creator {
                optimal_attribution_window_hours: 48,
                ..
            }
        ));

        let snapshot: ImportRecord = serde_json::from_str(
            r#"{"kind": "snapshot", "post_id": "p1",
                "snapshot_at": "2026-01-05T12:00:00Z", "views": 1000}"#,
        )
        .unwrap();
        assert!(matches!(
            snapshot,
            ImportRecord::Snapshot {
                views: 1000,
                likes: 0,
                ..
            }
        ));

        let fan: ImportRecord = serde_json::from_str(
            r#"{"kind": "fan", "id": "f1", "creator_id": "c1",
                "external_id": "user-99", "acquired_at": "2026-01-06T08:30:00Z"}"#,
        )
        .unwrap();
        assert!(matches!(fan, ImportRecord::Fan { .. }));
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let result: Result<ImportRecord, _> =
            serde_json::from_str(r#"{"kind": "webhook", "id": "x"}"#);
        assert!(result.is_err());
    }
}
