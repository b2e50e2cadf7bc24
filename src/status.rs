// System status display — store counts and freshness of the latest import.

use std::sync::Arc;

use anyhow::Result;

use crate::db::Database;

/// Display system status to the terminal.
pub async fn show(db: &Arc<dyn Database>, db_display: &str) -> Result<()> {
    println!("Database: {db_display}");

    let stats = db.store_stats().await?;
    println!(
        "Creators: {}   Posts: {}   Snapshots: {}   Fans: {}   Confounders: {}",
        stats.creators, stats.posts, stats.snapshots, stats.fans, stats.confounders,
    );

    match stats.last_snapshot_at {
        Some(ts) => println!("Last snapshot: {} UTC", ts.format("%Y-%m-%d %H:%M")),
        None => {
            println!("Last snapshot: never");
            println!("  Run `prism import <file>` to load an export");
        }
    }

    let creators = db.list_creators().await?;
    if !creators.is_empty() {
        println!("\nCreators:");
        for creator in creators {
            println!(
                "  {:<24} {:<10} (attribution window {}h)",
                creator.name, creator.status, creator.optimal_attribution_window_hours,
            );
        }
    }

    Ok(())
}
