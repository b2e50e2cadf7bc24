// Markdown report generation — the file the Monday digest is built from.
//
// The digest consumer is contractually required to honour the tier and
// confounder fields; the report therefore prints them explicitly rather
// than prose-only, so a downstream renderer cannot silently upgrade a
// hypothesis into a confident claim.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};

use crate::recommend::{Recommendation, RecommendationReport};

/// Escape pipes so free text can't break markdown tables.
fn escape(text: &str) -> String {
    text.replace('|', "\\|")
}

/// Write the recommendation report as markdown. Returns the path written.
pub fn generate_report(report: &RecommendationReport, output_path: &str) -> Result<String> {
    let mut md = String::new();

    md.push_str("# Content Strategy Report\n\n");
    md.push_str(&format!(
        "Creator: `{}`  \nPeriod: {} days ({} → {})  \nSubscribers: {}  \nRevenue: {:.2}\n\n",
        report.creator_id,
        report.period_days,
        report.window_start.format("%Y-%m-%d"),
        report.window_end.format("%Y-%m-%d"),
        report.total_subs,
        report.total_revenue,
    ));

    if let Some(warning) = &report.confounder_warning {
        md.push_str(&format!("> **Confounders present.** {}\n\n", escape(warning)));
    }

    md.push_str("## Summary\n\n");
    md.push_str("| Tier | Categories |\n|---|---|\n");
    md.push_str(&format!("| Confident | {} |\n", report.confident.len()));
    md.push_str(&format!("| Hypothesis | {} |\n", report.hypothesis.len()));
    md.push_str(&format!(
        "| Insufficient data | {} |\n\n",
        report.insufficient_data.len()
    ));

    if let Some(top) = &report.top_performer {
        md.push_str(&format!("Top performer: **{top}**\n\n"));
    }

    if !report.confident.is_empty() {
        md.push_str("## Confident\n\n");
        push_recommendation_table(&mut md, &report.confident);
    }

    if !report.hypothesis.is_empty() {
        md.push_str("## Hypotheses\n\n");
        push_recommendation_table(&mut md, &report.hypothesis);
    }

    if !report.insufficient_data.is_empty() {
        md.push_str("## Insufficient data\n\n");
        for entry in &report.insufficient_data {
            md.push_str(&format!(
                "- `{}` — {} ({} delta views)\n",
                entry.category,
                escape(&entry.reason),
                entry.views_delta
            ));
        }
        md.push('\n');
    }

    md.push_str("## Weekly plan\n\n");
    if report.weekly_plan.breakdown.is_empty() {
        md.push_str(&format!(
            "{} posts/week (unchanged). {}\n\n",
            report.weekly_plan.total_posts,
            escape(&report.weekly_plan.rationale)
        ));
    } else {
        md.push_str(&format!(
            "{} posts/week total. {}\n\n| Category | Posts/week |\n|---|---|\n",
            report.weekly_plan.total_posts,
            escape(&report.weekly_plan.rationale)
        ));
        let mut breakdown: Vec<(&String, &u32)> = report.weekly_plan.breakdown.iter().collect();
        breakdown.sort_by(|a, b| b.1.cmp(a.1));
        for (category, posts) in breakdown {
            md.push_str(&format!("| {category} | {posts} |\n"));
        }
        md.push('\n');
    }

    if !report.data_quality_notes.is_empty() {
        md.push_str("## Data quality\n\n");
        for note in &report.data_quality_notes {
            md.push_str(&format!("- {}\n", escape(note)));
        }
        md.push('\n');
    }

    if let Some(parent) = Path::new(output_path).parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create report directory for {output_path}"))?;
        }
    }
    fs::write(output_path, md)
        .with_context(|| format!("Failed to write report to {output_path}"))?;

    Ok(output_path.to_string())
}

fn push_recommendation_table(md: &mut String, recommendations: &[Recommendation]) {
    md.push_str("| Category | Action | Lift | Subs | Score | Posts/week |\n|---|---|---|---|---|---|\n");
    for rec in recommendations {
        md.push_str(&format!(
            "| {} | {} | {:+.0}% | {} | {:.2} | {:.0} → {:.0} |\n",
            rec.category,
            rec.action,
            rec.lift_pct,
            rec.attributed_subs,
            rec.confidence_score,
            rec.current_posts_per_week,
            rec.suggested_posts_per_week,
        ));
    }
    md.push('\n');
}
