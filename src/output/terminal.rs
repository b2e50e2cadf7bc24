// Colored terminal output for attribution and recommendation reports.
//
// This module handles all terminal-specific formatting: colors, tables,
// section layout. The main.rs display paths delegate here.

use colored::Colorize;

use crate::attribution::AttributionReport;
use crate::recommend::{Action, Recommendation, RecommendationReport};

/// Display a window attribution report.
pub fn display_attribution_report(report: &AttributionReport) {
    println!(
        "\n{}",
        format!(
            "=== Attribution: {} ({:.0}h window) ===",
            report.creator_id, report.window_hours
        )
        .bold()
    );

    println!(
        "  Window: {} → {}",
        report.window_start.format("%Y-%m-%d %H:%M"),
        report.window_end.format("%Y-%m-%d %H:%M"),
    );
    let baseline_note = if report.baseline.is_default {
        " (default baseline)".yellow().to_string()
    } else {
        format!(" ({} baseline days)", report.baseline.data_days)
    };
    println!(
        "  Subs:    {} actual vs {:.1} expected  {}{}",
        report.actual_subs,
        report.expected_subs,
        colorize_lift(report.subs_lift_pct),
        baseline_note,
    );
    println!(
        "  Revenue: {:.2} {} actual vs {:.2} expected  {}",
        report.actual_revenue,
        report.currency,
        report.expected_revenue,
        colorize_lift(report.revenue_lift_pct),
    );

    if !report.credit_weights.is_empty() {
        println!("\n  Credit split ({} delta views):", report.total_delta_views);
        let mut weights: Vec<(&String, &f64)> = report.credit_weights.iter().collect();
        weights.sort_by(|a, b| b.1.total_cmp(a.1));
        for (category, weight) in weights {
            let delta = report
                .content_type_deltas
                .get(category)
                .map_or(0, |d| d.views_delta);
            println!(
                "    {:<16} {:>5.1}%  ({} views, {} posts)",
                category,
                weight * 100.0,
                delta,
                report
                    .content_type_deltas
                    .get(category)
                    .map_or(0, |d| d.posts_with_views),
            );
        }
    } else {
        println!("\n  No view movement in this window.");
    }

    if !report.confounders.is_empty() {
        println!(
            "\n  {} {} confounder event(s) overlap this window:",
            "!".yellow().bold(),
            report.confounders.len()
        );
        for event in &report.confounders {
            println!(
                "    {} from {} {}",
                event.event_type.yellow(),
                event.event_start.format("%Y-%m-%d"),
                event.description.as_deref().unwrap_or("").dimmed(),
            );
        }
    }

    println!(
        "\n  Confidence: {:.2} ({})  →  tier: {}",
        report.confidence.score,
        report.confidence.level,
        colorize_tier(report.recommendation_tier.as_str()),
    );
    for reason in &report.confidence.reasons {
        println!("    - {}", reason.dimmed());
    }
    for note in &report.notes {
        println!("    - {}", note.dimmed());
    }
}

/// Display a full recommendation report.
pub fn display_recommendation_report(report: &RecommendationReport) {
    println!(
        "\n{}",
        format!(
            "=== Content Strategy: {} (last {} days) ===",
            report.creator_id, report.period_days
        )
        .bold()
    );
    println!(
        "  {} subs, {:.2} revenue in period",
        report.total_subs, report.total_revenue
    );

    if let Some(warning) = &report.confounder_warning {
        println!("\n  {} {}", "!".yellow().bold(), warning.yellow());
    }

    if let Some(top) = &report.top_performer {
        println!("\n  Top performer: {}", top.green().bold());
    }
    if let Some(under) = &report.underperformer {
        println!("  Underperformer: {}", under.red());
    }

    if !report.confident.is_empty() {
        println!("\n{}", "  CONFIDENT".green().bold());
        for rec in &report.confident {
            display_recommendation(rec);
        }
    }

    if !report.hypothesis.is_empty() {
        println!("\n{}", "  HYPOTHESES (need more data)".yellow().bold());
        for rec in &report.hypothesis {
            display_recommendation(rec);
        }
    }

    if !report.insufficient_data.is_empty() {
        println!("\n{}", "  INSUFFICIENT DATA".dimmed().bold());
        for entry in &report.insufficient_data {
            println!(
                "    {:<16} {} ({} delta views)",
                entry.category,
                entry.reason.dimmed(),
                entry.views_delta,
            );
        }
    }

    println!("\n{}", "  WEEKLY PLAN".bold());
    if report.weekly_plan.breakdown.is_empty() {
        println!("    {} posts/week (unchanged)", report.weekly_plan.total_posts);
    } else {
        println!("    {} posts/week total:", report.weekly_plan.total_posts);
        let mut breakdown: Vec<(&String, &u32)> = report.weekly_plan.breakdown.iter().collect();
        breakdown.sort_by(|a, b| b.1.cmp(a.1));
        for (category, posts) in breakdown {
            println!("      {:<16} {}", category, posts);
        }
    }
    println!("    {}", report.weekly_plan.rationale.dimmed());

    if !report.data_quality_notes.is_empty() {
        println!("\n{}", "  DATA QUALITY".bold());
        for note in &report.data_quality_notes {
            println!("    - {}", note.dimmed());
        }
    }
}

fn display_recommendation(rec: &Recommendation) {
    let arrow = match rec.action {
        Action::Increase => "↑".green().bold().to_string(),
        Action::Decrease => "↓".red().bold().to_string(),
        Action::Maintain => "→".normal().to_string(),
        Action::Test => "?".yellow().to_string(),
    };

    println!(
        "    {} {:<16} {}  ({} subs, score {:.2})",
        arrow,
        rec.category,
        colorize_lift(rec.lift_pct),
        rec.attributed_subs,
        rec.confidence_score,
    );
    println!("      {}", rec.reasoning);
    if (rec.current_posts_per_week - rec.suggested_posts_per_week).abs() > 0.01 {
        println!(
            "      {} {:.0} → {:.0} posts/week",
            "Change:".dimmed(),
            rec.current_posts_per_week,
            rec.suggested_posts_per_week,
        );
    }
    for caveat in &rec.caveats {
        println!("      {}", caveat.dimmed());
    }
}

fn colorize_lift(lift_pct: f64) -> String {
    let text = format!("{lift_pct:+.1}%");
    if lift_pct >= 50.0 {
        text.green().bold().to_string()
    } else if lift_pct > 0.0 {
        text.green().to_string()
    } else if lift_pct <= -50.0 {
        text.red().bold().to_string()
    } else if lift_pct < 0.0 {
        text.red().to_string()
    } else {
        text.normal().to_string()
    }
}

fn colorize_tier(tier: &str) -> colored::ColoredString {
    match tier {
        "confident" => tier.green().bold(),
        "hypothesis" => tier.yellow(),
        _ => tier.dimmed(),
    }
}
