use colored::Colorize;
use itertools::Itertools;
use serde::Serialize;

use crate::api::{Initiative, PublicStatistics, Statistics, Status};
use crate::dashboard::{DashboardView, ImportanceMap, Phase};
use crate::utils::{clip, format_percent, format_timestamp, single_line};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl OutputFormat {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "text" | "txt" => Some(Self::Text),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

pub fn infer_format_from_path(path: &str) -> Option<OutputFormat> {
    let lower = path.trim().to_lowercase();
    if lower.ends_with(".json") {
        return Some(OutputFormat::Json);
    }
    if lower.ends_with(".txt") {
        return Some(OutputFormat::Text);
    }
    None
}

pub fn render_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut out = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    out.push('\n');
    out
}

/// Initiative plus its priority score, for JSON output of scored listings.
#[derive(Clone, Debug, Serialize)]
pub struct ScoredInitiative<'a> {
    #[serde(flatten)]
    pub initiative: &'a Initiative,
    pub priority: Option<u8>,
}

pub fn scored<'a>(records: &'a [Initiative], importance: &ImportanceMap) -> Vec<ScoredInitiative<'a>> {
    records
        .iter()
        .map(|initiative| ScoredInitiative {
            initiative,
            priority: importance.get(initiative.id),
        })
        .collect()
}

fn status_badge(status: Status) -> String {
    match status {
        Status::Pending => format!("{:<9}", status.label()).yellow().to_string(),
        Status::Responded => format!("{:<9}", status.label()).green().to_string(),
    }
}

fn kv_line(out: &mut String, label: &str, value: &str) {
    out.push_str(&format!(":: {:<12}: {}\n", label, value));
}

fn initiative_row(record: &Initiative, importance: &ImportanceMap) -> String {
    let mut row = format!(
        "#{:<5} {} {} | {} | {} | {}",
        record.id,
        status_badge(record.status),
        clip(&record.title, 48).bold(),
        record.category.as_deref().unwrap_or("-").trim(),
        clip(&record.location, 32),
        format_timestamp(&record.created_at),
    );
    if let Some(score) = importance.get(record.id) {
        row.push_str(&format!(" {}", format!("[prio {score:>3}]").cyan()));
    }
    row
}

pub fn render_initiatives_text(records: &[Initiative], importance: &ImportanceMap) -> String {
    if records.is_empty() {
        return "No initiatives found.\n".to_string();
    }
    let mut out = records
        .iter()
        .map(|r| initiative_row(r, importance))
        .join("\n");
    out.push('\n');
    out
}

pub fn render_initiative_text(record: &Initiative) -> String {
    let mut out = String::new();
    out.push_str(&format!("{}\n", format!("#{} {}", record.id, record.title).bold()));
    kv_line(&mut out, "Status", &status_badge(record.status));
    kv_line(
        &mut out,
        "Category",
        record.category.as_deref().unwrap_or("-").trim(),
    );
    kv_line(&mut out, "Location", &record.location);
    kv_line(
        &mut out,
        "Coordinates",
        &format!("{:.5}, {:.5}", record.latitude, record.longitude),
    );
    kv_line(&mut out, "Submitted", &format_timestamp(&record.created_at));
    kv_line(&mut out, "E-mail", &record.email);
    if let Some(image) = record.image_path.as_deref() {
        kv_line(&mut out, "Image", image);
    }
    out.push('\n');
    out.push_str(&record.description);
    out.push('\n');
    if let Some(response) = record.response.as_deref() {
        out.push('\n');
        let when = record
            .responded_at
            .as_ref()
            .map(format_timestamp)
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("{} ({when})\n", "Response".green().bold()));
        out.push_str(response);
        out.push('\n');
    }
    out
}

fn bar(count: u64, max: u64, width: usize) -> String {
    if max == 0 {
        return String::new();
    }
    let len = ((count as f64 / max as f64) * width as f64).round() as usize;
    "#".repeat(len)
}

pub fn render_statistics_text(stats: &Statistics) -> String {
    let mut out = String::new();
    kv_line(&mut out, "Total", &stats.total_pobude.to_string());
    kv_line(
        &mut out,
        "Pending",
        &stats.pending_pobude.to_string().yellow().to_string(),
    );
    kv_line(
        &mut out,
        "Responded",
        &stats.responded_pobude.to_string().green().to_string(),
    );

    let max = stats
        .daily_stats
        .iter()
        .chain(stats.response_stats.iter())
        .map(|d| d.count)
        .max()
        .unwrap_or(0);
    out.push_str("\nDate        submitted / responded\n");
    for (submitted, responded) in stats.daily_stats.iter().zip(stats.response_stats.iter()) {
        out.push_str(&format!(
            "{}  {:>3} {:<20} {:>3} {}\n",
            submitted.date,
            submitted.count,
            bar(submitted.count, max, 20),
            responded.count,
            bar(responded.count, max, 20).green(),
        ));
    }
    out
}

pub fn render_public_statistics_text(stats: &PublicStatistics) -> String {
    let mut out = String::new();
    let summary = &stats.summary;
    kv_line(&mut out, "Total", &summary.total_pobude.to_string());
    kv_line(&mut out, "Pending", &summary.pending_pobude.to_string());
    kv_line(&mut out, "Responded", &summary.responded_pobude.to_string());
    kv_line(&mut out, "Answered", &format_percent(summary.response_rate));
    if let Some(days) = summary.average_response_time {
        kv_line(&mut out, "Avg. reply", &format!("{days:.1} days"));
    }
    if let Some(worst) = stats.most_problematic_category.as_ref() {
        kv_line(
            &mut out,
            "Least served",
            &format!("{} ({})", worst.category.trim(), format_percent(worst.response_rate)),
        );
    }
    if let Some(best) = stats.least_problematic_category.as_ref() {
        kv_line(
            &mut out,
            "Best served",
            &format!("{} ({})", best.category.trim(), format_percent(best.response_rate)),
        );
    }

    if !stats.category_stats.is_empty() {
        out.push_str(&format!("\n{}\n", "By category".bold()));
        for c in stats
            .category_stats
            .iter()
            .sorted_by(|a, b| b.total.cmp(&a.total))
        {
            out.push_str(&format!(
                "  {:<36} {:>4} total {:>4} open {:>7}\n",
                clip(&c.category, 36),
                c.total,
                c.pending,
                format_percent(c.response_rate),
            ));
        }
    }
    if !stats.monthly_stats.is_empty() {
        out.push_str(&format!("\n{}\n", "By month".bold()));
        for m in &stats.monthly_stats {
            out.push_str(&format!(
                "  {:<8} {:>4} submitted {:>4} responded\n",
                m.month, m.total, m.responded
            ));
        }
    }
    if !stats.location_stats.is_empty() {
        out.push_str(&format!("\n{}\n", "Top locations".bold()));
        for l in &stats.location_stats {
            out.push_str(&format!(
                "  {:<36} {:>4} total {:>4} open\n",
                clip(&l.location, 36),
                l.total,
                l.pending
            ));
        }
    }
    out
}

pub fn render_streets_text(streets: &[String]) -> String {
    if streets.is_empty() {
        return "No matching streets.\n".to_string();
    }
    let mut out = streets.iter().map(|s| single_line(s)).join("\n");
    out.push('\n');
    out
}

fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Idle => "idle",
        Phase::Loading => "loading",
        Phase::LoadingMore => "loading more",
        Phase::Loaded => "loaded",
        Phase::Error => "error",
    }
}

/// One screen of the interactive dashboard.
pub fn render_dashboard(view: &DashboardView) -> String {
    let mut out = String::new();
    let filters = &view.filters;
    out.push_str(&format!(
        ":: status: {} :: category: {} :: search: {} :: {} ::\n",
        filters.status.label(),
        filters.category.as_deref().unwrap_or("all").trim(),
        filters.search.as_deref().unwrap_or("-"),
        phase_label(view.phase),
    ));
    if let Some(stats) = view.statistics.as_ref() {
        out.push_str(&format!(
            ":: total {} :: pending {} :: responded {} ::\n",
            stats.total_pobude,
            stats.pending_pobude.to_string().yellow(),
            stats.responded_pobude.to_string().green(),
        ));
    }
    if let Some(error) = view.error.as_deref() {
        out.push_str(&format!("{} {}\n", "error:".red().bold(), error));
    }

    if view.no_results && view.phase == Phase::Loaded {
        out.push_str("No initiatives match these filters.\n");
    } else {
        for record in &view.records {
            out.push_str(&initiative_row(record, &view.importance));
            out.push('\n');
        }
    }

    let footer = if view.in_flight {
        "-- loading --".to_string()
    } else if view.has_more {
        format!("-- {} loaded, Enter for more --", view.loaded)
    } else {
        format!("-- {} loaded, end of list --", view.loaded)
    };
    out.push_str(&footer.dimmed().to_string());
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::models::DailyCount;
    use crate::tests::stub::initiative;
    use chrono::NaiveDate;

    #[test]
    fn format_parsing_and_inference() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("xml"), None);
        assert_eq!(infer_format_from_path("out.json"), Some(OutputFormat::Json));
        assert_eq!(infer_format_from_path("out.txt"), Some(OutputFormat::Text));
        assert_eq!(infer_format_from_path("out"), None);
    }

    #[test]
    fn list_rows_include_priority_only_when_scored() {
        let records = vec![initiative(1, Status::Pending), initiative(2, Status::Responded)];
        let mut importance = ImportanceMap::new();
        importance.insert(2, 88);
        let text = render_initiatives_text(&records, &importance);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("Pobuda 1"));
        assert!(!lines[0].contains("prio"));
        assert!(lines[1].contains("prio  88"));
    }

    #[test]
    fn empty_listing_has_message() {
        assert_eq!(
            render_initiatives_text(&[], &ImportanceMap::new()),
            "No initiatives found.\n"
        );
    }

    #[test]
    fn scored_json_flattens_initiative() {
        let records = vec![initiative(7, Status::Pending)];
        let mut importance = ImportanceMap::new();
        importance.insert(7, 40);
        let json = render_json(&scored(&records, &importance));
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value[0]["id"], 7);
        assert_eq!(value[0]["priority"], 40);
        assert_eq!(value[0]["status"], "pending");
    }

    #[test]
    fn statistics_pair_daily_buckets() {
        let day = |d: u32, count: u64| DailyCount {
            date: NaiveDate::from_ymd_opt(2024, 5, d).unwrap(),
            count,
        };
        let stats = Statistics {
            total_pobude: 5,
            pending_pobude: 3,
            responded_pobude: 2,
            daily_stats: vec![day(1, 4), day(2, 1)],
            response_stats: vec![day(1, 0), day(2, 2)],
        };
        let text = render_statistics_text(&stats);
        assert!(text.contains("2024-05-01"));
        assert!(text.contains("2024-05-02"));
        assert!(text.contains("####################"));
    }

    #[test]
    fn detail_shows_response_when_present() {
        let mut record = initiative(3, Status::Responded);
        record.response = Some("Urejeno.".to_string());
        let text = render_initiative_text(&record);
        assert!(text.contains("Urejeno."));
        assert!(text.contains("Slovenska cesta 1"));
    }
}
