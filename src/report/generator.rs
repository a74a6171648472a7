//! Markdown report generation.
//!
//! This module generates Markdown and JSON risk reports from a completed
//! analysis run.

use crate::analysis::{event_stats, magnitude_distribution, strongest_events};
use crate::models::{AnalysisResult, Event, RegionRisk};
use anyhow::Result;

const STRONGEST_EVENTS: usize = 10;

/// Generate a complete Markdown report.
pub fn generate_markdown_report(result: &AnalysisResult) -> String {
    let mut output = String::new();

    // Title
    output.push_str("# Seismic Risk Report\n\n");

    output.push_str(&generate_metadata_section(result));
    output.push_str(&generate_overall_section(result));
    output.push_str(&generate_regions_section(result));
    output.push_str(&generate_events_section(&result.events));
    output.push_str(&generate_footer());

    output
}

/// Colored badge for a risk percentage.
fn risk_badge(risk: f64) -> &'static str {
    if risk >= 75.0 {
        "🔴"
    } else if risk >= 50.0 {
        "🟠"
    } else if risk >= 25.0 {
        "🟡"
    } else {
        "🟢"
    }
}

/// Generate the metadata section.
fn generate_metadata_section(result: &AnalysisResult) -> String {
    let mut section = String::new();

    section.push_str("## Metadata\n\n");
    section.push_str(&format!(
        "- **Window:** {} to {}\n",
        result.window.start.format("%Y-%m-%d %H:%M:%S UTC"),
        result.window.end.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!(
        "- **Completed:** {}\n",
        result.completed_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    section.push_str(&format!("- **Events:** {}\n", result.events.len()));
    section.push_str(&format!("- **Regions:** {}\n", result.regions.len()));
    section.push_str(&format!(
        "- **Analysis Duration:** {:.1}s\n",
        result.duration_seconds
    ));
    section.push('\n');

    section
}

/// Generate the overall risk section.
fn generate_overall_section(result: &AnalysisResult) -> String {
    let mut section = String::new();

    section.push_str("## Overall Risk\n\n");
    section.push_str(&format!(
        "{} **{:.1}%** (alert threshold {:.0}%)\n\n",
        risk_badge(result.overall_risk),
        result.overall_risk,
        result.alert_threshold
    ));

    if result.alert {
        section.push_str("> ⛔ **ALERT:** overall risk is at or above the threshold.\n\n");
        let above = result.regions_above_threshold();
        if !above.is_empty() {
            section.push_str(&format!(
                "Regions at or above the threshold: {}\n\n",
                above.join(", ")
            ));
        }
    } else {
        section.push_str("No alert: overall risk is below the threshold.\n\n");
    }

    section
}

/// Generate the per-region table, highest risk first.
fn generate_regions_section(result: &AnalysisResult) -> String {
    let mut section = String::new();

    section.push_str("## Regional Risk\n\n");

    if result.regions.is_empty() {
        section.push_str("No regions were analysed.\n\n");
        return section;
    }

    section.push_str("| Region | Risk | Status |\n");
    section.push_str("|:---|:---:|:---|\n");

    for (name, risk) in result.regions_by_risk() {
        let status = match risk {
            RegionRisk::Scored { .. } => "scored",
            RegionRisk::NoData => "no events",
            RegionRisk::Unavailable { .. } => "unavailable",
        };
        section.push_str(&format!(
            "| {} | {} {:.1}% | {} |\n",
            name,
            risk_badge(risk.value()),
            risk.value(),
            status
        ));
    }
    section.push('\n');

    let unavailable: Vec<_> = result
        .regions
        .iter()
        .filter_map(|(name, risk)| match risk {
            RegionRisk::Unavailable { reason } => Some((name, reason)),
            _ => None,
        })
        .collect();

    if !unavailable.is_empty() {
        section.push_str("### Unavailable Regions\n\n");
        section.push_str(
            "The catalog could not be queried for these regions; they are reported as 0%.\n\n",
        );
        for (name, reason) in unavailable {
            section.push_str(&format!("- **{}:** {}\n", name, reason));
        }
        section.push('\n');
    }

    section
}

/// Generate event statistics for the nationwide event list.
fn generate_events_section(events: &[Event]) -> String {
    let mut section = String::new();

    section.push_str("## Nationwide Events\n\n");

    let Some(stats) = event_stats(events) else {
        section.push_str("No events in the window.\n\n");
        return section;
    };

    section.push_str("| Events | Max Magnitude | Mean Magnitude | Mean Depth | First | Last |\n");
    section.push_str("|:---:|:---:|:---:|:---:|:---:|:---:|\n");
    section.push_str(&format!(
        "| {} | {:.1} | {:.2} | {:.1} km | {} | {} |\n\n",
        stats.count,
        stats.max_magnitude,
        stats.mean_magnitude,
        stats.mean_depth_km,
        stats.first.format("%Y-%m-%d %H:%M"),
        stats.last.format("%Y-%m-%d %H:%M")
    ));

    section.push_str("### Magnitude Distribution\n\n");
    section.push_str("| Magnitude | Events |\n");
    section.push_str("|:---|:---:|\n");
    for (band, count) in magnitude_distribution(events) {
        section.push_str(&format!("| {}.0 - {}.9 | {} |\n", band, band, count));
    }
    section.push('\n');

    section.push_str("### Strongest Events\n\n");
    section.push_str("| Time (UTC) | Magnitude | Depth | Location |\n");
    section.push_str("|:---|:---:|:---:|:---|\n");
    for event in strongest_events(events, STRONGEST_EVENTS) {
        let location = event.place.clone().unwrap_or_else(|| {
            format!("{:.3}, {:.3}", event.latitude, event.longitude)
        });
        section.push_str(&format!(
            "| {} | {:.1} | {:.1} km | {} |\n",
            event.time.format("%Y-%m-%d %H:%M:%S"),
            event.magnitude,
            event.depth_km,
            location
        ));
    }
    section.push('\n');

    section
}

/// Generate the report footer.
fn generate_footer() -> String {
    let mut footer = String::new();

    footer.push_str("---\n\n");
    footer.push_str(&format!(
        "*Report generated by seisrisk v{}. Risk scores are model estimates, not forecasts.*\n",
        env!("CARGO_PKG_VERSION")
    ));

    footer
}

/// Generate a JSON report.
pub fn generate_json_report(result: &AnalysisResult) -> Result<String> {
    serde_json::to_string_pretty(result).map_err(Into::into)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RegionRiskMap, TimeWindow};
    use chrono::{TimeZone, Utc};

    fn create_test_event(magnitude: f64, place: Option<&str>) -> Event {
        Event {
            id: Some(format!("us{}", magnitude)),
            time: Utc.with_ymd_and_hms(2023, 2, 6, 1, 17, 34).unwrap(),
            magnitude,
            depth_km: 10.0,
            latitude: 37.2,
            longitude: 37.0,
            station_count: 120,
            gap: 20.0,
            min_distance: 0.4,
            rms: 0.9,
            place: place.map(str::to_string),
        }
    }

    fn create_test_result() -> AnalysisResult {
        let regions: RegionRiskMap = [
            ("Kahramanmaras".to_string(), RegionRisk::Scored { risk: 88.4 }),
            ("Ankara".to_string(), RegionRisk::NoData),
            (
                "Van".to_string(),
                RegionRisk::Unavailable {
                    reason: "catalog returned HTTP 503: ".to_string(),
                },
            ),
        ]
        .into_iter()
        .collect();

        AnalysisResult {
            overall_risk: 72.5,
            alert_threshold: 50.0,
            alert: true,
            window: TimeWindow::new(
                Utc.with_ymd_and_hms(2023, 1, 7, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2023, 2, 6, 0, 0, 0).unwrap(),
            )
            .unwrap(),
            events: vec![
                create_test_event(7.8, Some("Pazarcik earthquake, Kahramanmaras")),
                create_test_event(4.2, None),
            ],
            regions,
            completed_at: Utc::now(),
            duration_seconds: 12.3,
        }
    }

    #[test]
    fn test_generate_markdown_report() {
        let report = generate_markdown_report(&create_test_result());

        assert!(report.contains("# Seismic Risk Report"));
        assert!(report.contains("## Metadata"));
        assert!(report.contains("## Overall Risk"));
        assert!(report.contains("**72.5%**"));
        assert!(report.contains("ALERT"));
        assert!(report.contains("## Regional Risk"));
        assert!(report.contains("Pazarcik earthquake"));
        assert!(report.contains("37.200, 37.000"));
    }

    #[test]
    fn test_regions_sorted_and_unavailable_listed() {
        let section = generate_regions_section(&create_test_result());

        let kahramanmaras = section.find("| Kahramanmaras").unwrap();
        let ankara = section.find("| Ankara").unwrap();
        assert!(kahramanmaras < ankara);
        assert!(section.contains("no events"));
        assert!(section.contains("### Unavailable Regions"));
        assert!(section.contains("**Van:** catalog returned HTTP 503"));
    }

    #[test]
    fn test_no_alert_below_threshold() {
        let mut result = create_test_result();
        result.overall_risk = 20.0;
        result.alert = false;

        let section = generate_overall_section(&result);
        assert!(section.contains("No alert"));
        assert!(section.contains("🟢"));
    }

    #[test]
    fn test_events_section_empty() {
        assert!(generate_events_section(&[]).contains("No events in the window."));
    }

    #[test]
    fn test_magnitude_distribution_rows() {
        let section = generate_events_section(&create_test_result().events);
        assert!(section.contains("| 7.0 - 7.9 | 1 |"));
        assert!(section.contains("| 4.0 - 4.9 | 1 |"));
    }

    #[test]
    fn test_generate_json_report() {
        let json = generate_json_report(&create_test_result()).unwrap();

        assert!(json.contains("\"overall_risk\": 72.5"));
        assert!(json.contains("\"status\": \"unavailable\""));
        assert!(json.contains("\"status\": \"no_data\""));
        assert!(json.contains("\"events\""));
    }
}
