//! Command dispatch and rendering for the CLI.

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use registry_core::formatting::{format_count, format_coverage, format_number, format_signed_count};
use registry_core::models::{saturating_sum, Category, Coverage, DATE_OUTPUT_FORMAT};
use registry_core::settings::Command;
use registry_data::aggregator::{signed_gap, CoverageBasis, DateRange, BIOMETRIC_COLUMNS};
use registry_data::snapshot::Snapshot;
use registry_runtime::data_manager::ReloadOutcome;
use registry_runtime::orchestrator::ReloadUpdate;
use registry_runtime::queries::{Queries, QueryRow};
use serde_json::Value;

/// Run one query command and render its result.
///
/// Query results print as a JSON array; `report` prints a plain-text summary.
pub fn execute(queries: &Queries, command: &Command, pretty: bool) -> Result<String> {
    let rows: Vec<QueryRow> = match command {
        Command::Stats => queries.stats(),
        Command::Overview => queries.overview(),
        Command::StateSummary { category } => queries.state_summary(parse_category(category)?),
        Command::StateLeaderboard { limit } => queries.state_leaderboard(*limit),
        Command::Trends { category, from, to } => {
            let range = DateRange::new(parse_date(from.as_deref())?, parse_date(to.as_deref())?);
            queries.trends(parse_category(category)?, range)
        }
        Command::DistrictRankings { state, limit } => {
            queries.district_rankings(state.as_deref(), *limit)
        }
        Command::DistrictBreakdown { state } => queries.district_breakdown(state),
        Command::AgeDistribution => queries.age_distribution(),
        Command::DistrictCohorts { state } => queries.district_cohorts(state.as_deref()),
        Command::CoverageGap { basis } => {
            let basis: CoverageBasis = basis.parse()?;
            queries.coverage_gap(basis)
        }
        Command::Correlation => queries.correlation(),
        Command::Report => return Ok(render_report(queries.snapshot())),
        Command::Watch { .. } => bail!("watch is not a one-shot query"),
    };

    to_json(&Value::Array(rows.into_iter().map(Value::Object).collect()), pretty)
}

/// One line of JSON per reload, for `watch`.
pub fn render_update(update: &ReloadUpdate) -> Result<String> {
    let reason = format!("{:?}", update.reason).to_lowercase();
    let value = match &update.outcome {
        ReloadOutcome::Published {
            generation,
            summary,
        } => serde_json::json!({
            "reason": reason,
            "status": "published",
            "generation": generation,
            "summary": serde_json::to_value(summary)?,
        }),
        ReloadOutcome::TimedOut { after } => serde_json::json!({
            "reason": reason,
            "status": "timed_out",
            "after_secs": after.as_secs_f64(),
        }),
        ReloadOutcome::Failed { reason: error } => serde_json::json!({
            "reason": reason,
            "status": "failed",
            "error": error,
        }),
        ReloadOutcome::InProgress => serde_json::json!({
            "reason": reason,
            "status": "in_progress",
        }),
    };
    to_json(&value, false)
}

/// Human-readable load report plus headline totals.
pub fn render_report(snapshot: &Snapshot) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "Snapshot loaded at {}\n\n",
        snapshot.loaded_at().format("%Y-%m-%d %H:%M:%S UTC")
    ));

    for category in Category::ALL {
        let dataset = snapshot.dataset(category);
        out.push_str(&format!(
            "{:<12} {:>12} rows  (contract v{})",
            category.as_str(),
            format_count(dataset.len() as u64),
            dataset.contract_version()
        ));
        match snapshot.report(category) {
            Some(report) if report.source_error.is_some() => {
                out.push_str(&format!(
                    "  unavailable: {}\n",
                    report.source_error.as_deref().unwrap_or_default()
                ));
            }
            Some(report) => {
                out.push_str(&format!(
                    "  {}/{} files loaded in {}s\n",
                    report.files_loaded,
                    report.files_discovered,
                    format_number(report.load_time_seconds, 2)
                ));
                for skipped in &report.skipped {
                    out.push_str(&format!("    skipped {}: {}\n", skipped.file, skipped.reason));
                }
                let repairs = &report.coercion;
                if repairs.unknown_dates > 0 || repairs.clamped_negatives > 0 {
                    out.push_str(&format!(
                        "    {} unknown dates, {} negative counts clamped\n",
                        format_count(repairs.unknown_dates),
                        format_count(repairs.clamped_negatives)
                    ));
                }
            }
            None => out.push('\n'),
        }
    }

    let enrolment = snapshot.enrolment();
    let total_enrolment = saturating_sum(
        CoverageBasis::TotalEnrolment
            .enrolment_columns()
            .iter()
            .map(|c| enrolment.column_total(c)),
    );
    let total_biometric = saturating_sum(
        BIOMETRIC_COLUMNS
            .iter()
            .map(|c| snapshot.biometric().column_total(c)),
    );

    out.push_str(&format!(
        "\nTotal enrolment:   {}\nBiometric captures: {}\nPending:           {}\nCoverage:          {}\n",
        format_count(total_enrolment),
        format_count(total_biometric),
        format_signed_count(signed_gap(total_enrolment, total_biometric)),
        format_coverage(Coverage::ratio(total_biometric, total_enrolment))
    ));
    out
}

// ── Private helpers ───────────────────────────────────────────────────────────

fn to_json(value: &Value, pretty: bool) -> Result<String> {
    let rendered = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(rendered)
}

fn parse_category(raw: &str) -> Result<Category> {
    Ok(raw.parse::<Category>()?)
}

fn parse_date(raw: Option<&str>) -> Result<Option<NaiveDate>> {
    raw.map(|s| {
        NaiveDate::parse_from_str(s.trim(), DATE_OUTPUT_FORMAT)
            .with_context(|| format!("invalid date `{}` (expected YYYY-MM-DD)", s))
    })
    .transpose()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use registry_core::models::{CellValue, Dataset, Row};
    use registry_runtime::orchestrator::ReloadReason;
    use std::sync::Arc;
    use std::time::Duration;

    fn queries() -> Queries {
        let row = |state: &str, day: u32, n: u64| {
            Row::new()
                .with("state", CellValue::Text(state.into()))
                .with("district", CellValue::Text("D".into()))
                .with("date", CellValue::Date(NaiveDate::from_ymd_opt(2025, 1, day)))
                .with("age_0_5", CellValue::Count(n))
                .with("age_5_17", CellValue::Count(n))
                .with("age_18_greater", CellValue::Count(n))
        };
        let enrolment = Dataset::new(
            Category::Enrolment,
            1,
            Vec::new(),
            vec![row("Goa", 1, 1), row("Kerala", 2, 2), row("Goa", 3, 3)],
        );
        Queries::new(Arc::new(Snapshot::from_datasets(
            enrolment,
            Dataset::empty(Category::Demographic),
            Dataset::empty(Category::Biometric),
        )))
    }

    #[test]
    fn test_execute_renders_json_array() {
        let out = execute(&queries(), &Command::Stats, false).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 1);
        assert_eq!(parsed[0]["total_records"], 3);
    }

    #[test]
    fn test_execute_trends_with_range() {
        let command = Command::Trends {
            category: "enrolment".into(),
            from: Some("2025-01-02".into()),
            to: None,
        };
        let out = execute(&queries(), &command, true).unwrap();
        let parsed: Value = serde_json::from_str(&out).unwrap();
        let dates: Vec<&str> = parsed
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["date"].as_str().unwrap())
            .collect();
        assert_eq!(dates, vec!["2025-01-02", "2025-01-03"]);
    }

    #[test]
    fn test_execute_rejects_bad_date() {
        let command = Command::Trends {
            category: "enrolment".into(),
            from: Some("02-01-2025".into()),
            to: None,
        };
        let err = execute(&queries(), &command, false).unwrap_err();
        assert!(err.to_string().contains("invalid date"));
    }

    #[test]
    fn test_execute_empty_dataset_gives_empty_array() {
        let out = execute(&queries(), &Command::Correlation, false).unwrap();
        assert_eq!(out, "[]");
    }

    #[test]
    fn test_execute_watch_is_rejected() {
        let command = Command::Watch { interval_secs: 5 };
        assert!(execute(&queries(), &command, false).is_err());
    }

    #[test]
    fn test_render_report_mentions_every_category() {
        let report = render_report(queries().snapshot());
        for category in Category::ALL {
            assert!(report.contains(category.as_str()), "{report}");
        }
        assert!(report.contains("Total enrolment:   18"));
        assert!(report.contains("Pending:           18"));
        assert!(report.contains("(contract v1)"));
        assert!(report.contains("Coverage:          0.0%"));
    }

    #[test]
    fn test_render_report_saturates_huge_totals() {
        let row = Row::new()
            .with("state", CellValue::Text("Goa".into()))
            .with("age_0_5", CellValue::Count(u64::MAX))
            .with("age_5_17", CellValue::Count(u64::MAX))
            .with("age_18_greater", CellValue::Count(1));
        let snapshot = Snapshot::from_datasets(
            Dataset::new(Category::Enrolment, 1, Vec::new(), vec![row]),
            Dataset::empty(Category::Demographic),
            Dataset::empty(Category::Biometric),
        );
        let report = render_report(&snapshot);
        assert!(report.contains("Total enrolment:   18,446,744,073,709,551,615"), "{report}");
        assert!(report.contains("Pending:           9,223,372,036,854,775,807"), "{report}");
    }

    #[test]
    fn test_render_update_in_progress() {
        let update = ReloadUpdate {
            reason: ReloadReason::Requested,
            outcome: ReloadOutcome::InProgress,
        };
        let parsed: Value = serde_json::from_str(&render_update(&update).unwrap()).unwrap();
        assert_eq!(parsed["status"], "in_progress");
    }

    #[test]
    fn test_render_update_timed_out() {
        let update = ReloadUpdate {
            reason: ReloadReason::Interval,
            outcome: ReloadOutcome::TimedOut {
                after: Duration::from_secs(3),
            },
        };
        let parsed: Value = serde_json::from_str(&render_update(&update).unwrap()).unwrap();
        assert_eq!(parsed["reason"], "interval");
        assert_eq!(parsed["status"], "timed_out");
        assert_eq!(parsed["after_secs"], 3.0);
    }
}
