use crate::model::{
    Category, DivisionEntry, DivisionRecord, Quarter, QuarterRecord, ScoreSet, ScoreTable,
};
use serde::Serialize;
use std::cmp::Ordering;

/// Display rounding shared by every view: two decimals, half away from zero.
pub fn round_2_decimals(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Sum of the categories that exist in `quarter`. A missing quarter totals 0.
pub fn quarter_total(record: &DivisionRecord, quarter: Quarter) -> f64 {
    record
        .quarter(quarter)
        .map(|q| quarter_record_total(q, quarter))
        .unwrap_or(0.0)
}

pub fn quarter_record_total(record: &QuarterRecord, quarter: Quarter) -> f64 {
    record
        .scores
        .present()
        .filter(|(c, _)| c.is_defined_in(quarter))
        .map(|(_, v)| v)
        .sum()
}

pub fn grand_total(record: &DivisionRecord) -> f64 {
    Quarter::ALL
        .iter()
        .map(|q| quarter_total(record, *q))
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterPoint {
    pub quarter: Quarter,
    pub total: f64,
}

/// Q1..Q4 totals for charting; quarters without data plot as 0.
pub fn quarterly_series(record: Option<&DivisionRecord>) -> Vec<QuarterPoint> {
    Quarter::ALL
        .iter()
        .map(|q| QuarterPoint {
            quarter: *q,
            total: record.map(|r| quarter_total(r, *q)).unwrap_or(0.0),
        })
        .collect()
}

pub fn average_comment(contributors: usize) -> String {
    format!("average drawn from {} units", contributors)
}

/// Per-quarter, per-category mean across the listed divisions. Divisions without
/// a record for a quarter do not count toward it; a quarter nobody filled is omitted.
pub fn synthesize_average(divisions: &[String], table: &ScoreTable) -> DivisionRecord {
    let mut out = DivisionRecord::default();
    for quarter in Quarter::ALL {
        let contributors: Vec<&QuarterRecord> = divisions
            .iter()
            .filter_map(|d| table.quarter(d, quarter))
            .collect();
        if contributors.is_empty() {
            continue;
        }

        let mut scores = ScoreSet::default();
        for category in Category::ALL {
            if !category.is_defined_in(quarter) {
                continue;
            }
            let values: Vec<f64> = contributors
                .iter()
                .filter_map(|r| r.scores.get(category))
                .collect();
            if values.is_empty() {
                continue;
            }
            scores.set(category, values.iter().sum::<f64>() / values.len() as f64);
        }

        out.quarters.insert(
            quarter,
            QuarterRecord {
                scores,
                comment: average_comment(contributors.len()),
            },
        );
    }
    out
}

/// Division list with the computed aggregate entry in front.
pub fn entries_with_average(
    divisions: &[String],
    table: &ScoreTable,
    label: &str,
) -> Vec<DivisionEntry> {
    let mut entries = Vec::with_capacity(divisions.len() + 1);
    entries.push(DivisionEntry::Aggregate {
        label: label.to_string(),
        record: synthesize_average(divisions, table),
    });
    entries.extend(divisions.iter().map(DivisionEntry::real));
    entries
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryAverage {
    pub category: Category,
    pub average: f64,
    pub quarters_counted: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetencyProfile {
    pub categories: Vec<CategoryAverage>,
    pub best: CategoryAverage,
    pub weakest: CategoryAverage,
}

pub fn category_average(record: Option<&DivisionRecord>, category: Category) -> CategoryAverage {
    let mut sum = 0.0;
    let mut count = 0usize;
    if let Some(record) = record {
        for quarter in Quarter::ALL {
            if !category.is_defined_in(quarter) {
                continue;
            }
            if let Some(v) = record.quarter(quarter).and_then(|q| q.scores.get(category)) {
                sum += v;
                count += 1;
            }
        }
    }
    CategoryAverage {
        category,
        average: if count > 0 { sum / count as f64 } else { 0.0 },
        quarters_counted: count,
    }
}

pub fn competency_profile(record: Option<&DivisionRecord>) -> CompetencyProfile {
    let categories: Vec<CategoryAverage> = Category::ALL
        .iter()
        .map(|c| category_average(record, *c))
        .collect();

    // Stable descending order on the displayed (2-decimal) averages: among
    // equals, best is the lowest category id and weakest the highest.
    let mut ordered = categories.clone();
    ordered.sort_by(|a, b| {
        round_2_decimals(b.average)
            .partial_cmp(&round_2_decimals(a.average))
            .unwrap_or(Ordering::Equal)
    });
    let best = ordered[0];
    let weakest = ordered[ordered.len() - 1];

    CompetencyProfile {
        categories,
        best,
        weakest,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingRow {
    pub rank: usize,
    pub division: String,
    pub total: f64,
}

/// Leaderboard by grand total, highest first. Aggregate entries are skipped,
/// equal totals keep list order, and `limit` of `None` or `Some(0)` keeps every row.
pub fn rank_divisions(
    entries: &[DivisionEntry],
    table: &ScoreTable,
    limit: Option<usize>,
) -> Vec<RankingRow> {
    let mut rows: Vec<(String, f64)> = entries
        .iter()
        .filter_map(|e| e.real_name())
        .map(|name| {
            let total = table.division(name).map(grand_total).unwrap_or(0.0);
            (name.to_string(), total)
        })
        .collect();

    // sort_by is stable.
    rows.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));

    if let Some(n) = limit.filter(|n| *n > 0) {
        rows.truncate(n);
    }

    rows.into_iter()
        .enumerate()
        .map(|(i, (division, total))| RankingRow {
            rank: i + 1,
            division,
            total,
        })
        .collect()
}
