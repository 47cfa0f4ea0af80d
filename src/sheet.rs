//! CSV exports of the two spreadsheet tabs the scorecard was kept in:
//! `UserData` (username, password, division, isAdmin) and
//! `ScoreData` (division, quarter, score1..score5, comment).

use crate::db::{ScoreRow, UserRow};
use crate::model::{Category, Quarter, QuarterRecord, ScoreSet};
use anyhow::Context;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

pub const SCORE_SHEET_HEADER: [&str; 8] = [
    "division", "quarter", "score1", "score2", "score3", "score4", "score5", "comment",
];

fn records<R: Read>(input: R, skip_header: bool) -> anyhow::Result<Vec<csv::StringRecord>> {
    let rdr = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(input);
    let mut out = Vec::new();
    for (idx, rec) in rdr.into_records().enumerate() {
        let rec = rec.with_context(|| format!("malformed csv line {}", idx + 1))?;
        if idx == 0 && skip_header {
            continue;
        }
        if rec.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        out.push(rec);
    }
    Ok(out)
}

fn cell<'a>(rec: &'a csv::StringRecord, idx: usize) -> &'a str {
    rec.get(idx).unwrap_or("")
}

/// Spreadsheet numeric cell: blank or unparseable reads as 0.
fn number_or_zero(raw: &str) -> f64 {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

fn leading_int(raw: &str) -> Option<i64> {
    let s = raw.trim();
    let end = s
        .char_indices()
        .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse::<i64>().ok()
}

pub fn parse_user_sheet<R: Read>(input: R, skip_header: bool) -> anyhow::Result<Vec<UserRow>> {
    let rows = records(input, skip_header)?
        .iter()
        .map(|rec| UserRow {
            username: cell(rec, 0).trim().to_string(),
            password: cell(rec, 1).trim().to_string(),
            division: cell(rec, 2).to_string(),
            is_admin: cell(rec, 3).trim().to_uppercase() == "TRUE",
        })
        .collect();
    Ok(rows)
}

/// Rows without a division or with a quarter outside 1..=4 are skipped.
pub fn parse_score_sheet<R: Read>(input: R, skip_header: bool) -> anyhow::Result<Vec<ScoreRow>> {
    let mut out = Vec::new();
    for (idx, rec) in records(input, skip_header)?.iter().enumerate() {
        let division = cell(rec, 0);
        if division.is_empty() {
            debug!(row = idx, "score row without division skipped");
            continue;
        }
        let Some(quarter) = leading_int(cell(rec, 1)).and_then(Quarter::new) else {
            debug!(row = idx, quarter = cell(rec, 1), "score row with invalid quarter skipped");
            continue;
        };
        let scores = ScoreSet::from_pairs(
            Category::ALL
                .iter()
                .enumerate()
                .map(|(i, c)| (*c, number_or_zero(cell(rec, 2 + i)))),
        );
        out.push(ScoreRow {
            division: division.to_string(),
            quarter,
            record: QuarterRecord {
                scores,
                comment: cell(rec, 7).to_string(),
            },
        });
    }
    Ok(out)
}

pub fn read_user_sheet(path: &Path, skip_header: bool) -> anyhow::Result<Vec<UserRow>> {
    let f = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    parse_user_sheet(f, skip_header)
}

pub fn read_score_sheet(path: &Path, skip_header: bool) -> anyhow::Result<Vec<ScoreRow>> {
    let f = std::fs::File::open(path)
        .with_context(|| format!("failed to open {}", path.to_string_lossy()))?;
    parse_score_sheet(f, skip_header)
}

pub fn write_score_sheet_to<W: Write>(output: W, rows: &[ScoreRow]) -> anyhow::Result<usize> {
    let mut wtr = csv::Writer::from_writer(output);
    wtr.write_record(SCORE_SHEET_HEADER)?;
    for row in rows {
        let mut rec: Vec<String> = Vec::with_capacity(SCORE_SHEET_HEADER.len());
        rec.push(row.division.clone());
        rec.push(row.quarter.number().to_string());
        for c in Category::ALL {
            rec.push(
                row.record
                    .scores
                    .get(c)
                    .map(|v| v.to_string())
                    .unwrap_or_default(),
            );
        }
        rec.push(row.record.comment.clone());
        wtr.write_record(&rec)?;
    }
    wtr.flush()?;
    Ok(rows.len())
}

pub fn write_score_sheet(path: &Path, rows: &[ScoreRow]) -> anyhow::Result<usize> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let f = std::fs::File::create(path)
        .with_context(|| format!("failed to create {}", path.to_string_lossy()))?;
    write_score_sheet_to(f, rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c(n: i64) -> Category {
        Category::new(n).expect("category")
    }

    #[test]
    fn user_sheet_reads_admin_flag_case_insensitively() {
        let csv = "username,password,division,isAdmin\n\
                   boss , pw ,Admin,true\n\
                   fin1,pw,Finance,FALSE\n\
                   ,,,\n\
                   hr1,pw,HR,\n";
        let users = parse_user_sheet(csv.as_bytes(), true).expect("parse");
        assert_eq!(users.len(), 3);
        assert_eq!(users[0].username, "boss");
        assert_eq!(users[0].password, "pw");
        assert!(users[0].is_admin);
        assert!(!users[1].is_admin);
        assert!(!users[2].is_admin);
    }

    #[test]
    fn score_sheet_skips_bad_rows_and_zero_fills_cells() {
        let csv = "division,quarter,s1,s2,s3,s4,s5,comment\n\
                   Finance,2,18,16,20,14,0,ok\n\
                   ,1,1,1,1,1,1,orphan\n\
                   HR,7,1,1,1,1,1,bad quarter\n\
                   HR,4.0,abc,,25,-2,9\n";
        let rows = parse_score_sheet(csv.as_bytes(), true).expect("parse");
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].division, "Finance");
        assert_eq!(rows[0].quarter.number(), 2);
        assert_eq!(rows[0].record.comment, "ok");

        let hr = &rows[1].record.scores;
        assert_eq!(rows[1].quarter, Quarter::Q4);
        assert_eq!(hr.get(c(1)), Some(0.0));
        assert_eq!(hr.get(c(2)), Some(0.0));
        assert_eq!(hr.get(c(3)), Some(20.0));
        assert_eq!(hr.get(c(4)), Some(0.0));
        assert_eq!(hr.get(c(5)), Some(9.0));
        assert_eq!(rows[1].record.comment, "");
    }

    #[test]
    fn header_row_can_be_kept() {
        let csv = "Finance,1,10,10,10,10,,first row is data\n";
        let rows = parse_score_sheet(csv.as_bytes(), false).expect("parse");
        assert_eq!(rows.len(), 1);
        assert!(parse_score_sheet(csv.as_bytes(), true).expect("parse").is_empty());
    }

    #[test]
    fn export_writes_blank_cells_for_absent_categories() {
        let rows = vec![ScoreRow {
            division: "Finance".into(),
            quarter: Quarter::new(2).expect("q2"),
            record: QuarterRecord {
                scores: ScoreSet::from_pairs([(c(1), 18.0), (c(2), 16.5)]),
                comment: "ok, fine".into(),
            },
        }];
        let mut buf: Vec<u8> = Vec::new();
        assert_eq!(write_score_sheet_to(&mut buf, &rows).expect("write"), 1);
        let text = String::from_utf8(buf).expect("utf8");
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("division,quarter,score1,score2,score3,score4,score5,comment")
        );
        assert_eq!(lines.next(), Some("Finance,2,18,16.5,,,,\"ok, fine\""));
    }
}
