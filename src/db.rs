use crate::model::{Category, Quarter, QuarterRecord, ScoreSet, ScoreTable, User};
use anyhow::Context;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use uuid::Uuid;

pub const DB_FILE: &str = "scorecard.sqlite3";

/// Division value that marks the administrators' own row in UserData.
const ADMIN_DIVISION: &str = "Admin";

pub fn open_db(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(DB_FILE))?;
    init_schema(&conn)?;
    Ok(conn)
}

/// Raw bytes of the workspace database file.
pub fn read_db_file(workspace: &Path) -> anyhow::Result<Vec<u8>> {
    let path = workspace.join(DB_FILE);
    if !path.is_file() {
        anyhow::bail!("workspace database not found: {}", path.display());
    }
    std::fs::read(&path).with_context(|| format!("failed to read database {}", path.display()))
}

/// Swap the workspace database for `bytes`. The file is written next to the
/// database first and renamed over it, so a failed write leaves it intact.
pub fn replace_db_file(workspace: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    std::fs::create_dir_all(workspace)
        .with_context(|| format!("failed to create workspace {}", workspace.display()))?;
    let dst = workspace.join(DB_FILE);
    let staged = workspace.join(format!("{}.importing", DB_FILE));
    std::fs::write(&staged, bytes)
        .with_context(|| format!("failed to stage database {}", staged.display()))?;
    std::fs::rename(&staged, &dst)
        .with_context(|| format!("failed to move staged database to {}", dst.display()))?;
    Ok(())
}

pub fn init_schema(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS user_data(
            username TEXT NOT NULL,
            password TEXT NOT NULL,
            division TEXT NOT NULL,
            is_admin INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS score_data(
            id TEXT PRIMARY KEY,
            division TEXT NOT NULL,
            quarter INTEGER NOT NULL,
            score1 REAL,
            score2 REAL,
            score3 REAL,
            score4 REAL,
            score5 REAL,
            comment TEXT NOT NULL DEFAULT '',
            UNIQUE(division, quarter)
        )",
        [],
    )?;
    ensure_score_data_updated_at(conn)?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS settings(
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

fn ensure_score_data_updated_at(conn: &Connection) -> anyhow::Result<()> {
    if table_has_column(conn, "score_data", "updated_at")? {
        return Ok(());
    }
    conn.execute("ALTER TABLE score_data ADD COLUMN updated_at TEXT", [])?;
    Ok(())
}

fn table_has_column(conn: &Connection, table: &str, column: &str) -> anyhow::Result<bool> {
    let sql = format!("PRAGMA table_info({})", table);
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let name: String = row.get(1)?;
        if name == column {
            return Ok(true);
        }
    }
    Ok(false)
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserRow {
    pub username: String,
    pub password: String,
    pub division: String,
    pub is_admin: bool,
}

/// Exact match on trimmed credentials; first matching row wins.
pub fn find_user(conn: &Connection, username: &str, password: &str) -> anyhow::Result<Option<User>> {
    let user = conn
        .query_row(
            "SELECT trim(username), division, is_admin
             FROM user_data
             WHERE trim(username) = ?1 AND trim(password) = ?2
             ORDER BY rowid
             LIMIT 1",
            (username.trim(), password.trim()),
            |r| {
                Ok(User {
                    username: r.get(0)?,
                    division: r.get(1)?,
                    is_admin: r.get::<_, i64>(2)? != 0,
                })
            },
        )
        .optional()?;
    Ok(user)
}

/// Distinct non-admin divisions in first-seen row order.
pub fn list_divisions(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT division, is_admin FROM user_data ORDER BY rowid")?;
    let rows = stmt
        .query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)? != 0)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for (division, is_admin) in rows {
        if division.is_empty() || division == ADMIN_DIVISION || is_admin {
            continue;
        }
        if seen.insert(division.clone()) {
            out.push(division);
        }
    }
    Ok(out)
}

/// Replaces the whole user table. Callers own the transaction.
pub fn replace_users(conn: &Connection, users: &[UserRow]) -> anyhow::Result<usize> {
    conn.execute("DELETE FROM user_data", [])?;
    let mut stmt = conn.prepare(
        "INSERT INTO user_data(username, password, division, is_admin) VALUES(?, ?, ?, ?)",
    )?;
    for u in users {
        stmt.execute((
            u.username.trim(),
            u.password.trim(),
            &u.division,
            u.is_admin as i64,
        ))?;
    }
    Ok(users.len())
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoreRow {
    pub division: String,
    pub quarter: Quarter,
    pub record: QuarterRecord,
}

/// Score rows in insertion order, optionally restricted to one division.
pub fn score_rows(conn: &Connection, division: Option<&str>) -> anyhow::Result<Vec<ScoreRow>> {
    let mut stmt = conn.prepare(
        "SELECT division, quarter, score1, score2, score3, score4, score5, comment
         FROM score_data
         WHERE ?1 IS NULL OR division = ?1
         ORDER BY rowid",
    )?;
    let raw = stmt
        .query_map([division], |r| {
            let division: String = r.get(0)?;
            let quarter: i64 = r.get(1)?;
            let mut values: [Option<f64>; 5] = [None; 5];
            for (i, slot) in values.iter_mut().enumerate() {
                *slot = r.get(2 + i)?;
            }
            let comment: Option<String> = r.get(7)?;
            Ok((division, quarter, values, comment.unwrap_or_default()))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut out = Vec::with_capacity(raw.len());
    for (division, quarter, values, comment) in raw {
        if division.is_empty() {
            continue;
        }
        let Some(quarter) = Quarter::new(quarter) else {
            continue;
        };
        let scores = ScoreSet::from_pairs(
            Category::ALL
                .iter()
                .zip(values.iter())
                .filter_map(|(c, v)| v.map(|v| (*c, v))),
        );
        out.push(ScoreRow {
            division,
            quarter,
            record: QuarterRecord { scores, comment },
        });
    }
    Ok(out)
}

pub fn load_scores(conn: &Connection, division: Option<&str>) -> anyhow::Result<ScoreTable> {
    let mut table = ScoreTable::new();
    for row in score_rows(conn, division)? {
        table.upsert(&row.division, row.quarter, row.record);
    }
    Ok(table)
}

/// Overwrite the (division, quarter) row in place, or append it.
/// Categories that do not exist in `quarter` are stored as NULL.
pub fn upsert_scores(
    conn: &Connection,
    division: &str,
    quarter: Quarter,
    scores: &ScoreSet,
    comment: &str,
) -> anyhow::Result<()> {
    let scores = scores.for_quarter(quarter);
    let v = |n: i64| Category::new(n).and_then(|c| scores.get(c));
    conn.execute(
        "INSERT INTO score_data(id, division, quarter, score1, score2, score3, score4, score5, comment, updated_at)
         VALUES(?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
         ON CONFLICT(division, quarter) DO UPDATE SET
           score1 = excluded.score1,
           score2 = excluded.score2,
           score3 = excluded.score3,
           score4 = excluded.score4,
           score5 = excluded.score5,
           comment = excluded.comment,
           updated_at = excluded.updated_at",
        rusqlite::params![
            Uuid::new_v4().to_string(),
            division,
            quarter.number() as i64,
            v(1),
            v(2),
            v(3),
            v(4),
            v(5),
            comment,
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

/// Sheet import in one transaction: users (if given) replace the table and
/// score rows (if given) are upserted. Any failure leaves both tables as they were.
pub fn import_sheet_rows(
    conn: &mut Connection,
    users: Option<&[UserRow]>,
    scores: Option<&[ScoreRow]>,
) -> anyhow::Result<(usize, usize)> {
    let tx = conn.transaction()?;
    let users_imported = match users {
        Some(users) => replace_users(&tx, users)?,
        None => 0,
    };
    let mut scores_imported = 0usize;
    for row in scores.unwrap_or_default() {
        upsert_scores(
            &tx,
            &row.division,
            row.quarter,
            &row.record.scores,
            &row.record.comment,
        )?;
        scores_imported += 1;
    }
    tx.commit()?;
    Ok((users_imported, scores_imported))
}

pub fn settings_get_json(conn: &Connection, key: &str) -> anyhow::Result<Option<serde_json::Value>> {
    let raw: Option<String> = conn
        .query_row(
            "SELECT value_json FROM settings WHERE key = ?",
            [key],
            |r| r.get(0),
        )
        .optional()?;
    match raw {
        Some(s) => Ok(Some(serde_json::from_str(&s)?)),
        None => Ok(None),
    }
}

pub fn settings_set_json(conn: &Connection, key: &str, value: &serde_json::Value) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO settings(key, value_json) VALUES(?, ?)
         ON CONFLICT(key) DO UPDATE SET value_json = excluded.value_json",
        (key, serde_json::to_string(value)?),
    )?;
    Ok(())
}
