use crate::calc::{self, CompetencyProfile, QuarterPoint, RankingRow};
use crate::db;
use crate::model::{DivisionEntry, DivisionRecord, Quarter, QuarterRecord, ScoreSet, ScoreTable, User};
use rusqlite::Connection;
use serde::Serialize;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{info, warn};

/// What a session needs from persistence. Implemented by the workspace db;
/// tests substitute in-memory fakes.
pub trait ScoreBackend {
    fn login(&self, username: &str, password: &str) -> anyhow::Result<Option<User>>;
    fn divisions(&self) -> anyhow::Result<Vec<String>>;
    fn scores(&self, division: Option<&str>) -> anyhow::Result<ScoreTable>;
    fn save_scores(
        &self,
        division: &str,
        quarter: Quarter,
        scores: &ScoreSet,
        comment: &str,
    ) -> anyhow::Result<()>;
}

impl ScoreBackend for Connection {
    fn login(&self, username: &str, password: &str) -> anyhow::Result<Option<User>> {
        db::find_user(self, username, password)
    }

    fn divisions(&self) -> anyhow::Result<Vec<String>> {
        db::list_divisions(self)
    }

    fn scores(&self, division: Option<&str>) -> anyhow::Result<ScoreTable> {
        db::load_scores(self, division)
    }

    fn save_scores(
        &self,
        division: &str,
        quarter: Quarter,
        scores: &ScoreSet,
        comment: &str,
    ) -> anyhow::Result<()> {
        db::upsert_scores(self, division, quarter, scores, comment)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("administrator rights required")]
    Forbidden,
    #[error("the aggregate entry is computed and cannot be edited")]
    NotEditable,
    #[error("unknown division: {0}")]
    UnknownDivision(String),
    #[error("quarter {0} has no unsynced change")]
    NoUnsyncedChange(u8),
    #[error("save failed: {0:#}")]
    Backend(anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SyncState {
    Synced,
    Pending,
    Unsynced,
}

#[derive(Debug, Clone)]
struct LocalEdit {
    /// Record as last confirmed by the backend; `None` if the quarter was empty.
    previous: Option<QuarterRecord>,
    state: SyncState,
}

#[derive(Debug, Clone, PartialEq)]
enum Selection {
    Aggregate,
    Division(String),
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuarterView {
    pub quarter: Quarter,
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scores: Option<ScoreSet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment: Option<String>,
    pub total: f64,
    pub max_total: f64,
    pub sync: SyncState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreView {
    pub division: String,
    pub aggregate: bool,
    pub editable: bool,
    pub quarters: Vec<QuarterView>,
    pub grand_total: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub division: String,
    pub series: Vec<QuarterPoint>,
    pub total_score: f64,
    pub average_per_quarter: f64,
    pub profile: CompetencyProfile,
    pub ranking: Vec<RankingRow>,
}

/// Client-side state of one logged-in user: the loaded score table, the
/// division picker, and edits that have not been confirmed by the backend.
#[derive(Debug)]
pub struct ScoreSession {
    user: User,
    divisions: Vec<String>,
    table: ScoreTable,
    selected: Selection,
    average_label: String,
    edits: HashMap<(String, Quarter), LocalEdit>,
}

impl ScoreSession {
    /// `Ok(None)` means the credentials matched nobody. Failing reads after a
    /// successful login leave the session with empty data.
    pub fn open(
        backend: &dyn ScoreBackend,
        username: &str,
        password: &str,
        average_label: &str,
    ) -> anyhow::Result<Option<ScoreSession>> {
        let Some(user) = backend.login(username, password)? else {
            return Ok(None);
        };

        let divisions = backend.divisions().unwrap_or_else(|e| {
            warn!(error = %e, "loading divisions failed");
            Vec::new()
        });
        let scope = if user.is_admin {
            None
        } else {
            Some(user.division.as_str())
        };
        let table = backend.scores(scope).unwrap_or_else(|e| {
            warn!(error = %e, "loading scores failed");
            ScoreTable::new()
        });

        let selected = match divisions.first() {
            Some(first) if user.is_admin => Selection::Division(first.clone()),
            _ => Selection::Division(user.division.clone()),
        };

        info!(
            user = %user.username,
            admin = user.is_admin,
            divisions = divisions.len(),
            "session opened"
        );
        Ok(Some(ScoreSession {
            user,
            divisions,
            table,
            selected,
            average_label: average_label.to_string(),
            edits: HashMap::new(),
        }))
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn table(&self) -> &ScoreTable {
        &self.table
    }

    /// Division picker rows. Administrators get the computed aggregate first.
    pub fn entries(&self) -> Vec<DivisionEntry> {
        if self.user.is_admin {
            calc::entries_with_average(&self.divisions, &self.table, &self.average_label)
        } else {
            self.divisions.iter().map(DivisionEntry::real).collect()
        }
    }

    pub fn selected_name(&self) -> &str {
        match &self.selected {
            Selection::Aggregate => &self.average_label,
            Selection::Division(name) => name,
        }
    }

    pub fn select_division(&mut self, name: &str) -> Result<(), SessionError> {
        if !self.user.is_admin {
            if name != self.user.division {
                return Err(SessionError::Forbidden);
            }
        } else if !self.divisions.iter().any(|d| d == name) {
            return Err(SessionError::UnknownDivision(name.to_string()));
        }
        self.selected = Selection::Division(name.to_string());
        Ok(())
    }

    pub fn select_aggregate(&mut self) -> Result<(), SessionError> {
        if !self.user.is_admin {
            return Err(SessionError::Forbidden);
        }
        self.selected = Selection::Aggregate;
        Ok(())
    }

    fn selected_record(&self) -> Option<DivisionRecord> {
        match &self.selected {
            Selection::Aggregate => Some(calc::synthesize_average(&self.divisions, &self.table)),
            Selection::Division(name) => self.table.division(name).cloned(),
        }
    }

    fn sync_state(&self, quarter: Quarter) -> SyncState {
        let Selection::Division(name) = &self.selected else {
            return SyncState::Synced;
        };
        self.edits
            .get(&(name.clone(), quarter))
            .map(|e| e.state)
            .unwrap_or(SyncState::Synced)
    }

    pub fn view(&self) -> ScoreView {
        let record = self.selected_record();
        let aggregate = self.selected == Selection::Aggregate;
        let quarters = Quarter::ALL
            .iter()
            .map(|q| {
                let qr = record.as_ref().and_then(|r| r.quarter(*q));
                QuarterView {
                    quarter: *q,
                    present: qr.is_some(),
                    scores: qr.map(|r| r.scores.clone()),
                    comment: qr.map(|r| r.comment.clone()),
                    total: calc::round_2_decimals(
                        qr.map(|r| calc::quarter_record_total(r, *q)).unwrap_or(0.0),
                    ),
                    max_total: q.max_total(),
                    sync: self.sync_state(*q),
                }
            })
            .collect();

        ScoreView {
            division: self.selected_name().to_string(),
            aggregate,
            editable: self.user.is_admin && !aggregate,
            quarters,
            grand_total: calc::round_2_decimals(
                record.as_ref().map(calc::grand_total).unwrap_or(0.0),
            ),
        }
    }

    pub fn dashboard(&self, ranking_limit: Option<usize>) -> Dashboard {
        let record = self.selected_record();
        let series: Vec<QuarterPoint> = calc::quarterly_series(record.as_ref())
            .into_iter()
            .map(|p| QuarterPoint {
                total: calc::round_2_decimals(p.total),
                ..p
            })
            .collect();
        let total_score: f64 = series.iter().map(|p| p.total).sum();

        let mut profile = calc::competency_profile(record.as_ref());
        for c in profile.categories.iter_mut() {
            c.average = calc::round_2_decimals(c.average);
        }
        profile.best.average = calc::round_2_decimals(profile.best.average);
        profile.weakest.average = calc::round_2_decimals(profile.weakest.average);

        let ranking = calc::rank_divisions(&self.entries(), &self.table, ranking_limit)
            .into_iter()
            .map(|r| RankingRow {
                total: calc::round_2_decimals(r.total),
                ..r
            })
            .collect();

        Dashboard {
            division: self.selected_name().to_string(),
            series,
            total_score: calc::round_2_decimals(total_score),
            average_per_quarter: calc::round_2_decimals(total_score / 4.0),
            profile,
            ranking,
        }
    }

    /// Apply the edit locally, then write it. On a failed write the local value
    /// stays and the quarter is reported `Unsynced` until saved again or reverted.
    pub fn save(
        &mut self,
        backend: &dyn ScoreBackend,
        quarter: Quarter,
        scores: ScoreSet,
        comment: &str,
    ) -> Result<(), SessionError> {
        if !self.user.is_admin {
            return Err(SessionError::Forbidden);
        }
        let division = match &self.selected {
            Selection::Aggregate => return Err(SessionError::NotEditable),
            Selection::Division(name) => name.clone(),
        };

        let record = QuarterRecord {
            scores: scores.for_quarter(quarter),
            comment: comment.to_string(),
        };
        let replaced = self.table.upsert(&division, quarter, record.clone());
        let key = (division.clone(), quarter);
        let previous = match self.edits.remove(&key) {
            Some(earlier) => earlier.previous,
            None => replaced,
        };
        self.edits.insert(
            key.clone(),
            LocalEdit {
                previous,
                state: SyncState::Pending,
            },
        );

        match backend.save_scores(&division, quarter, &record.scores, &record.comment) {
            Ok(()) => {
                self.edits.remove(&key);
                info!(division = %division, quarter = quarter.number(), "scores saved");
                Ok(())
            }
            Err(e) => {
                if let Some(edit) = self.edits.get_mut(&key) {
                    edit.state = SyncState::Unsynced;
                }
                warn!(division = %division, quarter = quarter.number(), error = %e, "save failed; kept as unsynced");
                Err(SessionError::Backend(e))
            }
        }
    }

    /// Drop an unsynced local edit and restore the last confirmed record.
    pub fn revert(&mut self, quarter: Quarter) -> Result<(), SessionError> {
        let Selection::Division(division) = &self.selected else {
            return Err(SessionError::NotEditable);
        };
        let key = (division.clone(), quarter);
        let unsynced = self
            .edits
            .get(&key)
            .is_some_and(|e| e.state == SyncState::Unsynced);
        if !unsynced {
            return Err(SessionError::NoUnsyncedChange(quarter.number()));
        }
        let previous = self.edits.remove(&key).and_then(|e| e.previous);
        match previous {
            Some(prev) => {
                self.table.upsert(&key.0, quarter, prev);
            }
            None => {
                self.table.remove_quarter(&key.0, quarter);
            }
        }
        Ok(())
    }
}
