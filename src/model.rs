use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MIN_SCORE: f64 = 0.0;
pub const MAX_SCORE: f64 = 20.0;

/// Clamp a raw score into `[0, 20]`. NaN reads as 0.
pub fn clamp_score(v: f64) -> f64 {
    if v.is_nan() {
        return MIN_SCORE;
    }
    v.clamp(MIN_SCORE, MAX_SCORE)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Quarter(u8);

impl Quarter {
    pub const Q4: Quarter = Quarter(4);
    pub const ALL: [Quarter; 4] = [Quarter(1), Quarter(2), Quarter(3), Quarter(4)];

    pub fn new(n: i64) -> Option<Self> {
        if (1..=4).contains(&n) {
            Some(Quarter(n as u8))
        } else {
            None
        }
    }

    pub fn number(self) -> u8 {
        self.0
    }

    /// Highest total a quarter can reach: 80 for Q1-Q3, 100 for Q4.
    pub fn max_total(self) -> f64 {
        let defined = Category::ALL
            .iter()
            .filter(|c| c.is_defined_in(self))
            .count();
        defined as f64 * MAX_SCORE
    }
}

impl TryFrom<u8> for Quarter {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Quarter::new(n as i64).ok_or_else(|| format!("quarter must be 1..=4, got {}", n))
    }
}

impl From<Quarter> for u8 {
    fn from(q: Quarter) -> u8 {
        q.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Category(u8);

impl Category {
    pub const ALL: [Category; 5] = [
        Category(1),
        Category(2),
        Category(3),
        Category(4),
        Category(5),
    ];

    pub fn new(n: i64) -> Option<Self> {
        if (1..=5).contains(&n) {
            Some(Category(n as u8))
        } else {
            None
        }
    }

    pub fn id(self) -> u8 {
        self.0
    }

    fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    /// Category 5 (risk reduction achieved) only exists in the year-end quarter.
    pub fn is_defined_in(self, quarter: Quarter) -> bool {
        self.0 != 5 || quarter == Quarter::Q4
    }
}

impl TryFrom<u8> for Category {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Category::new(n as i64).ok_or_else(|| format!("category must be 1..=5, got {}", n))
    }
}

impl From<Category> for u8 {
    fn from(c: Category) -> u8 {
        c.0
    }
}

/// Per-category scores of one quarter. Every stored value is already clamped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<u8, f64>", into = "BTreeMap<u8, f64>")]
pub struct ScoreSet {
    values: [Option<f64>; 5],
}

impl ScoreSet {
    pub fn get(&self, category: Category) -> Option<f64> {
        self.values[category.index()]
    }

    pub fn set(&mut self, category: Category, value: f64) {
        self.values[category.index()] = Some(clamp_score(value));
    }

    pub fn present(&self) -> impl Iterator<Item = (Category, f64)> + '_ {
        Category::ALL
            .iter()
            .filter_map(move |c| self.get(*c).map(|v| (*c, v)))
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_none())
    }

    /// Drop categories that do not exist in `quarter`.
    pub fn for_quarter(&self, quarter: Quarter) -> ScoreSet {
        let mut out = ScoreSet::default();
        for (c, v) in self.present() {
            if c.is_defined_in(quarter) {
                out.set(c, v);
            }
        }
        out
    }

    pub fn from_pairs<I>(pairs: I) -> ScoreSet
    where
        I: IntoIterator<Item = (Category, f64)>,
    {
        let mut out = ScoreSet::default();
        for (c, v) in pairs {
            out.set(c, v);
        }
        out
    }
}

impl TryFrom<BTreeMap<u8, f64>> for ScoreSet {
    type Error = String;

    fn try_from(raw: BTreeMap<u8, f64>) -> Result<Self, Self::Error> {
        let mut out = ScoreSet::default();
        for (k, v) in raw {
            let c = Category::try_from(k)?;
            out.set(c, v);
        }
        Ok(out)
    }
}

impl From<ScoreSet> for BTreeMap<u8, f64> {
    fn from(s: ScoreSet) -> Self {
        s.present().map(|(c, v)| (c.id(), v)).collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QuarterRecord {
    pub scores: ScoreSet,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DivisionRecord {
    #[serde(default)]
    pub quarters: BTreeMap<Quarter, QuarterRecord>,
}

impl DivisionRecord {
    pub fn quarter(&self, quarter: Quarter) -> Option<&QuarterRecord> {
        self.quarters.get(&quarter)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreTable(BTreeMap<String, DivisionRecord>);

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn division(&self, name: &str) -> Option<&DivisionRecord> {
        self.0.get(name)
    }

    pub fn quarter(&self, division: &str, quarter: Quarter) -> Option<&QuarterRecord> {
        self.0.get(division).and_then(|d| d.quarter(quarter))
    }

    /// Overwrite or create the (division, quarter) entry. Returns the previous record.
    pub fn upsert(
        &mut self,
        division: &str,
        quarter: Quarter,
        record: QuarterRecord,
    ) -> Option<QuarterRecord> {
        self.0
            .entry(division.to_string())
            .or_default()
            .quarters
            .insert(quarter, record)
    }

    pub fn remove_quarter(&mut self, division: &str, quarter: Quarter) -> Option<QuarterRecord> {
        let d = self.0.get_mut(division)?;
        let removed = d.quarters.remove(&quarter);
        if d.quarters.is_empty() {
            self.0.remove(division);
        }
        removed
    }

    pub fn divisions(&self) -> impl Iterator<Item = (&String, &DivisionRecord)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    pub division: String,
    pub is_admin: bool,
}

/// One row of the division picker. The aggregate row is computed, never stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum DivisionEntry {
    Real { name: String },
    Aggregate { label: String, record: DivisionRecord },
}

impl DivisionEntry {
    pub fn real(name: impl Into<String>) -> Self {
        DivisionEntry::Real { name: name.into() }
    }

    pub fn display_name(&self) -> &str {
        match self {
            DivisionEntry::Real { name } => name,
            DivisionEntry::Aggregate { label, .. } => label,
        }
    }

    pub fn real_name(&self) -> Option<&str> {
        match self {
            DivisionEntry::Real { name } => Some(name),
            DivisionEntry::Aggregate { .. } => None,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, DivisionEntry::Aggregate { .. })
    }
}
