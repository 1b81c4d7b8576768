use super::{StepRecord, write_to_csv};
use crate::errors::Result;
use chrono::{Days, NaiveDate};
use std::collections::HashSet;
use std::path::Path;

/// The accumulated leaderboard history, persisted as a local CSV because
/// Garmin only serves the trailing ~6 months. Rows are keyed by
/// (name, date); the file is extended on every run and never truncated.
#[derive(Default)]
pub struct History {
    rows: Vec<StepRecord>,
    keys: HashSet<(String, NaiveDate)>,
}

impl History {
    /// Reads the history file, or starts an empty history if there is none
    /// yet. A row whose key was already seen earlier in the file is dropped,
    /// so the no-duplicate-keys invariant holds even over a damaged file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!("No history at {:?}, starting fresh", path);
                return Ok(Self::default());
            }
            Err(err) => return Err(err.into()),
        };

        let mut history = Self::default();
        let mut reader = csv::Reader::from_reader(file);
        for row in reader.deserialize() {
            let record: StepRecord = row?;
            if !history.insert_if_absent(record.clone()) {
                tracing::warn!(
                    "History at {:?} repeats ({}, {}), dropping the later row",
                    path,
                    record.name,
                    record.date
                );
            }
        }
        tracing::info!("Loaded {} history rows from {:?}", history.len(), path);
        Ok(history)
    }

    /// Merges freshly fetched records. A record whose (name, date) key is
    /// already present is discarded; whatever was recorded first stays.
    /// Returns the number of rows actually inserted, so merging the same
    /// batch twice inserts on the first call and is a no-op on the second.
    pub fn merge(&mut self, records: impl IntoIterator<Item = StepRecord>) -> usize {
        let mut inserted = 0;
        for record in records {
            if self.insert_if_absent(record) {
                inserted += 1;
            }
        }
        inserted
    }

    /// The first date the next download should cover: one day past the
    /// newest recorded date, or `fallback` when the history is empty.
    pub fn next_fetch_date(&self, fallback: NaiveDate) -> NaiveDate {
        self.rows
            .iter()
            .map(|record| record.date)
            .max()
            .and_then(|latest| latest.checked_add_days(Days::new(1)))
            .unwrap_or(fallback)
    }

    /// Writes all rows as CSV, ordered by (date, name) for stable diffs.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut rows = self.rows.clone();
        rows.sort_unstable_by(|a, b| (a.date, &a.name).cmp(&(b.date, &b.name)));
        write_to_csv(&rows, path)
    }

    pub fn rows(&self) -> &[StepRecord] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn insert_if_absent(&mut self, record: StepRecord) -> bool {
        if self.keys.contains(&(record.name.clone(), record.date)) {
            return false;
        }
        self.keys.insert((record.name.clone(), record.date));
        self.rows.push(record);
        true
    }
}
