use crate::data_processing::{History, try_write_slice_to_file};
use crate::errors::Result;
use chrono::Datelike;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// One frame of the Gapminder animation: a person's cumulative step total
/// up to the given day. Field names match the column layout the chart
/// preset expects.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GapminderRow {
    #[serde(rename = "Person")]
    pub person: String,
    /// Day formatted as YYYYMMDD, the granularity the animation steps over.
    pub day: String,
    #[serde(rename = "Steps")]
    pub steps: u64,
    /// Stable 1-based palette index, assigned in order of first appearance.
    #[serde(rename = "Color")]
    pub color: usize,
}

/// Melts the wide history into animation frames: optionally restricted to
/// one calendar year, cumulative per person in date order, and emitted
/// day by day with persons alphabetical within each day.
pub fn reshape(history: &History, year: Option<i32>) -> Vec<GapminderRow> {
    let mut records: Vec<_> = history
        .rows()
        .iter()
        .filter(|record| year.is_none_or(|y| record.date.year() == y))
        .collect();
    records.sort_by(|a, b| (&a.name, a.date).cmp(&(&b.name, b.date)));

    // Running totals per person, then reordered by day for the animation.
    let mut frames = Vec::with_capacity(records.len());
    for (_, group) in &records.into_iter().chunk_by(|record| record.name.clone()) {
        let mut total = 0;
        for record in group {
            total += record.steps;
            frames.push((record.date, record.name.clone(), total));
        }
    }
    frames.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));

    let mut palette = HashMap::new();
    frames
        .into_iter()
        .map(|(date, person, steps)| {
            let next_color = palette.len() + 1;
            let color = *palette.entry(person.clone()).or_insert(next_color);
            GapminderRow {
                person,
                day: date.format("%Y%m%d").to_string(),
                steps,
                color,
            }
        })
        .collect()
}

/// Reshapes the history and writes the Gapminder CSV.
pub fn save_gapminder(history: &History, year: Option<i32>, path: impl AsRef<Path>) -> Result<()> {
    let rows = reshape(history, year);
    let num_people = rows.iter().map(|row| row.color).max().unwrap_or(0);
    tracing::info!(
        "Gapminder export: {} frames across {} people",
        rows.len(),
        num_people
    );
    try_write_slice_to_file(&rows, path)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::data_processing::StepRecord;

    fn rec(name: &str, date: &str, steps: u64) -> StepRecord {
        StepRecord {
            name: name.to_string(),
            date: date.parse().unwrap(),
            steps,
        }
    }

    fn history(records: Vec<StepRecord>) -> History {
        let mut history = History::default();
        history.merge(records);
        history
    }

    #[test]
    fn test_cumulative_steps_per_person() {
        let history = history(vec![
            rec("Alice", "2024-01-01", 5000),
            rec("Alice", "2024-01-02", 4000),
            rec("Alice", "2024-01-03", 1000),
        ]);

        let rows = reshape(&history, None);
        let totals: Vec<u64> = rows.iter().map(|row| row.steps).collect();

        assert_eq!(totals, vec![5000, 9000, 10000]);
        assert_eq!(rows[2].day, "20240103");
    }

    #[test]
    fn test_rows_ordered_by_day_then_person() {
        let history = history(vec![
            rec("Bob", "2024-01-02", 200),
            rec("Alice", "2024-01-01", 100),
            rec("Bob", "2024-01-01", 300),
            rec("Alice", "2024-01-02", 400),
        ]);

        let rows = reshape(&history, None);
        let order: Vec<(&str, &str)> = rows
            .iter()
            .map(|row| (row.day.as_str(), row.person.as_str()))
            .collect();

        assert_eq!(
            order,
            vec![
                ("20240101", "Alice"),
                ("20240101", "Bob"),
                ("20240102", "Alice"),
                ("20240102", "Bob"),
            ]
        );
    }

    #[test]
    fn test_colors_assigned_by_first_appearance() {
        let history = history(vec![
            rec("Bob", "2024-01-01", 200),
            rec("Alice", "2024-01-01", 100),
            rec("Carol", "2024-01-02", 500),
        ]);

        let rows = reshape(&history, None);
        let color_of = |name: &str| {
            rows.iter()
                .find(|row| row.person == name)
                .map(|row| row.color)
                .unwrap()
        };

        // Alphabetical within the first day, then Carol joins on day two.
        assert_eq!(color_of("Alice"), 1);
        assert_eq!(color_of("Bob"), 2);
        assert_eq!(color_of("Carol"), 3);
        assert!(rows.iter().all(|row| row.color == color_of(&row.person)));
    }

    #[test]
    fn test_year_filter_resets_totals() {
        let history = history(vec![
            rec("Alice", "2023-12-31", 8000),
            rec("Alice", "2024-01-01", 5000),
        ]);

        let rows = reshape(&history, Some(2024));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].steps, 5000);
    }

    #[test]
    fn test_empty_history() {
        assert!(reshape(&History::default(), Some(2024)).is_empty());
    }
}
