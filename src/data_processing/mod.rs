mod garmin_api;
mod history;

pub use garmin_api::{Credentials, GarminClient};
pub use history::History;

use crate::errors::Result;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One participant's step total for one day of the leaderboard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub date: NaiveDate,
    pub steps: u64,
}

impl StepRecord {
    /// The identity under which history rows are deduplicated.
    pub fn key(&self) -> (&str, NaiveDate) {
        (&self.name, self.date)
    }
}

pub(crate) fn write_to_json<T: Serialize + ?Sized>(
    value: &T,
    path: impl AsRef<Path>,
) -> Result<()> {
    let json = serde_json::to_string_pretty(&value)?;
    std::fs::write(path.as_ref(), json)?;
    Ok(())
}

pub(crate) fn write_to_csv<T: Serialize>(values: &[T], path: impl AsRef<Path>) -> Result<()> {
    let file = std::fs::File::create(path.as_ref())?;
    let mut writer = csv::Writer::from_writer(file);
    values.iter().try_for_each(|val| writer.serialize(val))?;
    writer.flush()?;
    Ok(())
}

/// Writes a slice of rows to a file, with the format chosen by extension.
pub fn try_write_slice_to_file<T: Serialize>(values: &[T], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => write_to_json(values, path),
        Some("csv") => write_to_csv(values, path),
        _ => Err(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("invalid or missing filename extension: {:?}", path),
        )
        .into()),
    }
}
