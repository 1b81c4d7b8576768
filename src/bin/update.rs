use chrono::{Datelike, Days, NaiveDate, Utc};
use stepboard::data_processing::{Credentials, GarminClient, History};
use stepboard::errors::Result;
use stepboard::gapminder;
use std::time::Duration;

/// Garmin throttles the userstats service, so leave a beat between the
/// per-day leaderboard requests.
const REQUEST_INTERVAL: Duration = Duration::from_secs(1);

fn run(history_file: &str, gapminder_file: &str) -> Result<()> {
    let mut client = GarminClient::new(false);
    client.login(Credentials::from_env().as_ref())?;
    if let Some(name) = &client.full_name {
        tracing::info!("Logged in as {}", name);
    }

    let mut history = History::load(history_file)?;

    // Download every day the history doesn't cover yet, up to yesterday.
    // An empty history starts at January 1 of the previous year.
    let today = Utc::now().date_naive();
    let last_year = today.year() - 1;
    let fallback = NaiveDate::from_ymd_opt(last_year, 1, 1).unwrap();
    let yesterday = today.pred_opt().unwrap();

    let mut date = history.next_fetch_date(fallback);
    while date <= yesterday {
        tracing::info!("get: {}", date);
        let records = client.fetch_steps(date)?;
        let inserted = history.merge(records);
        tracing::info!("merged {} new rows for {}", inserted, date);

        date = date.checked_add_days(Days::new(1)).unwrap();
        if date <= yesterday {
            std::thread::sleep(REQUEST_INTERVAL);
        }
    }

    history.save(history_file)?;
    tracing::info!("history: {} rows in {:?}", history.len(), history_file);

    gapminder::save_gapminder(&history, Some(last_year), gapminder_file)
}

fn main() {
    tracing_subscriber::fmt::init();

    // Both output paths are optional and positional
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 3 {
        tracing::error!("Usage: {} [history_file] [gapminder_file]", args[0]);
        std::process::exit(2);
    }
    let history_file = args.get(1).map_or("leaderboard.csv", String::as_str);
    let gapminder_file = args.get(2).map_or("gapminder.csv", String::as_str);

    if let Err(err) = run(history_file, gapminder_file) {
        tracing::error!("update failed: {}", err);
        std::process::exit(1);
    }
}
