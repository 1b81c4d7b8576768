use stepboard::data_processing::History;
use stepboard::gapminder;

/// Re-exports the Gapminder CSV from an already-downloaded history,
/// without touching the network.
fn main() {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() > 4 {
        tracing::error!(
            "Usage: {} [year] [history_file] [gapminder_file]",
            args[0]
        );
        std::process::exit(2);
    }
    let year = match args.get(1) {
        Some(arg) => match arg.parse() {
            Ok(year) => Some(year),
            Err(_) => {
                tracing::error!("{} is not a year", arg);
                std::process::exit(2);
            }
        },
        None => None,
    };
    let history_file = args.get(2).map_or("leaderboard.csv", String::as_str);
    let gapminder_file = args.get(3).map_or("gapminder.csv", String::as_str);

    let result = History::load(history_file)
        .and_then(|history| gapminder::save_gapminder(&history, year, gapminder_file));
    if let Err(err) = result {
        tracing::error!("export failed: {}", err);
        std::process::exit(1);
    }
}
