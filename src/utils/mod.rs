use log::info;
use std::time::{SystemTime, UNIX_EPOCH};

pub fn setup_logging() -> Result<(), fern::InitError> {
    fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}][{}] {}",
                record.level(),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .level_for("reqwest", log::LevelFilter::Warn)
        .level_for("hyper", log::LevelFilter::Warn)
        .chain(std::io::stdout())
        .apply()?;
    info!("Logging initialized.");
    Ok(())
}

/// Seconds since the Unix epoch. Falls back to 0 if the clock is before 1970.
pub fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Parse a comma-separated list of numbers, skipping unparseable entries.
pub fn parse_csv_list<T: std::str::FromStr>(raw: &str) -> Vec<T> {
    raw.split(',')
        .filter_map(|part| part.trim().parse::<T>().ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_csv_list() {
        let sizes: Vec<f64> = parse_csv_list("1, 10,50,junk,100");
        assert_eq!(sizes, vec![1.0, 10.0, 50.0, 100.0]);
        let windows: Vec<usize> = parse_csv_list("5,10,20,50");
        assert_eq!(windows, vec![5, 10, 20, 50]);
    }

    #[test]
    fn test_now_secs_is_sane() {
        // Anything after 2020-01-01 counts as a working clock here.
        assert!(now_secs() > 1_577_836_800);
    }
}
