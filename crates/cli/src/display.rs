//! Terminal rendering of the parking dashboard.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use storage::{Car, Config, StatusMap};

const CELL_WIDTH: usize = 26;

/// Describe when a car was parked, relative to `now`.
///
/// Produces `"<Today|Yesterday|Mon>, <h:mm am> • <N mins ago>"`, or an empty
/// string for a missing timestamp.
pub fn format_time<Tz>(timestamp: i64, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if timestamp == 0 {
        return String::new();
    }
    let Some(parked) = now.timezone().timestamp_millis_opt(timestamp).single() else {
        return String::new();
    };

    let time = parked.format("%-I:%M %P");
    let mins = (now.timestamp_millis() - timestamp).div_euclid(60_000);
    if mins < 1 {
        return format!("Today, {time} • Just now");
    }

    let day = match (now.date_naive() - parked.date_naive()).num_days() {
        0 => "Today".to_string(),
        1 => "Yesterday".to_string(),
        _ => parked.format("%a").to_string(),
    };
    let ago = if mins < 60 {
        plural(mins, "min")
    } else if mins / 60 < 24 {
        plural(mins / 60, "hr")
    } else {
        plural(mins / 60 / 24, "day")
    };
    format!("{day}, {time} • {ago} ago")
}

fn plural(n: i64, unit: &str) -> String {
    if n == 1 {
        format!("{n} {unit}")
    } else {
        format!("{n} {unit}s")
    }
}

/// Render every configured car as a grid of `columns` cells per row.
pub fn render_dashboard<Tz>(
    config: &Config,
    status: &StatusMap,
    columns: u32,
    now: &DateTime<Tz>,
) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    if config.cars.is_empty() {
        return "No cars configured.\n".to_string();
    }

    let cells: Vec<Vec<String>> = config
        .cars
        .iter()
        .map(|car| car_cell(car, status, now))
        .collect();

    let mut out = String::new();
    for row in cells.chunks(columns.max(1) as usize) {
        let height = row.iter().map(Vec::len).max().unwrap_or(0);
        for line in 0..height {
            let text: Vec<String> = row
                .iter()
                .map(|cell| {
                    let part = cell.get(line).map(String::as_str).unwrap_or("");
                    format!("{part:<CELL_WIDTH$}")
                })
                .collect();
            out.push_str(text.join("  ").trim_end());
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

fn car_cell<Tz>(car: &Car, status: &StatusMap, now: &DateTime<Tz>) -> Vec<String>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let mut lines = vec![format!("{} ({})", car.name, car.id)];
    match status.get(&car.id) {
        Some(entry) => {
            lines.push(format!("  at {}", entry.location));
            lines.push(format!("  by {}", entry.user));
            let when = format_time(entry.timestamp, now);
            if !when.is_empty() {
                lines.push(format!("  {when}"));
            }
        }
        None => lines.push("  not parked yet".to_string()),
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use storage::{IconType, StatusEntry};

    fn now() -> DateTime<Utc> {
        // Wednesday
        Utc.with_ymd_and_hms(2026, 3, 11, 15, 30, 0).unwrap()
    }

    fn ago(d: Duration) -> i64 {
        (now() - d).timestamp_millis()
    }

    #[test]
    fn recent_parks_are_just_now() {
        assert_eq!(
            format_time(ago(Duration::seconds(20)), &now()),
            "Today, 3:29 pm • Just now"
        );
    }

    #[test]
    fn minutes_and_hours_are_pluralized() {
        assert_eq!(
            format_time(ago(Duration::minutes(1)), &now()),
            "Today, 3:29 pm • 1 min ago"
        );
        assert_eq!(
            format_time(ago(Duration::minutes(45)), &now()),
            "Today, 2:45 pm • 45 mins ago"
        );
        assert_eq!(
            format_time(ago(Duration::hours(5)), &now()),
            "Today, 10:30 am • 5 hrs ago"
        );
    }

    #[test]
    fn older_parks_use_day_labels() {
        assert_eq!(
            format_time(ago(Duration::hours(20)), &now()),
            "Yesterday, 7:30 pm • 20 hrs ago"
        );
        assert_eq!(
            format_time(ago(Duration::days(3)), &now()),
            "Sun, 3:30 pm • 3 days ago"
        );
        assert_eq!(
            format_time(ago(Duration::days(1)), &now()),
            "Yesterday, 3:30 pm • 1 day ago"
        );
    }

    #[test]
    fn missing_timestamp_renders_nothing() {
        assert_eq!(format_time(0, &now()), "");
    }

    fn car(id: &str, name: &str) -> Car {
        Car {
            id: id.into(),
            name: name.into(),
            icon_type: IconType::default(),
            color: String::new(),
            text_color: String::new(),
        }
    }

    #[test]
    fn dashboard_wraps_cars_into_rows() {
        let config = Config {
            cars: vec![car("c1", "Civic"), car("c2", "Golf"), car("c3", "Model 3")],
            ..Config::default()
        };
        let status = StatusMap::from([(
            "c2".to_string(),
            StatusEntry {
                location: "2B".into(),
                timestamp: ago(Duration::minutes(10)),
                user: "Dad".into(),
            },
        )]);

        let out = render_dashboard(&config, &status, 2, &now());
        let first = out.lines().next().unwrap();
        assert!(first.starts_with("Civic (c1)"));
        assert!(first.contains("Golf (c2)"));
        assert!(out.contains("at 2B"));
        assert!(out.contains("by Dad"));
        assert!(out.contains("10 mins ago"));
        assert!(out.contains("not parked yet"));

        let third_row = out.lines().find(|l| l.contains("Model 3")).unwrap();
        assert!(!third_row.contains("Civic"));
    }

    #[test]
    fn empty_config_says_so() {
        let out = render_dashboard(&Config::default(), &StatusMap::new(), 2, &now());
        assert_eq!(out, "No cars configured.\n");
    }
}
