//! Rendering helpers for listings.

use std::fmt;

const UNIT: u64 = 1024;
const PREFIXES: [char; 6] = ['K', 'M', 'G', 'T', 'P', 'E'];

/// Binary-prefixed size with one decimal, e.g. `976.6 KiB`. Sizes below
/// 1 KiB are printed as plain bytes.
pub fn human_readable_size(bytes: u64) -> String {
    if bytes < UNIT {
        return format!("{bytes} B");
    }

    let mut exponent = 1;
    let mut divisor = UNIT;
    while exponent < PREFIXES.len() && bytes / divisor >= UNIT {
        divisor *= UNIT;
        exponent += 1;
    }

    let value = bytes as f64 / divisor as f64;
    format!("{value:.1} {}iB", PREFIXES[exponent - 1])
}

/// Fixed-width `ls -l` style line for one entry. `date` is usually a
/// [`listing_date`].
pub fn listing_line(
    mode: &str,
    links: u16,
    uid: u16,
    gid: u16,
    size: u64,
    date: &str,
    name: &str,
) -> String {
    format!(
        "{mode} {links:>3} {uid:>5} {gid:>5} {:>10} {date} {name}",
        human_readable_size(size)
    )
}

const MONTHS: [&str; 12] = [
    "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
];

/// A UTC calendar time decoded from seconds since the Unix epoch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Timestamp {
    pub year: i64,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl Timestamp {
    const SECONDS_PER_DAY: u64 = 86_400;

    pub fn from_unix(seconds: u64) -> Self {
        let (year, month, day) = civil_from_days((seconds / Self::SECONDS_PER_DAY) as i64);
        let time = (seconds % Self::SECONDS_PER_DAY) as u32;
        Self {
            year,
            month,
            day,
            hour: time / 3600,
            minute: time / 60 % 60,
            second: time % 60,
        }
    }

    fn month_name(&self) -> &'static str {
        MONTHS[self.month as usize - 1]
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02} UTC",
            self.year, self.month, self.day, self.hour, self.minute, self.second
        )
    }
}

/// `ls` style date: `Nov 05 11:49` within `current_year`, `Nov 05  2014`
/// otherwise.
pub fn listing_date(seconds: u32, current_year: i64) -> String {
    let time = Timestamp::from_unix(u64::from(seconds));
    if time.year == current_year {
        format!(
            "{} {:02} {:02}:{:02}",
            time.month_name(),
            time.day,
            time.hour,
            time.minute
        )
    } else {
        format!("{} {:02} {:>5}", time.month_name(), time.day, time.year)
    }
}

/// Year, month and day of a day count from 1970-01-01 in the proleptic
/// Gregorian calendar.
///
/// See <http://howardhinnant.github.io/date_algorithms.html#civil_from_days>
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let day_of_era = z.rem_euclid(146_097);
    let year_of_era =
        (day_of_era - day_of_era / 1460 + day_of_era / 36_524 - day_of_era / 146_096) / 365;
    let day_of_year = day_of_era - (365 * year_of_era + year_of_era / 4 - year_of_era / 100);
    // Months counted from March, so the leap day is last.
    let shifted_month = (5 * day_of_year + 2) / 153;
    let day = day_of_year - (153 * shifted_month + 2) / 5 + 1;
    let month = if shifted_month < 10 {
        shifted_month + 3
    } else {
        shifted_month - 9
    };
    let year = year_of_era + era * 400 + i64::from(month <= 2);
    (year, month as u32, day as u32)
}
