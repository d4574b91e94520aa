//! ISO-8601 durations (`PT30M`, `P1D`, `P1M`) and calendar arithmetic.

use chrono::{DateTime, Days, Months, TimeDelta, TimeZone};

use crate::error::{PipelineError, Result};

/// A parsed ISO-8601 duration.
///
/// Years and months are kept as calendar months and weeks as days, so
/// `P1M` added to January 31st clamps to the end of February.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IsoDuration {
    months: u32,
    days: u64,
    millis: i64,
}

impl IsoDuration {
    /// Parse `P[nY][nM][nW][nD][T[nH][nM][n[.f]S]]`.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = |reason: &str| {
            PipelineError::InvalidConfiguration(format!(
                "invalid ISO-8601 duration '{}': {}",
                input, reason
            ))
        };

        let body = input
            .trim()
            .strip_prefix(['P', 'p'])
            .ok_or_else(|| invalid("must start with 'P'"))?;
        if body.is_empty() {
            return Err(invalid("no components"));
        }

        let (date_part, time_part) = match body.find(['T', 't']) {
            Some(i) => (&body[..i], Some(&body[i + 1..])),
            None => (body, None),
        };
        if time_part.is_some_and(str::is_empty) {
            return Err(invalid("empty time component"));
        }

        let mut duration = IsoDuration {
            months: 0,
            days: 0,
            millis: 0,
        };

        for (number, unit) in components(date_part).map_err(|e| invalid(&e))? {
            let whole = whole_number(number).ok_or_else(|| invalid("fractional date component"))?;
            match unit {
                'Y' => duration.months += whole * 12,
                'M' => duration.months += whole,
                'W' => duration.days += u64::from(whole) * 7,
                'D' => duration.days += u64::from(whole),
                other => return Err(invalid(&format!("unknown date unit '{}'", other))),
            }
        }

        for (number, unit) in components(time_part.unwrap_or("")).map_err(|e| invalid(&e))? {
            let value: f64 = number.parse().map_err(|_| invalid("bad number"))?;
            let factor = match unit {
                'H' => 3_600_000.0,
                'M' => 60_000.0,
                'S' => 1_000.0,
                other => return Err(invalid(&format!("unknown time unit '{}'", other))),
            };
            duration.millis += (value * factor).round() as i64;
        }

        Ok(duration)
    }

    /// Duration from a number of milliseconds.
    pub fn from_millis(millis: i64) -> Self {
        IsoDuration {
            months: 0,
            days: 0,
            millis,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.months == 0 && self.days == 0 && self.millis == 0
    }

    /// Add this duration to an instant, calendar units first.
    pub fn add_to<Tz: TimeZone>(&self, at: DateTime<Tz>) -> Option<DateTime<Tz>> {
        at.checked_add_months(Months::new(self.months))?
            .checked_add_days(Days::new(self.days))?
            .checked_add_signed(TimeDelta::milliseconds(self.millis))
    }

    /// Subtract this duration from an instant, exact units first.
    pub fn sub_from<Tz: TimeZone>(&self, at: DateTime<Tz>) -> Option<DateTime<Tz>> {
        at.checked_sub_signed(TimeDelta::milliseconds(self.millis))?
            .checked_sub_days(Days::new(self.days))?
            .checked_sub_months(Months::new(self.months))
    }
}

impl std::str::FromStr for IsoDuration {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        IsoDuration::parse(s)
    }
}

/// Split `1Y2M3D` into `[("1", 'Y'), ("2", 'M'), ("3", 'D')]`.
fn components(part: &str) -> std::result::Result<Vec<(&str, char)>, String> {
    let mut out = Vec::new();
    let mut start = 0;
    for (i, c) in part.char_indices() {
        if c.is_ascii_digit() || c == '.' || c == ',' {
            continue;
        }
        let number = &part[start..i];
        if number.is_empty() {
            return Err(format!("unit '{}' without a number", c));
        }
        out.push((number, c.to_ascii_uppercase()));
        start = i + c.len_utf8();
    }
    if start != part.len() {
        return Err(format!("trailing number '{}' without a unit", &part[start..]));
    }
    Ok(out)
}

fn whole_number(number: &str) -> Option<u32> {
    number.parse::<u32>().ok()
}
