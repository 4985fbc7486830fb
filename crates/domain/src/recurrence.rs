//! Calendar recurrence expressions.
//!
//! Grammar: `[CRON_TZ=<zone>] minute hour day-of-month month day-of-week [year]`.
//! Every field accepts `*`, literals, comma separated lists, `a-b` ranges and
//! `*/n` or `a-b/n` steps. Day-of-week counts from Sunday = 0. When both
//! day-of-month and day-of-week are restricted a day matching either fires.

use chrono::{
    DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc,
};
use chrono_tz::Tz;
use std::{fmt::Display, str::FromStr};
use thiserror::Error;

const TIMEZONE_PREFIX: &str = "CRON_TZ=";

/// How far past the reference an open ended expression is searched before it is
/// considered to never fire again. Long enough to always include a 29th of February.
const SEARCH_HORIZON_YEARS: i32 = 9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Expected 5 or 6 whitespace separated fields but found {0}")]
    FieldCount(usize),
    #[error("Invalid {field} field: `{value}`")]
    InvalidField { field: &'static str, value: String },
    #[error("Value {value} in the {field} field is outside of {min}-{max}")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },
    #[error("Step in the {0} field must be greater than zero")]
    ZeroStep(&'static str),
    #[error("Unknown timezone: `{0}`")]
    UnknownTimezone(String),
}

struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec {
    name: "minute",
    min: 0,
    max: 59,
};
const HOUR: FieldSpec = FieldSpec {
    name: "hour",
    min: 0,
    max: 23,
};
const DAY_OF_MONTH: FieldSpec = FieldSpec {
    name: "day-of-month",
    min: 1,
    max: 31,
};
const MONTH: FieldSpec = FieldSpec {
    name: "month",
    min: 1,
    max: 12,
};
const DAY_OF_WEEK: FieldSpec = FieldSpec {
    name: "day-of-week",
    min: 0,
    max: 6,
};
const YEAR: FieldSpec = FieldSpec {
    name: "year",
    min: 1970,
    max: 2199,
};

/// The set of values a single field matches.
#[derive(Debug, Clone, PartialEq)]
struct Field {
    min: u32,
    values: Vec<bool>,
    /// `false` when the field was written starting with `*`
    restricted: bool,
}

impl Field {
    fn parse(spec: &FieldSpec, raw: &str) -> Result<Self, ParseError> {
        let invalid = || ParseError::InvalidField {
            field: spec.name,
            value: raw.to_string(),
        };

        let mut values = vec![false; (spec.max - spec.min + 1) as usize];
        for item in raw.split(',') {
            let (range, step) = match item.split_once('/') {
                Some((range, step)) => (range, Some(parse_number(step).ok_or_else(invalid)?)),
                None => (item, None),
            };
            if step == Some(0) {
                return Err(ParseError::ZeroStep(spec.name));
            }

            let (start, end) = if range == "*" {
                (spec.min, spec.max)
            } else if let Some((start, end)) = range.split_once('-') {
                (
                    parse_number(start).ok_or_else(invalid)?,
                    parse_number(end).ok_or_else(invalid)?,
                )
            } else {
                // A step needs a range to walk over: `5/2` is rejected
                if step.is_some() {
                    return Err(invalid());
                }
                let value = parse_number(range).ok_or_else(invalid)?;
                (value, value)
            };

            for value in [start, end] {
                if value < spec.min || value > spec.max {
                    return Err(ParseError::OutOfRange {
                        field: spec.name,
                        value,
                        min: spec.min,
                        max: spec.max,
                    });
                }
            }
            if start > end {
                return Err(invalid());
            }

            for value in (start..=end).step_by(step.unwrap_or(1) as usize) {
                values[(value - spec.min) as usize] = true;
            }
        }

        Ok(Self {
            min: spec.min,
            values,
            restricted: !raw.starts_with('*'),
        })
    }

    fn contains(&self, value: u32) -> bool {
        value >= self.min
            && self
                .values
                .get((value - self.min) as usize)
                .copied()
                .unwrap_or(false)
    }

    fn last(&self) -> Option<u32> {
        self.values
            .iter()
            .rposition(|matches| *matches)
            .map(|index| index as u32 + self.min)
    }
}

fn parse_number(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// A validated recurrence expression.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedExpression {
    source: String,
    timezone: Tz,
    minutes: Field,
    hours: Field,
    days_of_month: Field,
    months: Field,
    days_of_week: Field,
    years: Option<Field>,
}

impl ParsedExpression {
    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// The expression as it was written, without surrounding whitespace
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Returns the earliest instant strictly after `reference` matched by this
    /// expression, or `None` when it never fires again.
    pub fn next_after(&self, reference: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let local = reference.with_timezone(&self.timezone).naive_local();
        let mut candidate = local.with_second(0)?.with_nanosecond(0)? + Duration::minutes(1);

        let last_year = match &self.years {
            Some(years) => years.last()? as i32,
            None => local.year() + SEARCH_HORIZON_YEARS,
        };

        loop {
            if candidate.year() > last_year {
                return None;
            }
            if let Some(years) = &self.years {
                if !years.contains(candidate.year() as u32) {
                    candidate = start_of_year(candidate.year() + 1)?;
                    continue;
                }
            }
            if !self.months.contains(candidate.month()) {
                candidate = start_of_next_month(&candidate)?;
                continue;
            }
            if !self.day_matches(&candidate.date()) {
                candidate = start_of_day(&candidate.date().succ_opt()?)?;
                continue;
            }
            if !self.hours.contains(candidate.hour()) {
                candidate = candidate.with_minute(0)? + Duration::hours(1);
                continue;
            }
            if self.minutes.contains(candidate.minute()) {
                match self.timezone.from_local_datetime(&candidate) {
                    // A wall clock time repeated by a DST fold only fires at its first instant
                    LocalResult::Single(instant) | LocalResult::Ambiguous(instant, _) => {
                        let instant = instant.with_timezone(&Utc);
                        if instant > reference {
                            return Some(instant);
                        }
                    }
                    // Skipped by a DST gap
                    LocalResult::None => {}
                }
            }
            candidate += Duration::minutes(1);
        }
    }

    fn day_matches(&self, date: &NaiveDate) -> bool {
        let dom_matches = self.days_of_month.contains(date.day());
        let dow_matches = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());

        if self.days_of_month.restricted && self.days_of_week.restricted {
            dom_matches || dow_matches
        } else {
            dom_matches && dow_matches
        }
    }
}

fn start_of_day(date: &NaiveDate) -> Option<NaiveDateTime> {
    date.and_hms_opt(0, 0, 0)
}

fn start_of_year(year: i32) -> Option<NaiveDateTime> {
    start_of_day(&NaiveDate::from_ymd_opt(year, 1, 1)?)
}

fn start_of_next_month(datetime: &NaiveDateTime) -> Option<NaiveDateTime> {
    let (year, month) = match datetime.month() {
        12 => (datetime.year() + 1, 1),
        month => (datetime.year(), month + 1),
    };
    start_of_day(&NaiveDate::from_ymd_opt(year, month, 1)?)
}

impl FromStr for ParsedExpression {
    type Err = ParseError;

    fn from_str(expression: &str) -> Result<Self, Self::Err> {
        let source = expression.trim();
        let mut tokens = source.split_whitespace().peekable();

        let timezone = match tokens.peek().and_then(|t| t.strip_prefix(TIMEZONE_PREFIX)) {
            Some(zone) => {
                let tz = zone
                    .parse::<Tz>()
                    .map_err(|_| ParseError::UnknownTimezone(zone.to_string()))?;
                tokens.next();
                tz
            }
            None => Tz::UTC,
        };

        let fields = tokens.collect::<Vec<_>>();
        if fields.len() != 5 && fields.len() != 6 {
            return Err(ParseError::FieldCount(fields.len()));
        }

        Ok(Self {
            source: source.to_string(),
            timezone,
            minutes: Field::parse(&MINUTE, fields[0])?,
            hours: Field::parse(&HOUR, fields[1])?,
            days_of_month: Field::parse(&DAY_OF_MONTH, fields[2])?,
            months: Field::parse(&MONTH, fields[3])?,
            days_of_week: Field::parse(&DAY_OF_WEEK, fields[4])?,
            years: match fields.get(5) {
                Some(raw) => Some(Field::parse(&YEAR, raw)?),
                None => None,
            },
        })
    }
}

impl Display for ParsedExpression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

pub fn parse(expression: &str) -> Result<ParsedExpression, ParseError> {
    expression.parse()
}

/// Parses `expression` and returns its first occurrence strictly after `reference`.
pub fn next(
    expression: &str,
    reference: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, ParseError> {
    Ok(parse(expression)?.next_after(reference))
}
