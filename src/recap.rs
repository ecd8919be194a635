use chrono::format::{Item, StrftimeItems};
use chrono::{Datelike, Days, Locale, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt::{self, Write as _};

use crate::store::Student;

pub const TREND_DAYS: u64 = 7;
pub const DEFAULT_TOP_ABSENT_LIMIT: usize = 7;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Present,
    ExcusedLeave,
    Sick,
    Unexcused,
}

impl Status {
    #[cfg(test)]
    pub const ALL: [Status; 4] = [
        Status::Present,
        Status::ExcusedLeave,
        Status::Sick,
        Status::Unexcused,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::ExcusedLeave => "excused_leave",
            Status::Sick => "sick",
            Status::Unexcused => "unexcused",
        }
    }

    /// Accepts wire names, enum names, the Indonesian register labels
    /// (Hadir/Izin/Sakit/Alpa) and their one-letter legend codes.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "present" | "hadir" | "h" => Some(Status::Present),
            "excused_leave" | "excusedleave" | "izin" | "i" => Some(Status::ExcusedLeave),
            "sick" | "sakit" | "s" => Some(Status::Sick),
            "unexcused" | "alpa" | "alpha" | "a" => Some(Status::Unexcused),
            _ => None,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A calendar month, `YYYY-MM` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    pub year: i32,
    pub month: u32,
}

impl MonthKey {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(|_| Self { year, month })
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let (y, m) = raw.trim().split_once('-')?;
        if y.len() != 4 || m.len() != 2 {
            return None;
        }
        Self::new(y.parse().ok()?, m.parse().ok()?)
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.year, self.month, 1).unwrap_or(NaiveDate::MIN)
    }

    /// Day before the first day of the following month.
    pub fn last_day(self) -> NaiveDate {
        let (y, m) = if self.month == 12 {
            (self.year + 1, 1)
        } else {
            (self.year, self.month + 1)
        };
        NaiveDate::from_ymd_opt(y, m, 1)
            .and_then(|d| d.pred_opt())
            .unwrap_or(NaiveDate::MAX)
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        (self.first_day()..=self.last_day()).contains(&date)
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkRow {
    pub student_id: String,
    pub date: NaiveDate,
    pub status: Status,
}

pub type DailyRecap = BTreeMap<String, Status>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusCounts {
    pub present: u32,
    pub excused_leave: u32,
    pub sick: u32,
    pub unexcused: u32,
}

impl StatusCounts {
    pub fn bump(&mut self, status: Status) {
        match status {
            Status::Present => self.present += 1,
            Status::ExcusedLeave => self.excused_leave += 1,
            Status::Sick => self.sick += 1,
            Status::Unexcused => self.unexcused += 1,
        }
    }

    #[cfg(test)]
    pub fn total(&self) -> u32 {
        self.present + self.excused_leave + self.sick + self.unexcused
    }
}

pub type MonthlyTally = BTreeMap<String, StatusCounts>;

/// Student -> status for one date. Students without a mark are simply absent
/// from the map.
pub fn build_daily_recap<'a, I>(date: NaiveDate, marks: I) -> DailyRecap
where
    I: IntoIterator<Item = &'a MarkRow>,
{
    marks
        .into_iter()
        .filter(|m| m.date == date)
        .map(|m| (m.student_id.clone(), m.status))
        .collect()
}

/// Every roster member starts at zero; marks outside the month or for
/// students missing from the roster are skipped.
pub fn build_monthly_tally<'r, 'm, R, I>(month: MonthKey, roster: R, marks: I) -> MonthlyTally
where
    R: IntoIterator<Item = &'r str>,
    I: IntoIterator<Item = &'m MarkRow>,
{
    let mut tally: MonthlyTally = roster
        .into_iter()
        .map(|id| (id.to_string(), StatusCounts::default()))
        .collect();
    for mark in marks {
        if !month.contains(mark.date) {
            continue;
        }
        if let Some(counts) = tally.get_mut(&mark.student_id) {
            counts.bump(mark.status);
        }
    }
    tally
}

/// Status counts for one day's sheet plus the number of roster students
/// nobody has marked yet.
pub fn day_counts(roster: &[Student], recap: &DailyRecap) -> (StatusCounts, usize) {
    let mut counts = StatusCounts::default();
    let mut unmarked = 0;
    for s in roster {
        match recap.get(&s.id) {
            Some(status) => counts.bump(*status),
            None => unmarked += 1,
        }
    }
    (counts, unmarked)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub label: String,
    pub present: usize,
}

/// Seven calendar days ending at `today`, oldest first. Buckets by exact date.
pub fn build_trend<F>(history: &[MarkRow], today: NaiveDate, label: F) -> Vec<TrendPoint>
where
    F: Fn(NaiveDate) -> String,
{
    let mut present_by_day: HashMap<NaiveDate, usize> = HashMap::new();
    for mark in history.iter().filter(|m| m.status == Status::Present) {
        *present_by_day.entry(mark.date).or_default() += 1;
    }

    (0..TREND_DAYS)
        .rev()
        .map(|back| {
            let date = today
                .checked_sub_days(Days::new(back))
                .unwrap_or(NaiveDate::MIN);
            TrendPoint {
                date,
                label: label(date),
                present: present_by_day.get(&date).copied().unwrap_or(0),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedAbsentee {
    pub student_id: String,
    pub name: String,
    pub unexcused: u32,
}

/// Most-unexcused leaderboard. Ties keep roster order.
pub fn top_absentees(roster: &[Student], tally: &MonthlyTally, limit: usize) -> Vec<RankedAbsentee> {
    let mut ranked: Vec<RankedAbsentee> = roster
        .iter()
        .filter_map(|s| {
            let unexcused = tally.get(&s.id).map(|c| c.unexcused).unwrap_or(0);
            (unexcused > 0).then(|| RankedAbsentee {
                student_id: s.id.clone(),
                name: s.name.clone(),
                unexcused,
            })
        })
        .collect();
    ranked.sort_by(|a, b| b.unexcused.cmp(&a.unexcused));
    ranked.truncate(limit);
    ranked
}

pub fn parse_locale(raw: &str) -> Option<Locale> {
    match raw {
        "id_ID" => Some(Locale::id_ID),
        "en_US" => Some(Locale::en_US),
        "en_GB" => Some(Locale::en_GB),
        _ => None,
    }
}

pub fn is_valid_label_format(fmt: &str) -> bool {
    !fmt.is_empty() && !StrftimeItems::new(fmt).any(|item| matches!(item, Item::Error))
}

/// Short chart label such as `01 Jun`.
#[derive(Debug, Clone)]
pub struct TrendLabels {
    pub locale: Locale,
    pub format: String,
}

impl TrendLabels {
    pub fn label(&self, date: NaiveDate) -> String {
        let Some(midnight) = date.and_hms_opt(0, 0, 0) else {
            return date.to_string();
        };
        let dt = Utc.from_utc_datetime(&midnight);
        let mut out = String::new();
        if write!(out, "{}", dt.format_localized(&self.format, self.locale)).is_err() {
            return date.to_string();
        }
        out
    }
}

impl Default for TrendLabels {
    fn default() -> Self {
        Self {
            locale: Locale::id_ID,
            format: "%d %b".to_string(),
        }
    }
}
