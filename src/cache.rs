use chrono::NaiveDate;
use std::collections::HashMap;

use crate::recap::{DailyRecap, MonthKey, MonthlyTally};

/// Memoised daily recaps and monthly tallies, keyed by acting teacher.
///
/// Entries are dropped by the writes that touch them; nothing expires on its own.
#[derive(Debug, Default)]
pub struct RecapCache {
    daily: HashMap<(String, NaiveDate), DailyRecap>,
    monthly: HashMap<(String, MonthKey), MonthlyTally>,
}

impl RecapCache {
    pub fn daily(&self, teacher_id: &str, date: NaiveDate) -> Option<&DailyRecap> {
        self.daily.get(&(teacher_id.to_string(), date))
    }

    pub fn put_daily(&mut self, teacher_id: &str, date: NaiveDate, recap: DailyRecap) {
        self.daily.insert((teacher_id.to_string(), date), recap);
    }

    pub fn monthly(&self, teacher_id: &str, month: MonthKey) -> Option<&MonthlyTally> {
        self.monthly.get(&(teacher_id.to_string(), month))
    }

    pub fn put_monthly(&mut self, teacher_id: &str, month: MonthKey, tally: MonthlyTally) {
        self.monthly.insert((teacher_id.to_string(), month), tally);
    }

    /// A write on `date` may move a mark between teachers, so every teacher's
    /// view of that day and month goes.
    pub fn invalidate_date(&mut self, date: NaiveDate) {
        let month = MonthKey::of(date);
        self.daily.retain(|(_, d), _| *d != date);
        self.monthly.retain(|(_, m), _| *m != month);
    }

    /// Roster changes reshape every tally.
    pub fn invalidate_monthly(&mut self) {
        self.monthly.clear();
    }

    pub fn invalidate_all(&mut self) {
        self.daily.clear();
        self.monthly.clear();
    }
}
