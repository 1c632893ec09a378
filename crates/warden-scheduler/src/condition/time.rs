//! Time-based condition variants.
//!
//! All variants keep concrete UTC instants internally so that pause
//! compensation is a uniform `shift_by` over every stored instant.

use chrono::{DateTime, Datelike, Duration as TimeDelta, NaiveTime, Utc, Weekday};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use warden_core::{Result, WardenError};

use super::Condition;

/// Parse a `"HH:MM"` duration string into a [`Duration`].
pub fn parse_hh_mm(s: &str) -> Result<Duration> {
    let (h, m) = s
        .split_once(':')
        .ok_or_else(|| WardenError::Config(format!("invalid duration '{s}', expected HH:MM")))?;
    let hours: u64 = h
        .trim()
        .parse()
        .map_err(|_| WardenError::Config(format!("invalid hours in duration '{s}'")))?;
    let minutes: u64 = m
        .trim()
        .parse()
        .map_err(|_| WardenError::Config(format!("invalid minutes in duration '{s}'")))?;
    if minutes >= 60 {
        return Err(WardenError::Config(format!("minutes out of range in duration '{s}'")));
    }
    Ok(Duration::from_secs(hours * 3600 + minutes * 60))
}

fn to_delta(d: Duration) -> TimeDelta {
    TimeDelta::from_std(d).unwrap_or(TimeDelta::MAX)
}

/// Satisfied once a randomized interval has elapsed, then re-armed by `reset`.
///
/// With `min == max` the interval is fixed; otherwise each cycle draws a
/// fresh length uniformly from the band.
#[derive(Clone)]
pub struct IntervalCondition {
    min: TimeDelta,
    max: TimeDelta,
    armed_at: DateTime<Utc>,
    next_trigger: DateTime<Utc>,
}

impl IntervalCondition {
    pub fn new(interval: Duration) -> Self {
        Self::randomized(interval, interval)
    }

    /// Interval with a randomized band; each cycle draws from `[min, max]`.
    pub fn randomized(min: Duration, max: Duration) -> Self {
        let (min, max) = (to_delta(min), to_delta(max.max(min)));
        let now = Utc::now();
        let mut cond = Self { min, max, armed_at: now, next_trigger: now };
        cond.arm(now);
        cond
    }

    /// Interval from a `"HH:MM"` duration string.
    pub fn from_hh_mm(s: &str) -> Result<Self> {
        Ok(Self::new(parse_hh_mm(s)?))
    }

    pub fn interval(&self) -> TimeDelta {
        self.min
    }

    fn draw(&self) -> TimeDelta {
        if self.min >= self.max {
            return self.min;
        }
        let (lo, hi) = (self.min.num_milliseconds(), self.max.num_milliseconds());
        TimeDelta::milliseconds(rand::thread_rng().gen_range(lo..=hi))
    }

    fn arm(&mut self, now: DateTime<Utc>) {
        self.armed_at = now;
        self.next_trigger = now + self.draw();
    }
}

impl Condition for IntervalCondition {
    fn description(&self) -> String {
        if self.min >= self.max {
            format!("every {}s", self.min.num_seconds())
        } else {
            format!("every {}s-{}s", self.min.num_seconds(), self.max.num_seconds())
        }
    }

    fn identity(&self) -> String {
        format!("interval:{}:{}", self.min.num_seconds(), self.max.num_seconds())
    }

    fn is_satisfied(&self) -> bool {
        Utc::now() >= self.next_trigger
    }

    fn progress_percent(&self) -> f64 {
        let total = (self.next_trigger - self.armed_at).num_milliseconds();
        if total <= 0 {
            return 100.0;
        }
        let elapsed = (Utc::now() - self.armed_at).num_milliseconds();
        ((elapsed as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
    }

    fn current_trigger_time(&self) -> Option<DateTime<Utc>> {
        if self.is_satisfied() { None } else { Some(self.next_trigger) }
    }

    fn reset(&mut self) {
        self.arm(Utc::now());
    }

    fn shift_by(&mut self, delta: TimeDelta) {
        self.armed_at += delta;
        self.next_trigger += delta;
    }

    fn is_time_based(&self) -> bool {
        true
    }

    fn clone_box(&self) -> Box<dyn Condition> {
        Box::new(self.clone())
    }
}

/// How a time window repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RepeatCycle {
    Once,
    Minutely,
    Hourly,
    Daily,
    Weekly,
}

impl RepeatCycle {
    fn period(self, every: u32) -> Option<TimeDelta> {
        let every = every.max(1) as i64;
        match self {
            RepeatCycle::Once => None,
            RepeatCycle::Minutely => Some(TimeDelta::minutes(every)),
            RepeatCycle::Hourly => Some(TimeDelta::hours(every)),
            RepeatCycle::Daily => Some(TimeDelta::days(every)),
            RepeatCycle::Weekly => Some(TimeDelta::weeks(every)),
        }
    }
}

/// Satisfied while the current instant falls inside a recurring window.
///
/// A window whose end time precedes its start time crosses midnight. `reset`
/// consumes the current window and rolls to the next cycle; with
/// [`RepeatCycle::Once`] the condition is one-time.
#[derive(Clone)]
pub struct TimeWindowCondition {
    start: NaiveTime,
    end: NaiveTime,
    cycle: RepeatCycle,
    every: u32,
    window_open: DateTime<Utc>,
    window_close: DateTime<Utc>,
    jitter: TimeDelta,
    jitter_offset: TimeDelta,
    consumed: bool,
}

impl TimeWindowCondition {
    pub fn new(start: NaiveTime, end: NaiveTime, cycle: RepeatCycle, every: u32) -> Self {
        let now = Utc::now();
        let date = now.date_naive();
        let open = date.and_time(start).and_utc();
        let mut close = date.and_time(end).and_utc();
        if close <= open {
            close += TimeDelta::days(1);
        }
        Self {
            start,
            end,
            cycle,
            every: every.max(1),
            window_open: open,
            window_close: close,
            jitter: TimeDelta::zero(),
            jitter_offset: TimeDelta::zero(),
            consumed: false,
        }
    }

    /// Daily window, the common case.
    pub fn daily(start: NaiveTime, end: NaiveTime) -> Self {
        Self::new(start, end, RepeatCycle::Daily, 1)
    }

    /// Randomize each cycle's window edges by up to `jitter` in either
    /// direction. The window keeps its width; a fresh offset is drawn on
    /// every `reset`.
    pub fn with_jitter(mut self, jitter: Duration) -> Self {
        self.jitter = to_delta(jitter);
        self.jitter_offset = Self::draw_jitter(self.jitter);
        self
    }

    fn draw_jitter(jitter: TimeDelta) -> TimeDelta {
        let ms = jitter.num_milliseconds();
        if ms <= 0 {
            return TimeDelta::zero();
        }
        TimeDelta::milliseconds(rand::thread_rng().gen_range(-ms..=ms))
    }

    /// The unjittered window containing `now`, or the next one after it.
    fn current_window_base(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let (mut open, mut close) = (self.window_open, self.window_close);
        if let Some(period) = self.cycle.period(self.every) {
            if now >= close {
                let behind = (now - close).num_seconds();
                let k = behind / period.num_seconds() + 1;
                let shift = TimeDelta::seconds(period.num_seconds() * k);
                open += shift;
                close += shift;
            }
        }
        (open, close)
    }

    fn current_window(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let (open, close) = self.current_window_base(now);
        (open + self.jitter_offset, close + self.jitter_offset)
    }
}

impl Condition for TimeWindowCondition {
    fn description(&self) -> String {
        format!(
            "window {}-{} {:?}/{}",
            self.start.format("%H:%M"),
            self.end.format("%H:%M"),
            self.cycle,
            self.every
        )
    }

    fn identity(&self) -> String {
        format!(
            "window:{}:{}:{:?}:{}:{}",
            self.start,
            self.end,
            self.cycle,
            self.every,
            self.jitter.num_seconds()
        )
    }

    fn is_satisfied(&self) -> bool {
        if self.consumed {
            return false;
        }
        let now = Utc::now();
        let (open, close) = self.current_window(now);
        now >= open && now < close
    }

    fn progress_percent(&self) -> f64 {
        let now = Utc::now();
        let (open, close) = self.current_window(now);
        if now < open || self.consumed {
            return 0.0;
        }
        let total = (close - open).num_milliseconds();
        if total <= 0 {
            return 100.0;
        }
        let elapsed = (now - open).num_milliseconds();
        ((elapsed as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
    }

    fn current_trigger_time(&self) -> Option<DateTime<Utc>> {
        if self.consumed || self.is_satisfied() {
            return None;
        }
        let now = Utc::now();
        let (open, close) = self.current_window(now);
        if now < open {
            return Some(open);
        }
        // Past the close of a non-repeating window.
        let _ = close;
        None
    }

    fn is_one_time(&self) -> bool {
        self.cycle == RepeatCycle::Once
    }

    fn can_trigger_again(&self) -> bool {
        if self.cycle == RepeatCycle::Once {
            !self.consumed && Utc::now() < self.window_close
        } else {
            true
        }
    }

    fn reset(&mut self) {
        let now = Utc::now();
        if self.cycle == RepeatCycle::Once {
            if now >= self.window_open + self.jitter_offset {
                self.consumed = true;
            }
            return;
        }
        // Roll the stored anchor to the first window strictly after now.
        let (open, close) = self.current_window_base(now);
        if now >= open + self.jitter_offset {
            if let Some(period) = self.cycle.period(self.every) {
                self.window_open = open + period;
                self.window_close = close + period;
                self.jitter_offset = Self::draw_jitter(self.jitter);
                return;
            }
        }
        self.window_open = open;
        self.window_close = close;
        self.jitter_offset = Self::draw_jitter(self.jitter);
    }

    fn hard_reset(&mut self) {
        self.consumed = false;
        let fresh = Self::new(self.start, self.end, self.cycle, self.every);
        self.window_open = fresh.window_open;
        self.window_close = fresh.window_close;
        self.jitter_offset = Self::draw_jitter(self.jitter);
    }

    fn shift_by(&mut self, delta: TimeDelta) {
        self.window_open += delta;
        self.window_close += delta;
    }

    fn is_time_based(&self) -> bool {
        true
    }

    fn clone_box(&self) -> Box<dyn Condition> {
        Box::new(self.clone())
    }
}

/// Satisfied on selected weekdays, bounded by per-day and per-week run caps
/// and optionally gated by a nested interval.
///
/// Caps of zero mean unlimited. A run is charged against the caps when the
/// owner calls `reset` after the run.
#[derive(Clone)]
pub struct DayOfWeekCondition {
    days: Vec<Weekday>,
    max_per_day: u32,
    max_per_week: u32,
    interval: Option<IntervalCondition>,
    last_run_date: Option<chrono::NaiveDate>,
    runs_today: u32,
    week_anchor: Option<chrono::NaiveDate>,
    runs_this_week: u32,
}

impl DayOfWeekCondition {
    pub fn new(days: Vec<Weekday>) -> Self {
        let mut days = days;
        days.sort_by_key(|d| d.num_days_from_monday());
        days.dedup();
        Self {
            days,
            max_per_day: 0,
            max_per_week: 0,
            interval: None,
            last_run_date: None,
            runs_today: 0,
            week_anchor: None,
            runs_this_week: 0,
        }
    }

    pub fn with_caps(mut self, max_per_day: u32, max_per_week: u32) -> Self {
        self.max_per_day = max_per_day;
        self.max_per_week = max_per_week;
        self
    }

    pub fn with_interval(mut self, interval: IntervalCondition) -> Self {
        self.interval = Some(interval);
        self
    }

    fn week_start(date: chrono::NaiveDate) -> chrono::NaiveDate {
        date - TimeDelta::days(date.weekday().num_days_from_monday() as i64)
    }

    fn runs_on(&self, date: chrono::NaiveDate) -> u32 {
        if self.last_run_date == Some(date) { self.runs_today } else { 0 }
    }

    fn runs_in_week_of(&self, date: chrono::NaiveDate) -> u32 {
        if self.week_anchor == Some(Self::week_start(date)) { self.runs_this_week } else { 0 }
    }

    fn caps_allow(&self, date: chrono::NaiveDate) -> bool {
        (self.max_per_day == 0 || self.runs_on(date) < self.max_per_day)
            && (self.max_per_week == 0 || self.runs_in_week_of(date) < self.max_per_week)
    }

    fn next_active_day_start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if self.days.is_empty() {
            return None;
        }
        for ahead in 1..=7 {
            let date = now.date_naive() + TimeDelta::days(ahead);
            if self.days.contains(&date.weekday()) {
                return Some(date.and_time(NaiveTime::MIN).and_utc());
            }
        }
        None
    }
}

impl Condition for DayOfWeekCondition {
    fn description(&self) -> String {
        let days: Vec<String> = self.days.iter().map(|d| d.to_string()).collect();
        let mut desc = format!("on {}", days.join(","));
        if self.max_per_day > 0 {
            desc.push_str(&format!(" max {}/day", self.max_per_day));
        }
        if self.max_per_week > 0 {
            desc.push_str(&format!(" max {}/week", self.max_per_week));
        }
        if let Some(iv) = &self.interval {
            desc.push_str(&format!(" {}", iv.description()));
        }
        desc
    }

    fn identity(&self) -> String {
        let days: Vec<String> = self.days.iter().map(|d| d.to_string()).collect();
        let nested = self.interval.as_ref().map(|i| i.identity()).unwrap_or_default();
        format!("dow:{}:{}:{}:{}", days.join(","), self.max_per_day, self.max_per_week, nested)
    }

    fn is_satisfied(&self) -> bool {
        let now = Utc::now();
        let date = now.date_naive();
        self.days.contains(&date.weekday())
            && self.caps_allow(date)
            && self.interval.as_ref().map_or(true, |iv| iv.is_satisfied())
    }

    fn progress_percent(&self) -> f64 {
        if self.is_satisfied() {
            return 100.0;
        }
        match &self.interval {
            Some(iv) if self.days.contains(&Utc::now().date_naive().weekday()) => {
                iv.progress_percent()
            }
            _ => 0.0,
        }
    }

    fn current_trigger_time(&self) -> Option<DateTime<Utc>> {
        if self.is_satisfied() {
            return None;
        }
        let now = Utc::now();
        let date = now.date_naive();
        if self.days.contains(&date.weekday()) && self.caps_allow(date) {
            return self.interval.as_ref().and_then(|iv| iv.current_trigger_time());
        }
        self.next_active_day_start(now)
    }

    fn can_trigger_again(&self) -> bool {
        !self.days.is_empty()
    }

    fn reset(&mut self) {
        let now = Utc::now();
        let date = now.date_naive();
        if self.last_run_date != Some(date) {
            self.last_run_date = Some(date);
            self.runs_today = 0;
        }
        let week = Self::week_start(date);
        if self.week_anchor != Some(week) {
            self.week_anchor = Some(week);
            self.runs_this_week = 0;
        }
        self.runs_today += 1;
        self.runs_this_week += 1;
        if let Some(iv) = &mut self.interval {
            iv.reset();
        }
    }

    fn hard_reset(&mut self) {
        self.last_run_date = None;
        self.runs_today = 0;
        self.week_anchor = None;
        self.runs_this_week = 0;
        if let Some(iv) = &mut self.interval {
            iv.hard_reset();
        }
    }

    fn shift_by(&mut self, delta: TimeDelta) {
        if let Some(iv) = &mut self.interval {
            iv.shift_by(delta);
        }
    }

    fn is_time_based(&self) -> bool {
        true
    }

    fn clone_box(&self) -> Box<dyn Condition> {
        Box::new(self.clone())
    }
}

/// Satisfied exactly once at a specific instant, then consumed.
#[derive(Clone)]
pub struct SingleTriggerCondition {
    trigger_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
    consumed: bool,
}

impl SingleTriggerCondition {
    pub fn new(trigger_at: DateTime<Utc>) -> Self {
        Self { trigger_at, created_at: Utc::now(), consumed: false }
    }

    /// Trigger after a delay from now.
    pub fn after(delay: Duration) -> Self {
        Self::new(Utc::now() + to_delta(delay))
    }
}

impl Condition for SingleTriggerCondition {
    fn description(&self) -> String {
        format!("once at {}", self.trigger_at.format("%Y-%m-%d %H:%M:%S"))
    }

    fn identity(&self) -> String {
        format!("once:{}", self.trigger_at.to_rfc3339())
    }

    fn is_satisfied(&self) -> bool {
        !self.consumed && Utc::now() >= self.trigger_at
    }

    fn progress_percent(&self) -> f64 {
        if self.consumed {
            return 0.0;
        }
        let total = (self.trigger_at - self.created_at).num_milliseconds();
        if total <= 0 {
            return 100.0;
        }
        let elapsed = (Utc::now() - self.created_at).num_milliseconds();
        ((elapsed as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
    }

    fn current_trigger_time(&self) -> Option<DateTime<Utc>> {
        if self.consumed || self.is_satisfied() { None } else { Some(self.trigger_at) }
    }

    fn is_one_time(&self) -> bool {
        true
    }

    fn can_trigger_again(&self) -> bool {
        !self.consumed && Utc::now() < self.trigger_at
    }

    fn reset(&mut self) {
        if Utc::now() >= self.trigger_at {
            self.consumed = true;
        }
    }

    fn hard_reset(&mut self) {
        self.consumed = false;
    }

    fn shift_by(&mut self, delta: TimeDelta) {
        self.trigger_at += delta;
        self.created_at += delta;
    }

    fn is_time_based(&self) -> bool {
        true
    }

    fn clone_box(&self) -> Box<dyn Condition> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hh_mm() {
        assert_eq!(parse_hh_mm("01:30").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_hh_mm("0:05").unwrap(), Duration::from_secs(300));
        assert!(parse_hh_mm("90").is_err());
        assert!(parse_hh_mm("1:99").is_err());
        assert!(parse_hh_mm("x:10").is_err());
    }

    #[test]
    fn test_interval_not_satisfied_until_elapsed() {
        let cond = IntervalCondition::new(Duration::from_millis(50));
        assert!(!cond.is_satisfied());
        assert!(cond.current_trigger_time().is_some());
        std::thread::sleep(Duration::from_millis(70));
        assert!(cond.is_satisfied());
        assert!(cond.current_trigger_time().is_none());
    }

    #[test]
    fn test_interval_reset_rearms() {
        let mut cond = IntervalCondition::new(Duration::from_millis(40));
        std::thread::sleep(Duration::from_millis(60));
        assert!(cond.is_satisfied());
        cond.reset();
        assert!(!cond.is_satisfied());
    }

    #[test]
    fn test_interval_shift_moves_trigger_exactly() {
        let cond = IntervalCondition::new(Duration::from_secs(3600));
        let before = cond.current_trigger_time().unwrap();
        let mut shifted = cond.clone();
        shifted.shift_by(TimeDelta::seconds(90));
        let after = shifted.current_trigger_time().unwrap();
        assert_eq!(after - before, TimeDelta::seconds(90));
    }

    #[test]
    fn test_randomized_interval_stays_in_band() {
        for _ in 0..20 {
            let cond =
                IntervalCondition::randomized(Duration::from_secs(60), Duration::from_secs(120));
            let trigger = cond.current_trigger_time().unwrap();
            let delay = trigger - Utc::now();
            assert!(delay <= TimeDelta::seconds(121));
            assert!(delay >= TimeDelta::seconds(55));
        }
    }

    #[test]
    fn test_window_contains_now() {
        let now = Utc::now();
        let cond = TimeWindowCondition::daily(
            (now - TimeDelta::minutes(5)).time(),
            (now + TimeDelta::minutes(5)).time(),
        );
        assert!(cond.is_satisfied());
        assert!(cond.current_trigger_time().is_none());
    }

    #[test]
    fn test_window_before_open_reports_trigger() {
        let now = Utc::now();
        let cond = TimeWindowCondition::daily(
            (now + TimeDelta::minutes(10)).time(),
            (now + TimeDelta::minutes(20)).time(),
        );
        assert!(!cond.is_satisfied());
        let trigger = cond.current_trigger_time().unwrap();
        assert!(trigger > now);
        assert!(trigger - now <= TimeDelta::minutes(11));
    }

    #[test]
    fn test_window_reset_rolls_to_next_cycle() {
        let now = Utc::now();
        let mut cond = TimeWindowCondition::daily(
            (now - TimeDelta::minutes(1)).time(),
            (now + TimeDelta::minutes(1)).time(),
        );
        assert!(cond.is_satisfied());
        cond.reset();
        assert!(!cond.is_satisfied());
        let trigger = cond.current_trigger_time().unwrap();
        assert!(trigger - now > TimeDelta::hours(23));
    }

    #[test]
    fn test_window_jitter_stays_in_band() {
        let now = Utc::now();
        for _ in 0..10 {
            let cond = TimeWindowCondition::daily(
                (now + TimeDelta::minutes(30)).time(),
                (now + TimeDelta::minutes(40)).time(),
            )
            .with_jitter(Duration::from_secs(60));
            let trigger = cond.current_trigger_time().unwrap();
            let delay = trigger - Utc::now();
            assert!(delay >= TimeDelta::minutes(28));
            assert!(delay <= TimeDelta::minutes(32));
        }
    }

    #[test]
    fn test_once_window_consumes() {
        let now = Utc::now();
        let mut cond = TimeWindowCondition::new(
            (now - TimeDelta::minutes(1)).time(),
            (now + TimeDelta::minutes(1)).time(),
            RepeatCycle::Once,
            1,
        );
        assert!(cond.is_one_time());
        assert!(cond.is_satisfied());
        cond.reset();
        assert!(!cond.is_satisfied());
        assert!(!cond.can_trigger_again());
        cond.hard_reset();
        assert!(cond.is_satisfied());
    }

    #[test]
    fn test_day_of_week_caps() {
        let today = Utc::now().date_naive().weekday();
        let mut cond = DayOfWeekCondition::new(vec![today]).with_caps(1, 0);
        assert!(cond.is_satisfied());
        cond.reset();
        assert!(!cond.is_satisfied());
        cond.hard_reset();
        assert!(cond.is_satisfied());
    }

    #[test]
    fn test_day_of_week_inactive_day() {
        let today = Utc::now().date_naive().weekday();
        let tomorrow = today.succ();
        let cond = DayOfWeekCondition::new(vec![tomorrow]);
        assert!(!cond.is_satisfied());
        let trigger = cond.current_trigger_time().unwrap();
        assert!(trigger > Utc::now());
    }

    #[test]
    fn test_day_of_week_nested_interval_gates() {
        let today = Utc::now().date_naive().weekday();
        let cond = DayOfWeekCondition::new(vec![today])
            .with_interval(IntervalCondition::new(Duration::from_secs(3600)));
        assert!(!cond.is_satisfied());
        assert!(cond.current_trigger_time().is_some());
    }

    #[test]
    fn test_single_trigger_lifecycle() {
        let mut cond = SingleTriggerCondition::after(Duration::from_millis(30));
        assert!(!cond.is_satisfied());
        assert!(cond.can_trigger_again());
        std::thread::sleep(Duration::from_millis(50));
        assert!(cond.is_satisfied());
        cond.reset();
        assert!(!cond.is_satisfied());
        assert!(!cond.can_trigger_again());
        cond.hard_reset();
        assert!(cond.is_satisfied());
    }
}
