//! Daily trigger — one armed timer, fired at HH:MM Asia/Tehran.
//!
//! The scheduler owns at most one trigger task. Reconfiguring swaps the
//! trigger under a single lock: the old task is aborted and the new one
//! installed before the lock drops, so two triggers are never armed at once.
//! A firing already in flight runs to completion under the config it started
//! with; only later firings see the new time.

use std::future::Future;

use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use roozbot_core::calendar::BOT_TZ;
use roozbot_core::error::{Result, RoozError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A dispatch time of day, `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTime {
    pub hour: u32,
    pub minute: u32,
}

impl ScheduleTime {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(RoozError::Validation(format!(
                "time {hour:02}:{minute:02} out of range"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Parse `"HH:MM"` (one- or two-digit hour).
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = || RoozError::Validation(format!("bad time '{s}', expected HH:MM"));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        if h.is_empty() || h.len() > 2 || m.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = h.parse().map_err(|_| invalid())?;
        let minute: u32 = m.parse().map_err(|_| invalid())?;
        Self::new(hour, minute)
    }
}

impl std::fmt::Display for ScheduleTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

struct Armed {
    time: ScheduleTime,
    handle: JoinHandle<()>,
}

/// States: Idle (no trigger) and Armed (exactly one trigger).
pub struct DailyScheduler {
    slot: Mutex<Option<Armed>>,
}

impl Default for DailyScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl DailyScheduler {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
        }
    }

    /// Arm the trigger for `time`, replacing any existing trigger. `job` is
    /// invoked once per day at the configured Tehran wall-clock time.
    pub async fn configure<F, Fut>(&self, time: ScheduleTime, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut slot = self.slot.lock().await;
        if let Some(old) = slot.take() {
            old.handle.abort();
            tracing::info!("trigger for {} disarmed", old.time);
        }
        let handle = tokio::spawn(run_trigger(time, job));
        *slot = Some(Armed { time, handle });
        tracing::info!("daily trigger armed for {time} ({})", BOT_TZ.name());
    }

    /// Drop the armed trigger, if any.
    pub async fn disarm(&self) {
        if let Some(old) = self.slot.lock().await.take() {
            old.handle.abort();
            tracing::info!("trigger for {} disarmed", old.time);
        }
    }

    /// The currently armed time, if any.
    pub async fn current(&self) -> Option<ScheduleTime> {
        self.slot.lock().await.as_ref().map(|a| a.time)
    }

    pub async fn is_armed(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}

async fn run_trigger<F, Fut>(time: ScheduleTime, job: F)
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send,
{
    loop {
        let now = Utc::now().with_timezone(&BOT_TZ);
        let at = next_occurrence(time, now);
        let wait = (at - now).to_std().unwrap_or_default();
        tracing::debug!("next daily dispatch at {at} (in {}s)", wait.as_secs());
        tokio::time::sleep(wait).await;
        job().await;
    }
}

/// The next wall-clock occurrence of `time` strictly after `now`.
pub fn next_occurrence(time: ScheduleTime, now: DateTime<Tz>) -> DateTime<Tz> {
    // hour/minute validated at construction.
    let tod = NaiveTime::from_hms_opt(time.hour, time.minute, 0)
        .unwrap_or(NaiveTime::MIN);
    let mut day = now.date_naive();
    for _ in 0..3 {
        let naive = day.and_time(tod);
        if naive > now.naive_local()
            && let Some(at) = now.timezone().from_local_datetime(&naive).earliest()
        {
            return at;
        }
        day = day.succ_opt().unwrap_or(day);
    }
    // Unreachable with a sane clock; fall back to a day from now.
    now + ChronoDuration::days(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn parse_accepts_valid_times() {
        assert_eq!(ScheduleTime::parse("17:00").unwrap(), ScheduleTime { hour: 17, minute: 0 });
        assert_eq!(ScheduleTime::parse("9:05").unwrap(), ScheduleTime { hour: 9, minute: 5 });
        assert_eq!(ScheduleTime::parse("00:00").unwrap(), ScheduleTime { hour: 0, minute: 0 });
        assert_eq!(ScheduleTime::parse("23:59").unwrap().to_string(), "23:59");
    }

    #[test]
    fn parse_rejects_bad_times() {
        for s in ["", "17", "17:0", "24:00", "12:60", "ab:cd", "17:00:00", "-1:30"] {
            assert!(ScheduleTime::parse(s).is_err(), "{s:?} should not parse");
        }
    }

    #[test]
    fn next_occurrence_same_day_and_next_day() {
        let time = ScheduleTime::new(17, 0).unwrap();
        let morning = BOT_TZ.with_ymd_and_hms(2025, 10, 23, 8, 0, 0).unwrap();
        let next = next_occurrence(time, morning);
        assert_eq!(next.date_naive(), morning.date_naive());
        assert_eq!((next.hour(), next.minute()), (17, 0));

        let evening = BOT_TZ.with_ymd_and_hms(2025, 10, 23, 17, 0, 0).unwrap();
        let next = next_occurrence(time, evening);
        assert_eq!(next.date_naive(), morning.date_naive().succ_opt().unwrap());
    }

    #[tokio::test]
    async fn configure_replaces_the_trigger() {
        let scheduler = Arc::new(DailyScheduler::new());
        assert!(!scheduler.is_armed().await);

        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        scheduler
            .configure(ScheduleTime::new(8, 0).unwrap(), move || {
                let f = Arc::clone(&f);
                async move {
                    f.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;
        let f = Arc::clone(&fired);
        scheduler
            .configure(ScheduleTime::new(9, 30).unwrap(), move || {
                let f = Arc::clone(&f);
                async move {
                    f.fetch_add(1, Ordering::SeqCst);
                }
            })
            .await;

        // Exactly one trigger armed, bound to the latest config.
        assert_eq!(
            scheduler.current().await,
            Some(ScheduleTime { hour: 9, minute: 30 })
        );
        scheduler.disarm().await;
        assert!(!scheduler.is_armed().await);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
