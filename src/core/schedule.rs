use crate::utils::error::Result;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use std::future::Future;

/// Earliest UTC instant strictly after `now` whose wall-clock time is in `times`.
pub fn next_run(now: DateTime<Utc>, times: &[NaiveTime]) -> Option<DateTime<Utc>> {
    let today = now.date_naive();
    times
        .iter()
        .map(|t| {
            let candidate = today.and_time(*t).and_utc();
            if candidate <= now {
                candidate + Duration::days(1)
            } else {
                candidate
            }
        })
        .min()
}

/// Runs `job` at every configured time until Ctrl-C. A failed run is logged and
/// the loop carries on with the next slot.
pub async fn run_scheduled<F, Fut>(times: &[NaiveTime], job: F) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
{
    run_until(times, job, tokio::signal::ctrl_c(), tokio::time::sleep).await
}

/// Scheduling loop with the shutdown signal and the sleep supplied by the caller.
/// `shutdown` is polled while waiting and while a run is in progress.
pub async fn run_until<F, Fut, Sh, S, SFut>(
    times: &[NaiveTime],
    mut job: F,
    shutdown: Sh,
    mut sleep: S,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<String>>,
    Sh: Future,
    S: FnMut(std::time::Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let mut slots: Vec<String> = times.iter().map(|t| t.format("%H:%M").to_string()).collect();
    slots.sort();
    tracing::info!("⏰ Scheduler started, reports at {} UTC", slots.join(", "));

    // 整個迴圈共用同一個訊號監聽，執行中按下 Ctrl-C 也不會遺失
    tokio::pin!(shutdown);

    loop {
        let now = Utc::now();
        let Some(next) = next_run(now, times) else {
            tracing::warn!("⚠️ No notification times configured, scheduler stopping");
            return Ok(());
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::info!("💤 Next report at {} ({:?} from now)", next.format("%Y-%m-%d %H:%M UTC"), wait);

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::info!("🛑 Received Ctrl-C, scheduler stopping");
                return Ok(());
            }
            _ = sleep(wait) => {}
        }

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                tracing::warn!("🛑 Received Ctrl-C during a report run, scheduler stopping");
                return Ok(());
            }
            result = job() => match result {
                Ok(recorded) => tracing::info!("✅ Scheduled report completed ({})", recorded),
                Err(e) => {
                    tracing::error!(
                        "❌ Scheduled report failed: {} (Category: {:?}, Severity: {:?})",
                        e,
                        e.category(),
                        e.severity()
                    );
                    tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::TrandError;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::sync::oneshot;

    fn t(s: &str) -> NaiveTime {
        NaiveTime::parse_from_str(s, "%H:%M").unwrap()
    }

    fn times() -> Vec<NaiveTime> {
        vec![t("09:00"), t("17:00"), t("01:00")]
    }

    #[test]
    fn test_next_run_later_today() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap();
        assert_eq!(
            next_run(now, &times()),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_next_run_wraps_to_tomorrow() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 18, 0, 0).unwrap();
        assert_eq!(
            next_run(now, &times()),
            Some(Utc.with_ymd_and_hms(2024, 5, 2, 1, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_next_run_is_strictly_after_now() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap();
        assert_eq!(
            next_run(now, &times()),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 17, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_next_run_crosses_month_end() {
        let now = Utc.with_ymd_and_hms(2024, 1, 31, 23, 59, 0).unwrap();
        assert_eq!(
            next_run(now, &[t("00:00")]),
            Some(Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_next_run_without_times() {
        assert_eq!(next_run(Utc::now(), &[]), None);
    }

    #[tokio::test]
    async fn test_failed_run_does_not_stop_the_loop() {
        let calls = AtomicU32::new(0);
        let (tx, rx) = oneshot::channel::<()>();
        let mut tx = Some(tx);

        let job = || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n == 3 {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(());
                }
            }
            async move {
                if n == 1 {
                    Err(TrandError::RateLimitError {
                        service: "openai".to_string(),
                    })
                } else {
                    Ok("trading_signals.log".to_string())
                }
            }
        };

        run_until(&times(), job, rx, |_| async {}).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_shutdown_during_a_run_stops_the_loop() {
        let calls = AtomicU32::new(0);
        let job = || {
            calls.fetch_add(1, Ordering::SeqCst);
            std::future::pending::<Result<String>>()
        };
        let shutdown = tokio::time::sleep(std::time::Duration::from_millis(20));

        run_until(&times(), job, shutdown, |_| async {}).await.unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_shutdown_while_waiting_skips_the_run() {
        let calls = AtomicU32::new(0);
        let job = || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok("trading_signals.log".to_string()) }
        };

        run_until(&times(), job, async {}, |_| std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
