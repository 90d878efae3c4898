use crate::errors::EngineError;
use crate::io_models::message::QueueMessage;
use crate::platform::Platform;
use chrono::{DateTime, NaiveTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Tick cadences for the background workers. Interval ticks carry a
/// deadline of half their period; the daily passes get one hour.
#[derive(Clone, Debug)]
pub struct TickerSettings {
    pub process_scheduled_jobs_interval: Duration,
    pub collect_cluster_metrics_interval: Duration,
    pub cleanup_completed_jobs_interval: Duration,
    pub retention_at: NaiveTime,
    pub test_notification_at: NaiveTime,
}

impl Default for TickerSettings {
    fn default() -> Self {
        TickerSettings {
            process_scheduled_jobs_interval: Duration::from_secs(5 * 60),
            collect_cluster_metrics_interval: Duration::from_secs(5 * 60),
            cleanup_completed_jobs_interval: Duration::from_secs(4 * 60 * 60),
            retention_at: NaiveTime::from_hms_opt(0, 0, 0).expect("valid retention time"),
            test_notification_at: NaiveTime::from_hms_opt(8, 0, 0).expect("valid notification time"),
        }
    }
}

const DAILY_TICK_DEADLINE: Duration = Duration::from_secs(60 * 60);

async fn run_guarded<T>(
    name: &str,
    deadline: Duration,
    task: impl Future<Output = Result<T, EngineError>>,
) {
    match tokio::time::timeout(deadline, task).await {
        Ok(Ok(_)) => debug!("{name} tick completed"),
        Ok(Err(EngineError::Canceled)) => debug!("{name} tick canceled"),
        Ok(Err(err)) => error!("{name} tick failed: {err}"),
        Err(_) => warn!("{name} tick exceeded its deadline of {deadline:?}"),
    }
}

fn duration_until_next(now: DateTime<Utc>, at: NaiveTime) -> Duration {
    let today_at = now.date_naive().and_time(at).and_utc();
    let next = if today_at > now {
        today_at
    } else {
        today_at + chrono::Duration::days(1)
    };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

/// Spawn the five periodic workers. Every loop stops when `cancel` fires.
pub fn spawn_tickers(
    platform: Arc<Platform>,
    settings: TickerSettings,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();

    {
        let platform = platform.clone();
        let cancel = cancel.clone();
        let period = settings.process_scheduled_jobs_interval;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                run_guarded(
                    "process-scheduled-jobs",
                    period / 2,
                    platform.scheduler().process_due_schedules(Utc::now(), &cancel),
                )
                .await;
            }
        }));
    }

    {
        let platform = platform.clone();
        let cancel = cancel.clone();
        let period = settings.collect_cluster_metrics_interval;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                run_guarded(
                    "collect-cluster-metrics",
                    period / 2,
                    platform.monitor().collect_cluster_metrics(&cancel),
                )
                .await;
            }
        }));
    }

    {
        let platform = platform.clone();
        let cancel = cancel.clone();
        let period = settings.cleanup_completed_jobs_interval;
        handles.push(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }
                run_guarded(
                    "cleanup-completed-jobs",
                    period / 2,
                    platform.monitor().cleanup_completed_jobs(Utc::now(), &cancel),
                )
                .await;
            }
        }));
    }

    {
        let platform = platform.clone();
        let cancel = cancel.clone();
        let at = settings.retention_at;
        handles.push(tokio::spawn(async move {
            loop {
                let wait = duration_until_next(Utc::now(), at);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                run_guarded(
                    "cleanup-old-test-results",
                    DAILY_TICK_DEADLINE,
                    platform.tracker().prune_expired(Utc::now()),
                )
                .await;
            }
        }));
    }

    {
        let platform = platform.clone();
        let cancel = cancel.clone();
        let at = settings.test_notification_at;
        handles.push(tokio::spawn(async move {
            loop {
                let wait = duration_until_next(Utc::now(), at);
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(wait) => {}
                }
                run_guarded("send-test-notification", DAILY_TICK_DEADLINE, async {
                    platform.alerts().send_test_notification(None, None, None).await;
                    Ok::<(), EngineError>(())
                })
                .await;
            }
        }));
    }

    handles
}

/// Drain the queue into the submission pipeline until the channel closes or
/// the token fires.
pub fn spawn_queue_consumer(
    platform: Arc<Platform>,
    mut receiver: UnboundedReceiver<QueueMessage>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                message = receiver.recv() => match message {
                    Some(message) => platform.process_queue_message(message, &cancel).await,
                    None => break,
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_duration_until_next_daily_slot() {
        let at = NaiveTime::from_hms_opt(8, 0, 0).unwrap();

        let before = Utc.with_ymd_and_hms(2025, 6, 2, 6, 0, 0).unwrap();
        assert_eq!(duration_until_next(before, at), Duration::from_secs(2 * 60 * 60));

        let after = Utc.with_ymd_and_hms(2025, 6, 2, 9, 0, 0).unwrap();
        assert_eq!(duration_until_next(after, at), Duration::from_secs(23 * 60 * 60));

        let exactly = Utc.with_ymd_and_hms(2025, 6, 2, 8, 0, 0).unwrap();
        assert_eq!(duration_until_next(exactly, at), Duration::from_secs(24 * 60 * 60));
    }
}
