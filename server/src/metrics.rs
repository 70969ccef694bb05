use raspa_types::casino::{Money, PlayOutcome, PrizeKind};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

const LATENCY_BUCKET_COUNT: usize = 10;
const LATENCY_BUCKETS_MS: [u64; LATENCY_BUCKET_COUNT] =
    [1, 2, 5, 10, 25, 50, 100, 250, 1000, 5000];

#[derive(Clone, Debug, Serialize)]
pub struct LatencySnapshot {
    pub buckets_ms: Vec<u64>,
    pub counts: Vec<u64>,
    pub overflow: u64,
    pub count: u64,
    pub avg_ms: f64,
    pub max_ms: u64,
}

#[derive(Default)]
struct LatencyMetrics {
    buckets: [AtomicU64; LATENCY_BUCKET_COUNT],
    overflow: AtomicU64,
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
}

impl LatencyMetrics {
    fn record(&self, duration: Duration) {
        let ms = duration.as_millis() as u64;
        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(ms, Ordering::Relaxed);
        self.max_ms.fetch_max(ms, Ordering::Relaxed);

        match LATENCY_BUCKETS_MS.iter().position(|bucket| ms <= *bucket) {
            Some(idx) => {
                self.buckets[idx].fetch_add(1, Ordering::Relaxed);
            }
            None => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn snapshot(&self) -> LatencySnapshot {
        let count = self.count.load(Ordering::Relaxed);
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let avg_ms = if count > 0 {
            total_ms as f64 / count as f64
        } else {
            0.0
        };
        LatencySnapshot {
            buckets_ms: LATENCY_BUCKETS_MS.to_vec(),
            counts: self
                .buckets
                .iter()
                .map(|bucket| bucket.load(Ordering::Relaxed))
                .collect(),
            overflow: self.overflow.load(Ordering::Relaxed),
            count,
            avg_ms,
            max_ms: self.max_ms.load(Ordering::Relaxed),
        }
    }
}

/// Counters for committed and rejected game traffic.
#[derive(Default)]
pub struct GameMetrics {
    plays: AtomicU64,
    wins: AtomicU64,
    hook_wins: AtomicU64,
    recovery_wins: AtomicU64,
    rejected_plays: AtomicU64,
    busy_plays: AtomicU64,
    failed_plays: AtomicU64,
    staked_cents: AtomicU64,
    prize_cents: AtomicU64,
    deposits: AtomicU64,
    deposited_cents: AtomicU64,
    ignored_webhooks: AtomicU64,
    withdrawals: AtomicU64,
    withdrawn_cents: AtomicU64,
    coupons: AtomicU64,
    coupon_bonus_cents: AtomicU64,
    play_latency: LatencyMetrics,
}

#[derive(Clone, Debug, Serialize)]
pub struct GameMetricsSnapshot {
    pub plays: u64,
    pub wins: u64,
    pub hook_wins: u64,
    pub recovery_wins: u64,
    pub rejected_plays: u64,
    pub busy_plays: u64,
    pub failed_plays: u64,
    pub staked_cents: u64,
    pub prize_cents: u64,
    pub deposits: u64,
    pub deposited_cents: u64,
    pub ignored_webhooks: u64,
    pub withdrawals: u64,
    pub withdrawn_cents: u64,
    pub coupons: u64,
    pub coupon_bonus_cents: u64,
    pub play_latency: LatencySnapshot,
}

impl GameMetrics {
    pub fn record_play(&self, outcome: &PlayOutcome, elapsed: Duration) {
        self.plays.fetch_add(1, Ordering::Relaxed);
        self.staked_cents
            .fetch_add(outcome.stake.cents(), Ordering::Relaxed);
        if let Some(prize) = outcome.decision.prize() {
            self.wins.fetch_add(1, Ordering::Relaxed);
            self.prize_cents
                .fetch_add(prize.amount.cents(), Ordering::Relaxed);
            match prize.kind {
                PrizeKind::Hook => self.hook_wins.fetch_add(1, Ordering::Relaxed),
                PrizeKind::Recovery => self.recovery_wins.fetch_add(1, Ordering::Relaxed),
            };
        }
        self.play_latency.record(elapsed);
    }

    pub fn inc_rejected_play(&self) {
        self.rejected_plays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_busy_play(&self) {
        self.busy_plays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_failed_play(&self) {
        self.failed_plays.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_deposit(&self, amount: Money) {
        self.deposits.fetch_add(1, Ordering::Relaxed);
        self.deposited_cents
            .fetch_add(amount.cents(), Ordering::Relaxed);
    }

    pub fn inc_ignored_webhook(&self) {
        self.ignored_webhooks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_withdrawal(&self, amount: Money) {
        self.withdrawals.fetch_add(1, Ordering::Relaxed);
        self.withdrawn_cents
            .fetch_add(amount.cents(), Ordering::Relaxed);
    }

    pub fn record_coupon(&self, bonus: Money) {
        self.coupons.fetch_add(1, Ordering::Relaxed);
        self.coupon_bonus_cents
            .fetch_add(bonus.cents(), Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GameMetricsSnapshot {
        GameMetricsSnapshot {
            plays: self.plays.load(Ordering::Relaxed),
            wins: self.wins.load(Ordering::Relaxed),
            hook_wins: self.hook_wins.load(Ordering::Relaxed),
            recovery_wins: self.recovery_wins.load(Ordering::Relaxed),
            rejected_plays: self.rejected_plays.load(Ordering::Relaxed),
            busy_plays: self.busy_plays.load(Ordering::Relaxed),
            failed_plays: self.failed_plays.load(Ordering::Relaxed),
            staked_cents: self.staked_cents.load(Ordering::Relaxed),
            prize_cents: self.prize_cents.load(Ordering::Relaxed),
            deposits: self.deposits.load(Ordering::Relaxed),
            deposited_cents: self.deposited_cents.load(Ordering::Relaxed),
            ignored_webhooks: self.ignored_webhooks.load(Ordering::Relaxed),
            withdrawals: self.withdrawals.load(Ordering::Relaxed),
            withdrawn_cents: self.withdrawn_cents.load(Ordering::Relaxed),
            coupons: self.coupons.load(Ordering::Relaxed),
            coupon_bonus_cents: self.coupon_bonus_cents.load(Ordering::Relaxed),
            play_latency: self.play_latency.snapshot(),
        }
    }
}

#[derive(Default)]
pub struct HttpMetrics {
    reject_unauthorized: AtomicU64,
    reject_body_limit: AtomicU64,
    reject_rate_limit: AtomicU64,
    server_errors: AtomicU64,
}

#[derive(Clone, Debug, Serialize)]
pub struct HttpMetricsSnapshot {
    pub reject_unauthorized: u64,
    pub reject_body_limit: u64,
    pub reject_rate_limit: u64,
    pub server_errors: u64,
}

impl HttpMetrics {
    pub fn inc_reject_unauthorized(&self) {
        self.reject_unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_body_limit(&self) {
        self.reject_body_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reject_rate_limit(&self) {
        self.reject_rate_limit.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_server_error(&self) {
        self.server_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HttpMetricsSnapshot {
        HttpMetricsSnapshot {
            reject_unauthorized: self.reject_unauthorized.load(Ordering::Relaxed),
            reject_body_limit: self.reject_body_limit.load(Ordering::Relaxed),
            reject_rate_limit: self.reject_rate_limit.load(Ordering::Relaxed),
            server_errors: self.server_errors.load(Ordering::Relaxed),
        }
    }
}

#[derive(Default)]
pub struct WsMetrics {
    connections: AtomicU64,
    auth_failures: AtomicU64,
    replaced: AtomicU64,
    notifications_sent: AtomicU64,
    notifications_dropped: AtomicU64,
    queue_full: AtomicU64,
    send_errors: AtomicU64,
    send_timeouts: AtomicU64,
}

#[derive(Clone, Debug, Serialize)]
pub struct WsMetricsSnapshot {
    pub connections: u64,
    pub auth_failures: u64,
    pub replaced: u64,
    pub notifications_sent: u64,
    pub notifications_dropped: u64,
    pub queue_full: u64,
    pub send_errors: u64,
    pub send_timeouts: u64,
}

impl WsMetrics {
    pub fn inc_connection(&self) {
        self.connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_auth_failure(&self) {
        self.auth_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_replaced(&self) {
        self.replaced.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notification_sent(&self) {
        self.notifications_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_notification_dropped(&self) {
        self.notifications_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_queue_full(&self) {
        self.queue_full.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_send_error(&self) {
        self.send_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_send_timeout(&self) {
        self.send_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> WsMetricsSnapshot {
        WsMetricsSnapshot {
            connections: self.connections.load(Ordering::Relaxed),
            auth_failures: self.auth_failures.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_dropped: self.notifications_dropped.load(Ordering::Relaxed),
            queue_full: self.queue_full.load(Ordering::Relaxed),
            send_errors: self.send_errors.load(Ordering::Relaxed),
            send_timeouts: self.send_timeouts.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latency_buckets_and_overflow() {
        let metrics = LatencyMetrics::default();
        metrics.record(Duration::from_millis(0));
        metrics.record(Duration::from_millis(7));
        metrics.record(Duration::from_secs(60));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.count, 3);
        assert_eq!(snapshot.counts[0], 1);
        assert_eq!(snapshot.counts[3], 1);
        assert_eq!(snapshot.overflow, 1);
        assert_eq!(snapshot.max_ms, 60_000);
    }

    #[test]
    fn test_empty_latency_has_zero_average() {
        let snapshot = LatencyMetrics::default().snapshot();
        assert_eq!(snapshot.count, 0);
        assert_eq!(snapshot.avg_ms, 0.0);
    }

    #[test]
    fn test_coupon_counters_accumulate() {
        let metrics = GameMetrics::default();
        metrics.record_coupon(Money::from_units(10));
        metrics.record_coupon(Money::from_cents(250));
        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.coupons, 2);
        assert_eq!(snapshot.coupon_bonus_cents, 1_250);
    }
}
