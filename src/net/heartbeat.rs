use std::collections::VecDeque;
use std::fmt::Debug;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior, interval_at};

// Maximum length of the latency buffer; old samples are dropped so a
// long-lived connection does not accumulate unbounded history.
const LATENCIES_MAX_LEN: usize = 1000;

/// Keepalive bookkeeping shared by the gateway and voice gateway sockets.
///
/// The heartbeater does no I/O on its own. The owning socket polls
/// [`interval()`] from its write loop, sends the probe itself and records
/// it with [`record_sent()`], and feeds acknowledgement frames back through
/// [`acknowledged()`]. When a tick fires while the previous probe was never
/// acknowledged ([`is_zombied()`]), the owner must force-close the
/// connection instead of probing again.
///
/// Dropping the heartbeater stops the timer, which makes replacing the
/// owner's `Option<Heartbeater>` the idempotent way to cancel it.
///
/// [`interval()`]: Self::interval
/// [`record_sent()`]: Self::record_sent
/// [`acknowledged()`]: Self::acknowledged
/// [`is_zombied()`]: Self::is_zombied
pub struct Heartbeater {
    /// Whether the last heartbeat sent by the client has been
    /// acknowledged by the gateway.
    acknowledged: bool,

    /// Interval of how often the client must send heartbeats.
    interval: Interval,

    /// A list of latencies observed during the heartbeat process.
    latencies: VecDeque<Duration>,

    /// Indicates when the pending heartbeat was sent to the gateway.
    sent: Option<Instant>,
}

impl Heartbeater {
    /// Creates a heartbeater ticking at `period`.
    ///
    /// The first tick lands at a random fraction of the period so that a
    /// mass reconnect does not produce synchronized probes.
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let start = Instant::now() + period.mul_f64(fastrand::f64());
        let mut interval = interval_at(start, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        Self {
            acknowledged: false,
            interval,
            latencies: VecDeque::new(),
            sent: None,
        }
    }

    /// Gets the internal [interval object].
    ///
    /// [interval object]: Interval
    pub(crate) fn interval(&mut self) -> &mut Interval {
        &mut self.interval
    }

    /// Checks whether a heartbeat is in flight and waiting for
    /// acknowledgement.
    #[must_use]
    pub(crate) const fn has_sent(&self) -> bool {
        self.sent.is_some()
    }

    /// Acknowledges the heartbeat payload sent by the client.
    ///
    /// This function must be used whenever the gateway acknowledges
    /// the heartbeat payload.
    pub(crate) fn acknowledged(&mut self) {
        debug_assert!(self.sent.is_some());
        self.acknowledged = true;

        if let Some(sent) = self.sent.take() {
            if self.latencies.len() == LATENCIES_MAX_LEN {
                self.latencies.pop_front();
            }
            self.latencies.push_back(sent.elapsed());
        }
    }

    /// Resets the sent and acknowledged metadata.
    ///
    /// This is used when the heartbeat payload has been sent to the gateway.
    pub(crate) fn record_sent(&mut self) {
        self.acknowledged = false;
        self.sent = Some(Instant::now());
    }

    /// Whether the connection is failed or "zombied": the previous probe
    /// was sent and its acknowledgement never arrived.
    #[must_use]
    pub fn is_zombied(&self) -> bool {
        self.sent.is_some() && !self.acknowledged
    }

    /// Gets the configured heartbeat period.
    #[must_use]
    pub fn period(&self) -> Duration {
        self.interval.period()
    }

    /// Gets the average latency over the observed samples.
    ///
    /// It will return `None` if no heartbeat has been acknowledged yet.
    #[must_use]
    pub fn average_latency(&self) -> Option<Duration> {
        // CLIPPY: the buffer never exceeds LATENCIES_MAX_LEN entries.
        #[allow(clippy::cast_possible_truncation)]
        self.latencies
            .iter()
            .fold(Duration::ZERO, |acc, entry| acc + *entry)
            .checked_div(self.latencies.len() as u32)
    }

    /// Gets the most recent latency as of calling this function.
    ///
    /// It will return `None` if no heartbeat has been acknowledged yet.
    #[must_use]
    pub fn recent_latency(&self) -> Option<Duration> {
        self.latencies.back().copied()
    }

    /// Gets an iterator over the latencies observed by the heartbeater.
    pub fn latencies(&self) -> impl Iterator<Item = &Duration> {
        self.latencies.iter()
    }
}

impl Debug for Heartbeater {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Heartbeater")
            .field("acknowledged", &self.acknowledged)
            .field("interval", &self.interval.period())
            .field("latencies", &self.latencies.len())
            .field("sent", &self.sent.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::{Duration, Heartbeater, LATENCIES_MAX_LEN};

    #[tokio::test]
    async fn tracks_acknowledgement_of_the_pending_probe() {
        let mut hbr = Heartbeater::new(Duration::from_secs(1));
        assert!(!hbr.is_zombied());

        hbr.record_sent();
        assert!(hbr.has_sent());
        assert!(hbr.is_zombied());

        hbr.acknowledged();
        assert!(!hbr.has_sent());
        assert!(!hbr.is_zombied());
        assert!(hbr.recent_latency().is_some());
    }

    #[tokio::test]
    async fn unacknowledged_probe_stays_zombied_across_ticks() {
        let mut hbr = Heartbeater::new(Duration::from_secs(1));
        hbr.record_sent();

        // No acknowledgement arrives; sending another probe would be wrong.
        assert!(hbr.is_zombied());
        assert!(hbr.is_zombied());
    }

    #[tokio::test]
    async fn should_stay_exactly_in_latencies_max_length() {
        let mut hbr = Heartbeater::new(Duration::from_secs(1));
        hbr.latencies.push_back(Duration::from_secs(1));

        (1..LATENCIES_MAX_LEN).for_each(|_| hbr.latencies.push_back(Duration::ZERO));
        hbr.record_sent();
        hbr.acknowledged();

        assert_eq!(hbr.latencies.len(), LATENCIES_MAX_LEN);
        assert_ne!(hbr.latencies[0], Duration::from_secs(1));
        assert_ne!(hbr.latencies[LATENCIES_MAX_LEN - 1], Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_is_jittered_within_one_period() {
        let period = Duration::from_secs(30);
        let mut hbr = Heartbeater::new(period);
        assert_eq!(hbr.period(), period);

        let started = tokio::time::Instant::now();
        hbr.interval().tick().await;
        assert!(started.elapsed() <= period);
    }
}
