// src/pacing.rs
//! Randomized pauses between units of work.
//!
//! Production adapters use [`JitteredPacer`]; tests pass [`NoPacing`] (or any
//! `Fn(Phase) -> Duration`) so nothing ever sleeps.

use std::ops::RangeInclusive;
use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Before moving to the next subreddit / feed / channel / account.
    SubTarget,
    /// Before the next stream inside a sub-target (video, reel).
    Stream,
    /// Before fetching the next page of a stream.
    Page,
    /// After processing a single item.
    Item,
}

pub trait Pacer: Send + Sync {
    fn delay(&self, phase: Phase) -> Duration;
}

impl<F> Pacer for F
where
    F: Fn(Phase) -> Duration + Send + Sync,
{
    fn delay(&self, phase: Phase) -> Duration {
        self(phase)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoPacing;

impl Pacer for NoPacing {
    fn delay(&self, _phase: Phase) -> Duration {
        Duration::ZERO
    }
}

/// Uniform random delay from a per-phase millisecond range.
#[derive(Debug, Clone)]
pub struct JitteredPacer {
    sub_target: RangeInclusive<u64>,
    stream: RangeInclusive<u64>,
    page: RangeInclusive<u64>,
    item: RangeInclusive<u64>,
}

impl Default for JitteredPacer {
    fn default() -> Self {
        Self {
            sub_target: 3_000..=6_000,
            stream: 2_000..=4_000,
            page: 3_000..=5_000,
            item: 0..=0,
        }
    }
}

impl JitteredPacer {
    /// Comment-feed pacing: short page gaps, a few seconds per item.
    pub fn comments() -> Self {
        Self {
            page: 100..=100,
            item: 2_000..=4_000,
            ..Self::default()
        }
    }

    pub fn with_range(mut self, phase: Phase, ms: RangeInclusive<u64>) -> Self {
        let r = if ms.start() <= ms.end() {
            ms
        } else {
            *ms.end()..=*ms.start()
        };
        match phase {
            Phase::SubTarget => self.sub_target = r,
            Phase::Stream => self.stream = r,
            Phase::Page => self.page = r,
            Phase::Item => self.item = r,
        }
        self
    }

    fn range(&self, phase: Phase) -> &RangeInclusive<u64> {
        match phase {
            Phase::SubTarget => &self.sub_target,
            Phase::Stream => &self.stream,
            Phase::Page => &self.page,
            Phase::Item => &self.item,
        }
    }
}

impl Pacer for JitteredPacer {
    fn delay(&self, phase: Phase) -> Duration {
        let r = self.range(phase);
        if r.start() == r.end() {
            return Duration::from_millis(*r.start());
        }
        Duration::from_millis(rand::rng().random_range(r.clone()))
    }
}

/// Sleep unless cancelled first. Returns `false` when cancelled.
pub async fn sleep_or_cancel(d: Duration, cancel: &CancellationToken) -> bool {
    if cancel.is_cancelled() {
        return false;
    }
    if d.is_zero() {
        return true;
    }
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(d) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jittered_delays_stay_in_range() {
        let p = JitteredPacer::default();
        for _ in 0..200 {
            let d = p.delay(Phase::SubTarget).as_millis() as u64;
            assert!((3_000..=6_000).contains(&d));
        }
        assert_eq!(JitteredPacer::comments().delay(Phase::Page), Duration::from_millis(100));
    }

    #[test]
    fn closures_are_pacers() {
        let p = |phase: Phase| match phase {
            Phase::Page => Duration::from_millis(1),
            _ => Duration::ZERO,
        };
        assert_eq!(p.delay(Phase::Page), Duration::from_millis(1));
        assert_eq!(NoPacing.delay(Phase::Item), Duration::ZERO);
    }

    #[test]
    fn reversed_range_is_normalized() {
        let p = JitteredPacer::default().with_range(Phase::Item, 20..=10);
        let d = p.delay(Phase::Item).as_millis() as u64;
        assert!((10..=20).contains(&d));
    }

    #[tokio::test]
    async fn sleep_is_cut_short_by_cancel() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(!sleep_or_cancel(Duration::from_secs(60), &token).await);
        assert!(sleep_or_cancel(Duration::ZERO, &CancellationToken::new()).await);
    }
}
