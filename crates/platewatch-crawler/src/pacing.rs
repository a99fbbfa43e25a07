//! Latency-driven pacing of human-like pauses.

use platewatch_core::{CrawlerConfig, RiskTier};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Scales random pause windows by how slow the portal has been responding.
#[derive(Debug, Clone)]
pub struct AdaptivePacer {
    last_latency: Option<Duration>,
    fast_threshold: Duration,
    slow_threshold: Duration,
    fast_factor: f64,
    slow_factor: f64,
}

impl AdaptivePacer {
    /// Pacer with no latency observed yet (factor 1.0).
    #[must_use]
    pub fn new(config: &CrawlerConfig) -> Self {
        Self {
            last_latency: None,
            fast_threshold: Duration::from_millis(config.pacing_fast_threshold_ms),
            slow_threshold: Duration::from_millis(config.pacing_slow_threshold_ms),
            fast_factor: config.pacing_fast_factor,
            slow_factor: config.pacing_slow_factor,
        }
    }

    /// High-risk stations start as if the portal were already slow.
    #[must_use]
    pub fn for_risk_tier(config: &CrawlerConfig, risk_tier: RiskTier) -> Self {
        let mut pacer = Self::new(config);
        if risk_tier == RiskTier::High {
            pacer.record(Duration::from_millis(config.high_risk_initial_latency_ms));
        }
        pacer
    }

    pub fn record(&mut self, latency: Duration) {
        self.last_latency = Some(latency);
    }

    #[must_use]
    pub fn last_latency(&self) -> Option<Duration> {
        self.last_latency
    }

    /// Multiplier for the next pause window.
    #[must_use]
    pub fn factor(&self) -> f64 {
        match self.last_latency {
            Some(latency) if latency < self.fast_threshold => self.fast_factor,
            Some(latency) if latency > self.slow_threshold => self.slow_factor,
            _ => 1.0,
        }
    }

    /// `[min_ms, max_ms]` scaled by the current factor.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn scaled_bounds(&self, min_ms: u64, max_ms: u64) -> (u64, u64) {
        let factor = self.factor();
        let (lo, hi) = if min_ms <= max_ms {
            (min_ms, max_ms)
        } else {
            (max_ms, min_ms)
        };
        (
            (lo as f64 * factor).round() as u64,
            (hi as f64 * factor).round() as u64,
        )
    }

    /// Random duration within the scaled window.
    #[must_use]
    pub fn jitter(&self, min_ms: u64, max_ms: u64) -> Duration {
        let (lo, hi) = self.scaled_bounds(min_ms, max_ms);
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    /// Sleep for a random duration within the scaled window.
    pub async fn pause(&self, min_ms: u64, max_ms: u64) {
        let delay = self.jitter(min_ms, max_ms);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    /// Await a network-facing operation and record how long it took.
    pub async fn measure<F, T>(&mut self, operation: F) -> T
    where
        F: Future<Output = T>,
    {
        let started = Instant::now();
        let output = operation.await;
        self.record(started.elapsed());
        output
    }
}
