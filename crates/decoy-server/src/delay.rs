//! Simulated latency.
//!
//! An endpoint's `[delay_min_ms, delay_max_ms]` window wins over the
//! project default; with neither there is no delay.

use crate::metrics;
use crate::model::{Endpoint, ProjectDefinition};
use rand::Rng;
use std::time::Duration;

/// Latency window in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayWindow {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl DelayWindow {
    pub fn fixed(ms: u64) -> Self {
        Self {
            min_ms: ms,
            max_ms: ms,
        }
    }

    /// Build a window from nullable bounds. One bound alone is a fixed
    /// delay; reversed bounds are swapped.
    pub fn from_bounds(min_ms: Option<u64>, max_ms: Option<u64>) -> Option<Self> {
        match (min_ms, max_ms) {
            (None, None) => None,
            (Some(ms), None) | (None, Some(ms)) => Some(Self::fixed(ms)),
            (Some(a), Some(b)) => Some(Self {
                min_ms: a.min(b),
                max_ms: a.max(b),
            }),
        }
    }

    /// Draw a delay uniformly from the window.
    pub fn sample_ms(&self) -> u64 {
        if self.min_ms >= self.max_ms {
            return self.min_ms;
        }
        rand::thread_rng().gen_range(self.min_ms..=self.max_ms)
    }
}

/// The window that applies to an endpoint.
pub fn effective_window(endpoint: &Endpoint, project: &ProjectDefinition) -> Option<DelayWindow> {
    DelayWindow::from_bounds(endpoint.delay_min_ms, endpoint.delay_max_ms).or_else(|| {
        DelayWindow::from_bounds(project.default_delay_min_ms, project.default_delay_max_ms)
    })
}

/// Compute the delay for one dispatch.
pub fn compute_delay(endpoint: &Endpoint, project: &ProjectDefinition) -> Duration {
    effective_window(endpoint, project)
        .map(|w| Duration::from_millis(w.sample_ms()))
        .unwrap_or(Duration::ZERO)
}

/// Suspend the current request for `delay`. Zero returns immediately.
pub async fn apply_delay(delay: Duration) {
    if delay.is_zero() {
        return;
    }
    metrics::record_injected_delay(delay);
    tokio::time::sleep(delay).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn project(min: Option<u64>, max: Option<u64>) -> ProjectDefinition {
        let mut project: ProjectDefinition =
            serde_yaml::from_str("id: shop\nbasePath: /shop\n").unwrap();
        project.default_delay_min_ms = min;
        project.default_delay_max_ms = max;
        project
    }

    fn endpoint(min: Option<u64>, max: Option<u64>) -> Endpoint {
        let mut endpoint: Endpoint = serde_yaml::from_str("id: e1\nroute: /ping\n").unwrap();
        endpoint.delay_min_ms = min;
        endpoint.delay_max_ms = max;
        endpoint
    }

    #[test]
    fn test_window_from_bounds() {
        assert_eq!(DelayWindow::from_bounds(None, None), None);
        assert_eq!(
            DelayWindow::from_bounds(Some(50), None),
            Some(DelayWindow::fixed(50))
        );
        assert_eq!(
            DelayWindow::from_bounds(Some(300), Some(100)),
            Some(DelayWindow {
                min_ms: 100,
                max_ms: 300
            })
        );
    }

    #[test]
    fn test_sample_within_window() {
        let window = DelayWindow {
            min_ms: 10,
            max_ms: 20,
        };
        for _ in 0..100 {
            let ms = window.sample_ms();
            assert!((10..=20).contains(&ms));
        }
        assert_eq!(DelayWindow::fixed(7).sample_ms(), 7);
    }

    #[test]
    fn test_endpoint_overrides_project_default() {
        let d = compute_delay(&endpoint(Some(5), Some(5)), &project(Some(500), Some(500)));
        assert_eq!(d, Duration::from_millis(5));
    }

    #[test]
    fn test_project_default_and_zero() {
        let d = compute_delay(&endpoint(None, None), &project(Some(40), Some(40)));
        assert_eq!(d, Duration::from_millis(40));
        let d = compute_delay(&endpoint(None, None), &project(None, None));
        assert_eq!(d, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_fixed_delay_elapses() {
        let delay = compute_delay(&endpoint(Some(100), Some(100)), &project(None, None));
        let start = Instant::now();
        apply_delay(delay).await;
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_delay_returns_immediately() {
        let start = tokio::time::Instant::now();
        apply_delay(Duration::ZERO).await;
        assert_eq!(start.elapsed(), Duration::ZERO);
    }
}
