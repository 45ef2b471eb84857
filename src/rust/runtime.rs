use std::env;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use tokio::sync::{Mutex, Semaphore};
use tokio::time::{sleep, Instant};

use crate::error::{ClassificationError, Result};

const RATE_WINDOW_ENV: &str = "TERRACLASS_RATE_WINDOW_MS";
const MAX_RATE_ENV: &str = "TERRACLASS_MAX_RATE";
const MAX_CONCURRENCY_ENV: &str = "TERRACLASS_MAX_CONCURRENCY";

/// Bounds on remote round trips: at most `max_rate` starts per
/// `rate_window`, and at most `max_concurrency` in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct LimiterConfig {
    pub name: String,
    pub rate_window: Duration,
    pub max_rate: usize,
    pub max_concurrency: usize,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            name: "EE".to_string(),
            rate_window: Duration::from_millis(1000),
            max_rate: 10,
            max_concurrency: 20,
        }
    }
}

impl LimiterConfig {
    pub fn validate(&self) -> Result<()> {
        if self.rate_window.is_zero() || self.max_rate == 0 || self.max_concurrency == 0 {
            return Err(ClassificationError::config(format!(
                "Limiter {} needs a non-zero window, rate and concurrency",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub limiter: LimiterConfig,
    /// Scale used for min/max statistics when the recipe sets none
    pub normalize_scale: f64,
    pub normalize_max_pixels: u64,
    /// Scale used to sample reference points when the recipe sets none
    pub sample_scale: f64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            limiter: LimiterConfig::default(),
            normalize_scale: 30.0,
            normalize_max_pixels: 1_000_000,
            sample_scale: 1.0,
        }
    }
}

impl RuntimeConfig {
    /// Defaults, overridden by `TERRACLASS_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        if let Some(window) = env_var::<u64>(RATE_WINDOW_ENV)? {
            config.limiter.rate_window = Duration::from_millis(window);
        }
        if let Some(rate) = env_var(MAX_RATE_ENV)? {
            config.limiter.max_rate = rate;
        }
        if let Some(concurrency) = env_var(MAX_CONCURRENCY_ENV)? {
            config.limiter.max_concurrency = concurrency;
        }
        config.limiter.validate()?;
        Ok(config)
    }
}

fn env_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(value) => value.trim().parse().map(Some).map_err(|_| {
            ClassificationError::config(format!("{} must be a non-negative integer, got '{}'", name, value))
        }),
        Err(_) => Ok(None),
    }
}

#[derive(Debug)]
struct Window {
    started: Instant,
    issued: usize,
}

/// Admission control for remote round trips: a fixed-window rate limit
/// plus a cap on concurrent requests.
#[derive(Debug)]
pub struct Limiter {
    config: LimiterConfig,
    permits: Arc<Semaphore>,
    window: Mutex<Window>,
}

impl Limiter {
    pub fn new(config: LimiterConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            permits: Arc::new(Semaphore::new(config.max_concurrency)),
            window: Mutex::new(Window {
                started: Instant::now(),
                issued: 0,
            }),
            config,
        })
    }

    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Requests currently holding a concurrency permit
    pub fn in_flight(&self) -> usize {
        self.config.max_concurrency - self.permits.available_permits()
    }

    /// Runs `request` once a concurrency permit and a rate slot are free.
    /// The permit is released when the request finishes or is dropped.
    pub async fn run<F, T>(&self, request: F) -> anyhow::Result<T>
    where
        F: Future<Output = anyhow::Result<T>>,
    {
        let _permit = self.permits.acquire().await?;
        self.take_slot().await;
        request.await
    }

    async fn take_slot(&self) {
        loop {
            let wait = {
                let mut window = self.window.lock().await;
                let now = Instant::now();
                if now.duration_since(window.started) >= self.config.rate_window {
                    window.started = now;
                    window.issued = 0;
                }
                if window.issued < self.config.max_rate {
                    window.issued += 1;
                    return;
                }
                window.started + self.config.rate_window - now
            };
            debug!("Limiter {} throttled for {:?}", self.config.name, wait);
            sleep(wait).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::future::join_all;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn limiter(max_rate: usize, max_concurrency: usize) -> Limiter {
        Limiter::new(LimiterConfig {
            max_rate,
            max_concurrency,
            ..LimiterConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.limiter.name, "EE");
        assert_eq!(config.limiter.rate_window, Duration::from_secs(1));
        assert_eq!(config.limiter.max_rate, 10);
        assert_eq!(config.limiter.max_concurrency, 20);
        assert_eq!(config.normalize_max_pixels, 1_000_000);
    }

    #[test]
    fn test_zero_limits_are_rejected() {
        let config = LimiterConfig {
            max_rate: 0,
            ..LimiterConfig::default()
        };
        assert!(Limiter::new(config).unwrap_err().is_configuration());
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_window() {
        let limiter = limiter(10, 100);
        let start = Instant::now();
        let started = join_all((0..25).map(|_| limiter.run(async { Ok::<_, anyhow::Error>(Instant::now()) }))).await;
        let offsets: Vec<Duration> = started
            .into_iter()
            .map(|s| s.unwrap().duration_since(start))
            .collect();
        let in_window = |n: u64| {
            offsets
                .iter()
                .filter(|o| **o >= Duration::from_secs(n) && **o < Duration::from_secs(n + 1))
                .count()
        };
        assert_eq!(in_window(0), 10);
        assert_eq!(in_window(1), 10);
        assert_eq!(in_window(2), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_cap() {
        let limiter = limiter(1000, 3);
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        join_all((0..10).map(|_| {
            limiter.run(async {
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                sleep(Duration::from_millis(50)).await;
                running.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(())
            })
        }))
        .await;
        assert_eq!(peak.load(Ordering::SeqCst), 3);
        assert_eq!(limiter.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_dropped_request_releases_permit() {
        let limiter = limiter(10, 1);
        {
            let pending = limiter.run(std::future::pending::<anyhow::Result<()>>());
            tokio::pin!(pending);
            let _ = tokio::time::timeout(Duration::from_millis(10), &mut pending).await;
            assert_eq!(limiter.in_flight(), 1);
        }
        assert_eq!(limiter.in_flight(), 0);
        assert!(limiter.run(async { Ok::<_, anyhow::Error>(1) }).await.is_ok());
    }

    #[test]
    fn test_from_env() {
        env::set_var(MAX_RATE_ENV, "5");
        let config = RuntimeConfig::from_env().unwrap();
        assert_eq!(config.limiter.max_rate, 5);

        env::set_var(MAX_RATE_ENV, "lots");
        assert!(RuntimeConfig::from_env().unwrap_err().is_configuration());
        env::remove_var(MAX_RATE_ENV);
    }
}
