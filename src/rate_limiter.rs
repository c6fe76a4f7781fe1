use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::RwLock;
use tokio::time::Instant;

/// per-source-address sliding-window admission decision for new
/// connections. the target operating point is 5 admissions per 60 seconds
/// per source key.
pub struct RateLimiter {
    entries: RwLock<HashMap<String, Vec<Instant>>>,
    limit: usize,
    window: Duration,
}

impl RateLimiter {
    pub fn new(limit: usize, window: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            limit,
            window,
        }
    }

    pub fn default_limits() -> Self {
        Self::new(5, Duration::from_secs(60))
    }

    /// decide whether to admit a connection from `key`. refusal does not
    /// consume a slot; admission records `now` and counts toward the
    /// window.
    ///
    /// # Examples
    ///
    /// ```
    /// use signal_hub::rate_limiter::RateLimiter;
    /// use std::time::Duration;
    /// use tokio::runtime::Runtime;
    ///
    /// Runtime::new().unwrap().block_on(async {
    ///     let limiter = RateLimiter::new(2, Duration::from_secs(60));
    ///     assert!(limiter.allow("1.2.3.4").await);
    ///     assert!(limiter.allow("1.2.3.4").await);
    ///     assert!(!limiter.allow("1.2.3.4").await);
    /// });
    /// ```
    pub async fn allow(&self, key: &str) -> bool {
        let now = Instant::now();
        let cutoff = now.checked_sub(self.window);

        let mut entries = self.entries.write().await;
        let timestamps = entries.entry(key.to_string()).or_default();

        if let Some(cutoff) = cutoff {
            timestamps.retain(|t| *t > cutoff);
        }

        if timestamps.len() >= self.limit {
            return false;
        }

        timestamps.push(now);
        true
    }

    /// walk the map and drop keys whose entire history has aged out of
    /// the window, bounding memory under connection churn. intended to be
    /// driven by a minute-granularity background task.
    pub async fn sweep(&self) {
        let now = Instant::now();
        let cutoff = match now.checked_sub(self.window) {
            Some(cutoff) => cutoff,
            None => return,
        };

        let mut entries = self.entries.write().await;
        entries.retain(|_, timestamps| {
            timestamps.retain(|t| *t > cutoff);
            !timestamps.is_empty()
        });
    }

    /// spawn the minute-granularity housekeeping sweep. returns the task
    /// handle so callers can cancel it on shutdown.
    pub fn spawn_sweeper(self: std::sync::Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(60));
            loop {
                ticker.tick().await;
                self.sweep().await;
            }
        })
    }
}
