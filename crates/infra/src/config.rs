use std::{str::FromStr, time::Duration};
use tracing::{info, warn};

/// How a repeating reminder treats firings that were missed, e.g. because the
/// scheduler was down or the dispatcher kept failing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissedFiringPolicy {
    /// Advance past every missed firing and continue from the present
    ForwardSkip,
    /// Deliver each missed firing, one per poll cycle
    CatchUp,
}

impl FromStr for MissedFiringPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "forward_skip" => Ok(Self::ForwardSkip),
            "catch_up" => Ok(Self::CatchUp),
            _ => Err(format!("Unknown missed firing policy: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total number of dispatch attempts for one occurrence, including the first
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Each following delay is the previous one multiplied by this factor
    pub backoff_factor: f64,
    /// Upper bound for a single delay
    pub max_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after the given failed attempt (1-based) before trying again
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let millis = self.initial_delay.as_millis() as f64 * self.backoff_factor.powi(exponent);
        let max_millis = self.max_delay.as_millis() as f64;
        if !millis.is_finite() || millis >= max_millis {
            return self.max_delay;
        }
        Duration::from_millis(millis as u64)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            backoff_factor: 2.0,
            max_delay: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Interval between two poll cycles of the scheduler loop
    pub poll_every: Duration,
    /// Added to `poll_every` when computing the lookahead cutoff of a poll cycle
    pub window_slack: Duration,
    /// Maximum number of dispatcher calls in flight at the same time
    pub dispatch_concurrency: usize,
    /// Maximum number of reminders fetched by one poll cycle
    pub batch_limit: usize,
    pub retry_policy: RetryPolicy,
    /// Timeout for a single dispatcher call. A timeout counts as a transient failure.
    pub dispatch_timeout: Duration,
    /// How long a cancelled scheduler waits for in-flight dispatches before
    /// abandoning them
    pub shutdown_grace: Duration,
    pub missed_firing_policy: MissedFiringPolicy,
}

impl Config {
    pub fn new() -> Self {
        let defaults = Self::default();
        let retry_defaults = defaults.retry_policy;

        Self {
            poll_every: millis_from_env("POLL_EVERY_MILLIS", defaults.poll_every),
            window_slack: millis_from_env("WINDOW_SLACK_MILLIS", defaults.window_slack),
            dispatch_concurrency: positive_from_env(
                "DISPATCH_CONCURRENCY",
                defaults.dispatch_concurrency,
            ),
            batch_limit: positive_from_env("BATCH_LIMIT", defaults.batch_limit),
            retry_policy: RetryPolicy {
                max_attempts: positive_from_env("RETRY_MAX_ATTEMPTS", retry_defaults.max_attempts),
                initial_delay: millis_from_env(
                    "RETRY_INITIAL_DELAY_MILLIS",
                    retry_defaults.initial_delay,
                ),
                backoff_factor: positive_from_env(
                    "RETRY_BACKOFF_FACTOR",
                    retry_defaults.backoff_factor,
                ),
                max_delay: millis_from_env("RETRY_MAX_DELAY_MILLIS", retry_defaults.max_delay),
            },
            dispatch_timeout: millis_from_env("DISPATCH_TIMEOUT_MILLIS", defaults.dispatch_timeout),
            shutdown_grace: millis_from_env("SHUTDOWN_GRACE_MILLIS", defaults.shutdown_grace),
            missed_firing_policy: from_env("MISSED_FIRING_POLICY", defaults.missed_firing_policy),
        }
    }
}

impl Config {
    /// Shortest distance between now and the occurrence of a new one-shot reminder
    pub fn min_lead(&self) -> chrono::Duration {
        to_chrono(self.poll_every)
    }

    /// How far past now a poll cycle fetches due reminders
    pub fn fetch_window(&self) -> chrono::Duration {
        to_chrono(self.poll_every)
            .checked_add(&to_chrono(self.window_slack))
            .unwrap_or_else(chrono::Duration::max_value)
    }
}

/// Durations beyond what chrono can represent saturate
fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::max_value())
}

impl Default for Config {
    /// The configuration used when no environment variables are set
    fn default() -> Self {
        Self {
            poll_every: Duration::from_secs(1),
            window_slack: Duration::from_millis(1),
            dispatch_concurrency: 16,
            batch_limit: 500,
            retry_policy: RetryPolicy::default(),
            dispatch_timeout: Duration::from_secs(10),
            shutdown_grace: Duration::from_secs(10),
            missed_firing_policy: MissedFiringPolicy::ForwardSkip,
        }
    }
}

fn from_env<T: FromStr + std::fmt::Debug>(name: &str, default: T) -> T {
    match std::env::var(name) {
        Ok(value) => match value.parse::<T>() {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!(
                    "The given {}: {} is not valid, falling back to the default: {:?}.",
                    name, value, default
                );
                default
            }
        },
        Err(_) => {
            info!(
                "Did not find {} environment variable. Using the default: {:?}.",
                name, default
            );
            default
        }
    }
}

fn positive_from_env<T>(name: &str, default: T) -> T
where
    T: FromStr + PartialOrd + Default + Copy + std::fmt::Debug,
{
    let value = from_env(name, default);
    if value <= T::default() {
        warn!(
            "The given {}: {:?} must be positive, falling back to the default: {:?}.",
            name, value, default
        );
        return default;
    }
    value
}

fn millis_from_env(name: &str, default: Duration) -> Duration {
    let default_millis = default.as_millis() as u64;
    Duration::from_millis(positive_from_env(name, default_millis))
}
