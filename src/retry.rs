//! Bounded retries with exponential backoff and jitter.
//!
//! A logical call makes at most `max_retries + 1` attempts. Only failures accepted
//! by [`is_transient`] are retried; everything else is returned after the first
//! attempt. Both the in-flight attempt and the backoff sleep race the caller's
//! [`CancellationToken`].

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{OpenRouterError, Result};
use crate::executor::execute_once;
use crate::http::{HttpRequest, HttpTransport};

pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Lower-cased message fragments that mark an API error as transient.
pub const TRANSIENT_MESSAGES: [&str; 3] = [
    "overloaded",
    "internal server error",
    "provider returned error",
];

/// Source of the multiplicative jitter applied to each backoff delay.
///
/// Implementations return a factor in `[0.5, 1.5)`. Factors outside that range
/// are clamped when the delay is computed; non-finite ones count as `1.0`.
pub trait JitterSource: Send + Sync {
    fn factor(&self) -> f64;
}

/// Draws jitter from the thread-local generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngJitter;

impl JitterSource for ThreadRngJitter {
    fn factor(&self) -> f64 {
        rand::thread_rng().gen_range(0.5..1.5)
    }
}

/// Reproducible jitter from a seeded generator.
pub struct SeededJitter {
    rng: Mutex<StdRng>,
}

impl SeededJitter {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl JitterSource for SeededJitter {
    fn factor(&self) -> f64 {
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.gen_range(0.5..1.5)
    }
}

/// Largest factor below the exclusive upper jitter bound of `1.5`.
const MAX_JITTER: f64 = 1.5 - f64::EPSILON;

/// Constant jitter factor, clamped to `[0.5, 1.5)`.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitter(f64);

impl FixedJitter {
    /// A non-finite `factor` falls back to `1.0`.
    pub fn new(factor: f64) -> Self {
        Self(sanitize_factor(factor))
    }
}

fn sanitize_factor(factor: f64) -> f64 {
    if factor.is_finite() {
        factor.clamp(0.5, MAX_JITTER)
    } else {
        1.0
    }
}

impl JitterSource for FixedJitter {
    fn factor(&self) -> f64 {
        self.0
    }
}

/// Retry settings carried by [`crate::config::ClientConfig`].
#[derive(Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first one.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for every further retry.
    pub initial_backoff: Duration,
    pub jitter: Arc<dyn JitterSource>,
}

impl fmt::Debug for RetryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryConfig")
            .field("max_retries", &self.max_retries)
            .field("initial_backoff", &self.initial_backoff)
            .finish_non_exhaustive()
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            jitter: Arc::new(ThreadRngJitter),
        }
    }
}

impl RetryConfig {
    /// Single attempt, no retries.
    pub fn disabled() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_initial_backoff(mut self, initial_backoff: Duration) -> Self {
        self.initial_backoff = initial_backoff;
        self
    }

    pub fn with_jitter(mut self, jitter: impl JitterSource + 'static) -> Self {
        self.jitter = Arc::new(jitter);
        self
    }

    /// Un-jittered delay before retry number `retry` (1-based).
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use openrouter_http::RetryConfig;
    ///
    /// let config = RetryConfig::default();
    /// assert_eq!(config.base_delay(1), Duration::from_secs(1));
    /// assert_eq!(config.base_delay(3), Duration::from_secs(4));
    /// ```
    pub fn base_delay(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        self.initial_backoff.saturating_mul(1u32 << exp)
    }

    /// Jittered delay before retry number `retry` (1-based).
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let scaled = self.base_delay(retry).as_secs_f64() * sanitize_factor(self.jitter.factor());
        Duration::try_from_secs_f64(scaled).unwrap_or(Duration::MAX)
    }
}

/// Decides whether a failed attempt is worth repeating.
///
/// - transport failures are always transient,
/// - API errors are transient when their transport status is `429` or `5xx`, or
///   when their message matches [`TRANSIENT_MESSAGES`],
/// - unclassified HTTP failures are transient for `429` and `5xx`,
/// - everything else fails fast.
pub fn is_transient(err: &OpenRouterError) -> bool {
    match err {
        OpenRouterError::Transport { .. } => true,
        OpenRouterError::Api(api) => {
            api.http_status.is_some_and(status_is_transient) || message_is_transient(&api.message)
        }
        OpenRouterError::UnclassifiedHttp { status, .. } => status_is_transient(*status),
        _ => false,
    }
}

/// Rate limiting and server-side failures.
pub fn status_is_transient(status: u16) -> bool {
    status == 429 || status >= 500
}

pub fn message_is_transient(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    TRANSIENT_MESSAGES.iter().any(|needle| lower.contains(needle))
}

/// Runs the attempts of one logical call.
///
/// The attempt counter and last error live on the stack of a single
/// [`RetryController::run`] call, so one controller can serve concurrent calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryController<'a> {
    config: &'a RetryConfig,
}

impl<'a> RetryController<'a> {
    pub fn new(config: &'a RetryConfig) -> Self {
        Self { config }
    }

    /// Sends `request` until it succeeds, fails permanently, or the attempts run out.
    ///
    /// Every attempt gets its own clone of `request`, i.e. a fresh view of the
    /// same body bytes.
    pub async fn send(
        &self,
        transport: &dyn HttpTransport,
        request: &HttpRequest,
        cancel: &CancellationToken,
    ) -> Result<Vec<u8>> {
        self.run(cancel, |_| execute_once(transport, request.clone()))
            .await
    }

    /// Drives `attempt` (called with the 0-based attempt number) under the retry policy.
    ///
    /// # Errors
    ///
    /// - a non-transient error is returned unchanged,
    /// - [`OpenRouterError::Cancelled`] when `cancel` fires during an attempt or a backoff,
    /// - [`OpenRouterError::RetryExhausted`] wrapping the last failure otherwise.
    pub async fn run<T, F, Fut>(&self, cancel: &CancellationToken, mut attempt: F) -> Result<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt_no = 0u32;
        loop {
            debug!(attempt = attempt_no, "starting attempt");
            let err = match with_cancel(cancel, attempt(attempt_no)).await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            if !is_transient(&err) {
                return Err(err);
            }
            if attempt_no >= self.config.max_retries {
                return Err(OpenRouterError::RetryExhausted {
                    attempts: attempt_no + 1,
                    source: Box::new(err),
                });
            }

            attempt_no += 1;
            let delay = self.config.delay_for_retry(attempt_no);
            warn!(
                error = %err,
                retry = attempt_no,
                max_retries = self.config.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "request failed, retrying"
            );
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(OpenRouterError::cancelled()),
                _ = sleep(delay) => {}
            }
        }
    }
}

/// Resolves `future` unless `cancel` fires first.
pub(crate) async fn with_cancel<T, Fut>(cancel: &CancellationToken, future: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(OpenRouterError::cancelled());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OpenRouterError::cancelled()),
        result = future => result,
    }
}
