//! Single-request fetching with bounded, fixed-delay retry.
//!
//! `RetryingFetcher` never returns an error: after `max_attempts` failed
//! attempts it hands back `FetchResult::Failed`, and callers decide what a
//! dropped request means for them.

use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::errors::SamplerError;

/// Byte-level request primitive used by the fetcher.
///
/// Implementations enforce their own per-request timeout and must be safe to
/// call from many worker threads at once.
pub trait Transport: Send + Sync {
    /// Issue one GET request and return the full response body.
    fn get(&self, url: &str) -> Result<Vec<u8>, SamplerError>;
}

impl<T: Transport + ?Sized> Transport for Arc<T> {
    fn get(&self, url: &str) -> Result<Vec<u8>, SamplerError> {
        (**self).get(url)
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn get(&self, url: &str) -> Result<Vec<u8>, SamplerError> {
        (**self).get(url)
    }
}

/// Why a fetch gave up.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchFailure {
    /// Requested URL.
    pub url: String,
    /// Attempts made before giving up.
    pub attempts: usize,
    /// Message from the final failed attempt.
    pub last_error: String,
}

/// Outcome of one fetch: a payload or the failure sentinel.
///
/// `Fetched(vec![])` is a valid, empty payload and is never confused with
/// `Failed`.
#[derive(Clone, Debug, PartialEq)]
pub enum FetchResult<P> {
    /// At least one attempt succeeded (including parsing).
    Fetched(P),
    /// Every attempt failed.
    Failed(FetchFailure),
}

impl<P> FetchResult<P> {
    /// True when a payload was obtained.
    pub fn is_fetched(&self) -> bool {
        matches!(self, FetchResult::Fetched(_))
    }

    /// True for the failure sentinel.
    pub fn is_failed(&self) -> bool {
        matches!(self, FetchResult::Failed(_))
    }

    /// Payload, discarding failure details.
    pub fn into_payload(self) -> Option<P> {
        match self {
            FetchResult::Fetched(payload) => Some(payload),
            FetchResult::Failed(_) => None,
        }
    }

    /// Failure details, if this is the sentinel.
    pub fn failure(&self) -> Option<&FetchFailure> {
        match self {
            FetchResult::Fetched(_) => None,
            FetchResult::Failed(failure) => Some(failure),
        }
    }
}

/// Stateless fetcher that retries a transport with a fixed delay.
pub struct RetryingFetcher<T: Transport> {
    transport: T,
    policy: RetryPolicy,
}

impl<T: Transport> RetryingFetcher<T> {
    /// Create a fetcher, rejecting a policy with zero attempts.
    pub fn new(transport: T, policy: RetryPolicy) -> Result<Self, SamplerError> {
        policy.validate()?;
        Ok(Self { transport, policy })
    }

    /// Active retry policy.
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Access the wrapped transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Fetch the raw response body of `url`.
    pub fn fetch(&self, url: &str) -> FetchResult<Vec<u8>> {
        self.fetch_parsed(url, |body| Ok(body.to_vec()))
    }

    /// Fetch `url` and parse the body, retrying when either step fails.
    ///
    /// Transport errors, timeouts, and parse errors all count as one failed
    /// attempt each and are not distinguished.
    pub fn fetch_parsed<P, F>(&self, url: &str, parse: F) -> FetchResult<P>
    where
        F: Fn(&[u8]) -> Result<P, SamplerError>,
    {
        let max_attempts = self.policy.max_attempts;
        let mut last_error = String::new();
        for attempt in 1..=max_attempts {
            match self.transport.get(url).and_then(|body| parse(&body)) {
                Ok(payload) => {
                    if attempt > 1 {
                        debug!(url, attempt, "[panning:fetch] recovered after retry");
                    }
                    return FetchResult::Fetched(payload);
                }
                Err(err) => {
                    debug!(url, attempt, error = %err, "[panning:fetch] attempt failed");
                    last_error = err.to_string();
                    if attempt < max_attempts {
                        thread::sleep(self.policy.retry_delay);
                    }
                }
            }
        }
        warn!(
            url,
            attempts = max_attempts,
            error = %last_error,
            "[panning:fetch] giving up"
        );
        FetchResult::Failed(FetchFailure {
            url: url.to_string(),
            attempts: max_attempts,
            last_error,
        })
    }
}
