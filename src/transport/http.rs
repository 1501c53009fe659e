use std::time::Duration;

use tracing::debug;

use crate::constants::fetch::{DEFAULT_REQUEST_TIMEOUT, USER_AGENT};
use crate::errors::SamplerError;
use crate::fetch::Transport;

/// Blocking HTTP(S) transport backed by a shared `ureq` agent.
///
/// Every request is bounded by a global timeout covering connect, send, and
/// body read. Non-success statuses are reported as transport errors.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
    timeout: Duration,
}

impl UreqTransport {
    /// Create a transport whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: config.into(),
            timeout,
        }
    }

    /// Configured per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new(DEFAULT_REQUEST_TIMEOUT)
    }
}

impl Transport for UreqTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, SamplerError> {
        debug!(url, "[panning:http] GET");
        let response = self
            .agent
            .get(url)
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(|err| SamplerError::Transport {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        response
            .into_body()
            .read_to_vec()
            .map_err(|err| SamplerError::Transport {
                url: url.to_string(),
                reason: format!("failed reading response body: {err}"),
            })
    }
}
