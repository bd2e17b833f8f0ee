//! Control-point configuration.

use std::time::Duration;

use thiserror::Error;

use crate::ssdp::SearchOptions;

/// Options driving discovery and description fetching. Defaults follow
/// common UPnP practice; [`validate`](ControlPointConfig::validate) runs at
/// [`ControlPoint`](crate::ControlPoint) construction.
#[derive(Debug, Clone)]
pub struct ControlPointConfig {
    /// IP multicast TTL for outgoing SSDP datagrams.
    pub ttl: u32,
    /// Searcher deadline; also sets the M-SEARCH `MX` (clamped 1..=5).
    pub response_wait_time: Duration,
    /// Copies of each M-SEARCH datagram sent per pass.
    pub m_search_count: u32,
    /// Also run the 255.255.255.255 broadcast searcher (non-standard).
    pub do_broadcast_search: bool,
    /// Surface DDF/SCPD failures from `start()` instead of skipping the
    /// offending device.
    pub raise_on_remote_error: bool,
}

impl Default for ControlPointConfig {
    fn default() -> Self {
        Self {
            ttl: 4,
            response_wait_time: Duration::from_secs(5),
            m_search_count: 2,
            do_broadcast_search: false,
            raise_on_remote_error: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("multicast TTL must be between 1 and 255, got {0}")]
    InvalidTtl(u32),
    #[error("response_wait_time must be at least one second")]
    ResponseWaitTooShort,
    #[error("m_search_count must be at least 1")]
    NoSearchDatagram,
}

impl ControlPointConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.ttl == 0 || self.ttl > 255 {
            return Err(ConfigError::InvalidTtl(self.ttl));
        }
        if self.response_wait_time < Duration::from_secs(1) {
            return Err(ConfigError::ResponseWaitTooShort);
        }
        if self.m_search_count == 0 {
            return Err(ConfigError::NoSearchDatagram);
        }
        Ok(())
    }

    /// The searcher-facing subset of these options.
    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            response_wait_time: self.response_wait_time,
            ttl: self.ttl,
            m_search_count: self.m_search_count,
        }
    }
}
