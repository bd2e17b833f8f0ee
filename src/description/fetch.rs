//! HTTP retrieval of description documents.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};
use ureq::Agent;
use xmltree::Element;

/// Per-attempt timeout on description requests.
pub const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("description request timed out (after retry)")]
    Timeout,
    #[error("description request returned HTTP status {0}")]
    Status(u16),
    #[error("transport error: {0}")]
    Transport(ureq::Error),
    #[error("description is not valid XML: {0}")]
    Xml(#[from] xmltree::ParseError),
}

/// GET `url` and parse the body into a generic XML tree.
///
/// One retry on timeout, with a fresh connection; any other failure is
/// final. Non-200 responses become [`FetchError::Status`].
pub fn get_description(url: &str) -> Result<Element, FetchError> {
    get_description_with_timeout(url, FETCH_TIMEOUT)
}

pub fn get_description_with_timeout(url: &str, timeout: Duration) -> Result<Element, FetchError> {
    match fetch_once(url, timeout) {
        Err(FetchError::Timeout) => {
            warn!("description fetch timed out, retrying once: {}", url);
            fetch_once(url, timeout)
        }
        other => other,
    }
}

fn fetch_once(url: &str, timeout: Duration) -> Result<Element, FetchError> {
    let config = Agent::config_builder()
        .timeout_global(Some(timeout))
        .http_status_as_error(false)
        .build();
    let agent: Agent = config.into();

    debug!("fetching description at {}", url);
    let mut response = agent.get(url).call().map_err(classify)?;
    let status = response.status();
    if status.as_u16() != 200 {
        return Err(FetchError::Status(status.as_u16()));
    }

    let body = response
        .body_mut()
        .read_to_string()
        .map_err(classify)?;
    Ok(Element::parse(body.as_bytes())?)
}

fn classify(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::Timeout(_) => FetchError::Timeout,
        ureq::Error::Io(e) if e.kind() == std::io::ErrorKind::TimedOut => FetchError::Timeout,
        other => FetchError::Transport(other),
    }
}
