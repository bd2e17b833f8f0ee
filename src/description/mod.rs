//! # Description pipeline - DDF and SCPD
//!
//! Fetches a device description document over HTTP, walks it into a typed
//! [`Device`] tree, then fetches each service's SCPD to fill in state
//! variables and actions. A service whose SCPD cannot be retrieved ends up
//! [`Failed`](ServiceStatus::Failed) without dragging its siblings or the
//! device down.

mod fetch;
mod model;

pub use fetch::{get_description, get_description_with_timeout, FetchError, FETCH_TIMEOUT};
pub use model::{
    build_url, parse_scpd, url_base_for, Action, AllowedRange, Argument, DescriptionError, Device,
    Direction, Service, ServiceStatus, StateVariable,
};

pub(crate) use model::child_text;
