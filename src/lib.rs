//! # pmocontrolpoint - UPnP discovery and control
//!
//! Client-side UPnP: SSDP discovery over multicast UDP, device and service
//! descriptions over HTTP, SOAP action invocation with typed results.
//!
//! ## Fonctionnalités
//!
//! - ✅ M-SEARCH multicast search (plus broadcast fallback) with USN dedup
//! - ✅ Passive NOTIFY listener with alive/byebye subscriber channels
//! - ✅ Periodic ssdp:alive notifier, byebye on shutdown
//! - ✅ DDF/SCPD pipeline into a typed Device/Service model
//! - ✅ SOAP dispatcher coercing outputs by the service state table
//!
//! ## Architecture
//!
//! - [`ssdp`]: wire grammar, UDP transport, searcher/listener/notifier
//! - [`description`]: description fetcher and the device model
//! - [`soap`]: request builder, envelope/fault parsing, the dispatcher
//! - [`ControlPoint`]: facade tying discovery and description together
//!
//! GENA event subscriptions, IPv6 SSDP and HTTPS control channels are out
//! of scope. The `eventSubURL` of each service is captured for callers
//! that bring their own subscriber.

pub mod config;
pub mod control_point;
pub mod description;
pub mod soap;
pub mod ssdp;

pub use config::{ConfigError, ControlPointConfig};
pub use control_point::{extract_udn, ControlPoint, ControlPointError};
pub use description::{
    Action, AllowedRange, Argument, DescriptionError, Device, Direction, FetchError, Service,
    ServiceStatus, StateVariable,
};
pub use soap::{invoke_action, ActionError, ActionValue};
pub use ssdp::{
    broadcast_search, search, Advertisement, ByeByeNotification, DiscoveryRecord, SearchOptions,
    SearchTarget, SsdpListener, SsdpMessage, SsdpNotifier,
};
