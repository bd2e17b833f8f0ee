//! # SSDP - Simple Service Discovery Protocol
//!
//! HTTP-shaped messages over multicast UDP, per UPnP 1.0 device
//! architecture.
//!
//! ## Fonctionnalités
//!
//! - ✅ Codec for M-SEARCH, NOTIFY alive/byebye and search responses
//! - ✅ Active search with duplicate suppression and a hard deadline
//! - ✅ Passive listener publishing alive/byebye to subscribers
//! - ✅ Periodic alive announcements with byebye on teardown
//!
//! ## Constants
//!
//! - Multicast group: 239.255.255.250:1900
//! - Broadcast fallback: 255.255.255.255:1900 (non-standard)
//! - Default advertisement validity: 1800 seconds

pub mod listener;
pub mod message;
pub mod notifier;
pub mod searcher;
pub mod transport;

pub use listener::{ByeByeNotification, SsdpListener};
pub use message::{DiscoveryRecord, HeaderMap, SearchTarget, SsdpMessage};
pub use notifier::{Advertisement, SsdpNotifier};
pub use searcher::{broadcast_search, search, search_with_channel, SearchOptions};

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};

/// SSDP well-known multicast group.
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Limited-broadcast address used by the opt-in broadcast searcher.
pub const SSDP_BROADCAST_ADDR: Ipv4Addr = Ipv4Addr::BROADCAST;

/// SSDP well-known port.
pub const SSDP_PORT: u16 = 1900;

/// Default advertisement validity in seconds.
pub const MAX_AGE: u32 = 1800;

/// `239.255.255.250:1900` as a socket address.
pub fn multicast_target() -> SocketAddr {
    SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT).into()
}

/// `255.255.255.255:1900` as a socket address.
pub fn broadcast_target() -> SocketAddr {
    SocketAddrV4::new(SSDP_BROADCAST_ADDR, SSDP_PORT).into()
}
