//! Active SSDP search (M-SEARCH).

use std::collections::HashSet;
use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use rand::Rng;
use tracing::{debug, info, trace};

use super::message::{DiscoveryRecord, SearchTarget, SsdpMessage};
use super::transport;

/// Tuning knobs for one search pass.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Hard deadline for the whole pass; also sets `MX` (clamped 1..=5).
    pub response_wait_time: Duration,
    /// IP multicast TTL on the send socket.
    pub ttl: u32,
    /// Copies of the M-SEARCH datagram sent, to ride out packet loss.
    pub m_search_count: u32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            response_wait_time: Duration::from_secs(5),
            ttl: 4,
            m_search_count: 2,
        }
    }
}

/// Multicast search. Returns USN-deduplicated records in arrival order;
/// completes within `response_wait_time` plus one receive tick.
pub fn search(target: &SearchTarget, opts: &SearchOptions) -> io::Result<Vec<DiscoveryRecord>> {
    let socket = transport::ephemeral_socket(opts.ttl)?;
    run_search(&socket, super::multicast_target(), target, opts, None)
}

/// Same as [`search`], streaming each fresh record on `tx` as it arrives.
pub fn search_with_channel(
    target: &SearchTarget,
    opts: &SearchOptions,
    tx: &Sender<DiscoveryRecord>,
) -> io::Result<Vec<DiscoveryRecord>> {
    let socket = transport::ephemeral_socket(opts.ttl)?;
    run_search(&socket, super::multicast_target(), target, opts, Some(tx))
}

/// Search over 255.255.255.255 for devices that never joined the multicast
/// group. Outside the UPnP standard (a compatibility hack, off by
/// default), but it follows the timing and dedup contract of [`search`]
/// exactly.
pub fn broadcast_search(
    target: &SearchTarget,
    opts: &SearchOptions,
) -> io::Result<Vec<DiscoveryRecord>> {
    let socket = transport::broadcast_socket(opts.ttl)?;
    run_search(&socket, super::broadcast_target(), target, opts, None)
}

pub(crate) fn run_search(
    socket: &UdpSocket,
    dest: SocketAddr,
    target: &SearchTarget,
    opts: &SearchOptions,
    tx: Option<&Sender<DiscoveryRecord>>,
) -> io::Result<Vec<DiscoveryRecord>> {
    let deadline = Instant::now() + opts.response_wait_time;
    let mx = opts.response_wait_time.as_secs().clamp(1, 5) as u32;
    let payload = SsdpMessage::MSearch {
        target: target.clone(),
        mx,
    }
    .encode();

    for i in 0..opts.m_search_count.max(1) {
        if i > 0 {
            // Short random pause between copies so one burst of loss does
            // not eat every copy.
            let jitter: u64 = rand::thread_rng().gen_range(50..=200);
            std::thread::sleep(Duration::from_millis(jitter));
        }
        socket.send_to(payload.as_bytes(), dest)?;
        debug!("📤 M-SEARCH sent to {} (ST={}, MX={})", dest, target, mx);
    }

    let mut records = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut buf = [0u8; 8192];
    loop {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        socket.set_read_timeout(Some((deadline - now).min(transport::RECV_TICK)))?;
        let (n, from) = match transport::recv_datagram(socket, &mut buf)? {
            Some(datagram) => datagram,
            None => continue,
        };
        let data = String::from_utf8_lossy(&buf[..n]);
        let record = match SsdpMessage::decode(&data) {
            Some(SsdpMessage::SearchResponse(record)) => record,
            Some(_) => continue,
            None => {
                trace!("undecodable search reply from {}", from);
                continue;
            }
        };
        // First response wins for a given USN.
        if !seen.insert(record.usn.clone()) {
            trace!("duplicate USN {} from {}", record.usn, from);
            continue;
        }
        debug!("📥 search response from {}: {}", from, record.usn);
        if let Some(tx) = tx {
            let _ = tx.send(record.clone());
        }
        records.push(record);
    }

    info!("✅ search for {} done: {} record(s)", target, records.len());
    Ok(records)
}
