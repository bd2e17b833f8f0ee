//! Passive SSDP observer.
//!
//! Owns the multicast listen socket for its whole lifetime and republishes
//! NOTIFY traffic to subscribers. Alive and byebye go to independent
//! unbounded channels; every subscriber sees every message delivered after
//! it subscribed. No duplicate suppression happens here; the control
//! point deduplicates by USN with knowledge this layer does not have.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, trace, warn};

use super::message::{DiscoveryRecord, SsdpMessage};
use super::transport;

/// A device leaving the network: `NOTIFY` with `NTS: ssdp:byebye`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ByeByeNotification {
    pub usn: String,
    pub nt: String,
}

type Subscribers<T> = Arc<Mutex<Vec<Sender<T>>>>;

pub struct SsdpListener {
    stop: Arc<AtomicBool>,
    alive_subs: Subscribers<DiscoveryRecord>,
    byebye_subs: Subscribers<ByeByeNotification>,
    malformed: Arc<AtomicU64>,
    error_rx: Receiver<io::Error>,
    handle: Option<JoinHandle<()>>,
}

impl SsdpListener {
    /// Binds the multicast socket and starts the receive loop.
    pub fn start(ttl: u32) -> io::Result<Self> {
        let socket = transport::multicast_listen_socket(ttl)?;
        let stop = Arc::new(AtomicBool::new(false));
        let alive_subs: Subscribers<DiscoveryRecord> = Arc::new(Mutex::new(Vec::new()));
        let byebye_subs: Subscribers<ByeByeNotification> = Arc::new(Mutex::new(Vec::new()));
        let malformed = Arc::new(AtomicU64::new(0));
        let (error_tx, error_rx) = unbounded();

        let handle = {
            let stop = Arc::clone(&stop);
            let alive_subs = Arc::clone(&alive_subs);
            let byebye_subs = Arc::clone(&byebye_subs);
            let malformed = Arc::clone(&malformed);
            std::thread::spawn(move || {
                run_loop(socket, stop, alive_subs, byebye_subs, malformed, error_tx)
            })
        };

        info!("✅ SSDP listener started on 0.0.0.0:{}", super::SSDP_PORT);
        Ok(Self {
            stop,
            alive_subs,
            byebye_subs,
            malformed,
            error_rx,
            handle: Some(handle),
        })
    }

    /// New channel receiving every `ssdp:alive` from now on.
    pub fn subscribe_alive(&self) -> Receiver<DiscoveryRecord> {
        let (tx, rx) = unbounded();
        self.alive_subs.lock().unwrap().push(tx);
        rx
    }

    /// New channel receiving every `ssdp:byebye` from now on.
    pub fn subscribe_byebye(&self) -> Receiver<ByeByeNotification> {
        let (tx, rx) = unbounded();
        self.byebye_subs.lock().unwrap().push(tx);
        rx
    }

    /// Datagrams received and discarded as undecodable so far.
    pub fn malformed_count(&self) -> u64 {
        self.malformed.load(Ordering::Relaxed)
    }

    /// The socket error that terminated the receive loop, if it died.
    pub fn terminal_error(&self) -> Option<io::Error> {
        self.error_rx.try_recv().ok()
    }

    /// Stops the receive loop and joins the thread.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SsdpListener {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn run_loop(
    socket: std::net::UdpSocket,
    stop: Arc<AtomicBool>,
    alive_subs: Subscribers<DiscoveryRecord>,
    byebye_subs: Subscribers<ByeByeNotification>,
    malformed: Arc<AtomicU64>,
    error_tx: Sender<io::Error>,
) {
    let mut buf = [0u8; 8192];
    while !stop.load(Ordering::Relaxed) {
        let (n, from) = match transport::recv_datagram(&socket, &mut buf) {
            Ok(Some(datagram)) => datagram,
            Ok(None) => continue,
            Err(e) => {
                warn!("❌ SSDP listener read error: {}", e);
                let _ = error_tx.send(e);
                return;
            }
        };
        let data = String::from_utf8_lossy(&buf[..n]);
        match SsdpMessage::decode(&data) {
            Some(SsdpMessage::NotifyAlive(record)) => {
                debug!("📥 ssdp:alive from {}: {}", from, record.usn);
                fan_out(&alive_subs, record);
            }
            Some(SsdpMessage::NotifyByeBye { usn, nt }) => {
                debug!("📥 ssdp:byebye from {}: {}", from, usn);
                fan_out(&byebye_subs, ByeByeNotification { usn, nt });
            }
            // M-SEARCH from other control points and stray unicast
            // responses are not ours to handle here.
            Some(_) => {}
            None => {
                malformed.fetch_add(1, Ordering::Relaxed);
                trace!("undecodable datagram from {}", from);
            }
        }
    }
}

fn fan_out<T: Clone>(subs: &Subscribers<T>, value: T) {
    let mut subs = subs.lock().unwrap();
    // A failed send means the subscriber dropped its receiver.
    subs.retain(|tx| tx.send(value.clone()).is_ok());
}
