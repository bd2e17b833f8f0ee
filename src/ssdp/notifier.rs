//! SSDP presence announcements.
//!
//! The device-side half this crate keeps: an alive emitter. It announces
//! once on start, re-announces every `max_age / 2` seconds so the
//! advertisement never lapses, and says byebye exactly once on `stop()`.
//! A failed send is logged and the schedule carries on.

use std::io;
use std::net::{SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::message::{DiscoveryRecord, HeaderMap, SsdpMessage};
use super::transport;

/// One notification-type/USN pair to advertise.
#[derive(Debug, Clone)]
pub struct Advertisement {
    /// Notification type (`upnp:rootdevice`, a device URN, …).
    pub nt: String,
    pub usn: String,
    /// URL of the device description document.
    pub location: String,
    /// `SERVER` header value.
    pub server: String,
    /// Advertised validity in seconds.
    pub max_age: u32,
}

pub struct SsdpNotifier {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SsdpNotifier {
    /// Starts announcing to the SSDP multicast group.
    pub fn start(adv: Advertisement, ttl: u32) -> io::Result<Self> {
        Self::start_with_destination(adv, ttl, super::multicast_target())
    }

    /// Same as [`start`](Self::start) with an explicit destination, for
    /// unusual topologies and for exercising the wire format.
    pub fn start_with_destination(
        adv: Advertisement,
        ttl: u32,
        dest: SocketAddr,
    ) -> io::Result<Self> {
        let socket = transport::ephemeral_socket(ttl)?;
        let stop = Arc::new(AtomicBool::new(false));
        let handle = {
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || run_loop(socket, adv, dest, stop))
        };
        info!("✅ SSDP notifier started");
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ends the periodic schedule and sends the final byebye.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for SsdpNotifier {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
    }
}

fn run_loop(socket: UdpSocket, adv: Advertisement, dest: SocketAddr, stop: Arc<AtomicBool>) {
    // Re-announce well before the advertisement expires; half of max-age
    // leaves room for one lost datagram.
    let period = Duration::from_secs(((adv.max_age / 2).max(1)) as u64);

    send_alive(&socket, &adv, dest);
    let mut next = Instant::now() + period;
    while !stop.load(Ordering::Relaxed) {
        if Instant::now() >= next {
            send_alive(&socket, &adv, dest);
            next = Instant::now() + period;
        }
        std::thread::sleep(Duration::from_millis(250));
    }
    send_byebye(&socket, &adv, dest);
}

fn send_alive(socket: &UdpSocket, adv: &Advertisement, dest: SocketAddr) {
    let msg = SsdpMessage::NotifyAlive(DiscoveryRecord {
        location: adv.location.clone(),
        usn: adv.usn.clone(),
        target: adv.nt.clone(),
        server: adv.server.clone(),
        max_age: adv.max_age,
        ext: false,
        date: None,
        headers: HeaderMap::new(),
    })
    .encode();
    match socket.send_to(msg.as_bytes(), dest) {
        Ok(_) => debug!("📤 NOTIFY alive: {} (NT={})", adv.usn, adv.nt),
        Err(e) => warn!("❌ failed to send NOTIFY alive for {}: {}", adv.usn, e),
    }
}

fn send_byebye(socket: &UdpSocket, adv: &Advertisement, dest: SocketAddr) {
    let msg = SsdpMessage::NotifyByeBye {
        usn: adv.usn.clone(),
        nt: adv.nt.clone(),
    }
    .encode();
    match socket.send_to(msg.as_bytes(), dest) {
        Ok(_) => info!("👋 NOTIFY byebye: {}", adv.usn),
        Err(e) => warn!("❌ failed to send NOTIFY byebye for {}: {}", adv.usn, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ssdp::message::SsdpMessage;

    #[test]
    fn notifier_announces_then_says_byebye_on_stop() {
        let receiver = UdpSocket::bind("127.0.0.1:0").unwrap();
        receiver
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        let dest = receiver.local_addr().unwrap();

        let adv = Advertisement {
            nt: "upnp:rootdevice".into(),
            usn: "uuid:test-device::upnp:rootdevice".into(),
            location: "http://192.0.2.7/desc.xml".into(),
            server: "test/1.0 UPnP/1.0".into(),
            max_age: 1800,
        };
        let notifier = SsdpNotifier::start_with_destination(adv, 4, dest).unwrap();

        let mut buf = [0u8; 8192];
        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let first = SsdpMessage::decode(&String::from_utf8_lossy(&buf[..n])).unwrap();
        let record = match first {
            SsdpMessage::NotifyAlive(record) => record,
            other => panic!("expected the initial alive, got {:?}", other),
        };
        assert_eq!(record.usn, "uuid:test-device::upnp:rootdevice");
        assert_eq!(record.max_age, 1800);

        notifier.stop();

        let (n, _) = receiver.recv_from(&mut buf).unwrap();
        let last = SsdpMessage::decode(&String::from_utf8_lossy(&buf[..n])).unwrap();
        assert_eq!(
            last,
            SsdpMessage::NotifyByeBye {
                usn: "uuid:test-device::upnp:rootdevice".into(),
                nt: "upnp:rootdevice".into(),
            }
        );
    }
}
