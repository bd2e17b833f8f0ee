//! UDP socket plumbing for SSDP.
//!
//! Two socket modes coexist in one process without port conflict:
//!
//! * the *listen* socket binds 0.0.0.0:1900 with address reuse and joins
//!   the multicast group; it belongs to the listener alone;
//! * *send* sockets bind 0.0.0.0:0 and receive their unicast replies on
//!   the ephemeral port, so searchers and notifiers never compete with the
//!   listener for kernel delivery of datagrams on 1900.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4, UdpSocket};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};
use tracing::{debug, warn};

use super::{SSDP_MULTICAST_ADDR, SSDP_PORT};

/// Read timeout used by every receive loop. Bounds both `stop()` latency
/// and searcher deadline overshoot.
pub const RECV_TICK: Duration = Duration::from_millis(250);

fn new_udp_socket() -> io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    Ok(socket)
}

/// Multicast listen socket: bound to 0.0.0.0:1900, joined to the SSDP
/// group on every eligible IPv4 interface.
pub fn multicast_listen_socket(ttl: u32) -> io::Result<UdpSocket> {
    let socket = new_udp_socket()?;
    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, SSDP_PORT).into();
    socket.bind(&bind_addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(RECV_TICK))?;
    socket.set_multicast_ttl_v4(ttl)?;
    socket.set_multicast_loop_v4(true)?;

    let mut joined = 0usize;
    for iface in get_if_addrs::get_if_addrs()? {
        if let std::net::IpAddr::V4(ipv4) = iface.ip() {
            if !ipv4.is_loopback() {
                match socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &ipv4) {
                    Ok(()) => {
                        joined += 1;
                        debug!("SSDP: joined {} on {}", SSDP_MULTICAST_ADDR, ipv4);
                    }
                    Err(e) => {
                        warn!("SSDP: failed to join {} on {}: {}", SSDP_MULTICAST_ADDR, ipv4, e);
                    }
                }
            }
        }
    }
    if joined == 0 {
        socket.join_multicast_v4(&SSDP_MULTICAST_ADDR, &Ipv4Addr::UNSPECIFIED)?;
    }

    Ok(socket)
}

/// Ephemeral send socket (0.0.0.0:0) used by the searcher and notifier.
pub fn ephemeral_socket(ttl: u32) -> io::Result<UdpSocket> {
    let socket = new_udp_socket()?;
    let bind_addr: SocketAddr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, 0).into();
    socket.bind(&bind_addr.into())?;

    let socket: UdpSocket = socket.into();
    socket.set_read_timeout(Some(RECV_TICK))?;
    socket.set_multicast_ttl_v4(ttl)?;
    socket.set_multicast_loop_v4(true)?;
    Ok(socket)
}

/// Ephemeral socket with `SO_BROADCAST`, for the broadcast searcher.
pub fn broadcast_socket(ttl: u32) -> io::Result<UdpSocket> {
    let socket = ephemeral_socket(ttl)?;
    socket.set_broadcast(true)?;
    Ok(socket)
}

/// One receive step: `Ok(Some(..))` on a datagram, `Ok(None)` on the tick
/// timeout or EINTR, `Err` on anything fatal.
pub fn recv_datagram(
    socket: &UdpSocket,
    buf: &mut [u8],
) -> io::Result<Option<(usize, SocketAddr)>> {
    match socket.recv_from(buf) {
        Ok((n, from)) => Ok(Some((n, from))),
        Err(e)
            if matches!(
                e.kind(),
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
            ) =>
        {
            Ok(None)
        }
        Err(e) => Err(e),
    }
}
