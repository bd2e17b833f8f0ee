//! HTTPU message codec.
//!
//! SSDP reuses the HTTP/1.1 start-line and header grammar over UDP. Three
//! start-lines exist on the wire: `M-SEARCH * HTTP/1.1` (search request),
//! `NOTIFY * HTTP/1.1` (presence announcement) and `HTTP/1.1 200 OK`
//! (unicast search response). Lines end with CRLF; a blank line terminates
//! the header block and anything after it is ignored.
//!
//! Messages missing a mandatory header for their kind are dropped, never
//! surfaced as errors: the network is full of half-conformant devices and
//! a control point has no one to report them to.

use std::fmt;
use std::str::FromStr;

use tracing::trace;

use super::{SSDP_MULTICAST_ADDR, SSDP_PORT};

/// `USER-AGENT` sent on outgoing M-SEARCH requests.
pub const USER_AGENT: &str = "pmocontrolpoint SSDP client";

const MAN_DISCOVER: &str = "\"ssdp:discover\"";

/// Ordered, case-insensitive header map. Names are canonicalised to upper
/// case; insertion order is the wire order, so unknown extension headers
/// survive a decode/encode round trip verbatim.
#[derive(Debug, Clone, Default)]
pub struct HeaderMap {
    entries: Vec<(String, String)>,
}

impl HeaderMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: &str) {
        self.entries
            .push((name.trim().to_ascii_uppercase(), value.trim().to_string()));
    }

    /// First value for `name`, compared case-insensitively.
    pub fn get(&self, name: &str) -> Option<&str> {
        let needle = name.to_ascii_uppercase();
        self.entries
            .iter()
            .find(|(n, _)| *n == needle)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PartialEq for HeaderMap {
    // Header order is not significant.
    fn eq(&self, other: &Self) -> bool {
        let mut a = self.entries.clone();
        let mut b = other.entries.clone();
        a.sort();
        b.sort();
        a == b
    }
}

impl Eq for HeaderMap {}

/// One SSDP advertisement or search response, parsed and validated.
/// Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryRecord {
    /// Absolute HTTP URL of the device description document.
    pub location: String,
    /// Unique service name of the advertisement.
    pub usn: String,
    /// `ST` of a search response or `NT` of an alive notification.
    pub target: String,
    pub server: String,
    /// Seconds of validity from `CACHE-CONTROL: max-age=…`.
    pub max_age: u32,
    /// Whether the message carried the `EXT` confirmation header.
    pub ext: bool,
    /// Raw `DATE` header of a search response.
    pub date: Option<String>,
    /// Every received header in wire order, extensions included.
    pub headers: HeaderMap,
}

/// What an M-SEARCH asks for, rendered to the `ST` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchTarget {
    /// `ssdp:all`: every device and service.
    All,
    /// `upnp:rootdevice`: root devices only.
    RootDevice,
    /// `uuid:<id>`: one specific device.
    Uuid(String),
    /// `urn:<domain>:device:<name>:<version>`
    DeviceType {
        domain: String,
        name: String,
        version: u32,
    },
    /// `urn:<domain>:service:<name>:<version>`
    ServiceType {
        domain: String,
        name: String,
        version: u32,
    },
}

impl fmt::Display for SearchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchTarget::All => f.write_str("ssdp:all"),
            SearchTarget::RootDevice => f.write_str("upnp:rootdevice"),
            SearchTarget::Uuid(id) => write!(f, "uuid:{}", id),
            SearchTarget::DeviceType {
                domain,
                name,
                version,
            } => write!(f, "urn:{}:device:{}:{}", domain, name, version),
            SearchTarget::ServiceType {
                domain,
                name,
                version,
            } => write!(f, "urn:{}:service:{}:{}", domain, name, version),
        }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unrecognised search target: {0}")]
pub struct SearchTargetParseError(String);

impl FromStr for SearchTarget {
    type Err = SearchTargetParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s {
            "ssdp:all" => return Ok(SearchTarget::All),
            "upnp:rootdevice" => return Ok(SearchTarget::RootDevice),
            _ => {}
        }
        if let Some(id) = s.strip_prefix("uuid:") {
            return Ok(SearchTarget::Uuid(id.to_string()));
        }
        if let Some(rest) = s.strip_prefix("urn:") {
            let parts: Vec<&str> = rest.split(':').collect();
            if parts.len() == 4 {
                if let Ok(version) = parts[3].parse::<u32>() {
                    let domain = parts[0].to_string();
                    let name = parts[2].to_string();
                    match parts[1] {
                        "device" => {
                            return Ok(SearchTarget::DeviceType {
                                domain,
                                name,
                                version,
                            });
                        }
                        "service" => {
                            return Ok(SearchTarget::ServiceType {
                                domain,
                                name,
                                version,
                            });
                        }
                        _ => {}
                    }
                }
            }
        }
        Err(SearchTargetParseError(s.to_string()))
    }
}

/// The four message kinds a control point and a notifier exchange.
#[derive(Debug, Clone, PartialEq)]
pub enum SsdpMessage {
    MSearch { target: SearchTarget, mx: u32 },
    NotifyAlive(DiscoveryRecord),
    NotifyByeBye { usn: String, nt: String },
    SearchResponse(DiscoveryRecord),
}

impl SsdpMessage {
    /// Serialises to the CRLF-terminated wire form, blank line included.
    pub fn encode(&self) -> String {
        match self {
            SsdpMessage::MSearch { target, mx } => format!(
                "M-SEARCH * HTTP/1.1\r\n\
                 HOST: {}:{}\r\n\
                 MAN: {}\r\n\
                 MX: {}\r\n\
                 ST: {}\r\n\
                 USER-AGENT: {}\r\n\
                 \r\n",
                SSDP_MULTICAST_ADDR, SSDP_PORT, MAN_DISCOVER, mx, target, USER_AGENT
            ),
            SsdpMessage::NotifyAlive(r) => {
                let mut msg = format!(
                    "NOTIFY * HTTP/1.1\r\n\
                     HOST: {}:{}\r\n\
                     CACHE-CONTROL: max-age={}\r\n\
                     LOCATION: {}\r\n\
                     NT: {}\r\n\
                     NTS: ssdp:alive\r\n\
                     SERVER: {}\r\n\
                     USN: {}\r\n",
                    SSDP_MULTICAST_ADDR, SSDP_PORT, r.max_age, r.location, r.target, r.server, r.usn
                );
                append_extensions(
                    &mut msg,
                    &r.headers,
                    &[
                        "HOST",
                        "CACHE-CONTROL",
                        "LOCATION",
                        "NT",
                        "NTS",
                        "SERVER",
                        "USN",
                    ],
                );
                msg.push_str("\r\n");
                msg
            }
            SsdpMessage::NotifyByeBye { usn, nt } => format!(
                "NOTIFY * HTTP/1.1\r\n\
                 HOST: {}:{}\r\n\
                 NT: {}\r\n\
                 NTS: ssdp:byebye\r\n\
                 USN: {}\r\n\
                 \r\n",
                SSDP_MULTICAST_ADDR, SSDP_PORT, nt, usn
            ),
            SsdpMessage::SearchResponse(r) => {
                let date = r.date.clone().unwrap_or_else(rfc1123_now);
                let mut msg = format!(
                    "HTTP/1.1 200 OK\r\n\
                     CACHE-CONTROL: max-age={}\r\n\
                     DATE: {}\r\n\
                     EXT:\r\n\
                     LOCATION: {}\r\n\
                     SERVER: {}\r\n\
                     ST: {}\r\n\
                     USN: {}\r\n",
                    r.max_age, date, r.location, r.server, r.target, r.usn
                );
                append_extensions(
                    &mut msg,
                    &r.headers,
                    &[
                        "CACHE-CONTROL",
                        "DATE",
                        "EXT",
                        "LOCATION",
                        "SERVER",
                        "ST",
                        "USN",
                    ],
                );
                msg.push_str("\r\n");
                msg
            }
        }
    }

    /// Parses one datagram. `None` means the message is not SSDP, is of an
    /// unhandled kind, or misses a mandatory header; the caller drops it.
    pub fn decode(data: &str) -> Option<SsdpMessage> {
        let mut lines = data.lines();
        let start = lines.next()?.trim();
        let upper = start.to_ascii_uppercase();
        let headers = parse_headers(lines);

        if upper.starts_with("M-SEARCH ") {
            decode_msearch(&headers)
        } else if upper.starts_with("NOTIFY ") {
            decode_notify(headers)
        } else if upper.starts_with("HTTP/") && upper.contains(" 200") {
            decode_search_response(headers)
        } else {
            trace!("unhandled SSDP start line: {}", start);
            None
        }
    }
}

fn decode_msearch(headers: &HeaderMap) -> Option<SsdpMessage> {
    if !headers.contains("HOST") {
        trace!("M-SEARCH without HOST header, dropping");
        return None;
    }
    let man = headers.get("MAN")?;
    if !man.eq_ignore_ascii_case(MAN_DISCOVER) {
        trace!("M-SEARCH with MAN '{}', dropping", man);
        return None;
    }
    let mx = headers.get("MX")?.parse::<u32>().ok()?;
    let target = headers.get("ST")?.parse::<SearchTarget>().ok()?;
    Some(SsdpMessage::MSearch { target, mx })
}

fn decode_notify(headers: HeaderMap) -> Option<SsdpMessage> {
    let nts = headers.get("NTS")?.to_ascii_lowercase();
    let nt = headers.get("NT")?.to_string();
    let usn = headers.get("USN")?.to_string();
    if !headers.contains("HOST") {
        trace!("NOTIFY without HOST header, dropping");
        return None;
    }

    if usn.is_empty() {
        trace!("NOTIFY with empty USN, dropping");
        return None;
    }

    match nts.as_str() {
        "ssdp:alive" => {
            let location = headers.get("LOCATION")?.to_string();
            if !valid_location(&location) {
                trace!("NOTIFY with unusable LOCATION '{}', dropping", location);
                return None;
            }
            let server = headers.get("SERVER")?.to_string();
            let max_age = parse_max_age(headers.get("CACHE-CONTROL")?)?;
            Some(SsdpMessage::NotifyAlive(DiscoveryRecord {
                location,
                usn,
                target: nt,
                server,
                max_age,
                ext: headers.contains("EXT"),
                date: headers.get("DATE").map(str::to_string),
                headers,
            }))
        }
        "ssdp:byebye" => Some(SsdpMessage::NotifyByeBye { usn, nt }),
        other => {
            trace!("NOTIFY with unknown NTS '{}', dropping", other);
            None
        }
    }
}

fn decode_search_response(headers: HeaderMap) -> Option<SsdpMessage> {
    let location = headers.get("LOCATION")?.to_string();
    if !valid_location(&location) {
        trace!("search response with unusable LOCATION '{}', dropping", location);
        return None;
    }
    let usn = headers.get("USN")?.to_string();
    if usn.is_empty() {
        trace!("search response with empty USN, dropping");
        return None;
    }
    let target = headers.get("ST")?.to_string();
    let server = headers.get("SERVER")?.to_string();
    let max_age = parse_max_age(headers.get("CACHE-CONTROL")?)?;
    let date = headers.get("DATE")?.to_string();
    if !headers.contains("EXT") {
        trace!("search response without EXT header, dropping");
        return None;
    }
    Some(SsdpMessage::SearchResponse(DiscoveryRecord {
        location,
        usn,
        target,
        server,
        max_age,
        ext: true,
        date: Some(date),
        headers,
    }))
}

fn parse_headers<'a, I>(lines: I) -> HeaderMap
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HeaderMap::new();
    for line in lines {
        let line = line.trim();

        // Blank line ends the header block; a body, if any, is ignored.
        if line.is_empty() {
            break;
        }

        // Split on the first ':' only, values may contain ':'. A header
        // with an empty value is legal (EXT).
        if let Some(colon) = line.find(':') {
            let (name, value) = line.split_at(colon);
            headers.insert(name, &value[1..]);
        } else {
            trace!("skipping header line without colon: '{}'", line);
        }
    }
    headers
}

/// Discovery records promise a syntactically valid absolute HTTP URL.
fn valid_location(location: &str) -> bool {
    match url::Url::parse(location) {
        Ok(url) => matches!(url.scheme(), "http" | "https"),
        Err(_) => false,
    }
}

/// `max-age=<seconds>` out of a `CACHE-CONTROL` value, tolerating spacing
/// and extra directives.
fn parse_max_age(value: &str) -> Option<u32> {
    let lower = value.to_ascii_lowercase();
    let idx = lower.find("max-age")?;
    let after = value[idx + "max-age".len()..]
        .trim_start()
        .trim_start_matches('=')
        .trim_start();
    let digits: String = after.chars().take_while(|c| c.is_ascii_digit()).collect();
    digits.parse().ok()
}

fn append_extensions(msg: &mut String, headers: &HeaderMap, known: &[&str]) {
    for (name, value) in headers.iter() {
        if !known.contains(&name) {
            msg.push_str(name);
            msg.push_str(": ");
            msg.push_str(value);
            msg.push_str("\r\n");
        }
    }
}

fn rfc1123_now() -> String {
    chrono::Utc::now()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}
