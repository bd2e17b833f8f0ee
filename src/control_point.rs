//! The control-point facade.
//!
//! One search pass seeds a UDN-keyed device registry; after that, NOTIFY
//! traffic keeps it current: fresh alive announcements queue a
//! description fetch on a small worker pool, byebye removes the device.
//! External readers get cloned snapshots; only facade-owned threads touch
//! the registry.

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, Sender};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ControlPointConfig};
use crate::description::{DescriptionError, Device, ServiceStatus};
use crate::ssdp::{self, DiscoveryRecord, SearchTarget, SsdpListener};

const FETCH_WORKERS: usize = 3;
const FETCH_QUEUE: usize = 10;

#[derive(Debug, Error)]
pub enum ControlPointError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("SSDP I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("device build failed for {location}: {source}")]
    Description {
        location: String,
        #[source]
        source: DescriptionError,
    },
    #[error("{location}: service {service_type} is unusable: {reason}")]
    ServiceFailed {
        location: String,
        service_type: String,
        reason: String,
    },
}

/// `uuid:device::urn:...` → `uuid:device`. USNs are matched
/// case-insensitively on the wire, so the result is lower-cased.
pub fn extract_udn(usn: &str) -> Option<String> {
    let lower = usn.trim().to_ascii_lowercase();
    let idx = lower.find("uuid:")?;
    let sub = &lower[idx..];
    match sub.find("::") {
        Some(end) => Some(sub[..end].to_string()),
        None => Some(sub.to_string()),
    }
}

struct UdnSeen {
    max_age: u64,
    last_seen: Instant,
}

/// Tracks when each UDN was last refreshed, so the torrent of repeated
/// alive announcements does not refetch a description before half its
/// advertised max-age has elapsed.
#[derive(Default)]
struct UdnTracker {
    seen: HashMap<String, UdnSeen>,
}

impl UdnTracker {
    /// First sighting, or more than half the max-age since the last one.
    fn should_fetch(&mut self, udn: &str, max_age: u64) -> bool {
        let now = Instant::now();
        if let Some(seen) = self.seen.get_mut(udn) {
            if now.duration_since(seen.last_seen).as_secs() > seen.max_age / 2 {
                seen.last_seen = now;
                seen.max_age = max_age;
                true
            } else {
                false
            }
        } else {
            self.seen.insert(
                udn.to_string(),
                UdnSeen {
                    max_age,
                    last_seen: now,
                },
            );
            true
        }
    }

    fn forget(&mut self, udn: &str) {
        self.seen.remove(udn);
    }
}

struct FetchTask {
    udn: String,
    record: DiscoveryRecord,
}

pub struct ControlPoint {
    config: ControlPointConfig,
    devices: Arc<RwLock<HashMap<String, Device>>>,
    tracker: Arc<Mutex<UdnTracker>>,
    listener: Option<SsdpListener>,
    stop: Arc<AtomicBool>,
    fetch_tx: Option<Sender<FetchTask>>,
    threads: Vec<JoinHandle<()>>,
}

impl ControlPoint {
    pub fn new(config: ControlPointConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            devices: Arc::new(RwLock::new(HashMap::new())),
            tracker: Arc::new(Mutex::new(UdnTracker::default())),
            listener: None,
            stop: Arc::new(AtomicBool::new(false)),
            fetch_tx: None,
            threads: Vec::new(),
        })
    }

    /// One discovery pass: multicast search, plus the broadcast pass when
    /// configured, deduplicated across both by USN.
    pub fn search(&self, target: &SearchTarget) -> Result<Vec<DiscoveryRecord>, ControlPointError> {
        let opts = self.config.search_options();
        let mut records = ssdp::search(target, &opts)?;
        if self.config.do_broadcast_search {
            let mut seen: HashSet<String> = records.iter().map(|r| r.usn.clone()).collect();
            for record in ssdp::broadcast_search(target, &opts)? {
                if seen.insert(record.usn.clone()) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    /// Searches, builds the device tree for every responder, then keeps
    /// the registry current from NOTIFY traffic until [`stop`](Self::stop).
    ///
    /// With `raise_on_remote_error`, the first DDF or SCPD failure during
    /// the initial pass aborts the start; otherwise the offending device
    /// is logged and skipped.
    pub fn start(&mut self, target: &SearchTarget) -> Result<(), ControlPointError> {
        for record in self.search(target)? {
            let Some(udn) = extract_udn(&record.usn) else {
                debug!("discovery record without a uuid USN: {}", record.usn);
                continue;
            };
            self.tracker
                .lock()
                .unwrap()
                .should_fetch(&udn, record.max_age as u64);
            match Device::from_discovery(&record) {
                Ok(device) => {
                    if self.config.raise_on_remote_error {
                        let failed = device.all_services().into_iter().find_map(|s| match &s.status {
                            ServiceStatus::Failed(reason) => {
                                Some((s.service_type.clone(), reason.clone()))
                            }
                            _ => None,
                        });
                        if let Some((service_type, reason)) = failed {
                            return Err(ControlPointError::ServiceFailed {
                                location: record.location.clone(),
                                service_type,
                                reason,
                            });
                        }
                    }
                    info!("✅ device online: {} ({})", device.friendly_name, udn);
                    self.devices.write().unwrap().insert(udn, device);
                }
                Err(e) => {
                    if self.config.raise_on_remote_error {
                        return Err(ControlPointError::Description {
                            location: record.location.clone(),
                            source: e,
                        });
                    }
                    warn!("❌ skipping {}: {}", record.location, e);
                }
            }
        }

        let listener = SsdpListener::start(self.config.ttl)?;
        let alive_rx = listener.subscribe_alive();
        let byebye_rx = listener.subscribe_byebye();
        self.listener = Some(listener);

        // Description builds run off the event thread on a small pool fed
        // through a bounded queue; a full queue drops the task and the
        // next announcement retries.
        let (fetch_tx, fetch_rx) = bounded::<FetchTask>(FETCH_QUEUE);
        for _ in 0..FETCH_WORKERS {
            let fetch_rx = fetch_rx.clone();
            let devices = Arc::clone(&self.devices);
            self.threads.push(std::thread::spawn(move || {
                while let Ok(task) = fetch_rx.recv() {
                    match Device::from_discovery(&task.record) {
                        Ok(device) => {
                            info!("✅ device online: {} ({})", device.friendly_name, task.udn);
                            devices.write().unwrap().insert(task.udn, device);
                        }
                        Err(e) => {
                            warn!("❌ device build failed for {}: {}", task.record.location, e);
                        }
                    }
                }
            }));
        }
        self.fetch_tx = Some(fetch_tx.clone());

        let stop = Arc::clone(&self.stop);
        let devices = Arc::clone(&self.devices);
        let tracker = Arc::clone(&self.tracker);
        self.threads.push(std::thread::spawn(move || {
            while !stop.load(Ordering::Relaxed) {
                select! {
                    recv(alive_rx) -> msg => {
                        let Ok(record) = msg else { break };
                        let Some(udn) = extract_udn(&record.usn) else { continue };
                        if tracker.lock().unwrap().should_fetch(&udn, record.max_age as u64) {
                            let _ = fetch_tx.try_send(FetchTask { udn, record });
                        }
                    }
                    recv(byebye_rx) -> msg => {
                        let Ok(byebye) = msg else { break };
                        let Some(udn) = extract_udn(&byebye.usn) else { continue };
                        tracker.lock().unwrap().forget(&udn);
                        if devices.write().unwrap().remove(&udn).is_some() {
                            info!("👋 device offline: {}", udn);
                        }
                    }
                    default(Duration::from_millis(250)) => {}
                }
            }
        }));

        info!(
            "✅ control point started: {} device(s) known",
            self.devices.read().unwrap().len()
        );
        Ok(())
    }

    /// Cloned snapshot of every known device.
    pub fn devices(&self) -> Vec<Device> {
        self.devices.read().unwrap().values().cloned().collect()
    }

    /// Snapshot of one device by UDN (`uuid:…`, case-insensitive).
    pub fn device(&self, udn: &str) -> Option<Device> {
        self.devices
            .read()
            .unwrap()
            .get(&udn.to_ascii_lowercase())
            .cloned()
    }

    /// Datagrams the listener discarded as undecodable, if it is running.
    pub fn malformed_count(&self) -> u64 {
        self.listener.as_ref().map_or(0, |l| l.malformed_count())
    }

    /// Stops the listener, the event thread and the fetch workers.
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        self.fetch_tx = None;
        if let Some(listener) = self.listener.take() {
            listener.stop();
        }
        for handle in self.threads.drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for ControlPoint {
    fn drop(&mut self) {
        self.stop();
    }
}
