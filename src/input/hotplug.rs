//! Hot-plug watcher — device node add/remove notifications.
//!
//! A dedicated thread diffs the `/dev/input` event nodes on an interval
//! and pushes notices over a channel; the poll loop is woken through its
//! eventfd so notices are picked up immediately. New devices pass the same
//! filter policy as initial enumeration, so a filtered device never gets a
//! driver attached.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use evdev::Device;
use log::{info, warn};

use crate::input::event::DeviceDescriptor;
use crate::input::poller::Waker;
use crate::input::registry::{self, FilterPolicy};

/// Interval between device node scans.
const RESCAN_INTERVAL: Duration = Duration::from_secs(2);
/// Sleep quantum, so shutdown is not delayed by a full interval.
const SLEEP_STEP: Duration = Duration::from_millis(250);

/// Notification pushed to the poll loop.
pub(crate) enum HotplugNotice {
    /// A new node passed the filter; the device is already open and
    /// non-blocking.
    Added(Device, DeviceDescriptor),
    /// A previously seen node disappeared.
    Removed(PathBuf),
}

/// Handle to the watcher thread.
pub(crate) struct HotplugWatcher {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
}

impl HotplugWatcher {
    /// Spawn the watcher.
    ///
    /// `known` seeds the node set with the paths already attached by
    /// initial enumeration, so they are not re-announced.
    pub fn spawn(
        filter: FilterPolicy,
        known: HashSet<PathBuf>,
        tx: Sender<HotplugNotice>,
        waker: Arc<Waker>,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let running_clone = running.clone();
        let handle = thread::Builder::new()
            .name("fbstage-hotplug".to_string())
            .spawn(move || watch_loop(filter, known, tx, waker, running_clone))?;
        Ok(Self {
            handle: Some(handle),
            running,
        })
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for HotplugWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn watch_loop(
    filter: FilterPolicy,
    mut known: HashSet<PathBuf>,
    tx: Sender<HotplugNotice>,
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
) {
    while running.load(Ordering::SeqCst) {
        let current = registry::scan_event_nodes();
        let mut notified = false;

        let added: Vec<PathBuf> = current.difference(&known).cloned().collect();
        for path in &added {
            match registry::probe(path, &filter) {
                Ok(Some((device, descriptor))) => {
                    info!("hot-plug: {} at {}", descriptor.name, path.display());
                    if tx.send(HotplugNotice::Added(device, descriptor)).is_err() {
                        return; // poll loop gone
                    }
                    notified = true;
                    known.insert(path.clone());
                }
                Ok(None) => {
                    // Filtered or unrecognized; remember it so we don't
                    // re-probe every interval.
                    known.insert(path.clone());
                }
                Err(e) => {
                    // Probe can race the node's creation; retry next scan.
                    warn!("hot-plug probe of {} failed: {e}", path.display());
                }
            }
        }

        for path in known.difference(&current).cloned().collect::<Vec<_>>() {
            info!("hot-plug: {} removed", path.display());
            if tx.send(HotplugNotice::Removed(path.clone())).is_err() {
                return;
            }
            notified = true;
            known.remove(&path);
        }

        if notified {
            waker.notify();
        }

        let mut slept = Duration::ZERO;
        while slept < RESCAN_INTERVAL {
            if !running.load(Ordering::SeqCst) {
                return;
            }
            thread::sleep(SLEEP_STEP);
            slept += SLEEP_STEP;
        }
    }
}
