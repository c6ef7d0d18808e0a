//! The event multiplexer — a single poll loop over every input device.
//!
//! One dedicated thread blocks in `poll(2)` on all attached device
//! descriptors plus an eventfd. There is no polling interval: the thread
//! sleeps until a device is readable or the eventfd is written (by the
//! hot-plug watcher, or by shutdown). It is the only writer to the output
//! channel, so the consumer sees one ordered stream:
//!
//! ```text
//! evdev fds ─┐
//!            ├─ poll() ── drivers ── normalized events ──► mpsc ──► consumer
//! eventfd  ──┘              ▲
//!   ▲                       │
//!   └── hot-plug watcher ───┘ (attach/detach + DeviceAdded/Removed)
//! ```
//!
//! Ordering: events of one device preserve that device's raw order;
//! across devices the order is poll readiness, which is all the hardware
//! itself guarantees. On removal, a device's buffered events are drained
//! and delivered *before* its `DeviceRemoved`, so in-flight gestures are
//! never truncated.
//!
//! Keymap state is not shareable across threads, so drivers — including
//! those for the initially enumerated devices — are attached on the poll
//! thread itself. The configuration was already validated at startup.

use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::thread::{self, JoinHandle};

use evdev::Device;
use log::{debug, error, info, warn};

use crate::input::driver::{AttachedDevice, Driver};
use crate::input::event::{DeviceDescriptor, Event, EventKind};
use crate::input::hotplug::HotplugNotice;
use crate::input::keymap::{KeymapConfig, ResolvedKeymap};

// =============================================================================
// Waker
// =============================================================================

/// Eventfd used to interrupt the poll wait from other threads.
pub(crate) struct Waker {
    fd: RawFd,
}

impl Waker {
    pub fn new() -> std::io::Result<Self> {
        // SAFETY: plain eventfd creation; flags make it safe to poll/read
        // from the loop without blocking.
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd == -1 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(Self { fd })
    }

    /// Wake the poll loop. Callable from any thread, including a signal
    /// handler's.
    pub fn notify(&self) {
        let value: u64 = 1;
        // SAFETY: fd is a valid eventfd; writing 8 bytes is its protocol.
        unsafe {
            libc::write(self.fd, (&value as *const u64).cast(), size_of::<u64>());
        }
    }

    /// Consume pending wake counts so the fd stops reading as ready.
    fn drain(&self) {
        let mut value: u64 = 0;
        // SAFETY: reading 8 bytes resets the eventfd counter.
        unsafe {
            libc::read(self.fd, (&mut value as *mut u64).cast(), size_of::<u64>());
        }
    }
}

impl AsRawFd for Waker {
    fn as_raw_fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for Waker {
    fn drop(&mut self) {
        // SAFETY: fd is owned by this waker and closed exactly once.
        unsafe {
            libc::close(self.fd);
        }
    }
}

// =============================================================================
// Event stream (consumer side)
// =============================================================================

/// The multiplexer's output: an infinite, non-restartable event sequence.
///
/// Single consumer. `next` blocks until an event arrives; it returns
/// `None` only after backend shutdown, which ends the stream for good.
pub struct EventStream {
    rx: Receiver<Event>,
}

impl EventStream {
    pub(crate) fn new(rx: Receiver<Event>) -> Self {
        Self { rx }
    }

    /// Block until the next event. `None` means the backend shut down.
    pub fn next(&self) -> Option<Event> {
        self.rx.recv().ok()
    }

    /// Non-blocking variant; `None` when no event is pending.
    pub fn try_next(&self) -> Option<Event> {
        self.rx.try_recv().ok()
    }

    /// Block up to `timeout` for the next event.
    pub fn next_timeout(&self, timeout: std::time::Duration) -> Option<Event> {
        self.rx.recv_timeout(timeout).ok()
    }
}

// =============================================================================
// Poll loop
// =============================================================================

/// Handle to the poll thread.
pub(crate) struct InputPoller {
    handle: Option<JoinHandle<()>>,
    running: Arc<AtomicBool>,
    waker: Arc<Waker>,
}

impl InputPoller {
    /// Spawn the poll thread over the initially enumerated devices.
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        initial: Vec<(Device, DeviceDescriptor)>,
        keymap_config: KeymapConfig,
        surface_size: (u32, u32),
        hotplug_rx: Receiver<HotplugNotice>,
        tx: Sender<Event>,
        waker: Arc<Waker>,
        running: Arc<AtomicBool>,
    ) -> std::io::Result<Self> {
        let running_clone = running.clone();
        let waker_clone = waker.clone();
        let handle = thread::Builder::new()
            .name("fbstage-input".to_string())
            .spawn(move || {
                poll_loop(
                    initial,
                    keymap_config,
                    surface_size,
                    hotplug_rx,
                    tx,
                    waker_clone,
                    running_clone,
                );
            })?;
        Ok(Self {
            handle: Some(handle),
            running,
            waker,
        })
    }

    /// Unblock the loop and join the thread.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.waker.notify();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for InputPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

fn poll_loop(
    initial: Vec<(Device, DeviceDescriptor)>,
    keymap_config: KeymapConfig,
    surface_size: (u32, u32),
    hotplug_rx: Receiver<HotplugNotice>,
    tx: Sender<Event>,
    waker: Arc<Waker>,
    running: Arc<AtomicBool>,
) {
    // The configuration was validated during startup; a failure here
    // means the rule database disappeared since. Nothing sensible can
    // run without key resolution, so end the stream.
    let keymap = match ResolvedKeymap::resolve(&keymap_config) {
        Ok(keymap) => keymap,
        Err(e) => {
            error!("keymap resolution failed on poll thread: {e}");
            return;
        }
    };

    let mut out: Vec<Event> = Vec::new();
    let mut devices: Vec<AttachedDevice> = Vec::new();
    for (device, descriptor) in initial {
        attach(device, descriptor, surface_size, &keymap, &mut devices, &mut out);
    }
    for event in out.drain(..) {
        if tx.send(event).is_err() {
            return;
        }
    }

    while running.load(Ordering::SeqCst) {
        let mut fds: Vec<libc::pollfd> = devices
            .iter()
            .map(|d| libc::pollfd {
                fd: d.device.as_raw_fd(),
                events: libc::POLLIN,
                revents: 0,
            })
            .collect();
        fds.push(libc::pollfd {
            fd: waker.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });

        // SAFETY: fds is a live, correctly-sized pollfd array. Infinite
        // timeout: the loop only wakes on readiness or the eventfd.
        let ret = unsafe { libc::poll(fds.as_mut_ptr(), fds.len() as libc::nfds_t, -1) };
        if ret < 0 {
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::EINTR) {
                warn!("input poll failed: {err}");
            }
            continue;
        }

        // Wake handling first: on shutdown no further device reads happen.
        let woken = fds
            .last()
            .is_some_and(|last| last.revents & libc::POLLIN != 0);
        if woken {
            waker.drain();
            if !running.load(Ordering::SeqCst) {
                let _ = tx.send(Event::now(EventKind::ShutdownRequested));
                break;
            }
            let mut changed = false;
            while let Ok(notice) = hotplug_rx.try_recv() {
                match notice {
                    HotplugNotice::Added(device, descriptor) => {
                        attach(device, descriptor, surface_size, &keymap, &mut devices, &mut out);
                    }
                    HotplugNotice::Removed(path) => detach_by_path(&path, &mut devices, &mut out),
                }
                changed = true;
            }
            if changed {
                // The pollfd array no longer lines up with the device
                // list. Flush and re-poll; readiness is level-triggered,
                // so nothing is lost.
                for event in out.drain(..) {
                    if tx.send(event).is_err() {
                        return;
                    }
                }
                continue;
            }
        }

        // Device readiness, in poll order.
        let mut failed = Vec::new();
        for (index, dev) in devices.iter_mut().enumerate() {
            let revents = fds[index].revents;
            if revents & (libc::POLLIN | libc::POLLERR | libc::POLLHUP) == 0 {
                continue;
            }
            match dev.device.fetch_events() {
                Ok(iter) => {
                    let raw: Vec<_> = iter.collect();
                    dev.driver.process(&raw, &mut out);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
                Err(e) => {
                    // Typically the device vanished without a clean
                    // notification. Recover locally; never crash.
                    warn!("read from {:?} failed, detaching: {e}", dev.descriptor.name);
                    failed.push(index);
                }
            }
        }
        for index in failed.into_iter().rev() {
            let dev = devices.remove(index);
            out.push(Event::now(EventKind::DeviceRemoved(dev.descriptor.id)));
        }

        for event in out.drain(..) {
            if tx.send(event).is_err() {
                return; // consumer is gone
            }
        }
    }
    info!("input poll loop stopped");
}

/// Attach a driver and announce the device.
///
/// De-duplicates on stable identity, not path: a device re-enumerated at
/// a new node after a hot-plug cycle is the same device.
fn attach(
    mut device: Device,
    descriptor: DeviceDescriptor,
    surface_size: (u32, u32),
    keymap: &ResolvedKeymap,
    devices: &mut Vec<AttachedDevice>,
    out: &mut Vec<Event>,
) {
    if devices.iter().any(|d| d.descriptor.id == descriptor.id) {
        debug!("duplicate device {:?}, ignoring", descriptor.name);
        return;
    }
    let driver = Driver::attach(&mut device, &descriptor, surface_size, keymap);
    out.push(Event::now(EventKind::DeviceAdded(descriptor.clone())));
    devices.push(AttachedDevice {
        device,
        descriptor,
        driver,
    });
}

/// Detach after a clean hot-plug removal notice.
///
/// The device gets a final non-blocking drain so everything it produced
/// is delivered ahead of its `DeviceRemoved`.
fn detach_by_path(path: &std::path::Path, devices: &mut Vec<AttachedDevice>, out: &mut Vec<Event>) {
    let Some(index) = devices.iter().position(|d| d.descriptor.path == path) else {
        return;
    };
    let mut dev = devices.remove(index);
    if let Ok(iter) = dev.device.fetch_events() {
        let raw: Vec<_> = iter.collect();
        dev.driver.process(&raw, out);
    }
    out.push(Event::now(EventKind::DeviceRemoved(dev.descriptor.id)));
    info!("detached {:?}", dev.descriptor.name);
}
