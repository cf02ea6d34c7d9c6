//! Interrupt callback support.
//!
//! FFmpeg polls `AVFormatContext::interrupt_callback` while it blocks in
//! network I/O. Returning non-zero from the callback aborts the current
//! operation with `AVERROR_EXIT`. [`InterruptFlag`] is the shared state behind
//! that callback, and [`Watchdog`] raises it after a delay from a background
//! thread.
//!
//! Where the callback is installed matters:
//!
//! - Installed after the input is opened, it is only seen by code that polls
//!   the format context directly (the RTSP demuxer's receive loop does).
//!   Protocol handles opened earlier keep the callback they were created
//!   with. It cannot help when the network is down before connecting,
//!   because opening never returns in that case. Some cameras also stop
//!   triggering the callback once the connection is lost, so it is not a
//!   reliable mid-stream guard either.
//! - Installed before `avformat_open_input` (see
//!   [`GrabberOptions::with_interrupt_before_open`](crate::GrabberOptions::with_interrupt_before_open)),
//!   it can also abort the connect phase.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use rtsp_timeout_probe::{InterruptFlag, Watchdog};
//!
//! let flag = InterruptFlag::new();
//! let watchdog = Watchdog::arm(flag.clone(), Duration::from_millis(10));
//! watchdog.join();
//! assert!(flag.is_raised());
//! ```

use std::{
    ffi::c_void,
    os::raw::c_int,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
        mpsc::{self, RecvTimeoutError, Sender},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use ffmpeg_next::format::context::Input;
use ffmpeg_sys_next::AVIOInterruptCB;

#[derive(Debug, Default)]
struct InterruptState {
    raised: AtomicBool,
    polls: AtomicU64,
}

/// Shared flag consulted by FFmpeg's interrupt callback.
///
/// Clones share the same state. Raising the flag from any thread makes the
/// next poll abort the blocked FFmpeg call.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    state: Arc<InterruptState>,
}

impl InterruptFlag {
    /// Create a lowered flag.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask FFmpeg to abort at its next poll.
    pub fn raise(&self) {
        self.state.raised.store(true, Ordering::Release);
    }

    /// Whether the flag has been raised.
    pub fn is_raised(&self) -> bool {
        self.state.raised.load(Ordering::Acquire)
    }

    /// How many times FFmpeg has polled the callback so far.
    pub fn polls(&self) -> u64 {
        self.state.polls.load(Ordering::Relaxed)
    }

    /// Build the raw callback struct pointing at this flag's state.
    ///
    /// The returned value borrows the state through a raw pointer: the
    /// caller must keep a clone of this flag alive for as long as FFmpeg may
    /// call it.
    pub(crate) fn callback(&self) -> AVIOInterruptCB {
        AVIOInterruptCB {
            callback: Some(interrupt_callback),
            opaque: Arc::as_ptr(&self.state) as *mut c_void,
        }
    }
}

/// Install `flag` as the interrupt callback of an already-opened input.
///
/// The caller must keep a clone of `flag` alive until `input` is dropped.
pub(crate) fn install(input: &mut Input, flag: &InterruptFlag) {
    // SAFETY: `as_mut_ptr` yields the live format context owned by `input`.
    // The opaque pointer stays valid while the caller holds a flag clone.
    unsafe {
        (*input.as_mut_ptr()).interrupt_callback = flag.callback();
    }
}

/// 0 continues the blocked operation, 1 aborts it.
unsafe extern "C" fn interrupt_callback(opaque: *mut c_void) -> c_int {
    if opaque.is_null() {
        return 0;
    }

    // SAFETY: `opaque` was produced by `InterruptFlag::callback` from an
    // `Arc<InterruptState>` that outlives the format context.
    let state = unsafe { &*(opaque as *const InterruptState) };
    state.polls.fetch_add(1, Ordering::Relaxed);

    let interrupt_flag = c_int::from(state.raised.load(Ordering::Acquire));
    log::trace!("callback, interrupt flag == {interrupt_flag}");
    interrupt_flag
}

/// Background timer that raises an [`InterruptFlag`] after a delay.
///
/// Dropping the watchdog (or calling [`disarm`](Watchdog::disarm)) before the
/// delay elapses stops the timer without raising the flag.
#[derive(Debug)]
pub struct Watchdog {
    disarm: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    /// Spawn the timer thread.
    ///
    /// A zero `delay` raises the flag before returning.
    pub fn arm(flag: InterruptFlag, delay: Duration) -> Self {
        if delay.is_zero() {
            flag.raise();
            log::info!("interrupt flag was changed");
            return Self {
                disarm: None,
                handle: None,
            };
        }

        let (disarm, disarmed) = mpsc::channel::<()>();

        let handle = thread::Builder::new()
            .name("interrupt-watchdog".to_string())
            .spawn(move || match disarmed.recv_timeout(delay) {
                Err(RecvTimeoutError::Timeout) => {
                    flag.raise();
                    log::info!("interrupt flag was changed");
                }
                Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("watchdog disarmed before {delay:?} elapsed");
                }
            });

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(error) => {
                log::warn!("exception in interruption thread: {error}");
                None
            }
        };

        Self {
            disarm: Some(disarm),
            handle,
        }
    }

    /// Stop the timer without raising the flag, if it has not fired yet.
    pub fn disarm(mut self) {
        self.stop();
    }

    /// Wait for the timer to fire.
    pub fn join(mut self) {
        self.wait();
    }

    fn stop(&mut self) {
        if let Some(disarm) = self.disarm.take() {
            let _ = disarm.send(());
        }
        self.wait();
    }

    fn wait(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            log::warn!("interruption thread panicked");
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll(flag: &InterruptFlag) -> c_int {
        let callback = flag.callback();
        let function = callback.callback.expect("callback is set");
        unsafe { function(callback.opaque) }
    }

    #[test]
    fn callback_continues_while_lowered() {
        let flag = InterruptFlag::new();
        assert_eq!(poll(&flag), 0);
        assert_eq!(flag.polls(), 1);
    }

    #[test]
    fn callback_aborts_once_raised() {
        let flag = InterruptFlag::new();
        assert_eq!(poll(&flag), 0);
        flag.clone().raise();
        assert_eq!(poll(&flag), 1);
        assert_eq!(flag.polls(), 2);
    }

    #[test]
    fn watchdog_thread_panic_is_contained() {
        let handle = thread::spawn(|| panic!("watchdog failure"));
        let watchdog = Watchdog {
            disarm: None,
            handle: Some(handle),
        };
        watchdog.join();
    }

    #[test]
    fn callback_ignores_null_opaque() {
        assert_eq!(unsafe { interrupt_callback(std::ptr::null_mut()) }, 0);
    }
}
