//! Shutdown signal handling
//!
//! SIGTERM (systemd stop), SIGINT (Ctrl+C) and SIGHUP only set a flag;
//! the main loop checks it between polls.

use std::sync::atomic::{AtomicBool, Ordering};

static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

pub fn shutdown_requested() -> bool {
    SHUTDOWN_REQUESTED.load(Ordering::Relaxed)
}

/// Install the handlers (call once at startup)
pub fn setup_signal_handlers() {
    for signal in [libc::SIGTERM, libc::SIGINT, libc::SIGHUP] {
        // SAFETY: the handler only stores to an atomic, which is async-signal-safe
        unsafe {
            libc::signal(
                signal,
                shutdown_signal_handler as *const () as libc::sighandler_t,
            );
        }
    }
}

extern "C" fn shutdown_signal_handler(_signo: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::Relaxed);
}
