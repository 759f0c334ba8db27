use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use log::{debug, warn};

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_signal: libc::c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

/// Route SIGINT into the process-wide interrupt flag instead of terminating.
pub fn install_interrupt_handler() {
    let handler = on_interrupt as extern "C" fn(libc::c_int);
    let previous = unsafe { libc::signal(libc::SIGINT, handler as libc::sighandler_t) };
    if previous == libc::SIG_ERR {
        warn!("Failed to install SIGINT handler, Ctrl-C will terminate immediately.");
    } else {
        debug!("SIGINT handler installed.");
    }
}

/// Cooperative cancellation flag checked between steps and while waiting on
/// subprocesses.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    follows_signal: bool,
}

impl CancelToken {
    /// A token that also fires once SIGINT was received.
    pub fn from_interrupt() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            follows_signal: true,
        }
    }

    #[cfg(test)]
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || (self.follows_signal && INTERRUPTED.load(Ordering::SeqCst))
    }
}
