//! Countdown confirmation before destructive work.
//!
//! The operator gets a few seconds to abort with Ctrl-C (or SIGTERM). The
//! handlers only exist while the countdown runs; afterwards the previous
//! dispositions are back and a signal terminates the process as usual.

use crate::codes::PITR_INVALID_ARGS;
use crate::errors::{PitrError, PitrResult};
use nix::libc::c_int;
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::future::Future;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// How often the interrupt flag is looked at
const INTERRUPT_POLL: Duration = Duration::from_millis(50);

static INTERRUPTED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_interrupt(_: c_int) {
    INTERRUPTED.store(true, Ordering::SeqCst);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub ticks: u32,
    pub tick: Duration,
}

impl Default for Countdown {
    fn default() -> Self {
        Self {
            ticks: 5,
            tick: Duration::from_secs(1),
        }
    }
}

impl Countdown {
    pub fn new(ticks: u32, tick: Duration) -> Self {
        Self { ticks, tick }
    }

    /// Count down on `out`, failing with `<action> cancelled by user` if
    /// `interrupt` resolves first.
    pub async fn run<F>(&self, action: &str, interrupt: F, out: &mut dyn Write) -> PitrResult<()>
    where
        F: Future<Output = ()>,
    {
        if self.ticks == 0 {
            return Ok(());
        }
        tokio::pin!(interrupt);

        let _ = write!(out, "{} starts in {} seconds, press Ctrl-C to cancel: ", action, self.ticks);
        for remaining in (1..=self.ticks).rev() {
            let _ = write!(out, "{remaining}... ");
            let _ = out.flush();
            tokio::select! {
                biased;
                _ = &mut interrupt => {
                    let _ = writeln!(out);
                    warn!("{} cancelled by user", action);
                    return Err(PitrError::new(PITR_INVALID_ARGS, format!("{action} cancelled by user")));
                }
                _ = sleep(self.tick) => {}
            }
        }
        let _ = writeln!(out);
        Ok(())
    }
}

/// SIGINT/SIGTERM handlers that set a flag. Dropping the guard puts the
/// previous dispositions back.
pub struct InterruptGuard {
    saved: Vec<(Signal, SigAction)>,
}

impl InterruptGuard {
    pub fn install() -> nix::Result<Self> {
        INTERRUPTED.store(false, Ordering::SeqCst);
        let action = SigAction::new(SigHandler::Handler(on_interrupt), SaFlags::empty(), SigSet::empty());
        let mut guard = Self { saved: Vec::with_capacity(2) };
        for sig in [Signal::SIGINT, Signal::SIGTERM] {
            // SAFETY: the handler only stores to an atomic
            let previous = unsafe { sigaction(sig, &action) }?;
            guard.saved.push((sig, previous));
        }
        Ok(guard)
    }

    pub fn interrupted(&self) -> bool {
        INTERRUPTED.load(Ordering::SeqCst)
    }
}

impl Drop for InterruptGuard {
    fn drop(&mut self) {
        for (sig, previous) in self.saved.drain(..).rev() {
            // SAFETY: restores a disposition returned by sigaction
            if let Err(e) = unsafe { sigaction(sig, &previous) } {
                warn!("Cannot restore {} handling: {}", sig, e);
            }
        }
    }
}

/// Resolves on the first SIGINT or SIGTERM. The handlers are installed on
/// first poll and removed when the future is dropped.
pub async fn os_interrupt() {
    match InterruptGuard::install() {
        Ok(guard) => {
            while !guard.interrupted() {
                sleep(INTERRUPT_POLL).await;
            }
        }
        Err(e) => {
            warn!("Cannot listen for interrupts: {}", e);
            std::future::pending::<()>().await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nix::sys::signal::raise;

    fn current_disposition(sig: Signal) -> SigHandler {
        let probe = SigAction::new(SigHandler::SigDfl, SaFlags::empty(), SigSet::empty());
        let current = unsafe { sigaction(sig, &probe) }.unwrap();
        unsafe { sigaction(sig, &current) }.unwrap();
        current.handler()
    }

    #[tokio::test]
    async fn test_countdown_completes() {
        let countdown = Countdown::new(3, Duration::from_millis(1));
        let mut out = Vec::new();
        assert!(countdown.run("PITR", std::future::pending(), &mut out).await.is_ok());
        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("PITR starts in 3 seconds"));
        assert!(text.contains("3... 2... 1..."));
    }

    #[tokio::test]
    async fn test_interrupt_cancels() {
        let countdown = Countdown::new(5, Duration::from_secs(60));
        let err = countdown
            .run("PITR", std::future::ready(()), &mut std::io::sink())
            .await
            .unwrap_err();
        assert_eq!(err.code, PITR_INVALID_ARGS);
        assert_eq!(err.message, "PITR cancelled by user");
    }

    #[tokio::test]
    async fn test_late_interrupt_cancels() {
        let countdown = Countdown::new(5, Duration::from_millis(20));
        let interrupt = sleep(Duration::from_millis(30));
        assert!(countdown.run("PITR", interrupt, &mut std::io::sink()).await.is_err());
    }

    #[tokio::test]
    async fn test_zero_ticks_skip() {
        let countdown = Countdown::new(0, Duration::from_secs(60));
        let mut out = Vec::new();
        assert!(countdown.run("PITR", std::future::ready(()), &mut out).await.is_ok());
        assert!(out.is_empty());
    }

    // Both cases share the process-wide disposition, so they run in one test.
    #[tokio::test]
    async fn test_signal_handling_is_scoped_to_countdown() {
        let guard = InterruptGuard::install().unwrap();
        assert!(matches!(current_disposition(Signal::SIGTERM), SigHandler::Handler(_)));
        raise(Signal::SIGTERM).unwrap();
        assert!(guard.interrupted());
        drop(guard);
        assert_eq!(current_disposition(Signal::SIGTERM), SigHandler::SigDfl);
        assert_eq!(current_disposition(Signal::SIGINT), SigHandler::SigDfl);

        let countdown = Countdown::new(1, Duration::from_millis(10));
        countdown.run("PITR", os_interrupt(), &mut std::io::sink()).await.unwrap();
        assert_eq!(current_disposition(Signal::SIGTERM), SigHandler::SigDfl);
        assert_eq!(current_disposition(Signal::SIGINT), SigHandler::SigDfl);
    }
}
