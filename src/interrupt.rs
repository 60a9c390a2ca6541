//! Ctrl-C routing for the console driver
//!
//! A single listener task owns the process SIGINT handler for the whole run.
//! While a round is running, Ctrl-C stops it: the in-flight turn is cancelled
//! and the inter-turn pause is cut short. At the prompt, Ctrl-C exits.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Exit status used when Ctrl-C arrives outside a round
pub const INTERRUPT_EXIT_CODE: i32 = 130;

/// What a Ctrl-C meant when it arrived
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// A round was running; its subscribers were notified
    StopRound,
    /// Nothing was running; the process should exit
    Exit,
}

/// Shared Ctrl-C state
#[derive(Debug)]
pub struct Interrupts {
    tx: watch::Sender<u64>,
    round_active: AtomicBool,
}

impl Interrupts {
    /// Create the shared state; call [`Interrupts::listen`] to attach it to SIGINT
    pub fn new() -> Arc<Self> {
        let (tx, _) = watch::channel(0);
        Arc::new(Self {
            tx,
            round_active: AtomicBool::new(false),
        })
    }

    /// Spawn the task that receives every Ctrl-C for the rest of the process.
    ///
    /// Outside a round the task exits the process with [`INTERRUPT_EXIT_CODE`].
    pub fn listen(self: &Arc<Self>) -> JoinHandle<()> {
        let interrupts = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                    return;
                }
                if interrupts.raise() == Interrupt::Exit {
                    eprintln!();
                    std::process::exit(INTERRUPT_EXIT_CODE);
                }
            }
        })
    }

    /// Route one Ctrl-C
    pub fn raise(&self) -> Interrupt {
        if self.round_active.load(Ordering::SeqCst) {
            self.tx.send_modify(|count| *count += 1);
            debug!("interrupt stops the running round");
            Interrupt::StopRound
        } else {
            Interrupt::Exit
        }
    }

    /// Mark a round as running until the guard drops.
    ///
    /// The returned receiver only reports interrupts raised after this call.
    pub fn enter_round(&self) -> RoundGuard<'_> {
        let rx = self.tx.subscribe();
        self.round_active.store(true, Ordering::SeqCst);
        RoundGuard {
            interrupts: self,
            rx,
        }
    }

    /// Whether a round is currently running
    pub fn round_active(&self) -> bool {
        self.round_active.load(Ordering::SeqCst)
    }
}

/// A running round; dropping it returns Ctrl-C to exit mode
#[derive(Debug)]
pub struct RoundGuard<'a> {
    interrupts: &'a Interrupts,
    rx: watch::Receiver<u64>,
}

impl RoundGuard<'_> {
    /// Resolve once Ctrl-C stops this round.
    ///
    /// Interrupts raised while nobody was awaiting are still reported, so a
    /// Ctrl-C that lands between two turns stops the next wait immediately.
    pub async fn stopped(&mut self) {
        if self.rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

impl Drop for RoundGuard<'_> {
    fn drop(&mut self) {
        self.interrupts.round_active.store(false, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_interrupt_at_prompt_exits() {
        let interrupts = Interrupts::new();
        assert_eq!(interrupts.raise(), Interrupt::Exit);
    }

    #[tokio::test]
    async fn test_interrupt_stops_running_round() {
        let interrupts = Interrupts::new();
        let mut round = interrupts.enter_round();
        assert!(interrupts.round_active());

        let raiser = Arc::clone(&interrupts);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            assert_eq!(raiser.raise(), Interrupt::StopRound);
        });

        tokio::time::timeout(Duration::from_secs(2), round.stopped())
            .await
            .expect("round was not stopped");
    }

    #[tokio::test]
    async fn test_interrupt_between_turns_is_not_lost() {
        let interrupts = Interrupts::new();
        let mut round = interrupts.enter_round();

        // Nobody awaits `stopped` while this one arrives.
        assert_eq!(interrupts.raise(), Interrupt::StopRound);

        tokio::time::timeout(Duration::from_millis(100), round.stopped())
            .await
            .expect("interrupt raised between waits was dropped");
    }

    #[tokio::test]
    async fn test_finished_round_returns_to_exit_mode() {
        let interrupts = Interrupts::new();
        {
            let mut round = interrupts.enter_round();
            assert_eq!(interrupts.raise(), Interrupt::StopRound);
            round.stopped().await;
        }
        assert!(!interrupts.round_active());
        assert_eq!(interrupts.raise(), Interrupt::Exit);

        // An interrupt from a previous round does not stop the next one.
        let mut next = interrupts.enter_round();
        assert!(
            tokio::time::timeout(Duration::from_millis(50), next.stopped())
                .await
                .is_err()
        );
    }
}
