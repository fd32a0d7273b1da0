//! The "hourglass": a coarse, tick-driven dispatcher that calls
//! registered handlers at integer multiples of a base tick (default
//! 20ms). Handlers must be non-blocking or offload their own work (e.g.
//! by spawning a task) — the dispatcher calls them inline on its driver
//! loop.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

type Handler = Arc<dyn Fn() + Send + Sync>;

struct Registration {
    period_ticks: u32,
    handler: Handler,
}

/// Builder/owner of a set of periodic handlers. Call `register` for each
/// handler, then `spawn` once to start the driver task.
pub struct Hourglass {
    base_tick: Duration,
    registrations: Vec<Registration>,
}

impl Hourglass {
    pub fn new(base_tick: Duration) -> Self {
        Hourglass {
            base_tick,
            registrations: Vec::new(),
        }
    }

    /// Register a handler to run every `period_ticks` base ticks
    /// (`period_ticks = 1` means "every tick").
    pub fn register(&mut self, period_ticks: u32, handler: Handler) {
        assert!(period_ticks > 0, "period_ticks must be >= 1");
        self.registrations.push(Registration {
            period_ticks,
            handler,
        });
    }

    /// Start the driver loop on its own task. Dropping the returned
    /// handle does not stop the loop; abort it explicitly to stop.
    pub fn spawn(self) -> JoinHandle<()> {
        let base_tick = self.base_tick;
        let registrations = self.registrations;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(base_tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut tick: u64 = 0;
            loop {
                interval.tick().await;
                tick += 1;
                for reg in &registrations {
                    if tick % reg.period_ticks as u64 == 0 {
                        (reg.handler)();
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn fires_at_expected_multiples() {
        let fast = Arc::new(AtomicU32::new(0));
        let slow = Arc::new(AtomicU32::new(0));

        let mut hg = Hourglass::new(Duration::from_millis(20));
        {
            let fast = fast.clone();
            hg.register(1, Arc::new(move || {
                fast.fetch_add(1, Ordering::SeqCst);
            }));
        }
        {
            let slow = slow.clone();
            hg.register(5, Arc::new(move || {
                slow.fetch_add(1, Ordering::SeqCst);
            }));
        }
        let handle = hg.spawn();

        tokio::time::advance(Duration::from_millis(2000)).await;
        tokio::task::yield_now().await;

        // 2000ms / 20ms = 100 ticks; slow fires every 5th tick = 20 times.
        assert_eq!(fast.load(Ordering::SeqCst), 100);
        assert_eq!(slow.load(Ordering::SeqCst), 20);

        handle.abort();
    }
}
