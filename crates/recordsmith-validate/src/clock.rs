use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Millisecond time source polled by [`Deadline`].
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Monotonic wall clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Clock that advances a fixed step on every read.
#[derive(Debug)]
pub struct SteppingClock {
    now: AtomicU64,
    step_ms: u64,
}

impl SteppingClock {
    pub fn new(step_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(0),
            step_ms,
        }
    }
}

impl Clock for SteppingClock {
    fn now_ms(&self) -> u64 {
        self.now.fetch_add(self.step_ms, Ordering::Relaxed)
    }
}

/// Cooperative wall-clock budget; callers poll it between units of work.
#[derive(Clone)]
pub struct Deadline {
    clock: Arc<dyn Clock>,
    started_ms: u64,
    budget_ms: Option<u64>,
}

impl std::fmt::Debug for Deadline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deadline")
            .field("started_ms", &self.started_ms)
            .field("budget_ms", &self.budget_ms)
            .finish()
    }
}

impl Deadline {
    pub fn new(clock: Arc<dyn Clock>, budget: Option<Duration>) -> Self {
        let started_ms = clock.now_ms();
        Self {
            clock,
            started_ms,
            budget_ms: budget.map(|budget| budget.as_millis() as u64),
        }
    }

    /// Deadline on the system clock.
    pub fn after(budget: Option<Duration>) -> Self {
        Self::new(Arc::new(SystemClock::new()), budget)
    }

    pub fn unbounded() -> Self {
        Self::after(None)
    }

    pub fn budget_ms(&self) -> Option<u64> {
        self.budget_ms
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.clock.now_ms().saturating_sub(self.started_ms)
    }

    pub fn is_expired(&self) -> bool {
        match self.budget_ms {
            Some(budget) => self.elapsed_ms() >= budget,
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stepping_clock_expires_after_budget() {
        let deadline = Deadline::new(
            Arc::new(SteppingClock::new(1)),
            Some(Duration::from_millis(3)),
        );
        let mut polls = 0;
        while !deadline.is_expired() {
            polls += 1;
            assert!(polls < 10, "deadline never expired");
        }
        assert_eq!(polls, 2);
    }

    #[test]
    fn unbounded_never_expires() {
        assert!(!Deadline::unbounded().is_expired());
    }
}
