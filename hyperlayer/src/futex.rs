//! Minimal futex wait/wake, reachable from the `futex` syscall even though
//! the memory manager that owns the backing pages is out of scope here.
//!
//! This is deliberately not a faithful futex: no priority inheritance, no
//! requeue, no bitset variants. It exists so `FUTEX_WAIT`/`FUTEX_WAKE` on a
//! single word behave correctly for the common mutex/condvar patterns a
//! guest's libc builds on top of them.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

#[derive(Default)]
struct WaitQueue {
    condvar: Condvar,
    waiting: Mutex<u32>,
}

/// Keyed by guest linear address of the futex word.
#[derive(Default)]
pub struct FutexTable {
    queues: Mutex<HashMap<u64, Arc<WaitQueue>>>,
}

impl FutexTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, addr: u64) -> Arc<WaitQueue> {
        self.queues
            .lock()
            .expect("futex table lock poisoned")
            .entry(addr)
            .or_insert_with(|| Arc::new(WaitQueue::default()))
            .clone()
    }

    /// Block the calling thread while `current_value() == expected`, the
    /// way `FUTEX_WAIT` does. No timeout support — timeouts are host-side
    /// only per the concurrency model; callers that need one re-check
    /// `expected` themselves on a polling cadence around this call.
    pub fn wait(&self, addr: u64, current_value: impl Fn() -> u32, expected: u32) {
        let queue = self.queue(addr);
        let mut guard = queue.waiting.lock().expect("futex waiters lock poisoned");
        if current_value() != expected {
            return;
        }
        *guard += 1;
        while current_value() == expected {
            let (g, _timed_out) = queue
                .condvar
                .wait_timeout(guard, std::time::Duration::from_millis(50))
                .expect("condvar wait failed");
            guard = g;
        }
        *guard -= 1;
    }

    /// Wake up to `n` waiters on `addr`.
    pub fn wake(&self, addr: u64, n: u32) -> u32 {
        let queue = self.queue(addr);
        let guard = queue.waiting.lock().expect("futex waiters lock poisoned");
        let woken = (*guard).min(n);
        for _ in 0..woken {
            queue.condvar.notify_one();
        }
        woken
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn wake_releases_a_waiter() {
        let table = Arc::new(FutexTable::new());
        let word = Arc::new(AtomicU32::new(0));

        let t_table = table.clone();
        let t_word = word.clone();
        let handle = std::thread::spawn(move || {
            t_table.wait(0x1000, || t_word.load(Ordering::SeqCst), 0);
        });

        // Give the waiter a moment to register, then flip the word and wake it.
        std::thread::sleep(std::time::Duration::from_millis(20));
        word.store(1, Ordering::SeqCst);
        table.wake(0x1000, 1);

        handle.join().expect("waiter thread panicked");
    }
}
