//! Hot-swappable, ref-counted client façade (spec.md §4.E).
//!
//! A reload of the provider set must not interrupt in-flight requests and
//! must not leak a closed client to a new caller. The hot path is lock-free:
//! `Acquire` is an atomic load plus a CAS-retried increment, `release` is a
//! CAS-retried decrement that closes the underlying client exactly once
//! when it observes the `refs == 0 && closing` transition.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;

/// Closing a client generation is type-specific (HTTP clients usually just
/// need to drop their connection pool); implementors that need an explicit
/// shutdown step override `close`.
pub trait Closable: Send + Sync {
    fn close(&self) {}
}

const CLOSING_BIT: usize = 1 << (usize::BITS - 1);

struct ClientRef<C> {
    client: Arc<C>,
    /// Low bits: live ref count. High bit: closing flag. The tombstone state
    /// `CLOSING_BIT | 0` means this ref is dead and must never be returned
    /// by a new `Acquire`.
    state: AtomicUsize,
    closed: AtomicBool,
}

impl<C: Closable> ClientRef<C> {
    fn new(client: Arc<C>) -> Arc<Self> {
        Arc::new(Self {
            client,
            state: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        })
    }

    /// Try to take a reference. Returns `None` if this ref has already
    /// transitioned to the dead (`closing`, `refs == 0`) tombstone state —
    /// the caller must reload the current pointer and retry.
    fn try_acquire(self: &Arc<Self>) -> Option<ClientGuard<C>> {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur == CLOSING_BIT {
                return None;
            }
            let next = cur + 1;
            if self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(ClientGuard { ref_: Arc::clone(self) });
            }
        }
    }

    fn mark_closing(self: &Arc<Self>) {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            if cur & CLOSING_BIT != 0 {
                return;
            }
            let next = cur | CLOSING_BIT;
            if self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if next == CLOSING_BIT {
                    self.close_once();
                }
                return;
            }
        }
    }

    fn release(self: &Arc<Self>) {
        loop {
            let cur = self.state.load(Ordering::Acquire);
            let refs = cur & !CLOSING_BIT;
            debug_assert!(refs > 0, "release without a matching acquire");
            let next = cur - 1;
            if self
                .state
                .compare_exchange_weak(cur, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                if next == CLOSING_BIT {
                    self.close_once();
                }
                return;
            }
        }
    }

    fn close_once(&self) {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.client.close();
        }
    }
}

/// RAII handle returned by `Acquire`; dropping it runs the `release` step
/// described in spec.md §4.E automatically.
pub struct ClientGuard<C> {
    ref_: Arc<ClientRef<C>>,
}

impl<C> std::ops::Deref for ClientGuard<C> {
    type Target = C;

    fn deref(&self) -> &C {
        &self.ref_.client
    }
}

impl<C: Closable> Drop for ClientGuard<C> {
    fn drop(&mut self) {
        self.ref_.release();
    }
}

#[derive(Debug, thiserror::Error)]
#[error("client not initialized")]
pub struct NotInitialized;

/// Single atomic pointer to the current `ClientRef` generation.
pub struct HotSwapClient<C> {
    current: ArcSwap<Option<Arc<ClientRef<C>>>>,
}

impl<C: Closable> HotSwapClient<C> {
    pub fn new(client: C) -> Self {
        Self {
            current: ArcSwap::new(Arc::new(Some(ClientRef::new(Arc::new(client))))),
        }
    }

    pub fn empty() -> Self {
        Self {
            current: ArcSwap::new(Arc::new(None)),
        }
    }

    /// Atomically load the current ref and increment its ref-count. Retries
    /// against a fresh pointer load if it raced a `Swap`/`Close` that just
    /// tombstoned the ref it saw.
    pub fn acquire(&self) -> Result<ClientGuard<C>, NotInitialized> {
        loop {
            let slot = self.current.load_full();
            let Some(ref_) = slot.as_ref() else {
                return Err(NotInitialized);
            };
            if let Some(guard) = ref_.try_acquire() {
                return Ok(guard);
            }
            // Lost the race: this ref already tombstoned. A Swap/Close must
            // have installed a new slot (or cleared it); loop and reload.
        }
    }

    /// Install a new client generation. The previous generation is marked
    /// `closing` and closed immediately if it has no in-flight acquires.
    pub fn swap(&self, next: C) {
        let new_ref = ClientRef::new(Arc::new(next));
        let previous = self.current.swap(Arc::new(Some(new_ref)));
        if let Some(old) = previous.as_ref() {
            old.mark_closing();
        }
    }

    /// Mark the current generation closing with no replacement; closes
    /// immediately if idle.
    pub fn close(&self) {
        let previous = self.current.swap(Arc::new(None));
        if let Some(old) = previous.as_ref() {
            old.mark_closing();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingClient {
        id: u32,
        closes: Arc<AtomicU32>,
    }

    impl Closable for CountingClient {
        fn close(&self) {
            self.closes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn acquire_returns_current_generation() {
        let closes = Arc::new(AtomicU32::new(0));
        let client = HotSwapClient::new(CountingClient { id: 1, closes: Arc::clone(&closes) });
        let guard = client.acquire().unwrap();
        assert_eq!(guard.id, 1);
    }

    #[test]
    fn swap_closes_previous_generation_when_idle() {
        let closes = Arc::new(AtomicU32::new(0));
        let client = HotSwapClient::new(CountingClient { id: 1, closes: Arc::clone(&closes) });
        client.swap(CountingClient { id: 2, closes: Arc::clone(&closes) });
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        let guard = client.acquire().unwrap();
        assert_eq!(guard.id, 2);
    }

    #[test]
    fn swap_defers_close_until_in_flight_guard_drops() {
        let closes = Arc::new(AtomicU32::new(0));
        let client = HotSwapClient::new(CountingClient { id: 1, closes: Arc::clone(&closes) });
        let guard = client.acquire().unwrap();
        client.swap(CountingClient { id: 2, closes: Arc::clone(&closes) });
        assert_eq!(closes.load(Ordering::SeqCst), 0, "must not close while a guard is outstanding");
        drop(guard);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn close_with_no_client_leaves_acquire_erroring() {
        let client: HotSwapClient<CountingClient> = HotSwapClient::empty();
        assert!(client.acquire().is_err());
    }

    #[test]
    fn close_is_idempotent_even_under_repeated_calls() {
        let closes = Arc::new(AtomicU32::new(0));
        let client = HotSwapClient::new(CountingClient { id: 1, closes: Arc::clone(&closes) });
        client.close();
        client.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        assert!(client.acquire().is_err());
    }
}
