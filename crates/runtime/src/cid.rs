//! Ambient context id carried by every task for log correlation.
//!
//! Modelled on the cooperative-coroutine contract in SPEC_FULL.md §4.1:
//! every task carries a `cid`; `set_id(new)` returns the previous value
//! so a caller can restore it once a nested scope (e.g. handling one
//! packet on behalf of another session) completes.

use std::cell::Cell;

tokio::task_local! {
    static CID: Cell<u64>;
}

pub struct Cid;

impl Cid {
    /// Run `fut` with a fresh cid scope. Every task spawned for a new
    /// session should be wrapped in exactly one top-level `scope` call.
    pub async fn scope<F: std::future::Future>(id: u64, fut: F) -> F::Output {
        CID.scope(Cell::new(id), fut).await
    }

    /// The cid of the innermost enclosing `scope`, or `0` if called
    /// outside of one.
    pub fn current() -> u64 {
        CID.try_with(|c| c.get()).unwrap_or(0)
    }

    /// Overwrite the current cid within the enclosing scope, returning
    /// the previous value so the caller can restore it later.
    pub fn set(new: u64) -> u64 {
        CID.try_with(|c| {
            let prev = c.get();
            c.set(new);
            prev
        })
        .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn defaults_to_zero_outside_scope() {
        assert_eq!(Cid::current(), 0);
    }

    #[tokio::test]
    async fn scope_sets_and_restores_on_exit() {
        Cid::scope(42, async {
            assert_eq!(Cid::current(), 42);
        })
        .await;
        assert_eq!(Cid::current(), 0);
    }

    #[tokio::test]
    async fn set_returns_previous_value() {
        Cid::scope(1, async {
            let prev = Cid::set(2);
            assert_eq!(prev, 1);
            assert_eq!(Cid::current(), 2);
            let prev2 = Cid::set(prev);
            assert_eq!(prev2, 2);
            assert_eq!(Cid::current(), 1);
        })
        .await;
    }
}
