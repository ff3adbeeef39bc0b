//! Fixed-capacity gate on simultaneous upstream calls.
//!
//! Backed by tokio's semaphore, which queues waiters in arrival order. A slot is
//! held by an [`UpstreamPermit`] and returned when the permit is dropped, so every
//! exit path of the holder (success, error, timeout, panic, cancellation) releases it.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("upstream limiter is closed")]
pub struct LimiterClosed;

#[derive(Debug, Clone)]
pub struct UpstreamLimiter {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// One occupied upstream slot.
#[derive(Debug)]
pub struct UpstreamPermit {
    _permit: OwnedSemaphorePermit,
}

impl UpstreamLimiter {
    /// A capacity of zero would deadlock every caller, so it is raised to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        }
    }

    /// Wait for a free slot. Fails only after [`close`](Self::close).
    pub async fn acquire(&self) -> Result<UpstreamPermit, LimiterClosed> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| LimiterClosed)?;
        Ok(UpstreamPermit { _permit: permit })
    }

    /// Reject current and future waiters. Permits already handed out stay valid.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held by running upstream calls.
    pub fn in_use(&self) -> usize {
        self.capacity.saturating_sub(self.available())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn zero_capacity_is_raised_to_one() {
        let limiter = UpstreamLimiter::new(0);
        assert_eq!(limiter.capacity(), 1);
        let _permit = limiter.acquire().await.unwrap();
        assert_eq!(limiter.available(), 0);
    }

    #[tokio::test]
    async fn drop_releases_slot() {
        let limiter = UpstreamLimiter::new(2);
        let a = limiter.acquire().await.unwrap();
        let b = limiter.acquire().await.unwrap();
        assert_eq!(limiter.in_use(), 2);
        drop(a);
        assert_eq!(limiter.in_use(), 1);
        drop(b);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn slot_released_when_holder_errors() {
        let limiter = UpstreamLimiter::new(1);

        async fn failing(limiter: &UpstreamLimiter) -> Result<(), &'static str> {
            let _permit = limiter.acquire().await.map_err(|_| "closed")?;
            Err("provider exploded")
        }

        assert!(failing(&limiter).await.is_err());
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn slot_released_on_timeout() {
        let limiter = UpstreamLimiter::new(1);
        let result = tokio::time::timeout(Duration::from_millis(10), async {
            let _permit = limiter.acquire().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        })
        .await;
        assert!(result.is_err());
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn waiters_are_served_in_arrival_order() {
        let limiter = UpstreamLimiter::new(1);
        let held = limiter.acquire().await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        for id in 0..5 {
            let limiter = limiter.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let _permit = limiter.acquire().await.unwrap();
                tx.send(id).unwrap();
            });
            // Let each task enqueue before spawning the next.
            tokio::task::yield_now().await;
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        drop(tx);
        drop(held);

        let mut order = Vec::new();
        while let Some(id) = rx.recv().await {
            order.push(id);
        }
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn close_rejects_waiters() {
        let limiter = UpstreamLimiter::new(1);
        let _held = limiter.acquire().await.unwrap();
        let waiter = {
            let limiter = limiter.clone();
            tokio::spawn(async move { limiter.acquire().await.map(|_| ()) })
        };
        tokio::time::sleep(Duration::from_millis(5)).await;
        limiter.close();
        assert_eq!(waiter.await.unwrap(), Err(LimiterClosed));
    }
}
