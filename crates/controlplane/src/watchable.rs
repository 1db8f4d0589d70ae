//! Generic `Watch*` primitive: current value first, then on every change.
//!
//! No 1:1 teacher analog — built to the exact contract `spec.md` gives
//! every `Watch*` operation. `tokio::sync::watch` already carries that
//! contract natively (a new subscriber sees the latest value immediately,
//! then wakes on change), so this is a thin wrapper rather than a hand
//! rolled notify-plus-state pair like `CatalogEngine`'s broadcast channel
//! needed (that one carries a log of diffs, not just the latest value).

use tokio::sync::watch;

pub struct Watchable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone + Send + Sync + 'static> Watchable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    pub fn set(&self, value: T) {
        let _ = self.tx.send(value);
    }

    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Lazy sequence of snapshots: current value first, then on every
    /// subsequent change. Never terminates on its own — the consumer drops
    /// the stream to stop watching.
    pub fn watch(&self) -> impl futures_core::Stream<Item = T> {
        let mut rx = self.tx.subscribe();
        async_stream::stream! {
            yield rx.borrow().clone();
            while rx.changed().await.is_ok() {
                yield rx.borrow().clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn first_element_is_current_value() {
        let w = Watchable::new(1);
        let mut stream = Box::pin(w.watch());
        assert_eq!(stream.next().await, Some(1));
    }

    #[tokio::test]
    async fn subsequent_elements_are_on_change() {
        let w = Watchable::new(0);
        let mut stream = Box::pin(w.watch());
        assert_eq!(stream.next().await, Some(0));
        w.set(5);
        assert_eq!(stream.next().await, Some(5));
    }
}
