//! Connectivity gate, `spec.md` §4.1.1 step 1: "if there is no active
//! network, stop all running workers, take an alarm for a bounded wait (≤ 10
//! min + 5 s), release the wake-lock, and wait on a connectivity condition."

use std::time::Duration;

use tokio::sync::watch;

const MAX_DISCONNECTED_WAIT: Duration = Duration::from_secs(10 * 60 + 5);

/// A `tokio::sync::watch` standing in for the platform's connectivity
/// broadcast receiver, `spec.md` §9 REDESIGN FLAGS.
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    /// Starts online; nothing in this crate drives a real network interface.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(true);
        Self { tx }
    }

    pub fn set_online(&self, online: bool) {
        self.tx.send_replace(online);
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }

    /// Wait for connectivity to return, bounded at `MAX_DISCONNECTED_WAIT`
    /// per `spec.md` §4.1.1. Returns immediately if already online.
    pub async fn wait_for_reconnect(&self) {
        if self.is_online() {
            return;
        }
        let mut rx = self.subscribe();
        let _ = tokio::time::timeout(MAX_DISCONNECTED_WAIT, async {
            while !*rx.borrow() {
                if rx.changed().await.is_err() {
                    break;
                }
            }
        })
        .await;
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn wait_returns_immediately_when_already_online() {
        let connectivity = Connectivity::new();
        tokio::time::timeout(Duration::from_millis(50), connectivity.wait_for_reconnect())
            .await
            .expect("should not block when online");
    }

    #[tokio::test]
    async fn wait_unblocks_once_reconnected() {
        let connectivity = Connectivity::new();
        connectivity.set_online(false);

        let waiter = {
            let tx = connectivity.tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                tx.send_replace(true);
            })
        };

        tokio::time::timeout(Duration::from_secs(1), connectivity.wait_for_reconnect())
            .await
            .expect("should unblock after reconnect");
        waiter.await.unwrap();
    }
}
