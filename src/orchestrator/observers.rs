//! Observer fan-in, `spec.md` §4.1.5: three store observers registered at
//! startup and mapped to orchestrator operations. `StoreEvent` here only
//! names the touched tables (no row-level synced/all distinction), so the
//! "synced" and "all" message observers collapse into one dispatch that both
//! kicks the loop and (re)arms the debounced upsync alarm — recorded as a
//! simplification in `DESIGN.md`.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::store::Store;

use super::Orchestrator;

const UPSYNC_DEBOUNCE: Duration = Duration::from_secs(10);

pub fn spawn<S: Store>(orchestrator: Orchestrator<S>) -> JoinHandle<()> {
    tokio::spawn(run(orchestrator))
}

async fn run<S: Store>(orchestrator: Orchestrator<S>) {
    let mut changes = orchestrator.inner.store.subscribe_changes();
    let mut upsync_due_at: Option<tokio::time::Instant> = None;

    loop {
        let upsync_wait = async {
            match upsync_due_at {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = changes.recv() => {
                match event {
                    Ok(event) => {
                        if event.touches("accounts") {
                            orchestrator.reconcile_accounts().await;
                        }
                        if event.touches("mailboxes") {
                            orchestrator.kick();
                        }
                        if event.touches("messages") {
                            orchestrator.kick();
                            upsync_due_at = Some(tokio::time::Instant::now() + UPSYNC_DEBOUNCE);
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "observer fan-in lagged behind store change stream");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
            _ = upsync_wait, if upsync_due_at.is_some() => {
                upsync_due_at = None;
                orchestrator.fire_upsync_alarm().await;
            }
        }
    }
}
