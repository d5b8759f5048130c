use std::sync::Arc;

use tokio::{sync::watch, task::JoinHandle};

use crate::backend::{BackendService, ChangeEvent, Subscription, SubscriptionId};

const LIVE_FEED_STARTED: &str = "LIVE_FEED_STARTED";
const LIVE_FEED_STOPPED: &str = "LIVE_FEED_STOPPED";
const LIVE_FEED_CLOSED_BY_BACKEND: &str = "LIVE_FEED_CLOSED_BY_BACKEND";
const LIVE_FEED_UNSUBSCRIBE_FAILED: &str = "LIVE_FEED_UNSUBSCRIBE_FAILED";
const LIVE_FEED_STOP_SIGNAL_SENT: &str = "LIVE_FEED_STOP_SIGNAL_SENT";

/// Background task draining one backend subscription into a handler.
///
/// The subscription is released when the feed is stopped, when it is
/// dropped, or when the backend closes the channel.
#[derive(Debug)]
pub struct LiveFeed {
    subscription_id: SubscriptionId,
    stop_tx: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
}

impl LiveFeed {
    /// Spawns the feed task on the current runtime.
    pub fn start<H>(
        backend: Arc<dyn BackendService>,
        subscription: Subscription,
        handler: H,
    ) -> Self
    where
        H: FnMut(ChangeEvent) + Send + 'static,
    {
        let subscription_id = subscription.id;
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_feed(backend, subscription, handler, stop_rx));

        tracing::info!(
            code = LIVE_FEED_STARTED,
            subscription_id = subscription_id.0,
            "live feed started"
        );

        Self {
            subscription_id,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Stops the task and waits until the subscription has been released.
    pub async fn stop(mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LiveFeed {
    fn drop(&mut self) {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(true);
            tracing::debug!(
                code = LIVE_FEED_STOP_SIGNAL_SENT,
                subscription_id = self.subscription_id.0,
                "live feed dropped, stop signal sent"
            );
        }
    }
}

async fn run_feed<H>(
    backend: Arc<dyn BackendService>,
    mut subscription: Subscription,
    mut handler: H,
    mut stop_rx: watch::Receiver<bool>,
) where
    H: FnMut(ChangeEvent) + Send + 'static,
{
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    tracing::info!(
                        code = LIVE_FEED_STOPPED,
                        subscription_id = subscription.id.0,
                        "live feed stopped"
                    );
                    break;
                }
            }
            event = subscription.events.recv() => {
                match event {
                    Some(event) => {
                        tracing::debug!(
                            subscription_id = subscription.id.0,
                            kind = event.kind(),
                            "live change received"
                        );
                        handler(event);
                    }
                    None => {
                        tracing::info!(
                            code = LIVE_FEED_CLOSED_BY_BACKEND,
                            subscription_id = subscription.id.0,
                            "backend closed the live feed"
                        );
                        break;
                    }
                }
            }
        }
    }

    subscription.events.close();
    if let Err(error) = backend.unsubscribe(subscription.id).await {
        tracing::warn!(
            code = LIVE_FEED_UNSUBSCRIBE_FAILED,
            subscription_id = subscription.id.0,
            error = %error,
            "failed to release live subscription"
        );
    }
}
