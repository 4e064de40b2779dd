//! Best-effort fan-out of change notifications to subscribed peers.

use std::time::Duration;

use futures::future::join_all;
use uuid::Uuid;

use uss_core::models::{OperationalIntent, SubscriberToNotify};

use crate::error::PeerError;
use crate::peer::{PeerUssClient, PutOperationalIntentDetailsParameters};

/// Delivery summary; never affects the primary response.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NotificationReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
    pub skipped: usize,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    peers: PeerUssClient,
    own_base_url: String,
    timeout: Duration,
}

impl NotificationDispatcher {
    pub fn new(peers: PeerUssClient, own_base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            peers,
            own_base_url: own_base_url.into(),
            timeout,
        }
    }

    pub fn with_request_id(&self, request_id: Option<String>) -> Self {
        let mut scoped = self.clone();
        scoped.peers = self.peers.with_request_id(request_id);
        scoped
    }

    /// Notify every subscriber concurrently. Each send has its own timeout
    /// and failures are logged, not retried.
    pub async fn notify_peers(
        &self,
        subscribers: &[SubscriberToNotify],
        operational_intent: Option<&OperationalIntent>,
        operational_intent_id: Uuid,
    ) -> NotificationReport {
        let mut report = NotificationReport::default();
        let own = self.own_base_url.trim_end_matches('/');

        let targets: Vec<&SubscriberToNotify> = subscribers
            .iter()
            .filter(|sub| {
                let is_self = sub.uss_base_url.trim_end_matches('/') == own;
                if is_self {
                    report.skipped += 1;
                }
                !is_self
            })
            .collect();

        let sends = targets.into_iter().map(|subscriber| {
            let notification = PutOperationalIntentDetailsParameters {
                operational_intent_id,
                operational_intent: operational_intent.cloned(),
                operational_intent_details: operational_intent.map(|oi| oi.details.clone()),
                subscriptions: subscriber.subscriptions.clone(),
            };
            let url = subscriber.uss_base_url.clone();
            async move {
                let result = tokio::time::timeout(
                    self.timeout,
                    self.peers.notify_operational_intent(&url, &notification),
                )
                .await
                .unwrap_or_else(|_| Err(PeerError::Timeout { url: url.clone() }));
                (url, result)
            }
        });

        for (url, result) in join_all(sends).await {
            match result {
                Ok(()) => {
                    tracing::debug!("Notified {} about {}", url, operational_intent_id);
                    report.delivered.push(url);
                }
                Err(err) => {
                    tracing::warn!(
                        "Notification of {} about {} failed: {}",
                        url,
                        operational_intent_id,
                        err
                    );
                    report.failed.push((url, err.to_string()));
                }
            }
        }
        report
    }
}
