//! Application state shared by every handler.

use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use tracing::{info, warn};

use uss_core::ledger::{NotificationFreshness, NotificationLedger};
use uss_core::models::SubscriptionState;
use uss_dss::{
    CredentialProvider, DssClient, NotificationDispatcher, PeerUssClient, ScdOperations,
};

use crate::config::Config;
use crate::lifecycle::LifecycleOrchestrator;
use crate::persistence::{
    init_database, FlightDeclarationRepository, InMemoryFlightDeclarationRepository,
    SqliteFlightDeclarationRepository,
};

pub struct AppState {
    pub config: Config,
    pub lifecycle: LifecycleOrchestrator,
    ledger: Mutex<NotificationLedger>,
}

impl AppState {
    /// Wire the collaborators from explicit parts.
    pub fn new(
        config: Config,
        repository: Arc<dyn FlightDeclarationRepository>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        let dss = DssClient::new(
            config.dss_base_url.clone(),
            config.dss_audience.clone(),
            credentials.clone(),
            config.dss_timeout(),
        );
        let peers = PeerUssClient::new(credentials, config.dss_timeout());
        let scd = ScdOperations::new(dss, peers.clone(), config.uss_base_url.clone());
        let notifier = NotificationDispatcher::new(
            peers,
            config.uss_base_url.clone(),
            config.peer_notification_timeout(),
        );

        Self {
            lifecycle: LifecycleOrchestrator::new(scd, notifier, repository),
            config,
            ledger: Mutex::new(NotificationLedger::new()),
        }
    }

    /// Build state from configuration, opening the database when one is set.
    pub async fn from_config(config: Config) -> Result<Self> {
        let repository: Arc<dyn FlightDeclarationRepository> = if config.database_path.is_empty() {
            info!("No database path configured, flight declarations are kept in memory");
            Arc::new(InMemoryFlightDeclarationRepository::new())
        } else {
            let db = init_database(&config.database_path, config.database_max_connections)
                .await
                .context("opening flight declaration database")?;
            Arc::new(SqliteFlightDeclarationRepository::new(db.pool().clone()))
        };
        let credentials = config.credential_provider();
        Ok(Self::new(config, repository, credentials))
    }

    pub fn repository(&self) -> &Arc<dyn FlightDeclarationRepository> {
        self.lifecycle.repository()
    }

    /// Record an inbound notification and report whether it is new.
    pub fn observe_notification(&self, subscriptions: &[SubscriptionState]) -> NotificationFreshness {
        match self.ledger.lock() {
            Ok(mut ledger) => ledger.observe(subscriptions),
            Err(poisoned) => {
                warn!("Notification ledger lock poisoned, recovering");
                poisoned.into_inner().observe(subscriptions)
            }
        }
    }
}
