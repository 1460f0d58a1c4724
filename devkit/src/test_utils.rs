/*!
Test Harness pour le viewer RemoteWatch

Facilite l'écriture de tests d'intégration avec:
- Démarrage automatique du backend stub
- Chargement de flottes et injection de pannes
- Attente bornée sur une condition asynchrone
*/

use crate::fixtures::FleetFixture;
use crate::stub_backend::{Fault, Route, StubBackend};
use anyhow::Result;
use std::future::Future;
use std::time::Duration;

/// Harness de test complet: un backend stub prêt à l'emploi
pub struct TestHarness {
    pub backend: StubBackend,
}

impl TestHarness {
    /// Démarre un backend stub vide
    pub async fn new() -> Result<Self> {
        env_logger::try_init().ok(); // Init logging pour tests

        Ok(Self {
            backend: StubBackend::spawn().await?,
        })
    }

    /// Démarre un backend stub déjà chargé avec une flotte
    pub async fn with_fleet(fleet: &FleetFixture) -> Result<Self> {
        let harness = Self::new().await?;
        harness.backend.load(fleet);
        Ok(harness)
    }

    pub fn base_url(&self) -> String {
        self.backend.base_url()
    }

    pub fn load(&self, fleet: &FleetFixture) {
        self.backend.load(fleet);
    }

    pub fn fail(&self, route: Route, fault: Fault) {
        self.backend.inject(route, fault);
    }

    pub fn heal(&self) {
        self.backend.clear_faults();
    }

    /// Réévalue `condition` toutes les 20ms jusqu'à `timeout_ms`
    pub async fn wait_until<F, Fut>(&self, timeout_ms: u64, mut condition: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bool>,
    {
        let start = std::time::Instant::now();

        while start.elapsed() < Duration::from_millis(timeout_ms) {
            if condition().await {
                return Ok(());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        log::warn!("⏰ Timeout after {}ms waiting for condition", timeout_ms);
        anyhow::bail!("Condition not met within {}ms", timeout_ms);
    }
}
