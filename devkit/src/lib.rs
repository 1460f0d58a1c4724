/*!
# RemoteWatch DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le test du viewer RemoteWatch avec:
- Backend HTTP stub (`/api/devices`, `/api/usage`) sans base de données
- Injection de pannes (statut HTTP, corps invalide, latence)
- Builders de fixtures au format exact du producteur
- Harness de test avec attente sur conditions
*/

pub mod stub_backend;
pub mod fixtures;
pub mod test_utils;

pub use stub_backend::{Fault, Route, StubBackend};
pub use fixtures::{DeviceFixture, FleetFixture};
pub use test_utils::TestHarness;
