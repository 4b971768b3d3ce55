/*!
# Sentry DevKit - Stubs et utilitaires pour tester le kernel

Bibliothèque facilitant les tests d'intégration du kernel SENTRY-360 avec:
- Store realtime en mémoire (live/ctrl) servant de canal de commande
- Builders de snapshots `live` au format du device
- Harness moteur + horloge manuelle
*/

pub mod store_stub;
pub mod test_utils;

pub use store_stub::{MockStore, SnapshotBuilder};
pub use test_utils::TestHarness;
