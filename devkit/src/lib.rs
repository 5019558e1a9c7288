/*!
# Vigie DevKit - Stubs et Utilitaires pour Développement

Bibliothèque facilitant le développement du poller Vigie avec:
- Stub de lecteur de sondes scripté (sans passerelle radio)
- Sink d'enregistrement pour assertions (sans broker MQTT)
- Harness de boucle de relève pour tests d'intégration
*/

pub mod reader_stub;
pub mod sink_stub;
pub mod test_utils;

pub use reader_stub::{metric_set, ScriptedOutcome, ScriptedReader};
pub use sink_stub::{RecordedWrite, RecordingSink};
pub use test_utils::{test_config, PollHarness};
