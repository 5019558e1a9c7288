/*!
Harness de test pour la boucle de relève

Assemble un scheduler complet sur les stubs (lecteur scripté + sink
d'enregistrement) avec une configuration compacte, et pilote les cycles
de façon déterministe.
*/

use crate::reader_stub::ScriptedReader;
use crate::sink_stub::RecordingSink;
use vigie_poller::config::{PollConfig, PollerConfig, SinkConfig, TransportConfig};
use vigie_poller::scheduler::{DeviceState, PollScheduler};

/// Configuration compacte pour les tests: flotte, schéma et cadences
/// explicites, transport/sink factices.
pub fn test_config(
    devices: &[&str],
    endpoints: &[(&str, u8)],
    max_failures: u32,
    retry_interval: u64,
    value_historic_interval: u64,
) -> PollerConfig {
    PollerConfig {
        transport: TransportConfig {
            gateway_addr: "127.0.0.1:0".to_string(),
            serial_path: "/dev/null".to_string(),
            baud_rate: 115_200,
            read_timeout_ms: 100,
        },
        sink: SinkConfig {
            broker_host: "localhost".to_string(),
            broker_port: 1883,
            client_id: None,
            notify_url: "http://localhost:0/notify".to_string(),
        },
        poll: PollConfig {
            max_failures,
            retry_interval,
            value_historic_interval,
        },
        devices: devices
            .iter()
            .map(|s| s.parse().expect("invalid test device address"))
            .collect(),
        endpoints: endpoints
            .iter()
            .map(|(name, ep)| (name.to_string(), *ep))
            .collect(),
    }
}

/// Harness complet: scheduler + poignées sur les stubs.
pub struct PollHarness {
    pub reader: ScriptedReader,
    pub sink: RecordingSink,
    scheduler: PollScheduler<ScriptedReader, RecordingSink>,
}

impl PollHarness {
    pub fn new(config: &PollerConfig) -> Self {
        env_logger::try_init().ok();

        let reader = ScriptedReader::new();
        let sink = RecordingSink::new();
        let scheduler = PollScheduler::new(config, reader.clone(), sink.clone());

        Self {
            reader,
            sink,
            scheduler,
        }
    }

    /// Un cycle complet; renvoie le nombre de sondes connectées.
    pub async fn run_cycle(&mut self) -> usize {
        self.scheduler.run_cycle().await
    }

    /// Enchaîne `n` cycles; renvoie le compte connecté de chaque cycle.
    pub async fn run_cycles(&mut self, n: usize) -> Vec<usize> {
        let mut counts = Vec::with_capacity(n);
        for _ in 0..n {
            counts.push(self.scheduler.run_cycle().await);
        }
        counts
    }

    pub fn cycle(&self) -> u64 {
        self.scheduler.cycle()
    }

    pub fn devices(&self) -> &[DeviceState] {
        self.scheduler.devices()
    }
}
