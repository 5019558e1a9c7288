/*!
Sink d'enregistrement pour tests sans broker MQTT

Capture toutes les écritures temps réel, historiques et notifications pour
les assertions. Peut simuler une panne du sink (injection d'échec) afin de
tester que la boucle de relève continue malgré tout.
*/

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use vigie_poller::reading::MetricSet;
use vigie_poller::sink::{Sink, SinkError};

/// Une écriture capturée (temps réel, historique ou notification).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedWrite {
    pub device: usize,
    pub values: MetricSet,
}

#[derive(Clone, Default)]
pub struct RecordingSink {
    realtime: Arc<Mutex<Vec<RecordedWrite>>>,
    historic: Arc<Mutex<Vec<RecordedWrite>>>,
    notifications: Arc<Mutex<Vec<RecordedWrite>>>,
    fail_writes: Arc<AtomicBool>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fait échouer toutes les écritures de persistance à partir de
    /// maintenant (les notifications restent silencieuses par contrat).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn realtime_writes(&self) -> Vec<RecordedWrite> {
        self.realtime.lock().unwrap().clone()
    }

    pub fn historic_writes(&self) -> Vec<RecordedWrite> {
        self.historic.lock().unwrap().clone()
    }

    pub fn notifications(&self) -> Vec<RecordedWrite> {
        self.notifications.lock().unwrap().clone()
    }

    /// Écritures temps réel d'une seule sonde, dans l'ordre d'arrivée.
    pub fn realtime_for(&self, device: usize) -> Vec<RecordedWrite> {
        self.realtime
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.device == device)
            .cloned()
            .collect()
    }

    pub fn historic_for(&self, device: usize) -> Vec<RecordedWrite> {
        self.historic
            .lock()
            .unwrap()
            .iter()
            .filter(|w| w.device == device)
            .cloned()
            .collect()
    }

    /// Dernières valeurs temps réel d'une sonde, encodées en JSON comme
    /// sur le fil (la sentinelle apparaît en -1).
    pub fn last_realtime_json(&self, device: usize) -> Option<serde_json::Value> {
        self.realtime_for(device)
            .last()
            .and_then(|w| serde_json::to_value(&w.values).ok())
    }

    pub fn clear(&self) {
        self.realtime.lock().unwrap().clear();
        self.historic.lock().unwrap().clear();
        self.notifications.lock().unwrap().clear();
    }
}

impl Sink for RecordingSink {
    async fn write_realtime(&self, values: &MetricSet, device: usize) -> Result<(), SinkError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        log::debug!("[STUB] realtime write for device {device}");
        self.realtime.lock().unwrap().push(RecordedWrite {
            device,
            values: values.clone(),
        });
        Ok(())
    }

    async fn write_historic(&self, values: &MetricSet, device: usize) -> Result<(), SinkError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SinkError::Closed);
        }
        log::debug!("[STUB] historic write for device {device}");
        self.historic.lock().unwrap().push(RecordedWrite {
            device,
            values: values.clone(),
        });
        Ok(())
    }

    async fn notify(&self, values: &MetricSet, device: usize) {
        log::debug!("[STUB] notification for device {device}");
        self.notifications.lock().unwrap().push(RecordedWrite {
            device,
            values: values.clone(),
        });
    }
}
