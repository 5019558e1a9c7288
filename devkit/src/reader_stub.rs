/*!
Stub de lecteur de sondes pour développement sans passerelle radio

Chaque sonde reçoit une file d'issues scriptées (succès avec valeurs, ou
échec). Le stub journalise tous les appels pour les assertions de tests.
*/

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use vigie_poller::config::{DeviceAddr, EndpointMap};
use vigie_poller::reader::{DeviceReader, ReadError};
use vigie_poller::reading::{MetricSet, Sample};

/// Issue scriptée pour une tentative de lecture.
#[derive(Debug, Clone)]
pub enum ScriptedOutcome {
    Success(MetricSet),
    NotConnected,
    Timeout,
}

/// Construit un MetricSet depuis des paires (métrique, valeur); une valeur
/// négative devient la sentinelle.
pub fn metric_set(pairs: &[(&str, f64)]) -> MetricSet {
    pairs
        .iter()
        .map(|(name, value)| {
            let sample = if *value < 0.0 {
                Sample::Unavailable
            } else {
                Sample::Value(*value)
            };
            (name.to_string(), sample)
        })
        .collect()
}

/// Lecteur scripté compatible avec le trait `DeviceReader`.
///
/// Clonable: tous les clones partagent le script et le journal, le test
/// garde donc une poignée pendant que le scheduler possède la sienne.
#[derive(Clone, Default)]
pub struct ScriptedReader {
    scripts: Arc<Mutex<HashMap<String, VecDeque<ScriptedOutcome>>>>,
    journal: Arc<Mutex<Vec<String>>>,
}

impl ScriptedReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Programme une issue pour la prochaine lecture de cette sonde.
    pub fn push_outcome(&self, device: &str, outcome: ScriptedOutcome) {
        self.scripts
            .lock()
            .unwrap()
            .entry(device.to_string())
            .or_default()
            .push_back(outcome);
    }

    /// Programme `times` lectures réussies avec les mêmes valeurs.
    pub fn script_success(&self, device: &str, values: &[(&str, f64)], times: usize) {
        for _ in 0..times {
            self.push_outcome(device, ScriptedOutcome::Success(metric_set(values)));
        }
    }

    /// Programme `times` échecs de lecture.
    pub fn script_failure(&self, device: &str, times: usize) {
        for _ in 0..times {
            self.push_outcome(device, ScriptedOutcome::NotConnected);
        }
    }

    /// Toutes les sondes lues, dans l'ordre des tentatives.
    pub fn read_log(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    /// Nombre de tentatives de lecture pour une sonde.
    pub fn reads_for(&self, device: &str) -> usize {
        self.journal
            .lock()
            .unwrap()
            .iter()
            .filter(|d| d.as_str() == device)
            .count()
    }

    pub fn clear(&self) {
        self.scripts.lock().unwrap().clear();
        self.journal.lock().unwrap().clear();
    }
}

impl DeviceReader for ScriptedReader {
    async fn read(
        &mut self,
        device: &DeviceAddr,
        _endpoints: &EndpointMap,
    ) -> Result<MetricSet, ReadError> {
        self.journal.lock().unwrap().push(device.to_string());

        let outcome = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(device.as_str())
            .and_then(|queue| queue.pop_front());

        match outcome {
            Some(ScriptedOutcome::Success(values)) => {
                log::debug!("[STUB] read {} -> success", device);
                Ok(values)
            }
            Some(ScriptedOutcome::Timeout) => {
                log::debug!("[STUB] read {} -> timeout", device);
                Err(ReadError::Timeout)
            }
            // File vide: la sonde reste injoignable par défaut.
            Some(ScriptedOutcome::NotConnected) | None => {
                log::debug!("[STUB] read {} -> not connected", device);
                Err(ReadError::NotConnected)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_are_consumed_in_order() {
        let reader = ScriptedReader::new();
        reader.script_success("74:4d:bd:ff:fe:60:1e:ba", &[("t", 21.0)], 1);
        reader.script_failure("74:4d:bd:ff:fe:60:1e:ba", 1);

        let device: DeviceAddr = "74:4d:bd:ff:fe:60:1e:ba".parse().unwrap();
        let endpoints: EndpointMap = [("t".to_string(), 1u8)].into_iter().collect();

        let mut handle = reader.clone();
        let first = handle.read(&device, &endpoints).await.unwrap();
        assert_eq!(first.get("t"), Some(Sample::Value(21.0)));

        assert!(matches!(
            handle.read(&device, &endpoints).await,
            Err(ReadError::NotConnected)
        ));

        // File épuisée: injoignable par défaut.
        assert!(handle.read(&device, &endpoints).await.is_err());
        assert_eq!(reader.reads_for("74:4d:bd:ff:fe:60:1e:ba"), 3);
    }
}
