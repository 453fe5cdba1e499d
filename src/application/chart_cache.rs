// Chart cache - bounded store of the latest good chart per viewer and panel
use crate::domain::chart::ChartModel;
use std::collections::{HashMap, VecDeque};

/// Latest good chart per refresh key, evicting the least recently stored key
/// once `capacity` keys are held.
#[derive(Debug)]
pub struct ChartCache {
    capacity: usize,
    models: HashMap<String, ChartModel>,
    order: VecDeque<String>,
}

impl ChartCache {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            models: HashMap::new(),
            order: VecDeque::new(),
        }
    }

    pub fn insert(&mut self, key: String, model: ChartModel) {
        if self.models.insert(key.clone(), model).is_some() {
            self.order.retain(|k| *k != key);
        }
        self.order.push_back(key);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                tracing::debug!("Evicting retained chart {}", evicted);
                self.models.remove(&evicted);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&ChartModel> {
        self.models.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ChartModel> {
        self.models.get_mut(key)
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.models.len()
    }
}
