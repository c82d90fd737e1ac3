use serde::{Deserialize, Serialize};

/// A named point on the primary track's timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub timestamp: f64,
    pub label: String,
}

/// Markers kept in timestamp order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarkerList {
    markers: Vec<Marker>,
}

impl MarkerList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from stored markers, dropping unusable timestamps and sorting
    pub fn from_markers(markers: Vec<Marker>) -> Self {
        let mut list = Self::new();
        for marker in markers {
            list.add(marker.timestamp, marker.label);
        }
        list
    }

    /// Insert a marker and return its index. Empty labels become "Marker N".
    /// Markers with equal timestamps keep insertion order.
    pub fn add(&mut self, timestamp: f64, label: impl Into<String>) -> Option<usize> {
        if !timestamp.is_finite() || timestamp < 0.0 {
            return None;
        }

        let mut label = label.into().trim().to_string();
        if label.is_empty() {
            label = format!("Marker {}", self.markers.len() + 1);
        }

        let index = self.markers.partition_point(|m| m.timestamp <= timestamp);
        self.markers.insert(index, Marker { timestamp, label });
        Some(index)
    }

    pub fn remove(&mut self, index: usize) -> Option<Marker> {
        if index < self.markers.len() {
            Some(self.markers.remove(index))
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.markers.clear();
    }

    pub fn get(&self, index: usize) -> Option<&Marker> {
        self.markers.get(index)
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.markers.iter()
    }

    /// First marker strictly after `position`
    pub fn next_after(&self, position: f64) -> Option<&Marker> {
        self.markers.iter().find(|m| m.timestamp > position)
    }

    /// Last marker strictly before `position`
    pub fn previous_before(&self, position: f64) -> Option<&Marker> {
        self.markers.iter().rev().find(|m| m.timestamp < position)
    }

    pub fn to_vec(&self) -> Vec<Marker> {
        self.markers.clone()
    }
}
