//! Point label storage for classification metadata.
//!
//! Labels map `PointId` → integer tags, grouped by label name. The external
//! geometric classifier communicates through labels; in particular the
//! `layer_base` label marks the edges at the root of the prismatic layer.

use crate::topology::point::PointId;
use std::collections::{HashMap, HashSet};

/// Label name used by the classifier to mark layer-base edges.
pub const LAYER_BASE_LABEL: &str = "layer_base";

/// Named integer labels for mesh points.
#[derive(Clone, Debug, Default)]
pub struct LabelSet {
    labels: HashMap<String, HashMap<PointId, i32>>,
}

impl LabelSet {
    /// Creates an empty label set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns `value` for `point` under label `name`.
    ///
    /// Returns the previous value, if any.
    pub fn set_label(&mut self, point: PointId, name: &str, value: i32) -> Option<i32> {
        self.labels
            .entry(name.to_string())
            .or_default()
            .insert(point, value)
    }

    /// Returns the label value for `point` under `name`.
    pub fn get_label(&self, point: PointId, name: &str) -> Option<i32> {
        self.labels
            .get(name)
            .and_then(|map| map.get(&point).copied())
    }

    /// Returns all points with label `name == value`.
    pub fn points_with_label<'a>(
        &'a self,
        name: &'a str,
        value: i32,
    ) -> impl Iterator<Item = PointId> + 'a {
        self.labels.get(name).into_iter().flat_map(move |map| {
            map.iter()
                .filter_map(move |(&point, &label_value)| (label_value == value).then_some(point))
        })
    }

    /// Returns all points with label `name == value` in deterministic order.
    pub fn stratum_points(&self, name: &str, value: i32) -> Vec<PointId> {
        let mut points: Vec<_> = self.points_with_label(name, value).collect();
        points.sort_unstable();
        points
    }

    /// Iterate over all labels as `(name, point, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (&str, PointId, i32)> + '_ {
        self.labels.iter().flat_map(|(name, map)| {
            map.iter()
                .map(move |(&point, &value)| (name.as_str(), point, value))
        })
    }

    /// Remove all label entries for the provided points.
    pub fn clear_points<I>(&mut self, points: I)
    where
        I: IntoIterator<Item = PointId>,
    {
        let targets: HashSet<PointId> = points.into_iter().collect();
        if targets.is_empty() {
            return;
        }
        let mut empty_labels = Vec::new();
        for (name, map) in &mut self.labels {
            map.retain(|point, _| !targets.contains(point));
            if map.is_empty() {
                empty_labels.push(name.clone());
            }
        }
        for name in empty_labels {
            self.labels.remove(&name);
        }
    }

    /// Returns true when the label set has no entries.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
