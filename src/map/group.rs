use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::layer::OverlayLayer;
use crate::error::{PipelineError, Result};

/// A named, togglable collection of overlay layers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub name: String,
    pub layers: Vec<OverlayLayer>,
    /// At most one member visible at a time.
    pub exclusive: bool,
}

/// Assemble groups in the order given, keeping each group's layer order.
///
/// Layers are identified by name; a layer listed twice (in one group or
/// across groups) is rejected.
pub fn build_groups(
    entries: Vec<(String, Vec<OverlayLayer>)>,
    default_exclusive: bool,
    overrides: &HashMap<String, bool>,
) -> Result<Vec<Group>> {
    let mut owner: BTreeMap<String, String> = BTreeMap::new();
    let mut groups = Vec::with_capacity(entries.len());

    for (name, layers) in entries {
        for layer in &layers {
            if let Some(first) = owner.insert(layer.name.clone(), name.clone()) {
                return Err(PipelineError::DuplicateLayer {
                    layer: layer.name.clone(),
                    first_group: first,
                    second_group: name,
                });
            }
        }
        let exclusive = overrides.get(&name).copied().unwrap_or(default_exclusive);
        log::debug!(
            "Group '{name}': {} layers, exclusive={exclusive}",
            layers.len()
        );
        groups.push(Group {
            name,
            layers,
            exclusive,
        });
    }
    Ok(groups)
}
