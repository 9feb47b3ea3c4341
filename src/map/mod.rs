//! Presentation model: styled overlay layers, their groups, and the
//! document handed to a renderer.

pub mod group;
pub mod layer;

use serde::Serialize;

use crate::color::ColorScale;
use crate::config::ViewConfig;
use crate::data::project::Crs;
use group::Group;
use layer::OverlayLayer;

/// Everything a renderer needs to draw one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapDocument {
    pub view: ViewConfig,
    /// CRS of every exported layer.
    pub crs: Crs,
    pub groups: Vec<Group>,
    pub legends: Vec<ColorScale>,
}

impl MapDocument {
    pub fn layers(&self) -> impl Iterator<Item = &OverlayLayer> {
        self.groups.iter().flat_map(|g| g.layers.iter())
    }
}
