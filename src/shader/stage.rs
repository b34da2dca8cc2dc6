//! Shader Stages

use std::fmt;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// One programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaderStage {
    Vertex,
    Geometry,
    Fragment,
}

impl ShaderStage {
    /// All stages in pipeline order.
    pub const ALL: [ShaderStage; 3] = [Self::Vertex, Self::Geometry, Self::Fragment];

    /// Macro defined in the generated source of this stage only.
    #[must_use]
    pub const fn marker(self) -> &'static str {
        match self {
            Self::Vertex => "VERTEX_SHADER",
            Self::Geometry => "GEOMETRY_SHADER",
            Self::Fragment => "FRAGMENT_SHADER",
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::Geometry => "geometry",
            Self::Fragment => "fragment",
        }
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Per-stage source text. An empty string means the stage is absent.
///
/// Sources are rewritten in place by preprocessing and compilation, so the
/// text held here always matches what the driver saw and its diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderStages {
    sources: [String; 3],
}

impl ShaderStages {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Vertex + fragment pair.
    #[must_use]
    pub fn from_vertex_fragment(vertex: impl Into<String>, fragment: impl Into<String>) -> Self {
        let mut stages = Self::new();
        stages[ShaderStage::Vertex] = vertex.into();
        stages[ShaderStage::Fragment] = fragment.into();
        stages
    }

    #[must_use]
    pub fn with(mut self, stage: ShaderStage, source: impl Into<String>) -> Self {
        self[stage] = source.into();
        self
    }

    /// Whether the stage has any source.
    #[inline]
    #[must_use]
    pub fn is_present(&self, stage: ShaderStage) -> bool {
        !self.sources[stage.index()].is_empty()
    }

    /// Present stages with their sources, in pipeline order.
    pub fn present(&self) -> impl Iterator<Item = (ShaderStage, &str)> {
        ShaderStage::ALL
            .into_iter()
            .filter(|&stage| self.is_present(stage))
            .map(|stage| (stage, self.sources[stage.index()].as_str()))
    }

    /// Empties every stage, keeping the string allocations.
    pub fn clear(&mut self) {
        for source in &mut self.sources {
            source.clear();
        }
    }
}

impl Index<ShaderStage> for ShaderStages {
    type Output = String;

    fn index(&self, stage: ShaderStage) -> &String {
        &self.sources[stage.index()]
    }
}

impl IndexMut<ShaderStage> for ShaderStages {
    fn index_mut(&mut self, stage: ShaderStage) -> &mut String {
        &mut self.sources[stage.index()]
    }
}
