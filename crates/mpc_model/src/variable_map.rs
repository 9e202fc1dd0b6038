//! Persisted mapping from variable name to its `[kind, index]` position in the
//! combined vector, read by downstream solver-generation and runtime stages.
//!
//! Entries are kept in insertion order (states, then inputs) and written in
//! that order, so regenerating the map for an unchanged model is byte-stable.

use crate::error::{ModelError, ModelResult};
use crate::model::{ModelSpec, VarIndex, VarKind};
use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct VariableMap {
    entries: Vec<(String, VarIndex)>,
}

impl VariableMap {
    pub fn from_spec(spec: &ModelSpec) -> Self {
        let nu = spec.nu();
        let states = spec.states().iter().enumerate().map(|(i, name)| {
            let index = VarIndex {
                kind: VarKind::State,
                index: nu + i,
            };
            (name.clone(), index)
        });
        let inputs = spec.inputs().iter().enumerate().map(|(i, name)| {
            let index = VarIndex {
                kind: VarKind::Input,
                index: i,
            };
            (name.clone(), index)
        });
        Self {
            entries: states.chain(inputs).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, name: &str) -> ModelResult<VarIndex> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, idx)| *idx)
            .ok_or_else(|| ModelError::unknown(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, VarIndex)> {
        self.entries.iter().map(|(n, idx)| (n.as_str(), *idx))
    }

    pub fn to_yaml(&self) -> ModelResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Writes the map to `path`, replacing the file if it exists.
    pub fn write(&self, path: &Path) -> ModelResult<()> {
        let content = self.to_yaml()?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, content)?;
        info!(path = %path.display(), variables = self.len(), "wrote variable map");
        Ok(())
    }

    pub fn load(path: &Path) -> ModelResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

impl Serialize for VariableMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (name, idx) in &self.entries {
            map.serialize_entry(name, &(idx.kind, idx.index))?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for VariableMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(VariableMapVisitor)
    }
}

struct VariableMapVisitor;

impl<'de> Visitor<'de> for VariableMapVisitor {
    type Value = VariableMap;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a map of variable name to [kind, index]")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<VariableMap, A::Error> {
        let mut entries = Vec::with_capacity(access.size_hint().unwrap_or(0));
        while let Some((name, (kind, index))) = access.next_entry::<String, (VarKind, usize)>()? {
            entries.push((name, VarIndex { kind, index }));
        }
        Ok(VariableMap { entries })
    }
}
