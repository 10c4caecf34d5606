use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;
use shared::domain::{CommentTarget, ContainerId, TargetKind};

/// A page entity whose comment containers a content controller renders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEntity {
    Class(String),
    Guide(String),
    Video(String),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShowOptions {
    pub re_rendered: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TargetMapFile {
    Wrapped {
        #[serde(rename = "idMap")]
        id_map: HashMap<String, CommentTarget>,
    },
    Bare(HashMap<String, CommentTarget>),
}

/// Immutable container id -> target lookup, loaded once.
#[derive(Debug, Clone, Default)]
pub struct TargetResolver {
    map: HashMap<ContainerId, CommentTarget>,
}

impl TargetResolver {
    pub fn new(map: HashMap<ContainerId, CommentTarget>) -> Self {
        Self { map }
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let parsed: TargetMapFile =
            serde_json::from_str(raw).context("failed to parse comment target map")?;
        let map = match parsed {
            TargetMapFile::Wrapped { id_map } => id_map,
            TargetMapFile::Bare(map) => map,
        };
        Ok(Self::new(
            map.into_iter()
                .map(|(id, target)| (ContainerId(id), target))
                .collect(),
        ))
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read comment target map '{}'", path.display()))?;
        Self::from_json(&raw)
    }

    /// Never fails: ids missing from the table resolve to the unknown target.
    pub fn resolve(&self, container: &ContainerId) -> CommentTarget {
        self.map
            .get(container)
            .cloned()
            .unwrap_or_else(CommentTarget::unknown)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Containers rendered for `entity`, i.e. the ones a re-render invalidates.
    pub fn containers_for(&self, entity: &ContentEntity) -> Vec<ContainerId> {
        let (kinds, name, fixed): (&[TargetKind], &str, Option<ContainerId>) = match entity {
            ContentEntity::Class(name) => {
                (&[TargetKind::Class, TargetKind::Member][..], name.as_str(), None)
            }
            ContentEntity::Guide(name) => (
                &[TargetKind::Guide][..],
                name.as_str(),
                Some(ContainerId(format!("guide-{name}"))),
            ),
            ContentEntity::Video(name) => (
                &[TargetKind::Video][..],
                name.as_str(),
                Some(ContainerId(format!("video-{name}"))),
            ),
        };

        let mut ids: Vec<ContainerId> = self
            .map
            .iter()
            .filter(|(_, target)| kinds.contains(&target.kind) && target.name == name)
            .map(|(id, _)| id.clone())
            .collect();
        if let Some(fixed) = fixed {
            if !ids.contains(&fixed) {
                ids.push(fixed);
            }
        }
        ids.sort();
        ids
    }
}
