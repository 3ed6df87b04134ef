//! Update preview: which objects an update would add, remove, or keep.

use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

use similar::{ChangeTag, TextDiff};

use crate::error::LoaderError;
use crate::plugins::LoaderProfile;
use crate::registry::find_root;
use crate::scene::{LibraryEntry, ObjectKind, SceneGraph};

use pype_core::types::ContainerMetadata;

/// Object names (without the group prefix) compared between the loaded
/// container and a candidate library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerDiff {
    pub object_name: String,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub kept: Vec<String>,
}

impl ContainerDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    /// Unified diff of the sorted name lists.
    pub fn unified(&self, new_libpath: &str) -> String {
        let mut old: Vec<&str> = self.kept.iter().chain(&self.removed).map(String::as_str).collect();
        let mut new: Vec<&str> = self.kept.iter().chain(&self.added).map(String::as_str).collect();
        old.sort_unstable();
        new.sort_unstable();
        let old = old.iter().map(|n| format!("{n}\n")).collect::<String>();
        let new = new.iter().map(|n| format!("{n}\n")).collect::<String>();
        TextDiff::from_lines(&old, &new)
            .unified_diff()
            .header(&self.object_name, new_libpath)
            .context_radius(3)
            .to_string()
    }
}

/// Names the load pass would create from `entries`: allowed kinds under the
/// source root (walked the same way as loading) plus every curve.
fn names_from_library(profile: &LoaderProfile, entries: &[LibraryEntry]) -> Vec<String> {
    let mut children: BTreeMap<&str, Vec<&LibraryEntry>> = BTreeMap::new();
    for entry in entries {
        if let Some(parent) = &entry.parent {
            children.entry(parent.as_str()).or_default().push(entry);
        }
    }
    let Some(source_root) = entries
        .iter()
        .find(|e| e.kind == ObjectKind::Empty && e.is_container)
    else {
        return Vec::new();
    };

    let mut names = Vec::new();
    let mut queue: VecDeque<&LibraryEntry> = children
        .get(source_root.name.as_str())
        .cloned()
        .unwrap_or_default()
        .into();
    while let Some(entry) = queue.pop_front() {
        if profile.allows(entry.kind) {
            names.push(entry.name.clone());
            if let Some(kids) = children.get(entry.name.as_str()) {
                queue.extend(kids.iter().copied());
            }
        }
    }
    for entry in entries {
        if entry.kind == ObjectKind::Curve && !names.contains(&entry.name) {
            names.push(entry.name.clone());
        }
    }
    names.sort();
    names
}

/// Compare what `container` holds with what loading `new_libpath` would
/// produce. The scene is not modified.
pub fn diff_container<S: SceneGraph + ?Sized>(
    scene: &S,
    profile: &LoaderProfile,
    container: &ContainerMetadata,
    new_libpath: &Path,
) -> Result<ContainerDiff, LoaderError> {
    let root = find_root(scene, &container.object_name)
        .ok_or_else(|| LoaderError::ContainerNotLoaded(container.object_name.clone()))?;

    let prefix = format!("{}:", container.object_name);
    let mut current = Vec::new();
    let mut queue: VecDeque<_> = scene.children(root)?.into();
    while let Some(obj) = queue.pop_front() {
        let name = scene.object_name(obj)?;
        current.push(name.strip_prefix(&prefix).unwrap_or(&name).to_owned());
        queue.extend(scene.children(obj)?);
    }
    current.sort();

    let incoming = names_from_library(profile, &scene.peek_library(new_libpath)?);

    let old: Vec<&str> = current.iter().map(String::as_str).collect();
    let new: Vec<&str> = incoming.iter().map(String::as_str).collect();
    let mut diff = ContainerDiff {
        object_name: container.object_name.clone(),
        ..ContainerDiff::default()
    };
    for change in TextDiff::from_slices(&old, &new).iter_all_changes() {
        let name = change.value().to_owned();
        match change.tag() {
            ChangeTag::Equal => diff.kept.push(name),
            ChangeTag::Delete => diff.removed.push(name),
            ChangeTag::Insert => diff.added.push(name),
        }
    }
    Ok(diff)
}
