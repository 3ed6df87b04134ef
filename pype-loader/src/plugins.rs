//! Plugin registry: loader profiles and creators.
//!
//! The registry is built once by the host bootstrap ([`PluginRegistry::init`])
//! and handed to the loader engine explicitly. [`PluginRegistry::refresh`]
//! rebuilds it after a settings change.

use std::collections::BTreeMap;

use serde_json::Value;

use pype_core::settings::LoaderSettings;
use pype_core::types::{InstanceMetadata, AVALON_INSTANCE_ID};

use crate::error::LoaderError;
use crate::registry::{asset_name, AVALON_INSTANCES};
use crate::scene::{AvalonProperty, ObjectHandle, ObjectKind, SceneGraph};

/// Static description of a loader: what it applies to and which object
/// kinds it relinks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderProfile {
    pub name: &'static str,
    pub label: &'static str,
    pub families: &'static [&'static str],
    pub representations: &'static [&'static str],
    /// Kinds walked and made local in the main hierarchy pass.
    pub allowed_kinds: &'static [ObjectKind],
    /// Keep the armature's animation action across updates.
    pub preserves_action: bool,
}

impl LoaderProfile {
    pub fn applies_to(&self, family: &str, representation: &str) -> bool {
        self.families.iter().any(|f| *f == family)
            && self.representations.iter().any(|r| *r == representation)
    }

    pub fn allows(&self, kind: ObjectKind) -> bool {
        self.allowed_kinds.contains(&kind)
    }
}

pub const BLEND_RIG_LOADER: LoaderProfile = LoaderProfile {
    name: "BlendRigLoader",
    label: "Link Rig",
    families: &["rig"],
    representations: &["blend"],
    allowed_kinds: &[ObjectKind::Armature, ObjectKind::Mesh],
    preserves_action: true,
};

pub const BLEND_MODEL_LOADER: LoaderProfile = LoaderProfile {
    name: "BlendModelLoader",
    label: "Link Model",
    families: &["model"],
    representations: &["blend"],
    allowed_kinds: &[ObjectKind::Mesh, ObjectKind::Empty],
    preserves_action: false,
};

pub const BUILTIN_LOADERS: &[LoaderProfile] = &[BLEND_RIG_LOADER, BLEND_MODEL_LOADER];

/// Options passed to a creator.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOptions {
    pub use_selection: bool,
    /// Name of the container root the instance belongs to.
    pub asset_group: Option<String>,
}

/// Creates publish instances in a scene.
pub trait Creator {
    fn name(&self) -> &'static str;
    fn family(&self) -> &'static str;

    /// Create the instance `subset` for `asset`. `data` is merged into the
    /// instance metadata (`dependencies` is the only key read).
    fn create(
        &self,
        scene: &mut dyn SceneGraph,
        subset: &str,
        asset: &str,
        options: &CreateOptions,
        data: &BTreeMap<String, Value>,
    ) -> Result<ObjectHandle, LoaderError>;
}

/// Creates the `animation` instance that depends on a loaded rig.
#[derive(Debug, Clone, Copy, Default)]
pub struct CreateAnimation;

impl Creator for CreateAnimation {
    fn name(&self) -> &'static str {
        "CreateAnimation"
    }

    fn family(&self) -> &'static str {
        "animation"
    }

    fn create(
        &self,
        scene: &mut dyn SceneGraph,
        subset: &str,
        asset: &str,
        options: &CreateOptions,
        data: &BTreeMap<String, Value>,
    ) -> Result<ObjectHandle, LoaderError> {
        let name = asset_name(asset, subset, None);
        if scene.object_by_name(&name).is_some() {
            return Err(LoaderError::DuplicateInstance(name));
        }
        let instance = scene.create_empty(&name)?;
        scene.link_to_collection(instance, AVALON_INSTANCES)?;
        let metadata = InstanceMetadata {
            id: AVALON_INSTANCE_ID.to_owned(),
            family: self.family().to_owned(),
            asset: asset.to_owned(),
            subset: subset.to_owned(),
            dependencies: data
                .get("dependencies")
                .and_then(Value::as_str)
                .map(str::to_owned),
            asset_group: options.asset_group.clone(),
        };
        scene.set_avalon(instance, AvalonProperty::Instance(metadata))?;
        tracing::info!("created {} instance {name}", self.family());
        Ok(instance)
    }
}

/// Loaders and creators available to a host session.
pub struct PluginRegistry {
    loaders: Vec<LoaderProfile>,
    creators: Vec<Box<dyn Creator>>,
    valid_extensions: Vec<String>,
}

impl std::fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("loaders", &self.loaders.iter().map(|l| l.name).collect::<Vec<_>>())
            .field("creators", &self.creators.iter().map(|c| c.name()).collect::<Vec<_>>())
            .field("valid_extensions", &self.valid_extensions)
            .finish()
    }
}

fn enabled(name: &str, filter: &Option<Vec<String>>) -> bool {
    filter
        .as_ref()
        .map_or(true, |names| names.iter().any(|n| n == name))
}

impl PluginRegistry {
    /// Build the registry from the built-in plugins allowed by `settings`.
    pub fn init(settings: &LoaderSettings) -> Self {
        let loaders: Vec<LoaderProfile> = BUILTIN_LOADERS
            .iter()
            .filter(|l| enabled(l.name, &settings.enabled_loaders))
            .cloned()
            .collect();
        let mut creators: Vec<Box<dyn Creator>> = Vec::new();
        if enabled(CreateAnimation.name(), &settings.enabled_creators) {
            creators.push(Box::new(CreateAnimation));
        }
        tracing::debug!(
            "plugin registry: {} loader(s), {} creator(s)",
            loaders.len(),
            creators.len()
        );
        Self {
            loaders,
            creators,
            valid_extensions: settings
                .valid_extensions
                .iter()
                .map(|e| e.to_lowercase())
                .collect(),
        }
    }

    pub fn refresh(&mut self, settings: &LoaderSettings) {
        *self = Self::init(settings);
    }

    pub fn loaders(&self) -> &[LoaderProfile] {
        &self.loaders
    }

    pub fn loader(&self, name: &str) -> Option<&LoaderProfile> {
        self.loaders.iter().find(|l| l.name == name)
    }

    pub fn loaders_for(&self, family: &str, representation: &str) -> Vec<&LoaderProfile> {
        self.loaders
            .iter()
            .filter(|l| l.applies_to(family, representation))
            .collect()
    }

    pub fn creator(&self, name: &str) -> Option<&dyn Creator> {
        self.creators
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    /// Extensions (lowercase, with leading dot) a loader may update to.
    pub fn valid_extensions(&self) -> &[String] {
        &self.valid_extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryScene;

    #[test]
    fn loaders_for_matches_family_and_representation() {
        let registry = PluginRegistry::init(&LoaderSettings::default());
        let found: Vec<_> = registry
            .loaders_for("rig", "blend")
            .iter()
            .map(|l| l.name)
            .collect();
        assert_eq!(found, vec!["BlendRigLoader"]);
        assert!(registry.loaders_for("rig", "abc").is_empty());
    }

    #[test]
    fn refresh_applies_enabled_filters() {
        let mut registry = PluginRegistry::init(&LoaderSettings::default());
        assert!(registry.creator("CreateAnimation").is_some());
        let settings = LoaderSettings {
            enabled_loaders: Some(vec!["BlendModelLoader".into()]),
            enabled_creators: Some(vec![]),
            ..LoaderSettings::default()
        };
        registry.refresh(&settings);
        assert!(registry.loader("BlendRigLoader").is_none());
        assert!(registry.loader("BlendModelLoader").is_some());
        assert!(registry.creator("CreateAnimation").is_none());
    }

    #[test]
    fn create_animation_rejects_duplicate_instance() {
        let mut scene = MemoryScene::new();
        let data = BTreeMap::from([("dependencies".to_string(), Value::from("r1"))]);
        let options = CreateOptions::default();
        CreateAnimation
            .create(&mut scene, "hero_01_animation", "sh010", &options, &data)
            .unwrap();
        let err = CreateAnimation
            .create(&mut scene, "hero_01_animation", "sh010", &options, &data)
            .unwrap_err();
        assert!(matches!(err, LoaderError::DuplicateInstance(_)));
    }
}
