//! Pipeline settings loaded from a YAML file.
//!
//! Every section and every field has a default, so an empty or missing file
//! yields a usable configuration:
//!
//! ```yaml
//! hero:
//!   ignored_representation_names: [thumbnail]
//!   template_name_profiles:
//!     - families: [render]
//!       template_name: hero_render
//! loader:
//!   valid_extensions: [".blend", ".abc"]
//! ftrack:
//!   unchangeable_remove_policy: report_only
//! sync_server:
//!   max_tries: 5
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Template key used when no profile matches.
pub const DEFAULT_HERO_TEMPLATE: &str = "hero";

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSettings {
    pub hero: HeroSettings,
    pub loader: LoaderSettings,
    pub ftrack: FtrackSettings,
    pub sync_server: SyncServerSettings,
}

/// Filter row selecting the anatomy template used for hero publishes.
///
/// An empty list matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TemplateNameProfile {
    pub families: Vec<String>,
    pub task_names: Vec<String>,
    pub task_types: Vec<String>,
    pub hosts: Vec<String>,
    pub template_name: String,
}

impl TemplateNameProfile {
    /// `None` when the profile excludes the context, otherwise the number of
    /// non-empty criteria that matched.
    fn score(&self, family: &str, task_name: &str, task_type: &str, host: &str) -> Option<usize> {
        let mut score = 0;
        for (allowed, value) in [
            (&self.families, family),
            (&self.task_names, task_name),
            (&self.task_types, task_type),
            (&self.hosts, host),
        ] {
            if allowed.is_empty() {
                continue;
            }
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(value)) {
                return None;
            }
            score += 1;
        }
        Some(score)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeroSettings {
    /// Compared case-insensitively against representation names.
    pub ignored_representation_names: Vec<String>,
    pub template_name_profiles: Vec<TemplateNameProfile>,
    /// Context keys copied from the source representation into hero
    /// representation documents.
    pub db_representation_context_keys: Vec<String>,
}

impl Default for HeroSettings {
    fn default() -> Self {
        Self {
            ignored_representation_names: Vec::new(),
            template_name_profiles: Vec::new(),
            db_representation_context_keys: [
                "project",
                "asset",
                "task",
                "subset",
                "representation",
                "family",
                "hierarchy",
                "username",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl HeroSettings {
    /// Pick the template key for a publish context. The most specific
    /// matching profile wins; ties go to the first one listed.
    pub fn template_name_for(
        &self,
        family: &str,
        task_name: &str,
        task_type: &str,
        host: &str,
    ) -> &str {
        let mut best: Option<(usize, &TemplateNameProfile)> = None;
        for profile in &self.template_name_profiles {
            let Some(score) = profile.score(family, task_name, task_type, host) else {
                continue;
            };
            if best.map_or(true, |(s, _)| score > s) {
                best = Some((score, profile));
            }
        }
        match best {
            Some((_, profile)) if !profile.template_name.is_empty() => &profile.template_name,
            _ => DEFAULT_HERO_TEMPLATE,
        }
    }

    pub fn is_ignored(&self, representation_name: &str) -> bool {
        self.ignored_representation_names
            .iter()
            .any(|n| n.eq_ignore_ascii_case(representation_name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderSettings {
    pub valid_extensions: Vec<String>,
    /// `None` enables every built-in loader.
    pub enabled_loaders: Option<Vec<String>>,
    pub enabled_creators: Option<Vec<String>>,
}

impl Default for LoaderSettings {
    fn default() -> Self {
        Self {
            valid_extensions: [".blend", ".json", ".abc", ".fbx"]
                .into_iter()
                .map(String::from)
                .collect(),
            enabled_loaders: None,
            enabled_creators: None,
        }
    }
}

/// What to do when the tracker removes an entity whose asset cannot be
/// archived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnchangeableRemovePolicy {
    /// Recreate the tracker entity and rebind the existing asset to it.
    #[default]
    Recreate,
    /// Leave both sides untouched and report a warning.
    ReportOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FtrackSettings {
    /// Changed keys that never trigger an update.
    pub ignore_keys: Vec<String>,
    /// Entity types skipped entirely (compared case-insensitively).
    pub ignore_entity_types: Vec<String>,
    pub interest_entity_classes: Vec<String>,
    /// Name pattern per document schema, overriding the default.
    pub name_patterns: BTreeMap<String, String>,
    pub unchangeable_remove_policy: UnchangeableRemovePolicy,
}

impl Default for FtrackSettings {
    fn default() -> Self {
        Self {
            ignore_keys: vec!["statusid".into(), "thumbid".into()],
            ignore_entity_types: vec!["milestone".into()],
            interest_entity_classes: vec!["show".into(), "task".into()],
            name_patterns: BTreeMap::new(),
            unchangeable_remove_policy: UnchangeableRemovePolicy::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncServerSettings {
    pub default_priority: i64,
    /// Attempts after which a file counts as failed.
    pub max_tries: u32,
    pub page_size: usize,
}

impl Default for SyncServerSettings {
    fn default() -> Self {
        Self {
            default_priority: 50,
            max_tries: 3,
            page_size: 20,
        }
    }
}

// ---------------------------------------------------------------------------
// Load / validate
// ---------------------------------------------------------------------------

impl PipelineSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.sync_server.max_tries == 0 {
            return Err(invalid("sync_server.max_tries", "must be at least 1"));
        }
        if self.sync_server.page_size == 0 {
            return Err(invalid("sync_server.page_size", "must be at least 1"));
        }
        for ext in &self.loader.valid_extensions {
            if !ext.starts_with('.') {
                return Err(invalid(
                    "loader.valid_extensions",
                    &format!("{ext:?} must start with a dot"),
                ));
            }
        }
        for (schema, pattern) in &self.ftrack.name_patterns {
            if pattern.is_empty() {
                return Err(invalid(
                    &format!("ftrack.name_patterns.{schema}"),
                    "pattern is empty",
                ));
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> SettingsError {
    SettingsError::Invalid {
        key: key.to_owned(),
        reason: reason.to_owned(),
    }
}

/// Load and validate settings from `path`. A missing file yields defaults.
pub fn load_at(path: &Path) -> Result<PipelineSettings, SettingsError> {
    if !path.exists() {
        tracing::debug!("no settings at {}, using defaults", path.display());
        return Ok(PipelineSettings::default());
    }
    let contents = std::fs::read_to_string(path)?;
    let settings: PipelineSettings = if contents.trim().is_empty() {
        PipelineSettings::default()
    } else {
        serde_yaml::from_str(&contents).map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })?
    };
    settings.validate()?;
    Ok(settings)
}
