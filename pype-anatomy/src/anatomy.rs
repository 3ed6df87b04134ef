//! Project anatomy: named roots plus tera path templates.
//!
//! # File format
//!
//! ```yaml
//! roots:
//!   work: /mnt/projects
//! templates:
//!   hero:
//!     folder: "{{ root.work }}/{{ project.name }}/{{ asset }}/publish/{{ subset }}/hero"
//!     path: "{{ root.work }}/{{ project.name }}/{{ asset }}/publish/{{ subset }}/hero/{{ subset }}_hero.{{ ext }}"
//!     frame_padding: 4
//! ```
//!
//! Each template part is registered with tera as `<key>/folder` and
//! `<key>/path`. Rendering is strict: an undefined key is an error.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tera::{Context, Tera};

use crate::data::TemplateData;
use crate::error::{io_err, AnatomyError};

/// Token substituted for `frame` to split a sequence path into head and tail.
pub const FRAME_SPLITTER: &str = "_-_FRAME_SPLIT_-_";

fn default_padding() -> usize {
    4
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnatomyTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default = "default_padding")]
    pub frame_padding: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnatomyConfig {
    #[serde(default)]
    pub roots: BTreeMap<String, String>,
    #[serde(default)]
    pub templates: BTreeMap<String, AnatomyTemplate>,
}

/// Filled parts of one template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilledTemplate {
    pub folder: Option<String>,
    pub path: Option<String>,
}

/// Compiled anatomy, ready to fill templates.
pub struct Anatomy {
    config: AnatomyConfig,
    tera: Tera,
}

impl std::fmt::Debug for Anatomy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Anatomy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Anatomy {
    pub fn new(config: AnatomyConfig) -> Result<Self, AnatomyError> {
        let mut raw = Vec::new();
        for (key, template) in &config.templates {
            if let Some(folder) = &template.folder {
                raw.push((format!("{key}/folder"), folder.clone()));
            }
            if let Some(path) = &template.path {
                raw.push((format!("{key}/path"), path.clone()));
            }
        }
        let mut tera = Tera::default();
        tera.add_raw_templates(raw)?;
        Ok(Self { config, tera })
    }

    /// Load an anatomy from a YAML file.
    pub fn load_at(path: &Path) -> Result<Self, AnatomyError> {
        let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
        let config: AnatomyConfig =
            serde_yaml::from_str(&contents).map_err(|source| AnatomyError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        tracing::debug!(
            "loaded anatomy from {} ({} template(s))",
            path.display(),
            config.templates.len()
        );
        Self::new(config)
    }

    pub fn config(&self) -> &AnatomyConfig {
        &self.config
    }

    pub fn has_template(&self, key: &str) -> bool {
        self.config.templates.contains_key(key)
    }

    pub fn template(&self, key: &str) -> Result<&AnatomyTemplate, AnatomyError> {
        self.config
            .templates
            .get(key)
            .ok_or_else(|| AnatomyError::MissingTemplate { key: key.to_owned() })
    }

    /// Raw (unfilled) `path` template.
    pub fn path_template(&self, key: &str) -> Result<&str, AnatomyError> {
        self.template(key)?
            .path
            .as_deref()
            .ok_or_else(|| AnatomyError::MissingPath { key: key.to_owned() })
    }

    pub fn frame_padding(&self, key: &str) -> Result<usize, AnatomyError> {
        Ok(self.template(key)?.frame_padding)
    }

    fn context(&self, data: &TemplateData) -> Result<Context, AnatomyError> {
        let mut map = data.clone().into_map();
        let roots: serde_json::Map<String, Value> = self
            .config
            .roots
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        map.insert("root".into(), Value::Object(roots));
        Ok(Context::from_value(Value::Object(map))?)
    }

    /// Fill every part of the template registered under `key`.
    pub fn format(&self, key: &str, data: &TemplateData) -> Result<FilledTemplate, AnatomyError> {
        let template = self.template(key)?;
        let ctx = self.context(data)?;
        let folder = match template.folder {
            Some(_) => Some(self.tera.render(&format!("{key}/folder"), &ctx)?),
            None => None,
        };
        let path = match template.path {
            Some(_) => Some(self.tera.render(&format!("{key}/path"), &ctx)?),
            None => None,
        };
        Ok(FilledTemplate { folder, path })
    }

    /// Fill only the `path` part.
    pub fn format_path(&self, key: &str, data: &TemplateData) -> Result<String, AnatomyError> {
        self.path_template(key)?;
        let ctx = self.context(data)?;
        Ok(self.tera.render(&format!("{key}/path"), &ctx)?)
    }

    /// Publish directory for `key`: the filled `folder`, or the parent of the
    /// filled `path` for templates without a folder part.
    pub fn publish_folder(&self, key: &str, data: &TemplateData) -> Result<String, AnatomyError> {
        let template = self.template(key)?;
        if template.folder.is_some() {
            let ctx = self.context(data)?;
            return Ok(self.tera.render(&format!("{key}/folder"), &ctx)?);
        }
        let data = data.clone().with("frame", "FRAME_TEMP");
        let path = self.format_path(key, &data)?;
        let folder = Path::new(&path)
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(folder)
    }

    /// Head and tail of the filled `path` around the frame number.
    pub fn frame_parts(&self, key: &str, data: &TemplateData) -> Result<(String, String), AnatomyError> {
        if !self.used_keys(key)?.contains("frame") {
            return Err(AnatomyError::NoFramePlaceholder { key: key.to_owned() });
        }
        let data = data.clone().with("frame", FRAME_SPLITTER);
        let filled = self.format_path(key, &data)?;
        match filled.split_once(FRAME_SPLITTER) {
            Some((head, tail)) => Ok((head.to_owned(), tail.to_owned())),
            None => Err(AnatomyError::NoFramePlaceholder { key: key.to_owned() }),
        }
    }

    /// Top-level data keys referenced by the `path` template, `root` excluded.
    pub fn used_keys(&self, key: &str) -> Result<BTreeSet<String>, AnatomyError> {
        let source = self.path_template(key)?;
        let mut keys = BTreeSet::new();
        let mut rest = source;
        while let Some(start) = rest.find("{{") {
            let after = &rest[start + 2..];
            let Some(end) = after.find("}}") else {
                break;
            };
            let expr = after[..end].trim_start();
            let ident: String = expr
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
                .collect();
            if !ident.is_empty() && ident != "root" {
                keys.insert(ident);
            }
            rest = &after[end + 2..];
        }
        Ok(keys)
    }

    /// Replace the longest matching root prefix of `path` with its
    /// `{root[name]}` placeholder. `None` when no root matches.
    pub fn rootless(&self, path: &str) -> Option<String> {
        let normalized = path.replace('\\', "/");
        self.config
            .roots
            .iter()
            .filter_map(|(name, root)| {
                let root = root.replace('\\', "/");
                let root = root.trim_end_matches('/');
                let rest = normalized.strip_prefix(root)?;
                if !(rest.is_empty() || rest.starts_with('/')) {
                    return None;
                }
                Some((root.len(), format!("{{root[{name}]}}{rest}")))
            })
            .max_by_key(|(len, _)| *len)
            .map(|(_, rootless)| rootless)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn anatomy() -> Anatomy {
        let mut templates = BTreeMap::new();
        templates.insert(
            "hero".to_string(),
            AnatomyTemplate {
                folder: Some("{{ root.work }}/{{ project.name }}/{{ asset }}/{{ subset }}/hero".into()),
                path: Some(
                    "{{ root.work }}/{{ project.name }}/{{ asset }}/{{ subset }}/hero/{{ subset }}_hero.{{ frame }}.{{ ext }}"
                        .into(),
                ),
                frame_padding: 4,
            },
        );
        templates.insert(
            "simple".to_string(),
            AnatomyTemplate {
                folder: None,
                path: Some("{{ root.work }}/{{ asset }}/{{ subset }}.{{ ext }}".into()),
                frame_padding: 3,
            },
        );
        let mut roots = BTreeMap::new();
        roots.insert("work".to_string(), "/mnt/work".to_string());
        roots.insert("deep".to_string(), "/mnt/work/deep".to_string());
        Anatomy::new(AnatomyConfig { roots, templates }).unwrap()
    }

    fn data() -> TemplateData {
        TemplateData::new()
            .with("project", serde_json::json!({"name": "demo", "code": "dm"}))
            .with("asset", "hero")
            .with("subset", "rigMain")
            .with("ext", "exr")
    }

    #[test]
    fn frame_parts_split_on_splitter() {
        let (head, tail) = anatomy().frame_parts("hero", &data()).unwrap();
        assert_eq!(head, "/mnt/work/demo/hero/rigMain/hero/rigMain_hero.");
        assert_eq!(tail, ".exr");
    }

    #[test]
    fn publish_folder_falls_back_to_path_parent() {
        let a = anatomy();
        assert_eq!(a.publish_folder("hero", &data()).unwrap(), "/mnt/work/demo/hero/rigMain/hero");
        assert_eq!(a.publish_folder("simple", &data()).unwrap(), "/mnt/work/hero");
    }

    #[test]
    fn frame_parts_without_frame_key_fails() {
        let err = anatomy().frame_parts("simple", &data()).unwrap_err();
        assert!(matches!(err, AnatomyError::NoFramePlaceholder { .. }));
    }

    #[test]
    fn undefined_key_is_an_error() {
        let err = anatomy()
            .format_path("simple", &TemplateData::new().with("asset", "a"))
            .unwrap_err();
        assert!(matches!(err, AnatomyError::Tera(_)));
    }

    #[test]
    fn used_keys_skip_root() {
        let keys = anatomy().used_keys("hero").unwrap();
        let keys: Vec<_> = keys.into_iter().collect();
        assert_eq!(keys, vec!["asset", "ext", "frame", "project", "subset"]);
    }

    #[test]
    fn rootless_prefers_longest_root() {
        let a = anatomy();
        assert_eq!(
            a.rootless("/mnt/work/deep/x.exr").as_deref(),
            Some("{root[deep]}/x.exr")
        );
        assert_eq!(
            a.rootless("/mnt/work/a/x.exr").as_deref(),
            Some("{root[work]}/a/x.exr")
        );
        assert_eq!(a.rootless("/mnt/workshop/x"), None);
    }
}
