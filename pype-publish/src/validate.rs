//! Document checks run before anything is committed.

use serde_json::Value;

use pype_core::types::{DocType, HERO_VERSION_SCHEMA, REPRESENTATION_SCHEMA};

use crate::error::PublishError;

fn invalid(kind: &'static str, doc: &Value, reason: impl Into<String>) -> PublishError {
    PublishError::InvalidDocument {
        kind,
        id: doc
            .get("_id")
            .and_then(Value::as_str)
            .unwrap_or("<missing>")
            .to_owned(),
        reason: reason.into(),
    }
}

fn require_str<'a>(kind: &'static str, doc: &'a Value, key: &str) -> Result<&'a str, PublishError> {
    match doc.get(key).and_then(Value::as_str) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(invalid(kind, doc, format!("missing \"{key}\""))),
    }
}

fn require_constant(
    kind: &'static str,
    doc: &Value,
    key: &str,
    expected: &str,
) -> Result<(), PublishError> {
    let found = require_str(kind, doc, key)?;
    if found != expected {
        return Err(invalid(
            kind,
            doc,
            format!("\"{key}\" is \"{found}\", expected \"{expected}\""),
        ));
    }
    Ok(())
}

pub fn validate_hero_version(doc: &Value) -> Result<(), PublishError> {
    const KIND: &str = "hero_version";
    require_str(KIND, doc, "_id")?;
    require_constant(KIND, doc, "type", DocType::HeroVersion.as_str())?;
    require_constant(KIND, doc, "schema", HERO_VERSION_SCHEMA)?;
    require_str(KIND, doc, "version_id")?;
    require_str(KIND, doc, "parent")?;
    Ok(())
}

pub fn validate_representation(doc: &Value) -> Result<(), PublishError> {
    const KIND: &str = "representation";
    require_str(KIND, doc, "_id")?;
    require_constant(KIND, doc, "type", DocType::Representation.as_str())?;
    require_constant(KIND, doc, "schema", REPRESENTATION_SCHEMA)?;
    require_str(KIND, doc, "parent")?;
    require_str(KIND, doc, "name")?;
    if !doc.get("context").map_or(false, Value::is_object) {
        return Err(invalid(KIND, doc, "\"context\" must be an object"));
    }
    let path = doc.get("data").and_then(|d| d.get("path")).and_then(Value::as_str);
    if path.map_or(true, str::is_empty) {
        return Err(invalid(KIND, doc, "missing \"data.path\""));
    }
    let files = doc.get("files").and_then(Value::as_array);
    for file in files.into_iter().flatten() {
        if file.get("path").and_then(Value::as_str).map_or(true, str::is_empty) {
            return Err(invalid(KIND, doc, "file entry without \"path\""));
        }
    }
    Ok(())
}
