// ABOUTME: Custom serde deserializers for config types.
// ABOUTME: Validates project refs while parsing.

use serde::Deserialize;

use crate::types::ProjectRef;

pub fn deserialize_project_ref<'de, D>(deserializer: D) -> Result<Option<ProjectRef>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value: Option<String> = Option::deserialize(deserializer)?;
    match value {
        None => Ok(None),
        Some(s) if s.trim().is_empty() => Ok(None),
        Some(s) => ProjectRef::new(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}
