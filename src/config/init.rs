// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates edgefn.yml template files.

use std::path::Path;

use crate::error::{Error, Result};
use crate::types::ProjectRef;

use super::CONFIG_FILENAME;

pub fn init_config(dir: &Path, project_ref: Option<&str>, force: bool) -> Result<()> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    let project_ref = project_ref
        .map(ProjectRef::new)
        .transpose()
        .map_err(|e| Error::InvalidConfig(e.to_string()))?;

    let yaml = generate_template_yaml(project_ref.as_ref());
    std::fs::write(&config_path, yaml)?;

    Ok(())
}

fn generate_template_yaml(project_ref: Option<&ProjectRef>) -> String {
    let project_ref = match project_ref {
        Some(r) => format!("project_ref: {r}"),
        None => "# project_ref: abcdefghijklmnopqrst".to_string(),
    };
    format!(
        r#"{project_ref}
functions_dir: functions
max_jobs: 1
bundler:
  mode: native
  runtime_bin: edge-runtime
# functions:
#   hello:
#     verify_jwt: true
#     import_map: functions/hello/deno.json
#     static_files: ["functions/hello/assets/*"]
"#
    )
}
