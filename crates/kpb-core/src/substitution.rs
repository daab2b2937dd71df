//! `envsubst`-style variable substitution over a component's kustomization.
//!
//! The kustomization is serialized to YAML text, every `${VAR}`,
//! `${VAR:-default}` and `$VAR` reference is replaced, and the text is parsed
//! back. Unset variables expand to the default or to the empty string.

use regex::{Captures, Regex};
use std::collections::HashMap;
use std::path::Path;
use std::sync::OnceLock;

use crate::error::{PlaybookError, Result};
use crate::playbook::Manifest;

static VAR_RE: OnceLock<Regex> = OnceLock::new();

fn var_re() -> &'static Regex {
    VAR_RE.get_or_init(|| {
        Regex::new(
            r"\$(?:\{(?P<braced>[A-Za-z_][A-Za-z0-9_]*)(?::-(?P<default>[^}]*))?\}|(?P<bare>[A-Za-z_][A-Za-z0-9_]*))",
        )
        .expect("static regex is valid")
    })
}

/// Substitute variable references in `manifest`.
///
/// A manifest without references is returned as-is. The error string
/// describes why the substituted text no longer parses.
pub fn substitute(
    manifest: &Manifest,
    vars: &HashMap<String, String>,
) -> std::result::Result<Manifest, String> {
    let text = serde_yaml::to_string(manifest).map_err(|e| e.to_string())?;
    if !var_re().is_match(&text) {
        return Ok(manifest.clone());
    }

    let replaced = expand(&text, vars);
    serde_yaml::from_str::<Manifest>(&replaced)
        .map_err(|e| format!("substituted kustomization is no longer a valid mapping: {e}"))
}

fn expand(text: &str, vars: &HashMap<String, String>) -> String {
    var_re()
        .replace_all(text, |caps: &Captures| {
            let name = caps
                .name("braced")
                .or_else(|| caps.name("bare"))
                .map(|m| m.as_str())
                .unwrap_or_default();
            match vars.get(name) {
                Some(value) => value.clone(),
                None => {
                    let default = caps.name("default").map(|m| m.as_str()).unwrap_or("");
                    tracing::debug!(variable = name, default, "variable not set");
                    default.to_string()
                }
            }
        })
        .into_owned()
}

/// Read substitution variables from a dotenv-style file.
pub fn load_variables(path: &Path) -> Result<HashMap<String, String>> {
    if !path.exists() {
        return Err(PlaybookError::VariablesFileNotFound(path.to_path_buf()));
    }
    let iter = dotenvy::from_path_iter(path).map_err(|e| dotenv_error(path, e))?;
    let mut vars = HashMap::new();
    for item in iter {
        let (key, value) = item.map_err(|e| dotenv_error(path, e))?;
        vars.insert(key, value);
    }
    tracing::debug!(count = vars.len(), path = %path.display(), "loaded variables");
    Ok(vars)
}

fn dotenv_error(path: &Path, err: dotenvy::Error) -> PlaybookError {
    match err {
        dotenvy::Error::Io(e) if e.kind() == std::io::ErrorKind::NotFound => {
            PlaybookError::VariablesFileNotFound(path.to_path_buf())
        }
        dotenvy::Error::Io(e) => PlaybookError::Io(e),
        other => PlaybookError::Parse(format!("{}: {other}", path.display())),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
