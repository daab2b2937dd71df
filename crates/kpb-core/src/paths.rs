use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---------------------------------------------------------------------------
// File constants
// ---------------------------------------------------------------------------

pub const PLAYBOOK_FILE: &str = "kustomizationplaybook.yaml";

/// The generated kustomization. It must not exist before a run: kustomize
/// picks this name first when several kustomization files are present.
pub const KUSTOMIZATION_FILE: &str = "kustomization.yaml";

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

pub fn playbook_path(dir: &Path) -> PathBuf {
    dir.join(PLAYBOOK_FILE)
}

pub fn kustomization_path(dir: &Path) -> PathBuf {
    dir.join(KUSTOMIZATION_FILE)
}

// ---------------------------------------------------------------------------
// DNS-1123 subdomain validation
// ---------------------------------------------------------------------------

const DNS1123_SUBDOMAIN_MAX_LEN: usize = 253;

static DNS1123_LABEL_RE: OnceLock<Regex> = OnceLock::new();

fn dns1123_label_re() -> &'static Regex {
    DNS1123_LABEL_RE.get_or_init(|| {
        Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex is valid")
    })
}

/// Check `name` against the Kubernetes DNS-1123 subdomain rules.
/// Returns the reason when the name is rejected.
pub fn validate_dns1123_subdomain(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("must not be empty".to_string());
    }
    if name.len() > DNS1123_SUBDOMAIN_MAX_LEN {
        return Err(format!(
            "must be no more than {DNS1123_SUBDOMAIN_MAX_LEN} characters"
        ));
    }
    if !name.split('.').all(|label| dns1123_label_re().is_match(label)) {
        return Err(
            "must consist of lower case alphanumeric characters, '-' or '.', \
             and must start and end with an alphanumeric character"
                .to_string(),
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
