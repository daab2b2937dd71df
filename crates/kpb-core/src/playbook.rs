use serde::Deserialize;
use std::collections::HashMap;
use thiserror::Error;

use crate::error::{PlaybookError, Result};
use crate::paths::validate_dns1123_subdomain;
use crate::substitution;

pub const API_VERSION: &str = "kustomizeplaybook.world-direct.at/v1beta1";
pub const KIND: &str = "KustomizationPlaybook";

/// A component's kustomization, forwarded verbatim to the manifest builder.
pub type Manifest = serde_yaml::Mapping;

// ---------------------------------------------------------------------------
// Playbook
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Playbook {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub prerequisites: Vec<Condition>,
    #[serde(default)]
    pub components: Vec<Component>,
}

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Component {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub depends_on: Vec<Dependency>,
    #[serde(default, rename = "kustomization")]
    pub manifest: Manifest,
    /// Run `${VAR}` substitution over the kustomization before building it.
    #[serde(default, rename = "envsubst")]
    pub substitute: bool,
    /// Unfulfilled apply conditions skip the component.
    #[serde(default)]
    pub apply_conditions: Vec<Condition>,
    /// Polled after apply; the run fails if they never hold.
    #[serde(default)]
    pub readiness_conditions: Vec<Condition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dependency {
    pub name: String,
}

// ---------------------------------------------------------------------------
// Condition
// ---------------------------------------------------------------------------

/// A single check against the cluster. Exactly one [`Check`] per condition;
/// documents that populate none or several are rejected while parsing.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawCondition")]
pub struct Condition {
    pub message: Option<String>,
    pub check: Check,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Check {
    CustomResourceDefinitionExists { name: String },
    ServiceReady { name: String, namespace: String },
    Compare { value: Operand, with: Operand },
}

impl Check {
    pub fn describe(&self) -> String {
        match self {
            Check::CustomResourceDefinitionExists { name } => {
                format!("customResourceDefinition {name}")
            }
            Check::ServiceReady { name, namespace } => format!("serviceReady {namespace}/{name}"),
            Check::Compare { value, with } => {
                format!("compare {} with {}", value.describe(), with.describe())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "RawOperand")]
pub enum Operand {
    Scalar(String),
    Object(ObjectRef),
}

impl Operand {
    fn describe(&self) -> String {
        match self {
            Operand::Scalar(s) => format!("'{s}'"),
            Operand::Object(o) => format!("{} {}/{}", o.kind, o.namespace, o.name),
        }
    }
}

/// A field of a live object, extracted by rendering `template` against the
/// object's full document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ObjectRef {
    pub api_version: String,
    pub kind: String,
    /// Empty for cluster-scoped objects, or to use the context's namespace.
    #[serde(default)]
    pub namespace: String,
    pub name: String,
    #[serde(alias = "goTemplate")]
    pub template: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawCondition {
    message: Option<String>,
    custom_resource_definition: Option<NameRef>,
    service_ready: Option<ServiceRef>,
    compare: Option<RawCompare>,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct NameRef {
    name: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ServiceRef {
    name: String,
    namespace: String,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCompare {
    value: Operand,
    with: Operand,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct RawOperand {
    scalar_value: Option<serde_yaml::Value>,
    object_value: Option<ObjectRef>,
}

impl TryFrom<RawCondition> for Condition {
    type Error = String;

    fn try_from(raw: RawCondition) -> std::result::Result<Self, Self::Error> {
        let mut checks = Vec::with_capacity(1);
        if let Some(crd) = raw.custom_resource_definition {
            checks.push(Check::CustomResourceDefinitionExists { name: crd.name });
        }
        if let Some(svc) = raw.service_ready {
            checks.push(Check::ServiceReady {
                name: svc.name,
                namespace: svc.namespace,
            });
        }
        if let Some(cmp) = raw.compare {
            checks.push(Check::Compare {
                value: cmp.value,
                with: cmp.with,
            });
        }

        if checks.len() != 1 {
            return Err(format!(
                "a condition must specify exactly one check \
                 (customResourceDefinition, serviceReady or compare), found {}",
                checks.len()
            ));
        }

        Ok(Condition {
            message: raw.message,
            check: checks.remove(0),
        })
    }
}

impl TryFrom<RawOperand> for Operand {
    type Error = String;

    fn try_from(raw: RawOperand) -> std::result::Result<Self, Self::Error> {
        match (raw.scalar_value, raw.object_value) {
            (Some(scalar), None) => scalar_text(scalar).map(Operand::Scalar),
            (None, Some(object)) => Ok(Operand::Object(object)),
            _ => Err("an operand must specify exactly one of scalarValue or objectValue".into()),
        }
    }
}

/// The textual form a scalar is compared by. No numeric coercion happens
/// later, so `1.0` and `1` stay different.
fn scalar_text(value: serde_yaml::Value) -> std::result::Result<String, String> {
    match value {
        serde_yaml::Value::String(s) => Ok(s),
        serde_yaml::Value::Number(n) => Ok(n.to_string()),
        serde_yaml::Value::Bool(b) => Ok(b.to_string()),
        other => Err(format!("scalarValue must be a scalar, got {other:?}")),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("apiVersion must be '{expected}', not '{found}'")]
    ApiVersion {
        expected: &'static str,
        found: String,
    },

    #[error("kind must be '{expected}', not '{found}'")]
    Kind {
        expected: &'static str,
        found: String,
    },

    #[error("invalid component name '{name}': {reason}")]
    InvalidName { name: String, reason: String },

    #[error("component name '{0}' is declared more than once")]
    DuplicateName(String),

    #[error("dependency '{dependency}' of component '{component}' is not defined")]
    UndefinedDependency {
        dependency: String,
        component: String,
    },

    #[error(
        "invalid ordering: dependency '{dependency}' of component '{component}' \
         must be declared before it"
    )]
    DependencyOrder {
        dependency: String,
        component: String,
    },
}

impl Playbook {
    pub fn parse(data: &[u8]) -> Result<Self> {
        serde_yaml::from_slice(data).map_err(|e| PlaybookError::Parse(e.to_string()))
    }

    /// Collect every structural problem; never stops at the first one.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        if self.api_version != API_VERSION {
            errors.push(ValidationError::ApiVersion {
                expected: API_VERSION,
                found: self.api_version.clone(),
            });
        }
        if self.kind != KIND {
            errors.push(ValidationError::Kind {
                expected: KIND,
                found: self.kind.clone(),
            });
        }

        // First declaration wins; later duplicates are reported.
        let mut positions: HashMap<&str, usize> = HashMap::new();
        for (idx, component) in self.components.iter().enumerate() {
            if positions.contains_key(component.name.as_str()) {
                errors.push(ValidationError::DuplicateName(component.name.clone()));
            } else {
                positions.insert(&component.name, idx);
            }
        }

        for (idx, component) in self.components.iter().enumerate() {
            if let Err(reason) = validate_dns1123_subdomain(&component.name) {
                errors.push(ValidationError::InvalidName {
                    name: component.name.clone(),
                    reason,
                });
            }

            for dep in &component.depends_on {
                match positions.get(dep.name.as_str()) {
                    None => errors.push(ValidationError::UndefinedDependency {
                        dependency: dep.name.clone(),
                        component: component.name.clone(),
                    }),
                    Some(&pos) if pos >= idx => errors.push(ValidationError::DependencyOrder {
                        dependency: dep.name.clone(),
                        component: component.name.clone(),
                    }),
                    Some(_) => {}
                }
            }
        }

        errors
    }

    /// Apply variable substitution to every component that opted in.
    pub fn substitute(&mut self, vars: &HashMap<String, String>) -> Result<()> {
        for component in self.components.iter_mut().filter(|c| c.substitute) {
            component.manifest =
                substitution::substitute(&component.manifest, vars).map_err(|reason| {
                    PlaybookError::Substitution {
                        component: component.name.clone(),
                        reason,
                    }
                })?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
