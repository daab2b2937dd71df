use minijinja::value::{Value, ValueKind};
use minijinja::{escape_formatter, Environment, Output, State};
use regex::{Captures, Regex};
use std::fmt::Write;
use std::sync::OnceLock;

use crate::error::{PlaybookError, Result};

/// Name under which the whole document is available, for keys that are not
/// valid identifiers (`{{ object.metadata.labels["app.kubernetes.io/name"] }}`).
pub const OBJECT_VAR: &str = "object";

/// Render `template` against a live object's full document.
///
/// The document's top-level fields are template variables, so
/// `{{ status.readyReplicas }}` reads the nested status field. Field paths
/// may also be written with a leading dot (`{{.status.readyReplicas}}`).
/// Missing fields and `null` render as an empty string; booleans render as
/// `true` / `false`.
pub fn render(template: &str, document: &serde_json::Value) -> Result<String> {
    let mut ctx = match document {
        serde_json::Value::Object(map) => map.clone(),
        _ => serde_json::Map::new(),
    };
    ctx.entry(OBJECT_VAR.to_string())
        .or_insert_with(|| document.clone());

    let source = strip_leading_dots(template);
    let mut env = Environment::new();
    env.set_formatter(format_value);
    env.render_str(&source, &ctx)
        .map_err(|e| PlaybookError::Template(format!("'{template}': {e}")))
}

/// Write scalars the way they appear in YAML so they compare equal to
/// `scalarValue` text.
fn format_value(
    out: &mut Output,
    state: &State,
    value: &Value,
) -> std::result::Result<(), minijinja::Error> {
    match value.kind() {
        ValueKind::Bool => Ok(write!(out, "{}", value.is_true())?),
        ValueKind::None => Ok(()),
        _ => escape_formatter(out, state, value),
    }
}

static EXPR_RE: OnceLock<Regex> = OnceLock::new();
static DOT_PATH_RE: OnceLock<Regex> = OnceLock::new();

fn expr_re() -> &'static Regex {
    EXPR_RE.get_or_init(|| Regex::new(r"(?s)\{\{(.*?)\}\}").expect("static regex is valid"))
}

fn dot_path_re() -> &'static Regex {
    DOT_PATH_RE.get_or_init(|| {
        Regex::new(r"(^|[\s(\[,|=!<>+\-*/%~])\.([A-Za-z_])").expect("static regex is valid")
    })
}

/// `{{.a.b}}` becomes `{{a.b}}` and `{{ . }}` becomes `{{ object }}`.
/// Only expression blocks are touched; surrounding text is left as is.
fn strip_leading_dots(template: &str) -> String {
    expr_re()
        .replace_all(template, |caps: &Captures| {
            let inner = &caps[1];
            let body = inner.trim_matches(|c: char| c == '-' || c.is_whitespace());
            if body == "." {
                return format!("{{{{{}}}}}", inner.replacen('.', OBJECT_VAR, 1));
            }
            let rewritten = dot_path_re().replace_all(inner, "${1}${2}");
            format!("{{{{{rewritten}}}}}")
        })
        .into_owned()
}
