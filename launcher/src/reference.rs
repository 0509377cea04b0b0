//! Static resolution of `module.path:attr` against the application directory
//! and the environment's site-packages.
//!
//! No Python is executed. The module file must exist on the search roots;
//! the attribute check only rules a reference out when the module source
//! cannot possibly bind the first attribute segment at top level. Anything
//! the scan cannot follow (star imports, top-level compound statements) is
//! left to the server's own import.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use strata_types::AppReference;

use crate::error::{LaunchError, Unresolved};

/// A reference whose module file and binding were found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedApp {
    pub reference: AppReference,
    pub module_file: PathBuf,
    /// The search root the module was found under.
    pub root: PathBuf,
}

/// `a.b` → `a/b.py` or `a/b/__init__.py`, every parent a directory.
fn find_module(root: &Path, segments: &[String]) -> Option<PathBuf> {
    let (last, parents) = segments.split_last()?;
    let mut dir = root.to_path_buf();
    for parent in parents {
        dir.push(parent);
        if !dir.is_dir() {
            return None;
        }
    }
    let file = dir.join(format!("{last}.py"));
    if file.is_file() {
        return Some(file);
    }
    let package = dir.join(last).join("__init__.py");
    package.is_file().then_some(package)
}

fn binding_patterns(name: &str) -> Vec<Regex> {
    let name = regex::escape(name);
    let ident = r"[A-Za-z_][\w.]*";
    [
        // app = ..., app: FastAPI = ...
        format!(r"(?m)^{name}\s*(?::[^=\n]*)?=(?:[^=]|$)"),
        // api = app = ...
        format!(r"(?m)^(?:{ident}[ \t]*=[ \t]*)+{name}[ \t]*=(?:[^=]|$)"),
        // app, router = ...  /  (router, app) = ...
        format!(
            r"(?m)^(?:[(\[][ \t]*)?(?:\*?{ident}[ \t]*,[ \t]*)*\*?{name}[ \t]*(?:,[ \t]*\*?{ident}[ \t]*)*,?[ \t]*[)\]]?[ \t]*=(?:[^=]|$)"
        ),
        format!(r"(?m)^(?:async\s+)?def\s+{name}\s*\("),
        format!(r"(?m)^class\s+{name}\b"),
        format!(r"(?m)^import\s+{name}\b"),
        format!(r"(?m)^import\s+[^\n]*\bas\s+{name}\b"),
        format!(r"(?m)^from\s+\S+\s+import\s+[^\n(]*\b{name}\b"),
        format!(r"(?m)^from\s+\S+\s+import\s*\([^)]*\b{name}\b[^)]*\)"),
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
}

/// Top-level shapes that may bind any name: `from x import *`, and compound
/// statements whose bodies run at import time.
fn opaque_binding(source: &str) -> bool {
    static OPAQUE: LazyLock<Option<Regex>> = LazyLock::new(|| {
        Regex::new(
            r"(?m)^(?:from\s+\S+\s+import\s+\*|(?:if|try|with|for|while|async\s+with|async\s+for)\b)",
        )
        .ok()
    });
    OPAQUE.as_ref().is_none_or(|pattern| pattern.is_match(source))
}

/// Whether `source` may bind `name` at module top level. Only returns
/// `false` when no binding is possible.
#[must_use]
pub fn binds_top_level(source: &str, name: &str) -> bool {
    opaque_binding(source)
        || binding_patterns(name)
            .iter()
            .any(|pattern| pattern.is_match(source))
}

/// Resolve `reference` against `roots` in order. The first root that holds
/// the module wins, matching import semantics.
pub fn resolve_reference(
    reference: &AppReference,
    roots: &[PathBuf],
) -> Result<ResolvedApp, LaunchError> {
    let unresolved = |reason| LaunchError::ReferenceResolution {
        reference: reference.clone(),
        reason,
    };

    let Some((root, module_file)) = roots.iter().find_map(|root| {
        find_module(root, reference.module_segments()).map(|file| (root.clone(), file))
    }) else {
        return Err(unresolved(Unresolved::ModuleNotFound {
            module: reference.module_path(),
            searched: roots.to_vec(),
        }));
    };

    let source = match fs::read_to_string(&module_file) {
        Ok(source) => source,
        Err(source) => {
            return Err(unresolved(Unresolved::Read {
                file: module_file,
                source,
            }));
        }
    };
    if !binds_top_level(&source, reference.root_attribute()) {
        return Err(unresolved(Unresolved::AttributeNotFound {
            attribute: reference.root_attribute().to_string(),
            file: module_file,
        }));
    }

    tracing::debug!(
        reference = %reference,
        file = %module_file.display(),
        "Resolved application reference"
    );
    Ok(ResolvedApp {
        reference: reference.clone(),
        module_file,
        root,
    })
}
