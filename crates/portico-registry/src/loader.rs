//! Disk scan that turns a group's directory tree into definitions.
//!
//! The scan is synchronous; async callers run it on the blocking pool.

use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::definition::EndpointDefinition;
use crate::document::{DefinitionDocument, document_group, type_tag};
use crate::error::DefinitionError;
use crate::kind::EndpointGroup;
use crate::namespace::QualifiedName;

/// File name every definition directory carries.
pub const DEFINITION_FILE: &str = "entity.json";

/// Result of scanning one group.
#[derive(Debug, Default)]
pub struct LoadReport {
    /// Accepted definitions in scan order.
    pub definitions: Vec<EndpointDefinition>,
    /// Files excluded for namespace or naming problems.
    pub skipped: usize,
    /// Files excluded as malformed.
    pub rejected: usize,
}

/// Scans every directory the group draws from below `root`.
///
/// Problems with individual files are logged and counted; they never abort
/// the scan. Files are visited in lexical path order so "last scanned wins"
/// is deterministic.
pub fn load_group(root: &Path, group: EndpointGroup) -> LoadReport {
    let mut report = LoadReport::default();
    let mut any_directory = false;

    for directory in group.directories() {
        let base = root.join(directory);
        if !base.is_dir() {
            debug!(group = %group, path = %base.display(), "Definition directory not present");
            continue;
        }
        any_directory = true;

        let mut files = Vec::new();
        collect_files(&base, &mut Vec::new(), &mut files);

        for (segments, path) in files {
            match load_file(&path, &segments, directory, group) {
                Ok(Some(definition)) => {
                    debug!(
                        group = %group,
                        key = %definition.routing_key(),
                        kind = %definition.kind,
                        "Loaded endpoint definition"
                    );
                    report.definitions.push(definition);
                }
                Ok(None) => {}
                Err(e) if e.is_naming_problem() => {
                    warn!(group = %group, path = %path.display(), error = %e, "Skipping endpoint definition");
                    report.skipped += 1;
                }
                Err(e) => {
                    error!(
                        group = %group,
                        path = %path.display(),
                        category = %e.category(),
                        error = %e,
                        "Invalid endpoint definition"
                    );
                    report.rejected += 1;
                }
            }
        }
    }

    if !any_directory {
        warn!(group = %group, root = %root.display(), "No definition directory found for group");
    }

    debug!(
        group = %group,
        loaded = report.definitions.len(),
        skipped = report.skipped,
        rejected = report.rejected,
        "Scanned endpoint definitions"
    );
    report
}

/// Collects `(directory segments, file path)` pairs, sorted by path.
fn collect_files(dir: &Path, segments: &mut Vec<String>, out: &mut Vec<(Vec<String>, PathBuf)>) {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Cannot read definition directory");
            return;
        }
    };

    let mut entries: Vec<_> = entries.filter_map(Result::ok).collect();
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            segments.push(entry.file_name().to_string_lossy().into_owned());
            collect_files(&path, segments, out);
            segments.pop();
        } else if entry.file_name() == DEFINITION_FILE {
            out.push((segments.clone(), path));
        }
    }
}

/// Loads one file for `group`.
///
/// Returns `Ok(None)` when the file belongs to another group sharing the
/// directory. Unreadable or mistyped files are only reported by the group
/// that owns the directory, so a shared directory never logs twice.
fn load_file(
    path: &Path,
    segments: &[String],
    directory: &str,
    group: EndpointGroup,
) -> Result<Option<EndpointDefinition>, DefinitionError> {
    let owns_directory = EndpointGroup::for_directory(directory) == Some(group);

    let value = match read_value(path) {
        Ok(value) => value,
        Err(e) if owns_directory => return Err(e),
        Err(_) => return Ok(None),
    };

    let resolved = match document_group(type_tag(&value), directory) {
        Ok(resolved) => resolved,
        Err(e) if owns_directory => return Err(e),
        Err(_) => return Ok(None),
    };
    if resolved != group {
        return Ok(None);
    }

    let location = QualifiedName::infer(segments)?;
    DefinitionDocument::from_value(value)?
        .into_definition(group, location, path.to_path_buf())
        .map(Some)
}

fn read_value(path: &Path) -> Result<Value, DefinitionError> {
    let text = fs::read_to_string(path).map_err(|source| DefinitionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}
