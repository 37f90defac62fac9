//! Bundle files of a materialized repository.
//!
//! Graphman repositories contribute every `.json` file below the selected
//! directories, merged into one bundle. Restman repositories contribute
//! `.xml` and `.bundle` documents verbatim.

use super::{sha224_hex, Bundle};
use crate::crd::BundleFormat;
use crate::error::SyncError;
use std::collections::BTreeMap;
use std::path::Path;
use walkdir::WalkDir;

/// Bundle content of one repository reference
#[derive(Debug, Clone, PartialEq)]
pub enum RepositoryPayload {
    Graphman(Bundle),
    /// Document name to document body
    Restman(BTreeMap<String, String>),
}

impl RepositoryPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            RepositoryPayload::Graphman(bundle) => bundle.is_empty(),
            RepositoryPayload::Restman(documents) => documents.is_empty(),
        }
    }

    pub fn fingerprint(&self) -> String {
        match self {
            RepositoryPayload::Graphman(bundle) => bundle.fingerprint(),
            RepositoryPayload::Restman(documents) => {
                let mut hashed = String::new();
                for (name, body) in documents {
                    hashed.push_str(name);
                    hashed.push('\0');
                    hashed.push_str(body);
                    hashed.push('\0');
                }
                sha224_hex(hashed.as_bytes())
            }
        }
    }
}

fn is_bundle_file(format: BundleFormat, name: &str) -> bool {
    match format {
        BundleFormat::Graphman => name.ends_with(".json"),
        BundleFormat::Restman => name.ends_with(".xml") || name.ends_with(".bundle"),
    }
}

fn add_file(
    format: BundleFormat,
    name: &str,
    contents: &[u8],
    bundle: &mut Bundle,
    documents: &mut BTreeMap<String, String>,
) -> Result<(), SyncError> {
    match format {
        BundleFormat::Graphman => {
            let document: serde_json::Value = serde_json::from_slice(contents).map_err(|e| {
                SyncError::configuration(format!("invalid bundle file '{name}': {e}"))
            })?;
            bundle.merge(Bundle::from_json(&document)?);
        }
        BundleFormat::Restman => {
            let body = String::from_utf8(contents.to_vec()).map_err(|e| {
                SyncError::configuration(format!("bundle file '{name}' is not UTF-8: {e}"))
            })?;
            documents.insert(name.to_string(), body);
        }
    }
    Ok(())
}

fn finish(format: BundleFormat, bundle: Bundle, documents: BTreeMap<String, String>) -> RepositoryPayload {
    match format {
        BundleFormat::Graphman => RepositoryPayload::Graphman(bundle),
        BundleFormat::Restman => RepositoryPayload::Restman(documents),
    }
}

/// Load bundle files from a directory tree.
///
/// `directories` are relative to `root`; empty selects the whole tree. Hidden
/// entries such as `.git` are skipped.
pub fn load_from_tree(
    root: &Path,
    directories: &[String],
    format: BundleFormat,
) -> Result<RepositoryPayload, SyncError> {
    let roots: Vec<_> = if directories.is_empty() {
        vec![root.to_path_buf()]
    } else {
        directories
            .iter()
            .map(|dir| root.join(dir.trim_start_matches('/')))
            .collect()
    };

    let mut bundle = Bundle::new();
    let mut documents = BTreeMap::new();
    for dir in roots {
        if !dir.is_dir() {
            return Err(SyncError::configuration(format!(
                "directory '{}' does not exist in repository",
                dir.strip_prefix(root).unwrap_or(&dir).display()
            )));
        }
        let entries = WalkDir::new(&dir)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| {
                entry.depth() == 0 || !entry.file_name().to_string_lossy().starts_with('.')
            });
        for entry in entries {
            let entry = entry.map_err(|e| SyncError::Io(std::io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if !is_bundle_file(format, &relative) {
                continue;
            }
            let contents = std::fs::read(entry.path())?;
            add_file(format, &relative, &contents, &mut bundle, &mut documents)?;
        }
    }
    Ok(finish(format, bundle, documents))
}

/// Load bundle files held in memory (local Secrets, state-store values).
///
/// For graphman content every entry is parsed as a bundle document whatever its name.
pub fn load_from_files(
    files: &BTreeMap<String, Vec<u8>>,
    format: BundleFormat,
) -> Result<RepositoryPayload, SyncError> {
    let mut bundle = Bundle::new();
    let mut documents = BTreeMap::new();
    for (name, contents) in files {
        add_file(format, name, contents, &mut bundle, &mut documents)?;
    }
    Ok(finish(format, bundle, documents))
}
