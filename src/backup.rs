//! Workspace bundles: a zip holding `manifest.json` and the workspace
//! database under `db/`. The manifest carries the database's SHA-256 so an
//! import can refuse a damaged or hand-edited bundle.

use crate::db::{self, DB_FILE};
use anyhow::{bail, Context};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Seek, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

pub const BUNDLE_FORMAT_V1: &str = "scorecard-workspace-v1";
const MANIFEST_ENTRY: &str = "manifest.json";

fn db_entry() -> String {
    format!("db/{}", DB_FILE)
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    #[serde(default)]
    app_version: String,
    #[serde(default)]
    exported_at: String,
    db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format: String,
    pub db_sha256: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn read_entry<R: Read + Seek>(archive: &mut ZipArchive<R>, name: &str) -> anyhow::Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("bundle missing {}", name))?;
    let mut out = Vec::new();
    entry
        .read_to_end(&mut out)
        .with_context(|| format!("failed to read {}", name))?;
    Ok(out)
}

pub fn export_workspace_bundle(workspace: &Path, out_path: &Path) -> anyhow::Result<ExportSummary> {
    let db_bytes = db::read_db_file(workspace)?;
    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: Utc::now().to_rfc3339(),
        db_sha256: sha256_hex(&db_bytes),
    };

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.display()))?;
    }
    let out = File::create(out_path)
        .with_context(|| format!("failed to create bundle {}", out_path.display()))?;
    let mut zip = ZipWriter::new(out);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let entries = [
        (MANIFEST_ENTRY.to_string(), serde_json::to_vec_pretty(&manifest)?),
        (db_entry(), db_bytes),
    ];
    for (name, bytes) in &entries {
        zip.start_file(name.as_str(), opts)
            .with_context(|| format!("failed to start {}", name))?;
        zip.write_all(bytes)
            .with_context(|| format!("failed to write {}", name))?;
    }
    zip.finish().context("failed to finalize bundle")?;

    Ok(ExportSummary {
        bundle_format: manifest.format,
        db_sha256: manifest.db_sha256,
    })
}

/// The bundle is read and verified in full before the workspace database is
/// replaced.
pub fn import_workspace_bundle(in_path: &Path, workspace: &Path) -> anyhow::Result<ImportSummary> {
    let file = File::open(in_path)
        .with_context(|| format!("failed to open bundle {}", in_path.display()))?;
    let mut archive = ZipArchive::new(file).context("invalid zip archive")?;

    let manifest: Manifest = serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)
        .context("manifest.json is invalid")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", manifest.format);
    }

    let db_bytes = read_entry(&mut archive, &db_entry())?;
    let actual = sha256_hex(&db_bytes);
    if actual != manifest.db_sha256 {
        bail!(
            "database checksum mismatch: manifest {}, bundle {}",
            manifest.db_sha256,
            actual
        );
    }

    db::replace_db_file(workspace, &db_bytes)?;
    Ok(ImportSummary {
        bundle_format: manifest.format,
        db_sha256: actual,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_hex_matches_known_digest() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn manifest_without_checksum_is_rejected() {
        let parsed: Result<Manifest, _> =
            serde_json::from_str(r#"{ "format": "scorecard-workspace-v1" }"#);
        assert!(parsed.is_err());
    }
}
