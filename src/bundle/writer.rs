//! Atomic bundle assembly.
//!
//! All four files are written into a hidden staging directory next to the
//! target and moved into place with a single rename. A failure at any point
//! leaves the target untouched.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::TempDir;

use super::assets::BundleAssets;
use super::error::{BundleError, Result};
use super::format;
use super::{BODY_FILE, INDEX_FILE, METADATA_FILE, STYLESHEET_FILE};
use crate::convert::Conversion;

fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> Result<()> {
    let path = dir.join(name);
    let mut file = File::create(&path).map_err(BundleError::io(&path))?;
    file.write_all(bytes).map_err(BundleError::io(&path))?;
    file.sync_all().map_err(BundleError::io(&path))?;
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}

fn staging_dir(parent: &Path, output: &Path, purpose: &str) -> Result<TempDir> {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    tempfile::Builder::new()
        .prefix(&format!(".{}.{}-", name, purpose))
        .tempdir_in(parent)
        .map_err(BundleError::io(parent))
}

/// Moves a parked bundle back to `output`. If that fails as well, the parking
/// directory is kept on disk and the path of the old bundle is returned.
fn restore_parked(trash: TempDir, parked: &Path, output: &Path) -> Option<PathBuf> {
    match fs::rename(parked, output) {
        Ok(()) => {
            debug!("Restored previous bundle at {}", output.display());
            None
        }
        Err(e) => {
            let _ = trash.keep();
            warn!(
                "Could not restore previous bundle to {}: {}; it is kept at {}",
                output.display(),
                e,
                parked.display()
            );
            Some(parked.to_path_buf())
        }
    }
}

/// Writes `conversion` and `assets` as a bundle directory at `output`.
///
/// An existing `output` is replaced only when `overwrite` is set; otherwise
/// the call fails with [`BundleError::OutputExists`] before writing
/// anything.
pub fn assemble(
    output: &Path,
    conversion: &Conversion,
    assets: &BundleAssets,
    overwrite: bool,
) -> Result<PathBuf> {
    let exists = output.symlink_metadata().is_ok();
    if exists && !overwrite {
        return Err(BundleError::OutputExists(output.to_path_buf()));
    }

    let index = format::encode_index(&conversion.index, &conversion.body)?;
    let body = format::encode_body(&conversion.body)?;

    let parent = match output.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).map_err(BundleError::io(&parent))?;

    let staging = staging_dir(&parent, output, "staging")?;
    write_file(staging.path(), INDEX_FILE, &index)?;
    write_file(staging.path(), BODY_FILE, &body)?;
    write_file(staging.path(), STYLESHEET_FILE, &assets.stylesheet)?;
    write_file(staging.path(), METADATA_FILE, &assets.metadata)?;

    // The old bundle is parked in its own temp dir and deleted with it.
    let trash = if exists {
        let trash = staging_dir(&parent, output, "old")?;
        let parked = trash.path().join("bundle");
        fs::rename(output, &parked).map_err(BundleError::io(output))?;
        Some((trash, parked))
    } else {
        None
    };

    if let Err(e) = fs::rename(staging.path(), output) {
        if let Some((trash, parked)) = trash {
            restore_parked(trash, &parked, output);
        }
        return Err(BundleError::Io {
            path: output.to_path_buf(),
            source: e,
        });
    }
    // `staging` now points at a moved directory; dropping it is a no-op.
    drop(staging);
    drop(trash);

    info!(
        "Bundle written to {} ({} keys, {} entries, {} body bytes)",
        output.display(),
        conversion.index.len(),
        conversion.body.len(),
        body.len()
    );
    Ok(output.to_path_buf())
}
