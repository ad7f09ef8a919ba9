//! Asset bundle: the static files a rendered document needs, packed as a zip
//! so they can be staged as a single object and unpacked by a worker.

use std::collections::BTreeSet;
use std::fs;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("asset '{path}' could not be read: {source}")]
    ReadAsset {
        path: String,
        source: std::io::Error,
    },

    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("archive entry '{0}' escapes the working directory")]
    UnsafeEntry(String),
}

/// Packs `assets` (paths relative to `root`) into an in-memory zip.
/// Entries are written in sorted order so equal inputs give equal archives.
pub fn build_asset_bundle(root: &Path, assets: &BTreeSet<String>) -> Result<Vec<u8>, BundleError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    for asset in assets {
        let bytes = fs::read(root.join(asset)).map_err(|source| BundleError::ReadAsset {
            path: asset.clone(),
            source,
        })?;
        writer.start_file(asset.as_str(), options)?;
        writer.write_all(&bytes)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Unpacks a bundle into `dest`, refusing entries that would land outside it.
/// Returns the number of files written.
pub fn extract_bundle(bytes: &[u8], dest: &Path) -> Result<usize, BundleError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let mut written = 0;

    for index in 0..archive.len() {
        let mut file = archive.by_index(index)?;
        let relative = file
            .enclosed_name()
            .ok_or_else(|| BundleError::UnsafeEntry(file.name().to_string()))?;
        let target = dest.join(relative);

        if file.is_dir() {
            fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut contents = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut contents)?;
        fs::write(&target, contents)?;
        written += 1;
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundle_contains_nested_assets() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("vellum-cv.cls"), "% class").unwrap();
        fs::create_dir(src.path().join("fonts")).unwrap();
        fs::write(src.path().join("fonts/Body.otf"), [0u8, 1, 2]).unwrap();

        let assets = BTreeSet::from(["vellum-cv.cls".to_string(), "fonts/Body.otf".to_string()]);
        let bundle = build_asset_bundle(src.path(), &assets).unwrap();

        let dest = tempfile::tempdir().unwrap();
        assert_eq!(extract_bundle(&bundle, dest.path()).unwrap(), 2);
        assert_eq!(
            fs::read_to_string(dest.path().join("vellum-cv.cls")).unwrap(),
            "% class"
        );
        assert_eq!(fs::read(dest.path().join("fonts/Body.otf")).unwrap(), vec![0u8, 1, 2]);
    }

    #[test]
    fn test_missing_asset_reported_by_path() {
        let src = tempfile::tempdir().unwrap();
        let assets = BTreeSet::from(["profile.png".to_string()]);
        let err = build_asset_bundle(src.path(), &assets).unwrap_err();
        assert!(matches!(err, BundleError::ReadAsset { ref path, .. } if path == "profile.png"));
    }

    #[test]
    fn test_equal_inputs_give_equal_archives() {
        let src = tempfile::tempdir().unwrap();
        fs::write(src.path().join("vellum-cv.cls"), "% class").unwrap();
        let assets = BTreeSet::from(["vellum-cv.cls".to_string()]);
        let a = build_asset_bundle(src.path(), &assets).unwrap();
        let b = build_asset_bundle(src.path(), &assets).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_corrupt_bundle_is_rejected() {
        let dest = tempfile::tempdir().unwrap();
        assert!(extract_bundle(b"not a zip", dest.path()).is_err());
    }

    #[test]
    fn test_entry_escaping_destination_is_rejected() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        writer
            .start_file("../evil.txt", SimpleFileOptions::default())
            .unwrap();
        writer.write_all(b"x").unwrap();
        let bytes = writer.finish().unwrap().into_inner();

        let dest = tempfile::tempdir().unwrap();
        let err = extract_bundle(&bytes, dest.path()).unwrap_err();
        assert!(matches!(err, BundleError::UnsafeEntry(_)));
    }
}
