//! Batch archives from the remote camera.
//!
//! Unpacking is two explicit stages: [`read_image_entries`] decompresses the
//! archive into named in-memory entries, then [`write_entries`] places them
//! on disk. [`unpack_batch`] runs both after persisting the raw archive.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};

use crate::{app_dirs, dataset::ImageRef};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
const MAX_ZIP_ENTRIES: usize = 2_000;
const MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES: u64 = 64 * 1024 * 1024;
const MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES: u64 = 1024 * 1024 * 1024;
const MAX_ZIP_COMPRESSION_RATIO: u64 = 200;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Zip error: {0}")]
    Zip(String),
    #[error("Invalid archive: {0}")]
    Invalid(String),
    #[error("No images found in the zip file")]
    NoImages,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct ZipExtractionLimits {
    max_entries: usize,
    max_entry_uncompressed_bytes: u64,
    max_total_uncompressed_bytes: u64,
    max_compression_ratio: u64,
}

impl ZipExtractionLimits {
    pub(crate) fn standard() -> Self {
        Self {
            max_entries: MAX_ZIP_ENTRIES,
            max_entry_uncompressed_bytes: MAX_ZIP_ENTRY_UNCOMPRESSED_BYTES,
            max_total_uncompressed_bytes: MAX_ZIP_TOTAL_UNCOMPRESSED_BYTES,
            max_compression_ratio: MAX_ZIP_COMPRESSION_RATIO,
        }
    }
}

/// One decompressed image, keyed by its sanitized path inside the archive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: PathBuf,
    pub bytes: Vec<u8>,
}

/// `.jpg`, `.jpeg` or `.png`, in any letter case.
pub fn is_image_name(name: &Path) -> bool {
    name.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            IMAGE_EXTENSIONS
                .iter()
                .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        })
}

/// Decompress every image entry of `archive`, preserving archive order.
pub fn read_image_entries(archive: &[u8]) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    read_image_entries_with_limits(archive, ZipExtractionLimits::standard())
}

pub(crate) fn read_image_entries_with_limits(
    archive: &[u8],
    limits: ZipExtractionLimits,
) -> Result<Vec<ArchiveEntry>, ArchiveError> {
    let mut zip = zip::ZipArchive::new(Cursor::new(archive))
        .map_err(|err| ArchiveError::Zip(err.to_string()))?;
    let entry_count = zip.len();
    if entry_count > limits.max_entries {
        return Err(ArchiveError::Invalid(format!(
            "Archive has {entry_count} entries, limit is {}",
            limits.max_entries
        )));
    }
    let mut entries = Vec::new();
    let mut total_uncompressed: u64 = 0;
    for index in 0..entry_count {
        let mut entry = zip
            .by_index(index)
            .map_err(|err| ArchiveError::Zip(err.to_string()))?;
        if entry.is_dir() {
            continue;
        }
        let Some(name) = entry.enclosed_name() else {
            tracing::warn!("Skipping archive entry with unsafe path: {}", entry.name());
            continue;
        };
        if !is_image_name(&name) {
            tracing::debug!("Skipping non-image archive entry {}", name.display());
            continue;
        }
        let uncompressed_size = entry.size();
        check_entry_size(&name, uncompressed_size, entry.compressed_size(), limits)?;
        total_uncompressed = total_uncompressed
            .checked_add(uncompressed_size)
            .ok_or_else(|| ArchiveError::Invalid("Archive size overflow".into()))?;
        if total_uncompressed > limits.max_total_uncompressed_bytes {
            return Err(ArchiveError::Invalid(format!(
                "Archive extracted size {} exceeds limit {}",
                total_uncompressed, limits.max_total_uncompressed_bytes
            )));
        }
        let mut bytes = Vec::with_capacity(usize::try_from(uncompressed_size).unwrap_or(0));
        entry
            .by_ref()
            .take(limits.max_entry_uncompressed_bytes + 1)
            .read_to_end(&mut bytes)?;
        entries.push(ArchiveEntry { name, bytes });
    }
    Ok(entries)
}

fn check_entry_size(
    name: &Path,
    uncompressed: u64,
    compressed: u64,
    limits: ZipExtractionLimits,
) -> Result<(), ArchiveError> {
    if uncompressed > limits.max_entry_uncompressed_bytes {
        return Err(ArchiveError::Invalid(format!(
            "Archive entry '{}' is too large ({uncompressed} bytes, limit {})",
            name.display(),
            limits.max_entry_uncompressed_bytes
        )));
    }
    if uncompressed > 0 {
        if compressed == 0 {
            return Err(ArchiveError::Invalid(format!(
                "Archive entry '{}' has zero compressed size",
                name.display()
            )));
        }
        if uncompressed > compressed.saturating_mul(limits.max_compression_ratio) {
            return Err(ArchiveError::Invalid(format!(
                "Archive entry '{}' exceeds compression ratio limit",
                name.display()
            )));
        }
    }
    Ok(())
}

/// Write `entries` below `dest_dir` and return refs in the same order.
pub fn write_entries(entries: Vec<ArchiveEntry>, dest_dir: &Path) -> Result<Vec<ImageRef>, ArchiveError> {
    let mut images = Vec::with_capacity(entries.len());
    for entry in entries {
        let outpath = dest_dir.join(&entry.name);
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&outpath, &entry.bytes)?;
        images.push(ImageRef::new(outpath));
    }
    Ok(images)
}

/// Persist `archive` in `cache_dir`, then unpack its images next to it.
///
/// Fails with [`ArchiveError::NoImages`] when nothing usable is inside.
pub fn unpack_batch(archive: &[u8], cache_dir: &Path) -> Result<Vec<ImageRef>, ArchiveError> {
    std::fs::create_dir_all(cache_dir)?;
    let stem = app_dirs::unique_name("dataset", "");
    let archive_path = cache_dir.join(format!("{stem}.zip"));
    std::fs::write(&archive_path, archive)?;

    let entries = read_image_entries(archive)?;
    if entries.is_empty() {
        return Err(ArchiveError::NoImages);
    }
    let images = write_entries(entries, &cache_dir.join(stem))?;
    tracing::info!(
        "Unpacked {} images from {}",
        images.len(),
        archive_path.display()
    );
    Ok(images)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;

    fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[test]
    fn keeps_only_images_in_archive_order() {
        let archive = build_zip(&[
            ("img_07.jpg", b"7"),
            ("readme.txt", b"x"),
            ("img_01.JPG", b"1"),
            ("img_02.jpeg", b"2"),
            ("meta.json", b"{}"),
            ("img_03.png", b"3"),
            ("img_04.PNG", b"4"),
            ("notes.md", b"n"),
            ("img_05.jpg", b"5"),
            ("img_06.jpg", b"6"),
        ]);
        let entries = read_image_entries(&archive).unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|entry| entry.name.to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                "img_07.jpg",
                "img_01.JPG",
                "img_02.jpeg",
                "img_03.png",
                "img_04.PNG",
                "img_05.jpg",
                "img_06.jpg"
            ]
        );
    }

    #[test]
    fn image_extensions_match_in_any_case() {
        for name in ["a.jpg", "b.JPEG", "c.Png", "IMG_0001.JPG"] {
            assert!(is_image_name(Path::new(name)), "{name} should be accepted");
        }
        for name in ["d.gif", "e.jpg.txt", "jpg", "f."] {
            assert!(!is_image_name(Path::new(name)), "{name} should be rejected");
        }
    }

    #[test]
    fn unpack_writes_files_and_keeps_archive() {
        let dir = tempdir().unwrap();
        let archive = build_zip(&[("a.jpg", b"A"), ("nested/b.png", b"B")]);
        let images = unpack_batch(&archive, dir.path()).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(std::fs::read(images[0].location()).unwrap(), b"A");
        assert!(images[1].location().ends_with("nested/b.png"));
        let zips = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "zip"))
            .count();
        assert_eq!(zips, 1);
    }

    #[test]
    fn archive_without_images_is_an_error() {
        let dir = tempdir().unwrap();
        let archive = build_zip(&[("readme.txt", b"x")]);
        let err = unpack_batch(&archive, dir.path()).unwrap_err();
        assert!(matches!(err, ArchiveError::NoImages));
        assert_eq!(err.to_string(), "No images found in the zip file");
    }

    #[test]
    fn traversal_entries_are_skipped() {
        let archive = build_zip(&[("../escape.jpg", b"x"), ("ok.jpg", b"y")]);
        let entries = read_image_entries(&archive).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].name, PathBuf::from("ok.jpg"));
    }

    #[test]
    fn rejects_entry_over_size_limit() {
        let archive = build_zip(&[("big.jpg", &[1u8; 8])]);
        let limits = ZipExtractionLimits {
            max_entries: 10,
            max_entry_uncompressed_bytes: 4,
            max_total_uncompressed_bytes: 100,
            max_compression_ratio: 100,
        };
        let err = read_image_entries_with_limits(&archive, limits).unwrap_err();
        assert!(err.to_string().contains("too large"));
    }

    #[test]
    fn rejects_suspicious_compression_ratio() {
        let data = vec![b'a'; 4096];
        let archive = build_zip(&[("dense.jpg", data.as_slice())]);
        let limits = ZipExtractionLimits {
            max_entries: 10,
            max_entry_uncompressed_bytes: 10_000,
            max_total_uncompressed_bytes: 10_000,
            max_compression_ratio: 2,
        };
        let err = read_image_entries_with_limits(&archive, limits).unwrap_err();
        assert!(err.to_string().contains("compression ratio"));
    }

    #[test]
    fn garbage_bytes_are_a_zip_error() {
        assert!(matches!(
            read_image_entries(b"definitely not a zip"),
            Err(ArchiveError::Zip(_))
        ));
    }
}
