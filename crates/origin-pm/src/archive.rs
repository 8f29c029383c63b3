//! Archive extraction
//!
//! Packages can be distributed as `.tar`, `.tar.gz` (or `.tgz`) and `.zip`
//! archives. An archive must contain exactly one top-level directory, which
//! becomes the installed package.

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors that can occur while extracting archives
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// File extension is not a supported archive format
    #[error("Unsupported archive format: {0}")]
    Unsupported(PathBuf),

    /// Archive could not be read
    #[error("Failed to extract {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    /// Entry would land outside the extraction directory
    #[error("Archive entry escapes destination: {0}")]
    UnsafePath(String),

    /// Archive does not have exactly one top-level directory
    #[error("Archive must contain exactly one top-level directory, found {0}")]
    TopLevel(usize),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Supported archive formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveKind {
    Tar,
    TarGz,
    Zip,
}

impl ArchiveKind {
    /// Detect the format from a file name
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveKind::TarGz)
        } else if name.ends_with(".tar") {
            Some(ArchiveKind::Tar)
        } else if name.ends_with(".zip") {
            Some(ArchiveKind::Zip)
        } else {
            None
        }
    }
}

/// Check whether `path` has a supported archive extension
pub fn is_archive_file(path: &Path) -> bool {
    ArchiveKind::from_path(path).is_some()
}

/// Extract `archive` into `dest`, creating `dest` if needed
pub fn extract_archive(archive: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let kind =
        ArchiveKind::from_path(archive).ok_or_else(|| ArchiveError::Unsupported(archive.to_path_buf()))?;

    fs::create_dir_all(dest)?;
    let file = File::open(archive)?;

    match kind {
        ArchiveKind::Tar => extract_tar(file, archive, dest)?,
        ArchiveKind::TarGz => extract_tar(GzDecoder::new(file), archive, dest)?,
        ArchiveKind::Zip => extract_zip(file, archive, dest)?,
    }

    debug!(archive = %archive.display(), dest = %dest.display(), "extracted archive");
    Ok(())
}

fn extract_tar<R: Read>(reader: R, archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let failed = |e: io::Error| ArchiveError::Extraction {
        path: archive_path.to_path_buf(),
        message: e.to_string(),
    };

    let mut archive = tar::Archive::new(reader);

    for entry in archive.entries().map_err(failed)? {
        let mut entry = entry.map_err(failed)?;
        let path = entry.path().map_err(failed)?.into_owned();
        let dest_path = safe_join(dest, &path)?;

        let entry_type = entry.header().entry_type();
        if entry_type.is_dir() {
            fs::create_dir_all(&dest_path)?;
        } else if entry_type.is_file() {
            if let Some(parent) = dest_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut file = File::create(&dest_path)?;
            io::copy(&mut entry, &mut file)?;
        }
        // Links and special entries are skipped
    }

    Ok(())
}

fn extract_zip(file: File, archive_path: &Path, dest: &Path) -> Result<(), ArchiveError> {
    let failed = |e: zip::result::ZipError| ArchiveError::Extraction {
        path: archive_path.to_path_buf(),
        message: e.to_string(),
    };

    let mut archive = zip::ZipArchive::new(file).map_err(failed)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(failed)?;
        let Some(relative) = entry.enclosed_name() else {
            return Err(ArchiveError::UnsafePath(entry.name().to_string()));
        };
        let entry_path = dest.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&entry_path)?;
        } else {
            if let Some(parent) = entry_path.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut outfile = File::create(&entry_path)?;
            io::copy(&mut entry, &mut outfile)?;
        }
    }

    Ok(())
}

/// Join an archive entry path onto `dest`, rejecting absolute and `..` paths
fn safe_join(dest: &Path, entry: &Path) -> Result<PathBuf, ArchiveError> {
    let mut out = dest.to_path_buf();
    for component in entry.components() {
        match component {
            Component::Normal(part) => out.push(part),
            Component::CurDir => {}
            _ => return Err(ArchiveError::UnsafePath(entry.display().to_string())),
        }
    }
    Ok(out)
}

/// The single top-level directory of an extracted archive
///
/// Top-level files are ignored; zero or several directories is an error.
pub fn single_top_level_dir(extracted: &Path) -> Result<PathBuf, ArchiveError> {
    let mut dirs = Vec::new();
    for entry in fs::read_dir(extracted)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            dirs.push(entry.path());
        }
    }

    match dirs.len() {
        1 => Ok(dirs.remove(0)),
        n => Err(ArchiveError::TopLevel(n)),
    }
}

/// Recursively copy a directory tree
pub fn copy_dir_all(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let ty = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if ty.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else if ty.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
        // Skip symlinks
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_tar_gz(path: &Path, files: &[(&str, &str)]) {
        let file = File::create(path).unwrap();
        let encoder = flate2::write::GzEncoder::new(file, flate2::Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for (name, content) in files {
            let mut header = tar::Header::new_gnu();
            header.set_size(content.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, content.as_bytes()).unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap();
    }

    #[test]
    fn test_archive_kind_from_path() {
        assert_eq!(ArchiveKind::from_path(Path::new("a-1.0.0.tar.gz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_path(Path::new("a.tgz")), Some(ArchiveKind::TarGz));
        assert_eq!(ArchiveKind::from_path(Path::new("a.tar")), Some(ArchiveKind::Tar));
        assert_eq!(ArchiveKind::from_path(Path::new("A.ZIP")), Some(ArchiveKind::Zip));
        assert_eq!(ArchiveKind::from_path(Path::new("a.gz")), None);
        assert!(!is_archive_file(Path::new("lib.origin")));
    }

    #[test]
    fn test_extract_tar_gz() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("pkg.tar.gz");
        write_tar_gz(&archive, &[("pkg/main.origin", "print 1"), ("pkg/lib/util.origin", "x")]);

        let out = temp.path().join("out");
        extract_archive(&archive, &out).unwrap();
        assert_eq!(fs::read_to_string(out.join("pkg/main.origin")).unwrap(), "print 1");
        assert_eq!(single_top_level_dir(&out).unwrap(), out.join("pkg"));
    }

    #[test]
    fn test_extract_zip() {
        let temp = tempfile::tempdir().unwrap();
        let archive = temp.path().join("pkg.zip");
        {
            let file = File::create(&archive).unwrap();
            let mut writer = zip::ZipWriter::new(file);
            let options = zip::write::SimpleFileOptions::default();
            writer.add_directory("pkg/", options).unwrap();
            writer.start_file("pkg/main.origin", options).unwrap();
            writer.write_all(b"print 2").unwrap();
            writer.finish().unwrap();
        }

        let out = temp.path().join("out");
        extract_archive(&archive, &out).unwrap();
        assert_eq!(fs::read_to_string(out.join("pkg/main.origin")).unwrap(), "print 2");
    }

    #[test]
    fn test_top_level_count() {
        let temp = tempfile::tempdir().unwrap();
        assert!(matches!(single_top_level_dir(temp.path()), Err(ArchiveError::TopLevel(0))));

        fs::create_dir(temp.path().join("a")).unwrap();
        fs::write(temp.path().join("README"), "ignored").unwrap();
        assert_eq!(single_top_level_dir(temp.path()).unwrap(), temp.path().join("a"));

        fs::create_dir(temp.path().join("b")).unwrap();
        assert!(matches!(single_top_level_dir(temp.path()), Err(ArchiveError::TopLevel(2))));
    }

    #[test]
    fn test_safe_join_rejects_traversal() {
        let dest = Path::new("/tmp/out");
        assert!(safe_join(dest, Path::new("../evil")).is_err());
        assert!(safe_join(dest, Path::new("/etc/passwd")).is_err());
        assert_eq!(safe_join(dest, Path::new("./pkg/a")).unwrap(), dest.join("pkg/a"));
    }

    #[test]
    fn test_copy_dir_all() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested/file.txt"), "data").unwrap();

        let dst = temp.path().join("dst");
        copy_dir_all(&src, &dst).unwrap();
        assert_eq!(fs::read_to_string(dst.join("nested/file.txt")).unwrap(), "data");
    }
}
