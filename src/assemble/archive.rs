//! Packaging a binary with its distribution assets

use crate::error::{BuildwrightError, BuildwrightResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufWriter, Seek, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Archive container
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    /// zip for the desktop families that expect it, tar.gz for the rest
    pub fn for_os(os: &str) -> Self {
        match os {
            "windows" | "darwin" => Self::Zip,
            _ => Self::TarGz,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::TarGz => "tar.gz",
        }
    }
}

/// A file or directory to put in the archive, under `name`
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    pub source: PathBuf,
    pub name: String,
}

impl ArchiveEntry {
    /// Entry named after the last component of `source`
    pub fn from_path(source: &Path) -> BuildwrightResult<Self> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| BuildwrightError::Archive(format!("{} has no file name", source.display())))?;
        Ok(Self {
            source: source.to_path_buf(),
            name,
        })
    }
}

/// Write `entries` to `output`. Directories are added recursively.
///
/// The archive is written to a temporary file beside `output` and renamed
/// into place once complete, so a failed write leaves nothing behind.
pub fn pack(format: ArchiveFormat, output: &Path, entries: &[ArchiveEntry]) -> BuildwrightResult<()> {
    for entry in entries {
        if !entry.source.exists() {
            return Err(BuildwrightError::PathNotFound(entry.source.clone()));
        }
    }
    let dir = output.parent().unwrap_or_else(|| Path::new("."));
    let mut partial = NamedTempFile::new_in(dir)
        .map_err(|e| BuildwrightError::io(format!("creating archive in {}", dir.display()), e))?;
    let result = match format {
        ArchiveFormat::TarGz => pack_tar_gz(BufWriter::new(&mut partial), entries),
        ArchiveFormat::Zip => pack_zip(&mut partial, entries),
    };
    result.map_err(|e| BuildwrightError::Archive(format!("writing {}: {}", output.display(), e)))?;

    publishable(partial.as_file())
        .map_err(|e| BuildwrightError::io(format!("setting permissions on {}", output.display()), e))?;
    partial
        .persist(output)
        .map_err(|e| BuildwrightError::io(format!("moving archive to {}", output.display()), e.error))?;
    Ok(())
}

/// Temporary files start out private to the owner
#[cfg(unix)]
fn publishable(file: &File) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(std::fs::Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn publishable(_file: &File) -> io::Result<()> {
    Ok(())
}

fn pack_tar_gz<W: Write>(out: W, entries: &[ArchiveEntry]) -> io::Result<()> {
    let encoder = GzEncoder::new(out, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);
    for entry in entries {
        if entry.source.is_dir() {
            builder.append_dir_all(&entry.name, &entry.source)?;
        } else {
            builder.append_path_with_name(&entry.source, &entry.name)?;
        }
    }
    builder.into_inner()?.finish()?.flush()?;
    Ok(())
}

#[cfg(unix)]
fn mode_of(path: &Path) -> io::Result<u32> {
    use std::os::unix::fs::PermissionsExt;
    Ok(std::fs::metadata(path)?.permissions().mode())
}

#[cfg(not(unix))]
fn mode_of(path: &Path) -> io::Result<u32> {
    let meta = std::fs::metadata(path)?;
    Ok(if meta.is_dir() { 0o755 } else { 0o644 })
}

fn pack_zip<W: Write + Seek>(out: W, entries: &[ArchiveEntry]) -> io::Result<()> {
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    for entry in entries {
        for item in WalkDir::new(&entry.source).sort_by_file_name() {
            let item = item.map_err(io::Error::other)?;
            let relative = item
                .path()
                .strip_prefix(&entry.source)
                .map_err(io::Error::other)?;
            let mut name = entry.name.clone();
            for part in relative.components() {
                name.push('/');
                name.push_str(&part.as_os_str().to_string_lossy());
            }
            let mode = mode_of(item.path())?;
            if item.file_type().is_dir() {
                zip.add_directory(name, options.unix_permissions(mode))
                    .map_err(io::Error::other)?;
            } else {
                zip.start_file(name, options.unix_permissions(mode))
                    .map_err(io::Error::other)?;
                let mut src = File::open(item.path())?;
                io::copy(&mut src, &mut zip)?;
            }
        }
    }
    zip.finish().map_err(io::Error::other)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::write_file;
    use flate2::read::GzDecoder;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    fn assets(dir: &Path) -> Vec<ArchiveEntry> {
        write_file(&dir.join("dist/README.txt"), "readme\n");
        write_file(&dir.join("dist/init/linux-systemd/caddy.service"), "[Unit]\n");
        write_file(&dir.join("caddy_v1_linux_amd64"), "\x7fELF");
        ["dist/README.txt", "dist/init", "caddy_v1_linux_amd64"]
            .iter()
            .map(|p| ArchiveEntry::from_path(&dir.join(p)).unwrap())
            .collect()
    }

    #[test]
    fn format_by_os() {
        assert_eq!(ArchiveFormat::for_os("windows"), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::for_os("darwin"), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::for_os("linux"), ArchiveFormat::TarGz);
        assert_eq!(ArchiveFormat::for_os("freebsd").extension(), "tar.gz");
    }

    #[test]
    fn tar_gz_contains_assets_at_top_level() {
        let dir = TempDir::new().unwrap();
        let entries = assets(dir.path());
        let out = dir.path().join("out.tar.gz");

        pack(ArchiveFormat::TarGz, &out, &entries).unwrap();

        let mut archive = tar::Archive::new(GzDecoder::new(File::open(&out).unwrap()));
        let names: BTreeSet<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().trim_end_matches('/').to_string())
            .collect();
        assert!(names.contains("README.txt"));
        assert!(names.contains("init/linux-systemd/caddy.service"));
        assert!(names.contains("caddy_v1_linux_amd64"));
    }

    #[test]
    fn zip_contains_assets_at_top_level() {
        let dir = TempDir::new().unwrap();
        let entries = assets(dir.path());
        let out = dir.path().join("out.zip");

        pack(ArchiveFormat::Zip, &out, &entries).unwrap();

        let archive = zip::ZipArchive::new(File::open(&out).unwrap()).unwrap();
        let names: BTreeSet<&str> = archive.file_names().collect();
        assert!(names.contains("README.txt"));
        assert!(names.contains("init/linux-systemd/caddy.service"));
        assert!(names.contains("caddy_v1_linux_amd64"));
    }

    #[test]
    fn missing_asset_is_reported() {
        let dir = TempDir::new().unwrap();
        let entries = vec![ArchiveEntry::from_path(&dir.path().join("dist/CHANGES.txt")).unwrap()];
        let err = pack(ArchiveFormat::TarGz, &dir.path().join("x.tar.gz"), &entries).unwrap_err();
        assert!(matches!(err, BuildwrightError::PathNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn failed_write_leaves_no_partial_archive() {
        let dir = TempDir::new().unwrap();
        let out_dir = dir.path().join("out");
        std::fs::create_dir_all(&out_dir).unwrap();
        let entries = assets(dir.path());
        // Zip entries stat their target, so a dangling link fails mid-archive
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dist/init/stale")).unwrap();

        let out = out_dir.join("caddy_v1_windows_amd64.zip");
        let err = pack(ArchiveFormat::Zip, &out, &entries).unwrap_err();

        assert!(matches!(err, BuildwrightError::Archive(_)));
        assert!(!out.exists());
        assert_eq!(std::fs::read_dir(&out_dir).unwrap().count(), 0);
    }

    #[cfg(unix)]
    #[test]
    fn archive_is_world_readable() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let entries = assets(dir.path());
        let out = dir.path().join("out.tar.gz");

        pack(ArchiveFormat::TarGz, &out, &entries).unwrap();
        let mode = std::fs::metadata(&out).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o644);
    }
}
