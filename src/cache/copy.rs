//! Recursive directory copy preserving permissions

use std::fs;
use std::io;
use std::path::{Component, Path};
use walkdir::{DirEntry, WalkDir};

const VCS_DIR: &str = ".git";
const TEST_FIXTURE_DIR: &str = "testdata";
const TEST_FILE_SUFFIX: &str = "_test.go";

/// What to copy and how
#[derive(Debug, Clone, Copy, Default)]
pub struct CopyOptions {
    /// Skip entries whose name starts with '.', except version-control metadata
    pub skip_hidden: bool,

    /// Skip `testdata` directories and `_test.go` files
    pub skip_test_fixtures: bool,

    /// Hard-link version-control object files instead of copying them.
    /// Object files are content-addressed and never rewritten in place.
    pub link_vcs_objects: bool,
}

impl CopyOptions {
    /// Options for cache snapshots and restores
    pub fn snapshot() -> Self {
        Self {
            skip_hidden: false,
            skip_test_fixtures: false,
            link_vcs_objects: true,
        }
    }

    fn skip(&self, entry: &DirEntry) -> bool {
        if entry.depth() == 0 {
            return false;
        }
        let name = entry.file_name().to_string_lossy();
        if self.skip_hidden && name.starts_with('.') && name != VCS_DIR {
            return true;
        }
        if self.skip_test_fixtures {
            let is_dir = entry.file_type().is_dir();
            if (is_dir && name == TEST_FIXTURE_DIR) || (!is_dir && name.ends_with(TEST_FILE_SUFFIX))
            {
                return true;
            }
        }
        false
    }
}

fn is_vcs_object(relative: &Path) -> bool {
    let components = relative.components().map(|c| match c {
        Component::Normal(s) => s.to_str().unwrap_or(""),
        _ => "",
    });
    let mut previous = "";
    for current in components {
        if previous == VCS_DIR && current == "objects" {
            return true;
        }
        previous = current;
    }
    false
}

/// Copy the tree at `src` into `dest`, creating `dest` if needed.
///
/// Regular files keep their permission bits, directories get their source
/// permissions once their contents are in place, and symlinks are recreated
/// rather than followed. Returns the number of files written.
pub fn deep_copy(src: &Path, dest: &Path, options: CopyOptions) -> io::Result<u64> {
    let root_meta = fs::metadata(src)?;
    if !root_meta.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is not a directory", src.display()),
        ));
    }

    fs::create_dir_all(dest)?;
    let mut directories = vec![(dest.to_path_buf(), root_meta.permissions())];
    let mut files = 0u64;

    let walker = WalkDir::new(src)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| !options.skip(e));

    for entry in walker {
        let entry = entry.map_err(io::Error::other)?;
        if entry.depth() == 0 {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dest.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
            directories.push((target, entry.metadata().map_err(io::Error::other)?.permissions()));
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
            files += 1;
        } else {
            if options.link_vcs_objects && is_vcs_object(relative) {
                if fs::hard_link(entry.path(), &target).is_err() {
                    fs::copy(entry.path(), &target)?;
                }
            } else {
                fs::copy(entry.path(), &target)?;
            }
            files += 1;
        }
    }

    // Deepest first, so read-only directories are sealed after their children
    for (dir, permissions) in directories.into_iter().rev() {
        fs::set_permissions(&dir, permissions)?;
    }

    Ok(files)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    let link = fs::read_link(src)?;
    std::os::unix::fs::symlink(link, dest)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> io::Result<()> {
    fs::copy(src, dest).map(|_| ())
}

/// [`deep_copy`] on the blocking pool
pub async fn deep_copy_async(
    src: std::path::PathBuf,
    dest: std::path::PathBuf,
    options: CopyOptions,
) -> io::Result<u64> {
    tokio::task::spawn_blocking(move || deep_copy(&src, &dest, options))
        .await
        .map_err(io::Error::other)?
}

/// Remove a tree on the blocking pool; a missing tree is not an error
pub async fn remove_tree(path: std::path::PathBuf) -> io::Result<()> {
    tokio::task::spawn_blocking(move || match fs::remove_dir_all(&path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    })
    .await
    .map_err(io::Error::other)?
}
