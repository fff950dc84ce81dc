use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::constants::splits::{REPLACED_SUFFIX, STAGING_PREFIX};
use crate::errors::SplitError;

/// Filesystem walker yielding regular files under a root in sorted path order.
pub struct FileStream {
    root: PathBuf,
    follow_links: bool,
}

impl FileStream {
    /// Create a stream rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            follow_links: false,
        }
    }

    /// Configure symlink traversal.
    pub fn with_follow_symlinks(mut self, follow_links: bool) -> Self {
        self.follow_links = follow_links;
        self
    }

    /// Every regular file below the root, as paths relative to it, sorted.
    pub fn relative_files(&self) -> Result<Vec<PathBuf>, SplitError> {
        if !self.root.is_dir() {
            return Err(SplitError::NotFound {
                path: self.root.clone(),
            });
        }
        let mut files = Vec::new();
        let walker = WalkDir::new(&self.root)
            .follow_links(self.follow_links)
            .sort_by_file_name();
        for entry in walker {
            let entry = entry.map_err(|err| {
                SplitError::Io(
                    err.into_io_error()
                        .unwrap_or_else(|| io::Error::other("filesystem loop detected")),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(&self.root)
                .map_err(|err| SplitError::Io(io::Error::other(err)))?;
            files.push(relative.to_path_buf());
        }
        files.sort();
        Ok(files)
    }
}

/// Hidden staging directory next to a destination.
///
/// Output is written inside [`Staging::dir`] and only appears at the
/// destination through [`Staging::commit_dir`] or [`Staging::commit_file`].
/// Dropping an uncommitted staging area removes it.
pub struct Staging {
    destination: PathBuf,
    dir: TempDir,
}

impl Staging {
    pub fn for_destination(destination: &Path) -> Result<Self, SplitError> {
        if destination.file_name().is_none() {
            return Err(SplitError::write(destination, "destination has no file name"));
        }
        let parent = match destination.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&parent).map_err(|err| SplitError::write(destination, err))?;
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&parent)
            .map_err(|err| SplitError::write(destination, err))?;
        debug!(
            destination = %destination.display(),
            staging = %dir.path().display(),
            "staging output"
        );
        Ok(Self {
            destination: destination.to_path_buf(),
            dir,
        })
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Move the whole staging directory to the destination.
    pub fn commit_dir(self) -> Result<(), SplitError> {
        let staged = self.dir.keep();
        replace_path(&staged, &self.destination).inspect_err(|_| {
            let _ = fs::remove_dir_all(&staged);
        })
    }

    /// Move one staged file to the destination and discard the rest.
    pub fn commit_file(self, name: &str) -> Result<(), SplitError> {
        replace_path(&self.dir.path().join(name), &self.destination)
    }
}

/// Absolute form of `path` with symlinks, `.` and `..` resolved.
///
/// The existing prefix is canonicalized component by component; the
/// remainder, which does not exist yet, is normalized lexically.
pub fn resolve_path(path: &Path) -> PathBuf {
    let absolute = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut resolved = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => continue,
            Component::ParentDir => {
                resolved.pop();
            }
            other => resolved.push(other),
        }
        if let Ok(canonical) = fs::canonicalize(&resolved) {
            resolved = canonical;
        }
    }
    resolved
}

/// True when `path` is `ancestor` itself or lies below it, however either is spelled.
pub fn path_is_within(path: &Path, ancestor: &Path) -> bool {
    resolve_path(path).starts_with(resolve_path(ancestor))
}

/// Rename `staged` onto `destination`, moving any previous entry aside first
/// and restoring it when the final rename fails.
fn replace_path(staged: &Path, destination: &Path) -> Result<(), SplitError> {
    let previous = fs::symlink_metadata(destination).is_ok();
    if !previous {
        return fs::rename(staged, destination).map_err(|err| SplitError::write(destination, err));
    }

    let aside = aside_path(destination);
    if fs::symlink_metadata(&aside).is_ok() {
        remove_entry(&aside).map_err(|err| SplitError::write(&aside, err))?;
    }
    fs::rename(destination, &aside).map_err(|err| SplitError::write(destination, err))?;
    if let Err(err) = fs::rename(staged, destination) {
        if let Err(restore) = fs::rename(&aside, destination) {
            warn!(
                destination = %destination.display(),
                aside = %aside.display(),
                error = %restore,
                "failed to restore previous output"
            );
        }
        return Err(SplitError::write(destination, err));
    }
    if let Err(err) = remove_entry(&aside) {
        warn!(
            path = %aside.display(),
            error = %err,
            "failed to remove replaced output"
        );
    }
    debug!(destination = %destination.display(), "replaced previous output");
    Ok(())
}

fn aside_path(destination: &Path) -> PathBuf {
    let name = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    destination.with_file_name(format!(".{name}.{REPLACED_SUFFIX}"))
}

fn remove_entry(path: &Path) -> io::Result<()> {
    if fs::symlink_metadata(path)?.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn relative_files_are_sorted_and_skip_directories() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("b/nested")).unwrap();
        fs::create_dir_all(dir.path().join("a")).unwrap();
        fs::write(dir.path().join("b/nested/z.png"), b"z").unwrap();
        fs::write(dir.path().join("b/y.png"), b"y").unwrap();
        fs::write(dir.path().join("a/x.png"), b"x").unwrap();

        let files = FileStream::new(dir.path()).relative_files().unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("a/x.png"),
                PathBuf::from("b/nested/z.png"),
                PathBuf::from("b/y.png"),
            ]
        );
    }

    #[test]
    fn relative_files_requires_existing_root() {
        let dir = tempdir().unwrap();
        let err = FileStream::new(dir.path().join("missing"))
            .relative_files()
            .unwrap_err();
        assert!(matches!(err, SplitError::NotFound { .. }));
    }

    #[test]
    fn aliased_paths_resolve_to_the_same_location() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("toy-train.sslr");
        fs::write(&file, b"x").unwrap();

        let detour = dir.path().join("sub").join("..").join("toy-train.sslr");
        let dotted = dir.path().join(".").join("toy-train.sslr");
        assert_eq!(resolve_path(&detour), resolve_path(&file));
        assert_eq!(resolve_path(&dotted), resolve_path(&file));
        assert!(path_is_within(&file, &detour));
        assert!(path_is_within(&file, &dir.path().join("sub").join("..")));
        assert!(!path_is_within(&file, &dir.path().join("toy-train.sslr.bak")));
        assert!(!path_is_within(&dir.path().join("other"), &file));
    }

    #[test]
    fn staging_under_a_regular_file_is_a_write_error() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();

        let err = Staging::for_destination(&blocker.join("out")).err().unwrap();
        assert!(matches!(err, SplitError::Write { .. }));
        assert_eq!(entries(dir.path()), vec!["blocker".to_string()]);
    }

    #[test]
    fn dropped_staging_leaves_nothing_behind() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("out");
        {
            let staging = Staging::for_destination(&destination).unwrap();
            fs::write(staging.dir().join("partial"), b"half").unwrap();
        }
        assert!(entries(dir.path()).is_empty());
    }

    #[test]
    fn commit_dir_replaces_previous_output() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("out");
        fs::create_dir_all(&destination).unwrap();
        fs::write(destination.join("old.txt"), b"old").unwrap();

        let staging = Staging::for_destination(&destination).unwrap();
        fs::write(staging.dir().join("new.txt"), b"new").unwrap();
        staging.commit_dir().unwrap();

        assert_eq!(entries(&destination), vec!["new.txt".to_string()]);
        assert_eq!(entries(dir.path()), vec!["out".to_string()]);
    }

    #[test]
    fn commit_file_moves_only_the_named_file() {
        let dir = tempdir().unwrap();
        let destination = dir.path().join("data.sslr");
        fs::write(&destination, b"previous").unwrap();

        let staging = Staging::for_destination(&destination).unwrap();
        fs::write(staging.dir().join("stream"), b"fresh").unwrap();
        fs::write(staging.dir().join("scratch"), b"ignored").unwrap();
        staging.commit_file("stream").unwrap();

        assert_eq!(fs::read(&destination).unwrap(), b"fresh");
        assert_eq!(entries(dir.path()), vec!["data.sslr".to_string()]);
    }
}
