use std::fs;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, info};

use crate::data::{ClassId, Example};
use crate::errors::SplitError;
use crate::sampler::DeterministicRng;
use crate::source::{RecordStore, RecordStreamWriter};
use crate::transport::{FileStream, Staging, path_is_within};

const STAGED_STREAM: &str = "import.sslr";

/// Options for [`import_class_folders`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportOptions {
    /// Seed of the canonical shuffle applied before writing.
    pub seed: u64,
    /// Rebuild even when the destination already exists.
    pub force: bool,
    /// Follow symlinks while walking class folders.
    pub follow_links: bool,
}

/// Result of an import request.
#[derive(Debug)]
pub enum ImportOutcome {
    Written(RecordStore),
    /// The destination already existed and `force` was not set.
    AlreadyInstalled(PathBuf),
}

impl ImportOutcome {
    pub fn path(&self) -> &Path {
        match self {
            Self::Written(store) => store.path(),
            Self::AlreadyInstalled(path) => path,
        }
    }
}

/// Build a labeled record stream from `root/<class-id>/**` image folders.
///
/// Every regular file becomes one example whose payload is the file's bytes.
/// Candidates are ordered by class then relative path and shuffled with
/// `options.seed`, so the same folder tree always yields the same stream.
pub fn import_class_folders(
    root: impl AsRef<Path>,
    destination: impl AsRef<Path>,
    options: &ImportOptions,
) -> Result<ImportOutcome, SplitError> {
    let root = root.as_ref();
    let destination = destination.as_ref();
    if destination.exists() && !options.force {
        info!(destination = %destination.display(), "skipping already installed dataset");
        return Ok(ImportOutcome::AlreadyInstalled(destination.to_path_buf()));
    }

    if path_is_within(destination, root) || path_is_within(root, destination) {
        return Err(SplitError::value(
            "destination",
            format!(
                "'{}' overlaps the class folders under '{}'",
                destination.display(),
                root.display()
            ),
        ));
    }

    let files = FileStream::new(root)
        .with_follow_symlinks(options.follow_links)
        .relative_files()?;
    let mut candidates = files
        .into_iter()
        .map(|relative| Ok((class_of(&relative)?, relative)))
        .collect::<Result<Vec<(ClassId, PathBuf)>, SplitError>>()?;
    if candidates.is_empty() {
        return Err(SplitError::value(
            "root",
            format!("no example files under '{}'", root.display()),
        ));
    }
    candidates.sort();
    DeterministicRng::new(options.seed).shuffle(&mut candidates);
    debug!(
        root = %root.display(),
        examples = candidates.len(),
        seed = options.seed,
        "collected class folder examples"
    );

    let staging = Staging::for_destination(destination)?;
    let mut writer = RecordStreamWriter::create(staging.dir().join(STAGED_STREAM), true)?;
    for (class, relative) in &candidates {
        let payload = fs::read(root.join(relative))?;
        writer.append(&Example::labeled(payload, *class))?;
    }
    let written = writer.finish()?;
    staging.commit_file(STAGED_STREAM)?;
    info!(
        root = %root.display(),
        destination = %destination.display(),
        examples = written,
        "imported dataset"
    );
    RecordStore::open(destination).map(ImportOutcome::Written)
}

/// Class id from the first path component, e.g. `3/img_0001.png` -> `3`.
fn class_of(relative: &Path) -> Result<ClassId, SplitError> {
    let mut components = relative.components();
    let first = components.next();
    let has_file = components.next().is_some();
    match first {
        Some(Component::Normal(name)) if has_file => name
            .to_str()
            .and_then(|name| name.parse::<ClassId>().ok())
            .ok_or_else(|| {
                SplitError::value(
                    "root",
                    format!(
                        "class folder '{}' is not a class id",
                        name.to_string_lossy()
                    ),
                )
            }),
        _ => Err(SplitError::value(
            "root",
            format!("'{}' is not inside a class folder", relative.display()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::RecordSource;
    use tempfile::tempdir;

    fn write_tree(root: &Path, files: &[(&str, &[u8])]) {
        for (relative, bytes) in files {
            let path = root.join(relative);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, bytes).unwrap();
        }
    }

    #[test]
    fn import_labels_examples_by_folder_and_is_reproducible() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("raw");
        write_tree(
            &root,
            &[
                ("0/a.jpg", b"zero-a"),
                ("0/b.jpg", b"zero-b"),
                ("1/a.jpg", b"one-a"),
                ("1/nested/c.jpg", b"one-c"),
                ("10/x.jpg", b"ten-x"),
            ],
        );
        let options = ImportOptions {
            seed: 7,
            ..ImportOptions::default()
        };
        let ImportOutcome::Written(store) =
            import_class_folders(&root, dir.path().join("first.sslr"), &options).unwrap()
        else {
            panic!("expected a fresh import");
        };
        let ImportOutcome::Written(again) =
            import_class_folders(&root, dir.path().join("second.sslr"), &options).unwrap()
        else {
            panic!("expected a fresh import");
        };

        assert_eq!(store.len(), 5);
        let counts = store.class_counts().unwrap();
        assert_eq!(counts.get(&0), Some(&2));
        assert_eq!(counts.get(&1), Some(&2));
        assert_eq!(counts.get(&10), Some(&1));
        for idx in 0..store.len() {
            assert_eq!(store.get(idx).unwrap(), again.get(idx).unwrap());
        }
        let one_c = (0..store.len())
            .map(|idx| store.get(idx).unwrap())
            .find(|example| example.payload == b"one-c")
            .unwrap();
        assert_eq!(one_c.label, Some(1));
    }

    #[test]
    fn existing_destination_is_skipped_unless_forced() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("raw");
        write_tree(&root, &[("0/a.jpg", b"a"), ("1/b.jpg", b"b")]);
        let destination = dir.path().join("toy-train.sslr");
        fs::write(&destination, b"placeholder").unwrap();

        let outcome =
            import_class_folders(&root, &destination, &ImportOptions::default()).unwrap();
        assert!(matches!(outcome, ImportOutcome::AlreadyInstalled(_)));
        assert_eq!(fs::read(&destination).unwrap(), b"placeholder");

        let forced = ImportOptions {
            force: true,
            ..ImportOptions::default()
        };
        let outcome = import_class_folders(&root, &destination, &forced).unwrap();
        assert!(matches!(outcome, ImportOutcome::Written(ref store) if store.len() == 2));
    }

    #[test]
    fn destination_inside_the_class_folders_is_rejected() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("raw");
        write_tree(&root, &[("0/a.jpg", b"a"), ("1/b.jpg", b"b")]);
        let forced = ImportOptions {
            force: true,
            ..ImportOptions::default()
        };

        for destination in [
            root.join("0").join("a.jpg"),
            root.join("1").join("..").join("out.sslr"),
            dir.path().to_path_buf(),
        ] {
            let err = import_class_folders(&root, &destination, &forced).unwrap_err();
            assert!(matches!(err, SplitError::Value { .. }), "{}", destination.display());
        }
        assert_eq!(fs::read(root.join("0/a.jpg")).unwrap(), b"a");
        assert!(!root.join("out.sslr").exists());
    }

    #[test]
    fn non_numeric_folders_and_loose_files_are_rejected() {
        let dir = tempdir().unwrap();
        let named = dir.path().join("named");
        write_tree(&named, &[("cats/a.jpg", b"a")]);
        let err = import_class_folders(&named, dir.path().join("o1.sslr"), &ImportOptions::default())
            .unwrap_err();
        assert!(matches!(err, SplitError::Value { .. }));

        let loose = dir.path().join("loose");
        write_tree(&loose, &[("a.jpg", b"a")]);
        let err = import_class_folders(&loose, dir.path().join("o2.sslr"), &ImportOptions::default())
            .unwrap_err();
        assert!(matches!(err, SplitError::Value { .. }));
        assert!(!dir.path().join("o2.sslr").exists());
    }
}
