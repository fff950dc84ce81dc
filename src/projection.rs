use std::path::Path;

use tracing::info;

use crate::errors::SplitError;
use crate::source::{RecordSource, RecordStore, RecordStreamWriter};
use crate::transport::{Staging, path_is_within};

const STAGED_STREAM: &str = "view.sslr";

/// Write every example of `source`, in order, with its label removed.
///
/// The view is an independent copy; `source` is only read. Output is staged
/// and renamed into place, so `destination` is either the complete view or
/// untouched.
pub fn write_unlabeled_view<S>(
    source: &S,
    destination: impl AsRef<Path>,
) -> Result<RecordStore, SplitError>
where
    S: RecordSource + ?Sized,
{
    let destination = destination.as_ref();
    if let Some(location) = source.location()
        && path_is_within(location, destination)
    {
        return Err(SplitError::value(
            "destination",
            format!(
                "'{}' would replace the source '{}'",
                destination.display(),
                location.display()
            ),
        ));
    }
    let staging = Staging::for_destination(destination)?;
    let mut writer = RecordStreamWriter::create(staging.dir().join(STAGED_STREAM), false)?;
    let indices: Vec<u64> = (0..source.len()).collect();
    source.visit(&indices, &mut |_, example| {
        writer.append(&example.without_label())
    })?;
    let written = writer.finish()?;
    staging.commit_file(STAGED_STREAM)?;
    info!(
        destination = %destination.display(),
        records = written,
        "wrote unlabeled view"
    );
    RecordStore::open(destination)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use tempfile::tempdir;

    #[test]
    fn view_keeps_payloads_and_order_without_labels() {
        let dir = tempdir().unwrap();
        let source = InMemorySource::from_labels(&[3, 1, 4, 1, 5]);
        let view = write_unlabeled_view(&source, dir.path().join("toy-unlabeled.sslr")).unwrap();

        assert!(!view.is_labeled());
        assert_eq!(view.len(), source.len());
        for idx in 0..source.len() {
            let original = source.get(idx).unwrap();
            let stripped = view.get(idx).unwrap();
            assert_eq!(stripped.payload, original.payload);
            assert_eq!(stripped.label, None);
        }
        assert!(matches!(
            view.class_counts(),
            Err(SplitError::UnlabeledDataset { .. })
        ));
    }

    #[test]
    fn view_refuses_to_overwrite_its_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toy-train.sslr");
        write_unlabeled_view(&InMemorySource::from_labels(&[0, 1]), &path).unwrap();
        let store = RecordStore::open(&path).unwrap();
        let err = write_unlabeled_view(&store, &path).unwrap_err();
        assert!(matches!(err, SplitError::Value { .. }));
        assert_eq!(RecordStore::open(&path).unwrap().len(), 2);
    }

    #[test]
    fn view_refuses_aliases_of_its_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("toy-train.sslr");
        let labeled = InMemorySource::from_labels(&[0, 1, 1]);
        let mut writer = RecordStreamWriter::create(&path, true).unwrap();
        for example in labeled.examples() {
            writer.append(example).unwrap();
        }
        writer.finish().unwrap();
        let store = RecordStore::open(&path).unwrap();
        let before = std::fs::read(&path).unwrap();

        for alias in [
            dir.path().join("sub").join("..").join("toy-train.sslr"),
            dir.path().join(".").join("toy-train.sslr"),
            dir.path().to_path_buf(),
        ] {
            let err = write_unlabeled_view(&store, &alias).unwrap_err();
            assert!(matches!(err, SplitError::Value { .. }), "{}", alias.display());
        }
        assert_eq!(std::fs::read(&path).unwrap(), before);
        assert!(RecordStore::open(&path).unwrap().is_labeled());
    }
}
