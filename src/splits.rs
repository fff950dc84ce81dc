use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::sampler::ALGORITHM;
use crate::constants::splits::{
    BITCODE_PREFIX, INDEX_FILENAME, INDEX_RECORD_VERSION, MANIFEST_FILENAME, MANIFEST_VERSION,
    RECORDS_FILENAME,
};
use crate::data::{ClassCounts, ExampleIndex};
use crate::errors::SplitError;
use crate::hash::index_fingerprint;
use crate::sampler::{SplitRequest, SplitResult, sample_source};
use crate::source::{RecordSource, RecordStore, RecordStreamWriter};
use crate::transport::{Staging, path_is_within};
use crate::types::{DatasetName, Fingerprint, SplitKeyString};

/// Human-readable description of a split artifact, stored as `manifest.json`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitManifest {
    pub version: u8,
    /// Registry key, when the split was produced through a registry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<SplitKeyString>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dataset: Option<DatasetName>,
    pub seed: u64,
    pub size: u64,
    pub class_balanced: bool,
    /// Sampler algorithm that produced the selection.
    pub algorithm: String,
    /// Number of examples in the source the split was drawn from.
    pub source_len: u64,
    /// Per-class quotas; empty for uniform splits.
    pub quotas: ClassCounts,
    /// FNV-1a fingerprint of the ascending selected index list.
    pub fingerprint: Fingerprint,
}

impl SplitManifest {
    pub fn request(&self) -> SplitRequest {
        SplitRequest::new(self.seed, self.size, self.class_balanced)
    }
}

/// Compact side index of the selected global indices (`indices.bin`).
#[derive(Clone, Debug, PartialEq, Eq, bitcode::Encode, bitcode::Decode)]
struct PersistedIndex {
    seed: u64,
    size: u64,
    class_balanced: bool,
    source_len: u64,
    indices: Vec<ExampleIndex>,
}

/// Writes split artifacts: the selected examples in source order, the
/// manifest, and the compact index, committed atomically.
#[derive(Clone, Debug, Default)]
pub struct SplitWriter {
    key: Option<SplitKeyString>,
    dataset: Option<DatasetName>,
}

impl SplitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stamp artifacts with a registry key.
    pub fn with_key(mut self, key: impl Into<SplitKeyString>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_dataset(mut self, dataset: impl Into<DatasetName>) -> Self {
        self.dataset = Some(dataset.into());
        self
    }

    /// Write the examples selected by `result` from `source` to the artifact
    /// directory `destination`.
    ///
    /// Either a complete artifact appears at `destination` or the destination
    /// is left as it was. The source is only read.
    pub fn write<S>(
        &self,
        source: &S,
        result: &SplitResult,
        destination: impl AsRef<Path>,
    ) -> Result<SplitArtifact, SplitError>
    where
        S: RecordSource + ?Sized,
    {
        let destination = destination.as_ref();
        self.check_inputs(source, result, destination)?;

        let indices = result.sorted_indices();
        let staging = Staging::for_destination(destination)?;
        let records_path = staging.dir().join(RECORDS_FILENAME);
        let mut writer = RecordStreamWriter::create(&records_path, source.is_labeled())
            .map_err(|err| retarget(err, destination))?;
        source.visit(&indices, &mut |_, example| {
            writer
                .append(&example)
                .map_err(|err| retarget(err, destination))
        })?;
        let written = writer.finish().map_err(|err| retarget(err, destination))?;
        debug!(
            destination = %destination.display(),
            records = written,
            "staged split records"
        );

        let persisted = PersistedIndex {
            seed: result.seed(),
            size: result.size(),
            class_balanced: result.class_balanced(),
            source_len: source.len(),
            indices,
        };
        let manifest = SplitManifest {
            version: MANIFEST_VERSION,
            key: self.key.clone(),
            dataset: self.dataset.clone(),
            seed: result.seed(),
            size: result.size(),
            class_balanced: result.class_balanced(),
            algorithm: ALGORITHM.to_string(),
            source_len: source.len(),
            quotas: result.quotas.clone(),
            fingerprint: result.fingerprint(),
        };
        write_synced(&staging.dir().join(INDEX_FILENAME), &encode_index(&persisted))
            .map_err(|err| SplitError::write(destination, err))?;
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)
            .map_err(|err| SplitError::write(destination, err))?;
        write_synced(&staging.dir().join(MANIFEST_FILENAME), &manifest_bytes)
            .map_err(|err| SplitError::write(destination, err))?;

        staging.commit_dir()?;
        info!(
            destination = %destination.display(),
            key = manifest.key.as_deref().unwrap_or("-"),
            seed = manifest.seed,
            size = manifest.size,
            class_balanced = manifest.class_balanced,
            fingerprint = %manifest.fingerprint,
            "wrote split artifact"
        );
        SplitArtifact::open(destination)
    }

    fn check_inputs<S>(
        &self,
        source: &S,
        result: &SplitResult,
        destination: &Path,
    ) -> Result<(), SplitError>
    where
        S: RecordSource + ?Sized,
    {
        if result.population != source.len() {
            return Err(SplitError::value(
                "result",
                format!(
                    "split was drawn from {} examples but the source holds {}",
                    result.population,
                    source.len()
                ),
            ));
        }
        if let Some(last) = result.selected_indices.last()
            && *last >= source.len()
        {
            return Err(SplitError::Index {
                index: *last,
                len: source.len(),
            });
        }
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
        Ok(())
    }
}

/// Typed handle to a committed split artifact directory.
#[derive(Debug)]
pub struct SplitArtifact {
    root: PathBuf,
    manifest: SplitManifest,
    indices: Vec<ExampleIndex>,
    records: RecordStore,
}

impl SplitArtifact {
    /// Open an artifact and check that manifest, index and records agree.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, SplitError> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(SplitError::NotFound { path: root });
        }
        let manifest_path = root.join(MANIFEST_FILENAME);
        let manifest_bytes = read_artifact_file(&manifest_path)?;
        let manifest: SplitManifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|err| SplitError::corruption(&manifest_path, err.to_string()))?;
        if manifest.version != MANIFEST_VERSION {
            return Err(SplitError::corruption(
                &manifest_path,
                format!("unsupported manifest version {}", manifest.version),
            ));
        }

        let index_path = root.join(INDEX_FILENAME);
        let persisted = decode_index(&index_path, &read_artifact_file(&index_path)?)?;
        let records = RecordStore::open(root.join(RECORDS_FILENAME))?;

        let mismatch = |details: String| Err(SplitError::corruption(&root, details));
        if (persisted.seed, persisted.size, persisted.class_balanced, persisted.source_len)
            != (
                manifest.seed,
                manifest.size,
                manifest.class_balanced,
                manifest.source_len,
            )
        {
            return mismatch("index parameters disagree with the manifest".into());
        }
        if persisted.indices.len() as u64 != manifest.size || records.len() != manifest.size {
            return mismatch(format!(
                "manifest declares {} examples; index holds {}, records hold {}",
                manifest.size,
                persisted.indices.len(),
                records.len()
            ));
        }
        if persisted.indices.windows(2).any(|pair| pair[0] >= pair[1])
            || persisted
                .indices
                .last()
                .is_some_and(|last| *last >= manifest.source_len)
        {
            return mismatch("index list is not strictly ascending within the source".into());
        }
        if index_fingerprint(&persisted.indices) != manifest.fingerprint {
            return mismatch("index fingerprint does not match the manifest".into());
        }

        Ok(Self {
            root,
            manifest,
            indices: persisted.indices,
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    pub fn manifest(&self) -> &SplitManifest {
        &self.manifest
    }

    /// Selected global indices, ascending; position `i` maps to record `i`.
    pub fn indices(&self) -> &[ExampleIndex] {
        &self.indices
    }

    pub fn records(&self) -> &RecordStore {
        &self.records
    }

    /// Re-derive the selection from `source` and confirm that both the index
    /// list and every stored example match it.
    pub fn verify_against<S>(&self, source: &S) -> Result<(), SplitError>
    where
        S: RecordSource + ?Sized,
    {
        if source.len() != self.manifest.source_len {
            return Err(SplitError::corruption(
                &self.root,
                format!(
                    "artifact was drawn from {} examples, source holds {}",
                    self.manifest.source_len,
                    source.len()
                ),
            ));
        }
        let expected = sample_source(source, &self.manifest.request())?;
        if expected.sorted_indices() != self.indices {
            return Err(SplitError::corruption(
                &self.root,
                "stored selection differs from the selection derived from the source",
            ));
        }

        let mut cursor = self.records.cursor()?;
        source.visit(&self.indices, &mut |global, example| {
            let (position, stored) = cursor.next().ok_or_else(|| {
                SplitError::corruption(self.records.path(), "fewer records than indices")
            })??;
            if stored != example {
                return Err(SplitError::corruption(
                    self.records.path(),
                    format!("record {position} differs from source example {global}"),
                ));
            }
            Ok(())
        })?;
        debug!(artifact = %self.root.display(), "artifact matches source");
        Ok(())
    }
}

fn read_artifact_file(path: &Path) -> Result<Vec<u8>, SplitError> {
    fs::read(path).map_err(|err| match err.kind() {
        io::ErrorKind::NotFound => SplitError::NotFound {
            path: path.to_path_buf(),
        },
        _ => SplitError::Io(err),
    })
}

fn write_synced(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()
}

/// Point write failures at the artifact destination instead of the staging path.
fn retarget(err: SplitError, destination: &Path) -> SplitError {
    match err {
        SplitError::Write { reason, .. } => SplitError::write(destination, reason),
        other => other,
    }
}

fn encode_index(index: &PersistedIndex) -> Vec<u8> {
    let payload = bitcode::encode(index);
    let mut buf = Vec::with_capacity(2 + payload.len());
    buf.push(INDEX_RECORD_VERSION);
    buf.push(BITCODE_PREFIX);
    buf.extend_from_slice(&payload);
    buf
}

fn decode_index(path: &Path, bytes: &[u8]) -> Result<PersistedIndex, SplitError> {
    match bytes {
        [INDEX_RECORD_VERSION, BITCODE_PREFIX, payload @ ..] => bitcode::decode(payload)
            .map_err(|err| SplitError::corruption(path, format!("corrupt index record: {err}"))),
        [INDEX_RECORD_VERSION, ..] => Err(SplitError::corruption(
            path,
            "bitcode payload missing expected prefix",
        )),
        _ => Err(SplitError::corruption(path, "index record version mismatch")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Example;
    use crate::sampler::{Population, sample};
    use crate::source::InMemorySource;
    use tempfile::tempdir;

    fn labeled_source(len: u32, classes: u32) -> InMemorySource {
        let labels: Vec<u32> = (0..len).map(|idx| idx % classes).collect();
        InMemorySource::from_labels(&labels)
    }

    #[test]
    fn index_record_requires_version_and_prefix() {
        let path = Path::new("indices.bin");
        let err = decode_index(path, &[0x7F, BITCODE_PREFIX]).unwrap_err();
        assert!(matches!(err, SplitError::Corruption { ref details, .. } if details.contains("version")));

        let err = decode_index(path, &[INDEX_RECORD_VERSION, 0x00, 0x01]).unwrap_err();
        assert!(
            matches!(err, SplitError::Corruption { ref details, .. } if details.contains("missing expected prefix"))
        );

        let err = decode_index(path, &[INDEX_RECORD_VERSION, BITCODE_PREFIX, 0xFF]).unwrap_err();
        assert!(matches!(err, SplitError::Corruption { .. }));
    }

    #[test]
    fn index_record_roundtrips() {
        let index = PersistedIndex {
            seed: 3,
            size: 2,
            class_balanced: true,
            source_len: 10,
            indices: vec![4, 9],
        };
        let decoded = decode_index(Path::new("x"), &encode_index(&index)).unwrap();
        assert_eq!(decoded, index);
    }

    #[test]
    fn written_artifact_reopens_and_verifies() {
        let dir = tempdir().unwrap();
        let source = labeled_source(40, 4);
        let result = sample_source(&source, &SplitRequest::new(5, 8, true)).unwrap();
        let artifact = SplitWriter::new()
            .with_key("toy.5@8-balanced")
            .with_dataset("toy")
            .write(&source, &result, dir.path().join("split"))
            .unwrap();

        assert_eq!(artifact.indices(), result.sorted_indices().as_slice());
        assert_eq!(artifact.records().len(), 8);
        assert_eq!(artifact.manifest().key.as_deref(), Some("toy.5@8-balanced"));
        assert_eq!(artifact.manifest().algorithm, ALGORITHM);
        assert_eq!(artifact.manifest().quotas.values().sum::<u64>(), 8);
        artifact.verify_against(&source).unwrap();

        let reopened = SplitArtifact::open(dir.path().join("split")).unwrap();
        assert_eq!(reopened.manifest(), artifact.manifest());
    }

    #[test]
    fn records_follow_source_order_with_labels() {
        let dir = tempdir().unwrap();
        let source = labeled_source(30, 3);
        let result = sample_source(&source, &SplitRequest::new(1, 6, false)).unwrap();
        let artifact = SplitWriter::new()
            .write(&source, &result, dir.path().join("split"))
            .unwrap();

        let stored: Vec<Example> = artifact
            .records()
            .cursor()
            .unwrap()
            .map(|item| item.unwrap().1)
            .collect();
        let expected: Vec<Example> = artifact
            .indices()
            .iter()
            .map(|idx| source.get(*idx).unwrap())
            .collect();
        assert_eq!(stored, expected);
    }

    #[test]
    fn verification_detects_a_different_source() {
        let dir = tempdir().unwrap();
        let source = labeled_source(20, 2);
        let result = sample_source(&source, &SplitRequest::new(2, 4, true)).unwrap();
        let artifact = SplitWriter::new()
            .write(&source, &result, dir.path().join("split"))
            .unwrap();

        let relabeled: Vec<u32> = (0..20).map(|idx| (idx + 1) % 2).collect();
        let other = InMemorySource::from_labels(&relabeled);
        let err = artifact.verify_against(&other).unwrap_err();
        assert!(matches!(err, SplitError::Corruption { .. }));
    }

    #[test]
    fn writer_rejects_results_from_another_population() {
        let dir = tempdir().unwrap();
        let source = labeled_source(10, 2);
        let result = sample(Population::Total(50), &SplitRequest::new(0, 3, false)).unwrap();
        let err = SplitWriter::new()
            .write(&source, &result, dir.path().join("split"))
            .unwrap_err();
        assert!(matches!(err, SplitError::Value { parameter: "result", .. }));
        assert!(!dir.path().join("split").exists());
    }

    #[test]
    fn open_rejects_missing_and_tampered_artifacts() {
        let dir = tempdir().unwrap();
        assert!(matches!(
            SplitArtifact::open(dir.path().join("absent")),
            Err(SplitError::NotFound { .. })
        ));

        let source = labeled_source(12, 3);
        let result = sample_source(&source, &SplitRequest::new(4, 3, true)).unwrap();
        let root = dir.path().join("split");
        SplitWriter::new().write(&source, &result, &root).unwrap();

        let manifest_path = root.join(MANIFEST_FILENAME);
        let mut manifest: SplitManifest =
            serde_json::from_slice(&fs::read(&manifest_path).unwrap()).unwrap();
        manifest.fingerprint = "0000000000000000".into();
        fs::write(&manifest_path, serde_json::to_vec(&manifest).unwrap()).unwrap();
        assert!(matches!(
            SplitArtifact::open(&root),
            Err(SplitError::Corruption { .. })
        ));

        fs::remove_file(root.join(INDEX_FILENAME)).unwrap();
        assert!(matches!(
            SplitArtifact::open(&root),
            Err(SplitError::NotFound { .. })
        ));
    }
}
