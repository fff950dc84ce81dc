use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::constants::record_stream::{
    COUNT_OFFSET, FLAG_LABELED, FRAME_HEADER_LEN, HEADER_LEN, STREAM_MAGIC, STREAM_VERSION,
    TAG_LABELED, TAG_UNLABELED,
};
use crate::data::{ClassCounts, ClassId, ClassIndex, Example, ExampleIndex};
use crate::errors::SplitError;
use crate::hash::fnv1a64;
use crate::source::RecordSource;

/// Location and label of one frame, captured while validating the stream.
#[derive(Clone, Copy, Debug)]
struct FrameInfo {
    payload_offset: u64,
    payload_len: u32,
    checksum: u64,
    label: Option<ClassId>,
}

/// Immutable, random-access reader over a framed record stream.
///
/// Only the frame table is kept in memory. Every read opens its own file
/// handle, so a `RecordStore` can be shared across threads without locking.
pub struct RecordStore {
    path: PathBuf,
    labeled: bool,
    frames: Vec<FrameInfo>,
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.path)
            .field("labeled", &self.labeled)
            .field("len", &self.frames.len())
            .finish()
    }
}

impl RecordStore {
    /// Open and validate the record stream at `path`.
    ///
    /// Walks every frame header (payloads are skipped, not read) so framing
    /// errors surface here instead of midway through a split.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SplitError> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(SplitError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let file = File::open(path).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => SplitError::NotFound {
                path: path.to_path_buf(),
            },
            _ => SplitError::Io(err),
        })?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_LEN {
            return Err(SplitError::corruption(
                path,
                format!("file is {file_len} bytes, shorter than the {HEADER_LEN}-byte header"),
            ));
        }
        let mut reader = BufReader::new(file);

        let mut header = [0u8; HEADER_LEN as usize];
        reader.read_exact(&mut header)?;
        if header[0..4] != STREAM_MAGIC {
            return Err(SplitError::corruption(path, "bad magic bytes"));
        }
        if header[4] != STREAM_VERSION {
            return Err(SplitError::corruption(
                path,
                format!(
                    "unsupported stream version {} (expected {STREAM_VERSION})",
                    header[4]
                ),
            ));
        }
        let flags = header[5];
        if flags & !FLAG_LABELED != 0 || header[6] != 0 || header[7] != 0 {
            return Err(SplitError::corruption(path, "unknown header flags"));
        }
        let labeled = flags & FLAG_LABELED != 0;
        let count = read_u64(&header[8..16]);

        let mut frames = Vec::new();
        let mut position = HEADER_LEN;
        while position < file_len {
            if frames.len() as u64 == count {
                return Err(SplitError::corruption(
                    path,
                    format!(
                        "{} trailing bytes after {count} frames",
                        file_len - position
                    ),
                ));
            }
            if position + FRAME_HEADER_LEN > file_len {
                return Err(SplitError::corruption(
                    path,
                    format!("frame {} header is truncated", frames.len()),
                ));
            }
            let mut frame_header = [0u8; FRAME_HEADER_LEN as usize];
            reader.read_exact(&mut frame_header)?;
            let label = match frame_header[0] {
                TAG_LABELED if labeled => Some(read_u32(&frame_header[1..5])),
                TAG_UNLABELED if !labeled => None,
                tag => {
                    return Err(SplitError::corruption(
                        path,
                        format!(
                            "frame {} has tag {tag}, inconsistent with a {} stream",
                            frames.len(),
                            if labeled { "labeled" } else { "unlabeled" }
                        ),
                    ));
                }
            };
            let payload_len = read_u32(&frame_header[5..9]);
            let checksum = read_u64(&frame_header[9..17]);
            let payload_offset = position + FRAME_HEADER_LEN;
            let end = payload_offset + u64::from(payload_len);
            if end > file_len {
                return Err(SplitError::corruption(
                    path,
                    format!("frame {} payload is truncated", frames.len()),
                ));
            }
            reader.seek_relative(i64::from(payload_len))?;
            frames.push(FrameInfo {
                payload_offset,
                payload_len,
                checksum,
                label,
            });
            position = end;
        }
        if frames.len() as u64 != count {
            return Err(SplitError::corruption(
                path,
                format!("header declares {count} frames, found {}", frames.len()),
            ));
        }

        debug!(
            path = %path.display(),
            records = frames.len(),
            labeled,
            bytes = file_len,
            "opened record stream"
        );
        Ok(Self {
            path: path.to_path_buf(),
            labeled,
            frames,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sequential reader owning its own file handle.
    pub fn cursor(&self) -> Result<RecordCursor<'_>, SplitError> {
        let file = File::open(&self.path)?;
        Ok(RecordCursor {
            store: self,
            reader: BufReader::new(file),
            position: 0,
            next: 0,
        })
    }

    fn frame(&self, index: ExampleIndex) -> Result<&FrameInfo, SplitError> {
        usize::try_from(index)
            .ok()
            .and_then(|idx| self.frames.get(idx))
            .ok_or(SplitError::Index {
                index,
                len: self.frames.len() as u64,
            })
    }
}

impl RecordSource for RecordStore {
    fn len(&self) -> u64 {
        self.frames.len() as u64
    }

    fn is_labeled(&self) -> bool {
        self.labeled
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }

    fn get(&self, index: ExampleIndex) -> Result<Example, SplitError> {
        self.frame(index)?;
        let mut cursor = self.cursor()?;
        cursor.read(index)
    }

    fn label_at(&self, index: ExampleIndex) -> Result<Option<ClassId>, SplitError> {
        self.frame(index).map(|frame| frame.label)
    }

    fn class_indices(&self) -> Result<ClassIndex, SplitError> {
        if !self.labeled {
            return Err(SplitError::UnlabeledDataset {
                operation: "class_indices",
            });
        }
        let mut index = ClassIndex::new();
        for (position, frame) in self.frames.iter().enumerate() {
            if let Some(label) = frame.label {
                index.entry(label).or_default().push(position as u64);
            }
        }
        Ok(index)
    }

    fn class_counts(&self) -> Result<ClassCounts, SplitError> {
        if !self.labeled {
            return Err(SplitError::UnlabeledDataset {
                operation: "class_counts",
            });
        }
        let mut counts = ClassCounts::new();
        for label in self.frames.iter().filter_map(|frame| frame.label) {
            *counts.entry(label).or_insert(0) += 1;
        }
        Ok(counts)
    }

    fn visit(
        &self,
        indices: &[ExampleIndex],
        visitor: &mut dyn FnMut(ExampleIndex, Example) -> Result<(), SplitError>,
    ) -> Result<(), SplitError> {
        let mut cursor = self.cursor()?;
        for &index in indices {
            let example = cursor.read(index)?;
            visitor(index, example)?;
        }
        Ok(())
    }
}

/// Caller-owned sequential cursor over a `RecordStore`.
///
/// Iterating yields `(index, example)` pairs in stream order; `read` jumps to
/// any index and only seeks when the request is not the next frame on disk.
pub struct RecordCursor<'a> {
    store: &'a RecordStore,
    reader: BufReader<File>,
    position: u64,
    next: ExampleIndex,
}

impl RecordCursor<'_> {
    /// Read and checksum-verify the example at `index`.
    pub fn read(&mut self, index: ExampleIndex) -> Result<Example, SplitError> {
        let frame = *self.store.frame(index)?;
        if frame.payload_offset >= self.position {
            // Forward jumps keep the read buffer when the target is already in it.
            self.reader
                .seek_relative((frame.payload_offset - self.position) as i64)?;
        } else {
            self.reader.seek(SeekFrom::Start(frame.payload_offset))?;
        }
        // Unknown until the read completes; forces an absolute seek after a failure.
        self.position = u64::MAX;
        let mut payload = vec![0u8; frame.payload_len as usize];
        self.reader.read_exact(&mut payload).map_err(|err| {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                SplitError::corruption(&self.store.path, format!("frame {index} shrank on disk"))
            } else {
                SplitError::Io(err)
            }
        })?;
        self.position = frame.payload_offset + u64::from(frame.payload_len);
        if fnv1a64(&payload) != frame.checksum {
            return Err(SplitError::corruption(
                &self.store.path,
                format!("frame {index} payload checksum mismatch"),
            ));
        }
        self.next = index + 1;
        Ok(Example {
            payload,
            label: frame.label,
        })
    }
}

impl Iterator for RecordCursor<'_> {
    type Item = Result<(ExampleIndex, Example), SplitError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.store.len() {
            return None;
        }
        let index = self.next;
        let result = self.read(index).map(|example| (index, example));
        if result.is_err() {
            self.next = self.store.len();
        }
        Some(result)
    }
}

/// Append-only writer producing a framed record stream.
///
/// The header count is patched in by `finish`; a stream abandoned before
/// `finish` fails validation on open.
pub struct RecordStreamWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    labeled: bool,
    count: u64,
}

impl RecordStreamWriter {
    pub fn create(path: impl AsRef<Path>, labeled: bool) -> Result<Self, SplitError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path).map_err(|err| SplitError::write(&path, err))?;
        let mut writer = BufWriter::new(file);
        let mut header = [0u8; HEADER_LEN as usize];
        header[0..4].copy_from_slice(&STREAM_MAGIC);
        header[4] = STREAM_VERSION;
        header[5] = if labeled { FLAG_LABELED } else { 0 };
        writer
            .write_all(&header)
            .map_err(|err| SplitError::write(&path, err))?;
        Ok(Self {
            path,
            writer,
            labeled,
            count: 0,
        })
    }

    pub fn append(&mut self, example: &Example) -> Result<(), SplitError> {
        let (tag, label) = match (self.labeled, example.label) {
            (true, Some(label)) => (TAG_LABELED, label),
            (false, None) => (TAG_UNLABELED, 0),
            (true, None) => {
                return Err(SplitError::value(
                    "example",
                    format!("record {} has no label in a labeled stream", self.count),
                ));
            }
            (false, Some(_)) => {
                return Err(SplitError::value(
                    "example",
                    format!("record {} carries a label in an unlabeled stream", self.count),
                ));
            }
        };
        let payload_len = u32::try_from(example.payload.len()).map_err(|_| {
            SplitError::value(
                "example",
                format!(
                    "record {} payload of {} bytes exceeds the frame limit",
                    self.count,
                    example.payload.len()
                ),
            )
        })?;
        let mut frame_header = [0u8; FRAME_HEADER_LEN as usize];
        frame_header[0] = tag;
        frame_header[1..5].copy_from_slice(&label.to_le_bytes());
        frame_header[5..9].copy_from_slice(&payload_len.to_le_bytes());
        frame_header[9..17].copy_from_slice(&fnv1a64(&example.payload).to_le_bytes());
        self.writer
            .write_all(&frame_header)
            .and_then(|_| self.writer.write_all(&example.payload))
            .map_err(|err| SplitError::write(&self.path, err))?;
        self.count += 1;
        Ok(())
    }

    /// Patch the record count, flush, and sync. Returns the number of records.
    pub fn finish(self) -> Result<u64, SplitError> {
        let Self {
            path,
            writer,
            count,
            ..
        } = self;
        let mut file = writer
            .into_inner()
            .map_err(|err| SplitError::write(&path, err.error()))?;
        file.seek(SeekFrom::Start(COUNT_OFFSET))
            .and_then(|_| file.write_all(&count.to_le_bytes()))
            .and_then(|_| file.sync_all())
            .map_err(|err| SplitError::write(&path, err))?;
        Ok(count)
    }
}

fn read_u32(bytes: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(bytes);
    u32::from_le_bytes(buf)
}

fn read_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}
