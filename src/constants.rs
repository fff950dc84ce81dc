/// Constants used by platform-stable hashing.
pub mod hash {
    /// FNV-1a 64-bit offset basis.
    pub const FNV1A64_OFFSET: u64 = 0xcbf29ce484222325;
    /// FNV-1a 64-bit prime.
    pub const FNV1A64_PRIME: u64 = 0x100000001b3;
}

/// Constants describing the on-disk record stream framing.
pub mod record_stream {
    /// Leading magic bytes of every record stream.
    pub const STREAM_MAGIC: [u8; 4] = *b"SSLR";
    /// Current record stream layout version.
    pub const STREAM_VERSION: u8 = 1;
    /// Header flag bit set when every frame carries a class label.
    pub const FLAG_LABELED: u8 = 0b0000_0001;
    /// Fixed header size: magic, version, flags, two reserved bytes, `u64` count.
    pub const HEADER_LEN: u64 = 16;
    /// Byte offset of the `u64` record count inside the header.
    pub const COUNT_OFFSET: u64 = 8;
    /// Fixed frame header size: tag, `u32` label, `u32` length, `u64` checksum.
    pub const FRAME_HEADER_LEN: u64 = 17;
    /// Frame tag for an example without a label.
    pub const TAG_UNLABELED: u8 = 0;
    /// Frame tag for an example carrying a label.
    pub const TAG_LABELED: u8 = 1;
    /// File extension used for record streams.
    pub const STREAM_EXTENSION: &str = "sslr";
}

/// Constants used by the index sampler's deterministic generator.
pub mod sampler {
    /// Versioned name of the generator + shuffle algorithm, stamped into manifests.
    pub const ALGORITHM: &str = "splitmix64-fy/v1";
    /// SplitMix64 state increment (golden-ratio gamma).
    pub const SPLITMIX_GAMMA: u64 = 0x9E3779B97F4A7C15;
    /// First SplitMix64 finalizer multiplier.
    pub const SPLITMIX_MUL_1: u64 = 0xBF58476D1CE4E5B9;
    /// Second SplitMix64 finalizer multiplier.
    pub const SPLITMIX_MUL_2: u64 = 0x94D049BB133111EB;
    /// Base mixed with the class id to derive per-class sub-seeds:
    /// `seed ^ CLASS_SEED_BASE.wrapping_add(class)`.
    pub const CLASS_SEED_BASE: u64 = 0xC1A5_5EED_0000_0000;
}

/// Constants used by split artifacts and their manifests.
pub mod splits {
    /// File name of the record stream inside a split artifact directory.
    pub const RECORDS_FILENAME: &str = "records.sslr";
    /// File name of the JSON manifest inside a split artifact directory.
    pub const MANIFEST_FILENAME: &str = "manifest.json";
    /// File name of the compact bitcode index inside a split artifact directory.
    pub const INDEX_FILENAME: &str = "indices.bin";
    /// Version tag for manifests.
    pub const MANIFEST_VERSION: u8 = 1;
    /// Version tag for compact index payloads.
    pub const INDEX_RECORD_VERSION: u8 = 1;
    /// Prefix marker for bitcode-encoded payloads.
    pub const BITCODE_PREFIX: u8 = b'B';
    /// Prefix for hidden staging directories created next to a destination.
    pub const STAGING_PREFIX: &str = ".staging-";
    /// Suffix used when a previous artifact is moved aside during replacement.
    pub const REPLACED_SUFFIX: &str = "old";
}

/// Constants used by the split registry.
pub mod registry {
    /// Mode suffix for class-balanced splits.
    pub const MODE_BALANCED: &str = "balanced";
    /// Mode suffix for uniformly sampled splits.
    pub const MODE_UNIFORM: &str = "uniform";
    /// Datasets known to the default registry with their class counts.
    pub const DEFAULT_DATASETS: &[(&str, u32)] = &[
        ("cifar10", 10),
        ("cifar100", 100),
        ("svhn", 10),
        ("svhn_noextra", 10),
        ("stl10", 10),
        ("mnist", 10),
        ("fashion_mnist", 10),
        ("voets", 2),
    ];
}

/// Constants used by pipeline configuration and artifact layout.
pub mod layout {
    /// Default data root when none is configured.
    pub const DEFAULT_DATA_ROOT: &str = "data";
    /// Default project namespace holding split artifacts.
    pub const DEFAULT_NAMESPACE: &str = "SSL";
    /// Subset name of the labeled source stream.
    pub const TRAIN_SUBSET: &str = "train";
    /// Subset name of the label-stripped view.
    pub const UNLABELED_SUBSET: &str = "unlabeled";
    /// Environment variable read by the CLI layer (never by the library).
    pub const DATA_ROOT_ENV: &str = "ML_DATA";
}
