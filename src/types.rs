/// Integer class label attached to a labeled example.
/// Examples: `0`, `9`, `99`
pub type ClassId = u32;
/// Global position of an example inside a record stream.
/// Examples: `0`, `49_999`
pub type ExampleIndex = u64;
/// Registered dataset name used in split keys and artifact layout.
/// Examples: `cifar10`, `svhn_noextra`, `voets`
pub type DatasetName = String;
/// Stable split identifier produced by the registry.
/// Example: `cifar10.3@250-balanced`
pub type SplitKeyString = String;
/// Hex-encoded FNV-1a fingerprint of a selected index list.
/// Example: `9f2c4b1a7e30d655`
pub type Fingerprint = String;
