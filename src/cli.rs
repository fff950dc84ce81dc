use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{ArgAction, Parser, error::ErrorKind};
use thiserror::Error;
use tracing::info;

use crate::config::PipelineConfig;
use crate::constants::layout::{DATA_ROOT_ENV, DEFAULT_DATA_ROOT, DEFAULT_NAMESPACE};
use crate::errors::SplitError;
use crate::ingestion::{ImportOptions, ImportOutcome, import_class_folders};
use crate::metrics::{class_skew, format_count};
use crate::pipeline::SplitPipeline;
use crate::projection::write_unlabeled_view;
use crate::registry::DatasetRegistry;
use crate::sampler::{SplitRequest, sample_source};
use crate::source::{RecordSource, RecordStore};
use crate::splits::{SplitArtifact, SplitWriter};

/// Exit code for command-line usage errors.
pub const USAGE_EXIT_CODE: u8 = 64;

/// Failure of a command-line runner.
#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Usage(#[from] clap::Error),
    #[error(transparent)]
    Split(#[from] SplitError),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Usage(_) => USAGE_EXIT_CODE,
            Self::Split(err) => err.exit_code(),
        }
    }
}

/// Print a runner failure to stderr and turn it into a process exit code.
pub fn report(result: Result<(), CliError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(CliError::Usage(err)) => {
            let _ = err.print();
            ExitCode::from(USAGE_EXIT_CODE)
        }
        Err(CliError::Split(err)) => {
            eprintln!("error[{}]: {err}", err.kind());
            ExitCode::from(err.exit_code())
        }
    }
}

#[derive(Debug, Parser)]
#[command(
    name = "generate-split",
    disable_help_subcommand = true,
    about = "Generate reproducible labeled subsets",
    long_about = "Deterministically select a labeled subset of a record stream from a seed and a size, and write it as a split artifact.",
    after_help = "With SOURCE and DESTINATION, one split is written to DESTINATION. Without them, --dataset selects <data-root>/<dataset>-train.sslr and every --seed/--size combination is written under <data-root>/<namespace>/<key>/ in parallel."
)]
struct GenerateSplitCli {
    #[arg(
        long,
        required = true,
        action = ArgAction::Append,
        help = "Split seed; repeat for several seeds"
    )]
    seed: Vec<u64>,
    #[arg(
        long,
        required = true,
        action = ArgAction::Append,
        allow_negative_numbers = true,
        help = "Number of labeled examples; repeat for several sizes"
    )]
    size: Vec<i64>,
    #[arg(long = "class-balanced", help = "Select the same number of examples per class")]
    class_balanced: bool,
    #[arg(long, value_name = "NAME", help = "Dataset name from the registry")]
    dataset: Option<String>,
    #[arg(
        long = "data-root",
        value_name = "DIR",
        env = DATA_ROOT_ENV,
        default_value = DEFAULT_DATA_ROOT,
        help = "Root directory of record streams and split artifacts"
    )]
    data_root: PathBuf,
    #[arg(
        long,
        value_name = "DIR",
        default_value = DEFAULT_NAMESPACE,
        help = "Artifact namespace under the data root"
    )]
    namespace: String,
    #[arg(value_name = "SOURCE", requires = "destination", help = "Record stream to sample from")]
    source: Option<PathBuf>,
    #[arg(value_name = "DESTINATION", help = "Artifact directory to write")]
    destination: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(
    name = "import-dataset",
    disable_help_subcommand = true,
    about = "Build a labeled record stream from class folders",
    long_about = "Read every file under <ROOT>/<class-id>/ and write a canonical shuffled, labeled record stream.",
    after_help = "An existing output is left untouched unless --force is given."
)]
struct ImportDatasetCli {
    #[arg(value_name = "ROOT", help = "Directory holding one sub-directory per class id")]
    root: PathBuf,
    #[arg(long, value_name = "NAME", required_unless_present = "output", help = "Dataset name from the registry")]
    dataset: Option<String>,
    #[arg(
        long = "data-root",
        value_name = "DIR",
        env = DATA_ROOT_ENV,
        default_value = DEFAULT_DATA_ROOT,
        help = "Root directory of record streams"
    )]
    data_root: PathBuf,
    #[arg(long, value_name = "PATH", help = "Explicit output path instead of <data-root>/<dataset>-train.sslr")]
    output: Option<PathBuf>,
    #[arg(long, default_value_t = 0, help = "Seed of the canonical shuffle")]
    seed: u64,
    #[arg(long, help = "Rebuild an existing output")]
    force: bool,
    #[arg(long = "follow-links", help = "Follow symlinks inside class folders")]
    follow_links: bool,
}

#[derive(Debug, Parser)]
#[command(
    name = "unlabel-dataset",
    disable_help_subcommand = true,
    about = "Write the label-stripped view of a record stream",
    after_help = "Without SOURCE and DESTINATION, --dataset selects <data-root>/<dataset>-train.sslr and writes <data-root>/<dataset>-unlabeled.sslr."
)]
struct UnlabelDatasetCli {
    #[arg(long, value_name = "NAME", help = "Dataset name from the registry")]
    dataset: Option<String>,
    #[arg(
        long = "data-root",
        value_name = "DIR",
        env = DATA_ROOT_ENV,
        default_value = DEFAULT_DATA_ROOT,
        help = "Root directory of record streams"
    )]
    data_root: PathBuf,
    #[arg(value_name = "SOURCE", requires = "destination", help = "Labeled record stream")]
    source: Option<PathBuf>,
    #[arg(value_name = "DESTINATION", help = "Output record stream")]
    destination: Option<PathBuf>,
}

#[derive(Debug, Parser)]
#[command(
    name = "inspect-dataset",
    disable_help_subcommand = true,
    about = "Summarize a record stream or split artifact",
    after_help = "A directory is opened as a split artifact; anything else as a record stream."
)]
struct InspectDatasetCli {
    #[arg(value_name = "PATH", help = "Record stream or split artifact directory")]
    path: PathBuf,
    #[arg(
        long = "verify-against",
        value_name = "SOURCE",
        help = "Re-derive an artifact's selection from this record stream and compare"
    )]
    verify_against: Option<PathBuf>,
}

pub fn run_generate_split<I>(args_iter: I) -> Result<(), CliError>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<GenerateSplitCli, _>(
        std::iter::once("generate-split".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let mut requests = Vec::with_capacity(cli.seed.len() * cli.size.len());
    for seed in &cli.seed {
        for size in &cli.size {
            requests.push(SplitRequest::try_new(*seed, *size, cli.class_balanced)?);
        }
    }

    if let (Some(source), Some(destination)) = (&cli.source, &cli.destination) {
        let [request] = requests.as_slice() else {
            return Err(SplitError::value(
                "seed",
                "an explicit DESTINATION takes exactly one --seed and one --size",
            )
            .into());
        };
        let store = RecordStore::open(source)?;
        let mut writer = SplitWriter::new();
        if let Some(dataset) = &cli.dataset {
            let key = DatasetRegistry::default().key(dataset, request)?;
            writer = writer.with_key(key.to_string()).with_dataset(dataset.clone());
        }
        let result = sample_source(&store, request)?;
        let artifact = writer.write(&store, &result, destination)?;
        print_artifact(&artifact);
        return Ok(());
    }

    let config = layout_config(cli.dataset, cli.data_root)?.with_namespace(cli.namespace);
    let pipeline = SplitPipeline::open(config)?;
    for artifact in pipeline.generate_all(&requests)? {
        print_artifact(&artifact);
    }
    Ok(())
}

pub fn run_import_dataset<I>(args_iter: I) -> Result<(), CliError>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<ImportDatasetCli, _>(
        std::iter::once("import-dataset".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let destination = match cli.output {
        Some(output) => output,
        None => layout_config(cli.dataset, cli.data_root)?.train_path(),
    };
    let options = ImportOptions {
        seed: cli.seed,
        force: cli.force,
        follow_links: cli.follow_links,
    };
    match import_class_folders(&cli.root, &destination, &options)? {
        ImportOutcome::Written(store) => {
            println!("imported: {}", store.path().display());
            print_stream_summary(&store)?;
        }
        ImportOutcome::AlreadyInstalled(path) => {
            println!("skipping already installed: {}", path.display());
        }
    }
    Ok(())
}

pub fn run_unlabel_dataset<I>(args_iter: I) -> Result<(), CliError>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<UnlabelDatasetCli, _>(
        std::iter::once("unlabel-dataset".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let view = match (cli.source, cli.destination) {
        (Some(source), Some(destination)) => {
            write_unlabeled_view(&RecordStore::open(source)?, destination)?
        }
        _ => {
            let config = layout_config(cli.dataset, cli.data_root)?;
            let source = RecordStore::open(config.train_path())?;
            write_unlabeled_view(&source, config.unlabeled_path())?
        }
    };
    println!("unlabeled view: {}", view.path().display());
    println!("  examples: {}", format_count(view.len()));
    Ok(())
}

pub fn run_inspect_dataset<I>(args_iter: I) -> Result<(), CliError>
where
    I: Iterator<Item = String>,
{
    init_tracing();
    let Some(cli) = parse_cli::<InspectDatasetCli, _>(
        std::iter::once("inspect-dataset".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    if cli.path.is_dir() {
        let artifact = SplitArtifact::open(&cli.path)?;
        print_artifact(&artifact);
        let manifest = artifact.manifest();
        println!("  algorithm: {}", manifest.algorithm);
        println!("  source examples: {}", format_count(manifest.source_len));
        print_stream_summary(artifact.records())?;
        if let Some(source) = cli.verify_against {
            artifact.verify_against(&RecordStore::open(&source)?)?;
            println!("  verified against: {}", source.display());
        }
        return Ok(());
    }

    if cli.verify_against.is_some() {
        return Err(SplitError::value(
            "verify_against",
            "only split artifact directories can be verified",
        )
        .into());
    }
    let store = RecordStore::open(&cli.path)?;
    println!("record stream: {}", store.path().display());
    print_stream_summary(&store)?;
    Ok(())
}

fn layout_config(dataset: Option<String>, data_root: PathBuf) -> Result<PipelineConfig, SplitError> {
    let dataset = dataset.ok_or_else(|| {
        SplitError::value("dataset", "--dataset is required without explicit paths")
    })?;
    info!(dataset = %dataset, data_root = %data_root.display(), "using data layout");
    Ok(PipelineConfig::new(data_root, dataset))
}

fn print_artifact(artifact: &SplitArtifact) {
    let manifest = artifact.manifest();
    let name = manifest
        .key
        .clone()
        .unwrap_or_else(|| display_name(artifact.path()));
    println!("[{name}]");
    println!("  path: {}", artifact.path().display());
    println!("  seed: {}", manifest.seed);
    println!("  size: {}", format_count(manifest.size));
    println!(
        "  mode: {}",
        if manifest.class_balanced {
            "class-balanced"
        } else {
            "uniform"
        }
    );
    println!("  fingerprint: {}", manifest.fingerprint);
}

fn print_stream_summary(store: &RecordStore) -> Result<(), SplitError> {
    println!("  examples: {}", format_count(store.len()));
    if !store.is_labeled() {
        println!("  labels: none");
        return Ok(());
    }
    let counts = store.class_counts()?;
    let Some(skew) = class_skew(&counts) else {
        println!("  classes: 0");
        return Ok(());
    };
    println!("  classes: {}", skew.classes);
    println!(
        "  per class: min {} ({:.2}%) / max {} ({:.2}%) / mean {:.1} (ratio {:.2})",
        format_count(skew.min),
        skew.min_share * 100.0,
        format_count(skew.max),
        skew.max_share * 100.0,
        skew.mean,
        skew.ratio
    );
    for entry in &skew.per_class {
        println!(
            "    class {:>4}: {:>10} ({:.2}%)",
            entry.class,
            format_count(entry.count),
            entry.share * 100.0
        );
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, CliError>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                let _ = err.print();
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
