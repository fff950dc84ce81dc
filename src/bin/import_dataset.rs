use std::process::ExitCode;

use ssl_splits::cli::{report, run_import_dataset};

fn main() -> ExitCode {
    report(run_import_dataset(std::env::args().skip(1)))
}
