use std::process::ExitCode;

use ssl_splits::cli::{report, run_inspect_dataset};

fn main() -> ExitCode {
    report(run_inspect_dataset(std::env::args().skip(1)))
}
