use std::process::ExitCode;

use ssl_splits::cli::{report, run_unlabel_dataset};

fn main() -> ExitCode {
    report(run_unlabel_dataset(std::env::args().skip(1)))
}
