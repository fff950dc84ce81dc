use std::process::ExitCode;

use ssl_splits::cli::{report, run_generate_split};

fn main() -> ExitCode {
    report(run_generate_split(std::env::args().skip(1)))
}
