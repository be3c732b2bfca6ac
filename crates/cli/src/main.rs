use std::process::ExitCode;

fn main() -> ExitCode {
    tierbatch_cli::run()
}
