use std::process::ExitCode;

fn main() -> ExitCode {
    psikotes_cli::run()
}
