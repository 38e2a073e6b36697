use std::process::ExitCode;

fn main() -> ExitCode {
    rostergate_cli::run()
}
