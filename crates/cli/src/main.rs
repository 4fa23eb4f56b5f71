use std::process::ExitCode;

fn main() -> ExitCode {
    goalrunner_cli::run()
}
