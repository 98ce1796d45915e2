use std::process::ExitCode;

fn main() -> ExitCode {
    carwise_cli::run()
}
