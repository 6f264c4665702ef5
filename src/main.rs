use std::process::ExitCode;

fn main() -> ExitCode {
    foundation_deployer::cli::run()
}
