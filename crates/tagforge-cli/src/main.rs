use std::process::ExitCode;

fn main() -> ExitCode {
    tagforge_cli::run()
}
