use std::process::ExitCode;

fn main() -> ExitCode {
    karani_cli::run()
}
