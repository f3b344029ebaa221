use std::process::ExitCode;

fn main() -> ExitCode {
    oop_worker::cli::run()
}
