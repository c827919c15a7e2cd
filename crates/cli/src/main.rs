use std::process::ExitCode;

fn main() -> ExitCode {
    skydesk_cli::run()
}
