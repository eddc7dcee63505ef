use std::process::ExitCode;

fn main() -> ExitCode {
    match scratch_notes::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
