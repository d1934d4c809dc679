use std::process::ExitCode;

use claim_models::app;

fn main() -> ExitCode {
    match app::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("claims: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}
