use clap::Parser as ClapParser;
use kemudi::driver::{Cli, Driver, DriverError};
use std::process::exit;

/// The main entry point for the application.
///
/// Parses command-line arguments, builds the job graph and runs it.
fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let print_jobs = cli.print_jobs;

    let mut driver = Driver::new(cli);
    let mut compilation = match driver.build_compilation() {
        Ok(compilation) => compilation,
        Err(DriverError::Diagnosed) => {
            driver.print_diagnostics();
            exit(1);
        }
        Err(err) => {
            eprintln!("\x1b[31merror\x1b[0m: {}", err);
            exit(1);
        }
    };

    if print_jobs {
        compilation.print_jobs();
        return;
    }

    let status = compilation.perform_jobs();
    driver.print_diagnostics();
    exit(status.code());
}
