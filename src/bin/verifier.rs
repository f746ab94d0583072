use colored::Colorize;
use minos_dns::shared::log;
use minos_dns::verifier::conf::VerifierConf;
use minos_dns::verifier::run_verification;
use std::path::Path;
use std::{env, process};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() != 2 {
        log::init_log(log::LogLevel::Info);
        print_usage();
        process::exit(1);
    }

    log::init_log(log::LogLevel::Info);
    let conf = VerifierConf::default();
    match run_verification(Path::new(&args[1]), &conf) {
        Ok(report) => {
            print!("{}", report.render());
        }
        Err(err) => {
            log::error!("Verification aborted: {}", err);
            process::exit(1);
        }
    }
}

fn print_usage() {
    log::error!(
        "One argument should be provided when starting the verifier: the path of the input directory.
    Usage: {} {}",
        "path/to/verifier/binary".bold(),
        "path/to/input/dir".bold().bright_green()
    )
}
