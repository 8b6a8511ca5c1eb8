use clap::Parser;
use weft::cli::{self, Args};

fn main() {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.log_filter())
        .parse_default_env()
        .init();

    if let Err(err) = cli::run(&args) {
        eprintln!("Error: {}", err);
        std::process::exit(1);
    }
}
