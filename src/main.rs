use clap::Parser;
use tabagg::cli::args::CliArgs;

fn main() {
    env_logger::init();
    let args = CliArgs::parse();
    let code = tabagg::cli::run(&args);
    std::process::exit(code);
}
