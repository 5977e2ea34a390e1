use clap::Parser;
use os_resource::framework::run_main;
use os_resources_local::{logging, provider::OperatingSystemProvider};

/// The `os` resource provider
///
/// Speaks JSON-RPC on stdin/stdout; not meant to be run by hand. Use
/// `os-resource-runner` to drive it manually.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Log every span enter/exit and trace-level events
    #[arg(long)]
    verbose: bool,

    /// Use ANSI colours in the log output
    #[arg(long)]
    color: bool,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(e) = logging::set_up(&logging::Options {
        verbose: args.verbose,
        color: args.color,
    }) {
        eprintln!("Error: {:?}", e);
        std::process::exit(1);
    }
    run_main(OperatingSystemProvider::new()).await
}
