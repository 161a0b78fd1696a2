// src/main.rs

use taskweave::{cli, engine, logging};

#[tokio::main]
async fn main() {
    let args = cli::parse();

    if let Err(err) = logging::init_logging(args.log_level) {
        eprintln!("failed to initialise logging: {err}");
    }

    let code = engine::execute(args.command).await;
    std::process::exit(code);
}
