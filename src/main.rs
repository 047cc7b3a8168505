// Ember - development-time module pipeline
// Binary entry point; everything else lives in the library

use ember::cli::CliHandler;

#[tokio::main]
async fn main() {
    let handler = CliHandler::new();

    if let Err(e) = handler.run().await {
        eprintln!("❌ Error: {:#}", e);
        std::process::exit(1);
    }
}
