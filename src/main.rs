// assetflow - asset build pipeline
// Entry point with clean separation of concerns

use assetflow::cli::CliHandler;

// All pipeline concurrency is cooperative on one event loop; CPU-heavy
// steps go through spawn_blocking.
#[tokio::main(flavor = "current_thread")]
async fn main() {
    let handler = CliHandler::new();

    if let Err(e) = handler.run().await {
        eprintln!("❌ Error: {}", e);
        std::process::exit(1);
    }
}
