use pyramid::app;

/// Main entry point for the web application
///
/// Serves the population pyramid generator on `PYRAMID_ADDR` (or the first
/// command line argument), defaulting to 127.0.0.1:3000.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let addr = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("PYRAMID_ADDR").ok())
        .unwrap_or_else(|| "127.0.0.1:3000".to_string());

    app::run(&addr).await
}
