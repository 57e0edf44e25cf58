use std::sync::Arc;

use cedula::api;
use cedula::models::ConditionParams;
use cedula::processing::TesseractRecognizer;
use cedula::DocumentReader;
use clap::Parser;
use log::info;

/// Identity-document OCR extraction service.
#[derive(Parser)]
#[command(name = "cedula", version, about)]
struct Cli {
    /// Address to bind the HTTP server on
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// Port to bind the HTTP server on
    #[arg(long, default_value_t = 5000)]
    port: u16,

    /// Gamma correction applied before thresholding
    #[arg(long, default_value_t = 1.0)]
    gamma: f64,

    /// Side of the adaptive-threshold blocks, in pixels. Large enough to
    /// hold both text and background, small enough to stay local.
    #[arg(long = "block-size", default_value_t = 80)]
    block_size: u32,

    /// How far from the block median a pixel still counts as background
    #[arg(long, default_value_t = 50.0)]
    delta: f64,

    /// Tesseract language code for recognition
    #[arg(long, default_value = "spa")]
    lang: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    env_logger::init();
    let cli = Cli::parse();

    let params = ConditionParams {
        gamma: cli.gamma,
        block_size: cli.block_size,
        delta: cli.delta,
    };
    let reader = Arc::new(DocumentReader::new(
        Box::new(TesseractRecognizer::new(&cli.lang)),
        params,
    ));

    info!(
        "starting with gamma={} block_size={} delta={} lang={}",
        cli.gamma, cli.block_size, cli.delta, cli.lang
    );
    api::serve(&cli.host, cli.port, reader).await
}
