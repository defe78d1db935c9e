//! Background removal CLI tool
//!
//! Removes the background from a single image, optionally flattening the
//! result onto a solid color.

use bgremove_pipeline::cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}
