//! Color extraction check on a single image
//! Run with: cargo run --release --bin analyze_colors -- <image_path> [x_min y_min x_max y_max]

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;
use tracing_subscriber::EnvFilter;

use manga_region_colors::core::types::ColorMetadata;
use manga_region_colors::services::color::{get_color_extractor, ColorAnalyzer};
use manga_region_colors::utils::load_rgb_from_path_async;
use manga_region_colors::{BoundingBox, Config, Polygon};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::new().context("Failed to load configuration")?;

    let filter = EnvFilter::new(format!(
        "manga_region_colors={}",
        config.log_level().as_str().to_lowercase()
    ));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let sample_path = if args.len() > 1 {
        args[1].clone()
    } else {
        "test_sample.png".to_string()
    };

    if !Path::new(&sample_path).exists() {
        eprintln!("Image not found: {}", sample_path);
        std::process::exit(1);
    }

    let region = match args.len() {
        2 => None,
        6 => {
            let coords = args[2..6]
                .iter()
                .map(|s| s.parse::<i32>())
                .collect::<Result<Vec<_>, _>>()
                .context("Region coordinates must be integers")?;
            Some(BoundingBox::new(coords[0], coords[1], coords[2], coords[3]))
        }
        _ => bail!("Usage: analyze_colors <image_path> [x_min y_min x_max y_max]"),
    };

    info!("Loading image: {}", sample_path);
    let image = load_rgb_from_path_async(&sample_path).await?;
    info!("Image dimensions: {}x{}", image.width(), image.height());

    let extractor = get_color_extractor(&config.color);
    let analyzer = ColorAnalyzer::new(extractor.clone());

    let result = match region {
        Some(bbox) => analyzer.analyze(&image, &Polygon::from_bbox(&bbox)),
        None => analyzer.analyze_image(&image),
    };

    println!("\n=== Results ===");
    println!("Backend: {}", extractor.backend_status());
    match result {
        Some(colors) => {
            let metadata = ColorMetadata::from(&colors);
            println!("{}", serde_json::to_string_pretty(&metadata)?);
        }
        None => println!("  (no colors extracted)"),
    }

    Ok(())
}
