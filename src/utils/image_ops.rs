use anyhow::{Context, Result};
use image::{imageops, RgbImage};
use std::path::{Path, PathBuf};

use crate::utils::geometry::BoundingBox;

/// Asynchronously decode image bytes to RGB using spawn_blocking.
///
/// Decoding is CPU-intensive, especially for large pages.
pub async fn load_rgb_from_memory_async(bytes: &[u8]) -> Result<RgbImage> {
    let bytes = bytes.to_vec(); // Clone to move into blocking task
    tokio::task::spawn_blocking(move || {
        let img = image::load_from_memory(&bytes).context("Failed to load image from memory")?;
        Ok(img.to_rgb8())
    })
    .await
    .context("Failed to spawn blocking task for image loading")?
}

/// Asynchronously open an image file as RGB using spawn_blocking.
pub async fn load_rgb_from_path_async(path: impl AsRef<Path>) -> Result<RgbImage> {
    let path: PathBuf = path.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || {
        let img = image::open(&path)
            .with_context(|| format!("Failed to open image {}", path.display()))?;
        Ok(img.to_rgb8())
    })
    .await
    .context("Failed to spawn blocking task for image loading")?
}

/// Crop a page to `bbox` after clipping it to the page; `None` if nothing is left.
pub fn crop_to_bbox(img: &RgbImage, bbox: &BoundingBox) -> Option<RgbImage> {
    let clipped = bbox.clip(img.width(), img.height());
    if clipped.width() <= 0 || clipped.height() <= 0 {
        return None;
    }

    Some(
        imageops::crop_imm(
            img,
            clipped.x_min as u32,
            clipped.y_min as u32,
            clipped.width() as u32,
            clipped.height() as u32,
        )
        .to_image(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    #[tokio::test]
    async fn test_load_from_memory_async() {
        let img = RgbImage::from_pixel(12, 7, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();

        let decoded = load_rgb_from_memory_async(&bytes).await.unwrap();
        assert_eq!(decoded.dimensions(), (12, 7));
        assert_eq!(decoded.get_pixel(3, 3), &Rgb([10, 20, 30]));
    }

    #[tokio::test]
    async fn test_load_garbage_fails() {
        assert!(load_rgb_from_memory_async(b"not an image").await.is_err());
    }

    #[test]
    fn test_crop_to_bbox() {
        let mut img = RgbImage::new(50, 40);
        img.put_pixel(45, 35, Rgb([1, 2, 3]));

        let crop = crop_to_bbox(&img, &BoundingBox::new(40, 30, 60, 60)).unwrap();
        assert_eq!(crop.dimensions(), (10, 10));
        assert_eq!(crop.get_pixel(5, 5), &Rgb([1, 2, 3]));

        assert!(crop_to_bbox(&img, &BoundingBox::new(60, 60, 70, 70)).is_none());
    }
}
