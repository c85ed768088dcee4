use crate::core::types::TextOrientation;

/// Regions below this area use the lenient ratio band
const SMALL_REGION_AREA: i64 = 2000;
const SMALL_VERTICAL_RATIO: f32 = 1.1;
const SMALL_HORIZONTAL_RATIO: f32 = 0.9;

/// Guess reading direction from box shape (height / width).
///
/// Ambiguous shapes resolve to vertical, the common case for manga.
pub fn detect_text_orientation(width: i32, height: i32, aspect_threshold: f32) -> TextOrientation {
    if width == 0 {
        return TextOrientation::Vertical;
    }
    if height == 0 {
        return TextOrientation::Horizontal;
    }

    let ratio = height as f32 / width as f32;
    let area = i64::from(width) * i64::from(height);

    let (vertical_above, horizontal_below) = if area < SMALL_REGION_AREA {
        (SMALL_VERTICAL_RATIO, SMALL_HORIZONTAL_RATIO)
    } else {
        (aspect_threshold, 1.0 / aspect_threshold)
    };

    if ratio > vertical_above {
        TextOrientation::Vertical
    } else if ratio < horizontal_below {
        TextOrientation::Horizontal
    } else {
        TextOrientation::Vertical
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_degenerate_sizes() {
        assert_eq!(detect_text_orientation(0, 10, 1.2), TextOrientation::Vertical);
        assert_eq!(detect_text_orientation(10, 0, 1.2), TextOrientation::Horizontal);
    }

    #[test]
    fn test_large_regions() {
        assert_eq!(detect_text_orientation(40, 200, 1.2), TextOrientation::Vertical);
        assert_eq!(detect_text_orientation(200, 40, 1.2), TextOrientation::Horizontal);
        // 1.15 is inside the ambiguous band for large regions
        assert_eq!(detect_text_orientation(100, 115, 1.2), TextOrientation::Vertical);
        assert_eq!(detect_text_orientation(115, 100, 1.2), TextOrientation::Vertical);
    }

    #[test]
    fn test_small_regions_use_tighter_band() {
        // 30x34 (ratio ~1.13) counts as vertical only because it is small
        assert_eq!(detect_text_orientation(30, 34, 1.2), TextOrientation::Vertical);
        // ratio ~0.87 is horizontal for a small box, ambiguous for a large one
        assert_eq!(detect_text_orientation(30, 26, 1.2), TextOrientation::Horizontal);
        assert_eq!(detect_text_orientation(300, 260, 1.2), TextOrientation::Vertical);
    }
}
