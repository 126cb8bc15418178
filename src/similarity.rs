//! String and avatar similarity metrics.
//!
//! Both functions are total: bad input degrades to a score, never an error.

use image::ImageReader;
use std::path::Path;
use tracing::debug;

/// Distance reported when either avatar cannot be read or decoded.
/// Far above any real histogram distance so such candidates never win on avatars.
pub const SENTINEL_DISTANCE: f64 = 10_000_000.0;

pub const HISTOGRAM_BINS: usize = 256;

/// 256-bin grayscale intensity histogram.
pub type Histogram = [u32; HISTOGRAM_BINS];

/// Insertion/deletion ratio in `0..=100`, `2 * LCS / (|a| + |b|)` over
/// chars, rounded half to even. Two empty strings score 100.
///
/// Unlike normalized Levenshtein, a substitution costs two edits, so an
/// appended character (`Alice` / `Alice_`) costs less than a changed one.
pub fn string_similarity(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 100;
    }

    let matched = 2 * longest_common_subsequence(&a, &b);
    let numerator = matched * 100;
    let (quotient, remainder) = (numerator / total, numerator % total);
    let rounded = match (2 * remainder).cmp(&total) {
        std::cmp::Ordering::Greater => quotient + 1,
        std::cmp::Ordering::Equal => quotient + quotient % 2,
        std::cmp::Ordering::Less => quotient,
    };
    rounded.min(100) as u8
}

/// Length of the longest common subsequence, one DP row at a time.
fn longest_common_subsequence(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut row = vec![0usize; b.len() + 1];
    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            row[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                row[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut row);
    }
    prev[b.len()]
}

/// Decode an image file and bucket its grayscale pixels.
///
/// The format is sniffed from content, since avatars are saved as `.jpeg`
/// whatever the CDN actually served.
pub fn grayscale_histogram(path: &Path) -> Result<Histogram, image::ImageError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    let gray = image.to_luma8();

    let mut histogram = [0u32; HISTOGRAM_BINS];
    for pixel in gray.pixels() {
        histogram[pixel.0[0] as usize] += 1;
    }
    Ok(histogram)
}

/// Euclidean distance between two histograms.
pub fn histogram_distance(a: &Histogram, b: &Histogram) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(&x, &y)| {
            let d = x as f64 - y as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

/// Histogram distance between two image files, or [`SENTINEL_DISTANCE`]
/// when either one is missing or not a decodable image.
pub fn image_dissimilarity(path_a: &Path, path_b: &Path) -> f64 {
    let a = match grayscale_histogram(path_a) {
        Ok(h) => h,
        Err(e) => {
            debug!(path = %path_a.display(), error = %e, "Avatar unreadable, using sentinel distance");
            return SENTINEL_DISTANCE;
        }
    };
    match grayscale_histogram(path_b) {
        Ok(b) => histogram_distance(&a, &b),
        Err(e) => {
            debug!(path = %path_b.display(), error = %e, "Avatar unreadable, using sentinel distance");
            SENTINEL_DISTANCE
        }
    }
}
