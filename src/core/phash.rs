//! Perceptual image hashing for duplicate detection
//!
//! Average hash over a 32x32 grayscale thumbnail: one bit per pixel, set
//! when the pixel is at least the mean brightness. Re-encoded, resized or
//! lightly recompressed copies of a photo land on the same (or a very close)
//! hash, which exact byte hashing would miss.

use image::imageops::FilterType;
use image::{ImageReader, Limits};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

use crate::models::errors::{AppError, AppResult, ErrorCode};
use crate::utils::constants::{MAX_IMAGE_DECODE_BYTES, MAX_IMAGE_DIMENSION, PHASH_SIZE};

/// Number of bits in a hash
pub const HASH_BITS: usize = (PHASH_SIZE * PHASH_SIZE) as usize;

/// Hash bytes
const HASH_BYTES: usize = HASH_BITS / 8;

/// 1024-bit average hash
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageHash([u8; HASH_BYTES]);

impl ImageHash {
    /// Number of differing bits
    pub fn hamming(&self, other: &ImageHash) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Fixed-width lowercase hex (256 chars)
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> AppResult<Self> {
        let bytes = hex::decode(s)
            .map_err(|_| AppError::new(ErrorCode::ApiBadRequest, "Invalid image hash"))?;
        let arr: [u8; HASH_BYTES] = bytes
            .try_into()
            .map_err(|_| AppError::new(ErrorCode::ApiBadRequest, "Invalid image hash length"))?;
        Ok(Self(arr))
    }
}

impl fmt::Display for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ImageHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ImageHash({}..)", &hex[..16])
    }
}

impl TryFrom<String> for ImageHash {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ImageHash> for String {
    fn from(value: ImageHash) -> Self {
        value.to_hex()
    }
}

fn decode_limits() -> Limits {
    let mut limits = Limits::default();
    limits.max_image_width = Some(MAX_IMAGE_DIMENSION);
    limits.max_image_height = Some(MAX_IMAGE_DIMENSION);
    limits.max_alloc = Some(MAX_IMAGE_DECODE_BYTES);
    limits
}

/// Compute the average hash of an encoded image (PNG/JPEG/WebP).
///
/// CPU-bound; async callers go through [`calculate_phash_blocking`].
pub fn calculate_phash(bytes: &[u8]) -> AppResult<ImageHash> {
    let mut reader = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|_| AppError::new(ErrorCode::ReportInvalidImage, "Invalid image data."))?;
    reader.limits(decode_limits());
    let img = reader.decode()?;
    let gray = img.to_luma8();
    let thumb = image::imageops::resize(&gray, PHASH_SIZE, PHASH_SIZE, FilterType::Lanczos3);

    let pixels: Vec<u32> = thumb.pixels().map(|p| p.0[0] as u32).collect();
    let sum: u32 = pixels.iter().sum();
    let avg = sum as f64 / pixels.len() as f64;

    let mut out = [0u8; HASH_BYTES];
    for (i, px) in pixels.iter().enumerate() {
        if *px as f64 >= avg {
            // MSB-first, so the hex reads in pixel order
            out[i / 8] |= 0x80 >> (i % 8);
        }
    }
    Ok(ImageHash(out))
}

/// [`calculate_phash`] on the blocking pool; hands the bytes back
pub async fn calculate_phash_blocking(bytes: Vec<u8>) -> AppResult<(Vec<u8>, ImageHash)> {
    let (bytes, hash) = tokio::task::spawn_blocking(move || {
        let hash = calculate_phash(&bytes);
        (bytes, hash)
    })
    .await
    .map_err(|e| AppError::internal(format!("Hashing task failed: {}", e)))?;
    Ok((bytes, hash?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, ImageFormat, Luma, RgbImage};
    use std::io::Cursor;

    fn encode_png(img: image::DynamicImage) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        img.write_to(&mut buf, ImageFormat::Png).unwrap();
        buf.into_inner()
    }

    fn split_image(w: u32, h: u32) -> image::DynamicImage {
        let img = GrayImage::from_fn(w, h, |x, _| if x < w / 2 { Luma([10]) } else { Luma([240]) });
        image::DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn test_uniform_image_sets_all_bits() {
        let img = RgbImage::from_pixel(1, 1, image::Rgb([255, 255, 255]));
        let hash = calculate_phash(&encode_png(image::DynamicImage::ImageRgb8(img))).unwrap();
        assert_eq!(hash.to_hex(), "f".repeat(256));
    }

    #[test]
    fn test_resized_copy_matches() {
        let small = calculate_phash(&encode_png(split_image(64, 64))).unwrap();
        let large = calculate_phash(&encode_png(split_image(256, 256))).unwrap();
        assert!(small.hamming(&large) <= 64, "distance {}", small.hamming(&large));
    }

    #[test]
    fn test_different_images_differ() {
        let split = calculate_phash(&encode_png(split_image(64, 64))).unwrap();
        let flipped = image::DynamicImage::ImageLuma8(GrayImage::from_fn(64, 64, |x, _| {
            if x < 32 { Luma([240]) } else { Luma([10]) }
        }));
        let other = calculate_phash(&encode_png(flipped)).unwrap();
        assert!(split.hamming(&other) > 512);
    }

    #[test]
    fn test_hex_round_trip() {
        let hash = calculate_phash(&encode_png(split_image(40, 40))).unwrap();
        let hex = hash.to_hex();
        assert_eq!(hex.len(), 256);
        assert_eq!(ImageHash::from_hex(&hex).unwrap(), hash);
        assert!(ImageHash::from_hex("abc").is_err());
    }

    #[test]
    fn test_garbage_is_invalid_image() {
        let err = calculate_phash(b"definitely not an image").unwrap_err();
        assert_eq!(err.code, ErrorCode::ReportInvalidImage);
    }

    #[test]
    fn test_oversized_dimensions_refused() {
        // Tiny file, but wider than any accepted photo
        let wide = image::DynamicImage::ImageLuma8(GrayImage::new(MAX_IMAGE_DIMENSION + 1, 1));
        let err = calculate_phash(&encode_png(wide)).unwrap_err();
        assert_eq!(err.code, ErrorCode::ReportInvalidImage);
    }

    #[tokio::test]
    async fn test_blocking_hash_matches_inline() {
        let bytes = encode_png(split_image(64, 64));
        let inline = calculate_phash(&bytes).unwrap();
        let (returned, hash) = calculate_phash_blocking(bytes.clone()).await.unwrap();
        assert_eq!(hash, inline);
        assert_eq!(returned, bytes);
    }
}
