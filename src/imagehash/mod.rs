//! Perceptual image fingerprinting for cross-store product deduplication.
//!
//! The same physical product is listed under differently worded names across
//! stores, but usually with the manufacturer's press photo. A 64-bit
//! frequency-domain perceptual hash of that photo survives recompression and
//! resizing, so two listings whose fingerprints sit within a small Hamming
//! distance are treated as the same product.

use anyhow::{bail, Context, Result};
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use std::f64::consts::PI;
use std::time::Duration;

/// Side of the working grid the image is reduced to before the DCT.
const DCT_SIZE: usize = 32;
/// Side of the low-frequency block kept from the DCT output.
const HASH_SIZE: usize = 8;

/// Hash algorithm family. Fingerprints of different families are not
/// comparable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HashKind {
    /// DCT-based perceptual hash; robust to rescaling and recompression.
    Perception,
    /// Mean-threshold average hash; cheaper, more false positives.
    Average,
}

/// 64-bit image fingerprint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub kind: HashKind,
    pub bits: u64,
}

impl Fingerprint {
    pub fn new(kind: HashKind, bits: u64) -> Self {
        Self { kind, bits }
    }

    /// Hamming distance to another fingerprint of the same family.
    pub fn distance(&self, other: &Fingerprint) -> Result<u32> {
        if self.kind != other.kind {
            bail!(
                "cannot compare {:?} and {:?} fingerprints",
                self.kind,
                other.kind
            );
        }
        Ok((self.bits ^ other.bits).count_ones())
    }

    /// Whether both fingerprints are within `threshold` differing bits.
    pub fn is_similar(&self, other: &Fingerprint, threshold: u32) -> Result<bool> {
        Ok(self.distance(other)? <= threshold)
    }
}

/// DCT-II perceptual hash: grayscale 32x32 reduction, 2D DCT, low-frequency
/// 8x8 block thresholded at its median.
pub fn perception_hash(img: &DynamicImage) -> Fingerprint {
    let gray = img
        .resize_exact(DCT_SIZE as u32, DCT_SIZE as u32, FilterType::Lanczos3)
        .to_luma8();

    let mut grid = [[0f64; DCT_SIZE]; DCT_SIZE];
    for (y, row) in grid.iter_mut().enumerate() {
        for (x, cell) in row.iter_mut().enumerate() {
            *cell = f64::from(gray.get_pixel(x as u32, y as u32)[0]);
        }
    }

    let freq = dct_2d(&grid);

    let mut low = [0f64; HASH_SIZE * HASH_SIZE];
    for y in 0..HASH_SIZE {
        for x in 0..HASH_SIZE {
            low[y * HASH_SIZE + x] = freq[y][x];
        }
    }

    let mut sorted = low;
    sorted.sort_by(f64::total_cmp);
    let median = (sorted[low.len() / 2 - 1] + sorted[low.len() / 2]) / 2.0;

    let mut bits = 0u64;
    for (i, v) in low.iter().enumerate() {
        if *v > median {
            bits |= 1 << i;
        }
    }

    Fingerprint::new(HashKind::Perception, bits)
}

/// Average hash: 8x8 grayscale reduction thresholded at the mean.
pub fn average_hash(img: &DynamicImage) -> Fingerprint {
    let gray = img
        .resize_exact(HASH_SIZE as u32, HASH_SIZE as u32, FilterType::Lanczos3)
        .to_luma8();

    let pixels: Vec<f64> = gray.pixels().map(|p| f64::from(p[0])).collect();
    let mean = pixels.iter().sum::<f64>() / pixels.len() as f64;

    let mut bits = 0u64;
    for (i, v) in pixels.iter().enumerate() {
        if *v > mean {
            bits |= 1 << i;
        }
    }

    Fingerprint::new(HashKind::Average, bits)
}

/// Row-column separable 2D DCT-II.
fn dct_2d(grid: &[[f64; DCT_SIZE]; DCT_SIZE]) -> [[f64; DCT_SIZE]; DCT_SIZE] {
    let mut rows = [[0f64; DCT_SIZE]; DCT_SIZE];
    for (y, row) in grid.iter().enumerate() {
        rows[y] = dct_1d(row);
    }

    let mut out = [[0f64; DCT_SIZE]; DCT_SIZE];
    for x in 0..DCT_SIZE {
        let mut column = [0f64; DCT_SIZE];
        for y in 0..DCT_SIZE {
            column[y] = rows[y][x];
        }
        let transformed = dct_1d(&column);
        for y in 0..DCT_SIZE {
            out[y][x] = transformed[y];
        }
    }
    out
}

fn dct_1d(input: &[f64; DCT_SIZE]) -> [f64; DCT_SIZE] {
    let n = DCT_SIZE as f64;
    let mut out = [0f64; DCT_SIZE];
    for (k, coeff) in out.iter_mut().enumerate() {
        let mut sum = 0.0;
        for (i, v) in input.iter().enumerate() {
            sum += v * ((PI / n) * (i as f64 + 0.5) * k as f64).cos();
        }
        *coeff = sum;
    }
    out
}

/// Whether an image URL points at a loading gif, tracking pixel or other
/// placeholder rather than a real product photo. Such URLs are skipped for
/// fingerprinting and never overwrite a real image on an existing product.
pub fn is_placeholder_image(url: &str) -> bool {
    if url.is_empty() {
        return true;
    }

    let l = url.to_lowercase();

    // eBay serves loading gifs and the ir.ebaystatic.com domain as stand-ins.
    if l.ends_with(".gif") || l.contains("ir.ebaystatic.com") {
        return true;
    }

    // Inline data URIs are never real product photos.
    if l.starts_with("data:") {
        return true;
    }

    const PLACEHOLDER_TOKENS: [&str; 11] = [
        "placeholder",
        "transparent",
        "blank",
        "no-image",
        "noimage",
        "pixel.gif",
        "1x1",
        "spacer",
        "s-l1-",
        "s-l5-",
        "s-l10-",
    ];
    if PLACEHOLDER_TOKENS.iter().any(|t| l.contains(t)) {
        return true;
    }

    // eBay thumbnails below the s-l64 tier are too small to hash usefully.
    if l.contains("ebayimg.com") {
        const TINY_TIERS: [&str; 3] = ["s-l16", "s-l24", "s-l32"];
        if TINY_TIERS.iter().any(|t| l.contains(t)) {
            return true;
        }
    }

    false
}

/// Source of image fingerprints, keyed by image URL. The production
/// implementation downloads and hashes; tests substitute canned hashes.
#[async_trait::async_trait]
pub trait Fingerprinter: Send + Sync {
    async fn fingerprint_url(&self, url: &str) -> Result<Fingerprint>;
}

/// Downloads product images and computes their fingerprints.
pub struct ImageFingerprinter {
    client: reqwest::Client,
}

impl ImageFingerprinter {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("building image download client")?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Fetch and decode an image. Fails fast on non-2xx responses and bodies
    /// that decode as neither JPEG nor PNG.
    pub async fn download(&self, url: &str) -> Result<DynamicImage> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("image request failed: {url}"))?;
        if !resp.status().is_success() {
            bail!("image download failed with status {}: {url}", resp.status());
        }
        let body = resp.bytes().await.context("reading image body")?;
        decode_image(&body)
    }

    /// Download + perceptual hash in one step. Callers treat an error as
    /// "no fingerprint available", not as a fatal condition.
    pub async fn fetch(&self, url: &str) -> Result<Fingerprint> {
        let img = self.download(url).await?;
        Ok(perception_hash(&img))
    }
}

#[async_trait::async_trait]
impl Fingerprinter for ImageFingerprinter {
    async fn fingerprint_url(&self, url: &str) -> Result<Fingerprint> {
        self.fetch(url).await
    }
}

fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if let Ok(img) = image::load_from_memory_with_format(bytes, ImageFormat::Jpeg) {
        return Ok(img);
    }
    if let Ok(img) = image::load_from_memory_with_format(bytes, ImageFormat::Png) {
        return Ok(img);
    }
    bail!("unsupported image format")
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    /// Deterministic pseudo-random test image; different seeds give
    /// visually unrelated images.
    fn pattern(seed: u32) -> DynamicImage {
        let img = GrayImage::from_fn(32, 32, |x, y| {
            let v = x
                .wrapping_mul(31)
                .wrapping_add(y.wrapping_mul(17))
                .wrapping_add(seed)
                .wrapping_mul(2654435761);
            Luma([(v >> 24) as u8])
        });
        DynamicImage::ImageLuma8(img)
    }

    /// A smooth luminance ramp. `horizontal` selects the ramp axis.
    fn gradient(horizontal: bool) -> DynamicImage {
        let img = GrayImage::from_fn(32, 32, |x, y| {
            let t = if horizontal { x } else { y };
            Luma([(t * 8) as u8])
        });
        DynamicImage::ImageLuma8(img)
    }

    /// Same as [`pattern`] but with a single pixel nudged by one level —
    /// the kind of difference recompression introduces.
    fn tweaked_pattern(seed: u32) -> DynamicImage {
        let mut img = pattern(seed).to_luma8();
        let p = img.get_pixel_mut(5, 7);
        p[0] = p[0].saturating_add(1);
        DynamicImage::ImageLuma8(img)
    }

    #[test]
    fn identical_images_have_zero_distance() {
        let a = perception_hash(&pattern(1));
        let b = perception_hash(&pattern(1));
        assert_eq!(a.distance(&b).unwrap(), 0);
    }

    #[test]
    fn near_identical_images_are_similar() {
        let a = perception_hash(&pattern(1));
        let b = perception_hash(&tweaked_pattern(1));
        assert!(a.is_similar(&b, 5).unwrap());
    }

    #[test]
    fn structurally_different_images_are_not_similar() {
        let a = perception_hash(&pattern(1));
        let b = perception_hash(&pattern(2));
        assert!(!a.is_similar(&b, 5).unwrap());
    }

    #[test]
    fn distance_is_symmetric() {
        let a = perception_hash(&pattern(1));
        let b = perception_hash(&pattern(2));
        assert_eq!(a.distance(&b).unwrap(), b.distance(&a).unwrap());
        assert_eq!(
            a.is_similar(&b, 5).unwrap(),
            b.is_similar(&a, 5).unwrap()
        );
    }

    #[test]
    fn mixed_hash_kinds_are_rejected() {
        let p = perception_hash(&gradient(true));
        let a = average_hash(&gradient(true));
        assert!(p.distance(&a).is_err());
        assert!(p.is_similar(&a, 5).is_err());
    }

    #[test]
    fn distance_counts_differing_bits() {
        let a = Fingerprint::new(HashKind::Perception, 0b1010);
        let b = Fingerprint::new(HashKind::Perception, 0b0110);
        assert_eq!(a.distance(&b).unwrap(), 2);
    }

    #[test]
    fn placeholder_urls_are_detected() {
        assert!(is_placeholder_image(""));
        assert!(is_placeholder_image("https://ir.ebaystatic.com/load.gif"));
        assert!(is_placeholder_image("data:image/png;base64,AAAA"));
        assert!(is_placeholder_image("https://cdn.shop.com/no-image.png"));
        assert!(is_placeholder_image("https://i.ebayimg.com/images/g/abc/s-l16.jpg"));
        assert!(!is_placeholder_image(
            "https://i.ebayimg.com/images/g/abc/s-l500.jpg"
        ));
        assert!(!is_placeholder_image("https://www.aussar.es/img/p/1/2/3.jpg"));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(decode_image(b"definitely not an image").is_err());
    }
}
