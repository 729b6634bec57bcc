use anyhow::Context;
use image::{imageops, imageops::FilterType, RgbImage};
use tracing::debug;

/// Sampling grid edge length. Scoring cost is bounded at `SAMPLE_DIM²`
/// pixels no matter how large the source thumbnail is.
pub const SAMPLE_DIM: u32 = 50;

const MIN_SATURATION: f32 = 0.2;
const MIN_VALUE: f32 = 0.2;
const MAX_VALUE: f32 = 0.95;
const EXTREME_LOW: u8 = 40;
const EXTREME_HIGH: u8 = 240;

/// A single representative color for a thumbnail, used as a UI accent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccentColor {
    r: u8,
    g: u8,
    b: u8,
}

impl AccentColor {
    fn from_rgb([r, g, b]: [u8; 3]) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl std::fmt::Display for AccentColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl serde::Serialize for AccentColor {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

/// Decode a compressed thumbnail and pick an accent color for it.
///
/// Decode failure is an expected outcome (players hand over truncated or
/// exotic images) and yields `None`; for anything decodable the fallback
/// chain guarantees a color.
pub fn extract_accent_color(bytes: &[u8]) -> Option<AccentColor> {
    let image = match decode_thumbnail(bytes) {
        Ok(image) => image,
        Err(err) => {
            debug!("thumbnail decode failed: {err:#}");
            return None;
        }
    };
    dominant_color(&sample_grid(&image))
}

fn decode_thumbnail(bytes: &[u8]) -> anyhow::Result<RgbImage> {
    let image = image::load_from_memory(bytes).context("unreadable thumbnail bytes")?;
    Ok(image.to_rgb8())
}

/// Resample to the fixed scoring grid, row-major.
fn sample_grid(image: &RgbImage) -> Vec<[u8; 3]> {
    let resized = imageops::resize(image, SAMPLE_DIM, SAMPLE_DIM, FilterType::Triangle);
    resized.pixels().map(|pixel| pixel.0).collect()
}

/// Ordered fallback chain. The last selector accepts any non-empty input,
/// so the chain as a whole always yields a color.
const SELECTORS: &[fn(&[[u8; 3]]) -> Option<AccentColor>] =
    &[select_vivid, select_not_extreme, select_average];

pub fn dominant_color(samples: &[[u8; 3]]) -> Option<AccentColor> {
    if samples.is_empty() {
        return None;
    }
    SELECTORS.iter().find_map(|select| select(samples))
}

/// Score every pixel that is neither washed-out, near-black, nor near-white
/// by `saturation² × value`; the highest score wins, first in scan order on
/// ties.
fn select_vivid(samples: &[[u8; 3]]) -> Option<AccentColor> {
    let mut best: Option<([u8; 3], f32)> = None;
    for &pixel in samples {
        let (saturation, value) = saturation_value(pixel);
        if saturation < MIN_SATURATION || value < MIN_VALUE || value > MAX_VALUE {
            continue;
        }
        let score = saturation * saturation * value;
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((pixel, score));
        }
    }
    best.map(|(pixel, _)| AccentColor::from_rgb(pixel))
}

/// First pixel that is not simultaneously near-pure-black (all channels at or
/// below 40) or near-pure-white (all channels at or above 240). A single
/// differing channel is enough to qualify; the looseness is intentional.
fn select_not_extreme(samples: &[[u8; 3]]) -> Option<AccentColor> {
    samples
        .iter()
        .copied()
        .find(|pixel| {
            pixel.iter().any(|&channel| channel > EXTREME_LOW)
                && pixel.iter().any(|&channel| channel < EXTREME_HIGH)
        })
        .map(AccentColor::from_rgb)
}

/// Box-average of every sample. Cannot fail for non-empty input.
fn select_average(samples: &[[u8; 3]]) -> Option<AccentColor> {
    let count = samples.len() as u64;
    if count == 0 {
        return None;
    }
    let mut sums = [0u64; 3];
    for pixel in samples {
        for (sum, &channel) in sums.iter_mut().zip(pixel) {
            *sum += u64::from(channel);
        }
    }
    Some(AccentColor::from_rgb([
        (sums[0] / count) as u8,
        (sums[1] / count) as u8,
        (sums[2] / count) as u8,
    ]))
}

fn saturation_value([r, g, b]: [u8; 3]) -> (f32, f32) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let value = f32::from(max) / 255.0;
    let saturation = if max == 0 {
        0.0
    } else {
        f32::from(max - min) / f32::from(max)
    };
    (saturation, value)
}
