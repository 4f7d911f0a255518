//! Prominent-color extraction from artwork.
//!
//! Artwork is sampled down to a bounded pixel budget, quantised on five bits
//! per channel and the most populous buckets become [`Swatch`]es. Each
//! [`Target`] then claims the best scoring swatch that falls inside its
//! saturation and lightness window.

use std::{borrow::Cow, collections::HashMap, path::Path};

use image::{imageops, RgbaImage};

use crate::{Argb, Result};

const MAX_SAMPLED_AREA: u64 = 112 * 112;
const MAX_SWATCHES: usize = 16;
const BLACK_MAX_LIGHTNESS: f32 = 0.05;
const WHITE_MIN_LIGHTNESS: f32 = 0.95;

const WEIGHT_SATURATION: f32 = 0.24;
const WEIGHT_LIGHTNESS: f32 = 0.52;
const WEIGHT_POPULATION: f32 = 0.24;

/// Decoded artwork. Dimensions and pixel storage always agree.
pub type Bitmap = RgbaImage;

/// Decodes an artwork file into RGBA pixels.
pub fn open(path: impl AsRef<Path>) -> Result<Bitmap> {
    Ok(image::open(path)?.to_rgba8())
}

/// Artwork of a single color.
pub fn filled(width: u32, height: u32, color: Argb) -> Bitmap {
    RgbaImage::from_pixel(width, height, color.into())
}

/// Vertical stripes of equal width, one per color.
pub fn striped(colors: &[Argb], stripe_width: u32, height: u32) -> Bitmap {
    let width = colors.len() as u32 * stripe_width;
    RgbaImage::from_fn(width, height, |x, _| colors[(x / stripe_width) as usize].into())
}

/// Shrinks artwork larger than the sampling budget, keeping its aspect.
fn sampled(bitmap: &Bitmap) -> Cow<'_, Bitmap> {
    let (width, height) = bitmap.dimensions();
    let area = width as u64 * height as u64;
    if area <= MAX_SAMPLED_AREA {
        return Cow::Borrowed(bitmap);
    }
    let scale = (MAX_SAMPLED_AREA as f64 / area as f64).sqrt();
    let scaled = |side: u32| ((side as f64 * scale) as u32).max(1);
    Cow::Owned(imageops::thumbnail(bitmap, scaled(width), scaled(height)))
}

/// Hue-less HSL view of a color; only saturation and lightness are scored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsl {
    pub saturation: f32,
    pub lightness: f32,
}

impl Hsl {
    pub fn of(color: Argb) -> Self {
        let r = color.red() as f32 / 255.0;
        let g = color.green() as f32 / 255.0;
        let b = color.blue() as f32 / 255.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let lightness = (max + min) / 2.0;
        let saturation = if (max - min).abs() <= f32::EPSILON {
            0.0
        } else {
            (max - min) / (1.0 - (2.0 * lightness - 1.0).abs())
        };
        Self {
            saturation: saturation.clamp(0.0, 1.0),
            lightness,
        }
    }
}

/// A representative color and how many sampled pixels it stands for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Swatch {
    pub color: Argb,
    pub population: u32,
    pub hsl: Hsl,
}

impl Swatch {
    pub fn new(color: Argb, population: u32) -> Self {
        Self {
            color,
            population,
            hsl: Hsl::of(color),
        }
    }
}

/// Saturation and lightness window a swatch must fall in, plus the ideal
/// values used for scoring.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Target {
    pub min_saturation: f32,
    pub target_saturation: f32,
    pub min_lightness: f32,
    pub target_lightness: f32,
    pub max_lightness: f32,
}

impl Target {
    pub const LIGHT_VIBRANT: Target = Target {
        min_saturation: 0.35,
        target_saturation: 1.0,
        min_lightness: 0.55,
        target_lightness: 0.74,
        max_lightness: 1.0,
    };

    pub const VIBRANT: Target = Target {
        min_saturation: 0.35,
        target_saturation: 1.0,
        min_lightness: 0.3,
        target_lightness: 0.5,
        max_lightness: 0.7,
    };

    pub const DARK_VIBRANT: Target = Target {
        min_saturation: 0.35,
        target_saturation: 1.0,
        min_lightness: 0.0,
        target_lightness: 0.26,
        max_lightness: 0.45,
    };

    fn accepts(&self, hsl: Hsl) -> bool {
        hsl.saturation >= self.min_saturation
            && hsl.lightness >= self.min_lightness
            && hsl.lightness <= self.max_lightness
    }

    fn score(&self, swatch: &Swatch, max_population: u32) -> f32 {
        let saturation = 1.0 - (swatch.hsl.saturation - self.target_saturation).abs();
        let lightness = 1.0 - (swatch.hsl.lightness - self.target_lightness).abs();
        let population = if max_population > 0 {
            swatch.population as f32 / max_population as f32
        } else {
            0.0
        };
        WEIGHT_SATURATION * saturation
            + WEIGHT_LIGHTNESS * lightness
            + WEIGHT_POPULATION * population
    }
}

/// Result of one extraction: the quantised swatches and the vibrant picks.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Palette {
    pub swatches: Vec<Swatch>,
    pub light_vibrant: Option<Swatch>,
    pub vibrant: Option<Swatch>,
    pub dark_vibrant: Option<Swatch>,
}

impl Palette {
    pub fn generate(bitmap: &Bitmap) -> Self {
        let swatches = quantize(bitmap);
        let max_population = swatches.iter().map(|s| s.population).max().unwrap_or(0);
        let mut claimed = vec![false; swatches.len()];

        let mut pick = |target: Target| -> Option<Swatch> {
            let (index, _) = swatches
                .iter()
                .enumerate()
                .filter(|(i, s)| !claimed[*i] && target.accepts(s.hsl))
                .map(|(i, s)| (i, target.score(s, max_population)))
                .fold(None, |best: Option<(usize, f32)>, candidate| match best {
                    Some(b) if b.1 >= candidate.1 => Some(b),
                    _ => Some(candidate),
                })?;
            claimed[index] = true;
            Some(swatches[index])
        };

        let light_vibrant = pick(Target::LIGHT_VIBRANT);
        let vibrant = pick(Target::VIBRANT);
        let dark_vibrant = pick(Target::DARK_VIBRANT);

        Self {
            swatches,
            light_vibrant,
            vibrant,
            dark_vibrant,
        }
    }

    pub fn vibrant_color(&self) -> Option<Argb> {
        self.vibrant.map(|s| s.color)
    }

    pub fn light_vibrant_color(&self) -> Option<Argb> {
        self.light_vibrant.map(|s| s.color)
    }

    pub fn dark_vibrant_color(&self) -> Option<Argb> {
        self.dark_vibrant.map(|s| s.color)
    }

    /// Vibrant, then light vibrant, then dark vibrant; the first candidate
    /// that is present and not transparent wins, otherwise `default_color`.
    pub fn resolve_color(&self, default_color: Argb) -> Argb {
        [
            self.vibrant_color(),
            self.light_vibrant_color(),
            self.dark_vibrant_color(),
        ]
        .into_iter()
        .flatten()
        .find(|color| !color.is_transparent())
        .unwrap_or(default_color)
    }
}

#[derive(Default)]
struct Bucket {
    red: u64,
    green: u64,
    blue: u64,
    count: u32,
}

fn quantize(bitmap: &Bitmap) -> Vec<Swatch> {
    let mut buckets: HashMap<u16, Bucket> = HashMap::new();

    for pixel in sampled(bitmap).pixels() {
        let pixel = Argb::from(*pixel);
        if pixel.alpha() == 0 {
            continue;
        }
        let lightness = Hsl::of(pixel).lightness;
        if lightness <= BLACK_MAX_LIGHTNESS || lightness >= WHITE_MIN_LIGHTNESS {
            continue;
        }

        let key = ((pixel.red() as u16 >> 3) << 10)
            | ((pixel.green() as u16 >> 3) << 5)
            | (pixel.blue() as u16 >> 3);
        let bucket = buckets.entry(key).or_default();
        bucket.red += pixel.red() as u64;
        bucket.green += pixel.green() as u64;
        bucket.blue += pixel.blue() as u64;
        bucket.count += 1;
    }

    let mut ranked: Vec<(u16, Bucket)> = buckets.into_iter().collect();
    ranked.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(&b.0)));
    ranked.truncate(MAX_SWATCHES);

    ranked
        .into_iter()
        .map(|(_, bucket)| {
            let count = bucket.count as u64;
            let average = |sum: u64| ((sum + count / 2) / count) as u8;
            Swatch::new(
                Argb::from_rgb(
                    average(bucket.red),
                    average(bucket.green),
                    average(bucket.blue),
                ),
                bucket.count,
            )
        })
        .collect()
}
