use std::fmt::Write;

use bevy::{
    color::{Color, Srgba},
    log::warn,
};
use serde::{Deserialize, Serialize};


pub const GRADIENT_IMAGE_WIDTH: usize = 256;


#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub key: f32,
    pub color: Color,
}


/// 1D lookup image baked from a [`ColorGradient`], sRGB8 texels.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientImage {
    pub pixels: Vec<[u8; 4]>,
}

impl GradientImage {
    fn blank() -> Self {
        Self {
            pixels: vec![[0; 4]; GRADIENT_IMAGE_WIDTH],
        }
    }

    pub fn width(&self) -> usize {
        self.pixels.len()
    }
}


#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegendStop {
    /// position in `[0, 1]` across the legend
    pub offset: f32,
    pub key: f32,
    pub color: Color,
}

/// Gradient description for drawing a legend elsewhere.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GradientLegend {
    pub stops: Vec<LegendStop>,
}

impl GradientLegend {
    /// e.g. `linear-gradient(to right, rgba(0, 0, 255, 1.00) 0.00%, rgba(255, 0, 0, 1.00) 100.00%)`
    pub fn to_css(&self) -> String {
        let mut css = String::from("linear-gradient(to right");
        for stop in &self.stops {
            let [r, g, b, _] = to_rgba8(stop.color);
            let alpha = stop.color.to_srgba().alpha;
            let _ = write!(css, ", rgba({r}, {g}, {b}, {alpha:.2}) {:.2}%", stop.offset * 100.0);
        }
        css.push(')');
        css
    }
}


/// Ascending keyed color stops, rebaked to a lookup image on every mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "Vec<GradientStop>", into = "Vec<GradientStop>")]
pub struct ColorGradient {
    stops: Vec<GradientStop>,
    image: GradientImage,
    legend: Option<GradientLegend>,
}

impl Default for ColorGradient {
    fn default() -> Self {
        Self::from_stops([
            (0.0, Color::srgb(0.0, 0.0, 1.0)),
            (0.35, Color::srgb(0.0, 1.0, 1.0)),
            (0.7, Color::srgb(1.0, 1.0, 0.0)),
            (1.0, Color::srgb(1.0, 0.0, 0.0)),
        ])
    }
}

impl From<Vec<GradientStop>> for ColorGradient {
    fn from(stops: Vec<GradientStop>) -> Self {
        Self::from_stops(stops.into_iter().map(|stop| (stop.key, stop.color)))
    }
}

impl From<ColorGradient> for Vec<GradientStop> {
    fn from(gradient: ColorGradient) -> Self {
        gradient.stops
    }
}

impl ColorGradient {
    pub fn empty() -> Self {
        Self {
            stops: Vec::new(),
            image: GradientImage::blank(),
            legend: None,
        }
    }

    pub fn from_stops(stops: impl IntoIterator<Item = (f32, Color)>) -> Self {
        let mut gradient = Self::empty();
        for (key, color) in stops {
            gradient.upsert(key, color);
        }
        gradient.rebake();
        gradient
    }

    pub fn len(&self) -> usize {
        self.stops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stops.is_empty()
    }

    /// At least two stops are needed to color a ratio range.
    pub fn is_usable(&self) -> bool {
        self.stops.len() >= 2
    }

    pub fn stops(&self) -> &[GradientStop] {
        &self.stops
    }

    pub fn get_item(&self, index: usize) -> Option<(f32, Color)> {
        self.stops.get(index).map(|stop| (stop.key, stop.color))
    }

    /// Returns `false` (and leaves the gradient untouched) when `key` already
    /// exists and `replace` is off, or when `key` is not finite.
    pub fn insert(&mut self, key: f32, color: Color, replace: bool) -> bool {
        if !key.is_finite() {
            warn!("color gradient key {key} is not finite, ignoring");
            return false;
        }
        if !replace && self.position(key).is_ok() {
            warn!("color gradient already has a stop at {key}, ignoring insert");
            return false;
        }

        self.upsert(key, color);
        self.rebake();
        true
    }

    pub fn remove(&mut self, key: f32) -> bool {
        match self.position(key) {
            Ok(index) => {
                self.stops.remove(index);
                self.rebake();
                true
            }
            Err(_) => false,
        }
    }

    /// Structural comparison: same keys mapped to the same sRGB8 colors.
    pub fn equals(&self, other: &ColorGradient) -> bool {
        self.stops.len() == other.stops.len()
            && self.stops.iter().zip(&other.stops).all(|(a, b)| {
                a.key == b.key && to_rgba8(a.color) == to_rgba8(b.color)
            })
    }

    pub fn image(&self) -> &GradientImage {
        &self.image
    }

    /// `None` until the gradient has two stops.
    pub fn legend(&self) -> Option<&GradientLegend> {
        self.legend.as_ref()
    }

    pub fn key_range(&self) -> Option<(f32, f32)> {
        Some((self.stops.first()?.key, self.stops.last()?.key))
    }

    /// Baked color for `value`, clamped to the key range.
    pub fn sample(&self, value: f32) -> [u8; 4] {
        let (min, max) = match self.key_range() {
            Some(range) => range,
            None => return [0; 4],
        };

        let t = if max > min {
            ((value - min) / (max - min)).clamp(0.0, 1.0)
        } else {
            0.0
        };
        let x = (t * (self.image.width() - 1) as f32).round() as usize;
        self.image.pixels[x.min(self.image.width() - 1)]
    }

    fn position(&self, key: f32) -> Result<usize, usize> {
        let key = canonical_key(key);
        self.stops.binary_search_by(|stop| stop.key.total_cmp(&key))
    }

    fn upsert(&mut self, key: f32, color: Color) {
        if !key.is_finite() {
            return;
        }
        let key = canonical_key(key);
        match self.position(key) {
            Ok(index) => self.stops[index].color = color,
            Err(index) => self.stops.insert(index, GradientStop { key, color }),
        }
    }

    fn rebake(&mut self) {
        match self.stops.as_slice() {
            [] => {
                self.image = GradientImage::blank();
                self.legend = None;
            }
            [only] => {
                self.image = GradientImage {
                    pixels: vec![to_rgba8(only.color); GRADIENT_IMAGE_WIDTH],
                };
                self.legend = None;
            }
            stops => {
                let min = stops[0].key;
                let max = stops[stops.len() - 1].key;
                let span = max - min;

                let pixels = (0..GRADIENT_IMAGE_WIDTH)
                    .map(|x| {
                        let key = min + span * x as f32 / (GRADIENT_IMAGE_WIDTH - 1) as f32;
                        to_rgba8(interpolate(stops, key))
                    })
                    .collect();

                let legend = GradientLegend {
                    stops: stops
                        .iter()
                        .map(|stop| LegendStop {
                            offset: (stop.key - min) / span,
                            key: stop.key,
                            color: stop.color,
                        })
                        .collect(),
                };

                self.image = GradientImage { pixels };
                self.legend = Some(legend);
            }
        }
    }
}

/// `-0.0` and `0.0` are one stop; `total_cmp` would order them apart.
fn canonical_key(key: f32) -> f32 {
    if key == 0.0 { 0.0 } else { key }
}

fn interpolate(stops: &[GradientStop], key: f32) -> Color {
    let upper = stops.partition_point(|stop| stop.key < key);
    if upper == 0 {
        return stops[0].color;
    }
    if upper >= stops.len() {
        return stops[stops.len() - 1].color;
    }

    let a = &stops[upper - 1];
    let b = &stops[upper];
    let t = (key - a.key) / (b.key - a.key);
    let ca = a.color.to_srgba();
    let cb = b.color.to_srgba();
    Color::Srgba(Srgba::new(
        ca.red + (cb.red - ca.red) * t,
        ca.green + (cb.green - ca.green) * t,
        ca.blue + (cb.blue - ca.blue) * t,
        ca.alpha + (cb.alpha - ca.alpha) * t,
    ))
}

pub fn to_rgba8(color: Color) -> [u8; 4] {
    let c = color.to_srgba();
    [c.red, c.green, c.blue, c.alpha].map(|v| (v.clamp(0.0, 1.0) * 255.0).round() as u8)
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_and_solid_bakes() {
        let mut gradient = ColorGradient::empty();
        assert!(gradient.image().pixels.iter().all(|p| *p == [0; 4]));
        assert!(gradient.legend().is_none());

        gradient.insert(0.5, Color::srgb(0.0, 1.0, 0.0), true);
        assert!(gradient.image().pixels.iter().all(|p| *p == [0, 255, 0, 255]));
        assert!(!gradient.is_usable());
    }

    #[test]
    fn two_stops_span_the_image() {
        let gradient = ColorGradient::from_stops([
            (0.0, Color::srgb(0.0, 0.0, 1.0)),
            (1.0, Color::srgb(1.0, 0.0, 0.0)),
        ]);
        let image = gradient.image();
        assert_eq!(image.width(), GRADIENT_IMAGE_WIDTH);
        assert_eq!(image.pixels[0], [0, 0, 255, 255]);
        assert_eq!(image.pixels[GRADIENT_IMAGE_WIDTH - 1], [255, 0, 0, 255]);
        assert_eq!(gradient.sample(0.5), image.pixels[128]);
        assert_eq!(gradient.sample(-3.0), [0, 0, 255, 255]);
        assert_eq!(gradient.sample(7.0), [255, 0, 0, 255]);
    }

    #[test]
    fn insert_without_replace_keeps_existing_stop() {
        let mut gradient = ColorGradient::empty();
        assert!(gradient.insert(0.0, Color::srgb(0.0, 0.0, 1.0), true));
        assert!(!gradient.insert(0.0, Color::srgb(1.0, 1.0, 1.0), false));
        assert_eq!(gradient.get_item(0), Some((0.0, Color::srgb(0.0, 0.0, 1.0))));

        assert!(gradient.insert(0.0, Color::srgb(1.0, 1.0, 1.0), true));
        assert_eq!(gradient.get_item(0), Some((0.0, Color::srgb(1.0, 1.0, 1.0))));
        assert_eq!(gradient.len(), 1);
    }

    #[test]
    fn negative_zero_is_the_same_stop_as_zero() {
        let mut gradient = ColorGradient::empty();
        assert!(gradient.insert(-0.0, Color::srgb(0.0, 0.0, 1.0), true));
        assert!(!gradient.insert(0.0, Color::srgb(0.0, 1.0, 0.0), false));
        assert!(gradient.insert(1.0, Color::srgb(1.0, 0.0, 0.0), true));
        assert_eq!(gradient.len(), 2);
        assert!(gradient.get_item(0).unwrap().0.is_sign_positive());

        let from_stops = ColorGradient::from_stops([
            (-0.0, Color::srgb(0.0, 0.0, 1.0)),
            (0.0, Color::srgb(0.0, 1.0, 0.0)),
            (1.0, Color::srgb(1.0, 0.0, 0.0)),
        ]);
        assert_eq!(from_stops.len(), 2);
        assert_eq!(from_stops.sample(0.0), [0, 255, 0, 255]);
        assert!(from_stops.image().pixels.iter().all(|texel| texel[3] == 255));
        assert!(gradient.remove(-0.0));
    }

    #[test]
    fn remove_rebakes() {
        let mut gradient = ColorGradient::default();
        let before = gradient.image().clone();
        assert!(gradient.remove(0.35));
        assert!(!gradient.remove(0.35));
        assert_ne!(&before, gradient.image());
        assert_eq!(gradient.len(), 3);
    }

    #[test]
    fn legend_offsets_are_normalized() {
        let gradient = ColorGradient::from_stops([
            (10.0, Color::srgb(0.0, 0.0, 1.0)),
            (15.0, Color::srgb(0.0, 1.0, 0.0)),
            (20.0, Color::srgb(1.0, 0.0, 0.0)),
        ]);
        let legend = gradient.legend().unwrap();
        let offsets: Vec<f32> = legend.stops.iter().map(|s| s.offset).collect();
        assert_eq!(offsets, vec![0.0, 0.5, 1.0]);
        assert_eq!(
            legend.to_css(),
            "linear-gradient(to right, rgba(0, 0, 255, 1.00) 0.00%, rgba(0, 255, 0, 1.00) 50.00%, rgba(255, 0, 0, 1.00) 100.00%)",
        );
    }

    #[test]
    fn serde_round_trip_preserves_stops() {
        let gradient = ColorGradient::default();
        let json = serde_json::to_string(&gradient).unwrap();
        let parsed: ColorGradient = serde_json::from_str(&json).unwrap();
        assert!(gradient.equals(&parsed));
    }
}
