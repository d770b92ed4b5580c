//! Nearest-neighbour matching against a lamp's fixed palette.
//!
//! Some bulbs only render a small set of predefined colors and white
//! temperatures. Requests are snapped to the closest renderable point.

use crate::error::Result;
use crate::xml::Tree;
use log::debug;
use std::f64::consts::PI;
use std::future::Future;
use tokio::sync::OnceCell;

/// A renderable color on the appliance's native scale: hue 0-359,
/// saturation and value 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorPoint {
    pub hue: u16,
    pub saturation: u8,
    pub value: u8,
}

/// A requested color: hue 0-360, saturation and value 0-100.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub hue: f64,
    pub saturation: f64,
    pub value: f64,
}

impl Hsv {
    pub fn new(hue: f64, saturation: f64, value: f64) -> Self {
        Self {
            hue,
            saturation,
            value,
        }
    }
}

/// A renderable white temperature in Kelvin.
pub type TemperaturePoint = u32;

/// Color and temperature defaults as reported by `getcolordefaults`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Palette {
    pub colors: Vec<ColorPoint>,
    pub temperatures: Vec<TemperaturePoint>,
}

impl Palette {
    /// Flatten a `getcolordefaults` document. Entries with unreadable numbers
    /// are skipped.
    pub fn from_color_defaults(tree: &Tree) -> Self {
        let mut palette = Palette::default();
        let Some(defaults) = tree.get("colordefaults") else {
            return palette;
        };

        if let Some(groups) = defaults.path(&["hsdefaults", "hs"]) {
            for group in groups.as_list() {
                let Some(colors) = group.get("color") else {
                    continue;
                };
                for color in colors.as_list() {
                    let hue = attr_number(color, &["hue"]);
                    let sat = attr_number(color, &["sat", "saturation"]);
                    let val = attr_number(color, &["val", "value"]);
                    if let (Some(hue), Some(sat), Some(val)) = (hue, sat, val) {
                        palette.colors.push(ColorPoint {
                            hue: hue.min(359) as u16,
                            saturation: sat.min(255) as u8,
                            value: val.min(255) as u8,
                        });
                    }
                }
            }
        }

        if let Some(temps) = defaults.path(&["temperaturedefaults", "temp"]) {
            for temp in temps.as_list() {
                if let Some(kelvin) = attr_number(temp, &["val", "value"]) {
                    palette.temperatures.push(kelvin);
                }
            }
        }

        debug!(
            "Loaded {} colors and {} temperatures",
            palette.colors.len(),
            palette.temperatures.len()
        );
        palette
    }
}

fn attr_number(node: &Tree, names: &[&str]) -> Option<u32> {
    names
        .iter()
        .find_map(|n| node.attr(n))
        .and_then(|s| s.trim().parse().ok())
}

/// Holds the palette once loaded. Empty until then.
#[derive(Debug, Default)]
pub struct ColorMatcher {
    palette: OnceCell<Palette>,
}

impl ColorMatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// A matcher with an already known palette.
    pub fn with_palette(palette: Palette) -> Self {
        Self {
            palette: OnceCell::new_with(Some(palette)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.palette.initialized()
    }

    pub fn palette(&self) -> Option<&Palette> {
        self.palette.get()
    }

    /// Run `load` unless the palette is already present. Concurrent callers
    /// share one load; a failed load leaves the matcher empty.
    pub async fn load_with<F, Fut>(&self, load: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Palette>>,
    {
        self.palette.get_or_try_init(load).await?;
        Ok(())
    }

    /// The palette color closest to `target` in HSV cone space. `None` while
    /// no colors are loaded.
    pub fn closest_color(&self, target: Hsv) -> Option<ColorPoint> {
        let colors = &self.palette.get()?.colors;
        let t = cone(target.hue, target.saturation / 100.0, target.value / 100.0);

        let mut ranked: Vec<(f64, usize)> = colors
            .iter()
            .enumerate()
            .map(|(index, c)| {
                let p = cone(
                    f64::from(c.hue),
                    f64::from(c.saturation) / 255.0,
                    f64::from(c.value) / 255.0,
                );
                let distance = (t[0] - p[0]).powi(2) + (t[1] - p[1]).powi(2) + (t[2] - p[2]).powi(2);
                (distance, index)
            })
            .collect();
        // Stable sort keeps the earliest index first on ties
        ranked.sort_by(|a, b| a.0.total_cmp(&b.0));

        ranked.first().map(|&(_, index)| colors[index])
    }

    /// The palette temperature closest to `mired`, in Kelvin. The first of
    /// equally close candidates wins. `None` while no temperatures are loaded.
    pub fn closest_color_temperature(&self, mired: u32) -> Option<TemperaturePoint> {
        let temperatures = &self.palette.get()?.temperatures;
        let kelvin = i64::from(mired_to_kelvin(mired));
        let mut iter = temperatures.iter().copied();
        let first = iter.next()?;
        Some(iter.fold(first, |best, candidate| {
            if (i64::from(candidate) - kelvin).abs() < (i64::from(best) - kelvin).abs() {
                candidate
            } else {
                best
            }
        }))
    }
}

/// `K = round(1_000_000 / mired)`; zero mired maps to zero.
pub fn mired_to_kelvin(mired: u32) -> u32 {
    if mired == 0 {
        return 0;
    }
    (1_000_000.0 / f64::from(mired)).round() as u32
}

/// Map hue in degrees plus normalized saturation and value to cone coordinates.
fn cone(hue_degrees: f64, saturation: f64, value: f64) -> [f64; 3] {
    let h = hue_degrees * 2.0 * PI / 360.0;
    [h.sin() * saturation * value, h.cos() * saturation * value, value]
}
