use palette::{LinSrgb, Mix, Srgb};
use plotters::style::RGBColor;

// ---------------------------------------------------------------------------
// Continuous colour scale: normalised usage → RGB
// ---------------------------------------------------------------------------

/// Matplotlib's viridis at five evenly spaced anchors.
const VIRIDIS: [(u8, u8, u8); 5] = [
    (68, 1, 84),
    (59, 82, 139),
    (33, 145, 140),
    (94, 201, 98),
    (253, 231, 37),
];

/// Piecewise-linear colour scale, interpolated in linear RGB.
#[derive(Debug, Clone)]
pub struct ColorScale {
    stops: Vec<LinSrgb>,
}

impl Default for ColorScale {
    fn default() -> Self {
        Self::viridis()
    }
}

impl ColorScale {
    pub fn viridis() -> Self {
        let stops = VIRIDIS
            .iter()
            .map(|&(r, g, b)| Srgb::new(r, g, b).into_format::<f32>().into_linear())
            .collect();
        ColorScale { stops }
    }

    /// Colour for `t` in `[0, 1]`; values outside are clamped, NaN maps to 0.
    pub fn color_at(&self, t: f64) -> RGBColor {
        let t = if t.is_nan() { 0.0 } else { t.clamp(0.0, 1.0) };
        let segments = self.stops.len() - 1;
        let pos = t * segments as f64;
        let idx = (pos.floor() as usize).min(segments - 1);
        let local = (pos - idx as f64) as f32;

        let mixed = self.stops[idx].mix(self.stops[idx + 1], local);
        let srgb: Srgb<f32> = Srgb::from_linear(mixed);
        let rgb: Srgb<u8> = srgb.into_format();
        RGBColor(rgb.red, rgb.green, rgb.blue)
    }

    /// `steps` colours sampled evenly from bottom to top, for the colour bar.
    pub fn gradient(&self, steps: usize) -> Vec<RGBColor> {
        match steps {
            0 => Vec::new(),
            1 => vec![self.color_at(0.0)],
            _ => (0..steps)
                .map(|i| self.color_at(i as f64 / (steps - 1) as f64))
                .collect(),
        }
    }
}
