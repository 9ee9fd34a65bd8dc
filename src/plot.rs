use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use plotters::prelude::*;
use plotters::style::register_font;

use crate::color::ColorScale;
use crate::data::select::{Highlight, Selection};
use crate::error::{PipelineError, Result};

const FONT: &str = "sans-serif";
const SANS: &[u8] = include_bytes!("../assets/fonts/DejaVuSans.ttf");
const SANS_BOLD: &[u8] = include_bytes!("../assets/fonts/DejaVuSans-Bold.ttf");
const COLORBAR_WIDTH: u32 = 110;
const COLORBAR_MARGIN: i32 = 70;
const RANGE_PADDING: f64 = 0.05;

// ---------------------------------------------------------------------------
// Render settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    pub width: u32,
    pub height: u32,
    pub point_radius: u32,
    pub point_opacity: f64,
    pub title: String,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 800,
            point_radius: 4,
            point_opacity: 0.6,
            title: "Concept Memory Visualization (t-SNE)".to_string(),
        }
    }
}

/// The image written for `input`: same path, `.png` extension.
pub fn artifact_path(input: &Path) -> PathBuf {
    input.with_extension("png")
}

// ---------------------------------------------------------------------------
// Layout helpers
// ---------------------------------------------------------------------------

/// Axis range covering `values` with 5% padding; a flat range is widened by ±1.
pub fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !min.is_finite() {
        return (-1.0, 1.0);
    }
    let span = max - min;
    if span.abs() < f64::EPSILON {
        return (min - 1.0, max + 1.0);
    }
    (min - span * RANGE_PADDING, max + span * RANGE_PADDING)
}

/// A text label to draw next to a point.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub index: usize,
    pub label: String,
    pub highlight: Highlight,
}

/// Labels for interesting concepts, usage-only first so keyword labels are
/// drawn on top.
pub fn annotations(labels: &[String], selection: &Selection) -> Vec<Annotation> {
    let mut out: Vec<Annotation> = selection
        .interesting_indices()
        .into_iter()
        .map(|i| Annotation {
            index: i,
            label: labels[i].clone(),
            highlight: selection.highlights[i],
        })
        .collect();
    out.sort_by_key(|a| (a.highlight, a.index));
    out
}

fn label_style(highlight: Highlight) -> TextStyle<'static> {
    match highlight {
        Highlight::Keyword => (FONT, 14, FontStyle::Bold).into_font().color(&BLACK),
        _ => (FONT, 10).into_font().color(&BLACK),
    }
}

/// Make the bundled DejaVu faces available as `sans-serif`.  Text never
/// depends on the fonts installed on the host.
fn register_fonts() -> Result<()> {
    static REGISTERED: OnceLock<bool> = OnceLock::new();
    let loaded = *REGISTERED.get_or_init(|| {
        [(FontStyle::Normal, SANS), (FontStyle::Bold, SANS_BOLD)]
            .into_iter()
            .all(|(style, bytes)| register_font(FONT, style, bytes).is_ok())
    });
    if loaded {
        Ok(())
    } else {
        Err(PipelineError::Render("bundled font could not be parsed".to_string()))
    }
}

fn render_err(e: impl std::fmt::Display) -> PipelineError {
    PipelineError::Render(e.to_string())
}

// ---------------------------------------------------------------------------
// Scatter plot
// ---------------------------------------------------------------------------

/// Draw the annotated scatter plot into an in-memory RGB buffer.
pub fn render(
    points: &[(f64, f64)],
    labels: &[String],
    selection: &Selection,
    config: &RenderConfig,
) -> Result<Vec<u8>> {
    register_fonts()?;
    let (w, h) = (config.width, config.height);
    let mut buffer = vec![0u8; (w as usize) * (h as usize) * 3];
    let scale = ColorScale::viridis();

    {
        let root = BitMapBackend::with_buffer(&mut buffer, (w, h)).into_drawing_area();
        root.fill(&WHITE).map_err(render_err)?;
        let (chart_area, bar_area) = root.split_horizontally(w.saturating_sub(COLORBAR_WIDTH));

        let x_range = padded_range(points.iter().map(|p| p.0));
        let y_range = padded_range(points.iter().map(|p| p.1));

        let mut chart = ChartBuilder::on(&chart_area)
            .caption(&config.title, (FONT, 28))
            .margin(20)
            .x_label_area_size(45)
            .y_label_area_size(60)
            .build_cartesian_2d(x_range.0..x_range.1, y_range.0..y_range.1)
            .map_err(render_err)?;

        chart
            .configure_mesh()
            .x_desc("Dimension 1")
            .y_desc("Dimension 2")
            .bold_line_style(RGBColor(220, 220, 220).stroke_width(1))
            .light_line_style(RGBColor(240, 240, 240).stroke_width(1))
            .draw()
            .map_err(render_err)?;

        chart
            .draw_series(points.iter().zip(&selection.normalized_usage).map(
                |(&(x, y), &usage)| {
                    Circle::new(
                        (x, y),
                        config.point_radius,
                        scale.color_at(usage).mix(config.point_opacity).filled(),
                    )
                },
            ))
            .map_err(render_err)?;

        chart
            .draw_series(annotations(labels, selection).into_iter().map(|a| {
                Text::new(a.label, points[a.index], label_style(a.highlight))
            }))
            .map_err(render_err)?;

        draw_colorbar(&bar_area, &scale, selection.usage_range)?;

        root.present().map_err(render_err)?;
    }

    Ok(buffer)
}

/// Vertical usage scale, low usage at the bottom.
fn draw_colorbar<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    scale: &ColorScale,
    (min_usage, max_usage): (u64, u64),
) -> Result<()> {
    let (width, height) = area.dim_in_pixel();
    let top = COLORBAR_MARGIN;
    let bottom = height as i32 - COLORBAR_MARGIN;
    if bottom <= top {
        return Ok(());
    }
    let x0 = 20;
    let x1 = (x0 + 24).min(width as i32);

    let steps = (bottom - top) as usize;
    for (i, color) in scale.gradient(steps).into_iter().enumerate() {
        let y = bottom - i as i32;
        area.draw(&Rectangle::new([(x0, y - 1), (x1, y)], color.filled()))
            .map_err(render_err)?;
    }
    area.draw(&Rectangle::new([(x0, top), (x1, bottom)], BLACK.stroke_width(1)))
        .map_err(render_err)?;

    let text = (FONT, 12).into_font().color(&BLACK);
    area.draw(&Text::new("usage", (x0, top - 24), text.clone()))
        .map_err(render_err)?;
    area.draw(&Text::new(max_usage.to_string(), (x1 + 6, top - 6), text.clone()))
        .map_err(render_err)?;
    area.draw(&Text::new(min_usage.to_string(), (x1 + 6, bottom - 6), text))
        .map_err(render_err)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Artifact output
// ---------------------------------------------------------------------------

/// Encode an RGB buffer as PNG at `path`.
///
/// The image goes to a sibling `.part` file first and is renamed into place,
/// so an existing artifact is replaced whole or not at all.
pub fn write_png(buffer: Vec<u8>, width: u32, height: u32, path: &Path) -> Result<()> {
    let image = image::RgbImage::from_raw(width, height, buffer).ok_or_else(|| {
        PipelineError::Render(format!("buffer does not hold a {width}x{height} RGB image"))
    })?;

    let partial = path.with_extension("png.part");
    let written = image
        .save_with_format(&partial, image::ImageFormat::Png)
        .map_err(|e| match e {
            image::ImageError::IoError(source) => PipelineError::Io {
                path: partial.clone(),
                source,
            },
            other => render_err(other),
        })
        .and_then(|()| {
            std::fs::rename(&partial, path).map_err(|source| PipelineError::Io {
                path: path.to_path_buf(),
                source,
            })
        });

    if written.is_err() {
        let _ = std::fs::remove_file(&partial);
    }
    written
}

/// Render the plot and write it to `path`.
pub fn render_to_file(
    points: &[(f64, f64)],
    labels: &[String],
    selection: &Selection,
    config: &RenderConfig,
    path: &Path,
) -> Result<()> {
    let buffer = render(points, labels, selection, config)?;
    write_png(buffer, config.width, config.height, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selection(highlights: Vec<Highlight>) -> Selection {
        let n = highlights.len();
        Selection {
            normalized_usage: (0..n).map(|i| i as f64 / n.max(1) as f64).collect(),
            highlights,
            usage_range: (0, 10),
        }
    }

    #[test]
    fn artifact_replaces_extension() {
        assert_eq!(
            artifact_path(Path::new("out/concepts.json")),
            PathBuf::from("out/concepts.png")
        );
        assert_eq!(artifact_path(Path::new("dump")), PathBuf::from("dump.png"));
    }

    #[test]
    fn ranges_are_padded() {
        let (lo, hi) = padded_range([0.0, 10.0, 5.0].into_iter());
        assert!((lo + 0.5).abs() < 1e-12);
        assert!((hi - 10.5).abs() < 1e-12);
        assert_eq!(padded_range([3.0, 3.0].into_iter()), (2.0, 4.0));
        assert_eq!(padded_range(std::iter::empty()), (-1.0, 1.0));
    }

    #[test]
    fn keyword_labels_are_drawn_last() {
        let labels: Vec<String> = ["cat", "truck", "car", "tiger"].map(String::from).to_vec();
        let sel = selection(vec![
            Highlight::Keyword,
            Highlight::Usage,
            Highlight::None,
            Highlight::Keyword,
        ]);
        let ann = annotations(&labels, &sel);
        let order: Vec<&str> = ann.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(order, vec!["truck", "cat", "tiger"]);
        assert_eq!(ann[0].highlight, Highlight::Usage);
    }

    #[test]
    fn keyword_style_is_larger_than_usage_style() {
        let keyword = label_style(Highlight::Keyword);
        let usage = label_style(Highlight::Usage);
        assert!(keyword.font.get_size() > usage.font.get_size());
        assert!(matches!(keyword.font.get_style(), FontStyle::Bold));
        assert!(matches!(usage.font.get_style(), FontStyle::Normal));
    }

    #[test]
    fn png_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        std::fs::write(&path, b"stale").unwrap();

        write_png(vec![255u8; 4 * 3 * 3], 4, 3, &path).unwrap();

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (4, 3));
        assert!(!path.with_extension("png.part").exists());
    }

    #[test]
    fn failed_write_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("plot.png");
        let err = write_png(vec![0u8; 12], 2, 2, &path).unwrap_err();
        assert!(matches!(err, PipelineError::Io { .. }));
        assert!(!path.exists());
    }

    #[test]
    fn short_buffer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.png");
        let err = write_png(vec![0u8; 5], 2, 2, &path).unwrap_err();
        assert!(matches!(err, PipelineError::Render(_)));
        assert!(!path.exists());
    }

    #[test]
    fn bundled_fonts_register() {
        register_fonts().unwrap();
        let layout = (FONT, 14, FontStyle::Bold)
            .into_font()
            .box_size("feline")
            .unwrap();
        assert!(layout.0 > 0);
    }

    #[test]
    fn renders_scatter_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("concepts.png");
        let points = vec![(-3.0, 1.0), (2.5, -0.5), (0.0, 4.0)];
        let labels: Vec<String> = ["cat", "dog", "truck"].map(String::from).to_vec();
        let sel = selection(vec![Highlight::Keyword, Highlight::None, Highlight::Usage]);
        let config = RenderConfig::default();

        render_to_file(&points, &labels, &sel, &config, &path).unwrap();

        let img = image::open(&path).unwrap().to_rgb8();
        assert_eq!((img.width(), img.height()), (config.width, config.height));
        // something other than the white background was drawn
        assert!(img.pixels().any(|px| px.0 != [255, 255, 255]));
        assert!(!path.with_extension("png.part").exists());
    }

    #[test]
    fn render_fills_the_requested_canvas() {
        let points = vec![(0.0, 0.0), (1.0, 1.0)];
        let labels: Vec<String> = ["cat", "dog"].map(String::from).to_vec();
        let sel = selection(vec![Highlight::Keyword, Highlight::None]);
        let config = RenderConfig {
            width: 400,
            height: 300,
            ..RenderConfig::default()
        };
        let buffer = render(&points, &labels, &sel, &config).unwrap();
        assert_eq!(buffer.len(), 400 * 300 * 3);
    }
}
