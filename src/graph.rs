#![cfg(not(tarpaulin_include))]
#![cfg(feature = "web")]
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::prelude::*;

use crate::dashboard::Workload;
use crate::error::{TrackerError, TrackerResult};
use crate::task::{Stage, TaskKind};

/// Configuration options for chart generation
#[derive(Clone, Debug)]
pub struct ChartOptions {
    /// Title displayed at the top of the chart
    pub title: String,

    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            title: "Chart".to_string(),
            width: 640,
            height: 420,
        }
    }
}

const PIE_PALETTE: [RGBColor; 4] = [
    RGBColor(141, 211, 199),
    RGBColor(255, 255, 179),
    RGBColor(190, 186, 218),
    RGBColor(251, 128, 114),
];

fn chart_err<E: std::fmt::Display>(e: E) -> TrackerError {
    TrackerError::Chart(e.to_string())
}

/// Fill colour of a stage, taken from its accent
pub fn stage_color(stage: Stage) -> RGBColor {
    let hex = stage.accent().trim_start_matches('#');
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(128);
    RGBColor(channel(0), channel(2), channel(4))
}

/// Render into an RGB buffer and encode it as PNG
fn render_png<F>(options: &ChartOptions, draw: F) -> TrackerResult<Vec<u8>>
where
    F: FnOnce(DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>) -> TrackerResult<()>,
{
    let (width, height) = (options.width, options.height);
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;
        draw(root)?;
    }

    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(&buffer, width, height, ColorType::Rgb8)
        .map_err(chart_err)?;
    Ok(png)
}

/// Stacked bar chart of tasks per assignee, one colour per stage
///
/// # Arguments
/// * `rows` - Workload per assignee, as computed by the dashboard
/// * `options` - Title and size of the chart
///
/// # Returns
/// * PNG image data as bytes
pub fn workload_chart(rows: &[Workload], options: &ChartOptions) -> TrackerResult<Vec<u8>> {
    let names: Vec<String> = rows.iter().map(|r| r.assignee.clone()).collect();
    let max_y = rows.iter().map(Workload::total).max().unwrap_or(0).max(1) as u32;

    render_png(options, |root| {
        let mut chart = ChartBuilder::on(&root)
            .caption(&options.title, ("sans-serif", 24).into_font())
            .margin(10)
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d((0..names.len() as i32).into_segmented(), 0u32..max_y + 1)
            .map_err(chart_err)?;

        chart
            .configure_mesh()
            .disable_x_mesh()
            .y_desc("Tasks")
            .x_label_formatter(&|v| match v {
                SegmentValue::CenterOf(i) | SegmentValue::Exact(i) => {
                    names.get(*i as usize).cloned().unwrap_or_default()
                }
                SegmentValue::Last => String::new(),
            })
            .draw()
            .map_err(chart_err)?;

        let mut base = vec![0u32; rows.len()];
        for (slot, stage) in Stage::ALL.into_iter().enumerate() {
            let color = stage_color(stage);
            let bars: Vec<Rectangle<(SegmentValue<i32>, u32)>> = rows
                .iter()
                .enumerate()
                .filter(|(_, r)| r.per_stage[slot] > 0)
                .map(|(i, r)| {
                    let bottom = base[i];
                    let top = bottom + r.per_stage[slot] as u32;
                    base[i] = top;
                    let mut bar = Rectangle::new(
                        [
                            (SegmentValue::Exact(i as i32), bottom),
                            (SegmentValue::Exact(i as i32 + 1), top),
                        ],
                        color.filled(),
                    );
                    bar.set_margin(0, 0, 12, 12);
                    bar
                })
                .collect();

            chart
                .draw_series(bars)
                .map_err(chart_err)?
                .label(stage.label())
                .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_err)?;

        root.present().map_err(chart_err)
    })
}

/// Donut chart of the type distribution
///
/// # Arguments
/// * `distribution` - Task count per type; zero counts should be left out
/// * `options` - Title and size of the chart; an empty title is left out
pub fn type_chart(distribution: &[(TaskKind, usize)], options: &ChartOptions) -> TrackerResult<Vec<u8>> {
    render_png(options, |root| {
        let area = if options.title.is_empty() {
            root.clone()
        } else {
            root.titled(&options.title, ("sans-serif", 24))
                .map_err(chart_err)?
        };
        if distribution.is_empty() {
            return root.present().map_err(chart_err);
        }

        let (w, h) = area.dim_in_pixel();
        let center = (w as i32 / 2, h as i32 / 2);
        let radius = (w.min(h) as f64) * 0.35;
        let sizes: Vec<f64> = distribution.iter().map(|(_, n)| *n as f64).collect();
        let colors: Vec<RGBColor> = (0..distribution.len())
            .map(|i| PIE_PALETTE[i % PIE_PALETTE.len()])
            .collect();
        let labels: Vec<String> = distribution
            .iter()
            .map(|(kind, n)| format!("{} ({})", kind.short_label(), n))
            .collect();

        let mut pie = Pie::new(&center, &radius, &sizes, &colors, &labels);
        pie.label_style(("sans-serif", 16).into_font().color(&BLACK));
        area.draw(&pie).map_err(chart_err)?;
        area.draw(&Circle::new(center, (radius * 0.4) as i32, WHITE.filled()))
            .map_err(chart_err)?;

        root.present().map_err(chart_err)
    })
}
