//! Quicklook chart rendering on top of `plotters`.
//!
//! Two layouts: a single false-color heatmap with a horizontal colorbar, and
//! a three-region composite adding a total-flux subplot. All geometry comes
//! from [`geom`]; this module only composes it and draws.

pub mod geom;

use std::{error::Error, path::PathBuf};

use hifitime::{Duration, Epoch};
use itertools::Itertools;
use log::debug;
use ndarray::{Array1, Array2, ArrayView2};
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::{stats, CallistoError, Observation};
use geom::AxisTicks;

/// False-color maps for intensity data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Colormap {
    Jet,
    Inferno,
}

impl Colormap {
    /// Map a normalised intensity in `[0, 1]` to a color. Non-finite input
    /// maps to the low end of the scale.
    pub fn sample(self, t: f32) -> RGBColor {
        let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.0 };
        match self {
            Colormap::Jet => jet(t),
            Colormap::Inferno => inferno(t),
        }
    }
}

fn jet(t: f32) -> RGBColor {
    let four_t = 4.0 * t;
    let r = (1.5 - (four_t - 3.0).abs()).clamp(0.0, 1.0);
    let g = (1.5 - (four_t - 2.0).abs()).clamp(0.0, 1.0);
    let b = (1.5 - (four_t - 1.0).abs()).clamp(0.0, 1.0);
    RGBColor((r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8)
}

/// Anchor points sampled from matplotlib's inferno map, linearly
/// interpolated.
const INFERNO_ANCHORS: [(u8, u8, u8); 11] = [
    (0, 0, 4),
    (22, 11, 57),
    (66, 10, 104),
    (106, 23, 110),
    (147, 38, 103),
    (188, 55, 84),
    (221, 81, 58),
    (243, 120, 25),
    (252, 165, 10),
    (246, 215, 70),
    (252, 255, 164),
];

fn inferno(t: f32) -> RGBColor {
    let x = t * (INFERNO_ANCHORS.len() - 1) as f32;
    let i = (x.floor() as usize).min(INFERNO_ANCHORS.len() - 2);
    let frac = x - i as f32;
    let (r0, g0, b0) = INFERNO_ANCHORS[i];
    let (r1, g1, b1) = INFERNO_ANCHORS[i + 1];
    let lerp = |a: u8, b: u8| (f32::from(a) + (f32::from(b) - f32::from(a)) * frac).round() as u8;
    RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}

/// Everything a chart layout can be parameterised with.
#[derive(Debug, Clone)]
pub struct PlotOptions {
    /// Leading part of the output name template
    /// (`prefix sep YYYYMMDD sep HHMMSS [sep suffix]`).
    pub prefix: String,
    pub suffix: String,
    pub sep: String,

    pub colormap: Colormap,

    /// Fixed intensity range for the color scale; the finite data range when
    /// `None`.
    pub intensity_range: Option<(f32, f32)>,

    /// Frequency range `[fmin, fmax)` for the dense axis;
    /// `floor(min freq)..floor(max freq)` of the observation when `None`.
    pub freq_range: Option<(i64, i64)>,

    /// Re-grid onto a dense integer axis, leaving unmeasured frequencies as
    /// black bands.
    pub gap_bands: bool,

    /// Clip window (seconds offsets) for the flux subplot's x axis; the full
    /// time span when `None`.
    pub flux_window: Option<(f64, f64)>,

    /// Output raster size in pixels.
    pub dimensions: (u32, u32),

    /// When false, compute the name and tick data but write nothing.
    pub save: bool,
}

impl Default for PlotOptions {
    fn default() -> PlotOptions {
        PlotOptions {
            prefix: String::new(),
            suffix: String::new(),
            sep: "_".to_string(),
            colormap: Colormap::Jet,
            intensity_range: None,
            freq_range: None,
            gap_bands: true,
            flux_window: None,
            dimensions: (1200, 900),
            save: true,
        }
    }
}

/// The computed (not necessarily drawn) result of a heatmap render.
#[derive(Debug, Clone)]
pub struct HeatmapRender {
    /// Output name stem (no directory, no extension).
    pub name: String,
    /// Where the PNG was (or would be) written.
    pub png_path: PathBuf,
    pub time_ticks: AxisTicks,
    pub freq_ticks: AxisTicks,
}

/// Single-axes layout: heatmap plus a horizontal colorbar underneath.
pub fn render_heatmap(
    obs: &Observation,
    data: ArrayView2<f32>,
    opts: &PlotOptions,
) -> Result<HeatmapRender, CallistoError> {
    let prepared = prepare(obs, data, opts)?;
    if opts.save {
        draw_heatmap_layout(obs, &prepared, opts)
            .map_err(|e| CallistoError::Render(e.to_string()))?;
        debug!("Wrote {}", prepared.png_path.display());
    }
    Ok(prepared.into_render())
}

/// Three-region layout: heatmap, slim colorbar strip, and the total-flux
/// time series of the observation's raw matrix.
pub fn render_heatmap_with_flux(
    obs: &Observation,
    data: ArrayView2<f32>,
    opts: &PlotOptions,
) -> Result<HeatmapRender, CallistoError> {
    let prepared = prepare(obs, data, opts)?;
    if opts.save {
        draw_flux_layout(obs, &prepared, opts).map_err(|e| CallistoError::Render(e.to_string()))?;
        debug!("Wrote {}", prepared.png_path.display());
    }
    Ok(prepared.into_render())
}

struct Prepared {
    timestamp: Epoch,
    name: String,
    png_path: PathBuf,
    shown_freq: Array1<f64>,
    shown_data: Array2<f32>,
    value_range: (f32, f32),
    time_ticks: AxisTicks,
    freq_ticks: AxisTicks,
}

impl Prepared {
    fn into_render(self) -> HeatmapRender {
        HeatmapRender {
            name: self.name,
            png_path: self.png_path,
            time_ticks: self.time_ticks,
            freq_ticks: self.freq_ticks,
        }
    }
}

fn prepare(
    obs: &Observation,
    data: ArrayView2<f32>,
    opts: &PlotOptions,
) -> Result<Prepared, CallistoError> {
    let timestamp = geom::observation_timestamp(obs)?;

    let (fmin, fmax) = opts.freq_range.unwrap_or_else(|| {
        match obs
            .freq
            .iter()
            .minmax_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
        {
            itertools::MinMaxResult::MinMax(lo, hi) => (lo.floor() as i64, hi.floor() as i64),
            itertools::MinMaxResult::OneElement(x) => (x.floor() as i64, x.floor() as i64 + 1),
            itertools::MinMaxResult::NoElements => (0, 0),
        }
    });

    let (shown_freq, shown_data) = if opts.gap_bands {
        geom::reconstruct_with_gaps(obs.freq.view(), data, fmin, fmax)
    } else {
        (obs.freq.clone(), data.to_owned())
    };

    let value_range = opts.intensity_range.unwrap_or_else(|| {
        let mut lo = f32::INFINITY;
        let mut hi = f32::NEG_INFINITY;
        for &v in shown_data.iter() {
            if v.is_finite() {
                lo = lo.min(v);
                hi = hi.max(v);
            }
        }
        if lo.is_finite() && hi > lo {
            (lo, hi)
        } else {
            (0.0, 1.0)
        }
    });

    let mut name = geom::output_name(timestamp, &opts.prefix, &opts.sep);
    if !opts.suffix.is_empty() {
        name.push_str(&opts.sep);
        name.push_str(&opts.suffix);
    }
    let png_path = obs
        .path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_default()
        .join(format!("{name}.png"));

    let time_ticks = geom::time_axis_ticks(obs.time.view(), timestamp, 5);
    let freq_ticks = geom::frequency_axis_ticks(shown_freq.view(), 8);

    Ok(Prepared {
        timestamp,
        name,
        png_path,
        shown_freq,
        shown_data,
        value_range,
        time_ticks,
        freq_ticks,
    })
}

fn draw_heatmap_layout(
    obs: &Observation,
    prepared: &Prepared,
    opts: &PlotOptions,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(&prepared.png_path, opts.dimensions).into_drawing_area();
    root.fill(&WHITE)?;

    let height = opts.dimensions.1;
    let (map_area, colorbar_area) = root.split_vertically(height * 8 / 10);
    draw_heatmap_panel(&map_area, obs, prepared, opts, true)?;
    draw_colorbar_panel(&colorbar_area, prepared.value_range, opts.colormap)?;

    root.present()?;
    Ok(())
}

fn draw_flux_layout(
    obs: &Observation,
    prepared: &Prepared,
    opts: &PlotOptions,
) -> Result<(), Box<dyn Error>> {
    let root = BitMapBackend::new(&prepared.png_path, opts.dimensions).into_drawing_area();
    root.fill(&WHITE)?;

    let height = opts.dimensions.1;
    let (map_area, lower) = root.split_vertically(height * 11 / 20);
    let (colorbar_area, flux_area) = lower.split_vertically(height * 3 / 20);
    draw_heatmap_panel(&map_area, obs, prepared, opts, true)?;
    draw_colorbar_panel(&colorbar_area, prepared.value_range, opts.colormap)?;
    draw_flux_panel(&flux_area, obs, prepared, opts)?;

    root.present()?;
    Ok(())
}

fn draw_heatmap_panel(
    area: &DrawingArea<BitMapBackend, Shift>,
    obs: &Observation,
    prepared: &Prepared,
    opts: &PlotOptions,
    with_caption: bool,
) -> Result<(), Box<dyn Error>> {
    let num_chans = prepared.shown_data.nrows();
    let num_samples = prepared.shown_data.ncols();
    if num_chans == 0 || num_samples == 0 {
        return Ok(());
    }

    let mut builder = ChartBuilder::on(area);
    builder
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(55);
    if with_caption {
        builder.caption(
            format!(
                "{}  SNR={:.3}",
                geom::format_full(prepared.timestamp),
                obs.snr
            ),
            ("sans-serif", 22),
        );
    }
    let mut chart = builder.build_cartesian_2d(0f64..num_samples as f64, 0f64..num_chans as f64)?;

    let timestamp = prepared.timestamp;
    let time = &obs.time;
    let shown_freq = &prepared.shown_freq;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_labels(prepared.time_ticks.positions.len().max(2))
        .y_labels(prepared.freq_ticks.positions.len().max(2))
        .x_label_formatter(&|x: &f64| {
            let i = (*x as usize).min(time.len().saturating_sub(1));
            match time.get(i) {
                Some(&t) => geom::format_hms(timestamp + Duration::from_seconds(t)),
                None => String::new(),
            }
        })
        .y_label_formatter(&|y: &f64| {
            let row = num_chans - 1 - (*y as usize).min(num_chans - 1);
            format!("{:.0}", shown_freq[row])
        })
        .x_desc("Time (UT)")
        .y_desc("Frequency (MHz)")
        .label_style(("sans-serif", 16))
        .draw()?;

    let (vmin, vmax) = prepared.value_range;
    let span = (vmax - vmin).max(f32::EPSILON);
    chart.draw_series(prepared.shown_data.indexed_iter().map(|((row, col), &v)| {
        // Row 0 is the highest frequency and belongs at the top.
        let y = (num_chans - 1 - row) as f64;
        let x = col as f64;
        let color = if v.is_finite() {
            opts.colormap.sample((v - vmin) / span)
        } else {
            BLACK
        };
        Rectangle::new([(x, y), (x + 1.0, y + 1.0)], color.filled())
    }))?;

    Ok(())
}

fn draw_colorbar_panel(
    area: &DrawingArea<BitMapBackend, Shift>,
    value_range: (f32, f32),
    colormap: Colormap,
) -> Result<(), Box<dyn Error>> {
    let (vmin, vmax) = value_range;
    let span = (vmax - vmin).max(f32::EPSILON);
    let area = area.margin(5, 5, 120, 120);

    let mut chart = ChartBuilder::on(&area)
        .x_label_area_size(30)
        .build_cartesian_2d(vmin as f64..(vmin + span) as f64, 0f64..1f64)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .disable_y_axis()
        .x_desc("Instrumental value")
        .label_style(("sans-serif", 14))
        .draw()?;

    const STEPS: usize = 256;
    chart.draw_series((0..STEPS).map(|i| {
        let t = i as f32 / (STEPS - 1) as f32;
        let x0 = f64::from(vmin) + f64::from(span) * i as f64 / STEPS as f64;
        let x1 = f64::from(vmin) + f64::from(span) * (i + 1) as f64 / STEPS as f64;
        Rectangle::new([(x0, 0.0), (x1, 1.0)], colormap.sample(t).filled())
    }))?;

    Ok(())
}

fn draw_flux_panel(
    area: &DrawingArea<BitMapBackend, Shift>,
    obs: &Observation,
    prepared: &Prepared,
    opts: &PlotOptions,
) -> Result<(), Box<dyn Error>> {
    if obs.time.is_empty() {
        return Ok(());
    }

    let flux = stats::flatten_frequency(obs.data.view());
    let (x_lo, x_hi) = opts
        .flux_window
        .unwrap_or((obs.time[0], obs.time[obs.time.len() - 1]));
    let (y_lo, y_hi) = {
        let mut lo = f64::INFINITY;
        let mut hi = f64::NEG_INFINITY;
        for &v in flux.iter() {
            lo = lo.min(v);
            hi = hi.max(v);
        }
        if lo.is_finite() && hi > lo {
            (lo, hi)
        } else {
            (0.0, 1.0)
        }
    };

    let timestamp = prepared.timestamp;
    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(55)
        .build_cartesian_2d(x_lo..x_hi.max(x_lo + f64::EPSILON), y_lo..y_hi)?;

    chart
        .configure_mesh()
        .x_label_formatter(&|x: &f64| geom::format_hms(timestamp + Duration::from_seconds(*x)))
        .x_desc("Time (UT)")
        .y_desc("Total flux")
        .label_style(("sans-serif", 16))
        .draw()?;

    chart.draw_series(LineSeries::new(
        obs.time.iter().zip(flux.iter()).map(|(&t, &f)| (t, f)),
        &GREEN,
    ))?;

    Ok(())
}
