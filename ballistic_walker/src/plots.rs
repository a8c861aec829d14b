use std::{ops::Range, path::Path};

use plotters::{drawing::DrawingAreaErrorKind, prelude::*};

use crate::{
    energy::EnergyHistory, kinematics::StickFigure, output::OutputError,
    parameters::WalkerParameters, simulation::SwingRun,
};

const CHART_SIZE: (u32, u32) = (1000, 700);
const FIGURE_SIZE: (u32, u32) = (800, 800);

impl From<DrawingAreaErrorKind<std::io::Error>> for OutputError {
    fn from(e: DrawingAreaErrorKind<std::io::Error>) -> Self {
        OutputError::Plot(e.to_string())
    }
}

/// Bounds of `values` with a 5% margin. Non-finite values are skipped.
fn padded_range(values: impl Iterator<Item = f64>) -> Range<f64> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if lo > hi {
        return 0.0..1.0;
    }
    let pad = 0.05 * (hi - lo).max(1e-6 * hi.abs().max(1.0));
    (lo - pad)..(hi + pad)
}

fn time_series(
    path: &Path,
    caption: &str,
    y_desc: &str,
    t: &[f64],
    series: &[(&str, Vec<f64>)],
) -> Result<(), OutputError> {
    let root = SVGBackend::new(path, CHART_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let x_range = padded_range(t.iter().copied());
    let y_range = padded_range(series.iter().flat_map(|(_, v)| v.iter().copied()));
    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(70)
        .build_cartesian_2d(x_range, y_range)?;
    chart.configure_mesh().x_desc("t [s]").y_desc(y_desc).draw()?;

    for (i, (label, values)) in series.iter().enumerate() {
        let style = Palette99::pick(i).stroke_width(2);
        chart
            .draw_series(LineSeries::new(
                t.iter().copied().zip(values.iter().copied()),
                style,
            ))?
            .label(*label)
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], style));
    }
    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;
    root.present()?;
    Ok(())
}

/// Joint angles in degrees against time.
pub fn plot_angles<P: AsRef<Path>>(path: P, run: &SwingRun) -> Result<(), OutputError> {
    let trajectory = &run.trajectory;
    time_series(
        path.as_ref(),
        "joint angles",
        "angle [deg]",
        trajectory.times(),
        &[
            ("q1 stance", trajectory.angle_deg(0)),
            ("q2 thigh", trajectory.angle_deg(1)),
            ("q3 shank", trajectory.angle_deg(2)),
        ],
    )
}

pub fn plot_energy<P: AsRef<Path>>(path: P, energies: &EnergyHistory) -> Result<(), OutputError> {
    time_series(
        path.as_ref(),
        "mechanical energy",
        "energy [J]",
        &energies.t,
        &[
            ("kinetic", energies.energies.iter().map(|e| e.kinetic).collect()),
            ("potential", energies.energies.iter().map(|e| e.potential).collect()),
            ("total", energies.totals().collect()),
        ],
    )
}

/// Overlaid stick figures at `frames` samples spread evenly over the run,
/// first and last included.
pub fn plot_stick_figures<P: AsRef<Path>>(
    path: P,
    params: &WalkerParameters,
    run: &SwingRun,
    frames: usize,
) -> Result<(), OutputError> {
    let states = run.trajectory.states();
    let n = states.len();
    let figures: Vec<StickFigure> = match (n, frames.min(n)) {
        (0, _) | (_, 0) => Vec::new(),
        (_, 1) => vec![StickFigure::new(params, &states[n - 1])],
        (_, frames) => (0..frames)
            .map(|i| StickFigure::new(params, &states[i * (n - 1) / (frames - 1)]))
            .collect(),
    };

    let points: Vec<_> = figures.iter().flat_map(|f| f.polyline()).collect();
    let x_range = padded_range(points.iter().map(|p| p.x));
    let y_range = padded_range(points.iter().map(|p| p.y).chain([0.0]));
    // equal scale on both axes
    let span = (x_range.end - x_range.start).max(y_range.end - y_range.start);
    let centered = |r: &Range<f64>| {
        let mid = 0.5 * (r.start + r.end);
        (mid - 0.5 * span)..(mid + 0.5 * span)
    };
    let (x_range, y_range) = (centered(&x_range), centered(&y_range));

    let root = SVGBackend::new(path.as_ref(), FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let mut chart = ChartBuilder::on(&root)
        .caption("swing phase", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(x_range.clone(), y_range)?;
    chart.configure_mesh().x_desc("x [m]").y_desc("y [m]").draw()?;

    chart.draw_series(LineSeries::new(
        [(x_range.start, 0.0), (x_range.end, 0.0)],
        &BLACK,
    ))?;
    for (k, figure) in figures.iter().enumerate() {
        let style = Palette99::pick(k).stroke_width(2);
        let joints = figure.polyline().map(|p| (p.x, p.y));
        chart.draw_series(LineSeries::new(joints, style))?;
        chart.draw_series(joints.iter().map(|&p| Circle::new(p, 3, style.filled())))?;
    }
    root.present()?;
    Ok(())
}
