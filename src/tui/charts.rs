use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    symbols,
    text::{Line, Span},
    widgets::{Axis, Block, Borders, Cell, Chart, Dataset, GraphType, Paragraph, Row, Table},
    Frame,
};
use rand::Rng;

use crate::metrics::{compute_statistics, SeriesStatistics};
use crate::model::Series;

/// One series as drawn: owned points plus the color picked for this build.
struct PlotTrace {
    label: String,
    points: Vec<(f64, f64)>,
    color: Color,
}

/// Everything derived from one series set. Rebuilt from scratch on change.
struct ChartModel {
    traces: Vec<PlotTrace>,
    stats: Vec<SeriesStatistics>,
    x_bounds: [f64; 2],
    y_bounds: [f64; 2],
}

impl ChartModel {
    fn build(series: &[Series]) -> Self {
        let mut rng = rand::thread_rng();
        let traces: Vec<PlotTrace> = series
            .iter()
            .map(|s| PlotTrace {
                label: s.label().to_string(),
                points: s.points(),
                color: match s.color() {
                    Some(c) => Color::Rgb(c.r, c.g, c.b),
                    None => Color::Rgb(
                        rng.gen_range(64..=255),
                        rng.gen_range(64..=255),
                        rng.gen_range(64..=255),
                    ),
                },
            })
            .collect();
        let x_bounds = padded_bounds(series.iter().flat_map(|s| s.x_values().iter().copied()), 0.0);
        let y_bounds = padded_bounds(series.iter().flat_map(|s| s.y_values().iter().copied()), 0.05);
        Self {
            traces,
            stats: compute_statistics(series),
            x_bounds,
            y_bounds,
        }
    }
}

/// `[min, max]` over `values` widened by `pad` of the span; never zero-width.
fn padded_bounds(values: impl Iterator<Item = f64>, pad: f64) -> [f64; 2] {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return [0.0, 1.0];
    }
    let span = hi - lo;
    if span <= f64::EPSILON * lo.abs().max(1.0) {
        let half = (lo.abs() * 0.01).max(0.5);
        return [lo - half, hi + half];
    }
    [lo - span * pad, hi + span * pad]
}

fn axis_labels(bounds: [f64; 2]) -> Vec<Span<'static>> {
    let mid = (bounds[0] + bounds[1]) / 2.0;
    [bounds[0], mid, bounds[1]]
        .iter()
        .map(|v| Span::raw(format!("{v:.2}")))
        .collect()
}

/// Chart plus statistics table for a set of series.
///
/// The drawing model is kept between frames and only rebuilt when the series
/// set changes by value.
#[derive(Default)]
pub struct PlotRenderer {
    series: Vec<Series>,
    model: Option<ChartModel>,
    builds: u64,
}

impl PlotRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the series set. Returns `true` when the chart was rebuilt.
    pub fn set_series(&mut self, series: &[Series]) -> bool {
        if self.model.is_some() && self.series.as_slice() == series {
            return false;
        }
        drop(self.model.take());
        self.model = Some(ChartModel::build(series));
        self.series = series.to_vec();
        self.builds += 1;
        tracing::debug!(series = series.len(), build = self.builds, "chart rebuilt");
        true
    }

    pub fn statistics(&self) -> &[SeriesStatistics] {
        self.model
            .as_ref()
            .map(|m| m.stats.as_slice())
            .unwrap_or_default()
    }

    /// How many times the chart model has been built.
    pub fn builds(&self) -> u64 {
        self.builds
    }

    pub fn is_disposed(&self) -> bool {
        self.model.is_none()
    }

    /// Release the drawing model. Safe to call repeatedly.
    pub fn dispose(&mut self) {
        if self.model.take().is_some() {
            tracing::debug!("chart disposed");
        }
        self.series.clear();
    }

    pub fn render(&self, f: &mut Frame, area: Rect) {
        let Some(model) = self.model.as_ref().filter(|m| !m.traces.is_empty()) else {
            let empty = Paragraph::new("No data yet. Press s, l or d to acquire.")
                .block(Block::default().borders(Borders::ALL).title("Plot"));
            f.render_widget(empty, area);
            return;
        };

        let table_height = (model.stats.len() as u16).saturating_add(3);
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Min(6), Constraint::Length(table_height)].as_ref())
            .split(area);

        let datasets: Vec<Dataset> = model
            .traces
            .iter()
            .map(|t| {
                Dataset::default()
                    .name(t.label.clone())
                    .graph_type(GraphType::Line)
                    .marker(symbols::Marker::Braille)
                    .style(Style::default().fg(t.color))
                    .data(&t.points)
            })
            .collect();
        let chart = Chart::new(datasets)
            .block(Block::default().borders(Borders::ALL).title("Plot"))
            .x_axis(
                Axis::default()
                    .title("s")
                    .style(Style::default().fg(Color::Gray))
                    .bounds(model.x_bounds)
                    .labels(axis_labels(model.x_bounds)),
            )
            .y_axis(
                Axis::default()
                    .style(Style::default().fg(Color::Gray))
                    .bounds(model.y_bounds)
                    .labels(axis_labels(model.y_bounds)),
            );
        f.render_widget(chart, rows[0]);

        let header = Row::new(vec!["Series", "Median", "Range"])
            .style(Style::default().add_modifier(Modifier::BOLD));
        let body = model.traces.iter().zip(&model.stats).map(|(t, s)| {
            Row::new(vec![
                Cell::from(Line::from(Span::styled(
                    s.label.clone(),
                    Style::default().fg(t.color),
                ))),
                Cell::from(s.median_text()),
                Cell::from(s.range_text()),
            ])
        });
        let table = Table::new(
            body,
            [
                Constraint::Percentage(40),
                Constraint::Percentage(30),
                Constraint::Percentage(30),
            ],
        )
        .header(header)
        .block(Block::default().borders(Borders::ALL).title("Statistics"));
        f.render_widget(table, rows[1]);
    }
}

impl Drop for PlotRenderer {
    fn drop(&mut self) {
        self.dispose();
    }
}
