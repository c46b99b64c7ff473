use plotters::{prelude::*, style::{register_font, FontStyle}};
use std::{path::Path, sync::OnceLock};

use crate::errors::{LyricError, Result, ResultExt};
use crate::train::LossHistory;

/// Which loss curve of each run to draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossSplit {
    Train,
    Validation,
}

impl LossSplit {
    pub fn title(&self) -> &'static str {
        match self {
            LossSplit::Train => "Train Loss vs Epochs",
            LossSplit::Validation => "Validation Loss vs Epochs",
        }
    }

    fn values<'a>(&self, history: &'a LossHistory) -> &'a [f32] {
        match self {
            LossSplit::Train => &history.train_loss,
            LossSplit::Validation => &history.valid_loss,
        }
    }
}

const FONT_FAMILY: &str = "sans-serif";
static FONT_BYTES: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

/// Register the bundled font once, so charts render without system fonts
fn ensure_font() -> Result<()> {
    static REGISTERED: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    REGISTERED
        .get_or_init(|| {
            register_font(FONT_FAMILY, FontStyle::Normal, FONT_BYTES).map_err(|_| "InvalidFont".to_string())
        })
        .clone()
        .map_err(|reason| LyricError::Plot { path: "<font>".into(), reason })
}

/// y-axis range covering every finite value, padded so flat curves stay visible
fn y_range(series: &[&[f32]]) -> (f32, f32) {
    let (lo, hi) = series.iter()
        .flat_map(|values| values.iter().copied())
        .filter(|v| v.is_finite())
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if lo > hi {
        (0.0, 1.0)
    } else if (hi - lo) < 1e-6 {
        (lo - 0.5, hi + 0.5)
    } else {
        let pad = (hi - lo) * 0.05;
        (lo - pad, hi + pad)
    }
}

/// Overlay one loss curve per run on a single PNG chart
pub fn plot_losses<P: AsRef<Path>>(histories: &[LossHistory], split: LossSplit, path: P) -> Result<()> {
    let path = path.as_ref();
    if histories.is_empty() {
        return Err(LyricError::InvalidParameter("no loss histories to plot".into()));
    }

    ensure_font()?;

    let series: Vec<&[f32]> = histories.iter().map(|h| split.values(h)).collect();
    let max_epochs = series.iter().map(|s| s.len()).max().unwrap_or(0).max(2);
    let (y_min, y_max) = y_range(&series);

    let root = BitMapBackend::new(path, (1024, 768)).into_drawing_area();
    root.fill(&WHITE).plot_context(path)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(split.title(), (FONT_FAMILY, 28))
        .margin(20)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(0f32..(max_epochs - 1) as f32, y_min..y_max)
        .plot_context(path)?;

    chart.configure_mesh()
        .x_desc("Epochs")
        .y_desc("Error")
        .draw()
        .plot_context(path)?;

    for (i, (history, values)) in histories.iter().zip(&series).enumerate() {
        let color = Palette99::pick(i).to_rgba();
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(epoch, &loss)| (epoch as f32, loss)),
                color.stroke_width(2),
            ))
            .plot_context(path)?
            .label(history.name.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
    }

    chart.configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .plot_context(path)?;

    root.present().plot_context(path)?;
    Ok(())
}
