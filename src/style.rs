//! Map styling: statistics and view mode in, colors and strokes out.

use std::fmt;

use crate::enrich::{EnrichedProperties, PartyResult};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const fn from_hex(hex: u32) -> Self {
        Rgb((hex >> 16) as u8, (hex >> 8) as u8, hex as u8)
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

impl From<Rgb> for ratatui::style::Color {
    fn from(c: Rgb) -> Self {
        ratatui::style::Color::Rgb(c.0, c.1, c.2)
    }
}

pub const NEUTRAL: Rgb = Rgb::from_hex(0xe0e0e0);
const STROKE: Rgb = Rgb::from_hex(0x666666);
const STROKE_SELECTED: Rgb = Rgb::from_hex(0x000000);

/// Participation ramp, highest bucket first.
const PARTICIPATION_RAMP: [(f64, Rgb); 4] = [
    (80.0, Rgb::from_hex(0x1a9850)),
    (60.0, Rgb::from_hex(0x91cf60)),
    (40.0, Rgb::from_hex(0xd9ef8b)),
    (20.0, Rgb::from_hex(0xfee08b)),
];
const PARTICIPATION_LOW: Rgb = Rgb::from_hex(0xd73027);

const PARTY_COLORS: [(&str, Rgb); 3] = [
    ("party1", Rgb::from_hex(0x2166ac)),
    ("party2", Rgb::from_hex(0xd73027)),
    ("party3", Rgb::from_hex(0x1a9850)),
];

/// Which statistic drives the fill color.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ViewMode {
    #[default]
    General,
    Participation,
    Results,
}

impl ViewMode {
    pub fn next(self) -> Self {
        match self {
            ViewMode::General => ViewMode::Participation,
            ViewMode::Participation => ViewMode::Results,
            ViewMode::Results => ViewMode::General,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ViewMode::General => "general",
            ViewMode::Participation => "participation",
            ViewMode::Results => "results",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureStyle {
    pub fill_color: Rgb,
    pub fill_opacity: f32,
    pub stroke_color: Rgb,
    pub stroke_weight: u8,
    pub opacity: f32,
}

impl Default for FeatureStyle {
    fn default() -> Self {
        Self {
            fill_color: NEUTRAL,
            fill_opacity: 0.7,
            stroke_color: STROKE,
            stroke_weight: 1,
            opacity: 1.0,
        }
    }
}

/// Zero (or missing) participation is gray, not the bottom bucket.
pub fn participation_color(participation: f64) -> Rgb {
    if participation == 0.0 || participation.is_nan() {
        return NEUTRAL;
    }
    PARTICIPATION_RAMP
        .iter()
        .find(|(min, _)| participation >= *min)
        .map_or(PARTICIPATION_LOW, |&(_, color)| color)
}

/// Color of the leading party; the first one wins a tie.
pub fn results_color(results: &[PartyResult]) -> Rgb {
    let Some(first) = results.first() else {
        return NEUTRAL;
    };
    let winner = results[1..]
        .iter()
        .fold(first, |best, r| if r.percentage > best.percentage { r } else { best });
    PARTY_COLORS
        .iter()
        .find(|(id, _)| *id == winner.party_id)
        .map_or(NEUTRAL, |&(_, color)| color)
}

pub fn style_for(props: &EnrichedProperties, mode: ViewMode, is_selected: bool) -> FeatureStyle {
    let fill_color = match mode {
        ViewMode::General => NEUTRAL,
        ViewMode::Participation => participation_color(props.participation),
        ViewMode::Results => results_color(&props.results),
    };
    let base = FeatureStyle {
        fill_color,
        ..FeatureStyle::default()
    };
    if is_selected {
        FeatureStyle {
            stroke_weight: 3,
            stroke_color: STROKE_SELECTED,
            ..base
        }
    } else {
        base
    }
}

/// Pointer-over emphasis on top of a computed style. Dropping the hover
/// means going back to [`style_for`], never to a fixed default.
pub fn hover_style(base: FeatureStyle) -> FeatureStyle {
    FeatureStyle {
        stroke_weight: base.stroke_weight.max(1) + 1,
        fill_opacity: 0.9,
        ..base
    }
}
