use geo::{Contains, Coord, MultiPolygon, Point, Polygon, Rect, Simplify};
use ratatui::{
    Frame,
    layout::Rect as TuiRect,
    style::Color,
    symbols::Marker,
    text::Line,
    widgets::{
        Block, Borders,
        canvas::{Canvas, Line as CanvasLine, Points},
    },
};
use std::{fmt::Write, sync::Arc};

use crate::{
    enrich::{EnrichedCollection, EnrichedFeature},
    error::ExportError,
    navigator::Viewport,
    style::{FeatureStyle, ViewMode, style_for},
};

/// Fill samples along the longer side of the collection extent.
const FILL_GRID: f64 = 160.0;
const CANVAS_BACKGROUND: Color = Color::Rgb(0xf7, 0xf7, 0xf2);
const SVG_WIDTH: f64 = 800.0;

struct Shape {
    rings: Vec<Vec<Coord<f64>>>,
    fill: Vec<(f64, f64)>,
}

/// Display geometry for one collection: simplified outlines plus a grid of
/// interior points that stands in for the polygon fill.
pub struct MapView {
    collection: Arc<EnrichedCollection>,
    shapes: Vec<Shape>,
}

impl MapView {
    pub fn new(collection: Arc<EnrichedCollection>) -> Self {
        let Some(extent) = collection.bounds() else {
            return Self { shapes: Vec::new(), collection };
        };
        let span = extent.width().max(extent.height());
        let epsilon = span / 2000.0;
        let step = span / FILL_GRID;

        let shapes = collection
            .features
            .iter()
            .map(|f| {
                let simplified = simplify(&f.geometry, epsilon);
                let rings = simplified
                    .0
                    .iter()
                    .flat_map(|p| std::iter::once(p.exterior()).chain(p.interiors()))
                    .map(|ring| ring.0.clone())
                    .collect();
                let fill = match f.bounds() {
                    Some(b) if step > 0.0 => sample_interior(&simplified, b, step),
                    _ => Vec::new(),
                };
                Shape { rings, fill }
            })
            .collect();

        Self { collection, shapes }
    }

    /// Whether this view was built for `collection`.
    pub fn shows(&self, collection: &Arc<EnrichedCollection>) -> bool {
        Arc::ptr_eq(&self.collection, collection)
    }

    pub fn feature_count(&self) -> usize {
        self.shapes.len()
    }

    /// Draws fills first, then outlines, emphasized features last so their
    /// strokes stay on top.
    pub fn render<F>(&self, f: &mut Frame, area: TuiRect, title: Line<'_>, viewport: &Viewport, style_of: F)
    where
        F: Fn(&EnrichedFeature) -> FeatureStyle,
    {
        let styles: Vec<FeatureStyle> = self.collection.features.iter().map(|f| style_of(Arc::as_ref(f))).collect();
        let mut order: Vec<usize> = (0..self.shapes.len()).collect();
        order.sort_by_key(|&i| styles[i].stroke_weight);

        let b = viewport.bounds;
        // one braille dot, used to fake heavier strokes
        let dx = b.width() / (f64::from(area.width.max(1)) * 2.0);
        let dy = b.height() / (f64::from(area.height.max(1)) * 4.0);
        let offsets = [(dx, 0.0), (0.0, dy), (dx, dy), (-dx, 0.0), (0.0, -dy)];

        let canvas = Canvas::default()
            .block(Block::default().title(title).borders(Borders::ALL))
            .marker(Marker::Braille)
            .background_color(CANVAS_BACKGROUND)
            .x_bounds([b.min().x, b.max().x])
            .y_bounds([b.min().y, b.max().y])
            .paint(|ctx| {
                for (shape, style) in self.shapes.iter().zip(&styles) {
                    ctx.draw(&Points { coords: &shape.fill, color: style.fill_color.into() });
                }
                ctx.layer();
                for &i in &order {
                    let style = styles[i];
                    let color: Color = style.stroke_color.into();
                    let passes = std::iter::once((0.0, 0.0))
                        .chain(offsets.iter().copied())
                        .take(usize::from(style.stroke_weight.max(1)));
                    for (ox, oy) in passes {
                        for ring in &self.shapes[i].rings {
                            for w in ring.windows(2) {
                                ctx.draw(&CanvasLine {
                                    x1: w[0].x + ox,
                                    y1: w[0].y + oy,
                                    x2: w[1].x + ox,
                                    y2: w[1].y + oy,
                                    color,
                                });
                            }
                        }
                    }
                }
            });
        f.render_widget(canvas, area);
    }
}

fn simplify(mp: &MultiPolygon<f64>, epsilon: f64) -> MultiPolygon<f64> {
    if epsilon <= 0.0 {
        return mp.clone();
    }
    MultiPolygon(
        mp.0.iter()
            .map(|p| {
                Polygon::new(
                    p.exterior().simplify(&epsilon),
                    p.interiors().iter().map(|r| r.simplify(&epsilon)).collect(),
                )
            })
            .collect(),
    )
}

/// Grid points inside `mp`. The grid is anchored at the origin so
/// neighbouring features never sample the same point.
fn sample_interior(mp: &MultiPolygon<f64>, bounds: Rect<f64>, step: f64) -> Vec<(f64, f64)> {
    let (i0, i1) = ((bounds.min().x / step).ceil() as i64, (bounds.max().x / step).floor() as i64);
    let (j0, j1) = ((bounds.min().y / step).ceil() as i64, (bounds.max().y / step).floor() as i64);
    let mut points = Vec::new();
    for i in i0..=i1 {
        for j in j0..=j1 {
            let (x, y) = (i as f64 * step, j as f64 * step);
            if mp.contains(&Point::new(x, y)) {
                points.push((x, y));
            }
        }
    }
    points
}

/// Everything needed to draw the current view away from the navigator.
#[derive(Clone, Debug)]
pub struct MapSnapshot {
    pub collection: Arc<EnrichedCollection>,
    pub selected: Option<String>,
    pub view_mode: ViewMode,
    pub viewport: Viewport,
}

impl MapSnapshot {
    /// Equirectangular SVG of the viewport, one `<path>` per feature.
    pub fn to_svg(&self) -> Result<String, ExportError> {
        let b = self.viewport.bounds;
        let scale = SVG_WIDTH / b.width();
        let height = (b.height() * scale).max(1.0).round();
        let project = |c: &Coord<f64>| ((c.x - b.min().x) * scale, (b.max().y - c.y) * scale);

        let mut out = String::new();
        writeln!(out, r#"<?xml version="1.0" encoding="UTF-8" standalone="no"?>"#)?;
        writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{SVG_WIDTH}" height="{height}" viewBox="0 0 {SVG_WIDTH} {height}" data-lon-min="{}" data-lon-max="{}" data-lat-min="{}" data-lat-max="{}" data-zoom="{}" data-view="{}">"#,
            b.min().x,
            b.max().x,
            b.min().y,
            b.max().y,
            self.viewport.zoom,
            self.view_mode.label(),
        )?;
        writeln!(out, r##"<rect width="100%" height="100%" fill="#ffffff"/>"##)?;

        let is_selected = |id: &str| self.selected.as_deref() == Some(id);
        let mut features: Vec<&Arc<EnrichedFeature>> = self.collection.features.iter().collect();
        features.sort_by_key(|f| is_selected(f.id()));

        for f in features {
            let style = style_for(&f.properties, self.view_mode, is_selected(f.id()));
            write!(out, r#"<path id="{}" fill-rule="evenodd" d=""#, xml_escape(f.id()))?;
            for poly in &f.geometry.0 {
                for ring in std::iter::once(poly.exterior()).chain(poly.interiors()) {
                    for (k, c) in ring.0.iter().enumerate() {
                        let (x, y) = project(c);
                        write!(out, "{}{x:.2} {y:.2} ", if k == 0 { 'M' } else { 'L' })?;
                    }
                    out.push_str("Z ");
                }
            }
            writeln!(
                out,
                r#"" fill="{}" fill-opacity="{}" stroke="{}" stroke-width="{}" stroke-opacity="{}"><title>{}</title></path>"#,
                style.fill_color,
                style.fill_opacity,
                style.stroke_color,
                style.stroke_weight,
                style.opacity,
                xml_escape(f.name()),
            )?;
        }
        writeln!(out, "</svg>")?;
        Ok(out)
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
