use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};

use crate::{
    enrich::{CollectionSummary, EnrichedFeature, format_number},
    navigator::{LoadState, MapControl},
    state::{AppState, InputMode},
    style::{ViewMode, hover_style, participation_color, results_color},
    tiles::TileId,
};

/// Row markers of the details panel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatIcon {
    Level,
    Parent,
    Voters,
    Participation,
    Results,
}

const ICONS: [(StatIcon, &str); 5] = [
    (StatIcon::Level, "◆"),
    (StatIcon::Parent, "↑"),
    (StatIcon::Voters, "☻"),
    (StatIcon::Participation, "%"),
    (StatIcon::Results, "▮"),
];

impl StatIcon {
    pub fn glyph(self) -> &'static str {
        ICONS
            .iter()
            .find(|(icon, _)| *icon == self)
            .map_or("·", |(_, glyph)| *glyph)
    }
}

pub fn draw(f: &mut Frame<'_>, state: &AppState) {
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(10), Constraint::Length(4)])
        .split(f.area());

    draw_breadcrumbs(f, rows[0], state);

    let body = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage(22),
            Constraint::Percentage(53),
            Constraint::Percentage(25),
        ])
        .split(rows[1]);

    draw_list(f, body[0], state);
    draw_map(f, body[1], state);

    let right = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(body[2]);
    draw_details(f, right[0], state);
    draw_summary(f, right[1], state);

    draw_footer(f, rows[2], state);
}

fn draw_breadcrumbs(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let mut spans = vec![Span::styled("Home", Style::default().add_modifier(Modifier::BOLD))];
    for (i, entry) in state.navigator.breadcrumbs().iter().enumerate() {
        spans.push(Span::raw(" › "));
        spans.push(Span::styled(format!("{} ", i + 1), Style::default().fg(Color::DarkGray)));
        spans.push(Span::raw(entry.name.clone()));
    }
    let title = format!("{} · view: {}", state.level(), state.view_mode.label());
    let bar = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL).title(title));
    f.render_widget(bar, area);
}

fn draw_list(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let features = state.visible_features();
    let items: Vec<ListItem> = features
        .iter()
        .map(|feature| {
            let swatch = match state.view_mode {
                ViewMode::General => Span::raw("  "),
                ViewMode::Participation => Span::styled(
                    "■ ",
                    Style::default().fg(participation_color(feature.properties.participation).into()),
                ),
                ViewMode::Results => Span::styled(
                    "■ ",
                    Style::default().fg(results_color(&feature.properties.results).into()),
                ),
            };
            ListItem::new(Line::from(vec![swatch, Span::raw(feature.name().to_string())]))
        })
        .collect();

    let title = match state.collection() {
        Some(c) => format!("{} ({}/{})", c.name, features.len(), c.len()),
        None => "Features".to_string(),
    };
    let mut list_state = ListState::default();
    if !features.is_empty() {
        list_state.select(Some(state.hovered.min(features.len() - 1)));
    }
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_symbol(">> ")
        .highlight_style(Style::default().fg(Color::Red));
    f.render_stateful_widget(list, area, &mut list_state);
}

fn draw_map(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let name = state.collection().map_or("map", |c| c.name.as_str());
    let mut title = vec![Span::raw(format!("Map: {name} "))];
    match state.load_state() {
        LoadState::Idle => {}
        LoadState::Loading => {
            title.push(Span::styled("⟳ loading…", Style::default().fg(Color::Yellow)));
        }
        LoadState::Failed(message) => {
            title.push(Span::styled(format!("⚠ {message}"), Style::default().fg(Color::Red)));
        }
    }

    let Some(map) = &state.map else {
        let txt = Paragraph::new("Loading boundaries…")
            .block(Block::default().borders(Borders::ALL).title(Line::from(title)))
            .wrap(Wrap { trim: true });
        f.render_widget(txt, area);
        return;
    };

    let hovered = state.hovered_feature();
    let hovered_id = hovered.as_ref().map(|h| h.id());
    let navigator = &state.navigator;
    map.render(f, area, Line::from(title), &navigator.viewport(), |feature| {
        let base = navigator.style_of(feature);
        if hovered_id == Some(feature.id()) {
            hover_style(base)
        } else {
            base
        }
    });
}

fn detail_rows(feature: &EnrichedFeature, view_mode: ViewMode) -> Vec<(StatIcon, String)> {
    let p = &feature.properties;
    let mut rows = vec![(StatIcon::Level, format!("{} {}", p.level, p.id))];
    if let Some(parent) = &p.parent_name {
        rows.push((StatIcon::Parent, parent.clone()));
    }
    rows.push((StatIcon::Voters, format!("{} voters", format_number(p.total_voters))));
    rows.push((StatIcon::Participation, format!("{:.1}% participation", p.participation)));
    if view_mode != ViewMode::Results {
        return rows;
    }
    for r in &p.results {
        rows.push((
            StatIcon::Results,
            format!("{} {:.1}% ({})", r.party_name, r.percentage, format_number(r.votes)),
        ));
    }
    rows
}

fn draw_details(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let (title, lines) = match state.navigator.selected() {
        Some(feature) => {
            let lines: Vec<Line> = detail_rows(feature, state.view_mode)
                .into_iter()
                .map(|(icon, text)| {
                    Line::from(vec![
                        Span::styled(format!("{} ", icon.glyph()), Style::default().fg(Color::Cyan)),
                        Span::raw(text),
                    ])
                })
                .collect();
            (feature.name().to_string(), lines)
        }
        None => (
            "Details".to_string(),
            AppState::HELP_TEXT.lines().map(Line::from).collect(),
        ),
    };
    let details = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: true });
    f.render_widget(details, area);
}

fn draw_summary(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let pct = |v: Option<f64>| v.map_or_else(|| "–".to_string(), |v| format!("{v:.1}%"));
    let mut lines = Vec::new();
    if let Some(collection) = state.collection() {
        let summary = CollectionSummary::of(collection);
        let voters: u64 = collection.features.iter().map(|f| f.properties.total_voters).sum();
        lines.push(Line::from(format!("{} {}", summary.total, collection.name)));
        lines.push(Line::from(format!("{} registered voters", format_number(voters))));
        lines.push(Line::from(format!("avg participation {}", pct(summary.average))));
        lines.push(Line::from(format!("highest {}", pct(summary.highest))));
        lines.push(Line::from(format!("lowest {}", pct(summary.lowest))));
    }
    if !state.search.trim().is_empty() {
        lines.push(Line::from(format!(
            "'{}' matches {} nationwide",
            state.search.trim(),
            state.nationwide_matches()
        )));
    }
    let summary = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title("Summary"))
        .wrap(Wrap { trim: true });
    f.render_widget(summary, area);
}

fn draw_footer(f: &mut Frame<'_>, area: Rect, state: &AppState) {
    let vp = state.navigator.viewport();
    let (lat, lon) = vp.center_lat_lon();
    let tile = state.tiles.url(TileId::containing(vp.center, vp.zoom));

    let first = match state.input_mode {
        InputMode::Search => Line::from(vec![
            Span::styled("/", Style::default().fg(Color::Yellow)),
            Span::raw(state.search.clone()),
            Span::styled("█", Style::default().fg(Color::Yellow)),
        ]),
        InputMode::Normal => Line::from(state.status.clone()),
    };
    let second = Line::from(vec![
        Span::styled(
            format!("{lat:.4}, {lon:.4} z{} · {tile} · ", vp.zoom),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(state.tiles.attribution.clone()),
    ]);
    let footer = Paragraph::new(vec![first, second]).block(Block::default().borders(Borders::ALL));
    f.render_widget(footer, area);
}
