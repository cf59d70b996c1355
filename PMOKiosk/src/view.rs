//! Terminal rendering of the kiosk home screen and of the attract-loop
//! overlay.
//!
//! The coordinator drives a [`TerminalSurface`], which only updates the
//! shared [`KioskView`]; the UI thread redraws it on every tick.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use pmoscreensaver::{
    EntryKind, OverlayContent, OverlaySurface, PlaylistEntry, PresentationState,
    ScreensaverStatus,
};
use ratatui::Frame;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, Paragraph, Wrap};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowShowing {
    pub index: usize,
    pub label: String,
    pub kind: EntryKind,
}

#[derive(Debug, Clone)]
pub struct KioskView {
    pub content: OverlayContent,
    pub idle_timeout: Duration,
    pub entries: usize,
    pub overlay_visible: bool,
    pub now_showing: Option<NowShowing>,
}

impl KioskView {
    pub fn new(content: OverlayContent, idle_timeout: Duration, entries: usize) -> Self {
        Self {
            content,
            idle_timeout,
            entries,
            overlay_visible: false,
            now_showing: None,
        }
    }
}

pub type SharedView = Arc<Mutex<KioskView>>;

/// Verrou tolérant : un panic ailleurs ne doit pas figer l'affichage
pub fn lock(view: &SharedView) -> MutexGuard<'_, KioskView> {
    view.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// [`OverlaySurface`] backed by the shared view model.
pub struct TerminalSurface {
    view: SharedView,
}

impl TerminalSurface {
    pub fn new(view: SharedView) -> Self {
        Self { view }
    }
}

impl OverlaySurface for TerminalSurface {
    fn show(&mut self, content: &OverlayContent) {
        let mut view = lock(&self.view);
        view.content = content.clone();
        view.overlay_visible = true;
    }

    fn present(&mut self, entry: &PlaylistEntry, index: usize) {
        lock(&self.view).now_showing = Some(NowShowing {
            index,
            label: entry.label().to_string(),
            kind: entry.kind(),
        });
    }

    fn hide(&mut self) {
        let mut view = lock(&self.view);
        view.overlay_visible = false;
        view.now_showing = None;
    }
}

pub fn draw(f: &mut Frame<'_>, view: &KioskView, status: &ScreensaverStatus) {
    if view.overlay_visible {
        draw_overlay(f, view, status);
    } else {
        draw_home(f, view);
    }
}

fn draw_home(f: &mut Frame<'_>, view: &KioskView) {
    let area = f.size();
    let block = Block::default()
        .borders(Borders::ALL)
        .title(" PMOKiosk ");

    let lines = vec![
        Line::from(Span::styled(
            view.content.title.clone(),
            Style::default().add_modifier(Modifier::BOLD),
        )),
        Line::from(""),
        Line::from(view.content.subtitle.clone()),
        Line::from(""),
        Line::from(Span::styled(
            format!(
                "Presentation starts after {} s without interaction ({} entries)",
                view.idle_timeout.as_secs(),
                view.entries
            ),
            Style::default().fg(Color::DarkGray),
        )),
        Line::from(Span::styled(
            "Ctrl+C pour quitter",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(lines)
        .block(block)
        .alignment(Alignment::Center)
        .wrap(Wrap { trim: true });
    f.render_widget(paragraph, centered_rect(80, 50, area));
}

fn draw_overlay(f: &mut Frame<'_>, view: &KioskView, status: &ScreensaverStatus) {
    let area = f.size();
    f.render_widget(Clear, area);

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(4),
                Constraint::Min(5),
                Constraint::Length(3),
            ]
            .as_ref(),
        )
        .split(area);

    let header = Paragraph::new(vec![
        Line::from(Span::styled(
            view.content.title.clone(),
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )),
        Line::from(view.content.subtitle.clone()),
    ])
    .alignment(Alignment::Center)
    .block(Block::default().borders(Borders::BOTTOM));
    f.render_widget(header, chunks[0]);

    let media = match &view.now_showing {
        Some(now) => {
            let kind = match now.kind {
                EntryKind::Local => "local stream",
                EntryKind::Embedded => "embedded clip",
            };
            vec![
                Line::from(""),
                Line::from(Span::styled(
                    format!("▶ {}", now.label),
                    Style::default().add_modifier(Modifier::BOLD),
                )),
                Line::from(format!("{kind} · {}/{}", now.index + 1, view.entries)),
            ]
        }
        None => vec![Line::from("…")],
    };
    let mut media = media;
    if status.state == PresentationState::Presenting {
        media.push(Line::from(""));
        media.push(Line::from(Span::styled(
            "Touch the screen to explore",
            Style::default().fg(Color::Yellow),
        )));
    }
    f.render_widget(
        Paragraph::new(media)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        chunks[1],
    );

    let partners = Paragraph::new(Line::from(view.content.partners.join("  ·  ")))
        .alignment(Alignment::Center)
        .block(Block::default().borders(Borders::TOP));
    f.render_widget(partners, chunks[2]);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Percentage((100 - percent_y) / 2),
                Constraint::Percentage(percent_y),
                Constraint::Percentage((100 - percent_y) / 2),
            ]
            .as_ref(),
        )
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints(
            [
                Constraint::Percentage((100 - percent_x) / 2),
                Constraint::Percentage(percent_x),
                Constraint::Percentage((100 - percent_x) / 2),
            ]
            .as_ref(),
        )
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_surface_updates_shared_view() {
        let view: SharedView = Arc::new(Mutex::new(KioskView::new(
            OverlayContent::default(),
            Duration::from_secs(10),
            2,
        )));
        let mut surface = TerminalSurface::new(view.clone());

        surface.show(&OverlayContent {
            title: "SLCR".to_string(),
            ..Default::default()
        });
        surface.present(&PlaylistEntry::embedded("abc").with_title("Ganga"), 1);
        {
            let v = lock(&view);
            assert!(v.overlay_visible);
            assert_eq!(v.content.title, "SLCR");
            assert_eq!(
                v.now_showing,
                Some(NowShowing {
                    index: 1,
                    label: "Ganga".to_string(),
                    kind: EntryKind::Embedded,
                })
            );
        }

        surface.hide();
        let v = lock(&view);
        assert!(!v.overlay_visible);
        assert!(v.now_showing.is_none());
    }
}
