//! Traduction des événements crossterm vers le bus d'entrées de l'économiseur.

use crossterm::event::{
    Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseEvent, MouseEventKind,
};
use pmoscreensaver::InputEvent;

/// Raw interactions carried by one terminal event, in emission order.
pub fn map_event(event: &Event) -> Vec<InputEvent> {
    match event {
        Event::Key(KeyEvent { kind, .. }) => match kind {
            KeyEventKind::Press | KeyEventKind::Repeat => vec![InputEvent::KeyDown],
            KeyEventKind::Release => vec![InputEvent::KeyUp],
        },
        Event::Mouse(MouseEvent { kind, .. }) => match kind {
            MouseEventKind::Down(_) => vec![InputEvent::PointerDown],
            // Le terminal ne distingue pas le clic du relâchement
            MouseEventKind::Up(_) => vec![InputEvent::PointerUp, InputEvent::Click],
            MouseEventKind::Drag(_) | MouseEventKind::Moved => vec![InputEvent::PointerMove],
            _ => vec![InputEvent::Scroll],
        },
        Event::Resize(_, _) => vec![InputEvent::Resize],
        Event::FocusGained => vec![InputEvent::Focus(true)],
        Event::FocusLost => vec![InputEvent::Focus(false)],
        Event::Paste(_) => vec![InputEvent::KeyDown],
    }
}

/// Ctrl+C, the only way out of the kiosk in raw mode.
pub fn is_quit(event: &Event) -> bool {
    matches!(
        event,
        Event::Key(KeyEvent {
            code: KeyCode::Char('c'),
            modifiers,
            kind: KeyEventKind::Press,
            ..
        }) if modifiers.contains(KeyModifiers::CONTROL)
    )
}
