use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

use crate::app::Focus;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppAction {
    Quit,
    FocusNext,
    FocusPrev,
    // Form input actions
    InputChar(char),
    InputBackspace,
    ToggleVideo,
    Submit,
    Retry,
    // History actions
    MoveUp,
    MoveDown,
    ViewSelected,
    DeleteSelected,
    ClearHistoryStart,
    ClearHistoryConfirm,
    ClearHistoryCancel,
    // Result actions
    OpenResult,
    DownloadResult,
    ShowHelp,
    HideHelp,
}

pub fn handle_key_event(
    key: KeyEvent,
    focus: Focus,
    confirm_clear: bool,
    show_help: bool,
) -> Option<AppAction> {
    // If help is showing, any key closes it
    if show_help {
        return Some(AppAction::HideHelp);
    }

    if confirm_clear {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(AppAction::ClearHistoryConfirm),
            _ => Some(AppAction::ClearHistoryCancel),
        };
    }

    // Keys that work everywhere
    match (key.code, key.modifiers) {
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => return Some(AppAction::Quit),
        (KeyCode::Char('r'), KeyModifiers::CONTROL) => return Some(AppAction::Retry),
        (KeyCode::Tab, _) => return Some(AppAction::FocusNext),
        (KeyCode::BackTab, _) => return Some(AppAction::FocusPrev),
        (KeyCode::F(1), _) => return Some(AppAction::ShowHelp),
        _ => {}
    }

    // Text fields capture printable characters
    if focus.is_text_input() {
        return match key.code {
            KeyCode::Enter => Some(AppAction::Submit),
            KeyCode::Esc => Some(AppAction::FocusPrev),
            KeyCode::Backspace => Some(AppAction::InputBackspace),
            KeyCode::Char(_)
                if key
                    .modifiers
                    .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT) =>
            {
                None
            }
            KeyCode::Char(c) => Some(AppAction::InputChar(c)),
            _ => None,
        };
    }

    if focus == Focus::Video {
        return match key.code {
            KeyCode::Char(' ') => Some(AppAction::ToggleVideo),
            KeyCode::Enter => Some(AppAction::Submit),
            KeyCode::Char('q') => Some(AppAction::Quit),
            KeyCode::Char('?') => Some(AppAction::ShowHelp),
            _ => None,
        };
    }

    // History list
    match key.code {
        KeyCode::Char('q') => Some(AppAction::Quit),

        KeyCode::Char('j') | KeyCode::Down => Some(AppAction::MoveDown),
        KeyCode::Char('k') | KeyCode::Up => Some(AppAction::MoveUp),

        KeyCode::Enter => Some(AppAction::ViewSelected),
        KeyCode::Char('d') | KeyCode::Delete => Some(AppAction::DeleteSelected),
        KeyCode::Char('C') => Some(AppAction::ClearHistoryStart),
        KeyCode::Char('r') => Some(AppAction::Retry),
        KeyCode::Char('o') => Some(AppAction::OpenResult),
        KeyCode::Char('s') => Some(AppAction::DownloadResult),

        KeyCode::Char('?') => Some(AppAction::ShowHelp),

        _ => None,
    }
}
