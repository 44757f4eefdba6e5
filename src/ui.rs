//! Terminal task pane
//!
//! Features:
//! - Login form (masked key input, paste supported)
//! - Generate form: prompt editor, progress line, result panel
//! - Insert into document / copy to clipboard
//! - Activity log tab

use anyhow::Result;
use crossterm::{
    event::{
        self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyCode, KeyEvent,
        KeyEventKind, KeyModifiers,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, Paragraph, Tabs, Wrap},
};
use std::io;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::client::CompletionError;
use crate::document::{self, BridgeError};
use crate::pane::{Form, PaneState, SaveOutcome, TaskPane};

/// Tab selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tab {
    Pane,
    Log,
}

impl Tab {
    fn all() -> &'static [Tab] {
        &[Tab::Pane, Tab::Log]
    }

    fn name(&self) -> &'static str {
        match self {
            Tab::Pane => "Pane",
            Tab::Log => "Log",
        }
    }
}

/// TUI messages from background tasks
enum TuiMsg {
    Completed(u64, Result<String, CompletionError>),
    Inserted(Result<(), BridgeError>),
}

/// Terminal-only state; everything else lives in the pane
struct TuiState {
    tab: Tab,
    key_input: String,
    log: Vec<String>,
    tick: usize,
    inserting: bool,
}

impl TuiState {
    fn new() -> Self {
        Self {
            tab: Tab::Pane,
            key_input: String::new(),
            log: Vec::new(),
            tick: 0,
            inserting: false,
        }
    }

    fn log(&mut self, msg: impl Into<String>) {
        let now = chrono::Local::now().format("%H:%M:%S");
        self.log.push(format!("[{}] {}", now, msg.into()));
    }
}

/// Run the pane until Esc
pub async fn run_tui(pane: TaskPane, title: &str) -> Result<()> {
    let mut terminal = setup_terminal()?;
    let result = run_tui_loop(&mut terminal, pane, title).await;
    restore_terminal(terminal)?;
    result
}

async fn run_tui_loop(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mut pane: TaskPane,
    title: &str,
) -> Result<()> {
    let mut state = TuiState::new();
    state.log(match pane.form() {
        Form::Login => "No API key stored, showing login",
        Form::Generate => "Using stored API key",
    });

    let (tx, mut rx) = mpsc::channel::<TuiMsg>(16);

    loop {
        state.tick += 1;

        // Results from spawned work
        while let Ok(msg) = rx.try_recv() {
            match msg {
                TuiMsg::Completed(id, outcome) => {
                    match &outcome {
                        Ok(text) => state.log(format!("Generated {} chars", text.chars().count())),
                        Err(e) if e.is_auth() => {
                            state.log(format!("{} (key cleared)", e))
                        }
                        Err(e) => state.log(e.to_string()),
                    }
                    pane.finish_generate(id, outcome);
                }
                TuiMsg::Inserted(outcome) => {
                    state.inserting = false;
                    match outcome {
                        Ok(()) => state.log("Inserted text into document"),
                        Err(e) => state.log(format!("Insert failed: {}", e)),
                    }
                }
            }
        }

        terminal.draw(|f| render_tui(f, &state, &pane, title))?;

        if !event::poll(Duration::from_millis(50))? {
            continue;
        }

        match event::read()? {
            Event::Paste(text) => match (state.tab, pane.form()) {
                (Tab::Pane, Form::Login) => state.key_input.push_str(text.trim()),
                (Tab::Pane, Form::Generate) => pane.prompt_mut().push_str(&text),
                _ => {}
            },
            Event::Key(key) => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }

                // Global controls
                match key.code {
                    KeyCode::Esc => break,
                    KeyCode::Tab => {
                        let tabs = Tab::all();
                        let idx = tabs.iter().position(|t| *t == state.tab).unwrap_or(0);
                        state.tab = tabs[(idx + 1) % tabs.len()];
                        continue;
                    }
                    _ => {}
                }

                if state.tab != Tab::Pane {
                    continue;
                }

                match pane.form() {
                    Form::Login => handle_login_key(key, &mut state, &mut pane),
                    Form::Generate => handle_generate_key(key, &mut state, &mut pane, &tx),
                }
            }
            _ => {}
        }
    }

    Ok(())
}

fn handle_login_key(key: KeyEvent, state: &mut TuiState, pane: &mut TaskPane) {
    match key.code {
        KeyCode::Enter => match pane.save_key(&state.key_input) {
            SaveOutcome::Saved => {
                state.key_input.clear();
                state.log("API key saved");
            }
            SaveOutcome::SessionOnly => {
                state.key_input.clear();
                state.log("API key could not be saved; using it for this session only");
            }
            SaveOutcome::Rejected => state.log("Enter an API key first"),
        },
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            state.key_input.clear();
        }
        KeyCode::Char(c) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            state.key_input.push(c);
        }
        KeyCode::Backspace => {
            state.key_input.pop();
        }
        _ => {}
    }
}

fn handle_generate_key(
    key: KeyEvent,
    state: &mut TuiState,
    pane: &mut TaskPane,
    tx: &mpsc::Sender<TuiMsg>,
) {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);

    match key.code {
        KeyCode::Enter if key.modifiers.contains(KeyModifiers::ALT) => {
            pane.prompt_mut().push('\n');
        }
        KeyCode::Enter => {
            let Some(request) = pane.begin_generate() else {
                state.log("Already generating, wait for the current request");
                return;
            };
            state.log(format!(
                "Sending: {}",
                request.prompt.chars().take(50).collect::<String>()
            ));

            let completer = pane.services().completer.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = completer.complete(&request.prompt, &request.api_key).await;
                let _ = tx.send(TuiMsg::Completed(request.id, outcome)).await;
            });
        }
        KeyCode::Char('o') if ctrl => {
            if state.inserting {
                return;
            }
            let Some(text) = pane.result().map(str::to_string) else {
                state.log("Nothing to insert yet");
                return;
            };
            state.inserting = true;

            let editor = pane.services().document.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let outcome = document::insert_at_selection(editor.as_ref(), &text).await;
                let _ = tx.send(TuiMsg::Inserted(outcome)).await;
            });
        }
        KeyCode::Char('y') if ctrl => {
            if pane.result().is_some() {
                state.log(copy_log_line(pane.copy()));
            }
        }
        KeyCode::Char('l') if ctrl => {
            pane.sign_out();
            state.log("Signed out");
        }
        KeyCode::Char('u') if ctrl => {
            pane.prompt_mut().clear();
        }
        KeyCode::Char(c) if !ctrl => {
            pane.prompt_mut().push(c);
        }
        KeyCode::Backspace => {
            pane.prompt_mut().pop();
        }
        _ => {}
    }
}

// ═══════════════════════════════════════════════════════════════
// RENDERING
// ═══════════════════════════════════════════════════════════════

fn render_tui(f: &mut Frame, state: &TuiState, pane: &TaskPane, title: &str) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header + tabs
            Constraint::Min(5),    // Main content
            Constraint::Length(1), // Status
        ])
        .split(f.size());

    let tabs = Tabs::new(Tab::all().iter().map(|t| t.name()))
        .select(Tab::all().iter().position(|t| *t == state.tab).unwrap_or(0))
        .style(Style::default().fg(Color::White))
        .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
        .block(Block::default().borders(Borders::ALL).title(format!("draftpane | {}", title)));
    f.render_widget(tabs, chunks[0]);

    match (state.tab, pane.form()) {
        (Tab::Pane, Form::Login) => render_login(f, state, pane, chunks[1]),
        (Tab::Pane, Form::Generate) => render_generate(f, state, pane, chunks[1]),
        (Tab::Log, _) => render_log(f, state, chunks[1]),
    }

    let hints = match pane.form() {
        Form::Login => " Enter: save key | Ctrl+U: clear | Tab: switch | Esc: quit",
        Form::Generate => {
            " Enter: generate | Alt+Enter: newline | Ctrl+O: insert | Ctrl+Y: copy | Ctrl+L: sign out | Esc: quit"
        }
    };
    let status = Paragraph::new(hints).style(Style::default().fg(Color::DarkGray));
    f.render_widget(status, chunks[2]);
}

/// Banner block height, zero when there is nothing to show
fn banner_height(pane: &TaskPane) -> u16 {
    if pane.error().is_some() {
        3
    } else {
        0
    }
}

fn render_banner(f: &mut Frame, pane: &TaskPane, area: Rect) {
    if let Some(message) = pane.error() {
        let banner = Paragraph::new(message)
            .style(Style::default().fg(Color::Red))
            .wrap(Wrap { trim: true })
            .block(Block::default().borders(Borders::ALL).title("Error"));
        f.render_widget(banner, area);
    }
}

fn render_login(f: &mut Frame, state: &TuiState, pane: &TaskPane, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Length(banner_height(pane)),
            Constraint::Min(0),
        ])
        .split(area);

    let intro = Paragraph::new("Paste your API key and press Enter. It is stored for future sessions.")
        .wrap(Wrap { trim: true });
    f.render_widget(intro, chunks[0]);

    let masked: String = "*".repeat(state.key_input.chars().count());
    let input = Paragraph::new(masked)
        .block(Block::default().borders(Borders::ALL).title("API key"));
    f.render_widget(input, chunks[1]);

    render_banner(f, pane, chunks[2]);
}

fn render_generate(f: &mut Frame, state: &TuiState, pane: &TaskPane, area: Rect) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(7),                 // Prompt
            Constraint::Length(1),                 // Progress
            Constraint::Length(banner_height(pane)),
            Constraint::Min(3),                    // Result
        ])
        .split(area);

    let prompt_style = if pane.can_submit() {
        Style::default()
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let prompt = Paragraph::new(pane.prompt())
        .style(prompt_style)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("Enter prompt here"));
    f.render_widget(prompt, chunks[0]);

    let progress = match pane.state() {
        PaneState::Loading => format!(" {} Generating text...", spinner_char(state.tick)),
        _ if state.inserting => format!(" {} Inserting...", spinner_char(state.tick)),
        _ => String::new(),
    };
    f.render_widget(
        Paragraph::new(progress).style(Style::default().fg(Color::Cyan)),
        chunks[1],
    );

    render_banner(f, pane, chunks[2]);

    if let Some(text) = pane.result() {
        let result = Paragraph::new(text)
            .wrap(Wrap { trim: false })
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title("Generated text (Ctrl+O insert, Ctrl+Y copy)"),
            );
        f.render_widget(result, chunks[3]);
    }
}

fn render_log(f: &mut Frame, state: &TuiState, area: Rect) {
    let text: String = state.log.iter().rev().take(50).cloned().collect::<Vec<_>>().join("\n");
    let para = Paragraph::new(text)
        .block(Block::default().borders(Borders::ALL).title("Log"));
    f.render_widget(para, area);
}

fn copy_log_line(outcome: Result<(), BridgeError>) -> String {
    match outcome {
        Ok(()) => "Copied text to clipboard".to_string(),
        Err(e) => format!("Copy failed: {}", e),
    }
}

fn spinner_char(tick: usize) -> char {
    const SPINNER: &[char] = &['⠋', '⠙', '⠹', '⠸', '⠼', '⠴', '⠦', '⠧', '⠇', '⠏'];
    SPINNER[tick % SPINNER.len()]
}

// ═══════════════════════════════════════════════════════════════
// TERMINAL SETUP
// ═══════════════════════════════════════════════════════════════

fn setup_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let backend = CrosstermBackend::new(stdout);
    Ok(Terminal::new(backend)?)
}

fn restore_terminal(mut terminal: Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), DisableBracketedPaste, LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tab_cycle_covers_all() {
        let names: Vec<_> = Tab::all().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["Pane", "Log"]);
    }

    #[test]
    fn test_copy_log_reports_failure() {
        assert_eq!(copy_log_line(Ok(())), "Copied text to clipboard");
        assert_eq!(
            copy_log_line(Err(BridgeError::Clipboard("no display".into()))),
            "Copy failed: Clipboard unavailable: no display"
        );
    }

    #[test]
    fn test_spinner_wraps() {
        assert_eq!(spinner_char(0), spinner_char(10));
    }
}
