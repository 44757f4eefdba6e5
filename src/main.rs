//! draftpane - terminal task pane for a hosted chat-completion API
//!
//! USAGE:
//!   draftpane [--preset P] [--doc PATH] [--at N]   # interactive pane
//!   draftpane generate <prompt...>                 # one-shot, prints the text
//!   draftpane login <key> | logout                 # manage the stored key
//!   draftpane config set <field> <value> | show    # non-interactive config
//!   draftpane doctor                               # check config and key

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

use draftpane::client::{Completer, CompletionClient};
use draftpane::config::{self, Config, Preset};
use draftpane::credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
use draftpane::document::{FileDocument, SystemClipboard};
use draftpane::pane::{Services, TaskPane};
use draftpane::{logging, ui};

// ═══════════════════════════════════════════════════════════════
// CLI
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct PaneOptions {
    preset: Option<Preset>,
    doc: Option<PathBuf>,
    at: Option<usize>,
    ephemeral: bool,
}

#[derive(Debug)]
enum Command {
    Interactive(PaneOptions),
    Generate { prompt: String, preset: Option<Preset> },
    Login { key: String },
    Logout,
    ConfigSet { field: String, value: String },
    ConfigShow,
    Doctor,
    Help,
}

fn parse_args() -> Result<Command> {
    parse(std::env::args().skip(1).collect())
}

fn parse(args: Vec<String>) -> Result<Command> {
    match args.first().map(|s| s.as_str()) {
        Some("doctor") => return Ok(Command::Doctor),
        Some("logout") => return Ok(Command::Logout),
        Some("login") => {
            let key = args.get(1).cloned().context("Usage: draftpane login <key>")?;
            return Ok(Command::Login { key });
        }
        Some("config") => {
            return match args.get(1).map(|s| s.as_str()) {
                Some("set") => Ok(Command::ConfigSet {
                    field: args.get(2).cloned().unwrap_or_default(),
                    value: args.get(3).cloned().unwrap_or_default(),
                }),
                Some("show") | None => Ok(Command::ConfigShow),
                Some(other) => anyhow::bail!("Unknown config command: {}", other),
            };
        }
        _ => {}
    }

    // Flags shared by the pane and one-shot mode. Once a word is seen,
    // help flags are plain prompt text.
    let mut opts = PaneOptions::default();
    let mut words = Vec::new();
    let mut pane_only = None;
    let mut i = 0;

    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" if words.is_empty() => return Ok(Command::Help),
            "--preset" | "-p" => {
                i += 1;
                let name = args.get(i).context("--preset needs a value")?;
                opts.preset = Some(Preset::parse(name).with_context(|| {
                    format!("Unknown preset: {}. Valid presets: legacy, chat, chat-long", name)
                })?);
            }
            flag @ ("--doc" | "-d") => {
                pane_only.get_or_insert(flag);
                i += 1;
                opts.doc = Some(PathBuf::from(args.get(i).context("--doc needs a path")?));
            }
            flag @ "--at" => {
                pane_only.get_or_insert(flag);
                i += 1;
                let offset = args.get(i).context("--at needs a character offset")?;
                opts.at = Some(offset.parse().context("--at must be a non-negative integer")?);
            }
            flag @ "--ephemeral" => {
                pane_only.get_or_insert(flag);
                opts.ephemeral = true;
            }
            s => words.push(s.to_string()),
        }
        i += 1;
    }

    if words.first().map(|s| s.as_str()) == Some("generate") {
        if let Some(flag) = pane_only {
            anyhow::bail!("{} only applies to the interactive pane", flag);
        }
        return Ok(Command::Generate {
            prompt: words[1..].join(" "),
            preset: opts.preset,
        });
    }

    if let Some(extra) = words.first() {
        anyhow::bail!("Unexpected argument: {}. See draftpane --help", extra);
    }

    Ok(Command::Interactive(opts))
}

fn print_help() {
    println!(r#"draftpane - prompt a chat-completion API, insert the answer into your document

USAGE:
    draftpane [FLAGS]                     # interactive pane
    draftpane generate <prompt...>        # one-shot completion to stdout
    draftpane login <key>                 # store an API key
    draftpane logout                      # forget the stored key
    draftpane config set <field> <value>  # set config value
    draftpane config show                 # print effective settings
    draftpane doctor                      # check config, key, paths

FLAGS:
    -p, --preset <name>     legacy | chat | chat-long
    -d, --doc <path>        Document to insert into (default: draft.txt)
        --at <offset>       Caret position in characters (default: end)
        --ephemeral         Keep the key in memory only
    -h, --help              Show this help

CONFIG:
    ~/.config/draftpane/config.json         Preset and overrides
    ~/.config/draftpane/credentials.json    Stored API key
    ~/.local/state/draftpane/draftpane.log  Log file (filter: DRAFTPANE_LOG)

CONTROLS (interactive mode):
    Enter       Save key / generate
    Alt+Enter   Newline in prompt
    Ctrl+O      Insert result at caret
    Ctrl+Y      Copy result to clipboard
    Ctrl+L      Sign out
    Tab         Switch tabs
    Esc         Quit
"#);
}

// ═══════════════════════════════════════════════════════════════
// MAIN
// ═══════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    if let Err(e) = logging::init() {
        eprintln!("warning: logging disabled: {}", e);
    }

    match parse_args()? {
        Command::Help => {
            print_help();
            Ok(())
        }
        Command::Doctor => run_doctor(),
        Command::Login { key } => run_login(&key),
        Command::Logout => run_logout(),
        Command::ConfigSet { field, value } => run_config_set(&field, &value),
        Command::ConfigShow => run_config_show(),
        Command::Generate { prompt, preset } => run_generate(&prompt, preset).await,
        Command::Interactive(opts) => run_interactive(opts).await,
    }
}

// ═══════════════════════════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════════════════════════

fn load_config(preset: Option<Preset>) -> Result<Config> {
    let mut cfg = Config::load()?;
    if let Some(p) = preset {
        cfg.preset = p;
    }
    Ok(cfg)
}

fn run_doctor() -> Result<()> {
    println!("draftpane doctor\n");

    let cfg = Config::load()?;
    println!("[✓] Config: {}", config::config_path()?.display());

    let store = FileCredentialStore::default_location()?;
    let has_key = store.load().is_some();
    println!("[{}] API key: {} ({})",
        if has_key { "✓" } else { "✗" },
        if has_key { "stored" } else { "missing" },
        store.path().display()
    );

    let completion = cfg.completion();
    println!("[✓] Preset: {} ({:?} shape, {} max tokens, {}s timeout)",
        cfg.preset.name(),
        completion.request_shape,
        completion.max_tokens,
        completion.timeout.as_secs_f32()
    );
    println!("[✓] Endpoint: {} ({})", completion.endpoint_url, completion.model);
    println!("[✓] Document: {}", cfg.document_path().display());
    println!("[✓] Log: {}", logging::log_path()?.display());

    Ok(())
}

fn run_login(key: &str) -> Result<()> {
    let key = key.trim();
    if key.is_empty() {
        anyhow::bail!("API key is empty");
    }
    let store = FileCredentialStore::default_location()?;
    store.save(key)?;
    println!("API key saved to {}", store.path().display());
    Ok(())
}

fn run_logout() -> Result<()> {
    let store = FileCredentialStore::default_location()?;
    store.clear()?;
    println!("API key removed from {}", store.path().display());
    Ok(())
}

fn run_config_set(field: &str, value: &str) -> Result<()> {
    let mut cfg = Config::load()?;
    cfg.set(field, value)?;
    cfg.save()?;
    println!("Set {} = {} in {}", field, value, config::config_path()?.display());
    Ok(())
}

fn run_config_show() -> Result<()> {
    let cfg = Config::load()?;
    let completion = cfg.completion();
    println!("preset       {}", cfg.preset.name());
    println!("endpoint     {}", completion.endpoint_url);
    println!("model        {}", completion.model);
    println!("shape        {:?}", completion.request_shape);
    println!("max_tokens   {}", completion.max_tokens);
    println!("temperature  {}", completion.temperature);
    println!("timeout_ms   {}", completion.timeout.as_millis());
    println!("document     {}", cfg.document_path().display());
    Ok(())
}

async fn run_generate(prompt: &str, preset: Option<Preset>) -> Result<()> {
    let cfg = load_config(preset)?;
    let store = FileCredentialStore::default_location()?;
    let api_key = store
        .load()
        .context("No API key stored. Run: draftpane login <key>")?;

    let client = CompletionClient::new(cfg.completion());
    match client.complete(prompt, &api_key).await {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            if e.is_auth() {
                store.clear()?;
                eprintln!("Stored API key was rejected and has been removed.");
            }
            anyhow::bail!("{}", e)
        }
    }
}

async fn run_interactive(opts: PaneOptions) -> Result<()> {
    let cfg = load_config(opts.preset)?;

    let credentials: Arc<dyn CredentialStore> = if opts.ephemeral {
        Arc::new(MemoryCredentialStore::new())
    } else {
        Arc::new(FileCredentialStore::default_location()?)
    };

    let doc_path = opts.doc.unwrap_or_else(|| cfg.document_path());
    let document = match opts.at {
        Some(offset) => FileDocument::with_caret(doc_path, offset),
        None => FileDocument::new(doc_path),
    };

    let client = CompletionClient::new(cfg.completion());
    let title = format!(
        "{} | {} | {}",
        cfg.preset.name(),
        client.config().model,
        document.path().display()
    );

    let services = Services {
        credentials,
        completer: Arc::new(client),
        document: Arc::new(document),
        clipboard: Arc::new(SystemClipboard),
    };

    ui::run_tui(TaskPane::mount(services), &title).await
}
