//! mdpress - Markdown editor with live preview and PDF export

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use mdpress_client::{
    EditorSession, EditorSurface, ExportSurface, HttpExportService, LayoutMode, MenuAction,
    Notifier, Outcome,
};
use mdpress_core::draft::{DRAFT_KEY, TITLE_KEY};
use mdpress_core::placeholder::delimiter_warnings;
use mdpress_core::{Config, FileStore, KeyValueStore, MemoryStore, RenderResult, Renderer};

/// Markdown editor with live preview and PDF export
#[derive(Parser, Debug)]
#[command(name = "mdpress")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render Markdown to sanitized HTML
    Render {
        /// Markdown file
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Output HTML file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Re-render whenever the file changes
        #[arg(long)]
        watch: bool,
    },

    /// Report unmatched math delimiters
    Check {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Export a PDF through the export service
    Pdf {
        /// Markdown file (the saved draft when omitted)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
    },

    /// Open a standalone HTML preview in the browser
    Preview {
        /// Markdown file (the saved draft when omitted)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,

        /// Document title (defaults to the file name)
        #[arg(long)]
        title: Option<String>,
    },

    /// Replace the draft with Markdown fetched from a URL
    Fetch {
        #[arg(value_name = "URL")]
        url: String,
    },

    /// Print the saved draft
    Show,

    /// Replace the draft with the contents of a file
    Upload {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Save the draft as `{title}.md`
    Save {
        /// Target directory (current directory when omitted)
        #[arg(value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Set the draft title
    Title {
        #[arg(value_name = "TITLE")]
        title: String,
    },

    /// Start a new, empty draft
    New {
        /// Do not ask before discarding the current draft
        #[arg(short, long)]
        yes: bool,
    },

    /// Run a menu bar entry: new, view or help
    Menu {
        #[arg(value_name = "ACTION")]
        action: MenuAction,

        /// Do not ask before discarding the current draft
        #[arg(short, long)]
        yes: bool,
    },
}

/// Headless surface: files go to a directory, messages to stderr, previews
/// to the system browser
struct CliSurface {
    out_dir: PathBuf,
}

impl CliSurface {
    fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }
}

impl Notifier for CliSurface {
    fn notify(&mut self, message: &str) {
        eprintln!("mdpress: {message}");
    }
}

impl ExportSurface for CliSurface {
    fn set_busy(&mut self, busy: bool) {
        debug!("cli: busy={busy}");
    }

    fn save_file(&mut self, file_name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.out_dir.join(file_name);
        fs::write(&path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
        eprintln!("Saved {}", path.display());
        Ok(())
    }

    fn open_window(&mut self, html: &str) -> bool {
        let path =
            std::env::temp_dir().join(format!("mdpress-preview-{}.html", std::process::id()));
        if let Err(e) = fs::write(&path, html) {
            warn!("cli: could not write {}: {e}", path.display());
            return false;
        }
        match open::that(&path) {
            Ok(()) => {
                eprintln!("Opened {}", path.display());
                true
            }
            Err(e) => {
                warn!("cli: could not open {}: {e}", path.display());
                false
            }
        }
    }
}

impl EditorSurface for CliSurface {
    fn show_preview(&mut self, result: &RenderResult) {
        debug!(
            "cli: preview {} bytes, {} chars, {} words",
            result.html.len(),
            result.stats.chars,
            result.stats.words
        );
    }

    fn set_layout(&mut self, _mode: LayoutMode) {}

    fn open_url(&mut self, url: &str) -> bool {
        open::that(url).is_ok()
    }
}

type Session<K> = EditorSession<K, HttpExportService, CliSurface>;

fn draft_session(config: &Config, out_dir: &Path) -> Result<Session<FileStore>> {
    let store = FileStore::in_dir(config.storage.dir.as_deref())?;
    debug!("cli: draft store at {}", store.path().display());
    let service = HttpExportService::from_config(&config.service)?;
    EditorSession::new(config, store, service, CliSurface::new(out_dir))
}

/// Session over a file instead of the saved draft; nothing is persisted
fn file_session(
    config: &Config,
    file: &Path,
    title: Option<String>,
) -> Result<Session<MemoryStore>> {
    let text = read_markdown(file)?;
    let title = title.unwrap_or_else(|| {
        file.file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default()
    });

    let mut store = MemoryStore::new();
    store.set(DRAFT_KEY, &text)?;
    store.set(TITLE_KEY, &title)?;
    let service = HttpExportService::from_config(&config.service)?;
    EditorSession::new(config, store, service, CliSurface::new("."))
}

fn read_markdown(file: &Path) -> Result<String> {
    fs::read_to_string(file).with_context(|| format!("Failed to read {}", file.display()))
}

fn exit_code(outcome: &Outcome) -> ExitCode {
    if outcome.is_failure() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn confirm_on_stdin(prompt: &str) -> bool {
    eprint!("{prompt} [y/N] ");
    let _ = io::stderr().flush();
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim(), "y" | "Y" | "yes")
}

fn render_to(renderer: &Renderer, text: &str, output: Option<&Path>) -> Result<()> {
    let result = renderer.render(text);
    match output {
        Some(path) => fs::write(path, &result.html)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => io::stdout()
            .write_all(result.html.as_bytes())
            .context("Failed to write to stdout")?,
    }
    eprintln!("{} chars, {} words", result.stats.chars, result.stats.words);
    Ok(())
}

#[cfg(feature = "watch")]
fn watch_and_render(renderer: &Renderer, file: &Path, output: Option<&Path>) -> Result<()> {
    use mdpress_client::watcher::{SourceWatcher, DEFAULT_DEBOUNCE};
    use std::time::Duration;

    let mut watcher = SourceWatcher::new(file, DEFAULT_DEBOUNCE)?;
    info!("watch: waiting for changes to {}", watcher.path().display());
    loop {
        if let Some(text) = watcher.next_change(Duration::from_secs(60))? {
            render_to(renderer, &text, output)?;
        }
    }
}

#[cfg(not(feature = "watch"))]
fn watch_and_render(_renderer: &Renderer, _file: &Path, _output: Option<&Path>) -> Result<()> {
    anyhow::bail!("mdpress was built without file watching support")
}

fn run(args: Args) -> Result<ExitCode> {
    let config = Config::load().context("Failed to load configuration")?;

    match args.command {
        Command::Render {
            file,
            output,
            watch,
        } => {
            let renderer = if config.preview.math {
                Renderer::new()
            } else {
                Renderer::passthrough()
            };
            render_to(&renderer, &read_markdown(&file)?, output.as_deref())?;
            if watch {
                watch_and_render(&renderer, &file, output.as_deref())?;
            }
        }
        Command::Check { file } => {
            let warnings = delimiter_warnings(&read_markdown(&file)?);
            for warning in &warnings {
                println!("{}:{}: {}", file.display(), warning.line, warning.message);
            }
            if !warnings.is_empty() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Pdf { file, title } => {
            let outcome = match file {
                Some(file) => file_session(&config, &file, title)?.export_pdf(),
                None => draft_session(&config, Path::new("."))?.export_pdf(),
            };
            return Ok(exit_code(&outcome));
        }
        Command::Preview { file, title } => {
            let outcome = match file {
                Some(file) => file_session(&config, &file, title)?.export_html_preview(),
                None => draft_session(&config, Path::new("."))?.export_html_preview(),
            };
            return Ok(exit_code(&outcome));
        }
        Command::Fetch { url } => {
            let mut session = draft_session(&config, Path::new("."))?;
            let outcome = session.import_from_url(&url)?;
            if let Outcome::Loaded(markdown) = &outcome {
                eprintln!("Loaded {} bytes into the draft", markdown.len());
            }
            return Ok(exit_code(&outcome));
        }
        Command::Show => {
            let session = draft_session(&config, Path::new("."))?;
            let doc = session.document();
            let stats = session.last_render().stats;
            println!("# {}", doc.title);
            println!("{}", doc.text);
            eprintln!("{} chars, {} words", stats.chars, stats.words);
        }
        Command::Upload { file } => {
            let bytes =
                fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
            let mut session = draft_session(&config, Path::new("."))?;
            session.upload(&bytes)?;
            info!("cli: draft replaced from {}", file.display());
        }
        Command::Save { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from("."));
            let mut session = draft_session(&config, &dir)?;
            session.download_markdown()?;
        }
        Command::Title { title } => {
            let mut session = draft_session(&config, Path::new("."))?;
            session.on_title_input(title)?;
        }
        Command::New { yes } => {
            let mut session = draft_session(&config, Path::new("."))?;
            let cleared = session.new_document(|prompt| yes || confirm_on_stdin(prompt));
            if cleared {
                session.persist()?;
            }
        }
        Command::Menu { action, yes } => {
            let mut session = draft_session(&config, Path::new("."))?;
            if !session.menu(action, |prompt| yes || confirm_on_stdin(prompt)) {
                return Ok(ExitCode::FAILURE);
            }
            match action {
                MenuAction::New => session.persist()?,
                MenuAction::View => eprintln!("Layout: {}", session.layout().label()),
                MenuAction::Help => {}
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = Args::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
