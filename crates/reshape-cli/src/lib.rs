use anyhow::{Context as _, Result, anyhow, bail};
use clap::{ArgAction, Parser, Subcommand};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use reshape_core::path;
use reshape_core::{Engine, ReshapeConfig, Reshaper, State, TracingObserver, WatchConfig};
use serde_json::Value;
use std::collections::BTreeSet;
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "reshape", version, about = "Reshape JSON documents with {src, dst} path rules")]
pub struct Cli {
    /// Config file (defaults to ./reshape.json when present).
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Raise log verbosity (-v debug, -vv trace). `RUST_LOG` takes precedence.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Project a document through a rule list.
    GetSet {
        /// Document as a file path or inline JSON.
        #[arg(long, value_name = "JSON_OR_PATH")]
        doc: String,
        /// Rule list as a file path or inline JSON.
        #[arg(long, value_name = "JSON_OR_PATH")]
        rules: String,
        /// Indent the output.
        #[arg(long)]
        pretty: bool,
        /// Re-run whenever the document or rules file changes.
        #[arg(long)]
        watch: bool,
    },
    /// Print the raw JSON found at a path.
    Get {
        #[arg(value_name = "JSON_OR_PATH")]
        doc: String,
        path: String,
    },
    /// Evaluate a script document with the gsjson and storage modules.
    Run {
        file: PathBuf,
        /// Initial script variables as a file path or inline JSON object.
        #[arg(long, value_name = "JSON_OR_PATH")]
        data: Option<String>,
    },
}

pub async fn run_from_env() -> Result<()> {
    run(Cli::parse()).await
}

pub async fn run_from_args<I, T>(args: I) -> Result<()>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    run(Cli::try_parse_from(args)?).await
}

pub async fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);
    let cwd = std::env::current_dir().context("failed to resolve working directory")?;
    let config = ReshapeConfig::discover(cli.config.as_deref(), &cwd)?;
    debug!(?config, "loaded config");

    match cli.command {
        Command::GetSet {
            doc,
            rules,
            pretty,
            watch,
        } => {
            let mut options = config.options();
            options.pretty |= pretty;
            let reshaper = Reshaper::new(options).with_observer(Arc::new(TracingObserver));
            let doc = Input::resolve(&doc);
            let rules = Input::resolve(&rules);
            if watch {
                watch_get_set(&reshaper, &doc, &rules, &config.watch).await
            } else {
                println!("{}", get_set_once(&reshaper, &doc, &rules)?);
                Ok(())
            }
        }
        Command::Get { doc, path: query } => {
            let text = Input::resolve(&doc).read()?;
            println!("{}", path::get_raw(&text, &query)?);
            Ok(())
        }
        Command::Run { file, data } => {
            let output = run_script(&config, &file, data.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A subscriber may already be installed when embedded or under test.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// A command-line JSON argument: an existing file, or the text itself.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    File(PathBuf),
    Inline(String),
}

impl Input {
    fn resolve(arg: &str) -> Self {
        let as_path = PathBuf::from(arg);
        if as_path.is_file() {
            Self::File(as_path)
        } else {
            Self::Inline(arg.to_string())
        }
    }

    fn read(&self) -> Result<String> {
        match self {
            Self::File(path) => fs::read_to_string(path)
                .with_context(|| format!("failed to read {}", path.display())),
            Self::Inline(text) => Ok(text.clone()),
        }
    }

    fn path(&self) -> Option<&Path> {
        match self {
            Self::File(path) => Some(path.as_path()),
            Self::Inline(_) => None,
        }
    }
}

fn get_set_once(reshaper: &Reshaper, doc: &Input, rules: &Input) -> Result<String> {
    let doc = doc.read()?;
    let rules = rules.read()?;
    reshaper
        .get_set(&doc, &rules)
        .map_err(|err| anyhow!("[{}] {err}", err.code()))
}

fn run_script(config: &ReshapeConfig, file: &Path, data: Option<&str>) -> Result<Value> {
    let source =
        fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))?;
    let root: Value = serde_json::from_str(&source)
        .with_context(|| format!("failed to parse {}", file.display()))?;
    let expression = resolve_run_expression(&root)?;
    let vars = load_data_payload(data)?;

    let engine = Engine::with_config(config).with_observer(Arc::new(TracingObserver));
    let mut state = State::from_vars(vars.unwrap_or(Value::Null));
    engine
        .run(&expression, &mut state)
        .map_err(|err| anyhow!("[{}] {err}", err.code()))
}

/// A script file is either an expression or an object carrying one under
/// `program` or `expr`.
fn resolve_run_expression(root: &Value) -> Result<Value> {
    let Some(obj) = root.as_object() else {
        return Ok(root.clone());
    };
    obj.get("program")
        .or_else(|| obj.get("expr"))
        .cloned()
        .ok_or_else(|| anyhow!("no runnable expression found (expected top-level expression, program, or expr)"))
}

fn load_data_payload(data: Option<&str>) -> Result<Option<Value>> {
    let Some(input) = data else {
        return Ok(None);
    };
    let input = Input::resolve(input);
    let text = input.read()?;
    let parsed = serde_json::from_str::<Value>(&text).with_context(|| match input.path() {
        Some(path) => format!("invalid JSON in {}", path.display()),
        None => "invalid --data JSON".to_string(),
    })?;
    if !parsed.is_object() {
        bail!("--data must be a JSON object of variables");
    }
    Ok(Some(parsed))
}

enum Wake {
    Poll,
    Changed,
    WatcherClosed,
    Shutdown,
}

async fn watch_get_set(
    reshaper: &Reshaper,
    doc: &Input,
    rules: &Input,
    watch: &WatchConfig,
) -> Result<()> {
    let files: Vec<PathBuf> = [doc, rules]
        .into_iter()
        .filter_map(Input::path)
        .map(|path| fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf()))
        .collect();
    if files.is_empty() {
        bail!("--watch needs --doc or --rules to name a file");
    }

    emit(reshaper, doc, rules);
    let mut last = compute_fingerprint(&files);
    let debounce = Duration::from_millis(watch.debounce_ms);
    let mut fallback_interval = tokio::time::interval(Duration::from_millis(watch.poll_ms.max(1)));
    fallback_interval.tick().await;
    let mut notify = match start_fs_watcher(&files) {
        Ok(watcher) => {
            info!("filesystem watcher active (event-driven + fallback sweep)");
            Some(watcher)
        }
        Err(err) => {
            warn!(error = %err, "filesystem watcher unavailable; polling only");
            None
        }
    };
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        let wake = if let Some((_, rx)) = notify.as_mut() {
            tokio::select! {
                _ = &mut shutdown => Wake::Shutdown,
                _ = fallback_interval.tick() => Wake::Poll,
                evt = rx.recv() => match evt {
                    Some(()) => {
                        debounce_fs_events(rx, debounce).await;
                        Wake::Changed
                    }
                    None => Wake::WatcherClosed,
                },
            }
        } else {
            tokio::select! {
                _ = &mut shutdown => Wake::Shutdown,
                _ = fallback_interval.tick() => Wake::Poll,
            }
        };

        match wake {
            Wake::Shutdown => break,
            Wake::WatcherClosed => {
                warn!("filesystem watcher channel closed; fallback polling only");
                notify = None;
            }
            Wake::Poll | Wake::Changed => {
                let watched = files.clone();
                let now = tokio::task::spawn_blocking(move || compute_fingerprint(&watched))
                    .await
                    .unwrap_or(last);
                if now != last {
                    last = now;
                    info!("change detected, re-running get-set");
                    emit(reshaper, doc, rules);
                }
            }
        }
    }
    Ok(())
}

fn emit(reshaper: &Reshaper, doc: &Input, rules: &Input) {
    match get_set_once(reshaper, doc, rules) {
        Ok(output) => println!("{output}"),
        Err(err) => eprintln!("error: {err:#}"),
    }
}

async fn debounce_fs_events(rx: &mut mpsc::UnboundedReceiver<()>, window: Duration) {
    let mut deadline = Instant::now() + window;
    let sleep = tokio::time::sleep_until(deadline);
    tokio::pin!(sleep);

    loop {
        tokio::select! {
            _ = &mut sleep => break,
            maybe = rx.recv() => {
                if maybe.is_none() {
                    break;
                }
                deadline = Instant::now() + window;
                sleep.as_mut().reset(deadline);
            }
        }
    }
}

/// Watches the parent directory of every file, since editors often replace
/// files by rename, and forwards events that touch one of `files`.
fn start_fs_watcher(files: &[PathBuf]) -> Result<(RecommendedWatcher, mpsc::UnboundedReceiver<()>)> {
    let (tx, rx) = mpsc::unbounded_channel::<()>();
    let wanted: BTreeSet<PathBuf> = files.iter().cloned().collect();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if event.paths.iter().any(|path| wanted.contains(path)) {
                let _ = tx.send(());
            }
        }
        Err(_) => {
            let _ = tx.send(());
        }
    })
    .context("failed to initialize filesystem watcher")?;

    let dirs: BTreeSet<&Path> = files
        .iter()
        .map(|file| match file.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        })
        .collect();
    for dir in dirs {
        watcher
            .watch(dir, RecursiveMode::NonRecursive)
            .with_context(|| format!("failed to watch {}", dir.display()))?;
    }

    Ok((watcher, rx))
}

/// Content hash of the watched files. Unreadable files hash as absent so a
/// delete followed by a re-create is seen as a change.
fn compute_fingerprint(files: &[PathBuf]) -> u64 {
    let mut hasher = DefaultHasher::new();
    for path in files {
        path.hash(&mut hasher);
        fs::read(path).ok().hash(&mut hasher);
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        fs::write(&path, contents).expect("failed to write fixture");
        path
    }

    #[test]
    fn input_prefers_existing_files() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let file = write(&dir, "doc.json", r#"{"a":1}"#);
        let input = Input::resolve(file.to_str().expect("utf-8 temp path"));
        assert_eq!(input, Input::File(file.clone()));
        assert_eq!(input.read().expect("file should be readable"), r#"{"a":1}"#);
        assert_eq!(
            Input::resolve(r#"{"a":1}"#),
            Input::Inline(r#"{"a":1}"#.to_string())
        );
    }

    #[test]
    fn get_set_reads_files_and_inline_rules() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let doc = write(&dir, "doc.json", r#"[{"questionId":"1"},{"questionId":"2"}]"#);
        let out = get_set_once(
            &Reshaper::default(),
            &Input::File(doc),
            &Input::Inline(r#"[{"src":"@this.#.questionId","dst":"items.-1.id"}]"#.into()),
        )
        .expect("get-set should succeed");
        assert_eq!(out, r#"{"items":[{"id":"1"},{"id":"2"}]}"#);
    }

    #[test]
    fn get_set_errors_carry_the_code() {
        let err = get_set_once(
            &Reshaper::default(),
            &Input::Inline("{}".into()),
            &Input::Inline(r#"{"src":"a"}"#.into()),
        )
        .expect_err("object rules must be rejected");
        assert!(err.to_string().starts_with("[RESHAPE_E_RULES]"), "{err}");
    }

    #[test]
    fn run_expression_resolution() {
        assert_eq!(
            resolve_run_expression(&json!({"program": ["var", "x"]})).expect("program key"),
            json!(["var", "x"])
        );
        assert_eq!(
            resolve_run_expression(&json!({"expr": 1})).expect("expr key"),
            json!(1)
        );
        assert_eq!(
            resolve_run_expression(&json!(["do"])).expect("bare expression"),
            json!(["do"])
        );
        assert!(resolve_run_expression(&json!({"other": 1})).is_err());
    }

    #[test]
    fn run_script_uses_data_as_variables() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let script = write(
            &dir,
            "script.json",
            r#"{"program": ["gsjson.get_set", ["var", "doc"], [{"src": "a", "dst": "b"}]]}"#,
        );
        let data = write(&dir, "data.json", r#"{"doc": "{\"a\": 5}"}"#);
        let out = run_script(
            &ReshapeConfig::default(),
            &script,
            data.to_str(),
        )
        .expect("script should run");
        assert_eq!(out, json!(r#"{"b":5}"#));
    }

    #[test]
    fn data_payload_must_be_an_object() {
        assert!(load_data_payload(Some("[1,2]")).is_err());
        assert!(load_data_payload(Some("{oops")).is_err());
        assert_eq!(
            load_data_payload(Some(r#"{"x":1}"#)).expect("inline object"),
            Some(json!({"x": 1}))
        );
        assert_eq!(load_data_payload(None).expect("no data"), None);
    }

    #[test]
    fn fingerprint_detects_same_size_edits() {
        let dir = TempDir::new().expect("failed to create temp dir");
        let file = write(&dir, "rules.json", r#"[{"src":"a","dst":"b"}]"#);
        let before = compute_fingerprint(std::slice::from_ref(&file));

        fs::write(&file, r#"[{"src":"a","dst":"c"}]"#).expect("failed to rewrite rules");
        let after = compute_fingerprint(std::slice::from_ref(&file));
        assert_ne!(before, after);

        fs::remove_file(&file).expect("failed to remove rules");
        assert_ne!(after, compute_fingerprint(std::slice::from_ref(&file)));
    }

    #[test]
    fn cli_parses_subcommands() {
        let cli = Cli::try_parse_from([
            "reshape", "-vv", "get-set", "--doc", "{}", "--rules", "[]", "--pretty",
        ])
        .expect("valid arguments");
        assert_eq!(cli.verbose, 2);
        assert!(matches!(
            cli.command,
            Command::GetSet { pretty: true, watch: false, .. }
        ));

        let cli = Cli::try_parse_from(["reshape", "get", "{}", "a.b", "--config", "x.json"])
            .expect("valid arguments");
        assert_eq!(cli.config, Some(PathBuf::from("x.json")));
        assert!(Cli::try_parse_from(["reshape", "get-set", "--doc", "{}"]).is_err());
    }

    #[tokio::test]
    async fn watch_requires_a_file_argument() {
        let err = watch_get_set(
            &Reshaper::default(),
            &Input::Inline("{}".into()),
            &Input::Inline("[]".into()),
            &WatchConfig::default(),
        )
        .await
        .expect_err("inline-only watch must fail");
        assert!(err.to_string().contains("--watch"));
    }
}
