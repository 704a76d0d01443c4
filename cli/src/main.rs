//! Ferry - Command-line driver for the file manager engine.
//!
//! A thin front end for scripting and manual use: transfers with progress,
//! query parsing, search, trash and the operation log.

use clap::{Parser, Subcommand};
use ferry_engine::{
    folder_size, parse_nl_query, plan_transfer, spawn_search, spawn_transfer, units,
    CancellationToken, ChecksumAlgorithm, ConflictAction, ConflictChoice, ConflictPolicy,
    ConflictResolver, EngineSettings, ItemResult, Mode, OperationLog, SearchEvent, SearchRequest,
    TransferEvent, TransferOptions,
};
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

/// Ferry - move files around, find them, and get them back
#[derive(Parser, Debug)]
#[command(name = "ferry")]
#[command(version = "0.1.0")]
#[command(about = "File transfers, search and trash from the command line")]
struct Args {
    /// Settings file (defaults to the user config directory)
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output and debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Copy files and directories into a directory
    Copy(TransferArgs),
    /// Move files and directories into a directory
    Move(TransferArgs),
    /// Search a tree by name and filters
    Search {
        /// Directory to search
        root: PathBuf,
        /// Query such as `invoice ext:pdf size>1MB`
        query: Vec<String>,
        /// Include hidden entries
        #[arg(long)]
        hidden: bool,
        #[arg(long)]
        case_sensitive: bool,
        /// Only look at the root's direct children
        #[arg(long)]
        no_recursive: bool,
    },
    /// Show how a query is understood, as JSON
    Parse {
        #[arg(required = true)]
        query: Vec<String>,
    },
    /// Move paths to the trash
    Trash {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
    /// Restore trashed entries by their name in the trash
    Restore {
        #[arg(required = true)]
        names: Vec<String>,
    },
    /// Permanently delete everything in the trash
    EmptyTrash,
    /// Show the operation log
    Log {
        /// Only the most recent N entries
        #[arg(long, value_name = "N")]
        limit: Option<usize>,
    },
    /// Compute the total size of a file or directory
    Size { path: PathBuf },
}

#[derive(clap::Args, Debug)]
struct TransferArgs {
    /// Source paths
    #[arg(required = true)]
    sources: Vec<PathBuf>,

    /// Target directory
    #[arg(long, value_name = "DIR")]
    to: PathBuf,

    /// Conflict policy: ask, replace, skip, or rename
    #[arg(long, value_name = "POLICY")]
    on_conflict: Option<String>,

    /// Do not preserve timestamps and permissions
    #[arg(long)]
    no_preserve: bool,

    /// Verify copies with a checksum: md5, sha256, or blake3
    #[arg(long, value_name = "ALGORITHM")]
    verify: Option<String>,
}

/// Asks on the terminal how to handle an existing destination.
///
/// `r`, `s`, `n` pick replace, skip, rename; the uppercase letter applies the
/// answer to every later conflict. Anything else cancels that source.
struct PromptResolver<R: BufRead> {
    input: R,
}

impl<R: BufRead> ConflictResolver for PromptResolver<R> {
    fn resolve(&mut self, _source: &Path, destination: &Path) -> Option<ConflictChoice> {
        eprint!(
            "'{}' already exists. [r]eplace, [s]kip, re[n]ame (uppercase = all): ",
            destination.display()
        );
        let _ = io::stderr().flush();

        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => parse_choice(line.trim()),
        }
    }
}

fn parse_choice(answer: &str) -> Option<ConflictChoice> {
    let action = match answer.to_lowercase().as_str() {
        "r" | "replace" => ConflictAction::Replace,
        "s" | "skip" => ConflictAction::Skip,
        "n" | "rename" => ConflictAction::Rename,
        _ => return None,
    };
    let apply_to_all = answer.chars().next().is_some_and(|c| c.is_uppercase());
    Some(ConflictChoice {
        action,
        apply_to_all,
    })
}

/// Turns transfer events into terminal output.
struct CliReport {
    verbose: bool,
    start_time: Instant,
    done: usize,
    failed: Vec<(String, String)>,
}

impl CliReport {
    fn new(verbose: bool) -> Self {
        CliReport {
            verbose,
            start_time: Instant::now(),
            done: 0,
            failed: Vec::new(),
        }
    }

    fn print_progress_bar(percent: u8) -> String {
        let filled = (percent.min(100) / 5) as usize;
        format!("[{}{}] {}%", "=".repeat(filled), " ".repeat(20 - filled), percent)
    }

    fn handle(&mut self, event: &TransferEvent) {
        match event {
            TransferEvent::Started {
                total_items,
                total_bytes,
                ..
            } => {
                eprintln!(
                    "Transferring {} items ({})",
                    total_items,
                    units::format_bytes(*total_bytes)
                );
            }
            TransferEvent::Current { name } => {
                if self.verbose {
                    eprintln!("\nStarting: {}", name);
                }
            }
            TransferEvent::Progress { percent, meta } => {
                eprint!("\rProgress: {} | {}", Self::print_progress_bar(*percent), meta);
                let _ = io::stderr().flush();
            }
            TransferEvent::ItemResult(result) => self.record(result),
            TransferEvent::Finished { .. } => self.print_summary(),
        }
    }

    fn record(&mut self, result: &ItemResult) {
        let name = result
            .source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| result.source.display().to_string());
        if result.success {
            self.done += 1;
        } else {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "(unknown error)".to_string());
            self.failed.push((name, message));
        }
    }

    fn print_summary(&self) {
        eprintln!();
        eprintln!(
            "Summary: {} done, {} failed in {:.1}s",
            self.done,
            self.failed.len(),
            self.start_time.elapsed().as_secs_f64()
        );
        if !self.failed.is_empty() {
            eprintln!();
            eprintln!("Failed items:");
            for (name, message) in &self.failed {
                eprintln!("  {}: {}", name, message);
            }
        }
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_env("FERRY_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Parse arguments, then run the command
fn main() {
    let args = Args::parse();
    init_tracing(args.verbose);

    let exit_code = match run_cli(&args) {
        Ok(()) => 0,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            2
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability
fn run_cli(args: &Args) -> Result<(), String> {
    let settings = match &args.config {
        Some(path) => EngineSettings::load(path),
        None => EngineSettings::load_default(),
    };
    tracing::debug!(?settings, "Settings loaded");
    let log = settings.operation_log();

    match &args.command {
        Command::Copy(transfer) => {
            run_transfer_command(Mode::Copy, transfer, &settings, &log, args.verbose)
        }
        Command::Move(transfer) => {
            run_transfer_command(Mode::Move, transfer, &settings, &log, args.verbose)
        }
        Command::Search {
            root,
            query,
            hidden,
            case_sensitive,
            no_recursive,
        } => {
            let parsed = parse_nl_query(&query.join(" "));
            for note in &parsed.notes {
                eprintln!("Note: {}", note);
            }
            let request = SearchRequest {
                root: root.clone(),
                query: parsed.query,
                include_hidden: *hidden || settings.search_include_hidden,
                case_sensitive: *case_sensitive,
                recursive: !*no_recursive,
                filters: parsed.filters,
            };
            run_search_command(request, args.verbose)
        }
        Command::Parse { query } => {
            let parsed = parse_nl_query(&query.join(" "));
            let json = serde_json::to_string_pretty(&parsed)
                .map_err(|e| format!("Failed to render query: {}", e))?;
            println!("{}", json);
            Ok(())
        }
        Command::Trash { paths } => {
            let trash = settings
                .trash()
                .ok_or_else(|| "Could not determine the trash directory".to_string())?;
            let outcomes = trash
                .move_to_trash(paths)
                .map_err(|e| format!("Move to trash failed: {}", e))?;

            let moved: Vec<&PathBuf> = outcomes
                .iter()
                .filter(|o| o.success())
                .map(|o| &o.source)
                .collect();
            for outcome in outcomes.iter().filter(|o| !o.success()) {
                eprintln!(
                    "  {}: {}",
                    outcome.source.display(),
                    outcome.error.as_deref().unwrap_or("(unknown error)")
                );
            }
            if !moved.is_empty() {
                log.append("trash", &moved, Vec::<PathBuf>::new(), true, "");
            }
            eprintln!("Moved {} items to Trash", moved.len());
            if moved.len() < outcomes.len() {
                return Err("One or more items could not be trashed".to_string());
            }
            Ok(())
        }
        Command::Restore { names } => {
            let trash = settings
                .trash()
                .ok_or_else(|| "Could not determine the trash directory".to_string())?;
            let outcomes = trash.restore(names).map_err(|e| format!("Restore failed: {}", e))?;

            let restored: Vec<_> = outcomes.iter().filter(|o| o.success()).collect();
            for outcome in &outcomes {
                match &outcome.error {
                    None => println!("{}", outcome.destination.display()),
                    Some(e) => eprintln!("  {}: {}", outcome.source.display(), e),
                }
            }
            if !restored.is_empty() {
                log.append(
                    "restore",
                    restored.iter().map(|o| &o.source),
                    restored.iter().map(|o| &o.destination),
                    true,
                    "",
                );
            }
            eprintln!("Restored {} items", restored.len());
            if restored.len() < outcomes.len() {
                return Err("One or more items could not be restored".to_string());
            }
            Ok(())
        }
        Command::EmptyTrash => {
            let trash = settings
                .trash()
                .ok_or_else(|| "Could not determine the trash directory".to_string())?;
            let removed = trash.empty().map_err(|e| format!("Empty trash failed: {}", e))?;
            eprintln!("Trash emptied ({} items)", removed);
            Ok(())
        }
        Command::Log { limit } => {
            for entry in log.entries(*limit) {
                let status = if entry.success {
                    "ok".to_string()
                } else {
                    format!("failed: {}", entry.error)
                };
                let mut line = format!(
                    "{} {} {}",
                    entry.timestamp,
                    entry.action,
                    entry.sources.join(", ")
                );
                if !entry.destinations.is_empty() {
                    line.push_str(&format!(" -> {}", entry.destinations.join(", ")));
                }
                println!("{} [{}]", line, status);
            }
            Ok(())
        }
        Command::Size { path } => {
            if path.symlink_metadata().is_err() {
                return Err(format!("Path does not exist: {}", path.display()));
            }
            let bytes = folder_size(path, &CancellationToken::new());
            println!("{} ({} bytes)", units::format_bytes(bytes), bytes);
            Ok(())
        }
    }
}

fn run_transfer_command(
    mode: Mode,
    args: &TransferArgs,
    settings: &EngineSettings,
    log: &OperationLog,
    verbose: bool,
) -> Result<(), String> {
    if !args.to.is_dir() {
        return Err(format!("Target is not a directory: {}", args.to.display()));
    }

    let mut options = settings.plan_options();
    if let Some(policy) = &args.on_conflict {
        options.conflict_default = policy.parse::<ConflictPolicy>()?.action();
    }
    if args.no_preserve {
        options.preserve = false;
    }
    let verify = match &args.verify {
        Some(name) => Some(name.parse::<ChecksumAlgorithm>()?),
        None => settings.verify_checksum,
    };

    for source in &args.sources {
        if source.symlink_metadata().is_err() {
            eprintln!("Skipping missing source: {}", source.display());
        }
    }

    let mut resolver = PromptResolver {
        input: io::stdin().lock(),
    };
    let items = plan_transfer(&args.sources, &args.to, mode, &options, &mut resolver);
    if items.is_empty() {
        eprintln!("Nothing to transfer");
        return Ok(());
    }

    let handle = spawn_transfer(
        items,
        TransferOptions {
            verify,
            ..TransferOptions::default()
        },
    );
    let mut report = CliReport::new(verbose);
    for event in handle.events.iter() {
        if let TransferEvent::ItemResult(result) = &event {
            log.record_item(result);
        }
        report.handle(&event);
    }
    handle
        .join()
        .map_err(|_| "Transfer worker panicked".to_string())?;

    if report.failed.is_empty() {
        Ok(())
    } else {
        Err("One or more items failed to transfer".to_string())
    }
}

fn run_search_command(request: SearchRequest, verbose: bool) -> Result<(), String> {
    let handle = spawn_search(request);
    let mut error = None;
    let mut found = 0usize;
    for event in handle.events.iter() {
        match event {
            SearchEvent::Found { path } => {
                found += 1;
                println!("{}", path.display());
            }
            SearchEvent::Progress { scanned } => {
                if verbose {
                    eprintln!("Scanned {} entries", scanned);
                }
            }
            SearchEvent::Error { message } => error = Some(message),
            SearchEvent::Finished => {}
        }
    }
    let scanned = handle
        .join()
        .map_err(|_| "Search worker panicked".to_string())?;

    match error {
        Some(message) => Err(message),
        None => {
            eprintln!("{} matches in {} entries", found, scanned);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    /// Settings that keep the log and trash inside `dir`.
    fn config_in(dir: &Path) -> PathBuf {
        let path = dir.join("config.json");
        let settings = EngineSettings {
            operation_log_path: dir.join("oplog.jsonl"),
            trash_dir: Some(dir.join("Trash")),
            ..EngineSettings::default()
        };
        settings.save(&path).expect("Failed to write config");
        path
    }

    fn args(config: &Path, command: Command) -> Args {
        Args {
            config: Some(config.to_path_buf()),
            verbose: false,
            command,
        }
    }

    fn transfer(sources: Vec<PathBuf>, to: &Path, on_conflict: &str) -> TransferArgs {
        TransferArgs {
            sources,
            to: to.to_path_buf(),
            on_conflict: Some(on_conflict.to_string()),
            no_preserve: false,
            verify: None,
        }
    }

    #[test]
    fn test_cli_copy_logs_each_item() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());
        let src = temp_dir.path().join("test.txt");
        let dst_dir = temp_dir.path().join("out");
        fs::write(&src, "hello").expect("Failed to write file");
        fs::create_dir(&dst_dir).unwrap();

        let mut copy = transfer(vec![src.clone()], &dst_dir, "replace");
        copy.verify = Some("sha256".to_string());
        let result = run_cli(&args(&config, Command::Copy(copy)));

        assert!(result.is_ok(), "CLI should succeed: {:?}", result);
        assert_eq!(fs::read_to_string(dst_dir.join("test.txt")).unwrap(), "hello");
        assert!(src.exists());

        let entries = OperationLog::new(temp_dir.path().join("oplog.jsonl"), 5).entries(None);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].action, "copy");
        assert!(entries[0].success);
    }

    #[test]
    fn test_cli_move_with_rename_policy() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());
        let src_dir = temp_dir.path().join("src");
        let dst_dir = temp_dir.path().join("dst");
        fs::create_dir_all(&src_dir).unwrap();
        fs::create_dir_all(&dst_dir).unwrap();
        fs::write(src_dir.join("a.txt"), "new").unwrap();
        fs::write(dst_dir.join("a.txt"), "old").unwrap();

        let result = run_cli(&args(
            &config,
            Command::Move(transfer(vec![src_dir.join("a.txt")], &dst_dir, "rename")),
        ));

        assert!(result.is_ok(), "CLI should succeed: {:?}", result);
        assert!(!src_dir.join("a.txt").exists());
        assert_eq!(fs::read_to_string(dst_dir.join("a.txt")).unwrap(), "old");
        assert_eq!(fs::read_to_string(dst_dir.join("a (1).txt")).unwrap(), "new");
    }

    #[test]
    fn test_cli_rejects_bad_transfer_arguments() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());
        let src = temp_dir.path().join("a.txt");
        fs::write(&src, "x").unwrap();

        let missing_target = transfer(vec![src.clone()], &temp_dir.path().join("nope"), "skip");
        assert!(run_cli(&args(&config, Command::Copy(missing_target))).is_err());

        let bad_policy = transfer(vec![src.clone()], temp_dir.path(), "overwrite");
        assert!(run_cli(&args(&config, Command::Copy(bad_policy))).is_err());

        let mut bad_hash = transfer(vec![src], temp_dir.path(), "skip");
        bad_hash.verify = Some("crc32".to_string());
        assert!(run_cli(&args(&config, Command::Copy(bad_hash))).is_err());
    }

    #[test]
    fn test_cli_search_and_parse() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());
        fs::write(temp_dir.path().join("report.pdf"), "x").unwrap();

        let search = Command::Search {
            root: temp_dir.path().to_path_buf(),
            query: vec!["report".to_string(), "ext:pdf".to_string()],
            hidden: false,
            case_sensitive: false,
            no_recursive: false,
        };
        assert!(run_cli(&args(&config, search)).is_ok());

        let missing_root = Command::Search {
            root: temp_dir.path().join("missing"),
            query: Vec::new(),
            hidden: false,
            case_sensitive: false,
            no_recursive: true,
        };
        let result = run_cli(&args(&config, missing_root));
        assert!(matches!(result, Err(msg) if msg.starts_with("Search root does not exist")));

        let parse = Command::Parse {
            query: vec!["size>10MB".to_string()],
        };
        assert!(run_cli(&args(&config, parse)).is_ok());
    }

    #[test]
    fn test_cli_trash_restore_cycle() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());
        let file = temp_dir.path().join("draft.txt");
        fs::write(&file, "draft").unwrap();

        let trash = Command::Trash {
            paths: vec![file.clone()],
        };
        assert!(run_cli(&args(&config, trash)).is_ok());
        assert!(!file.exists());
        assert!(temp_dir.path().join("Trash/files/draft.txt").exists());

        let restore = Command::Restore {
            names: vec!["draft.txt".to_string()],
        };
        assert!(run_cli(&args(&config, restore)).is_ok());
        assert_eq!(fs::read_to_string(&file).unwrap(), "draft");

        let actions: Vec<String> = OperationLog::new(temp_dir.path().join("oplog.jsonl"), 5)
            .entries(None)
            .into_iter()
            .map(|e| e.action)
            .collect();
        assert_eq!(actions, vec!["trash", "restore"]);

        assert!(run_cli(&args(&config, Command::EmptyTrash)).is_ok());
        assert!(run_cli(&args(&config, Command::Log { limit: Some(1) })).is_ok());
    }

    #[test]
    fn test_cli_size_requires_existing_path() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config = config_in(temp_dir.path());

        let size = Command::Size {
            path: temp_dir.path().to_path_buf(),
        };
        assert!(run_cli(&args(&config, size)).is_ok());

        let missing = Command::Size {
            path: temp_dir.path().join("missing"),
        };
        assert!(run_cli(&args(&config, missing)).is_err());
    }

    #[test]
    fn test_parse_choice() {
        assert_eq!(
            parse_choice("r"),
            Some(ConflictChoice {
                action: ConflictAction::Replace,
                apply_to_all: false
            })
        );
        assert_eq!(
            parse_choice("N"),
            Some(ConflictChoice {
                action: ConflictAction::Rename,
                apply_to_all: true
            })
        );
        assert_eq!(parse_choice(""), None);
        assert_eq!(parse_choice("x"), None);
    }

    #[test]
    fn test_prompt_resolver_reads_lines() {
        let mut resolver = PromptResolver {
            input: io::Cursor::new("s\n"),
        };
        let target = Path::new("/tmp/a.txt");

        let choice = resolver.resolve(target, target).expect("Expected an answer");
        assert_eq!(choice.action, ConflictAction::Skip);
        assert_eq!(resolver.resolve(target, target), None);
    }
}
