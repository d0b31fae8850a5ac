use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;

use logbox::config::Config;
use logbox::model::{DeleteScope, FilterCriteria, SessionInfo, now_secs};
use logbox::observability::{self, Metrics};
use logbox::search::{DeepSearch, SearchPhase, SearchRequest, SessionScope};
use logbox::store::{LogStore, RetentionManager, export};
use tracing::info;

use crate::cli::{Cli, Commands, DeleteArgs, ExportArgs, SearchArgs};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

pub async fn run(cli: Cli) -> Result<(), AnyError> {
    let config = match cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    observability::init_tracing(&config.telemetry);

    let store = LogStore::open(&config.store.path)?;
    info!(path = %config.store.path.display(), "Opened store");
    let metrics = Arc::new(Metrics::new());

    match cli.command {
        Commands::Stats => stats(&store, &config, metrics)?,
        Commands::Sessions => sessions(&store)?,
        Commands::Rotate => {
            let retention = RetentionManager::new(store.clone(), &config.retention, metrics);
            let stats = retention.rotate_if_needed()?;
            println!(
                "size {} bytes, pruned {} records{}",
                stats.size_before,
                stats.records_pruned,
                if stats.applied { "" } else { " (under budget)" }
            );
        }
        Commands::Cleanup => {
            let retention = RetentionManager::new(store.clone(), &config.retention, metrics);
            let stats = retention.cleanup_expired()?;
            println!("pruned {} records", stats.records_pruned);
        }
        Commands::Export(args) => export_records(&store, args)?,
        Commands::Search(args) => search(&store, &config, metrics, args).await?,
        Commands::Delete(args) => {
            let scope = delete_scope(args)?;
            let removed = store.delete(&scope)?;
            println!("deleted {} records ({})", removed, scope);
        }
    }

    store.persist()?;
    Ok(())
}

fn stats(store: &LogStore, config: &Config, metrics: Arc<Metrics>) -> Result<(), AnyError> {
    let stats = store.stats()?;
    let retention = RetentionManager::new(store.clone(), &config.retention, metrics);
    let budget = config.retention.max_size;

    println!("records:   {}", stats.record_count);
    println!("sessions:  {}", stats.session_count);
    println!(
        "disk:      {} of {}",
        logbox::humanize::ByteSize(stats.disk_bytes).to_human_readable(),
        budget.to_human_readable()
    );
    if let Some(at) = retention.last_rotation()? {
        println!("rotated:   {:.0}s ago", now_secs() - at);
    }
    if let Some(at) = retention.last_cleanup()? {
        println!("cleaned:   {:.0}s ago", now_secs() - at);
    }
    Ok(())
}

fn print_session(session: &SessionInfo) {
    let started = chrono::DateTime::from_timestamp(session.start_time as i64, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| session.start_time.to_string());
    println!("{}  {}  {:>8} events", session.id, started, session.event_count);
}

fn sessions(store: &LogStore) -> Result<(), AnyError> {
    for session in store.list_sessions()? {
        print_session(&session);
    }
    Ok(())
}

fn export_records(store: &LogStore, args: ExportArgs) -> Result<(), AnyError> {
    let criteria = FilterCriteria::new()
        .with_sessions(args.session)
        .with_severities(args.severity);

    let written = match args.output {
        Some(path) => {
            let mut out = BufWriter::new(File::create(&path)?);
            let written = export::export_lines(store, &criteria, args.batch_size, &mut out)?;
            info!(path = %path.display(), written, "Export finished");
            written
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            export::export_lines(store, &criteria, args.batch_size, &mut out)?
        }
    };
    eprintln!("exported {} records", written);
    Ok(())
}

async fn search(
    store: &LogStore,
    config: &Config,
    metrics: Arc<Metrics>,
    args: SearchArgs,
) -> Result<(), AnyError> {
    let scope = if args.session.is_empty() {
        SessionScope::All
    } else {
        SessionScope::selected(args.session)
    };
    let (engine, mut updates) =
        DeepSearch::new(Arc::new(store.clone()), config.search.clone(), metrics);
    engine.start_search(SearchRequest::new(args.text).with_scope(scope));

    let mut results = None;
    while let Some(update) = updates.recv().await {
        eprintln!("{}", update.phase);
        match &update.phase {
            SearchPhase::PreviewCompleted {
                has_more_sessions: true,
                ..
            } if args.full => {
                engine.request_full_search();
            }
            SearchPhase::PreviewCompleted { .. } => {
                results = Some(update.results);
                break;
            }
            phase if phase.is_terminal() => {
                results = Some(update.results);
                break;
            }
            _ => {}
        }
    }

    let Some(results) = results else {
        return Ok(());
    };
    let mut out = io::stdout().lock();
    for record in results.records.iter().take(args.show) {
        writeln!(out, "{}", export::format_line(record))?;
    }
    if !results.messages.is_empty() {
        writeln!(out, "\nTop messages:")?;
        for m in &results.messages {
            writeln!(out, "{:>6}  {}", m.count, m.latest.message)?;
        }
    }
    for (label, values) in [
        ("Files", &results.file_names),
        ("Functions", &results.functions),
        ("Contexts", &results.contexts),
        ("Threads", &results.threads),
    ] {
        if values.is_empty() {
            continue;
        }
        writeln!(out, "\n{}:", label)?;
        for v in values {
            writeln!(out, "{:>6}  {}", v.count, v.value)?;
        }
    }
    Ok(())
}

fn delete_scope(args: DeleteArgs) -> Result<DeleteScope, AnyError> {
    let chosen = [
        !args.session.is_empty(),
        args.before_days.is_some(),
        args.date.is_some(),
        args.all,
    ]
    .iter()
    .filter(|set| **set)
    .count();
    if chosen != 1 {
        return Err("choose exactly one of --session, --before-days, --date, --all".into());
    }

    let scope = if args.all {
        DeleteScope::All
    } else if let Some(days) = args.before_days {
        DeleteScope::Before(now_secs() - days as f64 * 86_400.0)
    } else if let Some(date) = args.date {
        DeleteScope::DateBucket {
            date,
            hour: args.hour,
        }
    } else if args.session.len() == 1 {
        DeleteScope::Session(args.session[0].clone())
    } else {
        DeleteScope::Sessions(args.session)
    };
    Ok(scope)
}
