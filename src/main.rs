use std::io::Write;
use std::path::PathBuf;
use versemap::chat::{backend_from_config, Conversation, Persona};
use versemap::cli::{Cli, Commands, ConfigAction};
use versemap::config::{Config, ConfigValidator};
use versemap::corpus::{find_book, CorpusEntry, Testament, Translation};
use versemap::error::{Result, VersemapError};
use versemap::retrieval::{FilterSet, SearchMode, SearchOutcome};
use versemap::session::SearchSession;

fn main() -> Result<()> {
    let cli = Cli::parse_args();

    init_logging(cli.verbose);

    match cli.command {
        Commands::Search {
            query,
            mode,
            books,
            testament,
            translation,
            preview,
            json,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            let filter = build_filter(&books, testament)?;
            run_async(cmd_search(
                config,
                &query,
                mode,
                filter,
                translation,
                preview,
                json,
            ))?;
        }
        Commands::Inspect { reference } => {
            let config = load_config(cli.config, cli.profile)?;
            run_async(cmd_inspect(config, reference))?;
        }
        Commands::Chat {
            question,
            persona,
            book,
            chapter,
        } => {
            let config = load_config(cli.config, cli.profile)?;
            run_async(cmd_chat(config, &question, persona, book, chapter))?;
        }
        Commands::Config { action } => {
            cmd_config(cli.config, action)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let default = if verbose {
        "versemap=debug"
    } else {
        "versemap=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_async<F: std::future::Future<Output = Result<()>>>(future: F) -> Result<()> {
    let rt = tokio::runtime::Runtime::new().map_err(|e| VersemapError::Io {
        source: e,
        context: "Failed to create tokio runtime".to_string(),
    })?;
    rt.block_on(future)
}

fn build_filter(books: &[String], testament: Option<Testament>) -> Result<FilterSet> {
    if let Some(testament) = testament {
        return Ok(FilterSet::testament(testament));
    }
    if books.is_empty() {
        return Ok(FilterSet::all());
    }

    let mut nums = Vec::with_capacity(books.len());
    for name in books {
        let num = match name.trim().parse::<u8>() {
            Ok(n) => versemap::corpus::book(n).map(|b| b.num),
            Err(_) => find_book(name).map(|b| b.num),
        };
        match num {
            Some(n) => nums.push(n),
            None => {
                return Err(VersemapError::InvalidConfigValue {
                    path: "--books".to_string(),
                    message: format!("Unknown book: {}", name),
                })
            }
        }
    }
    Ok(FilterSet::from_books(nums))
}

async fn cmd_search(
    config: Config,
    query: &str,
    mode: SearchMode,
    filter: FilterSet,
    translation: Option<Translation>,
    preview: usize,
    json: bool,
) -> Result<()> {
    let session = SearchSession::from_config(&config)?;
    if let Some(translation) = translation {
        session.set_translation(translation);
    }
    session.set_filter(filter);

    if !session.accepts_query(query) {
        print_status(&SearchOutcome::Empty, json);
        return Ok(());
    }

    let (assets, encoder) = tokio::join!(
        session.load_search_assets(),
        session.initialize_encoder(&config.embedding)
    );
    encoder?;
    assets?;

    let outcome = session.search(query, mode).await?;

    if json {
        if let SearchOutcome::Ranked(results) = &outcome {
            let value = serde_json::to_value(results).map_err(|e| VersemapError::Json {
                source: e,
                context: "Failed to serialize results".to_string(),
            })?;
            println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
            return Ok(());
        }
    }

    match outcome {
        SearchOutcome::Ranked(results) => {
            println!(
                "{} {} for {:?} ({} of {} candidates, {})",
                results.entries.len(),
                results.mode,
                query,
                results.filtered_count,
                results.candidate_count,
                session.filter().label()
            );
            println!();
            for entry in &results.entries {
                match &entry.title {
                    Some(title) => println!(
                        "{:>2}. {} - {} [{}%]",
                        entry.rank, entry.reference, title, entry.relevance_percent
                    ),
                    None => println!(
                        "{:>2}. {} [{}%]",
                        entry.rank, entry.reference, entry.relevance_percent
                    ),
                }
                println!("    {}", entry.preview(preview));
            }
            if let Some(aim) = results.aim {
                println!();
                println!(
                    "Aim: ({:.3}, {:.3}, {:.3}) azimuth {:.1}°, {} highlights",
                    aim.centroid.x,
                    aim.centroid.y,
                    aim.centroid.z,
                    aim.azimuth.to_degrees(),
                    results.highlights.len()
                );
            }
        }
        other => print_status(&other, json),
    }

    Ok(())
}

fn print_status(outcome: &SearchOutcome, json: bool) {
    if json {
        println!("{}", serde_json::json!({ "status": outcome_status(outcome) }));
    } else {
        println!("{}", outcome_status(outcome));
    }
}

fn outcome_status(outcome: &SearchOutcome) -> String {
    match outcome {
        SearchOutcome::Ranked(results) => format!("{} results", results.entries.len()),
        SearchOutcome::NoResults => "No results for the selected books".to_string(),
        SearchOutcome::Empty => "Empty query".to_string(),
        SearchOutcome::Unavailable(reason) => reason.to_string(),
        SearchOutcome::Superseded => "Superseded".to_string(),
    }
}

async fn cmd_inspect(config: Config, reference: Option<String>) -> Result<()> {
    let session = SearchSession::from_config(&config)?;
    let assets = session.load_search_assets().await?;

    println!("Assets: {}", config.assets.base);
    println!(
        "  Verses:   {} ({} embeddings, alternate text: {})",
        assets.verses.len(),
        assets.verse_store.item_count(),
        if assets.verses.has_alternates() {
            "yes"
        } else {
            "no"
        }
    );
    println!(
        "  Passages: {} ({} embeddings)",
        assets.passages.len(),
        assets.passage_store.item_count()
    );
    println!("  Dimension: {}", assets.verse_store.dimension());

    if let Some(reference) = reference {
        let verse = assets.verses.find_reference(&reference).ok_or_else(|| {
            VersemapError::InvalidConfigValue {
                path: "--reference".to_string(),
                message: format!("No verse {}", reference),
            }
        })?;

        println!();
        println!("{} (#{}, {})", verse.reference, verse.id, verse.testament);
        println!("  KJV: {}", verse.display_text(Translation::Kjv));
        if let Some(alt) = &verse.alternate_text {
            println!("  BSB: {}", alt);
        }
        println!(
            "  Sphere: ({:.3}, {:.3}, {:.3})",
            verse.position.x, verse.position.y, verse.position.z
        );
        for passage in assets.passages.containing_verse(verse.id) {
            println!("  In passage: {} ({})", passage.title, passage.reference);
        }
    }

    Ok(())
}

async fn cmd_chat(
    config: Config,
    question: &str,
    persona: Option<Persona>,
    book: Option<String>,
    chapter: Option<u32>,
) -> Result<()> {
    let persona = match persona {
        Some(p) => p,
        None => config
            .chat
            .persona
            .parse()
            .map_err(|message| VersemapError::InvalidConfigValue {
                path: "chat.persona".to_string(),
                message,
            })?,
    };
    let backend = backend_from_config(&config.chat)?;

    let mut conversation = match (book, chapter) {
        (Some(book), Some(chapter)) => {
            let text = chapter_text(&config, &book, chapter).await?;
            Conversation::reading(persona, &book, chapter, &text)
        }
        _ => Conversation::new(persona),
    };

    let mut stdout = std::io::stdout();
    conversation
        .ask(backend.as_ref(), question, &mut |delta: &str| {
            print!("{}", delta);
            stdout.flush().ok();
        })
        .await?;
    println!();

    Ok(())
}

/// Numbered verse lines of one chapter, for reader-grounded chat
async fn chapter_text(config: &Config, book: &str, chapter: u32) -> Result<String> {
    let book = find_book(book).ok_or_else(|| VersemapError::InvalidConfigValue {
        path: "--book".to_string(),
        message: format!("Unknown book: {}", book),
    })?;

    let session = SearchSession::from_config(config)?;
    let assets = session.load_search_assets().await?;

    let prefix = format!("{} {}:", book.name, chapter);
    let lines: Vec<String> = assets
        .verses
        .iter()
        .filter(|v| v.book_num == book.num)
        .filter_map(|v| {
            v.reference
                .strip_prefix(&prefix)
                .map(|verse| format!("{} {}", verse, v.display_text(session.translation())))
        })
        .collect();

    if lines.is_empty() {
        return Err(VersemapError::InvalidConfigValue {
            path: "--chapter".to_string(),
            message: format!("{} has no chapter {}", book.name, chapter),
        });
    }
    Ok(lines.join("\n"))
}

fn cmd_config(config_path: Option<PathBuf>, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show { section } => {
            let config = load_config(config_path, None)?;
            let value = serde_json::to_value(&config).map_err(|e| VersemapError::Json {
                source: e,
                context: "Failed to serialize config".to_string(),
            })?;

            let shown = match section {
                Some(section) => value.get(&section).cloned().ok_or_else(|| {
                    VersemapError::Config(format!("Unknown config section: {}", section))
                })?,
                None => value,
            };

            println!(
                "{}",
                serde_json::to_string_pretty(&shown).unwrap_or_default()
            );
        }
        ConfigAction::Validate { file } => {
            let path = match file.or(config_path) {
                Some(p) => p,
                None => Config::default_path()?,
            };
            let config = Config::load(&path)?;
            ConfigValidator::validate(&config)?;
            println!("✓ Configuration is valid");
            println!("  Schema version: {}", config.meta.schema_version);
        }
        ConfigAction::Init { force } => {
            let path = match config_path {
                Some(p) => p,
                None => Config::default_path()?,
            };

            if path.exists() && !force {
                println!("Configuration file already exists at: {}", path.display());
                println!("Use --force to overwrite");
                return Ok(());
            }

            Config::default().save(&path)?;
            println!("✓ Configuration initialized at: {}", path.display());
        }
    }

    Ok(())
}

fn load_config(config_path: Option<PathBuf>, profile: Option<String>) -> Result<Config> {
    let path = match config_path {
        Some(p) => p,
        None => Config::default_path()?,
    };

    if !path.exists() {
        tracing::warn!(
            "Config file not found, using defaults. Run 'versemap config init' to create one."
        );
        return Config::load_or_default(Some(&path));
    }

    match profile {
        Some(profile) => Config::load_with_profile(&path, &profile),
        None => Config::load(&path),
    }
}
