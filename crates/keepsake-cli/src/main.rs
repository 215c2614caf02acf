//! Keepsake CLI - offline-first photo journaling from the terminal
//!
//! Capture photos (with optional voice notes) locally, then sync them when
//! the network allows.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use clap::{CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::aot::Generator;
use clap_complete::{generate, shells};
use keepsake_core::config::AppPaths;
use keepsake_core::media::{analyze_wav, generate_thumbnail, ThumbnailOptions, WAVEFORM_BUCKETS};
use keepsake_core::models::{EntityKind, VoiceClip, Visibility};
use keepsake_core::remote::{
    ApiConfig, HttpRecordStore, ObjectStore, ObjectStoreConfig, RecordStore, S3ObjectStore,
};
use keepsake_core::sync::{
    ChangeListener, EventBus, ListenerState, OutboxEngine, PullEngine, SyncEvent,
};
use keepsake_core::{CapturedItem, Collection, CollectionId, ItemId, LocalStore, SyncState};
use serde::Serialize;
use thiserror::Error;

#[derive(Parser)]
#[command(name = "keepsake")]
#[command(about = "Offline-first photo journal with voice notes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional data directory (database and media files)
    #[arg(long, global = true, value_name = "PATH")]
    data_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture a photo
    #[command(alias = "capture")]
    Add {
        /// Path to the photo file
        image: PathBuf,
        /// Caption text
        caption: Vec<String>,
        /// Attach a voice note (WAV)
        #[arg(long, value_name = "PATH")]
        voice: Option<PathBuf>,
        /// Attach to a collection by ID
        #[arg(long, value_name = "ID")]
        collection: Option<String>,
        /// Publish to the shared feed
        #[arg(long)]
        shared: bool,
    },
    /// List recent items
    List {
        /// Number of items to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List collections
    Collections {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Create a new collection
    NewCollection {
        /// Collection name
        name: String,
        /// Optional description
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete an item (and its remote copy, when configured)
    Delete {
        /// Item ID or unique ID prefix
        id: String,
    },
    /// Delete a collection; contained items survive, detached
    DeleteCollection {
        /// Collection ID
        id: String,
    },
    /// Upload everything pending to the remote stores
    Sync,
    /// Fetch and merge remote changes
    Pull,
    /// Stay connected and apply live changes until interrupted
    Listen,
    /// Show queue and checkpoint state
    Status,
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Core(#[from] keepsake_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Item not found for id/prefix: {0}")]
    ItemNotFound(String),
    #[error("{0}")]
    AmbiguousItemId(String),
    #[error("Invalid collection ID: {0}")]
    InvalidCollectionId(String),
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),
    #[error(
        "Sync is not configured. Set KEEPSAKE_API_URL, KEEPSAKE_API_TOKEN and the KEEPSAKE_STORAGE_* variables to enable remote operations."
    )]
    SyncNotConfigured,
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("keepsake=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let paths = cli.data_dir.map_or_else(AppPaths::from_env, |data_dir| {
        AppPaths { data_dir }
    });

    match cli.command {
        Commands::Add {
            image,
            caption,
            voice,
            collection,
            shared,
        } => {
            run_add(
                &image,
                &caption,
                voice.as_deref(),
                collection.as_deref(),
                shared,
                &paths,
            )
            .await?;
        }
        Commands::List { limit, json } => run_list(limit, json, &paths).await?,
        Commands::Collections { json } => run_collections(json, &paths).await?,
        Commands::NewCollection { name, description } => {
            run_new_collection(&name, description, &paths).await?;
        }
        Commands::Delete { id } => run_delete(&id, &paths).await?,
        Commands::DeleteCollection { id } => run_delete_collection(&id, &paths).await?,
        Commands::Sync => run_sync(&paths).await?,
        Commands::Pull => run_pull(&paths).await?,
        Commands::Listen => run_listen(&paths).await?,
        Commands::Status => run_status(&paths).await?,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref())?,
    }

    Ok(())
}

async fn open_store(paths: &AppPaths) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open(paths.db_path(), paths.media_dir()).await?)
}

#[allow(clippy::type_complexity)]
fn build_remotes() -> Result<(Arc<dyn RecordStore>, Arc<dyn ObjectStore>), CliError> {
    let api = ApiConfig::from_env()?.ok_or(CliError::SyncNotConfigured)?;
    let storage = ObjectStoreConfig::from_env()?.ok_or(CliError::SyncNotConfigured)?;
    Ok((
        Arc::new(HttpRecordStore::new(api)?),
        Arc::new(S3ObjectStore::new(storage)),
    ))
}

async fn run_add(
    image: &Path,
    caption_parts: &[String],
    voice: Option<&Path>,
    collection: Option<&str>,
    shared: bool,
    paths: &AppPaths,
) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let caption = caption_parts.join(" ").trim().to_string();
    let mut item = CapturedItem::new(image, caption);

    if shared {
        item = item.with_visibility(Visibility::Shared);
    }

    if let Some(raw) = collection {
        let id: CollectionId = raw
            .trim()
            .parse()
            .map_err(|_| CliError::InvalidCollectionId(raw.to_string()))?;
        store
            .get_collection(&id)
            .await?
            .ok_or_else(|| CliError::CollectionNotFound(raw.to_string()))?;
        item = item.with_collection(id);
    }

    if let Some(voice_path) = voice {
        let bytes = std::fs::read(voice_path)?;
        let analysis = analyze_wav(&bytes, WAVEFORM_BUCKETS)?;
        item = item.with_voice(
            VoiceClip::new(voice_path, analysis.duration_ms).with_waveform(analysis.waveform),
        );
    }

    // A photo that defeats the thumbnailer is still worth keeping.
    let image_bytes = std::fs::read(&item.image_path)?;
    match generate_thumbnail(&image_bytes, ThumbnailOptions::default()) {
        Ok(thumbnail) => {
            let dir = store.media_dir().join("items").join(item.id.as_str());
            std::fs::create_dir_all(&dir)?;
            let path = dir.join("thumb.jpg");
            std::fs::write(&path, &thumbnail.bytes)?;
            item.thumbnail_path = Some(path);
        }
        Err(error) => tracing::warn!("Thumbnail generation failed: {error}"),
    }

    store.create_item(&item).await?;
    println!("{}", item.id);
    Ok(())
}

#[derive(Debug, Serialize)]
struct ItemListEntry {
    id: String,
    caption: String,
    sync_state: String,
    visibility: String,
    has_voice: bool,
    collection_id: Option<String>,
    created_at: i64,
    updated_at: i64,
    relative_time: String,
}

fn item_to_list_entry(item: &CapturedItem, now_ms: i64) -> ItemListEntry {
    ItemListEntry {
        id: item.id.as_str(),
        caption: item.caption.clone(),
        sync_state: item.sync_state.to_string(),
        visibility: item.visibility.to_string(),
        has_voice: item.voice.is_some(),
        collection_id: item.collection_id.map(|id| id.as_str()),
        created_at: item.created_at,
        updated_at: item.updated_at,
        relative_time: format_relative_time(item.updated_at, now_ms),
    }
}

async fn run_list(limit: usize, as_json: bool, paths: &AppPaths) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let items = store.list_items(limit, 0).await?;
    let now_ms = Utc::now().timestamp_millis();

    if as_json {
        let entries: Vec<ItemListEntry> = items
            .iter()
            .map(|item| item_to_list_entry(item, now_ms))
            .collect();
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for line in format_item_lines(&items, now_ms) {
            println!("{line}");
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct CollectionListEntry {
    id: String,
    name: String,
    description: Option<String>,
    sync_state: String,
    items: usize,
}

async fn run_collections(as_json: bool, paths: &AppPaths) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let collections = store.list_collections().await?;

    let mut entries = Vec::with_capacity(collections.len());
    for collection in &collections {
        entries.push(CollectionListEntry {
            id: collection.id.as_str(),
            name: collection.name.clone(),
            description: collection.description.clone(),
            sync_state: collection.sync_state.to_string(),
            items: store.collection_item_count(&collection.id).await?,
        });
    }

    if as_json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else {
        for entry in &entries {
            let short_id = entry.id.chars().take(13).collect::<String>();
            println!(
                "{short_id:<13}  {:<24}  {:>3} items  [{}]",
                entry.name, entry.items, entry.sync_state
            );
        }
    }
    Ok(())
}

async fn run_new_collection(
    name: &str,
    description: Option<String>,
    paths: &AppPaths,
) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let collection = Collection::new(name, description)?;
    store.create_collection(&collection).await?;
    println!("{}", collection.id);
    Ok(())
}

async fn run_delete(id: &str, paths: &AppPaths) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let item = resolve_item(&store, id.trim()).await?;

    // Remote cleanup is best-effort and needs configuration; a purely local
    // install still gets the local delete.
    match build_remotes() {
        Ok((records, objects)) => {
            let outbox = OutboxEngine::new(store, records, objects, EventBus::new());
            outbox.delete_item(&item.id).await?;
        }
        Err(CliError::SyncNotConfigured) => {
            store.delete_item(&item.id).await?;
        }
        Err(error) => return Err(error),
    }

    println!("{}", item.id);
    Ok(())
}

async fn run_delete_collection(id: &str, paths: &AppPaths) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let collection_id: CollectionId = id
        .trim()
        .parse()
        .map_err(|_| CliError::InvalidCollectionId(id.to_string()))?;
    store
        .get_collection(&collection_id)
        .await?
        .ok_or_else(|| CliError::CollectionNotFound(id.to_string()))?;

    match build_remotes() {
        Ok((records, objects)) => {
            let outbox = OutboxEngine::new(store, records, objects, EventBus::new());
            outbox.delete_collection(&collection_id).await?;
        }
        Err(CliError::SyncNotConfigured) => {
            store
                .remove_entity(EntityKind::Collection, &collection_id.as_str())
                .await?;
        }
        Err(error) => return Err(error),
    }

    println!("{collection_id}");
    Ok(())
}

async fn run_sync(paths: &AppPaths) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let (records, objects) = build_remotes()?;
    let outbox = OutboxEngine::new(store, records, objects, EventBus::new());

    let report = outbox.drain_pending().await?;
    println!(
        "Synced {} of {} ({} requeued, {} failed)",
        report.synced,
        report.attempted,
        report.requeued,
        report.failures.len()
    );
    for failure in &report.failures {
        eprintln!("  failed {} {}: {}", failure.entity, failure.id, failure.message);
    }
    Ok(())
}

async fn run_pull(paths: &AppPaths) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let (records, objects) = build_remotes()?;
    let engine = PullEngine::new(store, records, objects, EventBus::new());

    let report = engine.pull_all().await?;
    println!(
        "Pulled {} ({} new, {} updated, {} stale, {} failed)",
        report.fetched,
        report.created,
        report.updated,
        report.skipped_stale,
        report.failures.len()
    );
    Ok(())
}

async fn run_listen(paths: &AppPaths) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let (records, objects) = build_remotes()?;
    let events = EventBus::new();
    let listener = ChangeListener::new(store, records, objects, events.clone());

    let mut bus = events.subscribe();
    listener.start().await?;
    let mut state = listener.state();
    println!("Listening for changes (Ctrl-C to stop)");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = bus.recv() => {
                if let Ok(event) = event {
                    print_sync_event(&event);
                }
            }
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("[{current:?}]");
                if current == ListenerState::Disconnected {
                    break;
                }
            }
        }
    }

    listener.stop().await;
    Ok(())
}

fn print_sync_event(event: &SyncEvent) {
    match event {
        SyncEvent::EntityChanged { entity, id } => println!("changed {entity} {id}"),
        SyncEvent::EntityRemoved { entity, id } => println!("removed {entity} {id}"),
        SyncEvent::OutboxDrained { synced, failed } => {
            println!("drained (synced {synced}, failed {failed})");
        }
        SyncEvent::PullCompleted { applied } => println!("pulled (applied {applied})"),
    }
}

async fn run_status(paths: &AppPaths) -> Result<(), CliError> {
    let store = open_store(paths).await?;
    let items = store.list_items(1_000, 0).await?;

    let count_state = |state: SyncState| items.iter().filter(|item| item.sync_state == state).count();
    println!("Items: {} total", items.len());
    println!("  pending: {}", count_state(SyncState::Pending));
    println!("  syncing: {}", count_state(SyncState::Syncing));
    println!("  synced:  {}", count_state(SyncState::Synced));
    println!("  failed:  {}", count_state(SyncState::Failed));
    println!("Collections: {}", store.list_collections().await?.len());

    for entity in [EntityKind::Item, EntityKind::Collection] {
        match store.checkpoint(entity).await? {
            Some(checkpoint) => println!("Checkpoint ({entity}): {checkpoint}"),
            None => println!("Checkpoint ({entity}): never pulled"),
        }
    }
    Ok(())
}

fn run_completions(shell: CompletionShell, output_path: Option<&Path>) -> Result<(), CliError> {
    let mut command = Cli::command();
    let mut buffer = Vec::new();

    match shell {
        CompletionShell::Bash => generate_for_shell(shells::Bash, &mut command, &mut buffer),
        CompletionShell::Zsh => generate_for_shell(shells::Zsh, &mut command, &mut buffer),
        CompletionShell::Fish => generate_for_shell(shells::Fish, &mut command, &mut buffer),
    }

    if let Some(path) = output_path {
        std::fs::write(path, &buffer)?;
        println!("{}", path.display());
    } else {
        io::stdout().write_all(&buffer)?;
    }
    Ok(())
}

fn generate_for_shell<G: Generator>(
    generator: G,
    command: &mut clap::Command,
    buffer: &mut Vec<u8>,
) {
    generate(generator, command, "keepsake", buffer);
}

async fn resolve_item(store: &LocalStore, query: &str) -> Result<CapturedItem, CliError> {
    if query.is_empty() {
        return Err(CliError::ItemNotFound(query.to_string()));
    }

    if let Ok(id) = query.parse::<ItemId>() {
        if let Some(item) = store.get_item(&id).await? {
            return Ok(item);
        }
    }

    let mut matches: Vec<CapturedItem> = store
        .list_items(500, 0)
        .await?
        .into_iter()
        .filter(|item| item.id.as_str().starts_with(query))
        .collect();

    match matches.len() {
        0 => Err(CliError::ItemNotFound(query.to_string())),
        1 => Ok(matches.swap_remove(0)),
        _ => {
            let options = matches
                .iter()
                .take(3)
                .map(|item| item.id.as_str().chars().take(13).collect::<String>())
                .collect::<Vec<_>>()
                .join(", ");
            Err(CliError::AmbiguousItemId(format!(
                "ID prefix '{query}' is ambiguous; matches: {options}"
            )))
        }
    }
}

fn format_item_lines(items: &[CapturedItem], now_ms: i64) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let id = item.id.as_str();
            let short_id = id.chars().take(13).collect::<String>();
            let preview = caption_preview(&item.caption, 40);
            let relative_time = format_relative_time(item.updated_at, now_ms);
            let voice_marker = if item.voice.is_some() { "♪" } else { " " };

            format!(
                "{short_id:<13}  {preview:<40} {voice_marker} [{:<7}]  {relative_time}",
                item.sync_state
            )
        })
        .collect()
}

fn caption_preview(caption: &str, max_chars: usize) -> String {
    let first_line = caption.lines().next().unwrap_or("").trim();
    let collapsed = first_line.split_whitespace().collect::<Vec<_>>().join(" ");

    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use tempfile::tempdir;

    use super::*;

    async fn test_store(tmp: &tempfile::TempDir) -> LocalStore {
        let paths = AppPaths {
            data_dir: tmp.path().join("data"),
        };
        LocalStore::open(paths.db_path(), paths.media_dir())
            .await
            .unwrap()
    }

    #[test]
    fn caption_preview_truncates_with_ellipsis() {
        let preview = caption_preview("This is a very long caption that should be shortened", 20);
        assert_eq!(preview, "This is a very lo...");
    }

    #[test]
    fn caption_preview_collapses_whitespace() {
        assert_eq!(caption_preview("  two\n lines  here ", 40), "two");
    }

    #[test]
    fn format_relative_time_units() {
        let now = 10_000_000;
        assert_eq!(format_relative_time(now - 30_000, now), "just now");
        assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
        assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_item_supports_exact_and_prefix_id() {
        let tmp = tempdir().unwrap();
        let store = test_store(&tmp).await;

        let mut item_a = CapturedItem::new("photos/a.jpg", "Item A");
        item_a.id = "11111111-1111-7111-8111-111111111111".parse().unwrap();
        let mut item_b = CapturedItem::new("photos/b.jpg", "Item B");
        item_b.id = "11111111-1111-7111-8111-222222222222".parse().unwrap();
        store.create_item(&item_a).await.unwrap();
        store.create_item(&item_b).await.unwrap();

        let by_exact = resolve_item(&store, "11111111-1111-7111-8111-111111111111")
            .await
            .unwrap();
        assert_eq!(by_exact.caption, "Item A");

        let by_prefix = resolve_item(&store, "11111111-1111-7111-8111-2")
            .await
            .unwrap();
        assert_eq!(by_prefix.caption, "Item B");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn resolve_item_rejects_ambiguous_prefix_and_missing_item() {
        let tmp = tempdir().unwrap();
        let store = test_store(&tmp).await;

        let mut item_a = CapturedItem::new("photos/a.jpg", "Left");
        item_a.id = "aaaaaaaa-aaaa-7aaa-8aaa-aaaaaaaaaaaa".parse().unwrap();
        let mut item_b = CapturedItem::new("photos/b.jpg", "Right");
        item_b.id = "aaaaaaaa-aaaa-7aaa-8aaa-bbbbbbbbbbbb".parse().unwrap();
        store.create_item(&item_a).await.unwrap();
        store.create_item(&item_b).await.unwrap();

        assert!(matches!(
            resolve_item(&store, "aaaaaaaa-aaaa-7aaa-8aaa").await.unwrap_err(),
            CliError::AmbiguousItemId(_)
        ));
        assert!(matches!(
            resolve_item(&store, "does-not-exist").await.unwrap_err(),
            CliError::ItemNotFound(_)
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_attaches_collection_and_voice() {
        let tmp = tempdir().unwrap();
        let paths = AppPaths {
            data_dir: tmp.path().join("data"),
        };
        let store = LocalStore::open(paths.db_path(), paths.media_dir())
            .await
            .unwrap();

        let collection = Collection::new("Walks", None).unwrap();
        store.create_collection(&collection).await.unwrap();

        let image = tmp.path().join("photo.jpg");
        std::fs::write(&image, b"not-really-a-jpeg").unwrap();
        let voice = tmp.path().join("note.wav");
        std::fs::write(&voice, wav_fixture()).unwrap();

        run_add(
            &image,
            &["morning".to_string(), "walk".to_string()],
            Some(&voice),
            Some(&collection.id.as_str()),
            true,
            &paths,
        )
        .await
        .unwrap();

        let items = store.list_items(10, 0).await.unwrap();
        assert_eq!(items.len(), 1);
        let item = &items[0];
        assert_eq!(item.caption, "morning walk");
        assert_eq!(item.collection_id, Some(collection.id));
        assert_eq!(item.visibility, Visibility::Shared);
        assert_eq!(item.sync_state, SyncState::Pending);
        let clip = item.voice.as_ref().unwrap();
        assert_eq!(clip.duration_ms, 1_000);
        assert!(clip.waveform.is_some());
        // Unreadable image: no thumbnail, but the capture still lands.
        assert!(item.thumbnail_path.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn add_rejects_unknown_collection() {
        let tmp = tempdir().unwrap();
        let paths = AppPaths {
            data_dir: tmp.path().join("data"),
        };
        let image = tmp.path().join("photo.jpg");
        std::fs::write(&image, b"jpeg").unwrap();

        let missing = CollectionId::new();
        let err = run_add(&image, &[], None, Some(&missing.as_str()), false, &paths)
            .await
            .unwrap_err();
        assert!(matches!(err, CliError::CollectionNotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_collection_detaches_items_locally() {
        let tmp = tempdir().unwrap();
        let paths = AppPaths {
            data_dir: tmp.path().join("data"),
        };
        let store = LocalStore::open(paths.db_path(), paths.media_dir())
            .await
            .unwrap();

        let collection = Collection::new("Trips", None).unwrap();
        store.create_collection(&collection).await.unwrap();
        let item = CapturedItem::new("photos/a.jpg", "beach").with_collection(collection.id);
        store.create_item(&item).await.unwrap();

        run_delete_collection(&collection.id.as_str(), &paths)
            .await
            .unwrap();

        assert!(store.get_collection(&collection.id).await.unwrap().is_none());
        let survivor = store.get_item(&item.id).await.unwrap().unwrap();
        assert_eq!(survivor.collection_id, None);
    }

    fn wav_fixture() -> Vec<u8> {
        // One second of silence, 16 kHz mono PCM16. Hand-built header to
        // avoid a dev-dependency on an encoder here.
        let sample_rate: u32 = 16_000;
        let data_len: u32 = sample_rate * 2;
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"RIFF");
        bytes.extend_from_slice(&(36 + data_len).to_le_bytes());
        bytes.extend_from_slice(b"WAVE");
        bytes.extend_from_slice(b"fmt ");
        bytes.extend_from_slice(&16u32.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&1u16.to_le_bytes());
        bytes.extend_from_slice(&sample_rate.to_le_bytes());
        bytes.extend_from_slice(&(sample_rate * 2).to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&16u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        bytes.extend_from_slice(&data_len.to_le_bytes());
        bytes.resize(bytes.len() + data_len as usize, 0);
        bytes
    }
}
