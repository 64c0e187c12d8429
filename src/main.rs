use std::future::Future;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use preset_downloads::presets::EXPORT_FILE_NAME;
use preset_downloads::{AppState, SettingsManager, TracingReporter};
use tracing::metadata::LevelFilter;

const USAGE: &str = "usage: preset-downloads <command>

commands:
  list                      presets grouped by category
  download <id>             download every model of one preset
  download-selected <id>..  download several presets in one batch
  delete <id>               remove a preset
  import <file>             replace all presets with a JSON document
  export [file]             write all presets as JSON
  edit <file>               apply a hand-edited preset document
  search <query> [limit]    search the model hub";

fn setup_logging() {
    let filter = std::env::var("PDM_LOG")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(LevelFilter::INFO);

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(filter)
        .with_target(false)
        .compact()
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    setup_logging();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some((command, rest)) = args.split_first() else {
        println!("{USAGE}");
        return Ok(ExitCode::SUCCESS);
    };

    let settings = SettingsManager::new()?.effective();
    tracing::debug!(server = %settings.server_url, "loaded settings");
    let state = Arc::new(AppState::from_settings(&settings)?);

    tokio::select! {
        outcome = run(&state, command, rest) => outcome.map(|()| ExitCode::SUCCESS),
        () = until_interrupted(&state, ctrl_c) => {
            tracing::warn!("interrupted");
            Ok(ExitCode::from(130))
        }
    }
}

async fn ctrl_c() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::warn!("cannot listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
}

/// Resolves when the command should be abandoned. A first interrupt during a
/// batch only cancels it so the summary still prints; a second one stops.
async fn until_interrupted<F, Fut>(state: &AppState, mut next_signal: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    next_signal().await;
    if state.cancel_active_batch() {
        tracing::warn!("interrupt received, finishing current request; press Ctrl-C again to quit");
        next_signal().await;
    }
}

async fn run(state: &AppState, command: &str, rest: &[String]) -> Result<()> {
    match (command, rest) {
        ("list", []) => {
            let stats = state.catalog().stats().await?;
            println!("{} categories, {} presets", stats.categories, stats.presets);
            for (category, presets) in state.catalog().grouped_by_category().await? {
                println!("{category}");
                for preset in presets {
                    println!("  {}  {} ({} models)", preset.id, preset.label(), preset.models.len());
                }
            }
        }
        ("download", [id]) => {
            let report = state.download_preset(id, &TracingReporter).await?;
            println!("{}", report.summary());
        }
        ("download-selected", ids) if !ids.is_empty() => {
            for id in ids {
                state.set_selected(id, true);
            }
            let report = state.download_selected(&TracingReporter).await?;
            println!("{}", report.summary());
        }
        ("delete", [id]) => {
            state.delete_preset(id).await?;
            println!("Deleted {id}");
        }
        ("import", [file]) => {
            let text = read_text(file).await?;
            let (count, _) = state.import_json(&text).await?;
            println!("Imported {count} preset(s)");
        }
        ("export", rest) if rest.len() <= 1 => {
            let path = rest
                .first()
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(EXPORT_FILE_NAME));
            let json = state.export_json().await?;
            tokio::fs::write(&path, json)
                .await
                .with_context(|| format!("write export to {path:?}"))?;
            println!("Exported to {}", path.display());
        }
        ("edit", [file]) => {
            let text = read_text(file).await?;
            state.apply_raw_edit(&text).await?;
            println!("Preset document updated");
        }
        ("search", [query, limit @ ..]) if limit.len() <= 1 => {
            let limit = match limit.first() {
                Some(value) => value.parse().context("limit must be a number")?,
                None => 20,
            };
            for model in state.search_models(query, limit).await? {
                println!(
                    "{}  downloads={} likes={}",
                    model.repo_id(),
                    model.downloads.unwrap_or_default(),
                    model.likes.unwrap_or_default()
                );
            }
        }
        _ => bail!("unrecognized command `{command}`\n\n{USAGE}"),
    }
    Ok(())
}

async fn read_text(file: &str) -> Result<String> {
    tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed reading {file}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use preset_downloads::download::{
        ArtifactDownloader, BatchCompletion, BatchLimits, RawResponse, TransportError,
    };
    use preset_downloads::presets::{ArtifactSpec, FilePresetStore, PresetDraft};
    use std::time::Duration;
    use tokio::sync::Notify;

    struct Stalled;

    #[async_trait]
    impl ArtifactDownloader for Stalled {
        async fn download(&self, _spec: &ArtifactSpec) -> Result<RawResponse, TransportError> {
            std::future::pending().await
        }
    }

    fn stalled_state(dir: &tempfile::TempDir) -> Arc<AppState> {
        let store = Arc::new(FilePresetStore::new(dir.path().join("presets.json")));
        Arc::new(AppState::new(store, Arc::new(Stalled), BatchLimits::default()))
    }

    #[tokio::test]
    async fn interrupt_without_batch_stops_at_once() {
        let dir = tempfile::tempdir().unwrap();
        let state = stalled_state(&dir);
        let signal = Arc::new(Notify::new());
        signal.notify_one();

        let source = {
            let signal = signal.clone();
            move || {
                let signal = signal.clone();
                async move { signal.notified().await }
            }
        };
        tokio::time::timeout(Duration::from_secs(1), until_interrupted(&state, source))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn first_interrupt_cancels_batch_second_stops() {
        let dir = tempfile::tempdir().unwrap();
        let state = stalled_state(&dir);
        let (preset, _) = state
            .catalog()
            .create(PresetDraft {
                name: "Big".into(),
                category: String::new(),
                models: vec![
                    ArtifactSpec::direct("https://h/a", "checkpoints"),
                    ArtifactSpec::direct("https://h/b", "checkpoints"),
                ],
            })
            .await
            .unwrap();

        let batch = {
            let state = state.clone();
            tokio::spawn(async move { state.download_preset(&preset.id, &TracingReporter).await })
        };
        while !state.is_downloading() {
            tokio::task::yield_now().await;
        }

        let signal = Arc::new(Notify::new());
        let source = {
            let signal = signal.clone();
            move || {
                let signal = signal.clone();
                async move { signal.notified().await }
            }
        };
        let waiter = until_interrupted(&state, source);
        tokio::pin!(waiter);

        signal.notify_one();
        assert!(tokio::time::timeout(Duration::from_millis(50), &mut waiter)
            .await
            .is_err());
        let report = batch.await.unwrap().unwrap();
        assert_eq!(report.result.completion, BatchCompletion::Cancelled);

        signal.notify_one();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap();
    }
}
