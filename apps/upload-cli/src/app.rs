//! Runs one upload session from the command line.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};

use content_sources_client::Client;
use content_sources_transfer::UploadFile;
use content_sources_uploader::{UploadEvent, UploadOrchestrator};

use crate::Args;
use crate::config::Config;

pub async fn run(args: Args, config: Config) -> anyhow::Result<()> {
    let files = load_files(&args.files)?;
    let requested = files.len();

    let client = Client::new(&config.base_url, config.token.as_deref())?;
    let orchestrator = Arc::new(UploadOrchestrator::new(Arc::new(client), config.limits()));

    if let Some(mut events) = orchestrator.take_events() {
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                log_event(&event);
            }
        });
    }

    {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, stopping uploads");
                orchestrator.close();
            }
        });
    }

    let accepted = orchestrator.add_files(files).await;
    if orchestrator.cancel_token().is_cancelled() {
        anyhow::bail!("upload interrupted");
    }
    if accepted != requested {
        anyhow::bail!("only {accepted} of {requested} files were accepted for upload");
    }

    let summary = orchestrator.snapshot();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!(
        accepted,
        completed = summary.completed_count,
        failed = summary.failed_count,
        "uploads finished"
    );

    if summary.failed_count > 0 {
        anyhow::bail!("{} of {} files failed", summary.failed_count, summary.file_count);
    }

    let resolved = orchestrator.resolved_uploads();
    println!("{}", serde_json::to_string_pretty(&resolved)?);

    if let Some(repository) = &args.repository {
        let attached = orchestrator.confirm(repository).await?;
        info!(repository = %repository, attached, "files added to repository");
    }

    Ok(())
}

/// Opens every input, rejecting empty files and inputs whose names collide.
///
/// Files are keyed by name in the uploader, so `a/pkg.rpm` and `b/pkg.rpm`
/// cannot both be uploaded in one run.
fn load_files(paths: &[PathBuf]) -> anyhow::Result<Vec<UploadFile>> {
    let mut files = Vec::with_capacity(paths.len());
    let mut seen: HashMap<String, &Path> = HashMap::new();
    let mut problems = Vec::new();

    for path in paths {
        let file = UploadFile::from_path(path)
            .with_context(|| format!("cannot open {}", path.display()))?;
        if file.size == 0 {
            problems.push(format!("{} is empty", path.display()));
            continue;
        }
        if let Some(first) = seen.get(&file.name) {
            problems.push(format!(
                "{} has the same name as {}",
                path.display(),
                first.display()
            ));
            continue;
        }
        seen.insert(file.name.clone(), path);
        files.push(file);
    }

    if !problems.is_empty() {
        anyhow::bail!("cannot upload: {}", problems.join("; "));
    }
    Ok(files)
}

fn log_event(event: &UploadEvent) {
    match event {
        UploadEvent::FilePrepared {
            file,
            resumed,
            completed,
        } => info!(file = %file, resumed, completed, "file prepared"),
        UploadEvent::ChunkUploaded {
            file,
            completed_chunks,
            total_chunks,
            ..
        } => info!(file = %file, "{completed_chunks}/{total_chunks} chunks"),
        UploadEvent::ChunkRetrying {
            file,
            index,
            attempt,
        } => warn!(file = %file, chunk = index, attempt, "retrying chunk"),
        UploadEvent::FileCompleted { file } => info!(file = %file, "file uploaded"),
        UploadEvent::FileFailed { file, error } => error!(file = %file, %error, "file failed"),
        UploadEvent::PassFinished(_) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_files_accepts_distinct_names() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.rpm");
        let b = tmp.path().join("b.rpm");
        std::fs::write(&a, b"aaa").unwrap();
        std::fs::write(&b, b"bbbbb").unwrap();

        let files = load_files(&[a, b]).unwrap();
        let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.rpm", "b.rpm"]);
    }

    #[test]
    fn load_files_rejects_same_basename() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir(tmp.path().join("dir1")).unwrap();
        std::fs::create_dir(tmp.path().join("dir2")).unwrap();
        let first = tmp.path().join("dir1").join("a.rpm");
        let second = tmp.path().join("dir2").join("a.rpm");
        std::fs::write(&first, b"abc").unwrap();
        std::fs::write(&second, b"defgh").unwrap();

        let err = load_files(&[first, second.clone()]).unwrap_err().to_string();
        assert!(err.contains(&second.display().to_string()), "{err}");
        assert!(err.contains("same name"), "{err}");
    }

    #[test]
    fn load_files_rejects_empty_file() {
        let tmp = tempfile::tempdir().unwrap();
        let empty = tmp.path().join("empty.rpm");
        let full = tmp.path().join("full.rpm");
        std::fs::write(&empty, b"").unwrap();
        std::fs::write(&full, b"x").unwrap();

        let err = load_files(&[full, empty.clone()]).unwrap_err().to_string();
        assert!(err.contains(&empty.display().to_string()), "{err}");
        assert!(err.contains("is empty"), "{err}");
    }

    #[test]
    fn load_files_missing_path_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("missing.rpm");
        let err = load_files(&[missing]).unwrap_err().to_string();
        assert!(err.contains("cannot open"), "{err}");
    }
}
