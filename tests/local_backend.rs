//! Local Backend Integration Tests
//!
//! Runs transitions against the file-backed store and checks what lands on
//! disk across separate engine instances, the way separate pipeline jobs
//! would see it.

use std::sync::Arc;

use release_wizard::adapters::{
    AnnotationSink, AnnotationStyle, LocalRun, MetadataStore, RecordingNotifier,
};
use release_wizard::config::AnnouncementSettings;
use release_wizard::core::release::phase;
use release_wizard::core::{
    advance, release_registry, ProgressRenderer, TransitionEngine, TransitionError,
    CHECKLIST_CONTEXT, CURRENT_PHASE_KEY, PHASE_STATUS_KEY,
};
use release_wizard::domain::PhaseStatus;
use tempfile::TempDir;

/// Fresh engine over the run directory, as a new job would build it
async fn open_engine(temp_dir: &TempDir) -> (TransitionEngine, Arc<LocalRun>) {
    let run = Arc::new(LocalRun::open(temp_dir.path(), "local").await.unwrap());
    let registry = release_registry(
        Arc::new(RecordingNotifier::new()),
        AnnouncementSettings::default(),
    )
    .unwrap();

    let engine = TransitionEngine::new(Arc::new(registry), run.clone(), run.clone())
        .with_renderer(ProgressRenderer::new("Kibana release"));
    (engine, run)
}

#[tokio::test]
async fn test_progress_survives_between_invocations() {
    let temp_dir = TempDir::new().unwrap();

    {
        let (engine, _) = open_engine(&temp_dir).await;
        advance(&engine, phase::INITIALIZE, None).await.unwrap();
    }
    {
        let (engine, _) = open_engine(&temp_dir).await;
        advance(&engine, phase::COLLECT_COMMITS, None).await.unwrap();
    }

    let (engine, run) = open_engine(&temp_dir).await;
    let progress = engine.progress().await.unwrap();
    assert_eq!(progress.current_phase, phase::COLLECT_COMMITS);
    assert_eq!(progress.status_of(phase::INITIALIZE), Some(PhaseStatus::Ok));
    assert_eq!(
        progress.status_of(phase::COLLECT_COMMITS),
        Some(PhaseStatus::Pending)
    );

    assert!(run.metadata_path().exists());
    assert!(temp_dir.path().join("local").join("metadata.lock").exists());

    let (style, checklist) = run.read_annotation(CHECKLIST_CONTEXT).await.unwrap().unwrap();
    assert_eq!(style, AnnotationStyle::Info);
    assert!(checklist.starts_with("<section>\n<h3>Kibana release</h3>"));
}

#[tokio::test]
async fn test_corrupt_status_map_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, run) = open_engine(&temp_dir).await;

    run.set_many(&[
        (PHASE_STATUS_KEY, "{not json"),
        (CURRENT_PHASE_KEY, phase::INITIALIZE),
    ])
    .await
    .unwrap();

    let err = advance(&engine, phase::COLLECT_COMMITS, None)
        .await
        .unwrap_err();
    assert!(matches!(err, TransitionError::CorruptState(_)));

    // Nothing was repaired or overwritten
    assert_eq!(
        run.get(PHASE_STATUS_KEY).await.unwrap().as_deref(),
        Some("{not json")
    );
    assert!(run.read_annotation(CHECKLIST_CONTEXT).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_current_phase_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let (engine, run) = open_engine(&temp_dir).await;

    run.set(CURRENT_PHASE_KEY, "retired_phase").await.unwrap();

    let err = advance(&engine, phase::INITIALIZE, None).await.unwrap_err();
    assert!(matches!(err, TransitionError::CorruptState(_)));
}

#[tokio::test]
async fn test_append_annotation_on_disk() {
    let temp_dir = TempDir::new().unwrap();
    let (_, run) = open_engine(&temp_dir).await;

    run.set_annotation("commit-info", AnnotationStyle::Info, "<h4>Release candidates</h4>")
        .await
        .unwrap();
    run.append_annotation("commit-info", AnnotationStyle::Info, "<div>abc123</div>")
        .await
        .unwrap();

    let (_, body) = run.read_annotation("commit-info").await.unwrap().unwrap();
    assert_eq!(body, "<h4>Release candidates</h4><div>abc123</div>");
}
