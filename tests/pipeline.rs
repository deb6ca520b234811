mod common;

use std::sync::Arc;

use common::*;
use project_indexer_core::context::{ContextStatus, Termination};
use project_indexer_core::error::FailureKind;
use project_indexer_core::identity::document_id;
use project_indexer_core::models::{FileKind, RunStatus, SearchFilters};
use project_indexer_core::store::ProjectCatalog;
use tokio_util::sync::CancellationToken;

fn small_project() -> Vec<(&'static str, &'static str)> {
    vec![
        ("README.md", "# Demo\n\nA small demo service.\n"),
        ("main.py", "from src.app import run\n\nrun()\n"),
        ("src/app.py", "def run():\n    print('running')\n"),
    ]
}

fn six_files() -> Vec<(&'static str, &'static str)> {
    vec![
        ("README.md", "# Demo\n"),
        ("main.py", "run()\n"),
        ("src/a.py", "a = 1\n"),
        ("src/b.py", "b = 2\n"),
        ("src/c.py", "c = 3\n"),
        ("docs/guide.md", "# Guide\n"),
    ]
}

// ============ Context analysis ============

#[tokio::test]
async fn analysis_converges_when_every_field_reaches_threshold() {
    let h = Harness::new(&test_config(), &six_files(), &[40, 70, 95]).await;

    let summary = h
        .manager
        .start_or_resume_analysis(&h.project_id, false)
        .await
        .unwrap();

    assert_eq!(summary.status, ContextStatus::Converged);
    assert_eq!(summary.termination, Some(Termination::ConfidenceReached));
    assert_eq!(summary.iterations, 3);
    assert_eq!(summary.min_confidence, 95);
    assert!(!summary.convergence_incomplete);
    assert_eq!(h.iteration_numbers().await, vec![1, 2, 3]);

    // Converged contexts are returned without new model calls.
    let calls = h.completion.context_calls.load(std::sync::atomic::Ordering::SeqCst);
    assert_eq!(calls, 3);
    h.manager
        .start_or_resume_analysis(&h.project_id, false)
        .await
        .unwrap();
    assert_eq!(
        h.completion.context_calls.load(std::sync::atomic::Ordering::SeqCst),
        calls
    );
}

#[tokio::test]
async fn analysis_stops_at_iteration_ceiling_and_flags_it() {
    let mut config = test_config();
    config.analysis.max_iterations = 2;
    let h = Harness::new(&config, &six_files(), &[50]).await;

    let summary = h
        .manager
        .start_or_resume_analysis(&h.project_id, false)
        .await
        .unwrap();

    assert_eq!(summary.status, ContextStatus::Converged);
    assert_eq!(summary.termination, Some(Termination::IterationCeiling));
    assert_eq!(summary.iterations, 2);
    assert!(summary.convergence_incomplete);
    // Attained confidences are kept.
    assert_eq!(summary.min_confidence, 50);
}

#[tokio::test]
async fn analysis_stops_when_nothing_is_left_to_read() {
    let files = [("README.md", "# Demo\n"), ("main.py", "run()\n")];
    let h = Harness::new(&test_config(), &files, &[50]).await;

    let summary = h
        .manager
        .start_or_resume_analysis(&h.project_id, false)
        .await
        .unwrap();

    assert_eq!(summary.termination, Some(Termination::NoNewFiles));
    assert_eq!(summary.iterations, 2);
    assert_eq!(summary.files_analyzed, 2);
    assert!(summary.convergence_incomplete);
}

#[tokio::test]
async fn interrupted_analysis_resumes_to_the_same_result() {
    let interrupted = Harness::new(&test_config(), &six_files(), &[40, 70, 95]).await;
    interrupted.completion.fail_once_at(3);

    let err = interrupted
        .manager
        .start_or_resume_analysis(&interrupted.project_id, false)
        .await;
    assert!(err.is_err());
    assert_eq!(interrupted.iteration_numbers().await, vec![1, 2]);

    let status = interrupted.manager.status(&interrupted.project_id).await.unwrap();
    let ctx = status.context.unwrap();
    assert_eq!(ctx.status, ContextStatus::Failed);
    assert!(ctx.last_error.is_some());
    assert_eq!(ctx.iterations, 2);

    let resumed = interrupted
        .manager
        .start_or_resume_analysis(&interrupted.project_id, false)
        .await
        .unwrap();
    assert_eq!(interrupted.iteration_numbers().await, vec![1, 2, 3]);

    let straight = Harness::new(&test_config(), &six_files(), &[40, 70, 95]).await;
    let expected = straight
        .manager
        .start_or_resume_analysis(&straight.project_id, false)
        .await
        .unwrap();

    assert_eq!(resumed.purpose, expected.purpose);
    assert_eq!(resumed.iterations, expected.iterations);
    assert_eq!(resumed.termination, expected.termination);
    assert_eq!(resumed.files_analyzed, expected.files_analyzed);

    let requested = |its: Vec<project_indexer_core::context::AnalysisIteration>| {
        its.into_iter().map(|i| i.requested).collect::<Vec<_>>()
    };
    assert_eq!(
        requested(interrupted.manager.get_iterations(&interrupted.project_id).await.unwrap()),
        requested(straight.manager.get_iterations(&straight.project_id).await.unwrap())
    );
}

#[tokio::test]
async fn forced_analysis_starts_over() {
    let h = Harness::new(&test_config(), &six_files(), &[40, 95]).await;
    h.manager
        .start_or_resume_analysis(&h.project_id, false)
        .await
        .unwrap();
    assert_eq!(h.iteration_numbers().await, vec![1, 2]);

    h.manager
        .start_or_resume_analysis(&h.project_id, true)
        .await
        .unwrap();
    assert_eq!(h.iteration_numbers().await, vec![1, 2]);
    assert_eq!(
        h.completion.context_calls.load(std::sync::atomic::Ordering::SeqCst),
        4
    );
}

#[tokio::test]
async fn project_without_frameworks_converges_on_confidence() {
    let h = Harness::new(&test_config(), &small_project(), &[95]).await;
    h.completion.set_frameworks(&[]);

    let summary = h
        .manager
        .start_or_resume_analysis(&h.project_id, false)
        .await
        .unwrap();
    assert_eq!(summary.termination, Some(Termination::ConfidenceReached));
    assert!(!summary.convergence_incomplete);
    assert_eq!(summary.iterations, 1);
    assert!(summary
        .confidences
        .iter()
        .any(|(field, c)| field == "frameworks" && *c == 95));
}

#[tokio::test]
async fn cancelled_analysis_stops_calling_the_model() {
    let h = Harness::new(&test_config(), &six_files(), &[40]).await;
    let token = CancellationToken::new();
    token.cancel();
    let cancelled = Harness::with_parts(
        &test_config(),
        h.store.clone(),
        h.scanner.clone(),
        h.completion.clone(),
        token,
    )
    .await;

    let result = cancelled
        .manager
        .start_or_resume_analysis(&cancelled.project_id, false)
        .await;
    assert!(result.is_err());
    assert_eq!(h.completion.context_calls(), 0);
    assert!(cancelled.iteration_numbers().await.is_empty());

    let err = cancelled.manager.index_project(&cancelled.project_id, false).await;
    assert!(err.is_err());
    assert_eq!(h.completion.context_calls(), 0);
    assert_eq!(h.completion.chunk_calls(), 0);
}

#[tokio::test]
async fn analysis_cancelled_midway_resumes_from_the_log() {
    let schedule = [40, 60, 80, 95];
    let store = Arc::new(project_indexer_core::store::memory::InMemoryStore::default());
    let scanner = MemoryScanner::with_files(&six_files());

    let token = CancellationToken::new();
    let completion = ScriptedCompletion::new(&schedule);
    completion.cancel_at_iteration(2, token.clone());
    let first = Harness::with_parts(
        &test_config(),
        store.clone(),
        scanner.clone(),
        completion.clone(),
        token,
    )
    .await;

    let result = first
        .manager
        .start_or_resume_analysis(&first.project_id, false)
        .await;
    assert!(result.is_err());
    assert_eq!(completion.context_calls(), 2);
    assert_eq!(first.iteration_numbers().await, vec![1, 2]);
    let ctx = first.manager.status(&first.project_id).await.unwrap().context.unwrap();
    assert_eq!(ctx.status, ContextStatus::Iterating);
    assert_eq!(ctx.termination, None);

    let second = Harness::with_parts(
        &test_config(),
        store,
        scanner,
        ScriptedCompletion::new(&schedule),
        CancellationToken::new(),
    )
    .await;
    let resumed = second
        .manager
        .start_or_resume_analysis(&second.project_id, false)
        .await
        .unwrap();
    assert_eq!(second.completion.context_calls(), 2);
    assert_eq!(second.iteration_numbers().await, vec![1, 2, 3, 4]);
    assert_eq!(resumed.termination, Some(Termination::ConfidenceReached));
}

#[tokio::test]
async fn failed_forced_analysis_keeps_the_previous_context() {
    let h = Harness::new(&test_config(), &six_files(), &[40, 95]).await;
    h.manager
        .start_or_resume_analysis(&h.project_id, false)
        .await
        .unwrap();

    h.completion.fail_once_at(1);
    let err = h.manager.start_or_resume_analysis(&h.project_id, true).await;
    assert!(err.is_err());

    let ctx = h.manager.status(&h.project_id).await.unwrap().context.unwrap();
    assert_eq!(ctx.status, ContextStatus::Converged);
    assert_eq!(ctx.iterations, 2);
    assert_eq!(h.iteration_numbers().await, vec![1, 2]);

    let redone = h
        .manager
        .start_or_resume_analysis(&h.project_id, true)
        .await
        .unwrap();
    assert_eq!(redone.iterations, 2);
    assert_eq!(h.iteration_numbers().await, vec![1, 2]);
}

#[tokio::test]
async fn registering_equivalent_roots_yields_one_project() {
    let dir = tempfile::TempDir::new().unwrap();
    std::fs::create_dir_all(dir.path().join("sub")).unwrap();
    let h = Harness::new(&test_config(), &small_project(), &[95]).await;

    let direct = h.manager.register_project(dir.path()).await.unwrap();
    let roundabout = h
        .manager
        .register_project(&dir.path().join("sub").join(".."))
        .await
        .unwrap();
    assert_eq!(direct, roundabout);
}

// ============ Indexing ============

#[tokio::test]
async fn reindexing_unchanged_project_is_a_no_op() {
    let h = Harness::new(&test_config(), &small_project(), &[95]).await;

    let first = h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(first.status, RunStatus::Completed);
    assert_eq!(first.files_indexed, 3);
    assert_eq!(first.chunks_indexed, 3);
    assert!(first.failures.is_empty());

    let docs_before = h.store.documents().unwrap();
    let chunk_calls = h.completion.chunk_calls();
    let embed_calls = h.embedder.calls();

    let second = h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(second.status, RunStatus::Completed);
    assert_eq!(second.files_skipped, 3);
    assert_eq!(second.files_indexed, 0);
    assert_eq!(h.completion.chunk_calls(), chunk_calls);
    assert_eq!(h.embedder.calls(), embed_calls);
    assert_eq!(h.store.documents().unwrap(), docs_before);
}

#[tokio::test]
async fn forced_reindex_overwrites_in_place() {
    let h = Harness::new(&test_config(), &small_project(), &[95]).await;
    h.manager.index_project(&h.project_id, false).await.unwrap();
    let ids_before: Vec<String> = h.store.documents().unwrap().into_iter().map(|d| d.id).collect();

    let forced = h.manager.index_project(&h.project_id, true).await.unwrap();
    assert_eq!(forced.files_indexed, 3);
    let ids_after: Vec<String> = h.store.documents().unwrap().into_iter().map(|d| d.id).collect();
    assert_eq!(ids_before, ids_after);
}

#[tokio::test]
async fn shrinking_file_leaves_no_stale_chunks() {
    let mut config = test_config();
    tiny_chunks(&mut config);
    let five = python_functions(5, "a");
    let h = Harness::new(&config, &[("main.py", five.as_str())], &[95]).await;

    h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(h.ids_for("main.py").await.len(), 5);

    h.scanner.set("main.py", &python_functions(3, "b"));
    let report = h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.chunks_indexed, 3);

    let expected: Vec<String> = (0..3)
        .map(|i| document_id(&h.project_id, "main.py", i))
        .collect();
    assert_eq!(h.ids_for("main.py").await, expected);
    for doc in h.store.documents().unwrap() {
        assert_eq!(doc.metadata.total_chunks, 3);
    }
}

#[tokio::test]
async fn malformed_analysis_fails_only_that_chunk() {
    let mut config = test_config();
    tiny_chunks(&mut config);
    // Retries are available but must not be spent on malformed output.
    config.rate_limit.max_retries = 3;
    let text = format!(
        "{}def broken():\n    return \"{}\"\n",
        python_functions(2, "a"),
        MALFORMED_MARKER
    );
    let h = Harness::new(
        &config,
        &[("main.py", text.as_str()), ("README.md", "# Demo\n")],
        &[95],
    )
    .await;

    let report = h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(report.status, RunStatus::CompletedWithFailures);
    assert_eq!(h.completion.malformed_calls(), 1);
    assert_eq!(report.chunks_failed, 1);
    assert_eq!(report.chunks_indexed, 3);
    assert_eq!(report.files_partial, 1);
    assert_eq!(report.files_indexed, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].unit, "main.py#2");
    assert_eq!(report.failures[0].kind, FailureKind::Malformed);
    let committed = vec![
        document_id(&h.project_id, "main.py", 0),
        document_id(&h.project_id, "main.py", 1),
    ];
    assert_eq!(h.ids_for("main.py").await, committed);
    assert_eq!(h.ids_for("README.md").await.len(), 1);

    // Incomplete files are retried even though their content is unchanged;
    // the second malformed answer fails the same single chunk again.
    let calls = h.completion.chunk_calls();
    let again = h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(h.completion.malformed_calls(), 2);
    assert_eq!(again.chunks_failed, 1);
    assert_eq!(again.failures.len(), 1);
    assert_eq!(again.files_partial, 1);
    assert_eq!(again.files_skipped, 1);
    assert_eq!(h.completion.chunk_calls(), calls + 3);
    assert_eq!(h.ids_for("main.py").await, committed);
}

#[tokio::test]
async fn fatal_error_aborts_the_run() {
    let files = [
        ("a.py", "def a():\n    return 1\n"),
        ("b.py", "def b():\n    return \"FATAL_ANALYSIS\"\n"),
    ];
    let h = Harness::new(&test_config(), &files, &[95]).await;

    let report = h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(report.status, RunStatus::Aborted);
    assert!(report
        .failures
        .iter()
        .any(|f| f.kind == FailureKind::Fatal && f.unit == "b.py#0"));
    assert!(h.ids_for("b.py").await.is_empty());
    assert_eq!(report.files_pruned, 0);
}

#[tokio::test]
async fn cancelled_run_commits_nothing_partial_and_can_be_resumed() {
    let files = [
        ("a.py", "def a():\n    return 1\n"),
        ("b.py", "def b():\n    return \"CANCEL_DURING_ANALYSIS\"\n"),
        ("c.py", "def c():\n    return 3\n"),
    ];
    let config = test_config();
    let store = Arc::new(project_indexer_core::store::memory::InMemoryStore::default());
    let scanner = MemoryScanner::with_files(&files);

    let token = CancellationToken::new();
    let completion = ScriptedCompletion::new(&[95]);
    completion.cancel_on_marker(token.clone());
    let first = Harness::with_parts(&config, store.clone(), scanner.clone(), completion, token).await;

    let report = first.manager.index_project(&first.project_id, false).await.unwrap();
    assert_eq!(report.status, RunStatus::Cancelled);
    assert!(first.ids_for("b.py").await.is_empty());
    assert!(report.failures.iter().any(|f| f.kind == FailureKind::Cancelled));

    let second = Harness::with_parts(
        &config,
        store,
        scanner,
        ScriptedCompletion::new(&[95]),
        CancellationToken::new(),
    )
    .await;
    assert_eq!(second.project_id, first.project_id);

    let report = second.manager.index_project(&second.project_id, false).await.unwrap();
    assert_eq!(report.status, RunStatus::Completed);
    assert_eq!(report.files_indexed + report.files_skipped, 3);
    for path in ["a.py", "b.py", "c.py"] {
        assert_eq!(second.ids_for(path).await.len(), 1, "{}", path);
    }
}

#[tokio::test]
async fn vanished_files_are_pruned() {
    let h = Harness::new(&test_config(), &small_project(), &[95]).await;
    h.manager.index_project(&h.project_id, false).await.unwrap();

    h.scanner.remove("src/app.py");
    let report = h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(report.files_pruned, 1);
    assert_eq!(report.files_skipped, 2);
    assert!(h.ids_for("src/app.py").await.is_empty());
}

#[tokio::test]
async fn update_reindexes_only_requested_paths() {
    let files = [
        ("README.md", "# Demo\n"),
        ("src/a.py", "def a():\n    return 1\n"),
        ("src/b.py", "def b():\n    return 2\n"),
    ];
    let h = Harness::new(&test_config(), &files, &[95]).await;
    h.manager.index_project(&h.project_id, false).await.unwrap();
    let calls = h.completion.chunk_calls();

    h.scanner.set("src/a.py", "def a():\n    return 10\n");
    let report = h
        .manager
        .update_files(&h.project_id, &["src/a.py".to_string()])
        .await
        .unwrap();
    assert_eq!(report.files_indexed, 1);
    assert_eq!(h.completion.chunk_calls(), calls + 1);

    h.scanner.remove("src/b.py");
    let report = h
        .manager
        .update_files(&h.project_id, &[format!("{}/src/", ROOT)])
        .await
        .unwrap();
    assert_eq!(report.files_skipped, 1);
    assert_eq!(report.files_pruned, 1);
    assert!(h.ids_for("src/b.py").await.is_empty());
    assert_eq!(h.ids_for("README.md").await.len(), 1);
}

#[tokio::test]
async fn remove_expands_directories_and_reports_misses() {
    let files = [
        ("main.py", "run()\n"),
        ("src/x.py", "x = 1\n"),
        ("src/y.py", "y = 2\n"),
    ];
    let h = Harness::new(&test_config(), &files, &[95]).await;
    h.manager.index_project(&h.project_id, false).await.unwrap();

    let report = h
        .manager
        .remove_files(&h.project_id, &["src".to_string(), "nope.py".to_string()])
        .await
        .unwrap();
    assert_eq!(report.files_removed, 2);
    assert_eq!(report.documents_deleted, 2);
    assert_eq!(report.not_indexed, vec!["nope.py".to_string()]);
    assert!(h.ids_for("src/x.py").await.is_empty());
    assert_eq!(h.ids_for("main.py").await.len(), 1);
}

#[tokio::test]
async fn delete_project_removes_everything() {
    let h = Harness::new(&test_config(), &small_project(), &[95]).await;
    h.manager.index_project(&h.project_id, false).await.unwrap();

    let removed = h.manager.delete_project(&h.project_id).await.unwrap();
    assert!(removed >= 3);
    assert!(h.store.documents().unwrap().is_empty());
    assert!(h.store.project_root(&h.project_id).await.unwrap().is_none());
    assert!(h.manager.status(&h.project_id).await.is_err());
}

// ============ Search ============

#[tokio::test]
async fn search_ranks_the_relevant_file_first() {
    let files = [
        (
            "main.py",
            "def main():\n    server = create_server()\n    server.listen(8080)\n",
        ),
        (
            "README.md",
            "# Widget\n\nInstallation: pip install widget, then set your credentials.\n",
        ),
    ];
    let h = Harness::new(&test_config(), &files, &[95]).await;
    let report = h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(report.files_indexed, 2);

    let all = SearchFilters::default();
    let hits = h
        .manager
        .search(&h.project_id, "pip install credentials", &all, None)
        .await
        .unwrap();
    assert_eq!(hits[0].metadata.relative_path, "README.md");
    assert!(hits.windows(2).all(|w| w[0].score >= w[1].score));

    let hits = h
        .manager
        .search(&h.project_id, "create server listen", &all, None)
        .await
        .unwrap();
    assert_eq!(hits[0].metadata.relative_path, "main.py");
    assert_eq!(hits[0].metadata.analysis.exported_symbols, vec!["main".to_string()]);

    let code_only = SearchFilters {
        kind: Some(FileKind::Code),
        ..Default::default()
    };
    let hits = h
        .manager
        .search(&h.project_id, "pip install credentials", &code_only, Some(5))
        .await
        .unwrap();
    assert!(hits.iter().all(|m| m.metadata.relative_path == "main.py"));

    let hits = h
        .manager
        .search(&h.project_id, "pip install credentials", &all, Some(1))
        .await
        .unwrap();
    assert_eq!(hits.len(), 1);
}

#[tokio::test]
async fn file_and_function_search_group_chunk_hits() {
    let mut config = test_config();
    tiny_chunks(&mut config);
    let server = "def start_server():\n    return listen(\"0.0.0.0\", 8080, backlog=128, reuse=True)\n\
def stop_server():\n    return shutdown(\"0.0.0.0\", 8080, graceful=True, wait=30)\n";
    let files = [
        ("server.py", server),
        ("README.md", "# Widget\n\nInstallation: pip install widget.\n"),
    ];
    let h = Harness::new(&config, &files, &[95]).await;
    h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(h.ids_for("server.py").await.len(), 2);

    let all = SearchFilters::default();
    let found = h
        .manager
        .search_files(&h.project_id, "server listen shutdown", &all, Some(5))
        .await
        .unwrap();
    assert_eq!(found.len(), 2);
    assert_eq!(found[0].relative_path, "server.py");
    assert_eq!(found[0].matched_chunks, 2);
    assert_eq!(found[1].relative_path, "README.md");

    let top = h
        .manager
        .search_files(&h.project_id, "server listen shutdown", &all, Some(1))
        .await
        .unwrap();
    assert_eq!(top.len(), 1);

    let functions = h
        .manager
        .search_functions(&h.project_id, "server", None, &all, Some(5))
        .await
        .unwrap();
    let mut names: Vec<_> = functions.iter().map(|f| f.name.as_str()).collect();
    names.sort();
    assert_eq!(names, vec!["start_server", "stop_server"]);
    assert!(functions.iter().all(|f| f.relative_path == "server.py"));

    let named = h
        .manager
        .search_functions(&h.project_id, "server", Some("STOP"), &all, Some(5))
        .await
        .unwrap();
    assert_eq!(named.len(), 1);
    assert_eq!(named[0].name, "stop_server");
    assert_eq!(named[0].description, "Handles stop_server");
    assert_eq!(named[0].start_line, 3);
}

#[tokio::test]
async fn status_reports_context_and_volume() {
    let h = Harness::new(&test_config(), &small_project(), &[95]).await;
    h.manager.index_project(&h.project_id, false).await.unwrap();

    let status = h.manager.status(&h.project_id).await.unwrap();
    assert_eq!(status.root, ROOT);
    assert_eq!(status.stats.files, 3);
    assert_eq!(status.stats.documents, 3);
    let ctx = status.context.unwrap();
    assert_eq!(ctx.name, "demo");
    assert_eq!(ctx.status, ContextStatus::Converged);
}

#[tokio::test]
async fn entry_point_scenario() {
    let mut config = test_config();
    config.analysis.confidence_threshold = 80;
    let files = [
        (
            "main.py",
            "def main():\n    \"\"\"Entry point function: start the server.\"\"\"\n    serve()\n",
        ),
        ("README.md", "# Demo\n\nInstallation: pip install demo.\n"),
    ];
    let h = Harness::new(&config, &files, &[60, 85]).await;

    let summary = h
        .manager
        .start_or_resume_analysis(&h.project_id, false)
        .await
        .unwrap();
    assert!(summary.iterations <= 3);
    assert!(summary.min_confidence >= 80);
    assert_eq!(summary.termination, Some(Termination::ConfidenceReached));

    h.manager.index_project(&h.project_id, false).await.unwrap();
    assert_eq!(h.store.documents().unwrap().len(), 2);

    let hits = h
        .manager
        .search(&h.project_id, "entry point function", &SearchFilters::default(), None)
        .await
        .unwrap();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[0].metadata.relative_path, "main.py");
    assert_eq!(hits[1].metadata.relative_path, "README.md");
}
