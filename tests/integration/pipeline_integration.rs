use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_trait::async_trait;
use filetime::FileTime;
use scrubpdf::{
    cleaner::{DenyRule, Denylist, DenylistPreset, GraphCompactor, ObjectRole, Scrubber},
    config::{ProcessingConfig, RewriterKind},
    error::{CollaboratorFailure, Error, Result},
    pipeline::{DocumentStatus, Pipeline, PipelineState},
    report::{MemorySink, Reporter},
    structure::StructuralRewriter,
};

use crate::fixtures::{TestFixtures, ANNOTATION, PAGE};

/// Rewriter that always fails the way a crashing qpdf would
#[derive(Debug)]
struct FailingRewriter;

#[async_trait]
impl StructuralRewriter for FailingRewriter {
    fn name(&self) -> &str {
        "failing"
    }

    async fn rewrite(&self, _input: &Path, _output: &Path) -> Result<()> {
        Err(CollaboratorFailure::Exited {
            tool: "failing".into(),
            code: Some(2),
            stderr: "simulated crash".into(),
        }
        .into())
    }
}

/// Rewriter that exits cleanly but leaves an unparseable file behind
#[derive(Debug)]
struct GarbageRewriter;

#[async_trait]
impl StructuralRewriter for GarbageRewriter {
    fn name(&self) -> &str {
        "garbage"
    }

    async fn rewrite(&self, _input: &Path, output: &Path) -> Result<()> {
        tokio::fs::write(output, b"%PDF-1.7\nthis is not a document body\n").await?;
        Ok(())
    }
}

fn config(dir: &Path) -> ProcessingConfig {
    let mut config = ProcessingConfig::default();
    config.rewriter.kind = RewriterKind::Builtin;
    config.temp_dir = Some(dir.join("tmp"));
    config
}

fn pipeline(config: ProcessingConfig) -> (Pipeline, Arc<MemorySink>) {
    let sink = Arc::new(MemorySink::new());
    let pipeline = Pipeline::new(config)
        .unwrap()
        .with_reporter(Reporter::new(sink.clone()));
    (pipeline, sink)
}

#[tokio::test]
async fn test_active_content_is_removed_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "active.pdf", &TestFixtures::active_document());
    let (pipeline, _) = pipeline(config(dir.path()));

    let outcome = pipeline.execute(&input).await.unwrap();
    assert_eq!(outcome.final_state(), Some(PipelineState::Done));
    assert_eq!(outcome.output, dir.path().join("active_clean.pdf"));

    let output = TestFixtures::read(&outcome.output);
    assert!(TestFixtures::remaining_keys(&output, &Denylist::default()).is_empty());
    assert!(!TestFixtures::holds_script(&output));
    assert_eq!(output.page_ids().len(), 1);
    assert!(outcome.risk.is_clean());

    let first = &outcome.first_pass.scrub;
    assert_eq!(first.count(ObjectRole::Catalog), 6);
    assert_eq!(first.count(ObjectRole::Page), 3);
    assert_eq!(first.count(ObjectRole::Annotation), 1);
    assert!(outcome.second_pass.unwrap().scrub.is_clean());
}

#[tokio::test]
async fn test_annotation_action_removed_when_annotations_are_kept() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "links.pdf", &TestFixtures::active_document());
    let mut config = config(dir.path());
    config
        .denylist
        .rules
        .retain(|rule| *rule != DenyRule::new(ObjectRole::Page, "Annots"));
    let denylist = config.denylist.clone();
    let (pipeline, _) = pipeline(config);

    let outcome = pipeline.execute(&input).await.unwrap();
    let output = TestFixtures::read(&outcome.output);
    assert!(TestFixtures::remaining_keys(&output, &denylist).is_empty());

    let page = output.get(output.page_ids()[0]).as_dict().unwrap();
    let annots = output.resolve(page.get(b"Annots").unwrap()).as_array().unwrap();
    assert_eq!(annots.len(), 1);
    let annotation = output.resolve(&annots[0]).as_dict().unwrap();
    assert!(annotation.has_type(b"Annot"));
    assert!(!annotation.contains_key(b"A"));
}

#[tokio::test]
async fn test_packed_page_is_scrubbed() {
    let dir = tempfile::tempdir().unwrap();
    let doc = TestFixtures::packed_active_document();
    assert!(doc.get(PAGE).is_null());
    let input = TestFixtures::write(dir.path(), "packed.pdf", &doc);
    let (pipeline, _) = pipeline(config(dir.path()));

    let outcome = pipeline.execute(&input).await.unwrap();
    let output = TestFixtures::read(&outcome.output);

    assert_eq!(output.page_ids(), vec![PAGE]);
    assert!(TestFixtures::remaining_keys(&output, &Denylist::default()).is_empty());
    assert!(!TestFixtures::holds_script(&output));
    assert!(!output
        .objects
        .values()
        .filter_map(|value| value.as_dict())
        .any(|dict| dict.has_type(b"ObjStm")));
}

#[tokio::test]
async fn test_missing_rewriter_falls_back_to_first_pass() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "active.pdf", &TestFixtures::active_document());
    let mut config = config(dir.path());
    config.rewriter.kind = RewriterKind::Qpdf;
    config.rewriter.program = dir.path().join("no-such-qpdf");
    let (pipeline, sink) = pipeline(config);

    let report = pipeline.execute_batch(&[input.clone()]).await;
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.documents[0].status, DocumentStatus::SanitizedWithFallback);

    let outcome = report.documents[0].outcome.as_ref().unwrap();
    assert_eq!(
        outcome.states,
        vec![
            PipelineState::Parsed,
            PipelineState::Scrubbed1,
            PipelineState::Failed,
            PipelineState::FallbackDone
        ]
    );
    assert!(outcome.fallback_reason.as_deref().unwrap().contains("could not be started"));
    assert!(outcome.second_pass.is_none());

    let output = TestFixtures::read(&outcome.output);
    assert!(TestFixtures::remaining_keys(&output, &Denylist::default()).is_empty());
    assert_eq!(sink.category("fallback").len(), 1);
}

#[tokio::test]
async fn test_fallback_never_emits_unscrubbed_content() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "active.pdf", &TestFixtures::active_document());

    for rewriter in [
        Arc::new(FailingRewriter) as Arc<dyn StructuralRewriter>,
        Arc::new(GarbageRewriter),
    ] {
        let (pipeline, _) = pipeline(config(dir.path()));
        let outcome = pipeline
            .with_rewriter(rewriter)
            .execute(&input)
            .await
            .unwrap();

        assert!(outcome.used_fallback());
        let output = TestFixtures::read(&outcome.output);
        assert!(TestFixtures::remaining_keys(&output, &Denylist::default()).is_empty());
        assert!(!TestFixtures::holds_script(&output));
    }
}

#[tokio::test]
async fn test_sanitizing_twice_removes_nothing_new() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "active.pdf", &TestFixtures::active_document());
    let (pipeline, _) = pipeline(config(dir.path()));

    let first = pipeline.execute(&input).await.unwrap();
    let second = pipeline.execute(&first.output).await.unwrap();
    assert_eq!(second.output, dir.path().join("active_clean_clean.pdf"));
    assert!(second.first_pass.scrub.is_clean());
    assert_eq!(second.first_pass.compaction.objects_removed, 0);
}

#[tokio::test]
async fn test_clean_document_is_unchanged_at_object_level() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "plain.pdf", &TestFixtures::minimal_document());
    let mut doc = TestFixtures::read(&input);
    let before = doc.clone();

    let report = Scrubber::default().scrub(&mut doc);
    assert!(report.is_clean());
    assert_eq!(doc, before);

    let compaction = GraphCompactor::default().compact(&mut doc).unwrap();
    assert_eq!(compaction.objects_removed, 0);
    assert_eq!(doc.objects, before.objects);
}

#[tokio::test]
async fn test_preserve_navigation_keeps_outlines_and_form() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "nav.pdf", &TestFixtures::active_document());
    let mut config = config(dir.path());
    config.denylist = Denylist::preset(DenylistPreset::PreserveNavigation);
    let (pipeline, _) = pipeline(config);

    let outcome = pipeline.execute(&input).await.unwrap();
    let output = TestFixtures::read(&outcome.output);
    let catalog = output.catalog().unwrap();
    assert!(catalog.contains_key(b"Outlines"));
    assert!(catalog.contains_key(b"AcroForm"));
    assert!(!catalog.contains_key(b"OpenAction"));
    assert_eq!(outcome.first_pass.scrub.count(ObjectRole::Catalog), 4);
}

#[tokio::test]
async fn test_compacted_output_has_no_new_dangling_references() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "active.pdf", &TestFixtures::active_document());
    let (pipeline, _) = pipeline(config(dir.path()));

    let outcome = pipeline.execute(&input).await.unwrap();
    let output = TestFixtures::read(&outcome.output);
    for value in output.objects.values() {
        value.for_each_reference(&mut |id| {
            assert!(output.contains(id), "reference to dropped object {id}");
        });
    }
    assert!(!output.contains(ANNOTATION));
}

#[tokio::test]
async fn test_batch_isolates_failures() {
    let dir = tempfile::tempdir().unwrap();
    let good = TestFixtures::write(dir.path(), "good.pdf", &TestFixtures::active_document());
    let text = dir.path().join("notes.txt");
    std::fs::write(&text, b"just some notes").unwrap();
    let missing = dir.path().join("missing.pdf");
    let (pipeline, sink) = pipeline(config(dir.path()));

    let report = pipeline
        .execute_batch(&[good.clone(), text.clone(), missing.clone()])
        .await;
    let statuses: Vec<_> = report.documents.iter().map(|d| d.status).collect();
    assert_eq!(
        statuses,
        vec![DocumentStatus::Sanitized, DocumentStatus::Failed, DocumentStatus::Failed]
    );
    assert_eq!(report.exit_code(), 1);
    assert!(dir.path().join("good_clean.pdf").exists());
    assert!(!dir.path().join("notes_clean.txt").exists());

    let failures: Vec<PathBuf> = sink
        .category("failure")
        .into_iter()
        .filter_map(|entry| entry.path)
        .collect();
    assert!(failures.contains(&text));
    assert!(failures.contains(&missing));
}

#[tokio::test]
async fn test_batch_runs_with_single_permit() {
    let dir = tempfile::tempdir().unwrap();
    let inputs: Vec<PathBuf> = (0..4)
        .map(|i| {
            TestFixtures::write(
                dir.path(),
                &format!("doc{i}.pdf"),
                &TestFixtures::active_document(),
            )
        })
        .collect();
    let mut config = config(dir.path());
    config.max_concurrent_documents = 1;
    let (pipeline, _) = pipeline(config);

    let report = pipeline.execute_batch(&inputs).await;
    assert!(report.all_sanitized());
    assert_eq!(report.count(DocumentStatus::Sanitized), 4);
    for (document, input) in report.documents.iter().zip(&inputs) {
        assert_eq!(&document.input, input);
    }
}

#[tokio::test]
async fn test_batch_reclaims_stale_artifacts() {
    let dir = tempfile::tempdir().unwrap();
    let temp = dir.path().join("tmp");
    std::fs::create_dir_all(&temp).unwrap();
    let stale = temp.join(".scrubpdf-0000-stage1.pdf");
    std::fs::write(&stale, b"%PDF-1.4 left behind").unwrap();
    let two_hours_ago = SystemTime::now() - Duration::from_secs(2 * 3600);
    filetime::set_file_mtime(&stale, FileTime::from_system_time(two_hours_ago)).unwrap();
    let unrelated = temp.join("keep.pdf");
    std::fs::write(&unrelated, b"%PDF-1.4").unwrap();

    let (pipeline, _) = pipeline(config(dir.path()));
    let report = pipeline.execute_batch(&[]).await;

    assert_eq!(report.reclaimed_artifacts, 1);
    assert!(!stale.exists());
    assert!(unrelated.exists());
}

#[tokio::test]
async fn test_rejected_inputs() {
    let dir = tempfile::tempdir().unwrap();
    let (pipeline, _) = pipeline(config(dir.path()));

    let text = dir.path().join("readme.pdf");
    std::fs::write(&text, b"hello").unwrap();
    assert!(matches!(
        pipeline.execute(&text).await,
        Err(Error::NotADocument(path)) if path == text
    ));
    assert!(matches!(
        pipeline.execute(&dir.path().join("absent.pdf")).await,
        Err(Error::FileNotFound(_))
    ));
}

#[tokio::test]
async fn test_output_directory_is_used() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "report.pdf", &TestFixtures::minimal_document());
    let mut config = config(dir.path());
    config.output_dir = Some(dir.path().join("out"));
    let (pipeline, _) = pipeline(config);

    let outcome = pipeline.execute(&input).await.unwrap();
    assert_eq!(outcome.output, dir.path().join("out").join("report_clean.pdf"));
    assert!(outcome.output.exists());
    assert!(input.exists());
    assert_eq!(outcome.input_sha256.len(), 64);
}

#[tokio::test]
async fn test_same_named_inputs_never_share_an_output() {
    let dir = tempfile::tempdir().unwrap();
    for sub in ["a", "b"] {
        std::fs::create_dir_all(dir.path().join(sub)).unwrap();
    }
    let first = TestFixtures::write(
        &dir.path().join("a"),
        "report.pdf",
        &TestFixtures::active_document(),
    );
    let second = TestFixtures::write(
        &dir.path().join("b"),
        "report.pdf",
        &TestFixtures::minimal_document(),
    );
    let out = dir.path().join("out");
    let mut config = config(dir.path());
    config.output_dir = Some(out.clone());
    let (pipeline, sink) = pipeline(config);

    let report = pipeline.execute_batch(&[first.clone(), second.clone()]).await;
    assert_eq!(report.exit_code(), 1);
    assert_eq!(report.documents[0].status, DocumentStatus::Sanitized);
    assert_eq!(report.documents[1].status, DocumentStatus::Failed);
    assert!(report.documents[1]
        .error
        .as_deref()
        .unwrap()
        .contains("already claimed"));
    assert_eq!(std::fs::read_dir(&out).unwrap().count(), 1);

    // The surviving output belongs to the first input.
    let outcome = report.documents[0].outcome.as_ref().unwrap();
    assert_eq!(outcome.input, first);
    assert!(outcome.first_pass.scrub.count(ObjectRole::Catalog) > 0);

    let failures = sink.category("failure");
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].path.as_deref(), Some(second.as_path()));
}

#[tokio::test]
async fn test_same_named_inputs_without_output_dir_both_succeed() {
    let dir = tempfile::tempdir().unwrap();
    for sub in ["a", "b"] {
        std::fs::create_dir_all(dir.path().join(sub)).unwrap();
    }
    let first = TestFixtures::write(
        &dir.path().join("a"),
        "report.pdf",
        &TestFixtures::minimal_document(),
    );
    let second = TestFixtures::write(
        &dir.path().join("b"),
        "report.pdf",
        &TestFixtures::minimal_document(),
    );
    let (pipeline, _) = pipeline(config(dir.path()));

    let report = pipeline.execute_batch(&[first, second]).await;
    assert!(report.all_sanitized());
    assert!(dir.path().join("a").join("report_clean.pdf").exists());
    assert!(dir.path().join("b").join("report_clean.pdf").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn test_rewriter_timeout_falls_back_to_first_pass() {
    let dir = tempfile::tempdir().unwrap();
    let input = TestFixtures::write(dir.path(), "active.pdf", &TestFixtures::active_document());
    let mut config = config(dir.path());
    config.rewriter.kind = RewriterKind::Qpdf;
    config.rewriter.program = TestFixtures::fake_tool(dir.path(), "exec sleep 5");
    config.rewriter.timeout_secs = 1;
    let (pipeline, sink) = pipeline(config);

    let outcome = pipeline.execute(&input).await.unwrap();
    assert_eq!(outcome.final_state(), Some(PipelineState::FallbackDone));
    assert!(outcome.states.contains(&PipelineState::Failed));
    assert!(outcome.fallback_reason.as_deref().unwrap().contains("timed out"));

    let output = TestFixtures::read(&outcome.output);
    assert!(TestFixtures::remaining_keys(&output, &Denylist::default()).is_empty());
    assert!(!TestFixtures::holds_script(&output));
    assert_eq!(sink.category("fallback").len(), 1);
}
