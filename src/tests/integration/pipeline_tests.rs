//! In-process pipeline scenarios over fixture documents and memory stores.

use std::sync::Arc;

use crate::address::Layout;
use crate::catalog::ContentKind;
use crate::config::AppConfig;
use crate::enhance::EnhanceMode;
use crate::llm::ProviderKind;
use crate::pipeline::{AnalyzeOptions, Derivation, ExtractOptions, Stage};
use crate::storage::{DocumentStore, VectorStore};
use crate::tests::common::fixtures;

fn analyze_options(provider: ProviderKind, kind: ContentKind) -> AnalyzeOptions {
    AnalyzeOptions { provider, kind, overrides: None }
}

fn extract_options(layout: Layout) -> ExtractOptions {
    ExtractOptions { enhance: EnhanceMode::Normal, layout }
}

// ============================================================================
// Identification paths
// ============================================================================

#[tokio::test]
async fn ambiguous_rulebook_resolves_by_inference() {
    let (service, _, _) = fixtures::service_with_stores(fixtures::ambiguous_rulebook());
    let id = service.upload(b"pdf".to_vec(), "mystery.pdf").await.unwrap();
    let verdict = service
        .analyze(&id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    assert_eq!(verdict.derivation, Derivation::AiInference);
    assert_eq!(verdict.game, "dnd");
    assert!(verdict.confidence > 0.0 && verdict.confidence <= 1.0);
}

#[tokio::test]
async fn offline_provider_falls_back_to_keywords() {
    // Claude with no key configured: unauthorized, not retried, and the
    // keyword vote takes over with capped confidence.
    let (service, _, document) = fixtures::service_with_stores(fixtures::ambiguous_rulebook());
    let id = service.upload(b"pdf".to_vec(), "mystery.pdf").await.unwrap();
    let verdict = service
        .analyze(&id, analyze_options(ProviderKind::Claude, ContentKind::SourceMaterial))
        .await
        .unwrap();
    assert_eq!(verdict.derivation, Derivation::FallbackKeyword);
    assert!(verdict.confidence <= 0.6);

    // The artifact still persists.
    let artifact = service.extract(&id, extract_options(Layout::Separate)).await.unwrap();
    assert!(!artifact.sections.is_empty());
    let collections = document.list_collections().await.unwrap();
    assert!(!collections.is_empty());
}

// ============================================================================
// Duplicates
// ============================================================================

#[tokio::test]
async fn duplicate_ingest_is_rejected() {
    let (service, _, _) = fixtures::service_with_stores(fixtures::players_handbook());

    let first = service.upload(b"pdf".to_vec(), "phb.pdf").await.unwrap();
    service
        .analyze(&first, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    service.extract(&first, extract_options(Layout::Separate)).await.unwrap();
    assert_eq!(service.status(&first).await.unwrap().stage, Stage::Completed);

    // Same document again: rejected with the prior ingestion date attached.
    let second = service.upload(b"pdf".to_vec(), "phb-again.pdf").await.unwrap();
    service
        .analyze(&second, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    let err = service
        .extract(&second, extract_options(Layout::Separate))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "rejected_duplicate");
    assert!(err.to_string().contains("already ingested on"));

    let status = service.status(&second).await.unwrap();
    assert_eq!(status.stage, Stage::RejectedDuplicate);
    assert!(status.error.unwrap().message.contains("already ingested on"));
}

#[tokio::test]
async fn concurrent_duplicates_pick_one_winner() {
    let (service, _, _) = fixtures::service_with_stores(fixtures::players_handbook());
    let service = Arc::new(service);

    let a = service.upload(b"pdf".to_vec(), "a.pdf").await.unwrap();
    let b = service.upload(b"pdf".to_vec(), "b.pdf").await.unwrap();
    for id in [&a, &b] {
        service
            .analyze(id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
            .await
            .unwrap();
    }

    let (ra, rb) = tokio::join!(
        service.extract(&a, extract_options(Layout::Separate)),
        service.extract(&b, extract_options(Layout::Separate)),
    );

    let stages = [
        service.status(&a).await.unwrap().stage,
        service.status(&b).await.unwrap().stage,
    ];
    let completed = stages.iter().filter(|s| **s == Stage::Completed).count();
    let rejected = stages.iter().filter(|s| **s == Stage::RejectedDuplicate).count();
    assert_eq!(completed, 1, "exactly one session completes: {stages:?}");
    assert_eq!(rejected, 1, "the other is rejected, not failed: {stages:?}");
    assert_eq!(ra.is_ok() as usize + rb.is_ok() as usize, 1);
}

// ============================================================================
// Degradation
// ============================================================================

#[tokio::test]
async fn vector_outage_degrades_to_partial_persistence() {
    let (service, vector, document) = fixtures::service_with_stores(fixtures::players_handbook());
    vector.set_unreachable(true);

    let id = service.upload(b"pdf".to_vec(), "phb.pdf").await.unwrap();
    service
        .analyze(&id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    service.extract(&id, extract_options(Layout::SingleWithFolder)).await.unwrap();

    // Session completed despite the outage.
    assert_eq!(service.status(&id).await.unwrap().stage, Stage::Completed);

    // The completed event carries a partial-persistence note.
    let mut stream = service.progress_stream(&id).await.unwrap();
    let mut completed_note = None;
    while let Some(event) = stream.recv().await {
        if event.stage == Stage::Completed {
            completed_note = event.note;
        }
    }
    assert!(completed_note.unwrap().contains("partial_persistence"));

    // The document store holds the artifact; health shows the vector
    // store down.
    let page = document.page("rpger", 0, 10, None).await.unwrap();
    assert_eq!(page.total, 1);
    let health = service.health().await;
    assert_eq!(health.vector_store, "down");
    assert_eq!(health.document_store, "ok");
}

#[tokio::test]
async fn both_stores_down_fails_persistence() {
    let (service, vector, document) = fixtures::service_with_stores(fixtures::players_handbook());
    vector.set_unreachable(true);
    document.set_unreachable(true);

    let id = service.upload(b"pdf".to_vec(), "phb.pdf").await.unwrap();
    service
        .analyze(&id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    let err = service
        .extract(&id, extract_options(Layout::Separate))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "store_unreachable");
    assert_eq!(
        service.status(&id).await.unwrap().stage,
        Stage::FailedPersistence
    );
}

#[tokio::test]
async fn scanned_pages_degrade_without_failing() {
    let (service, _, _) = fixtures::service_with_stores(fixtures::scanned_mixed());
    let id = service.upload(b"pdf".to_vec(), "scan.pdf").await.unwrap();
    service
        .analyze(&id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    let artifact = service.extract(&id, extract_options(Layout::Separate)).await.unwrap();

    assert_eq!(artifact.quality.pages_ocr, 1);
    assert_eq!(artifact.quality.pages_ocr_unavailable, 1);
    assert_eq!(artifact.quality.pages_failed, 1);
    assert!(artifact
        .quality
        .notes
        .iter()
        .any(|n| n.contains("ocr_unavailable")));
    // OCR sub-score reflects the scanned page's confidence.
    assert!(artifact.confidence.ocr_confidence < 100.0);
    // The session still completed.
    assert_eq!(service.status(&id).await.unwrap().stage, Stage::Completed);
}

// ============================================================================
// Input errors
// ============================================================================

#[tokio::test]
async fn encrypted_pdf_fails_identification() {
    let service = crate::service::ExtractorService::with_parts(
        AppConfig::default(),
        Arc::new(crate::pdf::MemoryPdfFacade::failing("pdf_encrypted")),
        Arc::new(crate::storage::MemoryVectorStore::new()),
        Arc::new(crate::storage::MemoryDocumentStore::new()),
    );

    let id = service.upload(b"pdf".to_vec(), "locked.pdf").await.unwrap();
    let err = service
        .analyze(&id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "pdf_encrypted");
    assert_eq!(
        service.status(&id).await.unwrap().stage,
        Stage::FailedIdentification
    );
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn cancel_before_extract_rolls_back() {
    let (service, _, _) = fixtures::service_with_stores(fixtures::players_handbook());
    let id = service.upload(b"pdf".to_vec(), "phb.pdf").await.unwrap();
    service
        .analyze(&id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    service.cancel(&id).await.unwrap();

    let err = service
        .extract(&id, extract_options(Layout::Separate))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "bad_session");
    assert_eq!(service.status(&id).await.unwrap().stage, Stage::Cancelled);

    // The registry holds no claim: a fresh ingest of the same book works.
    let retry = service.upload(b"pdf".to_vec(), "phb2.pdf").await.unwrap();
    service
        .analyze(&retry, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    service.extract(&retry, extract_options(Layout::Separate)).await.unwrap();
    assert_eq!(service.status(&retry).await.unwrap().stage, Stage::Completed);
}

// ============================================================================
// Layouts
// ============================================================================

#[tokio::test]
async fn separate_layout_lands_sections_in_both_stores() {
    let (service, vector, document) = fixtures::service_with_stores(fixtures::players_handbook());
    let id = service.upload(b"pdf".to_vec(), "phb.pdf").await.unwrap();
    service
        .analyze(&id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    let artifact = service.extract(&id, extract_options(Layout::Separate)).await.unwrap();

    let count = vector.count("dnd_1st_phb").await.unwrap();
    assert_eq!(count, artifact.counts.sections);

    let docs = document
        .page("source_material.dnd.1st.phb.dnd_1st_phb", 0, 5, None)
        .await
        .unwrap();
    assert_eq!(docs.total, artifact.counts.sections);
    assert_eq!(docs.docs[0]["game_metadata"]["game"], "dnd");

    // Vector ids follow the ${collection}_page${page}_${ordinal} scheme.
    let sample = vector.sample("dnd_1st_phb", 1).await.unwrap();
    let id = sample[0]["id"].as_str().unwrap();
    assert!(id.starts_with("dnd_1st_phb_page"));
}

#[tokio::test]
async fn single_layout_uses_folder_metadata() {
    let (service, _, document) = fixtures::service_with_stores(fixtures::players_handbook());
    let id = service.upload(b"pdf".to_vec(), "phb.pdf").await.unwrap();
    service
        .analyze(&id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    service
        .extract(&id, extract_options(Layout::SingleWithFolder))
        .await
        .unwrap();

    let page = document.page("rpger", 0, 10, None).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(
        page.docs[0]["folder_path"],
        "source_material/dnd/1st/phb/dnd_1st_phb"
    );
    assert_eq!(page.docs[0]["game_metadata"]["kind"], "source_material");
}

// ============================================================================
// Ordering
// ============================================================================

#[tokio::test]
async fn sections_persist_in_page_ordinal_order() {
    let (service, _, _) = fixtures::service_with_stores(fixtures::players_handbook());
    let id = service.upload(b"pdf".to_vec(), "phb.pdf").await.unwrap();
    service
        .analyze(&id, analyze_options(ProviderKind::Mock, ContentKind::SourceMaterial))
        .await
        .unwrap();
    let artifact = service.extract(&id, extract_options(Layout::Separate)).await.unwrap();

    let keys: Vec<(u32, u32)> = artifact.sections.iter().map(|s| s.order_key()).collect();
    let mut sorted = keys.clone();
    sorted.sort();
    assert_eq!(keys, sorted);
    // (page, ordinal) is unique within the document.
    sorted.dedup();
    assert_eq!(sorted.len(), keys.len());
}
