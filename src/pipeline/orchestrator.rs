//! Stage driver.
//!
//! Single-writer per session: `analyze` and `extract` own their session for
//! the duration of the call. Per-page work inside a stage fans out on a
//! bounded worker pool; the BTreeMap collection acts as the reorder buffer
//! that restores (page, ordinal) order before persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::json;

use crate::address::{address, section_record_id, CollectionAddress, Layout};
use crate::catalog::{ContentKind, GameCatalog, GameSystem, UNCATEGORIZED};
use crate::confidence;
use crate::config::AppConfig;
use crate::dedup::{DuplicateRegistry, RegistryEntry};
use crate::enhance::{grade, Dictionary, EnhanceMode, TextEnhancer};
use crate::identify::{Identifier, ManualOverride};
use crate::llm::{CallOptions, ProviderClient, ProviderKind};
use crate::novel::{CharacterPassConfig, NovelCharacterPass};
use crate::pdf::{PdfDocument, PdfError, PdfFacade, PdfTable};
use crate::storage::{DocumentStore, StoreError, VectorRecord, VectorStore};

use super::models::{
    Artifact, ArtifactCounts, QualityMetrics, Section, SectionTable, TableLocator, Verdict,
};
use super::session::Session;
use super::{PipelineError, PipelineResult, Stage};

/// Block-merge floor: consecutive text blocks accumulate into one section
/// until at least this many characters.
const SECTION_TARGET_CHARS: usize = 400;
/// Vector upserts go out in batches of this many records.
const UPSERT_BATCH: usize = 64;

// ============================================================================
// Options and dependencies
// ============================================================================

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub provider: ProviderKind,
    pub kind: ContentKind,
    pub overrides: Option<ManualOverride>,
}

#[derive(Debug, Clone, Copy)]
pub struct ExtractOptions {
    pub enhance: EnhanceMode,
    pub layout: Layout,
}

/// Everything the orchestrator drives.
pub struct PipelineDeps {
    pub config: AppConfig,
    pub catalog: Arc<GameCatalog>,
    pub pdf: Arc<dyn PdfFacade>,
    pub vector: Arc<dyn VectorStore>,
    pub document: Arc<dyn DocumentStore>,
    pub registry: Arc<DuplicateRegistry>,
    pub providers: HashMap<ProviderKind, Arc<ProviderClient>>,
}

impl PipelineDeps {
    /// Client for a provider kind; the mock is always registered.
    pub fn client(&self, kind: ProviderKind) -> Arc<ProviderClient> {
        self.providers
            .get(&kind)
            .or_else(|| self.providers.get(&ProviderKind::Mock))
            .cloned()
            .expect("mock provider is always registered")
    }
}

pub struct Pipeline {
    deps: Arc<PipelineDeps>,
}

impl Pipeline {
    pub fn new(deps: Arc<PipelineDeps>) -> Self {
        Self { deps }
    }

    pub fn deps(&self) -> &Arc<PipelineDeps> {
        &self.deps
    }

    // ========================================================================
    // Analyze
    // ========================================================================

    /// Drive a session from `uploaded` to `identified`.
    pub async fn analyze(
        &self,
        session: &Arc<Session>,
        options: AnalyzeOptions,
    ) -> PipelineResult<Verdict> {
        match session.stage() {
            Stage::Uploaded | Stage::Identified => {}
            other => {
                return Err(PipelineError::WrongState {
                    state: other.as_str(),
                    expected: Stage::Uploaded.as_str(),
                })
            }
        }

        session.set_running(true);
        let result = self.run_analyze(session, &options).await;
        session.set_running(false);

        if let Err(e) = &result {
            let stage = match e {
                PipelineError::Cancelled => Stage::Cancelled,
                _ => Stage::FailedIdentification,
            };
            session.fail(stage, e.code(), user_message(e));
        }
        result
    }

    async fn run_analyze(
        &self,
        session: &Arc<Session>,
        options: &AnalyzeOptions,
    ) -> PipelineResult<Verdict> {
        session.set_provider(options.provider);
        session.transition(Stage::Identifying, 0, None);
        self.check_cancel(session)?;

        let bytes = session.bytes();
        let doc = self
            .with_deadline("identifying", self.deps.pdf.open(&bytes))
            .await??;

        session.transition(Stage::Identifying, 30, None);

        let identifier = Identifier::new(
            Arc::clone(&self.deps.catalog),
            self.deps.config.pipeline.identify_char_ceiling,
        );
        let client = self.deps.client(options.provider);
        let mut call_options = CallOptions::identify().with_config(&self.deps.config.ai);
        call_options.temperature = self.deps.config.ai.temperature;

        let verdict = self
            .with_deadline(
                "identifying",
                identifier.identify(
                    doc.as_ref(),
                    options.kind,
                    &client,
                    &call_options,
                    options.overrides.as_ref(),
                ),
            )
            .await??;

        session.set_verdict(verdict.clone());
        session.transition(Stage::Identified, 100, Some(format!(
            "{} / {} / {} ({})",
            verdict.game,
            verdict.edition,
            verdict.book,
            verdict.derivation.as_str()
        )));
        Ok(verdict)
    }

    // ========================================================================
    // Extract
    // ========================================================================

    /// Drive an identified session to `completed` or a terminal error.
    pub async fn extract(
        &self,
        session: &Arc<Session>,
        options: ExtractOptions,
    ) -> PipelineResult<Arc<Artifact>> {
        if session.stage() != Stage::Identified {
            return Err(PipelineError::WrongState {
                state: session.stage().as_str(),
                expected: Stage::Identified.as_str(),
            });
        }
        let verdict = session
            .verdict()
            .ok_or_else(|| PipelineError::BadSession(session.id().to_string()))?;

        session.set_running(true);
        let mut claimed_isbn: Option<String> = None;
        let result = self
            .run_extract(session, &verdict, options, &mut claimed_isbn)
            .await;
        session.set_running(false);

        match &result {
            Ok(artifact) => {
                if let Some(isbn) = &claimed_isbn {
                    if let Err(e) = self
                        .deps
                        .registry
                        .finalize(isbn, artifact.counts.sections, artifact.counts.words)
                        .await
                    {
                        tracing::warn!(%isbn, "registry finalize failed: {e}");
                    }
                }
            }
            Err(e) => {
                if let Some(isbn) = &claimed_isbn {
                    if let Err(drop_err) = self.deps.registry.drop_tentative(isbn).await {
                        tracing::warn!(%isbn, "registry rollback failed: {drop_err}");
                    }
                }
                let stage = terminal_stage_for(e, session.stage());
                session.fail(stage, e.code(), user_message(e));
            }
        }
        result
    }

    async fn run_extract(
        &self,
        session: &Arc<Session>,
        verdict: &Verdict,
        options: ExtractOptions,
        claimed_isbn: &mut Option<String>,
    ) -> PipelineResult<Arc<Artifact>> {
        let mut quality = QualityMetrics::default();

        // Dedup check against the registry by canonical ISBN.
        session.transition(Stage::DedupCheck, 0, None);
        self.check_cancel(session)?;
        *claimed_isbn = self.dedup_check(session, verdict, &mut quality).await?;
        session.transition(Stage::DedupCheck, 100, None);

        // Page extraction.
        self.check_cancel(session)?;
        session.transition(Stage::Extracting, 0, None);
        let bytes = session.bytes();
        let doc: Arc<dyn PdfDocument> = Arc::from(self.deps.pdf.open(&bytes).await?);
        let page_count = doc.page_count();
        let workers = self.deps.config.page_workers(page_count);
        let raw_pages = self
            .with_deadline(
                "extracting",
                self.extract_pages(session, Arc::clone(&doc), page_count, workers, &mut quality),
            )
            .await??;
        session.transition(Stage::Extracting, 100, None);

        // Enhancement.
        self.check_cancel(session)?;
        session.transition(Stage::Enhancing, 0, None);
        let enhancer = Arc::new(self.build_enhancer(verdict, options.enhance));
        let mut sections = self
            .with_deadline(
                "enhancing",
                self.enhance_pages(session, raw_pages, enhancer, workers, &mut quality),
            )
            .await??;
        session.transition(Stage::Enhancing, 100, None);

        // Categorization.
        self.check_cancel(session)?;
        session.transition(Stage::Categorizing, 0, None);
        let client = self.deps.client(session.provider());
        sections = self
            .with_deadline(
                "categorizing",
                self.categorize_sections(session, sections, verdict.kind, client.clone(), workers),
            )
            .await??;
        session.transition(Stage::Categorizing, 100, None);

        // The ordering guarantee: (page, ordinal) order at persist time.
        sections.sort_by_key(Section::order_key);

        // Scoring.
        self.check_cancel(session)?;
        session.transition(Stage::Scoring, 0, None);
        finish_quality(&mut quality, &sections);
        let confidence = confidence::score(&sections, page_count as u64, &quality);
        session.transition(Stage::Scoring, 100, Some(format!("grade {}", confidence.grade)));

        // Novel character pass: recorded, never fatal.
        let characters = if verdict.kind == ContentKind::Novel {
            self.check_cancel(session)?;
            session.transition(Stage::NovelCharacters, 0, None);
            let pass = NovelCharacterPass::new(CharacterPassConfig::default());
            let call_options = CallOptions::identify().with_config(&self.deps.config.ai);
            match pass.run(&sections, &client, &call_options).await {
                Ok(report) => {
                    session.transition(
                        Stage::NovelCharacters,
                        100,
                        Some(format!("{} characters", report.characters.len())),
                    );
                    Some(report)
                }
                Err(e) => {
                    quality.notes.push(format!("character pass failed: {e}"));
                    session.transition(Stage::NovelCharacters, 100, Some("failed".to_string()));
                    None
                }
            }
        } else {
            None
        };

        let artifact = Arc::new(Artifact {
            verdict: verdict.clone(),
            counts: ArtifactCounts::from_sections(page_count as u64, &sections),
            confidence,
            quality,
            characters,
            ingested_at: Utc::now(),
            source_digest: session.digest().to_string(),
            sections,
        });

        // Persistence fans out to both stores; one failing still commits
        // the other.
        self.check_cancel(session)?;
        session.transition(Stage::Persisting, 0, None);
        let addr = address(verdict, options.layout);
        let note = self
            .with_deadline(
                "persisting",
                self.persist(session, &artifact, &addr, options.layout),
            )
            .await??;

        session.set_artifact(Arc::clone(&artifact));
        session.transition(Stage::Completed, 100, note);
        Ok(artifact)
    }

    // ========================================================================
    // Stage bodies
    // ========================================================================

    async fn dedup_check(
        &self,
        session: &Arc<Session>,
        verdict: &Verdict,
        quality: &mut QualityMetrics,
    ) -> PipelineResult<Option<String>> {
        let Some(isbn) = verdict.canonical_isbn().map(str::to_string) else {
            return Ok(None);
        };

        let _guard = self.deps.registry.lock(&isbn).await?;
        match self.deps.registry.lookup(&isbn).await {
            Ok(Some(prior)) => {
                return Err(PipelineError::RejectedDuplicate { prior: Box::new(prior) });
            }
            Ok(None) => {
                let entry =
                    RegistryEntry::tentative(&isbn, verdict.title.clone(), session.id());
                match self.deps.registry.put_tentative(&entry).await {
                    Ok(()) => Ok(Some(isbn)),
                    Err(e) => {
                        tracing::warn!(%isbn, "dedup registry write failed: {e}");
                        quality.notes.push("dedup_unavailable".to_string());
                        Ok(None)
                    }
                }
            }
            Err(e) => {
                tracing::warn!(%isbn, "dedup registry lookup failed: {e}");
                quality.notes.push("dedup_unavailable".to_string());
                Ok(None)
            }
        }
    }

    async fn extract_pages(
        &self,
        session: &Arc<Session>,
        doc: Arc<dyn PdfDocument>,
        page_count: usize,
        workers: usize,
        quality: &mut QualityMetrics,
    ) -> PipelineResult<BTreeMap<u32, RawPage>> {
        let mut pages = BTreeMap::new();
        let mut done = 0usize;

        let mut results = stream::iter(1..=page_count as u32)
            .map(|page| {
                let doc = Arc::clone(&doc);
                let session = Arc::clone(session);
                async move {
                    if session.cancel_requested() {
                        return (page, None);
                    }
                    let text = doc.page_text(page).await;
                    let tables = doc.page_tables(page).await.unwrap_or_default();
                    (page, Some((text, tables)))
                }
            })
            .buffer_unordered(workers.max(1));

        while let Some((page, outcome)) = results.next().await {
            let Some((text, tables)) = outcome else { continue };
            match text {
                Ok(page_text) => {
                    if page_text.ocr_used {
                        quality.pages_ocr += 1;
                    }
                    pages.insert(
                        page,
                        RawPage {
                            text: page_text.text,
                            ocr_used: page_text.ocr_used,
                            ocr_confidence: page_text.ocr_confidence,
                            tables,
                        },
                    );
                }
                Err(PdfError::OcrUnavailable { .. }) => {
                    quality.pages_ocr_unavailable += 1;
                    quality.notes.push(format!("page {page}: ocr_unavailable"));
                }
                Err(e) if e.is_page_local() => {
                    quality.pages_failed += 1;
                    tracing::debug!(page, "page extraction failed: {e}");
                }
                Err(e) => return Err(e.into()),
            }
            done += 1;
            session.transition(
                Stage::Extracting,
                (done * 100 / page_count.max(1)) as u8,
                None,
            );
        }

        if session.cancel_requested() {
            return Err(PipelineError::Cancelled);
        }
        Ok(pages)
    }

    fn build_enhancer(&self, verdict: &Verdict, mode: EnhanceMode) -> TextEnhancer {
        let mut dictionary = Dictionary::builtin();
        if let Some(system) = GameSystem::parse(&verdict.game) {
            dictionary.add_protected(self.deps.catalog.protected_terms(system).iter().copied());
        }
        TextEnhancer::new(Arc::new(dictionary), mode)
    }

    async fn enhance_pages(
        &self,
        session: &Arc<Session>,
        raw_pages: BTreeMap<u32, RawPage>,
        enhancer: Arc<TextEnhancer>,
        workers: usize,
        quality: &mut QualityMetrics,
    ) -> PipelineResult<Vec<Section>> {
        let total = raw_pages.len().max(1);
        let mut done = 0usize;
        let mut by_page: BTreeMap<u32, Vec<Section>> = BTreeMap::new();

        let mut results = stream::iter(raw_pages.into_iter())
            .map(|(page, raw)| {
                let enhancer = Arc::clone(&enhancer);
                let session = Arc::clone(session);
                async move {
                    if session.cancel_requested() {
                        return (page, None, Default::default());
                    }
                    let handle = tokio::task::spawn_blocking(move || enhance_page(page, raw, &enhancer));
                    match handle.await {
                        Ok((sections, page_quality)) => (page, Some(sections), page_quality),
                        // A panicking enhancer degrades to nothing for the
                        // page; accounted below.
                        Err(_) => (page, None, PageQuality { enhance_failed: true, ..Default::default() }),
                    }
                }
            })
            .buffer_unordered(workers.max(1));

        let mut merged = PageQuality::default();
        while let Some((page, sections, page_quality)) = results.next().await {
            merged.absorb(&page_quality);
            if let Some(sections) = sections {
                by_page.insert(page, sections);
            }
            done += 1;
            session.transition(Stage::Enhancing, (done * 100 / total) as u8, None);
        }

        quality.corrections.merge(&merged.corrections);
        quality.pages_enhance_failed += merged.enhance_failed_count;
        if session.cancel_requested() {
            return Err(PipelineError::Cancelled);
        }
        Ok(by_page.into_values().flatten().collect())
    }

    async fn categorize_sections(
        &self,
        session: &Arc<Session>,
        sections: Vec<Section>,
        kind: ContentKind,
        client: Arc<ProviderClient>,
        workers: usize,
    ) -> PipelineResult<Vec<Section>> {
        let categories: Vec<String> = self
            .deps
            .catalog
            .categories(kind)
            .iter()
            .map(|c| c.to_string())
            .collect();
        let call_options = CallOptions::categorize().with_config(&self.deps.config.ai);
        let total = sections.len().max(1);
        let mut done = 0usize;

        let mut out: BTreeMap<(u32, u32), Section> = BTreeMap::new();
        let mut results = stream::iter(sections.into_iter())
            .map(|mut section| {
                let client = Arc::clone(&client);
                let categories = categories.clone();
                let call_options = call_options.clone();
                let session = Arc::clone(session);
                async move {
                    if session.cancel_requested() {
                        return section;
                    }
                    match client
                        .categorize(&section.text, &categories, &call_options)
                        .await
                    {
                        Ok(verdict) => {
                            section.category = verdict.category;
                            section.category_confidence = verdict.confidence;
                        }
                        Err(e) => {
                            // Degradation policy: keep the section, mark it
                            // uncategorized.
                            tracing::debug!(
                                page = section.page,
                                ordinal = section.ordinal,
                                "categorization failed: {e}"
                            );
                            section.category = UNCATEGORIZED.to_string();
                            section.category_confidence = 0.0;
                        }
                    }
                    section
                }
            })
            .buffer_unordered(workers.max(1));

        while let Some(section) = results.next().await {
            out.insert(section.order_key(), section);
            done += 1;
            session.transition(Stage::Categorizing, (done * 100 / total) as u8, None);
        }

        if session.cancel_requested() {
            return Err(PipelineError::Cancelled);
        }
        Ok(out.into_values().collect())
    }

    async fn persist(
        &self,
        session: &Arc<Session>,
        artifact: &Artifact,
        addr: &CollectionAddress,
        layout: Layout,
    ) -> PipelineResult<Option<String>> {
        let vector_result = self.persist_vector(artifact, addr).await;
        session.transition(Stage::Persisting, 50, None);
        self.check_cancel(session)?;
        let document_result = self.persist_document(artifact, addr, layout).await;

        match (vector_result, document_result) {
            (Ok(()), Ok(())) => Ok(None),
            (Err(e), Ok(())) => {
                tracing::warn!("vector store persist failed: {e}");
                Ok(Some(format!("partial_persistence: vector store failed ({})", e.code())))
            }
            (Ok(()), Err(e)) => {
                tracing::warn!("document store persist failed: {e}");
                Ok(Some(format!(
                    "partial_persistence: document store failed ({})",
                    e.code()
                )))
            }
            (Err(vector), Err(document)) => Err(PipelineError::BothStoresFailed {
                vector: vector.to_string(),
                document: document.to_string(),
            }),
        }
    }

    async fn persist_vector(
        &self,
        artifact: &Artifact,
        addr: &CollectionAddress,
    ) -> Result<(), StoreError> {
        let store = &self.deps.vector;
        store.ensure_collection(&addr.vector_collection).await?;

        let records: Vec<VectorRecord> = artifact
            .sections
            .iter()
            .map(|s| section_record(s, artifact, addr))
            .collect();

        for batch in records.chunks(UPSERT_BATCH) {
            match store.upsert_sections(&addr.vector_collection, batch).await {
                Ok(()) => {}
                Err(StoreError::Oversize { limit }) => {
                    // One retry with text truncated to 95% of the limit.
                    let truncated: Vec<VectorRecord> = batch
                        .iter()
                        .map(|r| truncate_record(r.clone(), limit))
                        .collect();
                    store
                        .upsert_sections(&addr.vector_collection, &truncated)
                        .await?;
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    async fn persist_document(
        &self,
        artifact: &Artifact,
        addr: &CollectionAddress,
        layout: Layout,
    ) -> Result<(), StoreError> {
        let store = &self.deps.document;
        store.ensure_collection(&addr.document_collection).await?;

        let game_metadata = json!({
            "game": &artifact.verdict.game,
            "edition": &artifact.verdict.edition,
            "book": &artifact.verdict.book,
            "kind": artifact.verdict.kind.as_str(),
        });
        let import_date = artifact.ingested_at.to_rfc3339();

        match layout {
            Layout::SingleWithFolder => {
                let mut doc = serde_json::to_value(artifact)
                    .map_err(|e| StoreError::Protocol(e.to_string()))?;
                if let Some(folder) = &addr.folder {
                    doc["folder_path"] = json!(folder);
                }
                doc["game_metadata"] = game_metadata;
                doc["isbn"] = json!(&artifact.verdict.isbn_13);
                doc["import_date"] = json!(&import_date);
                store.insert_whole(&addr.document_collection, doc).await?;
            }
            Layout::Separate => {
                let docs: Vec<serde_json::Value> = artifact
                    .sections
                    .iter()
                    .map(|s| {
                        json!({
                            "page": s.page,
                            "ordinal": s.ordinal,
                            "text": &s.text,
                            "category": &s.category,
                            "category_confidence": s.category_confidence,
                            "has_table": s.has_table,
                            "game_metadata": &game_metadata,
                            "isbn": &artifact.verdict.isbn_13,
                            "import_date": &import_date,
                            "source_digest": &artifact.source_digest,
                        })
                    })
                    .collect();
                store.insert_split(&addr.document_collection, docs).await?;
            }
        }
        Ok(())
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn check_cancel(&self, session: &Arc<Session>) -> PipelineResult<()> {
        if session.cancel_requested() {
            Err(PipelineError::Cancelled)
        } else {
            Ok(())
        }
    }

    async fn with_deadline<T>(
        &self,
        stage: &'static str,
        fut: impl std::future::Future<Output = T>,
    ) -> PipelineResult<T> {
        match self.deps.config.pipeline.stage_deadline_secs {
            None => Ok(fut.await),
            Some(secs) => tokio::time::timeout(std::time::Duration::from_secs(secs), fut)
                .await
                .map_err(|_| PipelineError::DeadlineExceeded { stage }),
        }
    }
}

// ============================================================================
// Page processing
// ============================================================================

#[derive(Debug, Clone, Default)]
struct RawPage {
    text: String,
    ocr_used: bool,
    ocr_confidence: Option<f32>,
    tables: Vec<PdfTable>,
}

#[derive(Debug, Default)]
struct PageQuality {
    corrections: crate::enhance::CorrectionCounts,
    enhance_failed: bool,
    enhance_failed_count: u64,
}

impl PageQuality {
    fn absorb(&mut self, other: &PageQuality) {
        self.corrections.merge(&other.corrections);
        self.enhance_failed_count += other.enhance_failed_count + u64::from(other.enhance_failed);
    }
}

/// Split a page into sections and enhance each one.
fn enhance_page(page: u32, raw: RawPage, enhancer: &TextEnhancer) -> (Vec<Section>, PageQuality) {
    let mut quality = PageQuality::default();
    let blocks = split_blocks(&raw.text);
    let mut sections = Vec::with_capacity(blocks.len());

    for (ordinal, block) in blocks.into_iter().enumerate() {
        let enhanced = enhancer.enhance(&block);
        quality.corrections.merge(&enhanced.corrections);
        let mut section = Section {
            page,
            ordinal: ordinal as u32,
            raw_text: block,
            text: enhanced.text,
            category: UNCATEGORIZED.to_string(),
            category_confidence: 0.0,
            has_table: false,
            tables: Vec::new(),
            ocr_used: raw.ocr_used,
            ocr_confidence: raw.ocr_confidence,
            quality_before: enhanced.score_before,
            quality_after: enhanced.score_after,
        };
        if ordinal == 0 && !raw.tables.is_empty() {
            section.has_table = true;
            section.tables = raw
                .tables
                .iter()
                .enumerate()
                .map(|(i, t)| SectionTable {
                    headers: t.headers.clone(),
                    rows: t.rows.clone(),
                    locator: TableLocator {
                        id: format!("p{page}_t{i}"),
                        page,
                        ordinal: i as u32,
                    },
                })
                .collect();
        }
        sections.push(section);
    }
    (sections, quality)
}

/// Group blank-line-separated blocks into sections of at least
/// `SECTION_TARGET_CHARS` characters.
fn split_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current = String::new();
    for piece in text.split("\n\n") {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }
        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(piece);
        if current.len() >= SECTION_TARGET_CHARS {
            blocks.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        blocks.push(current);
    }
    blocks
}

fn section_record(section: &Section, artifact: &Artifact, addr: &CollectionAddress) -> VectorRecord {
    let mut metadata = serde_json::Map::new();
    metadata.insert("game".into(), json!(&artifact.verdict.game));
    metadata.insert("edition".into(), json!(&artifact.verdict.edition));
    metadata.insert("book".into(), json!(&artifact.verdict.book));
    metadata.insert("kind".into(), json!(artifact.verdict.kind.as_str()));
    metadata.insert("page".into(), json!(section.page));
    metadata.insert("ordinal".into(), json!(section.ordinal));
    metadata.insert("category".into(), json!(&section.category));
    metadata.insert("source_digest".into(), json!(&artifact.source_digest));
    VectorRecord {
        id: section_record_id(&addr.vector_collection, section.page, section.ordinal),
        text: section.text.clone(),
        metadata,
    }
}

fn truncate_record(mut record: VectorRecord, limit: usize) -> VectorRecord {
    let budget = if limit == 0 {
        record.text.len() * 95 / 100
    } else {
        limit * 95 / 100
    };
    if record.text.len() > budget {
        let mut end = budget;
        while end > 0 && !record.text.is_char_boundary(end) {
            end -= 1;
        }
        record.text.truncate(end);
    }
    record
}

fn finish_quality(quality: &mut QualityMetrics, sections: &[Section]) {
    if sections.is_empty() {
        return;
    }
    quality.score_before =
        sections.iter().map(|s| s.quality_before).sum::<f32>() / sections.len() as f32;
    quality.score_after =
        sections.iter().map(|s| s.quality_after).sum::<f32>() / sections.len() as f32;
    quality.grade_before = grade(quality.score_before);
    quality.grade_after = grade(quality.score_after);
}

/// Map an error to the terminal state for the stage it interrupted.
fn terminal_stage_for(error: &PipelineError, current: Stage) -> Stage {
    match error {
        PipelineError::Cancelled => Stage::Cancelled,
        PipelineError::RejectedDuplicate { .. } => Stage::RejectedDuplicate,
        _ => match current {
            Stage::Identifying | Stage::Identified => Stage::FailedIdentification,
            Stage::Persisting => Stage::FailedPersistence,
            Stage::DedupCheck => Stage::FailedPersistence,
            _ => Stage::FailedExtraction,
        },
    }
}

/// Human message: stage-agnostic code plus remediation hint when known.
fn user_message(error: &PipelineError) -> String {
    match error.hint() {
        Some(hint) => format!("{error} ({hint})"),
        None => error.to_string(),
    }
}

// ============================================================================
// Tests
// ============================================================================
