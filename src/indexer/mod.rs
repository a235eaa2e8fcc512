// Indexing pipeline
// Scrapes sections into JSONL files and loads those files into the vector store


use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::crawler::{Document, DocumentFetcher, SourceCollector};
use crate::database::jsonl::{
    JsonlWriter, list_jsonl_files, read_records, read_records_limited, section_file_name,
};
use crate::database::{VectorRecord, VectorStore};
use crate::embeddings::{ChunkingConfig, Embedder};
use crate::providers::ProviderError;

/// Counters for one scrape run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScrapeStats {
    pub sections: usize,
    pub failed_sections: usize,
    pub discovered: usize,
    pub scraped: usize,
    pub failed: usize,
    pub chunks: usize,
    pub duration: Duration,
}

/// Counters for one upsert run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub files: usize,
    pub records: usize,
}

/// Scrapes news sections, chunks and embeds every article and writes one
/// JSONL file per section
pub struct Indexer<C> {
    crawler: C,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    data_dir: PathBuf,
}

impl<C: SourceCollector + DocumentFetcher> Indexer<C> {
    #[inline]
    pub fn new(
        crawler: C,
        embedder: Arc<dyn Embedder>,
        chunking: ChunkingConfig,
        data_dir: PathBuf,
    ) -> Self {
        Self {
            crawler,
            embedder,
            chunking,
            data_dir,
        }
    }

    #[inline]
    pub fn crawler(&self) -> &C {
        &self.crawler
    }

    /// Scrape every section. Failing section pages and articles are logged
    /// and skipped; only rejected credentials and local I/O errors abort.
    #[inline]
    pub async fn scrape(&mut self, sections: &[String]) -> Result<ScrapeStats> {
        self.chunking
            .validate()
            .context("Invalid chunking configuration")?;

        let start = Instant::now();
        let mut stats = ScrapeStats::default();

        for section in sections {
            stats.sections += 1;
            if let Err(e) = self.scrape_section(section, &mut stats).await {
                if is_permission_denied(&e) {
                    return Err(e);
                }
                error!("Failed to scrape section {}: {:#}", section, e);
                stats.failed_sections += 1;
            }
        }

        stats.duration = start.elapsed();
        info!(
            "Scrape finished: {} of {} articles scraped, {} failed, {} chunks in {:.1}s",
            stats.scraped,
            stats.discovered,
            stats.failed,
            stats.chunks,
            stats.duration.as_secs_f64()
        );
        Ok(stats)
    }

    async fn scrape_section(&mut self, section: &str, stats: &mut ScrapeStats) -> Result<()> {
        let urls = self
            .crawler
            .collect(section)
            .await
            .with_context(|| format!("Failed to collect articles for section {}", section))?;
        stats.discovered += urls.len();

        let path = self.data_dir.join(section_file_name(section));
        let mut writer = JsonlWriter::create(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let bar = progress_bar(urls.len() as u64, section);

        for url in &urls {
            bar.set_message(url.to_string());

            let document = match self.crawler.fetch(url).await {
                Ok(document) => document,
                Err(e) => {
                    warn!("Skipping article {}: {}", url, e);
                    stats.failed += 1;
                    bar.inc(1);
                    continue;
                }
            };

            match self.embed_document(&document, section).await {
                Ok(records) => {
                    for record in &records {
                        writer
                            .write(record)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                    }
                    stats.scraped += 1;
                    stats.chunks += records.len();
                }
                Err(e) if is_permission_denied(&e) => {
                    bar.finish_and_clear();
                    return Err(e);
                }
                Err(e) => {
                    warn!("Skipping article {}: {:#}", url, e);
                    stats.failed += 1;
                }
            }
            bar.inc(1);
        }

        bar.finish_and_clear();
        let written = writer
            .finish()
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(
            "Section {}: {} records written to {}",
            section,
            written,
            path.display()
        );
        Ok(())
    }

    /// Chunk a document and embed each chunk into a record
    #[inline]
    pub async fn embed_document(
        &self,
        document: &Document,
        section: &str,
    ) -> Result<Vec<VectorRecord>> {
        let chunks = document
            .chunk(&self.chunking)
            .with_context(|| format!("Failed to chunk {}", document.url))?;
        if chunks.is_empty() {
            debug!("No chunks for {}", document.url);
            return Ok(Vec::new());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embedder = Arc::clone(&self.embedder);
        let vectors = tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
            .await
            .context("Embedding task panicked")??;

        if vectors.len() != chunks.len() {
            anyhow::bail!(
                "{} returned {} embeddings for {} chunks",
                self.embedder.name(),
                vectors.len(),
                chunks.len()
            );
        }

        debug!("Embedded {} chunks from {}", chunks.len(), document.url);
        Ok(chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, values)| VectorRecord::from_chunk(document, chunk, section, values))
            .collect())
    }
}

/// Upsert every record from the JSONL files in `dir`, in file-name order
#[inline]
pub async fn upsert_from_dir(
    store: &dyn VectorStore,
    namespace: &str,
    dir: &Path,
    batch_size: usize,
) -> Result<UpsertStats> {
    let files = list_jsonl_files(dir)
        .with_context(|| format!("Failed to list JSONL files in {}", dir.display()))?;
    if files.is_empty() {
        warn!("No JSONL files found in {}", dir.display());
    }

    let mut stats = UpsertStats::default();
    for path in &files {
        let records = read_records(path)?;
        let bar = progress_bar(records.len() as u64, "upsert");
        bar.set_message(path.display().to_string());

        for batch in records.chunks(batch_size.max(1)) {
            stats.records += store
                .upsert(namespace, batch)
                .await
                .with_context(|| format!("Failed to upsert records from {}", path.display()))?;
            bar.inc(batch.len() as u64);
        }

        bar.finish_and_clear();
        stats.files += 1;
        info!("Upserted {} records from {}", records.len(), path.display());
    }

    Ok(stats)
}

/// First `limit` records of every JSONL file in `dir`
#[inline]
pub fn preview_records(dir: &Path, limit: usize) -> Result<Vec<(PathBuf, Vec<VectorRecord>)>> {
    let files = list_jsonl_files(dir)
        .with_context(|| format!("Failed to list JSONL files in {}", dir.display()))?;

    files
        .into_iter()
        .map(|path| {
            let records = read_records_limited(&path, limit)?;
            Ok((path, records))
        })
        .collect()
}

fn is_permission_denied(error: &anyhow::Error) -> bool {
    error
        .chain()
        .filter_map(|cause| cause.downcast_ref::<ProviderError>())
        .any(ProviderError::is_permission_denied)
}

fn progress_bar(len: u64, label: &str) -> ProgressBar {
    if !console::user_attended_stderr() {
        return ProgressBar::hidden();
    }

    let style = ProgressStyle::with_template("{spinner} [{pos}/{len}] {prefix} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    let bar = ProgressBar::new(len).with_style(style);
    bar.set_prefix(label.to_string());
    bar
}
