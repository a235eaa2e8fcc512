pub mod extractor;


use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use rand::Rng;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::time::{Duration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use ureq::Agent;
use url::Url;

pub use self::extractor::{Chunk, Document, FetchError, article_id, extract_article_body, vector_id};
use crate::config::ScraperConfig;

/// Discovers article URLs on a news section page
#[async_trait]
pub trait SourceCollector: Send {
    async fn collect(&mut self, section: &str) -> Result<Vec<Url>>;
}

/// Downloads a single article and turns it into a [`Document`]
#[async_trait]
pub trait DocumentFetcher: Send {
    async fn fetch(&mut self, url: &Url) -> std::result::Result<Document, FetchError>;
}

/// HTTP client wrapper with a randomized politeness delay and retry logic
#[derive(Debug)]
pub struct HttpClient {
    agent: Agent,
    min_delay: Duration,
    max_delay: Duration,
    max_retries: u32,
    retry_delay: Duration,
    last_request_time: Option<Instant>,
}

impl HttpClient {
    #[inline]
    pub fn new(config: &ScraperConfig) -> Self {
        let agent = Agent::config_builder()
            .timeout_global(Some(Duration::from_secs(config.timeout_seconds)))
            .user_agent(&config.user_agent)
            .build()
            .into();

        Self {
            agent,
            min_delay: Duration::from_millis(config.min_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            last_request_time: None,
        }
    }

    /// Perform an HTTP GET request with the politeness delay and retry logic
    #[inline]
    pub async fn get(&mut self, url: &str) -> std::result::Result<String, FetchError> {
        self.apply_politeness_delay().await;

        let mut last_error = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                debug!("Retrying request to {} (attempt {})", url, attempt + 1);
                sleep(self.retry_delay).await;
            }

            match self.try_get(url) {
                Ok(response) => {
                    debug!("Successfully fetched {} (attempt {})", url, attempt + 1);
                    return Ok(response);
                }
                Err(e) if is_retryable_error(&e) && attempt < self.max_retries => {
                    warn!("Retryable error for {}: {}", url, e);
                    last_error = Some(e);
                }
                Err(e) => {
                    error!("Non-retryable error for {}: {}", url, e);
                    return Err(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| FetchError::Network {
            url: url.to_string(),
            message: "all retry attempts failed".to_string(),
        }))
    }

    /// Sleep for a random duration in the configured range since the previous request
    async fn apply_politeness_delay(&mut self) {
        if let Some(last_time) = self.last_request_time {
            let pause = self.random_delay();
            let elapsed = last_time.elapsed();

            if elapsed < pause {
                let sleep_duration = pause - elapsed;
                debug!("Politeness delay: sleeping for {:?}", sleep_duration);
                sleep(sleep_duration).await;
            }
        }

        self.last_request_time = Some(Instant::now());
    }

    fn random_delay(&self) -> Duration {
        if self.max_delay <= self.min_delay {
            return self.min_delay;
        }
        let millis = rand::rng()
            .random_range(self.min_delay.as_millis() as u64..=self.max_delay.as_millis() as u64);
        Duration::from_millis(millis)
    }

    /// Attempt a single HTTP GET request without retry logic
    fn try_get(&self, url: &str) -> std::result::Result<String, FetchError> {
        debug!("Making HTTP GET request to: {}", url);

        match self.agent.get(url).call() {
            Ok(mut response) => {
                let text =
                    response
                        .body_mut()
                        .read_to_string()
                        .map_err(|e| FetchError::Network {
                            url: url.to_string(),
                            message: format!("failed to read response body: {}", e),
                        })?;
                debug!("Successfully read {} bytes from {}", text.len(), url);
                Ok(text)
            }
            Err(ureq::Error::StatusCode(status)) => {
                debug!("HTTP request failed with status {}: {}", status, url);
                Err(FetchError::Status {
                    url: url.to_string(),
                    status,
                })
            }
            Err(e) => {
                debug!("HTTP request failed with transport error: {}", e);
                Err(FetchError::Network {
                    url: url.to_string(),
                    message: e.to_string(),
                })
            }
        }
    }
}

/// Network failures, 5xx responses and rate limiting are worth another attempt
fn is_retryable_error(error: &FetchError) -> bool {
    match error {
        FetchError::Network { .. } => true,
        FetchError::Status { status, .. } => *status >= 500 || *status == 429,
        FetchError::Parse { .. } | FetchError::MissingContent { .. } => false,
    }
}

/// Validate and normalize a URL
#[inline]
pub fn validate_url(url_str: &str) -> Result<Url> {
    let url = Url::parse(url_str).with_context(|| format!("Invalid URL format: {}", url_str))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow!("URL must use HTTP or HTTPS scheme: {}", url_str));
    }

    if url.host_str().is_none() {
        return Err(anyhow!("URL must have a valid host: {}", url_str));
    }

    Ok(url)
}

/// Extract article links matching the selector, resolved against the article base.
///
/// Duplicates are dropped by exact equality of the resolved URL, keeping the
/// first occurrence. Fragments are kept, so `/a#x` and `/a` are distinct.
#[inline]
pub fn extract_article_links(html: &str, selector: &Selector, article_base: &Url) -> Vec<Url> {
    let document = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut links = Vec::new();

    for element in document.select(selector) {
        let Some(href) = element.value().attr("href") else {
            continue;
        };
        let href = href.trim();

        if href.is_empty()
            || href.starts_with("mailto:")
            || href.starts_with("javascript:")
            || href.starts_with('#')
        {
            continue;
        }

        match article_base.join(href) {
            Ok(absolute_url) => {
                if seen.insert(absolute_url.as_str().to_string()) {
                    links.push(absolute_url);
                }
            }
            Err(e) => {
                debug!(
                    "Failed to resolve URL '{}' relative to '{}': {}",
                    href, article_base, e
                );
            }
        }
    }

    links
}

/// Scraper for news sites that list articles on section pages and embed the
/// article body as JSON-LD
#[derive(Debug)]
pub struct NewsCrawler {
    http_client: HttpClient,
    section_base_url: Url,
    article_base_url: Url,
    link_selector: Selector,
}

impl NewsCrawler {
    #[inline]
    pub fn new(config: &ScraperConfig) -> Result<Self> {
        let section_base_url = validate_url(&config.section_base_url)?;
        let article_base_url = validate_url(&config.article_base_url)?;
        let link_selector = Selector::parse(&config.link_selector)
            .map_err(|e| anyhow!("Invalid link selector '{}': {:?}", config.link_selector, e))?;

        Ok(Self {
            http_client: HttpClient::new(config),
            section_base_url,
            article_base_url,
            link_selector,
        })
    }

    /// URL of a section page, e.g. `https://www.cnn.com/world`
    #[inline]
    pub fn section_url(&self, section: &str) -> Result<Url> {
        let base = self.section_base_url.as_str().trim_end_matches('/');
        validate_url(&format!("{}/{}", base, section.trim_matches('/')))
    }
}

#[async_trait]
impl SourceCollector for NewsCrawler {
    #[inline]
    async fn collect(&mut self, section: &str) -> Result<Vec<Url>> {
        let section_url = self.section_url(section)?;
        info!("Collecting article links from {}", section_url);

        let html = self
            .http_client
            .get(section_url.as_str())
            .await
            .with_context(|| format!("Failed to fetch section page {}", section_url))?;

        let links = extract_article_links(&html, &self.link_selector, &self.article_base_url);
        info!("Found {} unique articles in section {}", links.len(), section);
        Ok(links)
    }
}

#[async_trait]
impl DocumentFetcher for NewsCrawler {
    #[inline]
    async fn fetch(&mut self, url: &Url) -> std::result::Result<Document, FetchError> {
        let html = self.http_client.get(url.as_str()).await?;
        let body = extract_article_body(&html, url)?;
        let today = chrono::Local::now().date_naive();

        info!("Scraped article from {}", url);
        Ok(Document::new(url.clone(), body, today))
    }
}
