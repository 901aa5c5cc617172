//! REST client for the content provider API

use super::{ContainerFormat, ContentProvider, Decryption, License, TransferProgress};
use crate::config::ProviderConfig;
use crate::error::{ConversionError, Error, Result};
use crate::planner::RawChapter;
use crate::session::ProviderSession;
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use url::Url;

const LIBRARY_RESPONSE_GROUPS: &str = "product_desc,contributors,product_attrs";
const METADATA_RESPONSE_GROUPS: &str = "chapter_info,content_reference,content_url";

/// [`ContentProvider`] speaking the provider's JSON API over HTTPS
pub struct HttpContentProvider {
    client: reqwest::Client,
    base_url: Url,
    request_timeout: Duration,
}

impl HttpContentProvider {
    /// Build a client from the provider settings
    ///
    /// # Errors
    /// Returns a configuration error for an invalid base URL, or if the HTTP
    /// client cannot be created
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let base_url = Url::parse(&config.api_base_url).map_err(|e| Error::Config {
            message: format!("invalid api_base_url {}: {}", config.api_base_url, e),
            key: Some("provider.api_base_url".to_string()),
        })?;

        // No overall timeout: container transfers run for minutes. Metadata
        // requests set their own, streams use an idle timeout per chunk.
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| Error::Other(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            request_timeout: config.request_timeout,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::Config {
                message: format!("api_base_url cannot be a base: {}", self.base_url),
                key: Some("provider.api_base_url".to_string()),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn authorized(&self, request: RequestBuilder, session: &ProviderSession) -> RequestBuilder {
        request
            .bearer_auth(&session.access_token)
            .timeout(self.request_timeout)
    }

    async fn fetch_product(&self, session: &ProviderSession, book_id: &str) -> Result<ProductItem> {
        let mut url = self.endpoint(&["1.0", "library", book_id])?;
        url.query_pairs_mut()
            .append_pair("response_groups", LIBRARY_RESPONSE_GROUPS);

        let response = send(self.authorized(self.client.get(url), session), "library lookup").await?;
        let body: LibraryResponse = decode(response, "library lookup").await?;
        Ok(body.item)
    }

    /// License voucher for the modern container; `None` when the provider
    /// does not grant one for this title
    async fn request_license(
        &self,
        session: &ProviderSession,
        book_id: &str,
    ) -> Result<Option<(ContentMetadata, Decryption)>> {
        let url = self.endpoint(&["1.0", "content", book_id, "licenserequest"])?;
        let request = self.client.post(url).json(&serde_json::json!({
            "quality": "High",
            "consumption_type": "Download",
            "response_groups": METADATA_RESPONSE_GROUPS,
            "supported_drm_types": ["Adrm", "Mpeg"],
        }));

        let response = send(self.authorized(request, session), "license request").await?;
        let body: LicenseResponse = decode(response, "license request").await?;
        let license = body.content_license;

        if license.status_code.as_deref() != Some("Granted") {
            tracing::debug!(
                book_id,
                status = ?license.status_code,
                "license voucher not granted"
            );
            return Ok(None);
        }

        let (Some(metadata), Some(voucher)) = (license.content_metadata, license.license_response)
        else {
            return Ok(None);
        };
        match (voucher.key, voucher.iv) {
            (Some(key), Some(iv)) if !key.is_empty() && !iv.is_empty() => {
                Ok(Some((metadata, Decryption::KeyIv { key, iv })))
            }
            _ => Ok(None),
        }
    }

    async fn fetch_legacy_metadata(
        &self,
        session: &ProviderSession,
        book_id: &str,
    ) -> Result<ContentMetadata> {
        let mut url = self.endpoint(&["1.0", "content", book_id, "metadata"])?;
        url.query_pairs_mut()
            .append_pair("response_groups", METADATA_RESPONSE_GROUPS)
            .append_pair("quality", "High");

        let response =
            send(self.authorized(self.client.get(url), session), "content metadata").await?;
        let body: MetadataResponse = decode(response, "content metadata").await?;
        Ok(body.content_metadata)
    }
}

#[async_trait]
impl ContentProvider for HttpContentProvider {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn license(&self, session: &ProviderSession, book_id: &str) -> Result<License> {
        let product = self.fetch_product(session, book_id).await?;

        let voucher = match self.request_license(session, book_id).await {
            Ok(voucher) => voucher,
            // Transient and auth failures belong to the caller; anything else
            // means the modern container is not on offer for this title
            Err(e @ (Error::Auth(_) | Error::Network(_))) => return Err(e),
            Err(e) => {
                tracing::debug!(book_id, error = %e, "license request refused");
                None
            }
        };

        let (metadata, decryption, format) = match voucher {
            Some((metadata, decryption)) => (metadata, decryption, ContainerFormat::Aaxc),
            None => {
                let bytes = session.activation_bytes.clone().ok_or_else(|| {
                    ConversionError::MissingDecryptionMaterial(format!(
                        "book {} has no license voucher and the session carries no activation bytes",
                        book_id
                    ))
                })?;
                let metadata = self.fetch_legacy_metadata(session, book_id).await?;
                (metadata, Decryption::ActivationBytes(bytes), ContainerFormat::Aax)
            }
        };

        let download_url = metadata
            .content_url
            .and_then(|u| u.offline_url)
            .ok_or_else(|| Error::Other(format!("provider returned no download URL for {}", book_id)))
            .and_then(|u| {
                Url::parse(&u).map_err(|e| Error::Other(format!("invalid download URL: {}", e)))
            })?;

        let chapter_info = metadata.chapter_info.unwrap_or_default();
        let runtime = chapter_info
            .runtime_length_ms
            .map(Duration::from_millis)
            .or_else(|| product.runtime_length_min.map(|m| Duration::from_secs(m * 60)));

        Ok(License {
            book_id: book_id.to_string(),
            title: product.title.unwrap_or_else(|| book_id.to_string()),
            authors: product.authors.into_iter().map(|a| a.name).collect(),
            runtime,
            download_url,
            format,
            content_length: metadata.content_reference.and_then(|r| r.content_size_in_bytes),
            decryption,
            chapters: chapter_info.chapters,
        })
    }

    async fn download_container(
        &self,
        _session: &ProviderSession,
        license: &License,
        dest: &Path,
        cancel: &CancellationToken,
        progress: &dyn TransferProgress,
    ) -> Result<u64> {
        // Download URLs are pre-signed; the bearer token is not sent to the CDN
        let request = send(
            self.client.get(license.download_url.clone()),
            "container download",
        );
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            response = request => response?,
        };
        let total = response.content_length().or(license.content_length);

        let mut file = tokio::fs::File::create(dest)
            .await
            .map_err(|e| Error::storage(format!("failed to create {}", dest.display()), e))?;

        let mut stream = response.bytes_stream();
        let mut written = 0u64;
        progress.transferred(0, total).await;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                next = tokio::time::timeout(self.request_timeout, stream.next()) => match next {
                    Ok(Some(chunk)) => chunk.map_err(|e| {
                        Error::Network(format!("container stream interrupted: {}", e))
                    })?,
                    Ok(None) => break,
                    Err(_) => {
                        return Err(Error::Network(format!(
                            "container stream stalled for {}s",
                            self.request_timeout.as_secs()
                        )))
                    }
                },
            };

            file.write_all(&chunk)
                .await
                .map_err(|e| Error::storage(format!("failed to write {}", dest.display()), e))?;
            written += chunk.len() as u64;
            progress.transferred(written, total).await;
        }

        file.flush()
            .await
            .map_err(|e| Error::storage(format!("failed to flush {}", dest.display()), e))?;

        if let Some(expected) = total
            && written != expected
        {
            return Err(Error::Network(format!(
                "container truncated: got {} of {} bytes",
                written, expected
            )));
        }

        tracing::debug!(book_id = %license.book_id, bytes = written, "container downloaded");
        Ok(written)
    }
}

async fn send(request: RequestBuilder, what: &str) -> Result<Response> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            Error::Network(format!("{} timed out", what))
        } else {
            Error::Network(format!("{} failed: {}", what, e))
        }
    })?;
    check_status(response, what)
}

/// Classify a provider response status into the pipeline's error kinds
fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Error::Auth(format!(
            "provider rejected the session during {} ({})",
            what, status
        )),
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Error::Network(format!("{} returned {}", what, status))
        }
        s if s.is_server_error() => Error::Network(format!("{} returned {}", what, s)),
        StatusCode::NOT_FOUND => Error::NotFound(format!("{} ({})", what, response.url().path())),
        s => Error::Other(format!("{} returned {}", what, s)),
    })
}

async fn decode<T: serde::de::DeserializeOwned>(response: Response, what: &str) -> Result<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| Error::Other(format!("invalid {} response: {}", what, e)))
}

#[derive(Deserialize)]
struct LibraryResponse {
    item: ProductItem,
}

#[derive(Deserialize)]
struct ProductItem {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    authors: Vec<Contributor>,
    #[serde(default)]
    runtime_length_min: Option<u64>,
}

#[derive(Deserialize)]
struct Contributor {
    name: String,
}

#[derive(Deserialize)]
struct LicenseResponse {
    content_license: ContentLicense,
}

#[derive(Deserialize)]
struct ContentLicense {
    #[serde(default)]
    status_code: Option<String>,
    #[serde(default)]
    content_metadata: Option<ContentMetadata>,
    #[serde(default)]
    license_response: Option<Voucher>,
}

#[derive(Deserialize)]
struct Voucher {
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    iv: Option<String>,
}

#[derive(Deserialize)]
struct MetadataResponse {
    content_metadata: ContentMetadata,
}

#[derive(Deserialize)]
struct ContentMetadata {
    #[serde(default)]
    content_url: Option<ContentUrl>,
    #[serde(default)]
    content_reference: Option<ContentReference>,
    #[serde(default)]
    chapter_info: Option<ChapterInfo>,
}

#[derive(Deserialize)]
struct ContentUrl {
    #[serde(default)]
    offline_url: Option<String>,
}

#[derive(Deserialize)]
struct ContentReference {
    #[serde(default)]
    content_size_in_bytes: Option<u64>,
}

#[derive(Deserialize, Default)]
struct ChapterInfo {
    #[serde(default)]
    chapters: Vec<RawChapter>,
    #[serde(default)]
    runtime_length_ms: Option<u64>,
}
