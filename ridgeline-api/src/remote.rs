//! # Remote Client
//!
//! Talk to a running Ridgeline server over its JSON API. Error bodies are
//! mapped back to the engine's error kinds by their code.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde::de::DeserializeOwned;

use ridgeline_core::error::{Error, Result};
use ridgeline_core::{BuildStats, FeatureVector, IndexStats, SearchResult};

use crate::extractor::GrayImage;
use crate::server::{
    BatchImage, EncodedImage, ErrorBody, ExtractResponse, HealthResponse, ImageBatchRequest,
    ImageBatchResponse, ImageRequest, PreprocessResponse, SearchRequest, SearchResponse,
};

fn transport(e: reqwest::Error) -> Error {
    Error::Remote { message: e.to_string() }
}

/// Client for a remote Ridgeline server
pub struct RemoteClient {
    base_url: String,
    client: reqwest::Client,
}

impl RemoteClient {
    /// Connect and check `/health`
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self> {
        let base_url = endpoint.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::new();

        let remote = Self { base_url, client };
        remote.health().await.map_err(|e| Error::Remote {
            message: format!("connection to {} failed: {}", remote.base_url, e),
        })?;
        Ok(remote)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let resp = self
            .client
            .get(format!("{}/health", self.base_url))
            .send()
            .await
            .map_err(transport)?;
        read(resp).await
    }

    /// Stats of the served generation; the descriptive fields are dropped
    pub async fn stats(&self) -> Result<IndexStats> {
        let resp = self
            .client
            .get(format!("{}/stats", self.base_url))
            .send()
            .await
            .map_err(transport)?;
        read(resp).await
    }

    pub async fn search_vector(&self, vector: &[f64], top_k: usize) -> Result<Vec<SearchResult>> {
        self.search(SearchRequest {
            vector: Some(vector.to_vec()),
            image: None,
            top_k: Some(top_k),
        })
        .await
    }

    pub async fn search_image(&self, image: &[u8], top_k: usize) -> Result<Vec<SearchResult>> {
        self.search(SearchRequest {
            vector: None,
            image: Some(BASE64.encode(image)),
            top_k: Some(top_k),
        })
        .await
    }

    async fn search(&self, req: SearchRequest) -> Result<Vec<SearchResult>> {
        let resp = self
            .client
            .post(format!("{}/search", self.base_url))
            .json(&req)
            .send()
            .await
            .map_err(transport)?;
        let body: SearchResponse = read(resp).await?;
        Ok(body.results)
    }

    pub async fn extract(&self, image: &[u8]) -> Result<FeatureVector> {
        let resp = self
            .client
            .post(format!("{}/extract", self.base_url))
            .json(&ImageRequest { image: BASE64.encode(image) })
            .send()
            .await
            .map_err(transport)?;
        let body: ExtractResponse = read(resp).await?;
        Ok(body.vector)
    }

    /// What the server's preprocessor makes of `image`
    pub async fn preprocess(&self, image: &[u8]) -> Result<GrayImage> {
        let resp = self
            .client
            .post(format!("{}/preprocess", self.base_url))
            .json(&ImageRequest { image: BASE64.encode(image) })
            .send()
            .await
            .map_err(transport)?;
        let body: PreprocessResponse = read(resp).await?;
        let pixels = BASE64.decode(&body.pixels).map_err(|e| Error::Remote {
            message: format!("preprocessed pixels are not valid base64: {}", e),
        })?;
        GrayImage::new(body.width, body.height, pixels)
    }

    pub async fn rebuild(&self) -> Result<BuildStats> {
        let resp = self
            .client
            .post(format!("{}/rebuild", self.base_url))
            .send()
            .await
            .map_err(transport)?;
        read(resp).await
    }

    /// Dataset image bytes; `None` on 404
    pub async fn fetch_image(&self, filename: &str) -> Result<Option<Vec<u8>>> {
        let resp = self
            .client
            .get(format!("{}/images/{}", self.base_url, filename))
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::Remote {
                message: format!("image {} returned {}", filename, resp.status()),
            });
        }
        let bytes = resp.bytes().await.map_err(transport)?;
        Ok(Some(bytes.to_vec()))
    }

    /// Dataset image as base64 JSON; `None` on 404
    pub async fn fetch_image_base64(&self, filename: &str) -> Result<Option<EncodedImage>> {
        let resp = self
            .client
            .get(format!("{}/image-base64/{}", self.base_url, filename))
            .send()
            .await
            .map_err(transport)?;
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(Error::Remote {
                message: format!("image {} returned {}", filename, resp.status()),
            });
        }
        resp.json().await.map(Some).map_err(transport)
    }

    /// Several dataset images in one round trip, in request order
    pub async fn fetch_images(&self, filenames: &[String]) -> Result<Vec<BatchImage>> {
        let resp = self
            .client
            .post(format!("{}/images-batch", self.base_url))
            .json(&ImageBatchRequest { filenames: filenames.to_vec() })
            .send()
            .await
            .map_err(transport)?;
        let body: ImageBatchResponse = read(resp).await?;
        Ok(body.images)
    }
}

async fn read<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    let status = resp.status();
    if status.is_success() {
        return resp.json().await.map_err(transport);
    }

    let body: ErrorBody = match resp.json().await {
        Ok(body) => body,
        Err(_) => {
            return Err(Error::Remote {
                message: format!("server returned {}", status),
            })
        }
    };
    Err(error_from_body(body))
}

fn error_from_body(body: ErrorBody) -> Error {
    let ErrorBody { error, code } = body;
    match code.as_str() {
        "NOT_INDEXED" => Error::NotIndexed,
        "MALFORMED_QUERY" => Error::MalformedQuery { message: error },
        "EXTRACTION_ERROR" => Error::Extraction { message: error },
        "CORRUPT_INDEX" => Error::CorruptIndex { details: error },
        "SEARCH_ERROR" => Error::Search { message: error },
        _ => Error::Remote { message: error },
    }
}
