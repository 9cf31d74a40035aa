//! FAQ store backends.
//!
//! The engine only ever asks one question of the FAQ pipeline: how many
//! FAQs hang off a checksum. Three answers are available, selected by
//! `[faq_store].kind`:
//!
//! | Kind | Backend |
//! |------|---------|
//! | `sqlite` | active questions with a valid `faq_question_sources` row |
//! | `http` | `GET {url}?checksum=<hex>` returning `{"count": n}` |
//! | `disabled` | always zero |

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use content_sentinel_core::checksum::Checksum;
use content_sentinel_core::store::memory::NoFaqStore;
use content_sentinel_core::store::FaqStore;

use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// FAQ counts served by a remote HTTP endpoint.
pub struct HttpFaqStore {
    client: reqwest::Client,
    url: String,
}

#[derive(Deserialize)]
struct CountResponse {
    count: i64,
}

impl HttpFaqStore {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build FAQ store HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FaqStore for HttpFaqStore {
    async fn count_faqs(&self, checksum: &Checksum) -> Result<i64> {
        let resp = self
            .client
            .get(&self.url)
            .query(&[("checksum", checksum.as_str())])
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            bail!("FAQ store returned {}", status);
        }
        let body: CountResponse = resp.json().await?;
        if body.count < 0 {
            bail!("FAQ store returned a negative count: {}", body.count);
        }
        Ok(body.count)
    }
}

/// Pick the FAQ store backend named in the configuration.
pub fn build_faq_store(config: &Config, store: &SqliteStore) -> Result<Arc<dyn FaqStore>> {
    match config.faq_store.kind.as_str() {
        "sqlite" => Ok(Arc::new(store.clone())),
        "http" => {
            let url = config
                .faq_store
                .url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("faq_store.url is required for kind 'http'"))?;
            Ok(Arc::new(HttpFaqStore::new(
                url,
                config.detection.faq_timeout(),
            )?))
        }
        "disabled" => Ok(Arc::new(NoFaqStore)),
        other => bail!("Unknown FAQ store kind: '{}'", other),
    }
}
