//! raglab-embed
//!
//! The embedding provider: a local candle XLM-RoBERTa encoder, a hashing
//! fake for tests, and [`EmbeddingHandle`], the once-initialized entry point
//! the rest of the workspace calls.

use anyhow::Result;
use tracing::info;

use raglab_core::config::EmbeddingSettings;
use raglab_core::traits::Embedder;

pub mod device;
pub mod fake;
pub mod handle;
pub mod model;
pub mod pool;
pub mod tokenize;

pub use fake::FakeEmbedder;
pub use handle::{sanitize_batch, EmbeddingHandle};
pub use model::{resolve_model_dir, EmbeddingModel};
pub use pool::masked_mean_l2;

/// Build the embedder described by `settings`. `APP_USE_FAKE_EMBEDDINGS=1`
/// (or `true`) forces the fake regardless of configuration.
pub fn get_default_embedder(settings: &EmbeddingSettings) -> Result<Box<dyn Embedder>> {
    let env_fake = std::env::var("APP_USE_FAKE_EMBEDDINGS")
        .ok()
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if env_fake || settings.use_fake {
        info!(dim = settings.fake_dim, "using FakeEmbedder");
        return Ok(Box::new(FakeEmbedder::new(settings.fake_dim)));
    }
    let dir = resolve_model_dir(settings.model_dir.as_deref())?;
    Ok(Box::new(EmbeddingModel::load(&dir, settings.max_len, settings.batch_size)?))
}
