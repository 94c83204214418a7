//! Client-side management of a model server's runtime model registry.
//!
//! The registry is held as typed [`ModelEntry`] records, read from and written to the
//! protobuf text encoding through [`text_format`], and converted to the
//! `ModelServerConfig` wire message through [`wire`] for a live reload.

use anyhow::Result;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_subscriber::prelude::*;

pub mod document;
pub mod prediction;
pub mod registry;
pub mod remote;
pub mod resilience;
pub mod settings;
pub mod text_format;
pub mod wire;

pub use serving_proto as proto;

pub use document::{Document, Field, Message, Value};
pub use prediction::{GrpcPredictionClient, RestPredictionClient, Tensor};
pub use registry::{ModelEntry, ModelRegistry, RegistryError, RegistryState, VersionPolicy, DEFAULT_MODEL_PLATFORM};
pub use remote::{ModelServerClient, RemoteError};
pub use resilience::{retry_async, RetryConfig};
pub use settings::{load_settings, ClientSettings};
pub use text_format::{decode_text, encode_text, ParseError, Position};
pub use wire::{decode_wire, encode_wire, from_wire, to_wire, ConversionError};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// Installs the global subscriber once. `RUST_LOG` wins over `log_level`.
pub fn init_tracing(service: &str, log_level: &str, json: bool) -> Result<()> {
    TRACING_INIT.get_or_try_init(|| -> Result<()> {
        let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .or_else(|_| tracing_subscriber::EnvFilter::try_new(log_level))?;
        let json_layer = json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .flatten_event(true)
                .with_current_span(true)
                .with_span_list(false)
                .with_writer(std::io::stderr)
        });
        let text_layer = (!json).then(|| {
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_line_number(true)
                .with_writer(std::io::stderr)
        });
        tracing_subscriber::registry().with(env_filter).with(json_layer).with(text_layer).try_init()?;
        Ok(())
    })?;
    info!(service, "tracing initialized");
    Ok(())
}
