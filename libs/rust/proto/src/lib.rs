// Generated protobuf modules via tonic's include_proto! macro.
// Every bundled schema is in package tensorflow.serving -> module `serving`.
// Usage example:
//   use serving_proto::serving::model_service_client::ModelServiceClient;
//   use serving_proto::{ModelServerConfig, ModelConfigList, ModelConfig};

pub mod serving { tonic::include_proto!("tensorflow.serving"); }

mod ext;

/// sha256 of the schema files compiled into [`serving`], set by build.rs.
pub const SCHEMA_VERSION: &str = env!("PROTO_SCHEMA_VERSION");

// Re-export frequently used config types at crate root
pub use serving::{ModelConfig, ModelConfigList, ModelServerConfig, ServableVersionPolicy};
