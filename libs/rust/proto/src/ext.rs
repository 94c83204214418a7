//! Convenience methods on the generated messages.

use crate::serving::{model_server_config, ModelConfigList, ModelServerConfig, StatusProto, TensorShapeProto};
use crate::serving::tensor_shape_proto::Dim;

impl ModelServerConfig {
    pub fn from_list(list: ModelConfigList) -> Self {
        Self { config: Some(model_server_config::Config::ModelConfigList(list)) }
    }

    /// The model list, if this config carries one.
    pub fn model_config_list(&self) -> Option<&ModelConfigList> {
        match &self.config {
            Some(model_server_config::Config::ModelConfigList(list)) => Some(list),
            None => None,
        }
    }
}

impl StatusProto {
    /// `error_code` 0 is OK (`tensorflow::error::Code`).
    pub fn is_ok(&self) -> bool { self.error_code == 0 }
}

impl TensorShapeProto {
    pub fn from_dims(dims: &[i64]) -> Self {
        Self { dim: dims.iter().map(|&size| Dim { size, name: String::new() }).collect(), unknown_rank: false }
    }

    pub fn dims(&self) -> Vec<i64> { self.dim.iter().map(|d| d.size).collect() }
}
