//! Thin prediction clients over gRPC (`PredictionService/Predict`) and the
//! HTTP+JSON API (`POST /v1/models/{name}:predict`).

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use serving_proto::serving::model_spec::VersionChoice;
use serving_proto::serving::prediction_service_client::PredictionServiceClient;
use serving_proto::serving::{DataType, ModelSpec, PredictRequest, TensorProto, TensorShapeProto};
use tonic::transport::Channel;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::remote::{endpoint, with_timeout, RemoteError};

pub const DEFAULT_SIGNATURE: &str = "serving_default";

/// Dense float tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    shape: Vec<i64>,
    values: Vec<f32>,
}

fn element_count(shape: &[i64]) -> Result<usize, RemoteError> {
    shape.iter().try_fold(1usize, |acc, &d| {
        let d = usize::try_from(d).map_err(|_| RemoteError::InvalidTensor(format!("negative dimension {d}")))?;
        acc.checked_mul(d).ok_or_else(|| RemoteError::InvalidTensor("shape overflows".into()))
    })
}

impl Tensor {
    pub fn new(shape: Vec<i64>, values: Vec<f32>) -> Result<Self, RemoteError> {
        let expected = element_count(&shape)?;
        if expected != values.len() {
            return Err(RemoteError::InvalidTensor(format!(
                "shape {:?} needs {} values, got {}",
                shape,
                expected,
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }

    /// Rank-1 tensor over `values`.
    pub fn vector(values: Vec<f32>) -> Self {
        Self { shape: vec![values.len() as i64], values }
    }

    pub fn shape(&self) -> &[i64] { &self.shape }
    pub fn values(&self) -> &[f32] { &self.values }
    pub fn into_values(self) -> Vec<f32> { self.values }

    pub fn reshape(self, shape: Vec<i64>) -> Result<Self, RemoteError> {
        Self::new(shape, self.values)
    }

    pub fn to_proto(&self) -> TensorProto {
        TensorProto {
            dtype: DataType::DtFloat as i32,
            tensor_shape: Some(TensorShapeProto::from_dims(&self.shape)),
            float_val: self.values.clone(),
            ..Default::default()
        }
    }

    /// Reads a `DT_FLOAT` tensor from either `float_val` or packed little-endian `tensor_content`.
    pub fn from_proto(proto: &TensorProto) -> Result<Self, RemoteError> {
        if proto.dtype != DataType::DtFloat as i32 {
            return Err(RemoteError::InvalidTensor(format!("expected DT_FLOAT, got dtype {}", proto.dtype)));
        }
        let values = if !proto.tensor_content.is_empty() {
            if proto.tensor_content.len() % 4 != 0 {
                return Err(RemoteError::InvalidTensor(format!(
                    "tensor_content length {} is not a multiple of 4",
                    proto.tensor_content.len()
                )));
            }
            proto
                .tensor_content
                .chunks_exact(4)
                .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                .collect()
        } else {
            proto.float_val.clone()
        };
        match &proto.tensor_shape {
            Some(shape) if !shape.unknown_rank => Self::new(shape.dims(), values),
            _ => Ok(Self::vector(values)),
        }
    }
}

pub fn build_predict_request(model: &str, version: Option<i64>, input_name: &str, input: &Tensor) -> PredictRequest {
    PredictRequest {
        model_spec: Some(ModelSpec {
            name: model.to_string(),
            signature_name: DEFAULT_SIGNATURE.to_string(),
            version_choice: version.map(VersionChoice::Version),
        }),
        inputs: HashMap::from([(input_name.to_string(), input.to_proto())]),
        output_filter: Vec::new(),
    }
}

#[derive(Debug, Clone)]
pub struct GrpcPredictionClient {
    inner: PredictionServiceClient<Channel>,
    timeout: Duration,
}

impl GrpcPredictionClient {
    pub async fn connect(uri: &str, timeout: Duration) -> Result<Self, RemoteError> {
        let channel = endpoint(uri, timeout)?.connect().await?;
        Ok(Self { inner: PredictionServiceClient::new(channel), timeout })
    }

    pub async fn predict(
        &mut self,
        model: &str,
        version: Option<i64>,
        input_name: &str,
        input: &Tensor,
        output_name: &str,
    ) -> Result<Tensor, RemoteError> {
        let request = build_predict_request(model, version, input_name, input);
        let response = with_timeout(self.timeout, self.inner.predict(request)).await?.into_inner();
        debug!(model, outputs = response.outputs.len(), "predict response");
        let output = response
            .outputs
            .get(output_name)
            .ok_or_else(|| RemoteError::MissingOutput(output_name.to_string()))?;
        Tensor::from_proto(output)
    }
}

#[derive(Debug, Clone)]
pub struct RestPredictionClient {
    http: reqwest::Client,
    base_url: String,
}

impl RestPredictionClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url: base_url.into().trim_end_matches('/').to_string() })
    }

    pub fn predict_url(&self, model: &str, version: Option<i64>) -> String {
        match version {
            Some(v) => format!("{}/v1/models/{}/versions/{}:predict", self.base_url, model, v),
            None => format!("{}/v1/models/{}:predict", self.base_url, model),
        }
    }

    /// Posts `instances` and returns the `predictions` array.
    pub async fn predict(&self, model: &str, version: Option<i64>, instances: Value) -> Result<Value, RemoteError> {
        let url = self.predict_url(model, version);
        let body = json!({ "signature_name": DEFAULT_SIGNATURE, "instances": instances });
        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_string))
                .unwrap_or(text);
            return Err(RemoteError::Server { status: status.as_u16(), message });
        }
        let mut payload: Value = serde_json::from_str(&text)?;
        debug!(%url, "predict response");
        payload
            .get_mut("predictions")
            .map(Value::take)
            .ok_or_else(|| RemoteError::MissingOutput("predictions".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_shape_must_match_values() {
        assert!(Tensor::new(vec![2, 2], vec![1.0; 4]).is_ok());
        assert!(matches!(Tensor::new(vec![2, 3], vec![1.0; 4]), Err(RemoteError::InvalidTensor(_))));
        assert!(matches!(Tensor::new(vec![-1], vec![]), Err(RemoteError::InvalidTensor(_))));
        let t = Tensor::vector(vec![1.0, 2.0, 3.0, 4.0]).reshape(vec![2, 2]).unwrap();
        assert_eq!(t.shape(), &[2, 2]);
        assert!(t.reshape(vec![3]).is_err());
    }

    #[test]
    fn proto_uses_float_val() {
        let t = Tensor::new(vec![1, 3], vec![0.5, 1.5, 2.5]).unwrap();
        let proto = t.to_proto();
        assert_eq!(proto.dtype, DataType::DtFloat as i32);
        assert_eq!(proto.tensor_shape.as_ref().unwrap().dims(), vec![1, 3]);
        assert_eq!(Tensor::from_proto(&proto).unwrap(), t);
    }

    #[test]
    fn proto_reads_tensor_content() {
        let bytes: Vec<u8> = [1.0f32, -2.0].iter().flat_map(|v| v.to_le_bytes()).collect();
        let proto = TensorProto {
            dtype: DataType::DtFloat as i32,
            tensor_shape: Some(TensorShapeProto::from_dims(&[2])),
            tensor_content: bytes,
            ..Default::default()
        };
        assert_eq!(Tensor::from_proto(&proto).unwrap().values(), &[1.0, -2.0]);

        let truncated = TensorProto { tensor_content: vec![0, 0, 0], ..proto };
        assert!(Tensor::from_proto(&truncated).is_err());
    }

    #[test]
    fn proto_rejects_other_dtypes() {
        let proto = TensorProto { dtype: DataType::DtInt64 as i32, int64_val: vec![1], ..Default::default() };
        assert!(matches!(Tensor::from_proto(&proto), Err(RemoteError::InvalidTensor(_))));
    }

    #[test]
    fn request_carries_signature_and_version() {
        let req = build_predict_request("resnet", Some(3), "images", &Tensor::vector(vec![1.0]));
        let spec = req.model_spec.unwrap();
        assert_eq!(spec.name, "resnet");
        assert_eq!(spec.signature_name, DEFAULT_SIGNATURE);
        assert_eq!(spec.version_choice, Some(VersionChoice::Version(3)));
        assert!(req.inputs.contains_key("images"));
        assert!(build_predict_request("m", None, "x", &Tensor::vector(vec![])).model_spec.unwrap().version_choice.is_none());
    }

    #[test]
    fn rest_urls() {
        let client = RestPredictionClient::new("http://localhost:8501/", Duration::from_secs(1)).unwrap();
        assert_eq!(client.predict_url("half", None), "http://localhost:8501/v1/models/half:predict");
        assert_eq!(client.predict_url("half", Some(2)), "http://localhost:8501/v1/models/half/versions/2:predict");
    }
}
