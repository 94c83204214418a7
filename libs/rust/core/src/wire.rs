//! Wire Encoder: [`Document`] <-> `tensorflow.serving.ModelServerConfig`.
//!
//! `to_wire` is strict. A field the wire schema does not have, a value of the wrong
//! type, a repeated map key or a missing `name`/`base_path` is an error, never a
//! silent drop: a reload built from a truncated registry would unload models on
//! the server.

use prost::Message as _;
use serving_proto::serving::servable_version_policy::{All, Latest, PolicyChoice, Specific};
use serving_proto::{ModelConfig, ModelConfigList, ModelServerConfig, ServableVersionPolicy};
use std::collections::BTreeMap;
use thiserror::Error;

use crate::document::{Document, Message, Value};
use crate::registry::DEFAULT_MODEL_PLATFORM;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConversionError {
    #[error("`{message}` has no wire field named `{field}`")]
    UnknownField { message: &'static str, field: String },

    #[error("`{message}` is missing required field `{field}`")]
    MissingField { message: &'static str, field: &'static str },

    #[error("`{message}.{field}` expects a {expected}, found a {found}")]
    TypeMismatch {
        message: &'static str,
        field: &'static str,
        expected: &'static str,
        found: &'static str,
    },

    #[error("non-repeated field `{message}.{field}` appears {count} times")]
    Repeated { message: &'static str, field: &'static str, count: usize },

    #[error("map field `{message}.{field}` has key `{key}` more than once")]
    DuplicateKey { message: &'static str, field: &'static str, key: String },

    #[error("`{message}` sets more than one of: {fields}")]
    ConflictingOneof { message: &'static str, fields: String },

    #[error("value {value} of `{message}.{field}` does not fit the wire type")]
    OutOfRange { message: &'static str, field: &'static str, value: i64 },

    #[error("invalid wire bytes: {0}")]
    Decode(#[from] prost::DecodeError),
}

type Result<T> = std::result::Result<T, ConversionError>;

/// Typed view over one document message, named after the wire message it must match.
struct Fields<'a> {
    message: &'static str,
    inner: &'a Message,
}

impl<'a> Fields<'a> {
    fn new(message: &'static str, inner: &'a Message) -> Self { Self { message, inner } }

    fn only(&self, known: &[&'static str]) -> Result<()> {
        match self.inner.fields().iter().find(|f| !known.contains(&f.name.as_str())) {
            Some(f) => Err(ConversionError::UnknownField { message: self.message, field: f.name.clone() }),
            None => Ok(()),
        }
    }

    fn single(&self, field: &'static str) -> Result<Option<&'a Value>> {
        match self.inner.count(field) {
            0 | 1 => Ok(self.inner.get(field)),
            count => Err(ConversionError::Repeated { message: self.message, field, count }),
        }
    }

    fn mismatch(&self, field: &'static str, expected: &'static str, found: &Value) -> ConversionError {
        ConversionError::TypeMismatch { message: self.message, field, expected, found: found.kind() }
    }

    fn string(&self, field: &'static str) -> Result<Option<&'a str>> {
        match self.single(field)? {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.mismatch(field, "string", other)),
        }
    }

    fn required_string(&self, field: &'static str) -> Result<&'a str> {
        match self.string(field)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(ConversionError::MissingField { message: self.message, field }),
        }
    }

    fn int(&self, field: &'static str) -> Result<Option<i64>> {
        match self.single(field)? {
            None => Ok(None),
            Some(Value::Int(n)) => Ok(Some(*n)),
            Some(other) => Err(self.mismatch(field, "integer", other)),
        }
    }

    fn ints(&self, field: &'static str) -> Result<Vec<i64>> {
        self.inner
            .get_all(field)
            .map(|v| v.as_int().ok_or_else(|| self.mismatch(field, "integer", v)))
            .collect()
    }

    fn message(&self, field: &'static str) -> Result<Option<&'a Message>> {
        match self.single(field)? {
            None => Ok(None),
            Some(Value::Message(m)) => Ok(Some(m)),
            Some(other) => Err(self.mismatch(field, "message", other)),
        }
    }

    fn messages(&self, field: &'static str) -> Result<Vec<&'a Message>> {
        self.inner
            .get_all(field)
            .map(|v| v.as_message().ok_or_else(|| self.mismatch(field, "message", v)))
            .collect()
    }
}

/// Strict document -> wire conversion.
pub fn to_wire(document: &Document) -> Result<ModelServerConfig> {
    let root = Fields::new("ModelServerConfig", document.root());
    root.only(&["model_config_list"])?;
    let Some(list) = root.message("model_config_list")? else {
        return Ok(ModelServerConfig::default());
    };
    let list = Fields::new("ModelConfigList", list);
    list.only(&["config"])?;
    let config = list
        .messages("config")?
        .into_iter()
        .map(model_config_to_wire)
        .collect::<Result<Vec<_>>>()?;
    Ok(ModelServerConfig::from_list(ModelConfigList { config }))
}

fn model_config_to_wire(message: &Message) -> Result<ModelConfig> {
    let f = Fields::new("ModelConfig", message);
    f.only(&["name", "base_path", "model_platform", "model_version_policy", "version_labels"])?;
    let name = f.required_string("name")?.to_string();
    let base_path = f.required_string("base_path")?.to_string();
    let model_platform = f
        .string("model_platform")?
        .filter(|p| !p.is_empty())
        .unwrap_or(DEFAULT_MODEL_PLATFORM)
        .to_string();
    let model_version_policy = f.message("model_version_policy")?.map(policy_to_wire).transpose()?;

    let mut version_labels = BTreeMap::new();
    for entry in f.messages("version_labels")? {
        let e = Fields::new("VersionLabelsEntry", entry);
        e.only(&["key", "value"])?;
        let key = e.string("key")?.unwrap_or_default().to_string();
        let value = e.int("value")?.unwrap_or_default();
        if version_labels.contains_key(&key) {
            return Err(ConversionError::DuplicateKey { message: "ModelConfig", field: "version_labels", key });
        }
        version_labels.insert(key, value);
    }

    Ok(ModelConfig { name, base_path, model_platform, model_version_policy, version_labels })
}

fn policy_to_wire(message: &Message) -> Result<ServableVersionPolicy> {
    const CHOICES: [&str; 3] = ["latest", "all", "specific"];
    let f = Fields::new("ServableVersionPolicy", message);
    f.only(&CHOICES)?;
    let set: Vec<&str> = CHOICES.into_iter().filter(|c| message.count(c) > 0).collect();
    if set.len() > 1 {
        return Err(ConversionError::ConflictingOneof { message: f.message, fields: set.join(", ") });
    }

    let choice = if let Some(latest) = f.message("latest")? {
        let l = Fields::new("Latest", latest);
        l.only(&["num_versions"])?;
        let n = l.int("num_versions")?.unwrap_or_default();
        let num_versions = u32::try_from(n).map_err(|_| ConversionError::OutOfRange {
            message: "Latest",
            field: "num_versions",
            value: n,
        })?;
        PolicyChoice::Latest(Latest { num_versions })
    } else if let Some(all) = f.message("all")? {
        Fields::new("All", all).only(&[])?;
        PolicyChoice::All(All {})
    } else if let Some(specific) = f.message("specific")? {
        let s = Fields::new("Specific", specific);
        s.only(&["versions"])?;
        PolicyChoice::Specific(Specific { versions: s.ints("versions")? })
    } else {
        return Err(ConversionError::MissingField { message: f.message, field: "policy_choice" });
    };
    Ok(ServableVersionPolicy { policy_choice: Some(choice) })
}

/// Wire -> document. Empty proto3 scalars are left out of the mapping.
pub fn from_wire(config: &ModelServerConfig) -> Document {
    let mut root = Message::new();
    if let Some(list) = config.model_config_list() {
        let mut out = Message::new();
        for model in &list.config {
            out.push("config", model_config_from_wire(model));
        }
        root.push("model_config_list", out);
    }
    Document::new(root)
}

fn model_config_from_wire(model: &ModelConfig) -> Message {
    let mut m = Message::new();
    for (field, value) in [
        ("name", &model.name),
        ("base_path", &model.base_path),
        ("model_platform", &model.model_platform),
    ] {
        if !value.is_empty() {
            m.push(field, value.as_str());
        }
    }
    if let Some(policy) = &model.model_version_policy {
        m.push("model_version_policy", policy_from_wire(policy));
    }
    for (key, value) in &model.version_labels {
        m.push("version_labels", Message::new().with("key", key.as_str()).with("value", *value));
    }
    m
}

fn policy_from_wire(policy: &ServableVersionPolicy) -> Message {
    match &policy.policy_choice {
        Some(PolicyChoice::Latest(l)) => {
            let mut latest = Message::new();
            if l.num_versions != 0 {
                latest.push("num_versions", i64::from(l.num_versions));
            }
            Message::new().with("latest", latest)
        }
        Some(PolicyChoice::All(_)) => Message::new().with("all", Message::new()),
        Some(PolicyChoice::Specific(s)) => {
            let mut specific = Message::new();
            for v in &s.versions {
                specific.push("versions", *v);
            }
            Message::new().with("specific", specific)
        }
        None => Message::new(),
    }
}

/// Protobuf binary encoding of a config.
pub fn encode_wire(config: &ModelServerConfig) -> Vec<u8> {
    config.encode_to_vec()
}

pub fn decode_wire(bytes: &[u8]) -> Result<ModelServerConfig> {
    Ok(ModelServerConfig::decode(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc_with(configs: Vec<Message>) -> Document {
        let mut list = Message::new();
        for c in configs {
            list.push("config", c);
        }
        Document::new(Message::new().with("model_config_list", list))
    }

    fn entry(name: &str, path: &str) -> Message {
        Message::new().with("name", name).with("base_path", path)
    }

    #[test]
    fn converts_entries_in_order_with_default_platform() {
        let doc = doc_with(vec![entry("a", "/a"), entry("b", "/b").with("model_platform", "onnx")]);
        let wire = to_wire(&doc).unwrap();
        let models = &wire.model_config_list().unwrap().config;
        assert_eq!(models.len(), 2);
        assert_eq!(models[0].name, "a");
        assert_eq!(models[0].model_platform, DEFAULT_MODEL_PLATFORM);
        assert_eq!(models[1].model_platform, "onnx");
    }

    #[test]
    fn missing_name_is_rejected() {
        let doc = doc_with(vec![Message::new().with("base_path", "/a")]);
        assert_eq!(
            to_wire(&doc).unwrap_err(),
            ConversionError::MissingField { message: "ModelConfig", field: "name" }
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        let doc = doc_with(vec![entry("", "/a")]);
        assert!(matches!(to_wire(&doc), Err(ConversionError::MissingField { field: "name", .. })));
    }

    #[test]
    fn unknown_field_is_rejected() {
        let doc = doc_with(vec![entry("a", "/a").with("basePath", "/a")]);
        assert!(matches!(
            to_wire(&doc),
            Err(ConversionError::UnknownField { message: "ModelConfig", .. })
        ));
        let doc = Document::new(Message::new().with("custom_model_config", Message::new()));
        assert!(matches!(to_wire(&doc), Err(ConversionError::UnknownField { .. })));
    }

    #[test]
    fn wrong_value_type_is_rejected() {
        let doc = doc_with(vec![Message::new().with("name", 3i64).with("base_path", "/a")]);
        assert!(matches!(
            to_wire(&doc),
            Err(ConversionError::TypeMismatch { field: "name", expected: "string", found: "integer", .. })
        ));
    }

    #[test]
    fn repeated_singular_field_is_rejected() {
        let doc = doc_with(vec![entry("a", "/a").with("name", "b")]);
        assert!(matches!(to_wire(&doc), Err(ConversionError::Repeated { field: "name", count: 2, .. })));
    }

    #[test]
    fn version_policy_checks() {
        let both = Message::new().with("all", Message::new()).with("latest", Message::new());
        let doc = doc_with(vec![entry("a", "/a").with("model_version_policy", both)]);
        assert!(matches!(to_wire(&doc), Err(ConversionError::ConflictingOneof { .. })));

        let empty = doc_with(vec![entry("a", "/a").with("model_version_policy", Message::new())]);
        assert!(matches!(to_wire(&empty), Err(ConversionError::MissingField { field: "policy_choice", .. })));

        let big = Message::new().with("latest", Message::new().with("num_versions", i64::from(u32::MAX) + 1));
        let doc = doc_with(vec![entry("a", "/a").with("model_version_policy", big)]);
        assert!(matches!(to_wire(&doc), Err(ConversionError::OutOfRange { .. })));
    }

    #[test]
    fn from_wire_inverts_to_wire() {
        let policy = Message::new().with("specific", Message::new().with("versions", 1i64).with("versions", 7i64));
        let doc = doc_with(vec![
            entry("a", "/a").with("model_platform", "tensorflow").with("model_version_policy", policy),
            entry("b", "/b")
                .with("model_platform", "onnx")
                .with("version_labels", Message::new().with("key", "canary").with("value", 7i64))
                .with("version_labels", Message::new().with("key", "stable").with("value", 1i64)),
        ]);
        let wire = to_wire(&doc).unwrap();
        assert_eq!(from_wire(&wire), doc);
    }

    #[test]
    fn repeated_label_key_is_rejected() {
        let doc = doc_with(vec![entry("a", "/a")
            .with("version_labels", Message::new().with("key", "stable").with("value", 1i64))
            .with("version_labels", Message::new().with("key", "stable").with("value", 2i64))]);
        assert_eq!(
            to_wire(&doc).unwrap_err(),
            ConversionError::DuplicateKey { message: "ModelConfig", field: "version_labels", key: "stable".into() }
        );
    }

    #[test]
    fn from_wire_omits_default_scalars() {
        let wire = ModelServerConfig::from_list(ModelConfigList {
            config: vec![ModelConfig { name: "a".into(), ..Default::default() }],
        });
        let doc = from_wire(&wire);
        let cfg = doc.model_configs().next().unwrap();
        assert_eq!(cfg.len(), 1);
        assert!(cfg.get("base_path").is_none());
        assert_eq!(from_wire(&ModelServerConfig::default()), Document::default());
    }

    #[test]
    fn bytes_round_trip() {
        let wire = to_wire(&doc_with(vec![entry("a", "/a")])).unwrap();
        let bytes = encode_wire(&wire);
        assert_eq!(decode_wire(&bytes).unwrap(), wire);
        assert!(matches!(decode_wire(&[0x0a, 0x05, 0x01]), Err(ConversionError::Decode(_))));
    }
}
