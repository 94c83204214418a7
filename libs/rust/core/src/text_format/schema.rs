//! Field tables for the `ModelServerConfig` message tree accepted by the text codec.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Int64,
    UInt32,
}

#[derive(Debug, Clone, Copy)]
pub enum FieldKind {
    Scalar(ScalarKind),
    Message(&'static MessageSchema),
}

#[derive(Debug)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldKind,
    pub repeated: bool,
    /// Members of the same oneof exclude each other.
    pub oneof: Option<&'static str>,
}

#[derive(Debug)]
pub struct MessageSchema {
    pub name: &'static str,
    pub fields: &'static [FieldSchema],
}

impl MessageSchema {
    pub fn field(&'static self, name: &str) -> Option<&'static FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }
}

const fn scalar(name: &'static str, kind: ScalarKind) -> FieldSchema {
    FieldSchema { name, kind: FieldKind::Scalar(kind), repeated: false, oneof: None }
}

pub static MODEL_SERVER_CONFIG: MessageSchema = MessageSchema {
    name: "ModelServerConfig",
    fields: &[FieldSchema {
        name: "model_config_list",
        kind: FieldKind::Message(&MODEL_CONFIG_LIST),
        repeated: false,
        oneof: Some("config"),
    }],
};

pub static MODEL_CONFIG_LIST: MessageSchema = MessageSchema {
    name: "ModelConfigList",
    fields: &[FieldSchema {
        name: "config",
        kind: FieldKind::Message(&MODEL_CONFIG),
        repeated: true,
        oneof: None,
    }],
};

pub static MODEL_CONFIG: MessageSchema = MessageSchema {
    name: "ModelConfig",
    fields: &[
        scalar("name", ScalarKind::String),
        scalar("base_path", ScalarKind::String),
        scalar("model_platform", ScalarKind::String),
        FieldSchema {
            name: "model_version_policy",
            kind: FieldKind::Message(&SERVABLE_VERSION_POLICY),
            repeated: false,
            oneof: None,
        },
        FieldSchema {
            name: "version_labels",
            kind: FieldKind::Message(&VERSION_LABELS_ENTRY),
            repeated: true,
            oneof: None,
        },
    ],
};

/// Map entry for `map<string, int64> version_labels`.
pub static VERSION_LABELS_ENTRY: MessageSchema = MessageSchema {
    name: "VersionLabelsEntry",
    fields: &[scalar("key", ScalarKind::String), scalar("value", ScalarKind::Int64)],
};

pub static SERVABLE_VERSION_POLICY: MessageSchema = MessageSchema {
    name: "ServableVersionPolicy",
    fields: &[
        FieldSchema { name: "latest", kind: FieldKind::Message(&LATEST_POLICY), repeated: false, oneof: Some("policy_choice") },
        FieldSchema { name: "all", kind: FieldKind::Message(&ALL_POLICY), repeated: false, oneof: Some("policy_choice") },
        FieldSchema { name: "specific", kind: FieldKind::Message(&SPECIFIC_POLICY), repeated: false, oneof: Some("policy_choice") },
    ],
};

pub static LATEST_POLICY: MessageSchema = MessageSchema {
    name: "Latest",
    fields: &[scalar("num_versions", ScalarKind::UInt32)],
};

pub static ALL_POLICY: MessageSchema = MessageSchema { name: "All", fields: &[] };

pub static SPECIFIC_POLICY: MessageSchema = MessageSchema {
    name: "Specific",
    fields: &[FieldSchema {
        name: "versions",
        kind: FieldKind::Scalar(ScalarKind::Int64),
        repeated: true,
        oneof: None,
    }],
};
