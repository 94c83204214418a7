//! Mapping-shaped registry document shared by the text codec and the wire encoder.
//!
//! A [`Document`] is an ordered tree of named fields. A repeated field is the same
//! name appearing more than once, exactly as in the text encoding, so the tree keeps
//! both field order and repetition without knowing the schema.

/// A field value: scalar literal or nested message.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Message(Message),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self { Value::String(s) => Some(s), _ => None }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self { Value::Int(n) => Some(*n), _ => None }
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self { Value::Message(m) => Some(m), _ => None }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Int(_) => "integer",
            Value::Message(_) => "message",
        }
    }
}

impl From<&str> for Value { fn from(s: &str) -> Self { Value::String(s.to_string()) } }
impl From<String> for Value { fn from(s: String) -> Self { Value::String(s) } }
impl From<i64> for Value { fn from(n: i64) -> Self { Value::Int(n) } }
impl From<Message> for Value { fn from(m: Message) -> Self { Value::Message(m) } }

#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: String,
    pub value: Value,
}

/// Ordered list of fields.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Message {
    fields: Vec<Field>,
}

impl Message {
    pub fn new() -> Self { Self::default() }

    /// Builder form of [`Message::push`].
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.push(name, value);
        self
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.fields.push(Field { name: name.into(), value: value.into() });
        self
    }

    pub fn fields(&self) -> &[Field] { &self.fields }

    pub fn is_empty(&self) -> bool { self.fields.is_empty() }

    pub fn len(&self) -> usize { self.fields.len() }

    /// First value for `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|f| f.name == name).map(|f| &f.value)
    }

    /// Every value for `name`, in document order.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
        self.fields.iter().filter(move |f| f.name == name).map(|f| &f.value)
    }

    pub fn count(&self, name: &str) -> usize { self.get_all(name).count() }
}

/// Root of a registry document (a `ModelServerConfig` in mapping form).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Document {
    root: Message,
}

impl Document {
    pub fn new(root: Message) -> Self { Self { root } }

    /// Document holding an empty model list.
    pub fn blank() -> Self {
        Self::new(Message::new().with("model_config_list", Message::new()))
    }

    pub fn root(&self) -> &Message { &self.root }

    /// `model_config_list.config` messages, in order. Non-message values are skipped.
    pub fn model_configs(&self) -> impl Iterator<Item = &Message> + '_ {
        self.root
            .get_all("model_config_list")
            .filter_map(Value::as_message)
            .flat_map(|list| list.get_all("config").filter_map(Value::as_message))
    }
}
