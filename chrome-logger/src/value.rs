//! Runtime values and their console rendering.
//!
//! Hosts hand the logger [`Value`]s: messages to record and the arguments of
//! captured stack frames. Two renderings exist:
//!
//! - [`ValueSerializer`] turns a message into a JSON tree. Objects become
//!   `{"Type#id": {property: ...}}` and an object identity met a second time
//!   within the same pass is replaced by its `Type#id` back-reference token,
//!   so cyclic graphs serialize in bounded time and size. Nesting deeper
//!   than [`MAX_SERIALIZE_DEPTH`] is cut off with the same tokens.
//! - [`flatten_argument`] turns a frame argument into a short display token
//!   (`integer[5]`, `"some strin…"`, `array[3]`, `callable[Router::dispatch]`).
//!   This form is intentionally lossy.

use crate::config::LoggerConfig;
use crate::constants::{ELLIPSIS, MAX_SERIALIZE_DEPTH, STRING_PREVIEW_LEN};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value as JsonValue};
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Host-supplied object number, shown in `Type#id` tokens.
pub type ObjectId = u64;

/// A host object with an identity, a type name and mutable properties.
pub struct Object {
    id: ObjectId,
    class: String,
    properties: RwLock<IndexMap<String, Value>>,
}

/// Shared reference to a host [`Object`].
///
/// Properties are interior-mutable so graphs with cycles can be built:
///
/// ```rust
/// use chrome_logger::{ObjectHandle, Value};
///
/// let parent = ObjectHandle::new(1, "Node");
/// let child = ObjectHandle::new(2, "Node");
/// child.set("parent", parent.clone());
/// parent.set("child", child.clone());
/// # parent.clear();
/// ```
///
/// A cycle of handles keeps its objects alive until one of them is cleared.
#[derive(Clone)]
pub struct ObjectHandle(Arc<Object>);

impl ObjectHandle {
    /// Creates an object with no properties.
    ///
    /// `id` only labels the object in output. Identity for cycle detection
    /// is the handle itself, so two objects sharing an id are still both
    /// expanded, though their tokens then look alike.
    pub fn new(id: ObjectId, class: impl Into<String>) -> Self {
        Self(Arc::new(Object {
            id,
            class: class.into(),
            properties: RwLock::new(IndexMap::new()),
        }))
    }

    /// Builder form of [`ObjectHandle::set`].
    pub fn with_property(self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Sets or replaces a property.
    pub fn set(&self, name: impl Into<String>, value: impl Into<Value>) {
        self.0
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), value.into());
    }

    /// Removes every property, breaking any cycle through this object.
    pub fn clear(&self) {
        self.0
            .properties
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Returns the object identity.
    pub fn id(&self) -> ObjectId {
        self.0.id
    }

    /// Address of the shared object, equal for every clone of this handle.
    pub(crate) fn identity(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    /// Returns the fully qualified type name.
    pub fn class(&self) -> &str {
        &self.0.class
    }

    /// Returns a snapshot of the properties in declaration order.
    pub fn properties(&self) -> Vec<(String, Value)> {
        self.0
            .properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl fmt::Debug for ObjectHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // properties are skipped, they may lead back here
        f.debug_struct("Object")
            .field("id", &self.0.id)
            .field("class", &self.0.class)
            .finish()
    }
}

/// A callable value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Callable {
    /// An invokable object, rendered `callable[Type]`.
    Invokable {
        /// Type of the invokable object
        class: String,
    },
    /// A bound or static method, rendered `callable[Owner::member]`.
    Method {
        /// Owning type
        owner: String,
        /// Method name
        member: String,
    },
    /// A closure or function name with no owner, rendered `callable[lambda]`.
    Anonymous,
}

/// A host runtime value.
#[derive(Debug, Clone, Default)]
pub enum Value {
    /// Absence of a value
    #[default]
    Null,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Floating point number
    Float(f64),
    /// String
    Str(String),
    /// Ordered sequence
    List(Vec<Value>),
    /// Ordered string-keyed map
    Map(IndexMap<String, Value>),
    /// Shared object reference
    Object(ObjectHandle),
    /// Callable value
    Callable(Callable),
    /// Opaque host resource (file handle, socket...) of the given kind
    Resource(String),
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<ObjectHandle> for Value {
    fn from(v: ObjectHandle) -> Self {
        Self::Object(v)
    }
}

impl From<Callable> for Value {
    fn from(v: Callable) -> Self {
        Self::Callable(v)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Self::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        match v {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(b),
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            JsonValue::String(s) => Self::Str(s),
            JsonValue::Array(items) => Self::List(items.into_iter().map(Into::into).collect()),
            JsonValue::Object(map) => {
                Self::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl Value {
    /// Host-style type name used by argument flattening.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Bool(_) => "boolean",
            Self::Int(_) => "integer",
            Self::Float(_) => "double",
            Self::Str(_) => "string",
            Self::List(_) | Self::Map(_) => "array",
            Self::Object(_) => "object",
            Self::Callable(_) => "callable",
            Self::Resource(_) => "resource",
        }
    }
}

/// Serializes message values into JSON trees.
///
/// The visited set lives for one serializer; [`serialize_value`] builds a
/// fresh one for every top-level call.
pub struct ValueSerializer<'a> {
    config: &'a LoggerConfig,
    seen: HashSet<usize>,
}

impl<'a> ValueSerializer<'a> {
    /// Creates a serializer with an empty visited set.
    pub fn new(config: &'a LoggerConfig) -> Self {
        Self {
            config,
            seen: HashSet::new(),
        }
    }

    /// Serializes `value`, emitting back-reference tokens for repeated objects.
    ///
    /// Containers nested [`MAX_SERIALIZE_DEPTH`] levels down are not expanded:
    /// objects become their `Type#id` token and lists or maps their
    /// flattened form.
    pub fn serialize(&mut self, value: &Value) -> JsonValue {
        self.serialize_at(value, 0)
    }

    fn serialize_at(&mut self, value: &Value, depth: usize) -> JsonValue {
        match value {
            Value::Null => JsonValue::Null,
            Value::Bool(b) => JsonValue::Bool(*b),
            Value::Int(i) => JsonValue::Number((*i).into()),
            // NaN and infinities have no JSON form
            Value::Float(f) => Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            Value::Str(s) => JsonValue::String(s.clone()),
            Value::List(_) | Value::Map(_) if depth >= MAX_SERIALIZE_DEPTH => {
                JsonValue::String(flatten_argument(value, self.config))
            }
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.serialize_at(item, depth + 1))
                    .collect(),
            ),
            Value::Map(map) => JsonValue::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.serialize_at(v, depth + 1)))
                    .collect(),
            ),
            Value::Object(object) => self.serialize_object(object, depth),
            Value::Callable(_) | Value::Resource(_) => {
                JsonValue::String(flatten_argument(value, self.config))
            }
        }
    }

    fn serialize_object(&mut self, object: &ObjectHandle, depth: usize) -> JsonValue {
        let token = format!(
            "{}#{}",
            self.config.unnamespace(object.class()),
            object.id()
        );

        // Too deep objects are not marked seen, so a shallower path may still expand them
        if depth >= MAX_SERIALIZE_DEPTH || !self.seen.insert(object.identity()) {
            return JsonValue::String(token);
        }

        let properties: Map<String, JsonValue> = object
            .properties()
            .iter()
            .map(|(name, value)| (name.clone(), self.serialize_at(value, depth + 1)))
            .collect();

        let mut wrapper = Map::with_capacity(1);
        wrapper.insert(token, JsonValue::Object(properties));
        JsonValue::Object(wrapper)
    }
}

/// Serializes one message value with its own visited set.
pub fn serialize_value(value: &Value, config: &LoggerConfig) -> JsonValue {
    ValueSerializer::new(config).serialize(value)
}

/// Renders a frame argument as a short display token.
///
/// Arrays are never descended into, so this terminates on any graph.
pub fn flatten_argument(value: &Value, config: &LoggerConfig) -> String {
    match value {
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Int(i) => format!("integer[{}]", i),
        Value::Float(f) => format!("double[{}]", f),
        Value::Str(s) if is_numeric(s) => format!("string[{}]", s),
        Value::Str(s) => format!("\"{}\"", preview(s)),
        Value::Callable(Callable::Invokable { class }) => {
            format!("callable[{}]", config.unnamespace(class))
        }
        Value::Callable(Callable::Method { owner, member }) => {
            format!("callable[{}::{}]", config.unnamespace(owner), member)
        }
        Value::Callable(Callable::Anonymous) => "callable[lambda]".to_string(),
        Value::Object(object) => config.unnamespace(object.class()).to_string(),
        Value::List(items) => format!("array[{}]", items.len()),
        Value::Map(map) => format!("array[{}]", map.len()),
        Value::Resource(kind) => format!("resource[{}]", kind),
        Value::Null => value.type_name().to_string(),
    }
}

fn preview(s: &str) -> String {
    match s.char_indices().nth(STRING_PREVIEW_LEN) {
        Some((cut, _)) => format!("{}{}", &s[..cut], ELLIPSIS),
        None => s.to_string(),
    }
}

fn is_numeric(s: &str) -> bool {
    let trimmed = s.trim();
    !trimmed.is_empty() && trimmed.parse::<f64>().is_ok_and(f64::is_finite)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config() -> LoggerConfig {
        LoggerConfig::new()
    }

    #[test]
    fn test_flatten_scalars() {
        let config = config();
        assert_eq!(flatten_argument(&Value::Bool(true), &config), "TRUE");
        assert_eq!(flatten_argument(&Value::Int(5), &config), "integer[5]");
        assert_eq!(flatten_argument(&Value::Float(1.5), &config), "double[1.5]");
        assert_eq!(flatten_argument(&"42".into(), &config), "string[42]");
        assert_eq!(flatten_argument(&Value::Null, &config), "NULL");
    }

    #[test]
    fn test_flatten_truncates_long_strings() {
        let config = config();
        assert_eq!(flatten_argument(&"short".into(), &config), "\"short\"");
        assert_eq!(
            flatten_argument(&"exactly10!".into(), &config),
            "\"exactly10!\""
        );
        assert_eq!(
            flatten_argument(&"hello world, again".into(), &config),
            "\"hello worl…\""
        );
    }

    #[test]
    fn test_flatten_truncation_is_char_safe() {
        let config = config();
        let flattened = flatten_argument(&"ééééééééééé".into(), &config);
        assert_eq!(flattened, "\"éééééééééé…\"");
    }

    #[test]
    fn test_flatten_callables() {
        let config = config();
        let method = Value::Callable(Callable::Method {
            owner: "app::Router".into(),
            member: "dispatch".into(),
        });
        assert_eq!(
            flatten_argument(&method, &config),
            "callable[Router::dispatch]"
        );
        let invokable = Value::Callable(Callable::Invokable {
            class: "app::Job".into(),
        });
        assert_eq!(flatten_argument(&invokable, &config), "callable[Job]");
        assert_eq!(
            flatten_argument(&Value::Callable(Callable::Anonymous), &config),
            "callable[lambda]"
        );
    }

    #[test]
    fn test_flatten_containers_are_shallow() {
        let config = config();
        let list: Value = vec![1, 2, 3].into();
        assert_eq!(flatten_argument(&list, &config), "array[3]");
        let object = ObjectHandle::new(7, "app::models::User");
        assert_eq!(flatten_argument(&object.into(), &config), "User");
    }

    #[test]
    fn test_serialize_object() {
        let config = config();
        let user = ObjectHandle::new(3, "app::User")
            .with_property("name", "ana")
            .with_property("age", 31);
        assert_eq!(
            serialize_value(&user.into(), &config),
            json!({"User#3": {"name": "ana", "age": 31}})
        );
    }

    #[test]
    fn test_serialize_self_reference() {
        let config = config();
        let node = ObjectHandle::new(1, "Node");
        node.set("me", node.clone());

        assert_eq!(
            serialize_value(&node.clone().into(), &config),
            json!({"Node#1": {"me": "Node#1"}})
        );
        node.clear();
    }

    #[test]
    fn test_visited_set_is_per_call() {
        let config = config();
        let leaf = ObjectHandle::new(9, "Leaf");
        let first = serialize_value(&leaf.clone().into(), &config);
        let second = serialize_value(&leaf.into(), &config);
        assert_eq!(first, second);
        assert_eq!(first, json!({"Leaf#9": {}}));
    }

    #[test]
    fn test_serialize_non_finite_float() {
        assert_eq!(
            serialize_value(&Value::Float(f64::NAN), &config()),
            JsonValue::Null
        );
    }

    #[test]
    fn test_from_json() {
        let value: Value = json!({"a": [1, "x"], "b": null}).into();
        assert_eq!(
            serialize_value(&value, &config()),
            json!({"a": [1, "x"], "b": null})
        );
    }
}
