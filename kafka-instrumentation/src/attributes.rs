use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use metrics::Label;

use crate::metrics_consts::{
    COMPRESSION_CODEC_KEY, DESTINATION_NAME_KEY, DESTINATION_PARTITION_KEY, ERROR_REASON_KEY,
    MESSAGING_SYSTEM, MESSAGING_SYSTEM_KEY, NAMESPACE_KEY, OPERATION_KEY, OUTCOME_KEY,
    RESERVED_KEYS, SOURCE_NAME_KEY, SOURCE_PARTITION_KEY, TOPIC_KEY,
};
use crate::outcome::Outcome;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AttributeValue {
    Str(Cow<'static, str>),
    Int(i64),
    Bool(bool),
}

impl fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttributeValue::Str(s) => f.write_str(s),
            AttributeValue::Int(i) => write!(f, "{i}"),
            AttributeValue::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&'static str> for AttributeValue {
    fn from(value: &'static str) -> Self {
        AttributeValue::Str(Cow::Borrowed(value))
    }
}

impl From<String> for AttributeValue {
    fn from(value: String) -> Self {
        AttributeValue::Str(Cow::Owned(value))
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        AttributeValue::Int(value)
    }
}

impl From<i32> for AttributeValue {
    fn from(value: i32) -> Self {
        AttributeValue::Int(i64::from(value))
    }
}

impl From<bool> for AttributeValue {
    fn from(value: bool) -> Self {
        AttributeValue::Bool(value)
    }
}

/// A single key/value pair, as returned by a topic attribute callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub key: Cow<'static, str>,
    pub value: AttributeValue,
}

impl Attribute {
    pub fn new(key: impl Into<Cow<'static, str>>, value: impl Into<AttributeValue>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Computes at most one extra attribute for a topic. Receives the topic without the
/// namespace prefix.
pub type TopicAttributeFn = Arc<dyn Fn(&str) -> Option<Attribute> + Send + Sync>;

/// Attributes attached to one metric observation. Keys are unique and kept sorted, so
/// two sets built from the same event shape compare equal whatever the insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeSet(BTreeMap<Cow<'static, str>, AttributeValue>);

impl AttributeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        key: impl Into<Cow<'static, str>>,
        value: impl Into<AttributeValue>,
    ) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<Cow<'static, str>>, value: impl Into<AttributeValue>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &AttributeValue)> {
        self.0.iter().map(|(k, v)| (&**k, v))
    }

    pub fn to_labels(&self) -> Vec<Label> {
        self.0
            .iter()
            .map(|(k, v)| Label::new(k.to_string(), v.to_string()))
            .collect()
    }

    // Reserved keys and keys already present keep their protocol-derived value.
    fn merge_dynamic(&mut self, attribute: Attribute) {
        if RESERVED_KEYS.contains(&&*attribute.key) || self.0.contains_key(&attribute.key) {
            return;
        }
        self.0.insert(attribute.key, attribute.value);
    }
}

#[derive(Clone, Copy)]
enum Direction {
    Destination,
    Source,
}

impl Direction {
    fn name_key(self) -> &'static str {
        match self {
            Direction::Destination => DESTINATION_NAME_KEY,
            Direction::Source => SOURCE_NAME_KEY,
        }
    }

    fn partition_key(self) -> &'static str {
        match self {
            Direction::Destination => DESTINATION_PARTITION_KEY,
            Direction::Source => SOURCE_PARTITION_KEY,
        }
    }
}

/// Builds the attribute sets for every event of one instrumentation instance.
#[derive(Clone)]
pub struct AttributeBuilder {
    namespace: String,
    base: AttributeSet,
    topic_attribute: Option<TopicAttributeFn>,
}

impl AttributeBuilder {
    pub fn new(namespace: impl Into<String>, topic_attribute: Option<TopicAttributeFn>) -> Self {
        let namespace = namespace.into();
        let base = AttributeSet::new()
            .with(MESSAGING_SYSTEM_KEY, MESSAGING_SYSTEM)
            .with(NAMESPACE_KEY, namespace.clone());
        Self {
            namespace,
            base,
            topic_attribute,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn base(&self) -> &AttributeSet {
        &self.base
    }

    /// The topic name on the wire for an application level topic.
    pub fn full_topic(&self, topic: &str) -> String {
        if self.namespace.is_empty() {
            topic.to_string()
        } else {
            format!("{}-{}", self.namespace, topic)
        }
    }

    /// The application level topic for a topic name on the wire.
    pub fn logical_topic<'a>(&self, full_topic: &'a str) -> &'a str {
        if self.namespace.is_empty() {
            return full_topic;
        }
        full_topic
            .strip_prefix(self.namespace.as_str())
            .and_then(|rest| rest.strip_prefix('-'))
            .unwrap_or(full_topic)
    }

    /// Attributes for a produced record. `codec` is only attached to successful events.
    pub fn destination(
        &self,
        full_topic: &str,
        partition: Option<i32>,
        outcome: &Outcome,
        codec: Option<&'static str>,
    ) -> AttributeSet {
        let mut set = self.topic_set(Direction::Destination, full_topic, partition);
        with_outcome(&mut set, outcome);
        if let (Outcome::Success, Some(codec)) = (outcome, codec) {
            set.insert(COMPRESSION_CODEC_KEY, codec);
        }
        self.apply_topic_attribute(&mut set, full_topic);
        set
    }

    /// Attributes for a fetched record. Fetches carry no outcome unless the event
    /// represents a processing failure.
    pub fn source(
        &self,
        full_topic: &str,
        partition: Option<i32>,
        outcome: Option<&Outcome>,
    ) -> AttributeSet {
        let mut set = self.topic_set(Direction::Source, full_topic, partition);
        if let Some(outcome) = outcome {
            with_outcome(&mut set, outcome);
        }
        self.apply_topic_attribute(&mut set, full_topic);
        set
    }

    /// Attributes for a broker round trip. No topic or partition, the operation name is
    /// passed through verbatim.
    pub fn rpc(&self, operation: &str, outcome: &Outcome) -> AttributeSet {
        self.base
            .clone()
            .with(OPERATION_KEY, operation.to_string())
            .with(OUTCOME_KEY, outcome.as_str())
    }

    fn topic_set(
        &self,
        direction: Direction,
        full_topic: &str,
        partition: Option<i32>,
    ) -> AttributeSet {
        let mut set = self
            .base
            .clone()
            .with(TOPIC_KEY, full_topic.to_string())
            .with(direction.name_key(), self.logical_topic(full_topic).to_string());
        if let Some(partition) = partition {
            set.insert(direction.partition_key(), partition);
        }
        set
    }

    fn apply_topic_attribute(&self, set: &mut AttributeSet, full_topic: &str) {
        let Some(topic_attribute) = &self.topic_attribute else {
            return;
        };
        if let Some(attribute) = topic_attribute(self.logical_topic(full_topic)) {
            set.merge_dynamic(attribute);
        }
    }
}

fn with_outcome(set: &mut AttributeSet, outcome: &Outcome) {
    set.insert(OUTCOME_KEY, outcome.as_str());
    if let Some(reason) = outcome.reason() {
        set.insert(ERROR_REASON_KEY, reason.as_str());
    }
}
