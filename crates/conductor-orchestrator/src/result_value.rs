//! Plain-data view of execution results.
//!
//! Results reach the synthesis prompt as JSON. [`ResultValue`] covers the
//! shapes the pipeline actually produces: conversation messages from the
//! execution agent, and JSON mappings, sequences and scalars.

use conductor_core::{Message, Role};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ResultValue {
    Message { role: String, content: String },
    Mapping(Vec<(String, ResultValue)>),
    Sequence(Vec<ResultValue>),
    Scalar(Value),
}

impl ResultValue {
    pub fn message(role: Role, content: impl Into<String>) -> Self {
        Self::Message {
            role: role.as_str().to_string(),
            content: content.into(),
        }
    }

    /// A whole conversation, one entry per message.
    pub fn conversation(messages: &[Message]) -> Self {
        Self::Sequence(messages.iter().map(Self::from).collect())
    }

    /// Plain JSON for prompts.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Message { role, content } => {
                let mut object = Map::new();
                object.insert("role".to_string(), Value::String(role.clone()));
                object.insert("content".to_string(), Value::String(content.clone()));
                Value::Object(object)
            }
            Self::Mapping(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            Self::Sequence(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Scalar(value) => value.clone(),
        }
    }
}

impl Serialize for ResultValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<&Message> for ResultValue {
    fn from(message: &Message) -> Self {
        Self::message(message.role, message.text())
    }
}

impl From<&Value> for ResultValue {
    fn from(value: &Value) -> Self {
        match value {
            Value::Object(object) => Self::Mapping(
                object
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::from(value)))
                    .collect(),
            ),
            Value::Array(items) => Self::Sequence(items.iter().map(Self::from).collect()),
            scalar => Self::Scalar(scalar.clone()),
        }
    }
}

impl From<Value> for ResultValue {
    fn from(value: Value) -> Self {
        Self::from(&value)
    }
}

impl<T: ToString> From<Result<Value, T>> for ResultValue {
    /// Anything that failed to become JSON is kept as its string form.
    fn from(result: Result<Value, T>) -> Self {
        match result {
            Ok(value) => Self::from(&value),
            Err(e) => Self::Scalar(Value::String(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_conversation_flattens_messages() {
        let messages = vec![
            Message::user("北京天气"),
            Message::tool_result("call_1", "晴 25°C", false),
            Message::assistant("北京今天晴，25°C。"),
        ];

        let value = ResultValue::conversation(&messages).to_json();
        assert_eq!(
            value,
            json!([
                {"role": "user", "content": "北京天气"},
                {"role": "tool", "content": "晴 25°C"},
                {"role": "assistant", "content": "北京今天晴，25°C。"}
            ])
        );
    }

    #[test]
    fn test_json_roundtrips_through_mapping() {
        let original = json!({"response": [1, "two", null], "config_name": "高德天气"});
        assert_eq!(ResultValue::from(&original).to_json(), original);
    }

    #[test]
    fn test_failed_value_degrades_to_string() {
        let failed: Result<Value, String> = Err("not serializable".to_string());
        assert_eq!(ResultValue::from(failed), ResultValue::Scalar(json!("not serializable")));
    }

    #[test]
    fn test_serialize_matches_to_json() {
        let value = ResultValue::from(json!({"a": [{"b": 1}]}));
        assert_eq!(serde_json::to_value(&value).unwrap(), value.to_json());
    }
}
