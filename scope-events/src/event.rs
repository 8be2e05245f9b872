//! 事件（Event）
//!
//! 生产者分发的最小单元：名称 + 映射型载荷。入队后不可变，
//! 除在队列中的位置外不携带任何身份信息。
//!
use crate::error::{DispatchError, DispatchResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 事件载荷：字符串键到任意 JSON 值的映射
pub type Payload = serde_json::Map<String, Value>;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Event {
    name: String,
    payload: Payload,
    /// 入队时间，仅作记录用途
    dispatched_at: DateTime<Utc>,
}

impl Event {
    pub fn new(name: impl Into<String>, payload: Payload) -> Self {
        Self {
            name: name.into(),
            payload,
            dispatched_at: Utc::now(),
        }
    }

    /// 由任意可序列化载荷构造事件；载荷必须序列化为对象（或空值）
    pub fn from_serialize<P>(name: impl Into<String>, payload: P) -> DispatchResult<Self>
    where
        P: Serialize,
    {
        Ok(Self::new(name, to_payload(payload)?))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn dispatched_at(&self) -> DateTime<Utc> {
        self.dispatched_at
    }
}

/// 将可序列化值转换为映射型载荷：`null`/`()` 视为空映射
pub fn to_payload<P>(payload: P) -> DispatchResult<Payload>
where
    P: Serialize,
{
    let value = serde_json::to_value(payload)
        .map_err(|err| DispatchError::invalid_payload(format!("payload failed to serialize: {err}")))?;
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Payload::new()),
        other => Err(DispatchError::invalid_payload(format!(
            "expected a mapping, found {}",
            kind_of(&other)
        ))),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Serialize)]
    struct UserCreated {
        id: u64,
        email: &'static str,
    }

    #[test]
    fn struct_payload_becomes_mapping() {
        let ev = Event::from_serialize(
            "user.created",
            UserCreated {
                id: 7,
                email: "a@b.c",
            },
        )
        .unwrap();
        assert_eq!(ev.name(), "user.created");
        assert_eq!(ev.payload().get("id"), Some(&json!(7)));
        assert_eq!(ev.payload().get("email"), Some(&json!("a@b.c")));
    }

    #[test]
    fn unit_payload_is_empty_mapping() {
        let ev = Event::from_serialize("ping", ()).unwrap();
        assert!(ev.payload().is_empty());
    }

    #[test]
    fn scalar_payload_is_rejected() {
        let err = Event::from_serialize("bad", 42).unwrap_err();
        match err {
            DispatchError::InvalidPayload { reason } => assert!(reason.contains("number")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn unserializable_payload_is_invalid() {
        let payload = std::collections::HashMap::from([((1u8, 2u8), 3)]);
        let err = Event::from_serialize("bad", payload).unwrap_err();
        match err {
            DispatchError::InvalidPayload { reason } => {
                assert!(reason.contains("failed to serialize"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
