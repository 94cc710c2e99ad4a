use crate::core::errors::{TwitterError, TwitterResult};
use crate::core::types::{Status, TwitterList, User};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One classified line of a streaming response
#[derive(Debug, Clone, PartialEq)]
pub enum StreamMessage {
    /// A new status; carries the full record
    Status(Box<Status>),
    Delete(DeleteNotice),
    ScrubGeo(ScrubGeoNotice),
    Limit(LimitNotice),
    StatusWithheld(StatusWithheldNotice),
    UserWithheld(UserWithheldNotice),
    Disconnect(DisconnectNotice),
    Warning(WarningNotice),
    Event(Box<StreamEvent>),
    /// A message addressed to one user of a multi-user stream
    Envelope {
        for_user: String,
        message: Box<StreamMessage>,
    },
    Control(ControlNotice),
    FriendsList(Vec<String>),
    /// A line no known variant matched, kept verbatim
    Raw(String),
}

/// What a `delete` notice removes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeletedItem {
    #[default]
    Status,
    DirectMessage,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteNotice {
    pub id: u64,
    pub user_id: u64,
    #[serde(skip)]
    pub item: DeletedItem,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrubGeoNotice {
    pub user_id: u64,
    pub up_to_status_id: u64,
}

/// Count of matching statuses the stream could not deliver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitNotice {
    pub track: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusWithheldNotice {
    pub id: u64,
    pub user_id: u64,
    #[serde(default)]
    pub withheld_in_countries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWithheldNotice {
    pub id: u64,
    #[serde(default)]
    pub withheld_in_countries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectNotice {
    pub code: i32,
    #[serde(default)]
    pub stream_name: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarningNotice {
    pub code: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub percent_full: Option<u32>,
    #[serde(default)]
    pub user_id: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlNotice {
    pub control_uri: String,
}

/// A user-stream event such as `favorite` or `list_member_added`
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    pub event: String,
    pub created_at: Option<String>,
    pub source: Option<User>,
    pub target: Option<User>,
    /// Set for favorite events
    pub target_status: Option<Status>,
    /// Set for list events
    pub target_list: Option<TwitterList>,
}

impl StreamMessage {
    /// Classify one line. Fails with `TwitterError::Parse` when the line is not
    /// JSON or carries none of the known discriminating keys.
    pub fn parse(line: &str) -> TwitterResult<Self> {
        let value: Value = serde_json::from_str(line)
            .map_err(|e| TwitterError::Parse(format!("Invalid stream line: {}", e)))?;
        Self::from_value(value)
    }

    /// Classify an already parsed JSON object
    pub fn from_value(value: Value) -> TwitterResult<Self> {
        let Value::Object(mut object) = value else {
            return Err(TwitterError::Parse(
                "Stream line is not a JSON object".to_string(),
            ));
        };

        if object.contains_key("text") {
            return Ok(Self::Status(Box::new(decode(Value::Object(object), "status")?)));
        }
        if let Some(delete) = object.remove("delete") {
            let (target, item) = if let Some(status) = delete.get("status") {
                (status, DeletedItem::Status)
            } else if let Some(message) = delete.get("direct_message") {
                (message, DeletedItem::DirectMessage)
            } else {
                return Err(TwitterError::Parse(
                    "delete notice without status or direct_message".to_string(),
                ));
            };
            let notice = DeleteNotice {
                item,
                ..decode(target.clone(), "delete")?
            };
            return Ok(Self::Delete(notice));
        }
        if let Some(scrub) = object.remove("scrub_geo") {
            return Ok(Self::ScrubGeo(decode(scrub, "scrub_geo")?));
        }
        if let Some(limit) = object.remove("limit") {
            return Ok(Self::Limit(decode(limit, "limit")?));
        }
        if let Some(withheld) = object.remove("status_withheld") {
            return Ok(Self::StatusWithheld(decode(withheld, "status_withheld")?));
        }
        if let Some(withheld) = object.remove("user_withheld") {
            return Ok(Self::UserWithheld(decode(withheld, "user_withheld")?));
        }
        if let Some(disconnect) = object.remove("disconnect") {
            return Ok(Self::Disconnect(decode(disconnect, "disconnect")?));
        }
        if let Some(warning) = object.remove("warning") {
            return Ok(Self::Warning(decode(warning, "warning")?));
        }
        if object.contains_key("event") {
            return Ok(Self::Event(Box::new(parse_event(object)?)));
        }
        if let Some(for_user) = object.remove("for_user") {
            let inner = object
                .remove("message")
                .ok_or_else(|| TwitterError::Parse("envelope without message".to_string()))?;
            return Ok(Self::Envelope {
                for_user: id_text(&for_user)?,
                message: Box::new(Self::from_value(inner)?),
            });
        }
        if let Some(control) = object.remove("control") {
            return Ok(Self::Control(decode(control, "control")?));
        }
        if let Some(friends) = object.remove("friends_str").or_else(|| object.remove("friends")) {
            let ids = match friends {
                Value::Array(items) => items.iter().map(id_text).collect::<TwitterResult<_>>()?,
                _ => return Err(TwitterError::Parse("friends list is not an array".to_string())),
            };
            return Ok(Self::FriendsList(ids));
        }

        Err(TwitterError::Parse(format!(
            "Unrecognized stream message with keys: {}",
            object.keys().cloned().collect::<Vec<_>>().join(", ")
        )))
    }

    /// Short name of the variant, used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Delete(_) => "delete",
            Self::ScrubGeo(_) => "scrub_geo",
            Self::Limit(_) => "limit",
            Self::StatusWithheld(_) => "status_withheld",
            Self::UserWithheld(_) => "user_withheld",
            Self::Disconnect(_) => "disconnect",
            Self::Warning(_) => "warning",
            Self::Event(_) => "event",
            Self::Envelope { .. } => "envelope",
            Self::Control(_) => "control",
            Self::FriendsList(_) => "friends",
            Self::Raw(_) => "raw",
        }
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> TwitterResult<T> {
    serde_json::from_value(value)
        .map_err(|e| TwitterError::Parse(format!("Malformed {} message: {}", what, e)))
}

fn optional<T: DeserializeOwned>(object: &mut Map<String, Value>, key: &str) -> TwitterResult<Option<T>> {
    match object.remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => decode(value, key).map(Some),
    }
}

fn parse_event(mut object: Map<String, Value>) -> TwitterResult<StreamEvent> {
    let event = match object.remove("event") {
        Some(Value::String(name)) => name,
        _ => return Err(TwitterError::Parse("event name is not a string".to_string())),
    };

    let (target_status, target_list) = if event.contains("list") {
        (None, optional(&mut object, "target_object")?)
    } else if event.contains("favorite") {
        (optional(&mut object, "target_object")?, None)
    } else {
        (None, None)
    };

    Ok(StreamEvent {
        created_at: optional(&mut object, "created_at")?,
        source: optional(&mut object, "source")?,
        target: optional(&mut object, "target")?,
        event,
        target_status,
        target_list,
    })
}

fn id_text(value: &Value) -> TwitterResult<String> {
    match value {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        other => Err(TwitterError::Parse(format!("Expected an id, got {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_line() {
        let message = StreamMessage::parse(r#"{"text":"hi","id":1}"#).unwrap();
        match message {
            StreamMessage::Status(status) => {
                assert_eq!(status.text, "hi");
                assert_eq!(status.id, 1);
            }
            other => panic!("Expected status, got {:?}", other),
        }
    }

    #[test]
    fn test_delete_line() {
        let message = StreamMessage::parse(r#"{"delete":{"status":{"id":1,"user_id":2}}}"#).unwrap();
        assert_eq!(
            message,
            StreamMessage::Delete(DeleteNotice {
                id: 1,
                user_id: 2,
                item: DeletedItem::Status,
            })
        );
    }

    #[test]
    fn test_direct_message_delete_line() {
        let line = r#"{"delete":{"direct_message":{"id":1234,"user_id":3}}}"#;
        match StreamMessage::parse(line).unwrap() {
            StreamMessage::Delete(notice) => {
                assert_eq!(notice.id, 1234);
                assert_eq!(notice.user_id, 3);
                assert_eq!(notice.item, DeletedItem::DirectMessage);
            }
            other => panic!("Expected delete, got {:?}", other),
        }

        let err = StreamMessage::parse(r#"{"delete":{"tweet":{"id":1}}}"#).unwrap_err();
        assert!(matches!(err, TwitterError::Parse(_)));
    }

    #[test]
    fn test_text_takes_priority() {
        let message = StreamMessage::parse(r#"{"text":"x","id":5,"limit":{"track":3}}"#).unwrap();
        assert_eq!(message.kind(), "status");
    }

    #[test]
    fn test_control_notices() {
        let cases = [
            (r#"{"scrub_geo":{"user_id":14090452,"up_to_status_id":23260136625}}"#, "scrub_geo"),
            (r#"{"limit":{"track":1234}}"#, "limit"),
            (r#"{"status_withheld":{"id":1,"user_id":2,"withheld_in_countries":["DE"]}}"#, "status_withheld"),
            (r#"{"user_withheld":{"id":2,"withheld_in_countries":["DE","AR"]}}"#, "user_withheld"),
            (r#"{"disconnect":{"code":4,"stream_name":"x","reason":"duplicate"}}"#, "disconnect"),
            (r#"{"warning":{"code":"FALLING_BEHIND","message":"slow","percent_full":60}}"#, "warning"),
            (r#"{"control":{"control_uri":"/1.1/site/c/1_1_54e345d655ee3e8df359ac033648530bfbe26c5f"}}"#, "control"),
        ];
        for (line, kind) in cases {
            assert_eq!(StreamMessage::parse(line).unwrap().kind(), kind, "line: {}", line);
        }
    }

    #[test]
    fn test_limit_fields() {
        assert_eq!(
            StreamMessage::parse(r#"{"limit":{"track":1234}}"#).unwrap(),
            StreamMessage::Limit(LimitNotice { track: 1234 })
        );
    }

    #[test]
    fn test_favorite_event_carries_status() {
        let line = r#"{"event":"favorite","created_at":"Sat Sep 04 16:10:54 +0000 2010",
            "source":{"id":1},"target":{"id":2},"target_object":{"id":3,"text":"liked"}}"#;
        let StreamMessage::Event(event) = StreamMessage::parse(line).unwrap() else {
            panic!("Expected event");
        };
        assert_eq!(event.event, "favorite");
        assert_eq!(event.target_status.as_ref().map(|s| s.id), Some(3));
        assert!(event.target_list.is_none());
        assert_eq!(event.source.as_ref().map(|u| u.id), Some(1));
    }

    #[test]
    fn test_list_event_carries_list() {
        let line = r#"{"event":"list_member_added","target_object":{"id":9,"name":"rustaceans"}}"#;
        let StreamMessage::Event(event) = StreamMessage::parse(line).unwrap() else {
            panic!("Expected event");
        };
        assert!(event.target_status.is_none());
        assert_eq!(event.target_list.as_ref().map(|l| l.id), Some(9));
    }

    #[test]
    fn test_other_event_has_no_target_object() {
        let line = r#"{"event":"follow","target_object":{"id":9}}"#;
        let StreamMessage::Event(event) = StreamMessage::parse(line).unwrap() else {
            panic!("Expected event");
        };
        assert!(event.target_status.is_none());
        assert!(event.target_list.is_none());
    }

    #[test]
    fn test_envelope_recurses() {
        let line = r#"{"for_user":1888,"message":{"delete":{"status":{"id":7,"user_id":1888}}}}"#;
        match StreamMessage::parse(line).unwrap() {
            StreamMessage::Envelope { for_user, message } => {
                assert_eq!(for_user, "1888");
                assert_eq!(*message, StreamMessage::Delete(DeleteNotice {
                        id: 7,
                        user_id: 1888,
                        item: DeletedItem::Status,
                    }));
            }
            other => panic!("Expected envelope, got {:?}", other),
        }
    }

    #[test]
    fn test_friends_lists() {
        assert_eq!(
            StreamMessage::parse(r#"{"friends":[1,2,3]}"#).unwrap(),
            StreamMessage::FriendsList(vec!["1".into(), "2".into(), "3".into()])
        );
        assert_eq!(
            StreamMessage::parse(r#"{"friends_str":["10","20"]}"#).unwrap(),
            StreamMessage::FriendsList(vec!["10".into(), "20".into()])
        );
    }

    #[test]
    fn test_unknown_key_is_parse_error() {
        let err = StreamMessage::parse(r#"{"something_new":{"a":1}}"#).unwrap_err();
        assert!(matches!(err, TwitterError::Parse(_)));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        assert!(matches!(StreamMessage::parse("{not json"), Err(TwitterError::Parse(_))));
        assert!(matches!(StreamMessage::parse("[1,2]"), Err(TwitterError::Parse(_))));
    }

    #[test]
    fn test_malformed_known_key_is_parse_error() {
        let err = StreamMessage::parse(r#"{"delete":{"status":{"id":"x"}}}"#).unwrap_err();
        assert!(matches!(err, TwitterError::Parse(_)));
    }
}
