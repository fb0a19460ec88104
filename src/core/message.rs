use serde::{Deserialize, Serialize};

/// Author of a transcript entry. The remote API only knows these two roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Role {
    User,
    Model,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
        }
    }

    /// Heading used when a transcript is exported as plain text.
    pub fn export_label(self) -> &'static str {
        match self {
            Role::User => "USER",
            Role::Model => "MODEL",
        }
    }

    pub fn is_user(self) -> bool {
        self == Role::User
    }

    pub fn is_model(self) -> bool {
        self == Role::Model
    }
}

impl AsRef<str> for Role {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl TryFrom<&str> for Role {
    type Error = String;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "user" => Ok(Role::User),
            "model" => Ok(Role::Model),
            _ => Err(format!("invalid message role: {value}")),
        }
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Role> for String {
    fn from(value: Role) -> Self {
        value.as_str().to_string()
    }
}

/// Inline image attached to a user message. The payload is kept base64
/// encoded because that is both the persisted and the wire representation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageAttachment {
    pub base64: String,
    pub mime_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<ImageAttachment>,
}

impl Message {
    pub fn user(content: impl Into<String>, image: Option<ImageAttachment>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            image,
        }
    }

    pub fn model(content: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            image: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_strings() {
        assert_eq!(Role::try_from("user"), Ok(Role::User));
        assert_eq!(Role::try_from("model"), Ok(Role::Model));
        assert!(Role::try_from("assistant").is_err());
        assert_eq!(String::from(Role::Model), "model");
    }

    #[test]
    fn message_without_image_omits_the_field() {
        let json = serde_json::to_string(&Message::model("hi")).expect("serialize");
        assert_eq!(json, r#"{"role":"model","content":"hi"}"#);
    }

    #[test]
    fn message_image_uses_camel_case_mime_type() {
        let message = Message::user(
            "look",
            Some(ImageAttachment {
                base64: "AAAA".into(),
                mime_type: "image/png".into(),
            }),
        );
        let value = serde_json::to_value(&message).expect("serialize");
        assert_eq!(value["image"]["mimeType"], "image/png");
        assert_eq!(value["role"], "user");

        let parsed: Message = serde_json::from_value(value).expect("deserialize");
        assert_eq!(parsed, message);
    }

    #[test]
    fn unknown_role_is_rejected_on_load() {
        let result = serde_json::from_str::<Message>(r#"{"role":"system","content":"x"}"#);
        assert!(result.is_err());
    }
}
