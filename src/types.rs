//! Values that flow back to the caller
//!
//! These types are shared by the invocation layer (which stores them in a
//! context's result slot) and the MCP bridge (which converts them to
//! protocol content).

use std::path::Path;

use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Raw image bytes plus their declared media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    pub data: Vec<u8>,
    pub media_type: String,
}

impl Image {
    pub fn new(data: Vec<u8>, media_type: impl Into<String>) -> Self {
        Self {
            data,
            media_type: media_type.into(),
        }
    }

    /// Read an image file
    ///
    /// `format` (e.g. "png", "jpeg") is inferred from the file extension when
    /// not given, falling back to png.
    pub async fn from_path(path: impl AsRef<Path>, format: Option<&str>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let format = match format.filter(|f| !f.is_empty()) {
            Some(format) => format.to_lowercase(),
            None => path
                .extension()
                .and_then(|ext| ext.to_str())
                .filter(|ext| !ext.is_empty())
                .map(str::to_lowercase)
                .unwrap_or_else(|| "png".to_string()),
        };

        let data = tokio::fs::read(path).await?;
        Ok(Self::new(data, media_type_for(&format)))
    }

    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.data)
    }
}

/// Media type for an image format name
pub fn media_type_for(format: &str) -> String {
    match format {
        "jpg" | "jpeg" => "image/jpeg".to_string(),
        "svg" => "image/svg+xml".to_string(),
        "tif" | "tiff" => "image/tiff".to_string(),
        "ico" => "image/x-icon".to_string(),
        other => format!("image/{}", other),
    }
}

/// Who speaks a prompt message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Body of a prompt message
#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    Image(Image),
}

impl From<&str> for MessageContent {
    fn from(text: &str) -> Self {
        MessageContent::Text(text.to_string())
    }
}

impl From<String> for MessageContent {
    fn from(text: String) -> Self {
        MessageContent::Text(text)
    }
}

impl From<Image> for MessageContent {
    fn from(image: Image) -> Self {
        MessageContent::Image(image)
    }
}

/// One turn of a prompt template
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn user(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<MessageContent>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    /// Text body, if this is a text message
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Image(_) => None,
        }
    }
}

/// What an invocation produced
#[derive(Debug, Clone, PartialEq)]
pub enum CapabilityOutput {
    /// String, number, boolean or null
    Scalar(Value),
    /// JSON object or array
    Structured(Value),
    Image(Image),
    /// Ordered prompt messages
    Messages(Vec<Message>),
}

impl CapabilityOutput {
    /// The JSON value, for scalar and structured outputs
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            CapabilityOutput::Scalar(value) | CapabilityOutput::Structured(value) => Some(value),
            CapabilityOutput::Image(_) | CapabilityOutput::Messages(_) => None,
        }
    }

    /// MIME type used when this output is served as resource contents
    pub fn mime_type(&self) -> &str {
        match self {
            CapabilityOutput::Scalar(Value::String(_)) => "text/plain",
            CapabilityOutput::Scalar(_) | CapabilityOutput::Structured(_) => "application/json",
            CapabilityOutput::Image(image) => &image.media_type,
            CapabilityOutput::Messages(_) => "application/json",
        }
    }
}

impl From<Value> for CapabilityOutput {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(_) | Value::Array(_) => CapabilityOutput::Structured(value),
            scalar => CapabilityOutput::Scalar(scalar),
        }
    }
}

impl From<Image> for CapabilityOutput {
    fn from(image: Image) -> Self {
        CapabilityOutput::Image(image)
    }
}

impl From<Vec<Message>> for CapabilityOutput {
    fn from(messages: Vec<Message>) -> Self {
        CapabilityOutput::Messages(messages)
    }
}

macro_rules! scalar_output {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for CapabilityOutput {
                fn from(value: $ty) -> Self {
                    CapabilityOutput::from(Value::from(value))
                }
            }
        )*
    };
}

scalar_output!(bool, i32, i64, u32, u64, f64, String, &str);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_output_classification() {
        assert_eq!(CapabilityOutput::from(5), CapabilityOutput::Scalar(json!(5)));
        assert_eq!(
            CapabilityOutput::from(json!({"a": 1})),
            CapabilityOutput::Structured(json!({"a": 1}))
        );
        assert_eq!(CapabilityOutput::from("hi").mime_type(), "text/plain");
        assert_eq!(CapabilityOutput::from(json!([1])).mime_type(), "application/json");
    }

    #[test]
    fn test_media_types() {
        assert_eq!(media_type_for("png"), "image/png");
        assert_eq!(media_type_for("jpg"), "image/jpeg");
        assert_eq!(media_type_for("svg"), "image/svg+xml");
    }

    #[tokio::test]
    async fn test_image_format_inferred_from_extension() {
        let mut file = tempfile::Builder::new().suffix(".JPG").tempfile().unwrap();
        file.write_all(&[0xff, 0xd8, 0xff]).unwrap();

        let image = Image::from_path(file.path(), None).await.unwrap();
        assert_eq!(image.media_type, "image/jpeg");
        assert_eq!(image.data, vec![0xff, 0xd8, 0xff]);
        assert_eq!(image.to_base64(), "/9j/");
    }

    #[tokio::test]
    async fn test_image_explicit_format_and_fallback() {
        let mut file = tempfile::Builder::new().suffix("").tempfile().unwrap();
        file.write_all(b"raw").unwrap();

        let fallback = Image::from_path(file.path(), None).await.unwrap();
        assert_eq!(fallback.media_type, "image/png");

        let explicit = Image::from_path(file.path(), Some("webp")).await.unwrap();
        assert_eq!(explicit.media_type, "image/webp");
    }
}
