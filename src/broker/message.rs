/// Content type attached to every configuration update.
pub const APPLICATION_JSON: &str = "application/json";

/// A message as it travels through the broker.
///
/// Messages are ephemeral: they are built immediately before a publish or
/// immediately after a delivery and are never stored by the gateway.
///
/// # Fields
///
/// - `routing_key` - With the default exchange this is the destination queue name.
/// - `content_type` - MIME type of `body`, usually `application/json`.
/// - `body` - Raw payload bytes, passed through untouched.
/// - `timestamp` - Unix timestamp (in seconds) of when the message was created,
///   or the broker-supplied timestamp on receipt (0 when absent).
///
/// # Example
///
/// ```rust
/// use confgate::broker::message::Message;
///
/// let msg = Message::json("config", br#"{"mode":"sleeping"}"#.to_vec());
/// assert_eq!(msg.content_type, "application/json");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub routing_key: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub timestamp: i64,
}

impl Message {
    pub fn new(routing_key: &str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            routing_key: routing_key.to_string(),
            content_type: content_type.to_string(),
            body,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn json(routing_key: &str, body: Vec<u8>) -> Self {
        Self::new(routing_key, APPLICATION_JSON, body)
    }

    /// Lossy UTF-8 view of the body, for logging.
    pub fn body_text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.body)
    }
}
