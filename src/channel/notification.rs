use serde::Serialize;

/// A state change pushed to the control plane without a matching request,
/// e.g. a closed peer or a newly available sender.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub event: String,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub data: serde_json::Value,
}

impl Notification {
    pub fn new(event: &str, data: serde_json::Value) -> Self {
        Notification {
            event: event.to_owned(),
            data,
        }
    }

    /// Serializes the notification for the channel.
    pub fn to_json(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

/// Control-plane sink consuming notifications; implemented by the embedder on
/// top of its channel writer.
pub trait NotificationSink {
    fn notify(&mut self, notification: Notification);
}
