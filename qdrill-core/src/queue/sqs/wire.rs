//! Request/response bodies of the SQS JSON protocol subset the drill speaks.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::message::AttributeValue;

pub const CONTENT_TYPE: &str = "application/x-amz-json-1.0";
pub const TARGET_HEADER: &str = "x-amz-target";
pub const TARGET_PREFIX: &str = "AmazonSQS.";

pub const OP_GET_QUEUE_URL: &str = "GetQueueUrl";
pub const OP_SEND_MESSAGE: &str = "SendMessage";
pub const OP_RECEIVE_MESSAGE: &str = "ReceiveMessage";
pub const OP_DELETE_MESSAGE: &str = "DeleteMessage";

pub const ERR_QUEUE_DOES_NOT_EXIST: &str = "QueueDoesNotExist";
pub const ERR_NON_EXISTENT_QUEUE: &str = "AWS.SimpleQueueService.NonExistentQueue";
pub const ERR_RECEIPT_HANDLE_INVALID: &str = "ReceiptHandleIsInvalid";
pub const ERR_INVALID_PARAMETER: &str = "InvalidParameterValue";
pub const ERR_UNKNOWN_OPERATION: &str = "UnknownOperationException";
pub const ERR_THROTTLING: &str = "ThrottlingException";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetQueueUrlRequest {
    pub queue_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetQueueUrlResponse {
    pub queue_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MessageAttributeValue {
    pub data_type: String,
    pub string_value: String,
}

impl From<&AttributeValue> for MessageAttributeValue {
    fn from(value: &AttributeValue) -> Self {
        Self {
            data_type: value.data_type().to_string(),
            string_value: value.as_str().to_string(),
        }
    }
}

impl MessageAttributeValue {
    /// `None` for data types the drill doesn't model (e.g. `Binary`).
    pub fn to_attribute(&self) -> Option<AttributeValue> {
        // Custom suffixes like `Number.int` keep their base type.
        let base = self
            .data_type
            .split_once('.')
            .map_or(self.data_type.as_str(), |(base, _)| base);
        match base {
            "String" => Some(AttributeValue::String(self.string_value.clone())),
            "Number" => Some(AttributeValue::Number(self.string_value.clone())),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMessageRequest {
    pub queue_url: String,
    pub message_body: String,
    #[serde(default)]
    pub delay_seconds: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub message_attributes: BTreeMap<String, MessageAttributeValue>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SendMessageResponse {
    pub message_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReceiveMessageRequest {
    pub queue_url: String,
    pub max_number_of_messages: u32,
    pub visibility_timeout: u64,
    pub wait_time_seconds: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReceiveMessageResponse {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<WireMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct WireMessage {
    pub message_id: String,
    pub receipt_handle: String,
    pub body: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteMessageRequest {
    pub queue_url: String,
    pub receipt_handle: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    #[serde(rename = "__type")]
    pub error_type: String,
    #[serde(default)]
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            error_type: format!("com.amazonaws.sqs#{code}"),
            message: message.into(),
        }
    }

    /// Error code without the `namespace#` prefix.
    pub fn code(&self) -> &str {
        self.error_type
            .rsplit_once('#')
            .map_or(self.error_type.as_str(), |(_, code)| code)
    }
}
