//! JSON output envelope shared by every command.
//!
//! With `--json`, each command prints exactly one envelope to stdout, so the
//! output can be piped into `jq` or consumed by another tool without
//! scraping tables.

use serde::{Deserialize, Serialize};

/// Schema version for this envelope format.
pub const SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Successful result (may contain data or be empty)
    Result,
    /// Error occurred
    Error,
}

/// Operation outcome status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Operation succeeded with results
    Success,
    /// Operation succeeded but found nothing
    NotFound,
    /// Some candidates were decided, some failed
    PartialSuccess,
    /// Operation failed
    Error,
}

/// Machine-readable result codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResultCode {
    Ok,
    NotFound,
    PartialFailure,
    InvalidInput,
    ConfigError,
    StorageError,
    ServiceError,
    InternalError,
}

impl ResultCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::NotFound => "NOT_FOUND",
            Self::PartialFailure => "PARTIAL_FAILURE",
            Self::InvalidInput => "INVALID_INPUT",
            Self::ConfigError => "CONFIG_ERROR",
            Self::StorageError => "STORAGE_ERROR",
            Self::ServiceError => "SERVICE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    /// Process exit code for this result.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::NotFound => 1,
            Self::PartialFailure => 3,
            Self::InvalidInput | Self::ConfigError => 2,
            Self::StorageError => 4,
            Self::ServiceError => 5,
            Self::InternalError => 70,
        }
    }
}

/// Entity type in the data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Suite,
    TestCase,
    BatchReport,
    ImportReport,
    ConsistencyReport,
    Stats,
    Settings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope<T = serde_json::Value> {
    /// Message type for stream discrimination
    #[serde(rename = "type")]
    pub message_type: MessageType,

    pub status: Status,

    pub code: ResultCode,

    /// Unix exit code (0-255)
    pub exit_code: u8,

    /// Human-readable message
    pub message: String,

    /// Suggested next step
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    /// Result payload (null on error)
    pub data: Option<T>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetails>,

    pub meta: Meta,
}

/// Error details with suggestions and context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorDetails {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Meta {
    pub schema_version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity_type: Option<EntityType>,

    /// Number of items in data
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    /// Suite the command worked on
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suite: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl Default for Meta {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            entity_type: None,
            count: None,
            suite: None,
            duration_ms: None,
        }
    }
}

impl<T> Envelope<T> {
    fn build(
        message_type: MessageType,
        status: Status,
        code: ResultCode,
        message: String,
        data: Option<T>,
    ) -> Self {
        Self {
            message_type,
            status,
            code,
            exit_code: code.exit_code(),
            message,
            hint: None,
            data,
            error: None,
            meta: Meta::default(),
        }
    }

    pub fn success(data: T) -> Self {
        Self::build(
            MessageType::Result,
            Status::Success,
            ResultCode::Ok,
            "Operation completed successfully".to_string(),
            Some(data),
        )
    }

    /// Data is present but some units failed.
    pub fn partial(data: T, message: impl Into<String>) -> Self {
        Self::build(
            MessageType::Result,
            Status::PartialSuccess,
            ResultCode::PartialFailure,
            message.into(),
            Some(data),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::build(
            MessageType::Result,
            Status::NotFound,
            ResultCode::NotFound,
            message.into(),
            None,
        )
    }

    pub fn error(code: ResultCode, message: impl Into<String>) -> Self {
        Self::build(MessageType::Error, Status::Error, code, message.into(), None)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn with_entity_type(mut self, entity_type: EntityType) -> Self {
        self.meta.entity_type = Some(entity_type);
        self
    }

    pub fn with_count(mut self, count: usize) -> Self {
        self.meta.count = Some(count);
        self
    }

    pub fn with_suite(mut self, suite: impl Into<String>) -> Self {
        self.meta.suite = Some(suite.into());
        self
    }

    pub fn with_duration_ms(mut self, duration_ms: u64) -> Self {
        self.meta.duration_ms = Some(duration_ms);
        self
    }

    pub fn with_error_details(mut self, details: ErrorDetails) -> Self {
        self.error = Some(details);
        self
    }

    /// Serialize to JSON string.
    pub fn to_json(&self) -> Result<String, serde_json::Error>
    where
        T: Serialize,
    {
        serde_json::to_string_pretty(self)
    }
}
