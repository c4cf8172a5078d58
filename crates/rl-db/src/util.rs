use chrono::{DateTime, Utc};
use rl_core::error::StoreError;
use rusqlite::ErrorCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

pub fn to_rfc3339(value: &DateTime<Utc>) -> String {
    value.to_rfc3339()
}

pub fn from_rfc3339(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidInput {
            message: format!("invalid timestamp: {value}"),
        })
}

pub fn encode_json<T: Serialize>(value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|err| StoreError::InvalidInput {
        message: format!("json encode failed: {err}"),
    })
}

pub fn decode_json<T: DeserializeOwned>(value: &str) -> Result<T, StoreError> {
    serde_json::from_str(value).map_err(|err| StoreError::InvalidInput {
        message: format!("json decode failed: {err}"),
    })
}

/// Store a unit enum variant as its serde string form.
pub fn encode_enum<T: Serialize>(value: &T) -> Result<String, StoreError> {
    match serde_json::to_value(value) {
        Ok(Value::String(text)) => Ok(text),
        Ok(other) => Err(StoreError::InvalidInput {
            message: format!("not a string-encoded enum: {other}"),
        }),
        Err(err) => Err(StoreError::InvalidInput {
            message: format!("json encode failed: {err}"),
        }),
    }
}

pub fn decode_enum<T: DeserializeOwned>(value: &str) -> Result<T, StoreError> {
    serde_json::from_value(Value::String(value.to_string())).map_err(|err| {
        StoreError::InvalidInput {
            message: format!("invalid enum value {value}: {err}"),
        }
    })
}

/// Map a driver error into the store taxonomy: lock/IO failures are
/// transient (`Unavailable`), constraint violations are conflicts, the rest
/// are caller bugs.
pub fn store_err(err: rusqlite::Error) -> StoreError {
    if let rusqlite::Error::SqliteFailure(failure, ref message) = err {
        match failure.code {
            ErrorCode::DatabaseBusy
            | ErrorCode::DatabaseLocked
            | ErrorCode::CannotOpen
            | ErrorCode::DiskFull
            | ErrorCode::SystemIoFailure => {
                return StoreError::Unavailable {
                    message: message.clone().unwrap_or_else(|| err.to_string()),
                }
            }
            ErrorCode::ConstraintViolation => {
                return StoreError::Conflict {
                    message: message.clone().unwrap_or_else(|| err.to_string()),
                }
            }
            _ => {}
        }
    }
    StoreError::InvalidInput {
        message: err.to_string(),
    }
}
