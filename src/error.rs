//! Error type shared by every layer of the admin console.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AdminError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Network(String),

    #[error("Remote store error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Unexpected {entity} payload from remote store: {message}")]
    Decode {
        entity: &'static str,
        message: String,
    },

    #[error("{0}")]
    Validation(String),

    #[error(
        "Storage bucket \"{bucket}\" does not exist. Create it in the storage dashboard \
         or set SUPABASE_BUCKET to an existing bucket."
    )]
    BucketMissing { bucket: String },

    #[error("Storage upload failed: {0}")]
    Storage(String),

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: String },

    #[error("No price configured for {service_type} / {material}")]
    PriceNotFound {
        service_type: String,
        material: String,
    },

    #[error("Not logged in. Run `login` first.")]
    NotLoggedIn,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Local database error: {0}")]
    Local(String),

    #[error("Receipt rendering failed: {0}")]
    Render(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<rusqlite::Error> for AdminError {
    fn from(err: rusqlite::Error) -> Self {
        AdminError::Local(err.to_string())
    }
}

impl AdminError {
    pub fn decode(entity: &'static str, err: impl std::fmt::Display) -> Self {
        AdminError::Decode {
            entity,
            message: err.to_string(),
        }
    }

    /// Classify a storage failure message. The hosted store reports a missing
    /// bucket only through its error text.
    pub fn from_storage_message(bucket: &str, message: &str) -> Self {
        if message.to_ascii_lowercase().contains("bucket not found") {
            AdminError::BucketMissing {
                bucket: bucket.to_string(),
            }
        } else {
            AdminError::Storage(message.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bucket_not_found_is_detected_case_insensitively() {
        let err = AdminError::from_storage_message("receipts", "Bucket Not Found");
        assert!(matches!(err, AdminError::BucketMissing { ref bucket } if bucket == "receipts"));
        assert!(err.to_string().contains("\"receipts\" does not exist"));
    }

    #[test]
    fn other_storage_messages_stay_generic() {
        let err = AdminError::from_storage_message("receipts", "payload too large");
        assert!(matches!(err, AdminError::Storage(_)));
    }
}
