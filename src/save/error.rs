//! Save error classification
//!
//! Providers report raw status codes; everything the pipeline hands back to
//! callers goes through [`SaveError::classify`] first.

use std::fmt;
use thiserror::Error;

/// Raw status code reported by a save provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProviderCode(pub u32);

impl ProviderCode {
    pub const OK: ProviderCode = ProviderCode(0);
    pub const BLOB_NOT_FOUND: ProviderCode = ProviderCode(0x8083_0001);
    pub const CONTAINER_NOT_IN_SYNC: ProviderCode = ProviderCode(0x8083_0002);
    pub const CONTAINER_SYNC_FAILED: ProviderCode = ProviderCode(0x8083_0003);
    pub const INVALID_CONTAINER_NAME: ProviderCode = ProviderCode(0x8083_0004);
    pub const NO_ACCESS: ProviderCode = ProviderCode(0x8083_0005);
    pub const NO_SERVICE_CONFIGURATION: ProviderCode = ProviderCode(0x8083_0006);
    pub const USER_NOT_REGISTERED: ProviderCode = ProviderCode(0x8083_0007);
    pub const OUT_OF_LOCAL_STORAGE: ProviderCode = ProviderCode(0x8083_0008);
    pub const PROVIDED_BUFFER_TOO_SMALL: ProviderCode = ProviderCode(0x8083_0009);
    pub const QUOTA_EXCEEDED: ProviderCode = ProviderCode(0x8083_000A);
    pub const UPDATE_TOO_BIG: ProviderCode = ProviderCode(0x8083_000B);
    pub const USER_CANCELED: ProviderCode = ProviderCode(0x8083_000C);
    pub const SETUP_FAILED: ProviderCode = ProviderCode(0x8083_0100);
    /// Generic bad argument (not classified further)
    pub const INVALID_ARGUMENT: ProviderCode = ProviderCode(0x8007_0057);

    pub fn is_ok(&self) -> bool {
        *self == Self::OK
    }
}

impl fmt::Display for ProviderCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}

/// Classified save failure reported for a pending item
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SaveError {
    #[error("save data user not found")]
    UserNotFound,

    #[error("blob not found")]
    BlobNotFound,

    #[error("container not in sync")]
    ContainerNotInSync,

    #[error("container sync failed")]
    ContainerSyncFailed,

    #[error("invalid container name")]
    InvalidContainerName,

    #[error("no access")]
    NoAccess,

    #[error("no service configuration")]
    NoServiceConfiguration,

    #[error("user not registered in service")]
    UserNotRegistered,

    #[error("out of local storage")]
    OutOfLocalStorage,

    #[error("provided buffer too small")]
    ProvidedBufferTooSmall,

    #[error("quota exceeded")]
    QuotaExceeded,

    #[error("update too big")]
    UpdateTooBig,

    #[error("user canceled")]
    UserCanceled,

    #[error("storage provider setup failed")]
    ProviderSetupFailed,

    #[error("unknown provider error {0}")]
    Unknown(ProviderCode),
}

impl SaveError {
    /// Map a failing provider code onto the closed error set
    ///
    /// `ProviderCode::OK` is not a failure and classifies as `Unknown`; use
    /// [`SaveError::check`] when the code may be a success.
    pub fn classify(code: ProviderCode) -> SaveError {
        match code {
            ProviderCode::BLOB_NOT_FOUND => SaveError::BlobNotFound,
            ProviderCode::CONTAINER_NOT_IN_SYNC => SaveError::ContainerNotInSync,
            ProviderCode::CONTAINER_SYNC_FAILED => SaveError::ContainerSyncFailed,
            ProviderCode::INVALID_CONTAINER_NAME => SaveError::InvalidContainerName,
            ProviderCode::NO_ACCESS => SaveError::NoAccess,
            ProviderCode::NO_SERVICE_CONFIGURATION => SaveError::NoServiceConfiguration,
            ProviderCode::USER_NOT_REGISTERED => SaveError::UserNotRegistered,
            ProviderCode::OUT_OF_LOCAL_STORAGE => SaveError::OutOfLocalStorage,
            ProviderCode::PROVIDED_BUFFER_TOO_SMALL => SaveError::ProvidedBufferTooSmall,
            ProviderCode::QUOTA_EXCEEDED => SaveError::QuotaExceeded,
            ProviderCode::UPDATE_TOO_BIG => SaveError::UpdateTooBig,
            ProviderCode::USER_CANCELED => SaveError::UserCanceled,
            ProviderCode::SETUP_FAILED => SaveError::ProviderSetupFailed,
            other => SaveError::Unknown(other),
        }
    }

    /// `Ok` for a success code, otherwise the classified error
    pub fn check(code: ProviderCode) -> Result<(), SaveError> {
        if code.is_ok() {
            Ok(())
        } else {
            Err(Self::classify(code))
        }
    }

    /// Stable numeric code reported alongside failed outcomes (0 = no error)
    pub fn code(&self) -> i32 {
        match self {
            SaveError::UserNotFound => 1,
            SaveError::BlobNotFound => 2,
            SaveError::ContainerNotInSync => 3,
            SaveError::ContainerSyncFailed => 4,
            SaveError::InvalidContainerName => 5,
            SaveError::NoAccess => 6,
            SaveError::NoServiceConfiguration => 7,
            SaveError::UserNotRegistered => 8,
            SaveError::OutOfLocalStorage => 9,
            SaveError::ProvidedBufferTooSmall => 10,
            SaveError::QuotaExceeded => 11,
            SaveError::UpdateTooBig => 12,
            SaveError::UserCanceled => 13,
            SaveError::ProviderSetupFailed => 14,
            SaveError::Unknown(_) => 15,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_codes() {
        assert_eq!(
            SaveError::classify(ProviderCode::QUOTA_EXCEEDED),
            SaveError::QuotaExceeded
        );
        assert_eq!(
            SaveError::classify(ProviderCode::USER_NOT_REGISTERED),
            SaveError::UserNotRegistered
        );
        assert_eq!(
            SaveError::classify(ProviderCode::SETUP_FAILED),
            SaveError::ProviderSetupFailed
        );
    }

    #[test]
    fn test_unrecognised_code_is_unknown() {
        let code = ProviderCode(0xDEAD_BEEF);
        let err = SaveError::classify(code);
        assert_eq!(err, SaveError::Unknown(code));
        assert_eq!(err.code(), 15);
        assert_eq!(err.to_string(), "unknown provider error 0xDEADBEEF");
    }

    #[test]
    fn test_check() {
        assert_eq!(SaveError::check(ProviderCode::OK), Ok(()));
        assert_eq!(
            SaveError::check(ProviderCode::NO_ACCESS),
            Err(SaveError::NoAccess)
        );
    }

    #[test]
    fn test_codes_are_distinct() {
        let all = [
            SaveError::UserNotFound,
            SaveError::BlobNotFound,
            SaveError::ContainerNotInSync,
            SaveError::ContainerSyncFailed,
            SaveError::InvalidContainerName,
            SaveError::NoAccess,
            SaveError::NoServiceConfiguration,
            SaveError::UserNotRegistered,
            SaveError::OutOfLocalStorage,
            SaveError::ProvidedBufferTooSmall,
            SaveError::QuotaExceeded,
            SaveError::UpdateTooBig,
            SaveError::UserCanceled,
            SaveError::ProviderSetupFailed,
            SaveError::Unknown(ProviderCode(1)),
        ];
        let mut codes: Vec<i32> = all.iter().map(SaveError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), all.len());
        assert!(codes.iter().all(|&c| c != 0));
    }
}
