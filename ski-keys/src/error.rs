//! Error types for the secure key interface
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use thiserror::Error;

/// Secure key interface errors
#[derive(Error, Debug)]
pub enum SkiError {
    #[error("Key domain not found: {0}")]
    KeyDomainNotFound(i32),

    #[error("Key not found: {0}")]
    KeyIdNotFound(String),

    #[error("No keyrings found for community: {0}")]
    KeyringNotFound(String),

    #[error("Crypto kit not found: {0}")]
    KitNotFound(u32),

    #[error("Crypto kit already registered: {0}")]
    KitAlreadyRegistered(u32),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Provider already registered: {0}")]
    ProviderAlreadyRegistered(String),

    #[error("Session is closed")]
    SessionClosed,

    #[error("Identity already has an open vault: {0}")]
    IdentityInUse(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Decode failed: {0}")]
    DecodeFailed(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Payload too large: {size} bytes exceeds maximum of {max}")]
    PayloadTooLarge { size: u64, max: u64 },

    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(String),

    #[error("Key generation collided {0} times in a row")]
    KeyGenCollision(u32),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for key operations
pub type SkiResult<T> = Result<T, SkiError>;
