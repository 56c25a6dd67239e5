//! Redacting wrappers for sensitive values.
//!
//! Re-exports [`secrecy`] types so every ticket hub crate stores signing keys
//! and bearer tokens the same way. `SecretString` prints as `[REDACTED]` under
//! `{:?}`, which keeps secrets out of `tracing` output when a containing struct
//! derives `Debug`.
//!
//! ```rust
//! use common::secret::{ExposeSecret, SecretString};
//!
//! #[derive(Debug)]
//! struct SigningConfig {
//!     issuer: String,
//!     key: SecretString,
//! }
//!
//! let cfg = SigningConfig {
//!     issuer: "ticket-hub".to_string(),
//!     key: SecretString::from("0123456789abcdef0123456789abcdef"),
//! };
//!
//! assert!(!format!("{cfg:?}").contains("0123456789abcdef"));
//! assert_eq!(cfg.key.expose_secret().len(), 32);
//! ```

pub use secrecy::{ExposeSecret, SecretBox, SecretString};
