//! Token fixtures signed with a fixed secret.

use common::jwt::{issue_user_token, UserClaims, DEFAULT_TOKEN_TTL};
use common::types::SubjectId;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// HS256 secret shared by every test token and `test_authenticator()`.
pub const TEST_JWT_SECRET: &str = "ticket-hub-test-secret-do-not-use-in-production";

/// A valid token for `subject`, good for a day.
pub fn test_token(subject: SubjectId) -> String {
    TestTokenBuilder::new().for_subject(subject).build()
}

/// Builder for user tokens with non-default timing.
///
/// # Example
/// ```rust,ignore
/// let expired = TestTokenBuilder::new()
///     .for_subject(SubjectId(7))
///     .expired_by(Duration::from_secs(3600))
///     .build();
/// ```
pub struct TestTokenBuilder {
    claims: UserClaims,
    secret: Vec<u8>,
}

impl Default for TestTokenBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TestTokenBuilder {
    pub fn new() -> Self {
        Self {
            claims: UserClaims::new(
                SubjectId(1),
                "test-user",
                "test-user@example.com",
                DEFAULT_TOKEN_TTL,
            ),
            secret: TEST_JWT_SECRET.as_bytes().to_vec(),
        }
    }

    pub fn for_subject(mut self, subject: SubjectId) -> Self {
        self.claims.user_id = subject;
        self.claims.username = format!("user-{subject}");
        self.claims.email = format!("user-{subject}@example.com");
        self
    }

    /// Set `exp` to `ago` in the past.
    pub fn expired_by(mut self, ago: Duration) -> Self {
        let now = unix_now();
        self.claims.exp = now - ago.as_secs() as i64;
        self.claims.iat = self.claims.exp - 3600;
        self.claims.nbf = self.claims.iat;
        self
    }

    /// Sign with a different secret.
    pub fn signed_with(mut self, secret: &[u8]) -> Self {
        self.secret = secret.to_vec();
        self
    }

    pub fn build(self) -> String {
        issue_user_token(&self.claims, &self.secret).expect("test token should sign")
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("clock after epoch")
        .as_secs() as i64
}
