use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use http::HeaderValue;

const BASIC_PREFIX: &str = "Basic ";

/// Per-request store credentials taken from `Authorization: Basic ...`
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub user: String,
    pub password: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Extracts the credential pair from an `Authorization` header.
///
/// Never fails: undecodable input is taken as the raw text, and text without
/// a `:` becomes a user with an empty password. Such credentials are then
/// rejected by the store at connect time.
pub fn extract(header: Option<&HeaderValue>) -> Option<Credential> {
    let raw = header?.as_bytes();
    let encoded = raw.strip_prefix(BASIC_PREFIX.as_bytes()).unwrap_or(raw);

    let decoded = STANDARD.decode(encoded).unwrap_or_else(|_| encoded.to_vec());
    let text = String::from_utf8_lossy(&decoded);

    let (user, password) = text.split_once(':').unwrap_or((&text, ""));
    Some(Credential {
        user: user.to_string(),
        password: password.to_string(),
    })
}
