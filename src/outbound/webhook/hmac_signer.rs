use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// HMAC-SHA256 signer for outbound webhooks.
///
/// Holds the endpoint secret for the duration of one delivery cycle. The
/// secret is wrapped in [`SecretString`], so `Debug` output is redacted and
/// the memory is zeroed on drop.
pub struct HmacSigner {
    secret: SecretString,
}

impl HmacSigner {
    pub fn new(secret: SecretString) -> Self {
        Self { secret }
    }

    /// Sign a payload with the current time, returning `(signature, timestamp)`.
    ///
    /// The timestamp is milliseconds since the Unix epoch rendered as a
    /// decimal string, exactly as it goes into the timestamp header.
    pub fn sign(&self, payload: &str) -> (String, String) {
        let timestamp = current_timestamp_ms().to_string();
        let signature = self.sign_with_timestamp(payload, &timestamp);
        (signature, timestamp)
    }

    /// Lowercase hex of `HMAC_SHA256(secret, "{timestamp}.{payload}")`.
    pub fn sign_with_timestamp(&self, payload: &str, timestamp: &str) -> String {
        hmac_hex(self.secret.expose_secret().as_bytes(), timestamp, payload.as_bytes())
    }
}

impl std::fmt::Debug for HmacSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacSigner").finish_non_exhaustive()
    }
}

fn hmac_hex(key: &[u8], timestamp: &str, body: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(key) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC key can be of any size, as per crate documentation"),
    };

    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(body);

    hex::encode(mac.finalize().into_bytes())
}

fn current_timestamp_ms() -> i128 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000
}

/// Helper function to format signature for HTTP header
pub fn format_signature_header(signature: &str) -> String {
    format!("sha256={signature}")
}

/// Helper function to parse signature from HTTP header
pub fn parse_signature_header(header: &str) -> Result<&str, String> {
    header
        .strip_prefix("sha256=")
        .ok_or_else(|| format!("Invalid signature header format: {header}"))
}

/// Receiver-side check of a delivered webhook.
///
/// Recomputes the HMAC over `"{timestamp_header}.{raw_body}"` and compares it
/// with the signature header in constant time.
pub fn verify_signature(
    secret: &str,
    timestamp_header: &str,
    raw_body: &[u8],
    signature_header: &str,
) -> bool {
    let Ok(provided) = parse_signature_header(signature_header) else {
        return false;
    };

    let expected = hmac_hex(secret.as_bytes(), timestamp_header, raw_body);
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}
