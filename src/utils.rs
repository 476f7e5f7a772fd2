//! Small helpers shared by the engine and the boundary layer.

/// Generate an unguessable state token for OAuth2 handshakes.
///
/// Uses 32 bytes of randomness (256 bits), URL-safe base64 without padding
/// so the token survives query strings unescaped.
#[must_use]
pub fn generate_state_token() -> String {
    use base64::Engine;
    let bytes: [u8; 32] = rand::random();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Append callback parameters to a caller-supplied redirect URL.
///
/// The original redirect is captured at handshake start and already carries
/// its own query string; parameters are appended with `&` and values are
/// percent-encoded.
#[must_use]
pub fn relay_url(redirect: &str, params: &[(&str, &str)]) -> String {
    let mut url = String::from(redirect);
    for (key, value) in params {
        url.push('&');
        url.push_str(key);
        url.push('=');
        url.push_str(&urlencoding::encode(value));
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_tokens_are_unique_and_url_safe() {
        let a = generate_state_token();
        let b = generate_state_token();
        assert_ne!(a, b);
        // 32 bytes -> 43 chars of unpadded base64
        assert_eq!(a.len(), 43);
        assert!(!a.contains('+') && !a.contains('/') && !a.contains('='));
    }

    #[test]
    fn relay_url_appends_and_encodes() {
        let url = relay_url(
            "https://app.example.com/link?from=settings",
            &[("token", "abc def"), ("site", "twitter")],
        );
        assert_eq!(
            url,
            "https://app.example.com/link?from=settings&token=abc%20def&site=twitter"
        );
    }
}
