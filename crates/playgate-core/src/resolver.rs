//! Stream resolver
//!
//! Turns a configured `StreamSource` into a concrete `ResolvedSource`. Pure
//! string work: protected URLs are de-obfuscated on a best-effort basis,
//! insecure URLs are upgraded when the host page is secure, and the transport
//! is sniffed from the URL when the source did not declare one.

use crate::types::{ResolvedSource, StreamSource, TransportType};
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine as _;
use tracing::debug;

/// Obfuscated URLs shorter than this are taken as plain text
const MIN_OBFUSCATED_LEN: usize = 21;

const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const FILE_EXTENSIONS: [&str; 5] = [".mp4", ".webm", ".ogg", ".m4v", ".mov"];

/// Resolves stream sources for one host page
#[derive(Debug, Clone, Default)]
pub struct StreamResolver {
    /// Host document was loaded over https
    secure_origin: bool,
    live_signatures: Vec<String>,
}

impl StreamResolver {
    pub fn new(secure_origin: bool, live_signatures: Vec<String>) -> Self {
        let live_signatures = live_signatures
            .into_iter()
            .map(|s| s.to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self { secure_origin, live_signatures }
    }

    pub fn resolve(&self, source: &StreamSource) -> ResolvedSource {
        let mut url = source.url.trim().to_string();

        if source.is_obfuscated {
            url = deobfuscate_url(&url);
        }

        if self.secure_origin {
            url = upgrade_insecure(&url);
        }

        let transport_type = source
            .declared_type
            .and_then(|t| t.concrete())
            .unwrap_or_else(|| self.detect(&url));

        debug!(url = %url, transport = %transport_type, "Resolved stream source");

        ResolvedSource {
            effective_url: url,
            transport_type,
        }
    }

    /// Sniff the transport from the URL alone
    pub fn detect(&self, url: &str) -> TransportType {
        let lower = url.to_ascii_lowercase();

        if self.live_signatures.iter().any(|sig| lower.contains(sig.as_str())) {
            return TransportType::Segmented;
        }
        if lower.contains("m3u8") {
            return TransportType::Segmented;
        }
        if lower.contains(".mpd") {
            return TransportType::Manifest;
        }
        if FILE_EXTENSIONS.iter().any(|ext| lower.contains(ext)) {
            return TransportType::File;
        }

        // External embeds
        TransportType::Frame
    }
}

/// Reverse the base64 obfuscation of a protected URL.
///
/// Anything that does not look like base64, or does not decode to UTF-8, is
/// returned unchanged.
pub fn deobfuscate_url(url: &str) -> String {
    let candidate = url.trim();
    let looks_encoded = candidate.len() >= MIN_OBFUSCATED_LEN
        && candidate
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=');

    if !looks_encoded {
        return url.to_string();
    }

    match LENIENT.decode(candidate) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(decoded) if !decoded.trim().is_empty() => decoded.trim().to_string(),
            _ => url.to_string(),
        },
        Err(e) => {
            debug!(error = %e, "Protected URL is not valid base64, using as-is");
            url.to_string()
        }
    }
}

/// Produce the protected form of a URL
pub fn obfuscate_url(url: &str) -> String {
    STANDARD.encode(url)
}

/// Rewrite `http://` to `https://`, leaving every other URL untouched
pub fn upgrade_insecure(url: &str) -> String {
    const INSECURE: &str = "http://";
    match url.get(..INSECURE.len()) {
        Some(scheme) if scheme.eq_ignore_ascii_case(INSECURE) => {
            format!("https://{}", &url[INSECURE.len()..])
        }
        _ => url.to_string(),
    }
}
