//! Looking up the newest published platform release

use std::time::Duration;

use serde::Deserialize;
use tracing::debug;

use crate::components::PlatformVersion;
use crate::error::{Error, Result};

pub const LATEST_RELEASE_URL: &str =
    "https://api.github.com/repos/OpenFunction/OpenFunction/releases/latest";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    tag_name: String,
}

// ============================================================================
// SBIO: Pure parsing
// ============================================================================

/// Extract the platform version from a releases API response body
pub fn parse_release(body: &str) -> Result<PlatformVersion> {
    let info: ReleaseInfo = serde_json::from_str(body)
        .map_err(|e| Error::Release(format!("unexpected response: {e}")))?;
    PlatformVersion::parse(&info.tag_name)
        .map_err(|e| Error::Release(format!("release tag '{}': {e}", info.tag_name)))
}

// ============================================================================
// I/O boundary functions
// ============================================================================

/// Fetch the latest stable release from `url`
pub async fn latest_release(url: &str) -> Result<PlatformVersion> {
    let client = reqwest::Client::builder()
        .timeout(LOOKUP_TIMEOUT)
        .user_agent(concat!("ofn/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Release(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| Error::Release(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::Release(format!("HTTP {} for {}", status, url)));
    }

    let body = response
        .text()
        .await
        .map_err(|e| Error::Release(e.to_string()))?;
    let version = parse_release(&body)?;
    debug!("Latest release is {}", version);
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::GenericVersion;

    #[test]
    fn test_parse_release() {
        let body = r#"{"tag_name": "v0.6.0", "name": "v0.6.0", "prerelease": false}"#;
        assert_eq!(
            parse_release(body).unwrap(),
            PlatformVersion::Release(GenericVersion::new(0, 6, 0))
        );
    }

    #[test]
    fn test_parse_release_bad_tag() {
        let body = r#"{"tag_name": "nightly"}"#;
        assert!(matches!(parse_release(body), Err(Error::Release(_))));
    }

    #[test]
    fn test_parse_release_bad_body() {
        assert!(matches!(
            parse_release(r#"{"message": "API rate limit exceeded"}"#),
            Err(Error::Release(_))
        ));
    }
}
