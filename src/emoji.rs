use std::time::Duration;

use reqwest::blocking::Client as HttpClient;
use reqwest::header::{ACCEPT, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

pub const CUSTOM_EMOJIS_PATH: &str = "/api/v1/custom_emojis";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomEmoji {
    pub shortcode: String,
    #[serde(rename = "static_url")]
    pub url: String,
    #[serde(default = "default_visible")]
    pub visible_in_picker: bool,
}

fn default_visible() -> bool {
    true
}

impl CustomEmoji {
    pub fn new(shortcode: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            shortcode: shortcode.into(),
            url: url.into(),
            visible_in_picker: true,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid instance host {0:?}")]
    InvalidHost(String),
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("decode custom emoji listing: {0}")]
    Decode(#[from] serde_json::Error),
}

pub trait EmojiFetcher: Send + Sync {
    fn fetch(&self, host: &str) -> Result<Vec<CustomEmoji>, FetchError>;
}

#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub user_agent: String,
    pub timeout: Option<Duration>,
    pub http_client: Option<HttpClient>,
    pub scheme: Option<String>,
}

pub struct Client {
    http: HttpClient,
    user_agent: String,
    scheme: String,
}

impl Client {
    pub fn new(config: ClientConfig) -> Result<Self, FetchError> {
        let http = match config.http_client {
            Some(client) => client,
            None => HttpClient::builder()
                .timeout(config.timeout.unwrap_or(Duration::from_secs(20)))
                .build()?,
        };

        let user_agent = if config.user_agent.trim().is_empty() {
            format!("trwl-status/{}", crate::VERSION)
        } else {
            config.user_agent
        };

        Ok(Client {
            http,
            user_agent,
            scheme: config.scheme.unwrap_or_else(|| "https".to_string()),
        })
    }

    pub fn listing_url(&self, host: &str) -> Result<String, FetchError> {
        listing_url(&self.scheme, host)
    }
}

impl EmojiFetcher for Client {
    fn fetch(&self, host: &str) -> Result<Vec<CustomEmoji>, FetchError> {
        let url = self.listing_url(host)?;
        let response = self
            .http
            .get(&url)
            .header(USER_AGENT, &self.user_agent)
            .header(ACCEPT, "application/json")
            .send()?;

        if !response.status().is_success() {
            return Err(FetchError::Status(response.status()));
        }

        let body = response.bytes()?;
        parse_listing(&body)
    }
}

pub fn is_valid_host(host: &str) -> bool {
    !host.is_empty()
        && !host.starts_with('.')
        && !host.contains("..")
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'))
}

fn listing_url(scheme: &str, host: &str) -> Result<String, FetchError> {
    let host = host.trim();
    if !is_valid_host(host) {
        return Err(FetchError::InvalidHost(host.to_string()));
    }
    Ok(format!("{scheme}://{host}{CUSTOM_EMOJIS_PATH}"))
}

pub fn parse_listing(body: &[u8]) -> Result<Vec<CustomEmoji>, FetchError> {
    Ok(serde_json::from_slice(body)?)
}

pub fn search<'a>(emojis: &'a [CustomEmoji], query: &str) -> Vec<&'a CustomEmoji> {
    let needle = query.to_lowercase();
    emojis
        .iter()
        .filter(|emoji| emoji.visible_in_picker)
        .filter(|emoji| emoji.shortcode.to_lowercase().contains(&needle))
        .collect()
}

pub fn find<'a>(emojis: &'a [CustomEmoji], shortcode: &str) -> Option<&'a CustomEmoji> {
    emojis.iter().find(|emoji| emoji.shortcode == shortcode)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"[
        {"shortcode": "blobcat", "url": "https://x/orig.gif", "static_url": "https://x/blobcat.png", "visible_in_picker": true, "category": "blobs"},
        {"shortcode": "BlobFox", "static_url": "https://x/blobfox.png", "visible_in_picker": true},
        {"shortcode": "hidden_blob", "static_url": "https://x/hidden.png", "visible_in_picker": false}
    ]"#;

    #[test]
    fn listing_decodes_static_url_and_ignores_extra_fields() {
        let emojis = parse_listing(LISTING.as_bytes()).unwrap();
        assert_eq!(emojis.len(), 3);
        assert_eq!(emojis[0].url, "https://x/blobcat.png");
        assert!(!emojis[2].visible_in_picker);
    }

    #[test]
    fn malformed_listing_is_a_decode_error() {
        let err = parse_listing(b"{\"error\": \"nope\"}").unwrap_err();
        assert!(matches!(err, FetchError::Decode(_)));
    }

    #[test]
    fn listing_url_uses_mastodon_path() {
        let client = Client::new(ClientConfig::default()).unwrap();
        assert_eq!(
            client.listing_url("chaos.social").unwrap(),
            "https://chaos.social/api/v1/custom_emojis"
        );
        assert!(matches!(
            client.listing_url("evil.com/path?x"),
            Err(FetchError::InvalidHost(_))
        ));
        assert!(client.listing_url("  ").is_err());
    }

    #[test]
    fn host_validation_rejects_path_segments() {
        assert!(is_valid_host("chaos.social"));
        assert!(is_valid_host("127.0.0.1:8080"));
        assert!(is_valid_host("[::1]:443"));
        assert!(!is_valid_host("../etc"));
        assert!(!is_valid_host("a/b"));
        assert!(!is_valid_host("a..b"));
        assert!(!is_valid_host(""));
    }

    fn serve(responses: Vec<String>) -> (String, std::thread::JoinHandle<()>) {
        use std::io::{Read, Write};
        use std::net::TcpListener;

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let host = listener.local_addr().unwrap().to_string();
        let handle = std::thread::spawn(move || {
            for response in responses {
                let (mut stream, _) = listener.accept().unwrap();
                let mut request = Vec::new();
                let mut buf = [0u8; 1024];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    let n = stream.read(&mut buf).unwrap();
                    if n == 0 {
                        break;
                    }
                    request.extend_from_slice(&buf[..n]);
                }
                let head = String::from_utf8_lossy(&request);
                assert!(head.starts_with("GET /api/v1/custom_emojis "));
                assert!(head.to_lowercase().contains("user-agent: trwl-status-test"));
                stream.write_all(response.as_bytes()).unwrap();
            }
        });
        (host, handle)
    }

    fn response(status: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
    }

    #[test]
    fn fetch_maps_error_status_and_decodes_success() {
        let (host, server) = serve(vec![
            response("404 Not Found", ""),
            response("200 OK", LISTING),
        ]);
        let client = Client::new(ClientConfig {
            user_agent: "trwl-status-test".into(),
            timeout: Some(Duration::from_secs(5)),
            scheme: Some("http".into()),
            ..Default::default()
        })
        .unwrap();

        let err = client.fetch(&host).unwrap_err();
        assert!(matches!(err, FetchError::Status(status) if status == StatusCode::NOT_FOUND));

        let emojis = client.fetch(&host).unwrap();
        assert_eq!(emojis.len(), 3);
        assert_eq!(emojis[1].shortcode, "BlobFox");
        server.join().unwrap();
    }

    #[test]
    fn search_is_case_insensitive_and_skips_hidden() {
        let emojis = parse_listing(LISTING.as_bytes()).unwrap();
        let names: Vec<_> = search(&emojis, "BLOB").iter().map(|e| e.shortcode.as_str()).collect();
        assert_eq!(names, vec!["blobcat", "BlobFox"]);
        assert!(search(&emojis, "zzz").is_empty());
    }

    #[test]
    fn find_is_exact() {
        let emojis = parse_listing(LISTING.as_bytes()).unwrap();
        assert!(find(&emojis, "blobcat").is_some());
        assert!(find(&emojis, "Blobcat").is_none());
    }
}
