//! HTTP retrieval through a reusable transfer handle.
//!
//! A [`TransferHandle`] wraps one blocking `reqwest` client configured for
//! redirect following, no retries and, unless configured otherwise, no
//! timeout. Retrieval takes `&mut self`: the handle is reconfigured in place
//! by [`TransferHandle::set_trust_store`], so callers sharing one handle
//! across threads must serialize access themselves.
//!
//! Any status other than 200 is a failure, even when the body was
//! transferred completely.
//!
//! # Examples
//!
//! ```no_run
//! use lpm_native::http::{TransferConfig, TransferHandle};
//!
//! # fn example() -> lpm_native::Result<()> {
//! let config = TransferConfig::new().with_user_agent("lpm-test");
//! let mut handle = TransferHandle::with_config(config)?;
//!
//! // Into memory
//! let manifest = handle.get("https://example.com/manifest.json", None)?;
//! println!("{} bytes", manifest.body.map(|b| b.len()).unwrap_or(0));
//!
//! // Straight to disk
//! handle.get("https://example.com/plugin.tar.gz", Some("/tmp/plugin.tar.gz".as_ref()))?;
//! # Ok(())
//! # }
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use indexmap::IndexMap;
use reqwest::blocking::{Client, Response};
use reqwest::redirect::Policy;

use crate::trust::TrustStore;
use crate::{Error, Result};

const DEFAULT_USER_AGENT: &str = concat!("lpm/", env!("CARGO_PKG_VERSION"));
const DEFAULT_MAX_REDIRECTS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferConfig {
    pub user_agent: String,
    /// `None` blocks for as long as the transfer takes.
    pub timeout: Option<Duration>,
    pub max_redirects: usize,
    pub trust_store: Option<TrustStore>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout: None,
            max_redirects: DEFAULT_MAX_REDIRECTS,
            trust_store: None,
        }
    }
}

impl TransferConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_redirects(mut self, max_redirects: usize) -> Self {
        self.max_redirects = max_redirects;
        self
    }

    pub fn with_trust_store(mut self, trust_store: TrustStore) -> Self {
        self.trust_store = Some(trust_store);
        self
    }
}

/// What the server said besides the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseMetadata {
    pub status: u16,
    /// Final URL after redirects.
    pub url: String,
    /// Lower-case header names; repeated headers are joined with `", "`.
    pub headers: IndexMap<String, String>,
}

impl ResponseMetadata {
    fn from_response(response: &Response) -> Self {
        let mut headers: IndexMap<String, String> = IndexMap::new();
        for (name, value) in response.headers() {
            let Ok(value) = value.to_str() else {
                continue;
            };
            headers
                .entry(name.as_str().to_string())
                .and_modify(|existing| {
                    existing.push_str(", ");
                    existing.push_str(value);
                })
                .or_insert_with(|| value.to_string());
        }
        Self {
            status: response.status().as_u16(),
            url: response.url().to_string(),
            headers,
        }
    }
}

/// A completed retrieval. `body` is `None` when it was streamed to a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Retrieved {
    pub body: Option<Vec<u8>>,
    pub metadata: ResponseMetadata,
}

/// The reusable HTTP client context.
pub struct TransferHandle {
    client: Client,
    config: TransferConfig,
}

impl TransferHandle {
    pub fn new() -> Result<Self> {
        Self::with_config(TransferConfig::default())
    }

    /// Build the client, then point libgit2 at the same trust store, if any.
    /// Git is left untouched when the client cannot be built.
    pub fn with_config(config: TransferConfig) -> Result<Self> {
        let client = build_client(&config)?;
        if let Some(store) = &config.trust_store {
            store.apply_to_git()?;
        }
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Trust only the certificates in `store` from now on, for HTTP and Git.
    ///
    /// Both transports keep their previous roots if the store cannot be
    /// loaded.
    pub fn set_trust_store(&mut self, store: TrustStore) -> Result<()> {
        let mut config = self.config.clone();
        config.trust_store = Some(store.clone());
        let client = build_client(&config)?;
        store.apply_to_git()?;
        self.client = client;
        self.config = config;
        Ok(())
    }

    /// GET `url`, into memory or, with `destination`, into that file.
    ///
    /// The destination is opened before the request is made and is left in
    /// place, with whatever the server sent, when the status is not 200.
    pub fn get(&mut self, url: &str, destination: Option<&Path>) -> Result<Retrieved> {
        log::debug!("GET {}", url);
        let sink = match destination {
            Some(path) => Some(File::create(path).map_err(|source| Error::Destination {
                path: path.display().to_string(),
                cause: source,
            })?),
            None => None,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| Error::transport(url, e))?;
        let metadata = ResponseMetadata::from_response(&response);

        let body = match (sink, destination) {
            (Some(file), Some(path)) => {
                let mut writer = BufWriter::new(file);
                response
                    .copy_to(&mut writer)
                    .map_err(|e| Error::transport(url, e))?;
                writer.flush().map_err(|source| Error::Destination {
                    path: path.display().to_string(),
                    cause: source,
                })?;
                None
            }
            _ => {
                let mut buffer = Vec::new();
                response
                    .copy_to(&mut buffer)
                    .map_err(|e| Error::transport(url, e))?;
                Some(buffer)
            }
        };

        log::debug!("{} {} ({})", metadata.status, url, metadata.url);
        if metadata.status != 200 {
            return Err(Error::HttpStatus {
                url: url.to_string(),
                status: metadata.status,
            });
        }
        Ok(Retrieved { body, metadata })
    }
}

fn build_client(config: &TransferConfig) -> Result<Client> {
    let mut builder = Client::builder()
        .user_agent(config.user_agent.as_str())
        .timeout(config.timeout)
        .redirect(Policy::limited(config.max_redirects));

    if let Some(store) = &config.trust_store {
        let certificates = store.certificates()?;
        log::debug!(
            "HTTP trust store: {} certificates from {}",
            certificates.len(),
            store.path.display()
        );
        builder = builder.tls_built_in_root_certs(false);
        for certificate in certificates {
            builder = builder.add_root_certificate(certificate);
        }
    }

    builder.build().map_err(Error::TransferSetup)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;
    use tiny_http::{Header, Response as ServerResponse, Server};

    /// Serves `/ok`, `/missing` (404 with a body) and `/moved` (302 to `/ok`).
    fn serve(body: &'static [u8]) -> String {
        let server = Server::http("127.0.0.1:0").unwrap();
        let port = server.server_addr().to_ip().unwrap().port();
        std::thread::spawn(move || {
            for request in server.incoming_requests() {
                let path = request.url().to_string();
                let _ = match path.as_str() {
                    "/ok" => request.respond(ServerResponse::from_data(body)),
                    "/moved" => {
                        let location = Header::from_bytes(&b"Location"[..], &b"/ok"[..]).unwrap();
                        request.respond(ServerResponse::empty(302).with_header(location))
                    }
                    _ => request
                        .respond(ServerResponse::from_string("not here").with_status_code(404)),
                };
            }
        });
        format!("http://127.0.0.1:{}", port)
    }

    #[test]
    fn test_default_config() {
        let config = TransferConfig::default();
        assert_eq!(config.user_agent, DEFAULT_USER_AGENT);
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_redirects, DEFAULT_MAX_REDIRECTS);
        assert!(config.trust_store.is_none());
    }

    #[test]
    fn test_config_builder() {
        let config = TransferConfig::new()
            .with_user_agent("custom")
            .with_timeout(Duration::from_secs(5))
            .with_max_redirects(2);
        assert_eq!(config.user_agent, "custom");
        assert_eq!(config.timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.max_redirects, 2);
    }

    #[test]
    fn test_get_into_memory() {
        let base = serve(b"hello lpm!");
        let mut handle = TransferHandle::new().unwrap();

        let retrieved = handle.get(&format!("{}/ok", base), None).unwrap();

        assert_eq!(retrieved.body.as_deref(), Some(&b"hello lpm!"[..]));
        assert_eq!(retrieved.metadata.status, 200);
        assert!(retrieved.metadata.headers.contains_key("content-length"));
    }

    #[test]
    fn test_get_follows_redirects() {
        let base = serve(b"redirected");
        let mut handle = TransferHandle::new().unwrap();

        let retrieved = handle.get(&format!("{}/moved", base), None).unwrap();

        assert_eq!(retrieved.body.as_deref(), Some(&b"redirected"[..]));
        assert_eq!(retrieved.metadata.url, format!("{}/ok", base));
    }

    #[test]
    fn test_get_into_file() {
        let base = serve(b"file body");
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("download.bin");
        let mut handle = TransferHandle::new().unwrap();

        let retrieved = handle
            .get(&format!("{}/ok", base), Some(&destination))
            .unwrap();

        assert!(retrieved.body.is_none());
        assert_eq!(std::fs::read(&destination).unwrap(), b"file body");
    }

    #[test]
    fn test_non_200_is_an_error() {
        let base = serve(b"unused");
        let mut handle = TransferHandle::new().unwrap();
        let url = format!("{}/missing", base);

        let error = handle.get(&url, None).unwrap_err();

        assert_eq!(error.kind(), ErrorKind::HttpStatus);
        assert!(error.to_string().contains("404"));
        match error {
            Error::HttpStatus { status, url: failed } => {
                assert_eq!(status, 404);
                assert_eq!(failed, url);
            }
            other => panic!("Expected HttpStatus error, got {:?}", other),
        }
    }

    #[test]
    fn test_unwritable_destination() {
        let dir = TempDir::new().unwrap();
        let destination = dir.path().join("no/such/dir/file");
        let mut handle = TransferHandle::new().unwrap();

        let error = handle
            .get("http://127.0.0.1:9/never-contacted", Some(&destination))
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::NotFound);
        assert!(error.to_string().starts_with("error opening file"));
    }

    #[test]
    fn test_connection_refused_is_transport_error() {
        // Bind then drop to get a port nothing listens on.
        let port = std::net::TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let mut handle = TransferHandle::new().unwrap();

        let error = handle
            .get(&format!("http://127.0.0.1:{}/", port), None)
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::Transport);
    }

    #[test]
    fn test_set_trust_store_rebuilds_client() {
        let dir = TempDir::new().unwrap();
        let mut handle = TransferHandle::new().unwrap();
        handle.set_trust_store(TrustStore::dir(dir.path())).unwrap();
        assert_eq!(handle.config().trust_store, Some(TrustStore::dir(dir.path())));

        let error = handle
            .set_trust_store(TrustStore::file(dir.path().join("missing.pem")))
            .unwrap_err();
        assert!(error.to_string().starts_with("can't load trust store"));
        // A failed reconfiguration keeps the previous store.
        assert_eq!(handle.config().trust_store, Some(TrustStore::dir(dir.path())));
    }
}
