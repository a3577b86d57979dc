//! Endpoint, credential and TLS resolution.
//!
//! Every setting is resolved with the same precedence: an inline value in
//! [`TransportSettings`] wins, then an environment variable, and for PEM
//! material a file whose path is named by an environment variable. An empty
//! environment variable counts as unset.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use hsconverge_core::Secret;
use serde::Deserialize;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::{Certificate, ClientTlsConfig, Endpoint, Identity};

use crate::error::{Result, TransportError};
use crate::grpc::{BearerAuth, GrpcHeadscaleClient};
use crate::pem;
use crate::tls::{skip_verification_config, SkipVerifyConnector};

/// Environment variable naming the endpoint.
pub const ENV_ENDPOINT: &str = "HEADSCALE_ENDPOINT";
/// Environment variable carrying the API key.
pub const ENV_API_KEY: &str = "HEADSCALE_API_KEY";
/// Environment variable carrying the insecure flag.
pub const ENV_TLS_INSECURE: &str = "HEADSCALE_TLS_INSECURE";
/// Environment variable naming a CA certificate file.
pub const ENV_TLS_CA_PATH: &str = "HEADSCALE_TLS_CA_PATH";
/// Environment variable naming a client certificate file.
pub const ENV_TLS_CLIENT_CERT_PATH: &str = "HEADSCALE_TLS_CLIENT_CERT_PATH";
/// Environment variable naming a client key file.
pub const ENV_TLS_CLIENT_KEY_PATH: &str = "HEADSCALE_TLS_CLIENT_KEY_PATH";

/// Source of environment variables.
pub trait EnvSource {
    /// Look up a variable. Empty values are reported as `None`.
    fn var(&self, key: &str) -> Option<String>;
}

/// The process environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|value| !value.is_empty())
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).filter(|value| !value.is_empty()).cloned()
    }
}

/// Connection settings for the coordination service.
#[derive(Debug, Clone, Deserialize)]
pub struct TransportSettings {
    /// Service address: `host:port`, `dns:///host:port`, or an
    /// `http://`/`https://` URL.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Bearer token sent on every request.
    #[serde(default)]
    pub api_key: Option<Secret>,

    /// TLS options.
    #[serde(default)]
    pub tls: TlsSettings,

    /// How long to wait for the connection to be established, in seconds.
    #[serde(default = "TransportSettings::default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl TransportSettings {
    const fn default_connect_timeout_secs() -> u64 {
        10
    }

    /// Resolve the settings against the process environment.
    ///
    /// # Errors
    ///
    /// See [`TransportSettings::resolve`].
    pub fn resolve_from_env(&self) -> Result<ResolvedTransport> {
        self.resolve(&ProcessEnv)
    }

    /// Resolve the settings against an environment.
    ///
    /// # Errors
    ///
    /// Returns a `TransportError` if the endpoint is missing or unsupported,
    /// a boolean is unparsable, a file cannot be read, PEM material is
    /// malformed, or only half of the client identity is configured.
    pub fn resolve(&self, env: &dyn EnvSource) -> Result<ResolvedTransport> {
        let endpoint = self
            .endpoint
            .clone()
            .or_else(|| env.var(ENV_ENDPOINT))
            .filter(|endpoint| !endpoint.is_empty())
            .ok_or(TransportError::MissingEndpoint)?;

        let api_key = self
            .api_key
            .clone()
            .or_else(|| env.var(ENV_API_KEY).map(Secret::new))
            .filter(|key| !key.is_empty());
        let bearer = api_key.as_ref().map(bearer_value).transpose()?;

        let insecure = match self.tls.insecure {
            Some(insecure) => insecure,
            None => match env.var(ENV_TLS_INSECURE) {
                Some(value) => parse_bool(&value).ok_or(TransportError::InvalidBool {
                    var: ENV_TLS_INSECURE,
                    value,
                })?,
                None => false,
            },
        };

        let ca_pem = pem_setting(self.tls.ca_pem.clone(), env, ENV_TLS_CA_PATH)?;
        if let Some(ca) = &ca_pem {
            pem::expect_certificates(ca).map_err(|reason| TransportError::InvalidPem {
                what: "ca_pem",
                reason,
            })?;
        }

        let client_cert = pem_setting(
            self.tls.client_cert_pem.clone(),
            env,
            ENV_TLS_CLIENT_CERT_PATH,
        )?;
        let client_key = pem_setting(
            self.tls
                .client_key_pem
                .as_ref()
                .map(|key| key.expose().to_string()),
            env,
            ENV_TLS_CLIENT_KEY_PATH,
        )?;
        let identity = match (client_cert, client_key) {
            (None, None) => None,
            (Some(cert), Some(key)) => {
                pem::expect_certificates(&cert).map_err(|reason| {
                    TransportError::InvalidPem {
                        what: "client_cert_pem",
                        reason,
                    }
                })?;
                pem::expect_private_key(&key).map_err(|reason| TransportError::InvalidPem {
                    what: "client_key_pem",
                    reason,
                })?;
                Some((cert, Secret::new(key)))
            }
            _ => return Err(TransportError::IncompleteClientIdentity),
        };

        let (uri, scheme_tls) = normalize_endpoint(&endpoint)?;
        let tls = if scheme_tls {
            if insecure && ca_pem.is_some() {
                tracing::warn!(
                    endpoint = %endpoint,
                    "CA certificate ignored: server verification is disabled"
                );
            }
            Some(ResolvedTls {
                ca_pem,
                identity,
                verify_server: !insecure,
            })
        } else {
            if ca_pem.is_some() || identity.is_some() {
                tracing::warn!(
                    endpoint = %endpoint,
                    "TLS material configured but the connection is plaintext"
                );
            }
            None
        };

        Ok(ResolvedTransport {
            uri,
            bearer,
            tls,
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
        })
    }
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            tls: TlsSettings::default(),
            connect_timeout_secs: Self::default_connect_timeout_secs(),
        }
    }
}

/// TLS options.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TlsSettings {
    /// Skip server certificate verification. Without a value,
    /// `HEADSCALE_TLS_INSECURE` decides.
    #[serde(default)]
    pub insecure: Option<bool>,

    /// Inline CA certificate(s) in PEM form.
    #[serde(default)]
    pub ca_pem: Option<String>,

    /// Inline client certificate in PEM form.
    #[serde(default)]
    pub client_cert_pem: Option<String>,

    /// Inline client private key in PEM form.
    #[serde(default)]
    pub client_key_pem: Option<Secret>,
}

/// Fully resolved, validated connection parameters.
#[derive(Debug, Clone)]
pub struct ResolvedTransport {
    uri: String,
    bearer: Option<AsciiMetadataValue>,
    tls: Option<ResolvedTls>,
    connect_timeout: Duration,
}

#[derive(Debug, Clone)]
struct ResolvedTls {
    ca_pem: Option<String>,
    identity: Option<(String, Secret)>,
    verify_server: bool,
}

impl ResolvedTransport {
    /// The URI the channel dials.
    #[must_use]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Returns true if the channel uses TLS.
    #[must_use]
    pub const fn uses_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Returns true if the server certificate is verified. Always false for
    /// plaintext channels.
    #[must_use]
    pub fn verifies_server(&self) -> bool {
        self.tls.as_ref().is_some_and(|tls| tls.verify_server)
    }

    /// Returns true if requests carry a bearer token.
    #[must_use]
    pub const fn has_credentials(&self) -> bool {
        self.bearer.is_some()
    }

    /// Returns true if a client certificate is presented.
    #[must_use]
    pub fn has_client_identity(&self) -> bool {
        self.tls.as_ref().is_some_and(|tls| tls.identity.is_some())
    }

    /// Build a client over one lazily connected channel.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::Transport` if the endpoint or TLS
    /// configuration is rejected by the transport.
    pub fn connect(&self) -> Result<GrpcHeadscaleClient> {
        let channel = match &self.tls {
            None => self.endpoint(&self.uri)?.connect_lazy(),
            Some(tls) if tls.verify_server => {
                let mut config = ClientTlsConfig::new();
                config = match &tls.ca_pem {
                    Some(ca) => config.ca_certificate(Certificate::from_pem(ca)),
                    None => config.with_native_roots(),
                };
                if let Some((cert, key)) = &tls.identity {
                    config = config.identity(Identity::from_pem(cert, key.expose()));
                }
                self.endpoint(&self.uri)?.tls_config(config)?.connect_lazy()
            }
            Some(tls) => {
                // The connector does TLS itself; tonic must not see https.
                let connector =
                    SkipVerifyConnector::new(skip_verification_config(tls.identity.as_ref())?);
                self.endpoint(&self.uri.replacen("https://", "http://", 1))?
                    .connect_with_connector_lazy(connector)
            }
        };

        tracing::debug!(
            uri = %self.uri,
            tls = self.uses_tls(),
            verify_server = self.verifies_server(),
            authenticated = self.bearer.is_some(),
            "Configured headscale channel"
        );

        Ok(GrpcHeadscaleClient::new(
            channel,
            BearerAuth::new(self.bearer.clone()),
        ))
    }

    fn endpoint(&self, uri: &str) -> Result<Endpoint> {
        Ok(Endpoint::from_shared(uri.to_string())?.connect_timeout(self.connect_timeout))
    }
}

fn bearer_value(key: &Secret) -> Result<AsciiMetadataValue> {
    let mut value: AsciiMetadataValue = format!("Bearer {}", key.expose())
        .parse()
        .map_err(|_| TransportError::InvalidApiKey)?;
    value.set_sensitive(true);
    Ok(value)
}

fn pem_setting(
    inline: Option<String>,
    env: &dyn EnvSource,
    path_var: &'static str,
) -> Result<Option<String>> {
    if let Some(inline) = inline.filter(|value| !value.is_empty()) {
        return Ok(Some(inline));
    }
    let Some(path) = env.var(path_var) else {
        return Ok(None);
    };
    let path = PathBuf::from(path);
    std::fs::read_to_string(&path)
        .map(Some)
        .map_err(|source| TransportError::ReadFile {
            var: path_var,
            path,
            source,
        })
}

/// Boolean literals as accepted by Go's `strconv.ParseBool`.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Turn a configured endpoint into a dialable URI, and report whether its
/// form calls for TLS.
fn normalize_endpoint(endpoint: &str) -> Result<(String, bool)> {
    let unsupported = |reason| TransportError::UnsupportedEndpoint {
        endpoint: endpoint.to_string(),
        reason,
    };

    if endpoint.starts_with("https://") {
        return Ok((endpoint.to_string(), true));
    }
    if endpoint.starts_with("http://") {
        return Ok((endpoint.to_string(), false));
    }

    let authority = if let Some(rest) = endpoint.strip_prefix("dns:") {
        // dns:host:port, dns:///host:port, dns://resolver/host:port
        match rest.strip_prefix("//") {
            Some(rest) => rest
                .split_once('/')
                .map(|(_resolver, target)| target)
                .ok_or_else(|| unsupported("dns target is missing a path"))?,
            None => rest,
        }
    } else if endpoint.starts_with("unix:") {
        return Err(unsupported("unix socket targets are not supported"));
    } else if endpoint.contains("://") {
        return Err(unsupported("unknown scheme"));
    } else {
        endpoint
    };

    if authority.is_empty() || authority.contains('/') {
        return Err(unsupported("expected host:port"));
    }
    Ok((format!("https://{authority}"), true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pem::fixtures::{CERT, KEY};
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    fn settings(endpoint: &str) -> TransportSettings {
        TransportSettings {
            endpoint: Some(endpoint.to_string()),
            ..TransportSettings::default()
        }
    }

    #[test]
    fn missing_endpoint_is_fatal() {
        let err = TransportSettings::default().resolve(&env(&[])).unwrap_err();
        assert!(matches!(err, TransportError::MissingEndpoint));

        let err = TransportSettings::default()
            .resolve(&env(&[(ENV_ENDPOINT, "")]))
            .unwrap_err();
        assert!(matches!(err, TransportError::MissingEndpoint));
    }

    #[test]
    fn inline_endpoint_beats_environment() {
        let resolved = settings("inline.example:443")
            .resolve(&env(&[(ENV_ENDPOINT, "env.example:443")]))
            .unwrap();
        assert_eq!(resolved.uri(), "https://inline.example:443");

        let resolved = TransportSettings::default()
            .resolve(&env(&[(ENV_ENDPOINT, "env.example:443")]))
            .unwrap();
        assert_eq!(resolved.uri(), "https://env.example:443");
    }

    #[test]
    fn endpoint_forms() {
        let cases = [
            ("hs.example:50443", "https://hs.example:50443", true),
            ("dns:///hs.example:50443", "https://hs.example:50443", true),
            ("dns://8.8.8.8/hs.example:50443", "https://hs.example:50443", true),
            ("dns:hs.example:50443", "https://hs.example:50443", true),
            ("https://hs.example", "https://hs.example", true),
            ("http://127.0.0.1:50443", "http://127.0.0.1:50443", false),
        ];
        for (input, uri, tls) in cases {
            let resolved = settings(input).resolve(&env(&[])).unwrap();
            assert_eq!(resolved.uri(), uri, "{input}");
            assert_eq!(resolved.uses_tls(), tls, "{input}");
        }
    }

    #[test]
    fn unsupported_endpoints_are_rejected() {
        for input in ["unix:///run/headscale.sock", "ftp://host:21", "dns://resolver"] {
            let err = settings(input).resolve(&env(&[])).unwrap_err();
            assert!(
                matches!(err, TransportError::UnsupportedEndpoint { .. }),
                "{input}: {err}"
            );
        }
    }

    #[test]
    fn api_key_precedence_and_validation() {
        let mut inline = settings("hs:443");
        inline.api_key = Some(Secret::new("inline-key"));
        let resolved = inline.resolve(&env(&[(ENV_API_KEY, "env-key")])).unwrap();
        assert_eq!(
            resolved.bearer.as_ref().unwrap().to_str().unwrap(),
            "Bearer inline-key"
        );

        let resolved = settings("hs:443")
            .resolve(&env(&[(ENV_API_KEY, "env-key")]))
            .unwrap();
        assert!(resolved.has_credentials());

        let resolved = settings("hs:443").resolve(&env(&[])).unwrap();
        assert!(!resolved.has_credentials());

        let mut bad = settings("hs:443");
        bad.api_key = Some(Secret::new("line\nbreak"));
        assert!(matches!(
            bad.resolve(&env(&[])).unwrap_err(),
            TransportError::InvalidApiKey
        ));
    }

    #[test]
    fn insecure_flag_parsing() {
        for value in ["1", "t", "TRUE", "true", "True"] {
            let resolved = settings("hs:443")
                .resolve(&env(&[(ENV_TLS_INSECURE, value)]))
                .unwrap();
            assert_eq!(resolved.uri(), "https://hs:443", "{value}");
            assert!(resolved.uses_tls(), "{value}");
            assert!(!resolved.verifies_server(), "{value}");
        }
        for value in ["0", "f", "FALSE", "false", "False"] {
            let resolved = settings("hs:443")
                .resolve(&env(&[(ENV_TLS_INSECURE, value)]))
                .unwrap();
            assert_eq!(resolved.uri(), "https://hs:443", "{value}");
            assert!(resolved.verifies_server(), "{value}");
        }

        let err = settings("hs:443")
            .resolve(&env(&[(ENV_TLS_INSECURE, "yes")]))
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidBool { .. }));

        let mut inline = settings("hs:443");
        inline.tls.insecure = Some(false);
        let resolved = inline
            .resolve(&env(&[(ENV_TLS_INSECURE, "garbage")]))
            .unwrap();
        assert!(resolved.verifies_server());

        let resolved = settings("http://127.0.0.1:50443")
            .resolve(&env(&[(ENV_TLS_INSECURE, "true")]))
            .unwrap();
        assert!(!resolved.uses_tls());
        assert!(!resolved.verifies_server());
    }

    #[tokio::test]
    async fn insecure_channel_dials_tls_to_a_host_port_endpoint() {
        use crate::client::HeadscaleClient;
        use crate::proto::ListUsersRequest;
        use tokio::io::AsyncReadExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut first = [0_u8; 1];
            socket.read_exact(&mut first).await.unwrap();
            first[0]
        });

        let mut insecure = settings(&format!("127.0.0.1:{port}"));
        insecure.tls.insecure = Some(true);
        let client = insecure.resolve(&env(&[])).unwrap().connect().unwrap();

        // The server hangs up after the first byte, so the call fails, but
        // it must fail on the wire rather than being refused locally.
        let status = client
            .list_users(ListUsersRequest::default())
            .await
            .unwrap_err();
        assert!(
            !format!("{status:?}").contains("HttpsUriWithoutTlsSupport"),
            "{status:?}"
        );
        assert_eq!(server.await.unwrap(), 0x16);
    }

    #[test]
    fn pem_files_are_read_from_environment_paths() {
        let dir = tempfile::TempDir::new().unwrap();
        let cert_path = dir.path().join("client.crt");
        let key_path = dir.path().join("client.key");
        std::fs::File::create(&cert_path)
            .unwrap()
            .write_all(CERT.as_bytes())
            .unwrap();
        std::fs::File::create(&key_path)
            .unwrap()
            .write_all(KEY.as_bytes())
            .unwrap();

        let resolved = settings("hs:443")
            .resolve(&env(&[
                (ENV_TLS_CLIENT_CERT_PATH, cert_path.to_str().unwrap()),
                (ENV_TLS_CLIENT_KEY_PATH, key_path.to_str().unwrap()),
            ]))
            .unwrap();
        assert!(resolved.has_client_identity());
    }

    #[test]
    fn unreadable_pem_file_is_fatal() {
        let err = settings("hs:443")
            .resolve(&env(&[(ENV_TLS_CA_PATH, "/definitely/not/here.pem")]))
            .unwrap_err();
        assert!(matches!(
            err,
            TransportError::ReadFile {
                var: ENV_TLS_CA_PATH,
                ..
            }
        ));
    }

    #[test]
    fn pem_without_expected_block_is_fatal() {
        let mut inline = settings("hs:443");
        inline.tls.ca_pem = Some(KEY.to_string());
        assert!(matches!(
            inline.resolve(&env(&[])).unwrap_err(),
            TransportError::InvalidPem { what: "ca_pem", .. }
        ));
    }

    #[test]
    fn client_identity_needs_both_halves() {
        let mut cert_only = settings("hs:443");
        cert_only.tls.client_cert_pem = Some(CERT.to_string());
        assert!(matches!(
            cert_only.resolve(&env(&[])).unwrap_err(),
            TransportError::IncompleteClientIdentity
        ));

        let mut key_only = settings("hs:443");
        key_only.tls.client_key_pem = Some(Secret::new(KEY));
        assert!(matches!(
            key_only.resolve(&env(&[])).unwrap_err(),
            TransportError::IncompleteClientIdentity
        ));

        let mut both = settings("hs:443");
        both.tls.client_cert_pem = Some(CERT.to_string());
        both.tls.client_key_pem = Some(Secret::new(KEY));
        assert!(both.resolve(&env(&[])).unwrap().has_client_identity());
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let parsed: TransportSettings = serde_json::from_str(
            r#"{"endpoint": "hs:443", "tls": {"insecure": true}}"#,
        )
        .unwrap();
        assert_eq!(parsed.endpoint.as_deref(), Some("hs:443"));
        assert_eq!(parsed.tls.insecure, Some(true));
        assert_eq!(parsed.connect_timeout_secs, 10);
        assert!(parsed.api_key.is_none());
    }

    #[test]
    fn secrets_do_not_leak_through_debug() {
        let mut inline = settings("hs:443");
        inline.api_key = Some(Secret::new("super-secret-token"));
        inline.tls.client_key_pem = Some(Secret::new(KEY));
        let rendered = format!("{inline:?}");
        assert!(!rendered.contains("super-secret-token"));
        assert!(!rendered.contains("PRIVATE KEY"));
    }

    #[tokio::test]
    async fn plaintext_channel_connects_lazily() {
        let resolved = settings("http://127.0.0.1:1").resolve(&env(&[])).unwrap();
        assert!(resolved.connect().is_ok());
    }
}
