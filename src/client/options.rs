//! Typed client options.
//!
//! Everything a device session can be configured with lives here and is
//! checked before a transport is ever built, so a bad certificate or proxy
//! surfaces at construction instead of halfway through a send.

use std::fmt;

use crate::client::connection::AuthMode;
use crate::utils::error::OptionError;

const PEM_CERT_BEGIN: &str = "-----BEGIN CERTIFICATE-----";
const PEM_CERT_END: &str = "-----END CERTIFICATE-----";

/// PrivateKey is either PEM text or a reference to a key
/// that lives inside a crypto engine (HSM, TPM, key service).
#[derive(Clone, PartialEq, Eq)]
pub enum PrivateKey {
    Pem(String),
    Engine { engine: String, key_id: String },
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pem(_) => f.write_str("Pem(<redacted>)"),
            Self::Engine { engine, .. } => f
                .debug_struct("Engine")
                .field("engine", engine)
                .field("key_id", &"<redacted>")
                .finish(),
        }
    }
}

/// X509Credential is the client certificate plus its key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct X509Credential {
    pub certificate: String,
    pub private_key: PrivateKey,
}

impl X509Credential {
    pub fn validate(&self) -> Result<(), OptionError> {
        if !looks_like_certificate(&self.certificate) {
            return Err(OptionError::InvalidCertificate(
                "expected a PEM encoded certificate",
            ));
        }
        match &self.private_key {
            PrivateKey::Pem(pem) => {
                let pem = pem.trim();
                if !(pem.starts_with("-----BEGIN") && pem.contains("PRIVATE KEY-----")) {
                    return Err(OptionError::InvalidPrivateKey(
                        "expected a PEM encoded private key".to_string(),
                    ));
                }
            }
            PrivateKey::Engine { engine, key_id } => {
                if engine.trim().is_empty() {
                    return Err(OptionError::InvalidPrivateKey(
                        "engine name must not be empty".to_string(),
                    ));
                }
                if key_id.trim().is_empty() {
                    return Err(OptionError::InvalidPrivateKey(format!(
                        "key id for engine '{engine}' must not be empty"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// HttpProxy describes an HTTP CONNECT proxy. Credentials
/// are optional but must come as a pair.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpProxy {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl HttpProxy {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn validate(&self) -> Result<(), OptionError> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(OptionError::InvalidProxy("host must not be empty".to_string()));
        }
        if host.contains("://") || host.contains(char::is_whitespace) {
            return Err(OptionError::InvalidProxy(format!(
                "host '{host}' must be a bare host name or address"
            )));
        }
        if self.port == 0 {
            return Err(OptionError::InvalidProxy("port must not be zero".to_string()));
        }
        if self.username.is_some() != self.password.is_some() {
            return Err(OptionError::InvalidProxy(
                "username and password must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for HttpProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProxy")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// ClientOption is a single option update applied to a
/// client that has not opened its transport yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientOption {
    Trace(bool),
    TrustedCertificate(Vec<u8>),
    X509(X509Credential),
    HttpProxy(HttpProxy),
}

/// ClientOptions are the full set of options for a device
/// session. All fields are optional except trace, which
/// defaults to off.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClientOptions {
    /// trace turns on frame-level logging of everything the
    /// client hands to or receives from its transport.
    pub trace: bool,
    /// trusted_certificate is a PEM bundle of CA certificates,
    /// only needed on systems without a usable certificate store.
    pub trusted_certificate: Option<Vec<u8>>,
    /// x509 is the client certificate credential; required when
    /// the connection string says x509=true.
    pub x509: Option<X509Credential>,
    /// http_proxy routes the connection through a proxy.
    pub http_proxy: Option<HttpProxy>,
}

impl ClientOptions {
    pub fn with_trace(mut self, trace: bool) -> Self {
        self.trace = trace;
        self
    }

    pub fn with_trusted_certificate(mut self, pem: impl Into<Vec<u8>>) -> Self {
        self.trusted_certificate = Some(pem.into());
        self
    }

    pub fn with_x509(mut self, credential: X509Credential) -> Self {
        self.x509 = Some(credential);
        self
    }

    pub fn with_http_proxy(mut self, proxy: HttpProxy) -> Self {
        self.http_proxy = Some(proxy);
        self
    }

    pub fn apply(&mut self, option: ClientOption) {
        match option {
            ClientOption::Trace(on) => self.trace = on,
            ClientOption::TrustedCertificate(pem) => self.trusted_certificate = Some(pem),
            ClientOption::X509(credential) => self.x509 = Some(credential),
            ClientOption::HttpProxy(proxy) => self.http_proxy = Some(proxy),
        }
    }

    /// Check each option on its own, without regard to the auth mode.
    pub fn validate(&self) -> Result<(), OptionError> {
        if let Some(pem) = &self.trusted_certificate {
            let text = std::str::from_utf8(pem)
                .map_err(|_| OptionError::InvalidTrustedCertificate("bundle is not valid UTF-8"))?;
            if !looks_like_certificate(text) {
                return Err(OptionError::InvalidTrustedCertificate(
                    "expected one or more PEM encoded certificates",
                ));
            }
        }
        if let Some(credential) = &self.x509 {
            credential.validate()?;
        }
        if let Some(proxy) = &self.http_proxy {
            proxy.validate()?;
        }
        Ok(())
    }

    /// Check the options and that they fit the way the device authenticates.
    pub fn validate_for(&self, auth: &AuthMode) -> Result<(), OptionError> {
        self.validate()?;
        match (auth, &self.x509) {
            (AuthMode::X509, None) => Err(OptionError::AuthMismatch(
                "x509 authentication requires an x509 credential".to_string(),
            )),
            (AuthMode::SharedAccessKey(_), Some(_)) => Err(OptionError::AuthMismatch(
                "an x509 credential cannot be combined with a shared access key".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

fn looks_like_certificate(text: &str) -> bool {
    let text = text.trim();
    text.starts_with(PEM_CERT_BEGIN) && text.contains(PEM_CERT_END)
}
