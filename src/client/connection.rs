//! Connection descriptors.
//!
//! A descriptor says where a device connects and how it authenticates. It is
//! built either from a connection string of the form
//! `HostName=<host>;DeviceId=<id>;x509=true` (or `SharedAccessKey=<key>`), or
//! from the assignment returned by provisioning.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use crate::provisioning::DeviceAssignment;
use crate::utils::error::ClientError;

#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Authenticate with an X.509 client certificate set through the options.
    X509,
    /// Authenticate with a shared access key carried in the connection string.
    SharedAccessKey(String),
    /// Authenticate with the identity established during provisioning.
    DeviceAuth,
}

impl AuthMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::X509 => "x509",
            Self::SharedAccessKey(_) => "sas",
            Self::DeviceAuth => "device_auth",
        }
    }
}

impl fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::X509 => f.write_str("X509"),
            Self::SharedAccessKey(_) => f.write_str("SharedAccessKey(<redacted>)"),
            Self::DeviceAuth => f.write_str("DeviceAuth"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub host: String,
    pub device_id: String,
    pub module_id: Option<String>,
    pub gateway_host: Option<String>,
    pub auth: AuthMode,
}

impl ConnectionDescriptor {
    pub fn from_device_auth(host: &str, device_id: &str) -> Result<Self, ClientError> {
        if host.trim().is_empty() {
            return Err(invalid("host must not be empty"));
        }
        if device_id.trim().is_empty() {
            return Err(invalid("device id must not be empty"));
        }
        Ok(Self {
            host: host.to_string(),
            device_id: device_id.to_string(),
            module_id: None,
            gateway_host: None,
            auth: AuthMode::DeviceAuth,
        })
    }

    /// Only a successful registration carries an assignment, so a failed
    /// provisioning phase can never produce a descriptor.
    pub fn from_assignment(assignment: &DeviceAssignment) -> Self {
        Self {
            host: assignment.assigned_hub().to_string(),
            device_id: assignment.device_id().to_string(),
            module_id: None,
            gateway_host: None,
            auth: AuthMode::DeviceAuth,
        }
    }

    /// Where the transport actually connects: the gateway when one is set.
    pub fn endpoint(&self) -> &str {
        self.gateway_host.as_deref().unwrap_or(&self.host)
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut seen = HashSet::new();
        let mut host = None;
        let mut device_id = None;
        let mut module_id = None;
        let mut gateway_host = None;
        let mut shared_access_key = None;
        let mut x509 = false;

        for segment in s.split(';').map(str::trim).filter(|seg| !seg.is_empty()) {
            // Keys may contain base64 padding, so only the first '=' separates.
            let (key, value) = segment
                .split_once('=')
                .ok_or_else(|| invalid(format!("segment '{segment}' is not key=value")))?;
            let key = key.trim();
            let value = value.trim();

            if !seen.insert(key.to_string()) {
                return Err(invalid(format!("duplicate key '{key}'")));
            }
            if value.is_empty() {
                return Err(invalid(format!("empty value for '{key}'")));
            }

            match key {
                "HostName" => host = Some(value.to_string()),
                "DeviceId" => device_id = Some(value.to_string()),
                "ModuleId" => module_id = Some(value.to_string()),
                "GatewayHostName" => gateway_host = Some(value.to_string()),
                "SharedAccessKey" => shared_access_key = Some(value.to_string()),
                "x509" => {
                    x509 = match value.to_ascii_lowercase().as_str() {
                        "true" => true,
                        "false" => false,
                        _ => return Err(invalid(format!("x509 must be true or false, got '{value}'"))),
                    }
                }
                other => return Err(invalid(format!("unknown key '{other}'"))),
            }
        }

        let host = host.ok_or_else(|| invalid("missing HostName"))?;
        let device_id = device_id.ok_or_else(|| invalid("missing DeviceId"))?;

        let auth = match (x509, shared_access_key) {
            (true, Some(_)) => {
                return Err(invalid("x509=true and SharedAccessKey are mutually exclusive"));
            }
            (true, None) => AuthMode::X509,
            (false, Some(key)) => AuthMode::SharedAccessKey(key),
            (false, None) => return Err(invalid("either x509=true or SharedAccessKey is required")),
        };

        Ok(Self {
            host,
            device_id,
            module_id,
            gateway_host,
            auth,
        })
    }
}

fn invalid(reason: impl Into<String>) -> ClientError {
    ClientError::InvalidConnectionString(reason.into())
}
