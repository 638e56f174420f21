//! Parsing of service type names such as `Echo.Client` or `echo.Echo.Iface`.

use std::fmt;
use std::str::FromStr;

use crate::error::ProxyError;

/// Which generated artifact a type name refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ServiceKind {
    /// A generated client; its interface is the service it was generated for.
    #[default]
    Client,
    /// The service interface itself.
    Interface,
}

impl ServiceKind {
    fn suffix(self) -> &'static str {
        match self {
            ServiceKind::Client => "Client",
            ServiceKind::Interface => "Iface",
        }
    }
}

/// A parsed `<module>[.<Service>][.Client|.Iface]` name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceTypeName {
    /// IDL module (file stem) that defines the service.
    pub module: String,
    /// Service name inside the module.
    pub service: String,
    pub kind: ServiceKind,
}

impl ServiceTypeName {
    pub fn parse(input: &str) -> Result<Self, ProxyError> {
        let mut parts: Vec<&str> = input.split('.').collect();
        if let Some(bad) = parts.iter().find(|p| !is_identifier(p)) {
            let reason = if bad.is_empty() {
                "empty name component".to_string()
            } else {
                format!("'{}' is not a valid identifier", bad)
            };
            return Err(ProxyError::malformed(input, reason));
        }

        let kind = match parts.last().copied() {
            Some("Client") if parts.len() > 1 => {
                parts.pop();
                ServiceKind::Client
            }
            Some("Iface") if parts.len() > 1 => {
                parts.pop();
                ServiceKind::Interface
            }
            Some(other @ ("Processor" | "Server" | "Handler")) if parts.len() > 1 => {
                return Err(ProxyError::malformed(
                    input,
                    format!("'{}' is not a client or interface", other),
                ));
            }
            _ => ServiceKind::Client,
        };

        match parts.as_slice() {
            [service] => Ok(Self {
                module: service.to_string(),
                service: service.to_string(),
                kind,
            }),
            [module, service] => Ok(Self {
                module: module.to_string(),
                service: service.to_string(),
                kind,
            }),
            _ => Err(ProxyError::malformed(
                input,
                "expected <module>[.<Service>][.Client|.Iface]",
            )),
        }
    }
}

impl FromStr for ServiceTypeName {
    type Err = ProxyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ServiceTypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.module != self.service {
            write!(f, "{}.", self.module)?;
        }
        write!(f, "{}.{}", self.service, self.kind.suffix())
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    }
}
