//! PostgreSQL connection URIs.
//!
//! The descriptor is validated up front and otherwise left as the user wrote
//! it. Only the redacted form is ever displayed or logged, because the URI
//! may carry a password. The tools get the URI with the password cut out and
//! the password itself through `PGPASSWORD`, so it never shows up in `ps`.
//! Query parameters are passed as written.

use std::fmt;

use crate::error::{Result, SnapshotError};

#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    tool_uri: String,
    scheme: String,
    user: Option<String>,
    password: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    database: String,
}

impl ConnectionDescriptor {
    /// Validate a `postgres://` / `postgresql://` URI.
    ///
    /// Shape: `scheme://[user[:password]@][host][:port]/database[?params]`.
    /// An empty host means the local socket.
    pub fn parse(raw: &str) -> Result<Self> {
        let malformed = |reason: &str| {
            SnapshotError::Configuration(format!("malformed DATABASE_URL: {reason}"))
        };

        let (scheme, rest) = raw
            .split_once("://")
            .ok_or_else(|| malformed("expected scheme://..."))?;

        let scheme_lower = scheme.to_ascii_lowercase();
        if scheme_lower != "postgres" && scheme_lower != "postgresql" {
            return Err(malformed(&format!(
                "unsupported scheme '{scheme}', expected postgres or postgresql"
            )));
        }

        if rest.chars().any(char::is_whitespace) {
            return Err(malformed("contains whitespace"));
        }

        let rest = match rest.split_once(|c: char| c == '?' || c == '#') {
            Some((before, _)) => before,
            None => rest,
        };

        let (authority, path) = rest
            .split_once('/')
            .ok_or_else(|| malformed("missing /database"))?;

        if path.is_empty() {
            return Err(malformed("missing database name"));
        }
        if path.contains('/') {
            return Err(malformed("database name may not contain '/'"));
        }

        let (userinfo, hostport) = match authority.rsplit_once('@') {
            Some((userinfo, hostport)) => (Some(userinfo), hostport),
            None => (None, authority),
        };

        let (user, password) = match userinfo {
            None => (None, None),
            Some(info) => match info.split_once(':') {
                Some((user, password)) => (
                    non_empty(user),
                    Some(percent_decode(password).ok_or_else(|| malformed("bad %-escape in password"))?),
                ),
                None => (non_empty(info), None),
            },
        };

        // userinfo sits right after "scheme://" in the raw string
        let userinfo_start = scheme.len() + 3;
        let tool_uri = match (userinfo, &password) {
            (Some(info), Some(_)) => {
                let keep = match &user {
                    Some(user) => userinfo_start + user.len(),
                    None => userinfo_start,
                };
                let mut skip = userinfo_start + info.len();
                if user.is_none() {
                    // drop the '@' too, an empty userinfo is not a valid URI
                    skip += 1;
                }
                format!("{}{}", &raw[..keep], &raw[skip..])
            }
            _ => raw.to_string(),
        };

        let (host, port) = split_host_port(hostport).map_err(|r| malformed(&r))?;

        Ok(ConnectionDescriptor {
            tool_uri,
            scheme: scheme.to_string(),
            user,
            password,
            host,
            port,
            database: path.to_string(),
        })
    }

    /// The URI for tool command lines: as configured, minus the password.
    pub fn tool_uri(&self) -> &str {
        &self.tool_uri
    }

    /// Decoded password from the URI, for `PGPASSWORD`. Never log this.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref()
    }
}

fn percent_decode(s: &str) -> Option<String> {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = s.get(i + 1..i + 3)?;
            if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return None;
            }
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

fn non_empty(s: &str) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}

fn split_host_port(hostport: &str) -> std::result::Result<(Option<String>, Option<u16>), String> {
    if hostport.is_empty() {
        return Ok((None, None));
    }

    // [::1]:5432
    let (host, port) = if let Some(bracketed) = hostport.strip_prefix('[') {
        let (host, after) = bracketed
            .split_once(']')
            .ok_or_else(|| "unterminated [ in host".to_string())?;
        match after {
            "" => (host, None),
            a => (
                host,
                Some(a.strip_prefix(':').ok_or_else(|| format!("unexpected '{a}' after host"))?),
            ),
        }
    } else {
        match hostport.rsplit_once(':') {
            Some((host, port)) => (host, Some(port)),
            None => (hostport, None),
        }
    };

    let port = match port {
        None => None,
        Some(p) => match p.parse::<u16>() {
            Ok(0) | Err(_) => return Err(format!("invalid port '{p}'")),
            Ok(n) => Some(n),
        },
    };

    Ok((non_empty(host), port))
}

impl fmt::Display for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://", self.scheme)?;
        match (&self.user, self.password.is_some()) {
            (Some(user), true) => write!(f, "{user}:***@")?,
            (Some(user), false) => write!(f, "{user}@")?,
            (None, true) => f.write_str(":***@")?,
            (None, false) => {}
        }
        if let Some(host) = &self.host {
            if host.contains(':') {
                write!(f, "[{host}]")?;
            } else {
                f.write_str(host)?;
            }
        }
        if let Some(port) = self.port {
            write!(f, ":{port}")?;
        }
        // query parameters can hold a password too, leave them out
        write!(f, "/{}", self.database)
    }
}

impl fmt::Debug for ConnectionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ConnectionDescriptor")
            .field(&self.to_string())
            .finish()
    }
}
