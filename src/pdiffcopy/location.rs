use std::fmt;
use std::path::PathBuf;

use crate::pdiffcopy::DEFAULT_PORT;

/// One endpoint of a transfer: a file on this machine or a file served by a
/// remote pdiffcopy server. Exactly one endpoint of a transfer is remote;
/// that invariant is checked before any work begins.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Location {
    Local(PathBuf),
    Remote { host: String, port: u16, path: String },
}

impl Location {
    /// Parse a location expression. `HOST:PORT/PATH` (and `HOST/PATH` with
    /// the default port) name a file on a remote server; anything else is a
    /// local path.
    pub fn parse(expression: &str) -> Self {
        if let Some((head, rest)) = expression.split_once('/') {
            if let Some(remote) = parse_remote(head, rest) {
                return remote;
            }
        }
        Location::Local(PathBuf::from(expression))
    }

    pub const fn is_remote(&self) -> bool {
        matches!(self, Location::Remote { .. })
    }

    /// A human friendly label, e.g. `local file /tmp/a` or
    /// `remote file server:8080/tmp/a`.
    pub fn label(&self) -> String {
        match self {
            Location::Local(path) => format!("local file {}", path.display()),
            Location::Remote { host, port, path } => {
                format!("remote file {host}:{port}{path}")
            }
        }
    }
}

fn parse_remote(head: &str, rest: &str) -> Option<Location> {
    if head.is_empty() || rest.is_empty() {
        return None;
    }
    let (host, port) = match head.split_once(':') {
        Some((host, port)) => (host, port.parse().ok()?),
        None => {
            // A bare hostname is indistinguishable from a relative path
            // component unless it contains a dot (e.g. "nas.local/data").
            // "./x" and "../x" stay local.
            if !head.contains('.') || head.starts_with('.') {
                return None;
            }
            (head, DEFAULT_PORT)
        }
    };
    if host.is_empty() {
        return None;
    }
    Some(Location::Remote {
        host: host.to_string(),
        port,
        path: format!("/{rest}"),
    })
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(path) => write!(f, "{}", path.display()),
            Location::Remote { host, port, path } => write!(f, "{host}:{port}{path}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_remote_with_port() {
        let loc = Location::parse("server:9000/var/lib/data.bin");
        assert_eq!(
            loc,
            Location::Remote {
                host: "server".to_string(),
                port: 9000,
                path: "/var/lib/data.bin".to_string(),
            }
        );
    }

    #[test]
    fn parses_remote_with_default_port() {
        let loc = Location::parse("nas.example.com/data/huge.img");
        assert_eq!(
            loc,
            Location::Remote {
                host: "nas.example.com".to_string(),
                port: DEFAULT_PORT,
                path: "/data/huge.img".to_string(),
            }
        );
    }

    #[test]
    fn plain_paths_stay_local() {
        assert_eq!(
            Location::parse("/var/lib/data.bin"),
            Location::Local(PathBuf::from("/var/lib/data.bin"))
        );
        assert_eq!(
            Location::parse("relative/path.bin"),
            Location::Local(PathBuf::from("relative/path.bin"))
        );
    }

    #[test]
    fn dotted_relative_paths_stay_local() {
        assert_eq!(
            Location::parse("./demo/file.bin"),
            Location::Local(PathBuf::from("./demo/file.bin"))
        );
        assert_eq!(
            Location::parse("../file.bin"),
            Location::Local(PathBuf::from("../file.bin"))
        );
    }

    #[test]
    fn invalid_port_stays_local() {
        assert_eq!(
            Location::parse("notes:today/plan.txt"),
            Location::Local(PathBuf::from("notes:today/plan.txt"))
        );
    }

    #[test]
    fn remote_roundtrips_through_display() {
        let loc = Location::parse("server:9000/data.bin");
        assert_eq!(Location::parse(&loc.to_string()), loc);
    }
}
