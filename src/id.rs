use std::error;
use std::fmt;
use std::str::FromStr;

use rand::random;

/// A globally unique identifier for traces and trace segments.
///
/// Identifiers are three `u64` parts rendered as `"p1.p2.p3"`.
/// The dotted form is what travels on the wire inside a `ContextCarrier`
/// and what export consumers index on.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct GlobalId(u64, u64, u64);

impl GlobalId {
    /// Mint a new random identifier.
    pub fn generate() -> GlobalId {
        GlobalId(random::<u64>(), random::<u64>(), random::<u64>())
    }

    /// Build an identifier from its three parts.
    pub fn from_parts(p1: u64, p2: u64, p3: u64) -> GlobalId {
        GlobalId(p1, p2, p3)
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// The string was not a valid dotted identifier.
#[derive(Debug, Eq, PartialEq)]
pub struct ParseGlobalIdError;

impl fmt::Display for ParseGlobalIdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "expected three dot-separated u64 parts")
    }
}

impl error::Error for ParseGlobalIdError {}

impl FromStr for GlobalId {
    type Err = ParseGlobalIdError;

    fn from_str(value: &str) -> Result<GlobalId, ParseGlobalIdError> {
        let mut parts = value.split('.');
        let mut part = || {
            parts
                .next()
                .and_then(|p| p.parse::<u64>().ok())
                .ok_or(ParseGlobalIdError)
        };
        let id = GlobalId(part()?, part()?, part()?);
        if parts.next().is_some() {
            return Err(ParseGlobalIdError);
        }
        Ok(id)
    }
}
