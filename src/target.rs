//! Connection targets: `<path>?vfs=<name>&key=value`.
//!
//! ```text
//! file:/data/app.db?vfs=dir&mode=rw
//! └───┘└──────────┘ └─────┘ └─────┘
//! prefix  path      backend  extra
//! ```
//!
//! The `file:` prefix is optional. Parameters are `&`-separated `key=value`
//! pairs with `%XX` escapes; a key without `=` has an empty value, and the
//! last occurrence of a key wins.

use std::borrow::Cow;
use std::fmt;

use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};

use crate::VfsError;

/// A parsed connection target.
///
/// # Example
///
/// ```rust
/// use dbvfs::DatabaseTarget;
///
/// let target = DatabaseTarget::parse("file:app%20data.db?vfs=memory&cache=private").unwrap();
/// assert_eq!(target.path(), "app data.db");
/// assert_eq!(target.vfs(), Some("memory"));
/// assert_eq!(target.param("cache"), Some("private"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseTarget {
    path: String,
    params: Vec<(String, String)>,
}

impl DatabaseTarget {
    /// Parse a target string.
    ///
    /// # Errors
    ///
    /// [`VfsError::InvalidTarget`] if the path is empty or an escape is
    /// malformed.
    pub fn parse(raw: &str) -> Result<Self, VfsError> {
        let invalid = |reason| VfsError::InvalidTarget {
            target: raw.to_owned(),
            reason,
        };

        let rest = raw.strip_prefix("file:").unwrap_or(raw);
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (rest, None),
        };

        let path = decode(path).map_err(invalid)?;
        if path.is_empty() {
            return Err(invalid("empty path"));
        }

        let mut params: Vec<(String, String)> = Vec::new();
        for pair in query.unwrap_or("").split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let key = decode(key).map_err(invalid)?;
            let value = decode(value).map_err(invalid)?;
            match params.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => params.push((key, value)),
            }
        }

        Ok(Self { path, params })
    }

    /// The decoded file path.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The requested backend name, if any.
    pub fn vfs(&self) -> Option<&str> {
        self.param("vfs")
    }

    /// The value of parameter `key`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// All parameters, in first-appearance order.
    pub fn params(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for DatabaseTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(&self.path))?;
        for (i, (key, value)) in self.params.iter().enumerate() {
            let sep = if i == 0 { '?' } else { '&' };
            write!(f, "{sep}{}={}", encode(key), encode(value))?;
        }
        Ok(())
    }
}

impl std::str::FromStr for DatabaseTarget {
    type Err = VfsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Characters escaped when a target is rendered; controls and non-ASCII are
/// always escaped by `utf8_percent_encode`.
const TARGET_RESERVED: &AsciiSet = &CONTROLS
    .add(b'%')
    .add(b'?')
    .add(b'&')
    .add(b'=')
    .add(b'#')
    .add(b' ');

fn decode(raw: &str) -> Result<String, &'static str> {
    // `percent_decode_str` passes malformed escapes through untouched.
    let malformed = raw.split('%').skip(1).any(|rest| {
        let rest = rest.as_bytes();
        rest.len() < 2 || !rest[0].is_ascii_hexdigit() || !rest[1].is_ascii_hexdigit()
    });
    if malformed {
        return Err("malformed percent escape");
    }
    percent_decode_str(raw)
        .decode_utf8()
        .map(Cow::into_owned)
        .map_err(|_| "escape decodes to invalid UTF-8")
}

fn encode(raw: &str) -> Cow<'_, str> {
    utf8_percent_encode(raw, TARGET_RESERVED).into()
}
