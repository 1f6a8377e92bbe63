//! Per-side tool environments.
//!
//! Source and destination repositories are configured through the same
//! variable names (`BORG_REPO`, `RESTIC_PASSWORD`, ...), so each side gets
//! its own view of the process environment: every variable carrying the
//! converter's prefix is removed, then `<prefix>SRC_NAME` (or
//! `<prefix>DEST_NAME`) is exposed to the tool as plain `NAME`.

use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};

/// Which repository a tool invocation talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Source,
    Destination,
}

impl Side {
    fn tag(self) -> &'static str {
        match self {
            Side::Source => "SRC_",
            Side::Destination => "DEST_",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolEnvironment {
    vars: BTreeMap<OsString, OsString>,
}

impl ToolEnvironment {
    /// Build the view for `side` from the current process environment.
    pub fn from_process(prefix: &str, side: Side) -> Self {
        Self::from_vars(prefix, side, std::env::vars_os())
    }

    /// Build the view for `side` from an explicit variable list.
    pub fn from_vars<I, K, V>(prefix: &str, side: Side, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let side_prefix = format!("{}{}", prefix, side.tag());
        let mut plain = BTreeMap::new();
        let mut overrides = Vec::new();

        for (key, value) in vars {
            let key: OsString = key.into();
            let value: OsString = value.into();
            match key.to_str() {
                Some(name) if name.starts_with(prefix) => {
                    if let Some(stripped) = name.strip_prefix(&side_prefix) {
                        if !stripped.is_empty() {
                            overrides.push((OsString::from(stripped), value));
                        }
                    }
                }
                _ => {
                    plain.insert(key, value);
                }
            }
        }

        plain.extend(overrides);
        Self { vars: plain }
    }

    pub fn get(&self, name: &str) -> Option<&OsStr> {
        self.vars.get(OsStr::new(name)).map(|v| v.as_os_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.vars.contains_key(OsStr::new(name))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsString, &OsString)> {
        self.vars.iter()
    }
}
