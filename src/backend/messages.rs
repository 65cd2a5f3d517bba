//! User-facing phrases with a defined fallback order.
//!
//! Lookup resolves adapter-specific → provider-specific → generic at
//! error-construction time; an unknown key falls back to itself so a
//! missing phrase never panics.

type Table = &'static [(&'static str, &'static str)];

const GENERIC: Table = &[
    ("login-to-edit", "Please log in to edit this data"),
    ("session-expired", "Access token is no longer valid, please log in again"),
    ("read-only", "This source is read-only"),
    ("popup-blocked", "The login window was blocked; allow popups and try again"),
    ("not-found", "The requested data does not exist"),
];

/// Per-adapter phrase table.
#[derive(Debug, Clone, Copy)]
pub struct Messages {
    adapter: Table,
    provider: Table,
}

impl Messages {
    pub const fn new(adapter: Table, provider: Table) -> Self {
        Self { adapter, provider }
    }

    pub const fn generic() -> Self {
        Self {
            adapter: &[],
            provider: &[],
        }
    }

    pub fn get<'a>(&self, key: &'a str) -> &'a str {
        lookup(self.adapter, key)
            .or_else(|| lookup(self.provider, key))
            .or_else(|| lookup(GENERIC, key))
            .unwrap_or(key)
    }
}

fn lookup(table: Table, key: &str) -> Option<&'static str> {
    table
        .iter()
        .find(|(name, _)| *name == key)
        .map(|(_, phrase)| *phrase)
}
