//! Supplier catalog: stable keys, identities and feed descriptors.

pub mod descriptor;
pub mod registry;

use std::fmt;

use clap::ValueEnum;

/// The wholesale suppliers this binary knows how to import.
///
/// The enum is the closed set of feeds we parse; identities (numeric id,
/// external uid) live in [`registry::SupplierRegistry`] and feed shapes in
/// [`descriptor::FeedDescriptor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum)]
pub enum SupplierKey {
    Deltyre,
    Rimexpo,
    Nordwheel,
    Gripfield,
    Autopart24,
    Vulkanexpress,
}

impl SupplierKey {
    /// Default processing order for "run everything".
    pub const ALL: [SupplierKey; 6] = [
        SupplierKey::Deltyre,
        SupplierKey::Rimexpo,
        SupplierKey::Nordwheel,
        SupplierKey::Gripfield,
        SupplierKey::Autopart24,
        SupplierKey::Vulkanexpress,
    ];

    /// Canonical lowercase name; also the registry key and the prefix for
    /// per-supplier env vars (`DELTYRE_FEED_URL`, ...).
    pub fn name(&self) -> &'static str {
        match self {
            SupplierKey::Deltyre => "deltyre",
            SupplierKey::Rimexpo => "rimexpo",
            SupplierKey::Nordwheel => "nordwheel",
            SupplierKey::Gripfield => "gripfield",
            SupplierKey::Autopart24 => "autopart24",
            SupplierKey::Vulkanexpress => "vulkanexpress",
        }
    }

    pub fn from_name(raw: &str) -> Option<SupplierKey> {
        let needle = raw.trim().to_ascii_lowercase();
        SupplierKey::ALL.into_iter().find(|k| k.name() == needle)
    }

    /// Uppercase env-var prefix for this supplier.
    pub fn env_prefix(&self) -> String {
        self.name().to_ascii_uppercase()
    }
}

impl fmt::Display for SupplierKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for key in SupplierKey::ALL {
            assert_eq!(SupplierKey::from_name(key.name()), Some(key));
        }
        assert_eq!(SupplierKey::from_name("DELTYRE"), Some(SupplierKey::Deltyre));
        assert_eq!(SupplierKey::from_name("nobody"), None);
    }

    #[test]
    fn env_prefix_is_uppercase_name() {
        assert_eq!(SupplierKey::Autopart24.env_prefix(), "AUTOPART24");
    }
}
