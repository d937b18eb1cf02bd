//! Address syntax and reserved-domain checks
//!
//! Both checks are pure and run before any network access.

use regex::Regex;
use std::sync::LazyLock;

/// Maximum length of a whole address
pub const MAX_ADDRESS_LENGTH: usize = 254;
/// Maximum length of the local part
pub const MAX_LOCAL_PART_LENGTH: usize = 64;

/// Suffixes of domains that can never receive mail
pub const RESERVED_SUFFIXES: &[&str] = &[".local", ".test", ".example", ".invalid"];

static ADDRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("address pattern is valid")
});

/// Conservative well-formedness check for `local@domain.tld`
pub fn is_well_formed(address: &str) -> bool {
    if address.len() > MAX_ADDRESS_LENGTH {
        return false;
    }

    let Some((local, _domain)) = address.split_once('@') else {
        return false;
    };

    if address.matches('@').count() != 1 {
        return false;
    }

    if local.is_empty() || local.len() > MAX_LOCAL_PART_LENGTH {
        return false;
    }

    if address.contains("..") || local.ends_with('.') {
        return false;
    }

    ADDRESS_PATTERN.is_match(address)
}

/// Whether the domain sits under a reserved, non-routable TLD
pub fn is_reserved_domain(domain: &str) -> bool {
    let domain = domain.to_ascii_lowercase();
    RESERVED_SUFFIXES.iter().any(|suffix| domain.ends_with(suffix))
}

/// Split an address into local part and domain
pub fn split_address(address: &str) -> Option<(&str, &str)> {
    address.rsplit_once('@')
}
