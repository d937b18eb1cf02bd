//! Candidate address generation
//!
//! Combines first-name and surname spellings with the local-part templates
//! organizations commonly use. The output order is the probing order.

use crate::transliteration::{first_name_variants, surname_variants, transcribe};
use std::collections::HashSet;
use tracing::debug;

/// Generate the ordered, duplicate-free list of candidate addresses for a person.
///
/// All three inputs are expected to be non-empty; callers skip incomplete entries.
///
/// # Example
/// ```rust
/// use mailfinder_core::generate_email_variations;
///
/// let candidates = generate_email_variations("Иван", "Петров", "example.com");
/// assert_eq!(candidates[0], "ivan@example.com");
/// assert!(candidates.contains(&"ivan.petrov@example.com".to_string()));
/// ```
pub fn generate_email_variations(first_name: &str, last_name: &str, domain: &str) -> Vec<String> {
    let first_names = first_name_variants(first_name);
    let last_names = surname_variants(last_name);
    let initial: String = transcribe(first_name).chars().take(1).collect();

    let mut local_parts = Vec::with_capacity(first_names.len() * last_names.len() * 6 + last_names.len() * 4);

    for first in &first_names {
        for last in &last_names {
            let last_initial: String = last.chars().take(1).collect();
            local_parts.push(first.clone());
            local_parts.push(format!("{first}.{last}"));
            local_parts.push(format!("{last}.{first}"));
            local_parts.push(format!("{first}{last_initial}"));
            local_parts.push(format!("{first}_{last}"));
            local_parts.push(format!("{last}_{first}"));
        }
    }

    for last in &last_names {
        local_parts.push(last.clone());
        local_parts.push(format!("{initial}{last}"));
        local_parts.push(format!("{initial}.{last}"));
        local_parts.push(format!("{last}.{initial}"));
    }

    let mut seen = HashSet::with_capacity(local_parts.len());
    let candidates: Vec<String> = local_parts
        .into_iter()
        .map(|local| format!("{local}@{domain}"))
        .filter(|candidate| seen.insert(candidate.clone()))
        .collect();

    debug!(
        "Generated {} candidates for {} {} at {}",
        candidates.len(),
        first_name,
        last_name,
        domain
    );

    candidates
}
