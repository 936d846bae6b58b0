//! Run identifier.
//!
//! `RunId` is the one identifier in this crate that is always a fresh
//! random UUID (spec §3: "runId (fresh UUID)"). Workflow, node, and edge
//! identifiers are user-authored strings (see [`crate::keys`]) and are
//! modeled separately because they are not UUIDs.

use domain_key::define_uuid;

pub use domain_key::UuidParseError;

define_uuid!(RunIdDomain => RunId);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_run_id_is_not_nil() {
        let id = RunId::v4();
        assert!(!id.is_nil());
    }

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::v4(), RunId::v4());
    }

    #[test]
    fn run_id_roundtrips_through_string() {
        let id = RunId::v4();
        let text = id.to_string();
        let parsed: RunId = text.parse().expect("valid uuid text");
        assert_eq!(id, parsed);
    }
}
