use crate::types::Persona;

/// Resolve the persona for a given id, falling back deterministically.
///
/// A stale id (persona deleted after being set on a session or message) must
/// never leave the engine without a sender identity, so the miss path prefers
/// the default persona and then the first one. `None` only for an empty
/// slice, which the store's seeding prevents in practice.
pub fn resolve_persona<'a>(personas: &'a [Persona], active_id: Option<&str>) -> Option<&'a Persona> {
    if let Some(id) = active_id {
        if let Some(found) = personas.iter().find(|p| p.id == id) {
            return Some(found);
        }
    }
    personas
        .iter()
        .find(|p| p.is_default)
        .or_else(|| personas.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_persona(id: &str, name: &str, is_default: bool) -> Persona {
        Persona {
            id: id.into(),
            name: name.into(),
            bio: String::new(),
            is_default,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn resolves_matching_id() {
        let personas = vec![make_persona("p1", "Alice", true), make_persona("p2", "Bob", false)];
        let resolved = resolve_persona(&personas, Some("p2")).expect("persona");
        assert_eq!(resolved.name, "Bob");
    }

    #[test]
    fn stale_id_falls_back_to_default_then_first() {
        let personas = vec![make_persona("p1", "Alice", false), make_persona("p2", "Bob", true)];
        let resolved = resolve_persona(&personas, Some("gone")).expect("persona");
        assert_eq!(resolved.id, "p2");

        let no_default = vec![make_persona("p1", "Alice", false), make_persona("p2", "Bob", false)];
        let resolved = resolve_persona(&no_default, Some("gone")).expect("persona");
        assert_eq!(resolved.id, "p1");
    }

    #[test]
    fn missing_id_uses_fallback() {
        let personas = vec![make_persona("p1", "Alice", false)];
        assert_eq!(resolve_persona(&personas, None).expect("persona").id, "p1");
    }

    #[test]
    fn empty_slice_yields_none() {
        assert!(resolve_persona(&[], Some("p1")).is_none());
    }
}
