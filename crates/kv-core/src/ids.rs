use uuid::Uuid;

/// Generate an opaque, prefixed identifier for an entity kind, e.g.
/// `note_3fa85f64-5717-4562-b3fc-2c963f66afa6`.
///
/// Ids are never parsed for structure by callers; the prefix exists purely
/// so operators can recognize an id's entity kind in logs and error
/// messages.
pub fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", Uuid::new_v4())
}

pub fn note_id() -> String {
    new_id("note")
}

pub fn version_id() -> String {
    new_id("ver")
}

pub fn collection_id() -> String {
    new_id("col")
}

pub fn publication_id() -> String {
    new_id("pub")
}

pub fn passage_id() -> String {
    new_id("pas")
}

pub fn corpus_id() -> String {
    new_id("cor")
}

pub fn index_id() -> String {
    new_id("idx")
}

pub fn citation_id() -> String {
    new_id("cit")
}

pub fn answer_id() -> String {
    new_id("ans")
}

pub fn query_id() -> String {
    new_id("qry")
}

pub fn event_id() -> String {
    new_id("evt")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        assert!(note_id().starts_with("note_"));
        assert!(version_id().starts_with("ver_"));
        assert!(collection_id().starts_with("col_"));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(note_id(), note_id());
    }
}
