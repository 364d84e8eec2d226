use kv_core::Error;

pub const MAX_QUERY_CHARS: usize = 500;
pub const MAX_PAGE_SIZE: usize = 50;
const DEFAULT_PAGE_SIZE: usize = 10;

/// A Search request, already past transport deserialization. `collection_scope`
/// holds collection *names* as supplied by the caller; resolution to ids
/// happens in the engine, since unknown names are silently dropped rather
/// than rejected.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub collection_scope: Vec<String>,
    pub page: usize,
    pub page_size: usize,
}

impl Query {
    pub fn new(text: impl Into<String>, collection_scope: Vec<String>, page: usize, page_size: Option<usize>) -> Self {
        Self {
            text: text.into(),
            collection_scope,
            page,
            page_size: page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE),
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        let char_count = self.text.chars().count();
        if char_count == 0 || char_count > MAX_QUERY_CHARS {
            return Err(Error::validation([format!(
                "query text must be 1..{MAX_QUERY_CHARS} characters, got {char_count}"
            )]));
        }
        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::validation([format!(
                "page_size must be 1..{MAX_PAGE_SIZE}, got {}",
                self.page_size
            )]));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_fails_validation() {
        let query = Query::new("", vec![], 0, None);
        assert!(query.validate().is_err());
    }

    #[test]
    fn page_size_is_clamped_to_the_maximum() {
        let query = Query::new("hello", vec![], 0, Some(1000));
        assert_eq!(query.page_size, MAX_PAGE_SIZE);
    }

    #[test]
    fn oversized_text_fails_validation() {
        let text: String = "a".repeat(MAX_QUERY_CHARS + 1);
        let query = Query::new(text, vec![], 0, None);
        assert!(query.validate().is_err());
    }
}
