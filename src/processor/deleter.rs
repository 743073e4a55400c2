//! Document deletion.

use crate::field::Document;
use crate::rule::DeleteAction;

/// Clear `doc` when the rule asks for deletion. Returns whether it did.
pub fn apply_delete(doc: &mut Document, action: &DeleteAction) -> bool {
    if action.delete {
        doc.clear();
    }
    action.delete
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::document_from_value;
    use serde_json::json;

    #[test]
    fn test_delete_clears_document() {
        let mut doc = document_from_value(json!({"a": 1, "b": {"c": 2}})).unwrap();
        assert!(apply_delete(&mut doc, &DeleteAction { delete: true }));
        assert!(doc.is_empty());
    }

    #[test]
    fn test_delete_false_keeps_document() {
        let mut doc = document_from_value(json!({"a": 1})).unwrap();
        assert!(!apply_delete(&mut doc, &DeleteAction { delete: false }));
        assert_eq!(doc["a"], json!(1));
    }
}
