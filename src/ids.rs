//! Id generation as a pure function of the ids already in the document.

use crate::document::ProjectDocument;

/// Returns `{prefix}_{n}` with `n` one past the highest numeric suffix
/// among `existing` ids sharing the prefix.
pub fn next_id<'a, I>(prefix: &str, existing: I) -> String
where
    I: IntoIterator<Item = &'a str>,
{
    let head = format!("{}_", prefix);
    let max = existing
        .into_iter()
        .filter_map(|id| id.strip_prefix(head.as_str()))
        .filter_map(|suffix| suffix.parse::<u64>().ok())
        .max()
        .unwrap_or(0);
    format!("{}{}", head, max + 1)
}

pub fn next_document_id(doc: &ProjectDocument, prefix: &str) -> String {
    next_id(prefix, doc.all_ids())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_id_starts_at_one() {
        assert_eq!(next_id("stage", std::iter::empty()), "stage_1");
    }

    #[test]
    fn test_skips_past_highest_suffix() {
        let ids = ["stage_1", "stage_7", "stage_x", "node_12", "stage_3"];
        assert_eq!(next_id("stage", ids), "stage_8");
        assert_eq!(next_id("node", ids), "node_13");
    }

    #[test]
    fn test_prefix_must_match_exactly() {
        assert_eq!(next_id("stage", ["substage_9", "stage"]), "stage_1");
    }
}
