use std::collections::HashSet;

use common::storage::types::kb_chunk::KbChunkSearchResult;

/// Deterministic positional fusion of the dense and keyword candidate lists.
///
/// Dense candidates keep their order; keyword candidates are appended in
/// order, skipping chunk ids already present, until the merged list reaches
/// `limit` or `secondary_max` keyword entries have been added, whichever
/// comes first.
pub fn merge_candidates(
    primary: Vec<KbChunkSearchResult>,
    secondary: Vec<KbChunkSearchResult>,
    limit: usize,
    secondary_max: usize,
) -> Vec<KbChunkSearchResult> {
    let mut seen: HashSet<i64> = primary
        .iter()
        .filter_map(|candidate| candidate.chunk.id)
        .collect();

    let mut merged = primary;
    merged.truncate(limit);

    let mut added = 0usize;
    for candidate in secondary {
        if merged.len() >= limit || added >= secondary_max {
            break;
        }
        if let Some(id) = candidate.chunk.id {
            if !seen.insert(id) {
                continue;
            }
        }
        merged.push(candidate);
        added += 1;
    }

    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::kb_chunk::KbChunk;

    fn candidate(id: i64) -> KbChunkSearchResult {
        KbChunkSearchResult {
            chunk: KbChunk::new(id, 1, id, None, format!("chunk {id}"), None),
            score: 0.0,
        }
    }

    fn ids(candidates: &[KbChunkSearchResult]) -> Vec<i64> {
        candidates
            .iter()
            .filter_map(|candidate| candidate.chunk.id)
            .collect()
    }

    #[test]
    fn caps_secondary_additions() {
        let primary = vec![candidate(1), candidate(2)];
        let secondary = vec![candidate(3), candidate(4), candidate(5)];

        let merged = merge_candidates(primary, secondary, 10, 1);

        assert_eq!(ids(&merged), vec![1, 2, 3]);
    }

    #[test]
    fn skips_duplicate_ids_without_consuming_the_cap() {
        let primary = vec![candidate(1), candidate(2)];
        let secondary = vec![candidate(2), candidate(3), candidate(4)];

        let merged = merge_candidates(primary, secondary, 10, 2);

        assert_eq!(ids(&merged), vec![1, 2, 3, 4]);
    }

    #[test]
    fn stops_at_the_overall_limit() {
        let primary = vec![candidate(1), candidate(2), candidate(3)];
        let secondary = vec![candidate(4), candidate(5)];

        let merged = merge_candidates(primary, secondary, 4, 10);

        assert_eq!(ids(&merged), vec![1, 2, 3, 4]);
    }

    #[test]
    fn dense_list_alone_is_truncated_to_the_limit() {
        let primary = vec![candidate(1), candidate(2), candidate(3)];

        let merged = merge_candidates(primary, Vec::new(), 2, 10);

        assert_eq!(ids(&merged), vec![1, 2]);
    }

    #[test]
    fn is_a_pure_function_of_its_inputs() {
        let build = || {
            (
                vec![candidate(1), candidate(4)],
                vec![candidate(2), candidate(4), candidate(3)],
            )
        };

        let (p1, s1) = build();
        let (p2, s2) = build();
        assert_eq!(
            ids(&merge_candidates(p1, s1, 5, 5)),
            ids(&merge_candidates(p2, s2, 5, 5)),
        );
    }
}
