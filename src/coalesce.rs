//! Island coalescing: merge contiguous atomic segments that share identical
//! non-ephemeral payload into one segment ("island").
//!
//! Two segments coalesce when they are temporally adjacent (the first's
//! `valid_until` meets the second's `valid_from`) and their `data_hash`
//! matches. The ephemeral payload is intentionally excluded from that
//! check — it is allowed to vary across an otherwise-identical island.

use crate::types::{CoalescedSegment, ResolvedSegment};

pub fn coalesce_segments(segments: Vec<ResolvedSegment>) -> Vec<CoalescedSegment> {
    let mut out: Vec<CoalescedSegment> = Vec::new();
    for seg in segments {
        let merge_into_prev = out.last().is_some_and(|prev| {
            prev.grouping_key == seg.grouping_key
                && prev.interval.valid_until == seg.interval.valid_from
                && prev.data_hash == seg.data_hash
        });
        if merge_into_prev {
            let prev = out.last_mut().unwrap();
            prev.interval.valid_until = seg.interval.valid_until;
            prev.row_ids.extend(seg.row_ids);
            prev.row_ids.sort_unstable();
            prev.row_ids.dedup();
            prev.has_source_coverage |= seg.has_source_coverage;
            prev.has_target_coverage |= seg.has_target_coverage;
            // Last-writer-wins for the ephemeral payload shown on the merged island.
            prev.ephemeral_payload = seg.ephemeral_payload;
        } else {
            out.push(CoalescedSegment {
                grouping_key: seg.grouping_key,
                ancestor_valid_from: Some(seg.interval.valid_from.clone()),
                interval: seg.interval,
                is_new_entity: seg.is_new_entity,
                identity_keys: seg.identity_keys,
                correlation_id: seg.correlation_id,
                row_ids: seg.row_ids,
                data_payload: seg.data_payload,
                ephemeral_payload: seg.ephemeral_payload,
                data_hash: seg.data_hash,
                has_source_coverage: seg.has_source_coverage,
                has_target_coverage: seg.has_target_coverage,
                s_t_relation: seg.s_t_relation,
            });
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interval::{Bound, Interval};
    use crate::value::Value;
    use std::collections::BTreeMap;

    fn seg(key: &str, from: i64, until: i64, val: i64) -> ResolvedSegment {
        let mut data = BTreeMap::new();
        data.insert("v".to_string(), Value::Int(val));
        ResolvedSegment {
            grouping_key: key.to_string(),
            interval: Interval::new(Bound::Finite(from), Bound::Finite(until)).unwrap(),
            is_new_entity: false,
            identity_keys: BTreeMap::new(),
            correlation_id: None,
            row_ids: vec![1],
            data_payload: Some(data.clone()),
            ephemeral_payload: None,
            target_data_payload: None,
            data_hash: Some(crate::value::data_hash(&data)),
            has_source_coverage: true,
            has_target_coverage: false,
            s_t_relation: None,
        }
    }

    #[test]
    fn coalesces_adjacent_identical_islands() {
        let segs = vec![seg("e1", 0, 5, 1), seg("e1", 5, 10, 1), seg("e1", 10, 15, 2)];
        let coalesced = coalesce_segments(segs);
        assert_eq!(coalesced.len(), 2);
        assert_eq!(coalesced[0].interval.valid_from, Bound::Finite(0));
        assert_eq!(coalesced[0].interval.valid_until, Bound::Finite(10));
        assert_eq!(coalesced[1].interval.valid_from, Bound::Finite(10));
    }

    #[test]
    fn does_not_coalesce_across_entities() {
        let segs = vec![seg("e1", 0, 5, 1), seg("e2", 5, 10, 1)];
        let coalesced = coalesce_segments(segs);
        assert_eq!(coalesced.len(), 2);
    }

    #[test]
    fn is_idempotent() {
        let segs = vec![seg("e1", 0, 5, 1), seg("e1", 5, 10, 1)];
        let once = coalesce_segments(segs);
        let twice = coalesce_segments(
            once.iter()
                .map(|c| ResolvedSegment {
                    grouping_key: c.grouping_key.clone(),
                    interval: c.interval.clone(),
                    is_new_entity: c.is_new_entity,
                    identity_keys: c.identity_keys.clone(),
                    correlation_id: c.correlation_id.clone(),
                    row_ids: c.row_ids.clone(),
                    data_payload: c.data_payload.clone(),
                    ephemeral_payload: c.ephemeral_payload.clone(),
                    target_data_payload: None,
                    data_hash: c.data_hash,
                    has_source_coverage: c.has_source_coverage,
                    has_target_coverage: c.has_target_coverage,
                    s_t_relation: c.s_t_relation,
                })
                .collect(),
        );
        assert_eq!(once.len(), twice.len());
    }
}
