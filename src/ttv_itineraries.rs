// Itinerary grouping transforms.
//
// Two independent repairs for two different upstream defects:
//  - merge_itineraries: the upstream reports physically distinct variants
//    serving the same destination as separate itineraries, producing
//    duplicate destination cards. Merging collapses them.
//  - demerge_itineraries: the upstream over-merges departures that belong to
//    distinct physical branches into one itinerary (e.g. a line that forks
//    to two terminals in the same direction). Splitting recovers one
//    itinerary per branch using the trip key's variant field.
//
// The two are not inverses and are never composed; the caller picks one,
// the other, or neither per configuration.

use crate::ttv_models::{Itinerary, ScheduleItem};

const UNKNOWN_VARIANT: &str = "unknown";

// ============================================================================
// Merge (variant grouper)
// ============================================================================

/// Direction plus display headsign. Itineraries sharing this key represent
/// the same logical destination.
fn merge_key(itinerary: &Itinerary) -> String {
    let direction = itinerary
        .direction_id
        .map(|d| d.to_string())
        .unwrap_or_else(|| "none".to_string());
    format!("{}|{}", direction, itinerary.display_headsign())
}

/// Combine itineraries sharing the same (direction_id, headsign) key.
///
/// Groups keep first-seen order. A group of one passes through unchanged;
/// a larger group keeps the first member's display attributes (members are
/// assumed to share them) and takes the union of all members' schedule
/// items, sorted ascending by departure time. Idempotent.
pub fn merge_itineraries(itineraries: Vec<Itinerary>) -> Vec<Itinerary> {
    let mut groups: Vec<(String, Vec<Itinerary>)> = Vec::new();

    for itinerary in itineraries {
        let key = merge_key(&itinerary);
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(itinerary),
            None => groups.push((key, vec![itinerary])),
        }
    }

    groups
        .into_iter()
        .map(|(_, mut members)| {
            if members.len() == 1 {
                return members.pop().unwrap();
            }
            let mut merged = members.remove(0);
            for member in members {
                merged.schedule_items.extend(member.schedule_items);
            }
            merged.schedule_items.sort_by_key(|item| item.departure_time);
            merged
        })
        .collect()
}

// ============================================================================
// Split (variant splitter / de-merge)
// ============================================================================

/// Parse the variant discriminator out of a colon-delimited trip key.
/// Format: agency:variant-owner:variant:segment:trip, so the 3rd field
/// (index 2) is the variant.
fn parse_variant_id(trip_search_key: &str) -> Option<&str> {
    let mut parts = trip_search_key.split(':');
    let third = parts.nth(2)?;
    if third.is_empty() { None } else { Some(third) }
}

/// Bucket schedule items by variant key, preserving first-seen key order.
fn group_by_variant(items: Vec<ScheduleItem>) -> Vec<(String, Vec<ScheduleItem>)> {
    let mut groups: Vec<(String, Vec<ScheduleItem>)> = Vec::new();

    for item in items {
        let key = item
            .trip_search_key
            .as_deref()
            .and_then(parse_variant_id)
            .unwrap_or(UNKNOWN_VARIANT)
            .to_string();
        match groups.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(item),
            None => groups.push((key, vec![item])),
        }
    }

    groups
}

/// Split one over-merged itinerary into one itinerary per physical branch.
///
/// Items whose trip key yields no variant are assumed to belong to the
/// dominant branch: they are folded into whichever real variant has the
/// most items (first encountered wins a tie) rather than forming a
/// spurious branch of their own.
pub fn split_itinerary(itinerary: Itinerary) -> Vec<Itinerary> {
    if itinerary.schedule_items.is_empty() {
        return vec![itinerary];
    }

    let mut itinerary = itinerary;
    let mut groups = group_by_variant(std::mem::take(&mut itinerary.schedule_items));

    let has_unknown = groups.iter().any(|(k, _)| k == UNKNOWN_VARIANT);
    let has_real = groups.iter().any(|(k, _)| k != UNKNOWN_VARIANT);

    if has_unknown && has_real {
        let unknown_pos = groups.iter().position(|(k, _)| k == UNKNOWN_VARIANT).unwrap();
        let (_, unknown_items) = groups.remove(unknown_pos);

        let mut largest = 0;
        for i in 1..groups.len() {
            if groups[i].1.len() > groups[largest].1.len() {
                largest = i;
            }
        }
        groups[largest].1.extend(unknown_items);
    }

    if groups.len() == 1 {
        let (variant, items) = groups.pop().unwrap();
        let mut single = itinerary;
        single.variant_id = (variant != UNKNOWN_VARIANT).then_some(variant);
        single.schedule_items = items;
        return vec![single];
    }

    groups
        .into_iter()
        .map(|(variant, items)| {
            let mut branch = itinerary.clone();
            branch.variant_id = (variant != UNKNOWN_VARIANT).then_some(variant);
            branch.schedule_items = items;
            branch
        })
        .collect()
}

/// De-merge every itinerary in a list.
pub fn demerge_itineraries(itineraries: Vec<Itinerary>) -> Vec<Itinerary> {
    itineraries.into_iter().flat_map(split_itinerary).collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn item(time: i64, trip_key: Option<&str>) -> ScheduleItem {
        ScheduleItem {
            departure_time: time,
            trip_search_key: trip_key.map(String::from),
            ..Default::default()
        }
    }

    fn itinerary(direction: Option<i64>, headsign: &str, items: Vec<ScheduleItem>) -> Itinerary {
        Itinerary {
            direction_id: direction,
            merged_headsign: Some(headsign.to_string()),
            schedule_items: items,
            ..Default::default()
        }
    }

    #[test]
    fn merge_combines_same_direction_and_headsign() {
        let merged = merge_itineraries(vec![
            itinerary(Some(0), "Downtown", vec![item(300, None), item(100, None)]),
            itinerary(Some(0), "Downtown", vec![item(200, None)]),
            itinerary(Some(1), "Airport", vec![item(50, None)]),
        ]);

        assert_eq!(merged.len(), 2);
        let downtown = &merged[0];
        let times: Vec<i64> = downtown.schedule_items.iter().map(|i| i.departure_time).collect();
        assert_eq!(times, vec![100, 200, 300]);
        assert_eq!(merged[1].display_headsign(), "Airport");
    }

    #[test]
    fn merge_keeps_undefined_direction_separate_from_zero() {
        let merged = merge_itineraries(vec![
            itinerary(None, "Downtown", vec![item(1, None)]),
            itinerary(Some(0), "Downtown", vec![item(2, None)]),
        ]);
        assert_eq!(merged.len(), 2);
    }

    #[test]
    fn merge_is_idempotent() {
        let once = merge_itineraries(vec![
            itinerary(Some(0), "Downtown", vec![item(300, None)]),
            itinerary(Some(0), "Downtown", vec![item(100, None)]),
            itinerary(Some(1), "Airport", vec![item(50, None)]),
        ]);
        let twice = merge_itineraries(once.clone());

        assert_eq!(once.len(), twice.len());
        for (a, b) in once.iter().zip(twice.iter()) {
            assert_eq!(a.display_headsign(), b.display_headsign());
            let ta: Vec<i64> = a.schedule_items.iter().map(|i| i.departure_time).collect();
            let tb: Vec<i64> = b.schedule_items.iter().map(|i| i.departure_time).collect();
            assert_eq!(ta, tb);
        }
    }

    #[test]
    fn split_produces_one_itinerary_per_variant() {
        let merged = itinerary(
            Some(0),
            "Eastbound",
            vec![
                item(100, Some("TSL:50430640:1883:6:74")),
                item(200, Some("TSL:50430640:1901:6:75")),
                item(300, Some("TSL:50430640:1883:6:76")),
            ],
        );

        let branches = split_itinerary(merged);
        assert_eq!(branches.len(), 2);
        assert_eq!(branches[0].variant_id.as_deref(), Some("1883"));
        assert_eq!(branches[1].variant_id.as_deref(), Some("1901"));

        // Union of the branches' items equals the original set.
        let mut all: Vec<i64> = branches
            .iter()
            .flat_map(|b| b.schedule_items.iter().map(|i| i.departure_time))
            .collect();
        all.sort();
        assert_eq!(all, vec![100, 200, 300]);
    }

    #[test]
    fn split_folds_unknown_items_into_dominant_variant() {
        let merged = itinerary(
            Some(0),
            "Eastbound",
            vec![
                item(100, Some("TSL:1:aa:6:1")),
                item(200, None),
                item(300, Some("TSL:1:bb:6:2")),
                item(400, Some("TSL:1:bb:6:3")),
            ],
        );

        let branches = split_itinerary(merged);
        assert_eq!(branches.len(), 2);
        let bb = branches.iter().find(|b| b.variant_id.as_deref() == Some("bb")).unwrap();
        assert_eq!(bb.schedule_items.len(), 3);
    }

    #[test]
    fn split_tie_break_prefers_first_variant_encountered() {
        let merged = itinerary(
            Some(0),
            "Eastbound",
            vec![
                item(100, Some("TSL:1:aa:6:1")),
                item(200, Some("TSL:1:bb:6:2")),
                item(300, None),
            ],
        );

        let branches = split_itinerary(merged);
        let aa = branches.iter().find(|b| b.variant_id.as_deref() == Some("aa")).unwrap();
        assert_eq!(aa.schedule_items.len(), 2);
    }

    #[test]
    fn split_single_variant_attaches_id_without_splitting() {
        let single = itinerary(Some(0), "Eastbound", vec![item(100, Some("TSL:1:aa:6:1"))]);
        let branches = split_itinerary(single);
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].variant_id.as_deref(), Some("aa"));
    }

    #[test]
    fn split_all_unknown_stays_whole_with_no_variant_id() {
        let unknown = itinerary(Some(0), "Eastbound", vec![item(100, None), item(200, Some("x:y"))]);
        let branches = split_itinerary(unknown);
        assert_eq!(branches.len(), 1);
        assert!(branches[0].variant_id.is_none());
        assert_eq!(branches[0].schedule_items.len(), 2);
    }

    #[test]
    fn split_without_schedule_items_passes_through() {
        let empty = itinerary(Some(0), "Eastbound", vec![]);
        let branches = split_itinerary(empty);
        assert_eq!(branches.len(), 1);
        assert!(branches[0].variant_id.is_none());
    }
}
