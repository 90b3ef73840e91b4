use std::sync::Arc;

use epaper_canvas::paper::bands::{Band, BandStore, BACKGROUND};
use proptest::prelude::*;

fn band(id: i64, kind: &str, origin_y: f64, height: f64) -> Band {
    Band {
        id,
        kind: kind.into(),
        editable: false,
        height,
        origin_x: 0.0,
        origin_y,
        source_offset: 0,
        source: Arc::from(""),
    }
}

fn arb_band() -> impl Strategy<Value = (i64, bool, u16, u16)> {
    (0i64..40, prop::bool::weighted(0.1), 0u16..800, 1u16..120)
}

proptest! {
    #[test]
    fn ids_stay_sorted_and_unique(bands in prop::collection::vec(arb_band(), 0..60)) {
        let mut store = BandStore::new();
        for (id, _, y, h) in &bands {
            store.upsert(band(*id, "DT", f64::from(*y), f64::from(*h)));
        }
        let ids: Vec<i64> = store.iter().map(|b| b.id).collect();
        let mut expected: Vec<i64> = bands.iter().map(|b| b.0).collect();
        expected.sort_unstable();
        expected.dedup();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn lookup_matches_a_linear_scan(
        bands in prop::collection::vec(arb_band(), 0..60),
        y in 0u16..1000,
    ) {
        let mut store = BandStore::new();
        for (id, background, top, h) in &bands {
            let kind = if *background { BACKGROUND } else { "DT" };
            store.upsert(band(*id, kind, f64::from(*top), f64::from(*h)));
        }
        let y = f64::from(y);
        let lowest_start = store
            .iter()
            .filter(|b| !b.is_background() && b.contains_y(y))
            .map(|b| b.origin_y)
            .fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |a| a.max(v))));

        match (store.find_at_y(y), lowest_start) {
            (Some(found), Some(top)) => {
                prop_assert!(found.contains_y(y));
                prop_assert!(!found.is_background());
                prop_assert_eq!(found.origin_y, top);
            }
            (None, None) => {}
            (found, top) => prop_assert!(false, "lookup {:?} vs scan {:?}", found.map(|b| b.id), top),
        }
    }
}

#[test]
fn replacing_a_band_keeps_its_slot() {
    let mut store = BandStore::new();
    store.upsert(band(3, "DT", 0.0, 10.0));
    store.upsert(band(1, "DT", 10.0, 10.0));
    store.upsert(band(3, "CH", 50.0, 5.0));
    assert_eq!(store.len(), 2);
    assert_eq!(store.position(3), Some(1));
    assert_eq!(store.find_at_y(52.0).map(|b| b.kind.as_str()), Some("CH"));
    assert!(store.find_at_y(5.0).is_none());
}

#[test]
fn background_is_never_hit() {
    let mut store = BandStore::new();
    store.upsert(band(0, BACKGROUND, 0.0, 842.0));
    assert!(store.find_at_y(100.0).is_none());
    assert!(store.find_at_y(f64::NAN).is_none());
}
