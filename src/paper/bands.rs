use std::sync::Arc;

/// Band type the server uses for the page background; never hit by pointer lookups.
pub const BACKGROUND: &str = "Background";

/// A horizontal region of the page and where its drawing commands live.
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub id: i64,
    pub kind: String,
    pub editable: bool,
    pub height: f64,
    pub origin_x: f64,
    pub origin_y: f64,
    /// Offset in `source` right after the band definition.
    pub source_offset: usize,
    pub source: Arc<str>,
}

impl Band {
    pub fn contains_y(&self, y: f64) -> bool {
        y >= self.origin_y && y <= self.origin_y + self.height
    }

    pub fn is_background(&self) -> bool {
        self.kind == BACKGROUND
    }
}

/// Bands sorted by id, plus a vertical index for pointer lookups.
///
/// New ids are inserted at their sorted position, so painting order is id
/// order no matter the arrival order. The vertical index doesn't assume ids
/// grow top to bottom.
#[derive(Debug, Clone, Default)]
pub struct BandStore {
    bands: Vec<Band>,
    // Positions in `bands` of non-background bands, sorted by `origin_y`.
    by_y: Vec<usize>,
    // `reach[i]`: furthest bottom edge among `by_y[..=i]`.
    reach: Vec<f64>,
}

impl BandStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `band`, or overwrites the band with the same id in place.
    pub fn upsert(&mut self, band: Band) -> &Band {
        let idx = match self.bands.binary_search_by(|stored| stored.id.cmp(&band.id)) {
            Ok(idx) => {
                self.bands[idx] = band;
                idx
            }
            Err(idx) => {
                self.bands.insert(idx, band);
                idx
            }
        };
        self.reindex();
        &self.bands[idx]
    }

    pub fn find_by_id(&self, id: i64) -> Option<&Band> {
        self.position(id).map(|idx| &self.bands[idx])
    }

    pub fn position(&self, id: i64) -> Option<usize> {
        self.bands.binary_search_by(|stored| stored.id.cmp(&id)).ok()
    }

    /// The non-background band whose `[origin_y, origin_y + height]` contains `y`.
    ///
    /// When bands overlap the one starting lowest on the page wins.
    pub fn find_at_y(&self, y: f64) -> Option<&Band> {
        if y.is_nan() {
            return None;
        }
        let end = self
            .by_y
            .partition_point(|&idx| self.bands[idx].origin_y <= y);
        for slot in (0..end).rev() {
            if self.reach[slot] < y {
                break;
            }
            let band = &self.bands[self.by_y[slot]];
            if band.contains_y(y) {
                return Some(band);
            }
        }
        None
    }

    pub fn iter(&self) -> impl Iterator<Item = &Band> {
        self.bands.iter()
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn clear(&mut self) {
        self.bands.clear();
        self.by_y.clear();
        self.reach.clear();
    }

    fn reindex(&mut self) {
        self.by_y = (0..self.bands.len())
            .filter(|&idx| !self.bands[idx].is_background())
            .collect();
        let bands = &self.bands;
        self.by_y
            .sort_by(|&a, &b| bands[a].origin_y.total_cmp(&bands[b].origin_y));
        let mut reach = f64::NEG_INFINITY;
        self.reach = self
            .by_y
            .iter()
            .map(|&idx| {
                let band = &bands[idx];
                reach = reach.max(band.origin_y + band.height);
                reach
            })
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn band(id: i64, kind: &str, y: f64, height: f64) -> Band {
        Band {
            id,
            kind: kind.into(),
            editable: false,
            height,
            origin_x: 0.0,
            origin_y: y,
            source_offset: 0,
            source: Arc::from(""),
        }
    }

    #[test]
    fn upsert_keeps_id_order_and_overwrites_in_place() {
        let mut store = BandStore::new();
        store.upsert(band(5, "DT", 50.0, 10.0));
        store.upsert(band(1, "Header", 0.0, 10.0));
        store.upsert(band(3, "DT", 30.0, 10.0));
        let ids: Vec<i64> = store.iter().map(|b| b.id).collect();
        assert_eq!(ids, vec![1, 3, 5]);

        let written = store.upsert(band(3, "DT", 31.0, 12.0)).clone();
        assert_eq!(store.len(), 3);
        assert_eq!(store.find_by_id(3), Some(&written));
        assert_eq!(store.find_by_id(3).map(|b| b.height), Some(12.0));
        assert_eq!(store.find_by_id(4), None);
    }

    #[test]
    fn find_at_y_inclusive_ranges_and_background_excluded() {
        let mut store = BandStore::new();
        store.upsert(band(0, BACKGROUND, 0.0, 842.0));
        store.upsert(band(1, "Header", 0.0, 20.0));
        store.upsert(band(2, "DT", 20.0, 15.0));
        store.upsert(band(3, "DT", 60.0, 15.0));

        assert_eq!(store.find_at_y(0.0).map(|b| b.id), Some(1));
        assert_eq!(store.find_at_y(27.0).map(|b| b.id), Some(2));
        assert_eq!(store.find_at_y(75.0).map(|b| b.id), Some(3));
        assert_eq!(store.find_at_y(50.0), None);
        assert_eq!(store.find_at_y(400.0), None);
        assert_eq!(store.find_at_y(-1.0), None);
    }

    #[test]
    fn find_at_y_does_not_depend_on_id_order() {
        let mut store = BandStore::new();
        store.upsert(band(9, "Header", 0.0, 10.0));
        store.upsert(band(2, "Footer", 800.0, 40.0));
        store.upsert(band(5, "DT", 10.0, 10.0));
        assert_eq!(store.find_at_y(805.0).map(|b| b.id), Some(2));
        assert_eq!(store.find_at_y(5.0).map(|b| b.id), Some(9));
        assert_eq!(store.find_at_y(15.0).map(|b| b.id), Some(5));
    }

    #[test]
    fn tall_earlier_band_is_still_found() {
        let mut store = BandStore::new();
        store.upsert(band(1, "Summary", 0.0, 100.0));
        store.upsert(band(2, "DT", 10.0, 5.0));
        assert_eq!(store.find_at_y(50.0).map(|b| b.id), Some(1));
    }

    #[test]
    fn clear_discards_everything() {
        let mut store = BandStore::new();
        store.upsert(band(1, "DT", 0.0, 10.0));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.find_at_y(5.0), None);
    }
}
