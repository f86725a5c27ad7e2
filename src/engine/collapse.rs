use std::collections::BTreeMap;

use crate::types::{GridCoord, Market};

/// Group markets by forecast grid cell so one upstream fetch serves every
/// market in the cell. Bounds upstream cost to O(unique coordinates) — the
/// KMA service enforces call-rate limits.
pub fn collapse(markets: Vec<Market>) -> BTreeMap<GridCoord, Vec<Market>> {
    let mut groups: BTreeMap<GridCoord, Vec<Market>> = BTreeMap::new();
    for market in markets {
        groups.entry(market.coord).or_default().push(market);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ThresholdOverrides;

    fn market(id: i64, nx: i32, ny: i32) -> Market {
        Market {
            id,
            name: format!("market {id}"),
            coord: GridCoord { nx, ny },
            is_active: true,
            overrides: ThresholdOverrides::default(),
        }
    }

    #[test]
    fn shared_cells_collapse_to_one_group() {
        let markets = vec![
            market(1, 60, 127),
            market(2, 60, 127),
            market(3, 60, 127),
            market(4, 60, 127),
            market(5, 60, 127),
            market(6, 61, 128),
        ];

        let groups = collapse(markets);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[&GridCoord { nx: 60, ny: 127 }].len(), 5);
        assert_eq!(groups[&GridCoord { nx: 61, ny: 128 }].len(), 1);
    }

    #[test]
    fn empty_catalog_yields_no_groups() {
        assert!(collapse(Vec::new()).is_empty());
    }
}
