use farescope::{
    aggregate::{self, FilterSelection},
    error::StoreError,
    pipeline::{Pipeline, PipelineOptions},
    record::{AIRLINE, PRICE, RawRecord},
    store::StoreTarget,
    view::ColumnarView,
};
use proptest::prelude::*;
use serde_json::json;

const AIRLINES: [&str; 5] = ["Air India", "GoAir", "IndiGo", "SpiceJet", "Vistara"];

fn view_of(rows: &[(usize, u32)]) -> ColumnarView {
    let documents: Vec<RawRecord> = rows
        .iter()
        .filter_map(|(airline, price)| {
            RawRecord::from_json(json!({
                "Airline": AIRLINES[*airline],
                "Source": "Delhi",
                "Destination": "Cochin",
                "Total_Stops": "1 stop",
                "Duration": "2h 50m",
                "Price": price,
            }))
        })
        .collect();
    let store = move |_: &StoreTarget| -> Result<Vec<RawRecord>, StoreError> { Ok(documents.clone()) };

    Pipeline::new(
        store,
        StoreTarget {
            uri: String::new(),
            database: "Vpandas".to_string(),
            collection: "Fight_data".to_string(),
        },
        PipelineOptions::default(),
    )
    .run()
    .expect("generated rows must load")
}

fn rows_strategy() -> impl Strategy<Value = Vec<(usize, u32)>> {
    prop::collection::vec((0..AIRLINES.len(), 1_000u32..80_000), 1..60)
}

fn selection_strategy() -> impl Strategy<Value = FilterSelection> {
    prop::collection::btree_set(
        prop::sample::select(AIRLINES.to_vec()).prop_map(str::to_string),
        0..=AIRLINES.len(),
    )
}

proptest! {
    #[test]
    fn filter_keeps_exactly_the_selected_rows(rows in rows_strategy(), selection in selection_strategy()) {
        let view = view_of(&rows);
        let filtered = aggregate::apply_filter(&view, AIRLINE, &selection).expect("filter must apply");

        let expected = if selection.is_empty() {
            rows.len()
        } else {
            rows.iter().filter(|(airline, _)| selection.contains(AIRLINES[*airline])).count()
        };
        prop_assert_eq!(filtered.row_count(), expected);
        prop_assert_eq!(aggregate::summarize(&filtered, PRICE).expect("summary").count, expected);
    }

    #[test]
    fn filter_is_idempotent(rows in rows_strategy(), selection in selection_strategy()) {
        let view = view_of(&rows);
        let once = aggregate::apply_filter(&view, AIRLINE, &selection).expect("filter must apply");
        let twice = aggregate::apply_filter(&once, AIRLINE, &selection).expect("filter must apply");

        prop_assert_eq!(
            once.row_ids().collect::<Vec<_>>(),
            twice.row_ids().collect::<Vec<_>>()
        );
    }

    #[test]
    fn groups_partition_rows_in_descending_mean_order(rows in rows_strategy()) {
        let view = view_of(&rows);
        let result = aggregate::group_mean(&view, AIRLINE, PRICE).expect("group must succeed");

        let total: usize = result.groups.iter().map(|group| group.count).sum();
        prop_assert_eq!(total, rows.len());
        for pair in result.groups.windows(2) {
            prop_assert!(
                pair[0].mean > pair[1].mean
                    || (pair[0].mean == pair[1].mean && pair[0].key < pair[1].key)
            );
        }
    }
}
