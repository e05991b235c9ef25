use cultural_vista::aggregate::{aggregate, Metric};
use cultural_vista::data::RawTable;
use cultural_vista::filter::{select, FilterState, Selection};
use cultural_vista::normalize::{build_dataset, parse_coordinate};
use cultural_vista::types::{Dataset, Record, SourceKey};
use proptest::prelude::*;

const STATES: [&str; 4] = ["Odisha", "Kerala", "Goa", "Assam"];
const KINDS: [&str; 2] = ["Temples", "Forts"];

fn dataset(rows: &[(usize, usize, u32)]) -> Dataset {
    build_dataset(
        SourceKey::Derived("generated".into()),
        RawTable {
            headers: vec!["State".into(), "Type".into(), "Metric".into()],
            rows: rows
                .iter()
                .map(|(s, k, m)| {
                    vec![
                        Some(STATES[*s].to_string()),
                        Some(KINDS[*k].to_string()),
                        Some(m.to_string()),
                    ]
                })
                .collect(),
        },
    )
}

fn rows() -> impl Strategy<Value = Vec<(usize, usize, u32)>> {
    prop::collection::vec((0..STATES.len(), 0..KINDS.len(), 0u32..10_000), 0..60)
}

const PLACEHOLDERS: [&str; 4] = ["N/A", "-", "unknown", ""];

/// Metric cells where some rows carry a placeholder instead of a number.
fn noisy_rows() -> impl Strategy<Value = Vec<(usize, Result<u32, usize>)>> {
    prop::collection::vec(
        (
            0..STATES.len(),
            prop_oneof![
                3 => (0u32..10_000).prop_map(Ok),
                1 => (0..PLACEHOLDERS.len()).prop_map(Err),
            ],
        ),
        0..60,
    )
}

fn selection() -> impl Strategy<Value = Selection> {
    prop_oneof![
        Just(Selection::All),
        (0..STATES.len()).prop_map(|i| Selection::Value(STATES[i].to_string())),
    ]
}

proptest! {
    #[test]
    fn selection_is_an_ordered_subsequence(rows in rows(), state in selection(), kind in 0..3usize) {
        let ds = dataset(&rows);
        let kind = KINDS.get(kind).map(|k| Selection::Value(k.to_string())).unwrap_or(Selection::All);
        let filter = FilterState::new().with("State", state.clone()).with("Type", kind.clone());
        let picked = select(&ds, &filter);

        let mut cursor = ds.records().iter();
        for record in &picked {
            prop_assert!(cursor.any(|r| std::ptr::eq(r, *record)));
        }

        let matches = |value: &Selection, column: &str, record: &Record| match value.value() {
            None => true,
            Some(v) => ds.label(record, column).as_deref() == Some(v),
        };
        let expected = ds
            .records()
            .iter()
            .filter(|r| matches(&state, "State", *r) && matches(&kind, "Type", *r))
            .count();
        prop_assert_eq!(picked.len(), expected);
    }

    #[test]
    fn all_selections_are_identity(rows in rows()) {
        let ds = dataset(&rows);
        let filter = FilterState::from_pairs([("State", "All"), ("Type", "All")], &["All"]);
        prop_assert_eq!(select(&ds, &filter), ds.all());
    }

    #[test]
    fn aggregation_is_sorted_bounded_and_complete(rows in rows(), top_n in 1usize..6) {
        let ds = dataset(&rows);
        let result = aggregate(&ds, &ds.all(), "State", &Metric::Sum("Metric".into()), top_n).unwrap();

        prop_assert!(result.entries.len() <= top_n);
        prop_assert_eq!(result.entries.len(), result.groups.min(top_n));
        prop_assert!(result.entries.windows(2).all(|w| w[0].value >= w[1].value));

        let expected: f64 = rows.iter().map(|(_, _, m)| f64::from(*m)).sum();
        prop_assert!((result.total - expected).abs() < 1e-6);
    }

    #[test]
    fn placeholder_metric_cells_are_left_out_of_the_sum(rows in noisy_rows()) {
        let ds = build_dataset(
            SourceKey::Derived("noisy".into()),
            RawTable {
                headers: vec!["State".into(), "Metric".into()],
                rows: rows
                    .iter()
                    .map(|(s, m)| {
                        let cell = match m {
                            Ok(n) => n.to_string(),
                            Err(p) => PLACEHOLDERS[*p].to_string(),
                        };
                        vec![Some(STATES[*s].to_string()), (!cell.is_empty()).then_some(cell)]
                    })
                    .collect(),
            },
        );
        let result = aggregate(&ds, &ds.all(), "State", &Metric::Sum("Metric".into()), STATES.len()).unwrap();

        let parsed: Vec<(usize, f64)> = rows
            .iter()
            .filter_map(|(s, m)| m.as_ref().ok().map(|n| (*s, f64::from(*n))))
            .collect();
        prop_assert_eq!(result.fallback_to_count, parsed.is_empty());
        if !parsed.is_empty() {
            let expected: f64 = parsed.iter().map(|(_, n)| n).sum();
            prop_assert!((result.total - expected).abs() < 1e-6);
            let groups: std::collections::HashSet<usize> = parsed.iter().map(|(s, _)| *s).collect();
            prop_assert_eq!(result.groups, groups.len());
        }
    }

    #[test]
    fn hemisphere_suffix_sets_the_sign(value in 0.0f64..180.0) {
        let text = format!("{value}");
        prop_assert_eq!(parse_coordinate(Some(&format!("{text}N"))), Some(value));
        prop_assert_eq!(parse_coordinate(Some(&format!("{text}E"))), Some(value));
        prop_assert_eq!(parse_coordinate(Some(&format!("{text}S"))), Some(-value));
        prop_assert_eq!(parse_coordinate(Some(&format!("{text}W"))), Some(-value));
    }
}

#[test]
fn coordinate_examples() {
    assert_eq!(parse_coordinate(Some("12.5N")), Some(12.5));
    assert_eq!(parse_coordinate(Some("77.2W")), Some(-77.2));
    assert_eq!(parse_coordinate(Some("45.0")), Some(45.0));
    assert_eq!(parse_coordinate(None), None);
    assert_eq!(parse_coordinate(Some("abcN")), None);
}
