use approx::assert_abs_diff_eq;
use chrono::NaiveDate;

use returnlab::{PriceColumn, PriceError, PriceTable, ReturnTransformer, simple_returns};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
}

fn days(n: u32) -> Vec<NaiveDate> {
    (1..=n).map(day).collect()
}

fn tickers(names: &[&str]) -> Vec<String> {
    names.iter().map(|t| t.to_string()).collect()
}

#[test]
fn first_return_is_dropped_and_rest_are_simple_returns() {
    let table = PriceTable::new(
        days(3),
        vec![PriceColumn::new(
            "Close",
            Some("A"),
            vec![Some(100.0), Some(110.0), Some(99.0)],
        )],
    )
    .unwrap();

    let records = ReturnTransformer::default().transform(&table, &tickers(&["A"]));

    assert_eq!(records.len(), 2);
    assert_eq!(records[0].date, day(2));
    assert_eq!(records[1].date, day(3));
    assert!(records.iter().all(|r| r.ticker == "A"));
    assert_abs_diff_eq!(records[0].daily_return, 0.10, epsilon = 1e-12);
    assert_abs_diff_eq!(records[1].daily_return, -0.10, epsilon = 1e-12);
}

#[test]
fn record_count_is_priced_dates_minus_one_per_ticker() {
    let table = PriceTable::new(
        days(6),
        vec![
            PriceColumn::new(
                "Close",
                Some("NVDA"),
                vec![Some(10.0), Some(11.0), Some(12.0), Some(11.5), Some(12.5), Some(13.0)],
            ),
            // Listed later: two leading gaps.
            PriceColumn::new(
                "Close",
                Some("NEW"),
                vec![None, None, Some(50.0), Some(51.0), Some(49.0), Some(52.0)],
            ),
        ],
    )
    .unwrap();

    let records = ReturnTransformer::default().transform(&table, &tickers(&["NVDA", "NEW"]));

    let nvda = records.iter().filter(|r| r.ticker == "NVDA").count();
    let new = records.iter().filter(|r| r.ticker == "NEW").collect::<Vec<_>>();
    assert_eq!(nvda, 5);
    assert_eq!(new.len(), 3);
    assert_eq!(new[0].date, day(4));
    assert_abs_diff_eq!(new[0].daily_return, 0.02, epsilon = 1e-12);
}

#[test]
fn single_unkeyed_column_is_normalized_to_the_only_ticker() {
    let table = PriceTable::new(
        days(3),
        vec![
            PriceColumn::from_header("Close", vec![Some(20.0), Some(25.0), Some(20.0)]),
            PriceColumn::from_header("Volume", vec![Some(1.0), Some(2.0), Some(3.0)]),
        ],
    )
    .unwrap();
    assert!(!table.is_ticker_keyed());

    let records = ReturnTransformer::default().transform(&table, &tickers(&["SPY"]));

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.ticker == "SPY"));
    assert_abs_diff_eq!(records[0].daily_return, 0.25, epsilon = 1e-12);
    assert_abs_diff_eq!(records[1].daily_return, -0.2, epsilon = 1e-12);
}

#[test]
fn ticker_without_a_column_yields_no_records() {
    let table = PriceTable::new(
        days(3),
        vec![PriceColumn::from_header(
            "Close_QQQ",
            vec![Some(1.0), Some(2.0), Some(3.0)],
        )],
    )
    .unwrap();

    let records = ReturnTransformer::default().transform(&table, &tickers(&["NVDA", "QQQ"]));

    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.ticker == "QQQ"));
}

#[test]
fn empty_price_table_yields_empty_output() {
    let table = PriceTable::default();
    assert!(table.is_empty());
    let records = ReturnTransformer::default().transform(&table, &tickers(&["NVDA"]));
    assert!(records.is_empty());
}

#[test]
fn gaps_and_zero_prices_are_undefined_not_zero() {
    let returns = simple_returns(&[Some(10.0), None, Some(12.0), Some(0.0), Some(5.0), Some(6.0)]);

    assert_eq!(returns.len(), 6);
    assert_eq!(returns[0], None);
    assert_eq!(returns[1], None);
    assert_eq!(returns[2], None);
    assert_eq!(returns[3], Some(-1.0));
    assert_eq!(returns[4], None);
    assert_abs_diff_eq!(returns[5].unwrap(), 0.2, epsilon = 1e-12);
}

#[test]
fn transformer_reads_the_configured_field() {
    let table = PriceTable::new(
        days(2),
        vec![
            PriceColumn::from_header("Close_A", vec![Some(10.0), Some(20.0)]),
            PriceColumn::from_header("Open_A", vec![Some(10.0), Some(11.0)]),
        ],
    )
    .unwrap();

    let records = ReturnTransformer::with_field("Open").transform(&table, &tickers(&["A"]));

    assert_eq!(records.len(), 1);
    assert_abs_diff_eq!(records[0].daily_return, 0.1, epsilon = 1e-12);
}

#[test]
fn price_table_rejects_structural_violations() {
    let unordered = PriceTable::new(vec![day(2), day(1)], vec![]);
    assert!(matches!(unordered, Err(PriceError::UnorderedDates { .. })));

    let duplicated = PriceTable::new(vec![day(1), day(1)], vec![]);
    assert!(matches!(duplicated, Err(PriceError::UnorderedDates { .. })));

    let short = PriceTable::new(
        days(3),
        vec![PriceColumn::from_header("Close_A", vec![Some(1.0)])],
    );
    assert!(matches!(
        short,
        Err(PriceError::ColumnLength {
            expected: 3,
            found: 1,
            ..
        })
    ));
}

#[test]
fn headers_split_field_and_ticker() {
    let keyed = PriceColumn::from_header("Close_BRK-B", vec![]);
    assert_eq!(keyed.field(), "Close");
    assert_eq!(keyed.ticker(), Some("BRK-B"));
    assert_eq!(keyed.header(), "Close_BRK-B");

    let bare = PriceColumn::from_header("Adj Close", vec![]);
    assert_eq!(bare.field(), "Adj Close");
    assert_eq!(bare.ticker(), None);
}
