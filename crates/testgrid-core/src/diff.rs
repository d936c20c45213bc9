//! Collection mismatch rendering.
//!
//! When a replacement worker reports a collection that differs from the
//! dead worker's recorded one, the hand-off is refused and this report
//! is handed to the diagnostics sink.

use std::fmt::Write;

/// Render a line-based report of the difference between two collections.
///
/// `expected` is the dead worker's recorded collection, `actual` the
/// replacement's. Positional mismatches are shown as `-`/`+` pairs;
/// length overhang is listed one side at a time.
pub fn collection_diff_report(
    expected: &[String],
    actual: &[String],
    expected_id: &str,
    actual_id: &str,
) -> String {
    let mut out = format!(
        "different tests were collected between {expected_id} and {actual_id}\n\
         --- {expected_id}\n\
         +++ {actual_id}\n"
    );
    let common = expected.len().min(actual.len());
    for index in 0..common {
        if expected[index] != actual[index] {
            let _ = writeln!(out, "@ index {index}");
            let _ = writeln!(out, "-{}", expected[index]);
            let _ = writeln!(out, "+{}", actual[index]);
        }
    }
    for item in &expected[common..] {
        let _ = writeln!(out, "-{item}");
    }
    for item in &actual[common..] {
        let _ = writeln!(out, "+{item}");
    }
    out
}
