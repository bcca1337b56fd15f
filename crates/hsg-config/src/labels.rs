use std::collections::BTreeMap;

use crate::{Error, Result};

/// Parse a `key=value,key=value` label string.
///
/// Empty segments are skipped, so trailing or doubled commas are fine. Any
/// other segment must split on `=` into exactly two non-empty parts. Later
/// duplicates overwrite earlier ones.
pub fn parse_labels(raw: &str) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for segment in raw.split(',') {
        if segment.trim().is_empty() {
            continue;
        }
        let parts: Vec<&str> = segment.split('=').map(str::trim).collect();
        match parts.as_slice() {
            [key, value] if !key.is_empty() && !value.is_empty() => {
                labels.insert(key.to_string(), value.to_string());
            }
            _ => return Err(Error::LabelParse(raw.to_string())),
        }
    }
    Ok(labels)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expect_error(raw: &str) {
        match parse_labels(raw) {
            Err(Error::LabelParse(original)) => assert_eq!(original, raw),
            other => panic!("expected label error for {raw:?}, got {other:?}"),
        }
    }

    #[test]
    fn trailing_and_doubled_commas() {
        let labels = parse_labels(",,key1=value1,,,keyN=valueN,key2=value2,").unwrap();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels["key1"], "value1");
        assert_eq!(labels["keyN"], "valueN");
        assert_eq!(labels["key2"], "value2");
    }

    #[test]
    fn empty_input_is_empty_map() {
        assert!(parse_labels("").unwrap().is_empty());
    }

    #[test]
    fn whitespace_is_trimmed() {
        let labels = parse_labels(" env = prod , team=infra ").unwrap();
        assert_eq!(labels["env"], "prod");
        assert_eq!(labels["team"], "infra");
    }

    #[test]
    fn duplicate_keys_overwrite() {
        let labels = parse_labels("env=dev,env=prod").unwrap();
        assert_eq!(labels.len(), 1);
        assert_eq!(labels["env"], "prod");
    }

    #[test]
    fn malformed_pairs() {
        expect_error("key1=value1,key2==value2");
        expect_error("asdasdasdad");
        expect_error("key1=value1,key2=value2=asdada");
        expect_error("=value");
        expect_error("key=");
        expect_error("key= ,other=1");
    }

    mod proptest_labels {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Well-formed label strings come back as exactly the map they were built from
            #[test]
            fn round_trips(map in prop::collection::btree_map("[a-z][a-z0-9_.-]{0,15}", "[A-Za-z0-9_.-]{1,16}", 0..8)) {
                let raw = map
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(",");
                prop_assert_eq!(parse_labels(&raw).unwrap(), map);
            }

            /// A pair without `=` anywhere in the string always fails and names the input
            #[test]
            fn missing_separator_fails(prefix in "([a-z]{1,5}=[a-z]{1,5},){0,3}", bare in "[a-z]{1,10}") {
                let raw = format!("{prefix}{bare}");
                match parse_labels(&raw) {
                    Err(Error::LabelParse(original)) => prop_assert_eq!(original, raw),
                    other => prop_assert!(false, "unexpected result {:?}", other),
                }
            }

            /// Extra `=` signs are rejected
            #[test]
            fn extra_separator_fails(key in "[a-z]{1,5}", a in "[a-z]{0,5}", b in "[a-z]{0,5}") {
                let raw = format!("{key}={a}={b}");
                prop_assert!(matches!(parse_labels(&raw), Err(Error::LabelParse(_))));
            }
        }
    }
}
