//! Lenient field decoders.
//!
//! The streaming API sends most numbers as JSON strings, sometimes as bare
//! numbers, and occasionally as an empty string for "not set".

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::de::{Deserialize, Deserializer, Error as _};
use serde_json::Value;

fn parse_decimal(text: &str) -> Option<Decimal> {
    let text = text.trim();
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}

fn decimal_from_value<E: serde::de::Error>(value: Value) -> Result<Option<Decimal>, E> {
    match value {
        Value::Null => Ok(None),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_decimal(&s)
            .map(Some)
            .ok_or_else(|| E::custom(format!("invalid decimal: {:?}", s))),
        Value::Number(n) => parse_decimal(&n.to_string())
            .map(Some)
            .ok_or_else(|| E::custom(format!("invalid decimal: {}", n))),
        other => Err(E::custom(format!("expected decimal, found {}", other))),
    }
}

pub(crate) mod decimal {
    use super::*;

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        decimal_from_value(Value::deserialize(deserializer)?)?
            .ok_or_else(|| D::Error::custom("missing decimal value"))
    }
}

pub(crate) mod opt_decimal {
    use super::*;

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            Some(value) => decimal_from_value(value),
            None => Ok(None),
        }
    }
}

pub(crate) mod opt_u64 {
    use super::*;

    pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<Value>::deserialize(deserializer)? {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
            Some(Value::String(s)) => s
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| D::Error::custom(format!("invalid integer: {:?}", s))),
            Some(Value::Number(n)) => n
                .as_u64()
                .map(Some)
                .ok_or_else(|| D::Error::custom(format!("invalid integer: {}", n))),
            Some(other) => Err(D::Error::custom(format!("expected integer, found {}", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    struct Sample {
        #[serde(deserialize_with = "decimal::deserialize")]
        price: Decimal,
        #[serde(default, deserialize_with = "opt_decimal::deserialize")]
        stop: Option<Decimal>,
        #[serde(default, deserialize_with = "opt_u64::deserialize")]
        volume: Option<u64>,
    }

    #[test]
    fn test_strings_and_numbers() {
        let sample: Sample =
            serde_json::from_str(r#"{"price":"218.32","stop":12.5,"volume":"42311777"}"#).unwrap();
        assert_eq!(sample.price, Decimal::from_str("218.32").unwrap());
        assert_eq!(sample.stop, Some(Decimal::from_str("12.5").unwrap()));
        assert_eq!(sample.volume, Some(42_311_777));
    }

    #[test]
    fn test_empty_and_missing_are_none() {
        let sample: Sample = serde_json::from_str(r#"{"price":1,"stop":""}"#).unwrap();
        assert_eq!(sample.price, Decimal::ONE);
        assert!(sample.stop.is_none());
        assert!(sample.volume.is_none());
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(serde_json::from_str::<Sample>(r#"{"price":"abc"}"#).is_err());
        assert!(serde_json::from_str::<Sample>(r#"{"price":""}"#).is_err());
        assert!(serde_json::from_str::<Sample>(r#"{"price":1,"volume":-3}"#).is_err());
    }
}
