//! Tagged JSON encoding for map- and set-valued fields.
//!
//! Plain JSON has no way to tell a map from a record or a set from a list, so
//! containers are written with an explicit tag:
//!
//! ```json
//! {"dataType": "Map", "value": [["k1", "v1"], ["k2", "v2"]]}
//! {"dataType": "Set", "value": ["a", "b"]}
//! ```
//!
//! Use the [`tagged_map`] and [`tagged_set`] modules with
//! `#[serde(with = "...")]`.  Dates need no tagging: `chrono` writes them as
//! RFC 3339 strings and parses them back into `DateTime<Utc>`.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Container kind written into the `dataType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Map,
    Set,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TaggedRef<'a, T: ?Sized> {
    data_type: DataType,
    value: &'a T,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Tagged<T> {
    data_type: DataType,
    value: T,
}

pub mod tagged_map {
    use super::*;

    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    pub fn serialize<K, V, S>(map: &HashMap<K, V>, serializer: S) -> Result<S::Ok, S::Error>
    where
        K: Serialize,
        V: Serialize,
        S: Serializer,
    {
        let entries: Vec<(&K, &V)> = map.iter().collect();
        TaggedRef {
            data_type: DataType::Map,
            value: &entries,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, K, V, D>(deserializer: D) -> Result<HashMap<K, V>, D::Error>
    where
        K: Deserialize<'de> + Eq + Hash,
        V: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        let tagged = Tagged::<Vec<(K, V)>>::deserialize(deserializer)?;
        if tagged.data_type != DataType::Map {
            return Err(D::Error::custom(format!(
                "expected dataType Map, found {:?}",
                tagged.data_type
            )));
        }
        Ok(tagged.value.into_iter().collect())
    }
}

pub mod tagged_set {
    use super::*;

    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    /// Either the tagged form or a bare JSON array.  Room id lists written by
    /// older builds are bare arrays.
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum SetRepr<T> {
        Tagged(Tagged<Vec<T>>),
        Plain(Vec<T>),
    }

    pub fn serialize<T, S>(set: &HashSet<T>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        let values: Vec<&T> = set.iter().collect();
        TaggedRef {
            data_type: DataType::Set,
            value: &values,
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<HashSet<T>, D::Error>
    where
        T: Deserialize<'de> + Eq + Hash,
        D: Deserializer<'de>,
    {
        match SetRepr::<T>::deserialize(deserializer)? {
            SetRepr::Tagged(tagged) if tagged.data_type == DataType::Set => {
                Ok(tagged.value.into_iter().collect())
            }
            SetRepr::Tagged(tagged) => Err(D::Error::custom(format!(
                "expected dataType Set, found {:?}",
                tagged.data_type
            ))),
            SetRepr::Plain(values) => Ok(values.into_iter().collect()),
        }
    }
}

/// Encode a value for the key/value store.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a stored value.
pub fn decode<T: DeserializeOwned>(raw: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(raw)?)
}

/// Encode a bare set (e.g. the known-room-id list) in its tagged form.
pub fn encode_set<T: Serialize>(set: &HashSet<T>) -> Result<String, CodecError> {
    let value = tagged_set::serialize(set, serde_json::value::Serializer)?;
    Ok(value.to_string())
}

/// Decode a bare set written by [`encode_set`] or as a plain JSON array.
pub fn decode_set<T: DeserializeOwned + Eq + Hash>(raw: &str) -> Result<HashSet<T>, CodecError> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    Ok(tagged_set::deserialize(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{DateTime, TimeZone, Utc};
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Sample {
        #[serde(with = "tagged_map")]
        index: HashMap<String, String>,
        #[serde(with = "tagged_set")]
        members: HashSet<String>,
        date: DateTime<Utc>,
    }

    fn sample() -> Sample {
        Sample {
            index: HashMap::from([
                ("$e1".to_string(), "!r1:example.org".to_string()),
                ("$e2".to_string(), "!r2:example.org".to_string()),
            ]),
            members: HashSet::from(["a".to_string(), "b".to_string()]),
            date: Utc.with_ymd_and_hms(2024, 5, 17, 19, 30, 0).unwrap(),
        }
    }

    #[test]
    fn map_and_set_survive_storage() {
        let original = sample();
        let raw = encode(&original).unwrap();
        let decoded: Sample = decode(&raw).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn containers_are_written_tagged() {
        let raw = encode(&sample()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();

        assert_eq!(value["index"]["dataType"], "Map");
        assert!(value["index"]["value"].is_array());
        assert_eq!(value["members"]["dataType"], "Set");
        assert_eq!(value["members"]["value"].as_array().unwrap().len(), 2);
        assert_eq!(value["date"], "2024-05-17T19:30:00Z");
    }

    #[test]
    fn plain_object_is_not_accepted_as_map() {
        let raw = r#"{"index":{"$e1":"!r1"},"members":[],"date":"2024-05-17T19:30:00Z"}"#;
        assert!(decode::<Sample>(raw).is_err());
    }

    #[test]
    fn set_tag_mismatch_is_rejected() {
        let raw = r#"{"index":{"dataType":"Map","value":[]},"members":{"dataType":"Map","value":[]},"date":"2024-05-17T19:30:00Z"}"#;
        assert!(decode::<Sample>(raw).is_err());
    }

    #[test]
    fn bare_set_accepts_legacy_array() {
        let tagged: HashSet<String> =
            decode_set(&encode_set(&HashSet::from(["!a:x".to_string()])).unwrap()).unwrap();
        let legacy: HashSet<String> = decode_set(r#"["!a:x"]"#).unwrap();
        assert_eq!(tagged, legacy);
    }
}
