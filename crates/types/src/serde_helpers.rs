//! String (base58) serde for `Pubkey` fields
//!
//! The ledger and the holder API both exchange addresses as base58 strings.

use serde::{Deserialize, Deserializer, Serializer};
use solana_program::pubkey::Pubkey;
use std::str::FromStr;

pub mod pubkey_serde {
    use super::*;

    pub fn serialize<S>(pubkey: &Pubkey, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&pubkey.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Pubkey, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Pubkey::from_str(&s).map_err(serde::de::Error::custom)
    }
}

pub mod option_pubkey_serde {
    use super::*;

    pub fn serialize<S>(pubkey: &Option<Pubkey>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match pubkey {
            Some(key) => serializer.serialize_some(&key.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Pubkey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s: Option<String> = Option::deserialize(deserializer)?;
        match s {
            Some(s) if !s.is_empty() => Pubkey::from_str(&s)
                .map(Some)
                .map_err(serde::de::Error::custom),
            _ => Ok(None),
        }
    }
}

pub mod pubkey_vec_serde {
    use super::*;
    use serde::ser::SerializeSeq;

    pub fn serialize<S>(pubkeys: &[Pubkey], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(pubkeys.len()))?;
        for key in pubkeys {
            seq.serialize_element(&key.to_string())?;
        }
        seq.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<Pubkey>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Vec<String> = Vec::deserialize(deserializer)?;
        raw.iter()
            .map(|s| Pubkey::from_str(s).map_err(serde::de::Error::custom))
            .collect()
    }
}

/// Raw token amounts arrive as JSON numbers or decimal strings depending on
/// the indexer; both are accepted and fractional parts are floored.
pub mod amount_serde {
    use super::*;
    use serde_json::Value;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<u64, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Number(n) => {
                if let Some(v) = n.as_u64() {
                    Ok(v)
                } else if let Some(f) = n.as_f64() {
                    if f.is_finite() && f >= 0.0 {
                        Ok(f.floor() as u64)
                    } else {
                        Ok(0)
                    }
                } else {
                    Ok(0)
                }
            }
            Value::String(s) => s
                .parse::<u64>()
                .or_else(|_| s.parse::<f64>().map(|f| f.max(0.0).floor() as u64))
                .map_err(serde::de::Error::custom),
            Value::Null => Ok(0),
            other => Err(serde::de::Error::custom(format!(
                "unsupported amount value: {}",
                other
            ))),
        }
    }
}
