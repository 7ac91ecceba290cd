//! Wire format of feed records and normalization into [`Trade`]

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;
use std::str::FromStr;

use crate::domain::trade::Trade;
use crate::shared::errors::FeedError;
use crate::shared::types::TradeId;

/// Unix timestamps above this are taken to be milliseconds.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// JSON number or numeric string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Unsigned(v) => v.to_string(),
            Scalar::Signed(v) => v.to_string(),
            Scalar::Float(v) => v.to_string(),
            Scalar::Text(v) => v,
        }
    }

    fn to_u64(&self) -> Option<u64> {
        match self {
            Scalar::Unsigned(v) => Some(*v),
            Scalar::Signed(_) => None,
            Scalar::Float(v) if v.fract() == 0.0 && *v >= 0.0 && *v <= u64::MAX as f64 => {
                Some(*v as u64)
            }
            Scalar::Float(_) => None,
            Scalar::Text(v) => v.trim().parse().ok(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawTrade {
    id: Option<Scalar>,
    trader: Option<String>,
    #[serde(rename = "tokenIn", alias = "in")]
    token_in: Option<String>,
    #[serde(rename = "tokenOut", alias = "out")]
    token_out: Option<String>,
    #[serde(rename = "amountIn", alias = "amount")]
    amount_in: Option<Scalar>,
    timestamp: Option<Scalar>,
    pool: Option<String>,
}

/// Turns one element of the feed array into a [`Trade`]. `now` stamps records
/// that carry no timestamp.
pub fn normalize(value: Value, now: DateTime<Utc>) -> Result<Trade, FeedError> {
    let raw: RawTrade =
        serde_json::from_value(value).map_err(|e| FeedError::MalformedRecord(e.to_string()))?;

    let id = raw
        .id
        .map(Scalar::into_text)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| malformed("missing id"))?;
    let actor = raw
        .trader
        .filter(|t| !t.is_empty())
        .ok_or_else(|| malformed(format!("trade {}: missing trader", id)))?;
    let input_mint = parse_mint(&id, "tokenIn", raw.token_in)?;
    let output_mint = parse_mint(&id, "tokenOut", raw.token_out)?;
    if input_mint == output_mint {
        return Err(malformed(format!("trade {}: tokenIn equals tokenOut", id)));
    }

    let amount_in = raw
        .amount_in
        .as_ref()
        .and_then(Scalar::to_u64)
        .ok_or_else(|| malformed(format!("trade {}: amountIn is not a base-unit integer", id)))?;
    if amount_in == 0 {
        return Err(malformed(format!("trade {}: amountIn is zero", id)));
    }

    let observed_at = match raw.timestamp {
        Some(ts) => parse_timestamp(&ts)
            .ok_or_else(|| malformed(format!("trade {}: unreadable timestamp", id)))?,
        None => now,
    };
    let pool = raw
        .pool
        .filter(|p| !p.is_empty())
        .map(|p| Pubkey::from_str(&p).map_err(|e| malformed(format!("trade {}: pool: {}", id, e))))
        .transpose()?;

    Ok(Trade {
        id: TradeId::new(id),
        actor,
        input_mint,
        output_mint,
        amount_in,
        observed_at,
        pool,
    })
}

fn malformed(reason: impl Into<String>) -> FeedError {
    FeedError::MalformedRecord(reason.into())
}

fn parse_mint(id: &str, field: &str, value: Option<String>) -> Result<Pubkey, FeedError> {
    let value = value.ok_or_else(|| malformed(format!("trade {}: missing {}", id, field)))?;
    Pubkey::from_str(value.trim())
        .map_err(|e| malformed(format!("trade {}: {} {:?}: {}", id, field, value, e)))
}

fn parse_timestamp(value: &Scalar) -> Option<DateTime<Utc>> {
    let secs_or_millis = match value {
        Scalar::Unsigned(v) => i64::try_from(*v).ok(),
        Scalar::Signed(v) => Some(*v),
        Scalar::Float(v) => Some(*v as i64),
        Scalar::Text(text) => {
            if let Ok(parsed) = DateTime::parse_from_rfc3339(text.trim()) {
                return Some(parsed.with_timezone(&Utc));
            }
            text.trim().parse::<i64>().ok()
        }
    }?;
    if secs_or_millis.abs() >= MILLIS_THRESHOLD {
        Utc.timestamp_millis_opt(secs_or_millis).single()
    } else {
        Utc.timestamp_opt(secs_or_millis, 0).single()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MINT_A: &str = "So11111111111111111111111111111111111111112";
    const MINT_B: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

    #[test]
    fn accepts_canonical_field_names() {
        let now = Utc::now();
        let trade = normalize(
            json!({
                "id": "abc",
                "trader": "X",
                "tokenIn": MINT_A,
                "tokenOut": MINT_B,
                "amountIn": "2500",
                "timestamp": 1_700_000_000,
                "pool": "58oQChx4yWmvKdwLLZzBi4ChoCc2fqCUWBkwMihLYQo2"
            }),
            now,
        )
        .unwrap();

        assert_eq!(trade.id, TradeId::from("abc"));
        assert_eq!(trade.actor, "X");
        assert_eq!(trade.input_mint.to_string(), MINT_A);
        assert_eq!(trade.amount_in, 2_500);
        assert_eq!(trade.observed_at.timestamp(), 1_700_000_000);
        assert!(trade.pool.is_some());
    }

    #[test]
    fn accepts_short_aliases_and_numeric_id() {
        let now = Utc::now();
        let trade = normalize(
            json!({"id": 1, "trader": "X", "in": MINT_A, "out": MINT_B, "amount": 100}),
            now,
        )
        .unwrap();

        assert_eq!(trade.id, TradeId::from("1"));
        assert_eq!(trade.amount_in, 100);
        assert_eq!(trade.observed_at, now);
        assert_eq!(trade.pool, None);
    }

    #[test]
    fn millisecond_and_rfc3339_timestamps() {
        let now = Utc::now();
        let millis = normalize(
            json!({"id": 1, "trader": "X", "in": MINT_A, "out": MINT_B, "amount": 1,
                   "timestamp": 1_700_000_000_123i64}),
            now,
        )
        .unwrap();
        assert_eq!(millis.observed_at.timestamp_millis(), 1_700_000_000_123);

        let text = normalize(
            json!({"id": 1, "trader": "X", "in": MINT_A, "out": MINT_B, "amount": 1,
                   "timestamp": "2024-01-02T03:04:05Z"}),
            now,
        )
        .unwrap();
        assert_eq!(text.observed_at.timestamp(), 1_704_164_645);
    }

    #[test]
    fn rejects_malformed_records() {
        let now = Utc::now();
        let cases = [
            json!({"trader": "X", "in": MINT_A, "out": MINT_B, "amount": 1}),
            json!({"id": 1, "in": MINT_A, "out": MINT_B, "amount": 1}),
            json!({"id": 1, "trader": "X", "in": "A", "out": MINT_B, "amount": 1}),
            json!({"id": 1, "trader": "X", "in": MINT_A, "out": MINT_A, "amount": 1}),
            json!({"id": 1, "trader": "X", "in": MINT_A, "out": MINT_B, "amount": 0}),
            json!({"id": 1, "trader": "X", "in": MINT_A, "out": MINT_B, "amount": -5}),
            json!({"id": 1, "trader": "X", "in": MINT_A, "out": MINT_B, "amount": 1.5}),
            json!({"id": 1, "trader": "X", "in": MINT_A, "out": MINT_B, "amount": "lots"}),
            json!("not an object"),
        ];
        for case in cases {
            let err = normalize(case.clone(), now).unwrap_err();
            assert!(matches!(err, FeedError::MalformedRecord(_)), "{case}");
        }
    }
}
