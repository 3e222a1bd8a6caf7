//! Swap aggregator client (Jupiter v6 quote/swap API)

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use solana_sdk::{pubkey::Pubkey, transaction::VersionedTransaction};
use std::str::FromStr;
use tracing::{debug, info};

use crate::{SdkError, SdkResult};

/// Exact-in quote returned by the aggregator
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub input_mint: Pubkey,
    pub output_mint: Pubkey,
    pub in_amount: u64,
    /// Planning estimate only; the realized amount is read from balances
    pub out_amount: u64,
    /// Minimum output after slippage
    pub other_amount_threshold: u64,
    pub slippage_bps: u16,
    /// Untouched response body, posted back when requesting the swap
    pub raw: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteFields {
    input_mint: String,
    output_mint: String,
    in_amount: String,
    out_amount: String,
    other_amount_threshold: String,
    #[serde(default)]
    slippage_bps: u16,
}

impl Quote {
    pub fn from_json(raw: Value) -> SdkResult<Self> {
        if let Some(error) = raw.get("error").and_then(Value::as_str) {
            return Err(SdkError::Http(format!("quote rejected: {}", error)));
        }

        let fields: QuoteFields = serde_json::from_value(raw.clone())
            .map_err(|e| SdkError::Deserialization(format!("quote: {}", e)))?;

        let pubkey = |s: &str| {
            Pubkey::from_str(s).map_err(|e| SdkError::Deserialization(format!("quote mint {}: {}", s, e)))
        };
        let amount = |s: &str| {
            s.parse::<u64>()
                .map_err(|e| SdkError::Deserialization(format!("quote amount {}: {}", s, e)))
        };

        Ok(Self {
            input_mint: pubkey(&fields.input_mint)?,
            output_mint: pubkey(&fields.output_mint)?,
            in_amount: amount(&fields.in_amount)?,
            out_amount: amount(&fields.out_amount)?,
            other_amount_threshold: amount(&fields.other_amount_threshold)?,
            slippage_bps: fields.slippage_bps,
            raw,
        })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SwapRequest<'a> {
    quote_response: &'a Value,
    user_public_key: String,
    #[serde(rename = "wrapAndUnwrapSol")]
    wrap_and_unwrap_sol: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    swap_transaction: String,
}

/// Decode the base64, bincode-encoded transaction returned by `/swap`
pub fn decode_swap_transaction(encoded: &str) -> SdkResult<VersionedTransaction> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| SdkError::Deserialization(format!("swap transaction base64: {}", e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| SdkError::Deserialization(format!("swap transaction: {}", e)))
}

/// Pricing source that returns ready-to-sign swap transactions
#[async_trait]
pub trait SwapAggregator: Send + Sync {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
        user: &Pubkey,
    ) -> SdkResult<Quote>;

    /// Unsigned transaction executing `quote` for `user`
    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> SdkResult<VersionedTransaction>;
}

pub struct JupiterClient {
    client: reqwest::Client,
    base_url: String,
}

impl JupiterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SwapAggregator for JupiterClient {
    async fn quote(
        &self,
        input_mint: &Pubkey,
        output_mint: &Pubkey,
        amount: u64,
        slippage_bps: u16,
        user: &Pubkey,
    ) -> SdkResult<Quote> {
        let url = format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}&userPublicKey={}",
            self.base_url, input_mint, output_mint, amount, slippage_bps, user
        );
        debug!("Requesting quote: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if body.contains("COULD_NOT_FIND_ANY_ROUTE") || body.contains("NO_ROUTES_FOUND") {
                return Err(SdkError::NoRoute {
                    input: *input_mint,
                    output: *output_mint,
                });
            }
            return Err(SdkError::Http(format!("quote API error {}: {}", status, body)));
        }

        let raw: Value = response
            .json()
            .await
            .map_err(|e| SdkError::Deserialization(format!("quote body: {}", e)))?;
        let quote = Quote::from_json(raw)?;

        info!(
            "Quote {} {} -> {} {} (min {})",
            quote.in_amount, input_mint, quote.out_amount, output_mint, quote.other_amount_threshold
        );
        Ok(quote)
    }

    async fn swap_transaction(&self, quote: &Quote, user: &Pubkey) -> SdkResult<VersionedTransaction> {
        let request = SwapRequest {
            quote_response: &quote.raw,
            user_public_key: user.to_string(),
            wrap_and_unwrap_sol: true,
        };

        let response = self
            .client
            .post(format!("{}/swap", self.base_url))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SdkError::Http(format!("swap API error: {}", response.status())));
        }

        let body: SwapResponse = response
            .json()
            .await
            .map_err(|e| SdkError::Deserialization(format!("swap body: {}", e)))?;
        decode_swap_transaction(&body.swap_transaction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_server::serve;
    use axum::{
        http::StatusCode,
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use solana_sdk::{
        hash::Hash,
        message::{Message, VersionedMessage},
        signature::Keypair,
        signer::Signer,
        system_instruction,
    };

    #[test]
    fn test_quote_from_json() {
        let input = Pubkey::new_unique();
        let output = Pubkey::new_unique();
        let raw = json!({
            "inputMint": input.to_string(),
            "outputMint": output.to_string(),
            "inAmount": "1000",
            "outAmount": "950",
            "otherAmountThreshold": "945",
            "slippageBps": 50,
            "routePlan": []
        });

        let quote = Quote::from_json(raw.clone()).unwrap();
        assert_eq!(quote.input_mint, input);
        assert_eq!(quote.out_amount, 950);
        assert_eq!(quote.other_amount_threshold, 945);
        assert_eq!(quote.slippage_bps, 50);
        assert_eq!(quote.raw, raw);
    }

    #[test]
    fn test_malformed_quote_is_an_error() {
        assert!(Quote::from_json(json!({"error": "Could not find any route"})).is_err());
        assert!(Quote::from_json(json!({"inputMint": "not-a-key"})).is_err());
    }

    fn quote_body(input: &Pubkey, output: &Pubkey) -> Value {
        json!({
            "inputMint": input.to_string(),
            "outputMint": output.to_string(),
            "inAmount": "1000",
            "outAmount": "950",
            "otherAmountThreshold": "945",
            "slippageBps": 50
        })
    }

    fn encoded_transfer(payer: &Pubkey) -> String {
        let ix = system_instruction::transfer(payer, &Pubkey::new_unique(), 1);
        let tx = VersionedTransaction {
            signatures: vec![Default::default()],
            message: VersionedMessage::Legacy(Message::new(&[ix], Some(payer))),
        };
        STANDARD.encode(bincode::serialize(&tx).unwrap())
    }

    #[tokio::test]
    async fn test_quote_then_swap_over_http() {
        let (input, output, user) = (Pubkey::new_unique(), Pubkey::new_unique(), Pubkey::new_unique());
        let quote = quote_body(&input, &output);
        let swap = json!({"swapTransaction": encoded_transfer(&user)});
        let app = Router::new()
            .route("/quote", get(move || async move { Json(quote) }))
            .route("/swap", post(move || async move { Json(swap) }));
        let client = JupiterClient::new(serve(app).await);

        let quote = client.quote(&input, &output, 1000, 50, &user).await.unwrap();
        assert_eq!(quote.out_amount, 950);
        let tx = client.swap_transaction(&quote, &user).await.unwrap();
        assert_eq!(tx.message.static_account_keys()[0], user);
    }

    #[tokio::test]
    async fn test_no_route_response() {
        let app = Router::new().route(
            "/quote",
            get(|| async { (StatusCode::BAD_REQUEST, "COULD_NOT_FIND_ANY_ROUTE") }),
        );
        let client = JupiterClient::new(serve(app).await);

        let err = client
            .quote(&Pubkey::new_unique(), &Pubkey::new_unique(), 1, 50, &Pubkey::new_unique())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::NoRoute { .. }));
    }

    #[tokio::test]
    async fn test_swap_server_error_is_a_hard_failure() {
        let app = Router::new().route("/swap", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }));
        let client = JupiterClient::new(serve(app).await);
        let quote = Quote::from_json(quote_body(&Pubkey::new_unique(), &Pubkey::new_unique())).unwrap();

        let err = client
            .swap_transaction(&quote, &Pubkey::new_unique())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Http(_)));
    }

    #[tokio::test]
    async fn test_malformed_swap_body_is_a_hard_failure() {
        let app = Router::new().route(
            "/swap",
            post(|| async { Json(json!({"transaction": "missing the expected field"})) }),
        );
        let client = JupiterClient::new(serve(app).await);
        let quote = Quote::from_json(quote_body(&Pubkey::new_unique(), &Pubkey::new_unique())).unwrap();

        let err = client
            .swap_transaction(&quote, &Pubkey::new_unique())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Deserialization(_)));
    }

    #[test]
    fn test_decode_swap_transaction() {
        let payer = Keypair::new();
        let ix = system_instruction::transfer(&payer.pubkey(), &Pubkey::new_unique(), 1);
        let message = Message::new_with_blockhash(&[ix], Some(&payer.pubkey()), &Hash::default());
        let tx = VersionedTransaction {
            signatures: vec![Default::default()],
            message: VersionedMessage::Legacy(message),
        };
        let encoded = STANDARD.encode(bincode::serialize(&tx).unwrap());

        let decoded = decode_swap_transaction(&encoded).unwrap();
        assert_eq!(decoded.message.static_account_keys()[0], payer.pubkey());
        assert!(decode_swap_transaction("%%%").is_err());
    }
}
