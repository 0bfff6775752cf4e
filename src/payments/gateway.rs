/// payment gateway confirmation
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, Secret};
use serde::Deserialize;
use sha2::Sha256;
use std::env;

use crate::decimal::Money;
use crate::errors::{FeeError, Result};

type HmacSha256 = Hmac<Sha256>;

pub const GATEWAY_NAME: &str = "razorpay";

/// gateway credentials
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
}

impl GatewayConfig {
    pub fn new(key_id: impl Into<String>, key_secret: &str, webhook_secret: &str) -> Self {
        Self {
            key_id: key_id.into(),
            key_secret: Secret::new(key_secret.to_string()),
            webhook_secret: Secret::new(webhook_secret.to_string()),
        }
    }

    /// read `RAZORPAY_KEY_ID`, `RAZORPAY_KEY_SECRET` and
    /// `RAZORPAY_WEBHOOK_SECRET`, loading `.env` first if present
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |key: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| FeeError::InvalidConfiguration {
                    message: format!("{} must be set", key),
                })
        };

        Ok(Self {
            key_id: required("RAZORPAY_KEY_ID")?,
            key_secret: Secret::new(required("RAZORPAY_KEY_SECRET")?),
            webhook_secret: Secret::new(required("RAZORPAY_WEBHOOK_SECRET")?),
        })
    }
}

/// a gateway payment whose signature has been checked
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedPayment {
    order_id: String,
    payment_id: String,
    amount: Money,
}

impl VerifiedPayment {
    pub fn order_id(&self) -> &str {
        &self.order_id
    }

    pub fn payment_id(&self) -> &str {
        &self.payment_id
    }

    pub fn amount(&self) -> Money {
        self.amount
    }
}

/// Checks gateway signatures: `HMAC-SHA256(order_id|payment_id, key_secret)`
/// for checkouts and `HMAC-SHA256(raw_body, webhook_secret)` for webhooks,
/// both hex encoded.
#[derive(Clone, Debug)]
pub struct SignatureVerifier {
    config: GatewayConfig,
}

impl SignatureVerifier {
    pub fn new(config: GatewayConfig) -> Self {
        Self { config }
    }

    /// verify a checkout confirmation; `amount_paise` is the captured amount
    pub fn verify_payment(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
        amount_paise: u64,
    ) -> Result<VerifiedPayment> {
        let payload = format!("{}|{}", order_id, payment_id);
        let valid = verify_hex(
            payload.as_bytes(),
            signature,
            self.config.key_secret.expose_secret(),
        );

        if !valid {
            tracing::warn!(
                order_id = %order_id,
                payment_id = %payment_id,
                "payment signature verification failed"
            );
            return Err(FeeError::InvalidSignature {
                order_id: order_id.to_string(),
            });
        }

        tracing::info!(
            order_id = %order_id,
            payment_id = %payment_id,
            "payment signature verified"
        );

        Ok(VerifiedPayment {
            order_id: order_id.to_string(),
            payment_id: payment_id.to_string(),
            amount: paise_to_money(amount_paise)?,
        })
    }

    /// verify a webhook body and parse its event
    pub fn verify_webhook(&self, body: &str, signature: &str) -> Result<WebhookEvent> {
        if !verify_hex(
            body.as_bytes(),
            signature,
            self.config.webhook_secret.expose_secret(),
        ) {
            tracing::warn!("webhook signature verification failed");
            return Err(FeeError::InvalidSignature {
                order_id: "webhook".to_string(),
            });
        }
        WebhookEvent::parse(body)
    }
}

/// hex HMAC-SHA256 of `payload` under `secret`
pub fn sign(payload: &[u8], secret: &str) -> String {
    // hmac accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

fn verify_hex(payload: &[u8], signature: &str, secret: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

fn paise_to_money(amount_paise: u64) -> Result<Money> {
    i64::try_from(amount_paise)
        .map(Money::from_minor)
        .map_err(|_| FeeError::InvalidWebhookPayload {
            message: format!("amount out of range: {}", amount_paise),
        })
}

/// webhook event types the ledger reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEventKind {
    Captured,
    Failed,
    Authorized,
    Other(String),
}

impl WebhookEventKind {
    fn from_name(name: &str) -> Self {
        match name {
            "payment.captured" => WebhookEventKind::Captured,
            "payment.failed" => WebhookEventKind::Failed,
            "payment.authorized" => WebhookEventKind::Authorized,
            other => WebhookEventKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    payload: EnvelopePayload,
}

#[derive(Debug, Deserialize, Default)]
struct EnvelopePayload {
    payment: Option<EntityWrapper>,
}

#[derive(Debug, Deserialize)]
struct EntityWrapper {
    entity: PaymentEntity,
}

/// payment entity carried by a webhook
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    /// smallest currency unit
    pub amount: u64,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub status: String,
    pub order_id: Option<String>,
    pub method: Option<String>,
}

/// a parsed webhook
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookEvent {
    pub kind: WebhookEventKind,
    pub payment: Option<PaymentEntity>,
}

impl WebhookEvent {
    pub fn parse(body: &str) -> Result<Self> {
        let envelope: Envelope =
            serde_json::from_str(body).map_err(|e| FeeError::InvalidWebhookPayload {
                message: e.to_string(),
            })?;

        let kind = WebhookEventKind::from_name(&envelope.event);
        tracing::debug!(event = %envelope.event, "webhook received");

        Ok(Self {
            kind,
            payment: envelope.payload.payment.map(|w| w.entity),
        })
    }

    /// A captured payment from a verified webhook, ready for the ledger.
    /// Other event kinds yield `None`.
    pub fn captured_payment(&self) -> Result<Option<VerifiedPayment>> {
        if self.kind != WebhookEventKind::Captured {
            return Ok(None);
        }
        let payment = self.payment.as_ref().ok_or_else(|| FeeError::InvalidWebhookPayload {
            message: "payment.captured without a payment entity".to_string(),
        })?;

        Ok(Some(VerifiedPayment {
            order_id: payment.order_id.clone().unwrap_or_default(),
            payment_id: payment.id.clone(),
            amount: paise_to_money(payment.amount)?,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(GatewayConfig::new("rzp_test_123", "test_secret", "webhook_secret"))
    }

    const CAPTURED: &str = r#"{
        "entity": "event",
        "event": "payment.captured",
        "payload": { "payment": { "entity": {
            "id": "pay_29QQoUBi66xm2f", "amount": 120000, "currency": "INR",
            "status": "captured", "order_id": "order_9A33XWu170gUtm", "method": "upi"
        } } }
    }"#;

    #[test]
    fn test_payment_signature_round_trip() {
        let v = verifier();
        let signature = sign(b"order_9A33XWu170gUtm|pay_29QQoUBi66xm2f", "test_secret");

        let verified = v
            .verify_payment("order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f", &signature, 50_000)
            .unwrap();
        assert_eq!(verified.payment_id(), "pay_29QQoUBi66xm2f");
        assert_eq!(verified.amount(), Money::from_major(500));
    }

    #[test]
    fn test_tampered_signature_rejected() {
        let v = verifier();
        let signature = sign(b"order_1|pay_1", "test_secret");

        let err = v.verify_payment("order_1", "pay_2", &signature, 100).unwrap_err();
        assert!(matches!(err, FeeError::InvalidSignature { .. }));

        assert!(v.verify_payment("order_1", "pay_1", "not-hex", 100).is_err());

        let wrong_key = sign(b"order_1|pay_1", "webhook_secret");
        assert!(v.verify_payment("order_1", "pay_1", &wrong_key, 100).is_err());
    }

    #[test]
    fn test_webhook_dispatch() {
        let v = verifier();
        let signature = sign(CAPTURED.as_bytes(), "webhook_secret");

        let event = v.verify_webhook(CAPTURED, &signature).unwrap();
        assert_eq!(event.kind, WebhookEventKind::Captured);

        let payment = event.captured_payment().unwrap().unwrap();
        assert_eq!(payment.order_id(), "order_9A33XWu170gUtm");
        assert_eq!(payment.amount(), Money::from_major(1200));

        assert!(v.verify_webhook(CAPTURED, &sign(CAPTURED.as_bytes(), "test_secret")).is_err());
    }

    #[test]
    fn test_webhook_kinds() {
        let failed = WebhookEvent::parse(r#"{"event": "payment.failed"}"#).unwrap();
        assert_eq!(failed.kind, WebhookEventKind::Failed);
        assert_eq!(failed.captured_payment().unwrap(), None);

        let refund = WebhookEvent::parse(r#"{"event": "refund.created", "payload": {}}"#).unwrap();
        assert_eq!(refund.kind, WebhookEventKind::Other("refund.created".to_string()));

        let bare = WebhookEvent::parse(r#"{"event": "payment.captured"}"#).unwrap();
        assert!(bare.captured_payment().is_err());

        assert!(matches!(
            WebhookEvent::parse("{"),
            Err(FeeError::InvalidWebhookPayload { .. })
        ));
    }

    #[test]
    fn test_config_requires_all_keys() {
        let vars = |key: &str| match key {
            "RAZORPAY_KEY_ID" => Some("rzp_test_123".to_string()),
            "RAZORPAY_KEY_SECRET" => Some("s".to_string()),
            _ => None,
        };
        let err = GatewayConfig::from_lookup(vars).unwrap_err();
        assert_eq!(
            err,
            FeeError::InvalidConfiguration {
                message: "RAZORPAY_WEBHOOK_SECRET must be set".to_string()
            }
        );

        let all = |key: &str| Some(format!("{}-value", key));
        let config = GatewayConfig::from_lookup(all).unwrap();
        assert_eq!(config.key_id, "RAZORPAY_KEY_ID-value");
        assert_eq!(config.key_secret.expose_secret(), "RAZORPAY_KEY_SECRET-value");
    }
}
