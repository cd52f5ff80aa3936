//! Webhook signature verification.
//!
//! Every delivery carries a `Stripe-Signature` header of the form `t=1727780000,v1=5257a8...,v1=...`. Each `v1` value
//! is the hex-encoded HMAC-SHA256 of `"{t}.{raw body}"`, keyed with the endpoint's signing secret. More than one `v1`
//! entry is present while a secret is being rolled.
use hmac::{Hmac, Mac};
use log::*;
use sha2::Sha256;

use crate::{data_objects::Event, StripeApiError};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    pub timestamp: i64,
    pub signatures: Vec<String>,
}

impl SignatureHeader {
    pub fn parse(header: &str) -> Result<Self, StripeApiError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                continue;
            };
            match key {
                "t" => {
                    let t = value
                        .parse::<i64>()
                        .map_err(|e| StripeApiError::MissingSignature(format!("Invalid timestamp. {e}")))?;
                    timestamp = Some(t);
                },
                "v1" => signatures.push(value.to_string()),
                _ => {},
            }
        }
        let timestamp = timestamp.ok_or_else(|| StripeApiError::MissingSignature("No timestamp".into()))?;
        if signatures.is_empty() {
            return Err(StripeApiError::MissingSignature("No v1 signature".into()));
        }
        Ok(Self { timestamp, signatures })
    }
}

fn mac_for(secret: &str, timestamp: i64, payload: &[u8]) -> Result<HmacSha256, StripeApiError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| StripeApiError::Initialization(format!("Invalid signing secret. {e}")))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    Ok(mac)
}

/// The hex signature the provider would send for this payload. Useful for building test deliveries.
pub fn compute_signature(secret: &str, timestamp: i64, payload: &[u8]) -> Result<String, StripeApiError> {
    let mac = mac_for(secret, timestamp, payload)?;
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Checks the signature header against the raw body. `now` is a unix timestamp in seconds.
pub fn verify_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<(), StripeApiError> {
    if secret.is_empty() {
        return Err(StripeApiError::Initialization("No webhook signing secret is configured".into()));
    }
    let header = SignatureHeader::parse(header)?;
    let mac = mac_for(secret, header.timestamp, payload)?;
    let valid = header
        .signatures
        .iter()
        .filter_map(|sig| hex::decode(sig).ok())
        .any(|sig| mac.clone().verify_slice(&sig).is_ok());
    if !valid {
        warn!("🔐️ Webhook signature mismatch");
        return Err(StripeApiError::InvalidSignature);
    }
    let age = now - header.timestamp;
    if age.abs() > tolerance_secs {
        warn!("🔐️ Webhook signature is {age}s old");
        return Err(StripeApiError::SignatureExpired { age });
    }
    trace!("🔐️ Webhook signature verified");
    Ok(())
}

/// Verifies the delivery and parses the event it carries.
pub fn construct_event(
    payload: &[u8],
    header: &str,
    secret: &str,
    tolerance_secs: i64,
    now: i64,
) -> Result<Event, StripeApiError> {
    verify_signature(payload, header, secret, tolerance_secs, now)?;
    serde_json::from_slice::<Event>(payload).map_err(|e| StripeApiError::JsonError(e.to_string()))
}
