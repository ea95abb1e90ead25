//! PayPal Instant Payment Notification handling.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use renthub_db::{Entity, Filter, TransactionOptions};
use serde::{Deserialize, Serialize};

use crate::ids::{PaymentId, UserId};
use crate::money::{Currency, Money};
use crate::{MarketError, Marketplace};

/// Payment status PayPal reports for a settled payment.
pub const STATUS_COMPLETED: &str = "Completed";

const REQUIRED_FIELDS: [&str; 10] = [
    "receiver_email",
    "txn_id",
    "txn_type",
    "payment_type",
    "payment_status",
    "mc_gross",
    "mc_currency",
    "payer_email",
    "first_name",
    "last_name",
];

/// A parsed payment notification.
#[derive(Debug, Clone, PartialEq)]
pub struct IpnMessage {
    pub receiver_email: String,
    pub txn_id: String,
    pub txn_type: String,
    pub payment_type: String,
    pub payment_status: String,
    pub amount: Money,
    pub payer_email: String,
    pub first_name: String,
    pub last_name: String,
    /// Free-form pass-through field; carries the buyer's user id.
    pub custom: Option<String>,
    params: BTreeMap<String, String>,
}

impl IpnMessage {
    /// Parse the notification's form parameters.
    pub fn from_params(params: BTreeMap<String, String>) -> Result<Self, MarketError> {
        if let Some(missing) = REQUIRED_FIELDS.iter().find(|f| !params.contains_key(**f)) {
            return Err(MarketError::Validation(format!(
                "payment notification is missing {}",
                missing
            )));
        }
        let field = |name: &str| params.get(name).cloned().unwrap_or_default();

        let currency_code = field("mc_currency");
        let currency = Currency::from_code(&currency_code).ok_or_else(|| {
            MarketError::Validation(format!("unsupported currency: {}", currency_code))
        })?;
        let amount = Money::parse(&field("mc_gross"), currency)?;

        Ok(Self {
            receiver_email: field("receiver_email"),
            txn_id: field("txn_id"),
            txn_type: field("txn_type"),
            payment_type: field("payment_type"),
            payment_status: field("payment_status"),
            amount,
            payer_email: field("payer_email"),
            first_name: field("first_name"),
            last_name: field("last_name"),
            custom: params.get("custom").cloned().filter(|c| !c.is_empty()),
            params,
        })
    }

    /// The parameters to echo back to PayPal for verification.
    pub fn verification_payload(&self) -> Vec<(String, String)> {
        let mut payload: Vec<(String, String)> = self
            .params
            .iter()
            .filter(|(k, _)| k.as_str() != "cmd")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        payload.push(("cmd".to_string(), "_notify-validate".to_string()));
        payload
    }
}

/// PayPal's answer to a verification request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStatus {
    Verified,
    Invalid,
}

impl VerificationStatus {
    /// Interpret the body of a verification response.
    pub fn from_response(body: &str) -> Self {
        if body.trim() == "VERIFIED" {
            Self::Verified
        } else {
            Self::Invalid
        }
    }
}

/// Confirms notifications with PayPal.
///
/// The HTTP exchange lives outside this crate.
pub trait PaymentVerifier: Send + Sync {
    /// Post `payload` to `url` and report PayPal's verdict.
    fn verify(
        &self,
        url: &str,
        payload: &[(String, String)],
    ) -> Result<VerificationStatus, MarketError>;
}

/// A verifier that always answers the same; for offline use and tests.
#[derive(Debug, Clone, Copy)]
pub struct StaticVerifier(pub VerificationStatus);

impl PaymentVerifier for StaticVerifier {
    fn verify(
        &self,
        _url: &str,
        _payload: &[(String, String)],
    ) -> Result<VerificationStatus, MarketError> {
        Ok(self.0)
    }
}

/// A stored payment notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub txn_id: String,
    pub user_id: Option<UserId>,
    pub receiver_email: String,
    pub txn_type: String,
    pub payment_type: String,
    pub payment_status: String,
    pub amount: Money,
    pub payer_email: String,
    pub first_name: String,
    pub last_name: String,
    pub custom: Option<String>,
    /// Whether PayPal reported the payment as completed.
    pub verified: bool,
    pub received_at: DateTime<Utc>,
}

impl Entity for PaymentRecord {
    const KIND: &'static str = "Payment";

    fn id(&self) -> &str {
        self.id.as_str()
    }
}

/// What happened to a notification.
#[derive(Debug, Clone, PartialEq)]
pub enum IpnOutcome {
    /// Same transaction and status already on record.
    Duplicate,
    /// Verified and stored.
    Recorded(PaymentRecord),
    /// Not stored.
    Rejected { reason: String },
}

impl PaymentRecord {
    /// Record id for a transaction in a given status.
    ///
    /// One record per status change, so redelivered notifications map to
    /// the record already stored.
    pub fn record_id(txn_id: &str, payment_status: &str) -> PaymentId {
        PaymentId::new(format!("{}:{}", txn_id, payment_status))
    }
}

impl Marketplace {
    /// Verify a payment notification and record it.
    ///
    /// The duplicate check and the write happen in one transaction, so
    /// concurrent redeliveries of a notification store it once.
    pub fn handle_ipn(
        &self,
        message: IpnMessage,
        verifier: &dyn PaymentVerifier,
    ) -> Result<IpnOutcome, MarketError> {
        let payments = &self.config().payments;
        let status = verifier.verify(payments.verify_url(), &message.verification_payload())?;
        let id = PaymentRecord::record_id(&message.txn_id, &message.payment_status);
        let received_at = Utc::now();

        let outcome = self.db().run_in_transaction(
            TransactionOptions::single_group(),
            |tx| -> Result<IpnOutcome, MarketError> {
                if tx.get::<PaymentRecord>(id.as_str())?.is_some() {
                    return Ok(IpnOutcome::Duplicate);
                }
                if status != VerificationStatus::Verified {
                    return Ok(IpnOutcome::Rejected {
                        reason: "not verified by PayPal".to_string(),
                    });
                }
                if message.receiver_email != payments.account_email {
                    return Ok(IpnOutcome::Rejected {
                        reason: format!("receiver {} is not this account", message.receiver_email),
                    });
                }

                let record = PaymentRecord {
                    id: id.clone(),
                    txn_id: message.txn_id.clone(),
                    user_id: message.custom.clone().map(UserId::from),
                    receiver_email: message.receiver_email.clone(),
                    txn_type: message.txn_type.clone(),
                    payment_type: message.payment_type.clone(),
                    payment_status: message.payment_status.clone(),
                    amount: message.amount,
                    payer_email: message.payer_email.clone(),
                    first_name: message.first_name.clone(),
                    last_name: message.last_name.clone(),
                    custom: message.custom.clone(),
                    verified: message.payment_status == STATUS_COMPLETED,
                    received_at,
                };
                tx.put(&record)?;
                Ok(IpnOutcome::Recorded(record))
            },
        )?;

        match &outcome {
            IpnOutcome::Duplicate => {
                tracing::debug!(txn_id = %message.txn_id, status = %message.payment_status, "payment notification already processed");
            }
            IpnOutcome::Rejected { reason } => {
                tracing::warn!(
                    txn_id = %message.txn_id,
                    receiver = %message.receiver_email,
                    reason = %reason,
                    "payment notification rejected"
                );
            }
            IpnOutcome::Recorded(record) => {
                tracing::info!(
                    txn_id = %record.txn_id,
                    status = %record.payment_status,
                    amount = %record.amount,
                    verified = record.verified,
                    "payment recorded"
                );
            }
        }
        Ok(outcome)
    }

    /// Payments made by a user, oldest first.
    pub fn transactions_for_user(&self, user_id: &UserId) -> Result<Vec<PaymentRecord>, MarketError> {
        let mut records = self
            .db()
            .query::<PaymentRecord>(Filter::new().eq("user_id", user_id.as_str()))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.received_at.cmp(&b.received_at));
        Ok(records)
    }

    /// Delete every payment record.
    pub fn delete_all_transactions(&self) -> Result<usize, MarketError> {
        let keys = self.db().query_keys::<PaymentRecord>(Filter::new())?;
        let removed = self.db().delete_multi(&keys)?;
        tracing::info!(payments = removed, "deleted payment records");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarketConfig;

    fn params(txn_id: &str, status: &str, receiver: &str) -> BTreeMap<String, String> {
        [
            ("receiver_email", receiver),
            ("txn_id", txn_id),
            ("txn_type", "web_accept"),
            ("payment_type", "instant"),
            ("payment_status", status),
            ("mc_gross", "90.00"),
            ("mc_currency", "CAD"),
            ("payer_email", "buyer@example.com"),
            ("first_name", "John"),
            ("last_name", "Carter"),
            ("custom", "user-42"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    fn message(txn_id: &str, status: &str) -> IpnMessage {
        IpnMessage::from_params(params(txn_id, status, "s01@test.com")).unwrap()
    }

    const VERIFIED: StaticVerifier = StaticVerifier(VerificationStatus::Verified);

    #[test]
    fn test_missing_field_rejected() {
        let mut p = params("t1", "Completed", "s01@test.com");
        p.remove("txn_id");
        assert!(matches!(
            IpnMessage::from_params(p),
            Err(MarketError::Validation(_))
        ));
    }

    #[test]
    fn test_verification_payload_appends_cmd() {
        let payload = message("t1", "Completed").verification_payload();
        assert_eq!(
            payload.last(),
            Some(&("cmd".to_string(), "_notify-validate".to_string()))
        );
        assert_eq!(payload.len(), 12);
    }

    #[test]
    fn test_records_and_detects_duplicates() {
        let market = Marketplace::in_memory(MarketConfig::default());

        let outcome = market.handle_ipn(message("t1", "Completed"), &VERIFIED).unwrap();
        let IpnOutcome::Recorded(record) = outcome else {
            panic!("expected the payment to be recorded");
        };
        assert!(record.verified);
        assert_eq!(record.amount, Money::new(9000, Currency::CAD));

        assert_eq!(
            market.handle_ipn(message("t1", "Completed"), &VERIFIED).unwrap(),
            IpnOutcome::Duplicate
        );

        // A status change for the same transaction is new information.
        let IpnOutcome::Recorded(pending) =
            market.handle_ipn(message("t1", "Pending"), &VERIFIED).unwrap()
        else {
            panic!("expected the status change to be recorded");
        };
        assert!(!pending.verified);

        let user = UserId::new("user-42");
        assert_eq!(market.transactions_for_user(&user).unwrap().len(), 2);
        assert_eq!(market.delete_all_transactions().unwrap(), 2);
    }

    #[test]
    fn test_rejections() {
        let market = Marketplace::in_memory(MarketConfig::default());

        let invalid = StaticVerifier(VerificationStatus::Invalid);
        assert!(matches!(
            market.handle_ipn(message("t1", "Completed"), &invalid).unwrap(),
            IpnOutcome::Rejected { .. }
        ));

        let other = IpnMessage::from_params(params("t2", "Completed", "other@test.com")).unwrap();
        assert!(matches!(
            market.handle_ipn(other, &VERIFIED).unwrap(),
            IpnOutcome::Rejected { .. }
        ));
        assert_eq!(market.db().stats().entities, 0);
    }

    #[test]
    fn test_response_parsing() {
        assert_eq!(VerificationStatus::from_response("VERIFIED\n"), VerificationStatus::Verified);
        assert_eq!(VerificationStatus::from_response("INVALID"), VerificationStatus::Invalid);
    }

    #[test]
    fn test_concurrent_redeliveries_record_once() {
        let market = Marketplace::in_memory(MarketConfig::default());
        let barrier = std::sync::Barrier::new(8);

        let outcomes: Vec<IpnOutcome> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| {
                    let (market, barrier) = (&market, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        market.handle_ipn(message("t9", "Completed"), &VERIFIED).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let recorded = outcomes
            .iter()
            .filter(|o| matches!(o, IpnOutcome::Recorded(_)))
            .count();
        assert_eq!(recorded, 1);
        assert_eq!(outcomes.len() - recorded, 7);
        assert!(outcomes
            .iter()
            .all(|o| matches!(o, IpnOutcome::Recorded(_) | IpnOutcome::Duplicate)));
        assert_eq!(market.db().stats().entities, 1);

        let stored: Option<PaymentRecord> = market
            .db()
            .get(PaymentRecord::record_id("t9", "Completed").as_str())
            .unwrap();
        assert!(stored.is_some());
    }
}
