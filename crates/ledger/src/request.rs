//! Payment requests: a solicitation for funds, not itself a balance mutation.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use walletcore_core::{DomainError, Money, PaymentRequestId, UserId};

/// Default validity window for a new request.
pub const DEFAULT_TTL_HOURS: i64 = 72;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentRequestStatus {
    Pending,
    Paid,
    Expired,
}

/// A request for money addressed to a known or described recipient.
///
/// Transitions: `pending -> paid` only via an authenticated confirmation
/// that executes a ledger transfer; `pending -> expired` once `expires_at`
/// passes (checked lazily on every read, converged by a background sweep).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub id: PaymentRequestId,
    pub requester_id: UserId,
    pub amount: Money,
    /// Free-form recipient descriptor (name/phone); purely informational.
    pub recipient: Option<String>,
    pub status: PaymentRequestStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PaymentRequest {
    pub fn new(
        requester_id: UserId,
        amount: Money,
        recipient: Option<String>,
        ttl: Option<Duration>,
    ) -> Result<Self, DomainError> {
        if !amount.is_positive() {
            return Err(DomainError::validation("requested amount must be positive"));
        }
        let now = Utc::now();
        Ok(Self {
            id: PaymentRequestId::new(),
            requester_id,
            amount,
            recipient,
            status: PaymentRequestStatus::Pending,
            created_at: now,
            expires_at: now + ttl.unwrap_or_else(|| Duration::hours(DEFAULT_TTL_HOURS)),
        })
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentRequestStatus::Pending && now >= self.expires_at
    }

    /// Apply the lazy expiry policy; returns true if the status changed.
    pub fn expire_if_overdue(&mut self, now: DateTime<Utc>) -> bool {
        if self.is_overdue(now) {
            self.status = PaymentRequestStatus::Expired;
            true
        } else {
            false
        }
    }

    /// Guard the pay transition. The caller is responsible for executing
    /// the ledger transfer before persisting the `paid` status in the same
    /// logical operation.
    pub fn mark_paid(&mut self, now: DateTime<Utc>) -> Result<(), DomainError> {
        self.expire_if_overdue(now);
        match self.status {
            PaymentRequestStatus::Pending => {
                self.status = PaymentRequestStatus::Paid;
                Ok(())
            }
            PaymentRequestStatus::Paid => Err(DomainError::conflict("request already paid")),
            PaymentRequestStatus::Expired => {
                Err(DomainError::validation("request has expired"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use walletcore_core::Currency;

    fn request(ttl: Duration) -> PaymentRequest {
        PaymentRequest::new(
            UserId::new(),
            Money::from_minor(2500, Currency::Usd),
            Some("Sam N.".to_string()),
            Some(ttl),
        )
        .unwrap()
    }

    #[test]
    fn pay_once_then_conflict() {
        let mut req = request(Duration::hours(1));
        req.mark_paid(Utc::now()).unwrap();
        assert_eq!(req.status, PaymentRequestStatus::Paid);
        assert!(matches!(
            req.mark_paid(Utc::now()),
            Err(DomainError::Conflict(_))
        ));
    }

    #[test]
    fn overdue_request_expires_on_pay_attempt() {
        let mut req = request(Duration::hours(1));
        let later = Utc::now() + Duration::hours(2);
        assert!(req.mark_paid(later).is_err());
        assert_eq!(req.status, PaymentRequestStatus::Expired);
    }

    #[test]
    fn expiry_is_idempotent_and_only_hits_pending() {
        let mut req = request(Duration::hours(1));
        let later = Utc::now() + Duration::hours(2);
        assert!(req.expire_if_overdue(later));
        assert!(!req.expire_if_overdue(later));

        let mut paid = request(Duration::hours(1));
        paid.mark_paid(Utc::now()).unwrap();
        assert!(!paid.expire_if_overdue(later));
        assert_eq!(paid.status, PaymentRequestStatus::Paid);
    }

    #[test]
    fn zero_amount_request_is_rejected() {
        assert!(PaymentRequest::new(
            UserId::new(),
            Money::zero(Currency::Usd),
            None,
            None
        )
        .is_err());
    }
}
