//! Domain Models
//!
//! Payment-link terms as returned by the backend, validated at the trust
//! boundary into typed records. Uses `rust_decimal` for all monetary values.
//!
//! The backend's JSON is loosely structured: card links carry a provider
//! `url`, bank links carry account details, and either may be missing
//! fields. [`PaymentRecord`] deserializes through [`RawPaymentRecord`] and
//! rejects shapes that mix both, so nothing past this module has to probe
//! optional fields.

use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::CheckoutError;
use crate::validation::{SenderInfo, sanitize_name, sanitize_phone_number};

/// Currencies for which a tokenized card link disables bank transfer
const CARD_ONLY_CURRENCIES: [&str; 3] = ["GBP", "EUR", "USD"];

/// How the payment link was configured
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentType {
    Card,
    Bank,
}

impl PaymentType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Bank => "bank",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "card" => Some(Self::Card),
            "bank" => Some(Self::Bank),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Method the payer picks on the checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Card,
    Bank,
}

impl PaymentMethod {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Bank => "bank",
        }
    }

    /// Label shown on the receipt
    pub const fn label(self) -> &'static str {
        match self {
            Self::Card => "Card Payment",
            Self::Bank => "Bank Transfer",
        }
    }
}

/// Card settlement: the payer is sent to the provider's hosted page
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CardDetails {
    pub url: Option<String>,
}

/// Bank settlement: the payer transfers to a collection account
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BankDetails {
    pub bank_name: Option<String>,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub amount: Option<Decimal>,
    pub new_wallet: Option<bool>,
}

/// Provider-specific settlement fields
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SettlementDetails {
    Card(CardDetails),
    Bank(BankDetails),
}

/// Provider response captured when the link was initialized
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderResponse {
    pub result: bool,
    pub txid: String,
    pub instruction: Option<String>,
    pub settlement: SettlementDetails,
}

/// Initialization block of a payment link
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Initialization {
    pub id: Option<String>,
    pub status: String,
    pub response: ProviderResponse,
}

/// Validated terms of a payment link
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawPaymentRecord", into = "RawPaymentRecord")]
pub struct PaymentRecord {
    pub id: String,
    pub name: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub selected_currency: Option<String>,
    pub description: String,
    pub address: Option<String>,
    pub token: Option<String>,
    pub payment_type: PaymentType,
    pub success_url: Option<String>,
    pub redirect_url: Option<String>,
    pub reference: Option<String>,
    pub transaction_id: String,
    pub initialization: Initialization,
}

impl PaymentRecord {
    /// Which checkout methods this link allows
    pub fn availability(&self) -> MethodAvailability {
        MethodAvailability::evaluate(&self.currency, self.payment_type, self.token.as_deref())
    }

    /// Provider transaction id used for verification
    pub fn txid(&self) -> &str {
        &self.initialization.response.txid
    }

    /// Where to send a card payer: explicit redirect first, provider URL second
    pub fn card_redirect_url(&self) -> Option<&str> {
        self.redirect_url.as_deref().or(match &self.initialization.response.settlement {
            SettlementDetails::Card(card) => card.url.as_deref(),
            SettlementDetails::Bank(_) => None,
        })
    }

    pub const fn bank_details(&self) -> Option<&BankDetails> {
        match &self.initialization.response.settlement {
            SettlementDetails::Bank(bank) => Some(bank),
            SettlementDetails::Card(_) => None,
        }
    }

    /// `"{currency} {amount}"` for display
    pub fn display_amount(&self) -> String {
        format!("{} {}", self.currency, self.amount.normalize())
    }
}

/// Eligibility of the two checkout methods
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodAvailability {
    pub card: bool,
    pub bank: bool,
}

impl MethodAvailability {
    /// Apply the eligibility rule
    ///
    /// - card: off for NGN, and for USD bank links settled in the USD token
    /// - bank: off for tokenized card links in GBP, EUR or USD
    pub fn evaluate(currency: &str, payment_type: PaymentType, token: Option<&str>) -> Self {
        let token = token.filter(|t| !t.is_empty());
        let is_ngn = currency == "NGN";
        let is_usd_bank =
            currency == "USD" && payment_type == PaymentType::Bank && token == Some("USD");
        let is_card_payment = payment_type == PaymentType::Card
            && token.is_some()
            && CARD_ONLY_CURRENCIES.contains(&currency);

        Self {
            card: !is_ngn && !is_usd_bank,
            bank: !is_card_payment,
        }
    }

    pub const fn allows(self, method: PaymentMethod) -> bool {
        match method {
            PaymentMethod::Card => self.card,
            PaymentMethod::Bank => self.bank,
        }
    }

    /// The only eligible method, if exactly one is
    pub const fn auto_select(self) -> Option<PaymentMethod> {
        match (self.card, self.bank) {
            (true, false) => Some(PaymentMethod::Card),
            (false, true) => Some(PaymentMethod::Bank),
            _ => None,
        }
    }
}

/// Proof of a completed bank transfer sent to the record-transaction route
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub amount: Decimal,
    pub currency: String,
    pub sender_name: String,
    pub sender_phone: String,
    #[serde(with = "iso_millis")]
    pub paid_at: DateTime<Utc>,
}

impl TransactionRecord {
    pub fn new(payment: &PaymentRecord, sender: &SenderInfo, paid_at: DateTime<Utc>) -> Self {
        let name = sanitize_name(&sender.name);
        Self {
            amount: payment.amount,
            currency: payment.currency.clone(),
            sender_name: if name.is_empty() { "Anonymous".into() } else { name },
            sender_phone: sanitize_phone_number(&sender.phone),
            paid_at,
        }
    }
}

/// ISO-8601 with millisecond precision, e.g. `2025-01-31T10:00:00.000Z`
mod iso_millis {
    use super::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Wire format
// ============================================================================

/// Payment link exactly as the backend sends it
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawPaymentRecord {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub amount: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_currency: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(default)]
    pub payment_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub toronet_reference: Option<String>,
    #[serde(default)]
    pub transaction_id: String,
    pub payment_initialization: RawInitialization,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawInitialization {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub status: String,
    pub toronet_response: RawProviderResponse,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawProviderResponse {
    #[serde(default)]
    pub result: bool,
    #[serde(default)]
    pub txid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bankname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accountnumber: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accountname: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newwallet: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instruction: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl TryFrom<RawPaymentRecord> for PaymentRecord {
    type Error = CheckoutError;

    fn try_from(raw: RawPaymentRecord) -> Result<Self, Self::Error> {
        let invalid = |msg: &str| CheckoutError::InvalidRecord(msg.to_string());

        if raw.id.trim().is_empty() {
            return Err(invalid("missing id"));
        }
        let currency = raw.currency.trim().to_uppercase();
        if currency.is_empty() {
            return Err(invalid("missing currency"));
        }
        let payment_type = PaymentType::parse(&raw.payment_type).ok_or_else(|| {
            CheckoutError::InvalidRecord(format!("unknown payment type '{}'", raw.payment_type))
        })?;
        if raw.transaction_id.trim().is_empty() {
            return Err(invalid("missing transaction id"));
        }

        let provider = raw.payment_initialization.toronet_response;
        let bank = BankDetails {
            bank_name: non_empty(provider.bankname),
            account_number: non_empty(provider.accountnumber),
            account_name: non_empty(provider.accountname),
            amount: provider.amount,
            new_wallet: provider.newwallet,
        };
        let card = CardDetails {
            url: non_empty(provider.url),
        };
        let has_bank = bank.bank_name.is_some() || bank.account_number.is_some();
        let has_card = card.url.is_some();

        let settlement = match (has_card, has_bank) {
            (true, true) => return Err(invalid("both card and bank settlement fields present")),
            (true, false) => SettlementDetails::Card(card),
            (false, true) => SettlementDetails::Bank(bank),
            (false, false) => match payment_type {
                PaymentType::Card => SettlementDetails::Card(card),
                PaymentType::Bank => SettlementDetails::Bank(bank),
            },
        };

        if matches!(settlement, SettlementDetails::Bank(_)) && provider.txid.trim().is_empty() {
            return Err(invalid("bank transfer without provider txid"));
        }

        Ok(Self {
            id: raw.id,
            name: non_empty(raw.name),
            amount: raw.amount,
            currency,
            selected_currency: non_empty(raw.selected_currency),
            description: raw.description,
            address: non_empty(raw.address),
            token: non_empty(raw.token),
            payment_type,
            success_url: non_empty(raw.success_url),
            redirect_url: non_empty(raw.redirect_url),
            reference: non_empty(raw.toronet_reference),
            transaction_id: raw.transaction_id,
            initialization: Initialization {
                id: raw.payment_initialization.id,
                status: raw.payment_initialization.status,
                response: ProviderResponse {
                    result: provider.result,
                    txid: provider.txid,
                    instruction: non_empty(provider.instruction),
                    settlement,
                },
            },
        })
    }
}

impl From<PaymentRecord> for RawPaymentRecord {
    fn from(record: PaymentRecord) -> Self {
        let response = record.initialization.response;
        let mut provider = RawProviderResponse {
            result: response.result,
            txid: response.txid,
            instruction: response.instruction,
            ..RawProviderResponse::default()
        };
        match response.settlement {
            SettlementDetails::Card(card) => provider.url = card.url,
            SettlementDetails::Bank(bank) => {
                provider.bankname = bank.bank_name;
                provider.accountnumber = bank.account_number;
                provider.accountname = bank.account_name;
                provider.amount = bank.amount;
                provider.newwallet = bank.new_wallet;
            }
        }

        Self {
            id: record.id,
            name: record.name,
            amount: record.amount,
            currency: record.currency,
            selected_currency: record.selected_currency,
            description: record.description,
            address: record.address,
            token: record.token,
            payment_type: record.payment_type.as_str().to_string(),
            success_url: record.success_url,
            redirect_url: record.redirect_url,
            toronet_reference: record.reference,
            transaction_id: record.transaction_id,
            payment_initialization: RawInitialization {
                id: record.initialization.id,
                status: record.initialization.status,
                toronet_response: provider,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    fn bank_link() -> serde_json::Value {
        json!({
            "id": "pl_123",
            "name": "Ada Stores",
            "amount": "25000.00",
            "currency": "NGN",
            "description": "Invoice 42",
            "token": "",
            "paymentType": "bank",
            "successUrl": "https://merchant.example/thanks",
            "transactionId": "tx_9",
            "paymentInitialization": {
                "id": "init_1",
                "status": "initialized",
                "toronetResponse": {
                    "result": true,
                    "txid": "0xabc",
                    "bankname": "Wema Bank",
                    "accountnumber": "0123456789",
                    "accountname": "Chainpaye Collections",
                    "amount": 25000,
                    "instruction": "Transfer the exact amount"
                }
            }
        })
    }

    #[test]
    fn test_bank_link_validates_into_bank_variant() {
        let record: PaymentRecord = serde_json::from_value(bank_link()).unwrap();

        assert_eq!(record.amount, dec!(25000.00));
        assert_eq!(record.payment_type, PaymentType::Bank);
        assert_eq!(record.token, None);
        assert_eq!(record.txid(), "0xabc");
        let bank = record.bank_details().unwrap();
        assert_eq!(bank.account_number.as_deref(), Some("0123456789"));
        assert_eq!(bank.amount, Some(dec!(25000)));
        assert_eq!(record.card_redirect_url(), None);
    }

    #[test]
    fn test_record_survives_cache_round_trip() {
        let record: PaymentRecord = serde_json::from_value(bank_link()).unwrap();
        let value = serde_json::to_value(&record).unwrap();
        let back: PaymentRecord = serde_json::from_value(value).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_mixed_settlement_is_rejected() {
        let mut raw = bank_link();
        raw["paymentInitialization"]["toronetResponse"]["url"] = json!("https://pay.example");
        let err = serde_json::from_value::<PaymentRecord>(raw).unwrap_err();
        assert!(err.to_string().contains("both card and bank"));
    }

    #[test]
    fn test_card_redirect_prefers_explicit_url() {
        let raw = json!({
            "id": "pl_card",
            "amount": 10,
            "currency": "GBP",
            "token": "GBP",
            "paymentType": "card",
            "redirectUrl": "https://checkout.example/r",
            "transactionId": "tx_1",
            "paymentInitialization": {
                "status": "initialized",
                "toronetResponse": { "result": true, "txid": "t", "url": "https://provider.example" }
            }
        });
        let record: PaymentRecord = serde_json::from_value(raw).unwrap();
        assert_eq!(record.card_redirect_url(), Some("https://checkout.example/r"));
    }

    #[test]
    fn test_eligibility_rules() {
        let ngn = MethodAvailability::evaluate("NGN", PaymentType::Bank, None);
        assert_eq!(ngn, MethodAvailability { card: false, bank: true });
        assert_eq!(ngn.auto_select(), Some(PaymentMethod::Bank));

        let usd_card = MethodAvailability::evaluate("USD", PaymentType::Card, Some("USD"));
        assert_eq!(usd_card, MethodAvailability { card: true, bank: false });
        assert_eq!(usd_card.auto_select(), Some(PaymentMethod::Card));

        let gbp_bank = MethodAvailability::evaluate("GBP", PaymentType::Bank, None);
        assert_eq!(gbp_bank, MethodAvailability { card: true, bank: true });
        assert_eq!(gbp_bank.auto_select(), None);

        let usd_bank = MethodAvailability::evaluate("USD", PaymentType::Bank, Some("USD"));
        assert!(!usd_bank.card);
        assert!(usd_bank.bank);
    }

    #[test]
    fn test_transaction_record_defaults() {
        let record: PaymentRecord = serde_json::from_value(bank_link()).unwrap();
        let paid_at = DateTime::parse_from_rfc3339("2025-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let tx = TransactionRecord::new(&record, &SenderInfo::default(), paid_at);
        assert_eq!(tx.sender_name, "Anonymous");
        assert_eq!(tx.sender_phone, "");

        let body = serde_json::to_value(&tx).unwrap();
        assert_eq!(body["paidAt"], "2025-03-01T12:00:00.000Z");
        assert_eq!(body["amount"], "25000.00");
        assert_eq!(body["senderName"], "Anonymous");
    }
}
