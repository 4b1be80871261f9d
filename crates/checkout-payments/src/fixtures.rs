//! Shared test payloads

use checkout_core::{PaymentRecord, SenderInfo, TransactionRecord};
use serde_json::{Value, json};

pub fn bank_link(id: &str, currency: &str) -> Value {
    json!({
        "id": id,
        "name": "Ada Stores",
        "amount": "25000.00",
        "currency": currency,
        "description": "Invoice 42",
        "paymentType": "bank",
        "successUrl": "https://merchant.example/thanks",
        "transactionId": format!("tx_{id}"),
        "paymentInitialization": {
            "id": "init_1",
            "status": "initialized",
            "toronetResponse": {
                "result": true,
                "txid": format!("0x{id}"),
                "bankname": "Wema Bank",
                "accountnumber": "0123456789",
                "accountname": "Chainpaye Collections",
                "amount": 25000
            }
        }
    })
}

pub fn card_link(id: &str, currency: &str, url: Option<&str>) -> Value {
    let mut provider = json!({ "result": true, "txid": format!("0x{id}") });
    if let Some(url) = url {
        provider["url"] = json!(url);
    }
    json!({
        "id": id,
        "amount": 40,
        "currency": currency,
        "token": currency,
        "paymentType": "card",
        "transactionId": format!("tx_{id}"),
        "paymentInitialization": { "status": "initialized", "toronetResponse": provider }
    })
}

pub fn envelope(data: Value) -> Value {
    json!({ "success": true, "data": data })
}

pub fn transaction() -> TransactionRecord {
    let record: PaymentRecord = serde_json::from_value(bank_link("pl_1", "NGN"))
        .unwrap_or_else(|e| panic!("fixture does not validate: {e}"));
    let sender = SenderInfo {
        name: "Ada  Obi".into(),
        phone: "+234 803 000 0000".into(),
    };
    TransactionRecord::new(&record, &sender, chrono::Utc::now())
}
