use super::ids::{RateId, ShipmentId};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Handling fee applied on top of the carrier's net charge.
pub const HANDLING_FEE_RATE: Decimal = dec!(0.10);

/// A priced service option as returned by the carrier, before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateQuote {
    pub service_type: String,
    pub base_rate: Decimal,
    pub handling_fee: Decimal,
    pub total_rate: Decimal,
    pub currency: String,
    pub transit_days: Option<u32>,
    pub carrier_response: serde_json::Value,
}

impl RateQuote {
    pub fn new(
        service_type: impl Into<String>,
        base_rate: Decimal,
        currency: impl Into<String>,
        transit_days: Option<u32>,
        carrier_response: serde_json::Value,
    ) -> Self {
        let handling_fee = (base_rate * HANDLING_FEE_RATE).round_dp(2);
        Self {
            service_type: service_type.into(),
            base_rate,
            handling_fee,
            total_rate: base_rate + handling_fee,
            currency: currency.into(),
            transit_days,
            carrier_response,
        }
    }
}

/// Sorts quotes cheapest first.
pub fn sort_by_total(quotes: &mut [RateQuote]) {
    quotes.sort_by(|a, b| a.total_rate.cmp(&b.total_rate));
}

/// A persisted quote. Immutable apart from `is_selected`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rate {
    pub id: RateId,
    pub shipment_id: ShipmentId,
    pub service_type: String,
    pub base_rate: Decimal,
    pub handling_fee: Decimal,
    pub total_rate: Decimal,
    pub currency: String,
    pub transit_days: Option<u32>,
    pub is_selected: bool,
    pub carrier_response: serde_json::Value,
}

impl Rate {
    pub fn from_quote(id: RateId, shipment_id: ShipmentId, quote: RateQuote) -> Self {
        Self {
            id,
            shipment_id,
            service_type: quote.service_type,
            base_rate: quote.base_rate,
            handling_fee: quote.handling_fee,
            total_rate: quote.total_rate,
            currency: quote.currency,
            transit_days: quote.transit_days,
            is_selected: false,
            carrier_response: quote.carrier_response,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_is_base_plus_ten_percent() {
        for base in [dec!(12.34), dec!(0.05), dec!(99.99), dec!(148.17)] {
            let quote = RateQuote::new("FEDEX_GROUND", base, "USD", None, serde_json::Value::Null);
            let expected = (base * dec!(1.10)).round_dp(2);
            assert_eq!(quote.total_rate, quote.base_rate + quote.handling_fee);
            assert!((quote.total_rate - expected).abs() <= dec!(0.01));
        }
    }

    #[test]
    fn test_handling_fee_rounds_to_cents() {
        let quote = RateQuote::new("FEDEX_2_DAY", dec!(10.05), "USD", Some(2), serde_json::Value::Null);
        assert_eq!(quote.handling_fee, dec!(1.00));
        assert_eq!(quote.total_rate, dec!(11.05));
    }

    #[test]
    fn test_sort_by_total() {
        let mut quotes = vec![
            RateQuote::new("PRIORITY_OVERNIGHT", dec!(80), "USD", Some(1), serde_json::Value::Null),
            RateQuote::new("FEDEX_GROUND", dec!(15), "USD", Some(5), serde_json::Value::Null),
            RateQuote::new("FEDEX_2_DAY", dec!(30), "USD", Some(2), serde_json::Value::Null),
        ];
        sort_by_total(&mut quotes);
        let order: Vec<_> = quotes.iter().map(|q| q.service_type.as_str()).collect();
        assert_eq!(order, ["FEDEX_GROUND", "FEDEX_2_DAY", "PRIORITY_OVERNIGHT"]);
    }
}
