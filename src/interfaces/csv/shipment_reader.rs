use crate::domain::shipment::{
    DeliveryType, DimensionUnit, NewShipment, Package, Party, PickupType, WeightUnit,
};
use crate::error::{Result, ShipmentError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Read;

fn default_declared_value() -> Decimal {
    Decimal::ONE_HUNDRED
}

/// One shipping request per CSV line, with sender and recipient flattened into columns.
#[derive(Debug, Clone, Deserialize)]
pub struct ShipmentRow {
    pub sender_name: String,
    #[serde(default)]
    pub sender_email: String,
    pub sender_phone: String,
    pub sender_address: String,
    pub sender_city: String,
    pub sender_state: String,
    pub sender_zip: String,
    pub recipient_name: String,
    #[serde(default)]
    pub recipient_email: String,
    pub recipient_phone: String,
    pub recipient_address: String,
    pub recipient_city: String,
    pub recipient_state: String,
    pub recipient_zip: String,
    pub length: Decimal,
    pub width: Decimal,
    pub height: Decimal,
    pub weight: Decimal,
    #[serde(default)]
    pub weight_unit: WeightUnit,
    #[serde(default)]
    pub dimension_unit: DimensionUnit,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_declared_value")]
    pub declared_value: Decimal,
    #[serde(default)]
    pub delivery_type: DeliveryType,
    #[serde(default)]
    pub pickup_type: PickupType,
    pub ship_date: NaiveDate,
}

impl From<ShipmentRow> for NewShipment {
    fn from(row: ShipmentRow) -> Self {
        NewShipment {
            sender: Party {
                name: row.sender_name,
                email: row.sender_email,
                phone: row.sender_phone,
                address: row.sender_address,
                city: row.sender_city,
                state: row.sender_state,
                zip: row.sender_zip,
            },
            recipient: Party {
                name: row.recipient_name,
                email: row.recipient_email,
                phone: row.recipient_phone,
                address: row.recipient_address,
                city: row.recipient_city,
                state: row.recipient_state,
                zip: row.recipient_zip,
            },
            package: Package {
                length: row.length,
                width: row.width,
                height: row.height,
                weight: row.weight,
                weight_unit: row.weight_unit,
                dimension_unit: row.dimension_unit,
                description: row.description,
                declared_value: row.declared_value,
                currency: "USD".to_string(),
            },
            delivery_type: row.delivery_type,
            pickup_type: row.pickup_type,
            preferred_ship_date: row.ship_date,
        }
    }
}

/// Reads shipping requests from a CSV source.
pub struct ShipmentReader<R: Read> {
    reader: csv::Reader<R>,
}

impl<R: Read> ShipmentReader<R> {
    pub fn new(source: R) -> Self {
        let reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(source);
        Self { reader }
    }

    /// Lazily deserializes each line; a bad line yields an error and reading continues.
    pub fn shipments(self) -> impl Iterator<Item = Result<NewShipment>> {
        self.reader
            .into_deserialize::<ShipmentRow>()
            .map(|result| result.map(NewShipment::from).map_err(ShipmentError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const HEADER: &str = "sender_name,sender_phone,sender_address,sender_city,sender_state,sender_zip,\
recipient_name,recipient_phone,recipient_address,recipient_city,recipient_state,recipient_zip,\
length,width,height,weight,delivery_type,pickup_type,ship_date";

    #[test]
    fn test_reader_defaults_optional_columns() {
        let data = format!(
            "{HEADER}\nAda, 3105550100, 1 Main St, Los Angeles, CA, 90001, Rob, 2125550199, 2 Broad St, New York, NY, 10004, 10, 8, 6, 5.5, express, PICKUP, 2030-01-07"
        );
        let results: Vec<_> = ShipmentReader::new(data.as_bytes()).shipments().collect();
        assert_eq!(results.len(), 1);
        let shipment = results[0].as_ref().unwrap();
        assert_eq!(shipment.sender.city, "Los Angeles");
        assert_eq!(shipment.package.weight, dec!(5.5));
        assert_eq!(shipment.package.weight_unit, WeightUnit::Lb);
        assert_eq!(shipment.package.declared_value, dec!(100));
        assert_eq!(shipment.delivery_type, DeliveryType::Express);
        assert_eq!(shipment.pickup_type, PickupType::Pickup);
        assert_eq!(shipment.sender.email, "");
    }

    #[test]
    fn test_reader_bad_line_does_not_stop_stream() {
        let data = format!(
            "{HEADER}\nAda, 1, a, b, CA, 90001, Rob, 2, c, d, NY, 10004, ten, 8, 6, 5, standard, DROPOFF, 2030-01-07\n\
Ada, 1, a, b, CA, 90001, Rob, 2, c, d, NY, 10004, 10, 8, 6, 5, standard, DROPOFF, 2030-01-07"
        );
        let results: Vec<_> = ShipmentReader::new(data.as_bytes()).shipments().collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }
}
