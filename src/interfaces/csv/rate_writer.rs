use crate::domain::rate::Rate;
use crate::error::Result;
use std::io::Write;

/// Writes quoted rates as CSV, one line per rate, with the owning shipment id first.
pub struct RateWriter<W: Write> {
    writer: csv::Writer<W>,
    header_written: bool,
}

impl<W: Write> RateWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new().has_headers(false).from_writer(sink),
            header_written: false,
        }
    }

    pub fn write_header(&mut self) -> Result<()> {
        if !self.header_written {
            self.writer.write_record([
                "shipment",
                "service_type",
                "base_rate",
                "handling_fee",
                "total_rate",
                "currency",
                "transit_days",
            ])?;
            self.header_written = true;
        }
        Ok(())
    }

    pub fn write_rates(&mut self, rates: &[Rate]) -> Result<()> {
        self.write_header()?;
        for rate in rates {
            self.writer.write_record([
                rate.shipment_id.to_string(),
                rate.service_type.clone(),
                format!("{:.2}", rate.base_rate),
                format!("{:.2}", rate.handling_fee),
                format!("{:.2}", rate.total_rate),
                rate.currency.clone(),
                rate.transit_days.map(|d| d.to_string()).unwrap_or_default(),
            ])?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::{RateId, ShipmentId};
    use crate::domain::rate::RateQuote;
    use rust_decimal_macros::dec;
    use serde_json::Value;

    #[test]
    fn test_rates_written_with_single_header() {
        let rate = Rate::from_quote(
            RateId(1),
            ShipmentId(3),
            RateQuote::new("FEDEX_GROUND", dec!(15.10), "USD", Some(4), Value::Null),
        );
        let mut buffer = Vec::new();
        {
            let mut writer = RateWriter::new(&mut buffer);
            writer.write_rates(std::slice::from_ref(&rate)).unwrap();
            writer.write_rates(&[]).unwrap();
        }
        let output = String::from_utf8(buffer).unwrap();
        assert_eq!(
            output,
            "shipment,service_type,base_rate,handling_fee,total_rate,currency,transit_days\n\
3,FEDEX_GROUND,15.10,1.51,16.61,USD,4\n"
        );
    }
}
