pub mod rate_writer;
pub mod shipment_reader;
