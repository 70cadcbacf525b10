use crate::domain::ids::{RateId, ShipmentId, TransactionId};
use crate::domain::payment::{NewPaymentTransaction, PaymentTransaction};
use crate::domain::ports::{
    PaymentStore, ProcessedEventStore, RateStore, ShipmentStore, TrackingStore,
};
use crate::domain::rate::{Rate, RateQuote};
use crate::domain::shipment::{NewShipment, Shipment, ShipmentStatus};
use crate::domain::tracking::TrackingEvent;
use crate::error::{Result, ShipmentError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, Direction, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for shipment records.
pub const CF_SHIPMENTS: &str = "shipments";
/// Column Family for rates, keyed `shipment_id ‖ rate_id`.
pub const CF_RATES: &str = "rates";
/// Column Family for payment transactions.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for tracking history, keyed `shipment_id ‖ seq`.
pub const CF_TRACKING: &str = "tracking";
/// Column Family for processed webhook event ids.
pub const CF_WEBHOOK_EVENTS: &str = "webhook_events";
/// Column Family for id counters.
pub const CF_META: &str = "meta";

const COUNTER_SHIPMENTS: &str = "next_shipment_id";
const COUNTER_RATES: &str = "next_rate_id";
const COUNTER_PAYMENTS: &str = "next_payment_id";

/// A persistent store implementation using RocksDB.
///
/// Implements every store port over separate Column Families. Read-modify-write sequences
/// (id allocation, compare-and-swap, rate selection) run under a single async mutex.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

fn compound_key(prefix: u64, suffix: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&prefix.to_be_bytes());
    key[8..].copy_from_slice(&suffix.to_be_bytes());
    key
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all required column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cfs = [
            CF_SHIPMENTS,
            CF_RATES,
            CF_PAYMENTS,
            CF_TRACKING,
            CF_WEBHOOK_EVENTS,
            CF_META,
        ]
        .into_iter()
        .map(|name| ColumnFamilyDescriptor::new(name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, cfs)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            ShipmentError::InternalError(Box::new(std::io::Error::other(format!(
                "{name} column family not found"
            ))))
        })
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf: &str, key: &[u8], value: &T) -> Result<()> {
        let bytes = serde_json::to_vec(value)?;
        self.db.put_cf(self.cf(cf)?, key, bytes)?;
        Ok(())
    }

    /// Every value in `cf` whose key starts with `prefix`, in key order.
    fn scan<T: DeserializeOwned>(&self, cf: &str, prefix: &[u8]) -> Result<Vec<T>> {
        let iter = self
            .db
            .iterator_cf(self.cf(cf)?, IteratorMode::From(prefix, Direction::Forward));
        let mut out = Vec::new();
        for item in iter {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(serde_json::from_slice(&value)?);
        }
        Ok(out)
    }

    /// Allocates the next id for `counter`. Caller must hold `write_lock`.
    fn next_id(&self, counter: &str) -> Result<u64> {
        let current: u64 = self.get_json(CF_META, counter.as_bytes())?.unwrap_or(0);
        let next = current + 1;
        self.put_json(CF_META, counter.as_bytes(), &next)?;
        Ok(next)
    }

    fn find_payment(&self, pred: impl Fn(&PaymentTransaction) -> bool) -> Result<Option<PaymentTransaction>> {
        let all: Vec<PaymentTransaction> = self.scan(CF_PAYMENTS, &[])?;
        Ok(all.into_iter().filter(|tx| pred(tx)).max_by_key(|tx| tx.id))
    }
}

#[async_trait]
impl ShipmentStore for RocksDBStore {
    async fn create(&self, new: NewShipment, now: DateTime<Utc>) -> Result<Shipment> {
        let _guard = self.write_lock.lock().await;
        let id = ShipmentId(self.next_id(COUNTER_SHIPMENTS)?);
        let shipment = Shipment::new(id, new, now);
        self.put_json(CF_SHIPMENTS, &id.to_be_bytes(), &shipment)?;
        Ok(shipment)
    }

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>> {
        self.get_json(CF_SHIPMENTS, &id.to_be_bytes())
    }

    async fn compare_and_swap(&self, expected: ShipmentStatus, shipment: Shipment) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let key = shipment.id.to_be_bytes();
        let current: Option<Shipment> = self.get_json(CF_SHIPMENTS, &key)?;
        match current {
            Some(current) if current.status == expected => {
                self.put_json(CF_SHIPMENTS, &key, &shipment)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl RateStore for RocksDBStore {
    async fn insert_all(&self, shipment_id: ShipmentId, quotes: Vec<RateQuote>) -> Result<Vec<Rate>> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_RATES)?;
        let mut batch = WriteBatch::default();
        let mut stored = Vec::with_capacity(quotes.len());
        for quote in quotes {
            let id = RateId(self.next_id(COUNTER_RATES)?);
            let rate = Rate::from_quote(id, shipment_id, quote);
            batch.put_cf(cf, compound_key(shipment_id.0, id.0), serde_json::to_vec(&rate)?);
            stored.push(rate);
        }
        self.db.write(batch)?;
        Ok(stored)
    }

    async fn for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<Rate>> {
        let mut rates: Vec<Rate> = self.scan(CF_RATES, &shipment_id.to_be_bytes())?;
        rates.sort_by(|a, b| a.total_rate.cmp(&b.total_rate).then(a.id.cmp(&b.id)));
        Ok(rates)
    }

    async fn select(&self, shipment_id: ShipmentId, rate_id: RateId) -> Result<Option<Rate>> {
        let _guard = self.write_lock.lock().await;
        let rates: Vec<Rate> = self.scan(CF_RATES, &shipment_id.to_be_bytes())?;
        if !rates.iter().any(|r| r.id == rate_id) {
            return Ok(None);
        }

        let cf = self.cf(CF_RATES)?;
        let mut batch = WriteBatch::default();
        let mut chosen = None;
        for mut rate in rates {
            rate.is_selected = rate.id == rate_id;
            batch.put_cf(cf, compound_key(shipment_id.0, rate.id.0), serde_json::to_vec(&rate)?);
            if rate.is_selected {
                chosen = Some(rate);
            }
        }
        self.db.write(batch)?;
        Ok(chosen)
    }

    async fn selected(&self, shipment_id: ShipmentId) -> Result<Option<Rate>> {
        let rates: Vec<Rate> = self.scan(CF_RATES, &shipment_id.to_be_bytes())?;
        Ok(rates.into_iter().find(|r| r.is_selected))
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn create(&self, new: NewPaymentTransaction, now: DateTime<Utc>) -> Result<PaymentTransaction> {
        let _guard = self.write_lock.lock().await;
        let id = TransactionId(self.next_id(COUNTER_PAYMENTS)?);
        let tx = PaymentTransaction::new(id, new, now);
        self.put_json(CF_PAYMENTS, &id.to_be_bytes(), &tx)?;
        Ok(tx)
    }

    async fn update(&self, tx: PaymentTransaction) -> Result<()> {
        self.put_json(CF_PAYMENTS, &tx.id.to_be_bytes(), &tx)
    }

    async fn get(&self, id: TransactionId) -> Result<Option<PaymentTransaction>> {
        self.get_json(CF_PAYMENTS, &id.to_be_bytes())
    }

    async fn find_by_custom_id(&self, custom_id: &str) -> Result<Option<PaymentTransaction>> {
        self.find_payment(|tx| tx.custom_id == custom_id)
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<PaymentTransaction>> {
        self.find_payment(|tx| tx.order_id.as_deref() == Some(order_id))
    }

    async fn find_by_capture_id(&self, capture_id: &str) -> Result<Option<PaymentTransaction>> {
        self.find_payment(|tx| tx.capture_id.as_deref() == Some(capture_id))
    }

    async fn for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<PaymentTransaction>> {
        let all: Vec<PaymentTransaction> = self.scan(CF_PAYMENTS, &[])?;
        Ok(all.into_iter().filter(|tx| tx.shipment_id == shipment_id).collect())
    }
}

#[async_trait]
impl TrackingStore for RocksDBStore {
    async fn append(&self, shipment_id: ShipmentId, events: Vec<TrackingEvent>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let mut history: Vec<TrackingEvent> = self.scan(CF_TRACKING, &shipment_id.to_be_bytes())?;
        let cf = self.cf(CF_TRACKING)?;
        let mut batch = WriteBatch::default();
        let mut added = 0;
        for event in events {
            if history.iter().any(|e| e.same_scan(&event)) {
                continue;
            }
            let seq = history.len() as u64;
            batch.put_cf(cf, compound_key(shipment_id.0, seq), serde_json::to_vec(&event)?);
            history.push(event);
            added += 1;
        }
        self.db.write(batch)?;
        Ok(added)
    }

    async fn for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<TrackingEvent>> {
        self.scan(CF_TRACKING, &shipment_id.to_be_bytes())
    }
}

#[async_trait]
impl ProcessedEventStore for RocksDBStore {
    async fn processed_since(&self, event_id: &str, since: DateTime<Utc>) -> Result<bool> {
        let at: Option<DateTime<Utc>> = self.get_json(CF_WEBHOOK_EVENTS, event_id.as_bytes())?;
        Ok(at.is_some_and(|at| at >= since))
    }

    async fn record(&self, event_id: &str, at: DateTime<Utc>) -> Result<()> {
        self.put_json(CF_WEBHOOK_EVENTS, event_id.as_bytes(), &at)
    }

    async fn purge_before(&self, before: DateTime<Utc>) -> Result<usize> {
        let _guard = self.write_lock.lock().await;
        let cf = self.cf(CF_WEBHOOK_EVENTS)?;
        let mut batch = WriteBatch::default();
        let mut removed = 0;
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (key, value) = item?;
            let at: DateTime<Utc> = serde_json::from_slice(&value)?;
            if at < before {
                batch.delete_cf(cf, key);
                removed += 1;
            }
        }
        self.db.write(batch)?;
        Ok(removed)
    }
}
