use crate::domain::ids::{RateId, ShipmentId, TransactionId};
use crate::domain::payment::{NewPaymentTransaction, PaymentTransaction};
use crate::domain::ports::{
    PaymentStore, ProcessedEventStore, RateStore, ShipmentStore, Stores, TrackingStore,
};
use crate::domain::rate::{Rate, RateQuote};
use crate::domain::shipment::{NewShipment, Shipment, ShipmentStatus};
use crate::domain::tracking::TrackingEvent;
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::RwLock;

impl Stores {
    /// Fresh in-memory stores, used by tests and when no database path is configured.
    pub fn in_memory() -> Self {
        Self {
            shipments: Box::new(InMemoryShipmentStore::new()),
            rates: Box::new(InMemoryRateStore::new()),
            payments: Box::new(InMemoryPaymentStore::new()),
            tracking: Box::new(InMemoryTrackingStore::new()),
        }
    }
}

/// A thread-safe in-memory store for shipments.
///
/// Uses `Arc<RwLock<HashMap<ShipmentId, Shipment>>>`; the compare-and-swap runs under the
/// write lock so status checks and writes cannot interleave.
#[derive(Default, Clone)]
pub struct InMemoryShipmentStore {
    shipments: Arc<RwLock<HashMap<ShipmentId, Shipment>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryShipmentStore {
    /// Creates a new, empty in-memory shipment store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShipmentStore for InMemoryShipmentStore {
    async fn create(&self, new: NewShipment, now: DateTime<Utc>) -> Result<Shipment> {
        let id = ShipmentId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let shipment = Shipment::new(id, new, now);
        let mut shipments = self.shipments.write().await;
        shipments.insert(id, shipment.clone());
        Ok(shipment)
    }

    async fn get(&self, id: ShipmentId) -> Result<Option<Shipment>> {
        let shipments = self.shipments.read().await;
        Ok(shipments.get(&id).cloned())
    }

    async fn compare_and_swap(&self, expected: ShipmentStatus, shipment: Shipment) -> Result<bool> {
        let mut shipments = self.shipments.write().await;
        match shipments.get(&shipment.id) {
            Some(current) if current.status == expected => {
                shipments.insert(shipment.id, shipment);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

/// In-memory rates, grouped per shipment.
#[derive(Default, Clone)]
pub struct InMemoryRateStore {
    rates: Arc<RwLock<HashMap<ShipmentId, Vec<Rate>>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryRateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RateStore for InMemoryRateStore {
    async fn insert_all(&self, shipment_id: ShipmentId, quotes: Vec<RateQuote>) -> Result<Vec<Rate>> {
        let stored: Vec<Rate> = quotes
            .into_iter()
            .map(|quote| {
                let id = RateId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
                Rate::from_quote(id, shipment_id, quote)
            })
            .collect();
        let mut rates = self.rates.write().await;
        rates.entry(shipment_id).or_default().extend(stored.iter().cloned());
        Ok(stored)
    }

    async fn for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<Rate>> {
        let rates = self.rates.read().await;
        let mut list = rates.get(&shipment_id).cloned().unwrap_or_default();
        list.sort_by(|a, b| a.total_rate.cmp(&b.total_rate).then(a.id.cmp(&b.id)));
        Ok(list)
    }

    async fn select(&self, shipment_id: ShipmentId, rate_id: RateId) -> Result<Option<Rate>> {
        let mut rates = self.rates.write().await;
        let Some(list) = rates.get_mut(&shipment_id) else {
            return Ok(None);
        };
        if !list.iter().any(|r| r.id == rate_id) {
            return Ok(None);
        }
        let mut chosen = None;
        for rate in list.iter_mut() {
            rate.is_selected = rate.id == rate_id;
            if rate.is_selected {
                chosen = Some(rate.clone());
            }
        }
        Ok(chosen)
    }

    async fn selected(&self, shipment_id: ShipmentId) -> Result<Option<Rate>> {
        let rates = self.rates.read().await;
        Ok(rates
            .get(&shipment_id)
            .and_then(|list| list.iter().find(|r| r.is_selected).cloned()))
    }
}

/// In-memory payment transactions.
///
/// Secondary lookups scan the map; volumes here are one shipment at a time.
#[derive(Default, Clone)]
pub struct InMemoryPaymentStore {
    transactions: Arc<RwLock<HashMap<TransactionId, PaymentTransaction>>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn find(&self, pred: impl Fn(&PaymentTransaction) -> bool) -> Option<PaymentTransaction> {
        let transactions = self.transactions.read().await;
        transactions
            .values()
            .filter(|tx| pred(tx))
            .max_by_key(|tx| tx.id)
            .cloned()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn create(&self, new: NewPaymentTransaction, now: DateTime<Utc>) -> Result<PaymentTransaction> {
        let id = TransactionId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let tx = PaymentTransaction::new(id, new, now);
        let mut transactions = self.transactions.write().await;
        transactions.insert(id, tx.clone());
        Ok(tx)
    }

    async fn update(&self, tx: PaymentTransaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        transactions.insert(tx.id, tx);
        Ok(())
    }

    async fn get(&self, id: TransactionId) -> Result<Option<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        Ok(transactions.get(&id).cloned())
    }

    async fn find_by_custom_id(&self, custom_id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self.find(|tx| tx.custom_id == custom_id).await)
    }

    async fn find_by_order_id(&self, order_id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self.find(|tx| tx.order_id.as_deref() == Some(order_id)).await)
    }

    async fn find_by_capture_id(&self, capture_id: &str) -> Result<Option<PaymentTransaction>> {
        Ok(self.find(|tx| tx.capture_id.as_deref() == Some(capture_id)).await)
    }

    async fn for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<PaymentTransaction>> {
        let transactions = self.transactions.read().await;
        let mut list: Vec<_> = transactions
            .values()
            .filter(|tx| tx.shipment_id == shipment_id)
            .cloned()
            .collect();
        list.sort_by_key(|tx| tx.id);
        Ok(list)
    }
}

/// Append-only in-memory tracking history.
#[derive(Default, Clone)]
pub struct InMemoryTrackingStore {
    events: Arc<RwLock<HashMap<ShipmentId, Vec<TrackingEvent>>>>,
}

impl InMemoryTrackingStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackingStore for InMemoryTrackingStore {
    async fn append(&self, shipment_id: ShipmentId, events: Vec<TrackingEvent>) -> Result<usize> {
        let mut all = self.events.write().await;
        let history = all.entry(shipment_id).or_default();
        let mut added = 0;
        for event in events {
            if !history.iter().any(|e| e.same_scan(&event)) {
                history.push(event);
                added += 1;
            }
        }
        Ok(added)
    }

    async fn for_shipment(&self, shipment_id: ShipmentId) -> Result<Vec<TrackingEvent>> {
        let all = self.events.read().await;
        Ok(all.get(&shipment_id).cloned().unwrap_or_default())
    }
}

/// Seen webhook event ids with the time they were processed.
#[derive(Default, Clone)]
pub struct InMemoryProcessedEventStore {
    seen: Arc<RwLock<HashMap<String, DateTime<Utc>>>>,
}

impl InMemoryProcessedEventStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProcessedEventStore for InMemoryProcessedEventStore {
    async fn processed_since(&self, event_id: &str, since: DateTime<Utc>) -> Result<bool> {
        let seen = self.seen.read().await;
        Ok(seen.get(event_id).is_some_and(|at| *at >= since))
    }

    async fn record(&self, event_id: &str, at: DateTime<Utc>) -> Result<()> {
        let mut seen = self.seen.write().await;
        seen.insert(event_id.to_string(), at);
        Ok(())
    }

    async fn purge_before(&self, before: DateTime<Utc>) -> Result<usize> {
        let mut seen = self.seen.write().await;
        let len = seen.len();
        seen.retain(|_, at| *at >= before);
        Ok(len - seen.len())
    }
}
