use crate::domain::notification::NotificationKind;
use crate::domain::ports::Notifier;
use crate::domain::shipment::Shipment;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Writes customer notifications to the log instead of delivering them.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, shipment: &Shipment, kind: NotificationKind) -> Result<()> {
        let recipient = if shipment.sender.email.is_empty() {
            "<no email>"
        } else {
            shipment.sender.email.as_str()
        };
        info!(
            shipment_id = %shipment.id,
            notification = %kind,
            recipient,
            status = %shipment.status,
            tracking_number = shipment.tracking_number.as_deref().unwrap_or("-"),
            "customer notification"
        );
        Ok(())
    }
}
