//! Event bus subscribers: invoice metrics and receipt e-mails.
//!
//! The bus hands out blocking `std::sync::mpsc` subscriptions, so a worker
//! thread drains the subscription and forwards envelopes to a tokio task
//! that does the async work (store reads, mail).

use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, TryRecvError};
use std::thread;
use std::time::Duration;

use serde_json::Value as JsonValue;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tracing::{debug, warn};

use spadesk_events::{EventBus, EventEnvelope, Subscription};
use spadesk_invoicing::{Invoice, InvoiceEvent, InvoiceIssued};

use crate::backoffice::Backoffice;
use crate::mailer::MailMessage;
use crate::metrics::Metrics;
use crate::store::Document;

/// Stops the forwarding thread and the async handler.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ListenerHandle {
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
        self.task.abort();
    }
}

/// Subscribe to the backoffice bus and start handling invoice events.
///
/// Must be called from within a tokio runtime.
pub fn spawn_listeners(
    backoffice: Arc<Backoffice>,
    metrics: Metrics,
) -> std::io::Result<ListenerHandle> {
    let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
    let (forward_tx, mut forward_rx) = unbounded_channel::<EventEnvelope<JsonValue>>();
    let sub = backoffice.bus().subscribe();

    let join = thread::Builder::new()
        .name("spadesk-listeners".to_string())
        .spawn(move || forward_loop(sub, shutdown_rx, forward_tx))?;

    let task = tokio::spawn(async move {
        while let Some(envelope) = forward_rx.recv().await {
            handle(&backoffice, &metrics, envelope).await;
        }
    });

    Ok(ListenerHandle {
        shutdown: shutdown_tx,
        join: Some(join),
        task,
    })
}

fn forward_loop(
    sub: Subscription<EventEnvelope<JsonValue>>,
    shutdown_rx: mpsc::Receiver<()>,
    forward: UnboundedSender<EventEnvelope<JsonValue>>,
) {
    let tick = Duration::from_millis(250);
    loop {
        match shutdown_rx.try_recv() {
            Ok(()) | Err(TryRecvError::Disconnected) => break,
            Err(TryRecvError::Empty) => {}
        }
        match sub.recv_timeout(tick) {
            Ok(envelope) => {
                if envelope.aggregate_type() != Invoice::COLLECTION {
                    continue;
                }
                if forward.send(envelope).is_err() {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

async fn handle(backoffice: &Backoffice, metrics: &Metrics, envelope: EventEnvelope<JsonValue>) {
    let event: InvoiceEvent = match serde_json::from_value(envelope.payload().clone()) {
        Ok(event) => event,
        Err(err) => {
            warn!(error = %err, event_type = envelope.event_type(), "undecodable invoice event");
            return;
        }
    };
    match event {
        InvoiceEvent::InvoiceIssued(issued) => {
            metrics.invoice_issued(issued.pricing.grand_total.minor());
            send_receipt(backoffice, &issued).await;
        }
        InvoiceEvent::InvoiceVoided(_) => metrics.invoice_voided(),
        InvoiceEvent::PaymentRegistered(_) => {}
    }
}

async fn send_receipt(backoffice: &Backoffice, issued: &InvoiceIssued) {
    let Some(customer_id) = issued.customer_id else {
        return;
    };
    let customer = match backoffice
        .stores
        .customers
        .get(issued.tenant_id, &customer_id)
        .await
    {
        Ok(Some(customer)) => customer,
        Ok(None) => return,
        Err(err) => {
            warn!(error = %err, "receipt skipped: customer lookup failed");
            return;
        }
    };
    let Some(to) = customer.email else {
        debug!(invoice = %issued.number, "customer has no e-mail; no receipt");
        return;
    };

    let message = MailMessage {
        from: backoffice.mailer.from_address().to_string(),
        to,
        subject: format!("Your receipt {}", issued.number),
        body: receipt_body(&customer.name, issued),
    };
    if let Err(err) = backoffice.mailer.send(message).await {
        warn!(error = %err, invoice = %issued.number, "receipt not sent");
    }
}

fn receipt_body(name: &str, issued: &InvoiceIssued) -> String {
    let p = &issued.pricing;
    let mut body = format!("Hi {name},\n\nThank you for your visit.\n\n");
    for line in &p.lines {
        body.push_str(&format!("{} x{}  {}\n", line.name, line.quantity, line.total));
    }
    body.push_str(&format!("\nSubtotal: {}\n", p.subtotal));
    let discounts = p.coupon_discount + p.referral_discount;
    if discounts.is_positive() {
        body.push_str(&format!("Discounts: -{discounts}\n"));
    }
    body.push_str(&format!("Tax: {}\nTotal: {}\n", p.tax_total, p.grand_total));
    let tenders = p.gift_card_applied + p.loyalty_applied + p.cashback_applied;
    if tenders.is_positive() {
        body.push_str(&format!("Paid with gift card/points/wallet: {tenders}\n"));
    }
    body.push_str(&format!("Amount due: {}\n", p.amount_due));
    if p.points_earned > 0 {
        body.push_str(&format!("Points earned: {}\n", p.points_earned));
    }
    body
}
