//! Scheduled per-tenant jobs.
//!
//! Every job claims `(tenant, job, date)` in the job-run store before doing
//! anything, so a job runs at most once per tenant per calendar day no
//! matter how many schedulers or manual triggers fire.

use std::sync::Arc;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use spadesk_accounts::{Account, BirthdayCoupon};
use spadesk_core::{Money, TenantId};
use spadesk_invoicing::{ReportFilter, SalesSummary, sales_summary};
use spadesk_parties::Customer;
use spadesk_promotions::{
    Coupon, CouponCommand, CouponId, CouponKind, CouponScope, CouponTerms, DiscountRule, Occasion,
};

use crate::backoffice::Backoffice;
use crate::command_dispatcher::DispatchError;
use crate::mailer::MailMessage;
use crate::unique_keys::KeyKind;

pub const GREETINGS: &str = "greetings";
pub const GIFT_CARD_REMINDERS: &str = "gift_card_reminders";
pub const DAILY_SUMMARY: &str = "daily_summary";

/// Cards expiring within this many days get a reminder.
pub const REMINDER_WINDOW_DAYS: i64 = 7;

/// What one `run_all` did for a tenant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JobReport {
    pub greetings_sent: u32,
    pub coupons_issued: u32,
    pub reminders_sent: u32,
    pub summary_sent: bool,
    /// Jobs that had already run today.
    pub skipped: Vec<&'static str>,
    /// Jobs that stopped on an error; they are not retried the same day.
    pub failed: Vec<&'static str>,
}

/// Whether `date` is the yearly recurrence of `on` (Feb 29 falls on Feb 28
/// in common years).
pub fn is_anniversary_of(on: NaiveDate, date: NaiveDate) -> bool {
    if on.month() == date.month() && on.day() == date.day() {
        return true;
    }
    on.month() == 2
        && on.day() == 29
        && date.month() == 2
        && date.day() == 28
        && NaiveDate::from_ymd_opt(date.year(), 2, 29).is_none()
}

fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

impl Backoffice {
    /// Run every job for one tenant; jobs already run today are skipped.
    pub async fn run_all(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<JobReport, DispatchError> {
        let account = self.account(tenant_id).await?;
        let today = now.date_naive();
        let mut report = JobReport::default();

        if self.claim(tenant_id, GREETINGS, today, &mut report).await? {
            let result = self.send_greetings(tenant_id, &account, now, &mut report).await;
            record_failure(tenant_id, GREETINGS, result, &mut report);
        }
        if self
            .claim(tenant_id, GIFT_CARD_REMINDERS, today, &mut report)
            .await?
        {
            match self.send_gift_card_reminders(tenant_id, now).await {
                Ok(sent) => report.reminders_sent = sent,
                Err(err) => record_failure(tenant_id, GIFT_CARD_REMINDERS, Err(err), &mut report),
            }
        }
        if self.claim(tenant_id, DAILY_SUMMARY, today, &mut report).await? {
            match self.send_daily_summary(tenant_id, &account, now).await {
                Ok(sent) => report.summary_sent = sent,
                Err(err) => record_failure(tenant_id, DAILY_SUMMARY, Err(err), &mut report),
            }
        }

        info!(tenant_id = %tenant_id, ?report, "jobs finished");
        Ok(report)
    }

    async fn claim(
        &self,
        tenant_id: TenantId,
        job: &'static str,
        date: NaiveDate,
        report: &mut JobReport,
    ) -> Result<bool, DispatchError> {
        let claimed = self.stores.job_runs.try_claim(tenant_id, job, date).await?;
        if !claimed {
            debug!(tenant_id = %tenant_id, job, "already ran today");
            report.skipped.push(job);
        }
        Ok(claimed)
    }

    async fn mail(&self, to: &str, subject: String, body: String) -> bool {
        let message = MailMessage {
            from: self.mailer.from_address().to_string(),
            to: to.to_string(),
            subject,
            body,
        };
        match self.mailer.send(message).await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, to, "mail not sent");
                false
            }
        }
    }

    async fn send_greetings(
        &self,
        tenant_id: TenantId,
        account: &Account,
        now: DateTime<Utc>,
        report: &mut JobReport,
    ) -> Result<(), DispatchError> {
        let today = now.date_naive();
        let business = &account.profile.business_name;
        for customer in self.list(self.stores.customers.as_ref(), tenant_id).await? {
            let Some(email) = customer.email.clone().filter(|_| customer.active) else {
                continue;
            };
            let occasions = [
                (Occasion::Birthday, customer.birthday),
                (Occasion::Anniversary, customer.anniversary),
            ];
            for (occasion, date) in occasions {
                if !date.is_some_and(|d| is_anniversary_of(d, today)) {
                    continue;
                }
                let mut body = match occasion {
                    Occasion::Birthday => format!("Happy birthday, {}!", customer.name),
                    Occasion::Anniversary => format!("Happy anniversary, {}!", customer.name),
                };
                if let Some(offer) = account.loyalty.birthday_coupon {
                    // The greeting still goes out without a code.
                    match self
                        .issue_promotion_coupon(tenant_id, &customer, occasion, offer, now)
                        .await
                    {
                        Ok(code) => {
                            report.coupons_issued += 1;
                            body.push_str(&format!(
                                " Use code {code} for {} off your next visit (valid {} days).",
                                offer.rate, offer.valid_days
                            ));
                        }
                        Err(err) => {
                            warn!(customer_id = %customer.id, error = %err, "greeting coupon not issued");
                        }
                    }
                }
                let subject = format!("Greetings from {business}");
                if self.mail(&email, subject, body).await {
                    report.greetings_sent += 1;
                }
            }
        }
        Ok(())
    }

    async fn issue_promotion_coupon(
        &self,
        tenant_id: TenantId,
        customer: &Customer,
        occasion: Occasion,
        offer: BirthdayCoupon,
        now: DateTime<Utc>,
    ) -> Result<String, DispatchError> {
        let prefix = match occasion {
            Occasion::Birthday => "BD",
            Occasion::Anniversary => "AN",
        };
        let coupon_id = CouponId::generate();
        let key = self
            .claim_generated_code(tenant_id, KeyKind::CouponCode, coupon_id, prefix, 8)
            .await?;
        let code = key.value.clone();
        let coupon = self
            .with_unique_keys(tenant_id, coupon_id, &[], &[key], || {
                self.dispatch(
                    self.stores.coupons.as_ref(),
                    tenant_id,
                    coupon_id,
                    CouponCommand::Create {
                        tenant_id,
                        terms: CouponTerms {
                            code,
                            description: Some(format!("{occasion:?} greeting")),
                            kind: CouponKind::Promotion {
                                customer: customer.id,
                                occasion,
                            },
                            rule: DiscountRule::Percent(offer.rate),
                            max_discount: None,
                            min_spend: Money::ZERO,
                            scope: CouponScope::All,
                            valid_from: now,
                            valid_until: now + Duration::days(i64::from(offer.valid_days)),
                            usage_limit: Some(1),
                            per_customer_limit: Some(1),
                        },
                        occurred_at: now,
                    },
                    Coupon::empty,
                )
            })
            .await?;
        Ok(coupon.code().to_string())
    }

    async fn send_gift_card_reminders(
        &self,
        tenant_id: TenantId,
        now: DateTime<Utc>,
    ) -> Result<u32, DispatchError> {
        let horizon = now + Duration::days(REMINDER_WINDOW_DAYS);
        let mut sent = 0;
        for card in self.list(self.stores.gift_cards.as_ref(), tenant_id).await? {
            if !card.is_active()
                || !card.balance().is_positive()
                || card.is_expired(now)
                || card.expires_at() > horizon
            {
                continue;
            }
            let Some(owner) = card.owner() else { continue };
            let customer = match self.stores.customers.get(tenant_id, &owner).await {
                Ok(Some(customer)) => customer,
                Ok(None) => continue,
                Err(err) => {
                    warn!(card = card.code(), error = %err, "gift card owner not loaded");
                    continue;
                }
            };
            let Some(email) = customer.email.as_deref() else {
                continue;
            };
            let body = format!(
                "Your gift card {} has {} left and expires on {}.",
                card.code(),
                card.balance(),
                card.expires_at().date_naive()
            );
            if self
                .mail(email, "Your gift card is about to expire".to_string(), body)
                .await
            {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Yesterday's sales, e-mailed to the account address.
    async fn send_daily_summary(
        &self,
        tenant_id: TenantId,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<bool, DispatchError> {
        let today = now.date_naive();
        let yesterday = today - Duration::days(1);
        let filter = ReportFilter {
            from: Some(start_of_day(yesterday)),
            to: Some(start_of_day(today)),
            outlet_id: None,
        };
        let invoices = self.stores.invoices.list(tenant_id).await?;
        let summary = sales_summary(&invoices, &filter);
        let subject = format!("{} sales for {yesterday}", account.profile.business_name);
        Ok(self
            .mail(&account.profile.email, subject, summary_body(&summary, &account.profile.currency))
            .await)
    }

    /// Run all jobs for every tenant with an account.
    pub async fn run_all_tenants(&self, now: DateTime<Utc>) -> Result<(), DispatchError> {
        for tenant_id in self.stores.accounts.tenants().await? {
            if let Err(err) = self.run_all(tenant_id, now).await {
                error!(tenant_id = %tenant_id, error = %err, "jobs failed");
            }
        }
        Ok(())
    }
}

fn record_failure(
    tenant_id: TenantId,
    job: &'static str,
    result: Result<(), DispatchError>,
    report: &mut JobReport,
) {
    if let Err(err) = result {
        error!(tenant_id = %tenant_id, job, error = %err, "job failed");
        report.failed.push(job);
    }
}

fn summary_body(summary: &SalesSummary, currency: &str) -> String {
    let mut body = format!(
        "Invoices: {}\nVoided: {}\nGross: {currency} {}\nDiscounts: {currency} {}\nTax: {currency} {}\nGrand total: {currency} {}\nCollected: {currency} {}\n",
        summary.invoice_count,
        summary.void_count,
        summary.gross,
        summary.line_discounts + summary.coupon_discounts + summary.referral_discounts,
        summary.tax,
        summary.grand_total,
        summary.collected,
    );
    for (mode, amount) in &summary.collected_by_mode {
        body.push_str(&format!("  {}: {currency} {amount}\n", mode.as_str()));
    }
    body
}

/// Run the jobs for all tenants every `interval` until the task is aborted.
pub fn spawn_scheduler(backoffice: Arc<Backoffice>, interval: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            if let Err(err) = backoffice.run_all_tenants(Utc::now()).await {
                error!(error = %err, "job scheduler pass failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn anniversaries_recur_yearly() {
        assert!(is_anniversary_of(d(1990, 6, 15), d(2026, 6, 15)));
        assert!(!is_anniversary_of(d(1990, 6, 15), d(2026, 6, 16)));
    }

    #[test]
    fn leap_day_birthdays_fall_on_feb_28_in_common_years() {
        assert!(is_anniversary_of(d(2000, 2, 29), d(2026, 2, 28)));
        assert!(!is_anniversary_of(d(2000, 2, 29), d(2028, 2, 28)));
        assert!(is_anniversary_of(d(2000, 2, 29), d(2028, 2, 29)));
    }
}
