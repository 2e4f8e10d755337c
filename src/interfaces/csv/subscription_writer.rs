use crate::domain::subscription::Subscription;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct SubscriptionRow<'a> {
    id: u64,
    user_id: u64,
    plan_id: &'a str,
    status: &'static str,
    principal: String,
    total_credited: String,
    days_credited: u32,
    last_credited_on: Option<String>,
    activated_at: Option<String>,
}

impl<'a> From<&'a Subscription> for SubscriptionRow<'a> {
    fn from(s: &'a Subscription) -> Self {
        Self {
            id: s.id.0,
            user_id: s.user_id.0,
            plan_id: &s.plan_id,
            status: s.status().as_str(),
            principal: s.principal.to_string(),
            total_credited: s.total_credited().to_string(),
            days_credited: s.days_credited(),
            last_credited_on: s.last_credited_on().map(|d| d.to_string()),
            activated_at: s.activated_at().map(|t| t.to_rfc3339()),
        }
    }
}

/// Writes subscription state as CSV, one row per subscription, ordered by id.
pub struct SubscriptionWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> SubscriptionWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_subscriptions(&mut self, mut subscriptions: Vec<Subscription>) -> Result<()> {
        subscriptions.sort_by_key(|s| s.id);
        for subscription in &subscriptions {
            self.writer.serialize(SubscriptionRow::from(subscription))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::{Amount, Balance};
    use crate::domain::subscription::{PlanTerms, SubscriptionId, UserId};
    use chrono::{TimeZone, Utc};
    use rust_decimal_macros::dec;

    #[test]
    fn test_writes_header_and_sorted_rows() {
        let terms = PlanTerms::new(dec!(0.01), Some(Balance::new(dec!(10))), None).unwrap();
        let created = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let make = |id| {
            Subscription::pending(
                SubscriptionId(id),
                UserId(id),
                "gold",
                Amount::new(dec!(100.00)).unwrap(),
                terms.clone(),
                created,
            )
            .unwrap()
        };

        let mut out = Vec::new();
        SubscriptionWriter::new(&mut out)
            .write_subscriptions(vec![make(2), make(1)])
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(
            lines[0],
            "id,user_id,plan_id,status,principal,total_credited,days_credited,last_credited_on,activated_at"
        );
        assert_eq!(lines[1], "1,1,gold,pending,100,0,0,,");
        assert_eq!(lines[2], "2,2,gold,pending,100,0,0,,");
    }
}
