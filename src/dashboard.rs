//! Dashboard aggregation.
//!
//! [`OrderBoard`] is the single source of truth for the orders shown on the
//! dashboard. The bulk load and change-feed events both go through
//! [`OrderBoard::merge`], so a late bulk response cannot overwrite a newer
//! row delivered by the feed.

use chrono::{DateTime, Datelike, Months, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};

use crate::models::{Customer, Order, OrderStatus, Receipt};
use crate::realtime::ChangeEvent;

const MONTHS_IN_SERIES: u32 = 6;
const TOP_SERVICES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Stale,
}

#[derive(Debug, Default)]
pub struct OrderBoard {
    orders: HashMap<String, Order>,
}

impl OrderBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep whichever copy has the newest revision. Equal revisions take
    /// the incoming row.
    pub fn merge(&mut self, incoming: Order) -> MergeOutcome {
        match self.orders.get(&incoming.id) {
            Some(current) if current.revision() > incoming.revision() => MergeOutcome::Stale,
            Some(_) => {
                self.orders.insert(incoming.id.clone(), incoming);
                MergeOutcome::Replaced
            }
            None => {
                self.orders.insert(incoming.id.clone(), incoming);
                MergeOutcome::Inserted
            }
        }
    }

    pub fn load(&mut self, orders: impl IntoIterator<Item = Order>) {
        for order in orders {
            self.merge(order);
        }
    }

    pub fn apply(&mut self, event: ChangeEvent) -> MergeOutcome {
        self.merge(event.order)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Order> {
        self.orders.get(id)
    }

    /// Every order, newest `created_at` first.
    pub fn orders(&self) -> Vec<&Order> {
        let mut list: Vec<&Order> = self.orders.values().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// Orders matching an optional status and a free-text query over the
    /// customer's name and phone and the pickup address.
    pub fn filter<'a>(
        &'a self,
        status: Option<OrderStatus>,
        query: &str,
        customers: &[Customer],
    ) -> Vec<&'a Order> {
        let needle = query.trim().to_lowercase();
        let by_id: HashMap<&str, &Customer> =
            customers.iter().map(|c| (c.id.as_str(), c)).collect();
        self.orders()
            .into_iter()
            .filter(|o| status.map_or(true, |s| o.status == s))
            .filter(|o| {
                if needle.is_empty() {
                    return true;
                }
                let customer = o.customer_id.as_deref().and_then(|id| by_id.get(id));
                let haystack = format!(
                    "{} {} {}",
                    customer.map(|c| c.name.as_str()).unwrap_or(""),
                    customer.map(|c| c.phone.as_str()).unwrap_or(""),
                    o.pickup_address.as_deref().unwrap_or(""),
                )
                .to_lowercase();
                haystack.contains(&needle)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusCount {
    pub status: OrderStatus,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthCount {
    pub year: i32,
    pub month: u32,
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServiceCount {
    pub label: String,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardSummary {
    pub total: usize,
    pub by_status: Vec<StatusCount>,
    pub revenue: f64,
    pub monthly: Vec<MonthCount>,
    pub top_services: Vec<ServiceCount>,
}

fn month_start(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive().with_day(1).unwrap_or_else(|| at.date_naive())
}

fn monthly_series(orders: &[&Order], now: DateTime<Utc>) -> Vec<MonthCount> {
    let current = month_start(now);
    let mut series: Vec<MonthCount> = (0..MONTHS_IN_SERIES)
        .rev()
        .filter_map(|back| current.checked_sub_months(Months::new(back)))
        .map(|d| MonthCount {
            year: d.year(),
            month: d.month(),
            label: d.format("%b %Y").to_string(),
            count: 0,
        })
        .collect();
    for order in orders {
        let (y, m) = (order.created_at.year(), order.created_at.month());
        if let Some(bucket) = series.iter_mut().find(|b| b.year == y && b.month == m) {
            bucket.count += 1;
        }
    }
    series
}

fn top_services(orders: &[&Order]) -> Vec<ServiceCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for order in orders {
        let label = format!("{} ({})", order.service_type, order.material_label());
        *counts.entry(label).or_default() += 1;
    }
    let mut list: Vec<ServiceCount> = counts
        .into_iter()
        .map(|(label, count)| ServiceCount { label, count })
        .collect();
    list.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    list.truncate(TOP_SERVICES);
    list
}

/// Totals for a (possibly filtered) set of orders. Revenue is the sum of the
/// recorded receipt totals of those orders.
pub fn summarize(orders: &[&Order], receipts: &[Receipt], now: DateTime<Utc>) -> DashboardSummary {
    let by_status = OrderStatus::ALL
        .iter()
        .map(|&status| StatusCount {
            status,
            count: orders.iter().filter(|o| o.status == status).count(),
        })
        .collect();

    let ids: HashSet<&str> = orders.iter().map(|o| o.id.as_str()).collect();
    let revenue_cents: i64 = receipts
        .iter()
        .filter(|r| ids.contains(r.order_id.as_str()))
        .filter_map(|r| r.total_amount)
        .map(|amount| (amount * 100.0).round() as i64)
        .sum();

    DashboardSummary {
        total: orders.len(),
        by_status,
        revenue: revenue_cents as f64 / 100.0,
        monthly: monthly_series(orders, now),
        top_services: top_services(orders),
    }
}
