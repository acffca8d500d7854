use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::{guard, payload_object, to_value, user_error};
use crate::auth::AdminContext;
use crate::customers::list_customers;
use crate::dashboard::{summarize, MergeOutcome, OrderBoard};
use crate::error::AdminError;
use crate::models::{decode_rows, Customer, Order, OrderStatus, Receipt, RECEIPTS};
use crate::orders::{list_orders, DASHBOARD_ORDER_LIMIT};
use crate::realtime;
use crate::remote::Query;

const RECENT_ORDERS: usize = 8;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DashboardFilterPayload {
    #[serde(default)]
    status: Option<String>,
    #[serde(default, alias = "q", alias = "search")]
    query: Option<String>,
}

pub(crate) struct DashboardFilter {
    pub status: Option<OrderStatus>,
    pub query: String,
}

pub(crate) fn parse_filter(arg0: Option<Value>) -> Result<DashboardFilter, String> {
    let payload: DashboardFilterPayload = serde_json::from_value(payload_object(arg0))
        .map_err(|e| format!("Invalid dashboard filter: {e}"))?;
    let status = match payload.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(raw.parse::<OrderStatus>()?),
    };
    Ok(DashboardFilter {
        status,
        query: payload.query.unwrap_or_default(),
    })
}

/// Everything the dashboard screen shows, loaded once.
pub(crate) struct DashboardData {
    pub board: OrderBoard,
    pub customers: Vec<Customer>,
    pub receipts: Vec<Receipt>,
}

impl DashboardData {
    pub async fn load(ctx: &AdminContext) -> Result<Self, AdminError> {
        let mut board = OrderBoard::new();
        board.load(list_orders(ctx, DASHBOARD_ORDER_LIMIT).await?);
        let customers = list_customers(ctx).await?;
        let receipts = decode_rows("receipt", ctx.store.select(RECEIPTS, &Query::all()).await?)?;
        Ok(Self {
            board,
            customers,
            receipts,
        })
    }

    pub fn filtered(&self, filter: &DashboardFilter) -> Vec<&Order> {
        self.board
            .filter(filter.status, &filter.query, &self.customers)
    }

    pub fn render(&self, filter: &DashboardFilter) -> Result<Value, String> {
        let orders = self.filtered(filter);
        let summary = summarize(&orders, &self.receipts, Utc::now());
        Ok(json!({
            "loaded": self.board.len(),
            "summary": to_value(&summary)?,
            "recent": to_value(&orders.iter().take(RECENT_ORDERS).collect::<Vec<_>>())?,
        }))
    }
}

pub async fn dashboard_get_summary(ctx: &AdminContext, arg0: Option<Value>) -> Result<Value, String> {
    guard(ctx)?;
    let filter = parse_filter(arg0)?;
    let data = DashboardData::load(ctx).await.map_err(user_error)?;
    data.render(&filter)
}

/// Subscribe to the change feed, bulk load, then re-emit the dashboard after
/// every change that altered the board. Returns when the feed closes.
pub async fn dashboard_watch<F>(ctx: &AdminContext, arg0: Option<Value>, mut emit: F) -> Result<(), String>
where
    F: FnMut(&Value),
{
    guard(ctx)?;
    let filter = parse_filter(arg0)?;
    // Subscribe before loading so no change between the two is lost.
    let mut events = realtime::subscribe_orders(&ctx.config)
        .await
        .map_err(user_error)?;
    let mut data = DashboardData::load(ctx).await.map_err(user_error)?;
    emit(&data.render(&filter)?);

    while let Some(event) = events.recv().await {
        let order_id = event.order.id.clone();
        match data.board.apply(event) {
            MergeOutcome::Stale => debug!(order_id = %order_id, "ignoring stale change"),
            outcome => {
                info!(order_id = %order_id, ?outcome, "order changed");
                emit(&data.render(&filter)?);
            }
        }
    }
    warn!("change feed ended");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{login, test_context};
    use crate::models::{CUSTOMERS, ORDERS};
    use crate::remote::MemoryStore;
    use std::sync::Arc;

    #[test]
    fn filter_accepts_legacy_and_blank_status() {
        assert_eq!(
            parse_filter(Some(json!({ "status": "en proceso" })))
                .unwrap()
                .status,
            Some(OrderStatus::Processing)
        );
        assert_eq!(parse_filter(Some(json!({ "status": " " }))).unwrap().status, None);
        assert!(parse_filter(Some(json!({ "status": "lost" }))).is_err());
    }

    #[tokio::test]
    async fn summary_reflects_filtered_orders_and_receipts() {
        let store = Arc::new(MemoryStore::new().with_admin("admin", "pw"));
        let this_month = Utc::now().to_rfc3339();
        store.seed(
            CUSTOMERS,
            vec![json!({ "id": "c-1", "name": "Ana", "phone": "1", "created_at": this_month })],
        );
        store.seed(
            ORDERS,
            vec![
                json!({ "id": "o-1", "customer_id": "c-1", "service_type": "Polish",
                        "material": "Suede", "quantity": 1, "status": "ready",
                        "created_at": this_month }),
                json!({ "id": "o-2", "service_type": "Polish", "material": "Suede",
                        "quantity": 1, "status": "received", "created_at": this_month }),
            ],
        );
        store.seed(
            RECEIPTS,
            vec![json!({ "id": "rc-1", "order_id": "o-1", "total_amount": 8.68 })],
        );
        let ctx = test_context(store);
        login(&ctx, "admin", "pw".to_string()).await.unwrap();

        let all = dashboard_get_summary(&ctx, None).await.unwrap();
        assert_eq!(all["loaded"], 2);
        assert_eq!(all["summary"]["total"], 2);
        assert_eq!(all["summary"]["revenue"], 8.68);
        assert_eq!(all["summary"]["monthly"][5]["count"], 2);
        assert_eq!(all["summary"]["topServices"][0]["label"], "Polish (Suede)");

        let ana = dashboard_get_summary(&ctx, Some(json!({ "query": "ana" })))
            .await
            .unwrap();
        assert_eq!(ana["summary"]["total"], 1);
        assert_eq!(ana["recent"][0]["id"], "o-1");
    }
}
