//! Customer directory: list, create and client-side search.
//!
//! Customers are never updated or deleted from the dashboard.

use tracing::info;

use crate::auth::AdminContext;
use crate::error::AdminError;
use crate::models::{decode_rows, Customer, NewCustomer, CUSTOMERS};
use crate::remote::Query;

pub async fn list_customers(ctx: &AdminContext) -> Result<Vec<Customer>, AdminError> {
    let rows = ctx
        .store
        .select(CUSTOMERS, &Query::all().newest_first())
        .await?;
    decode_rows("customer", rows)
}

/// Insert a customer and return the refreshed list.
pub async fn create_customer(
    ctx: &AdminContext,
    customer: &NewCustomer,
) -> Result<Vec<Customer>, AdminError> {
    let row = customer.to_row()?;
    let inserted = ctx.store.insert(CUSTOMERS, row).await?;
    if let Some(id) = inserted.first().and_then(|r| r.get("id")) {
        info!(customer_id = %id, "customer created");
    }
    list_customers(ctx).await
}

/// Case-insensitive substring match over `"{name} {phone} {whatsapp_id}"`,
/// so a query may span fields. A blank query keeps every customer.
pub fn filter_customers<'a>(customers: &'a [Customer], query: &str) -> Vec<&'a Customer> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return customers.iter().collect();
    }
    customers
        .iter()
        .filter(|c| {
            format!(
                "{} {} {}",
                c.name,
                c.phone,
                c.whatsapp_id.as_deref().unwrap_or("")
            )
            .to_lowercase()
            .contains(&needle)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_context;
    use crate::remote::MemoryStore;
    use std::sync::Arc;

    fn customer(id: &str, name: &str, phone: &str, whatsapp: Option<&str>) -> Customer {
        Customer {
            id: id.into(),
            name: name.into(),
            phone: phone.into(),
            whatsapp_id: whatsapp.map(str::to_string),
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn created_customer_appears_first_on_refetch() {
        let store = Arc::new(MemoryStore::new());
        store.seed(
            CUSTOMERS,
            vec![serde_json::json!({
                "id": "c-old",
                "name": "Old",
                "phone": "1",
                "created_at": "2020-01-01T00:00:00+00:00"
            })],
        );
        let ctx = test_context(store.clone());
        let list = create_customer(
            &ctx,
            &NewCustomer {
                name: " Ana ".into(),
                phone: "555-0101".into(),
                whatsapp_id: Some("   ".into()),
            },
        )
        .await
        .unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "Ana");
        assert_eq!(list[0].whatsapp_id, None);
        assert_eq!(list[1].id, "c-old");
    }

    #[tokio::test]
    async fn missing_phone_never_reaches_the_store() {
        let store = Arc::new(MemoryStore::new());
        let ctx = test_context(store.clone());
        let err = create_customer(
            &ctx,
            &NewCustomer {
                name: "Ana".into(),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AdminError::Validation(_)));
        assert!(store.rows(CUSTOMERS).is_empty());
    }

    #[test]
    fn filter_matches_any_field_ignoring_case() {
        let all = vec![
            customer("1", "Ana Perez", "555-0101", None),
            customer("2", "Luis", "555-0202", Some("LUIS_WA")),
            customer("3", "Marta", "777", None),
        ];
        let ids = |q: &str| -> Vec<String> {
            filter_customers(&all, q)
                .into_iter()
                .map(|c| c.id.clone())
                .collect()
        };
        assert_eq!(ids("ana"), vec!["1"]);
        assert_eq!(ids("555"), vec!["1", "2"]);
        assert_eq!(ids("luis_wa"), vec!["2"]);
        assert_eq!(ids("  "), vec!["1", "2", "3"]);
        assert!(ids("zzz").is_empty());
    }

    #[test]
    fn query_may_span_name_and_phone() {
        let all = vec![
            customer("1", "Ana Perez", "555-0101", None),
            customer("2", "Luis", "555-0202", Some("LUIS_WA")),
        ];
        let hits = filter_customers(&all, "perez 555");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "1");
        assert_eq!(filter_customers(&all, "0202 luis_wa")[0].id, "2");
    }
}
