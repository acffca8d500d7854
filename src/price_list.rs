//! Price list maintenance and unit-price lookup.

use tracing::info;

use crate::auth::AdminContext;
use crate::error::AdminError;
use crate::models::{decode_rows, PriceListEntry, PriceListItem, PRICE_LIST};
use crate::remote::Query;

/// Conflict key for price upserts.
pub const PRICE_KEY: &str = "service_type,material";

pub async fn list_prices(ctx: &AdminContext) -> Result<Vec<PriceListItem>, AdminError> {
    let rows = ctx
        .store
        .select(PRICE_LIST, &Query::all().newest_first())
        .await?;
    decode_rows("price", rows)
}

/// Create or replace the price of a `(service_type, material)` pair.
pub async fn upsert_price(
    ctx: &AdminContext,
    entry: &PriceListEntry,
) -> Result<Vec<PriceListItem>, AdminError> {
    let row = entry.to_row()?;
    ctx.store.upsert(PRICE_LIST, row, PRICE_KEY).await?;
    info!(
        service_type = %entry.service_type.trim(),
        material = %entry.material.trim(),
        base_price = entry.base_price,
        "price saved"
    );
    list_prices(ctx).await
}

fn same(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

/// Unit price for an order line. The express price applies only to the
/// `express` service and only when one is configured.
pub fn resolve_unit_price(
    items: &[PriceListItem],
    service_type: &str,
    material: &str,
) -> Result<f64, AdminError> {
    let item = items
        .iter()
        .find(|p| same(&p.service_type, service_type) && same(&p.material, material))
        .ok_or_else(|| AdminError::PriceNotFound {
            service_type: service_type.trim().to_string(),
            material: material.trim().to_string(),
        })?;
    match item.express_price {
        Some(express) if same(service_type, "express") => Ok(express),
        _ => Ok(item.base_price),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_context;
    use crate::remote::MemoryStore;
    use std::sync::Arc;

    fn item(service: &str, material: &str, base: f64, express: Option<f64>) -> PriceListItem {
        PriceListItem {
            id: format!("{service}-{material}"),
            service_type: service.into(),
            material: material.into(),
            base_price: base,
            express_price: express,
            created_at: None,
        }
    }

    #[test]
    fn lookup_ignores_case_and_whitespace() {
        let items = vec![item("Deep Clean", "Leather", 10.0, Some(15.0))];
        assert_eq!(
            resolve_unit_price(&items, " deep clean", "LEATHER ").unwrap(),
            10.0
        );
    }

    #[test]
    fn express_service_uses_express_price_when_set() {
        let items = vec![
            item("Express", "Suede", 12.0, Some(18.0)),
            item("express", "Canvas", 8.0, None),
        ];
        assert_eq!(resolve_unit_price(&items, "EXPRESS", "suede").unwrap(), 18.0);
        assert_eq!(resolve_unit_price(&items, "express", "canvas").unwrap(), 8.0);
    }

    #[test]
    fn missing_row_is_price_not_found() {
        let err = resolve_unit_price(&[], "Deep Clean", "Leather").unwrap_err();
        assert!(matches!(err, AdminError::PriceNotFound { .. }));
    }

    #[tokio::test]
    async fn upsert_replaces_existing_pair() {
        let ctx = test_context(Arc::new(MemoryStore::new()));
        let entry = |base| PriceListEntry {
            service_type: "Deep Clean".into(),
            material: "Leather".into(),
            base_price: base,
            express_price: None,
        };
        upsert_price(&ctx, &entry(10.0)).await.unwrap();
        let prices = upsert_price(&ctx, &entry(12.5)).await.unwrap();
        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].base_price, 12.5);
    }

    #[tokio::test]
    async fn negative_price_is_rejected() {
        let ctx = test_context(Arc::new(MemoryStore::new()));
        let err = upsert_price(
            &ctx,
            &PriceListEntry {
                service_type: "x".into(),
                material: "y".into(),
                base_price: -1.0,
                express_price: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AdminError::Validation(_)));
    }
}
