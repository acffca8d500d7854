//! CSV export of the dashboard's order list.
//!
//! The file opens cleanly in spreadsheet tools: UTF-8 BOM, CRLF line
//! endings, every data field double-quoted.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AdminError;
use crate::models::{Customer, Order, Rider};

const BOM: &str = "\u{FEFF}";
const HEADERS: [&str; 11] = [
    "ID", "Customer", "Phone", "Status", "Service", "Material", "Quantity", "Address", "Rider",
    "Notes", "Created",
];
const NO_RIDER: &str = "—";

fn quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

pub fn orders_csv(orders: &[&Order], riders: &[Rider], customers: &[Customer]) -> String {
    let riders: HashMap<&str, &Rider> = riders.iter().map(|r| (r.id.as_str(), r)).collect();
    let customers: HashMap<&str, &Customer> =
        customers.iter().map(|c| (c.id.as_str(), c)).collect();

    let mut lines = Vec::with_capacity(orders.len() + 1);
    lines.push(HEADERS.join(","));
    for order in orders {
        let customer = order
            .customer_id
            .as_deref()
            .and_then(|id| customers.get(id));
        let rider = order.rider_id.as_deref().and_then(|id| riders.get(id));
        let notes = order
            .notes
            .as_deref()
            .unwrap_or("")
            .replace("\r\n", " ")
            .replace(['\r', '\n'], " ");
        let fields = [
            order.id.clone(),
            customer.map(|c| c.name.clone()).unwrap_or_default(),
            customer.map(|c| c.phone.clone()).unwrap_or_default(),
            order.status.to_string(),
            order.service_type.clone(),
            order.material_label().to_string(),
            order.quantity.to_string(),
            order.pickup_address.clone().unwrap_or_default(),
            rider
                .map(|r| r.name.clone())
                .unwrap_or_else(|| NO_RIDER.to_string()),
            notes,
            order.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ];
        lines.push(
            fields
                .iter()
                .map(|f| quote(f))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    format!("{BOM}{}", lines.join("\r\n"))
}

/// `orders_2025-03-01T10-30-00.000Z.csv`
pub fn export_file_name(now: DateTime<Utc>) -> String {
    format!("orders_{}.csv", now.format("%Y-%m-%dT%H-%M-%S%.3fZ"))
}

pub fn write_export(csv: &str, dir: &Path, now: DateTime<Utc>) -> Result<PathBuf, AdminError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(export_file_name(now));
    fs::write(&path, csv.as_bytes())?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::OrderStatus;
    use chrono::TimeZone;

    fn sample() -> (Vec<Order>, Vec<Rider>, Vec<Customer>) {
        let created = Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 0).unwrap();
        let base = Order {
            id: "o-1".into(),
            customer_id: Some("c-1".into()),
            rider_id: Some("r-1".into()),
            service_type: "Deep Clean".into(),
            material: Some("Leather".into()),
            quantity: 2,
            notes: Some("say \"hi\"\nat door".into()),
            pickup_address: Some("Av. Central 12, Apt 3".into()),
            pickup_lat: None,
            pickup_lng: None,
            status: OrderStatus::Enroute,
            express: None,
            created_at: created,
            updated_at: None,
        };
        let unassigned = Order {
            id: "o-2".into(),
            customer_id: None,
            rider_id: None,
            notes: None,
            ..base.clone()
        };
        let riders = vec![Rider {
            id: "r-1".into(),
            name: "Carlos".into(),
            phone: "1".into(),
            zone: None,
            is_active: Some(true),
            created_at: None,
        }];
        let customers = vec![Customer {
            id: "c-1".into(),
            name: "Ana Perez".into(),
            phone: "555-0101".into(),
            whatsapp_id: None,
            created_at: created,
        }];
        (vec![base, unassigned], riders, customers)
    }

    #[test]
    fn csv_has_bom_header_and_crlf_rows() {
        let (orders, riders, customers) = sample();
        let refs: Vec<&Order> = orders.iter().collect();
        let csv = orders_csv(&refs, &riders, &customers);
        assert!(csv.starts_with('\u{FEFF}'));
        let lines: Vec<&str> = csv.trim_start_matches('\u{FEFF}').split("\r\n").collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "ID,Customer,Phone,Status,Service,Material,Quantity,Address,Rider,Notes,Created"
        );
        assert_eq!(
            lines[1],
            "\"o-1\",\"Ana Perez\",\"555-0101\",\"enroute\",\"Deep Clean\",\"Leather\",\"2\",\
             \"Av. Central 12, Apt 3\",\"Carlos\",\"say \"\"hi\"\" at door\",\"2025-03-01 10:30:00\""
        );
    }

    #[test]
    fn missing_rider_and_customer_fall_back() {
        let (orders, riders, customers) = sample();
        let csv = orders_csv(&[&orders[1]], &riders, &customers);
        let row = csv.split("\r\n").nth(1).unwrap();
        assert!(row.starts_with("\"o-2\",\"\",\"\","));
        assert!(row.contains(",\"—\",\"\","));
    }

    #[test]
    fn file_name_has_no_colons() {
        let now = Utc.with_ymd_and_hms(2025, 3, 1, 10, 30, 5).unwrap();
        assert_eq!(export_file_name(now), "orders_2025-03-01T10-30-05.000Z.csv");
    }
}
