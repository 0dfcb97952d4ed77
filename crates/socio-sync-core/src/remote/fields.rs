//! Translation between [`RemoteRecord`] and the CRM's field maps.

use crate::config::FieldMapping;
use crate::models::{format_participation, RemoteRecord};
use serde_json::{Map, Value};

/// Build a record from one `crm.item.list` item.
///
/// Missing fields read as empty strings. Ids may arrive as numbers or as
/// numeric strings depending on the portal version; percentages are brought
/// to the two-decimal form either way.
pub fn record_from_item(item: &Map<String, Value>, fields: &FieldMapping) -> RemoteRecord {
    RemoteRecord {
        remote_id: item.get(&fields.id).and_then(value_as_id),
        display_title: string_field(item, &fields.title),
        national_id: string_field(item, &fields.national_id),
        administrator_role: string_field(item, &fields.administrator_role),
        administrator_flag: string_field(item, &fields.administrator_flag),
        participation_percent: percent_field(item, &fields.participation_percent),
        legal_name: string_field(item, &fields.legal_name),
    }
}

/// Field map sent with `crm.item.add` / `crm.item.update`.
///
/// The id is never sent; it addresses the update instead.
pub fn record_to_fields(record: &RemoteRecord, fields: &FieldMapping) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert(fields.title.clone(), Value::from(record.display_title.as_str()));
    map.insert(fields.national_id.clone(), Value::from(record.national_id.as_str()));
    map.insert(
        fields.administrator_role.clone(),
        Value::from(record.administrator_role.as_str()),
    );
    map.insert(
        fields.administrator_flag.clone(),
        Value::from(record.administrator_flag.as_str()),
    );
    map.insert(
        fields.participation_percent.clone(),
        Value::from(record.participation_percent.as_str()),
    );
    map.insert(fields.legal_name.clone(), Value::from(record.legal_name.as_str()));
    map
}

fn string_field(item: &Map<String, Value>, name: &str) -> String {
    match item.get(name) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => (if *b { "Y" } else { "N" }).to_string(),
        _ => String::new(),
    }
}

fn percent_field(item: &Map<String, Value>, name: &str) -> String {
    match item.get(name) {
        Some(Value::Number(n)) => n.as_f64().map(format_participation).unwrap_or_default(),
        Some(Value::String(s)) => match s.trim().parse::<f64>() {
            Ok(value) => format_participation(value),
            Err(_) => s.clone(),
        },
        _ => String::new(),
    }
}

fn value_as_id(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
