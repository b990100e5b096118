//! REST facade: a JSON batch surface over the database operations.
//!
//! `POST /onu/action_on_mes` accepts `{"requests": [...]}` where each
//! request carries an action (GET, SET, CREATE, DELETE or ALARM), the
//! target (onu_id, class_id, instance_id) and a list of `{index, value}`
//! attributes. Each response echoes its request and adds a `status` reason
//! code; GET responses replace `attributes` with the retrieved index/value
//! pairs.
//!
//! Values are coerced through the schema: numbers for unsigned fields,
//! booleans, enumeration labels, hex strings for byte and table fields.
//! Each action maps onto the same database operation the wire-level OMCI
//! message would run, access rules included.

use crate::database::{bitmap_from_hex, reason};
use crate::endpoint::Endpoint;
use crate::mib::{Attr, AttrValue};
use axum::{Json, Router, extract::State, routing::post};
use log::warn;
use onusim_wire::{Kind, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A batch of requests.
#[derive(Debug, Deserialize)]
pub struct Batch {
    /// The requests, processed in order.
    pub requests: Vec<ActionRequest>,
}

/// One action on a managed entity instance.
#[derive(Debug, Deserialize)]
pub struct ActionRequest {
    /// GET, SET, CREATE, DELETE or ALARM.
    pub action: String,
    /// Target ONU id.
    pub onu_id: u16,
    /// Managed entity class.
    pub class_id: u16,
    /// Managed entity instance.
    pub instance_id: u16,
    /// Attribute index/value pairs (SET and CREATE; indices only for GET).
    #[serde(default)]
    pub attributes: Vec<AttrIndexValue>,
    /// Hex alarm bitmap (ALARM only).
    #[serde(default)]
    pub bit_map: Option<String>,
    /// Alarm sequence number (ALARM only).
    #[serde(default)]
    pub seq_number: Option<u32>,
}

/// An attribute index and its JSON value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrIndexValue {
    /// Attribute number, 1 to 16.
    pub index: u8,
    /// Attribute value; shape depends on the attribute's data.
    #[serde(default)]
    pub value: serde_json::Value,
}

/// The batch response.
#[derive(Debug, Serialize)]
pub struct BatchResponse {
    /// One response per request, in order.
    pub responses: Vec<ActionResponse>,
}

/// One response: the request echoed, plus a status reason code.
#[derive(Debug, Serialize)]
pub struct ActionResponse {
    /// The request's action.
    pub action: String,
    /// The request's ONU id.
    pub onu_id: u16,
    /// The request's class.
    pub class_id: u16,
    /// The request's instance.
    pub instance_id: u16,
    /// Echoed attributes; for GET, the retrieved index/value pairs.
    pub attributes: Vec<AttrIndexValue>,
    /// G.988 reason code.
    pub status: u8,
}

/// Builds the REST router over a shared endpoint.
pub fn router(endpoint: Arc<Endpoint>) -> Router {
    Router::new()
        .route("/onu/action_on_mes", post(action_on_mes))
        .with_state(endpoint)
}

async fn action_on_mes(
    State(endpoint): State<Arc<Endpoint>>,
    Json(batch): Json<Batch>,
) -> Json<BatchResponse> {
    let mut responses = Vec::with_capacity(batch.requests.len());

    for request in batch.requests {
        responses.push(handle(&endpoint, request).await);
    }

    Json(BatchResponse { responses })
}

async fn handle(endpoint: &Endpoint, request: ActionRequest) -> ActionResponse {
    let mut response = ActionResponse {
        action: request.action.clone(),
        onu_id: request.onu_id,
        class_id: request.class_id,
        instance_id: request.instance_id,
        attributes: request.attributes.clone(),
        status: reason::SUCCESS,
    };

    match request.action.as_str() {
        "GET" => {
            let attr_mask = request
                .attributes
                .iter()
                .filter(|attr| (1..=16).contains(&attr.index))
                .fold(0u16, |mask, attr| mask | (1 << (16 - attr.index)));

            let results = endpoint.database().lock().unwrap().get(
                request.onu_id,
                request.class_id,
                request.instance_id,
                attr_mask,
                true,
            );

            response.status = results.reason;
            response.attributes = results
                .attrs
                .iter()
                .map(|(index, value)| AttrIndexValue {
                    index: *index,
                    value: value_to_json(value),
                })
                .collect();
        }
        "SET" | "CREATE" => match coerce_attributes(&request) {
            Ok((attr_mask, values)) => {
                let mut database = endpoint.database().lock().unwrap();

                response.status = if request.action == "SET" {
                    database
                        .set(
                            request.onu_id,
                            request.class_id,
                            request.instance_id,
                            attr_mask,
                            &values,
                        )
                        .reason
                } else {
                    database
                        .create(
                            request.onu_id,
                            request.class_id,
                            request.instance_id,
                            &values,
                        )
                        .reason
                };
            }
            Err(status) => response.status = status,
        },
        "DELETE" => {
            response.status = endpoint
                .database()
                .lock()
                .unwrap()
                .delete(request.onu_id, request.class_id, request.instance_id)
                .reason;
        }
        "ALARM" => {
            let bitmap = request.bit_map.as_deref().and_then(bitmap_from_hex);

            let Some(bitmap) = bitmap else {
                warn!("ALARM request without a valid bit_map");
                response.status = reason::PARAMETER_ERROR;
                return response;
            };

            let seq_number = request.seq_number.unwrap_or(0);

            response.status = match endpoint
                .inject_alarm(request.class_id, request.instance_id, bitmap, seq_number)
                .await
            {
                Ok(()) => reason::SUCCESS,
                Err(e) => {
                    warn!("alarm not sent: {}", e);
                    reason::PROCESSING_ERROR
                }
            };
        }
        action => {
            warn!("unrecognized action {:?}", action);
            response.status = reason::PARAMETER_ERROR;
        }
    }

    response
}

/// Builds the attribute mask and schema-coerced values of a SET/CREATE
/// request.
fn coerce_attributes(request: &ActionRequest) -> Result<(u16, Vec<(u8, AttrValue)>), u8> {
    let Some(mib) = crate::registry().get(request.class_id) else {
        warn!("ME class {} is not implemented", request.class_id);
        return Err(reason::UNKNOWN_ME);
    };

    let mut attr_mask = 0u16;
    let mut values = Vec::with_capacity(request.attributes.len());

    for attr_value in &request.attributes {
        let Some(attr) = mib.attr_by_number(attr_value.index) else {
            warn!(
                "MIB {} {} not found; supported attributes: {}",
                mib,
                attr_value.index,
                mib.attr_names(None)
            );

            return Err(reason::ATTRIBUTES_FAILED);
        };

        let Some(value) = json_to_attr_value(attr, &attr_value.value) else {
            warn!("MIB {} {} rejects value {}", mib, attr, attr_value.value);
            return Err(reason::PARAMETER_ERROR);
        };

        attr_mask |= attr.mask();
        values.push((attr.number(), value));
    }

    values.sort_by_key(|(number, _)| *number);

    Ok((attr_mask, values))
}

/// Renders a value tuple as JSON: a scalar for single-datum attributes, an
/// array otherwise.
fn value_to_json(value: &AttrValue) -> serde_json::Value {
    let rendered: Vec<serde_json::Value> = value.iter().map(datum_to_json).collect();

    match <[serde_json::Value; 1]>::try_from(rendered) {
        Ok([single]) => single,
        Err(rendered) => serde_json::Value::Array(rendered),
    }
}

fn datum_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Unsigned(value) => (*value).into(),
        Value::Bool(value) => (*value).into(),
        Value::Enum(label) => (*label).into(),
        Value::Bits(labels) => labels
            .iter()
            .map(|label| serde_json::Value::from(*label))
            .collect(),
        Value::Str(text) => text.clone().into(),
        Value::Bytes(bytes) => hex(bytes).into(),
        Value::Table(rows) => rows
            .iter()
            .map(|row| serde_json::Value::from(hex(row)))
            .collect(),
    }
}

/// Coerces a JSON value into an attribute value tuple via the schema.
fn json_to_attr_value(attr: &Attr, json: &serde_json::Value) -> Option<AttrValue> {
    if attr.data().len() == 1 {
        return Some(vec![json_to_datum(attr.data()[0].kind(), json)?]);
    }

    let parts = json.as_array()?;

    if parts.len() != attr.data().len() {
        return None;
    }

    attr.data()
        .iter()
        .zip(parts)
        .map(|(datum, part)| json_to_datum(datum.kind(), part))
        .collect()
}

fn json_to_datum(kind: Kind, json: &serde_json::Value) -> Option<Value> {
    match kind {
        Kind::Unsigned => json
            .as_u64()
            .or_else(|| parse_int(json.as_str()?))
            .map(Value::Unsigned),
        Kind::Bool => json
            .as_bool()
            .or_else(|| json.as_u64().map(|value| value != 0))
            .map(Value::Bool),
        Kind::Enum(labels) => match json {
            serde_json::Value::String(label) => labels
                .iter()
                .find(|candidate| *candidate == label)
                .copied()
                .map(Value::Enum),
            serde_json::Value::Number(index) => labels
                .get(usize::try_from(index.as_u64()?).ok()?)
                .copied()
                .map(Value::Enum),
            _ => None,
        },
        Kind::Bits(labels) => {
            let set: Option<Vec<&'static str>> = json
                .as_array()?
                .iter()
                .map(|part| {
                    labels
                        .iter()
                        .find(|candidate| Some(**candidate) == part.as_str())
                        .copied()
                })
                .collect();

            set.map(Value::Bits)
        }
        Kind::Str => json.as_str().map(|text| Value::Str(text.to_string())),
        Kind::Bytes => unhex(json.as_str()?).map(Value::Bytes),
        Kind::Table { row_size } => {
            let rows: Option<Vec<Vec<u8>>> = json
                .as_array()?
                .iter()
                .map(|row| unhex(row.as_str()?).filter(|row| row.len() == row_size))
                .collect();

            rows.map(Value::Table)
        }
    }
}

/// Parses a decimal/binary/octal/hex integer string.
fn parse_int(text: &str) -> Option<u64> {
    let text = text.trim();

    if let Some(digits) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(digits, 16).ok()
    } else if let Some(digits) = text.strip_prefix("0b") {
        u64::from_str_radix(digits, 2).ok()
    } else if let Some(digits) = text.strip_prefix("0o") {
        u64::from_str_radix(digits, 8).ok()
    } else {
        text.parse().ok()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{:02x}", byte)).collect()
}

fn unhex(text: &str) -> Option<Vec<u8>> {
    let text = text.trim().trim_start_matches("0x");

    if text.len() % 2 != 0 {
        return None;
    }

    (0..text.len() / 2)
        .map(|index| u8::from_str_radix(text.get(2 * index..2 * index + 2)?, 16).ok())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mibs;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_coercion_round_trips_per_kind() {
        let onu_g = mibs::onu_g();

        let battery = onu_g.attr("battery_backup").unwrap();

        assert_eq!(
            json_to_attr_value(battery, &serde_json::json!(true)),
            Some(vec![Value::Bool(true)])
        );
        assert_eq!(
            json_to_attr_value(battery, &serde_json::json!(1)),
            Some(vec![Value::Bool(true)])
        );

        let admin = onu_g.attr("admin_state").unwrap();

        assert_eq!(
            json_to_attr_value(admin, &serde_json::json!("lock")),
            Some(vec![Value::Enum("lock")])
        );
        assert_eq!(json_to_attr_value(admin, &serde_json::json!("bogus")), None);

        let serial = onu_g.attr("serial_number").unwrap();

        assert_eq!(
            json_to_attr_value(serial, &serde_json::json!(["abcd", 5678])),
            Some(vec![Value::Str("abcd".into()), Value::Unsigned(5678)])
        );
    }

    #[test]
    fn values_render_as_scalars_or_arrays() {
        assert_eq!(
            value_to_json(&vec![Value::Unsigned(7)]),
            serde_json::json!(7)
        );
        assert_eq!(
            value_to_json(&vec![Value::Str("ab".into()), Value::Unsigned(1)]),
            serde_json::json!(["ab", 1])
        );
        assert_eq!(
            value_to_json(&vec![Value::Bytes(vec![0xde, 0xad])]),
            serde_json::json!("dead")
        );
    }

    #[test]
    fn integers_parse_in_all_radices() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("0x2a"), Some(42));
        assert_eq!(parse_int("0b101010"), Some(42));
        assert_eq!(parse_int("0o52"), Some(42));
        assert_eq!(parse_int("nope"), None);
    }
}
