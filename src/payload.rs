//! Parsing of submitted record data.
//!
//! Each record kind has an input type whose fields are all optional. In
//! [`Mode::Create`] required fields must be present; in [`Mode::Update`]
//! absent fields keep their stored value. Failures are collected per field
//! so a client sees every problem with an item at once.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Field name → messages.
pub type FieldErrors = BTreeMap<String, Vec<String>>;

/// Key used for errors not tied to one field.
pub const NON_FIELD_ERRORS: &str = "non_field_errors";

const REQUIRED: &str = "This field is required.";
const NOT_NULL: &str = "This field may not be null.";
const NOT_BLANK: &str = "This field may not be blank.";
const NOT_STRING: &str = "Not a valid string.";
const BAD_DATE: &str = "Date has wrong format. Use one of these formats instead: YYYY-MM-DD.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    Create,
    Update,
}

/// Parse one JSON object into a typed input.
pub trait Payload: Sized {
    /// # Errors
    ///
    /// Returns the collected field errors when any field is invalid.
    fn from_json(value: &Value, mode: Mode) -> Result<Self, FieldErrors>;
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct BuildingInput {
    pub name: Option<String>,
    pub address: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RoomInput {
    pub number: Option<String>,
    pub building: Option<i64>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResidentInput {
    pub name: Option<String>,
    pub room: Option<i64>,
    pub date_of_birth: Option<NaiveDate>,
    /// Optional consistency hint: the building the room must belong to.
    pub building: Option<i64>,
}

impl Payload for BuildingInput {
    fn from_json(value: &Value, mode: Mode) -> Result<Self, FieldErrors> {
        let mut fields = Fields::new(value, mode)?;
        let input = BuildingInput {
            name: fields.string("name", 100),
            address: fields.string("address", 255),
        };
        fields.finish(input)
    }
}

impl Payload for RoomInput {
    fn from_json(value: &Value, mode: Mode) -> Result<Self, FieldErrors> {
        let mut fields = Fields::new(value, mode)?;
        let input = RoomInput {
            number: fields.string("number", 10),
            building: fields.pk("building", true),
        };
        fields.finish(input)
    }
}

impl Payload for ResidentInput {
    fn from_json(value: &Value, mode: Mode) -> Result<Self, FieldErrors> {
        let mut fields = Fields::new(value, mode)?;
        let input = ResidentInput {
            name: fields.string("name", 100),
            room: fields.pk("room", true),
            date_of_birth: fields.date("date_of_birth"),
            building: fields.pk("building", false),
        };
        fields.finish(input)
    }
}

/// The `id` of a bulk-update entry, if present and an integer.
pub fn entry_id(value: &Value) -> Option<i64> {
    match value.get("id")? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Single-message field error map.
pub fn field_error(field: &str, message: impl Into<String>) -> FieldErrors {
    let mut errors = FieldErrors::new();
    errors.insert(field.to_string(), vec![message.into()]);
    errors
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "int",
        Value::String(_) => "str",
        Value::Array(_) => "list",
        Value::Object(_) => "dict",
    }
}

/// Field extraction helper collecting errors as it goes.
struct Fields<'a> {
    object: &'a Map<String, Value>,
    mode: Mode,
    errors: FieldErrors,
}

impl<'a> Fields<'a> {
    fn new(value: &'a Value, mode: Mode) -> Result<Self, FieldErrors> {
        match value {
            Value::Object(object) => Ok(Fields {
                object,
                mode,
                errors: FieldErrors::new(),
            }),
            other => Err(field_error(
                NON_FIELD_ERRORS,
                format!(
                    "Invalid data. Expected a dictionary, but got {}.",
                    json_type_name(other)
                ),
            )),
        }
    }

    fn fail(&mut self, field: &str, message: impl Into<String>) {
        self.errors
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    /// Present, non-null value; records `required`/`null` errors otherwise.
    fn value(&mut self, field: &str, required: bool) -> Option<&'a Value> {
        let object: &'a Map<String, Value> = self.object;
        match object.get(field) {
            None => {
                if required && self.mode == Mode::Create {
                    self.fail(field, REQUIRED);
                }
                None
            }
            Some(Value::Null) => {
                if required {
                    self.fail(field, NOT_NULL);
                }
                None
            }
            Some(v) => Some(v),
        }
    }

    fn string(&mut self, field: &str, max_len: usize) -> Option<String> {
        let raw = match self.value(field, true)? {
            Value::String(s) => s.trim().to_string(),
            Value::Number(n) => n.to_string(),
            _ => {
                self.fail(field, NOT_STRING);
                return None;
            }
        };
        if raw.is_empty() {
            self.fail(field, NOT_BLANK);
            return None;
        }
        if raw.chars().count() > max_len {
            self.fail(
                field,
                format!("Ensure this field has no more than {} characters.", max_len),
            );
            return None;
        }
        Some(raw)
    }

    fn pk(&mut self, field: &str, required: bool) -> Option<i64> {
        let value = self.value(field, required)?;
        let parsed = match value {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        if parsed.is_none() {
            self.fail(
                field,
                format!(
                    "Incorrect type. Expected pk value, received {}.",
                    json_type_name(value)
                ),
            );
        }
        parsed
    }

    fn date(&mut self, field: &str) -> Option<NaiveDate> {
        let value = self.value(field, true)?;
        let parsed = value
            .as_str()
            .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok());
        if parsed.is_none() {
            self.fail(field, BAD_DATE);
        }
        parsed
    }

    fn finish<T>(self, input: T) -> Result<T, FieldErrors> {
        if self.errors.is_empty() {
            Ok(input)
        } else {
            Err(self.errors)
        }
    }
}
