//! Binding input data against a template's typed field list.

use crate::error::TemplateError;
use crate::template::{DerivedDef, DerivedOp, FieldDef, FieldKind, Format, TemplateDef};
use chrono::{DateTime, NaiveDate};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt::Write;

/// A type-checked scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Date(NaiveDate),
    /// An optional field with no value and no default.
    Absent,
}

impl FieldValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Display string under `format`.
    pub fn display(&self, format: &Format) -> Result<String, String> {
        match self {
            FieldValue::Text(s) => Ok(s.clone()),
            FieldValue::Number(n) => Ok(format_number(*n, format)),
            FieldValue::Date(d) => {
                let pattern = format.date.as_deref().unwrap_or("%Y-%m-%d");
                let mut out = String::new();
                write!(out, "{}", d.format(pattern))
                    .map_err(|_| format!("invalid date format '{}'", pattern))?;
                Ok(out)
            }
            FieldValue::Absent => Ok(String::new()),
        }
    }
}

pub type BoundRow = BTreeMap<String, FieldValue>;

/// All field values of one composition, plus their display strings.
#[derive(Debug, Clone, Default)]
pub struct BoundData {
    pub scalars: BTreeMap<String, FieldValue>,
    pub rows: BTreeMap<String, Vec<BoundRow>>,
    /// Formatted scalar values keyed by field name; the placeholder context.
    pub display: BTreeMap<String, String>,
}

impl BoundData {
    /// Binds `data` to every declared field, then evaluates derived fields in order.
    pub fn bind(template: &TemplateDef, data: &Value) -> Result<Self, TemplateError> {
        let object = data.as_object().ok_or(TemplateError::NotAnObject(json_type(data)))?;
        let mut bound = BoundData::default();

        for field in &template.fields {
            let raw = lookup(object, field);
            if field.kind == FieldKind::Rows {
                let rows = bind_rows(template, field, raw)?;
                bound.rows.insert(field.name.clone(), rows);
                continue;
            }
            let value = bind_scalar(field, raw).map_err(|(expected, found)| TemplateError::WrongType {
                field: field.name.clone(),
                expected,
                found,
            })?;
            let value = match value {
                Some(v) => v,
                None if field.required => return Err(TemplateError::MissingField(field.name.clone())),
                None => FieldValue::Absent,
            };
            let shown = value.display(&field.format).map_err(|message| TemplateError::Invalid {
                id: template.id.clone(),
                message: format!("field '{}': {}", field.name, message),
            })?;
            bound.display.insert(field.name.clone(), shown);
            bound.scalars.insert(field.name.clone(), value);
        }

        for derived in &template.derived {
            let value = bound.evaluate(derived)?;
            bound.display.insert(derived.name.clone(), format_number(value, &derived.format));
            bound.scalars.insert(derived.name.clone(), FieldValue::Number(value));
        }

        Ok(bound)
    }

    fn number(&self, derived: &str, name: &str) -> Result<f64, TemplateError> {
        match self.scalars.get(name) {
            Some(FieldValue::Number(n)) => Ok(*n),
            Some(FieldValue::Absent) => Ok(0.0),
            Some(_) => Err(TemplateError::Derived {
                field: derived.to_string(),
                message: format!("'{}' is not numeric", name),
            }),
            None => Err(TemplateError::Derived {
                field: derived.to_string(),
                message: format!("'{}' is not defined before this field", name),
            }),
        }
    }

    fn evaluate(&self, derived: &DerivedDef) -> Result<f64, TemplateError> {
        match &derived.op {
            DerivedOp::Sum { rows, column } => {
                let rows = self.rows.get(rows).ok_or_else(|| TemplateError::Derived {
                    field: derived.name.clone(),
                    message: format!("'{}' is not a rows field", rows),
                })?;
                let mut total = 0.0;
                for row in rows {
                    match row.get(column) {
                        Some(FieldValue::Number(n)) => total += n,
                        Some(FieldValue::Absent) | None => {}
                        Some(_) => {
                            return Err(TemplateError::Derived {
                                field: derived.name.clone(),
                                message: format!("column '{}' is not numeric", column),
                            });
                        }
                    }
                }
                Ok(total)
            }
            DerivedOp::Scale { field, factor } => Ok(self.number(&derived.name, field)? * factor),
            DerivedOp::Add(fields) => fields
                .iter()
                .try_fold(0.0, |acc, name| Ok(acc + self.number(&derived.name, name)?)),
        }
    }
}

fn lookup<'a>(object: &'a Map<String, Value>, field: &'a FieldDef) -> Option<&'a Value> {
    match object.get(&field.name) {
        Some(Value::Null) | None => field.default.as_ref(),
        Some(v) => Some(v),
    }
}

/// `Ok(None)` means absent; `Err((expected, found))` a type mismatch.
fn bind_scalar(field: &FieldDef, raw: Option<&Value>) -> Result<Option<FieldValue>, (&'static str, String)> {
    let Some(raw) = raw else {
        return Ok(None);
    };
    let mismatch = || (field.kind.describe(), describe_value(raw));
    let value = match field.kind {
        FieldKind::Text => FieldValue::Text(raw.as_str().ok_or_else(mismatch)?.to_string()),
        FieldKind::Number => FieldValue::Number(raw.as_f64().ok_or_else(mismatch)?),
        FieldKind::Date => FieldValue::Date(raw.as_str().and_then(parse_date).ok_or_else(mismatch)?),
        FieldKind::Rows => return Err(mismatch()),
    };
    Ok(Some(value))
}

fn bind_rows(template: &TemplateDef, field: &FieldDef, raw: Option<&Value>) -> Result<Vec<BoundRow>, TemplateError> {
    let items = match raw {
        None if field.required => return Err(TemplateError::MissingField(field.name.clone())),
        None => return Ok(Vec::new()),
        Some(Value::Array(items)) => items,
        Some(other) => {
            return Err(TemplateError::WrongType {
                field: field.name.clone(),
                expected: FieldKind::Rows.describe(),
                found: describe_value(other),
            });
        }
    };

    let mut rows = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        let object = item.as_object().ok_or_else(|| TemplateError::WrongType {
            field: format!("{}[{}]", field.name, index),
            expected: "a row object",
            found: describe_value(item),
        })?;

        let mut row = BoundRow::new();
        for column in &field.columns {
            if column.kind == FieldKind::Rows {
                return Err(TemplateError::Invalid {
                    id: template.id.clone(),
                    message: format!("rows field '{}' nests rows column '{}'", field.name, column.name),
                });
            }
            let value = bind_scalar(column, lookup(object, column)).map_err(|(expected, found)| {
                TemplateError::WrongCellType {
                    field: field.name.clone(),
                    row: index,
                    column: column.name.clone(),
                    expected,
                    found,
                }
            })?;
            let value = match value {
                Some(v) => v,
                None if column.required => {
                    return Err(TemplateError::MissingCell {
                        field: field.name.clone(),
                        row: index,
                        column: column.name.clone(),
                    });
                }
                None => FieldValue::Absent,
            };
            row.insert(column.name.clone(), value);
        }
        rows.push(row);
    }
    Ok(rows)
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.date_naive()))
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn describe_value(value: &Value) -> String {
    match value {
        Value::String(s) if s.chars().count() > 24 => {
            format!("a string (\"{}...\")", s.chars().take(24).collect::<String>())
        }
        Value::String(s) => format!("a string (\"{}\")", s),
        Value::Number(n) => format!("a number ({})", n),
        other => json_type(other).to_string(),
    }
}

/// Formats `value` with fixed decimals, optional thousands grouping, and affixes.
pub(crate) fn format_number(value: f64, format: &Format) -> String {
    let magnitude = match format.decimals {
        Some(decimals) => format!("{:.*}", decimals, value.abs()),
        None => format!("{}", value.abs()),
    };
    let magnitude = if format.thousands { group_thousands(&magnitude) } else { magnitude };
    // -0.00 reads as zero
    let negative = value < 0.0 && magnitude.chars().any(|c| c.is_ascii_digit() && c != '0');
    format!(
        "{}{}{}{}",
        if negative { "-" } else { "" },
        format.prefix.as_deref().unwrap_or(""),
        magnitude,
        format.suffix.as_deref().unwrap_or("")
    )
}

fn group_thousands(digits: &str) -> String {
    let (int_part, frac_part) = match digits.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (digits, None),
    };
    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3 + 4);
    for (i, c) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    if let Some(frac) = frac_part {
        grouped.push('.');
        grouped.push_str(frac);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn template(json: Value) -> TemplateDef {
        serde_json::from_value(json).unwrap()
    }

    fn quote_template() -> TemplateDef {
        template(json!({
            "id": "quote",
            "fields": [
                { "name": "project", "kind": "text" },
                { "name": "date", "kind": "date", "format": { "date": "%b %d, %Y" } },
                { "name": "notes", "kind": "text", "required": false },
                { "name": "lines", "kind": "rows", "columns": [
                    { "name": "item", "kind": "text" },
                    { "name": "total", "kind": "number" },
                    { "name": "notes", "kind": "text", "required": false }
                ] }
            ],
            "derived": [
                { "name": "subtotal", "sum": { "rows": "lines", "column": "total" },
                  "format": { "decimals": 2, "prefix": "$", "thousands": true } },
                { "name": "tax", "scale": { "field": "subtotal", "factor": 0.0825 }, "format": { "decimals": 2 } },
                { "name": "grand", "add": ["subtotal", "tax"], "format": { "decimals": 2 } }
            ],
            "body": []
        }))
    }

    #[test]
    fn binds_fields_and_computes_totals() {
        let data = json!({
            "project": "Backyard",
            "date": "2025-03-07",
            "lines": [
                { "item": "Post", "total": 1000.0 },
                { "item": "Rail", "total": 250.5, "notes": null }
            ]
        });
        let bound = BoundData::bind(&quote_template(), &data).unwrap();

        assert_eq!(bound.display["project"], "Backyard");
        assert_eq!(bound.display["date"], "Mar 07, 2025");
        assert_eq!(bound.display["notes"], "");
        assert_eq!(bound.display["subtotal"], "$1,250.50");
        assert_eq!(bound.display["tax"], "103.17");
        assert_eq!(bound.display["grand"], "1353.67");
        assert_eq!(bound.rows["lines"][1]["notes"], FieldValue::Absent);
    }

    #[test]
    fn missing_required_field_is_reported() {
        let err = BoundData::bind(&quote_template(), &json!({ "date": "2025-03-07", "lines": [] })).unwrap_err();
        assert_eq!(err, TemplateError::MissingField("project".into()));
    }

    #[test]
    fn wrong_types_are_reported_with_location() {
        let err = BoundData::bind(
            &quote_template(),
            &json!({ "project": 42, "date": "2025-03-07", "lines": [] }),
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::WrongType { ref field, .. } if field == "project"));

        let err = BoundData::bind(
            &quote_template(),
            &json!({ "project": "p", "date": "soon", "lines": [] }),
        )
        .unwrap_err();
        assert!(matches!(err, TemplateError::WrongType { ref field, .. } if field == "date"));

        let err = BoundData::bind(
            &quote_template(),
            &json!({
                "project": "p", "date": "2025-03-07",
                "lines": [ { "item": "Post", "total": 1 }, { "item": "Rail", "total": "12" } ]
            }),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            TemplateError::WrongCellType { row: 1, ref column, .. } if column == "total"
        ));
    }

    #[test]
    fn non_object_input_is_rejected() {
        let err = BoundData::bind(&quote_template(), &json!([1, 2])).unwrap_err();
        assert_eq!(err, TemplateError::NotAnObject("an array"));
    }

    #[test]
    fn rfc3339_dates_are_accepted() {
        assert_eq!(parse_date("2025-03-07T10:00:00Z"), NaiveDate::from_ymd_opt(2025, 3, 7));
    }

    #[test]
    fn number_formatting() {
        let money = Format { decimals: Some(2), thousands: true, prefix: Some("$".into()), ..Default::default() };
        assert_eq!(format_number(1234567.891, &money), "$1,234,567.89");
        assert_eq!(format_number(-12.5, &money), "-$12.50");
        assert_eq!(format_number(-0.001, &money), "$0.00");
        assert_eq!(format_number(3.0, &Format::default()), "3");
        assert_eq!(format_number(999.0, &Format { thousands: true, ..Default::default() }), "999");
    }

    #[test]
    fn derived_fields_must_reference_earlier_numbers() {
        let def = template(json!({
            "id": "t",
            "fields": [ { "name": "label", "kind": "text" } ],
            "derived": [ { "name": "x", "add": ["label"] }, { "name": "y", "add": ["later"] } ],
            "body": []
        }));
        let err = BoundData::bind(&def, &json!({ "label": "a" })).unwrap_err();
        assert!(matches!(err, TemplateError::Derived { ref field, .. } if field == "x"));
    }
}
