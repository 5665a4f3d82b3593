use schemars::schema_for;
use serde_json::{Map, Value, json};

use crate::coerce::to_number;
use crate::spec::element::{Element, ValueContract};
use crate::spec::form::FormDefinition;

/// JSON Schema describing the answers a definition accepts.
///
/// Elements with a display condition are never listed as required, since
/// whether they apply depends on other answers; the condition is carried in
/// `x-display-condition` instead.
pub fn generate(definition: &FormDefinition) -> Value {
    let mut properties = Map::new();
    let mut required = Vec::new();

    for element in definition.named_elements() {
        let Some(name) = element.name.as_deref() else {
            continue;
        };
        let Some(mut schema) = element_schema(element) else {
            continue;
        };
        if let Some(question) = &element.question {
            schema.insert("title".into(), Value::String(question.clone()));
        }
        if let Some(description) = &element.description {
            schema.insert("description".into(), Value::String(description.clone()));
        }
        if let Some(condition) = element.display_condition() {
            schema.insert(
                "x-display-condition".into(),
                Value::String(condition.to_string()),
            );
        } else if element.required {
            required.push(Value::String(name.to_string()));
        }
        properties.insert(name.to_string(), Value::Object(schema));
    }

    json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "title": definition.id(),
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": true,
    })
}

fn element_schema(element: &Element) -> Option<Map<String, Value>> {
    let mut schema = Map::new();
    match element.kind.value_contract() {
        ValueContract::Display => return None,
        ValueContract::Text | ValueContract::Email | ValueContract::Url => {
            schema.insert("type".into(), json!("string"));
            match element.kind.value_contract() {
                ValueContract::Email => {
                    schema.insert("format".into(), json!("email"));
                }
                ValueContract::Url => {
                    schema.insert("format".into(), json!("uri"));
                }
                _ => {}
            }
            if let Some(maxlength) = element.maxlength {
                schema.insert("maxLength".into(), json!(maxlength));
            }
            if let Some(pattern) = &element.pattern {
                schema.insert("pattern".into(), json!(pattern));
            }
        }
        ValueContract::Temporal => {
            schema.insert("type".into(), json!("string"));
        }
        ValueContract::Number => {
            // Number widgets may report their value as text.
            schema.insert("type".into(), json!(["number", "string"]));
            if let Some(min) = element.min.as_ref().and_then(to_number) {
                schema.insert("minimum".into(), json!(min));
            }
            if let Some(max) = element.max.as_ref().and_then(to_number) {
                schema.insert("maximum".into(), json!(max));
            }
        }
        ValueContract::Options => {
            let options = element.option_values();
            let item = if options.is_empty() {
                json!({ "type": "string" })
            } else {
                json!({ "type": "string", "enum": options })
            };
            if element.multiple {
                schema.insert("type".into(), json!("array"));
                schema.insert("items".into(), item);
            } else if let Value::Object(item) = item {
                schema.extend(item);
            }
        }
        ValueContract::Scale => {
            schema.insert("type".into(), json!("integer"));
            if let Some((low, high)) = element.scale_range() {
                schema.insert("minimum".into(), json!(low));
                schema.insert("maximum".into(), json!(high));
            }
        }
        ValueContract::Boolean => {
            schema.insert("type".into(), json!("boolean"));
        }
        ValueContract::File => {
            schema.insert("type".into(), json!("object"));
            schema.insert(
                "properties".into(),
                json!({
                    "name": { "type": "string" },
                    "size": { "type": "number", "minimum": 0 },
                    "type": { "type": "string" },
                }),
            );
            schema.insert("required".into(), json!(["name"]));
        }
        ValueContract::Opaque => {}
    }
    Some(schema)
}

/// JSON Schema of the form definition format itself.
pub fn definition_schema() -> Value {
    serde_json::to_value(schema_for!(FormDefinition)).unwrap_or_default()
}
