use super::user_data::yaml_lines;
use crate::error::{Error, Result};
use crate::reference::{TemplateKey, TemplateValue};
use crate::value::{Object, Value};

const TAUPAGE_PREAMBLE: &str = "#taupage-ami-config";

/// Rewrite every sentinel key and value of `value` into provider intrinsics
///
/// This is a pure function. Applying it to its own output returns the output unchanged.
pub fn transform(value: &Value) -> Result<Value> {
    match value {
        Value::String(string) => transform_string(string),
        Value::Array(items) => items
            .iter()
            .map(transform)
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Value::Object(object) => transform_object(object),
        Value::Boolean(_) | Value::Integer(_) | Value::Decimal(_) => Ok(value.clone()),
    }
}

fn transform_string(string: &str) -> Result<Value> {
    Ok(match TemplateValue::parse(string)? {
        None => Value::String(string.to_string()),
        Some(TemplateValue::Ref(name)) => Value::intrinsic("Ref", name),
        Some(TemplateValue::GetAtt {
            resource,
            attribute,
        }) => Value::intrinsic("Fn::GetAtt", vec![resource, attribute]),
    })
}

fn transform_object(object: &Object) -> Result<Value> {
    let mut result = Object::with_capacity(object.len());

    for (key, value) in object {
        let (key, value) = match TemplateKey::parse(key)? {
            None if key == "Fn::Join" => ("Fn::Join".to_string(), transform_join(value)?),
            None => (key.clone(), transform(value)?),
            Some(TemplateKey::Join(separator)) => {
                let Value::Array(_) = value else {
                    return Err(Error::template(format!(
                        "the value of {key:?} must be a list"
                    )));
                };
                (
                    "Fn::Join".to_string(),
                    Value::Array(vec![Value::String(separator), transform(value)?]),
                )
            }
            Some(TemplateKey::TaupageUserData) => {
                ("UserData".to_string(), user_data(key, value, Some(TAUPAGE_PREAMBLE))?)
            }
            Some(TemplateKey::YamlUserData) => {
                ("UserData".to_string(), user_data(key, value, None)?)
            }
        };

        if result.contains_key(&key) {
            return Err(Error::template(format!(
                "key {key:?} occurs more than once after transformation"
            )));
        }
        result.insert(key, value);
    }

    Ok(Value::Object(result))
}

/// An existing join keeps its separator verbatim, a `|` separator is not a sentinel
fn transform_join(value: &Value) -> Result<Value> {
    match value.as_array() {
        Some([separator @ Value::String(_), list]) => {
            Ok(Value::Array(vec![separator.clone(), transform(list)?]))
        }
        _ => transform(value),
    }
}

fn user_data(key: &str, value: &Value, preamble: Option<&str>) -> Result<Value> {
    let Value::Object(object) = transform(value)? else {
        return Err(Error::template(format!("the value of {key:?} must be a mapping")));
    };

    let mut lines: Vec<Value> = preamble.map(Value::from).into_iter().collect();
    lines.extend(yaml_lines(&object)?);

    Ok(Value::intrinsic(
        "Fn::Base64",
        Value::intrinsic("Fn::Join", vec![Value::from("\n"), Value::Array(lines)]),
    ))
}
