//! yaml user data rendered from provider intrinsics
//!
//! User data has to stay a template expression because values may be intrinsics (`Ref`, ...)
//! that only the provider can resolve. Every yaml line therefore becomes either a plain string or
//! an `Fn::Join` of its static prefix and the intrinsic.
use crate::error::{Error, Result};
use crate::value::{Object, Value};

const INDENT: &str = "  ";

/// Render `object` as a list of yaml lines (strings or join intrinsics), keys sorted
pub fn yaml_lines(object: &Object) -> Result<Vec<Value>> {
    let mut lines = vec![];
    render_object(object, 0, &mut lines)?;
    Ok(lines)
}

fn render_object(object: &Object, depth: usize, lines: &mut Vec<Value>) -> Result<()> {
    let indent = INDENT.repeat(depth);

    let mut keys: Vec<&String> = object.keys().collect();
    keys.sort();

    for key in keys {
        let value = &object[key.as_str()];
        let indented_key = format!("{indent}{}", quote(key));

        match value {
            Value::Object(nested) if !value.is_intrinsic() => {
                if nested.is_empty() {
                    lines.push(format!("{indented_key}: {{}}").into());
                } else {
                    lines.push(format!("{indented_key}:").into());
                    render_object(nested, depth + 1, lines)?;
                }
            }
            Value::Array(items) => {
                if items.is_empty() {
                    lines.push(format!("{indented_key}: []").into());
                    continue;
                }

                lines.push(format!("{indented_key}:").into());
                for item in items {
                    lines.push(list_item(&indent, key, item)?);
                }
            }
            _ => lines.push(join(": ", vec![indented_key.into(), scalar(key, value)?])),
        }
    }

    Ok(())
}

fn list_item(indent: &str, key: &str, item: &Value) -> Result<Value> {
    let prefix = format!("{indent}- ");
    if item.is_intrinsic() {
        return Ok(join("", vec![prefix.into(), item.clone()]));
    }

    match item.render_scalar() {
        Some(text) => Ok(format!("{prefix}{}", quote(&text)).into()),
        None => Err(Error::template(format!(
            "user data list {key:?} may only contain scalars and intrinsics"
        ))),
    }
}

/// A scalar value or an intrinsic, ready to be joined after its key
fn scalar(key: &str, value: &Value) -> Result<Value> {
    if value.is_intrinsic() {
        return Ok(value.clone());
    }

    value
        .render_scalar()
        .map(|text| Value::String(quote(&text)))
        .ok_or_else(|| Error::template(format!("unsupported user data value for {key:?}")))
}

fn join(separator: &str, parts: Vec<Value>) -> Value {
    Value::intrinsic("Fn::Join", vec![Value::from(separator), Value::Array(parts)])
}

/// Single-quote text containing `:` (yaml escapes `'` by doubling it)
fn quote(text: &str) -> String {
    if text.contains(':') {
        format!("'{}'", text.replace('\'', "''"))
    } else {
        text.to_string()
    }
}
