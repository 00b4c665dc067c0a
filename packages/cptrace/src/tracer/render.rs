//! Bounded string rendering of runtime values.

use super::inspect::{Inspect, InspectError, ValueKind};
use crate::config::TraceConfig;
use crate::models::TreeNode;

const MAX_LIST_ITEMS: usize = 32;
const ELLIPSIS: &str = "…";

/// Python `repr` of a float.
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        return "nan".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "inf" } else { "-inf" }.to_string();
    }
    if value == 0.0 {
        return if value.is_sign_negative() { "-0.0" } else { "0.0" }.to_string();
    }

    let sign = if value < 0.0 { "-" } else { "" };
    let scientific = format!("{:e}", value.abs());
    let (mantissa, exponent) = match scientific.split_once('e') {
        Some(parts) => parts,
        None => return scientific,
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(|c| c.is_ascii_digit()).collect();

    if (-4..16).contains(&exponent) {
        if exponent >= 0 {
            let int_len = exponent as usize + 1;
            if digits.len() <= int_len {
                format!("{sign}{}{}.0", digits, "0".repeat(int_len - digits.len()))
            } else {
                format!("{sign}{}.{}", &digits[..int_len], &digits[int_len..])
            }
        } else {
            format!("{sign}0.{}{}", "0".repeat((-exponent - 1) as usize), digits)
        }
    } else {
        let mantissa = if digits.len() > 1 {
            format!("{}.{}", &digits[..1], &digits[1..])
        } else {
            digits
        };
        let exp_sign = if exponent < 0 { '-' } else { '+' };
        format!("{sign}{mantissa}e{exp_sign}{:02}", exponent.abs())
    }
}

pub fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_len).collect();
    out.push_str(ELLIPSIS);
    out
}

fn render_scalar(kind: &ValueKind) -> Option<String> {
    match kind {
        ValueKind::None => Some("None".to_string()),
        ValueKind::Bool(true) => Some("True".to_string()),
        ValueKind::Bool(false) => Some("False".to_string()),
        ValueKind::Int(i) => Some(i.to_string()),
        ValueKind::Float(f) => Some(format_float(*f)),
        ValueKind::Str(s) => Some(s.clone()),
        _ => None,
    }
}

/// Rendered value of the first configured primary field the object carries.
pub fn primary_field<V: Inspect>(value: &V, config: &TraceConfig) -> Result<Option<String>, InspectError> {
    for field in &config.primary_fields {
        if let Some(attr) = value.attribute(field)? {
            let kind = attr.kind();
            if kind.is_scalar() {
                let text = match render_scalar(&kind) {
                    Some(text) => text,
                    None => attr.natural_str()?,
                };
                return Ok(Some(truncate(&text, config.max_render_len)));
            }
        }
    }
    Ok(None)
}

fn render_object<V: Inspect>(value: &V, config: &TraceConfig) -> Result<String, InspectError> {
    match primary_field(value, config)? {
        Some(primary) => Ok(format!("{}({})", value.type_name(), primary)),
        None => Ok(format!("{}(...)", value.type_name())),
    }
}

pub fn render_value<V: Inspect>(value: &V, config: &TraceConfig) -> Result<String, InspectError> {
    let kind = value.kind();
    if let Some(text) = render_scalar(&kind) {
        return Ok(truncate(&text, config.max_render_len));
    }
    match kind {
        ValueKind::Object => render_object(value, config),
        ValueKind::Sequence => {
            let items = value.items()?;
            let first_is_object = match items.first() {
                Some(first) => {
                    first.kind() == ValueKind::Object && primary_field(first, config)?.is_some()
                }
                None => false,
            };
            if !first_is_object {
                return Ok(truncate(&value.natural_str()?, config.max_render_len));
            }
            let mut parts = Vec::with_capacity(items.len().min(MAX_LIST_ITEMS + 1));
            for item in items.iter().take(MAX_LIST_ITEMS) {
                parts.push(match item.kind() {
                    ValueKind::Object => render_object(item, config)?,
                    _ => render_value(item, config)?,
                });
            }
            if items.len() > MAX_LIST_ITEMS {
                parts.push(ELLIPSIS.to_string());
            }
            Ok(format!("[{}]", parts.join(", ")))
        }
        _ => Ok(truncate(&value.natural_str()?, config.max_render_len)),
    }
}

/// Rendering that never fails.
pub fn render_or_placeholder<V: Inspect>(value: &V, config: &TraceConfig) -> String {
    match render_value(value, config) {
        Ok(text) => text,
        Err(e) => {
            log::debug!("render failed: {}", e);
            "?".to_string()
        }
    }
}

const TREE_LINKS: &[&str] = &["left", "right", "children"];

/// An object with a `left`, `right` or `children` attribute.
pub fn is_tree_like<V: Inspect>(value: &V) -> Result<bool, InspectError> {
    if value.kind() != ValueKind::Object {
        return Ok(false);
    }
    for link in TREE_LINKS {
        if value.attribute(link)?.is_some() {
            return Ok(true);
        }
    }
    Ok(false)
}

fn child_node<V: Inspect>(value: Option<V>, depth: usize, config: &TraceConfig) -> Result<Option<Box<TreeNode>>, InspectError> {
    match value {
        Some(child) if child.kind() == ValueKind::Object => {
            Ok(Some(Box::new(serialize_tree(&child, depth + 1, config)?)))
        }
        _ => Ok(None),
    }
}

/// Serialize a linked object structure, cutting it off at the configured depth.
pub fn serialize_tree<V: Inspect>(value: &V, depth: usize, config: &TraceConfig) -> Result<TreeNode, InspectError> {
    if depth >= config.tree_depth {
        return Ok(TreeNode::leaf(ELLIPSIS));
    }
    let val = match primary_field(value, config)? {
        Some(primary) => primary,
        None => render_object(value, config)?,
    };
    let mut node = TreeNode::leaf(val);
    node.left = child_node(value.attribute("left")?, depth, config)?;
    node.right = child_node(value.attribute("right")?, depth, config)?;
    if let Some(children) = value.attribute("children")? {
        if children.kind() == ValueKind::Sequence {
            for child in children.items()? {
                if child.kind() == ValueKind::Object {
                    node.children.push(serialize_tree(&child, depth + 1, config)?);
                }
            }
        }
    }
    Ok(node)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_float_matches_python_repr() {
        assert_eq!(format_float(1.0), "1.0");
        assert_eq!(format_float(2.5), "2.5");
        assert_eq!(format_float(0.1), "0.1");
        assert_eq!(format_float(-3.25), "-3.25");
        assert_eq!(format_float(100.0), "100.0");
        assert_eq!(format_float(0.0001), "0.0001");
        assert_eq!(format_float(1e-7), "1e-07");
        assert_eq!(format_float(1e16), "1e+16");
        assert_eq!(format_float(1.5e300), "1.5e+300");
        assert_eq!(format_float(f64::INFINITY), "inf");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("abcdef", 10), "abcdef");
        assert_eq!(truncate("abcdef", 3), "abc…");
    }
}
