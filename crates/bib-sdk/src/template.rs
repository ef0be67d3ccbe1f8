//! GUID templates: `{Field}` placeholders filled from a record.

use bib_types::Record;
use serde_json::Value;

use crate::error::{SdkError, SdkResult};

/// Render `template` against `record`.
///
/// `{Name}` is replaced with the record's `Name` field; `{a.b}` walks into
/// nested objects. The data-address form `{~D:Record.Name~}` (also
/// `{~Data:Record.Name~}`) addresses the same field. Strings are inserted
/// bare, other values as compact JSON, and missing fields or `null` as
/// nothing. An unclosed `{` is kept literally.
///
/// Any other `{~...~}` expression is rejected rather than rendered empty.
pub fn render_guid(template: &str, record: &Record) -> SdkResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let Some(close) = after.find('}') else {
            out.push_str(&rest[open..]);
            return Ok(out);
        };
        let path = field_path(template, after[..close].trim())?;
        if let Some(value) = lookup(record, path) {
            match value {
                Value::String(s) => out.push_str(s),
                Value::Null => {}
                other => out.push_str(&other.to_string()),
            }
        }
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Reduce a placeholder body to a dotted field path.
fn field_path<'a>(template: &str, expr: &'a str) -> SdkResult<&'a str> {
    let Some(inner) = expr.strip_prefix('~') else {
        return Ok(expr);
    };
    let unsupported = |reason: &str| SdkError::Template {
        template: template.to_string(),
        reason: format!("`{{{expr}}}`: {reason}"),
    };

    let inner = inner
        .strip_suffix('~')
        .ok_or_else(|| unsupported("expression is not closed with `~`"))?;
    let address = inner
        .strip_prefix("D:")
        .or_else(|| inner.strip_prefix("Data:"))
        .ok_or_else(|| unsupported("only `~D:` data addresses are supported"))?;
    address
        .trim()
        .strip_prefix("Record.")
        .filter(|path| !path.is_empty())
        .ok_or_else(|| unsupported("data address must start with `Record.`"))
}

fn lookup<'a>(record: &'a Record, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut value = record.get(parts.next()?)?;
    for part in parts {
        value = value.as_object()?.get(part)?;
    }
    Some(value)
}
