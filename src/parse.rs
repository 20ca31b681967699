use scraper::{ElementRef, Html, Selector};
use serde_json::{Number, Value};
use tracing::debug;

use crate::selector::{FieldSpec, KeyedMap, SelectorMap, ValuePolicy};
use crate::{Error, Record, Result, JOIN_DELIMITER};

/// Extracts one record per node matching the group selector, in document order.
/// A field whose selector matches nothing inside the group node is `null`.
/// No group matches yields an empty `Vec`.
pub fn extract(markup: &str, map: &SelectorMap) -> Result<Vec<Record>> {
    let group = create_selector(&map.group)?;
    let fields = map
        .fields
        .iter()
        .map(|(name, spec)| Ok((name.as_str(), create_selector(&spec.selector)?, spec)))
        .collect::<Result<Vec<_>>>()?;

    let doc = Html::parse_document(markup);
    let records = doc
        .select(&group)
        .map(|scope| {
            fields
                .iter()
                .map(|(name, selector, spec)| (name.to_string(), field_value(scope, selector, spec)))
                .collect::<Record>()
        })
        .collect();

    Ok(records)
}

/// Extracts a single record where every group node contributes one
/// `key -> value` pair. Group nodes without a key are skipped.
pub fn extract_keyed(markup: &str, map: &KeyedMap) -> Result<Record> {
    let group = create_selector(&map.group)?;
    let key = create_selector(&map.key)?;
    let value = create_selector(&map.value.selector)?;

    let doc = Html::parse_document(markup);
    let mut record = Record::new();
    for scope in doc.select(&group) {
        let Some(name) = scope.select(&key).next().map(node_text) else {
            debug!(selector = %map.key, "group node without a key, skipping");
            continue;
        };
        record.insert(name, field_value(scope, &value, &map.value));
    }
    Ok(record)
}

fn field_value(scope: ElementRef<'_>, selector: &Selector, spec: &FieldSpec) -> Value {
    let mut matches = scope.select(selector).map(node_text);
    let text = match spec.policy {
        ValuePolicy::First => matches.next(),
        ValuePolicy::Join => {
            let all = matches.collect::<Vec<_>>();
            (!all.is_empty()).then(|| all.join(JOIN_DELIMITER))
        }
    };

    match text {
        Some(text) if spec.numeric => coerce_numeric(text),
        Some(text) => Value::String(text),
        None => Value::Null,
    }
}

/// Text content of a node, trimmed of surrounding whitespace.
#[inline]
fn node_text(node: ElementRef<'_>) -> String {
    node.text().collect::<String>().trim().to_string()
}

/// Best-effort number parsing for ratio-like values (`"1,234.5"`, `"18.2 %"`, `"₹ 950"`).
/// Falls back to the raw string when the text is not a plain number.
pub fn coerce_numeric(text: String) -> Value {
    let cleaned = text
        .trim()
        .trim_start_matches(['₹', '$'])
        .trim_end_matches('%')
        .trim()
        .replace(',', "");

    cleaned
        .parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::String(text))
}

#[inline]
fn create_selector(sel_str: &str) -> Result<Selector> {
    Selector::parse(sel_str).map_err(|_| Error::Selector(sel_str.into()))
}
