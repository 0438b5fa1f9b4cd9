//! Extraction of name suggestions from raw model output

use std::collections::HashSet;
use log::{debug, trace, warn};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::request::NameSuggestion;

/// Parse model output into at most `expected_count` suggestions.
///
/// The first well-formed JSON array in `raw` that yields a usable
/// suggestion is used, wherever it sits (bare, fenced, surrounded by
/// prose or nested inside an object). Arrays with nothing usable, such
/// as a `[1]` footnote, are skipped. Items without a non-blank string
/// `name` and `reason` are dropped, repeated names keep their first
/// occurrence, and surplus items are cut. Fewer items than requested is
/// not an error; none at all is.
pub fn parse_suggestions(
  raw: &str
, expected_count: usize
) -> Result<Vec<NameSuggestion>>
{   if expected_count == 0
    {   return Err(Error::InvalidInput(
          "expected_count must be at least 1".to_string()
        ));
    }
    trace!("Parsing model output: {}", raw);

    let mut arrays_seen = 0_usize;
    for items in json_arrays(raw)
    {   arrays_seen += 1;
        let results = collect_suggestions(&items, expected_count);
        if !results.is_empty()
        {   debug!(
              "Parsed {} of {} requested suggestions",
              results.len(),
              expected_count
            );
            return Ok(results);
        }
        debug!("Skipping array of {} items with no usable suggestion", items.len());
    }

    if arrays_seen == 0
    {   warn!("No JSON array found in model output");
        return Err(Error::Model(
          "failed to parse AI response: no JSON array found".to_string()
        ));
    }
    warn!("Model output held {} arrays, none usable", arrays_seen);
    Err(Error::Model("no valid suggestions produced".to_string()))
}

fn collect_suggestions(items: &[Value], expected_count: usize) -> Vec<NameSuggestion>
{   let mut seen = HashSet::new();
    let mut results = Vec::with_capacity(expected_count.min(items.len()));
    for item in items
    {   if results.len() >= expected_count
        {   break;
        }
        let Some(suggestion) = suggestion_from_value(item) else
        {   debug!("Dropping malformed suggestion: {}", item);
            continue;
        };
        if !seen.insert(suggestion.name.to_lowercase())
        {   debug!("Dropping duplicate name: {}", suggestion.name);
            continue;
        }
        results.push(suggestion);
    }
    results
}

fn suggestion_from_value(value: &Value) -> Option<NameSuggestion>
{   let object = value.as_object()?;
    let field = |key: &str| {
      object
        .get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
    };
    Some(NameSuggestion
    {   name: field("name")?
      , reason: field("reason")?
    })
}

/// Every `[` that starts a complete JSON array, in order of appearance.
fn json_arrays(raw: &str) -> impl Iterator<Item = Vec<Value>> + '_
{   raw.match_indices('[').filter_map(move |(start, _)| {
      let mut stream = serde_json::Deserializer::from_str(&raw[start..])
        .into_iter::<Value>();
      match stream.next()
      {   Some(Ok(Value::Array(items))) => Some(items)
        , _ => None
      }
    })
}
