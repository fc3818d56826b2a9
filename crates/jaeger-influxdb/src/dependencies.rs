//! Service dependency graph from span references.

use std::collections::{BTreeMap, HashMap};

use crate::codec::{parse_references, ResultTable};
use crate::error::{DecodeError, FieldError};
use crate::model::{DependencyLink, RefType, SpanId, TraceId};
use crate::schema;

/// Count parent→child service calls across every span row in `tables`.
///
/// Only `ChildOf` references count. Self-loops and references to spans
/// outside the result set are ignored. Links are sorted by parent, then child.
pub fn build_dependency_links(tables: &[ResultTable]) -> Result<Vec<DependencyLink>, DecodeError> {
    // (trace, span) -> service
    let mut services: HashMap<(Option<TraceId>, SpanId), String> = HashMap::new();
    // (trace, child span) -> parent span
    let mut parents: Vec<(Option<TraceId>, SpanId, SpanId)> = Vec::new();

    for table in tables {
        if table.is_empty() {
            continue;
        }
        let table = table.expand_group_key();
        let trace_col = table.column_index(schema::TRACE_ID);
        let span_col = table
            .column_index(schema::SPAN_ID)
            .ok_or(FieldError::MissingColumn(schema::SPAN_ID))?;
        let service_col = table.column_index(schema::SERVICE_NAME);
        let references_col = table.column_index(schema::REFERENCES);

        for row in &table.rows {
            let Some(raw_span_id) = row.get(span_col).and_then(|d| d.as_str()) else {
                continue;
            };
            let span_id: SpanId = parse_id(schema::SPAN_ID, raw_span_id)?;
            let trace_id: Option<TraceId> = trace_col
                .and_then(|i| row.get(i)?.as_str())
                .map(|raw| parse_id(schema::TRACE_ID, raw))
                .transpose()?;

            if let Some(service) = service_col.and_then(|i| row.get(i)?.as_str()) {
                services.insert((trace_id, span_id), service.to_string());
            }

            let Some(raw_refs) = references_col.and_then(|i| row.get(i)?.as_str()) else {
                continue;
            };
            let references = parse_references(raw_refs, trace_id.unwrap_or_default())?;
            for reference in references {
                if reference.ref_type == RefType::ChildOf {
                    parents.push((trace_id, span_id, reference.span_id));
                }
            }
        }
    }

    let mut counts: BTreeMap<(&str, &str), u64> = BTreeMap::new();
    for (trace_id, child, parent) in &parents {
        let (Some(parent_service), Some(child_service)) = (
            services.get(&(*trace_id, *parent)),
            services.get(&(*trace_id, *child)),
        ) else {
            continue;
        };
        if parent_service == child_service {
            continue;
        }
        *counts
            .entry((parent_service.as_str(), child_service.as_str()))
            .or_default() += 1;
    }

    Ok(counts
        .into_iter()
        .map(|((parent, child), call_count)| DependencyLink {
            parent: parent.to_string(),
            child: child.to_string(),
            call_count,
        })
        .collect())
}

fn parse_id<T>(column: &str, raw: &str) -> Result<T, FieldError>
where
    T: std::str::FromStr<Err = crate::error::IdError>,
{
    raw.parse().map_err(|source| FieldError::Id {
        column: column.to_string(),
        source,
    })
}
