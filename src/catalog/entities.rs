//! Resolution of configured countries and their regions against remote metadata

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

use super::{CatalogError, CatalogResult};
use crate::config::RequestedCountry;
use crate::fetcher::pagination::{optional_string, value_to_string};
use crate::fetcher::{list_entities, IodaApi};
use crate::{Entity, EntityType};

/// Page limit for entity listings
pub const ENTITY_QUERY_LIMIT: usize = 500;

fn attrs_of(row: &Map<String, Value>) -> Map<String, Value> {
    match row.get("attrs") {
        Some(Value::Object(attrs)) => attrs.clone(),
        _ => Map::new(),
    }
}

fn attr_string(attrs: &Map<String, Value>, key: &str) -> Option<String> {
    attrs
        .get(key)
        .and_then(optional_string)
        .filter(|s| !s.is_empty())
}

/// Intersect the enabled requested countries with the remote country rows.
///
/// Remote codes are compared upper-cased. The result is sorted by code.
///
/// # Errors
/// [`CatalogError::MissingCountries`] when an enabled requested code has no
/// remote row
pub fn resolve_target_countries(
    requested: &[RequestedCountry],
    remote: &[Map<String, Value>],
) -> CatalogResult<Vec<Entity>> {
    let requested: BTreeMap<&str, &RequestedCountry> = requested
        .iter()
        .filter(|c| c.enabled)
        .map(|c| (c.iso2.as_str(), c))
        .collect();

    let mut resolved: Vec<Entity> = Vec::new();
    for row in remote {
        let code = row
            .get("code")
            .map(value_to_string)
            .unwrap_or_default()
            .to_uppercase();
        let Some(config) = requested.get(code.as_str()) else {
            continue;
        };
        resolved.push(Entity {
            entity_type: EntityType::Country,
            name: row.get("name").and_then(optional_string),
            iso2: Some(code.clone()),
            parent_country_id: None,
            parent_country_name: None,
            attrs: attrs_of(row),
            config_name: Some(config.name.clone()),
            code,
        });
    }
    resolved.sort_by(|a, b| a.code.cmp(&b.code));

    let found: BTreeSet<&str> = resolved.iter().map(|e| e.code.as_str()).collect();
    let missing: Vec<String> = requested
        .keys()
        .filter(|code| !found.contains(*code))
        .map(|code| code.to_string())
        .collect();
    if !missing.is_empty() {
        return Err(CatalogError::MissingCountries(missing));
    }

    info!(countries = resolved.len(), "Resolved target countries");
    Ok(resolved)
}

/// Turn one remote region row into an [`Entity`] under `country_code`.
///
/// The parent comes from `attrs.country_code` when present.
pub fn region_from_row(row: &Map<String, Value>, country_code: &str) -> Entity {
    let attrs = attrs_of(row);
    Entity {
        entity_type: EntityType::Region,
        code: row.get("code").map(value_to_string).unwrap_or_default(),
        name: row.get("name").and_then(optional_string),
        iso2: None,
        parent_country_id: Some(
            attr_string(&attrs, "country_code").unwrap_or_else(|| country_code.to_string()),
        ),
        parent_country_name: attr_string(&attrs, "country_name"),
        attrs,
        config_name: None,
    }
}

/// List the regions of every country, sorted by (parent, code)
pub async fn discover_regions<A: IodaApi + ?Sized>(
    api: &A,
    countries: &[Entity],
) -> CatalogResult<Vec<Entity>> {
    let mut regions = Vec::new();
    for country in countries {
        let related_to = format!("country/{}", country.code);
        let rows = list_entities(api, "region", Some(&related_to), ENTITY_QUERY_LIMIT).await?;
        debug!(country = %country.code, regions = rows.len(), "Listed regions");
        regions.extend(rows.iter().map(|row| region_from_row(row, &country.code)));
    }
    sort_regions(&mut regions);
    info!(regions = regions.len(), "Discovered regions");
    Ok(regions)
}

fn sort_regions(regions: &mut [Entity]) {
    regions.sort_by(|a, b| {
        let pa = a.parent_country_id.as_deref().unwrap_or("");
        let pb = b.parent_country_id.as_deref().unwrap_or("");
        pa.cmp(pb).then_with(|| a.code.cmp(&b.code))
    });
}

/// Keep the first `limit` countries and only the regions under them
pub fn limit_entities(countries: &mut Vec<Entity>, regions: &mut Vec<Entity>, limit: usize) {
    countries.truncate(limit);
    let allowed: BTreeSet<&str> = countries.iter().map(|c| c.code.as_str()).collect();
    regions.retain(|r| {
        r.parent_country_id
            .as_deref()
            .is_some_and(|parent| allowed.contains(parent))
    });
}
