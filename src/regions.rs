//! Administrative region boundaries.
//!
//! Regions are read once at startup from a GeoJSON `FeatureCollection` of
//! `Polygon`/`MultiPolygon` features. Each region's bounding box is derived
//! from its boundary and used for the per-region catalog query.

use crate::error::ConfigError;
use crate::models::Region;
use geo::MultiPolygon;
use geojson::{Feature, GeoJson};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Load regions from a GeoJSON file, naming each by `name_property`.
pub fn load_regions(path: &Path, name_property: &str) -> Result<Vec<Region>, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::MissingFile {
            what: "region boundary",
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let malformed = |message: String| ConfigError::Malformed {
        what: "region boundaries",
        path: path.to_path_buf(),
        message,
    };

    let regions = parse_regions(&content, name_property).map_err(malformed)?;
    info!("Loaded {} regions from {}", regions.len(), path.display());
    Ok(regions)
}

/// Parse a boundary collection from a GeoJSON string.
pub fn parse_regions(content: &str, name_property: &str) -> Result<Vec<Region>, String> {
    let geojson: GeoJson = content.parse().map_err(|e| format!("{}", e))?;
    let collection = match geojson {
        GeoJson::FeatureCollection(collection) => collection,
        _ => return Err("expected a FeatureCollection".to_string()),
    };

    if collection.features.is_empty() {
        return Err("feature collection has no regions".to_string());
    }

    let mut seen = HashSet::new();
    let mut regions = Vec::with_capacity(collection.features.len());

    for (index, feature) in collection.features.into_iter().enumerate() {
        let name = feature
            .property(name_property)
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                format!(
                    "feature #{} has no string property '{}'",
                    index, name_property
                )
            })?;

        if !seen.insert(name.clone()) {
            return Err(format!("duplicate region name '{}'", name));
        }

        let boundary = boundary(feature).map_err(|e| format!("region '{}': {}", name, e))?;
        let region = Region::new(name.clone(), boundary)
            .ok_or_else(|| format!("region '{}' has an empty geometry", name))?;
        regions.push(region);
    }

    Ok(regions)
}

fn boundary(feature: Feature) -> Result<MultiPolygon<f64>, String> {
    let geometry = feature.geometry.ok_or("missing geometry")?;
    let geometry: geo::Geometry<f64> = geometry.try_into().map_err(|e| format!("{}", e))?;

    match geometry {
        geo::Geometry::MultiPolygon(mp) => Ok(mp),
        geo::Geometry::Polygon(p) => Ok(MultiPolygon(vec![p])),
        _ => Err("geometry is not a Polygon or MultiPolygon".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const PROVINCES: &str = r#"{
      "type": "FeatureCollection",
      "features": [
        {
          "type": "Feature",
          "properties": { "NAME_1": "Adana", "GID_1": "TUR.1_1" },
          "geometry": {
            "type": "Polygon",
            "coordinates": [[[35.0, 36.5], [36.2, 36.5], [36.2, 38.1], [35.0, 38.1], [35.0, 36.5]]]
          }
        },
        {
          "type": "Feature",
          "properties": { "NAME_1": "Mugla" },
          "geometry": {
            "type": "MultiPolygon",
            "coordinates": [
              [[[27.2, 36.6], [28.0, 36.6], [28.0, 37.0], [27.2, 36.6]]],
              [[[28.5, 36.8], [29.4, 36.8], [29.4, 37.6], [28.5, 36.8]]]
            ]
          }
        }
      ]
    }"#;

    #[test]
    fn test_parse_polygon_and_multipolygon() {
        let regions = parse_regions(PROVINCES, "NAME_1").unwrap();
        assert_eq!(regions.len(), 2);

        let adana = &regions[0];
        assert_eq!(adana.name, "Adana");
        assert_eq!(adana.bbox.min_longitude, 35.0);
        assert_eq!(adana.bbox.max_latitude, 38.1);

        let mugla = &regions[1];
        assert_eq!(mugla.boundary.0.len(), 2);
        assert_eq!(mugla.bbox.min_longitude, 27.2);
        assert_eq!(mugla.bbox.max_longitude, 29.4);
        assert_eq!(mugla.bbox.min_latitude, 36.6);
        assert_eq!(mugla.bbox.max_latitude, 37.6);
    }

    #[test]
    fn test_missing_name_property() {
        let err = parse_regions(PROVINCES, "NAME_2").unwrap_err();
        assert!(err.contains("NAME_2"));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let duplicated = PROVINCES.replace("Mugla", "Adana");
        let err = parse_regions(&duplicated, "NAME_1").unwrap_err();
        assert!(err.contains("duplicate"));
    }

    #[test]
    fn test_non_polygon_geometry_rejected() {
        let point = r#"{
          "type": "FeatureCollection",
          "features": [{
            "type": "Feature",
            "properties": { "NAME_1": "Nowhere" },
            "geometry": { "type": "Point", "coordinates": [30.0, 39.0] }
          }]
        }"#;
        assert!(parse_regions(point, "NAME_1").is_err());
    }

    #[test]
    fn test_empty_collection_rejected() {
        let empty = r#"{ "type": "FeatureCollection", "features": [] }"#;
        assert!(parse_regions(empty, "NAME_1").is_err());
    }

    #[test]
    fn test_load_regions_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(PROVINCES.as_bytes()).unwrap();

        let regions = load_regions(file.path(), "NAME_1").unwrap();
        assert_eq!(regions.len(), 2);

        let missing = load_regions(Path::new("/nonexistent/gadm.json"), "NAME_1");
        assert!(matches!(missing, Err(ConfigError::MissingFile { .. })));
    }
}
