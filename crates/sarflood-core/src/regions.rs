//! Geometry registry: resolves administrative units from a boundary dataset
//! into labelled polygon geometries and unions them into a study area.
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use geo::{BooleanOps, BoundingRect, Coord, LineString, MultiPolygon, Polygon, Rect};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{FloodError, Result};

/// A labelled polygon or multi-polygon in grid coordinates.
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct Region {
    pub label: String,
    pub geometry: MultiPolygon<f64>,
}

impl Region {
    pub fn new(label: impl Into<String>, geometry: MultiPolygon<f64>) -> Self {
        Self { label: label.into(), geometry }
    }

    pub fn bounds(&self) -> Option<Rect<f64>> {
        self.geometry.bounding_rect()
    }
}

/// One feature of a boundary dataset: string attributes plus geometry.
#[derive(Debug, Clone)]
pub struct BoundaryFeature {
    pub properties: BTreeMap<String, String>,
    pub geometry: MultiPolygon<f64>,
}

/// A named collection of boundary features (e.g. GAUL level 1).
#[derive(Debug, Clone)]
pub struct BoundaryDataset {
    pub id: String,
    pub features: Vec<BoundaryFeature>,
}

// ── JSON schema ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct DatasetDef {
    id: String,
    features: Vec<FeatureDef>,
}

/// `polygons` holds one entry per polygon; each polygon is a list of rings
/// (exterior first, then holes); each ring is a list of `[x, y]` pairs.
#[derive(Deserialize)]
struct FeatureDef {
    #[serde(default)]
    properties: BTreeMap<String, String>,
    polygons: Vec<Vec<Vec<[f64; 2]>>>,
}

fn ring(points: &[[f64; 2]]) -> LineString<f64> {
    LineString::from(points.iter().map(|&[x, y]| Coord { x, y }).collect::<Vec<_>>())
}

impl BoundaryDataset {
    pub fn from_json_str(text: &str) -> Result<Self> {
        let def: DatasetDef = serde_json::from_str(text)?;
        let mut features = Vec::with_capacity(def.features.len());
        for (i, f) in def.features.into_iter().enumerate() {
            let mut polygons = Vec::with_capacity(f.polygons.len());
            for rings in &f.polygons {
                let Some((exterior, holes)) = rings.split_first() else {
                    continue;
                };
                if exterior.len() < 3 {
                    return Err(FloodError::InvalidConfig(format!(
                        "dataset {}: feature {i} has a ring with fewer than 3 vertices",
                        def.id
                    )));
                }
                polygons.push(Polygon::new(ring(exterior), holes.iter().map(|h| ring(h)).collect()));
            }
            features.push(BoundaryFeature {
                properties: f.properties,
                geometry: MultiPolygon(polygons),
            });
        }
        Ok(Self { id: def.id, features })
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        Self::from_json_str(&fs::read_to_string(path)?)
    }
}

// ── Selection ────────────────────────────────────────────────────────────────

/// Equality filter on one feature attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttributeFilter {
    pub attribute: String,
    pub value: String,
}

impl AttributeFilter {
    pub fn equals(attribute: impl Into<String>, value: impl Into<String>) -> Self {
        Self { attribute: attribute.into(), value: value.into() }
    }

    pub fn matches(&self, feature: &BoundaryFeature) -> bool {
        feature.properties.get(&self.attribute) == Some(&self.value)
    }
}

/// What to do when a filter matches more than one feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Union all matching features into one region.
    #[default]
    Union,
    /// Fail with `AmbiguousRegion`.
    RequireUnique,
}

/// Boundary datasets keyed by id, plus the merge policy applied on lookup.
#[derive(Debug, Default)]
pub struct GeometryRegistry {
    datasets: HashMap<String, BoundaryDataset>,
    merge_policy: MergePolicy,
}

impl GeometryRegistry {
    pub fn new(merge_policy: MergePolicy) -> Self {
        Self { datasets: HashMap::new(), merge_policy }
    }

    pub fn register(&mut self, dataset: BoundaryDataset) {
        self.datasets.insert(dataset.id.clone(), dataset);
    }

    pub fn with_dataset(mut self, dataset: BoundaryDataset) -> Self {
        self.register(dataset);
        self
    }

    /// Resolve the features of `dataset_id` matching `filter` into a region
    /// named `label`.
    pub fn region_by_name(
        &self,
        dataset_id: &str,
        filter: &AttributeFilter,
        label: &str,
    ) -> Result<Region> {
        let dataset = self
            .datasets
            .get(dataset_id)
            .ok_or_else(|| FloodError::UnknownDataset(dataset_id.to_string()))?;

        let matches: Vec<&BoundaryFeature> =
            dataset.features.iter().filter(|f| filter.matches(f)).collect();

        match (matches.len(), self.merge_policy) {
            (0, _) => Err(FloodError::RegionNotFound {
                dataset: dataset_id.to_string(),
                attribute: filter.attribute.clone(),
                value: filter.value.clone(),
            }),
            (1, _) => Ok(Region::new(label, matches[0].geometry.clone())),
            (n, MergePolicy::RequireUnique) => Err(FloodError::AmbiguousRegion {
                dataset: dataset_id.to_string(),
                attribute: filter.attribute.clone(),
                value: filter.value.clone(),
                matches: n,
            }),
            (n, MergePolicy::Union) => {
                debug!(label, features = n, "merging features matched by one filter");
                let parts: Vec<Region> = matches
                    .iter()
                    .map(|f| Region::new(label, f.geometry.clone()))
                    .collect();
                union_all(label, &parts)
            }
        }
    }
}

/// Union of all `regions`' geometries, labelled `label`.
///
/// Order-independent and idempotent up to floating-point boundary noise.
pub fn union_all(label: &str, regions: &[Region]) -> Result<Region> {
    let Some((first, rest)) = regions.split_first() else {
        return Err(FloodError::InvalidConfig(format!("cannot union zero regions into {label}")));
    };
    let geometry = rest
        .iter()
        .fold(first.geometry.union(&first.geometry), |acc, r| acc.union(&r.geometry));
    Ok(Region::new(label, geometry))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coverage::coverage;
    use crate::grid::{Extent, Grid, GridCrs};
    use approx::assert_relative_eq;
    use geo::Area;

    const GAUL_L1: &str = r#"{
        "id": "gaul1",
        "features": [
            {"properties": {"ADM1_NAME": "Sindh"},       "polygons": [[[[0,0],[5,0],[5,5],[0,5]]]]},
            {"properties": {"ADM1_NAME": "Balochistan"}, "polygons": [[[[5,0],[10,0],[10,5],[5,5]]]]},
            {"properties": {"ADM1_NAME": "Khyber Pakhtunkhwa"}, "polygons": [[[[0,5],[5,5],[5,10],[0,10]]]]},
            {"properties": {"ADM1_NAME": "Punjab"},      "polygons": [[[[5,5],[10,5],[10,7],[5,7]]]]},
            {"properties": {"ADM1_NAME": "Punjab"},      "polygons": [[[[5,7],[10,7],[10,10],[5,10]]]]}
        ]
    }"#;

    fn registry(policy: MergePolicy) -> GeometryRegistry {
        GeometryRegistry::new(policy).with_dataset(BoundaryDataset::from_json_str(GAUL_L1).unwrap())
    }

    fn provinces() -> Vec<Region> {
        let reg = registry(MergePolicy::Union);
        [("Sindh", "Sindh"), ("Balochistan", "Balochistan"), ("KPK", "Khyber Pakhtunkhwa"), ("Punjab", "Punjab")]
            .iter()
            .map(|(label, name)| {
                reg.region_by_name("gaul1", &AttributeFilter::equals("ADM1_NAME", *name), label).unwrap()
            })
            .collect()
    }

    #[test]
    fn region_by_name_resolves_single_feature() {
        let sindh = registry(MergePolicy::Union)
            .region_by_name("gaul1", &AttributeFilter::equals("ADM1_NAME", "Sindh"), "Sindh")
            .unwrap();
        assert_eq!(sindh.label, "Sindh");
        assert_relative_eq!(sindh.geometry.unsigned_area(), 25.0);
    }

    #[test]
    fn missing_region_is_an_error() {
        let err = registry(MergePolicy::Union)
            .region_by_name("gaul1", &AttributeFilter::equals("ADM1_NAME", "Gilgit"), "GB")
            .unwrap_err();
        assert!(matches!(err, FloodError::RegionNotFound { .. }));
    }

    #[test]
    fn unknown_dataset_is_an_error() {
        let err = registry(MergePolicy::Union)
            .region_by_name("gaul0", &AttributeFilter::equals("ADM0_NAME", "Pakistan"), "PK")
            .unwrap_err();
        assert!(matches!(err, FloodError::UnknownDataset(_)));
    }

    #[test]
    fn multiple_matches_merge_by_default() {
        let punjab = registry(MergePolicy::Union)
            .region_by_name("gaul1", &AttributeFilter::equals("ADM1_NAME", "Punjab"), "Punjab")
            .unwrap();
        assert_relative_eq!(punjab.geometry.unsigned_area(), 25.0, max_relative = 1e-9);
    }

    #[test]
    fn multiple_matches_fail_when_uniqueness_required() {
        let err = registry(MergePolicy::RequireUnique)
            .region_by_name("gaul1", &AttributeFilter::equals("ADM1_NAME", "Punjab"), "Punjab")
            .unwrap_err();
        assert!(matches!(err, FloodError::AmbiguousRegion { matches: 2, .. }));
    }

    #[test]
    fn union_is_order_independent() {
        let p = provinces();
        let grid = Grid::new(20, 20, Extent::new(0.0, 10.0, 0.0, 10.0), GridCrs::EqualArea);
        let orders = [[0, 1, 2, 3], [3, 2, 1, 0], [1, 3, 0, 2], [2, 0, 3, 1]];
        let reference = union_all("study", &p).unwrap();
        let ref_cov = coverage(&grid, &reference.geometry);
        for order in orders {
            let permuted: Vec<Region> = order.iter().map(|&i| p[i].clone()).collect();
            let u = union_all("study", &permuted).unwrap();
            assert_relative_eq!(u.geometry.unsigned_area(), 100.0, max_relative = 1e-9);
            assert_eq!(u.bounds(), reference.bounds());
            assert_eq!(coverage(&grid, &u.geometry).cells, ref_cov.cells);
        }
    }

    #[test]
    fn union_is_associative_and_idempotent() {
        let p = provinces();
        let ab = union_all("ab", &p[0..2]).unwrap();
        let bc = union_all("bc", &p[1..3]).unwrap();
        let left = union_all("l", &[ab, p[2].clone()]).unwrap();
        let right = union_all("r", &[p[0].clone(), bc]).unwrap();
        assert_relative_eq!(left.geometry.unsigned_area(), right.geometry.unsigned_area(), max_relative = 1e-9);

        let twice = union_all("s", &[p[0].clone(), p[0].clone()]).unwrap();
        assert_relative_eq!(twice.geometry.unsigned_area(), p[0].geometry.unsigned_area(), max_relative = 1e-9);
        assert_eq!(twice.bounds(), p[0].bounds());
    }

    #[test]
    fn union_of_nothing_is_rejected() {
        assert!(union_all("empty", &[]).is_err());
    }
}
