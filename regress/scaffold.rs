//! The scaffold stage: create the study folder tree the later stages read
//! from and write into.
//!
//! The layout is a fixed structure with named fields rather than a keyed
//! map, so a missing or misspelled folder is a compile error instead of a
//! runtime surprise.

use log::info;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ScaffoldError {
    #[error("I/O error creating '{path}': {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

/// The eleven contextual-feature families, each getting a band subfolder.
pub const FEATURE_FAMILIES: [&str; 11] = [
    "fourier", "gabor", "hog", "lac", "lbpm", "lsr", "mean", "ndvi", "orb", "pantex", "sfs",
];

/// `data/` inputs.
#[derive(Debug, Clone)]
pub struct DataFolders {
    pub zone_shapefile: &'static str,
    pub population: &'static str,
    pub imagery: &'static str,
    pub osm: OsmFolders,
}

#[derive(Debug, Clone)]
pub struct OsmFolders {
    pub buildings: &'static str,
    pub roads: &'static str,
    pub tables: &'static str,
    pub raw: &'static str,
}

/// `outputs/` intermediates.
#[derive(Debug, Clone)]
pub struct OutputFolders {
    pub vrt: &'static str,
    pub zonal_stats: &'static str,
    pub features: &'static str,
    pub band_families: &'static [&'static str],
}

/// `regressions/`: one subtree per analysis, each split by method.
#[derive(Debug, Clone)]
pub struct RegressionFolders {
    pub urban_attributes: MethodFolders,
    pub population_density: MethodFolders,
}

#[derive(Debug, Clone)]
pub struct MethodFolders {
    pub enr: &'static str,
    pub rfr: &'static str,
}

#[derive(Debug, Clone)]
pub struct StudyLayout {
    pub data: DataFolders,
    pub outputs: OutputFolders,
    pub regressions: RegressionFolders,
    pub scripts: &'static str,
}

impl Default for StudyLayout {
    fn default() -> Self {
        Self {
            data: DataFolders {
                zone_shapefile: "zone_shapefile",
                population: "population",
                imagery: "imagery",
                osm: OsmFolders {
                    buildings: "buildings",
                    roads: "roads",
                    tables: "tables",
                    raw: "raw",
                },
            },
            outputs: OutputFolders {
                vrt: "vrt",
                zonal_stats: "zonal_stats",
                features: "features",
                band_families: &FEATURE_FAMILIES,
            },
            regressions: RegressionFolders {
                urban_attributes: MethodFolders {
                    enr: "enr",
                    rfr: "rfr",
                },
                population_density: MethodFolders {
                    enr: "enr",
                    rfr: "rfr",
                },
            },
            scripts: "scripts",
        }
    }
}

fn mkdir(path: &Path) -> Result<(), ScaffoldError> {
    info!("making folder: {}", path.display());
    fs::create_dir(path).map_err(|source| ScaffoldError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Appends `_0`, then `_0_1`, and so on until the name is free. Mirrors how
/// rerunning the scaffold has always behaved: a fresh sibling tree, never a
/// merge into the existing one.
fn vacant_name(root: &Path) -> PathBuf {
    let mut candidate = root.to_path_buf();
    let mut count = 0;
    while candidate.is_dir() {
        let name = format!(
            "{}_{count}",
            candidate.file_name().and_then(|n| n.to_str()).unwrap_or("study")
        );
        candidate = candidate.with_file_name(name);
        count += 1;
    }
    candidate
}

/// Creates the full study tree under `root` and returns the root actually
/// used (suffixed if `root` already existed).
pub fn create(root: &Path, layout: &StudyLayout) -> Result<PathBuf, ScaffoldError> {
    let root = vacant_name(root);
    mkdir(&root)?;

    let data = root.join("data");
    mkdir(&data)?;
    mkdir(&data.join(layout.data.zone_shapefile))?;
    mkdir(&data.join(layout.data.population))?;
    mkdir(&data.join(layout.data.imagery))?;
    let osm = data.join("osm");
    mkdir(&osm)?;
    mkdir(&osm.join(layout.data.osm.buildings))?;
    mkdir(&osm.join(layout.data.osm.roads))?;
    mkdir(&osm.join(layout.data.osm.tables))?;
    mkdir(&osm.join(layout.data.osm.raw))?;

    let outputs = root.join("outputs");
    mkdir(&outputs)?;
    mkdir(&outputs.join(layout.outputs.vrt))?;
    mkdir(&outputs.join(layout.outputs.zonal_stats))?;
    mkdir(&outputs.join(layout.outputs.features))?;
    let band = outputs.join("band");
    mkdir(&band)?;
    for family in layout.outputs.band_families {
        mkdir(&band.join(family))?;
    }

    let regressions = root.join("regressions");
    mkdir(&regressions)?;
    let urban = regressions.join("urban_attributes");
    mkdir(&urban)?;
    mkdir(&urban.join(layout.regressions.urban_attributes.enr))?;
    mkdir(&urban.join(layout.regressions.urban_attributes.rfr))?;
    let population = regressions.join("population_density");
    mkdir(&population)?;
    mkdir(&population.join(layout.regressions.population_density.enr))?;
    mkdir(&population.join(layout.regressions.population_density.rfr))?;

    mkdir(&root.join(layout.scripts))?;

    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_the_full_tree() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("features-analysis");
        let created = create(&root, &StudyLayout::default()).unwrap();
        assert_eq!(created, root);

        for path in [
            "data/zone_shapefile",
            "data/osm/raw",
            "outputs/band/gabor",
            "outputs/band/sfs",
            "regressions/urban_attributes/enr",
            "regressions/population_density/rfr",
            "scripts",
        ] {
            assert!(created.join(path).is_dir(), "missing {path}");
        }
    }

    #[test]
    fn existing_root_gets_a_suffixed_sibling() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("features-analysis");
        let first = create(&root, &StudyLayout::default()).unwrap();
        let second = create(&root, &StudyLayout::default()).unwrap();
        assert_eq!(first, root);
        assert!(second.ends_with("features-analysis_0"));
        assert!(second.join("data").is_dir());
    }
}
