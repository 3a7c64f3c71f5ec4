//! Loading of cargo manifests from JSON and CSV files.
//!
//! A JSON manifest names the container (optional, defaults to a 40 ft
//! container) and the item types to load. A CSV cargo list only holds item
//! rows and always uses the default container. Values are given either in
//! meters and kilograms or in millimeters and grams.

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{ContainerSpec, ItemType, ValidationError};

/// Errors while reading a manifest.
#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("Could not read manifest {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed cargo list: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cargo list columns must be {expected}, found: {found}")]
    CsvColumns { expected: String, found: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("Manifest contains no items")]
    NoItems,
}

/// Unit system of the numbers in a manifest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Units {
    /// Meters and kilograms.
    #[default]
    M,
    /// Millimeters and grams.
    Mm,
}

impl Units {
    fn scale(self) -> f64 {
        match self {
            Units::M => 1.0,
            Units::Mm => 1.0 / 1000.0,
        }
    }
}

/// Cargo list columns in meters and kilograms.
pub const CSV_HEADERS_M: [&str; 6] = ["名前", "幅(m)", "高さ(m)", "奥行き(m)", "重量(kg)", "個数"];
/// Cargo list columns in millimeters and grams.
pub const CSV_HEADERS_MM: [&str; 6] = ["名前", "幅(mm)", "高さ(mm)", "奥行き(mm)", "重量(g)", "個数"];

const UTF8_BOM: &str = "\u{feff}";

/// One row of a cargo list. Both header sets map onto the same fields.
#[derive(Debug, Serialize, Deserialize)]
struct CargoRow {
    #[serde(rename = "名前")]
    name: String,
    #[serde(rename = "幅(m)", alias = "幅(mm)")]
    width: f64,
    #[serde(rename = "高さ(m)", alias = "高さ(mm)")]
    height: f64,
    #[serde(rename = "奥行き(m)", alias = "奥行き(mm)")]
    depth: f64,
    #[serde(rename = "重量(kg)", alias = "重量(g)")]
    weight: f64,
    #[serde(rename = "個数")]
    quantity: u32,
}

impl From<CargoRow> for ItemType {
    fn from(row: CargoRow) -> Self {
        ItemType {
            name: row.name,
            width: row.width,
            height: row.height,
            depth: row.depth,
            weight: row.weight,
            quantity: row.quantity,
        }
    }
}

fn csv_units(headers: &csv::StringRecord) -> Result<Units, ManifestError> {
    let has_all = |set: &[&str]| set.iter().all(|h| headers.iter().any(|c| c == *h));
    if has_all(&CSV_HEADERS_M) {
        Ok(Units::M)
    } else if has_all(&CSV_HEADERS_MM) {
        Ok(Units::Mm)
    } else {
        Err(ManifestError::CsvColumns {
            expected: format!("{} or {}", CSV_HEADERS_M.join(","), CSV_HEADERS_MM.join(",")),
            found: headers.iter().collect::<Vec<_>>().join(","),
        })
    }
}

/// Writes a cargo list template with three sample rows (meters, kilograms).
///
/// Missing parent directories are created. The file starts with a UTF-8
/// byte order mark so spreadsheet tools detect the encoding.
pub fn write_csv_template(path: impl AsRef<Path>) -> Result<(), ManifestError> {
    let path = path.as_ref();
    let io_err = |source: std::io::Error| ManifestError::Io {
        path: path.display().to_string(),
        source,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    let mut file = fs::File::create(path).map_err(io_err)?;
    file.write_all(UTF8_BOM.as_bytes()).map_err(io_err)?;

    let mut writer = csv::Writer::from_writer(file);
    for (name, (width, height, depth), weight, quantity) in [
        ("標準パレット", (1.2, 1.5, 1.0), 800.0, 10),
        ("大型ボックス", (2.0, 1.8, 1.5), 1500.0, 5),
        ("機械部品", (1.5, 1.2, 1.0), 1000.0, 8),
    ] {
        writer.serialize(CargoRow {
            name: name.to_string(),
            width,
            height,
            depth,
            weight,
            quantity,
        })?;
    }
    writer.flush().map_err(io_err)?;
    Ok(())
}

/// A cargo manifest as stored on disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(default)]
    pub container: Option<ContainerSpec>,
    pub items: Vec<ItemType>,
    #[serde(default)]
    pub units: Units,
}

impl Manifest {
    /// Parses a manifest from a JSON string.
    pub fn from_json(input: &str) -> Result<Self, ManifestError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Parses a CSV cargo list with either header set.
    ///
    /// The container is left unset and resolves to the default.
    pub fn from_csv(input: &str) -> Result<Self, ManifestError> {
        let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(input.as_bytes());
        let units = csv_units(reader.headers()?)?;

        let items = reader
            .deserialize::<CargoRow>()
            .map(|row| row.map(ItemType::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            container: None,
            items,
            units,
        })
    }

    /// Reads a manifest file; `.csv` files are read as cargo lists, anything
    /// else as JSON.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let is_csv = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv {
            Self::from_csv(&raw)
        } else {
            Self::from_json(&raw)
        }
    }

    /// Converts to meters/kilograms and validates every entry.
    ///
    /// A missing container falls back to `ContainerSpec::default()`, which is
    /// already in meters and is not rescaled.
    pub fn into_parts(self) -> Result<(ContainerSpec, Vec<ItemType>), ManifestError> {
        if self.items.is_empty() {
            return Err(ManifestError::NoItems);
        }
        let scale = self.units.scale();

        let container = match self.container {
            Some(c) => ContainerSpec {
                width: c.width * scale,
                height: c.height * scale,
                depth: c.depth * scale,
                max_weight: c.max_weight * scale,
                name: c.name,
            },
            None => ContainerSpec::default(),
        };
        container.validate()?;

        let items = self
            .items
            .into_iter()
            .map(|item| {
                let item = ItemType {
                    width: item.width * scale,
                    height: item.height * scale,
                    depth: item.depth * scale,
                    weight: item.weight * scale,
                    ..item
                };
                item.validate()?;
                Ok(item)
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok((container, items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{Builder, NamedTempFile, tempdir};

    #[test]
    fn loads_manifest_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "container": {{"name": "20ft", "width": 5.9, "height": 2.39, "depth": 2.35, "max_weight": 21000}},
                "items": [{{"name": "pallet", "width": 1.2, "height": 1.0, "depth": 0.8, "weight": 400, "quantity": 4}}]
            }}"#
        )
        .unwrap();

        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.units, Units::M);
        let (container, items) = manifest.into_parts().unwrap();
        assert_eq!(container.name, "20ft");
        assert_eq!(items[0].quantity, 4);
    }

    #[test]
    fn millimeter_manifest_is_scaled() {
        let manifest = Manifest::from_json(
            r#"{
                "units": "mm",
                "container": {"width": 2000, "height": 1000, "depth": 1000, "max_weight": 500000},
                "items": [{"name": "box", "width": 500, "height": 250, "depth": 400, "weight": 12500, "quantity": 1}]
            }"#,
        )
        .unwrap();

        let (container, items) = manifest.into_parts().unwrap();
        assert_eq!(container.name, ContainerSpec::DEFAULT_NAME);
        assert!((container.width - 2.0).abs() < 1e-9);
        assert!((container.max_weight - 500.0).abs() < 1e-9);
        assert!((items[0].height - 0.25).abs() < 1e-9);
        assert!((items[0].weight - 12.5).abs() < 1e-9);
    }

    #[test]
    fn missing_container_uses_default() {
        let manifest = Manifest::from_json(
            r#"{"items": [{"name": "box", "width": 1, "height": 1, "depth": 1, "weight": 1, "quantity": 1}]}"#,
        )
        .unwrap();
        let (container, _) = manifest.into_parts().unwrap();
        assert_eq!(container, ContainerSpec::default());
    }

    #[test]
    fn rejects_empty_and_invalid_manifests() {
        let empty = Manifest::from_json(r#"{"items": []}"#).unwrap();
        assert!(matches!(empty.into_parts(), Err(ManifestError::NoItems)));

        let invalid = Manifest::from_json(
            r#"{"items": [{"name": "box", "width": 1, "height": 0, "depth": 1, "weight": 1, "quantity": 1}]}"#,
        )
        .unwrap();
        assert!(matches!(
            invalid.into_parts(),
            Err(ManifestError::Invalid(ValidationError::InvalidDimension(_)))
        ));

        assert!(matches!(
            Manifest::from_json("{not json"),
            Err(ManifestError::Json(_))
        ));
        assert!(matches!(
            Manifest::load("/nonexistent/manifest.json"),
            Err(ManifestError::Io { .. })
        ));
    }

    #[test]
    fn metric_cargo_list_is_read_as_is() {
        let manifest = Manifest::from_csv(
            "名前,幅(m),高さ(m),奥行き(m),重量(kg),個数\n\
             赤,1.2,1.0,0.8,400,3\n\
             青, 0.5 ,0.5,0.5,20.5,10\n",
        )
        .unwrap();

        assert_eq!(manifest.units, Units::M);
        let (container, items) = manifest.into_parts().unwrap();
        assert_eq!(container, ContainerSpec::default());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "赤");
        assert_eq!(items[0].quantity, 3);
        assert_eq!(items[1].width, 0.5);
        assert_eq!(items[1].weight, 20.5);
    }

    #[test]
    fn millimeter_cargo_list_is_scaled() {
        let manifest = Manifest::from_csv(
            "\u{feff}名前,幅(mm),高さ(mm),奥行き(mm),重量(g),個数\n箱,500,250,400,12500,2\n",
        )
        .unwrap();

        assert_eq!(manifest.units, Units::Mm);
        let (_, items) = manifest.into_parts().unwrap();
        assert!((items[0].width - 0.5).abs() < 1e-9);
        assert!((items[0].height - 0.25).abs() < 1e-9);
        assert!((items[0].weight - 12.5).abs() < 1e-9);
    }

    #[test]
    fn cargo_list_with_unknown_columns_is_rejected() {
        let err = Manifest::from_csv("name,width,height,depth,weight,count\na,1,1,1,1,1\n")
            .unwrap_err();
        assert!(matches!(err, ManifestError::CsvColumns { .. }));

        let err = Manifest::from_csv("名前,幅(m),高さ(m),奥行き(m),重量(kg),個数\na,wide,1,1,1,1\n")
            .unwrap_err();
        assert!(matches!(err, ManifestError::Csv(_)));
    }

    #[test]
    fn csv_extension_selects_cargo_list_parser() {
        let mut file = Builder::new().suffix(".CSV").tempfile().unwrap();
        write!(file, "名前,幅(m),高さ(m),奥行き(m),重量(kg),個数\nbox,1,1,1,1,4\n").unwrap();

        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.items[0].quantity, 4);
        assert!(manifest.container.is_none());
    }

    #[test]
    fn template_is_a_loadable_cargo_list() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("sample_data").join("template_cargo_items.csv");

        write_csv_template(&path).unwrap();

        let raw = fs::read_to_string(&path).unwrap();
        assert!(raw.starts_with(UTF8_BOM));
        let (_, items) = Manifest::load(&path).unwrap().into_parts().unwrap();
        let summary: Vec<(&str, u32)> = items
            .iter()
            .map(|i| (i.name.as_str(), i.quantity))
            .collect();
        assert_eq!(
            summary,
            vec![("標準パレット", 10), ("大型ボックス", 5), ("機械部品", 8)]
        );
        assert_eq!(items[1].weight, 1500.0);
    }
}
