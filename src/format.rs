use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::WranglerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogicalFormat {
    Json,
    EsriShapefile,
    Kmz,
    Kml,
    ZippedGeoJson,
    ZippedCsv,
    ZippedGeonames,
    Xls,
    Xlsx,
    Csv,
    Tsv,
    Txt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseKind {
    Json,
    Csv,
    Tsv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDriver {
    EsriShapefile,
    Kml,
}

impl VectorDriver {
    pub fn name(self) -> &'static str {
        match self {
            VectorDriver::EsriShapefile => "ESRI Shapefile",
            VectorDriver::Kml => "KML",
        }
    }
}

impl LogicalFormat {
    pub const ALL: [LogicalFormat; 12] = [
        LogicalFormat::Json,
        LogicalFormat::EsriShapefile,
        LogicalFormat::Kmz,
        LogicalFormat::Kml,
        LogicalFormat::ZippedGeoJson,
        LogicalFormat::ZippedCsv,
        LogicalFormat::ZippedGeonames,
        LogicalFormat::Xls,
        LogicalFormat::Xlsx,
        LogicalFormat::Csv,
        LogicalFormat::Tsv,
        LogicalFormat::Txt,
    ];

    pub fn lookup(name: &str) -> Option<Self> {
        let folded = name.trim().to_lowercase();
        let format = match folded.as_str() {
            "json" | "geojson" => LogicalFormat::Json,
            "esri shapefile" | "shp" => LogicalFormat::EsriShapefile,
            "kmz" => LogicalFormat::Kmz,
            "kml" => LogicalFormat::Kml,
            "zipped_geojson" => LogicalFormat::ZippedGeoJson,
            "zipped_csv" => LogicalFormat::ZippedCsv,
            "zipped_geonames" => LogicalFormat::ZippedGeonames,
            "xls" => LogicalFormat::Xls,
            "xlsx" => LogicalFormat::Xlsx,
            "csv" => LogicalFormat::Csv,
            "tsv" => LogicalFormat::Tsv,
            "txt" => LogicalFormat::Txt,
            _ => return None,
        };
        Some(format)
    }

    pub fn archive_member_ext(self) -> Option<&'static str> {
        match self {
            LogicalFormat::EsriShapefile => Some("shp"),
            LogicalFormat::Kmz => Some("kml"),
            LogicalFormat::ZippedGeoJson => Some("geojson"),
            LogicalFormat::ZippedCsv => Some("csv"),
            LogicalFormat::ZippedGeonames => Some("txt"),
            _ => None,
        }
    }

    pub fn download_ext(self) -> &'static str {
        match self {
            LogicalFormat::Json => "json",
            LogicalFormat::EsriShapefile
            | LogicalFormat::Kmz
            | LogicalFormat::ZippedGeoJson
            | LogicalFormat::ZippedCsv
            | LogicalFormat::ZippedGeonames => "zip",
            LogicalFormat::Kml => "kml",
            LogicalFormat::Xls => "xls",
            LogicalFormat::Xlsx => "xlsx",
            LogicalFormat::Csv => "csv",
            LogicalFormat::Tsv => "tsv",
            LogicalFormat::Txt => "txt",
        }
    }

    pub fn parse_kind(self) -> ParseKind {
        match self {
            LogicalFormat::Json
            | LogicalFormat::EsriShapefile
            | LogicalFormat::Kmz
            | LogicalFormat::Kml
            | LogicalFormat::ZippedGeoJson => ParseKind::Json,
            LogicalFormat::Xls
            | LogicalFormat::Xlsx
            | LogicalFormat::Csv
            | LogicalFormat::ZippedCsv => ParseKind::Csv,
            LogicalFormat::Tsv | LogicalFormat::Txt | LogicalFormat::ZippedGeonames => {
                ParseKind::Tsv
            }
        }
    }

    /// Driver used to turn this format's files into a feature collection,
    /// or `None` when the files are ingested as they are.
    pub fn vector_driver(self) -> Option<VectorDriver> {
        match self {
            LogicalFormat::EsriShapefile => Some(VectorDriver::EsriShapefile),
            LogicalFormat::Kmz | LogicalFormat::Kml => Some(VectorDriver::Kml),
            _ => None,
        }
    }

    pub fn is_archive(self) -> bool {
        self.archive_member_ext().is_some()
    }

    pub fn is_spreadsheet(self) -> bool {
        matches!(self, LogicalFormat::Xls | LogicalFormat::Xlsx)
    }
}

impl fmt::Display for LogicalFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogicalFormat::Json => "json",
            LogicalFormat::EsriShapefile => "esri shapefile",
            LogicalFormat::Kmz => "kmz",
            LogicalFormat::Kml => "kml",
            LogicalFormat::ZippedGeoJson => "zipped_geojson",
            LogicalFormat::ZippedCsv => "zipped_csv",
            LogicalFormat::ZippedGeonames => "zipped_geonames",
            LogicalFormat::Xls => "xls",
            LogicalFormat::Xlsx => "xlsx",
            LogicalFormat::Csv => "csv",
            LogicalFormat::Tsv => "tsv",
            LogicalFormat::Txt => "txt",
        };
        f.write_str(name)
    }
}

impl FromStr for LogicalFormat {
    type Err = WranglerError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::lookup(value).ok_or_else(|| WranglerError::UnknownFormat(value.to_string()))
    }
}
