use std::collections::HashMap;
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use quick_xml::events::{BytesStart, Event};
use serde_json::{Map, Value, json};
use shapefile::dbase::FieldValue;
use shapefile::{Point, PointM, PointZ, PolygonRing, Shape};

use crate::error::WranglerError;
use crate::format::VectorDriver;

pub trait VectorConverter {
    fn to_feature_collection(
        &self,
        path: &Path,
        driver: VectorDriver,
    ) -> Result<PathBuf, WranglerError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureCollectionConverter;

impl VectorConverter for FeatureCollectionConverter {
    fn to_feature_collection(
        &self,
        path: &Path,
        driver: VectorDriver,
    ) -> Result<PathBuf, WranglerError> {
        let features = match driver {
            VectorDriver::EsriShapefile => shapefile_features(path)?,
            VectorDriver::Kml => {
                let text = fs::read_to_string(path).map_err(|err| {
                    WranglerError::VectorConversion(format!("read {}: {err}", path.display()))
                })?;
                kml_features(&text)?
            }
        };
        let mut json_path = path.as_os_str().to_owned();
        json_path.push(".json");
        let json_path = PathBuf::from(json_path);
        write_feature_collection(&json_path, features)?;
        Ok(json_path)
    }
}

pub fn write_feature_collection(path: &Path, features: Vec<Value>) -> Result<(), WranglerError> {
    let collection = json!({
        "type": "FeatureCollection",
        "features": features,
    });
    let file = fs::File::create(path)
        .map_err(|err| WranglerError::Filesystem(format!("create {}: {err}", path.display())))?;
    serde_json::to_writer(BufWriter::new(file), &collection)
        .map_err(|err| WranglerError::VectorConversion(err.to_string()))
}

fn feature(geometry: Value, properties: Map<String, Value>) -> Value {
    json!({
        "type": "Feature",
        "geometry": geometry,
        "properties": properties,
    })
}

// --- ESRI shapefile ---

fn shapefile_features(path: &Path) -> Result<Vec<Value>, WranglerError> {
    let mut reader = shapefile::Reader::from_path(path).map_err(|err| {
        WranglerError::VectorConversion(format!("open {}: {err}", path.display()))
    })?;
    let mut features = Vec::new();
    for item in reader.iter_shapes_and_records() {
        let (shape, record) =
            item.map_err(|err| WranglerError::VectorConversion(err.to_string()))?;
        let mut fields = HashMap::<String, FieldValue>::from(record)
            .into_iter()
            .collect::<Vec<_>>();
        fields.sort_by(|a, b| a.0.cmp(&b.0));
        let properties = fields
            .into_iter()
            .map(|(name, value)| (name, field_value(value)))
            .collect();
        features.push(feature(shape_geometry(&shape), properties));
    }
    Ok(features)
}

fn field_value(value: FieldValue) -> Value {
    match value {
        FieldValue::Character(text) => text.map(Value::String).unwrap_or(Value::Null),
        FieldValue::Memo(text) => Value::String(text),
        FieldValue::Numeric(number) => number.map(|n| json!(n)).unwrap_or(Value::Null),
        FieldValue::Float(number) => number.map(|n| json!(n)).unwrap_or(Value::Null),
        FieldValue::Logical(flag) => flag.map(Value::Bool).unwrap_or(Value::Null),
        FieldValue::Integer(number) => json!(number),
        FieldValue::Double(number) => json!(number),
        FieldValue::Currency(number) => json!(number),
        other => Value::String(format!("{other:?}")),
    }
}

trait Position {
    fn position(&self) -> Value;
}

impl Position for Point {
    fn position(&self) -> Value {
        json!([self.x, self.y])
    }
}

impl Position for PointM {
    fn position(&self) -> Value {
        json!([self.x, self.y])
    }
}

impl Position for PointZ {
    fn position(&self) -> Value {
        json!([self.x, self.y, self.z])
    }
}

fn positions<P: Position>(points: &[P]) -> Value {
    Value::Array(points.iter().map(Position::position).collect())
}

fn lines<P: Position>(parts: &[Vec<P>]) -> Value {
    if parts.len() == 1 {
        json!({"type": "LineString", "coordinates": positions(&parts[0])})
    } else {
        let coordinates = parts.iter().map(|part| positions(part)).collect::<Vec<_>>();
        json!({"type": "MultiLineString", "coordinates": coordinates})
    }
}

/// Shapefile polygons are a flat ring list; each outer ring opens a new
/// polygon and the inner rings that follow are its holes.
fn polygons<P: Position>(rings: &[PolygonRing<P>]) -> Value {
    let mut polygons: Vec<Vec<Value>> = Vec::new();
    for ring in rings {
        match ring {
            PolygonRing::Outer(points) => polygons.push(vec![positions(points)]),
            PolygonRing::Inner(points) => match polygons.last_mut() {
                Some(polygon) => polygon.push(positions(points)),
                None => polygons.push(vec![positions(points)]),
            },
        }
    }
    if polygons.len() == 1 {
        json!({"type": "Polygon", "coordinates": polygons.remove(0)})
    } else {
        json!({"type": "MultiPolygon", "coordinates": polygons})
    }
}

fn multipoint<P: Position>(points: &[P]) -> Value {
    json!({"type": "MultiPoint", "coordinates": positions(points)})
}

fn shape_geometry(shape: &Shape) -> Value {
    match shape {
        Shape::NullShape => Value::Null,
        Shape::Point(point) => json!({"type": "Point", "coordinates": point.position()}),
        Shape::PointM(point) => json!({"type": "Point", "coordinates": point.position()}),
        Shape::PointZ(point) => json!({"type": "Point", "coordinates": point.position()}),
        Shape::Polyline(line) => lines(line.parts()),
        Shape::PolylineM(line) => lines(line.parts()),
        Shape::PolylineZ(line) => lines(line.parts()),
        Shape::Polygon(polygon) => polygons(polygon.rings()),
        Shape::PolygonM(polygon) => polygons(polygon.rings()),
        Shape::PolygonZ(polygon) => polygons(polygon.rings()),
        Shape::Multipoint(points) => multipoint(points.points()),
        Shape::MultipointM(points) => multipoint(points.points()),
        Shape::MultipointZ(points) => multipoint(points.points()),
        Shape::Multipatch(_) => Value::Null,
    }
}

// --- KML ---

#[derive(Default)]
struct Placemark {
    properties: Map<String, Value>,
    geometries: Vec<Value>,
    polygon: Option<Vec<Value>>,
    data_name: Option<String>,
}

impl Placemark {
    fn into_feature(mut self) -> Value {
        let geometry = match self.geometries.len() {
            0 => Value::Null,
            1 => self.geometries.remove(0),
            _ => json!({"type": "GeometryCollection", "geometries": self.geometries}),
        };
        feature(geometry, self.properties)
    }
}

pub fn kml_features(text: &str) -> Result<Vec<Value>, WranglerError> {
    let mut reader = quick_xml::Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut features = Vec::new();
    let mut layers: Vec<String> = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut current: Option<Placemark> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|err| WranglerError::VectorConversion(format!("kml: {err}")))?;
        match event {
            Event::Start(start) => {
                let name = local_name(&start);
                match name.as_str() {
                    "Folder" | "Document" => layers.push(String::new()),
                    "Placemark" => current = Some(Placemark::default()),
                    "Polygon" => {
                        if let Some(placemark) = current.as_mut() {
                            placemark.polygon = Some(Vec::new());
                        }
                    }
                    "Data" | "SimpleData" => {
                        if let Some(placemark) = current.as_mut() {
                            placemark.data_name = attribute(&start, "name")?;
                        }
                    }
                    _ => {}
                }
                path.push(name);
            }
            Event::End(_) => {
                let Some(name) = path.pop() else { continue };
                match name.as_str() {
                    "Folder" | "Document" => {
                        layers.pop();
                    }
                    "Placemark" => {
                        if let Some(mut placemark) = current.take() {
                            if let Some(layer) = layers.iter().rev().find(|layer| !layer.is_empty())
                            {
                                placemark
                                    .properties
                                    .entry("layer")
                                    .or_insert_with(|| Value::String(layer.clone()));
                            }
                            features.push(placemark.into_feature());
                        }
                    }
                    "Polygon" => {
                        if let Some(placemark) = current.as_mut() {
                            if let Some(rings) = placemark.polygon.take() {
                                placemark
                                    .geometries
                                    .push(json!({"type": "Polygon", "coordinates": rings}));
                            }
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(content) => {
                let value = content
                    .unescape()
                    .map_err(|err| WranglerError::VectorConversion(format!("kml: {err}")))?
                    .into_owned();
                on_text(&path, &mut layers, current.as_mut(), value)?;
            }
            Event::CData(content) => {
                let value = String::from_utf8_lossy(&content.into_inner()).into_owned();
                on_text(&path, &mut layers, current.as_mut(), value)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(features)
}

fn on_text(
    path: &[String],
    layers: &mut [String],
    placemark: Option<&mut Placemark>,
    value: String,
) -> Result<(), WranglerError> {
    let Some(element) = path.last() else {
        return Ok(());
    };
    let parent = path.len().checked_sub(2).map(|idx| path[idx].as_str());

    let Some(placemark) = placemark else {
        // a name directly under a Folder/Document names the layer
        if element == "name" && matches!(parent, Some("Folder" | "Document")) {
            if let Some(layer) = layers.last_mut() {
                *layer = value;
            }
        }
        return Ok(());
    };

    match (element.as_str(), parent) {
        ("name" | "description", Some("Placemark")) => {
            placemark.properties.insert(element.clone(), Value::String(value));
        }
        ("value", Some("Data")) | ("SimpleData", _) => {
            if let Some(name) = placemark.data_name.take() {
                placemark.properties.insert(name, Value::String(value));
            }
        }
        ("coordinates", Some("Point")) => {
            let mut coordinates = parse_coordinates(&value)?;
            let position = if coordinates.is_empty() {
                Value::Null
            } else {
                coordinates.remove(0)
            };
            placemark
                .geometries
                .push(json!({"type": "Point", "coordinates": position}));
        }
        ("coordinates", Some("LineString")) => {
            placemark.geometries.push(
                json!({"type": "LineString", "coordinates": parse_coordinates(&value)?}),
            );
        }
        ("coordinates", Some("LinearRing")) => {
            let ring = Value::Array(parse_coordinates(&value)?);
            match placemark.polygon.as_mut() {
                Some(rings) => rings.push(ring),
                None => placemark
                    .geometries
                    .push(json!({"type": "LineString", "coordinates": ring})),
            }
        }
        _ => {}
    }
    Ok(())
}

/// KML tuples are `lon,lat[,alt]` separated by whitespace.
fn parse_coordinates(text: &str) -> Result<Vec<Value>, WranglerError> {
    text.split_whitespace()
        .map(|tuple| {
            let numbers = tuple
                .split(',')
                .map(|part| {
                    part.trim().parse::<f64>().map_err(|_| {
                        WranglerError::VectorConversion(format!("bad KML coordinate {tuple:?}"))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(json!(numbers))
        })
        .collect()
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).into_owned()
}

fn attribute(start: &BytesStart<'_>, name: &str) -> Result<Option<String>, WranglerError> {
    let attr = start
        .try_get_attribute(name)
        .map_err(|err| WranglerError::VectorConversion(format!("kml: {err}")))?;
    match attr {
        Some(attr) => attr
            .unescape_value()
            .map(|value| Some(value.into_owned()))
            .map_err(|err| WranglerError::VectorConversion(format!("kml: {err}"))),
        None => Ok(None),
    }
}
