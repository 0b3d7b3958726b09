//! `sensor_msgs/PointCloud2` model and codec.
//!
//! Both input streams of the node arrive as PointCloud2 messages and the
//! output is published as one.  This module models the message the way
//! rosbridge serialises it to JSON and converts between the packed binary
//! layout and the typed point records of `centroids-types`.
//!
//! Only the fields the pipeline needs are read:
//!
//! | Reader | Fields |
//! |---|---|
//! | [`read_labeled_points`] | `x`, `y`, `z`, `label` |
//! | [`read_obstacle_points`] | `x`, `y`, `z` |
//!
//! Coordinates may be `FLOAT32` or `FLOAT64`; labels may be any integer
//! datatype that fits into a `u32`.  Points with a NaN coordinate are skipped.

use centroids_types::{Centroid, CentroidBatch, LabeledPoint, PipelineError, Point3};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// `sensor_msgs/PointField` datatype constants.
pub mod datatype {
    pub const INT8: u8 = 1;
    pub const UINT8: u8 = 2;
    pub const INT16: u8 = 3;
    pub const UINT16: u8 = 4;
    pub const INT32: u8 = 5;
    pub const UINT32: u8 = 6;
    pub const FLOAT32: u8 = 7;
    pub const FLOAT64: u8 = 8;
}

/// Byte length of one point in a cloud written by [`create_centroid_cloud`].
pub const CENTROID_POINT_STEP: u32 = 16;

/// `builtin_interfaces/Time`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Time {
    pub sec: i32,
    pub nanosec: u32,
}

impl From<DateTime<Utc>> for Time {
    fn from(stamp: DateTime<Utc>) -> Self {
        Self {
            sec: i32::try_from(stamp.timestamp()).unwrap_or(i32::MAX),
            nanosec: stamp.timestamp_subsec_nanos(),
        }
    }
}

/// `std_msgs/Header`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// `sensor_msgs/PointField`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointField {
    pub name: String,
    pub offset: u32,
    pub datatype: u8,
    pub count: u32,
}

impl PointField {
    pub fn new(name: &str, offset: u32, datatype: u8) -> Self {
        Self {
            name: name.to_string(),
            offset,
            datatype,
            count: 1,
        }
    }
}

/// `sensor_msgs/PointCloud2`.
///
/// `data` is carried as a plain JSON byte array.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PointCloud2 {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub fields: Vec<PointField>,
    pub is_bigendian: bool,
    pub point_step: u32,
    pub row_step: u32,
    pub data: Vec<u8>,
    pub is_dense: bool,
}

impl PointCloud2 {
    /// Number of points the layout declares (`width * height`).
    pub fn point_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    fn field(&self, name: &str) -> Result<&PointField, PipelineError> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .ok_or_else(|| PipelineError::Parsing(format!("PointCloud2 has no '{name}' field")))
    }

    /// Check that the declared layout fits inside `data`.
    fn check_layout(&self) -> Result<(), PipelineError> {
        let point_step = self.point_step as usize;
        let row_step = self.row_step as usize;
        let needed_row = point_step
            .checked_mul(self.width as usize)
            .ok_or_else(|| PipelineError::Parsing("PointCloud2 row size overflows".to_string()))?;
        if row_step < needed_row {
            return Err(PipelineError::Parsing(format!(
                "row_step {row_step} is smaller than point_step * width = {needed_row}"
            )));
        }
        let needed = row_step
            .checked_mul(self.height as usize)
            .ok_or_else(|| PipelineError::Parsing("PointCloud2 data size overflows".to_string()))?;
        if self.data.len() < needed {
            return Err(PipelineError::Parsing(format!(
                "PointCloud2 data holds {} bytes, layout needs {needed}",
                self.data.len()
            )));
        }
        Ok(())
    }

    /// Byte offsets of every point, row-major.
    fn point_offsets(&self) -> impl Iterator<Item = usize> + '_ {
        let (row_step, point_step) = (self.row_step as usize, self.point_step as usize);
        // Rows of zero points are not walked.
        let rows = if self.width == 0 { 0 } else { self.height as usize };
        (0..rows).flat_map(move |row| {
            (0..self.width as usize).map(move |col| row * row_step + col * point_step)
        })
    }
}

// ---------------------------------------------------------------------------
// Field readers
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct FieldReader {
    offset: usize,
    datatype: u8,
    big_endian: bool,
}

impl FieldReader {
    fn bind(cloud: &PointCloud2, name: &str, allowed: &[u8]) -> Result<Self, PipelineError> {
        let field = cloud.field(name)?;
        let size = datatype_size(field.datatype).ok_or_else(|| {
            PipelineError::Parsing(format!(
                "field '{name}' has unknown datatype {}",
                field.datatype
            ))
        })?;
        if !allowed.contains(&field.datatype) {
            return Err(PipelineError::Parsing(format!(
                "field '{name}' has unsupported datatype {}",
                field.datatype
            )));
        }
        if field.offset as usize + size > cloud.point_step as usize {
            return Err(PipelineError::Parsing(format!(
                "field '{name}' at offset {} does not fit in point_step {}",
                field.offset, cloud.point_step
            )));
        }
        Ok(Self {
            offset: field.offset as usize,
            datatype: field.datatype,
            big_endian: cloud.is_bigendian,
        })
    }

    fn bytes<const N: usize>(&self, data: &[u8], base: usize) -> [u8; N] {
        let start = base + self.offset;
        let mut buf = [0u8; N];
        buf.copy_from_slice(&data[start..start + N]);
        buf
    }

    fn read_f32(&self, data: &[u8], base: usize) -> f32 {
        match self.datatype {
            datatype::FLOAT64 => {
                let b = self.bytes::<8>(data, base);
                let v = if self.big_endian { f64::from_be_bytes(b) } else { f64::from_le_bytes(b) };
                v as f32
            }
            _ => {
                let b = self.bytes::<4>(data, base);
                if self.big_endian { f32::from_be_bytes(b) } else { f32::from_le_bytes(b) }
            }
        }
    }

    fn read_label(&self, data: &[u8], base: usize) -> Result<u32, PipelineError> {
        let be = self.big_endian;
        let value: i64 = match self.datatype {
            datatype::INT8 => i8::from_ne_bytes(self.bytes::<1>(data, base)) as i64,
            datatype::UINT8 => self.bytes::<1>(data, base)[0] as i64,
            datatype::INT16 => {
                let b = self.bytes::<2>(data, base);
                (if be { i16::from_be_bytes(b) } else { i16::from_le_bytes(b) }) as i64
            }
            datatype::UINT16 => {
                let b = self.bytes::<2>(data, base);
                (if be { u16::from_be_bytes(b) } else { u16::from_le_bytes(b) }) as i64
            }
            datatype::INT32 => {
                let b = self.bytes::<4>(data, base);
                (if be { i32::from_be_bytes(b) } else { i32::from_le_bytes(b) }) as i64
            }
            _ => {
                let b = self.bytes::<4>(data, base);
                (if be { u32::from_be_bytes(b) } else { u32::from_le_bytes(b) }) as i64
            }
        };
        u32::try_from(value)
            .map_err(|_| PipelineError::Parsing(format!("negative label {value} in PointCloud2")))
    }
}

fn datatype_size(datatype: u8) -> Option<usize> {
    match datatype {
        datatype::INT8 | datatype::UINT8 => Some(1),
        datatype::INT16 | datatype::UINT16 => Some(2),
        datatype::INT32 | datatype::UINT32 | datatype::FLOAT32 => Some(4),
        datatype::FLOAT64 => Some(8),
        _ => None,
    }
}

const COORD_TYPES: &[u8] = &[datatype::FLOAT32, datatype::FLOAT64];
const LABEL_TYPES: &[u8] = &[
    datatype::INT8,
    datatype::UINT8,
    datatype::INT16,
    datatype::UINT16,
    datatype::INT32,
    datatype::UINT32,
];

fn xyz_readers(cloud: &PointCloud2) -> Result<[FieldReader; 3], PipelineError> {
    Ok([
        FieldReader::bind(cloud, "x", COORD_TYPES)?,
        FieldReader::bind(cloud, "y", COORD_TYPES)?,
        FieldReader::bind(cloud, "z", COORD_TYPES)?,
    ])
}

fn read_xyz(readers: &[FieldReader; 3], data: &[u8], base: usize) -> Point3 {
    let [x, y, z] = readers;
    Point3::new(x.read_f32(data, base), y.read_f32(data, base), z.read_f32(data, base))
}

fn has_nan(p: &Point3) -> bool {
    p.x.is_nan() || p.y.is_nan() || p.z.is_nan()
}

// ---------------------------------------------------------------------------
// Public codec
// ---------------------------------------------------------------------------

/// Decode a `/transformed_points` cloud into labeled points.
///
/// # Errors
///
/// [`PipelineError::Parsing`] when a required field is missing, has an
/// unsupported datatype, or the data buffer is shorter than the layout.
pub fn read_labeled_points(cloud: &PointCloud2) -> Result<Vec<LabeledPoint>, PipelineError> {
    cloud.check_layout()?;
    let xyz = xyz_readers(cloud)?;
    let label = FieldReader::bind(cloud, "label", LABEL_TYPES)?;

    let mut points = Vec::with_capacity(cloud.point_count());
    for base in cloud.point_offsets() {
        let position = read_xyz(&xyz, &cloud.data, base);
        if has_nan(&position) {
            continue;
        }
        points.push(LabeledPoint {
            position,
            label: label.read_label(&cloud.data, base)?,
        });
    }
    Ok(points)
}

/// Decode a `/cloud_obstacles` cloud into plain points.
///
/// # Errors
///
/// Same conditions as [`read_labeled_points`], minus the `label` field.
pub fn read_obstacle_points(cloud: &PointCloud2) -> Result<Vec<Point3>, PipelineError> {
    cloud.check_layout()?;
    let xyz = xyz_readers(cloud)?;
    Ok(cloud
        .point_offsets()
        .map(|base| read_xyz(&xyz, &cloud.data, base))
        .filter(|p| !has_nan(p))
        .collect())
}

/// Encode a centroid batch as an unorganised little-endian cloud with fields
/// `x`, `y`, `z` (`FLOAT32`) and `label` (`UINT32`).
pub fn create_centroid_cloud(batch: &CentroidBatch) -> PointCloud2 {
    let mut data = Vec::with_capacity(batch.points.len() * CENTROID_POINT_STEP as usize);
    for Centroid { position, label } in &batch.points {
        data.extend_from_slice(&position.x.to_le_bytes());
        data.extend_from_slice(&position.y.to_le_bytes());
        data.extend_from_slice(&position.z.to_le_bytes());
        data.extend_from_slice(&label.to_le_bytes());
    }

    let width = batch.points.len() as u32;
    PointCloud2 {
        header: Header {
            stamp: Time::from(batch.stamp),
            frame_id: batch.frame_id.clone(),
        },
        height: 1,
        width,
        fields: vec![
            PointField::new("x", 0, datatype::FLOAT32),
            PointField::new("y", 4, datatype::FLOAT32),
            PointField::new("z", 8, datatype::FLOAT32),
            PointField::new("label", 12, datatype::UINT32),
        ],
        is_bigendian: false,
        point_step: CENTROID_POINT_STEP,
        row_step: CENTROID_POINT_STEP * width,
        data,
        is_dense: batch.points.iter().all(|c| c.position.is_finite()),
    }
}

/// Build a little-endian `x, y, z` cloud. Used by tests and the replay tools.
pub fn create_xyz_cloud(frame_id: &str, points: &[Point3]) -> PointCloud2 {
    let mut data = Vec::with_capacity(points.len() * 12);
    for p in points {
        data.extend_from_slice(&p.x.to_le_bytes());
        data.extend_from_slice(&p.y.to_le_bytes());
        data.extend_from_slice(&p.z.to_le_bytes());
    }
    let width = points.len() as u32;
    PointCloud2 {
        header: Header {
            stamp: Time::default(),
            frame_id: frame_id.to_string(),
        },
        height: 1,
        width,
        fields: vec![
            PointField::new("x", 0, datatype::FLOAT32),
            PointField::new("y", 4, datatype::FLOAT32),
            PointField::new("z", 8, datatype::FLOAT32),
        ],
        is_bigendian: false,
        point_step: 12,
        row_step: 12 * width,
        data,
        is_dense: points.iter().all(Point3::is_finite),
    }
}

/// Build a little-endian `x, y, z, label` cloud.
pub fn create_labeled_cloud(frame_id: &str, points: &[LabeledPoint]) -> PointCloud2 {
    let batch = CentroidBatch {
        frame_id: frame_id.to_string(),
        stamp: DateTime::<Utc>::default(),
        points: points
            .iter()
            .map(|p| Centroid::new(p.position, p.label))
            .collect(),
    };
    create_centroid_cloud(&batch)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big_endian_cloud(points: &[(f32, f32, f32, u32)]) -> PointCloud2 {
        let mut data = Vec::new();
        for (x, y, z, l) in points {
            data.extend_from_slice(&x.to_be_bytes());
            data.extend_from_slice(&y.to_be_bytes());
            data.extend_from_slice(&z.to_be_bytes());
            data.extend_from_slice(&l.to_be_bytes());
        }
        let width = points.len() as u32;
        PointCloud2 {
            header: Header::default(),
            height: 1,
            width,
            fields: vec![
                PointField::new("x", 0, datatype::FLOAT32),
                PointField::new("y", 4, datatype::FLOAT32),
                PointField::new("z", 8, datatype::FLOAT32),
                PointField::new("label", 12, datatype::UINT32),
            ],
            is_bigendian: true,
            point_step: 16,
            row_step: 16 * width,
            data,
            is_dense: true,
        }
    }

    #[test]
    fn centroid_cloud_layout() {
        let batch = CentroidBatch {
            frame_id: "map".to_string(),
            stamp: DateTime::<Utc>::default(),
            points: vec![
                Centroid::new(Point3::new(0.025, 0.0, 0.0), 1),
                Centroid::new(Point3::new(1.0, 2.0, 3.0), 9),
            ],
        };
        let cloud = create_centroid_cloud(&batch);

        assert_eq!(cloud.header.frame_id, "map");
        assert_eq!((cloud.height, cloud.width), (1, 2));
        assert_eq!(cloud.point_step, 16);
        assert_eq!(cloud.row_step, 32);
        assert_eq!(cloud.data.len(), 32);
        assert!(!cloud.is_bigendian);
        let offsets: Vec<(&str, u32, u8)> = cloud
            .fields
            .iter()
            .map(|f| (f.name.as_str(), f.offset, f.datatype))
            .collect();
        assert_eq!(
            offsets,
            vec![
                ("x", 0, datatype::FLOAT32),
                ("y", 4, datatype::FLOAT32),
                ("z", 8, datatype::FLOAT32),
                ("label", 12, datatype::UINT32),
            ]
        );
        assert_eq!(&cloud.data[28..32], &9u32.to_le_bytes());
    }

    #[test]
    fn labeled_points_read_back_from_centroid_cloud() {
        let points = [
            LabeledPoint::new(0.0, 0.0, 0.0, 1),
            LabeledPoint::new(0.05, 0.0, 0.0, 1),
            LabeledPoint::new(5.0, 5.0, 5.0, 2),
        ];
        let cloud = create_labeled_cloud("map", &points);
        assert_eq!(read_labeled_points(&cloud).unwrap(), points.to_vec());
    }

    #[test]
    fn big_endian_clouds_are_decoded() {
        let cloud = big_endian_cloud(&[(1.5, -2.0, 0.25, 7)]);
        let points = read_labeled_points(&cloud).unwrap();
        assert_eq!(points, vec![LabeledPoint::new(1.5, -2.0, 0.25, 7)]);
    }

    #[test]
    fn nan_points_are_skipped() {
        let cloud = create_xyz_cloud(
            "map",
            &[
                Point3::new(0.0, 0.0, 0.0),
                Point3::new(f32::NAN, 1.0, 1.0),
                Point3::new(2.0, 2.0, 2.0),
            ],
        );
        let points = read_obstacle_points(&cloud).unwrap();
        assert_eq!(points, vec![Point3::new(0.0, 0.0, 0.0), Point3::new(2.0, 2.0, 2.0)]);
    }

    #[test]
    fn obstacle_reader_ignores_extra_fields() {
        let cloud = create_labeled_cloud("map", &[LabeledPoint::new(1.0, 2.0, 3.0, 4)]);
        assert_eq!(read_obstacle_points(&cloud).unwrap(), vec![Point3::new(1.0, 2.0, 3.0)]);
    }

    #[test]
    fn missing_label_field_is_a_parsing_error() {
        let cloud = create_xyz_cloud("map", &[Point3::new(0.0, 0.0, 0.0)]);
        assert!(matches!(
            read_labeled_points(&cloud),
            Err(PipelineError::Parsing(_))
        ));
    }

    #[test]
    fn truncated_data_is_a_parsing_error() {
        let mut cloud = create_xyz_cloud("map", &[Point3::new(0.0, 0.0, 0.0); 3]);
        cloud.data.truncate(20);
        assert!(matches!(
            read_obstacle_points(&cloud),
            Err(PipelineError::Parsing(_))
        ));
    }

    #[test]
    fn zero_width_cloud_with_huge_height_is_empty() {
        let mut cloud = create_xyz_cloud("map", &[]);
        cloud.height = u32::MAX;
        cloud.width = 0;
        cloud.row_step = 0;
        assert_eq!(cloud.point_count(), 0);
        assert!(read_obstacle_points(&cloud).unwrap().is_empty());
    }

    #[test]
    fn float_label_is_rejected() {
        let mut cloud = create_labeled_cloud("map", &[LabeledPoint::new(0.0, 0.0, 0.0, 1)]);
        cloud.fields[3].datatype = datatype::FLOAT32;
        assert!(matches!(
            read_labeled_points(&cloud),
            Err(PipelineError::Parsing(_))
        ));
    }

    #[test]
    fn field_past_point_step_is_rejected() {
        let mut cloud = create_xyz_cloud("map", &[Point3::new(0.0, 0.0, 0.0)]);
        cloud.fields[2].offset = 10;
        assert!(matches!(
            read_obstacle_points(&cloud),
            Err(PipelineError::Parsing(_))
        ));
    }

    #[test]
    fn float64_coordinates_and_uint8_labels() {
        let mut data = Vec::new();
        data.extend_from_slice(&1.25f64.to_le_bytes());
        data.extend_from_slice(&(-0.5f64).to_le_bytes());
        data.extend_from_slice(&3.0f64.to_le_bytes());
        data.push(42);
        let cloud = PointCloud2 {
            header: Header::default(),
            height: 1,
            width: 1,
            fields: vec![
                PointField::new("x", 0, datatype::FLOAT64),
                PointField::new("y", 8, datatype::FLOAT64),
                PointField::new("z", 16, datatype::FLOAT64),
                PointField::new("label", 24, datatype::UINT8),
            ],
            is_bigendian: false,
            point_step: 25,
            row_step: 25,
            data,
            is_dense: true,
        };
        assert_eq!(
            read_labeled_points(&cloud).unwrap(),
            vec![LabeledPoint::new(1.25, -0.5, 3.0, 42)]
        );
    }

    #[test]
    fn organised_cloud_with_row_padding() {
        // 2x2 cloud, 4 bytes of padding after each row.
        let mut data = Vec::new();
        for row in 0..2 {
            for col in 0..2 {
                for v in [row as f32, col as f32, 0.0] {
                    data.extend_from_slice(&v.to_le_bytes());
                }
            }
            data.extend_from_slice(&[0u8; 4]);
        }
        let mut cloud = create_xyz_cloud("map", &[]);
        cloud.height = 2;
        cloud.width = 2;
        cloud.row_step = 28;
        cloud.data = data;

        let points = read_obstacle_points(&cloud).unwrap();
        assert_eq!(points.len(), 4);
        assert_eq!(points[3], Point3::new(1.0, 1.0, 0.0));
    }

    #[test]
    fn cloud_json_round_trip() {
        let cloud = create_xyz_cloud("map", &[Point3::new(1.0, 0.0, 0.0)]);
        let json = serde_json::to_string(&cloud).unwrap();
        let back: PointCloud2 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cloud);
    }

    #[test]
    fn stamp_conversion() {
        let stamp = DateTime::<Utc>::from_timestamp(1_700_000_000, 250).unwrap();
        assert_eq!(
            Time::from(stamp),
            Time {
                sec: 1_700_000_000,
                nanosec: 250
            }
        );
    }
}
