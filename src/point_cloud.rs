use crate::error::{LpcError, Result};
use crate::geometry::aabb::Aabb;
use bytemuck::{Pod, Zeroable};
use std::path::Path;

/// One decoded sample. Layout matches `Point` in `common.wgsl` (seven packed f32).
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Point {
    pub position: [f32; 3],
    pub color: [f32; 3],
    pub intensity: f32,
}

impl Point {
    pub fn new(position: [f32; 3], color: [f32; 3], intensity: f32) -> Self {
        Self {
            position,
            color,
            intensity,
        }
    }

    pub fn at(position: [f32; 3]) -> Self {
        Self::new(position, [1.0; 3], 1.0)
    }
}

/// A point as stored in the source file, before re-basing and normalisation.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RawRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rgb: Option<[u16; 3]>,
    pub intensity: u16,
}

impl From<&las::Point> for RawRecord {
    fn from(p: &las::Point) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
            rgb: p.color.map(|c| [c.red, c.green, c.blue]),
            intensity: p.intensity,
        }
    }
}

/// CPU-side point array in file order plus the bounds used for Morton quantisation.
#[derive(Debug, Clone, Default)]
pub struct PointCloudData {
    points: Vec<Point>,
    bounds: Aabb,
}

impl PointCloudData {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_points(points: Vec<Point>) -> Self {
        let bounds = Aabb::from_points(points.iter().map(|p| &p.position));
        Self { points, bounds }
    }

    /// Read a LAS/LAZ file and decode every record.
    pub fn load(path: &Path) -> Result<Self> {
        let point_file = |source| LpcError::PointFile {
            path: path.to_path_buf(),
            source,
        };
        let mut reader = las::Reader::from_path(path).map_err(point_file)?;
        log::info!(
            "loading {} ({} points declared)",
            path.display(),
            reader.header().number_of_points()
        );

        // The declared count is not trusted for allocation; a truncated file ends in an
        // error instead.
        let records = reader
            .points()
            .map(|point| point.map(|p| RawRecord::from(&p)))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(point_file)?;

        let cloud = Self::decode(&records);
        log::info!(
            "decoded {} points, bounds min {:?} max {:?}",
            cloud.len(),
            cloud.bounds.min,
            cloud.bounds.max
        );
        Ok(cloud)
    }

    /// Re-base positions into the renderer frame and normalise 16-bit attributes.
    ///
    /// X and Z are shifted to start at zero, the file's Y axis becomes depth and is
    /// flipped against its maximum, so every component stays non-negative.
    pub fn decode(records: &[RawRecord]) -> Self {
        if records.is_empty() {
            return Self::empty();
        }

        let (mut min_x, mut min_z, mut max_y) = (f64::MAX, f64::MAX, f64::MIN);
        for r in records {
            min_x = min_x.min(r.x);
            min_z = min_z.min(r.z);
            max_y = max_y.max(r.y);
        }

        let norm = |v: u16| v as f32 / 65535.0;
        let points = records
            .iter()
            .map(|r| {
                let position = [(r.x - min_x) as f32, (r.z - min_z) as f32, (max_y - r.y) as f32];
                let color = r
                    .rgb
                    .map(|[red, green, blue]| [norm(red), norm(green), norm(blue)])
                    .unwrap_or([0.0; 3]);
                Point::new(position, color, norm(r.intensity))
            })
            .collect();
        Self::from_points(points)
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(x: f64, y: f64, z: f64) -> RawRecord {
        RawRecord {
            x,
            y,
            z,
            rgb: Some([65535, 0, 32768]),
            intensity: 65535,
        }
    }

    #[test]
    fn point_is_seven_floats() {
        assert_eq!(size_of::<Point>(), 28);
    }

    #[test]
    fn decode_rebases_and_flips_axes() {
        let cloud = PointCloudData::decode(&[
            record(100.0, 50.0, 10.0),
            record(102.0, 40.0, 12.0),
        ]);
        let p = cloud.points();
        assert_eq!(p[0].position, [0.0, 0.0, 0.0]);
        assert_eq!(p[1].position, [2.0, 2.0, 10.0]);
        assert_eq!(cloud.bounds().min, [0.0, 0.0, 0.0]);
        assert_eq!(cloud.bounds().max, [2.0, 2.0, 10.0]);
    }

    #[test]
    fn decode_normalises_attributes() {
        let mut r = record(0.0, 0.0, 0.0);
        r.intensity = 0;
        let cloud = PointCloudData::decode(&[r]);
        let p = cloud.points()[0];
        assert_eq!(p.color[0], 1.0);
        assert_eq!(p.color[1], 0.0);
        assert!((p.color[2] - 0.5).abs() < 1e-4);
        assert_eq!(p.intensity, 0.0);
    }

    #[test]
    fn missing_color_is_black() {
        let mut r = record(0.0, 0.0, 0.0);
        r.rgb = None;
        let cloud = PointCloudData::decode(&[r]);
        assert_eq!(cloud.points()[0].color, [0.0; 3]);
    }

    #[test]
    fn decode_empty_stays_empty() {
        let cloud = PointCloudData::decode(&[]);
        assert!(cloud.is_empty());
        assert!(!cloud.bounds().is_valid());
    }

    #[test]
    fn load_missing_file_is_an_error() {
        let err = PointCloudData::load(Path::new("/nonexistent/cloud.las")).unwrap_err();
        assert!(matches!(err, LpcError::PointFile { .. }));
    }

    fn write_single_point(path: &Path) {
        let mut writer = las::Writer::from_path(path, las::Header::default()).unwrap();
        writer
            .write_point(las::Point {
                x: 3.0,
                y: 4.0,
                z: 5.0,
                ..Default::default()
            })
            .unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn load_reads_written_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.las");
        write_single_point(&path);

        let cloud = PointCloudData::load(&path).unwrap();
        assert_eq!(cloud.len(), 1);
        assert_eq!(cloud.points()[0].position, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn overstated_point_count_does_not_abort() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lying.las");
        write_single_point(&path);

        // Legacy point count field of the public header block.
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[107..111].copy_from_slice(&u32::MAX.to_le_bytes());
        std::fs::write(&path, bytes).unwrap();

        match PointCloudData::load(&path) {
            Ok(cloud) => assert!(cloud.len() <= 1),
            Err(err) => assert!(matches!(err, LpcError::PointFile { .. })),
        }
    }
}
