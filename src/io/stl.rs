//! STL (stereolithography) format support.
//!
//! STL stores three corners per triangle, so shared corners are merged back
//! into points on load. Saving writes binary STL with per-triangle normals.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Seek, Write};
use std::path::Path;

use nalgebra::Point3;

use super::Triangulation;
use crate::error::{Result, VuError};

/// Load a triangulation from an STL file.
///
/// Automatically detects binary vs ASCII format. Triangles that collapse
/// after merging corners are skipped.
///
/// # Example
///
/// ```no_run
/// use vugraph::io::stl;
///
/// let tin = stl::load("terrain.stl").unwrap();
/// println!("{} triangles", tin.triangles.len());
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<Triangulation> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    read(&mut file).map_err(|message| VuError::LoadError {
        path: path.to_path_buf(),
        message,
    })
}

fn read<R: Read + Seek>(reader: &mut R) -> std::result::Result<Triangulation, String> {
    let stl = stl_io::read_stl(reader).map_err(|e| e.to_string())?;

    // Corners are stored as f32, so equal bits mean the same point.
    let mut index_of: HashMap<[u32; 3], usize> = HashMap::new();
    let mut points = Vec::new();
    let mut point_index = |v: &stl_io::Vertex| -> usize {
        let key = [v[0].to_bits(), v[1].to_bits(), v[2].to_bits()];
        *index_of.entry(key).or_insert_with(|| {
            points.push(Point3::new(v[0] as f64, v[1] as f64, v[2] as f64));
            points.len() - 1
        })
    };

    let mut triangles = Vec::with_capacity(stl.faces.len());
    for face in &stl.faces {
        let [a, b, c] = face.vertices.map(|i| point_index(&stl.vertices[i]));
        if a != b && b != c && a != c {
            triangles.push([a, b, c]);
        }
    }

    if triangles.is_empty() {
        return Err("STL file contains no valid triangles".to_string());
    }
    Ok(Triangulation { points, triangles })
}

/// Save a triangulation to a binary STL file.
pub fn save<P: AsRef<Path>>(triangulation: &Triangulation, path: P) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write(triangulation, &mut writer).map_err(|message| VuError::SaveError {
        path: path.to_path_buf(),
        message,
    })
}

fn write<W: Write>(triangulation: &Triangulation, writer: &mut W) -> std::result::Result<(), String> {
    let points = &triangulation.points;
    let vertex = |p: &Point3<f64>| stl_io::Vertex::new([p.x as f32, p.y as f32, p.z as f32]);
    let mut triangles = Vec::with_capacity(triangulation.triangles.len());
    for (fi, tri) in triangulation.triangles.iter().enumerate() {
        let [p0, p1, p2] = tri.map(|i| points.get(i));
        let (Some(p0), Some(p1), Some(p2)) = (p0, p1, p2) else {
            return Err(format!("triangle {} references a missing point", fi));
        };
        let n = (p1 - p0).cross(&(p2 - p0));
        let n = n.try_normalize(0.0).unwrap_or_else(nalgebra::Vector3::z);
        triangles.push(stl_io::Triangle {
            normal: stl_io::Normal::new([n.x as f32, n.y as f32, n.z as f32]),
            vertices: [vertex(p0), vertex(p1), vertex(p2)],
        });
    }
    stl_io::write_stl(writer, triangles.iter()).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn square() -> Triangulation {
        Triangulation {
            points: vec![
                Point3::new(0.0, 0.0, 1.0),
                Point3::new(1.0, 0.0, 1.5),
                Point3::new(1.0, 1.0, 2.0),
                Point3::new(0.0, 1.0, 1.5),
            ],
            triangles: vec![[0, 1, 2], [0, 2, 3]],
        }
    }

    #[test]
    fn test_write_then_read_merges_corners() {
        let mut buffer = Cursor::new(Vec::new());
        write(&square(), &mut buffer).unwrap();
        buffer.set_position(0);
        let tin = read(&mut buffer).unwrap();
        assert_eq!(tin.points.len(), 4);
        assert_eq!(tin.triangles.len(), 2);
        assert!(tin.points.contains(&Point3::new(1.0, 1.0, 2.0)));
    }

    #[test]
    fn test_missing_point_is_an_error() {
        let mut tin = square();
        tin.triangles.push([0, 1, 9]);
        let mut buffer = Cursor::new(Vec::new());
        assert!(write(&tin, &mut buffer).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = load("/nonexistent/vugraph/terrain.stl").unwrap_err();
        assert!(matches!(err, VuError::Io(_)));
    }
}
