use std::{fs, path::Path};

use thiserror::Error;

use crate::geometry::{Triangle, WorldBox, WorldPoint};

/// Triangulated scene geometry as flat vertex and index arrays.
#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub vertices: Vec<WorldPoint>,
    pub triangles: Vec<Triangle<usize>>,
}

impl Mesh {
    pub fn new(vertices: Vec<WorldPoint>, triangles: Vec<Triangle<usize>>) -> Mesh {
        assert!(
            triangles.iter().flat_map(|t| t.iter()).all(|i| *i < vertices.len()),
            "Triangle vertex index out of range"
        );
        Mesh {
            vertices,
            triangles,
        }
    }

    /// Load a mesh from a Wavefront OBJ file, keeping only positions.
    pub fn with_obj(p: impl AsRef<Path>) -> Result<Mesh, ObjOpenError> {
        let content = fs::read_to_string(p)?;
        let parsed = wavefront_obj::obj::parse(content)?;

        Ok(Self::load_obj(parsed))
    }

    fn load_obj(obj: wavefront_obj::obj::ObjSet) -> Mesh {
        let mut vertices = Vec::new();
        let mut triangles = Vec::new();
        let mut skipped = 0usize;

        for o in obj.objects.into_iter() {
            let offset = vertices.len();
            vertices.extend(
                o.vertices
                    .iter()
                    .map(|v| WorldPoint::new(v.x as f32, v.y as f32, v.z as f32)),
            );

            for geometry in o.geometry {
                for shape in geometry.shapes {
                    let wavefront_obj::obj::Primitive::Triangle(a, b, c) = shape.primitive else {
                        skipped += 1;
                        continue;
                    };

                    triangles.push(Triangle::new(a.0 + offset, b.0 + offset, c.0 + offset));
                }
            }
        }

        if skipped > 0 {
            tracing::warn!(skipped, "non-triangle primitives ignored");
        }
        tracing::debug!(
            vertices = vertices.len(),
            triangles = triangles.len(),
            "loaded obj mesh"
        );

        Mesh {
            vertices,
            triangles,
        }
    }

    pub fn triangle(&self, index: usize) -> Triangle<WorldPoint> {
        self.triangles[index].map(|i| self.vertices[*i])
    }

    pub fn bounding_box(&self) -> Option<WorldBox> {
        WorldBox::from_points(
            self.triangles
                .iter()
                .flat_map(|t| t.iter())
                .map(|i| &self.vertices[*i]),
        )
    }
}

#[derive(Debug, Error)]
pub enum ObjOpenError {
    #[error("Failed to read file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse file: {0}")]
    ParseError(#[from] wavefront_obj::ParseError),
}

#[cfg(test)]
mod test {
    use super::*;

    use assert2::{assert, let_assert};

    const TWO_OBJECTS: &str = "\
o first
v 0 0 0
v 1 0 0
v 0 1 0
f 1 2 3
o second
v 0 0 5
v 1 0 5
v 0 1 5
v 1 1 5
f 4 5 6
f 5 7 6
";

    #[test]
    fn obj_objects_are_offset() {
        let parsed = wavefront_obj::obj::parse(TWO_OBJECTS.to_string()).unwrap();
        let mesh = Mesh::load_obj(parsed);

        assert!(mesh.vertices.len() == 7);
        assert!(mesh.triangles.len() == 3);
        for t in &mesh.triangles[1..] {
            assert!(t.iter().all(|i| *i >= 3));
        }
        assert!(mesh.triangle(1)[0].z == 5.0);
    }

    #[test]
    fn bounding_box_of_mesh() {
        let parsed = wavefront_obj::obj::parse(TWO_OBJECTS.to_string()).unwrap();
        let mesh = Mesh::load_obj(parsed);

        let_assert!(Some(b) = mesh.bounding_box());
        assert!(b.min == WorldPoint::new(0.0, 0.0, 0.0));
        assert!(b.max == WorldPoint::new(1.0, 1.0, 5.0));
    }

    #[test]
    fn missing_file() {
        let_assert!(Err(ObjOpenError::ReadError(_)) = Mesh::with_obj("does/not/exist.obj"));
    }

    #[test]
    #[should_panic]
    fn index_out_of_range() {
        Mesh::new(vec![WorldPoint::origin()], vec![Triangle::new(0, 0, 1)]);
    }
}
