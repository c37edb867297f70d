use std::path::{Path, PathBuf};

use thiserror::Error;

use super::DirectionalQuadTree;

/// Side of the snapshot images in pixels.
pub const SNAPSHOT_SIDE: u32 = 256;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Failed to create snapshot directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write snapshot: {0}")]
    Write(#[from] image::ImageError),
}

/// File name of the snapshot of spatial leaf `leaf` taken at the end of iteration `iteration`.
pub fn snapshot_path(dir: &Path, iteration: u32, leaf: usize) -> PathBuf {
    dir.join(format!("quadtree_{iteration}_{leaf}.png"))
}

/// Writes the flux distribution of a quadtree as a grayscale PNG.
pub fn save_quadtree_snapshot(
    dir: &Path,
    iteration: u32,
    leaf: usize,
    tree: &DirectionalQuadTree,
) -> Result<PathBuf, SnapshotError> {
    std::fs::create_dir_all(dir).map_err(|source| SnapshotError::CreateDir {
        path: dir.to_owned(),
        source,
    })?;

    let path = snapshot_path(dir, iteration, leaf);
    tree.rasterize(SNAPSHOT_SIDE).save(&path)?;
    tracing::debug!(path = %path.display(), "quadtree snapshot written");

    Ok(path)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::geometry::SquarePoint;

    use assert2::{assert, let_assert};

    fn scratch_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("pathguide-{}-{}", name, std::process::id()))
    }

    #[test]
    fn names_follow_iteration_and_leaf() {
        let path = snapshot_path(Path::new("out"), 3, 12);
        assert!(path == Path::new("out").join("quadtree_3_12.png"));
    }

    #[test]
    fn writes_png() {
        let dir = scratch_dir("snapshot");
        let mut tree = DirectionalQuadTree::new(0.01);
        tree.splat(&SquarePoint::new(0.25, 0.75), 1.0);
        tree.refine();

        let_assert!(Ok(path) = save_quadtree_snapshot(&dir, 0, 0, &tree));
        let_assert!(Ok(image) = image::open(&path));
        assert!(image.width() == SNAPSHOT_SIDE);
        assert!(image.height() == SNAPSHOT_SIDE);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn unwritable_directory() {
        let dir = scratch_dir("not-a-dir");
        std::fs::write(&dir, b"file in the way").unwrap();

        let tree = DirectionalQuadTree::new(0.01);
        let_assert!(
            Err(SnapshotError::CreateDir { .. }) = save_quadtree_snapshot(&dir, 0, 0, &tree)
        );

        std::fs::remove_file(&dir).ok();
    }
}
