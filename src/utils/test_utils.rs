use nalgebra::{Matrix4, Point3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::frame::FrameSample;
use crate::io::input::CenterlineData;

/// Pose with identity rotation (image plane normal along +z) placed at `origin`.
pub fn axial_pose(origin: Point3<f64>) -> Matrix4<f64> {
    let mut pose = Matrix4::identity();
    pose[(0, 3)] = origin.x;
    pose[(1, 3)] = origin.y;
    pose[(2, 3)] = origin.z;
    pose
}

/// `n` evenly spaced points on the z axis from 0 to `length`, chained by lines.
pub fn straight_centerline(n: usize, length: f64) -> CenterlineData {
    let step = if n > 1 { length / (n - 1) as f64 } else { 0.0 };
    let points = (0..n)
        .map(|i| Point3::new(0.0, 0.0, i as f64 * step))
        .collect();
    let lines = (1..n).map(|i| [i - 1, i]).collect();
    CenterlineData::new(points, lines)
}

/// Trunk along z ending in a fork at the origin with two arms in the xz plane.
///
/// ```text
///   6       4
///    5     3
///       2
///       1
///       0
/// ```
pub fn fork_centerline() -> CenterlineData {
    let points = vec![
        Point3::new(0.0, 0.0, -2.0),
        Point3::new(0.0, 0.0, -1.0),
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 1.0),
        Point3::new(2.0, 0.0, 2.0),
        Point3::new(-1.0, 0.0, 1.0),
        Point3::new(-2.0, 0.0, 2.0),
    ];
    let lines = vec![[0, 1], [1, 2], [2, 3], [3, 4], [2, 5], [5, 6]];
    CenterlineData::new(points, lines)
}

/// Axial frame of constant `value` centred on the z axis at height `z`.
pub fn uniform_frame(value: f64, size: usize, spacing: f64, z: f64, idx: usize) -> FrameSample {
    let half = size as f64 * spacing / 2.0;
    FrameSample::new(
        vec![value; size * size],
        size,
        size,
        (spacing, spacing),
        axial_pose(Point3::new(-half, -half, z)),
        idx,
    )
    .expect("uniform frame")
}

/// Same as [`uniform_frame`] with seeded uniform noise of amplitude `noise`.
pub fn noisy_frame(
    value: f64,
    noise: f64,
    seed: u64,
    size: usize,
    spacing: f64,
    z: f64,
    idx: usize,
) -> FrameSample {
    let mut rng = StdRng::seed_from_u64(seed);
    let pixels = (0..size * size)
        .map(|_| value + rng.random_range(-noise..=noise))
        .collect();
    let half = size as f64 * spacing / 2.0;
    FrameSample::new(
        pixels,
        size,
        size,
        (spacing, spacing),
        axial_pose(Point3::new(-half, -half, z)),
        idx,
    )
    .expect("noisy frame")
}

/// Fresh per-test directory under the system temp dir.
pub fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("anglecorrs_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("create scratch dir");
    dir
}

/// Writes `frame` as `<prefix><idx>.mhd` with little-endian doubles in a
/// separate `.raw` file.
pub fn write_frame(prefix: &str, frame: &FrameSample) {
    let mhd = PathBuf::from(format!("{}{}.mhd", prefix, frame.idx()));
    let raw = mhd.with_extension("raw");
    let raw_name = raw
        .file_name()
        .and_then(|n| n.to_str())
        .expect("raw file name")
        .to_string();

    let pose = frame.pose();
    let mut header = String::new();
    writeln!(header, "ObjectType = Image").unwrap();
    writeln!(header, "NDims = 2").unwrap();
    writeln!(header, "BinaryData = True").unwrap();
    writeln!(header, "BinaryDataByteOrderMSB = False").unwrap();
    let rotation: Vec<String> = (0..3)
        .flat_map(|col| (0..3).map(move |row| (row, col)))
        .map(|(row, col)| pose[(row, col)].to_string())
        .collect();
    writeln!(header, "TransformMatrix = {}", rotation.join(" ")).unwrap();
    writeln!(
        header,
        "Offset = {} {} {}",
        pose[(0, 3)],
        pose[(1, 3)],
        pose[(2, 3)]
    )
    .unwrap();
    writeln!(header, "DimSize = {} {}", frame.width(), frame.height()).unwrap();
    writeln!(
        header,
        "ElementSpacing = {} {}",
        frame.spacing().0,
        frame.spacing().1
    )
    .unwrap();
    writeln!(header, "ElementType = MET_DOUBLE").unwrap();
    writeln!(header, "ElementDataFile = {}", raw_name).unwrap();
    std::fs::write(&mhd, header).expect("write mhd");

    let data: Vec<u8> = frame
        .pixels()
        .iter()
        .flat_map(|v| v.to_le_bytes())
        .collect();
    std::fs::write(Path::new(&raw), data).expect("write raw");
}
