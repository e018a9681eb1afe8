use anyhow::{anyhow, bail, Context, Result};
use nalgebra::Matrix4;

use std::path::{Path, PathBuf};

use crate::frame::FrameSample;

/// Scalar pixel types of the MetaImage format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementType {
    Char,
    UChar,
    Short,
    UShort,
    Int,
    UInt,
    Float,
    Double,
}

impl ElementType {
    fn parse(s: &str) -> Result<Self> {
        Ok(match s {
            "MET_CHAR" => Self::Char,
            "MET_UCHAR" => Self::UChar,
            "MET_SHORT" => Self::Short,
            "MET_USHORT" => Self::UShort,
            "MET_INT" => Self::Int,
            "MET_UINT" => Self::UInt,
            "MET_FLOAT" => Self::Float,
            "MET_DOUBLE" => Self::Double,
            other => bail!("unsupported ElementType '{}'", other),
        })
    }

    pub fn size(self) -> usize {
        match self {
            Self::Char | Self::UChar => 1,
            Self::Short | Self::UShort => 2,
            Self::Int | Self::UInt | Self::Float => 4,
            Self::Double => 8,
        }
    }

    /// Decodes one element; `bytes` holds exactly `self.size()` bytes.
    fn decode(self, bytes: &[u8], msb: bool) -> f64 {
        macro_rules! read {
            ($t:ty, $n:expr) => {{
                let mut buf = [0u8; $n];
                buf.copy_from_slice(bytes);
                if msb {
                    <$t>::from_be_bytes(buf) as f64
                } else {
                    <$t>::from_le_bytes(buf) as f64
                }
            }};
        }
        match self {
            Self::Char => read!(i8, 1),
            Self::UChar => read!(u8, 1),
            Self::Short => read!(i16, 2),
            Self::UShort => read!(u16, 2),
            Self::Int => read!(i32, 4),
            Self::UInt => read!(u32, 4),
            Self::Float => read!(f32, 4),
            Self::Double => read!(f64, 8),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DataFile {
    Local,
    External(PathBuf),
}

/// Parsed `key = value` header of a 2D MetaImage.
#[derive(Debug, Clone, PartialEq)]
pub struct MetaImageHeader {
    pub dim_size: Vec<usize>,
    pub spacing: Vec<f64>,
    pub element_type: ElementType,
    pub msb: bool,
    pub header_size: i64,
    pub offset: [f64; 3],
    pub transform: Option<[f64; 9]>,
    data_file: DataFile,
    /// Byte position right after the `ElementDataFile` line.
    data_start: usize,
}

impl MetaImageHeader {
    /// Image to world transform: `TransformMatrix` fills the rotation block with
    /// the row index varying fastest, `Offset` fills the translation column.
    /// Without a `TransformMatrix` the rotation is the identity.
    pub fn pose(&self) -> Matrix4<f64> {
        let mut pose = Matrix4::identity();
        if let Some(m) = self.transform {
            for (k, v) in m.iter().enumerate() {
                pose[(k % 3, k / 3)] = *v;
            }
        }
        for i in 0..3 {
            pose[(i, 3)] = self.offset[i];
        }
        pose
    }

    pub fn width(&self) -> usize {
        self.dim_size.first().copied().unwrap_or(0)
    }

    pub fn height(&self) -> usize {
        self.dim_size.get(1).copied().unwrap_or(1)
    }
}

fn parse_values<T: std::str::FromStr>(key: &str, value: &str) -> Result<Vec<T>> {
    value
        .split_whitespace()
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| anyhow!("invalid value '{}' for {}", v, key))
        })
        .collect()
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => bail!("invalid boolean '{}' for {}", other, key),
    }
}

/// Parses the text header at the start of `bytes`, up to and including the
/// `ElementDataFile` line.
pub fn parse_header(bytes: &[u8]) -> Result<MetaImageHeader> {
    let mut ndims: Option<usize> = None;
    let mut dim_size: Option<Vec<usize>> = None;
    let mut spacing: Option<Vec<f64>> = None;
    let mut element_type: Option<ElementType> = None;
    let mut msb = false;
    let mut header_size = 0i64;
    let mut offset = [0.0; 3];
    let mut transform = None;
    let mut data_file = None;
    let mut pos = 0usize;

    while pos < bytes.len() && data_file.is_none() {
        let end = bytes[pos..]
            .iter()
            .position(|&b| b == b'\n')
            .map_or(bytes.len(), |i| pos + i + 1);
        let line = String::from_utf8_lossy(&bytes[pos..end]);
        pos = end;

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let (key, value) = (key.trim(), value.trim());
        match key {
            "NDims" => ndims = parse_values::<usize>(key, value)?.first().copied(),
            "DimSize" => dim_size = Some(parse_values(key, value)?),
            "ElementSpacing" | "ElementSize" => {
                if key == "ElementSpacing" || spacing.is_none() {
                    spacing = Some(parse_values(key, value)?);
                }
            }
            "ElementType" => element_type = Some(ElementType::parse(value)?),
            "ElementByteOrderMSB" | "BinaryDataByteOrderMSB" => msb = parse_bool(key, value)?,
            "HeaderSize" => {
                header_size = value.parse::<i64>().with_context(|| "invalid HeaderSize")?
            }
            "ElementNumberOfChannels" => {
                if value != "1" {
                    bail!("only single channel images are supported, got {}", value);
                }
            }
            "Offset" | "Position" | "Origin" => {
                let v: Vec<f64> = parse_values(key, value)?;
                for (i, x) in v.iter().take(3).enumerate() {
                    offset[i] = *x;
                }
            }
            "TransformMatrix" | "Rotation" | "Orientation" => {
                let v: Vec<f64> = parse_values(key, value)?;
                if v.len() < 9 {
                    bail!("{} needs 9 values, got {}", key, v.len());
                }
                let mut m = [0.0; 9];
                m.copy_from_slice(&v[..9]);
                transform = Some(m);
            }
            "ElementDataFile" => {
                data_file = Some(if value.eq_ignore_ascii_case("LOCAL") {
                    DataFile::Local
                } else {
                    DataFile::External(PathBuf::from(value))
                });
            }
            _ => {}
        }
    }

    let data_file = data_file.ok_or_else(|| anyhow!("missing ElementDataFile"))?;
    let dim_size = dim_size.ok_or_else(|| anyhow!("missing DimSize"))?;
    let element_type = element_type.ok_or_else(|| anyhow!("missing ElementType"))?;
    if let Some(n) = ndims {
        if n != dim_size.len() {
            bail!("NDims is {} but DimSize has {} values", n, dim_size.len());
        }
    }
    if dim_size.len() > 2 && dim_size[2..].iter().any(|&d| d != 1) {
        bail!("expected a 2D image, got DimSize {:?}", dim_size);
    }
    let spacing = spacing.unwrap_or_else(|| vec![1.0; dim_size.len()]);

    Ok(MetaImageHeader {
        dim_size,
        spacing,
        element_type,
        msb,
        header_size,
        offset,
        transform,
        data_file,
        data_start: pos,
    })
}

/// Reads one `.mhd` (external data) or `.mha`-style (`LOCAL`) frame.
pub fn read_frame<P: AsRef<Path>>(path: P, idx: usize) -> Result<FrameSample> {
    let path = path.as_ref();
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read MetaImage {:?}", path))?;
    let header =
        parse_header(&bytes).with_context(|| format!("invalid MetaImage header in {:?}", path))?;

    let (width, height) = (header.width(), header.height());
    let n_bytes = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(header.element_type.size()))
        .ok_or_else(|| anyhow!("pixel count of {:?} overflows: {} x {}", path, width, height))?;

    let external = match &header.data_file {
        DataFile::Local => None,
        DataFile::External(file) => {
            let data_path = path.parent().unwrap_or(Path::new(".")).join(file);
            let data = std::fs::read(&data_path)
                .with_context(|| format!("failed to read pixel data {:?}", data_path))?;
            Some(data)
        }
    };
    let (data, start) = match &external {
        Some(data) => (data.as_slice(), 0),
        None => (bytes.as_slice(), header.data_start),
    };
    let start = if header.header_size < 0 {
        data.len().saturating_sub(n_bytes)
    } else {
        usize::try_from(header.header_size)
            .ok()
            .and_then(|skip| start.checked_add(skip))
            .ok_or_else(|| anyhow!("header size of {:?} overflows", path))?
    };
    let end = start
        .checked_add(n_bytes)
        .ok_or_else(|| anyhow!("pixel data range of {:?} overflows", path))?;
    if data.len() < end {
        bail!(
            "pixel data of {:?} is truncated: need {} bytes at offset {}, have {}",
            path,
            n_bytes,
            start,
            data.len()
        );
    }

    let pixels: Vec<f64> = data[start..end]
        .chunks_exact(header.element_type.size())
        .map(|b| header.element_type.decode(b, header.msb))
        .collect();

    let spacing = (
        header.spacing.first().copied().unwrap_or(1.0),
        header.spacing.get(1).copied().unwrap_or(1.0),
    );
    FrameSample::new(pixels, width, height, spacing, header.pose(), idx)
        .with_context(|| format!("invalid frame in {:?}", path))
}

/// Reads `prefix0.mhd`, `prefix1.mhd`, ... until the next index is missing.
/// The first file must exist.
pub fn read_frames(prefix: &str) -> Result<Vec<FrameSample>> {
    let first = format!("{}0.mhd", prefix);
    if !Path::new(&first).exists() {
        bail!("no frames found: {:?} does not exist", first);
    }

    let mut frames = Vec::new();
    loop {
        let path = format!("{}{}.mhd", prefix, frames.len());
        if !Path::new(&path).exists() {
            break;
        }
        frames.push(read_frame(&path, frames.len())?);
    }
    log::info!("loaded {} frames from prefix {:?}", frames.len(), prefix);
    Ok(frames)
}

#[cfg(test)]
mod metaimage_tests {
    use super::*;
    use crate::utils::test_utils::{scratch_dir, uniform_frame, write_frame};
    use approx::assert_relative_eq;

    #[test]
    fn test_header_pose_column_major_rotation() {
        let text = "ObjectType = Image\nNDims = 2\nDimSize = 3 2\n\
                    ElementSpacing = 0.5 0.25\nOffset = 1 2 3\n\
                    TransformMatrix = 0 1 0 -1 0 0 0 0 1\n\
                    ElementType = MET_UCHAR\nElementDataFile = LOCAL\n";
        let header = parse_header(text.as_bytes()).unwrap();
        assert_eq!(header.dim_size, vec![3, 2]);
        assert_eq!(header.data_start, text.len());
        let pose = header.pose();
        // first three values are column 0
        assert_relative_eq!(pose[(1, 0)], 1.0);
        assert_relative_eq!(pose[(0, 1)], -1.0);
        assert_relative_eq!(pose[(0, 3)], 1.0);
        assert_relative_eq!(pose[(2, 3)], 3.0);
        assert_relative_eq!(pose[(3, 3)], 1.0);
    }

    #[test]
    fn test_header_errors() {
        let bad: [&[u8]; 4] = [
            b"DimSize = 2 2\nElementType = MET_FLOAT\n",
            b"DimSize = 2 2\nElementType = MET_LONG\nElementDataFile = LOCAL\n",
            b"DimSize = 2 x\nElementType = MET_FLOAT\nElementDataFile = LOCAL\n",
            b"DimSize = 2 2 4\nElementType = MET_FLOAT\nElementDataFile = LOCAL\n",
        ];
        for header in bad {
            assert!(parse_header(header).is_err());
        }
    }

    #[test]
    fn test_read_local_big_endian_shorts() {
        let dir = scratch_dir("mhd_local");
        let path = dir.join("local.mhd");
        let mut bytes = b"NDims = 2\nDimSize = 2 1\nElementType = MET_SHORT\n\
                          ElementByteOrderMSB = True\nElementDataFile = LOCAL\n"
            .to_vec();
        bytes.extend_from_slice(&(-3i16).to_be_bytes());
        bytes.extend_from_slice(&7i16.to_be_bytes());
        std::fs::write(&path, bytes).unwrap();

        let frame = read_frame(&path, 4).unwrap();
        assert_eq!(frame.pixels(), &[-3.0, 7.0]);
        assert_eq!(frame.idx(), 4);
        assert_eq!(frame.spacing(), (1.0, 1.0));
    }

    #[test]
    fn test_read_frames_sequence() {
        let dir = scratch_dir("mhd_sequence");
        let prefix = dir.join("frame").to_string_lossy().into_owned();
        let written = vec![
            uniform_frame(-0.5, 6, 0.5, 1.0, 0),
            uniform_frame(0.25, 6, 0.5, 2.0, 1),
        ];
        for frame in &written {
            write_frame(&prefix, frame);
        }
        let frames = read_frames(&prefix).unwrap();
        assert_eq!(frames, written);
    }

    #[test]
    fn test_missing_first_frame_is_error() {
        let dir = scratch_dir("mhd_missing");
        let prefix = dir.join("nothing").to_string_lossy().into_owned();
        assert!(read_frames(&prefix).is_err());
    }

    #[test]
    fn test_oversized_header_values_are_errors() {
        let dir = scratch_dir("mhd_oversized");
        let huge_dims = dir.join("huge_dims.mhd");
        std::fs::write(
            &huge_dims,
            b"DimSize = 18446744073709551615 2\nElementType = MET_FLOAT\n\
              ElementDataFile = LOCAL\n\x00\x00\x00\x00",
        )
        .unwrap();
        let err = read_frame(&huge_dims, 0).unwrap_err();
        assert!(err.to_string().contains("overflows"), "{:#}", err);

        let huge_skip = dir.join("huge_skip.mhd");
        std::fs::write(
            &huge_skip,
            b"DimSize = 1 1\nElementType = MET_FLOAT\nHeaderSize = 9223372036854775807\n\
              ElementDataFile = LOCAL\n\x00\x00\x00\x00",
        )
        .unwrap();
        assert!(read_frame(&huge_skip, 0).is_err());
    }

    #[test]
    fn test_truncated_data_is_error() {
        let dir = scratch_dir("mhd_truncated");
        let path = dir.join("short.mhd");
        std::fs::write(
            &path,
            b"DimSize = 4 4\nElementType = MET_FLOAT\nElementDataFile = LOCAL\n\x00\x00",
        )
        .unwrap();
        assert!(read_frame(&path, 0).is_err());
    }
}
