use anyhow::{anyhow, bail, Context, Result};
use csv::ReaderBuilder;
use nalgebra::Point3;
use serde::Deserialize;

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use crate::error::AngleCorrectionError;

/// Raw vessel centerline: 3D points plus undirected 2-point lines between them.
///
/// Supplied by a loader and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CenterlineData {
    pub points: Vec<Point3<f64>>,
    pub lines: Vec<[usize; 2]>,
}

impl CenterlineData {
    pub fn new(points: Vec<Point3<f64>>, lines: Vec<[usize; 2]>) -> Self {
        Self { points, lines }
    }

    /// Checks that there is something to build curves from and that every line
    /// references an existing point.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.points.is_empty() {
            return Err(AngleCorrectionError::EmptyCenterline);
        }
        if self.lines.is_empty() {
            return Err(AngleCorrectionError::NoLines);
        }
        let n_points = self.points.len();
        for (line, ids) in self.lines.iter().enumerate() {
            if let Some(&index) = ids.iter().find(|&&i| i >= n_points) {
                return Err(AngleCorrectionError::LineIndexOutOfRange {
                    line,
                    index,
                    n_points,
                });
            }
        }
        Ok(())
    }

    /// Same topology and every point within a squared distance of 0.001.
    pub fn approx_eq(&self, other: &CenterlineData) -> bool {
        if self.points.len() != other.points.len() || self.lines != other.lines {
            return false;
        }
        self.points
            .iter()
            .zip(other.points.iter())
            .all(|(a, b)| (a - b).norm_squared() <= 0.001)
    }

    /// Reads a legacy ASCII VTK polydata file.
    pub fn read_vtk<P: AsRef<Path>>(path: P) -> Result<CenterlineData> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read centerline file {:?}", path))?;
        Self::parse_vtk(&contents)
            .with_context(|| format!("failed to parse centerline file {:?}", path))
    }

    /// Parses legacy ASCII VTK polydata, keeping `POINTS` and `LINES`.
    ///
    /// Polylines are split into consecutive 2-point segments. Vertex, polygon and
    /// strip cells are skipped; parsing stops at the first point or cell data block.
    pub fn parse_vtk(contents: &str) -> Result<CenterlineData> {
        let mut lines = contents.lines();
        let header = lines.next().unwrap_or_default();
        if !header.starts_with("# vtk DataFile") {
            bail!("missing '# vtk DataFile' header");
        }
        let _title = lines.next();
        let format = lines.next().unwrap_or_default().trim().to_uppercase();
        if format != "ASCII" {
            bail!("only ASCII VTK files are supported, found '{}'", format);
        }

        let rest: Vec<&str> = lines.flat_map(|l| l.split_whitespace()).collect();
        let mut tokens = Tokens::new(&rest);

        let mut points = Vec::new();
        let mut segments = Vec::new();

        while let Some(keyword) = tokens.next() {
            match keyword.to_uppercase().as_str() {
                "DATASET" => {
                    let kind = tokens.expect("dataset type")?;
                    if !kind.eq_ignore_ascii_case("POLYDATA") {
                        bail!("expected POLYDATA dataset, found '{}'", kind);
                    }
                }
                "POINTS" => {
                    let n = tokens.parse_usize("point count")?;
                    let _data_type = tokens.expect("point data type")?;
                    points.reserve(n);
                    for _ in 0..n {
                        let x = tokens.parse_f64("point x")?;
                        let y = tokens.parse_f64("point y")?;
                        let z = tokens.parse_f64("point z")?;
                        points.push(Point3::new(x, y, z));
                    }
                }
                "LINES" => {
                    let n_cells = tokens.parse_usize("line count")?;
                    let size = tokens.parse_usize("line size")?;
                    for cell in read_cells(&mut tokens, n_cells, size)? {
                        for pair in cell.windows(2) {
                            segments.push([pair[0], pair[1]]);
                        }
                    }
                }
                "VERTICES" | "POLYGONS" | "TRIANGLE_STRIPS" => {
                    let n_cells = tokens.parse_usize("cell count")?;
                    let size = tokens.parse_usize("cell size")?;
                    read_cells(&mut tokens, n_cells, size)?;
                }
                "FIELD" => {
                    let _name = tokens.expect("field name")?;
                    let n_arrays = tokens.parse_usize("field array count")?;
                    for _ in 0..n_arrays {
                        let _array = tokens.expect("array name")?;
                        let n_comp = tokens.parse_usize("array components")?;
                        let n_tuples = tokens.parse_usize("array tuples")?;
                        let _data_type = tokens.expect("array data type")?;
                        let count = n_comp
                            .checked_mul(n_tuples)
                            .ok_or_else(|| anyhow!("field array size overflows"))?;
                        tokens.skip(count)?;
                    }
                }
                "POINT_DATA" | "CELL_DATA" => break,
                other => bail!("unexpected token '{}' in VTK polydata", other),
            }
        }

        Ok(CenterlineData {
            points,
            lines: segments,
        })
    }

    /// Reads a centerline from two header-less CSV files: `x,y,z` rows for the
    /// points and `a,b` zero-based index rows for the lines.
    pub fn read_csv<P: AsRef<Path>, Q: AsRef<Path>>(
        points_path: P,
        lines_path: Q,
    ) -> Result<CenterlineData> {
        let points: Vec<Point3<f64>> = read_csv_records::<PointRecord, _>(&points_path)?
            .into_iter()
            .map(|r| Point3::new(r.x, r.y, r.z))
            .collect();
        let lines = read_csv_records::<LineRecord, _>(&lines_path)?
            .into_iter()
            .map(|r| [r.a, r.b])
            .collect();
        Ok(CenterlineData { points, lines })
    }
}

/// Legacy (count-prefixed) or VTK 5.1 (OFFSETS/CONNECTIVITY) cell block.
fn read_cells(tokens: &mut Tokens<'_>, n_cells: usize, size: usize) -> Result<Vec<Vec<usize>>> {
    if tokens.peek().is_some_and(|t| t.eq_ignore_ascii_case("OFFSETS")) {
        tokens.next();
        let _offset_type = tokens.expect("offset data type")?;
        let offsets = (0..n_cells)
            .map(|_| tokens.parse_usize("cell offset"))
            .collect::<Result<Vec<_>>>()?;
        let connectivity_kw = tokens.expect("CONNECTIVITY")?;
        if !connectivity_kw.eq_ignore_ascii_case("CONNECTIVITY") {
            bail!("expected CONNECTIVITY, found '{}'", connectivity_kw);
        }
        let _conn_type = tokens.expect("connectivity data type")?;
        let connectivity = (0..size)
            .map(|_| tokens.parse_usize("cell point id"))
            .collect::<Result<Vec<_>>>()?;
        if let Some(&last) = offsets.last() {
            if last > size {
                bail!("cell offset {} exceeds connectivity size {}", last, size);
            }
        }
        if offsets.windows(2).any(|w| w[0] > w[1]) {
            bail!("cell offsets are not non-decreasing");
        }
        return Ok(offsets
            .windows(2)
            .map(|w| connectivity[w[0]..w[1]].to_vec())
            .collect());
    }

    let mut cells = Vec::with_capacity(n_cells);
    let mut consumed = 0;
    for _ in 0..n_cells {
        let count = tokens.parse_usize("cell size")?;
        let ids = (0..count)
            .map(|_| tokens.parse_usize("cell point id"))
            .collect::<Result<Vec<_>>>()?;
        consumed += count + 1;
        cells.push(ids);
    }
    if consumed != size {
        bail!("cell block declared {} values but contained {}", size, consumed);
    }
    Ok(cells)
}

struct Tokens<'a> {
    items: &'a [&'a str],
    pos: usize,
}

impl<'a> Tokens<'a> {
    fn new(items: &'a [&'a str]) -> Self {
        Self { items, pos: 0 }
    }

    fn next(&mut self) -> Option<&'a str> {
        let item = self.items.get(self.pos).copied();
        self.pos += 1;
        item
    }

    fn peek(&self) -> Option<&'a str> {
        self.items.get(self.pos).copied()
    }

    fn expect(&mut self, what: &str) -> Result<&'a str> {
        self.next()
            .ok_or_else(|| anyhow!("unexpected end of file, expected {}", what))
    }

    fn parse_usize(&mut self, what: &str) -> Result<usize> {
        let token = self.expect(what)?;
        token
            .parse()
            .with_context(|| format!("invalid {} '{}'", what, token))
    }

    fn parse_f64(&mut self, what: &str) -> Result<f64> {
        let token = self.expect(what)?;
        token
            .parse()
            .with_context(|| format!("invalid {} '{}'", what, token))
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        if self.pos + n > self.items.len() {
            bail!("unexpected end of file while skipping {} values", n);
        }
        self.pos += n;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct PointRecord {
    x: f64,
    y: f64,
    z: f64,
}

#[derive(Debug, Deserialize)]
struct LineRecord {
    a: usize,
    b: usize,
}

/// Utility: detect whether the file uses comma or tab as delimiter.
fn detect_delimiter<P: AsRef<Path>>(path: P) -> Result<u8> {
    let file = File::open(&path).with_context(|| {
        format!(
            "failed to open file for delimiter sniffing: {:?}",
            path.as_ref()
        )
    })?;
    let mut reader = BufReader::new(file);
    let mut first_line = String::new();
    reader
        .read_line(&mut first_line)
        .with_context(|| "failed to read first line for delimiter detection")?;

    let tabs = first_line.matches('\t').count();
    let commas = first_line.matches(',').count();

    if tabs > commas {
        Ok(b'\t')
    } else {
        Ok(b',')
    }
}

fn read_csv_records<T, P>(path: P) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
    P: AsRef<Path>,
{
    let delim = detect_delimiter(&path)?;
    let file = File::open(&path)
        .with_context(|| format!("failed to open {:?}", path.as_ref()))?;
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delim)
        .trim(csv::Trim::All)
        .from_reader(file);

    let mut records = Vec::new();
    for (row, result) in rdr.deserialize().enumerate() {
        let record: T = result
            .with_context(|| format!("invalid row {} in {:?}", row, path.as_ref()))?;
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod input_tests {
    use super::*;
    use crate::utils::test_utils::scratch_dir;
    use approx::assert_relative_eq;
    use std::io::Write;

    const SIMPLE_VTK: &str = "# vtk DataFile Version 3.0
centerline
ASCII
DATASET POLYDATA
POINTS 4 float
0 0 0 1 0 0
2 0 0 3 0.5 0
LINES 2 7
2 0 1
3 1 2 3
";

    #[test]
    fn test_parse_vtk_splits_polylines() {
        let cl = CenterlineData::parse_vtk(SIMPLE_VTK).expect("parse");
        assert_eq!(cl.points.len(), 4);
        assert_relative_eq!(cl.points[3].y, 0.5);
        assert_eq!(cl.lines, vec![[0, 1], [1, 2], [2, 3]]);
        assert!(cl.validate().is_ok());
    }

    #[test]
    fn test_parse_vtk_offsets_connectivity() {
        let text = "# vtk DataFile Version 5.1
centerline
ASCII
DATASET POLYDATA
POINTS 3 double
0 0 0 0 0 1 0 0 2
LINES 2 3
OFFSETS vtktypeint64
0 3
CONNECTIVITY vtktypeint64
0 1 2
POINT_DATA 3
SCALARS radius float
";
        let cl = CenterlineData::parse_vtk(text).expect("parse");
        assert_eq!(cl.points.len(), 3);
        assert_eq!(cl.lines, vec![[0, 1], [1, 2]]);
    }

    #[test]
    fn test_parse_vtk_rejects_bad_offsets() {
        let cells = |offsets: &str| {
            format!(
                "# vtk DataFile Version 5.1\nx\nASCII\nDATASET POLYDATA\n\
                 POINTS 3 double\n0 0 0 0 0 1 0 0 2\nLINES 3 3\n\
                 OFFSETS vtktypeint64\n{}\nCONNECTIVITY vtktypeint64\n0 1 2\n",
                offsets
            )
        };
        let decreasing = CenterlineData::parse_vtk(&cells("0 3 1"));
        assert!(decreasing.unwrap_err().to_string().contains("non-decreasing"));
        let past_end = CenterlineData::parse_vtk(&cells("0 2 4"));
        assert!(past_end.unwrap_err().to_string().contains("exceeds"));
        assert!(CenterlineData::parse_vtk(&cells("0 2 3")).is_ok());
    }

    #[test]
    fn test_parse_vtk_rejects_binary() {
        let text = "# vtk DataFile Version 3.0\nx\nBINARY\nDATASET POLYDATA\n";
        assert!(CenterlineData::parse_vtk(text).is_err());
    }

    #[test]
    fn test_parse_vtk_rejects_truncated_points() {
        let text =
            "# vtk DataFile Version 3.0\nx\nASCII\nDATASET POLYDATA\nPOINTS 2 float\n0 0 0 1\n";
        assert!(CenterlineData::parse_vtk(text).is_err());
    }

    #[test]
    fn test_validate_errors() {
        let empty = CenterlineData::default();
        assert_eq!(empty.validate(), Err(AngleCorrectionError::EmptyCenterline));

        let no_lines = CenterlineData::new(vec![Point3::origin()], vec![]);
        assert_eq!(no_lines.validate(), Err(AngleCorrectionError::NoLines));

        let bad = CenterlineData::new(vec![Point3::origin()], vec![[0, 3]]);
        assert_eq!(
            bad.validate(),
            Err(AngleCorrectionError::LineIndexOutOfRange {
                line: 0,
                index: 3,
                n_points: 1
            })
        );
    }

    #[test]
    fn test_approx_eq_tolerance() {
        let a = CenterlineData::new(
            vec![Point3::new(0.0, 0.0, 0.0), Point3::new(1.0, 0.0, 0.0)],
            vec![[0, 1]],
        );
        let mut b = a.clone();
        b.points[1].x += 0.01;
        assert!(a.approx_eq(&b));
        b.points[1].x += 0.5;
        assert!(!a.approx_eq(&b));
        let mut c = a.clone();
        c.lines = vec![[1, 0]];
        assert!(!a.approx_eq(&c));
    }

    #[test]
    fn test_read_csv_pair() {
        let dir = scratch_dir("input_csv");
        let points_path = dir.join("points.csv");
        let lines_path = dir.join("lines.csv");
        let mut f = File::create(&points_path).unwrap();
        writeln!(f, "0.0, 0.0, 0.0\n1.0, 2.0, 3.0\n2.0, 4.0, 6.0").unwrap();
        let mut f = File::create(&lines_path).unwrap();
        writeln!(f, "0\t1\n1\t2").unwrap();

        let cl = CenterlineData::read_csv(&points_path, &lines_path).expect("read csv");
        assert_eq!(cl.points.len(), 3);
        assert_relative_eq!(cl.points[2].z, 6.0);
        assert_eq!(cl.lines, vec![[0, 1], [1, 2]]);
    }
}
