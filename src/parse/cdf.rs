//! Read-only decoder for the NetCDF classic binary format
//!
//! Argo GDAC profile files are netCDF classic (CDF-1, or CDF-2 for files
//! over 2 GiB). This module decodes the header (dimensions, attributes,
//! variables) and reads variable data, including record variables laid
//! out along the unlimited dimension. Write support and the HDF5-based
//! netCDF-4 format are out of scope.

use crate::error::{Error, Result};
use std::path::Path;

pub const NC_BYTE: u32 = 1;
pub const NC_CHAR: u32 = 2;
pub const NC_SHORT: u32 = 3;
pub const NC_INT: u32 = 4;
pub const NC_FLOAT: u32 = 5;
pub const NC_DOUBLE: u32 = 6;

const TAG_DIMENSION: u32 = 0x0A;
const TAG_VARIABLE: u32 = 0x0B;
const TAG_ATTRIBUTE: u32 = 0x0C;
const NUMRECS_STREAMING: u32 = 0xFFFF_FFFF;

/// One dimension; `size == 0` in the file marks the record dimension
#[derive(Debug, Clone)]
pub struct CdfDim {
    pub name: String,
    pub size: usize,
    pub is_record: bool,
}

/// Typed value block read from an attribute or a variable
#[derive(Debug, Clone, PartialEq)]
pub enum CdfValues {
    Bytes(Vec<i8>),
    Chars(Vec<u8>),
    Shorts(Vec<i16>),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl CdfValues {
    pub fn len(&self) -> usize {
        match self {
            CdfValues::Bytes(v) => v.len(),
            CdfValues::Chars(v) => v.len(),
            CdfValues::Shorts(v) => v.len(),
            CdfValues::Ints(v) => v.len(),
            CdfValues::Floats(v) => v.len(),
            CdfValues::Doubles(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Interpret a char block as trimmed UTF-8 text
    pub fn as_text(&self) -> Option<String> {
        match self {
            CdfValues::Chars(bytes) => Some(
                String::from_utf8_lossy(bytes)
                    .trim_matches(['\0', ' '])
                    .to_string(),
            ),
            _ => None,
        }
    }

    /// First element widened to f64, for numeric attributes like _FillValue
    pub fn first_f64(&self) -> Option<f64> {
        match self {
            CdfValues::Bytes(v) => v.first().map(|&x| x as f64),
            CdfValues::Chars(_) => None,
            CdfValues::Shorts(v) => v.first().map(|&x| x as f64),
            CdfValues::Ints(v) => v.first().map(|&x| x as f64),
            CdfValues::Floats(v) => v.first().map(|&x| x as f64),
            CdfValues::Doubles(v) => v.first().copied(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CdfAttr {
    pub name: String,
    pub values: CdfValues,
}

#[derive(Debug, Clone)]
pub struct CdfVar {
    pub name: String,
    pub dimids: Vec<usize>,
    pub attrs: Vec<CdfAttr>,
    pub nc_type: u32,
    pub begin: u64,
}

impl CdfVar {
    pub fn attr(&self, name: &str) -> Option<&CdfAttr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Fill sentinel declared by the variable, when present
    pub fn fill_value(&self) -> Option<f64> {
        self.attr("_FillValue").and_then(|a| a.values.first_f64())
    }
}

/// A parsed netCDF classic file with its raw data section retained
#[derive(Debug)]
pub struct CdfFile {
    version: u8,
    numrecs: usize,
    record_slab_size: usize,
    pub dims: Vec<CdfDim>,
    pub attrs: Vec<CdfAttr>,
    pub vars: Vec<CdfVar>,
    data: Vec<u8>,
}

impl CdfFile {
    pub fn open(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::parse(data)
    }

    pub fn parse(data: Vec<u8>) -> Result<Self> {
        let mut cursor = Cursor::new(&data);

        let magic = cursor.take(4)?;
        if &magic[..3] != b"CDF" {
            return Err(Error::Parse("not a netCDF classic file".to_string()));
        }
        let version = magic[3];
        if version != 1 && version != 2 {
            return Err(Error::Parse(format!(
                "unsupported netCDF format version {}",
                version
            )));
        }

        let raw_numrecs = cursor.read_u32()?;

        let dims = Self::parse_dim_list(&mut cursor)?;
        let attrs = Self::parse_attr_list(&mut cursor)?;
        let vars = Self::parse_var_list(&mut cursor, version, &dims)?;

        let record_slab_size = compute_record_slab_size(&dims, &vars);

        let numrecs = if raw_numrecs == NUMRECS_STREAMING {
            // Streaming writers leave numrecs unset; recover it from the
            // length of the record section.
            match vars
                .iter()
                .filter(|v| is_record_var(v, &dims))
                .map(|v| v.begin)
                .min()
            {
                Some(first) if record_slab_size > 0 => {
                    (data.len().saturating_sub(first as usize)) / record_slab_size
                }
                _ => 0,
            }
        } else {
            raw_numrecs as usize
        };

        Ok(Self {
            version,
            numrecs,
            record_slab_size,
            dims,
            attrs,
            vars,
            data,
        })
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn numrecs(&self) -> usize {
        self.numrecs
    }

    /// Effective length of a dimension (record dimension resolves to numrecs)
    pub fn dim_len(&self, dimid: usize) -> usize {
        match self.dims.get(dimid) {
            Some(d) if d.is_record => self.numrecs,
            Some(d) => d.size,
            None => 0,
        }
    }

    pub fn var(&self, name: &str) -> Option<&CdfVar> {
        self.vars.iter().find(|v| v.name == name)
    }

    pub fn attr(&self, name: &str) -> Option<&CdfAttr> {
        self.attrs.iter().find(|a| a.name == name)
    }

    /// Effective shape of a variable
    pub fn shape(&self, var: &CdfVar) -> Vec<usize> {
        var.dimids.iter().map(|&d| self.dim_len(d)).collect()
    }

    /// Read the full data block of a variable in row-major order
    pub fn read(&self, var: &CdfVar) -> Result<CdfValues> {
        let elem_size = type_size(var.nc_type)?;
        let per_record: usize = var
            .dimids
            .iter()
            .filter(|&&d| !self.dims.get(d).map(|x| x.is_record).unwrap_or(false))
            .map(|&d| self.dim_len(d))
            .product();

        if is_record_var(var, &self.dims) {
            let mut out = RawValues::with_capacity(var.nc_type, per_record * self.numrecs)?;
            for rec in 0..self.numrecs {
                let offset = var.begin as usize + rec * self.record_slab_size;
                out.extend_from(&self.data, offset, per_record, var.nc_type)?;
            }
            Ok(out.finish())
        } else {
            let mut out = RawValues::with_capacity(var.nc_type, per_record)?;
            out.extend_from(&self.data, var.begin as usize, per_record, var.nc_type)?;
            Ok(out.finish())
        }
    }

    fn parse_dim_list(cursor: &mut Cursor) -> Result<Vec<CdfDim>> {
        let (tag, nelems) = cursor.read_tagged_list_header()?;
        if tag != 0 && tag != TAG_DIMENSION {
            return Err(Error::Parse(format!("bad dimension list tag {:#x}", tag)));
        }
        let mut dims = Vec::with_capacity(nelems);
        for _ in 0..nelems {
            let name = cursor.read_name()?;
            let size = cursor.read_u32()? as usize;
            dims.push(CdfDim {
                name,
                is_record: size == 0,
                size,
            });
        }
        Ok(dims)
    }

    fn parse_attr_list(cursor: &mut Cursor) -> Result<Vec<CdfAttr>> {
        let (tag, nelems) = cursor.read_tagged_list_header()?;
        if tag != 0 && tag != TAG_ATTRIBUTE {
            return Err(Error::Parse(format!("bad attribute list tag {:#x}", tag)));
        }
        let mut attrs = Vec::with_capacity(nelems);
        for _ in 0..nelems {
            let name = cursor.read_name()?;
            let nc_type = cursor.read_u32()?;
            let count = cursor.read_u32()? as usize;
            let values = cursor.read_values(nc_type, count)?;
            cursor.skip_pad(count * type_size(nc_type)?)?;
            attrs.push(CdfAttr { name, values });
        }
        Ok(attrs)
    }

    fn parse_var_list(cursor: &mut Cursor, version: u8, dims: &[CdfDim]) -> Result<Vec<CdfVar>> {
        let (tag, nelems) = cursor.read_tagged_list_header()?;
        if tag != 0 && tag != TAG_VARIABLE {
            return Err(Error::Parse(format!("bad variable list tag {:#x}", tag)));
        }
        let mut vars = Vec::with_capacity(nelems);
        for _ in 0..nelems {
            let name = cursor.read_name()?;
            let ndims = cursor.read_u32()? as usize;
            let mut dimids = Vec::with_capacity(ndims);
            for _ in 0..ndims {
                let dimid = cursor.read_u32()? as usize;
                if dimid >= dims.len() {
                    return Err(Error::Parse(format!(
                        "variable '{}' references unknown dimension {}",
                        name, dimid
                    )));
                }
                dimids.push(dimid);
            }
            let attrs = Self::parse_attr_list(cursor)?;
            let nc_type = cursor.read_u32()?;
            type_size(nc_type)?;
            let _vsize = cursor.read_u32()?;
            let begin = if version == 1 {
                cursor.read_u32()? as u64
            } else {
                cursor.read_u64()?
            };
            vars.push(CdfVar {
                name,
                dimids,
                attrs,
                nc_type,
                begin,
            });
        }
        Ok(vars)
    }
}

fn is_record_var(var: &CdfVar, dims: &[CdfDim]) -> bool {
    var.dimids
        .first()
        .and_then(|&d| dims.get(d))
        .map(|d| d.is_record)
        .unwrap_or(false)
}

fn type_size(nc_type: u32) -> Result<usize> {
    match nc_type {
        NC_BYTE | NC_CHAR => Ok(1),
        NC_SHORT => Ok(2),
        NC_INT | NC_FLOAT => Ok(4),
        NC_DOUBLE => Ok(8),
        other => Err(Error::Parse(format!("unknown netCDF type {}", other))),
    }
}

fn round4(n: usize) -> usize {
    (n + 3) & !3
}

/// Bytes per record across all record variables. When exactly one record
/// variable exists its per-record size is not padded to four bytes.
fn compute_record_slab_size(dims: &[CdfDim], vars: &[CdfVar]) -> usize {
    let record_vars: Vec<&CdfVar> = vars.iter().filter(|v| is_record_var(v, dims)).collect();

    let per_record_bytes = |v: &CdfVar| -> usize {
        let elems: usize = v
            .dimids
            .iter()
            .skip(1)
            .map(|&d| dims.get(d).map(|x| x.size).unwrap_or(0))
            .product();
        elems * type_size(v.nc_type).unwrap_or(1)
    };

    match record_vars.len() {
        0 => 0,
        1 => per_record_bytes(record_vars[0]),
        _ => record_vars.iter().map(|v| round4(per_record_bytes(v))).sum(),
    }
}

/// Big-endian reader over the file bytes
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| Error::Parse("truncated netCDF header".to_string()))?;
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn read_u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_u64(&mut self) -> Result<u64> {
        let b = self.take(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    fn read_tagged_list_header(&mut self) -> Result<(u32, usize)> {
        let tag = self.read_u32()?;
        let nelems = self.read_u32()? as usize;
        if tag == 0 && nelems != 0 {
            return Err(Error::Parse("absent list with nonzero count".to_string()));
        }
        Ok((tag, nelems))
    }

    fn read_name(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        let name = String::from_utf8_lossy(bytes).to_string();
        self.skip_pad(len)?;
        Ok(name)
    }

    fn skip_pad(&mut self, consumed: usize) -> Result<()> {
        let pad = round4(consumed) - consumed;
        if pad > 0 {
            self.take(pad)?;
        }
        Ok(())
    }

    fn read_values(&mut self, nc_type: u32, count: usize) -> Result<CdfValues> {
        let mut out = RawValues::with_capacity(nc_type, count)?;
        let pos = self.pos;
        let consumed = out.extend_from(self.data, pos, count, nc_type)?;
        self.pos = pos + consumed;
        Ok(out.finish())
    }
}

/// Accumulator that decodes big-endian scalars into a typed vector
enum RawValues {
    Bytes(Vec<i8>),
    Chars(Vec<u8>),
    Shorts(Vec<i16>),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl RawValues {
    fn with_capacity(nc_type: u32, cap: usize) -> Result<Self> {
        Ok(match nc_type {
            NC_BYTE => RawValues::Bytes(Vec::with_capacity(cap)),
            NC_CHAR => RawValues::Chars(Vec::with_capacity(cap)),
            NC_SHORT => RawValues::Shorts(Vec::with_capacity(cap)),
            NC_INT => RawValues::Ints(Vec::with_capacity(cap)),
            NC_FLOAT => RawValues::Floats(Vec::with_capacity(cap)),
            NC_DOUBLE => RawValues::Doubles(Vec::with_capacity(cap)),
            other => return Err(Error::Parse(format!("unknown netCDF type {}", other))),
        })
    }

    /// Decode `count` values starting at `offset`; returns bytes consumed
    fn extend_from(
        &mut self,
        data: &[u8],
        offset: usize,
        count: usize,
        nc_type: u32,
    ) -> Result<usize> {
        let elem = type_size(nc_type)?;
        let total = count
            .checked_mul(elem)
            .ok_or_else(|| Error::Parse("variable size overflow".to_string()))?;
        let end = offset
            .checked_add(total)
            .filter(|&e| e <= data.len())
            .ok_or_else(|| Error::Parse("truncated netCDF data section".to_string()))?;
        let src = &data[offset..end];

        match self {
            RawValues::Bytes(v) => v.extend(src.iter().map(|&b| b as i8)),
            RawValues::Chars(v) => v.extend_from_slice(src),
            RawValues::Shorts(v) => v.extend(
                src.chunks_exact(2)
                    .map(|c| i16::from_be_bytes([c[0], c[1]])),
            ),
            RawValues::Ints(v) => v.extend(
                src.chunks_exact(4)
                    .map(|c| i32::from_be_bytes([c[0], c[1], c[2], c[3]])),
            ),
            RawValues::Floats(v) => v.extend(
                src.chunks_exact(4)
                    .map(|c| f32::from_be_bytes([c[0], c[1], c[2], c[3]])),
            ),
            RawValues::Doubles(v) => v.extend(src.chunks_exact(8).map(|c| {
                f64::from_be_bytes([c[0], c[1], c[2], c[3], c[4], c[5], c[6], c[7]])
            })),
        }
        Ok(total)
    }

    fn finish(self) -> CdfValues {
        match self {
            RawValues::Bytes(v) => CdfValues::Bytes(v),
            RawValues::Chars(v) => CdfValues::Chars(v),
            RawValues::Shorts(v) => CdfValues::Shorts(v),
            RawValues::Ints(v) => CdfValues::Ints(v),
            RawValues::Floats(v) => CdfValues::Floats(v),
            RawValues::Doubles(v) => CdfValues::Doubles(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::testutil::{CdfBuilder, TestValues};

    #[test]
    fn test_rejects_bad_magic() {
        let err = CdfFile::parse(b"HDF\x01\x00\x00\x00\x00".to_vec()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn test_rejects_truncated_header() {
        let mut builder = CdfBuilder::new();
        builder.dim("N", 3);
        builder.var(
            "X",
            &[0],
            NC_INT,
            &[],
            TestValues::Ints(vec![1, 2, 3]),
        );
        let mut bytes = builder.build();
        bytes.truncate(20);
        assert!(CdfFile::parse(bytes).is_err());
    }

    #[test]
    fn test_fixed_variables_round_trip() {
        let mut builder = CdfBuilder::new();
        builder.dim("N_PROF", 2);
        builder.dim("N_LEVELS", 3);
        builder.global_attr_text("institution", "CORIOLIS");
        builder.var(
            "LATITUDE",
            &[0],
            NC_DOUBLE,
            &[],
            TestValues::Doubles(vec![10.5, -20.25]),
        );
        builder.var(
            "PRES",
            &[0, 1],
            NC_FLOAT,
            &[("_FillValue", TestValues::Floats(vec![99999.0]))],
            TestValues::Floats(vec![5.0, 10.0, 15.0, 5.5, 10.5, 99999.0]),
        );

        let file = CdfFile::parse(builder.build()).unwrap();
        assert_eq!(file.version(), 1);
        assert_eq!(file.dims.len(), 2);
        assert_eq!(
            file.attr("institution").unwrap().values.as_text().unwrap(),
            "CORIOLIS"
        );

        let lat = file.var("LATITUDE").unwrap();
        assert_eq!(file.shape(lat), vec![2]);
        assert_eq!(
            file.read(lat).unwrap(),
            CdfValues::Doubles(vec![10.5, -20.25])
        );

        let pres = file.var("PRES").unwrap();
        assert_eq!(pres.fill_value(), Some(99999.0));
        assert_eq!(file.shape(pres), vec![2, 3]);
        match file.read(pres).unwrap() {
            CdfValues::Floats(v) => {
                assert_eq!(v.len(), 6);
                assert_eq!(v[0], 5.0);
                assert_eq!(v[5], 99999.0);
            }
            other => panic!("expected floats, got {:?}", other),
        }
    }

    #[test]
    fn test_record_variables_interleave() {
        // N_PROF as the unlimited dimension: values for each record are
        // stored in per-record slabs, not contiguously per variable.
        let mut builder = CdfBuilder::new();
        builder.record_dim("N_PROF");
        builder.dim("N_LEVELS", 2);
        builder.var(
            "JULD",
            &[0],
            NC_DOUBLE,
            &[],
            TestValues::Doubles(vec![100.0, 200.0, 300.0]),
        );
        builder.var(
            "TEMP",
            &[0, 1],
            NC_FLOAT,
            &[],
            TestValues::Floats(vec![20.0, 19.0, 21.0, 18.5, 22.0, 17.0]),
        );

        let file = CdfFile::parse(builder.build()).unwrap();
        assert_eq!(file.numrecs(), 3);

        let juld = file.var("JULD").unwrap();
        assert_eq!(
            file.read(juld).unwrap(),
            CdfValues::Doubles(vec![100.0, 200.0, 300.0])
        );

        let temp = file.var("TEMP").unwrap();
        assert_eq!(file.shape(temp), vec![3, 2]);
        assert_eq!(
            file.read(temp).unwrap(),
            CdfValues::Floats(vec![20.0, 19.0, 21.0, 18.5, 22.0, 17.0])
        );
    }

    #[test]
    fn test_single_record_variable_unpadded() {
        // One record char variable of width 3: record slabs are packed
        // without padding to four bytes.
        let mut builder = CdfBuilder::new();
        builder.record_dim("N_PROF");
        builder.dim("STRING3", 3);
        builder.var(
            "PLATFORM_NUMBER",
            &[0, 1],
            NC_CHAR,
            &[],
            TestValues::Chars(b"abcdef".to_vec()),
        );

        let file = CdfFile::parse(builder.build()).unwrap();
        assert_eq!(file.numrecs(), 2);
        let var = file.var("PLATFORM_NUMBER").unwrap();
        assert_eq!(
            file.read(var).unwrap(),
            CdfValues::Chars(b"abcdef".to_vec())
        );
    }

    #[test]
    fn test_char_attr_trimming() {
        let values = CdfValues::Chars(b"AO  \0".to_vec());
        assert_eq!(values.as_text().unwrap(), "AO");
    }
}
