//! Test-only writer for netCDF classic bytes
//!
//! Builds small CDF-1 files in memory so the decoder and the Argo
//! extraction layer can be exercised without fixture files on disk.

use super::cdf::{NC_BYTE, NC_CHAR, NC_DOUBLE, NC_FLOAT, NC_INT, NC_SHORT};

const TAG_DIMENSION: u32 = 0x0A;
const TAG_VARIABLE: u32 = 0x0B;
const TAG_ATTRIBUTE: u32 = 0x0C;

#[derive(Debug, Clone)]
pub enum TestValues {
    Bytes(Vec<i8>),
    Chars(Vec<u8>),
    Shorts(Vec<i16>),
    Ints(Vec<i32>),
    Floats(Vec<f32>),
    Doubles(Vec<f64>),
}

impl TestValues {
    fn nc_type(&self) -> u32 {
        match self {
            TestValues::Bytes(_) => NC_BYTE,
            TestValues::Chars(_) => NC_CHAR,
            TestValues::Shorts(_) => NC_SHORT,
            TestValues::Ints(_) => NC_INT,
            TestValues::Floats(_) => NC_FLOAT,
            TestValues::Doubles(_) => NC_DOUBLE,
        }
    }

    fn len(&self) -> usize {
        match self {
            TestValues::Bytes(v) => v.len(),
            TestValues::Chars(v) => v.len(),
            TestValues::Shorts(v) => v.len(),
            TestValues::Ints(v) => v.len(),
            TestValues::Floats(v) => v.len(),
            TestValues::Doubles(v) => v.len(),
        }
    }

    fn elem_size(&self) -> usize {
        match self {
            TestValues::Bytes(_) | TestValues::Chars(_) => 1,
            TestValues::Shorts(_) => 2,
            TestValues::Ints(_) | TestValues::Floats(_) => 4,
            TestValues::Doubles(_) => 8,
        }
    }

    fn write_be_range(&self, out: &mut Vec<u8>, start: usize, count: usize) {
        match self {
            TestValues::Bytes(v) => {
                for &x in &v[start..start + count] {
                    out.push(x as u8);
                }
            }
            TestValues::Chars(v) => out.extend_from_slice(&v[start..start + count]),
            TestValues::Shorts(v) => {
                for &x in &v[start..start + count] {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
            TestValues::Ints(v) => {
                for &x in &v[start..start + count] {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
            TestValues::Floats(v) => {
                for &x in &v[start..start + count] {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
            TestValues::Doubles(v) => {
                for &x in &v[start..start + count] {
                    out.extend_from_slice(&x.to_be_bytes());
                }
            }
        }
    }
}

struct TestVar {
    name: String,
    dimids: Vec<usize>,
    nc_type: u32,
    attrs: Vec<(String, TestValues)>,
    data: TestValues,
}

/// Builder for a CDF-1 byte buffer
pub struct CdfBuilder {
    dims: Vec<(String, usize, bool)>,
    gattrs: Vec<(String, TestValues)>,
    vars: Vec<TestVar>,
}

impl CdfBuilder {
    pub fn new() -> Self {
        Self {
            dims: Vec::new(),
            gattrs: Vec::new(),
            vars: Vec::new(),
        }
    }

    pub fn dim(&mut self, name: &str, size: usize) -> usize {
        self.dims.push((name.to_string(), size, false));
        self.dims.len() - 1
    }

    pub fn record_dim(&mut self, name: &str) -> usize {
        self.dims.push((name.to_string(), 0, true));
        self.dims.len() - 1
    }

    pub fn global_attr_text(&mut self, name: &str, value: &str) {
        self.gattrs
            .push((name.to_string(), TestValues::Chars(value.as_bytes().to_vec())));
    }

    pub fn var(
        &mut self,
        name: &str,
        dimids: &[usize],
        nc_type: u32,
        attrs: &[(&str, TestValues)],
        data: TestValues,
    ) {
        assert_eq!(nc_type, data.nc_type(), "test var type mismatch for {}", name);
        self.vars.push(TestVar {
            name: name.to_string(),
            dimids: dimids.to_vec(),
            nc_type,
            attrs: attrs
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
            data,
        });
    }

    fn per_record_elems(&self, var: &TestVar) -> usize {
        var.dimids
            .iter()
            .filter(|&&d| !self.dims[d].2)
            .map(|&d| self.dims[d].1)
            .product()
    }

    fn is_record_var(&self, var: &TestVar) -> bool {
        var.dimids.first().map(|&d| self.dims[d].2).unwrap_or(false)
    }

    pub fn build(self) -> Vec<u8> {
        let record_vars: Vec<usize> = (0..self.vars.len())
            .filter(|&i| self.is_record_var(&self.vars[i]))
            .collect();

        let numrecs = record_vars
            .iter()
            .map(|&i| {
                let per = self.per_record_elems(&self.vars[i]).max(1);
                self.vars[i].data.len() / per
            })
            .max()
            .unwrap_or(0);

        let mut out = Vec::new();
        out.extend_from_slice(b"CDF\x01");
        out.extend_from_slice(&(numrecs as u32).to_be_bytes());

        // dim_list
        write_list_header(&mut out, TAG_DIMENSION, self.dims.len());
        for (name, size, is_record) in &self.dims {
            write_name(&mut out, name);
            let stored = if *is_record { 0 } else { *size as u32 };
            out.extend_from_slice(&stored.to_be_bytes());
        }

        // gatt_list
        write_attr_list(&mut out, &self.gattrs);

        // var_list with begin placeholders
        write_list_header(&mut out, TAG_VARIABLE, self.vars.len());
        let mut begin_positions = Vec::with_capacity(self.vars.len());
        for var in &self.vars {
            write_name(&mut out, &var.name);
            out.extend_from_slice(&(var.dimids.len() as u32).to_be_bytes());
            for &d in &var.dimids {
                out.extend_from_slice(&(d as u32).to_be_bytes());
            }
            write_attr_list(&mut out, &var.attrs);
            out.extend_from_slice(&var.nc_type.to_be_bytes());

            let per_record = self.per_record_elems(var) * var.data.elem_size();
            let vsize = if self.is_record_var(var) {
                round4(per_record)
            } else {
                round4(var.data.len() * var.data.elem_size())
            };
            out.extend_from_slice(&(vsize as u32).to_be_bytes());

            begin_positions.push(out.len());
            out.extend_from_slice(&0u32.to_be_bytes());
        }

        // Layout: fixed variables first, then the record section
        let mut begins = vec![0u32; self.vars.len()];
        let mut cur = out.len();
        for (i, var) in self.vars.iter().enumerate() {
            if self.is_record_var(var) {
                continue;
            }
            begins[i] = cur as u32;
            cur += round4(var.data.len() * var.data.elem_size());
        }

        let record_start = cur;
        let single_record_var = record_vars.len() == 1;
        let mut offset_in_slab = 0usize;
        for &i in &record_vars {
            begins[i] = (record_start + offset_in_slab) as u32;
            let per = self.per_record_elems(&self.vars[i]) * self.vars[i].data.elem_size();
            offset_in_slab += if single_record_var { per } else { round4(per) };
        }

        for (pos, begin) in begin_positions.iter().zip(&begins) {
            out[*pos..*pos + 4].copy_from_slice(&begin.to_be_bytes());
        }

        // Data section: fixed variables
        for var in self.vars.iter().filter(|v| !self.is_record_var(v)) {
            let bytes = var.data.len() * var.data.elem_size();
            var.data.write_be_range(&mut out, 0, var.data.len());
            pad_to4(&mut out, bytes);
        }

        // Record section: one slab per record
        for rec in 0..numrecs {
            for &i in &record_vars {
                let var = &self.vars[i];
                let per_elems = self.per_record_elems(var);
                var.data
                    .write_be_range(&mut out, rec * per_elems, per_elems);
                if !single_record_var {
                    pad_to4(&mut out, per_elems * var.data.elem_size());
                }
            }
        }

        out
    }
}

fn round4(n: usize) -> usize {
    (n + 3) & !3
}

fn pad_to4(out: &mut Vec<u8>, written: usize) {
    for _ in written..round4(written) {
        out.push(0);
    }
}

fn write_list_header(out: &mut Vec<u8>, tag: u32, nelems: usize) {
    if nelems == 0 {
        out.extend_from_slice(&0u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
    } else {
        out.extend_from_slice(&tag.to_be_bytes());
        out.extend_from_slice(&(nelems as u32).to_be_bytes());
    }
}

fn write_name(out: &mut Vec<u8>, name: &str) {
    out.extend_from_slice(&(name.len() as u32).to_be_bytes());
    out.extend_from_slice(name.as_bytes());
    pad_to4(out, name.len());
}

fn write_attr_list(out: &mut Vec<u8>, attrs: &[(String, TestValues)]) {
    write_list_header(out, TAG_ATTRIBUTE, attrs.len());
    for (name, values) in attrs {
        write_name(out, name);
        out.extend_from_slice(&values.nc_type().to_be_bytes());
        out.extend_from_slice(&(values.len() as u32).to_be_bytes());
        let bytes = values.len() * values.elem_size();
        values.write_be_range(out, 0, values.len());
        pad_to4(out, bytes);
    }
}
