//! Safetensors I/O for the result stores.
//!
//! File layout: 8-byte little-endian header length, a JSON header mapping
//! each key to `{dtype, shape, data_offsets}`, then the raw little-endian
//! buffers back to back. Only the dtypes the stores use are supported:
//! `F64`, `I32` and `U8`.
use anyhow::{bail, ensure, Context, Result};
use std::collections::HashMap;
use std::path::Path;

// ── Low-level parser ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct Entry {
    dtype: String,
    shape: Vec<usize>,
    start: usize,
    end: usize,
}

fn parse_header(bytes: &[u8]) -> Result<(HashMap<String, Entry>, usize)> {
    ensure!(bytes.len() >= 8, "safetensors file too small ({} bytes)", bytes.len());
    let mut len = [0u8; 8];
    len.copy_from_slice(&bytes[..8]);
    let n = u64::from_le_bytes(len) as usize;
    ensure!(8 + n <= bytes.len(), "safetensors header length {n} exceeds file size");
    let raw: HashMap<String, serde_json::Value> =
        serde_json::from_slice(&bytes[8..8 + n]).context("failed to parse safetensors header")?;

    let mut entries = HashMap::new();
    for (name, v) in raw {
        if name == "__metadata__" {
            continue;
        }
        let dtype = v["dtype"]
            .as_str()
            .with_context(|| format!("tensor '{name}': missing dtype"))?
            .to_string();
        let shape = v["shape"]
            .as_array()
            .with_context(|| format!("tensor '{name}': missing shape"))?
            .iter()
            .map(|d| d.as_u64().map(|d| d as usize))
            .collect::<Option<Vec<_>>>()
            .with_context(|| format!("tensor '{name}': bad shape"))?;
        let offsets = v["data_offsets"]
            .as_array()
            .filter(|o| o.len() == 2)
            .with_context(|| format!("tensor '{name}': missing data_offsets"))?;
        let (Some(start), Some(end)) = (offsets[0].as_u64(), offsets[1].as_u64()) else {
            bail!("tensor '{name}': bad data_offsets");
        };
        entries.insert(
            name,
            Entry { dtype, shape, start: start as usize, end: end as usize },
        );
    }
    Ok((entries, 8 + n))
}

fn dtype_size(dtype: &str) -> Option<usize> {
    match dtype {
        "F64" => Some(8),
        "I32" => Some(4),
        "U8" => Some(1),
        _ => None,
    }
}

// ── Reader ────────────────────────────────────────────────────────────────────

/// In-memory safetensors file with typed accessors.
pub struct StReader {
    bytes: Vec<u8>,
    data_start: usize,
    entries: HashMap<String, Entry>,
}

impl StReader {
    pub fn open(path: &Path) -> Result<Self> {
        let bytes =
            std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_bytes(bytes).with_context(|| format!("parsing {}", path.display()))
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let (entries, data_start) = parse_header(&bytes)?;
        let payload = bytes.len() - data_start;
        for (name, e) in &entries {
            ensure!(
                e.start <= e.end && e.end <= payload,
                "tensor '{name}': offsets [{}, {}) outside payload of {payload} bytes",
                e.start,
                e.end
            );
            if let Some(size) = dtype_size(&e.dtype) {
                let n: usize = e.shape.iter().product();
                ensure!(
                    n * size == e.end - e.start,
                    "tensor '{name}': shape {:?} does not match {} bytes of {}",
                    e.shape,
                    e.end - e.start,
                    e.dtype
                );
            }
        }
        Ok(Self { bytes, data_start, entries })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn shape(&self, name: &str) -> Result<&[usize]> {
        Ok(&self.entry(name)?.shape)
    }

    fn entry(&self, name: &str) -> Result<&Entry> {
        self.entries
            .get(name)
            .with_context(|| format!("missing '{name}' key"))
    }

    fn raw(&self, name: &str, dtype: &str) -> Result<&[u8]> {
        let e = self.entry(name)?;
        ensure!(e.dtype == dtype, "tensor '{name}' has dtype {}, expected {dtype}", e.dtype);
        Ok(&self.bytes[self.data_start + e.start..self.data_start + e.end])
    }

    pub fn read_f64(&self, name: &str) -> Result<Vec<f64>> {
        Ok(self
            .raw(name, "F64")?
            .chunks_exact(8)
            .map(|b| f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]))
            .collect())
    }

    pub fn read_i32(&self, name: &str) -> Result<Vec<i32>> {
        Ok(self
            .raw(name, "I32")?
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect())
    }

    pub fn read_u8(&self, name: &str) -> Result<&[u8]> {
        self.raw(name, "U8")
    }

    /// Newline-separated UTF-8 labels stored as a `U8` tensor.
    pub fn read_strings(&self, name: &str) -> Result<Vec<String>> {
        let s = std::str::from_utf8(self.read_u8(name)?)
            .with_context(|| format!("tensor '{name}' is not UTF-8"))?;
        Ok(s.split('\n').filter(|s| !s.is_empty()).map(String::from).collect())
    }
}

// ── Writer ────────────────────────────────────────────────────────────────────

/// Safetensors file writer for F64, I32 and U8 tensors.
///
/// ```rust,no_run
/// use heart_snr::io::StWriter;
/// use std::path::Path;
/// let mut w = StWriter::new();
/// w.add_f64("snr_med", &[1.0, 2.0, 3.0], &[3, 1]);
/// w.add_strings("columns", &["Prep".to_string()]);
/// w.write(Path::new("/tmp/out.safetensors")).unwrap();
/// ```
#[derive(Default)]
pub struct StWriter {
    entries: Vec<(String, Vec<u8>, &'static str, Vec<usize>)>,
}

impl StWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_f64(&mut self, name: &str, data: &[f64], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "F64", shape.to_vec()));
    }

    pub fn add_i32(&mut self, name: &str, data: &[i32], shape: &[usize]) {
        let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
        self.entries.push((name.to_string(), bytes, "I32", shape.to_vec()));
    }

    pub fn add_u8(&mut self, name: &str, data: &[u8]) {
        self.entries.push((name.to_string(), data.to_vec(), "U8", vec![data.len()]));
    }

    pub fn add_strings(&mut self, name: &str, labels: &[String]) {
        self.add_u8(name, labels.join("\n").as_bytes());
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut header_map = serde_json::Map::new();
        let mut offset: usize = 0;
        for (name, data, dtype, shape) in &self.entries {
            header_map.insert(name.clone(), serde_json::json!({
                "dtype": dtype,
                "shape": shape,
                "data_offsets": [offset, offset + data.len()],
            }));
            offset += data.len();
        }
        let hdr_bytes = serde_json::to_vec(&header_map)?;
        let pad = (8 - hdr_bytes.len() % 8) % 8;
        let mut out = Vec::with_capacity(8 + hdr_bytes.len() + pad + offset);
        out.extend_from_slice(&((hdr_bytes.len() + pad) as u64).to_le_bytes());
        out.extend_from_slice(&hdr_bytes);
        out.extend(std::iter::repeat(b' ').take(pad));
        for (_, data, _, _) in &self.entries {
            out.extend_from_slice(data);
        }
        Ok(out)
    }

    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        std::fs::write(path, self.to_bytes()?)
            .with_context(|| format!("writing {}", path.display()))
    }
}
