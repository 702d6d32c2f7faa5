//! Method table reader for Dalvik executables.

use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodSignature {
    /// Type descriptor of the declaring class, e.g. `Lcom/example/Main;`
    pub class: String,
    pub name: String,
    pub parameters: Vec<String>,
    pub return_type: String,
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}->{}({}){}",
            self.class,
            self.name,
            self.parameters.concat(),
            self.return_type
        )
    }
}

struct Dex<'a> {
    data: &'a [u8],
    string_ids_off: usize,
    string_ids_size: usize,
    type_ids_off: usize,
    type_ids_size: usize,
    proto_ids_off: usize,
    proto_ids_size: usize,
}

impl<'a> Dex<'a> {
    fn u16_at(&self, off: usize) -> Result<u16> {
        self.data
            .get(off..off + 2)
            .map(|b| u16::from_le_bytes([b[0], b[1]]))
            .with_context(|| format!("truncated dex at offset {}", off))
    }

    fn u32_at(&self, off: usize) -> Result<u32> {
        self.data
            .get(off..off + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .with_context(|| format!("truncated dex at offset {}", off))
    }

    fn string(&self, idx: usize) -> Result<String> {
        if idx >= self.string_ids_size {
            bail!("string index {} out of range", idx);
        }
        let mut off = self.u32_at(self.string_ids_off + idx * 4)? as usize;
        // uleb128 utf16 length, unused: the data is NUL terminated
        loop {
            let byte = *self.data.get(off).context("truncated dex string")?;
            off += 1;
            if byte & 0x80 == 0 {
                break;
            }
        }
        let rest = self.data.get(off..).context("truncated dex string")?;
        let end = rest.iter().position(|&b| b == 0).unwrap_or(rest.len());
        Ok(String::from_utf8_lossy(&rest[..end]).into_owned())
    }

    fn type_name(&self, idx: usize) -> Result<String> {
        if idx >= self.type_ids_size {
            bail!("type index {} out of range", idx);
        }
        let descriptor = self.u32_at(self.type_ids_off + idx * 4)? as usize;
        self.string(descriptor)
    }

    fn proto(&self, idx: usize) -> Result<(Vec<String>, String)> {
        if idx >= self.proto_ids_size {
            bail!("proto index {} out of range", idx);
        }
        let base = self.proto_ids_off + idx * 12;
        let return_type = self.type_name(self.u32_at(base + 4)? as usize)?;
        let params_off = self.u32_at(base + 8)? as usize;

        let mut params = Vec::new();
        if params_off != 0 {
            let count = self.u32_at(params_off)? as usize;
            if params_off + 4 + count.saturating_mul(2) > self.data.len() {
                bail!("type list at {:#x} exceeds dex size", params_off);
            }
            for i in 0..count {
                let type_idx = self.u16_at(params_off + 4 + i * 2)? as usize;
                params.push(self.type_name(type_idx)?);
            }
        }
        Ok((params, return_type))
    }
}

/// Read every method id declared or referenced by a dex file
pub fn read_methods(data: &[u8]) -> Result<Vec<MethodSignature>> {
    if data.len() < 0x70 || &data[..4] != b"dex\n" {
        bail!("not a dex file");
    }

    let header = |off: usize| -> usize {
        u32::from_le_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]]) as usize
    };

    let dex = Dex {
        data,
        string_ids_size: header(0x38),
        string_ids_off: header(0x3C),
        type_ids_size: header(0x40),
        type_ids_off: header(0x44),
        proto_ids_size: header(0x48),
        proto_ids_off: header(0x4C),
    };
    let method_ids_size = header(0x58);
    let method_ids_off = header(0x5C);

    let fits = method_ids_size
        .checked_mul(8)
        .and_then(|n| n.checked_add(method_ids_off))
        .map_or(false, |end| end <= data.len());
    if !fits {
        bail!("method table of {} entries exceeds dex size", method_ids_size);
    }

    let mut methods = Vec::new();
    for i in 0..method_ids_size {
        let base = method_ids_off + i * 8;
        let class = dex.type_name(dex.u16_at(base)? as usize)?;
        let (parameters, return_type) = dex.proto(dex.u16_at(base + 2)? as usize)?;
        let name = dex.string(dex.u32_at(base + 4)? as usize)?;
        methods.push(MethodSignature {
            class,
            name,
            parameters,
            return_type,
        });
    }

    Ok(methods)
}

/// Render methods grouped by class, one signature per line
pub fn render_listing(methods: &[MethodSignature]) -> String {
    let mut out = String::new();
    let mut current: Option<&str> = None;
    for method in methods {
        if current != Some(method.class.as_str()) {
            if current.is_some() {
                out.push('\n');
            }
            out.push_str(&format!("class {}\n", method.class));
            current = Some(method.class.as_str());
        }
        out.push_str(&format!("    {}\n", method));
    }
    out
}
