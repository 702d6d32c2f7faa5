//! Decoder for Android binary XML (the compiled `AndroidManifest.xml`).

use anyhow::{bail, Context, Result};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

const RES_STRING_POOL_TYPE: u16 = 0x0001;
const RES_XML_TYPE: u16 = 0x0003;
const RES_XML_START_NAMESPACE_TYPE: u16 = 0x0100;
const RES_XML_START_ELEMENT_TYPE: u16 = 0x0102;
const RES_XML_END_ELEMENT_TYPE: u16 = 0x0103;
const RES_XML_CDATA_TYPE: u16 = 0x0104;
const RES_XML_RESOURCE_MAP_TYPE: u16 = 0x0180;

const UTF8_FLAG: u32 = 1 << 8;
const NO_INDEX: u32 = 0xFFFF_FFFF;

const TYPE_REFERENCE: u8 = 0x01;
const TYPE_ATTRIBUTE: u8 = 0x02;
const TYPE_STRING: u8 = 0x03;
const TYPE_FLOAT: u8 = 0x04;
const TYPE_DIMENSION: u8 = 0x05;
const TYPE_FRACTION: u8 = 0x06;
const TYPE_INT_DEC: u8 = 0x10;
const TYPE_INT_HEX: u8 = 0x11;
const TYPE_INT_BOOLEAN: u8 = 0x12;

/// Attribute names for framework ids, used when the string pool entry is
/// blank (common in obfuscated APKs)
const KNOWN_ATTRIBUTES: [(u32, &str); 8] = [
    (0x0101_0001, "label"),
    (0x0101_0002, "icon"),
    (0x0101_0003, "name"),
    (0x0101_020c, "minSdkVersion"),
    (0x0101_021b, "versionCode"),
    (0x0101_021c, "versionName"),
    (0x0101_0270, "targetSdkVersion"),
    (0x0101_0271, "maxSdkVersion"),
];

#[derive(Debug, Clone, PartialEq)]
pub struct Attribute {
    /// Namespace URI, if any
    pub namespace: Option<String>,
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XmlNode {
    Start {
        name: String,
        attributes: Vec<Attribute>,
    },
    End {
        name: String,
    },
    Text(String),
}

#[derive(Debug, Clone, Default)]
pub struct XmlDocument {
    /// `(prefix, uri)` pairs declared in the document
    pub namespaces: Vec<(String, String)>,
    pub nodes: Vec<XmlNode>,
}

impl XmlDocument {
    /// Attributes of every element called `name`, in document order
    pub fn elements<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a [Attribute]> + 'a {
        self.nodes.iter().filter_map(move |node| match node {
            XmlNode::Start {
                name: n,
                attributes,
            } if n == name => Some(attributes.as_slice()),
            _ => None,
        })
    }

    fn qualified_name(&self, attr: &Attribute) -> String {
        let prefix = attr.namespace.as_ref().and_then(|uri| {
            self.namespaces
                .iter()
                .find(|(_, u)| u == uri)
                .map(|(p, _)| p.as_str())
        });
        match prefix {
            Some(p) if !p.is_empty() => format!("{}:{}", p, attr.name),
            _ => attr.name.clone(),
        }
    }

    /// Render as indented XML text
    pub fn to_xml(&self) -> Result<String> {
        let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
        writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

        let mut root_written = false;
        for node in &self.nodes {
            match node {
                XmlNode::Start { name, attributes } => {
                    let mut elem = BytesStart::new(name.as_str());
                    if !root_written {
                        for (prefix, uri) in &self.namespaces {
                            let key = format!("xmlns:{}", prefix);
                            elem.push_attribute((key.as_str(), uri.as_str()));
                        }
                        root_written = true;
                    }
                    for attr in attributes {
                        let key = self.qualified_name(attr);
                        elem.push_attribute((key.as_str(), attr.value.as_str()));
                    }
                    writer.write_event(Event::Start(elem))?;
                }
                XmlNode::End { name } => {
                    writer.write_event(Event::End(BytesEnd::new(name.as_str())))?;
                }
                XmlNode::Text(text) => {
                    writer.write_event(Event::Text(BytesText::new(text)))?;
                }
            }
        }

        String::from_utf8(writer.into_inner()).context("decoded manifest is not UTF-8")
    }
}

fn u16_at(data: &[u8], off: usize) -> Result<u16> {
    data.get(off..off + 2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .with_context(|| format!("truncated binary XML at offset {}", off))
}

fn u32_at(data: &[u8], off: usize) -> Result<u32> {
    data.get(off..off + 4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .with_context(|| format!("truncated binary XML at offset {}", off))
}

/// Decode a binary XML document
pub fn decode(data: &[u8]) -> Result<XmlDocument> {
    if u16_at(data, 0)? != RES_XML_TYPE {
        bail!("not a binary XML document");
    }
    let header_size = u16_at(data, 2)? as usize;
    let end = (u32_at(data, 4)? as usize).min(data.len());

    let mut strings: Vec<String> = Vec::new();
    let mut resource_ids: Vec<u32> = Vec::new();
    let mut doc = XmlDocument::default();

    let string = |strings: &[String], idx: u32| -> String {
        strings.get(idx as usize).cloned().unwrap_or_default()
    };

    let mut offset = header_size;
    while offset + 8 <= end {
        let chunk_type = u16_at(data, offset)?;
        let chunk_header = u16_at(data, offset + 2)? as usize;
        let chunk_size = u32_at(data, offset + 4)? as usize;
        if chunk_size < 8 || offset + chunk_size > end {
            bail!("malformed chunk at offset {}", offset);
        }
        let chunk = &data[offset..offset + chunk_size];
        let ext = chunk_header;

        match chunk_type {
            RES_STRING_POOL_TYPE => strings = parse_string_pool(chunk)?,
            RES_XML_RESOURCE_MAP_TYPE => {
                resource_ids = (chunk_header..chunk_size)
                    .step_by(4)
                    .map(|off| u32_at(chunk, off))
                    .collect::<Result<_>>()?;
            }
            RES_XML_START_NAMESPACE_TYPE => {
                let prefix = string(&strings, u32_at(chunk, ext)?);
                let uri = string(&strings, u32_at(chunk, ext + 4)?);
                doc.namespaces.push((prefix, uri));
            }
            RES_XML_START_ELEMENT_TYPE => {
                let name = string(&strings, u32_at(chunk, ext + 4)?);
                let attr_start = u16_at(chunk, ext + 8)? as usize;
                let attr_size = u16_at(chunk, ext + 10)? as usize;
                let attr_count = u16_at(chunk, ext + 12)? as usize;

                let mut attributes = Vec::with_capacity(attr_count);
                for i in 0..attr_count {
                    let a = ext + attr_start + i * attr_size;
                    let ns = u32_at(chunk, a)?;
                    let name_idx = u32_at(chunk, a + 4)?;
                    let raw = u32_at(chunk, a + 8)?;
                    let data_type = *chunk
                        .get(a + 15)
                        .context("truncated attribute value")?;
                    let value_data = u32_at(chunk, a + 16)?;

                    let mut attr_name = string(&strings, name_idx);
                    if attr_name.is_empty() {
                        attr_name = resource_ids
                            .get(name_idx as usize)
                            .and_then(|id| KNOWN_ATTRIBUTES.iter().find(|(k, _)| k == id))
                            .map(|(_, n)| n.to_string())
                            .unwrap_or_else(|| format!("attr{}", name_idx));
                    }

                    let value = if raw != NO_INDEX {
                        string(&strings, raw)
                    } else {
                        format_typed(data_type, value_data, &strings)
                    };

                    attributes.push(Attribute {
                        namespace: (ns != NO_INDEX).then(|| string(&strings, ns)),
                        name: attr_name,
                        value,
                    });
                }
                doc.nodes.push(XmlNode::Start { name, attributes });
            }
            RES_XML_END_ELEMENT_TYPE => {
                let name = string(&strings, u32_at(chunk, ext + 4)?);
                doc.nodes.push(XmlNode::End { name });
            }
            RES_XML_CDATA_TYPE => {
                let text = string(&strings, u32_at(chunk, ext)?);
                doc.nodes.push(XmlNode::Text(text));
            }
            _ => {}
        }

        offset += chunk_size;
    }

    Ok(doc)
}

fn parse_string_pool(chunk: &[u8]) -> Result<Vec<String>> {
    let header_size = u16_at(chunk, 2)? as usize;
    let count = u32_at(chunk, 8)? as usize;
    let flags = u32_at(chunk, 16)?;
    let strings_start = u32_at(chunk, 20)? as usize;
    let utf8 = flags & UTF8_FLAG != 0;

    let fits = count
        .checked_mul(4)
        .and_then(|n| n.checked_add(header_size))
        .map_or(false, |end| end <= chunk.len());
    if !fits {
        bail!("string pool declares {} strings, chunk holds fewer", count);
    }

    let mut strings = Vec::new();
    for i in 0..count {
        let off = strings_start + u32_at(chunk, header_size + i * 4)? as usize;
        let s = if utf8 {
            read_utf8(chunk, off)?
        } else {
            read_utf16(chunk, off)?
        };
        strings.push(s);
    }
    Ok(strings)
}

fn utf8_len(chunk: &[u8], off: usize) -> Result<(usize, usize)> {
    let first = *chunk.get(off).context("truncated string pool")? as usize;
    if first & 0x80 != 0 {
        let second = *chunk.get(off + 1).context("truncated string pool")? as usize;
        Ok((((first & 0x7f) << 8) | second, 2))
    } else {
        Ok((first, 1))
    }
}

fn read_utf8(chunk: &[u8], off: usize) -> Result<String> {
    // UTF-16 length first, then byte length
    let (_, skip) = utf8_len(chunk, off)?;
    let (len, skip2) = utf8_len(chunk, off + skip)?;
    let start = off + skip + skip2;
    let bytes = chunk
        .get(start..start + len)
        .context("truncated string pool")?;
    Ok(String::from_utf8_lossy(bytes).into_owned())
}

fn read_utf16(chunk: &[u8], off: usize) -> Result<String> {
    let mut len = u16_at(chunk, off)? as usize;
    let mut start = off + 2;
    if len & 0x8000 != 0 {
        len = ((len & 0x7fff) << 16) | u16_at(chunk, off + 2)? as usize;
        start += 2;
    }
    let bytes = chunk
        .get(start..start + len * 2)
        .context("truncated string pool")?;
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|b| u16::from_le_bytes([b[0], b[1]]))
        .collect();
    Ok(String::from_utf16_lossy(&units))
}

fn complex_value(data: u32) -> f32 {
    const RADIX_MULTS: [f32; 4] = [0.003_906_25, 3.051_758e-5, 1.192_093e-7, 4.656_613e-10];
    let mantissa = (data & 0xFFFF_FF00) as i32 as f32;
    mantissa * RADIX_MULTS[((data >> 4) & 3) as usize]
}

fn format_typed(data_type: u8, data: u32, strings: &[String]) -> String {
    match data_type {
        TYPE_REFERENCE => format!("@{:08X}", data),
        TYPE_ATTRIBUTE => format!("?{:08X}", data),
        TYPE_STRING => strings.get(data as usize).cloned().unwrap_or_default(),
        TYPE_FLOAT => f32::from_bits(data).to_string(),
        TYPE_DIMENSION => {
            const UNITS: [&str; 6] = ["px", "dip", "sp", "pt", "in", "mm"];
            let unit = UNITS.get((data & 0xF) as usize).unwrap_or(&"");
            format!("{}{}", complex_value(data), unit)
        }
        TYPE_FRACTION => {
            let unit = if data & 0xF == 0 { "%" } else { "%p" };
            format!("{}{}", complex_value(data) * 100.0, unit)
        }
        TYPE_INT_DEC => (data as i32).to_string(),
        TYPE_INT_HEX => format!("0x{:08x}", data),
        TYPE_INT_BOOLEAN => (data != 0).to_string(),
        0x1c..=0x1f => format!("#{:08X}", data),
        _ => format!("<0x{:X}, type 0x{:02X}>", data, data_type),
    }
}
