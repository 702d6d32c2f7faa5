//! Builders for small binary APK parts used by tests.

use std::io::Write;

const NO_INDEX: u32 = 0xFFFF_FFFF;

/// Typed attribute value for [`AxmlBuilder::start`]
pub enum Val {
    Str(&'static str),
    Int(u32),
    Bool(bool),
}

/// Binary XML writer with a UTF-16 string pool
pub struct AxmlBuilder {
    strings: Vec<String>,
    body: Vec<u8>,
}

impl AxmlBuilder {
    pub fn new() -> Self {
        Self {
            strings: Vec::new(),
            body: Vec::new(),
        }
    }

    fn idx(&mut self, s: &str) -> u32 {
        if let Some(i) = self.strings.iter().position(|x| x == s) {
            return i as u32;
        }
        self.strings.push(s.to_string());
        (self.strings.len() - 1) as u32
    }

    fn node_header(&mut self, kind: u16, size: u32) {
        self.body.extend_from_slice(&kind.to_le_bytes());
        self.body.extend_from_slice(&16u16.to_le_bytes());
        self.body.extend_from_slice(&size.to_le_bytes());
        self.body.extend_from_slice(&1u32.to_le_bytes());
        self.body.extend_from_slice(&NO_INDEX.to_le_bytes());
    }

    pub fn namespace(&mut self, prefix: &str, uri: &str) -> &mut Self {
        let (p, u) = (self.idx(prefix), self.idx(uri));
        self.node_header(0x0100, 24);
        self.body.extend_from_slice(&p.to_le_bytes());
        self.body.extend_from_slice(&u.to_le_bytes());
        self
    }

    /// Start element. Attributes are `(namespace uri or "", name, value)`.
    pub fn start(&mut self, name: &str, attrs: &[(&str, &str, Val)]) -> &mut Self {
        let name_idx = self.idx(name);
        let mut encoded = Vec::new();
        for (ns, attr, val) in attrs {
            let ns_idx = if ns.is_empty() { NO_INDEX } else { self.idx(ns) };
            let attr_idx = self.idx(attr);
            let (raw, kind, data) = match val {
                Val::Str(s) => {
                    let i = self.idx(s);
                    (i, 0x03u8, i)
                }
                Val::Int(n) => (NO_INDEX, 0x10, *n),
                Val::Bool(b) => (NO_INDEX, 0x12, if *b { 0xFFFF_FFFF } else { 0 }),
            };
            encoded.extend_from_slice(&ns_idx.to_le_bytes());
            encoded.extend_from_slice(&attr_idx.to_le_bytes());
            encoded.extend_from_slice(&raw.to_le_bytes());
            encoded.extend_from_slice(&8u16.to_le_bytes());
            encoded.push(0);
            encoded.push(kind);
            encoded.extend_from_slice(&data.to_le_bytes());
        }

        self.node_header(0x0102, 16 + 20 + encoded.len() as u32);
        self.body.extend_from_slice(&NO_INDEX.to_le_bytes());
        self.body.extend_from_slice(&name_idx.to_le_bytes());
        self.body.extend_from_slice(&20u16.to_le_bytes());
        self.body.extend_from_slice(&20u16.to_le_bytes());
        self.body.extend_from_slice(&(attrs.len() as u16).to_le_bytes());
        self.body.extend_from_slice(&[0u8; 6]);
        self.body.extend_from_slice(&encoded);
        self
    }

    pub fn end(&mut self, name: &str) -> &mut Self {
        let name_idx = self.idx(name);
        self.node_header(0x0103, 24);
        self.body.extend_from_slice(&NO_INDEX.to_le_bytes());
        self.body.extend_from_slice(&name_idx.to_le_bytes());
        self
    }

    pub fn build(&self) -> Vec<u8> {
        let count = self.strings.len() as u32;
        let mut data = Vec::new();
        for s in &self.strings {
            let units: Vec<u16> = s.encode_utf16().collect();
            data.extend_from_slice(&(units.len() as u16).to_le_bytes());
            for u in units {
                data.extend_from_slice(&u.to_le_bytes());
            }
            data.extend_from_slice(&0u16.to_le_bytes());
        }
        while data.len() % 4 != 0 {
            data.push(0);
        }

        let mut offsets = Vec::new();
        let mut pos = 0u32;
        for s in &self.strings {
            offsets.push(pos);
            pos += 2 + 2 * s.encode_utf16().count() as u32 + 2;
        }

        let strings_start = 28 + 4 * count;
        let pool_size = strings_start + data.len() as u32;
        let mut pool = Vec::new();
        pool.extend_from_slice(&1u16.to_le_bytes());
        pool.extend_from_slice(&28u16.to_le_bytes());
        pool.extend_from_slice(&pool_size.to_le_bytes());
        pool.extend_from_slice(&count.to_le_bytes());
        pool.extend_from_slice(&0u32.to_le_bytes());
        pool.extend_from_slice(&0u32.to_le_bytes());
        pool.extend_from_slice(&strings_start.to_le_bytes());
        pool.extend_from_slice(&0u32.to_le_bytes());
        for off in offsets {
            pool.extend_from_slice(&off.to_le_bytes());
        }
        pool.extend_from_slice(&data);

        let total = 8 + pool.len() as u32 + self.body.len() as u32;
        let mut out = Vec::new();
        out.extend_from_slice(&3u16.to_le_bytes());
        out.extend_from_slice(&8u16.to_le_bytes());
        out.extend_from_slice(&total.to_le_bytes());
        out.extend_from_slice(&pool);
        out.extend_from_slice(&self.body);
        out
    }
}

pub const ANDROID_NS: &str = "http://schemas.android.com/apk/res/android";

/// A small manifest: package, version, sdk bounds, one permission, two activities
pub fn sample_manifest() -> Vec<u8> {
    let mut b = AxmlBuilder::new();
    b.namespace("android", ANDROID_NS)
        .start(
            "manifest",
            &[
                (ANDROID_NS, "versionCode", Val::Int(42)),
                (ANDROID_NS, "versionName", Val::Str("1.4.2")),
                ("", "package", Val::Str("com.example.app")),
            ],
        )
        .start(
            "uses-sdk",
            &[
                (ANDROID_NS, "minSdkVersion", Val::Int(21)),
                (ANDROID_NS, "targetSdkVersion", Val::Int(33)),
            ],
        )
        .end("uses-sdk")
        .start(
            "uses-permission",
            &[(ANDROID_NS, "name", Val::Str("android.permission.INTERNET"))],
        )
        .end("uses-permission")
        .start(
            "application",
            &[
                (ANDROID_NS, "label", Val::Str("Example")),
                (ANDROID_NS, "debuggable", Val::Bool(true)),
            ],
        )
        .start("activity", &[(ANDROID_NS, "name", Val::Str(".MainActivity"))])
        .end("activity")
        .start(
            "activity",
            &[(ANDROID_NS, "name", Val::Str("org.other.Settings"))],
        )
        .end("activity")
        .end("application")
        .end("manifest");
    b.build()
}

/// Minimal dex containing `LFoo;->bar(I)V` and `LFoo;-><init>()V`
pub fn sample_dex() -> Vec<u8> {
    // Sorted as a real dex would be
    let strings = ["<init>", "I", "LFoo;", "V", "VI", "bar"];
    let types = [1u32, 2, 3]; // I, LFoo;, V
    // (shorty, return type idx, params)
    let protos: [(u32, u32, &[u16]); 2] = [(3, 2, &[]), (4, 2, &[0])];
    // (class type idx, proto idx, name string idx)
    let methods: [(u16, u16, u32); 2] = [(1, 0, 0), (1, 1, 5)];

    let string_ids_off = 0x70u32;
    let type_ids_off = string_ids_off + 4 * strings.len() as u32;
    let proto_ids_off = type_ids_off + 4 * types.len() as u32;
    let method_ids_off = proto_ids_off + 12 * protos.len() as u32;
    let type_list_off = method_ids_off + 8 * methods.len() as u32;
    let string_data_off = type_list_off + 8;

    let mut out = vec![0u8; 0x70];
    out[..8].copy_from_slice(b"dex\n035\0");
    let mut put = |at: usize, v: u32| out[at..at + 4].copy_from_slice(&v.to_le_bytes());
    put(0x38, strings.len() as u32);
    put(0x3C, string_ids_off);
    put(0x40, types.len() as u32);
    put(0x44, type_ids_off);
    put(0x48, protos.len() as u32);
    put(0x4C, proto_ids_off);
    put(0x58, methods.len() as u32);
    put(0x5C, method_ids_off);

    let mut string_data = Vec::new();
    let mut string_offsets = Vec::new();
    for s in strings {
        string_offsets.push(string_data_off + string_data.len() as u32);
        string_data.push(s.len() as u8);
        string_data.extend_from_slice(s.as_bytes());
        string_data.push(0);
    }

    for off in string_offsets {
        out.extend_from_slice(&off.to_le_bytes());
    }
    for t in types {
        out.extend_from_slice(&t.to_le_bytes());
    }
    for (shorty, ret, params) in protos {
        out.extend_from_slice(&shorty.to_le_bytes());
        out.extend_from_slice(&ret.to_le_bytes());
        let off = if params.is_empty() { 0 } else { type_list_off };
        out.extend_from_slice(&off.to_le_bytes());
    }
    for (class, proto, name) in methods {
        out.extend_from_slice(&class.to_le_bytes());
        out.extend_from_slice(&proto.to_le_bytes());
        out.extend_from_slice(&name.to_le_bytes());
    }
    // type_list: size 1, [I], padded to 4
    out.extend_from_slice(&1u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&string_data);
    out
}

/// Dex header claiming more method ids than the file could hold
pub fn oversized_dex() -> Vec<u8> {
    let mut out = vec![0u8; 0x70];
    out[..8].copy_from_slice(b"dex\n035\0");
    out[0x58..0x5C].copy_from_slice(&u32::MAX.to_le_bytes());
    out
}

/// Binary XML whose string pool header declares `u32::MAX` strings
pub fn oversized_string_pool() -> Vec<u8> {
    let mut pool = Vec::new();
    pool.extend_from_slice(&1u16.to_le_bytes());
    pool.extend_from_slice(&28u16.to_le_bytes());
    pool.extend_from_slice(&28u32.to_le_bytes());
    pool.extend_from_slice(&u32::MAX.to_le_bytes());
    pool.extend_from_slice(&[0u8; 16]);

    let mut out = Vec::new();
    out.extend_from_slice(&3u16.to_le_bytes());
    out.extend_from_slice(&8u16.to_le_bytes());
    out.extend_from_slice(&(8 + pool.len() as u32).to_le_bytes());
    out.extend_from_slice(&pool);
    out
}

/// Write a zip holding the given entries
pub fn write_apk(path: &std::path::Path, entries: &[(&str, &[u8])]) {
    let file = std::fs::File::create(path).unwrap();
    let mut zip = zip::ZipWriter::new(file);
    let options = zip::write::FileOptions::default();
    for (name, data) in entries {
        zip.start_file(*name, options).unwrap();
        zip.write_all(data).unwrap();
    }
    zip.finish().unwrap();
}

/// Write a zip holding the sample manifest, dex and one resource
pub fn write_sample_apk(path: &std::path::Path) {
    write_apk(
        path,
        &[
            ("AndroidManifest.xml", &sample_manifest()),
            ("classes.dex", &sample_dex()),
            ("res/raw/hello.txt", b"hello"),
        ],
    );
}
