//! Builds small MDict v2 files in memory for end-to-end tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};

use adler2::adler32_slice;
use flate2::Compression;
use flate2::write::ZlibEncoder;
use mdict_bundle::mdict::codec::crypto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextEncoding {
    Utf8,
    Utf16,
}

impl TextEncoding {
    fn label(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "UTF-8",
            TextEncoding::Utf16 => "UTF-16",
        }
    }

    fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16 => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
        }
    }

    fn nul(self) -> &'static [u8] {
        match self {
            TextEncoding::Utf8 => &[0],
            TextEncoding::Utf16 => &[0, 0],
        }
    }

    fn units(self, text: &str) -> u16 {
        match self {
            TextEncoding::Utf8 => text.len() as u16,
            TextEncoding::Utf16 => text.encode_utf16().count() as u16,
        }
    }
}

/// An MDict 2.0 dictionary with zlib blocks.
#[derive(Debug, Clone)]
pub struct MdxBuilder {
    pub title: String,
    pub description: String,
    pub stylesheet: Option<String>,
    pub encoding: TextEncoding,
    pub keys_per_block: usize,
    pub records_per_block: usize,
    /// Encrypt the key index with the fast cipher (`Encrypted="2"`).
    pub encrypt_key_index: bool,
    /// Salsa20-encrypt the first record block.
    pub encrypt_first_record_block: bool,
    /// Positions of entries whose key points at the previous entry's record
    /// instead of a record of their own; their values are not written.
    pub shared_offsets: Vec<usize>,
    entries: Vec<(String, String)>,
}

impl MdxBuilder {
    pub fn new(entries: &[(&str, &str)]) -> Self {
        Self {
            title: "Test Dictionary".to_string(),
            description: "Built for tests".to_string(),
            stylesheet: None,
            encoding: TextEncoding::Utf8,
            keys_per_block: 2,
            records_per_block: 2,
            encrypt_key_index: false,
            encrypt_first_record_block: false,
            shared_offsets: Vec::new(),
            entries: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    pub fn write_to(&self, path: &Path) -> PathBuf {
        std::fs::write(path, self.build()).unwrap();
        path.to_path_buf()
    }

    pub fn build(&self) -> Vec<u8> {
        let enc = self.encoding;
        let mut out = self.header();

        // Records, each NUL-terminated, grouped into blocks.
        let mut record_offsets: Vec<u64> = Vec::new();
        let mut record_blocks: Vec<Vec<u8>> = Vec::new();
        let mut block = Vec::new();
        let mut in_block = 0;
        let mut offset = 0u64;
        for (i, (_, value)) in self.entries.iter().enumerate() {
            if i > 0 && self.shared_offsets.contains(&i) {
                record_offsets.push(record_offsets[i - 1]);
                continue;
            }
            if in_block == self.records_per_block.max(1) {
                record_blocks.push(std::mem::take(&mut block));
                in_block = 0;
            }
            record_offsets.push(offset);
            let mut bytes = enc.encode(value);
            bytes.extend_from_slice(enc.nul());
            offset += bytes.len() as u64;
            block.extend_from_slice(&bytes);
            in_block += 1;
        }
        if !block.is_empty() {
            record_blocks.push(block);
        }

        // Key blocks and the key index describing them.
        let mut key_blocks = Vec::new();
        let mut key_index = Vec::new();
        let keyed: Vec<(&str, u64)> = self
            .entries
            .iter()
            .map(|(k, _)| k.as_str())
            .zip(record_offsets.iter().copied())
            .collect();
        for chunk in keyed.chunks(self.keys_per_block.max(1)) {
            let mut plain = Vec::new();
            for (key, id) in chunk {
                plain.extend_from_slice(&id.to_be_bytes());
                plain.extend_from_slice(&enc.encode(key));
                plain.extend_from_slice(enc.nul());
            }
            let block = zlib_block(&plain);

            key_index.extend_from_slice(&(chunk.len() as u64).to_be_bytes());
            for key in [chunk[0].0, chunk[chunk.len() - 1].0] {
                key_index.extend_from_slice(&enc.units(key).to_be_bytes());
                key_index.extend_from_slice(&enc.encode(key));
                key_index.extend_from_slice(enc.nul());
            }
            key_index.extend_from_slice(&(block.len() as u64).to_be_bytes());
            key_index.extend_from_slice(&(plain.len() as u64).to_be_bytes());
            key_blocks.push(block);
        }

        let mut index_block = zlib_block(&key_index);
        if self.encrypt_key_index {
            let key = crypto::derive_key_for_v2_index(&index_block);
            fast_encrypt(&mut index_block[8..], &key);
        }

        let key_blocks_len: usize = key_blocks.iter().map(Vec::len).sum();
        let mut info = Vec::new();
        for n in [
            key_blocks.len() as u64,
            self.entries.len() as u64,
            key_index.len() as u64,
            index_block.len() as u64,
            key_blocks_len as u64,
        ] {
            info.extend_from_slice(&n.to_be_bytes());
        }
        out.extend_from_slice(&info);
        out.extend_from_slice(&adler32_slice(&info).to_be_bytes());
        out.extend_from_slice(&index_block);
        for block in &key_blocks {
            out.extend_from_slice(block);
        }

        let mut compressed_records = Vec::new();
        for (i, plain) in record_blocks.iter().enumerate() {
            let mut block = zlib_block(plain);
            if i == 0 && self.encrypt_first_record_block {
                // zlib + Salsa20 over the whole payload.
                block[0] = 0x22;
                let key = crypto::derive_key_for_block(&block);
                crypto::salsa_decrypt(&mut block[8..], &key);
            }
            compressed_records.push((block, plain.len()));
        }
        let records_len: usize = compressed_records.iter().map(|(b, _)| b.len()).sum();
        for n in [
            compressed_records.len() as u64,
            self.entries.len() as u64,
            (compressed_records.len() * 16) as u64,
            records_len as u64,
        ] {
            out.extend_from_slice(&n.to_be_bytes());
        }
        for (block, plain_len) in &compressed_records {
            out.extend_from_slice(&(block.len() as u64).to_be_bytes());
            out.extend_from_slice(&(*plain_len as u64).to_be_bytes());
        }
        for (block, _) in &compressed_records {
            out.extend_from_slice(block);
        }
        out
    }

    fn header(&self) -> Vec<u8> {
        let mut xml = format!(
            r#"<Dictionary GeneratedByEngineVersion="2.0" RequiredEngineVersion="2.0" Encrypted="{}" Encoding="{}" Format="Html" Title="{}" Description="{}""#,
            if self.encrypt_key_index { 2 } else { 0 },
            self.encoding.label(),
            xml_attr(&self.title),
            xml_attr(&self.description),
        );
        if let Some(styles) = &self.stylesheet {
            xml.push_str(&format!(r#" StyleSheet="{}""#, xml_attr(styles)));
        }
        xml.push_str("/>\r\n");

        let mut text: Vec<u8> = xml.encode_utf16().flat_map(u16::to_le_bytes).collect();
        text.extend_from_slice(&[0, 0]);
        let mut out = (text.len() as u32).to_be_bytes().to_vec();
        out.extend_from_slice(&text);
        out.extend_from_slice(&adler32_slice(&text).to_le_bytes());
        out
    }
}

fn xml_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('\n', "&#10;")
}

/// `[info LE = zlib][adler32 BE of plain][zlib stream]`
fn zlib_block(plain: &[u8]) -> Vec<u8> {
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(plain).unwrap();
    let compressed = encoder.finish().unwrap();

    let mut block = 2u32.to_le_bytes().to_vec();
    block.extend_from_slice(&adler32_slice(plain).to_be_bytes());
    block.extend_from_slice(&compressed);
    block
}

/// Inverse of the reader's fast cipher.
fn fast_encrypt(data: &mut [u8], key: &[u8]) {
    let mut previous = 0x36u8;
    for (i, byte) in data.iter_mut().enumerate() {
        let cipher = (*byte ^ previous ^ (i as u8) ^ key[i % key.len()]).rotate_left(4);
        *byte = cipher;
        previous = cipher;
    }
}
