//! MDict header parsing and master key derivation.
//!
//! ```text
//! [4 bytes] header length (big-endian u32)
//! [N bytes] XML element; UTF-16LE ending in \x00\x00 for v1/v2, UTF-8 for v3
//! [4 bytes] Adler-32 of the N header bytes (little-endian u32)
//! ```

use std::collections::HashMap;
use std::io::Read;

use adler2::adler32_slice;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use encoding_rs::UTF_16LE;
use log::{debug, info, trace, warn};
use quick_xml::{Reader, events::Event};

use crate::mdict::codec::crypto;
use crate::mdict::types::error::{MdictError, Result};
use crate::mdict::types::models::{
    EncryptionFlags, MasterKey, MdictEncoding, MdictHeader, MdictMetadata, MdictVersion,
};
use crate::mdict::utils;

/// Reads and validates the header from the start of `file`.
///
/// `passcode` is an optional `(regcode_hex, user_email)` pair for encrypted
/// dictionaries.
pub fn parse<R: Read>(file: &mut R, passcode: Option<(&str, &str)>) -> Result<MdictHeader> {
    info!("Parsing MDict header");

    let header_len = file.read_u32::<BigEndian>()?;
    let mut header_bytes = vec![0u8; header_len as usize];
    file.read_exact(&mut header_bytes)?;

    let checksum_expected = file.read_u32::<LittleEndian>()?;
    let checksum_actual = adler32_slice(&header_bytes);
    trace!(
        "Header checksum: expected={:#010x}, actual={:#010x}",
        checksum_expected, checksum_actual
    );
    if checksum_actual != checksum_expected {
        return Err(MdictError::ChecksumMismatch {
            expected: checksum_expected,
            actual: checksum_actual,
        });
    }

    let utf16 = header_bytes.ends_with(&[0, 0]);
    let xml = if utf16 {
        let (text, _, _) = UTF_16LE.decode(&header_bytes[..header_bytes.len() - 2]);
        text.into_owned()
    } else {
        String::from_utf8_lossy(&header_bytes).into_owned()
    };
    let xml: String = xml
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect();

    let attrs = parse_xml_attributes(&xml)?;
    let (version, encoding, encryption_flags, metadata) = build_header_from_attributes(&attrs)?;

    if utf16 == (version == MdictVersion::V3) {
        warn!(
            "Header text encoding ({}) does not match engine version {}",
            if utf16 { "UTF-16LE" } else { "UTF-8" },
            metadata.engine_version
        );
    }

    let master_key = try_derive_master_key(passcode, metadata.uuid.as_deref(), version)?;

    info!(
        "Header parsed: version={}, title='{}', encoding={}, encrypted=(records={}, key index={})",
        metadata.engine_version,
        metadata.title,
        encoding.name(),
        encryption_flags.encrypt_record_blocks,
        encryption_flags.encrypt_key_index
    );

    Ok(MdictHeader {
        version,
        encoding,
        encryption_flags,
        master_key,
        metadata,
    })
}

/// Collects the attributes of the single root element.
fn parse_xml_attributes(xml: &str) -> Result<HashMap<String, String>> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) | Ok(Event::Empty(element)) => {
                return element
                    .attributes()
                    .map(|attr| {
                        let attr = attr.map_err(|e| {
                            MdictError::InvalidFormat(format!("Bad header attribute: {}", e))
                        })?;
                        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                        let value = attr
                            .unescape_value()
                            .map_err(|e| {
                                MdictError::InvalidFormat(format!(
                                    "Bad value for header attribute {}: {}",
                                    key, e
                                ))
                            })?
                            .into_owned();
                        Ok((key, value))
                    })
                    .collect();
            }
            Ok(Event::Eof) => {
                return Err(MdictError::InvalidFormat(
                    "Header XML has no root element".to_string(),
                ));
            }
            Err(e) => {
                return Err(MdictError::InvalidFormat(format!(
                    "Unreadable header XML: {}",
                    e
                )));
            }
            _ => {}
        }
    }
}

fn build_header_from_attributes(
    attrs: &HashMap<String, String>,
) -> Result<(MdictVersion, MdictEncoding, EncryptionFlags, MdictMetadata)> {
    let version_str = attrs
        .get("GeneratedByEngineVersion")
        .map(String::as_str)
        .unwrap_or("1.0");
    let version_num: f32 = version_str.trim().parse().map_err(|e| {
        MdictError::InvalidFormat(format!(
            "Could not parse GeneratedByEngineVersion '{}': {}",
            version_str, e
        ))
    })?;
    let version = MdictVersion::try_from(version_num)?;
    debug!("Engine version {} ({:?})", version_str, version);

    let encoding = attrs
        .get("Encoding")
        .filter(|label| !label.trim().is_empty())
        .map(|label| utils::parse_encoding(label))
        .unwrap_or(encoding_rs::UTF_8);

    // Some writers emit "Yes"/"No" instead of the numeric mask.
    let encryption_flags = attrs
        .get("Encrypted")
        .map(|raw| match raw.trim() {
            "Yes" | "yes" => 1,
            other => other.parse::<u8>().unwrap_or(0),
        })
        .map(|mask| EncryptionFlags {
            encrypt_record_blocks: mask & 0x01 != 0,
            encrypt_key_index: mask & 0x02 != 0,
        })
        .unwrap_or_default();

    let metadata = MdictMetadata {
        title: attrs
            .get("Title")
            .filter(|t| !t.trim().is_empty())
            .cloned()
            .unwrap_or_else(|| "Untitled Dictionary".to_string()),
        engine_version: version_str.to_string(),
        description: attrs.get("Description").cloned(),
        stylesheet_raw: attrs.get("StyleSheet").cloned(),
        uuid: attrs.get("UUID").map(|s| s.as_bytes().to_vec()),
    };

    Ok((version, encoding, encryption_flags, metadata))
}

/// Passcode first, then the v3 UUID, otherwise no master key.
fn try_derive_master_key(
    passcode: Option<(&str, &str)>,
    uuid: Option<&[u8]>,
    version: MdictVersion,
) -> Result<MasterKey> {
    if let Some((reg_code_hex, user_email)) = passcode {
        info!("Deriving master key from the supplied passcode");
        let reg_code = hex::decode(reg_code_hex.trim())
            .map_err(|e| MdictError::DecryptionError(format!("Invalid regcode hex: {}", e)))?;
        if reg_code.len() != 16 {
            return Err(MdictError::DecryptionError(
                "Registration code must be exactly 16 bytes (32 hex chars)".to_string(),
            ));
        }
        return crypto::derive_master_key(&reg_code, user_email.as_bytes()).map(Some);
    }

    if version == MdictVersion::V3
        && let Some(uuid) = uuid
    {
        info!("Deriving master key from the v3 UUID");
        return Ok(Some(crypto::derive_key_from_uuid(uuid)));
    }

    Ok(None)
}
