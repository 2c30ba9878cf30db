//! Region descriptor parsing

use crate::error::RegistryError;

/// One record of a descriptor, borrowing its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionRecord<'a> {
    pub token: u32,
    pub payload: &'a [u8],
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn take(&mut self, needed: usize) -> Result<&'a [u8], RegistryError> {
        let available = self.bytes.len() - self.offset;
        if needed > available {
            return Err(RegistryError::Truncated {
                offset: self.offset,
                needed,
                available,
            });
        }

        let slice = &self.bytes[self.offset..self.offset + needed];
        self.offset += needed;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, RegistryError> {
        let raw = self.take(4)?;
        Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
    }
}

/// Splits a descriptor into its records
///
/// The whole input must be consumed: a short header, a short record or any
/// bytes after the last record are errors.
pub fn parse_descriptor(bytes: &[u8]) -> Result<Vec<RegionRecord<'_>>, RegistryError> {
    let mut reader = Reader { bytes, offset: 0 };
    let count = reader.u32()?;

    // Each record needs at least its 8-byte header
    let mut records = Vec::with_capacity((count as usize).min(bytes.len() / 8));
    for _ in 0..count {
        let token = reader.u32()?;
        let len = reader.u32()?;
        let payload = reader.take(len as usize)?;
        records.push(RegionRecord { token, payload });
    }

    let trailing = bytes.len() - reader.offset;
    if trailing != 0 {
        return Err(RegistryError::TrailingBytes { count: trailing });
    }
    Ok(records)
}

#[cfg(test)]
pub(crate) fn build_descriptor(regions: &[(u32, &[u8])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&(regions.len() as u32).to_le_bytes());
    for (token, payload) in regions {
        out.extend_from_slice(&token.to_le_bytes());
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_two_records() {
        let bytes = build_descriptor(&[(0, &[0x90]), (1, &[0x48, 0x83, 0xC0, 0x05])]);
        let records = parse_descriptor(&bytes).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0], RegionRecord { token: 0, payload: &[0x90] });
        assert_eq!(records[1].token, 1);
        assert_eq!(records[1].payload, &[0x48, 0x83, 0xC0, 0x05]);
    }

    #[test]
    fn test_empty_descriptor() {
        assert!(parse_descriptor(&0u32.to_le_bytes()).unwrap().is_empty());
    }

    #[test]
    fn test_zero_length_payload() {
        let bytes = build_descriptor(&[(0, &[])]);
        let records = parse_descriptor(&bytes).unwrap();
        assert!(records[0].payload.is_empty());
    }

    #[test]
    fn test_truncated_header() {
        assert!(matches!(
            parse_descriptor(&[1, 0]),
            Err(RegistryError::Truncated { offset: 0, needed: 4, available: 2 })
        ));
    }

    #[test]
    fn test_every_truncation_is_rejected() {
        let bytes = build_descriptor(&[(0, &[0x90, 0x90]), (1, &[0xCC])]);
        for len in 0..bytes.len() {
            assert!(
                matches!(
                    parse_descriptor(&bytes[..len]),
                    Err(RegistryError::Truncated { .. })
                ),
                "prefix of {} bytes accepted",
                len
            );
        }
    }

    #[test]
    fn test_count_larger_than_records() {
        let mut bytes = build_descriptor(&[(0, &[0x90])]);
        bytes[0] = 2;
        assert!(matches!(
            parse_descriptor(&bytes),
            Err(RegistryError::Truncated { .. })
        ));
    }

    #[test]
    fn test_huge_count_does_not_preallocate() {
        let bytes = u32::MAX.to_le_bytes();
        assert!(matches!(
            parse_descriptor(&bytes),
            Err(RegistryError::Truncated { offset: 4, .. })
        ));
    }

    #[test]
    fn test_trailing_bytes() {
        let mut bytes = build_descriptor(&[(0, &[0x90])]);
        bytes.extend_from_slice(&[0xAA, 0xBB]);
        assert!(matches!(
            parse_descriptor(&bytes),
            Err(RegistryError::TrailingBytes { count: 2 })
        ));
    }
}
