//! Compact permission string codec
//!
//! A tileset's permissions persist as one glyph per metatile:
//! - value `v` is the character with code `v + 63`
//! - value 29 (which would be a backslash) is written as `/`
//! - an empty permission is written as `=`
//! - trailing empty permissions are not written at all

use crate::EncodingError;

const GLYPH_OFFSET: u32 = 63;
const NULL_GLYPH: char = '=';
const ESCAPED_VALUE: u16 = 29;
const ESCAPED_GLYPH: char = '/';

/// Encode a permission array into its string form
pub fn encode_permissions(levels: &[Option<u16>]) -> Result<String, EncodingError> {
    let Some(last) = levels.iter().rposition(Option::is_some) else {
        return Ok(String::new());
    };

    let mut encoded = String::with_capacity(last + 1);
    for (index, level) in levels[..=last].iter().enumerate() {
        let glyph = match *level {
            None => NULL_GLYPH,
            Some(ESCAPED_VALUE) => ESCAPED_GLYPH,
            Some(value) => char::from_u32(value as u32 + GLYPH_OFFSET)
                .ok_or(EncodingError::UnencodableValue { index, value })?,
        };
        encoded.push(glyph);
    }
    Ok(encoded)
}

/// Decode a permission string into an array of `len` entries.
///
/// Positions past the end of the string stay empty; glyphs past `len` are ignored.
pub fn decode_permissions(encoded: &str, len: usize) -> Result<Vec<Option<u16>>, EncodingError> {
    let mut levels = vec![None; len];
    for (index, glyph) in encoded.chars().take(len).enumerate() {
        levels[index] = match glyph {
            NULL_GLYPH => None,
            ESCAPED_GLYPH => Some(ESCAPED_VALUE),
            _ => {
                let value = (glyph as u32)
                    .checked_sub(GLYPH_OFFSET)
                    .and_then(|v| u16::try_from(v).ok())
                    .ok_or(EncodingError::InvalidGlyph { index, glyph })?;
                Some(value)
            }
        };
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_basic_values() {
        let encoded = encode_permissions(&[Some(0), Some(1), Some(12)]).unwrap();
        assert_eq!(encoded, "?@K");
    }

    #[test]
    fn test_null_runs_and_trailing_nulls() {
        let levels = [Some(5), None, None, Some(1), None, None];
        let encoded = encode_permissions(&levels).unwrap();
        assert_eq!(encoded, "D==@");

        let decoded = decode_permissions(&encoded, levels.len()).unwrap();
        assert_eq!(decoded, levels);
    }

    #[test]
    fn test_trailing_nulls_dropped_then_refilled() {
        let levels = [Some(5), None, None];
        let encoded = encode_permissions(&levels).unwrap();
        assert_eq!(encoded.chars().count(), 1);
        assert_eq!(decode_permissions(&encoded, 3).unwrap(), levels);
    }

    #[test]
    fn test_escaped_value() {
        let encoded = encode_permissions(&[Some(29), Some(28)]).unwrap();
        assert_eq!(encoded, "/[");
        assert!(!encoded.contains('\\'));
        assert_eq!(
            decode_permissions(&encoded, 2).unwrap(),
            vec![Some(29), Some(28)]
        );
    }

    #[test]
    fn test_all_null_is_empty() {
        assert_eq!(encode_permissions(&[None, None]).unwrap(), "");
        assert_eq!(decode_permissions("", 2).unwrap(), vec![None, None]);
    }

    #[test]
    fn test_decode_rejects_low_glyphs() {
        let err = decode_permissions("?!", 2).unwrap_err();
        assert_eq!(err, EncodingError::InvalidGlyph { index: 1, glyph: '!' });
    }

    #[test]
    fn test_decode_ignores_extra_glyphs() {
        assert_eq!(decode_permissions("?@A", 2).unwrap(), vec![Some(0), Some(1)]);
    }

    #[test]
    fn test_surrogate_range_is_unencodable() {
        let value = 0xD800 - 63;
        let err = encode_permissions(&[Some(value)]).unwrap_err();
        assert_eq!(err, EncodingError::UnencodableValue { index: 0, value });
    }
}
