//! Opaque book identifiers for WeRead detail pages.
//!
//! WeRead links to `https://weread.qq.com/web/bookDetail/<id>`. Here `<id>` is
//! an obfuscated encoding of the numeric or alphanumeric `bookId` that the
//! ranking API returns. [`derive`] reproduces that encoding. It is pure and
//! total: every input string yields an identifier of at least 23 characters,
//! made up only of lowercase hex digits and the separator `g`.

/// Minimum length of the body before the 3-character checksum suffix.
const MIN_BODY_LEN: usize = 20;
const NUMERIC_CHUNK: usize = 9;

fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Split the key into hex chunks and return them with their type tag.
///
/// All-digit keys (ASCII) become base-16 renderings of each 9-digit slice,
/// tagged `3`. Anything else, including the empty string, becomes a single
/// chunk of concatenated code points, tagged `4`.
///
/// The web client's own encoder treats `""` as numeric (tag `3`, no chunks)
/// and also accepts non-ASCII Unicode digits. Both cases are handled
/// differently here; real `bookId`s never hit either.
fn chunks(content_key: &str) -> (char, Vec<String>) {
    let numeric = !content_key.is_empty() && content_key.bytes().all(|b| b.is_ascii_digit());
    if numeric {
        let parts = content_key
            .as_bytes()
            .chunks(NUMERIC_CHUNK)
            .map(|chunk| {
                // at most nine ASCII digits, always fits
                let n = chunk.iter().fold(0u64, |acc, b| acc * 10 + u64::from(b - b'0'));
                format!("{n:x}")
            })
            .collect();
        ('3', parts)
    } else {
        let hex: String = content_key.chars().map(|c| format!("{:x}", c as u32)).collect();
        ('4', vec![hex])
    }
}

/// Derive the opaque identifier for `content_key`.
pub fn derive(content_key: &str) -> String {
    let hash = md5_hex(content_key);
    let (tag, parts) = chunks(content_key);

    let mut id = String::with_capacity(MIN_BODY_LEN + 3);
    id.push_str(&hash[..3]);
    id.push(tag);
    id.push('2');
    id.push_str(&hash[30..]);

    for (i, part) in parts.iter().enumerate() {
        id.push_str(&format!("{:02x}", part.len()));
        id.push_str(part);
        if i + 1 < parts.len() {
            id.push('g');
        }
    }

    if id.len() < MIN_BODY_LEN {
        let missing = MIN_BODY_LEN - id.len();
        id.push_str(&hash[..missing]);
    }

    let check = md5_hex(&id);
    id.push_str(&check[..3]);
    id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_branch() {
        let id = derive("123456789");
        let hash = md5_hex("123456789");
        // prefix, tag 3, "2" + hash tail, then len 07 + hex(123456789)
        let body = format!("{}32{}0775bcd15", &hash[..3], &hash[30..]);
        assert!(id.starts_with(&body), "{id}");
        assert_eq!(id.len(), MIN_BODY_LEN + 3);
        assert_eq!(&id[body.len()..MIN_BODY_LEN], &hash[..MIN_BODY_LEN - body.len()]);
    }

    #[test]
    fn test_numeric_multi_chunk_uses_separator() {
        // "1234567890" -> ["75bcd15", "0"]
        let id = derive("1234567890");
        let hash = md5_hex("1234567890");
        let body = format!("{}32{}0775bcd15g010", &hash[..3], &hash[30..]);
        assert!(id.starts_with(&body), "{id}");
    }

    #[test]
    fn test_codepoint_branch() {
        let id = derive("ABC");
        let hash = md5_hex("ABC");
        let body = format!("{}42{}06414243", &hash[..3], &hash[30..]);
        assert!(id.starts_with(&body), "{id}");
        assert!(id.len() >= 23);
    }

    #[test]
    fn test_codepoint_branch_non_ascii() {
        // 书 = U+4E66
        let id = derive("书1");
        let hash = md5_hex("书1");
        let body = format!("{}42{}064e6631", &hash[..3], &hash[30..]);
        assert!(id.starts_with(&body), "{id}");
    }

    #[test]
    fn test_long_body_is_not_padded() {
        let key = "CB_3Fz9Ck0oK0ZN6EN6Bq";
        let id = derive(key);
        let tail_len = 3;
        let body = &id[..id.len() - tail_len];
        assert!(body.len() > MIN_BODY_LEN);
        assert_eq!(&id[id.len() - tail_len..], &md5_hex(body)[..3]);
    }

    #[test]
    fn test_checksum_suffix() {
        let id = derive("123456789");
        let (body, suffix) = id.split_at(MIN_BODY_LEN);
        assert_eq!(suffix, &md5_hex(body)[..3]);
    }

    #[test]
    fn test_empty_key_is_single_empty_chunk() {
        let id = derive("");
        let hash = md5_hex("");
        let body = format!("{}42{}00", &hash[..3], &hash[30..]);
        assert!(id.starts_with(&body), "{id}");
        assert_eq!(id.len(), MIN_BODY_LEN + 3);
    }

    #[test]
    fn test_deterministic_and_distinct() {
        assert_eq!(derive("695233"), derive("695233"));
        assert_ne!(derive("695233"), derive("695234"));
        assert_ne!(derive("ABC"), derive("ABD"));
    }

    #[test]
    fn test_url_safe_alphabet() {
        for key in ["", "0", "123456789012345678901", "CB_abc", "微信读书"] {
            let id = derive(key);
            assert!(
                id.chars().all(|c| c.is_ascii_digit() || ('a'..='g').contains(&c)),
                "{key:?} -> {id}"
            );
        }
    }

    #[test]
    fn test_leading_zero_chunks_drop_zeros() {
        // "000000001" parses to 1
        let id = derive("000000001");
        let hash = md5_hex("000000001");
        assert!(id.starts_with(&format!("{}32{}011", &hash[..3], &hash[30..])), "{id}");
    }
}
