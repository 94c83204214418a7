//! C-style escaping for text-format string literals.

/// Decodes the body of a quoted literal. Octal and hex escapes produce raw bytes, so
/// the result is checked for UTF-8 at the end.
pub fn unescape(raw: &str) -> Result<String, String> {
    let mut out: Vec<u8> = Vec::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            let mut buf = [0u8; 4];
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let Some(e) = chars.next() else { return Err("trailing backslash".into()) };
        match e {
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'v' => out.push(0x0b),
            '\\' | '\'' | '"' | '?' => out.push(e as u8),
            '0'..='7' => {
                let mut value = e.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|c| c.to_digit(8)) {
                        Some(d) => { value = value * 8 + d; chars.next(); }
                        None => break,
                    }
                }
                if value > 0xff { return Err(format!("octal escape \\{:o} out of range", value)); }
                out.push(value as u8);
            }
            'x' => {
                let mut value = 0u32;
                let mut digits = 0;
                while digits < 2 {
                    match chars.peek().and_then(|c| c.to_digit(16)) {
                        Some(d) => { value = value * 16 + d; chars.next(); digits += 1; }
                        None => break,
                    }
                }
                if digits == 0 { return Err("\\x escape without hex digits".into()); }
                out.push(value as u8);
            }
            'u' | 'U' => {
                let width = if e == 'u' { 4 } else { 8 };
                let mut value = 0u32;
                for _ in 0..width {
                    let d = chars.next().and_then(|c| c.to_digit(16))
                        .ok_or_else(|| format!("\\{} escape needs {} hex digits", e, width))?;
                    value = value.wrapping_mul(16).wrapping_add(d);
                }
                let ch = char::from_u32(value).ok_or_else(|| format!("invalid code point U+{:X}", value))?;
                let mut buf = [0u8; 4];
                out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
            }
            other => return Err(format!("unknown escape `\\{}`", other)),
        }
    }
    String::from_utf8(out).map_err(|_| "string is not valid UTF-8".to_string())
}

/// Encodes `s` for a double-quoted literal. Printable text, including non-ASCII, is
/// kept as-is.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '"' => out.push_str("\\\""),
            '\'' => out.push_str("\\'"),
            '\\' => out.push_str("\\\\"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => out.push_str(&format!("\\{:03o}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_simple_escapes() {
        assert_eq!(unescape(r#"a\tb\n\"q\" \\ \'"#).unwrap(), "a\tb\n\"q\" \\ '");
    }

    #[test]
    fn decodes_numeric_escapes() {
        assert_eq!(unescape(r"\101\x42é").unwrap(), "ABé");
        // UTF-8 bytes of "é" spelled as octal
        assert_eq!(unescape(r"\303\251").unwrap(), "é");
    }

    #[test]
    fn rejects_bad_escapes() {
        assert!(unescape(r"\q").is_err());
        assert!(unescape(r"\x").is_err());
        assert!(unescape(r"\u12").is_err());
        assert!(unescape(r"\377").is_err()); // lone 0xff is not UTF-8
    }

    #[test]
    fn escape_then_unescape_is_identity() {
        let s = "path/with \"quotes\"\tand\\slashes\u{1}é";
        assert_eq!(unescape(&escape(s)).unwrap(), s);
    }
}
