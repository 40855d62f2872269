//! Numeric literal parsing shared by argument tokens and label values.
//!
//! Prefix `$` selects hex, `:` selects binary, `#` selects octal; an
//! unprefixed token is decimal.

pub fn parse(token: &str) -> Option<u32> {
    if let Some(hex) = token.strip_prefix('$') {
        u32::from_str_radix(hex, 16).ok()
    } else if let Some(bin) = token.strip_prefix(':') {
        u32::from_str_radix(bin, 2).ok()
    } else if let Some(oct) = token.strip_prefix('#') {
        u32::from_str_radix(oct, 8).ok()
    } else {
        token.parse::<u32>().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_radix() {
        assert_eq!(parse("$FF"), Some(255));
        assert_eq!(parse(":10"), Some(2));
        assert_eq!(parse("#17"), Some(15));
        assert_eq!(parse("42"), Some(42));
    }

    #[test]
    fn rejects_malformed_literals() {
        assert_eq!(parse("$ZZ"), None);
        assert_eq!(parse(":9"), None);
        assert_eq!(parse("12a"), None);
    }
}
