/// Bookland ISBN-13 as scanned from the barcode: 978 or 979 prefix, then
/// ten more digits. No hyphens, no check-digit verification (the scanner
/// already did that).
pub fn is_valid_isbn13(text: &str) -> bool {
    text.len() == 13
        && (text.starts_with("978") || text.starts_with("979"))
        && text.bytes().all(|byte| byte.is_ascii_digit())
}

#[cfg(test)]
mod isbn_tests {
    use super::*;

    #[test]
    fn accepts_bookland_isbn13() {
        assert!(is_valid_isbn13("9784123456789"));
        assert!(is_valid_isbn13("9791234567890"));
    }

    #[test]
    fn rejects_everything_else() {
        for bad in [
            "",
            "4123456789",      // ISBN-10
            "978412345678",    // too short
            "97841234567890",  // too long
            "9774123456789",   // wrong prefix
            "978-4123456789",  // hyphenated
            "978412345678X",   // non-digit
        ] {
            assert!(!is_valid_isbn13(bad), "{bad} should be rejected");
        }
    }
}
