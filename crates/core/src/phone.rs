//! Phone number and link-code helpers.

/// Strips everything but ASCII digits. Returns `None` if nothing is left.
pub fn normalize_number(raw: &str) -> Option<String> {
	let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
	(!digits.is_empty()).then_some(digits)
}

/// Groups a link code in fours for display, e.g. `ABCD1234` as `ABCD-1234`.
pub fn format_code(code: &str) -> String {
	let chars: Vec<char> = code.chars().collect();
	chars.chunks(4).map(|chunk| chunk.iter().collect::<String>()).collect::<Vec<_>>().join("-")
}
