//! Row value normalization shared by the loaders

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Canonical catalog datetime format (UTC, Zulu suffix)
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%B %d, %Y", "%b %d, %Y"];
const TIME_FORMATS: &[&str] = &["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M:%S %p"];

/// Normalize a header: trimmed, lowercased, inner spaces as underscores.
///
/// `normalize_key(" Course Pacing ") == "course_pacing"`, and applying it
/// twice changes nothing.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase().replace(' ', "_")
}

/// Parse any supported date or datetime representation into UTC
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc).naive_utc());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(value, DATETIME_FORMAT) {
        return Some(dt);
    }
    for date_format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, date_format) {
            return date.and_hms_opt(0, 0, 0);
        }
        for time_format in TIME_FORMATS {
            let format = format!("{} {}", date_format, time_format);
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, &format) {
                return Some(dt);
            }
            let format = format!("{}T{}", date_format, time_format);
            if let Ok(dt) = NaiveDateTime::parse_from_str(value, &format) {
                return Some(dt);
            }
        }
    }
    None
}

/// Re-serialize a parseable datetime as `%Y-%m-%dT%H:%M:%SZ`
pub fn canonical_datetime(value: &str) -> Option<String> {
    parse_datetime(value).map(|dt| dt.format(DATETIME_FORMAT).to_string())
}

/// Combine separate date and time cells. A blank time means midnight.
pub fn combine_date_time(date: &str, time: &str) -> Option<String> {
    let date = date.trim();
    if date.is_empty() {
        return None;
    }
    let time = time.trim();
    if time.is_empty() {
        return canonical_datetime(date);
    }
    if let Some(dt) = parse_datetime(&format!("{} {}", date, time)) {
        return Some(dt.format(DATETIME_FORMAT).to_string());
    }
    // Date already carries a time component; ignore the separate cell
    let day = parse_datetime(date)?.date();
    let time = TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(time, f).ok())?;
    Some(day.and_time(time).format(DATETIME_FORMAT).to_string())
}

/// True when `value` is before now
pub fn is_past(value: &str) -> bool {
    parse_datetime(value)
        .map(|dt| dt < Utc::now().naive_utc())
        .unwrap_or(false)
}

/// Normalize a money cell to two decimal places (`"100"` becomes `"100.00"`).
/// Currency symbols and thousands separators are dropped. Rounding is half-up
/// on the decimal digits as written.
pub fn format_price(value: &str) -> Option<String> {
    let cleaned: String = value
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let (whole, frac) = cleaned.split_once('.').unwrap_or((&cleaned, ""));
    if whole.is_empty() && frac.is_empty() {
        return None;
    }
    if !whole.bytes().chain(frac.bytes()).all(|b| b.is_ascii_digit()) {
        return None;
    }

    // Amount in cents, as decimal digits
    let mut cents: Vec<u8> = whole.bytes().collect();
    let mut frac = frac.bytes();
    cents.push(frac.next().unwrap_or(b'0'));
    cents.push(frac.next().unwrap_or(b'0'));
    if frac.next().is_some_and(|b| b >= b'5') {
        let mut carry = true;
        for digit in cents.iter_mut().rev() {
            if *digit == b'9' {
                *digit = b'0';
            } else {
                *digit += 1;
                carry = false;
                break;
            }
        }
        if carry {
            cents.insert(0, b'1');
        }
    }

    let split = cents.len() - 2;
    let units = std::str::from_utf8(&cents[..split]).ok()?.trim_start_matches('0');
    let hundredths = std::str::from_utf8(&cents[split..]).ok()?;
    Some(format!(
        "{}.{}",
        if units.is_empty() { "0" } else { units },
        hundredths
    ))
}

/// Parse an integer cell, tolerating a trailing `.0` from spreadsheets
pub fn parse_int(value: &str) -> Option<i64> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    value
        .parse::<i64>()
        .ok()
        .or_else(|| value.parse::<f64>().ok().map(|f| f.round() as i64))
}

/// Split a list cell. Pipes take precedence; otherwise commas separate items.
pub fn split_list(value: &str) -> Vec<String> {
    let separator = if value.contains('|') { '|' } else { ',' };
    value
        .split(separator)
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Wrap plain text in paragraph tags; HTML passes through untouched
pub fn to_html(value: &str) -> String {
    let value = value.trim();
    if value.is_empty() || value.starts_with('<') {
        return value.to_string();
    }
    value
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| format!("<p>{}</p>", line))
        .collect()
}

/// Render a pipe or comma list as an HTML bullet list
pub fn to_html_list(value: &str) -> Option<String> {
    let items = split_list(value);
    if items.is_empty() {
        return None;
    }
    let mut html = String::from("<ul>");
    for item in items {
        html.push_str("<li>");
        html.push_str(&item);
        html.push_str("</li>");
    }
    html.push_str("</ul>");
    Some(html)
}

/// Spreadsheet booleans: `true`, `yes` and `1` (any case) are true
pub fn parse_bool(value: &str) -> bool {
    matches!(
        value.trim().to_lowercase().as_str(),
        "true" | "yes" | "1"
    )
}

/// Upper-case a country list and use commas as the only separator
pub fn normalize_countries(value: &str) -> String {
    value
        .to_uppercase()
        .replace(';', ",")
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join(",")
}

/// ISO 3166-1 alpha-2 codes
const COUNTRY_CODES: &[&str] = &[
    "AD", "AE", "AF", "AG", "AI", "AL", "AM", "AO", "AQ", "AR", "AS", "AT", "AU", "AW", "AX", "AZ",
    "BA", "BB", "BD", "BE", "BF", "BG", "BH", "BI", "BJ", "BL", "BM", "BN", "BO", "BQ", "BR", "BS",
    "BT", "BV", "BW", "BY", "BZ", "CA", "CC", "CD", "CF", "CG", "CH", "CI", "CK", "CL", "CM", "CN",
    "CO", "CR", "CU", "CV", "CW", "CX", "CY", "CZ", "DE", "DJ", "DK", "DM", "DO", "DZ", "EC", "EE",
    "EG", "EH", "ER", "ES", "ET", "FI", "FJ", "FK", "FM", "FO", "FR", "GA", "GB", "GD", "GE", "GF",
    "GG", "GH", "GI", "GL", "GM", "GN", "GP", "GQ", "GR", "GS", "GT", "GU", "GW", "GY", "HK", "HM",
    "HN", "HR", "HT", "HU", "ID", "IE", "IL", "IM", "IN", "IO", "IQ", "IR", "IS", "IT", "JE", "JM",
    "JO", "JP", "KE", "KG", "KH", "KI", "KM", "KN", "KP", "KR", "KW", "KY", "KZ", "LA", "LB", "LC",
    "LI", "LK", "LR", "LS", "LT", "LU", "LV", "LY", "MA", "MC", "MD", "ME", "MF", "MG", "MH", "MK",
    "ML", "MM", "MN", "MO", "MP", "MQ", "MR", "MS", "MT", "MU", "MV", "MW", "MX", "MY", "MZ", "NA",
    "NC", "NE", "NF", "NG", "NI", "NL", "NO", "NP", "NR", "NU", "NZ", "OM", "PA", "PE", "PF", "PG",
    "PH", "PK", "PL", "PM", "PN", "PR", "PS", "PT", "PW", "PY", "QA", "RE", "RO", "RS", "RU", "RW",
    "SA", "SB", "SC", "SD", "SE", "SG", "SH", "SI", "SJ", "SK", "SL", "SM", "SN", "SO", "SR", "SS",
    "ST", "SV", "SX", "SY", "SZ", "TC", "TD", "TF", "TG", "TH", "TJ", "TK", "TL", "TM", "TN", "TO",
    "TR", "TT", "TV", "TW", "TZ", "UA", "UG", "UM", "US", "UY", "UZ", "VA", "VC", "VE", "VG", "VI",
    "VN", "VU", "WF", "WS", "YE", "YT", "ZA", "ZM", "ZW",
];

pub fn is_country_code(code: &str) -> bool {
    COUNTRY_CODES.binary_search(&code).is_ok()
}

pub fn is_uuid(value: &str) -> bool {
    uuid::Uuid::parse_str(value.trim()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key_is_idempotent() {
        assert_eq!(normalize_key(" Course Pacing "), "course_pacing");
        assert_eq!(normalize_key("course_pacing"), "course_pacing");
        assert_eq!(
            normalize_key(&normalize_key("Enrollment Track")),
            normalize_key("Enrollment Track")
        );
    }

    #[test]
    fn test_datetime_formats() {
        assert_eq!(
            canonical_datetime("2025-01-01").as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
        assert_eq!(
            canonical_datetime("01/15/2025 09:30").as_deref(),
            Some("2025-01-15T09:30:00Z")
        );
        assert_eq!(
            canonical_datetime("January 5, 2025").as_deref(),
            Some("2025-01-05T00:00:00Z")
        );
        assert_eq!(
            canonical_datetime("2025-01-01T09:00:00+02:00").as_deref(),
            Some("2025-01-01T07:00:00Z")
        );
        assert_eq!(canonical_datetime("soon"), None);
    }

    #[test]
    fn test_datetime_canonical_form_is_stable() {
        for input in ["2025-03-01 17:00:00", "03/01/2025", "2025-03-01T17:00:00Z"] {
            let once = canonical_datetime(input).unwrap();
            assert_eq!(canonical_datetime(&once).unwrap(), once);
        }
    }

    #[test]
    fn test_combine_date_time() {
        assert_eq!(
            combine_date_time("2025-01-01", "09:00:00").as_deref(),
            Some("2025-01-01T09:00:00Z")
        );
        assert_eq!(
            combine_date_time("2025-01-01", "").as_deref(),
            Some("2025-01-01T00:00:00Z")
        );
        assert_eq!(combine_date_time("", "09:00"), None);
    }

    #[test]
    fn test_format_price() {
        assert_eq!(format_price("100").as_deref(), Some("100.00"));
        assert_eq!(format_price("$1,499.5").as_deref(), Some("1499.50"));
        assert_eq!(format_price(""), None);
        assert_eq!(format_price("free"), None);
        assert_eq!(format_price("-5"), None);
    }

    #[test]
    fn test_price_rounds_half_up_on_decimal_digits() {
        assert_eq!(format_price("0.005").as_deref(), Some("0.01"));
        assert_eq!(format_price("1.005").as_deref(), Some("1.01"));
        assert_eq!(format_price("2.675").as_deref(), Some("2.68"));
        assert_eq!(format_price("0.004").as_deref(), Some("0.00"));
        assert_eq!(format_price("99.995").as_deref(), Some("100.00"));
        assert_eq!(format_price(".5").as_deref(), Some("0.50"));
        assert_eq!(format_price("007").as_deref(), Some("7.00"));
        assert_eq!(
            format_price("12345678901234567890.99").as_deref(),
            Some("12345678901234567890.99")
        );
        assert_eq!(format_price("."), None);
        assert_eq!(format_price("1.2.3"), None);
    }

    #[test]
    fn test_split_list() {
        assert_eq!(split_list("a | b |  "), ["a", "b"]);
        assert_eq!(split_list("en-us, es"), ["en-us", "es"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn test_to_html() {
        assert_eq!(to_html("Line one\nLine two"), "<p>Line one</p><p>Line two</p>");
        assert_eq!(to_html("<ul><li>x</li></ul>"), "<ul><li>x</li></ul>");
        assert_eq!(
            to_html_list("Algebra|Calculus").as_deref(),
            Some("<ul><li>Algebra</li><li>Calculus</li></ul>")
        );
    }

    #[test]
    fn test_countries() {
        assert_eq!(normalize_countries("us;ca"), "US,CA");
        assert_eq!(normalize_countries(" us , ca ;"), "US,CA");
        assert!(is_country_code("US"));
        assert!(!is_country_code("XX"));
    }

    #[test]
    fn test_parse_int_tolerates_floats() {
        assert_eq!(parse_int("8"), Some(8));
        assert_eq!(parse_int("8.0"), Some(8));
        assert_eq!(parse_int("eight"), None);
    }
}
