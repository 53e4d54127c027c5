//! Operation / reference number extraction

use once_cell::sync::Lazy;
use regex::Regex;

use super::collapse_whitespace;

/// "Nro. de operación 07397334" (Yape and bank transfers)
static LABELLED_OPERATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:Nro\.?\s*de\s*operaci[oó]n|operaci[oó]n)[:\s]*(\d{6,12})")
        .expect("Invalid operation number regex")
});

/// "Orden: 123456789" (ride-hailing apps)
static ORDER_NUMBER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:orden|order|pedido)[:\s]*(\d{6,15})").expect("Invalid order number regex")
});

static LONG_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{8,15})\b").expect("Invalid long number regex"));

/// Returns the first operation number by pattern priority
pub fn extract_operation_number(text: &str) -> Option<String> {
    let clean = collapse_whitespace(text);
    [&LABELLED_OPERATION, &ORDER_NUMBER, &LONG_NUMBER]
        .iter()
        .find_map(|pattern| {
            pattern
                .captures(&clean)
                .and_then(|caps| caps.get(1))
                .map(|m| m.as_str().to_string())
        })
}
