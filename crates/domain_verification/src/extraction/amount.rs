//! Amount extraction
//!
//! Every rule is a `(pattern, priority)` pair evaluated in the declared order
//! of [`RULES`]. All matches become candidates; the winner is chosen by
//! [`AmountExtractor::rank`], never by evaluation order. Invoice-style
//! totals are looked at first and win outright when they yield an amount.

use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{collapse_whitespace, parse_amount, AmountRange};

/// Priority assigned to amounts read from an invoice breakdown
const INVOICE_PRIORITY: u8 = 20;

/// Candidates must fall strictly inside (0, 10000)
const UPPER_BOUND: Decimal = dec!(10000);

/// Which rule produced a candidate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmountRule {
    /// Invoice taxable base (OP. GRAVADA, BASE IMPONIBLE, SUBTOTAL, exempt)
    InvoiceBase,
    /// Invoice grand total
    InvoiceTotal,
    /// "yape"/"total"/"monto" ... followed by `S/ 20`
    KeywordCurrency,
    /// `S/ 20` at the start of a line
    LineStartCurrency,
    /// `5/ 20`, the currency glyph misread as a five
    MisreadCurrencyGlyph,
    /// "total: 22.30" with optional currency
    KeywordLabel,
    /// `PEN7`, `USD 10`, `$ 20`
    CurrencyPrefix,
    /// `7 S/`, `10 PEN`, `22 soles`
    CurrencySuffix,
    /// `155/` read as `15S/`
    TrailingGlyph,
    /// `S/ 1.234,50` with thousands separators
    Grouped,
    /// Any bare `22.30`
    BareDecimal,
    /// Last resort: any 1-4 digit integer
    BareInteger,
}

impl AmountRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            AmountRule::InvoiceBase => "invoice_base",
            AmountRule::InvoiceTotal => "invoice_total",
            AmountRule::KeywordCurrency => "keyword_currency",
            AmountRule::LineStartCurrency => "line_start_currency",
            AmountRule::MisreadCurrencyGlyph => "misread_currency_glyph",
            AmountRule::KeywordLabel => "keyword_label",
            AmountRule::CurrencyPrefix => "currency_prefix",
            AmountRule::CurrencySuffix => "currency_suffix",
            AmountRule::TrailingGlyph => "trailing_glyph",
            AmountRule::Grouped => "grouped",
            AmountRule::BareDecimal => "bare_decimal",
            AmountRule::BareInteger => "bare_integer",
        }
    }
}

/// A possible amount found in the text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmountCandidate {
    pub value: Decimal,
    pub rule: AmountRule,
    pub priority: u8,
    /// Set when the value was produced by rescaling a bare 3-digit number
    pub heuristic: bool,
}

/// Amounts read from a formal invoice (boleta / factura)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceBreakdown {
    /// Taxable base, or exempt amount when there is no taxable base
    pub base: Option<Decimal>,
    /// IGV
    pub tax: Option<Decimal>,
    pub total: Option<Decimal>,
}

impl InvoiceBreakdown {
    /// The amount compared against the report: base when present, else total
    pub fn detected(&self) -> Option<AmountCandidate> {
        let (value, rule) = match (self.base, self.total) {
            (Some(base), _) => (base, AmountRule::InvoiceBase),
            (None, Some(total)) => (total, AmountRule::InvoiceTotal),
            (None, None) => return None,
        };
        Some(AmountCandidate {
            value,
            rule,
            priority: INVOICE_PRIORITY,
            heuristic: false,
        })
    }
}

/// Which form of the text a rule runs against
#[derive(Debug, Clone, Copy)]
enum Input {
    /// Whitespace collapsed to single spaces
    Collapsed,
    /// Original text, so `^` can anchor at line starts
    Lines,
}

/// How a captured number turns into a value
#[derive(Debug, Clone, Copy)]
enum Reading {
    Plain,
    Grouped,
    TrailingGlyph,
}

struct Rule {
    kind: AmountRule,
    pattern: &'static Lazy<Regex>,
    priority: u8,
    input: Input,
    reading: Reading,
}

static KEYWORD_CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:yape|total|monto|precio|amount|pagaste)[^\d]*(?:S/\.?|S\s*/)\s*(\d{1,4}(?:[.,]\d{1,2})?)")
        .expect("Invalid keyword currency regex")
});

static LINE_START_CURRENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)^\s*(?:S/\.?|S\s*/)\s*(\d{1,4}(?:[.,]\d{1,2})?)")
        .expect("Invalid line start currency regex")
});

static MISREAD_GLYPH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?mi)(?:^|yape|total)\s*5\s*/\s*(\d{1,4}(?:[.,]\d{1,2})?)")
        .expect("Invalid misread glyph regex")
});

static KEYWORD_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:total|monto|amount|price|precio|costo|cost)[:\s]*(?:S/\.?|PEN|USD|\$)?\s*(\d{1,4}(?:[.,]\d{2})?)")
        .expect("Invalid keyword label regex")
});

static CURRENCY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:PEN|USD|S\s*/\.?|\$)\s*(\d{1,5}(?:[.,]\d{1,2})?)")
        .expect("Invalid currency prefix regex")
});

static CURRENCY_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d{1,5}(?:[.,]\d{1,2})?)\s*(?:S/|PEN|USD|soles?)")
        .expect("Invalid currency suffix regex")
});

static TRAILING_GLYPH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{2,3})/(?:\D|$)").expect("Invalid trailing glyph regex"));

static GROUPED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:S/\.?|soles?|USD|\$)\s*(\d{1,3}(?:[.,]\d{3})*(?:[.,]\d{2})?)")
        .expect("Invalid grouped amount regex")
});

static BARE_DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,4}[.,]\d{2})\b").expect("Invalid bare decimal regex"));

static BARE_INTEGER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,4})\b").expect("Invalid bare integer regex"));

static INVOICE_BASE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:OP\.?\s*GRAVADA|BASE\s*IMPONIBLE|SUBTOTAL|GRAVADA)[:\s]*(?:S/\.?|PEN)?\s*(\d{1,5}(?:[.,]\d{2})?)")
        .expect("Invalid invoice base regex")
});

static INVOICE_BASE_SYMBOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)GRAVADA\s*S/\s*(\d{1,5}(?:[.,]\d{2})?)").expect("Invalid invoice base regex")
});

static INVOICE_EXEMPT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:OP\.?\s*EXO|EXONERADA?|OP\.?\s*INAFECTA?)[:\s]*(?:S/\.?|PEN)?\s*(\d{1,5}(?:[.,]\d{2})?)")
        .expect("Invalid invoice exempt regex")
});

static INVOICE_TAX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)IGV\s*(?:S/\.?|PEN)?\s*(\d{1,5}(?:[.,]\d{2})?)").expect("Invalid invoice tax regex")
});

static INVOICE_TOTAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:IMPORTE\s*TOTAL|TOTAL)[:\s]*(?:S/\.?|PEN)?\s*(\d{1,5}(?:[.,]\d{2})?)")
        .expect("Invalid invoice total regex")
});

static INVOICE_TOTAL_SYMBOL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)TOTAL\s*S/\s*(\d{1,5}(?:[.,]\d{2})?)").expect("Invalid invoice total regex")
});

/// Generic rules in declaration order. Adding a rule here never changes how
/// existing candidates rank against each other.
static RULES: [Rule; 9] = [
    Rule { kind: AmountRule::KeywordCurrency, pattern: &KEYWORD_CURRENCY, priority: 10, input: Input::Collapsed, reading: Reading::Plain },
    Rule { kind: AmountRule::LineStartCurrency, pattern: &LINE_START_CURRENCY, priority: 10, input: Input::Lines, reading: Reading::Plain },
    Rule { kind: AmountRule::MisreadCurrencyGlyph, pattern: &MISREAD_GLYPH, priority: 9, input: Input::Lines, reading: Reading::Plain },
    Rule { kind: AmountRule::KeywordLabel, pattern: &KEYWORD_LABEL, priority: 8, input: Input::Collapsed, reading: Reading::Plain },
    Rule { kind: AmountRule::CurrencyPrefix, pattern: &CURRENCY_PREFIX, priority: 6, input: Input::Collapsed, reading: Reading::Plain },
    Rule { kind: AmountRule::CurrencySuffix, pattern: &CURRENCY_SUFFIX, priority: 5, input: Input::Collapsed, reading: Reading::Plain },
    Rule { kind: AmountRule::TrailingGlyph, pattern: &TRAILING_GLYPH, priority: 5, input: Input::Collapsed, reading: Reading::TrailingGlyph },
    Rule { kind: AmountRule::Grouped, pattern: &GROUPED, priority: 3, input: Input::Collapsed, reading: Reading::Grouped },
    Rule { kind: AmountRule::BareDecimal, pattern: &BARE_DECIMAL, priority: 1, input: Input::Collapsed, reading: Reading::Plain },
];

/// Ranks amount candidates found in recognized text
#[derive(Debug, Clone, Default)]
pub struct AmountExtractor {
    typical: AmountRange,
}

impl AmountExtractor {
    pub fn new(typical: AmountRange) -> Self {
        Self { typical }
    }

    /// The best amount in the text, invoice breakdown first
    pub fn best(&self, text: &str) -> Option<AmountCandidate> {
        if let Some(invoice) = self.invoice_breakdown(text).and_then(|i| i.detected()) {
            return Some(invoice);
        }
        self.candidates(text).into_iter().next()
    }

    /// All generic candidates, best first
    pub fn candidates(&self, text: &str) -> Vec<AmountCandidate> {
        let collapsed = collapse_whitespace(text);
        let mut found = Vec::new();

        for rule in RULES.iter() {
            let haystack = match rule.input {
                Input::Collapsed => collapsed.as_str(),
                Input::Lines => text,
            };
            for caps in rule.pattern.captures_iter(haystack) {
                let Some(raw) = caps.get(1).map(|m| m.as_str()) else {
                    continue;
                };
                if let Some(value) = self.read(rule.reading, raw) {
                    found.push(AmountCandidate {
                        value,
                        rule: rule.kind,
                        priority: rule.priority,
                        heuristic: false,
                    });
                }
            }
        }

        if found.is_empty() {
            found = self.bare_integers(&collapsed);
        }

        found.sort_by(|a, b| self.rank(a, b));
        found
    }

    /// Explicit comparator: priority, then typical range, then smaller value
    pub fn rank(&self, a: &AmountCandidate, b: &AmountCandidate) -> Ordering {
        b.priority
            .cmp(&a.priority)
            .then_with(|| self.typical.contains(b.value).cmp(&self.typical.contains(a.value)))
            .then_with(|| a.value.cmp(&b.value))
    }

    /// Base / tax / total fields of an invoice, if any are present
    pub fn invoice_breakdown(&self, text: &str) -> Option<InvoiceBreakdown> {
        let clean = collapse_whitespace(text).to_uppercase();

        let base = first_positive(&[&INVOICE_BASE, &INVOICE_BASE_SYMBOL], &clean)
            .or_else(|| first_positive(&[&INVOICE_EXEMPT], &clean));
        let breakdown = InvoiceBreakdown {
            base,
            tax: first_positive(&[&INVOICE_TAX], &clean),
            total: first_positive(&[&INVOICE_TOTAL, &INVOICE_TOTAL_SYMBOL], &clean),
        };

        if breakdown == InvoiceBreakdown::default() {
            None
        } else {
            Some(breakdown)
        }
    }

    fn read(&self, reading: Reading, raw: &str) -> Option<Decimal> {
        match reading {
            Reading::Plain => parse_amount(raw).filter(|v| in_bounds(*v)),
            Reading::Grouped => parse_grouped(raw).filter(|v| in_bounds(*v)),
            Reading::TrailingGlyph => {
                let stripped = raw.strip_suffix('5')?;
                parse_amount(stripped).filter(|v| self.typical.contains(*v))
            }
        }
    }

    fn bare_integers(&self, collapsed: &str) -> Vec<AmountCandidate> {
        BARE_INTEGER
            .captures_iter(collapsed)
            .filter_map(|caps| parse_amount(caps.get(1)?.as_str()))
            .filter(|v| *v >= dec!(5) && *v < dec!(1000))
            .map(|v| {
                // 750 is assumed to be 7.50 with a lost decimal point
                let heuristic = v >= dec!(100);
                AmountCandidate {
                    value: if heuristic { v / dec!(100) } else { v },
                    rule: AmountRule::BareInteger,
                    priority: 0,
                    heuristic,
                }
            })
            .collect()
    }
}

fn in_bounds(value: Decimal) -> bool {
    value > Decimal::ZERO && value < UPPER_BOUND
}

fn first_positive(patterns: &[&Lazy<Regex>], text: &str) -> Option<Decimal> {
    patterns.iter().find_map(|pattern| {
        pattern
            .captures(text)
            .and_then(|caps| parse_amount(caps.get(1)?.as_str()))
            .filter(|v| *v > Decimal::ZERO)
    })
}

/// Reads `1.234,50` / `1,234.50` / `22.30`: a trailing two-digit group is the
/// fraction, every other separator is a thousands mark
fn parse_grouped(raw: &str) -> Option<Decimal> {
    let bytes = raw.as_bytes();
    let n = bytes.len();
    let (int_part, frac) = if n >= 3 && matches!(bytes[n - 3], b'.' | b',') {
        (&raw[..n - 3], &raw[n - 2..])
    } else {
        (raw, "")
    };
    let digits: String = int_part.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    if frac.is_empty() {
        parse_amount(&digits)
    } else {
        parse_amount(&format!("{}.{}", digits, frac))
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn extraction_is_deterministic(text in "[ a-zA-Z0-9/.,:$\n]{0,80}") {
            let extractor = AmountExtractor::default();
            prop_assert_eq!(extractor.candidates(&text), extractor.candidates(&text));
            prop_assert_eq!(extractor.best(&text), extractor.best(&text));
        }

        #[test]
        fn candidates_are_sorted_by_rank(text in "[ a-zA-Z0-9/.,:$\n]{0,80}") {
            let extractor = AmountExtractor::default();
            let candidates = extractor.candidates(&text);
            for pair in candidates.windows(2) {
                prop_assert_ne!(extractor.rank(&pair[0], &pair[1]), Ordering::Greater);
            }
        }

        #[test]
        fn prefixed_amounts_are_found(cents in 500u32..20000u32) {
            let value = Decimal::new(cents as i64, 2);
            let text = format!("Total S/ {:.2}", value);
            let best = AmountExtractor::default().best(&text).unwrap();
            prop_assert_eq!(best.value, value);
        }
    }
}
