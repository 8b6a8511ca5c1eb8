//! Number formatting for `xsl:number`.
//!
//! A format string such as `1.a)` splits into alternating alphanumeric tokens and
//! punctuation. Each number in the list is formatted by the token in the same position,
//! the last token being reused once they run out; punctuation before the first token
//! and after the last one is copied around the whole list.

/// Which nodes `xsl:number` counts when it has no `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumberLevel {
    Single,
    Multiple,
    Any,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterValue {
    Alphabetic,
    Traditional,
}

impl std::str::FromStr for LetterValue {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "alphabetic" => Ok(LetterValue::Alphabetic),
            "traditional" => Ok(LetterValue::Traditional),
            other => Err(format!(
                "letter-value must be 'alphabetic' or 'traditional', not '{}'",
                other
            )),
        }
    }
}

/// Digit grouping for decimal tokens, from `grouping-separator` and `grouping-size`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grouping {
    pub separator: String,
    pub size: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NumberFormat {
    prefix: String,
    tokens: Vec<String>,
    /// `separators[i]` goes between the numbers formatted by tokens `i` and `i + 1`.
    separators: Vec<String>,
    suffix: String,
}

impl NumberFormat {
    pub fn parse(format: &str) -> Self {
        let mut runs: Vec<(bool, String)> = Vec::new();
        for c in format.chars() {
            let alphanumeric = c.is_alphanumeric();
            match runs.last_mut() {
                Some((kind, run)) if *kind == alphanumeric => run.push(c),
                _ => runs.push((alphanumeric, c.to_string())),
            }
        }
        let mut prefix = String::new();
        let mut suffix = String::new();
        if matches!(runs.first(), Some((false, _))) {
            prefix = runs.remove(0).1;
        }
        if matches!(runs.last(), Some((false, _))) {
            suffix = runs.pop().map(|(_, run)| run).unwrap_or_default();
        }
        let (tokens, separators): (Vec<_>, Vec<_>) = runs.into_iter().partition(|(kind, _)| *kind);
        let mut tokens: Vec<String> = tokens.into_iter().map(|(_, run)| run).collect();
        if tokens.is_empty() {
            tokens.push("1".to_string());
        }
        Self {
            prefix,
            tokens,
            separators: separators.into_iter().map(|(_, run)| run).collect(),
            suffix,
        }
    }

    pub fn format(
        &self,
        numbers: &[u64],
        grouping: Option<&Grouping>,
        letter_value: Option<LetterValue>,
    ) -> String {
        let mut out = self.prefix.clone();
        for (i, &number) in numbers.iter().enumerate() {
            if i > 0 {
                let separator = self
                    .separators
                    .get(i - 1)
                    .or(self.separators.last())
                    .map_or(".", String::as_str);
                out.push_str(separator);
            }
            let token = &self.tokens[i.min(self.tokens.len() - 1)];
            out.push_str(&format_token(number, token, grouping, letter_value));
        }
        out.push_str(&self.suffix);
        out
    }
}

fn format_token(
    number: u64,
    token: &str,
    grouping: Option<&Grouping>,
    letter_value: Option<LetterValue>,
) -> String {
    match token {
        "a" | "A" if number > 0 => alphabetic(number, token == "A"),
        "i" | "I" if letter_value == Some(LetterValue::Alphabetic) && number > 0 => {
            alphabetic(number, token == "I")
        }
        "i" if (1..5000).contains(&number) => roman(number).to_lowercase(),
        "I" if (1..5000).contains(&number) => roman(number),
        _ => {
            let width = if is_decimal_token(token) {
                token.len()
            } else {
                1
            };
            decimal(number, width, grouping)
        }
    }
}

/// `1`, `01`, `001` and so on.
fn is_decimal_token(token: &str) -> bool {
    token.ends_with('1') && token[..token.len() - 1].bytes().all(|b| b == b'0')
}

fn decimal(number: u64, width: usize, grouping: Option<&Grouping>) -> String {
    let digits = format!("{:0width$}", number, width = width);
    let Some(grouping) = grouping.filter(|g| g.size > 0 && !g.separator.is_empty()) else {
        return digits;
    };
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % grouping.size == 0 {
            out.push_str(&grouping.separator);
        }
        out.push(c);
    }
    out
}

/// a, b, ... z, aa, ab, ...
fn alphabetic(mut number: u64, upper: bool) -> String {
    let base = if upper { b'A' } else { b'a' };
    let mut letters = Vec::new();
    while number > 0 {
        number -= 1;
        letters.push((base + (number % 26) as u8) as char);
        number /= 26;
    }
    letters.iter().rev().collect()
}

fn roman(mut number: u64) -> String {
    const NUMERALS: &[(u64, &str)] = &[
        (1000, "M"),
        (900, "CM"),
        (500, "D"),
        (400, "CD"),
        (100, "C"),
        (90, "XC"),
        (50, "L"),
        (40, "XL"),
        (10, "X"),
        (9, "IX"),
        (5, "V"),
        (4, "IV"),
        (1, "I"),
    ];
    let mut out = String::new();
    for &(value, numeral) in NUMERALS {
        while number >= value {
            out.push_str(numeral);
            number -= value;
        }
    }
    out
}
