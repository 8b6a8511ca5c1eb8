//! `xsl:decimal-format` declarations and the `format-number()` pattern language.
//!
//! A pattern such as `#,##0.00;(#,##0.00)` has a positive sub-pattern and an optional
//! negative one. Each sub-pattern is a prefix, an integer part, an optional fraction
//! part and a suffix. Which characters are special is set by the decimal format in use.

use std::collections::HashMap;
use weft_tree::NameId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecimalFormat {
    pub decimal_separator: char,
    pub grouping_separator: char,
    pub infinity: String,
    pub minus_sign: char,
    pub nan: String,
    pub percent: char,
    pub per_mille: char,
    pub zero_digit: char,
    pub digit: char,
    pub pattern_separator: char,
}

impl Default for DecimalFormat {
    fn default() -> Self {
        Self {
            decimal_separator: '.',
            grouping_separator: ',',
            infinity: "Infinity".to_string(),
            minus_sign: '-',
            nan: "NaN".to_string(),
            percent: '%',
            per_mille: '\u{2030}',
            zero_digit: '0',
            digit: '#',
            pattern_separator: ';',
        }
    }
}

/// The default decimal format and the named ones.
#[derive(Debug, Clone, Default)]
pub struct DecimalFormats {
    default: DecimalFormat,
    default_declared: bool,
    named: HashMap<NameId, DecimalFormat>,
}

impl DecimalFormats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a format. Declaring the same name twice with different values is an
    /// error, returned as a message.
    pub fn declare(&mut self, name: Option<NameId>, format: DecimalFormat) -> Result<(), String> {
        let existing = match name {
            Some(name) => self.named.get(&name),
            None => self.default_declared.then_some(&self.default),
        };
        if let Some(existing) = existing {
            if *existing != format {
                return Err("conflicting xsl:decimal-format declarations".to_string());
            }
            return Ok(());
        }
        match name {
            Some(name) => {
                self.named.insert(name, format);
            }
            None => {
                self.default = format;
                self.default_declared = true;
            }
        }
        Ok(())
    }

    /// The format called `name`, or the default one for `None`.
    pub fn get(&self, name: Option<NameId>) -> Option<&DecimalFormat> {
        match name {
            Some(name) => self.named.get(&name),
            None => Some(&self.default),
        }
    }
}

#[derive(Debug, Default)]
struct SubPattern {
    prefix: String,
    suffix: String,
    min_integer: usize,
    grouping: usize,
    min_fraction: usize,
    max_fraction: usize,
    multiplier: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Prefix,
    Integer,
    Fraction,
    Suffix,
}

impl DecimalFormat {
    fn is_active(&self, c: char) -> bool {
        c == self.digit
            || c == self.zero_digit
            || c == self.grouping_separator
            || c == self.decimal_separator
    }

    /// Percent and per-mille signs in a prefix or suffix scale the number.
    fn push_affix(&self, affix: &mut String, multiplier: &mut f64, c: char) {
        if c == self.percent {
            *multiplier = 100.0;
        } else if c == self.per_mille {
            *multiplier = 1000.0;
        }
        affix.push(c);
    }

    fn parse_sub_pattern(&self, text: &str) -> Result<SubPattern, String> {
        let mut sub = SubPattern {
            multiplier: 1.0,
            ..SubPattern::default()
        };
        let mut phase = Phase::Prefix;
        let mut digits = 0;
        let mut since_group: Option<usize> = None;
        for c in text.chars() {
            if phase == Phase::Prefix && self.is_active(c) {
                phase = Phase::Integer;
            }
            match phase {
                Phase::Prefix | Phase::Suffix => {
                    if phase == Phase::Suffix && self.is_active(c) {
                        return Err(format!("'{}' is out of place in format pattern '{}'", c, text));
                    }
                    let affix = if phase == Phase::Prefix {
                        &mut sub.prefix
                    } else {
                        &mut sub.suffix
                    };
                    self.push_affix(affix, &mut sub.multiplier, c);
                }
                Phase::Integer => {
                    if c == self.digit || c == self.zero_digit {
                        if c == self.zero_digit {
                            sub.min_integer += 1;
                        } else if sub.min_integer > 0 {
                            return Err(format!("'{}' follows '{}' in format pattern '{}'", c, self.zero_digit, text));
                        }
                        digits += 1;
                        since_group = since_group.map(|n| n + 1);
                    } else if c == self.grouping_separator {
                        since_group = Some(0);
                    } else if c == self.decimal_separator {
                        phase = Phase::Fraction;
                    } else {
                        phase = Phase::Suffix;
                        self.push_affix(&mut sub.suffix, &mut sub.multiplier, c);
                    }
                }
                Phase::Fraction => {
                    if c == self.zero_digit {
                        if sub.max_fraction > sub.min_fraction {
                            return Err(format!("'{}' follows '{}' in format pattern '{}'", c, self.digit, text));
                        }
                        sub.min_fraction += 1;
                        sub.max_fraction += 1;
                        digits += 1;
                    } else if c == self.digit {
                        sub.max_fraction += 1;
                        digits += 1;
                    } else if self.is_active(c) {
                        return Err(format!("'{}' is out of place in format pattern '{}'", c, text));
                    } else {
                        phase = Phase::Suffix;
                        self.push_affix(&mut sub.suffix, &mut sub.multiplier, c);
                    }
                }
            }
        }
        if digits == 0 {
            return Err(format!("format pattern '{}' has no digits", text));
        }
        sub.grouping = since_group.unwrap_or(0);
        Ok(sub)
    }

    /// Formats `number` by `pattern`, as `format-number()` does.
    pub fn format(&self, number: f64, pattern: &str) -> Result<String, String> {
        let mut parts = pattern.split(self.pattern_separator);
        let positive = self.parse_sub_pattern(parts.next().unwrap_or_default())?;
        let negative = match parts.next() {
            Some(text) => Some(self.parse_sub_pattern(text)?),
            None => None,
        };
        if parts.next().is_some() {
            return Err(format!("format pattern '{}' has more than two parts", pattern));
        }
        if number.is_nan() {
            return Ok(self.nan.clone());
        }
        let (prefix, suffix) = match (number < 0.0, &negative) {
            (false, _) => (positive.prefix.clone(), positive.suffix.clone()),
            (true, Some(negative)) => (negative.prefix.clone(), negative.suffix.clone()),
            (true, None) => (
                format!("{}{}", self.minus_sign, positive.prefix),
                positive.suffix.clone(),
            ),
        };
        if number.is_infinite() {
            return Ok(format!("{}{}{}", prefix, self.infinity, suffix));
        }
        let value = number.abs() * positive.multiplier;
        let fixed = format!("{:.*}", positive.max_fraction, value);
        let (integer, fraction) = fixed.split_once('.').unwrap_or((&fixed, ""));
        let mut integer = integer.trim_start_matches('0').to_string();
        while integer.len() < positive.min_integer {
            integer.insert(0, '0');
        }
        let mut fraction = fraction.to_string();
        while fraction.len() > positive.min_fraction && fraction.ends_with('0') {
            fraction.pop();
        }
        if integer.is_empty() && fraction.is_empty() {
            integer.push('0');
        }

        let mut out = prefix;
        let grouping = positive.grouping;
        for (i, d) in integer.chars().enumerate() {
            if grouping > 0 && i > 0 && (integer.len() - i) % grouping == 0 {
                out.push(self.grouping_separator);
            }
            out.push(self.localize(d));
        }
        if !fraction.is_empty() {
            out.push(self.decimal_separator);
            out.extend(fraction.chars().map(|d| self.localize(d)));
        }
        out.push_str(&suffix);
        Ok(out)
    }

    /// Maps an ASCII digit onto this format's digit family.
    fn localize(&self, digit: char) -> char {
        digit
            .to_digit(10)
            .and_then(|d| char::from_u32(self.zero_digit as u32 + d))
            .unwrap_or(digit)
    }
}
