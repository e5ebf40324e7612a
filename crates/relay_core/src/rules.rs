use std::collections::BTreeSet;

use regex::Regex;
use relay_logging::relay_warn;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;

use crate::RegistryError;

/// One find/replace step. `find` is a regular expression, `replace` uses the
/// `$1` / `$&` / `$<name>` / `$$` template convention.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementRule {
    pub find: String,
    #[serde(default)]
    pub replace: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    /// 1-based site numbers; empty means the rule is global.
    #[serde(default, alias = "sites", deserialize_with = "scope_from_list_or_text")]
    pub scope_sites: BTreeSet<usize>,
}

fn enabled_by_default() -> bool {
    true
}

impl ReplacementRule {
    pub fn new(find: impl Into<String>, replace: impl Into<String>) -> Self {
        Self {
            find: find.into(),
            replace: replace.into(),
            enabled: true,
            scope_sites: BTreeSet::new(),
        }
    }

    pub fn scoped(mut self, sites: impl IntoIterator<Item = usize>) -> Self {
        self.scope_sites = sites.into_iter().collect();
        self
    }

    pub fn applies_to(&self, site_number: usize) -> bool {
        self.scope_sites.is_empty() || self.scope_sites.contains(&site_number)
    }

    /// Compiles the find pattern. `index` is only used to label the error.
    pub fn compile(&self, index: usize) -> Result<Regex, RuleCompileError> {
        if self.find.trim().is_empty() {
            return Err(RuleCompileError::Empty { index });
        }
        Regex::new(&self.find).map_err(|err| RuleCompileError::Invalid {
            index,
            pattern: self.find.clone(),
            message: err.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleCompileError {
    #[error("rule #{}: find pattern is empty", .index + 1)]
    Empty { index: usize },
    #[error("rule #{}: invalid regex {pattern:?}: {message}", .index + 1)]
    Invalid {
        index: usize,
        pattern: String,
        message: String,
    },
}

/// Applies every enabled, in-scope rule to `text` in list order.
///
/// Each applicable rule replaces all non-overlapping matches. Rules whose
/// pattern is empty or fails to compile are skipped with a warning.
pub fn apply_rules(text: &str, site_number: usize, rules: &[ReplacementRule]) -> String {
    let mut current = text.to_string();
    for (index, rule) in rules.iter().enumerate() {
        if !rule.enabled || !rule.applies_to(site_number) {
            continue;
        }
        match rule.compile(index) {
            Ok(re) => {
                let template = to_regex_template(&rule.replace, &re);
                current = re.replace_all(&current, template.as_str()).into_owned();
            }
            Err(RuleCompileError::Empty { .. }) => {}
            Err(err) => relay_warn!("Replacement {err}; skipped"),
        }
    }
    current
}

/// Ordered list of replacement rules as stored under one store key.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleList {
    rules: Vec<ReplacementRule>,
}

impl RuleList {
    pub fn new(rules: Vec<ReplacementRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[ReplacementRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Appends an enabled, global rule and returns its index.
    pub fn add(&mut self, find: impl Into<String>, replace: impl Into<String>) -> usize {
        self.push(ReplacementRule::new(find, replace))
    }

    pub fn push(&mut self, rule: ReplacementRule) -> usize {
        self.rules.push(rule);
        self.rules.len() - 1
    }

    pub fn update(&mut self, index: usize, rule: ReplacementRule) -> Result<(), RegistryError> {
        let slot = self
            .rules
            .get_mut(index)
            .ok_or(RegistryError::OutOfRange { index })?;
        *slot = rule;
        Ok(())
    }

    pub fn set_enabled(&mut self, index: usize, enabled: bool) -> Result<(), RegistryError> {
        let rule = self
            .rules
            .get_mut(index)
            .ok_or(RegistryError::OutOfRange { index })?;
        rule.enabled = enabled;
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> Result<ReplacementRule, RegistryError> {
        if index >= self.rules.len() {
            return Err(RegistryError::OutOfRange { index });
        }
        Ok(self.rules.remove(index))
    }

    /// Problem with the rule at `index` that would make it skipped at
    /// apply time; `None` for a usable rule or a missing index.
    pub fn check(&self, index: usize) -> Option<RuleCompileError> {
        self.rules.get(index)?.compile(index).err()
    }

    /// Reports every rule whose pattern would be skipped at apply time.
    pub fn check_all(&self) -> Vec<RuleCompileError> {
        self.rules
            .iter()
            .enumerate()
            .filter_map(|(index, rule)| rule.compile(index).err())
            .collect()
    }

    pub fn apply(&self, text: &str, site_number: usize) -> String {
        apply_rules(text, site_number, &self.rules)
    }
}

/// Ranges in a site scope are cut to at most this many sites.
const MAX_SCOPE_RANGE: usize = 10_000;

/// Parses a site scope such as `"2-4, 1, 7"` into 1-based site numbers.
///
/// Zero, reversed ranges and unparsable parts are ignored. Ranges longer
/// than `MAX_SCOPE_RANGE` keep only their first `MAX_SCOPE_RANGE` numbers.
pub fn parse_site_numbers(raw: &str) -> BTreeSet<usize> {
    let mut numbers = BTreeSet::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if let Some((start, end)) = part.split_once('-') {
            if let (Ok(start), Ok(end)) = (start.trim().parse::<usize>(), end.trim().parse::<usize>())
            {
                if start > 0 && start <= end {
                    let last = end.min(start.saturating_add(MAX_SCOPE_RANGE - 1));
                    if last < end {
                        relay_warn!("Site range {part} cut to {start}-{last}");
                    }
                    numbers.extend(start..=last);
                }
            }
        } else if let Ok(number) = part.parse::<usize>() {
            if number > 0 {
                numbers.insert(number);
            }
        }
    }
    numbers
}

/// Formats site numbers back into the compact range form, e.g. `"1-3, 7"`.
pub fn format_site_numbers(numbers: &BTreeSet<usize>) -> String {
    let mut parts = Vec::new();
    let mut iter = numbers.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while iter.peek() == Some(&(end + 1)) {
            end += 1;
            iter.next();
        }
        if start == end {
            parts.push(start.to_string());
        } else {
            parts.push(format!("{start}-{end}"));
        }
    }
    parts.join(", ")
}

fn scope_from_list_or_text<'de, D>(deserializer: D) -> Result<BTreeSet<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scope {
        List(BTreeSet<usize>),
        Text(String),
    }

    Ok(match Option::<Scope>::deserialize(deserializer)? {
        Some(Scope::List(list)) => list.into_iter().filter(|n| *n > 0).collect(),
        Some(Scope::Text(text)) => parse_site_numbers(&text),
        None => BTreeSet::new(),
    })
}

/// Rewrites `$1`, `$&`, `$<name>` and `$$` into the `${..}` form the regex
/// crate expands. References to groups `re` does not have stay literal, and
/// `$nn` falls back to group `n` followed by a literal digit.
fn to_regex_template(raw: &str, re: &Regex) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    let mut literal_start = 0;
    let mut i = 0;
    while i < raw.len() {
        if raw.as_bytes()[i] != b'$' {
            i += 1;
            continue;
        }
        out.push_str(&raw[literal_start..i]);
        let (consumed, piece) = expand_dollar(&raw[i + 1..], re);
        out.push_str(&piece);
        i += 1 + consumed;
        literal_start = i;
    }
    out.push_str(&raw[literal_start..]);
    out
}

fn expand_dollar(rest: &str, re: &Regex) -> (usize, String) {
    let groups = re.captures_len() - 1;
    let bytes = rest.as_bytes();
    match bytes.first() {
        Some(b'$') => (1, "$$".to_string()),
        Some(b'&') => (1, "${0}".to_string()),
        Some(b) if b.is_ascii_digit() => {
            let one = usize::from(b - b'0');
            let two = bytes
                .get(1)
                .filter(|next| next.is_ascii_digit())
                .map(|next| one * 10 + usize::from(next - b'0'));
            match two {
                Some(number) if (1..=groups).contains(&number) => (2, format!("${{{number}}}")),
                _ if (1..=groups).contains(&one) => (1, format!("${{{one}}}")),
                _ => (0, "$$".to_string()),
            }
        }
        Some(b'<') => match rest.find('>') {
            Some(end) if re.capture_names().flatten().any(|name| name == &rest[1..end]) => {
                (end + 1, format!("${{{}}}", &rest[1..end]))
            }
            _ => (0, "$$".to_string()),
        },
        _ => (0, "$$".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::{format_site_numbers, parse_site_numbers, to_regex_template, MAX_SCOPE_RANGE};

    fn twelve_groups() -> Regex {
        Regex::new(&"(.)".repeat(12)).unwrap()
    }

    #[test]
    fn template_translates_group_references() {
        let re = Regex::new(r"(?<year>\d{4})-(\d+)").unwrap();
        assert_eq!(to_regex_template("[$1]", &re), "[${1}]");
        assert_eq!(to_regex_template("<$&>", &re), "<${0}>");
        assert_eq!(to_regex_template("$<year>-", &re), "${year}-");
        assert_eq!(to_regex_template("$12x", &twelve_groups()), "${12}x");
    }

    #[test]
    fn two_digit_reference_falls_back_to_one_digit_group() {
        let re = Regex::new(r"(\d+)").unwrap();
        assert_eq!(to_regex_template("$10", &re), "${1}0");
        assert_eq!(to_regex_template("$10", &twelve_groups()), "${10}");
    }

    #[test]
    fn template_keeps_stray_dollars_literal() {
        let re = Regex::new(r"(\d+)").unwrap();
        assert_eq!(to_regex_template("cost: $", &re), "cost: $$");
        assert_eq!(to_regex_template("$$5", &re), "$$5");
        assert_eq!(to_regex_template("$0", &re), "$$0");
        assert_eq!(to_regex_template("$2", &re), "$$2");
        assert_eq!(to_regex_template("$<bad name>", &re), "$$<bad name>");
        assert_eq!(to_regex_template("$<year>", &re), "$$<year>");
    }

    #[test]
    fn site_numbers_accept_ranges_and_singles() {
        let parsed = parse_site_numbers("2-4, 1, 7, 3");
        assert_eq!(parsed.into_iter().collect::<Vec<_>>(), vec![1, 2, 3, 4, 7]);
    }

    #[test]
    fn site_numbers_ignore_garbage() {
        assert!(parse_site_numbers("").is_empty());
        assert!(parse_site_numbers("0, 5-2, abc, -3").is_empty());
    }

    #[test]
    fn site_numbers_cut_oversized_ranges() {
        let parsed = parse_site_numbers("5-50000000, 2");
        assert_eq!(parsed.len(), MAX_SCOPE_RANGE + 1);
        assert!(parsed.contains(&2));
        assert_eq!(parsed.iter().next_back(), Some(&(4 + MAX_SCOPE_RANGE)));
    }

    #[test]
    fn site_numbers_format_compactly() {
        let numbers = parse_site_numbers("1,2,3,7,9,10");
        assert_eq!(format_site_numbers(&numbers), "1-3, 7, 9-10");
    }
}
