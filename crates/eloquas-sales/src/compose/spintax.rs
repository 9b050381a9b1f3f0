// Spintax: `{a|b|c}` picks one option at random; `{name}` placeholders are
// filled from a variable map first.

use std::collections::HashMap;
use std::sync::OnceLock;

use rand::Rng;
use regex::{Captures, Regex};

fn group_regex() -> &'static Regex {
    static GROUP: OnceLock<Regex> = OnceLock::new();
    GROUP.get_or_init(|| Regex::new(r"\{([^{}]*\|[^{}]*)\}").expect("valid spintax regex"))
}

fn variable_regex() -> &'static Regex {
    static VARIABLE: OnceLock<Regex> = OnceLock::new();
    VARIABLE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid variable regex"))
}

/// Replace `{key}` with its value. Unknown keys are left untouched.
pub fn substitute(text: &str, vars: &HashMap<&str, String>) -> String {
    variable_regex()
        .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Resolve every alternation group, innermost first.
pub fn spin<R: Rng>(text: &str, rng: &mut R) -> String {
    let mut out = text.to_string();
    while group_regex().is_match(&out) {
        out = group_regex()
            .replace_all(&out, |caps: &Captures| {
                let options: Vec<&str> = caps[1].split('|').collect();
                options[rng.gen_range(0..options.len())].to_string()
            })
            .into_owned();
    }
    out
}

/// Substitute variables, then spin.
pub fn render<R: Rng>(template: &str, vars: &HashMap<&str, String>, rng: &mut R) -> String {
    spin(&substitute(template, vars), rng)
}
