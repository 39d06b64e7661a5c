use once_cell::sync::Lazy;
use regex::Regex;

/// Feature usage patterns and the core-js modules that cover them.
static FEATURES: Lazy<Vec<(Regex, &'static [&'static str])>> = Lazy::new(|| {
    let table: &[(&str, &'static [&'static str])] = &[
        (r"\bPromise\b|\bimport\s*\(", &["es.promise"]),
        (r"\bSymbol\b", &["es.symbol", "es.symbol.description"]),
        (r"\bnew\s+Map\b", &["es.map"]),
        (r"\bnew\s+Set\b", &["es.set"]),
        (r"\bnew\s+WeakMap\b", &["es.weak-map"]),
        (r"\bArray\.from\b", &["es.array.from", "es.string.iterator"]),
        (r"\bArray\.of\b", &["es.array.of"]),
        (r"\bObject\.assign\b", &["es.object.assign"]),
        (r"\bObject\.entries\b", &["es.object.entries"]),
        (r"\bObject\.values\b", &["es.object.values"]),
        (r"\bNumber\.isNaN\b", &["es.number.is-nan"]),
        (r"\bNumber\.isInteger\b", &["es.number.is-integer"]),
        (r"\.includes\s*\(", &["es.array.includes", "es.string.includes"]),
        (r"\.find\s*\(", &["es.array.find"]),
        (r"\.findIndex\s*\(", &["es.array.find-index"]),
        (r"\.fill\s*\(", &["es.array.fill"]),
        (r"\.startsWith\s*\(", &["es.string.starts-with"]),
        (r"\.endsWith\s*\(", &["es.string.ends-with"]),
        (r"\.padStart\s*\(", &["es.string.pad-start"]),
        (r"\.padEnd\s*\(", &["es.string.pad-end"]),
        (r"\.repeat\s*\(", &["es.string.repeat"]),
        (r"\.trim\s*\(", &["es.string.trim"]),
        (r"\.flat\s*\(", &["es.array.flat"]),
    ];

    table
        .iter()
        .map(|(pattern, modules)| {
            (
                Regex::new(pattern).expect("polyfill patterns are valid"),
                *modules,
            )
        })
        .collect()
});

/// core-js module specifiers for the features `source` uses, in a stable
/// order without duplicates.
pub fn detect_usage(source: &str, found: &mut Vec<String>) {
    for (pattern, modules) in FEATURES.iter() {
        if !pattern.is_match(source) {
            continue;
        }
        for module in modules.iter() {
            let specifier = format!("core-js/modules/{}", module);
            if !found.contains(&specifier) {
                found.push(specifier);
            }
        }
    }
}
