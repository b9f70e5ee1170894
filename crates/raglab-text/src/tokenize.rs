/// Lowercased word tokens. Runs of anything other than alphanumerics and
/// `_` act as separators; empty tokens are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}
