/// Tokenize text into lowercase words, filtering tokens with length <= 1.
///
/// Indexing and querying share this function, so a document term and a query
/// term match exactly when they tokenize identically.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .map(str::to_lowercase)
        .filter(|w| w.chars().count() > 1)
        .collect()
}
