//! Turning classifier output into a yes/no judgment.

/// Builds the question sent to the classifier for one post title.
pub fn prompt_for_title(title: &str) -> String {
    format!(
        "You are filtering posts on a competitive programming forum. \
         Answer with a single word, yes or no.\n\
         Is the following blog post about algorithms, data structures, \
         problem solving or another technical programming topic?\n\
         Title: {title}"
    )
}

/// True when the classifier's answer starts with an affirmative token.
///
/// Leading markup and punctuation are ignored, so `"**Yes**."` counts.
pub fn is_affirmative(response: &str) -> bool {
    response
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .find(|w| !w.is_empty())
        .is_some_and(|w| w.eq_ignore_ascii_case("yes"))
}
